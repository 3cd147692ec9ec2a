use serde_json::json;
use thiserror::Error;

/// Failures raised by the results engine.
///
/// Every variant aborts the surrounding transaction; the IPC layer reports them as a
/// `data_error` with [`EngineError::kind`] attached.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("score key still conflicting after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error("computation inconsistency: {0}")]
    ComputationInconsistency(String),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        EngineError::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation_error",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::ComputationInconsistency(_) => "computation_inconsistency",
            EngineError::Store(_) => "store_error",
        }
    }

    /// Callers may retry only transient conditions.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }

    pub fn details(&self) -> serde_json::Value {
        let mut out = json!({
            "kind": self.kind(),
            "retryable": self.is_transient(),
        });
        match self {
            EngineError::Validation {
                details: Some(d), ..
            } => {
                out["context"] = d.clone();
            }
            EngineError::NotFound { entity, id } => {
                out["entity"] = json!(entity);
                out["id"] = json!(id);
            }
            EngineError::Conflict { attempts } => {
                out["attempts"] = json!(attempts);
            }
            _ => {}
        }
        out
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// True when SQLite rejected a write because of a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}
