use crate::error::{EngineError, EngineResult};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;

/// Academic term within a session. Declaration order is the fixed term order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Term {
    First,
    Second,
    Third,
}

impl Term {
    pub const ALL: [Term; 3] = [Term::First, Term::Second, Term::Third];

    pub fn as_str(self) -> &'static str {
        match self {
            Term::First => "First",
            Term::Second => "Second",
            Term::Third => "Third",
        }
    }

    pub fn previous(self) -> Option<Term> {
        match self {
            Term::First => None,
            Term::Second => Some(Term::First),
            Term::Third => Some(Term::Second),
        }
    }

    pub fn parse(raw: &str) -> EngineResult<Term> {
        let t = raw.trim().to_ascii_lowercase();
        let t = t.strip_suffix(" term").unwrap_or(t.as_str()).trim();
        match t {
            "first" | "1" | "1st" => Ok(Term::First),
            "second" | "2" | "2nd" => Ok(Term::Second),
            "third" | "3" | "3rd" => Ok(Term::Third),
            _ => Err(EngineError::validation_with(
                "term must be one of: First, Second, Third",
                serde_json::json!({ "term": raw }),
            )),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Term {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Term {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "First" => Ok(Term::First),
            "Second" => Ok(Term::Second),
            "Third" => Ok(Term::Third),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// Identity of one ScoreRecord.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreKey {
    pub student_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub term: Term,
    pub session_id: String,
}

impl ScoreKey {
    pub fn summary_key(&self) -> SummaryKey {
        SummaryKey {
            student_id: self.student_id.clone(),
            term: self.term,
            session_id: self.session_id.clone(),
            class_id: self.class_id.clone(),
        }
    }
}

/// Identity of one TermSummary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryKey {
    pub student_id: String,
    pub term: Term,
    pub session_id: String,
    pub class_id: String,
}

/// Partial update of a single sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Patch {
    /// Leave the stored value as it is.
    #[default]
    Keep,
    Clear,
    Set(i64),
}

impl Patch {
    pub fn apply(self, current: Option<i64>) -> Option<i64> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(v) => Some(v),
        }
    }

    /// Absent key => Keep, JSON null => Clear, integer => Set.
    pub fn from_json(field: &str, raw: Option<&serde_json::Value>) -> EngineResult<Patch> {
        match raw {
            None => Ok(Patch::Keep),
            Some(v) if v.is_null() => Ok(Patch::Clear),
            Some(v) => match v.as_i64() {
                Some(n) => Ok(Patch::Set(n)),
                None => Err(EngineError::validation_with(
                    format!("{field} must be an integer or null"),
                    serde_json::json!({ "field": field, "value": v }),
                )),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScorePatch {
    pub class_assessment: Patch,
    pub summative_test: Patch,
    pub exam: Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: String,
    #[serde(flatten)]
    pub key: ScoreKey,
    pub class_assessment: Option<i64>,
    pub summative_test: Option<i64>,
    pub exam: Option<i64>,
    pub total: Option<i64>,
    pub grade: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermSummary {
    #[serde(flatten)]
    pub key: SummaryKey,
    pub grand_total: i64,
    pub term_average: f64,
    pub subjects_offered: i64,
    pub cumulative_average: f64,
    pub last_term_average: Option<f64>,
    pub computed_position: Option<i64>,
    pub position_override: Option<String>,
    pub principal_remark: Option<String>,
    pub teacher_remark: Option<String>,
    pub next_term_begins: Option<String>,
    pub date_issued: Option<String>,
}

impl TermSummary {
    /// Administrative override first, computed rank second.
    pub fn position(&self) -> Option<String> {
        if let Some(p) = self
            .position_override
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            return Some(p.to_string());
        }
        self.computed_position.map(ordinal)
    }
}

/// `1 -> "1st"`, `12 -> "12th"`, `22 -> "22nd"`.
pub fn ordinal(n: i64) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Legacy 1-decimal half-up rounding: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}
