use crate::config::EngineConfig;
use crate::db;
use crate::ipc::error::{err, ok, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            // A damaged config row must not prevent the workspace from opening.
            let config = match EngineConfig::load(&conn) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, "engine config unreadable; using defaults");
                    EngineConfig::default()
                }
            };
            state.rng = config.remark_rng();
            state.config = config;
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            tracing::info!(workspace = %path.to_string_lossy(), "workspace selected");
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "config": state.config,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_config_get(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    if state.db.is_none() {
        return Err(HandlerErr::no_workspace());
    }
    Ok(json!({ "config": state.config }))
}

/// Merges the given keys over the current config, persists it and re-seeds remarks.
fn handle_config_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::no_workspace());
    };
    let Some(patch) = req.params.as_object() else {
        return Err(HandlerErr::bad_params("params must be an object"));
    };

    let mut merged = serde_json::to_value(&state.config)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    for (k, v) in patch {
        merged[k.as_str()] = v.clone();
    }
    let next: EngineConfig = serde_json::from_value(merged)
        .map_err(|e| HandlerErr::bad_params(format!("invalid engine config: {e}")))?;

    next.save(conn).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: None,
    })?;
    state.rng = next.remark_rng();
    state.config = next;
    tracing::info!(config = ?state.config, "engine config updated");
    Ok(json!({ "config": state.config }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "engine.config.get" => Some(respond(&req.id, handle_config_get(state, req))),
        "engine.config.set" => Some(respond(&req.id, handle_config_set(state, req))),
        _ => None,
    }
}
