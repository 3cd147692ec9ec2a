use crate::broadsheet::Broadsheet;
use crate::export;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{optional_str, required_str, term};
use crate::ipc::types::{AppState, Request};
use crate::results;
use serde_json::json;
use std::path::PathBuf;

/// Ranks the class-term, then projects it; the view's positions match its row order.
fn load(state: &mut AppState, req: &Request) -> Result<Broadsheet, HandlerErr> {
    let conn = state.db.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let session_id = required_str(&req.params, "sessionId")?;
    let term = term(&req.params)?;
    Ok(results::class_broadsheet(
        conn,
        &state.config,
        class_id,
        term,
        session_id,
        &mut state.rng,
    )?)
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let sheet = load(state, req)?;
    Ok(json!({
        "broadsheet": sheet,
        "filledCells": sheet.filled_cells(),
        "emptyCells": sheet.empty_cells(),
    }))
}

fn handle_export_xlsx(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    if state.db.is_none() {
        return Err(HandlerErr::no_workspace());
    }
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);
    let sheet = load(state, req)?;
    let generated_at = match optional_str(&req.params, "generatedAt") {
        Some(v) => v.to_string(),
        None => chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    let summary = export::write_broadsheet_xlsx(&out_path, &sheet, &generated_at).map_err(|e| {
        tracing::warn!(path = %out_path.to_string_lossy(), error = %e, "broadsheet export failed");
        HandlerErr {
            code: "export_failed",
            message: format!("{e:#}"),
            details: None,
        }
    })?;
    tracing::info!(
        class_id = %sheet.class_id,
        term = %sheet.term,
        path = %out_path.to_string_lossy(),
        bytes = summary.bytes,
        "broadsheet exported"
    );
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "bytes": summary.bytes,
        "sha256": summary.sha256,
        "rows": summary.rows,
        "cols": summary.cols,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "broadsheet.get" => handle_get(state, req),
        "broadsheet.exportXlsx" => handle_export_xlsx(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
