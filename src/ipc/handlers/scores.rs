use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{required_str, score_key, score_patch, term};
use crate::ipc::types::{AppState, Request};
use crate::results::{self, ScoreEdit, BULK_UPSERT_MAX_EDITS};
use crate::store;
use serde_json::json;

fn handle_upsert(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let key = score_key(&req.params)?;
    let patch = score_patch(&req.params)?;
    let out = results::upsert_score(conn, &state.config, &key, patch, &mut state.rng)?;
    Ok(json!({ "record": out.record, "summary": out.summary }))
}

fn with_index(mut e: HandlerErr, index: usize) -> HandlerErr {
    match e.details.as_mut() {
        Some(details) if details.is_object() => details["index"] = json!(index),
        _ => e.details = Some(json!({ "index": index })),
    }
    e
}

fn handle_bulk_upsert(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let Some(raw) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing edits[]"));
    };
    if raw.len() > BULK_UPSERT_MAX_EDITS {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!(
                "bulk payload exceeds max edits: {} > {}",
                raw.len(),
                BULK_UPSERT_MAX_EDITS
            ),
            details: Some(json!({ "maxEdits": BULK_UPSERT_MAX_EDITS, "received": raw.len() })),
        });
    }

    let mut edits = Vec::with_capacity(raw.len());
    for (i, edit) in raw.iter().enumerate() {
        if !edit.is_object() {
            return Err(HandlerErr::bad_params(format!(
                "edit at index {i} must be an object"
            )));
        }
        let parsed = score_key(edit)
            .and_then(|key| score_patch(edit).map(|patch| ScoreEdit { key, patch }));
        match parsed {
            Ok(e) => edits.push(e),
            Err(mut e) => {
                e.message = format!("edit at index {i}: {}", e.message);
                return Err(with_index(e, i));
            }
        }
    }

    match results::bulk_upsert(conn, &state.config, &edits, &mut state.rng) {
        Ok(out) => Ok(json!({
            "updated": out.updated,
            "records": out.records,
            "summaries": out.summaries,
        })),
        Err(rejected) => {
            let e = HandlerErr::from(rejected.source);
            Err(match rejected.index {
                Some(i) => with_index(e, i),
                None => e,
            })
        }
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let key = score_key(&req.params)?;
    let record = store::get_score(conn, &key)?;
    Ok(json!({ "record": record }))
}

fn handle_list_class(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let session_id = required_str(&req.params, "sessionId")?;
    let term = term(&req.params)?;
    crate::roster::class_name(conn, class_id)?;
    let records = store::list_scores_for_class(conn, class_id, term, session_id)?;
    Ok(json!({ "records": records }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let key = score_key(&req.params)?;
    let summary = results::delete_score(conn, &key, &mut state.rng)?;
    Ok(json!({ "deleted": true, "summary": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "scores.upsert" => handle_upsert(state, req),
        "scores.bulkUpsert" => handle_bulk_upsert(state, req),
        "scores.get" => handle_get(state, req),
        "scores.listClass" => handle_list_class(state, req),
        "scores.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
