use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{class_fields, optional_str, required_str, summary_key, term};
use crate::ipc::types::{AppState, Request};
use crate::model::{SummaryKey, TermSummary};
use crate::ranking;
use crate::results;
use crate::summary;
use serde_json::json;

/// Summary plus its effective display position.
fn summary_json(s: &TermSummary) -> serde_json::Value {
    let mut v = json!(s);
    v["position"] = json!(s.position());
    v
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let key = summary_key(&req.params)?;
    let s = summary::get_summary(conn, &key)?;
    Ok(json!({ "summary": s.as_ref().map(summary_json) }))
}

fn handle_recompute(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let session_id = required_str(&req.params, "sessionId")?;
    let term = term(&req.params)?;

    let summaries = match optional_str(&req.params, "studentId") {
        Some(student_id) => {
            let key = SummaryKey {
                student_id: student_id.to_string(),
                term,
                session_id: session_id.to_string(),
                class_id: class_id.to_string(),
            };
            vec![results::recompute_student(conn, &key, &mut state.rng)?]
        }
        None => results::recompute_class(conn, class_id, term, session_id, &mut state.rng)?,
    };
    Ok(json!({
        "recomputed": summaries.len(),
        "summaries": summaries.iter().map(summary_json).collect::<Vec<_>>(),
    }))
}

fn handle_set_position_override(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let key = summary_key(&req.params)?;
    let position = match req.params.get("position") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.as_str()),
        Some(_) => return Err(HandlerErr::bad_params("position must be a string or null")),
    };
    let s = summary::set_position_override(conn, &key, position)?;
    tracing::info!(
        student_id = %key.student_id,
        class_id = %key.class_id,
        term = %key.term,
        position = ?s.position_override,
        "position override set"
    );
    Ok(json!({ "summary": summary_json(&s) }))
}

fn handle_set_class_fields(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let session_id = required_str(&req.params, "sessionId")?;
    let term = term(&req.params)?;
    let fields = class_fields(&req.params)?;
    crate::roster::class_name(conn, class_id)?;
    let updated = summary::set_class_fields(conn, class_id, term, session_id, &fields)?;
    Ok(json!({ "updated": updated }))
}

fn handle_rank(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let session_id = required_str(&req.params, "sessionId")?;
    let term = term(&req.params)?;
    let ranked = ranking::rank_class(conn, term, session_id, class_id, &mut state.rng)?;
    Ok(json!({
        "positions": ranking::positions(&ranked),
        "ranked": ranked,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "summary.get" => handle_get(state, req),
        "summary.recompute" => handle_recompute(state, req),
        "summary.setPositionOverride" => handle_set_position_override(state, req),
        "summary.setClassFields" => handle_set_class_fields(state, req),
        "class.rank" => handle_rank(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
