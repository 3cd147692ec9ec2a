use crate::error::{EngineError, EngineResult};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, RosterStudent};
use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;

type NamedUpsert = fn(&Connection, &str, &str) -> EngineResult<()>;

fn handle_named_upsert(
    state: &mut AppState,
    req: &Request,
    upsert: NamedUpsert,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let id = required_str(&req.params, "id")?;
    let name = required_str(&req.params, "name")?;
    upsert(conn, id, name)?;
    Ok(json!({ "id": id }))
}

fn handle_students_upsert(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let student = RosterStudent {
        id: required_str(&req.params, "id")?.to_string(),
        first_name: optional_str(&req.params, "firstName").unwrap_or("").to_string(),
        last_name: required_str(&req.params, "lastName")?.to_string(),
    };
    roster::upsert_student(conn, &student)?;
    Ok(json!({ "id": student.id }))
}

fn handle_class_subjects_set(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let Some(raw) = req.params.get("subjectIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing subjectIds[]"));
    };
    let mut subject_ids = Vec::with_capacity(raw.len());
    for (i, v) in raw.iter().enumerate() {
        match v.as_str() {
            Some(s) => subject_ids.push(s.to_string()),
            None => {
                return Err(HandlerErr::bad_params(format!(
                    "subjectIds[{i}] must be a string"
                )))
            }
        }
    }
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(EngineError::from)?;
    roster::set_class_subjects(&tx, class_id, &subject_ids)?;
    tx.commit().map_err(EngineError::from)?;
    Ok(json!({ "classId": class_id, "subjects": subject_ids.len() }))
}

fn handle_enrollments_set(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let session_id = required_str(&req.params, "sessionId")?;
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    let Some(raw) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing studentIds[]"));
    };
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(EngineError::from)?;
    let mut updated = 0usize;
    for (i, v) in raw.iter().enumerate() {
        let Some(student_id) = v.as_str() else {
            return Err(HandlerErr::bad_params(format!(
                "studentIds[{i}] must be a string"
            )));
        };
        roster::set_enrollment(&tx, student_id, class_id, session_id, active)?;
        updated += 1;
    }
    tx.commit().map_err(EngineError::from)?;
    Ok(json!({ "updated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "roster.classes.upsert" => handle_named_upsert(state, req, roster::upsert_class),
        "roster.sessions.upsert" => handle_named_upsert(state, req, roster::upsert_session),
        "roster.subjects.upsert" => handle_named_upsert(state, req, roster::upsert_subject),
        "roster.students.upsert" => handle_students_upsert(state, req),
        "roster.classSubjects.set" => handle_class_subjects_set(state, req),
        "roster.enrollments.set" => handle_enrollments_set(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
