//! Request parameter extraction shared by the handlers.

use crate::ipc::error::HandlerErr;
use crate::model::{Patch, ScoreKey, ScorePatch, SummaryKey, Term};
use crate::summary::ClassFields;
use serde_json::Value;

pub fn required_str<'a>(params: &'a Value, name: &str) -> Result<&'a str, HandlerErr> {
    match params.get(name).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(HandlerErr::bad_params(format!("missing {name}"))),
    }
}

pub fn optional_str<'a>(params: &'a Value, name: &str) -> Option<&'a str> {
    params.get(name).and_then(|v| v.as_str())
}

/// A missing term is a request error; an unrecognised one is a malformed key.
pub fn term(params: &Value) -> Result<Term, HandlerErr> {
    let raw = match params.get("term") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(HandlerErr::bad_params("missing term")),
    };
    Ok(Term::parse(&raw)?)
}

pub fn score_key(params: &Value) -> Result<ScoreKey, HandlerErr> {
    Ok(ScoreKey {
        student_id: required_str(params, "studentId")?.to_string(),
        subject_id: required_str(params, "subjectId")?.to_string(),
        class_id: required_str(params, "classId")?.to_string(),
        term: term(params)?,
        session_id: required_str(params, "sessionId")?.to_string(),
    })
}

pub fn summary_key(params: &Value) -> Result<SummaryKey, HandlerErr> {
    Ok(SummaryKey {
        student_id: required_str(params, "studentId")?.to_string(),
        term: term(params)?,
        session_id: required_str(params, "sessionId")?.to_string(),
        class_id: required_str(params, "classId")?.to_string(),
    })
}

/// Absent field keeps the stored sub-score, `null` clears it.
pub fn score_patch(params: &Value) -> Result<ScorePatch, HandlerErr> {
    let field = |name: &str| {
        Patch::from_json(name, params.get(name)).map_err(|e| HandlerErr::bad_params(e.to_string()))
    };
    Ok(ScorePatch {
        class_assessment: field("classAssessment")?,
        summative_test: field("summativeTest")?,
        exam: field("exam")?,
    })
}

/// `None` when absent, `Some(None)` for explicit null or blank text.
pub fn nullable_text(params: &Value, name: &str) -> Result<Option<Option<String>>, HandlerErr> {
    match params.get(name) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(Some(if t.is_empty() { None } else { Some(t.to_string()) }))
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{name} must be a string or null"))),
    }
}

pub fn class_fields(params: &Value) -> Result<ClassFields, HandlerErr> {
    let fields = ClassFields {
        next_term_begins: nullable_text(params, "nextTermBegins")?,
        date_issued: nullable_text(params, "dateIssued")?,
    };
    if fields.next_term_begins.is_none() && fields.date_issued.is_none() {
        return Err(HandlerErr::bad_params(
            "expected nextTermBegins and/or dateIssued",
        ));
    }
    Ok(fields)
}
