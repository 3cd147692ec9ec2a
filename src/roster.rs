//! Classes, sessions, subjects, students and enrollments.
//!
//! These come from enrollment/catalog management upstream; the engine only reads them,
//! apart from the thin writes the `roster.*` IPC methods expose for loading them.

use crate::error::{EngineError, EngineResult};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStudent {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl RosterStudent {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

fn named_entity(
    conn: &Connection,
    table: &'static str,
    entity: &'static str,
    id: &str,
) -> EngineResult<String> {
    let sql = format!("SELECT name FROM {} WHERE id = ?", table);
    conn.query_row(&sql, [id], |r| r.get::<_, String>(0))
        .optional()?
        .ok_or_else(|| EngineError::not_found(entity, id))
}

pub fn class_name(conn: &Connection, class_id: &str) -> EngineResult<String> {
    named_entity(conn, "classes", "class", class_id)
}

pub fn session_name(conn: &Connection, session_id: &str) -> EngineResult<String> {
    named_entity(conn, "sessions", "session", session_id)
}

pub fn subject_name(conn: &Connection, subject_id: &str) -> EngineResult<String> {
    named_entity(conn, "subjects", "subject", subject_id)
}

pub fn get_student(conn: &Connection, student_id: &str) -> EngineResult<RosterStudent> {
    conn.query_row(
        "SELECT id, first_name, last_name FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(RosterStudent {
                id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("student", student_id))
}

/// Withdrawn enrollments (`active = 0`) do not count.
pub fn is_enrolled(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
    session_id: &str,
) -> EngineResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments
             WHERE student_id = ? AND class_id = ? AND session_id = ? AND active = 1",
            (student_id, class_id, session_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn class_offers_subject(
    conn: &Connection,
    class_id: &str,
    subject_id: &str,
) -> EngineResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM class_subjects WHERE class_id = ? AND subject_id = ?",
            (class_id, subject_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Active students of a class in a session, by surname.
pub fn list_class_students(
    conn: &Connection,
    class_id: &str,
    session_id: &str,
) -> EngineResult<Vec<RosterStudent>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.first_name, s.last_name
         FROM students s
         JOIN enrollments e ON e.student_id = s.id
         WHERE e.class_id = ? AND e.session_id = ? AND e.active = 1
         ORDER BY s.last_name COLLATE NOCASE, s.first_name COLLATE NOCASE, s.id",
    )?;
    let rows = stmt
        .query_map((class_id, session_id), |r| {
            Ok(RosterStudent {
                id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_class_subjects(conn: &Connection, class_id: &str) -> EngineResult<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name
         FROM subjects s
         JOIN class_subjects cs ON cs.subject_id = s.id
         WHERE cs.class_id = ?
         ORDER BY cs.sort_order, s.name",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn upsert_named(conn: &Connection, table: &'static str, id: &str, name: &str) -> EngineResult<()> {
    if id.trim().is_empty() || name.trim().is_empty() {
        return Err(EngineError::validation(format!(
            "{table} rows need a non-empty id and name"
        )));
    }
    let sql = format!(
        "INSERT INTO {table}(id, name) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name"
    );
    conn.execute(&sql, (id, name.trim()))?;
    Ok(())
}

pub fn upsert_class(conn: &Connection, id: &str, name: &str) -> EngineResult<()> {
    upsert_named(conn, "classes", id, name)
}

pub fn upsert_session(conn: &Connection, id: &str, name: &str) -> EngineResult<()> {
    upsert_named(conn, "sessions", id, name)
}

pub fn upsert_subject(conn: &Connection, id: &str, name: &str) -> EngineResult<()> {
    upsert_named(conn, "subjects", id, name)
}

pub fn upsert_student(conn: &Connection, student: &RosterStudent) -> EngineResult<()> {
    if student.id.trim().is_empty() || student.last_name.trim().is_empty() {
        return Err(EngineError::validation("students need an id and a last name"));
    }
    conn.execute(
        "INSERT INTO students(id, first_name, last_name) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           first_name = excluded.first_name,
           last_name = excluded.last_name",
        (
            &student.id,
            student.first_name.trim(),
            student.last_name.trim(),
        ),
    )?;
    Ok(())
}

/// Replaces the subject list of a class; position in `subject_ids` is the display order.
///
/// Refuses to drop a subject that still has recorded scores in the class.
pub fn set_class_subjects(
    conn: &Connection,
    class_id: &str,
    subject_ids: &[String],
) -> EngineResult<()> {
    class_name(conn, class_id)?;
    for id in subject_ids {
        subject_name(conn, id)?;
    }
    for current in list_class_subjects(conn, class_id)? {
        if subject_ids.contains(&current.id) {
            continue;
        }
        let scores: i64 = conn.query_row(
            "SELECT COUNT(*) FROM scores WHERE class_id = ? AND subject_id = ?",
            (class_id, &current.id),
            |r| r.get(0),
        )?;
        if scores > 0 {
            return Err(EngineError::validation_with(
                format!(
                    "subject {} still has {scores} recorded scores in class {class_id}",
                    current.id
                ),
                serde_json::json!({
                    "subjectId": current.id,
                    "classId": class_id,
                    "scores": scores,
                }),
            ));
        }
    }
    conn.execute("DELETE FROM class_subjects WHERE class_id = ?", [class_id])?;
    for (i, id) in subject_ids.iter().enumerate() {
        conn.execute(
            "INSERT INTO class_subjects(class_id, subject_id, sort_order) VALUES(?, ?, ?)
             ON CONFLICT(class_id, subject_id) DO NOTHING",
            (class_id, id, i as i64),
        )?;
    }
    Ok(())
}

pub fn set_enrollment(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
    session_id: &str,
    active: bool,
) -> EngineResult<()> {
    get_student(conn, student_id)?;
    class_name(conn, class_id)?;
    session_name(conn, session_id)?;
    conn.execute(
        "INSERT INTO enrollments(student_id, class_id, session_id, active) VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, class_id, session_id) DO UPDATE SET active = excluded.active",
        (student_id, class_id, session_id, active as i64),
    )?;
    Ok(())
}
