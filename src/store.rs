use crate::error::{is_unique_violation, EngineError, EngineResult};
use crate::grading::grade_and_remark;
use crate::model::{ScoreKey, ScorePatch, ScoreRecord, Term};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

pub const CLASS_ASSESSMENT_MAX: i64 = 20;
pub const SUMMATIVE_TEST_MAX: i64 = 20;
pub const EXAM_MAX: i64 = 60;

const SCORE_COLUMNS: &str = "id, student_id, subject_id, class_id, term, session_id,
     class_assessment, summative_test, exam, total, grade, remark";

fn score_from_row(r: &Row<'_>) -> rusqlite::Result<ScoreRecord> {
    Ok(ScoreRecord {
        id: r.get(0)?,
        key: ScoreKey {
            student_id: r.get(1)?,
            subject_id: r.get(2)?,
            class_id: r.get(3)?,
            term: r.get(4)?,
            session_id: r.get(5)?,
        },
        class_assessment: r.get(6)?,
        summative_test: r.get(7)?,
        exam: r.get(8)?,
        total: r.get(9)?,
        grade: r.get(10)?,
        remark: r.get(11)?,
    })
}

fn check_range(field: &str, value: Option<i64>, max: i64) -> EngineResult<()> {
    match value {
        Some(v) if !(0..=max).contains(&v) => Err(EngineError::validation_with(
            format!("{field} must be between 0 and {max}"),
            json!({ "field": field, "value": v, "max": max }),
        )),
        _ => Ok(()),
    }
}

/// Null when every sub-score is null or zero; otherwise the sum with nulls as 0.
pub fn compute_total(
    class_assessment: Option<i64>,
    summative_test: Option<i64>,
    exam: Option<i64>,
) -> Option<i64> {
    let parts = [class_assessment, summative_test, exam];
    if parts.iter().all(|p| p.unwrap_or(0) == 0) {
        return None;
    }
    Some(parts.iter().map(|p| p.unwrap_or(0)).sum())
}

fn build_record(
    id: String,
    key: &ScoreKey,
    class_assessment: Option<i64>,
    summative_test: Option<i64>,
    exam: Option<i64>,
) -> ScoreRecord {
    let total = compute_total(class_assessment, summative_test, exam);
    let (grade, remark) = grade_and_remark(total);
    ScoreRecord {
        id,
        key: key.clone(),
        class_assessment,
        summative_test,
        exam,
        total,
        grade: grade.map(str::to_string),
        remark: remark.map(str::to_string),
    }
}

/// Refuses to let a corrupt record reach the store.
pub fn check_record_invariants(rec: &ScoreRecord) -> EngineResult<()> {
    let parts = [rec.class_assessment, rec.summative_test, rec.exam];
    let all_blank = parts.iter().all(|p| p.unwrap_or(0) == 0);
    if all_blank != rec.total.is_none() {
        return Err(EngineError::ComputationInconsistency(format!(
            "score {} has total {:?} for sub-scores {:?}",
            rec.id, rec.total, parts
        )));
    }
    if let Some(total) = rec.total {
        let sum: i64 = parts.iter().map(|p| p.unwrap_or(0)).sum();
        if sum != total {
            return Err(EngineError::ComputationInconsistency(format!(
                "score {} total {} differs from sub-score sum {}",
                rec.id, total, sum
            )));
        }
    }
    if rec.grade.is_none() != rec.total.is_none() || rec.remark.is_none() != rec.total.is_none() {
        return Err(EngineError::ComputationInconsistency(format!(
            "score {} grade/remark do not match total {:?}",
            rec.id, rec.total
        )));
    }
    Ok(())
}

pub fn get_score(conn: &Connection, key: &ScoreKey) -> EngineResult<Option<ScoreRecord>> {
    let sql = format!(
        "SELECT {SCORE_COLUMNS} FROM scores
         WHERE student_id = ? AND subject_id = ? AND class_id = ? AND term = ? AND session_id = ?"
    );
    let rec = conn
        .query_row(
            &sql,
            (
                &key.student_id,
                &key.subject_id,
                &key.class_id,
                key.term,
                &key.session_id,
            ),
            score_from_row,
        )
        .optional()?;
    Ok(rec)
}

/// Update-in-place or insert, keyed by the score's unique tuple.
///
/// A duplicate-key insert rejected by the store is retried as an update, at most
/// `retries` times.
pub fn upsert_record(
    conn: &Connection,
    key: &ScoreKey,
    patch: ScorePatch,
    retries: u32,
) -> EngineResult<ScoreRecord> {
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let existing = get_score(conn, key)?;

        let current = existing.as_ref();
        let class_assessment = patch
            .class_assessment
            .apply(current.and_then(|r| r.class_assessment));
        let summative_test = patch
            .summative_test
            .apply(current.and_then(|r| r.summative_test));
        let exam = patch.exam.apply(current.and_then(|r| r.exam));
        check_range("classAssessment", class_assessment, CLASS_ASSESSMENT_MAX)?;
        check_range("summativeTest", summative_test, SUMMATIVE_TEST_MAX)?;
        check_range("exam", exam, EXAM_MAX)?;

        if let Some(prev) = existing {
            let next = build_record(prev.id.clone(), key, class_assessment, summative_test, exam);
            check_record_invariants(&next)?;
            if next == prev {
                return Ok(prev);
            }
            conn.execute(
                "UPDATE scores SET
                   class_assessment = ?, summative_test = ?, exam = ?,
                   total = ?, grade = ?, remark = ?
                 WHERE id = ?",
                (
                    next.class_assessment,
                    next.summative_test,
                    next.exam,
                    next.total,
                    &next.grade,
                    &next.remark,
                    &next.id,
                ),
            )?;
            return Ok(next);
        }

        let next = build_record(
            Uuid::new_v4().to_string(),
            key,
            class_assessment,
            summative_test,
            exam,
        );
        check_record_invariants(&next)?;
        let inserted = conn.execute(
            "INSERT INTO scores(id, student_id, subject_id, class_id, term, session_id,
                class_assessment, summative_test, exam, total, grade, remark)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                &next.id,
                &key.student_id,
                &key.subject_id,
                &key.class_id,
                key.term,
                &key.session_id,
                next.class_assessment,
                next.summative_test,
                next.exam,
                next.total,
                &next.grade,
                &next.remark,
            ],
        );
        match inserted {
            Ok(_) => return Ok(next),
            Err(e) if is_unique_violation(&e) => {
                if attempts > retries {
                    return Err(EngineError::Conflict { attempts });
                }
                tracing::warn!(
                    student_id = %key.student_id,
                    subject_id = %key.subject_id,
                    attempt = attempts,
                    "score key collided on insert; retrying as update"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub fn delete_score(conn: &Connection, key: &ScoreKey) -> EngineResult<bool> {
    let n = conn.execute(
        "DELETE FROM scores
         WHERE student_id = ? AND subject_id = ? AND class_id = ? AND term = ? AND session_id = ?",
        (
            &key.student_id,
            &key.subject_id,
            &key.class_id,
            key.term,
            &key.session_id,
        ),
    )?;
    Ok(n > 0)
}

/// Every score of a class for one term.
pub fn list_scores_for_class(
    conn: &Connection,
    class_id: &str,
    term: Term,
    session_id: &str,
) -> EngineResult<Vec<ScoreRecord>> {
    let sql = format!(
        "SELECT {SCORE_COLUMNS} FROM scores
         WHERE class_id = ? AND term = ? AND session_id = ?
         ORDER BY student_id, subject_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((class_id, term, session_id), score_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_scores_for_student_term(
    conn: &Connection,
    student_id: &str,
    term: Term,
    session_id: &str,
    class_id: &str,
) -> EngineResult<Vec<ScoreRecord>> {
    let sql = format!(
        "SELECT {SCORE_COLUMNS} FROM scores
         WHERE student_id = ? AND term = ? AND session_id = ? AND class_id = ?
         ORDER BY subject_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, term, session_id, class_id), score_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All of a student's scores in a session, across terms and classes.
pub fn list_scores_for_student_session(
    conn: &Connection,
    student_id: &str,
    session_id: &str,
) -> EngineResult<Vec<ScoreRecord>> {
    let sql = format!(
        "SELECT {SCORE_COLUMNS} FROM scores
         WHERE student_id = ? AND session_id = ?
         ORDER BY term, subject_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, session_id), score_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
