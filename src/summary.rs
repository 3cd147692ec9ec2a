use crate::error::{EngineError, EngineResult};
use crate::model::{round_off_1_decimal, ScoreRecord, SummaryKey, Term, TermSummary};
use crate::remarks::remarks_for_average;
use crate::store;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

const SUMMARY_COLUMNS: &str = "student_id, term, session_id, class_id,
     grand_total, term_average, subjects_offered, cumulative_average, last_term_average,
     computed_position, position_override, principal_remark, teacher_remark,
     next_term_begins, date_issued";

fn summary_from_row(r: &Row<'_>) -> rusqlite::Result<TermSummary> {
    Ok(TermSummary {
        key: SummaryKey {
            student_id: r.get(0)?,
            term: r.get(1)?,
            session_id: r.get(2)?,
            class_id: r.get(3)?,
        },
        grand_total: r.get(4)?,
        term_average: r.get(5)?,
        subjects_offered: r.get(6)?,
        cumulative_average: r.get(7)?,
        last_term_average: r.get(8)?,
        computed_position: r.get(9)?,
        position_override: r.get(10)?,
        principal_remark: r.get(11)?,
        teacher_remark: r.get(12)?,
        next_term_begins: r.get(13)?,
        date_issued: r.get(14)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalsMean {
    /// Sum of totals with null read as 0.
    pub sum: i64,
    /// Records with a non-null total.
    pub count: i64,
    pub average: f64,
}

pub fn mean_of_totals<'a, I>(records: I) -> TotalsMean
where
    I: IntoIterator<Item = &'a ScoreRecord>,
{
    let mut sum: i64 = 0;
    let mut count: i64 = 0;
    for r in records {
        if let Some(t) = r.total {
            sum += t;
            count += 1;
        }
    }
    let average = if count > 0 {
        sum as f64 / count as f64
    } else {
        0.0
    };
    TotalsMean {
        sum,
        count,
        average,
    }
}

/// Term average of one class-term, from the student's session records.
fn term_average_in(session_records: &[ScoreRecord], term: Term, class_id: &str) -> Option<f64> {
    let in_term: Vec<&ScoreRecord> = session_records
        .iter()
        .filter(|r| r.key.term == term && r.key.class_id == class_id)
        .collect();
    if in_term.is_empty() {
        return None;
    }
    Some(round_off_1_decimal(mean_of_totals(in_term).average))
}

pub fn get_summary(conn: &Connection, key: &SummaryKey) -> EngineResult<Option<TermSummary>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM term_summaries
         WHERE student_id = ? AND term = ? AND session_id = ? AND class_id = ?"
    );
    let s = conn
        .query_row(
            &sql,
            (&key.student_id, key.term, &key.session_id, &key.class_id),
            summary_from_row,
        )
        .optional()?;
    Ok(s)
}

pub fn list_summaries_for_class(
    conn: &Connection,
    class_id: &str,
    term: Term,
    session_id: &str,
) -> EngineResult<Vec<TermSummary>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM term_summaries
         WHERE class_id = ? AND term = ? AND session_id = ?
         ORDER BY student_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((class_id, term, session_id), summary_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Rebuilds the derived figures of one student's term summary from the score records.
///
/// Must run inside the transaction that changed the scores. Administrative fields
/// (`position_override`, `next_term_begins`, `date_issued`) and the last computed
/// rank are preserved.
pub fn recompute_term_summary<R: Rng + ?Sized>(
    conn: &Connection,
    key: &SummaryKey,
    rng: &mut R,
) -> EngineResult<TermSummary> {
    let term_records = store::list_scores_for_student_term(
        conn,
        &key.student_id,
        key.term,
        &key.session_id,
        &key.class_id,
    )?;
    let term_stats = mean_of_totals(&term_records);

    let session_records =
        store::list_scores_for_student_session(conn, &key.student_id, &key.session_id)?;
    let cumulative = mean_of_totals(&session_records);
    let last_term_average = key
        .term
        .previous()
        .and_then(|prev| term_average_in(&session_records, prev, &key.class_id));

    let term_average = round_off_1_decimal(term_stats.average);
    let remarks = remarks_for_average(term_average, rng);

    conn.execute(
        "INSERT INTO term_summaries(
            id, student_id, term, session_id, class_id,
            grand_total, term_average, subjects_offered, cumulative_average, last_term_average,
            principal_remark, teacher_remark, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, term, session_id, class_id) DO UPDATE SET
            grand_total = excluded.grand_total,
            term_average = excluded.term_average,
            subjects_offered = excluded.subjects_offered,
            cumulative_average = excluded.cumulative_average,
            last_term_average = excluded.last_term_average,
            principal_remark = excluded.principal_remark,
            teacher_remark = excluded.teacher_remark,
            updated_at = excluded.updated_at",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            &key.student_id,
            key.term,
            &key.session_id,
            &key.class_id,
            term_stats.sum,
            term_average,
            term_stats.count,
            round_off_1_decimal(cumulative.average),
            last_term_average,
            remarks.principal,
            remarks.teacher,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;

    refresh_session_dependents(conn, key, &session_records)?;

    tracing::debug!(
        student_id = %key.student_id,
        term = %key.term,
        grand_total = term_stats.sum,
        term_average,
        subjects_offered = term_stats.count,
        "term summary recomputed"
    );

    get_summary(conn, key)?.ok_or_else(|| {
        EngineError::ComputationInconsistency(format!(
            "term summary for student {} vanished after recompute",
            key.student_id
        ))
    })
}

/// Cumulative and last-term figures depend on every term of the session, so the
/// student's other summaries in the session are brought up to date as well.
fn refresh_session_dependents(
    conn: &Connection,
    changed: &SummaryKey,
    session_records: &[ScoreRecord],
) -> EngineResult<()> {
    let cumulative = round_off_1_decimal(mean_of_totals(session_records).average);
    let mut stmt = conn.prepare(
        "SELECT id, term, class_id FROM term_summaries
         WHERE student_id = ? AND session_id = ?",
    )?;
    let rows = stmt
        .query_map((&changed.student_id, &changed.session_id), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Term>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, term, class_id) in rows {
        let last = term
            .previous()
            .and_then(|prev| term_average_in(session_records, prev, &class_id));
        conn.execute(
            "UPDATE term_summaries SET cumulative_average = ?, last_term_average = ?
             WHERE id = ?",
            (cumulative, last, &id),
        )?;
    }
    Ok(())
}

pub fn set_position_override(
    conn: &Connection,
    key: &SummaryKey,
    position: Option<&str>,
) -> EngineResult<TermSummary> {
    let position = position.map(str::trim).filter(|p| !p.is_empty());
    let n = conn.execute(
        "UPDATE term_summaries SET position_override = ?
         WHERE student_id = ? AND term = ? AND session_id = ? AND class_id = ?",
        (
            position,
            &key.student_id,
            key.term,
            &key.session_id,
            &key.class_id,
        ),
    )?;
    if n == 0 {
        return Err(EngineError::not_found("term summary", key.student_id.clone()));
    }
    get_summary(conn, key)?
        .ok_or_else(|| EngineError::not_found("term summary", key.student_id.clone()))
}

/// Written only by the ranking engine.
pub fn write_computed_position(
    conn: &Connection,
    key: &SummaryKey,
    position: Option<i64>,
) -> EngineResult<()> {
    conn.execute(
        "UPDATE term_summaries SET computed_position = ?
         WHERE student_id = ? AND term = ? AND session_id = ? AND class_id = ?",
        (
            position,
            &key.student_id,
            key.term,
            &key.session_id,
            &key.class_id,
        ),
    )?;
    Ok(())
}

/// Administrative fields shared by a class-term. `None` leaves a field untouched,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFields {
    pub next_term_begins: Option<Option<String>>,
    pub date_issued: Option<Option<String>>,
}

/// Applies `fields` to every existing summary of the class-term; returns rows touched.
pub fn set_class_fields(
    conn: &Connection,
    class_id: &str,
    term: Term,
    session_id: &str,
    fields: &ClassFields,
) -> EngineResult<usize> {
    let mut touched = 0;
    if let Some(v) = &fields.next_term_begins {
        touched = conn.execute(
            "UPDATE term_summaries SET next_term_begins = ?
             WHERE class_id = ? AND term = ? AND session_id = ?",
            (v, class_id, term, session_id),
        )?;
    }
    if let Some(v) = &fields.date_issued {
        touched = conn.execute(
            "UPDATE term_summaries SET date_issued = ?
             WHERE class_id = ? AND term = ? AND session_id = ?",
            (v, class_id, term, session_id),
        )?;
    }
    Ok(touched)
}
