//! Score entry units of work.
//!
//! Each public function opens its own immediate transaction: reference checks, the
//! score write and the summary recompute either all commit or none do.

use crate::broadsheet::{self, Broadsheet};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{ScoreKey, ScorePatch, ScoreRecord, SummaryKey, Term, TermSummary};
use crate::ranking;
use crate::roster;
use crate::store;
use crate::summary;
use rand::Rng;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

pub const BULK_UPSERT_MAX_EDITS: usize = 5000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub record: ScoreRecord,
    pub summary: TermSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEdit {
    pub key: ScoreKey,
    pub patch: ScorePatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub updated: usize,
    pub records: Vec<ScoreRecord>,
    /// Final state of every summary the batch touched.
    pub summaries: Vec<TermSummary>,
}

/// A bulk batch that was rolled back. `index` is the offending edit, absent when the
/// failure was not tied to one edit.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct BulkRejected {
    pub index: Option<usize>,
    #[source]
    pub source: EngineError,
}

impl From<EngineError> for BulkRejected {
    fn from(source: EngineError) -> Self {
        BulkRejected {
            index: None,
            source,
        }
    }
}

impl From<rusqlite::Error> for BulkRejected {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::from(e).into()
    }
}

fn check_references(conn: &Connection, key: &ScoreKey) -> EngineResult<()> {
    roster::get_student(conn, &key.student_id)?;
    roster::subject_name(conn, &key.subject_id)?;
    roster::class_name(conn, &key.class_id)?;
    roster::session_name(conn, &key.session_id)?;
    if !roster::is_enrolled(conn, &key.student_id, &key.class_id, &key.session_id)? {
        return Err(EngineError::not_found(
            "enrollment",
            format!(
                "{} in {}/{}",
                key.student_id, key.class_id, key.session_id
            ),
        ));
    }
    if !roster::class_offers_subject(conn, &key.class_id, &key.subject_id)? {
        return Err(EngineError::validation_with(
            format!(
                "subject {} is not offered in class {}",
                key.subject_id, key.class_id
            ),
            json!({ "subjectId": key.subject_id, "classId": key.class_id }),
        ));
    }
    Ok(())
}

fn apply_edit<R: Rng + ?Sized>(
    conn: &Connection,
    cfg: &EngineConfig,
    key: &ScoreKey,
    patch: ScorePatch,
    rng: &mut R,
) -> EngineResult<UpsertOutcome> {
    check_references(conn, key)?;
    let record = store::upsert_record(conn, key, patch, cfg.upsert_retries)?;
    let summary = summary::recompute_term_summary(conn, &key.summary_key(), rng)?;
    Ok(UpsertOutcome { record, summary })
}

pub fn upsert_score<R: Rng + ?Sized>(
    conn: &mut Connection,
    cfg: &EngineConfig,
    key: &ScoreKey,
    patch: ScorePatch,
    rng: &mut R,
) -> EngineResult<UpsertOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = apply_edit(&tx, cfg, key, patch, rng)?;
    tx.commit()?;

    tracing::info!(
        student_id = %key.student_id,
        subject_id = %key.subject_id,
        class_id = %key.class_id,
        term = %key.term,
        total = ?out.record.total,
        "score saved"
    );
    Ok(out)
}

/// Applies every edit in one transaction; the first failing edit rolls back the batch.
pub fn bulk_upsert<R: Rng + ?Sized>(
    conn: &mut Connection,
    cfg: &EngineConfig,
    edits: &[ScoreEdit],
    rng: &mut R,
) -> Result<BulkOutcome, BulkRejected> {
    if edits.len() > BULK_UPSERT_MAX_EDITS {
        return Err(EngineError::validation_with(
            format!(
                "bulk payload exceeds max edits: {} > {}",
                edits.len(),
                BULK_UPSERT_MAX_EDITS
            ),
            json!({ "maxEdits": BULK_UPSERT_MAX_EDITS, "received": edits.len() }),
        )
        .into());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut records = Vec::with_capacity(edits.len());
    let mut summaries: BTreeMap<(String, Term, String, String), TermSummary> = BTreeMap::new();
    for (index, edit) in edits.iter().enumerate() {
        let out = apply_edit(&tx, cfg, &edit.key, edit.patch, rng).map_err(|source| {
            tracing::warn!(index, kind = source.kind(), "bulk score batch rolled back");
            BulkRejected {
                index: Some(index),
                source,
            }
        })?;
        let k = &out.summary.key;
        summaries.insert(
            (
                k.student_id.clone(),
                k.term,
                k.session_id.clone(),
                k.class_id.clone(),
            ),
            out.summary,
        );
        records.push(out.record);
    }
    tx.commit()?;

    tracing::info!(
        edits = edits.len(),
        summaries = summaries.len(),
        "bulk score batch saved"
    );
    Ok(BulkOutcome {
        updated: records.len(),
        records,
        summaries: summaries.into_values().collect(),
    })
}

/// Removes one score and recomputes the summary it belonged to.
pub fn delete_score<R: Rng + ?Sized>(
    conn: &mut Connection,
    key: &ScoreKey,
    rng: &mut R,
) -> EngineResult<TermSummary> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !store::delete_score(&tx, key)? {
        return Err(EngineError::not_found(
            "score",
            format!("{}/{}", key.student_id, key.subject_id),
        ));
    }
    let summary = summary::recompute_term_summary(&tx, &key.summary_key(), rng)?;
    tx.commit()?;

    tracing::info!(
        student_id = %key.student_id,
        subject_id = %key.subject_id,
        term = %key.term,
        "score deleted"
    );
    Ok(summary)
}

pub fn recompute_student<R: Rng + ?Sized>(
    conn: &mut Connection,
    key: &SummaryKey,
    rng: &mut R,
) -> EngineResult<TermSummary> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    roster::get_student(&tx, &key.student_id)?;
    roster::class_name(&tx, &key.class_id)?;
    roster::session_name(&tx, &key.session_id)?;
    let s = summary::recompute_term_summary(&tx, key, rng)?;
    tx.commit()?;
    Ok(s)
}

/// Recomputes the summary of every enrolled student and every existing summary row of
/// the class-term.
pub fn recompute_class<R: Rng + ?Sized>(
    conn: &mut Connection,
    class_id: &str,
    term: Term,
    session_id: &str,
    rng: &mut R,
) -> EngineResult<Vec<TermSummary>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    roster::class_name(&tx, class_id)?;
    roster::session_name(&tx, session_id)?;

    let mut student_ids: Vec<String> = roster::list_class_students(&tx, class_id, session_id)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    for s in summary::list_summaries_for_class(&tx, class_id, term, session_id)? {
        if !student_ids.contains(&s.key.student_id) {
            student_ids.push(s.key.student_id);
        }
    }

    let mut out = Vec::with_capacity(student_ids.len());
    for student_id in student_ids {
        let key = SummaryKey {
            student_id,
            term,
            session_id: session_id.to_string(),
            class_id: class_id.to_string(),
        };
        out.push(summary::recompute_term_summary(&tx, &key, rng)?);
    }
    tx.commit()?;

    tracing::info!(
        class_id,
        session_id,
        term = %term,
        students = out.len(),
        "class summaries recomputed"
    );
    Ok(out)
}

/// The class view: ranks the class-term and projects the broadsheet from the same
/// snapshot, so the Position row always agrees with the row order.
pub fn class_broadsheet<R: Rng + ?Sized>(
    conn: &mut Connection,
    cfg: &EngineConfig,
    class_id: &str,
    term: Term,
    session_id: &str,
    rng: &mut R,
) -> EngineResult<Broadsheet> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let ranked = ranking::rank_in(&tx, term, session_id, class_id, rng)?;
    let sheet = broadsheet::load_broadsheet(&tx, class_id, term, session_id, cfg.zero_policy)?;
    tx.commit()?;

    tracing::debug!(
        class_id,
        session_id,
        term = %term,
        students = ranked.len(),
        "class view ranked"
    );
    Ok(sheet)
}
