use crate::error::EngineResult;
use crate::model::{SummaryKey, Term};
use crate::roster;
use crate::summary;
use rand::Rng;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Sort key shared by class ranking and broadsheet row order: average descending, then
/// surname ascending (case-insensitive), then student id ascending.
#[derive(Debug, Clone, Copy)]
pub struct Standing<'a> {
    pub average: f64,
    pub surname: &'a str,
    pub student_id: &'a str,
}

impl Standing<'_> {
    pub fn cmp_rank(&self, other: &Standing<'_>) -> Ordering {
        normalized(other.average)
            .total_cmp(&normalized(self.average))
            .then_with(|| {
                self.surname
                    .to_lowercase()
                    .cmp(&other.surname.to_lowercase())
            })
            .then_with(|| self.student_id.cmp(other.student_id))
    }
}

/// Non-numeric averages rank as 0.
pub fn normalized(average: f64) -> f64 {
    if average.is_finite() {
        average
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub student_id: String,
    pub surname: String,
    pub term_average: f64,
    pub position: i64,
}

#[derive(Debug, Clone)]
pub struct RankCandidate {
    pub student_id: String,
    pub surname: String,
    pub term_average: f64,
}

/// Assigns sequential 1-based positions.
pub fn rank_candidates(mut candidates: Vec<RankCandidate>) -> Vec<RankedStudent> {
    candidates.sort_by(|a, b| {
        let sa = Standing {
            average: a.term_average,
            surname: &a.surname,
            student_id: &a.student_id,
        };
        let sb = Standing {
            average: b.term_average,
            surname: &b.surname,
            student_id: &b.student_id,
        };
        sa.cmp_rank(&sb)
    });
    candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| RankedStudent {
            student_id: c.student_id,
            surname: c.surname,
            term_average: normalized(c.term_average),
            position: i as i64 + 1,
        })
        .collect()
}

pub fn positions(ranked: &[RankedStudent]) -> BTreeMap<String, i64> {
    ranked
        .iter()
        .map(|r| (r.student_id.clone(), r.position))
        .collect()
}

/// Ranks every student of the class-term from one snapshot and writes the computed
/// positions back, atomically.
///
/// The ranked set is the class's actively enrolled students. Those without a summary get
/// one first (zero aggregates), so they rank with an average of 0. Summaries of students
/// no longer actively enrolled lose their computed position.
pub fn rank_class<R: Rng + ?Sized>(
    conn: &mut Connection,
    term: Term,
    session_id: &str,
    class_id: &str,
    rng: &mut R,
) -> EngineResult<Vec<RankedStudent>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let ranked = rank_in(&tx, term, session_id, class_id, rng)?;
    tx.commit()?;

    tracing::info!(
        class_id,
        session_id,
        term = %term,
        students = ranked.len(),
        "class ranked"
    );
    Ok(ranked)
}

/// Ranking body for callers that already hold a transaction.
pub fn rank_in<R: Rng + ?Sized>(
    conn: &Connection,
    term: Term,
    session_id: &str,
    class_id: &str,
    rng: &mut R,
) -> EngineResult<Vec<RankedStudent>> {
    roster::class_name(conn, class_id)?;
    roster::session_name(conn, session_id)?;

    let key_for = |student_id: &str| SummaryKey {
        student_id: student_id.to_string(),
        term,
        session_id: session_id.to_string(),
        class_id: class_id.to_string(),
    };

    let mut by_student: BTreeMap<String, f64> =
        summary::list_summaries_for_class(conn, class_id, term, session_id)?
            .into_iter()
            .map(|s| (s.key.student_id, s.term_average))
            .collect();

    let mut candidates = Vec::new();
    for student in roster::list_class_students(conn, class_id, session_id)? {
        let term_average = match by_student.remove(&student.id) {
            Some(avg) => avg,
            None => {
                let created = summary::recompute_term_summary(conn, &key_for(&student.id), rng)?;
                created.term_average
            }
        };
        candidates.push(RankCandidate {
            student_id: student.id,
            surname: student.last_name,
            term_average,
        });
    }

    // Whatever is left belongs to students who are not actively enrolled.
    for student_id in by_student.keys() {
        summary::write_computed_position(conn, &key_for(student_id), None)?;
    }

    let ranked = rank_candidates(candidates);
    for r in &ranked {
        summary::write_computed_position(conn, &key_for(&r.student_id), Some(r.position))?;
    }
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Patch, ScorePatch};
    use crate::store;
    use crate::test_support::{key, seeded_conn, CLASS, SESSION};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cand(id: &str, surname: &str, avg: f64) -> RankCandidate {
        RankCandidate {
            student_id: id.to_string(),
            surname: surname.to_string(),
            term_average: avg,
        }
    }

    #[test]
    fn surname_breaks_equal_averages() {
        let ranked = rank_candidates(vec![cand("s1", "Bello", 72.0), cand("s2", "Adams", 72.0)]);
        let p = positions(&ranked);
        assert_eq!(p["s2"], 1);
        assert_eq!(p["s1"], 2);
    }

    #[test]
    fn student_id_breaks_identical_surnames() {
        let ranked = rank_candidates(vec![
            cand("s9", "Okafor", 60.0),
            cand("s3", "okafor", 60.0),
            cand("s5", "Zed", 88.5),
        ]);
        let order: Vec<&str> = ranked.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(order, vec!["s5", "s3", "s9"]);
    }

    #[test]
    fn non_numeric_average_ranks_as_zero() {
        let ranked = rank_candidates(vec![cand("a", "A", f64::NAN), cand("b", "B", 1.0)]);
        assert_eq!(ranked[0].student_id, "b");
        assert_eq!(ranked[1].term_average, 0.0);
    }

    #[test]
    fn rank_class_writes_positions_and_is_repeatable() {
        let mut conn = seeded_conn(&[
            ("s1", "Ada", "Bello"),
            ("s2", "Tunde", "Adams"),
            ("s3", "Ngozi", "Eze"),
        ]);
        let mut rng = StdRng::seed_from_u64(11);
        for (student, exam) in [("s1", 42), ("s2", 42)] {
            let k = key(student, "math", Term::First);
            store::upsert_record(
                &conn,
                &k,
                ScorePatch {
                    class_assessment: Patch::Set(15),
                    summative_test: Patch::Set(15),
                    exam: Patch::Set(exam),
                },
                3,
            )
            .expect("score");
            summary::recompute_term_summary(&conn, &k.summary_key(), &mut rng).expect("summary");
        }

        let first = rank_class(&mut conn, Term::First, SESSION, CLASS, &mut rng).expect("rank");
        let p = positions(&first);
        assert_eq!(p["s2"], 1);
        assert_eq!(p["s1"], 2);
        // s3 has no scores yet and ranks last with average 0.
        assert_eq!(p["s3"], 3);

        let again = rank_class(&mut conn, Term::First, SESSION, CLASS, &mut rng)
            .expect("rank again");
        assert_eq!(first, again);

        let stored = summary::list_summaries_for_class(&conn, CLASS, Term::First, SESSION)
            .expect("list");
        assert_eq!(stored.len(), 3);
        let s3 = stored.iter().find(|s| s.key.student_id == "s3").expect("s3");
        assert_eq!(s3.computed_position, Some(3));
        assert_eq!(s3.position().as_deref(), Some("3rd"));
    }

    #[test]
    fn unknown_class_is_not_found() {
        let mut conn = seeded_conn(&[]);
        let mut rng = StdRng::seed_from_u64(1);
        let e = rank_class(&mut conn, Term::First, SESSION, "nope", &mut rng).expect_err("class");
        assert_eq!(e.kind(), "not_found");
    }
}
