use crate::config::ZeroPolicy;
use crate::error::EngineResult;
use crate::model::{round_off_1_decimal, ScoreRecord, Term, TermSummary};
use crate::ranking::{normalized, Standing};
use crate::roster::{self, RosterStudent, Subject};
use crate::store;
use crate::summary;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCell {
    pub class_assessment: Option<i64>,
    pub summative_test: Option<i64>,
    pub exam: Option<i64>,
    pub total: Option<i64>,
    pub grade: Option<String>,
    pub remark: Option<String>,
}

impl From<&ScoreRecord> for ScoreCell {
    fn from(r: &ScoreRecord) -> Self {
        ScoreCell {
            class_assessment: r.class_assessment,
            summative_test: r.summative_test,
            exam: r.exam,
            total: r.total,
            grade: r.grade.clone(),
            remark: r.remark.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadsheetRow {
    pub student: RosterStudent,
    pub display_name: String,
    /// One entry per subject column; `None` means nothing has been entered yet.
    pub cells: Vec<Option<ScoreCell>>,
    pub grand_total: i64,
    pub term_average: f64,
    pub cumulative_average: f64,
    pub subjects_offered: i64,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject_id: String,
    pub subject_name: String,
    pub average: f64,
    pub counted: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadsheet {
    pub class_id: String,
    pub class_name: String,
    pub session_id: String,
    pub session_name: String,
    pub term: Term,
    pub subjects: Vec<Subject>,
    pub rows: Vec<BroadsheetRow>,
    pub subject_averages: Vec<SubjectAverage>,
}

impl Broadsheet {
    pub fn filled_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.cells.iter().filter(|c| c.is_some()).count())
            .sum()
    }

    pub fn empty_cells(&self) -> usize {
        self.rows.len() * self.subjects.len() - self.filled_cells()
    }
}

/// Pure projection of scores and summaries onto a students × subjects matrix.
pub fn build_matrix(
    students: &[RosterStudent],
    subjects: &[Subject],
    scores: &[ScoreRecord],
    summaries: &[TermSummary],
    policy: ZeroPolicy,
) -> (Vec<BroadsheetRow>, Vec<SubjectAverage>) {
    let by_pair: HashMap<(&str, &str), &ScoreRecord> = scores
        .iter()
        .map(|s| ((s.key.student_id.as_str(), s.key.subject_id.as_str()), s))
        .collect();
    let by_student: HashMap<&str, &TermSummary> = summaries
        .iter()
        .map(|s| (s.key.student_id.as_str(), s))
        .collect();

    let mut subject_totals: Vec<(i64, i64)> = vec![(0, 0); subjects.len()];
    let mut rows: Vec<BroadsheetRow> = Vec::with_capacity(students.len());

    for student in students {
        let mut cells = Vec::with_capacity(subjects.len());
        for (col, subject) in subjects.iter().enumerate() {
            let rec = by_pair.get(&(student.id.as_str(), subject.id.as_str()));
            if let Some(total) = rec.and_then(|r| r.total) {
                if policy.counts(total) {
                    subject_totals[col].0 += total;
                    subject_totals[col].1 += 1;
                }
            }
            cells.push(rec.map(|r| ScoreCell::from(*r)));
        }

        let summary = by_student.get(student.id.as_str());
        rows.push(BroadsheetRow {
            display_name: student.display_name(),
            student: student.clone(),
            cells,
            grand_total: summary.map(|s| s.grand_total).unwrap_or(0),
            term_average: summary.map(|s| normalized(s.term_average)).unwrap_or(0.0),
            cumulative_average: summary.map(|s| s.cumulative_average).unwrap_or(0.0),
            subjects_offered: summary.map(|s| s.subjects_offered).unwrap_or(0),
            position: summary.and_then(|s| s.position()),
        });
    }

    rows.sort_by(|a, b| {
        let sa = Standing {
            average: a.term_average,
            surname: &a.student.last_name,
            student_id: &a.student.id,
        };
        let sb = Standing {
            average: b.term_average,
            surname: &b.student.last_name,
            student_id: &b.student.id,
        };
        sa.cmp_rank(&sb)
    });

    let subject_averages = subjects
        .iter()
        .zip(subject_totals)
        .map(|(subject, (sum, counted))| SubjectAverage {
            subject_id: subject.id.clone(),
            subject_name: subject.name.clone(),
            average: if counted > 0 {
                round_off_1_decimal(sum as f64 / counted as f64)
            } else {
                0.0
            },
            counted,
        })
        .collect();

    (rows, subject_averages)
}

/// Reads the class-term's scores and summaries and projects them for the given roster.
pub fn build_broadsheet(
    conn: &Connection,
    class_id: &str,
    term: Term,
    session_id: &str,
    students: &[RosterStudent],
    subjects: &[Subject],
    policy: ZeroPolicy,
) -> EngineResult<(Vec<BroadsheetRow>, Vec<SubjectAverage>)> {
    let scores = store::list_scores_for_class(conn, class_id, term, session_id)?;
    let summaries = summary::list_summaries_for_class(conn, class_id, term, session_id)?;
    Ok(build_matrix(students, subjects, &scores, &summaries, policy))
}

pub fn load_broadsheet(
    conn: &Connection,
    class_id: &str,
    term: Term,
    session_id: &str,
    policy: ZeroPolicy,
) -> EngineResult<Broadsheet> {
    let class_name = roster::class_name(conn, class_id)?;
    let session_name = roster::session_name(conn, session_id)?;
    let students = roster::list_class_students(conn, class_id, session_id)?;
    let subjects = roster::list_class_subjects(conn, class_id)?;
    let (rows, subject_averages) =
        build_broadsheet(conn, class_id, term, session_id, &students, &subjects, policy)?;
    Ok(Broadsheet {
        class_id: class_id.to_string(),
        class_name,
        session_id: session_id.to_string(),
        session_name,
        term,
        subjects,
        rows,
        subject_averages,
    })
}
