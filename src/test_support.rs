use crate::db;
use crate::model::{ScoreKey, Term};
use rusqlite::Connection;

pub const CLASS: &str = "jss1";
pub const SESSION: &str = "2024-2025";

/// In-memory workspace with one class, one session, three subjects and the given
/// students (`(id, first, last)`) enrolled.
pub fn seeded_conn(students: &[(&str, &str, &str)]) -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    db::init_schema(&conn).expect("init schema");
    conn.execute("INSERT INTO classes(id, name) VALUES(?, 'JSS 1')", [CLASS])
        .expect("class");
    conn.execute(
        "INSERT INTO sessions(id, name) VALUES(?, '2024/2025')",
        [SESSION],
    )
    .expect("session");
    for (i, (id, name)) in [("math", "Mathematics"), ("eng", "English"), ("bio", "Biology")]
        .iter()
        .enumerate()
    {
        conn.execute(
            "INSERT INTO subjects(id, name) VALUES(?, ?)",
            (id, name),
        )
        .expect("subject");
        conn.execute(
            "INSERT INTO class_subjects(class_id, subject_id, sort_order) VALUES(?, ?, ?)",
            (CLASS, id, i as i64),
        )
        .expect("class subject");
    }
    for (id, first, last) in students {
        conn.execute(
            "INSERT INTO students(id, first_name, last_name) VALUES(?, ?, ?)",
            (id, first, last),
        )
        .expect("student");
        conn.execute(
            "INSERT INTO enrollments(student_id, class_id, session_id, active) VALUES(?, ?, ?, 1)",
            (id, CLASS, SESSION),
        )
        .expect("enrollment");
    }
    conn
}

pub fn key(student: &str, subject: &str, term: Term) -> ScoreKey {
    ScoreKey {
        student_id: student.to_string(),
        subject_id: subject.to_string(),
        class_id: CLASS.to_string(),
        term,
        session_id: SESSION.to_string(),
    }
}
