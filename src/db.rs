use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "results.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subjects(
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(class_id, subject_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY(student_id, class_id, session_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class ON enrollments(class_id, session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            term TEXT NOT NULL CHECK(term IN ('First', 'Second', 'Third')),
            session_id TEXT NOT NULL,
            class_assessment INTEGER CHECK(class_assessment BETWEEN 0 AND 20),
            summative_test INTEGER CHECK(summative_test BETWEEN 0 AND 20),
            exam INTEGER CHECK(exam BETWEEN 0 AND 60),
            total INTEGER,
            grade TEXT,
            remark TEXT,
            CHECK((total IS NULL) = (grade IS NULL) AND (total IS NULL) = (remark IS NULL)),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(session_id) REFERENCES sessions(id),
            UNIQUE(student_id, subject_id, class_id, term, session_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_class_term ON scores(class_id, term, session_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_student_session ON scores(student_id, session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS term_summaries(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            term TEXT NOT NULL CHECK(term IN ('First', 'Second', 'Third')),
            session_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            grand_total INTEGER NOT NULL DEFAULT 0,
            term_average REAL NOT NULL DEFAULT 0,
            subjects_offered INTEGER NOT NULL DEFAULT 0,
            cumulative_average REAL NOT NULL DEFAULT 0,
            last_term_average REAL,
            computed_position INTEGER,
            principal_remark TEXT,
            teacher_remark TEXT,
            next_term_begins TEXT,
            date_issued TEXT,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(session_id) REFERENCES sessions(id),
            UNIQUE(student_id, term, session_id, class_id)
        )",
        [],
    )?;
    ensure_term_summaries_position_override(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_term_summaries_class
         ON term_summaries(class_id, term, session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_term_summaries_position_override(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "term_summaries", "position_override")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE term_summaries ADD COLUMN position_override TEXT",
        [],
    )?;
    // Older workspaces kept one free-text `position`; it can only have come from staff.
    if table_has_column(conn, "term_summaries", "position")? {
        conn.execute(
            "UPDATE term_summaries SET position_override = position
             WHERE position IS NOT NULL AND TRIM(position) <> ''",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
