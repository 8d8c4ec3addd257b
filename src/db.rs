use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "records.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sequence INTEGER NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            credit_units INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            matric_number TEXT NOT NULL UNIQUE,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // credit_units is denormalized from the course at registration time so
    // aggregation never re-reads course rows. Nullable: a row missing its
    // units is surfaced as aggregation_inconsistency at recompute, never
    // silently weighted as zero.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_registrations(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            credit_units INTEGER,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(session_id) REFERENCES sessions(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            UNIQUE(student_id, course_id, session_id, semester_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_registrations_student
         ON course_registrations(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_registrations_period
         ON course_registrations(student_id, session_id, semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            registration_id TEXT NOT NULL UNIQUE,
            ca_score REAL NOT NULL,
            exam_score REAL NOT NULL,
            total_score REAL NOT NULL,
            grade TEXT NOT NULL,
            grade_point REAL NOT NULL,
            remark TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(registration_id) REFERENCES course_registrations(id)
        )",
        [],
    )?;
    ensure_results_updated_at(&conn)?;

    // Derived caches owned by the aggregation engine. Result rows are the
    // source of truth; these are fully replaced on every recompute.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS semester_gpas(
            student_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            total_credit_units INTEGER NOT NULL,
            total_grade_points REAL NOT NULL,
            gpa REAL NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(student_id, session_id, semester_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(session_id) REFERENCES sessions(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cumulative_gpas(
            student_id TEXT PRIMARY KEY,
            total_credit_units INTEGER NOT NULL,
            total_grade_points REAL NOT NULL,
            gpa REAL NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_results_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "results", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE results ADD COLUMN updated_at TEXT", [])?;
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
