use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use super::{db_conn, required_str};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "registrations.create" => Some(create(state, req)),
        "registrations.delete" => Some(delete(state, req)),
        "registrations.list" => Some(list(state, req)),
        _ => None,
    }
}

fn exists(
    conn: &rusqlite::Connection,
    table: &str,
    id: &str,
) -> Result<bool, rusqlite::Error> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let hit: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

fn create(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let semester_id = match required_str(req, "semesterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    for (table, id, label) in [
        ("students", &student_id, "student"),
        ("sessions", &session_id, "session"),
        ("semesters", &semester_id, "semester"),
    ] {
        match exists(conn, table, id) {
            Ok(true) => {}
            Ok(false) => {
                return err(&req.id, "not_found", format!("{} {} not found", label, id), None)
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    // Credit units are copied from the course at registration time; the
    // aggregators never look the course up again.
    let credit_units: Option<i64> = match conn
        .query_row(
            "SELECT credit_units FROM courses WHERE id = ?",
            [&course_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(Some(u)) => Some(u),
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                format!("course {} not found", course_id),
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let duplicate: Result<Option<String>, _> = conn
        .query_row(
            "SELECT id FROM course_registrations
             WHERE student_id = ? AND course_id = ? AND session_id = ? AND semester_id = ?",
            (&student_id, &course_id, &session_id, &semester_id),
            |r| r.get(0),
        )
        .optional();
    match duplicate {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "conflict",
                "student is already registered for this course in this period",
                None,
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO course_registrations(
            id, student_id, course_id, session_id, semester_id, credit_units)
         VALUES (?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &course_id,
            &session_id,
            &semester_id,
            credit_units,
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "registrationId": id, "creditUnits": credit_units }),
    )
}

fn delete(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let registration_id = match required_str(req, "registrationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match exists(conn, "course_registrations", &registration_id) {
        Ok(true) => {}
        Ok(false) => {
            return err(
                &req.id,
                "not_found",
                format!("registration {} not found", registration_id),
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    // Unregistration is administrative only: once a result exists the
    // registration is immutable.
    let graded: Result<Option<String>, _> = conn
        .query_row(
            "SELECT id FROM results WHERE registration_id = ?",
            [&registration_id],
            |r| r.get(0),
        )
        .optional();
    match graded {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "conflict",
                "registration has a recorded result and cannot be removed",
                None,
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    if let Err(e) = conn.execute(
        "DELETE FROM course_registrations WHERE id = ?",
        [&registration_id],
    ) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn list(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let semester_id = match required_str(req, "semesterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT cr.id, c.code, c.title, cr.credit_units,
                (SELECT COUNT(*) FROM results r WHERE r.registration_id = cr.id)
         FROM course_registrations cr
         JOIN courses c ON c.id = cr.course_id
         WHERE cr.student_id = ? AND cr.session_id = ? AND cr.semester_id = ?
         ORDER BY c.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&student_id, &session_id, &semester_id), |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let title: String = row.get(2)?;
            let credit_units: Option<i64> = row.get(3)?;
            let graded: i64 = row.get(4)?;
            Ok(json!({
                "registrationId": id,
                "courseCode": code,
                "courseTitle": title,
                "creditUnits": credit_units,
                "graded": graded > 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(registrations) => ok(&req.id, json!({ "registrations": registrations })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}
