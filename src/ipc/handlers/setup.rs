use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use super::{db_conn, required_i64, required_str};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.create" => Some(create_session(state, req)),
        "semesters.create" => Some(create_semester(state, req)),
        "courses.create" => Some(create_course(state, req)),
        "courses.list" => Some(list_courses(state, req)),
        "students.create" => Some(create_student(state, req)),
        "students.list" => Some(list_students(state, req)),
        _ => None,
    }
}

fn create_session(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let existing: Result<Option<String>, _> = conn
        .query_row("SELECT id FROM sessions WHERE name = ?", [&name], |r| {
            r.get(0)
        })
        .optional();
    match existing {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "conflict",
                format!("session {} already exists", name),
                None,
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute("INSERT INTO sessions(id, name) VALUES (?, ?)", (&id, &name)) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "sessionId": id, "name": name }))
}

fn create_semester(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sequence = match required_i64(req, "sequence") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if sequence < 1 {
        return err(&req.id, "bad_params", "sequence must be >= 1", None);
    }

    let existing: Result<Option<String>, _> = conn
        .query_row(
            "SELECT id FROM semesters WHERE sequence = ?",
            [sequence],
            |r| r.get(0),
        )
        .optional();
    match existing {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "conflict",
                format!("semester with sequence {} already exists", sequence),
                None,
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO semesters(id, name, sequence) VALUES (?, ?, ?)",
        (&id, &name, sequence),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "semesterId": id, "name": name, "sequence": sequence }),
    )
}

fn create_course(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let credit_units = match required_i64(req, "creditUnits") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if credit_units < 1 {
        return err(&req.id, "bad_params", "creditUnits must be >= 1", None);
    }

    let existing: Result<Option<String>, _> = conn
        .query_row("SELECT id FROM courses WHERE code = ?", [&code], |r| {
            r.get(0)
        })
        .optional();
    match existing {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "conflict",
                format!("course {} already exists", code),
                None,
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, code, title, credit_units) VALUES (?, ?, ?, ?)",
        (&id, &code, &title, credit_units),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "courseId": id, "code": code, "title": title, "creditUnits": credit_units }),
    )
}

fn list_courses(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    let mut stmt = match conn
        .prepare("SELECT id, code, title, credit_units FROM courses ORDER BY code")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let title: String = row.get(2)?;
            let credit_units: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "code": code,
                "title": title,
                "creditUnits": credit_units
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn create_student(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let matric_number = match required_str(req, "matricNumber") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let existing: Result<Option<String>, _> = conn
        .query_row(
            "SELECT id FROM students WHERE matric_number = ?",
            [&matric_number],
            |r| r.get(0),
        )
        .optional();
    match existing {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "conflict",
                format!("student {} already exists", matric_number),
                None,
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, matric_number, last_name, first_name, updated_at)
         VALUES (?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&id, &matric_number, &last_name, &first_name),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({
            "studentId": id,
            "matricNumber": matric_number,
            "lastName": last_name,
            "firstName": first_name
        }),
    )
}

fn list_students(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, matric_number, last_name, first_name
         FROM students
         ORDER BY matric_number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let matric_number: String = row.get(1)?;
            let last_name: String = row.get(2)?;
            let first_name: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "matricNumber": matric_number,
                "lastName": last_name,
                "firstName": first_name
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}
