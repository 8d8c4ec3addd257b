use serde_json::json;
use tracing::{info, warn};

use super::{db_conn, required_f64, required_str};
use crate::import::{self, ImportRow};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::{aggregate, recorder};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.record" => Some(record(state, req)),
        "results.import" => Some(import_batch(state, req)),
        "gpa.recomputeSemester" => Some(recompute_semester(state, req)),
        "gpa.recomputeCumulative" => Some(recompute_cumulative(state, req)),
        _ => None,
    }
}

fn record(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let registration_id = match required_str(req, "registrationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ca_score = match required_f64(req, "caScore") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let exam_score = match required_f64(req, "examScore") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match recorder::record_result(conn, &registration_id, ca_score, exam_score) {
        Ok(outcome) => {
            info!(
                registration = %registration_id,
                grade = %outcome.result.grade,
                "result recorded"
            );
            match serde_json::to_value(&outcome) {
                Ok(v) => ok(&req.id, v),
                Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
            }
        }
        Err(e) => engine_err(&req.id, &e),
    }
}

fn import_batch(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
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
    let Some(raw_rows) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "rows must be an array", None);
    };

    let rows: Vec<_> = raw_rows.iter().map(ImportRow::from_json).collect();

    match import::import_results(conn, &session_id, &semester_id, &rows) {
        Ok(report) => {
            if report.skipped > 0 {
                warn!(
                    succeeded = report.succeeded,
                    skipped = report.skipped,
                    "import finished with skipped rows"
                );
            } else {
                info!(succeeded = report.succeeded, "import finished");
            }
            match serde_json::to_value(&report) {
                Ok(v) => ok(&req.id, v),
                Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
            }
        }
        Err(e) => engine_err(&req.id, &e),
    }
}

fn recompute_semester(state: &AppState, req: &Request) -> serde_json::Value {
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

    match aggregate::recompute_semester_gpa(conn, &student_id, &session_id, &semester_id) {
        Ok(totals) => ok(&req.id, json!({ "semesterGpa": totals })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn recompute_cumulative(state: &AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match aggregate::recompute_cumulative_gpa(conn, &student_id) {
        Ok(totals) => ok(&req.id, json!({ "cumulativeGpa": totals })),
        Err(e) => engine_err(&req.id, &e),
    }
}
