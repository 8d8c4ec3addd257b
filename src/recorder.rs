use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate;
use crate::errors::{EngineError, EngineResult};
use crate::grading::{self, GpaTotals};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResult {
    pub id: String,
    pub registration_id: String,
    pub ca_score: f64,
    pub exam_score: f64,
    pub total_score: f64,
    pub grade: String,
    pub grade_point: f64,
    pub remark: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub student_id: String,
    pub session_id: String,
    pub semester_id: String,
    pub result: StoredResult,
    pub semester_gpa: Option<GpaTotals>,
    pub cumulative_gpa: Option<GpaTotals>,
}

struct RegistrationRef {
    student_id: String,
    session_id: String,
    semester_id: String,
}

fn find_registration(
    conn: &Connection,
    registration_id: &str,
) -> EngineResult<RegistrationRef> {
    conn.query_row(
        "SELECT student_id, session_id, semester_id
         FROM course_registrations
         WHERE id = ?",
        [registration_id],
        |r| {
            Ok(RegistrationRef {
                student_id: r.get(0)?,
                session_id: r.get(1)?,
                semester_id: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| {
        EngineError::not_found(format!("registration {} not found", registration_id))
    })
}

fn validate_component(name: &str, value: f64, max: f64) -> EngineResult<()> {
    if !value.is_finite() || !(0.0..=max).contains(&value) {
        return Err(EngineError::validation(format!(
            "{} {} is outside [0, {}]",
            name, value, max
        )));
    }
    Ok(())
}

/// Writes one result row for a registration without touching the aggregate
/// caches. Insert and correction go through the same derivation, and the row
/// is written whole: every derived column comes from one `classify` call.
///
/// Callers own the recompute obligation: `record_result` runs it inline, the
/// bulk importer batches it per student.
pub(crate) fn write_result(
    conn: &Connection,
    registration_id: &str,
    ca_score: f64,
    exam_score: f64,
) -> EngineResult<StoredResult> {
    validate_component("ca score", ca_score, grading::MAX_CA_SCORE)?;
    validate_component("exam score", exam_score, grading::MAX_EXAM_SCORE)?;

    let total_score = ca_score + exam_score;
    let band = grading::classify(total_score)?;

    conn.execute(
        "INSERT INTO results(
            id, registration_id, ca_score, exam_score, total_score,
            grade, grade_point, remark, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
         ON CONFLICT(registration_id) DO UPDATE SET
            ca_score = excluded.ca_score,
            exam_score = excluded.exam_score,
            total_score = excluded.total_score,
            grade = excluded.grade,
            grade_point = excluded.grade_point,
            remark = excluded.remark,
            updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            registration_id,
            ca_score,
            exam_score,
            total_score,
            band.grade,
            band.grade_point,
            band.remark,
        ),
    )?;

    let id: String = conn.query_row(
        "SELECT id FROM results WHERE registration_id = ?",
        [registration_id],
        |r| r.get(0),
    )?;

    Ok(StoredResult {
        id,
        registration_id: registration_id.to_string(),
        ca_score,
        exam_score,
        total_score,
        grade: band.grade.to_string(),
        grade_point: band.grade_point,
        remark: band.remark.to_string(),
    })
}

/// Records (or corrects) one course result and brings both GPA caches up to
/// date in the same transaction. A caller can never observe a result row
/// without matching aggregates: any failure rolls the whole unit back.
pub fn record_result(
    conn: &Connection,
    registration_id: &str,
    ca_score: f64,
    exam_score: f64,
) -> EngineResult<RecordOutcome> {
    let tx = conn.unchecked_transaction()?;

    let reg = find_registration(&tx, registration_id)?;
    let result = write_result(&tx, registration_id, ca_score, exam_score)?;
    let semester_gpa = aggregate::recompute_semester_gpa(
        &tx,
        &reg.student_id,
        &reg.session_id,
        &reg.semester_id,
    )?;
    let cumulative_gpa = aggregate::recompute_cumulative_gpa(&tx, &reg.student_id)?;

    tx.commit()?;

    Ok(RecordOutcome {
        student_id: reg.student_id,
        session_id: reg.session_id,
        semester_id: reg.semester_id,
        result,
        semester_gpa,
        cumulative_gpa,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn seeded_conn(prefix: &str) -> Connection {
        let conn = db::open_db(&temp_workspace(prefix)).expect("open");
        conn.execute_batch(
            "INSERT INTO sessions(id, name) VALUES ('sess-1', '2023/2024');
             INSERT INTO semesters(id, name, sequence) VALUES ('sem-1', 'First Semester', 1);
             INSERT INTO courses(id, code, title, credit_units)
                 VALUES ('crs-1', 'CSC101', 'Intro to Computing', 3);
             INSERT INTO students(id, matric_number, last_name, first_name)
                 VALUES ('stu-1', 'U2023/001', 'Ade', 'Bola');
             INSERT INTO course_registrations(id, student_id, course_id, session_id, semester_id, credit_units)
                 VALUES ('reg-1', 'stu-1', 'crs-1', 'sess-1', 'sem-1', 3);",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn record_derives_grade_and_refreshes_both_caches() {
        let conn = seeded_conn("resultd-rec-basic");
        let out = record_result(&conn, "reg-1", 30.0, 42.0).expect("record");

        assert_eq!(out.result.total_score, 72.0);
        assert_eq!(out.result.grade, "A");
        assert_eq!(out.result.remark, "Excellent");
        let sem = out.semester_gpa.expect("semester gpa");
        assert!((sem.gpa - 5.0).abs() < 1e-9);
        let cum = out.cumulative_gpa.expect("cumulative gpa");
        assert_eq!(cum.total_credit_units, 3);
    }

    #[test]
    fn correction_replaces_the_old_contribution() {
        let conn = seeded_conn("resultd-rec-edit");
        let first = record_result(&conn, "reg-1", 30.0, 42.0).expect("first");
        let second = record_result(&conn, "reg-1", 20.0, 35.0).expect("second");

        // Same row, rederived fields, no leftover weight from the old score.
        assert_eq!(first.result.id, second.result.id);
        assert_eq!(second.result.total_score, 55.0);
        assert_eq!(second.result.grade, "C");
        let sem = second.semester_gpa.expect("semester gpa");
        assert!((sem.gpa - 3.0).abs() < 1e-9);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM results", [], |r| r.get(0))
            .expect("count");
        assert_eq!(rows, 1);
    }

    #[test]
    fn out_of_range_scores_write_nothing() {
        let conn = seeded_conn("resultd-rec-range");
        for (ca, exam) in [(-1.0, 10.0), (41.0, 10.0), (10.0, 60.5), (10.0, -0.1)] {
            let err = record_result(&conn, "reg-1", ca, exam).expect_err("must reject");
            assert_eq!(err.code(), "validation_error");
        }
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM results", [], |r| r.get(0))
            .expect("count");
        assert_eq!(rows, 0);
    }

    #[test]
    fn unknown_registration_is_not_found() {
        let conn = seeded_conn("resultd-rec-missing");
        let err = record_result(&conn, "reg-ghost", 10.0, 10.0).expect_err("must fail");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn inconsistent_units_roll_back_the_result_write() {
        let conn = seeded_conn("resultd-rec-rollback");
        conn.execute(
            "UPDATE course_registrations SET credit_units = NULL WHERE id = 'reg-1'",
            [],
        )
        .expect("damage row");

        let err = record_result(&conn, "reg-1", 30.0, 42.0).expect_err("must fail");
        assert_eq!(err.code(), "aggregation_inconsistency");

        // The unit of work rolled back: no result row without aggregates.
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM results", [], |r| r.get(0))
            .expect("count");
        assert_eq!(rows, 0);
    }
}
