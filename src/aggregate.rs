use rusqlite::{Connection, OptionalExtension};

use crate::errors::{EngineError, EngineResult};
use crate::grading::{self, GpaTotals};

/// One graded registration as seen by the aggregators.
struct GradedRow {
    registration_id: String,
    credit_units: Option<i64>,
    grade_point: f64,
}

fn require_student(conn: &Connection, student_id: &str) -> EngineResult<()> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    if hit.is_some() {
        Ok(())
    } else {
        Err(EngineError::not_found(format!(
            "student {} not found",
            student_id
        )))
    }
}

fn weigh(rows: Vec<GradedRow>) -> EngineResult<Option<GpaTotals>> {
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let units = match row.credit_units {
            Some(u) if u > 0 => u,
            _ => {
                return Err(EngineError::inconsistency(format!(
                    "registration {} has a result but no usable credit units",
                    row.registration_id
                )))
            }
        };
        items.push((row.grade_point, units));
    }
    Ok(grading::weighted_gpa(items))
}

/// Recomputes one student's GPA for one (session, semester) from scratch and
/// fully replaces the stored aggregate. No graded registration with credit
/// means no stored row at all. Idempotent by construction: the output is a
/// pure function of the current result rows.
pub fn recompute_semester_gpa(
    conn: &Connection,
    student_id: &str,
    session_id: &str,
    semester_id: &str,
) -> EngineResult<Option<GpaTotals>> {
    require_student(conn, student_id)?;

    let mut stmt = conn.prepare(
        "SELECT cr.id, cr.credit_units, r.grade_point
         FROM course_registrations cr
         JOIN results r ON r.registration_id = cr.id
         WHERE cr.student_id = ? AND cr.session_id = ? AND cr.semester_id = ?",
    )?;
    let rows = stmt
        .query_map((student_id, session_id, semester_id), |r| {
            Ok(GradedRow {
                registration_id: r.get(0)?,
                credit_units: r.get(1)?,
                grade_point: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let totals = weigh(rows)?;

    conn.execute(
        "DELETE FROM semester_gpas
         WHERE student_id = ? AND session_id = ? AND semester_id = ?",
        (student_id, session_id, semester_id),
    )?;
    if let Some(t) = totals {
        conn.execute(
            "INSERT INTO semester_gpas(
                student_id, session_id, semester_id,
                total_credit_units, total_grade_points, gpa, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (
                student_id,
                session_id,
                semester_id,
                t.total_credit_units,
                t.total_grade_points,
                t.gpa,
            ),
        )?;
    }

    Ok(totals)
}

/// Same algorithm as the semester recompute, scanned over every period the
/// student has. Invoked after every semester recompute for the student so
/// the two caches never diverge.
pub fn recompute_cumulative_gpa(
    conn: &Connection,
    student_id: &str,
) -> EngineResult<Option<GpaTotals>> {
    require_student(conn, student_id)?;

    let mut stmt = conn.prepare(
        "SELECT cr.id, cr.credit_units, r.grade_point
         FROM course_registrations cr
         JOIN results r ON r.registration_id = cr.id
         WHERE cr.student_id = ?",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(GradedRow {
                registration_id: r.get(0)?,
                credit_units: r.get(1)?,
                grade_point: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let totals = weigh(rows)?;

    conn.execute(
        "DELETE FROM cumulative_gpas WHERE student_id = ?",
        [student_id],
    )?;
    if let Some(t) = totals {
        conn.execute(
            "INSERT INTO cumulative_gpas(
                student_id, total_credit_units, total_grade_points, gpa, updated_at)
             VALUES (?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (
                student_id,
                t.total_credit_units,
                t.total_grade_points,
                t.gpa,
            ),
        )?;
    }

    Ok(totals)
}

pub fn stored_semester_gpa(
    conn: &Connection,
    student_id: &str,
    session_id: &str,
    semester_id: &str,
) -> EngineResult<Option<GpaTotals>> {
    let row = conn
        .query_row(
            "SELECT total_credit_units, total_grade_points, gpa
             FROM semester_gpas
             WHERE student_id = ? AND session_id = ? AND semester_id = ?",
            (student_id, session_id, semester_id),
            |r| {
                Ok(GpaTotals {
                    total_credit_units: r.get(0)?,
                    total_grade_points: r.get(1)?,
                    gpa: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn stored_cumulative_gpa(
    conn: &Connection,
    student_id: &str,
) -> EngineResult<Option<GpaTotals>> {
    let row = conn
        .query_row(
            "SELECT total_credit_units, total_grade_points, gpa
             FROM cumulative_gpas
             WHERE student_id = ?",
            [student_id],
            |r| {
                Ok(GpaTotals {
                    total_credit_units: r.get(0)?,
                    total_grade_points: r.get(1)?,
                    gpa: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
