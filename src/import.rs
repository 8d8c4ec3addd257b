use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::aggregate;
use crate::errors::{EngineError, EngineResult};
use crate::recorder;

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub matric_number: String,
    pub course_code: String,
    pub ca_score: f64,
    pub exam_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

fn lookup_ci<'a>(obj: &'a serde_json::Map<String, serde_json::Value>, header: &str) -> Option<&'a serde_json::Value> {
    let wanted = normalize_header(header);
    obj.iter()
        .find(|(k, _)| normalize_header(k) == wanted)
        .map(|(_, v)| v)
}

/// Header matching is case-insensitive and tolerant of the usual separator
/// spellings, so `matricNumber`, `matric_number` and `MATRIC NUMBER` all
/// name the same column.
fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl ImportRow {
    /// Parses one uploaded row. Columns are matched by header name,
    /// order-independent; fails with `validation_error` naming the missing
    /// or malformed column.
    pub fn from_json(value: &serde_json::Value) -> EngineResult<ImportRow> {
        let obj = value
            .as_object()
            .ok_or_else(|| EngineError::validation("row must be an object"))?;

        let text = |header: &str| -> EngineResult<String> {
            let v = lookup_ci(obj, header)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    EngineError::validation(format!("missing or empty column {}", header))
                })?;
            Ok(v)
        };
        let number = |header: &str| -> EngineResult<f64> {
            let raw = lookup_ci(obj, header).ok_or_else(|| {
                EngineError::validation(format!("missing column {}", header))
            })?;
            match raw {
                serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
                    EngineError::validation(format!("column {} is not a number", header))
                }),
                serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                    EngineError::validation(format!("column {} is not a number", header))
                }),
                _ => Err(EngineError::validation(format!(
                    "column {} is not a number",
                    header
                ))),
            }
        };

        Ok(ImportRow {
            matric_number: text("matricNumber")?,
            course_code: text("courseCode")?,
            ca_score: number("caScore")?,
            exam_score: number("examScore")?,
        })
    }
}

fn resolve_registration(
    conn: &Connection,
    row: &ImportRow,
    session_id: &str,
    semester_id: &str,
) -> EngineResult<(String, String)> {
    let hit: Option<(String, String)> = conn
        .query_row(
            "SELECT cr.id, cr.student_id
             FROM course_registrations cr
             JOIN students s ON s.id = cr.student_id
             JOIN courses c ON c.id = cr.course_id
             WHERE s.matric_number = ? AND c.code = ?
               AND cr.session_id = ? AND cr.semester_id = ?",
            (
                &row.matric_number,
                &row.course_code,
                session_id,
                semester_id,
            ),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    hit.ok_or_else(|| {
        EngineError::not_found(format!(
            "no registration for {} in {}",
            row.matric_number, row.course_code
        ))
    })
}

/// Drives the recorder over a whole uploaded batch. Row-level failures are
/// collected and reported, never fatal; aggregates are recomputed once per
/// distinct student after the loop, and the entire batch is one transaction
/// so a store failure leaves nothing half-applied.
pub fn import_results(
    conn: &Connection,
    session_id: &str,
    semester_id: &str,
    rows: &[EngineResult<ImportRow>],
) -> EngineResult<ImportReport> {
    let session_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM sessions WHERE id = ?", [session_id], |r| {
            r.get(0)
        })
        .optional()?;
    if session_exists.is_none() {
        return Err(EngineError::not_found(format!(
            "session {} not found",
            session_id
        )));
    }
    let semester_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM semesters WHERE id = ?", [semester_id], |r| {
            r.get(0)
        })
        .optional()?;
    if semester_exists.is_none() {
        return Err(EngineError::not_found(format!(
            "semester {} not found",
            semester_id
        )));
    }

    let tx = conn.unchecked_transaction()?;

    let mut succeeded = 0_usize;
    let mut errors: Vec<String> = Vec::new();
    // BTreeSet keeps the post-batch recompute order deterministic.
    let mut touched: BTreeSet<String> = BTreeSet::new();

    for (index, parsed) in rows.iter().enumerate() {
        let line = index + 1;
        let row = match parsed {
            Ok(row) => row,
            Err(e) => {
                errors.push(format!("row {}: {}", line, e));
                continue;
            }
        };

        let registration = match resolve_registration(&tx, row, session_id, semester_id) {
            Ok(pair) => pair,
            Err(e) if e.is_row_level() => {
                errors.push(format!(
                    "row {} ({}/{}): {}",
                    line, row.matric_number, row.course_code, e
                ));
                continue;
            }
            Err(e) => return Err(e),
        };
        let (registration_id, student_id) = registration;

        match recorder::write_result(&tx, &registration_id, row.ca_score, row.exam_score) {
            Ok(_) => {
                succeeded += 1;
                touched.insert(student_id);
            }
            Err(e) if e.is_row_level() => {
                errors.push(format!(
                    "row {} ({}/{}): {}",
                    line, row.matric_number, row.course_code, e
                ));
            }
            Err(e) => return Err(e),
        }
    }

    // One recompute per distinct student touched, not one per row.
    for student_id in &touched {
        aggregate::recompute_semester_gpa(&tx, student_id, session_id, semester_id)?;
        aggregate::recompute_cumulative_gpa(&tx, student_id)?;
    }

    tx.commit()?;

    Ok(ImportReport {
        succeeded,
        skipped: errors.len(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn headers_match_case_insensitively() {
        let spellings = [
            json!({ "matricNumber": "U1", "courseCode": "CSC101", "caScore": 30, "examScore": 40 }),
            json!({ "matric_number": "U1", "course_code": "CSC101", "ca_score": 30, "exam_score": 40 }),
            json!({ "MATRIC NUMBER": "U1", "COURSE-CODE": "CSC101", "CA SCORE": "30", "EXAM SCORE": "40" }),
        ];
        for raw in &spellings {
            let row = ImportRow::from_json(raw).expect("parse");
            assert_eq!(row.matric_number, "U1");
            assert_eq!(row.course_code, "CSC101");
            assert_eq!(row.ca_score, 30.0);
            assert_eq!(row.exam_score, 40.0);
        }
    }

    #[test]
    fn missing_column_names_the_header() {
        let raw = json!({ "matricNumber": "U1", "caScore": 30, "examScore": 40 });
        let err = ImportRow::from_json(&raw).expect_err("must fail");
        assert_eq!(err.code(), "validation_error");
        assert!(err.to_string().contains("courseCode"), "{}", err);
    }

    #[test]
    fn non_numeric_score_is_rejected() {
        let raw = json!({
            "matricNumber": "U1", "courseCode": "CSC101",
            "caScore": "abc", "examScore": 40
        });
        let err = ImportRow::from_json(&raw).expect_err("must fail");
        assert_eq!(err.code(), "validation_error");
    }
}
