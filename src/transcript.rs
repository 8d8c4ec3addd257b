use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::aggregate;
use crate::errors::{EngineError, EngineResult};
use crate::grading::{self, GpaTotals};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptStudent {
    pub student_id: String,
    pub matric_number: String,
    pub last_name: String,
    pub first_name: String,
}

/// One registration line. `grade`/`gradePoint`/`remark` are present exactly
/// when a result exists; an ungraded registration appears as a pending row,
/// never as a zero score.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRow {
    pub course_code: String,
    pub course_title: String,
    pub credit_units: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterSection {
    pub semester_id: String,
    pub semester_name: String,
    pub sequence: i64,
    pub rows: Vec<TranscriptRow>,
    pub semester_gpa: Option<GpaTotals>,
    /// Weighted totals over every graded row up to and including this
    /// semester, in transcript order.
    pub running: Option<GpaTotals>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSection {
    pub session_id: String,
    pub session_name: String,
    pub semesters: Vec<SemesterSection>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeSummary {
    pub totals: GpaTotals,
    pub classification: &'static str,
    pub academic_standing: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptDocument {
    pub student: TranscriptStudent,
    pub sessions: Vec<SessionSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative: Option<CumulativeSummary>,
    pub generated_at: String,
}

struct HistoryRow {
    session_id: String,
    session_name: String,
    semester_id: String,
    semester_name: String,
    sequence: i64,
    registration_id: String,
    course_code: String,
    course_title: String,
    credit_units: Option<i64>,
    ca_score: Option<f64>,
    exam_score: Option<f64>,
    total_score: Option<f64>,
    grade: Option<String>,
    grade_point: Option<f64>,
    remark: Option<String>,
}

/// Assembles the full printable record for one student: session groups in
/// chronological (name) order, semester groups by sequence, rows by course
/// code, with per-semester GPA, running cumulative totals, and the final
/// CGPA with its derived classification.
///
/// An existing student with no registrations yields an empty document.
pub fn build_transcript(conn: &Connection, student_id: &str) -> EngineResult<TranscriptDocument> {
    let student = conn
        .query_row(
            "SELECT id, matric_number, last_name, first_name
             FROM students WHERE id = ?",
            [student_id],
            |r| {
                Ok(TranscriptStudent {
                    student_id: r.get(0)?,
                    matric_number: r.get(1)?,
                    last_name: r.get(2)?,
                    first_name: r.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| EngineError::not_found(format!("student {} not found", student_id)))?;

    let mut stmt = conn.prepare(
        "SELECT ses.id, ses.name, sem.id, sem.name, sem.sequence,
                cr.id, c.code, c.title, cr.credit_units,
                r.ca_score, r.exam_score, r.total_score, r.grade, r.grade_point, r.remark
         FROM course_registrations cr
         JOIN sessions ses ON ses.id = cr.session_id
         JOIN semesters sem ON sem.id = cr.semester_id
         JOIN courses c ON c.id = cr.course_id
         LEFT JOIN results r ON r.registration_id = cr.id
         WHERE cr.student_id = ?
         ORDER BY ses.name, sem.sequence, c.code",
    )?;
    let history = stmt
        .query_map([student_id], |r| {
            Ok(HistoryRow {
                session_id: r.get(0)?,
                session_name: r.get(1)?,
                semester_id: r.get(2)?,
                semester_name: r.get(3)?,
                sequence: r.get(4)?,
                registration_id: r.get(5)?,
                course_code: r.get(6)?,
                course_title: r.get(7)?,
                credit_units: r.get(8)?,
                ca_score: r.get(9)?,
                exam_score: r.get(10)?,
                total_score: r.get(11)?,
                grade: r.get(12)?,
                grade_point: r.get(13)?,
                remark: r.get(14)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut sessions: Vec<SessionSection> = Vec::new();
    let mut running_items: Vec<(f64, i64)> = Vec::new();

    for row in history {
        if sessions
            .last()
            .map_or(true, |s| s.session_id != row.session_id)
        {
            sessions.push(SessionSection {
                session_id: row.session_id.clone(),
                session_name: row.session_name.clone(),
                semesters: Vec::new(),
            });
        }
        let session = sessions.last_mut().unwrap();

        if session
            .semesters
            .last()
            .map_or(true, |s| s.semester_id != row.semester_id)
        {
            session.semesters.push(SemesterSection {
                semester_id: row.semester_id.clone(),
                semester_name: row.semester_name.clone(),
                sequence: row.sequence,
                rows: Vec::new(),
                semester_gpa: None,
                running: None,
            });
        }
        let semester = session.semesters.last_mut().unwrap();

        let graded = row.grade.is_some();
        if graded {
            let units = match row.credit_units {
                Some(u) if u > 0 => u,
                _ => {
                    return Err(EngineError::inconsistency(format!(
                        "registration {} has a result but no usable credit units",
                        row.registration_id
                    )))
                }
            };
            running_items.push((row.grade_point.unwrap_or(0.0), units));
        }

        semester.rows.push(TranscriptRow {
            course_code: row.course_code,
            course_title: row.course_title,
            credit_units: row.credit_units,
            ca_score: row.ca_score,
            exam_score: row.exam_score,
            total_score: row.total_score,
            grade: row.grade,
            grade_point: row.grade_point,
            remark: row.remark,
            status: if graded { "graded" } else { "pending" },
        });

        semester.running = grading::weighted_gpa(running_items.iter().copied());
    }

    for session in &mut sessions {
        for semester in &mut session.semesters {
            semester.semester_gpa = aggregate::stored_semester_gpa(
                conn,
                student_id,
                &session.session_id,
                &semester.semester_id,
            )?;
        }
    }

    let cumulative = aggregate::stored_cumulative_gpa(conn, student_id)?.map(|totals| {
        CumulativeSummary {
            classification: grading::Classification::from_cgpa(totals.gpa).label(),
            academic_standing: grading::academic_standing(totals.gpa),
            totals,
        }
    });

    Ok(TranscriptDocument {
        student,
        sessions,
        cumulative,
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    })
}
