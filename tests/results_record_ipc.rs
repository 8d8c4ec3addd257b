use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Setup {
    session_id: String,
    semester_id: String,
    student_id: String,
    registration_id: String,
}

fn seed_one_registration(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> Setup {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let session_id = request_ok(
        stdin,
        reader,
        "s1",
        "sessions.create",
        json!({ "name": "2023/2024" }),
    )["sessionId"]
        .as_str()
        .expect("sessionId")
        .to_string();
    let semester_id = request_ok(
        stdin,
        reader,
        "s2",
        "semesters.create",
        json!({ "name": "First Semester", "sequence": 1 }),
    )["semesterId"]
        .as_str()
        .expect("semesterId")
        .to_string();
    let course_id = request_ok(
        stdin,
        reader,
        "s3",
        "courses.create",
        json!({ "code": "CSC101", "title": "Intro to Computing", "creditUnits": 3 }),
    )["courseId"]
        .as_str()
        .expect("courseId")
        .to_string();
    let student_id = request_ok(
        stdin,
        reader,
        "s4",
        "students.create",
        json!({ "matricNumber": "U2023/001", "lastName": "Ade", "firstName": "Bola" }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();
    let registration_id = request_ok(
        stdin,
        reader,
        "s5",
        "registrations.create",
        json!({
            "studentId": student_id,
            "courseId": course_id,
            "sessionId": session_id,
            "semesterId": semester_id
        }),
    )["registrationId"]
        .as_str()
        .expect("registrationId")
        .to_string();

    Setup {
        session_id,
        semester_id,
        student_id,
        registration_id,
    }
}

#[test]
fn record_result_derives_grade_and_aggregates() {
    let workspace = temp_dir("resultd-record-basic");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let setup = seed_one_registration(&mut stdin, &mut reader, &workspace);

    let out = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "results.record",
        json!({
            "registrationId": setup.registration_id,
            "caScore": 30,
            "examScore": 42
        }),
    );

    assert_eq!(out["result"]["totalScore"], json!(72.0));
    assert_eq!(out["result"]["grade"], json!("A"));
    assert_eq!(out["result"]["gradePoint"], json!(5.0));
    assert_eq!(out["result"]["remark"], json!("Excellent"));
    assert_eq!(out["studentId"].as_str(), Some(setup.student_id.as_str()));
    assert_eq!(out["semesterGpa"]["gpa"], json!(5.0));
    assert_eq!(out["semesterGpa"]["totalCreditUnits"], json!(3));
    assert_eq!(out["cumulativeGpa"]["gpa"], json!(5.0));

    let _ = child.kill();
}

#[test]
fn editing_a_result_replaces_the_old_contribution() {
    let workspace = temp_dir("resultd-record-edit");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let setup = seed_one_registration(&mut stdin, &mut reader, &workspace);

    request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "results.record",
        json!({
            "registrationId": setup.registration_id,
            "caScore": 30,
            "examScore": 42
        }),
    );
    let out = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "results.record",
        json!({
            "registrationId": setup.registration_id,
            "caScore": 20,
            "examScore": 35
        }),
    );

    // 55 total => C / 3.0, and the aggregates carry only the new score.
    assert_eq!(out["result"]["grade"], json!("C"));
    assert_eq!(out["semesterGpa"]["gpa"], json!(3.0));
    assert_eq!(out["cumulativeGpa"]["gpa"], json!(3.0));

    let recomputed = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "gpa.recomputeSemester",
        json!({
            "studentId": setup.student_id,
            "sessionId": setup.session_id,
            "semesterId": setup.semester_id
        }),
    );
    assert_eq!(recomputed["semesterGpa"]["gpa"], json!(3.0));

    let _ = child.kill();
}

#[test]
fn out_of_range_scores_are_rejected_without_side_effects() {
    let workspace = temp_dir("resultd-record-invalid");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let setup = seed_one_registration(&mut stdin, &mut reader, &workspace);

    for (i, (ca, exam)) in [(41.0, 10.0), (-1.0, 10.0), (10.0, 61.0), (10.0, -0.5)]
        .iter()
        .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "results.record",
            json!({
                "registrationId": setup.registration_id,
                "caScore": ca,
                "examScore": exam
            }),
        );
        assert_eq!(resp["ok"], json!(false));
        assert_eq!(resp["error"]["code"], json!("validation_error"));
    }

    // Nothing was written: the semester has no aggregate at all.
    let recomputed = request_ok(
        &mut stdin,
        &mut reader,
        "chk",
        "gpa.recomputeSemester",
        json!({
            "studentId": setup.student_id,
            "sessionId": setup.session_id,
            "semesterId": setup.semester_id
        }),
    );
    assert_eq!(recomputed["semesterGpa"], json!(null));

    let _ = child.kill();
}

#[test]
fn unknown_registration_is_not_found() {
    let workspace = temp_dir("resultd-record-missing");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seed_one_registration(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "r1",
        "results.record",
        json!({
            "registrationId": "no-such-registration",
            "caScore": 10,
            "examScore": 10
        }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("not_found"));

    let _ = child.kill();
}
