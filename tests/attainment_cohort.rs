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
    let exe = env!("CARGO_BIN_EXE_attaind");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attaind");
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
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn f(value: &serde_json::Value, pointer: &str) -> f64 {
    value
        .pointer(pointer)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("missing number at {}: {}", pointer, value))
}

fn range_count(row: &serde_json::Value, range: &str) -> u64 {
    row["rangeDistribution"]
        .as_array()
        .expect("rangeDistribution")
        .iter()
        .find(|r| r["range"].as_str() == Some(range))
        .and_then(|r| r["count"].as_u64())
        .unwrap_or_else(|| panic!("no {} bucket", range))
}

/// Ten students on one ILO: seven full marks, three at half marks.
fn cohort_snapshot() -> serde_json::Value {
    let students: Vec<serde_json::Value> = (0..10)
        .map(|i| json!({ "id": format!("s{}", i), "displayName": format!("Student {}", i) }))
        .collect();
    let scores: Vec<serde_json::Value> = (0..10)
        .map(|i| {
            json!({
                "assessmentId": "quiz-1",
                "studentId": format!("s{}", i),
                "rawScore": if i < 7 { 10 } else { 5 },
                "submissionStatus": "ontime"
            })
        })
        .collect();
    json!({
        "courseId": "cpe-101",
        "assessments": [
            { "id": "quiz-1", "title": "Quiz 1", "totalPoints": 10, "weightPercentage": 100, "taskCode": "T1" },
            { "id": "lab-1", "title": "Laboratory Activity 1", "totalPoints": 20, "weightPercentage": 0, "taskCode": "T2" }
        ],
        "students": students,
        "scores": scores,
        "ilos": [{
            "id": "ilo-1",
            "code": "ILO1",
            "description": "Apply Control Structures",
            "mappings": [
                { "referenceType": "SO", "referenceId": "so-1", "taskCodes": ["t1"] },
                { "referenceType": "SDG", "referenceId": "sdg-4", "code": "SDG4", "taskCodes": ["T1"] }
            ]
        }],
        "references": [
            { "referenceType": "SO", "referenceId": "so-1", "code": "SO1", "description": "Engineering design" }
        ]
    })
}

#[test]
fn seven_of_ten_attained_is_seventy_percent() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "engine.evaluate",
        json!({ "snapshot": cohort_snapshot() }),
    );
    assert_eq!(result["inputKey"].as_str().map(|k| k.len()), Some(64));

    let row = result
        .pointer("/attainment/iloAttainment/0")
        .expect("summary row");
    assert_eq!(row["totalStudents"].as_u64(), Some(10));
    assert_eq!(row["attainedCount"].as_u64(), Some(7));
    assert!((f(row, "/attainmentPercentage") - 70.0).abs() < 1e-9);
    assert_eq!(row["highPerformerCount"].as_u64(), Some(7));
    assert_eq!(row["lowPerformerCount"].as_u64(), Some(3));
    assert_eq!(range_count(row, "90-100"), 7);
    assert_eq!(range_count(row, "50-59"), 3);
    let bucket_total: u64 = row["rangeDistribution"]
        .as_array()
        .expect("rangeDistribution")
        .iter()
        .filter_map(|r| r["count"].as_u64())
        .sum();
    assert_eq!(bucket_total, 10);

    let interpretation: Vec<&str> = result
        .pointer("/attainment/interpretation")
        .and_then(|v| v.as_array())
        .expect("interpretation")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(interpretation, vec!["1 ILO(s) did not meet the 75% threshold."]);

    // Catalog fills in SO1; SDG4 comes from the mapping itself.
    let labels: Vec<&str> = result["combinations"]
        .as_array()
        .expect("combinations")
        .iter()
        .filter_map(|c| c["combinationLabel"].as_str())
        .collect();
    assert_eq!(labels, vec!["ILO1 - SO1", "ILO1 - SDG4"]);
    assert_eq!(
        result.pointer("/combinations/0/combinationKey").and_then(|v| v.as_str()),
        Some("ilo-1_so-1")
    );

    // Full marks on Quiz 1, absent lab: 100 * 0.625 + 37.5 = 100 transmuted.
    let top = result.pointer("/grades/students/0").expect("first grade");
    assert!((f(top, "/finalPercentage") - 100.0).abs() < 1e-9);
    assert!((f(top, "/numericGrade") - 1.0).abs() < 1e-9);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn request_thresholds_override_workspace_defaults() {
    let workspace = temp_dir("attaind-cohort-thresholds");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let defaults = request_ok(&mut stdin, &mut reader, "g0", "settings.thresholds.get", json!({}));
    assert!((f(&defaults, "/thresholds/pass") - 75.0).abs() < 1e-9);
    assert!((f(&defaults, "/thresholds/high") - 80.0).abs() < 1e-9);

    request_ok(
        &mut stdin,
        &mut reader,
        "set",
        "settings.thresholds.set",
        json!({ "thresholds": { "pass": 50 } }),
    );
    let stored = request_ok(&mut stdin, &mut reader, "g1", "settings.thresholds.get", json!({}));
    assert!((f(&stored, "/thresholds/pass") - 50.0).abs() < 1e-9);
    assert!((f(&stored, "/thresholds/low") - 75.0).abs() < 1e-9);

    let lenient = request_ok(
        &mut stdin,
        &mut reader,
        "e1",
        "engine.evaluate",
        json!({ "snapshot": cohort_snapshot() }),
    );
    assert!((f(&lenient, "/attainment/iloAttainment/0/attainmentPercentage") - 100.0).abs() < 1e-9);
    let interpretation = lenient
        .pointer("/attainment/interpretation")
        .and_then(|v| v.as_array())
        .expect("interpretation");
    assert_eq!(
        interpretation[0].as_str(),
        Some("All ILOs are successfully attained.")
    );
    assert_eq!(
        interpretation[1].as_str(),
        Some("ILO1 (100%) reflects students' full proficiency in apply control structures.")
    );

    let strict = request_ok(
        &mut stdin,
        &mut reader,
        "e2",
        "engine.evaluate",
        json!({ "snapshot": cohort_snapshot(), "thresholds": { "pass": 90 } }),
    );
    assert!((f(&strict, "/attainment/iloAttainment/0/attainmentPercentage") - 70.0).abs() < 1e-9);
    assert_ne!(strict["inputKey"], lenient["inputKey"]);

    let invalid = request(
        &mut stdin,
        &mut reader,
        "e3",
        "engine.evaluate",
        json!({ "snapshot": cohort_snapshot(), "thresholds": { "pass": 140 } }),
    );
    assert_eq!(
        invalid.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_config")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn stored_course_supports_lens_filter_and_coverage() {
    let workspace = temp_dir("attaind-cohort-store");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let snapshot = cohort_snapshot();
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "c",
        "courses.create",
        json!({ "code": "CPE 101", "title": "Programming Logic" }),
    );
    let course_id = course["courseId"].as_str().expect("courseId").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "s",
        "students.upsert",
        json!({ "courseId": course_id, "students": snapshot["students"] }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "a",
        "assessments.upsert",
        json!({ "courseId": course_id, "assessments": snapshot["assessments"] }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "r",
        "references.upsert",
        json!({ "references": snapshot["references"] }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "i",
        "ilos.upsert",
        json!({ "courseId": course_id, "ilos": snapshot["ilos"] }),
    );
    let grades: Vec<serde_json::Value> = (0..10)
        .map(|i| {
            json!({
                "studentId": format!("s{}", i),
                "rawScore": if i < 7 { 10 } else { 5 },
                "submissionStatus": "ontime"
            })
        })
        .collect();
    request_ok(
        &mut stdin,
        &mut reader,
        "sc",
        "scores.submit",
        json!({ "assessmentId": "quiz-1", "grades": grades }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "sum",
        "attainment.summary",
        json!({ "courseId": course_id }),
    );
    assert!((f(&summary, "/overallAttainmentRate") - 70.0).abs() < 1e-9);
    assert_eq!(summary["totalIlos"].as_u64(), Some(1));

    let low = request_ok(
        &mut stdin,
        &mut reader,
        "ilo",
        "attainment.ilo",
        json!({
            "courseId": course_id,
            "iloId": "ilo-1",
            "referenceType": "SO",
            "referenceId": "so-1",
            "performanceFilter": "low"
        }),
    );
    assert_eq!(low["students"].as_array().map(|v| v.len()), Some(3));
    assert_eq!(low["totalStudents"].as_u64(), Some(10));
    let contributing: Vec<&str> = low["assessments"]
        .as_array()
        .expect("assessments")
        .iter()
        .filter_map(|a| a["assessmentId"].as_str())
        .collect();
    assert_eq!(contributing, vec!["quiz-1"]);
    assert!((f(&low, "/assessments/0/averagePercentage") - 85.0).abs() < 1e-9);

    let unmapped = request(
        &mut stdin,
        &mut reader,
        "ilo2",
        "attainment.ilo",
        json!({
            "courseId": course_id,
            "iloId": "ilo-1",
            "referenceType": "CDIO",
            "referenceId": "cdio-9"
        }),
    );
    assert_eq!(
        unmapped.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_config")
    );

    let coverage = request_ok(
        &mut stdin,
        &mut reader,
        "cov",
        "attainment.coverage",
        json!({ "courseId": course_id }),
    );
    let quiz = coverage["criteria"]
        .as_array()
        .expect("criteria")
        .iter()
        .find(|c| c["criterionName"].as_str() == Some("Quiz"))
        .expect("Quiz group");
    assert_eq!(quiz["passedCount"].as_u64(), Some(7));
    assert!((f(quiz, "/coveragePercentage") - 70.0).abs() < 1e-9);

    let combos = request_ok(
        &mut stdin,
        &mut reader,
        "combo",
        "outcomes.combinations",
        json!({ "courseId": course_id, "referenceType": "SO" }),
    );
    assert_eq!(combos["combinations"].as_array().map(|v| v.len()), Some(1));
    assert_eq!(
        combos.pointer("/combinations/0/referenceCode").and_then(|v| v.as_str()),
        Some("SO1")
    );

    let one = request_ok(
        &mut stdin,
        &mut reader,
        "combo2",
        "outcomes.combinations",
        json!({ "courseId": course_id, "referenceType": "SDG", "combinationKey": "ilo-1_sdg-4" }),
    );
    assert_eq!(
        one.pointer("/combinations/0/combinationLabel").and_then(|v| v.as_str()),
        Some("ILO1 - SDG4")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}
