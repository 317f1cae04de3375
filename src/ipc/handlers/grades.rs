use crate::criteria::CanonicalTitles;
use crate::grade::{resolve_course_grades, summarize_assessments};
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, load_course_snapshot, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Thresholds;
use serde_json::json;

fn handle_grades_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = match load_course_snapshot(conn, req, &course_id) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let grades = resolve_course_grades(&snapshot, &CanonicalTitles);
    if !grades.issues.is_empty() {
        tracing::warn!(
            course = %course_id,
            issues = grades.issues.len(),
            "grades computed with scoring issues"
        );
    }

    // Grades do not depend on thresholds; the key still covers the defaults.
    let input_key = snapshot.fingerprint(&Thresholds::default());
    let mut result = json!(grades);
    result["courseId"] = json!(course_id);
    result["inputKey"] = json!(input_key);
    ok(&req.id, result)
}

fn handle_assessment_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = match load_course_snapshot(conn, req, &course_id) {
        Ok(s) => s,
        Err(e) => return e,
    };

    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "totalStudents": snapshot.students().len(),
            "assessments": summarize_assessments(&snapshot),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.compute" => Some(handle_grades_compute(state, req)),
        "grades.assessmentSummary" => Some(handle_assessment_summary(state, req)),
        _ => None,
    }
}
