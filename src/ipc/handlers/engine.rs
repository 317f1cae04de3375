use crate::attainment::summarize_course;
use crate::criteria::CanonicalTitles;
use crate::grade::resolve_course_grades;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::resolve_thresholds;
use crate::ipc::types::{AppState, Request};
use crate::outcomes::resolve_combinations;
use crate::snapshot::{CourseSnapshot, SnapshotInput};
use serde_json::json;

/// Runs the whole engine over an inline snapshot. Workspace threshold
/// defaults apply when a workspace is open.
fn handle_engine_evaluate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("snapshot") else {
        return err(&req.id, "bad_params", "missing snapshot", None);
    };
    let input: SnapshotInput = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_input",
                format!("snapshot is malformed: {}", e),
                None,
            )
        }
    };
    let thresholds = match resolve_thresholds(state.db.as_ref(), req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let snapshot = match CourseSnapshot::new(input) {
        Ok(s) => s,
        Err(e) => return engine_err(&req.id, &e),
    };

    let grades = resolve_course_grades(&snapshot, &CanonicalTitles);
    let attainment = match summarize_course(&snapshot, &thresholds, &CanonicalTitles) {
        Ok(a) => a,
        Err(e) => return engine_err(&req.id, &e),
    };
    let mut result = json!({
        "courseId": snapshot.course_id(),
        "inputKey": snapshot.fingerprint(&thresholds),
        "thresholds": thresholds,
        "grades": grades,
        "attainment": attainment,
    });
    match resolve_combinations(&snapshot, None) {
        Ok(rows) => result["combinations"] = json!(rows),
        Err(e) => {
            tracing::warn!(error = %e, "outcome combinations unavailable");
            result["combinations"] = serde_json::Value::Null;
            result["combinationError"] = json!({ "code": e.code(), "message": e.to_string() });
        }
    }

    tracing::debug!(
        students = snapshot.students().len(),
        assessments = snapshot.assessments().len(),
        ilos = snapshot.ilos().len(),
        "engine evaluated"
    );
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "engine.evaluate" => Some(handle_engine_evaluate(state, req)),
        _ => None,
    }
}
