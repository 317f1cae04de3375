use crate::attainment::{
    classify_ilo, contributing_assessments, coverage_by_criterion, resolve_lens, summarize_course,
    PerformanceFilter,
};
use crate::criteria::CanonicalTitles;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{
    db_conn, load_course_snapshot, optional_str, required_str, resolve_thresholds,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assessment, ReferenceType};
use serde_json::json;

fn handle_attainment_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let thresholds = match resolve_thresholds(Some(conn), req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let snapshot = match load_course_snapshot(conn, req, &course_id) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let summary = match summarize_course(&snapshot, &thresholds, &CanonicalTitles) {
        Ok(s) => s,
        Err(e) => return engine_err(&req.id, &e),
    };
    let mut result = json!(summary);
    result["courseId"] = json!(course_id);
    result["inputKey"] = json!(snapshot.fingerprint(&thresholds));
    ok(&req.id, result)
}

fn handle_attainment_ilo(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ilo_id = match required_str(req, "iloId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let reference_type = match optional_str(req, "referenceType") {
        Ok(None) => None,
        Ok(Some(s)) => match ReferenceType::parse(&s) {
            Some(t) => Some(t),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "referenceType must be one of SO, SDG, IGA, CDIO",
                    Some(json!({ "referenceType": s })),
                )
            }
        },
        Err(e) => return e,
    };
    let reference_id = match optional_str(req, "referenceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter = match optional_str(req, "performanceFilter") {
        Ok(None) => PerformanceFilter::All,
        Ok(Some(s)) => match PerformanceFilter::parse(&s) {
            Some(f) => f,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "performanceFilter must be one of all, high, low",
                    Some(json!({ "performanceFilter": s })),
                )
            }
        },
        Err(e) => return e,
    };
    let thresholds = match resolve_thresholds(Some(conn), req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let snapshot = match load_course_snapshot(conn, req, &course_id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let Some(ilo) = snapshot.ilo(&ilo_id) else {
        return err(
            &req.id,
            "not_found",
            "ILO not found",
            Some(json!({ "iloId": ilo_id })),
        );
    };

    let lens = match (reference_type, reference_id.as_deref()) {
        (None, None) => None,
        (Some(t), Some(id)) => match resolve_lens(ilo, t, id) {
            Ok(m) => Some(m),
            Err(e) => return engine_err(&req.id, &e),
        },
        _ => {
            return err(
                &req.id,
                "bad_params",
                "referenceType and referenceId must be given together",
                None,
            )
        }
    };

    match classify_ilo(&snapshot, ilo, lens, &thresholds, filter, &CanonicalTitles) {
        Ok(a) => {
            let mut result = json!(a);
            result["courseId"] = json!(course_id);
            result["inputKey"] = json!(snapshot.fingerprint(&thresholds));
            ok(&req.id, result)
        }
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_attainment_coverage(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ilo_id = match optional_str(req, "iloId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let thresholds = match resolve_thresholds(Some(conn), req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let snapshot = match load_course_snapshot(conn, req, &course_id) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let assessments: Vec<&Assessment> = match ilo_id.as_deref() {
        None => snapshot.assessments().iter().collect(),
        Some(id) => {
            let Some(ilo) = snapshot.ilo(id) else {
                return err(
                    &req.id,
                    "not_found",
                    "ILO not found",
                    Some(json!({ "iloId": id })),
                );
            };
            contributing_assessments(&snapshot, ilo, None)
        }
    };

    match coverage_by_criterion(&snapshot, &assessments, &thresholds, &CanonicalTitles) {
        Ok(criteria) => ok(
            &req.id,
            json!({
                "courseId": course_id,
                "iloId": ilo_id,
                "thresholds": thresholds,
                "criteria": criteria,
                "inputKey": snapshot.fingerprint(&thresholds),
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attainment.summary" => Some(handle_attainment_summary(state, req)),
        "attainment.ilo" => Some(handle_attainment_ilo(state, req)),
        "attainment.coverage" => Some(handle_attainment_coverage(state, req)),
        _ => None,
    }
}
