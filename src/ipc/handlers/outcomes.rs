use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, load_course_snapshot, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::ReferenceType;
use crate::outcomes::{find_combination, resolve_combinations};
use serde_json::json;

fn handle_outcomes_combinations(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
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
    let combination_key = match optional_str(req, "combinationKey") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = match load_course_snapshot(conn, req, &course_id) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let rows = match resolve_combinations(&snapshot, reference_type) {
        Ok(r) => r,
        Err(e) => return engine_err(&req.id, &e),
    };

    let Some(key) = combination_key else {
        return ok(
            &req.id,
            json!({ "courseId": course_id, "combinations": rows }),
        );
    };
    let Some(t) = reference_type else {
        return err(
            &req.id,
            "bad_params",
            "combinationKey lookups need a referenceType",
            None,
        );
    };
    match find_combination(&rows, t, &key) {
        Some(row) => ok(
            &req.id,
            json!({ "courseId": course_id, "combinations": [row] }),
        ),
        None => err(
            &req.id,
            "not_found",
            "combination not found",
            Some(json!({ "combinationKey": key, "referenceType": t })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "outcomes.combinations" => Some(handle_outcomes_combinations(state, req)),
        _ => None,
    }
}
