use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, resolve_thresholds};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_thresholds_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::load_thresholds(conn) {
        Ok(t) => ok(&req.id, json!({ "thresholds": t })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

/// Partial updates overlay the stored values; omitted fields keep theirs.
fn handle_thresholds_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if req.params.get("thresholds").map(|v| v.is_null()).unwrap_or(true) {
        return err(&req.id, "bad_params", "missing thresholds", None);
    }
    let thresholds = match resolve_thresholds(Some(conn), req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    if let Err(e) = db::settings_set_json(conn, db::THRESHOLDS_KEY, &json!(thresholds)) {
        return err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "settings" })),
        );
    }

    tracing::info!(
        pass = thresholds.pass,
        high = thresholds.high,
        low = thresholds.low,
        "threshold defaults updated"
    );
    ok(&req.id, json!({ "thresholds": thresholds }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.thresholds.get" => Some(handle_thresholds_get(state, req)),
        "settings.thresholds.set" => Some(handle_thresholds_set(state, req)),
        _ => None,
    }
}
