use crate::db;
use crate::ipc::error::{engine_err, err};
use crate::ipc::types::{AppState, Request};
use crate::model::Thresholds;
use crate::snapshot::CourseSnapshot;
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
            Some(_) => Ok(None),
            None => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a string", key),
                None,
            )),
        },
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Built-in defaults, then workspace settings, then `params.thresholds`.
pub fn resolve_thresholds(
    conn: Option<&Connection>,
    req: &Request,
) -> Result<Thresholds, serde_json::Value> {
    let mut t = match conn {
        Some(c) => db::load_thresholds(c)
            .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?,
        None => Thresholds::default(),
    };

    match req.params.get("thresholds") {
        None => {}
        Some(v) if v.is_null() => {}
        Some(v) => {
            let Some(obj) = v.as_object() else {
                return Err(err(&req.id, "bad_params", "thresholds must be an object", None));
            };
            for (key, slot) in [("pass", &mut t.pass), ("high", &mut t.high), ("low", &mut t.low)] {
                match obj.get(key) {
                    None => {}
                    Some(n) if n.is_null() => {}
                    Some(n) => {
                        let Some(f) = n.as_f64() else {
                            return Err(err(
                                &req.id,
                                "bad_params",
                                format!("thresholds.{} must be a number", key),
                                None,
                            ));
                        };
                        *slot = f;
                    }
                }
            }
        }
    }

    t.validate().map_err(|e| engine_err(&req.id, &e))?;
    Ok(t)
}

pub fn load_course_snapshot(
    conn: &Connection,
    req: &Request,
    course_id: &str,
) -> Result<CourseSnapshot, serde_json::Value> {
    match db::course_exists(conn, course_id) {
        Ok(true) => {}
        Ok(false) => {
            return Err(err(
                &req.id,
                "not_found",
                "course not found",
                Some(json!({ "courseId": course_id })),
            ))
        }
        Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
    let input = db::load_snapshot_input(conn, course_id)
        .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))?;
    CourseSnapshot::new(input).map_err(|e| engine_err(&req.id, &e))
}
