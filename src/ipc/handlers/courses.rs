use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{validate_scale, OutcomeMapping, OutcomeReference};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

fn require_course(conn: &Connection, req: &Request, course_id: &str) -> Result<(), serde_json::Value> {
    match crate::db::course_exists(conn, course_id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(
            &req.id,
            "not_found",
            "course not found",
            Some(json!({ "courseId": course_id })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn parse_list<T: for<'de> Deserialize<'de>>(
    req: &Request,
    key: &str,
) -> Result<Vec<T>, serde_json::Value> {
    let Some(raw) = req.params.get(key) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("{} is malformed: {}", key, e),
            None,
        )
    })
}

/// Upserts may only touch rows of the course named in the request.
fn claim_id(
    conn: &Connection,
    req: &Request,
    table: &str,
    id: &str,
    course_id: &str,
    index: usize,
) -> Result<(), serde_json::Value> {
    let owner: Option<String> = conn
        .query_row(
            &format!("SELECT course_id FROM {} WHERE id = ?", table),
            [id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    match owner {
        Some(owner) if owner != course_id => Err(err(
            &req.id,
            "bad_params",
            format!("{} id belongs to another course", table),
            Some(json!({ "table": table, "id": id, "index": index })),
        )),
        _ => Ok(()),
    }
}

fn new_id(id: Option<String>) -> String {
    id.filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if code.is_empty() || title.is_empty() {
        return err(&req.id, "bad_params", "code and title must not be empty", None);
    }
    let section_code = match optional_str(req, "sectionCode") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, code, title, section_code) VALUES(?, ?, ?, ?)",
        (&course_id, &code, &title, &section_code),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    tracing::info!(course = %code, id = %course_id, "course created");
    ok(&req.id, json!({ "courseId": course_id, "code": code, "title": title }))
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.code,
           c.title,
           c.section_code,
           (SELECT COUNT(*) FROM students s WHERE s.course_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM assessments a WHERE a.course_id = c.id) AS assessment_count,
           (SELECT COUNT(*) FROM ilos i WHERE i.course_id = c.id) AS ilo_count
         FROM courses c
         ORDER BY c.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "code": r.get::<_, String>(1)?,
                "title": r.get::<_, String>(2)?,
                "sectionCode": r.get::<_, Option<String>>(3)?,
                "studentCount": r.get::<_, i64>(4)?,
                "assessmentCount": r.get::<_, i64>(5)?,
                "iloCount": r.get::<_, i64>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentParams {
    id: Option<String>,
    display_name: String,
    student_number: Option<String>,
}

fn handle_students_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_course(conn, req, &course_id) {
        return e;
    }
    let students: Vec<StudentParams> = match parse_list(req, "students") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let next_sort: i64 = match tx.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE course_id = ?",
        [&course_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut ids = Vec::with_capacity(students.len());
    for (i, s) in students.into_iter().enumerate() {
        let name = s.display_name.trim().to_string();
        if name.is_empty() {
            return err(
                &req.id,
                "bad_params",
                "displayName must not be empty",
                Some(json!({ "index": i })),
            );
        }
        let id = new_id(s.id);
        if let Err(e) = claim_id(&tx, req, "students", &id, &course_id, i) {
            return e;
        }
        if let Err(e) = tx.execute(
            "INSERT INTO students(id, course_id, display_name, student_number, sort_order)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               display_name = excluded.display_name,
               student_number = excluded.student_number",
            (&id, &course_id, &name, &s.student_number, next_sort + i as i64),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "students", "index": i })),
            );
        }
        ids.push(id);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "studentIds": ids }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentParams {
    id: Option<String>,
    title: String,
    criterion: Option<String>,
    total_points: f64,
    weight_percentage: f64,
    task_code: Option<String>,
}

fn handle_assessments_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_course(conn, req, &course_id) {
        return e;
    }
    let assessments: Vec<AssessmentParams> = match parse_list(req, "assessments") {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Reject the whole batch before touching the store.
    for a in &assessments {
        let label = a.id.clone().unwrap_or_else(|| a.title.clone());
        if let Err(e) = validate_scale(&label, a.total_points, a.weight_percentage) {
            return engine_err(&req.id, &e);
        }
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let next_idx: i64 = match tx.query_row(
        "SELECT COALESCE(MAX(idx) + 1, 0) FROM assessments WHERE course_id = ?",
        [&course_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut ids = Vec::with_capacity(assessments.len());
    for (i, a) in assessments.into_iter().enumerate() {
        let id = new_id(a.id);
        if let Err(e) = claim_id(&tx, req, "assessments", &id, &course_id, i) {
            return e;
        }
        if let Err(e) = tx.execute(
            "INSERT INTO assessments(id, course_id, idx, title, criterion, total_points, weight_percentage, task_code)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               criterion = excluded.criterion,
               total_points = excluded.total_points,
               weight_percentage = excluded.weight_percentage,
               task_code = excluded.task_code",
            (
                &id,
                &course_id,
                next_idx + i as i64,
                a.title.trim(),
                &a.criterion,
                a.total_points,
                a.weight_percentage,
                &a.task_code,
            ),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "assessments", "index": i })),
            );
        }
        ids.push(id);
    }

    let total_weight: f64 = match tx.query_row(
        "SELECT COALESCE(SUM(weight_percentage), 0) FROM assessments WHERE course_id = ?",
        [&course_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    if total_weight > 100.0 {
        tracing::warn!(course = %course_id, total_weight, "assessment weights exceed 100%");
    }

    ok(
        &req.id,
        json!({
            "assessmentIds": ids,
            "totalWeight": total_weight,
            "weightOverflow": total_weight > 100.0,
        }),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IloParams {
    id: Option<String>,
    code: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    mappings: Vec<OutcomeMapping>,
}

fn handle_ilos_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_course(conn, req, &course_id) {
        return e;
    }
    let ilos: Vec<IloParams> = match parse_list(req, "ilos") {
        Ok(v) => v,
        Err(e) => return e,
    };

    for ilo in &ilos {
        let mut seen = HashSet::new();
        for m in &ilo.mappings {
            if !seen.insert((m.reference_type, m.reference_id.clone())) {
                return err(
                    &req.id,
                    "bad_config",
                    format!(
                        "ILO {} maps {} reference {} twice",
                        ilo.code,
                        m.reference_type.as_str(),
                        m.reference_id
                    ),
                    None,
                );
            }
        }
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let next_sort: i64 = match tx.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM ilos WHERE course_id = ?",
        [&course_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut ids = Vec::with_capacity(ilos.len());
    for (i, ilo) in ilos.into_iter().enumerate() {
        let id = new_id(ilo.id);
        if let Err(e) = claim_id(&tx, req, "ilos", &id, &course_id, i) {
            return e;
        }
        if let Err(e) = tx.execute(
            "INSERT INTO ilos(id, course_id, code, description, sort_order)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               code = excluded.code,
               description = excluded.description",
            (&id, &course_id, ilo.code.trim(), &ilo.description, next_sort + i as i64),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "ilos", "index": i })),
            );
        }
        // Mappings are replaced wholesale.
        if let Err(e) = tx.execute("DELETE FROM ilo_mappings WHERE ilo_id = ?", [&id]) {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "ilo_mappings" })),
            );
        }
        for (j, m) in ilo.mappings.iter().enumerate() {
            let task_codes = json!(m.task_codes).to_string();
            if let Err(e) = tx.execute(
                "INSERT INTO ilo_mappings(ilo_id, reference_type, reference_id, code, description, task_codes, sort_order)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    m.reference_type.as_str(),
                    &m.reference_id,
                    &m.code,
                    &m.description,
                    &task_codes,
                    j as i64,
                ),
            ) {
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "ilo_mappings", "index": i })),
                );
            }
        }
        ids.push(id);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "iloIds": ids }))
}

fn handle_references_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let references: Vec<OutcomeReference> = match parse_list(req, "references") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for (i, r) in references.iter().enumerate() {
        if let Err(e) = tx.execute(
            "INSERT INTO outcome_references(reference_type, reference_id, code, description)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(reference_type, reference_id) DO UPDATE SET
               code = excluded.code,
               description = excluded.description",
            (
                r.reference_type.as_str(),
                &r.reference_id,
                &r.code,
                &r.description,
            ),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "outcome_references", "index": i })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "count": references.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "students.upsert" => Some(handle_students_upsert(state, req)),
        "assessments.upsert" => Some(handle_assessments_upsert(state, req)),
        "ilos.upsert" => Some(handle_ilos_upsert(state, req)),
        "references.upsert" => Some(handle_references_upsert(state, req)),
        _ => None,
    }
}
