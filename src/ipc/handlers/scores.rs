use crate::db;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{validate_scale, ScoreRecord, SubmissionStatus};
use crate::transmute::transmute;
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeParams {
    student_id: String,
    #[serde(default)]
    raw_score: Option<f64>,
    #[serde(default)]
    late_penalty: Option<f64>,
    #[serde(default)]
    submission_status: Option<String>,
    #[serde(default)]
    remarks: Option<String>,
}

fn handle_scores_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw_grades) = req.params.get("grades") else {
        return err(&req.id, "bad_params", "missing grades", None);
    };
    let grades: Vec<GradeParams> = match serde_json::from_value(raw_grades.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("grades is malformed: {}", e),
                None,
            )
        }
    };

    let (course_id, total_points, weight_percentage) =
        match db::assessment_scale(conn, &assessment_id) {
            Ok(Some(v)) => v,
            Ok(None) => {
                return err(
                    &req.id,
                    "not_found",
                    "assessment not found",
                    Some(json!({ "assessmentId": assessment_id })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
    if let Err(e) = validate_scale(&assessment_id, total_points, weight_percentage) {
        return engine_err(&req.id, &e);
    }

    // Validate every row before any write lands.
    let mut records = Vec::with_capacity(grades.len());
    for (i, g) in grades.into_iter().enumerate() {
        let enrolled: Option<i64> = match conn
            .query_row(
                "SELECT 1 FROM students WHERE id = ? AND course_id = ?",
                (&g.student_id, &course_id),
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if enrolled.is_none() {
            return err(
                &req.id,
                "bad_params",
                "student is not enrolled in the assessment's course",
                Some(json!({ "index": i, "studentId": g.student_id })),
            );
        }
        if let Some(raw) = g.raw_score {
            if !raw.is_finite() {
                return err(
                    &req.id,
                    "bad_params",
                    "rawScore must be a finite number",
                    Some(json!({ "index": i, "studentId": g.student_id })),
                );
            }
        }
        let late_penalty = g.late_penalty.unwrap_or(0.0);
        if !late_penalty.is_finite() || late_penalty < 0.0 {
            return err(
                &req.id,
                "bad_params",
                "latePenalty must be >= 0",
                Some(json!({ "index": i, "studentId": g.student_id })),
            );
        }
        let submission_status = g
            .submission_status
            .as_deref()
            .map(SubmissionStatus::parse_lenient)
            .unwrap_or(SubmissionStatus::Missing);
        records.push((
            ScoreRecord {
                assessment_id: assessment_id.clone(),
                student_id: g.student_id,
                raw_score: g.raw_score,
                late_penalty,
                submission_status,
            },
            g.remarks,
        ));
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut results = Vec::with_capacity(records.len());
    for (record, remarks) in &records {
        let score = match transmute(
            record.raw_score.unwrap_or(0.0),
            record.late_penalty,
            total_points,
            weight_percentage,
            record.effective_status(),
        ) {
            Ok(s) => s,
            Err(e) => return engine_err(&req.id, &e),
        };
        if let Err(e) = db::upsert_score(&tx, record, remarks.as_deref()) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "scores", "studentId": record.student_id })),
            );
        }
        results.push(json!({
            "studentId": record.student_id,
            "submissionStatus": record.effective_status(),
            "adjustedScore": score.adjusted_score,
            "actualScore": score.actual_score,
            "transmutedScore": score.transmuted_score,
            "displayPercentage": score.display_percentage,
        }));
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(
        assessment = %assessment_id,
        count = results.len(),
        "scores submitted"
    );
    ok(
        &req.id,
        json!({ "assessmentId": assessment_id, "scores": results }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.submit" => Some(handle_scores_submit(state, req)),
        _ => None,
    }
}
