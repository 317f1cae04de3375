use crate::error::{EngineError, ScoringIssue};
use crate::model::{check_scale, Assessment, ScoreRecord, SubmissionStatus};
use serde::Serialize;

/// Floor of the non-zero-based scale: any genuine submission earns at least this.
pub const NON_ZERO_BASE: f64 = 37.5;
/// Span from the floor to 100.
pub const NON_ZERO_SPAN: f64 = 62.5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmutedScore {
    pub adjusted_score: f64,
    pub actual_score: f64,
    pub transmuted_score: f64,
    pub display_percentage: f64,
}

pub fn transmute(
    raw_score: f64,
    late_penalty: f64,
    total_points: f64,
    weight_percentage: f64,
    status: SubmissionStatus,
) -> Result<TransmutedScore, EngineError> {
    check_scale("assessment", total_points, weight_percentage)?;

    if status == SubmissionStatus::Missing {
        return Ok(TransmutedScore::default());
    }

    let adjusted_score = (raw_score - late_penalty).clamp(0.0, total_points);
    let ratio = adjusted_score / total_points;
    let actual_score = ratio * NON_ZERO_SPAN + NON_ZERO_BASE;

    Ok(TransmutedScore {
        adjusted_score,
        actual_score,
        transmuted_score: actual_score * (weight_percentage / 100.0),
        display_percentage: ratio * 100.0,
    })
}

/// One assessment as scored for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredAssessment {
    pub assessment_id: String,
    pub title: String,
    pub criterion: String,
    pub task_code: Option<String>,
    pub submission_status: SubmissionStatus,
    pub raw_score: Option<f64>,
    pub late_penalty: f64,
    pub total_points: f64,
    pub weight_percentage: f64,
    #[serde(flatten)]
    pub score: TransmutedScore,
}

/// Scores `assessment` for `student_id`. An absent record is a missing submission.
pub fn score_assessment(
    student_id: &str,
    assessment: &Assessment,
    criterion: String,
    record: Option<&ScoreRecord>,
) -> Result<ScoredAssessment, ScoringIssue> {
    assessment
        .validate()
        .map_err(|e| ScoringIssue::from_error(student_id, &assessment.id, &e))?;

    let status = record
        .map(|r| r.effective_status())
        .unwrap_or(SubmissionStatus::Missing);
    let raw_score = record.and_then(|r| r.raw_score);
    let late_penalty = record.map(|r| r.late_penalty).unwrap_or(0.0);

    if status != SubmissionStatus::Missing {
        if raw_score.map(|v| !v.is_finite()).unwrap_or(false) {
            return Err(ScoringIssue::new(
                student_id,
                &assessment.id,
                "bad_input",
                "rawScore must be a finite number",
            ));
        }
        if !late_penalty.is_finite() || late_penalty < 0.0 {
            return Err(ScoringIssue::new(
                student_id,
                &assessment.id,
                "bad_input",
                format!("latePenalty must be >= 0 (got {})", late_penalty),
            ));
        }
    }

    let score = transmute(
        raw_score.unwrap_or(0.0),
        late_penalty,
        assessment.total_points,
        assessment.weight_percentage,
        status,
    )
    .map_err(|e| ScoringIssue::from_error(student_id, &assessment.id, &e))?;

    Ok(ScoredAssessment {
        assessment_id: assessment.id.clone(),
        title: assessment.title.clone(),
        criterion,
        task_code: assessment.task_code.clone(),
        submission_status: status,
        raw_score,
        late_penalty,
        total_points: assessment.total_points,
        weight_percentage: assessment.weight_percentage,
        score,
    })
}
