use crate::error::EngineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Ontime,
    Late,
    Missing,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Ontime => "ontime",
            SubmissionStatus::Late => "late",
            SubmissionStatus::Missing => "missing",
        }
    }

    /// Unknown statuses fall back to `missing`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "ontime" => SubmissionStatus::Ontime,
            "late" => SubmissionStatus::Late,
            _ => SubmissionStatus::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub criterion: Option<String>,
    pub total_points: f64,
    pub weight_percentage: f64,
    #[serde(default)]
    pub task_code: Option<String>,
}

impl Assessment {
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_scale(&self.id, self.total_points, self.weight_percentage)
    }
}

/// Assessment configuration checks shared by the transmuter and the store.
pub fn validate_scale(
    assessment_id: &str,
    total_points: f64,
    weight_percentage: f64,
) -> Result<(), EngineError> {
    check_scale(
        format!("assessment {}", assessment_id),
        total_points,
        weight_percentage,
    )
}

/// Same checks, for callers that have no assessment id to report.
pub fn check_scale(
    subject: impl Into<String>,
    total_points: f64,
    weight_percentage: f64,
) -> Result<(), EngineError> {
    let subject = subject.into();
    if !total_points.is_finite() || total_points <= 0.0 {
        return Err(EngineError::config(
            subject,
            format!("totalPoints must be > 0 (got {})", total_points),
        ));
    }
    if !weight_percentage.is_finite() || !(0.0..=100.0).contains(&weight_percentage) {
        return Err(EngineError::config(
            subject,
            format!(
                "weightPercentage must be within 0..=100 (got {})",
                weight_percentage
            ),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub assessment_id: String,
    pub student_id: String,
    #[serde(default)]
    pub raw_score: Option<f64>,
    #[serde(default)]
    pub late_penalty: f64,
    pub submission_status: SubmissionStatus,
}

impl ScoreRecord {
    /// Ungraded records score exactly like missing submissions.
    pub fn effective_status(&self) -> SubmissionStatus {
        if self.raw_score.is_none() {
            SubmissionStatus::Missing
        } else {
            self.submission_status
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub student_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceType {
    #[serde(rename = "SO")]
    So,
    #[serde(rename = "SDG")]
    Sdg,
    #[serde(rename = "IGA")]
    Iga,
    #[serde(rename = "CDIO")]
    Cdio,
}

impl ReferenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceType::So => "SO",
            ReferenceType::Sdg => "SDG",
            ReferenceType::Iga => "IGA",
            ReferenceType::Cdio => "CDIO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SO" => Some(ReferenceType::So),
            "SDG" => Some(ReferenceType::Sdg),
            "IGA" => Some(ReferenceType::Iga),
            "CDIO" => Some(ReferenceType::Cdio),
            _ => None,
        }
    }
}

/// Catalog entry for one outcome in a framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeReference {
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMapping {
    pub reference_type: ReferenceType,
    pub reference_id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub task_codes: Vec<String>,
}

impl OutcomeMapping {
    pub fn has_task_filter(&self) -> bool {
        self.task_codes.iter().any(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ilo {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mappings: Vec<OutcomeMapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    pub pass: f64,
    pub high: f64,
    pub low: f64,
}

pub const DEFAULT_PASS_THRESHOLD: f64 = 75.0;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 80.0;
pub const DEFAULT_LOW_THRESHOLD: f64 = 75.0;

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pass: DEFAULT_PASS_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
            low: DEFAULT_LOW_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, v) in [("pass", self.pass), ("high", self.high), ("low", self.low)] {
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(EngineError::config(
                    "thresholds",
                    format!("{} must be within 0..=100 (got {})", name, v),
                ));
            }
        }
        Ok(())
    }
}
