use crate::criteria::{criterion_for, CriterionLabeler};
use crate::error::{EngineError, ScoringIssue};
use crate::model::{
    Assessment, Ilo, OutcomeReference, ReferenceType, ScoreRecord, Student, Thresholds,
};
use crate::transmute::{score_assessment, ScoredAssessment};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Raw collaborator payload, as read from the store or an inline request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInput {
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub scores: Vec<ScoreRecord>,
    #[serde(default)]
    pub ilos: Vec<Ilo>,
    #[serde(default)]
    pub references: Vec<OutcomeReference>,
}

/// Immutable, shape-checked view of one course.
#[derive(Debug, Clone)]
pub struct CourseSnapshot {
    input: SnapshotInput,
    score_by_pair: HashMap<(String, String), usize>,
}

impl CourseSnapshot {
    pub fn new(input: SnapshotInput) -> Result<Self, EngineError> {
        let mut assessment_ids: HashSet<&str> = HashSet::new();
        for a in &input.assessments {
            if a.id.trim().is_empty() {
                return Err(EngineError::shape("assessment id must not be empty"));
            }
            if !assessment_ids.insert(a.id.as_str()) {
                return Err(EngineError::shape(format!("duplicate assessment id {}", a.id)));
            }
        }

        let mut student_ids: HashSet<&str> = HashSet::new();
        for s in &input.students {
            if s.id.trim().is_empty() {
                return Err(EngineError::shape("student id must not be empty"));
            }
            if !student_ids.insert(s.id.as_str()) {
                return Err(EngineError::shape(format!("duplicate student id {}", s.id)));
            }
        }

        let mut ilo_ids: HashSet<&str> = HashSet::new();
        for ilo in &input.ilos {
            if !ilo_ids.insert(ilo.id.as_str()) {
                return Err(EngineError::shape(format!("duplicate ILO id {}", ilo.id)));
            }
        }

        let mut score_by_pair: HashMap<(String, String), usize> = HashMap::new();
        for (i, r) in input.scores.iter().enumerate() {
            if !assessment_ids.contains(r.assessment_id.as_str()) {
                return Err(EngineError::shape(format!(
                    "score record references unknown assessment {}",
                    r.assessment_id
                )));
            }
            if !student_ids.contains(r.student_id.as_str()) {
                return Err(EngineError::shape(format!(
                    "score record references unknown student {}",
                    r.student_id
                )));
            }
            let key = (r.assessment_id.clone(), r.student_id.clone());
            if score_by_pair.insert(key, i).is_some() {
                return Err(EngineError::shape(format!(
                    "duplicate score record for assessment {} / student {}",
                    r.assessment_id, r.student_id
                )));
            }
        }

        Ok(Self {
            input,
            score_by_pair,
        })
    }

    pub fn course_id(&self) -> Option<&str> {
        self.input.course_id.as_deref()
    }

    pub fn assessments(&self) -> &[Assessment] {
        &self.input.assessments
    }

    pub fn students(&self) -> &[Student] {
        &self.input.students
    }

    pub fn ilos(&self) -> &[Ilo] {
        &self.input.ilos
    }

    pub fn ilo(&self, ilo_id: &str) -> Option<&Ilo> {
        self.input.ilos.iter().find(|i| i.id == ilo_id)
    }

    pub fn reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Option<&OutcomeReference> {
        self.input
            .references
            .iter()
            .find(|r| r.reference_type == reference_type && r.reference_id == reference_id)
    }

    pub fn record(&self, student_id: &str, assessment_id: &str) -> Option<&ScoreRecord> {
        self.score_by_pair
            .get(&(assessment_id.to_string(), student_id.to_string()))
            .map(|&i| &self.input.scores[i])
    }

    pub fn score(
        &self,
        student_id: &str,
        assessment: &Assessment,
        labeler: &dyn CriterionLabeler,
    ) -> Result<ScoredAssessment, ScoringIssue> {
        score_assessment(
            student_id,
            assessment,
            criterion_for(assessment, labeler),
            self.record(student_id, &assessment.id),
        )
    }

    /// Scores every given assessment, splitting successes from attributed failures.
    pub fn score_many<'a, I>(
        &self,
        student_id: &str,
        assessments: I,
        labeler: &dyn CriterionLabeler,
    ) -> (Vec<ScoredAssessment>, Vec<ScoringIssue>)
    where
        I: IntoIterator<Item = &'a Assessment>,
    {
        let mut lines = Vec::new();
        let mut issues = Vec::new();
        for a in assessments {
            match self.score(student_id, a, labeler) {
                Ok(line) => lines.push(line),
                Err(issue) => issues.push(issue),
            }
        }
        (lines, issues)
    }

    /// SHA-256 over the full input tuple; external caches key on this.
    pub fn fingerprint(&self, thresholds: &Thresholds) -> String {
        let mut hasher = Sha256::new();
        let body = serde_json::to_vec(&self.input).unwrap_or_default();
        hasher.update(&body);
        let t = serde_json::to_vec(thresholds).unwrap_or_default();
        hasher.update(&t);
        format!("{:x}", hasher.finalize())
    }
}
