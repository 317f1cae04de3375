use crate::criteria::{aggregate_by_criterion, CriterionLabeler, CriterionTotal};
use crate::error::ScoringIssue;
use crate::model::{ScoreRecord, Student, SubmissionStatus};
use crate::snapshot::CourseSnapshot;
use crate::transmute::{transmute, ScoredAssessment};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GradeStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeTier {
    pub numeric_grade: f64,
    pub status: GradeStatus,
}

/// Passing tiers, highest first: (minimum percentage, numeric grade).
const PASSING_TIERS: [(f64, f64); 9] = [
    (98.0, 1.00),
    (94.0, 1.25),
    (90.0, 1.50),
    (88.0, 1.75),
    (85.0, 2.00),
    (83.0, 2.25),
    (80.0, 2.50),
    (78.0, 2.75),
    (75.0, 3.00),
];

pub const FAILING_GRADE: f64 = 5.00;

/// Float slack for threshold comparisons on unrounded sums.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Two-decimal rounding for reported values only; comparisons use the raw sum.
pub fn round_2dp(x: f64) -> f64 {
    (x * 100.0).round() / 100.0 + 0.0
}

pub fn at_least(value: f64, min: f64) -> bool {
    value + SCORE_EPSILON >= min
}

/// The top tier has no ceiling, so totals above 100 still map to 1.00.
pub fn convert_percentage(percentage: f64) -> GradeTier {
    for (min, grade) in PASSING_TIERS {
        if at_least(percentage, min) {
            return GradeTier {
                numeric_grade: grade,
                status: GradeStatus::Passed,
            };
        }
    }
    GradeTier {
        numeric_grade: FAILING_GRADE,
        status: GradeStatus::Failed,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrade {
    pub student_id: String,
    pub display_name: String,
    pub final_percentage: f64,
    pub numeric_grade: f64,
    pub status: GradeStatus,
    pub criteria: Vec<CriterionTotal>,
    pub assessments: Vec<ScoredAssessment>,
    pub issues: Vec<ScoringIssue>,
}

pub fn resolve_student_grade(
    snapshot: &CourseSnapshot,
    student: &Student,
    labeler: &dyn CriterionLabeler,
) -> StudentGrade {
    let (lines, issues) = snapshot.score_many(&student.id, snapshot.assessments(), labeler);
    let criteria = aggregate_by_criterion(&lines);
    let total: f64 = lines
        .iter()
        .fold(0.0, |acc, l| acc + l.score.transmuted_score);
    let final_percentage = round_2dp(total);
    let tier = convert_percentage(total);

    StudentGrade {
        student_id: student.id.clone(),
        display_name: student.display_name.clone(),
        final_percentage,
        numeric_grade: tier.numeric_grade,
        status: tier.status,
        criteria,
        assessments: lines,
        issues,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGrades {
    pub students: Vec<StudentGrade>,
    pub passed_count: usize,
    pub failed_count: usize,
    pub class_average: f64,
    pub total_weight: f64,
    pub weight_overflow: bool,
    pub issues: Vec<ScoringIssue>,
}

pub fn resolve_course_grades(
    snapshot: &CourseSnapshot,
    labeler: &dyn CriterionLabeler,
) -> CourseGrades {
    let students: Vec<StudentGrade> = snapshot
        .students()
        .iter()
        .map(|s| resolve_student_grade(snapshot, s, labeler))
        .collect();

    let passed_count = students
        .iter()
        .filter(|g| g.status == GradeStatus::Passed)
        .count();
    let class_average = if students.is_empty() {
        0.0
    } else {
        round_2dp(
            students.iter().map(|g| g.final_percentage).sum::<f64>() / (students.len() as f64),
        )
    };
    let total_weight = snapshot
        .assessments()
        .iter()
        .fold(0.0, |acc, a| acc + a.weight_percentage);
    let issues = students.iter().flat_map(|g| g.issues.clone()).collect();

    CourseGrades {
        passed_count,
        failed_count: students.len() - passed_count,
        class_average,
        total_weight: round_2dp(total_weight),
        weight_overflow: total_weight > 100.0 + SCORE_EPSILON,
        issues,
        students,
    }
}

/// Submission counts and adjusted-score spread for one assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentStats {
    pub assessment_id: String,
    pub title: String,
    pub task_code: Option<String>,
    pub total_points: f64,
    pub weight_percentage: f64,
    pub total_submissions: usize,
    pub graded_submissions: usize,
    pub average_score: Option<f64>,
    pub lowest_score: Option<f64>,
    pub highest_score: Option<f64>,
    pub average_percentage: Option<f64>,
}

pub fn summarize_assessments(snapshot: &CourseSnapshot) -> Vec<AssessmentStats> {
    snapshot
        .assessments()
        .iter()
        .map(|a| {
            let records: Vec<&ScoreRecord> = snapshot
                .students()
                .iter()
                .filter_map(|s| snapshot.record(&s.id, &a.id))
                .collect();
            let graded: Vec<&ScoreRecord> = records
                .iter()
                .copied()
                .filter(|r| r.effective_status() != SubmissionStatus::Missing)
                .collect();

            // Misconfigured assessments keep their counts but get no spread.
            let adjusted: Vec<f64> = if a.validate().is_ok() {
                graded
                    .iter()
                    .filter_map(|r| {
                        transmute(
                            r.raw_score.unwrap_or(0.0),
                            r.late_penalty,
                            a.total_points,
                            a.weight_percentage,
                            r.effective_status(),
                        )
                        .ok()
                    })
                    .map(|t| t.adjusted_score)
                    .collect()
            } else {
                Vec::new()
            };

            let (average_score, lowest_score, highest_score, average_percentage) =
                if adjusted.is_empty() {
                    (None, None, None, None)
                } else {
                    let n = adjusted.len() as f64;
                    let mean = adjusted.iter().fold(0.0, |acc, v| acc + v) / n;
                    let low = adjusted.iter().copied().fold(f64::INFINITY, f64::min);
                    let high = adjusted.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (
                        Some(round_2dp(mean)),
                        Some(low),
                        Some(high),
                        Some(round_2dp(mean / a.total_points * 100.0)),
                    )
                };

            AssessmentStats {
                assessment_id: a.id.clone(),
                title: a.title.clone(),
                task_code: a.task_code.clone(),
                total_points: a.total_points,
                weight_percentage: a.weight_percentage,
                total_submissions: records.len(),
                graded_submissions: graded.len(),
                average_score,
                lowest_score,
                highest_score,
                average_percentage,
            }
        })
        .collect()
}
