//! ILO attainment: per-student rates, fixed range bands, cohort counts,
//! criterion coverage and the course-level summary.

use crate::criteria::{criterion_for, CriterionLabeler};
use crate::error::{EngineError, ScoringIssue};
use crate::grade::{at_least, round_2dp};
use crate::model::{
    Assessment, Ilo, OutcomeMapping, ReferenceType, Student, SubmissionStatus, Thresholds,
};
use crate::outcomes::resolve_mapping_text;
use crate::snapshot::CourseSnapshot;
use crate::transmute::ScoredAssessment;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RangeBucket {
    #[serde(rename = "90-100")]
    From90To100,
    #[serde(rename = "80-89")]
    From80To89,
    #[serde(rename = "70-79")]
    From70To79,
    #[serde(rename = "60-69")]
    From60To69,
    #[serde(rename = "50-59")]
    From50To59,
    #[serde(rename = "0-49")]
    From0To49,
}

impl RangeBucket {
    pub const ALL: [RangeBucket; 6] = [
        RangeBucket::From90To100,
        RangeBucket::From80To89,
        RangeBucket::From70To79,
        RangeBucket::From60To69,
        RangeBucket::From50To59,
        RangeBucket::From0To49,
    ];

    /// Bands are chosen by lower bound on the unrounded rate, so 89.5 lands
    /// in 80-89.
    pub fn from_rate(rate: f64) -> Self {
        if at_least(rate, 90.0) {
            RangeBucket::From90To100
        } else if at_least(rate, 80.0) {
            RangeBucket::From80To89
        } else if at_least(rate, 70.0) {
            RangeBucket::From70To79
        } else if at_least(rate, 60.0) {
            RangeBucket::From60To69
        } else if at_least(rate, 50.0) {
            RangeBucket::From50To59
        } else {
            RangeBucket::From0To49
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RangeBucket::From90To100 => "90-100",
            RangeBucket::From80To89 => "80-89",
            RangeBucket::From70To79 => "70-79",
            RangeBucket::From60To69 => "60-69",
            RangeBucket::From50To59 => "50-59",
            RangeBucket::From0To49 => "0-49",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceFilter {
    #[default]
    All,
    High,
    Low,
}

impl PerformanceFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(PerformanceFilter::All),
            "high" => Some(PerformanceFilter::High),
            "low" => Some(PerformanceFilter::Low),
            _ => None,
        }
    }

    fn admits(self, s: &StudentAttainment) -> bool {
        match self {
            PerformanceFilter::All => true,
            PerformanceFilter::High => s.is_high_performer,
            PerformanceFilter::Low => s.is_low_performer,
        }
    }
}

/// Picks the mapping an ILO is viewed through.
pub fn resolve_lens<'a>(
    ilo: &'a Ilo,
    reference_type: ReferenceType,
    reference_id: &str,
) -> Result<&'a OutcomeMapping, EngineError> {
    ilo.mappings
        .iter()
        .find(|m| m.reference_type == reference_type && m.reference_id == reference_id)
        .ok_or_else(|| {
            EngineError::config(
                format!("ILO {}", ilo.code),
                format!(
                    "no {} mapping for reference {}",
                    reference_type.as_str(),
                    reference_id
                ),
            )
        })
}

/// Assessments whose task code is evidence for the ILO (or the lens mapping).
/// With no task-code filter anywhere, every course assessment contributes.
pub fn contributing_assessments<'a>(
    snapshot: &'a CourseSnapshot,
    ilo: &Ilo,
    lens: Option<&OutcomeMapping>,
) -> Vec<&'a Assessment> {
    let mappings: Vec<&OutcomeMapping> = match lens {
        Some(m) => vec![m],
        None => ilo.mappings.iter().collect(),
    };
    let codes: HashSet<String> = mappings
        .iter()
        .flat_map(|m| m.task_codes.iter())
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    if codes.is_empty() {
        return snapshot.assessments().iter().collect();
    }
    snapshot
        .assessments()
        .iter()
        .filter(|a| {
            a.task_code
                .as_deref()
                .map(|c| codes.contains(&c.trim().to_ascii_lowercase()))
                .unwrap_or(false)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttainment {
    pub student_id: String,
    pub display_name: String,
    pub student_number: Option<String>,
    pub ilo_score: f64,
    pub overall_attainment_rate: f64,
    pub range_bucket: RangeBucket,
    pub is_attained: bool,
    pub is_high_performer: bool,
    pub is_low_performer: bool,
    pub assessments: Vec<ScoredAssessment>,
    pub issues: Vec<ScoringIssue>,
}

pub fn classify_student(
    snapshot: &CourseSnapshot,
    student: &Student,
    assessments: &[&Assessment],
    thresholds: &Thresholds,
    labeler: &dyn CriterionLabeler,
) -> StudentAttainment {
    let (lines, issues) =
        snapshot.score_many(&student.id, assessments.iter().copied(), labeler);

    let earned = lines.iter().fold(0.0, |acc, l| acc + l.score.adjusted_score);
    let possible = lines.iter().fold(0.0, |acc, l| acc + l.total_points);
    let rate = if possible > 0.0 {
        (earned / possible * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let ilo_score = round_2dp(lines.iter().fold(0.0, |acc, l| acc + l.score.transmuted_score));

    StudentAttainment {
        student_id: student.id.clone(),
        display_name: student.display_name.clone(),
        student_number: student.student_number.clone(),
        ilo_score,
        overall_attainment_rate: round_2dp(rate),
        range_bucket: RangeBucket::from_rate(rate),
        is_attained: at_least(rate, thresholds.pass),
        is_high_performer: !at_least(thresholds.high, rate),
        is_low_performer: !at_least(rate, thresholds.low),
        assessments: lines,
        issues,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedOutcome {
    #[serde(rename = "type")]
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeCount {
    pub range: RangeBucket,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeGroup {
    pub range: RangeBucket,
    pub count: usize,
    pub student_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Performer {
    pub student_id: String,
    pub display_name: String,
    pub overall_attainment_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributingAssessment {
    pub assessment_id: String,
    pub title: String,
    pub task_code: Option<String>,
    pub total_points: f64,
    pub weight_percentage: f64,
    pub submissions_count: usize,
    pub average_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IloAttainment {
    pub ilo_id: String,
    pub ilo_code: String,
    pub description: String,
    pub mapped_to: Vec<MappedOutcome>,
    pub thresholds: Thresholds,
    pub total_students: usize,
    pub attained_count: usize,
    pub attainment_percentage: f64,
    pub average_score: f64,
    pub range_distribution: Vec<RangeCount>,
    pub high_performers: Vec<Performer>,
    pub low_performers: Vec<Performer>,
    pub assessments: Vec<ContributingAssessment>,
    pub students: Vec<StudentAttainment>,
    pub students_by_range: Vec<RangeGroup>,
    pub issues: Vec<ScoringIssue>,
}

pub fn classify_ilo(
    snapshot: &CourseSnapshot,
    ilo: &Ilo,
    lens: Option<&OutcomeMapping>,
    thresholds: &Thresholds,
    filter: PerformanceFilter,
    labeler: &dyn CriterionLabeler,
) -> Result<IloAttainment, EngineError> {
    thresholds.validate()?;

    // A lens view only needs its own mapping to resolve.
    let shown: Vec<&OutcomeMapping> = match lens {
        Some(m) => vec![m],
        None => ilo.mappings.iter().collect(),
    };
    let mut mapped_to = Vec::with_capacity(shown.len());
    for m in shown {
        let (code, _) = resolve_mapping_text(snapshot, m)?;
        mapped_to.push(MappedOutcome {
            reference_type: m.reference_type,
            reference_id: m.reference_id.clone(),
            code,
        });
    }

    let assessments = contributing_assessments(snapshot, ilo, lens);
    let all: Vec<StudentAttainment> = snapshot
        .students()
        .iter()
        .map(|s| classify_student(snapshot, s, &assessments, thresholds, labeler))
        .collect();

    let total_students = all.len();
    let attained_count = all.iter().filter(|s| s.is_attained).count();
    let attainment_percentage = if total_students > 0 {
        round_2dp(attained_count as f64 / total_students as f64 * 100.0)
    } else {
        0.0
    };
    let average_score = if total_students > 0 {
        round_2dp(all.iter().map(|s| s.ilo_score).sum::<f64>() / total_students as f64)
    } else {
        0.0
    };

    let range_distribution = RangeBucket::ALL
        .iter()
        .map(|&range| RangeCount {
            range,
            count: all.iter().filter(|s| s.range_bucket == range).count(),
        })
        .collect();

    let performer = |s: &StudentAttainment| Performer {
        student_id: s.student_id.clone(),
        display_name: s.display_name.clone(),
        overall_attainment_rate: s.overall_attainment_rate,
    };
    let high_performers = all.iter().filter(|s| s.is_high_performer).map(performer).collect();
    let low_performers = all.iter().filter(|s| s.is_low_performer).map(performer).collect();

    let contributing = assessments
        .iter()
        .map(|a| cohort_assessment_average(snapshot, a, labeler))
        .collect();

    let issues = all.iter().flat_map(|s| s.issues.clone()).collect();
    let students: Vec<StudentAttainment> = all.into_iter().filter(|s| filter.admits(s)).collect();
    let students_by_range = RangeBucket::ALL
        .iter()
        .filter_map(|&range| {
            let ids: Vec<String> = students
                .iter()
                .filter(|s| s.range_bucket == range)
                .map(|s| s.student_id.clone())
                .collect();
            (!ids.is_empty()).then(|| RangeGroup {
                range,
                count: ids.len(),
                student_ids: ids,
            })
        })
        .collect();

    Ok(IloAttainment {
        ilo_id: ilo.id.clone(),
        ilo_code: ilo.code.clone(),
        description: ilo.description.clone(),
        mapped_to,
        thresholds: *thresholds,
        total_students,
        attained_count,
        attainment_percentage,
        average_score,
        range_distribution,
        high_performers,
        low_performers,
        assessments: contributing,
        students,
        students_by_range,
        issues,
    })
}

// Mean display percentage over submitted (non-missing) records.
fn cohort_assessment_average(
    snapshot: &CourseSnapshot,
    assessment: &Assessment,
    labeler: &dyn CriterionLabeler,
) -> ContributingAssessment {
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for s in snapshot.students() {
        let Ok(line) = snapshot.score(&s.id, assessment, labeler) else {
            continue;
        };
        if line.submission_status == SubmissionStatus::Missing {
            continue;
        }
        sum += line.score.display_percentage;
        count += 1;
    }
    ContributingAssessment {
        assessment_id: assessment.id.clone(),
        title: assessment.title.clone(),
        task_code: assessment.task_code.clone(),
        total_points: assessment.total_points,
        weight_percentage: assessment.weight_percentage,
        submissions_count: count,
        average_percentage: if count > 0 {
            round_2dp(sum / count as f64)
        } else {
            0.0
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionCoverage {
    pub criterion_name: String,
    pub assessment_ids: Vec<String>,
    pub passed_count: usize,
    pub total_students: usize,
    pub coverage_percentage: f64,
}

/// Binary coverage per parent criterion: a student passes a group when any
/// one member assessment meets the pass threshold.
pub fn coverage_by_criterion(
    snapshot: &CourseSnapshot,
    assessments: &[&Assessment],
    thresholds: &Thresholds,
    labeler: &dyn CriterionLabeler,
) -> Result<Vec<CriterionCoverage>, EngineError> {
    thresholds.validate()?;

    let mut groups: Vec<(String, Vec<&Assessment>)> = Vec::new();
    for a in assessments {
        let name = criterion_for(a, labeler);
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, members)) => members.push(a),
            None => groups.push((name, vec![a])),
        }
    }

    let total_students = snapshot.students().len();
    let out = groups
        .into_iter()
        .map(|(criterion_name, members)| {
            let passed_count = snapshot
                .students()
                .iter()
                .filter(|s| {
                    members.iter().any(|a| {
                        snapshot
                            .score(&s.id, a, labeler)
                            .map(|l| at_least(l.score.display_percentage, thresholds.pass))
                            .unwrap_or(false)
                    })
                })
                .count();
            CriterionCoverage {
                criterion_name,
                assessment_ids: members.iter().map(|a| a.id.clone()).collect(),
                passed_count,
                total_students,
                coverage_percentage: if total_students > 0 {
                    round_2dp(passed_count as f64 / total_students as f64 * 100.0)
                } else {
                    0.0
                },
            }
        })
        .collect();
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IloSummaryRow {
    pub ilo_id: String,
    pub ilo_code: String,
    pub description: String,
    pub mapped_to: Vec<MappedOutcome>,
    pub total_students: usize,
    pub attained_count: usize,
    pub attainment_percentage: f64,
    pub high_performer_count: usize,
    pub low_performer_count: usize,
    pub average_score: f64,
    pub range_distribution: Vec<RangeCount>,
}

impl From<&IloAttainment> for IloSummaryRow {
    fn from(a: &IloAttainment) -> Self {
        Self {
            ilo_id: a.ilo_id.clone(),
            ilo_code: a.ilo_code.clone(),
            description: a.description.clone(),
            mapped_to: a.mapped_to.clone(),
            total_students: a.total_students,
            attained_count: a.attained_count,
            attainment_percentage: a.attainment_percentage,
            high_performer_count: a.high_performers.len(),
            low_performer_count: a.low_performers.len(),
            average_score: a.average_score,
            range_distribution: a.range_distribution.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IloFailure {
    pub ilo_id: String,
    pub ilo_code: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseAttainment {
    pub thresholds: Thresholds,
    pub total_ilos: usize,
    pub total_students: usize,
    pub overall_attainment_rate: f64,
    pub ilo_attainment: Vec<IloSummaryRow>,
    pub interpretation: Vec<String>,
    pub failures: Vec<IloFailure>,
    pub issues: Vec<ScoringIssue>,
}

/// One summary row per ILO; an ILO that cannot be classified is listed in
/// `failures` without hiding the others.
pub fn summarize_course(
    snapshot: &CourseSnapshot,
    thresholds: &Thresholds,
    labeler: &dyn CriterionLabeler,
) -> Result<CourseAttainment, EngineError> {
    thresholds.validate()?;

    let mut rows: Vec<IloSummaryRow> = Vec::new();
    let mut failures = Vec::new();
    let mut issues: Vec<ScoringIssue> = Vec::new();
    for ilo in snapshot.ilos() {
        match classify_ilo(snapshot, ilo, None, thresholds, PerformanceFilter::All, labeler) {
            Ok(a) => {
                for issue in &a.issues {
                    if !issues.contains(issue) {
                        issues.push(issue.clone());
                    }
                }
                rows.push(IloSummaryRow::from(&a));
            }
            Err(e) => {
                tracing::warn!(ilo = %ilo.code, error = %e, "ILO skipped in course summary");
                failures.push(IloFailure {
                    ilo_id: ilo.id.clone(),
                    ilo_code: ilo.code.clone(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    let overall_attainment_rate = if rows.is_empty() {
        0.0
    } else {
        round_2dp(rows.iter().map(|r| r.attainment_percentage).sum::<f64>() / rows.len() as f64)
    };
    let interpretation = interpret(&rows, thresholds.pass);

    Ok(CourseAttainment {
        thresholds: *thresholds,
        total_ilos: rows.len(),
        total_students: snapshot.students().len(),
        overall_attainment_rate,
        ilo_attainment: rows,
        interpretation,
        failures,
        issues,
    })
}

fn interpret(rows: &[IloSummaryRow], pass: f64) -> Vec<String> {
    let mut lines = Vec::new();
    if rows.is_empty() {
        return lines;
    }

    let missed = rows
        .iter()
        .filter(|r| !at_least(r.attainment_percentage, pass))
        .count();
    if missed == 0 {
        lines.push("All ILOs are successfully attained.".to_string());
    } else {
        lines.push(format!(
            "{} ILO(s) did not meet the {}% threshold.",
            missed, pass
        ));
    }

    let mut best = &rows[0];
    for r in rows {
        if r.attainment_percentage > best.attainment_percentage {
            best = r;
        }
    }
    if best.attainment_percentage >= 100.0 {
        let subject = if best.description.trim().is_empty() {
            "this learning outcome".to_string()
        } else {
            best.description.to_lowercase()
        };
        lines.push(format!(
            "{} (100%) reflects students' full proficiency in {}.",
            best.ilo_code, subject
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CanonicalTitles;
    use crate::model::ScoreRecord;
    use crate::snapshot::SnapshotInput;

    fn student(i: usize) -> Student {
        Student {
            id: format!("s{}", i),
            display_name: format!("Student {}", i),
            student_number: None,
        }
    }

    fn assessment(id: &str, title: &str, task: &str) -> Assessment {
        Assessment {
            id: id.into(),
            title: title.into(),
            criterion: None,
            total_points: 100.0,
            weight_percentage: 25.0,
            task_code: Some(task.into()),
        }
    }

    fn scored(a: &str, s: &str, raw: f64) -> ScoreRecord {
        ScoreRecord {
            assessment_id: a.into(),
            student_id: s.into(),
            raw_score: Some(raw),
            late_penalty: 0.0,
            submission_status: SubmissionStatus::Ontime,
        }
    }

    fn mapping(reference_id: &str, tasks: &[&str]) -> OutcomeMapping {
        OutcomeMapping {
            reference_type: ReferenceType::So,
            reference_id: reference_id.into(),
            code: Some(format!("SO{}", reference_id)),
            description: None,
            task_codes: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Ten students on one assessment with the given raw scores.
    fn cohort(raws: &[f64]) -> CourseSnapshot {
        let students: Vec<Student> = (0..raws.len()).map(student).collect();
        let scores = raws
            .iter()
            .enumerate()
            .map(|(i, r)| scored("a1", &format!("s{}", i), *r))
            .collect();
        CourseSnapshot::new(SnapshotInput {
            assessments: vec![assessment("a1", "Project 1", "PR")],
            students,
            scores,
            ilos: vec![Ilo {
                id: "ilo1".into(),
                code: "ILO1".into(),
                description: "Design a relational schema".into(),
                mappings: vec![mapping("1", &[])],
            }],
            ..SnapshotInput::default()
        })
        .expect("snapshot")
    }

    #[test]
    fn seven_of_ten_attain() {
        let snap = cohort(&[95.0, 88.0, 81.0, 80.0, 78.0, 75.0, 76.0, 74.0, 50.0, 10.0]);
        let ilo = &snap.ilos()[0];
        let r = classify_ilo(
            &snap,
            ilo,
            None,
            &Thresholds::default(),
            PerformanceFilter::All,
            &CanonicalTitles,
        )
        .expect("classify");
        assert_eq!(r.total_students, 10);
        assert_eq!(r.attained_count, 7);
        assert_eq!(r.attainment_percentage, 70.0);

        let total: usize = r.range_distribution.iter().map(|c| c.count).sum();
        assert_eq!(total, 10);
        assert_eq!(r.range_distribution.len(), 6);

        // > 80 is high; 80 itself and the 75-80 band are neither.
        let high: Vec<&str> = r.high_performers.iter().map(|p| p.student_id.as_str()).collect();
        assert_eq!(high, vec!["s0", "s1", "s2"]);
        let low: Vec<&str> = r.low_performers.iter().map(|p| p.student_id.as_str()).collect();
        assert_eq!(low, vec!["s7", "s8", "s9"]);
    }

    #[test]
    fn bands_by_lower_bound() {
        assert_eq!(RangeBucket::from_rate(100.0), RangeBucket::From90To100);
        assert_eq!(RangeBucket::from_rate(89.5), RangeBucket::From80To89);
        assert_eq!(RangeBucket::from_rate(70.0), RangeBucket::From70To79);
        assert_eq!(RangeBucket::from_rate(59.99), RangeBucket::From50To59);
        assert_eq!(RangeBucket::from_rate(0.0), RangeBucket::From0To49);
        assert_eq!(RangeBucket::From60To69.label(), "60-69");
    }

    #[test]
    fn task_code_filter_and_lens() {
        let snap = CourseSnapshot::new(SnapshotInput {
            assessments: vec![
                assessment("q1", "Quiz 1", "QZ"),
                assessment("p1", "Project 1", "PR"),
                assessment("x1", "Exam", "EX"),
            ],
            students: vec![student(0)],
            scores: vec![scored("q1", "s0", 100.0), scored("p1", "s0", 50.0)],
            ilos: vec![Ilo {
                id: "ilo1".into(),
                code: "ILO1".into(),
                description: String::new(),
                mappings: vec![mapping("1", &["qz"]), mapping("2", &["PR"])],
            }],
            ..SnapshotInput::default()
        })
        .expect("snapshot");
        let ilo = &snap.ilos()[0];

        let ids: Vec<&str> = contributing_assessments(&snap, ilo, None)
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["q1", "p1"]);

        let lens = resolve_lens(ilo, ReferenceType::So, "2").expect("lens");
        let ids: Vec<&str> = contributing_assessments(&snap, ilo, Some(lens))
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["p1"]);

        assert_eq!(
            resolve_lens(ilo, ReferenceType::Sdg, "2").unwrap_err().code(),
            "bad_config"
        );

        let r = classify_ilo(
            &snap,
            ilo,
            None,
            &Thresholds::default(),
            PerformanceFilter::All,
            &CanonicalTitles,
        )
        .expect("classify");
        // (100 + 50) / 200
        assert_eq!(r.students[0].overall_attainment_rate, 75.0);
        assert!(r.students[0].is_attained);
        assert_eq!(r.students[0].assessments.len(), 2);
        assert_eq!(r.assessments[1].average_percentage, 50.0);
    }

    #[test]
    fn missing_work_counts_against_rate() {
        let snap = CourseSnapshot::new(SnapshotInput {
            assessments: vec![assessment("q1", "Quiz 1", "QZ"), assessment("q2", "Quiz 2", "QZ")],
            students: vec![student(0)],
            scores: vec![scored("q1", "s0", 90.0)],
            ilos: vec![Ilo {
                id: "ilo1".into(),
                code: "ILO1".into(),
                description: String::new(),
                mappings: Vec::new(),
            }],
            ..SnapshotInput::default()
        })
        .expect("snapshot");
        let r = classify_ilo(
            &snap,
            &snap.ilos()[0],
            None,
            &Thresholds::default(),
            PerformanceFilter::Low,
            &CanonicalTitles,
        )
        .expect("classify");
        assert_eq!(r.students.len(), 1);
        assert_eq!(r.students[0].overall_attainment_rate, 45.0);
        assert_eq!(r.students[0].range_bucket, RangeBucket::From0To49);
        assert_eq!(r.students_by_range.len(), 1);
    }

    #[test]
    fn coverage_uses_any_member() {
        let snap = CourseSnapshot::new(SnapshotInput {
            assessments: vec![
                assessment("q1", "Quiz 1", "QZ"),
                assessment("q2", "Quiz 2", "QZ"),
                assessment("p1", "Project", "PR"),
            ],
            students: vec![student(0), student(1)],
            scores: vec![
                scored("q1", "s0", 40.0),
                scored("q2", "s0", 90.0),
                scored("q1", "s1", 60.0),
                scored("q2", "s1", 70.0),
                scored("p1", "s1", 75.0),
            ],
            ..SnapshotInput::default()
        })
        .expect("snapshot");
        let all: Vec<&Assessment> = snap.assessments().iter().collect();
        let cov = coverage_by_criterion(&snap, &all, &Thresholds::default(), &CanonicalTitles)
            .expect("coverage");
        assert_eq!(cov.len(), 2);
        assert_eq!(cov[0].criterion_name, "Quiz");
        assert_eq!(cov[0].assessment_ids, vec!["q1", "q2"]);
        assert_eq!(cov[0].passed_count, 1);
        assert_eq!(cov[0].coverage_percentage, 50.0);
        assert_eq!(cov[1].criterion_name, "Project");
        assert_eq!(cov[1].passed_count, 1);
    }

    #[test]
    fn course_summary_interprets_results() {
        let snap = cohort(&[100.0, 100.0]);
        let summary =
            summarize_course(&snap, &Thresholds::default(), &CanonicalTitles).expect("summary");
        assert_eq!(summary.total_ilos, 1);
        assert_eq!(summary.overall_attainment_rate, 100.0);
        assert_eq!(summary.interpretation[0], "All ILOs are successfully attained.");
        assert_eq!(
            summary.interpretation[1],
            "ILO1 (100%) reflects students' full proficiency in design a relational schema."
        );

        let weak = cohort(&[10.0, 100.0]);
        let summary =
            summarize_course(&weak, &Thresholds::default(), &CanonicalTitles).expect("summary");
        assert_eq!(summary.interpretation, vec!["1 ILO(s) did not meet the 75% threshold."]);
    }

    #[test]
    fn unresolved_reference_is_isolated_to_its_ilo() {
        let mut input = SnapshotInput {
            assessments: vec![assessment("a1", "Project 1", "PR")],
            students: vec![student(0)],
            scores: vec![scored("a1", "s0", 90.0)],
            ..SnapshotInput::default()
        };
        let mut orphan = mapping("9", &[]);
        orphan.code = None;
        input.ilos = vec![
            Ilo {
                id: "ilo1".into(),
                code: "ILO1".into(),
                description: String::new(),
                mappings: vec![mapping("1", &[])],
            },
            Ilo {
                id: "ilo2".into(),
                code: "ILO2".into(),
                description: String::new(),
                mappings: vec![orphan],
            },
        ];
        let snap = CourseSnapshot::new(input).expect("snapshot");
        let summary =
            summarize_course(&snap, &Thresholds::default(), &CanonicalTitles).expect("summary");
        assert_eq!(summary.total_ilos, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].ilo_code, "ILO2");
        assert_eq!(summary.failures[0].code, "bad_config");
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let snap = cohort(&[90.0]);
        let bad = Thresholds {
            high: 120.0,
            ..Thresholds::default()
        };
        assert!(summarize_course(&snap, &bad, &CanonicalTitles).is_err());
    }

    #[test]
    fn lens_view_ignores_unresolved_sibling_mappings() {
        let mut orphan = mapping("9", &[]);
        orphan.code = None;
        let snap = CourseSnapshot::new(SnapshotInput {
            assessments: vec![assessment("p1", "Project 1", "PR")],
            students: vec![student(0)],
            scores: vec![scored("p1", "s0", 80.0)],
            ilos: vec![Ilo {
                id: "ilo1".into(),
                code: "ILO1".into(),
                description: String::new(),
                mappings: vec![mapping("1", &["PR"]), orphan],
            }],
            ..SnapshotInput::default()
        })
        .expect("snapshot");
        let ilo = &snap.ilos()[0];

        let lens = resolve_lens(ilo, ReferenceType::So, "1").expect("lens");
        let r = classify_ilo(
            &snap,
            ilo,
            Some(lens),
            &Thresholds::default(),
            PerformanceFilter::All,
            &CanonicalTitles,
        )
        .expect("lens view");
        assert_eq!(r.mapped_to.len(), 1);
        assert_eq!(r.mapped_to[0].code, "SO1");
        assert_eq!(r.attained_count, 1);

        let whole = classify_ilo(
            &snap,
            ilo,
            None,
            &Thresholds::default(),
            PerformanceFilter::All,
            &CanonicalTitles,
        );
        assert_eq!(whole.unwrap_err().code(), "bad_config");
    }

    #[test]
    fn rates_just_under_the_pass_line_are_not_attained() {
        let mut a = assessment("fe", "Final Examination", "FE");
        a.total_points = 1_000_000.0;
        let snap = CourseSnapshot::new(SnapshotInput {
            assessments: vec![a],
            students: vec![student(0)],
            scores: vec![scored("fe", "s0", 749_960.0)],
            ilos: vec![Ilo {
                id: "ilo1".into(),
                code: "ILO1".into(),
                description: String::new(),
                mappings: Vec::new(),
            }],
            ..SnapshotInput::default()
        })
        .expect("snapshot");
        let r = classify_ilo(
            &snap,
            &snap.ilos()[0],
            None,
            &Thresholds::default(),
            PerformanceFilter::All,
            &CanonicalTitles,
        )
        .expect("classify");
        let s = &r.students[0];
        // 74.996 is reported as 75.00 but stays below the line.
        assert_eq!(s.overall_attainment_rate, 75.0);
        assert!(!s.is_attained);
        assert!(s.is_low_performer);
        assert_eq!(s.range_bucket, RangeBucket::From70To79);
        assert_eq!(r.attained_count, 0);
    }
}
