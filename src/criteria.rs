use crate::model::Assessment;
use crate::transmute::ScoredAssessment;
use serde::Serialize;

/// Parent criteria recognized anywhere in an assessment title, checked in order.
pub const CANONICAL_CRITERIA: [&str; 10] = [
    "Written Assessment",
    "Midterm Examination",
    "Final Examination",
    "Laboratory Assessment",
    "Laboratory Activity",
    "Project",
    "Assignment",
    "Quiz",
    "Presentation",
    "Case Study",
];

pub const FALLBACK_CRITERION: &str = "Other";

/// Maps an assessment title to the criterion it is grouped under.
pub trait CriterionLabeler {
    fn label(&self, title: &str) -> String;
}

/// Default policy: canonical names first, then suffix stripping.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalTitles;

impl CriterionLabeler for CanonicalTitles {
    fn label(&self, title: &str) -> String {
        derive_parent_label(title)
    }
}

impl<F> CriterionLabeler for F
where
    F: Fn(&str) -> String,
{
    fn label(&self, title: &str) -> String {
        self(title)
    }
}

/// Explicit labels win; blank ones fall through to the labeler.
pub fn criterion_for(assessment: &Assessment, labeler: &dyn CriterionLabeler) -> String {
    match assessment.criterion.as_deref().map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => labeler.label(&assessment.title),
    }
}

/// "Quiz 3" -> "Quiz", "Lab Report (Group A)" -> "Lab Report",
/// "Essay - Draft" -> "Essay". Never fails.
pub fn derive_parent_label(title: &str) -> String {
    let lowered = title.to_lowercase();
    for canonical in CANONICAL_CRITERIA {
        if lowered.contains(&canonical.to_lowercase()) {
            return canonical.to_string();
        }
    }

    let stripped = strip_trailing_number(title);
    let stripped = strip_trailing_parenthetical(stripped);
    let stripped = strip_dash_suffix(stripped);

    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        FALLBACK_CRITERION.to_string()
    } else {
        trimmed.to_string()
    }
}

// Whitespace then digits at the very end.
fn strip_trailing_number(s: &str) -> &str {
    let without_digits = s.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() == s.len() {
        return s;
    }
    let without_ws = without_digits.trim_end();
    if without_ws.len() == without_digits.len() {
        return s;
    }
    without_ws
}

// Whitespace then "(...)" running to the end; the first such paren wins.
fn strip_trailing_parenthetical(s: &str) -> &str {
    if !s.ends_with(')') {
        return s;
    }
    for (i, c) in s.char_indices() {
        if c != '(' || i == 0 {
            continue;
        }
        let head = &s[..i];
        let trimmed = head.trim_end();
        if trimmed.len() < head.len() {
            return trimmed;
        }
    }
    s
}

fn strip_dash_suffix(s: &str) -> &str {
    match s.find(" - ") {
        Some(i) => &s[..i],
        None => s,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionTotal {
    pub criterion_name: String,
    pub total_transmuted: f64,
    pub member_count: usize,
    /// Display only; never fed back into grading.
    pub display_average: f64,
}

/// Sums transmuted scores per criterion, in first-seen order.
pub fn aggregate_by_criterion(lines: &[ScoredAssessment]) -> Vec<CriterionTotal> {
    let mut groups: Vec<CriterionTotal> = Vec::new();
    for line in lines {
        let idx = match groups
            .iter()
            .position(|g| g.criterion_name == line.criterion)
        {
            Some(i) => i,
            None => {
                groups.push(CriterionTotal {
                    criterion_name: line.criterion.clone(),
                    total_transmuted: 0.0,
                    member_count: 0,
                    display_average: 0.0,
                });
                groups.len() - 1
            }
        };
        let g = &mut groups[idx];
        g.total_transmuted += line.score.transmuted_score;
        g.member_count += 1;
    }
    for g in &mut groups {
        g.display_average = if g.member_count > 0 {
            g.total_transmuted / (g.member_count as f64)
        } else {
            0.0
        };
    }
    groups
}
