use crate::error::EngineError;
use crate::model::{OutcomeMapping, ReferenceType};
use crate::snapshot::CourseSnapshot;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCombination {
    pub combination_key: String,
    pub combination_label: String,
    pub ilo_id: String,
    pub ilo_code: String,
    pub ilo_description: String,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub reference_code: String,
    pub reference_description: String,
}

pub fn combination_key(ilo_id: &str, reference_id: &str) -> String {
    format!("{}_{}", ilo_id, reference_id)
}

/// Code and description for a mapping, falling back to the reference catalog.
pub fn resolve_mapping_text(
    snapshot: &CourseSnapshot,
    mapping: &OutcomeMapping,
) -> Result<(String, String), EngineError> {
    let catalog = snapshot.reference(mapping.reference_type, &mapping.reference_id);
    let code = mapping
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .or_else(|| catalog.map(|r| r.code.clone()));
    let Some(code) = code else {
        return Err(EngineError::config(
            format!(
                "{} reference {}",
                mapping.reference_type.as_str(),
                mapping.reference_id
            ),
            "reference is not in the outcome catalog",
        ));
    };
    let description = mapping
        .description
        .clone()
        .or_else(|| catalog.map(|r| r.description.clone()))
        .unwrap_or_default();
    Ok((code, description))
}

/// ILO order, then mapping order. Keys must be unique within a reference type.
pub fn resolve_combinations(
    snapshot: &CourseSnapshot,
    reference_type: Option<ReferenceType>,
) -> Result<Vec<OutcomeCombination>, EngineError> {
    let mut seen: HashSet<(ReferenceType, String)> = HashSet::new();
    let mut rows = Vec::new();
    for ilo in snapshot.ilos() {
        for m in &ilo.mappings {
            if reference_type.map(|t| t != m.reference_type).unwrap_or(false) {
                continue;
            }
            let key = combination_key(&ilo.id, &m.reference_id);
            if !seen.insert((m.reference_type, key.clone())) {
                return Err(EngineError::config(
                    format!("ILO {}", ilo.code),
                    format!(
                        "duplicate {} combination key {}",
                        m.reference_type.as_str(),
                        key
                    ),
                ));
            }
            let (reference_code, reference_description) = resolve_mapping_text(snapshot, m)?;
            rows.push(OutcomeCombination {
                combination_label: format!("{} - {}", ilo.code, reference_code),
                combination_key: key,
                ilo_id: ilo.id.clone(),
                ilo_code: ilo.code.clone(),
                ilo_description: ilo.description.clone(),
                reference_type: m.reference_type,
                reference_id: m.reference_id.clone(),
                reference_code,
                reference_description,
            });
        }
    }
    Ok(rows)
}

pub fn find_combination<'a>(
    rows: &'a [OutcomeCombination],
    reference_type: ReferenceType,
    key: &str,
) -> Option<&'a OutcomeCombination> {
    rows.iter()
        .find(|r| r.reference_type == reference_type && r.combination_key == key)
}
