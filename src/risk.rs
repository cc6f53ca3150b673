// src/risk.rs
use serde::Serialize;

use crate::error::AnalysisError;

/// Project-level risk classification derived from total affected area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLabel {
    High,
    Medium,
    Low,
    Unknown,
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLabel::High => "high",
            RiskLabel::Medium => "medium",
            RiskLabel::Low => "low",
            RiskLabel::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Maps total affected area in hectares to a risk label, first match wins:
/// `>= 10` high, `>= 3` medium, `> 0` low, `0` unknown.
///
/// Negative or non-finite input is a contract violation from the caller and
/// is rejected rather than clamped.
pub fn classify_risk(affected_area_ha: f64) -> Result<RiskLabel, AnalysisError> {
    if !affected_area_ha.is_finite() || affected_area_ha < 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "affected area must be a non-negative finite number of hectares, got {affected_area_ha}"
        )));
    }
    let label = if affected_area_ha >= 10.0 {
        RiskLabel::High
    } else if affected_area_ha >= 3.0 {
        RiskLabel::Medium
    } else if affected_area_ha > 0.0 {
        RiskLabel::Low
    } else {
        RiskLabel::Unknown
    };
    Ok(label)
}
