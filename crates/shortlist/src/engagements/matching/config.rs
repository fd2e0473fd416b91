use serde::{Deserialize, Serialize};

/// Injectable scoring weights. The formula's structure is fixed; callers may
/// tune the shares without touching the rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Share of the 100-point base awarded for skill coverage.
    pub skills_weight: f64,
    /// Points for seniority distance (part of the 25% seniority+role share).
    pub seniority_weight: f64,
    /// Points for role-title similarity (the rest of that share).
    pub role_title_weight: f64,
    pub recency_weight: f64,
    pub location_weight: f64,
    pub availability_weight: f64,
    pub recommendations_weight: f64,
    /// Candidates scoring below this are dropped from results entirely.
    pub minimum_score: f64,
    pub max_results: usize,
    pub freshness: FreshnessBonus,
}

/// Follow-up freshness bonus, applied on top of the 100-point base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessBonus {
    pub joined_since_previous: f64,
    pub active_since_previous: f64,
    pub updated_since_previous: f64,
    pub recommended_since_previous: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            skills_weight: 45.0,
            seniority_weight: 15.0,
            role_title_weight: 10.0,
            recency_weight: 10.0,
            location_weight: 5.0,
            availability_weight: 5.0,
            recommendations_weight: 5.0,
            minimum_score: 20.0,
            max_results: 15,
            freshness: FreshnessBonus {
                joined_since_previous: 10.0,
                active_since_previous: 5.0,
                updated_since_previous: 5.0,
                recommended_since_previous: 5.0,
            },
        }
    }
}
