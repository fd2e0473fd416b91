use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{PricingType, RequestId, ShortlistRequest};
use crate::engagements::matching::domain::{jaccard, tokens, RoleRequirements};

/// Injectable follow-up detection settings. Defaults carry the production
/// constants; the classification structure itself is fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpConfig {
    pub similarity_threshold: f64,
    /// Implicit linking only considers prior requests this recent.
    pub window_days: i64,
    pub title_weight: f64,
    pub seniority_weight: f64,
    pub location_weight: f64,
    pub stack_weight: f64,
    /// (inclusive upper bound in days, discount percent), ascending.
    pub discount_bands: Vec<(i64, u8)>,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.70,
            window_days: 30,
            title_weight: 0.30,
            seniority_weight: 0.20,
            location_weight: 0.15,
            stack_weight: 0.35,
            discount_bands: vec![(7, 50), (14, 40), (30, 25)],
        }
    }
}

impl FollowUpConfig {
    /// Discount for a follow-up created `elapsed_days` after the previous
    /// request. Monotonically non-increasing; past the last band it is zero.
    pub fn discount_percent(&self, elapsed_days: i64) -> u8 {
        for (max_days, percent) in &self.discount_bands {
            if elapsed_days <= *max_days {
                return *percent;
            }
        }
        0
    }

    /// Weighted similarity between two role requirement sets, in 0.0..=1.0.
    pub fn similarity(&self, new: &RoleRequirements, prior: &RoleRequirements) -> f64 {
        let title = jaccard(&tokens(&new.title), &tokens(&prior.title));

        let seniority_distance = (new.seniority.rank() - prior.seniority.rank()).abs();
        let seniority = match seniority_distance {
            0 => 1.0,
            1 => 0.5,
            _ => 0.0,
        };

        let location = if new.location.city.eq_ignore_ascii_case(&prior.location.city) {
            1.0
        } else if new
            .location
            .country
            .eq_ignore_ascii_case(&prior.location.country)
        {
            0.5
        } else {
            0.0
        };

        let new_stack: Vec<String> = new
            .required_skills
            .iter()
            .map(|skill| skill.to_ascii_lowercase())
            .collect();
        let prior_stack: Vec<String> = prior
            .required_skills
            .iter()
            .map(|skill| skill.to_ascii_lowercase())
            .collect();
        let stack = jaccard(&new_stack, &prior_stack);

        title * self.title_weight
            + seniority * self.seniority_weight
            + location * self.location_weight
            + stack * self.stack_weight
    }
}

/// Result of follow-up detection for a new request.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpClassification {
    pub pricing_type: PricingType,
    pub discount_percent: u8,
    pub previous_request_id: Option<RequestId>,
}

impl FollowUpClassification {
    fn fresh() -> Self {
        Self {
            pricing_type: PricingType::New,
            discount_percent: 0,
            previous_request_id: None,
        }
    }
}

/// Classify a new request against the company's history. An explicit link
/// always wins; otherwise the most similar recent request is considered,
/// and only accepted above the similarity threshold.
pub fn classify(
    config: &FollowUpConfig,
    requirements: &RoleRequirements,
    explicit_previous: Option<&ShortlistRequest>,
    recent: &[ShortlistRequest],
    now: DateTime<Utc>,
) -> FollowUpClassification {
    if let Some(previous) = explicit_previous {
        let elapsed = (now - previous.created_at).num_days();
        return FollowUpClassification {
            pricing_type: PricingType::FollowUp,
            discount_percent: config.discount_percent(elapsed),
            previous_request_id: Some(previous.id.clone()),
        };
    }

    let best = recent
        .iter()
        .filter(|prior| (now - prior.created_at).num_days() <= config.window_days)
        .map(|prior| (config.similarity(requirements, &prior.requirements), prior))
        .filter(|(similarity, _)| *similarity >= config.similarity_threshold)
        .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    match best {
        Some((_, prior)) => {
            let elapsed = (now - prior.created_at).num_days();
            FollowUpClassification {
                pricing_type: PricingType::FollowUp,
                discount_percent: config.discount_percent(elapsed),
                previous_request_id: Some(prior.id.clone()),
            }
        }
        None => FollowUpClassification::fresh(),
    }
}
