//! Candidate scoring: a pure, deterministic function from (candidate pool,
//! role requirements, chain context) to a ranked match list. No I/O, no
//! mutation; identical inputs always produce identical output.

pub mod config;
pub mod domain;
mod rules;

pub use config::{FreshnessBonus, ScoringConfig};
pub use domain::{
    Availability, CandidateId, CandidateLocation, CandidateProfile, HiringLocation,
    RoleRequirements, SeniorityLevel, SkillClaim,
};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

/// Discrete contribution to a candidate's score, kept for transparent
/// audits and for building the match-reason sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreComponent {
    pub label: &'static str,
    pub points: f64,
    pub note: String,
}

/// Chain context for a scoring run.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    /// Candidates already delivered in this follow-up chain.
    pub excluded: BTreeSet<CandidateId>,
    /// Operator overrides of the exclusion set, keyed to the required
    /// re-inclusion reason.
    pub re_included: BTreeMap<CandidateId, String>,
    pub follow_up: bool,
    pub previous_created_at: Option<DateTime<Utc>>,
}

/// One ranked result. `re_inclusion_reason` is set only for candidates the
/// operator pulled back in past the exclusion set.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate_id: CandidateId,
    pub score: f64,
    pub rank: u32,
    pub match_reason: String,
    pub components: Vec<ScoreComponent>,
    pub re_inclusion_reason: Option<String>,
}

impl RankedCandidate {
    /// Score clamped into the stored 0-100 scale.
    pub fn rounded_score(&self) -> u8 {
        self.score.round().clamp(0.0, 100.0) as u8
    }
}

/// Stateless evaluator applying the configured weights to a candidate pool.
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score and rank the pool against the requirements. Sorted strictly
    /// descending by score, ties broken by most recent activity then id,
    /// capped at `max_results`, dense 1-based ranks.
    pub fn rank(
        &self,
        pool: &[CandidateProfile],
        requirements: &RoleRequirements,
        context: &MatchContext,
        now: DateTime<Utc>,
    ) -> Vec<RankedCandidate> {
        let mut scored: Vec<(RankedCandidate, DateTime<Utc>)> = pool
            .iter()
            .filter(|profile| profile.profile_visible && profile.open_to_opportunities)
            .filter_map(|profile| {
                let re_inclusion_reason = context.re_included.get(&profile.id).cloned();
                if context.excluded.contains(&profile.id) && re_inclusion_reason.is_none() {
                    return None;
                }
                let (components, score) = self.score(profile, requirements, context, now);
                if score < self.config.minimum_score {
                    return None;
                }
                let match_reason = match_reason(&components);
                Some((
                    RankedCandidate {
                        candidate_id: profile.id.clone(),
                        score,
                        rank: 0,
                        match_reason,
                        components,
                        re_inclusion_reason,
                    },
                    profile.last_active_at,
                ))
            })
            .collect();

        scored.sort_by(|(a, a_active), (b, b_active)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b_active.cmp(a_active))
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        scored.truncate(self.config.max_results);

        scored
            .into_iter()
            .enumerate()
            .map(|(index, (mut candidate, _))| {
                candidate.rank = index as u32 + 1;
                candidate
            })
            .collect()
    }

    /// Score a single profile, for operator re-inclusion of an otherwise
    /// excluded candidate.
    pub fn score_profile(
        &self,
        profile: &CandidateProfile,
        requirements: &RoleRequirements,
        context: &MatchContext,
        now: DateTime<Utc>,
    ) -> (Vec<ScoreComponent>, f64) {
        self.score(profile, requirements, context, now)
    }

    fn score(
        &self,
        profile: &CandidateProfile,
        requirements: &RoleRequirements,
        context: &MatchContext,
        now: DateTime<Utc>,
    ) -> (Vec<ScoreComponent>, f64) {
        let mut components = vec![
            rules::skills_component(profile, requirements, &self.config),
            rules::seniority_component(profile, requirements, &self.config),
            rules::role_title_component(profile, requirements, &self.config),
            rules::recency_component(profile, &self.config, now),
            rules::location_component(profile, requirements, &self.config),
            rules::availability_component(profile, &self.config),
            rules::recommendations_component(profile, &self.config),
        ];
        if context.follow_up {
            if let Some(previous) = context.previous_created_at {
                if let Some(bonus) = rules::freshness_component(profile, &self.config, previous) {
                    components.push(bonus);
                }
            }
        }
        let total = components.iter().map(|component| component.points).sum();
        (components, total)
    }
}

fn match_reason(components: &[ScoreComponent]) -> String {
    let mut strongest: Vec<&ScoreComponent> = components.iter().collect();
    strongest.sort_by(|a, b| {
        b.points
            .partial_cmp(&a.points)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    strongest
        .iter()
        .take(2)
        .map(|component| component.note.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
