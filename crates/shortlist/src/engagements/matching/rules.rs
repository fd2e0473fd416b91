use chrono::{DateTime, Utc};

use super::config::ScoringConfig;
use super::domain::{jaccard, tokens, Availability, CandidateProfile, RoleRequirements};
use super::ScoreComponent;

fn skill_matches(required: &str, claimed: &str) -> bool {
    let required = required.to_ascii_lowercase();
    let claimed = claimed.to_ascii_lowercase();
    claimed.contains(&required) || required.contains(&claimed)
}

pub(crate) fn skills_component(
    profile: &CandidateProfile,
    requirements: &RoleRequirements,
    config: &ScoringConfig,
) -> ScoreComponent {
    if requirements.required_skills.is_empty() {
        return ScoreComponent {
            label: "skills",
            points: config.skills_weight / 2.0,
            note: "no required skills specified".to_string(),
        };
    }

    let mut matched = 0usize;
    let mut confidence_sum = 0.0;
    for required in &requirements.required_skills {
        let best = profile
            .skills
            .iter()
            .filter(|claim| skill_matches(required, &claim.name))
            .map(|claim| claim.confidence)
            .fold(None::<f64>, |best, confidence| {
                Some(best.map_or(confidence, |b| b.max(confidence)))
            });
        if let Some(confidence) = best {
            matched += 1;
            confidence_sum += confidence;
        }
    }

    let total = requirements.required_skills.len();
    let overlap_ratio = matched as f64 / total as f64;
    let mean_confidence = if matched == 0 {
        0.0
    } else {
        confidence_sum / matched as f64
    };
    ScoreComponent {
        label: "skills",
        points: (overlap_ratio * 0.7 + mean_confidence * 0.3) * config.skills_weight,
        note: format!("matches {matched} of {total} required skills"),
    }
}

pub(crate) fn seniority_component(
    profile: &CandidateProfile,
    requirements: &RoleRequirements,
    config: &ScoringConfig,
) -> ScoreComponent {
    let distance = (profile.seniority.rank() - requirements.seniority.rank()).abs();
    let share = match distance {
        0 => 1.0,
        1 => 0.7,
        2 => 0.4,
        _ => 0.2,
    };
    let note = if distance == 0 {
        format!("{} seniority, exact match", profile.seniority.label())
    } else {
        format!(
            "{} seniority, {distance} level(s) from {}",
            profile.seniority.label(),
            requirements.seniority.label()
        )
    };
    ScoreComponent {
        label: "seniority",
        points: share * config.seniority_weight,
        note,
    }
}

pub(crate) fn role_title_component(
    profile: &CandidateProfile,
    requirements: &RoleRequirements,
    config: &ScoringConfig,
) -> ScoreComponent {
    let similarity = jaccard(&tokens(&profile.role_title), &tokens(&requirements.title));
    ScoreComponent {
        label: "role_title",
        points: similarity * config.role_title_weight,
        note: format!("title similarity {similarity:.2}"),
    }
}

pub(crate) fn recency_component(
    profile: &CandidateProfile,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> ScoreComponent {
    let days = (now - profile.last_active_at).num_days().max(0);
    let share = match days {
        0 => 1.0,
        1..=2 => 0.9,
        3..=6 => 0.75,
        7..=13 => 0.55,
        14..=29 => 0.35,
        30..=59 => 0.2,
        _ => 0.1,
    };
    ScoreComponent {
        label: "recency",
        points: share * config.recency_weight,
        note: format!("last active {days} day(s) ago"),
    }
}

const LOCATION_RAW_MAX: f64 = 85.0;

pub(crate) fn location_component(
    profile: &CandidateProfile,
    requirements: &RoleRequirements,
    config: &ScoringConfig,
) -> ScoreComponent {
    let candidate = &profile.location;
    let role = &requirements.location;
    let mut raw = 0.0;
    let mut reasons: Vec<&str> = Vec::new();

    if requirements.remote_allowed && candidate.open_to_remote {
        raw += 25.0;
        reasons.push("remote fit");
    }
    if candidate.city.eq_ignore_ascii_case(&role.city) {
        raw += 25.0;
        reasons.push("same city");
    }
    if candidate.country.eq_ignore_ascii_case(&role.country) {
        raw += 15.0;
        reasons.push("same country");
    }
    if (candidate.timezone_offset_hours - role.timezone_offset_hours).abs() <= 2 {
        raw += 10.0;
        reasons.push("timezone overlap");
    }
    if candidate.willing_to_relocate {
        raw += 10.0;
        reasons.push("open to relocation");
    }

    let note = if reasons.is_empty() {
        "no location overlap".to_string()
    } else {
        reasons.join(", ")
    };
    ScoreComponent {
        label: "location",
        points: raw / LOCATION_RAW_MAX * config.location_weight,
        note,
    }
}

pub(crate) fn availability_component(
    profile: &CandidateProfile,
    config: &ScoringConfig,
) -> ScoreComponent {
    let share = match profile.availability {
        Availability::Open => 1.0,
        Availability::Passive => 0.5,
        Availability::NotNow => 0.2,
    };
    ScoreComponent {
        label: "availability",
        points: share * config.availability_weight,
        note: format!("{} to opportunities", profile.availability.label()),
    }
}

pub(crate) fn recommendations_component(
    profile: &CandidateProfile,
    config: &ScoringConfig,
) -> ScoreComponent {
    let share = match profile.recommendations_count {
        0 => 0.0,
        1..=2 => 0.5,
        3..=4 => 0.8,
        _ => 1.0,
    };
    ScoreComponent {
        label: "recommendations",
        points: share * config.recommendations_weight,
        note: format!("{} recommendation(s)", profile.recommendations_count),
    }
}

/// Bonus for candidates whose situation changed since the previous request
/// in the chain. Applied on top of the 100-point base, follow-ups only.
pub(crate) fn freshness_component(
    profile: &CandidateProfile,
    config: &ScoringConfig,
    previous_created_at: DateTime<Utc>,
) -> Option<ScoreComponent> {
    let mut points = 0.0;
    let mut reasons: Vec<&str> = Vec::new();

    if profile.joined_at > previous_created_at {
        points += config.freshness.joined_since_previous;
        reasons.push("joined since the previous search");
    }
    if profile.last_active_at > previous_created_at {
        points += config.freshness.active_since_previous;
        reasons.push("active since");
    }
    if profile.profile_updated_at > previous_created_at {
        points += config.freshness.updated_since_previous;
        reasons.push("profile updated since");
    }
    if profile
        .latest_recommendation_at
        .map(|at| at > previous_created_at)
        .unwrap_or(false)
    {
        points += config.freshness.recommended_since_previous;
        reasons.push("newly recommended");
    }

    if points == 0.0 {
        return None;
    }
    Some(ScoreComponent {
        label: "freshness",
        points,
        note: reasons.join(", "),
    })
}
