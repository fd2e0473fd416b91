use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for candidates in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// Career level used for seniority distance scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeniorityLevel {
    Junior,
    Mid,
    Senior,
    Lead,
    Principal,
}

impl SeniorityLevel {
    pub const fn rank(self) -> i8 {
        match self {
            SeniorityLevel::Junior => 0,
            SeniorityLevel::Mid => 1,
            SeniorityLevel::Senior => 2,
            SeniorityLevel::Lead => 3,
            SeniorityLevel::Principal => 4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SeniorityLevel::Junior => "junior",
            SeniorityLevel::Mid => "mid",
            SeniorityLevel::Senior => "senior",
            SeniorityLevel::Lead => "lead",
            SeniorityLevel::Principal => "principal",
        }
    }
}

/// How actively the candidate is looking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Open,
    Passive,
    NotNow,
}

impl Availability {
    pub const fn label(self) -> &'static str {
        match self {
            Availability::Open => "open",
            Availability::Passive => "passive",
            Availability::NotNow => "not_now",
        }
    }
}

/// A skill the candidate claims, with the directory's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillClaim {
    pub name: String,
    /// 0.0..=1.0, from endorsements and assessment history.
    pub confidence: f64,
}

/// Where the candidate is and how far they will move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLocation {
    pub city: String,
    pub country: String,
    pub timezone_offset_hours: i8,
    pub open_to_remote: bool,
    pub willing_to_relocate: bool,
}

/// Read-only candidate snapshot the scoring engine consumes. Supplied by
/// the external candidate directory; never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: CandidateId,
    pub role_title: String,
    pub seniority: SeniorityLevel,
    pub skills: Vec<SkillClaim>,
    pub location: CandidateLocation,
    pub availability: Availability,
    pub recommendations_count: u32,
    pub profile_visible: bool,
    pub open_to_opportunities: bool,
    pub joined_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub profile_updated_at: DateTime<Utc>,
    pub latest_recommendation_at: Option<DateTime<Utc>>,
}

/// Hiring location for a role, mirroring the candidate side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiringLocation {
    pub city: String,
    pub country: String,
    pub timezone_offset_hours: i8,
}

/// What the company is hiring for. Lives on the shortlist request and feeds
/// both follow-up detection and scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequirements {
    pub title: String,
    pub required_skills: Vec<String>,
    pub seniority: SeniorityLevel,
    pub location: HiringLocation,
    pub remote_allowed: bool,
}

/// Lower-cased whitespace tokens, for title similarity.
pub(crate) fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|token| token.to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Jaccard similarity over two token sets. Empty-vs-empty counts as zero.
pub(crate) fn jaccard(left: &[String], right: &[String]) -> f64 {
    use std::collections::BTreeSet;
    let left: BTreeSet<&str> = left.iter().map(String::as_str).collect();
    let right: BTreeSet<&str> = right.iter().map(String::as_str).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}
