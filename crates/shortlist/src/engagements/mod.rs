//! Engagement domain: paid candidate-shortlist requests from intake
//! through scoring, pricing, settlement, and audit.

pub mod events;
pub mod matching;
pub mod payments;
pub mod shortlist;
