use chrono::{DateTime, Utc};

use super::domain::{CompanyId, RequestId, ShortlistCandidate, ShortlistRequest, ShortlistStatus};

/// Storage abstraction for shortlist requests and their candidate rows.
///
/// `update` is the concurrency primitive: the write commits only when the
/// stored status still equals `expected`, so two racing transitions on the
/// same request cannot both win. The loser sees `Conflict` and must re-read.
pub trait RequestRepository: Send + Sync {
    fn insert(&self, request: ShortlistRequest) -> Result<ShortlistRequest, RepositoryError>;

    fn fetch(&self, id: &RequestId) -> Result<Option<ShortlistRequest>, RepositoryError>;

    /// Compare-and-swap write keyed on the status read by the caller.
    fn update(
        &self,
        expected: ShortlistStatus,
        request: ShortlistRequest,
    ) -> Result<(), RepositoryError>;

    /// Requests a company created at or after `since`, for implicit
    /// follow-up detection.
    fn recent_for_company(
        &self,
        company: &CompanyId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ShortlistRequest>, RepositoryError>;

    /// Replace the candidate rows for a request with a fresh scoring run.
    fn store_candidates(
        &self,
        request_id: &RequestId,
        rows: Vec<ShortlistCandidate>,
    ) -> Result<(), RepositoryError>;

    /// Append a single row, for operator re-inclusions.
    fn append_candidate(&self, row: ShortlistCandidate) -> Result<(), RepositoryError>;

    fn candidates(&self, request_id: &RequestId)
        -> Result<Vec<ShortlistCandidate>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("request was modified concurrently")]
    Conflict,
    #[error("request not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
