use thiserror::Error;

/// Failure classes for a single refresh cycle.
///
/// All variants are recoverable at the cycle boundary: a failed cycle is
/// logged and discarded, and never replaces a previously published snapshot.
/// Callers only ever see one of these on a true cold start.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// Network failure or timeout talking to the upstream data source.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream responded, but the payload had an unexpected shape.
    #[error("upstream returned malformed data: {0}")]
    UpstreamMalformed(String),

    /// Every player was excluded by the eligibility rules. Treated as a
    /// failed cycle rather than an empty-but-valid snapshot.
    #[error("no eligible players after exclusion rules")]
    NoEligiblePlayers,

    /// Internal zero-denominator guard. Resolved by excluding the offending
    /// player inside the calculator, so this never fails a cycle in practice.
    #[error("division guard triggered: {0}")]
    DivisionGuard(String),
}
