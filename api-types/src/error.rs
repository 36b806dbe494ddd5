//! The pipeline's error taxonomy (spec §7).
//!
//! Every kind the design calls out gets its own variant so callers can match
//! on it instead of parsing messages. Library code returns
//! `Result<T, PipelineError>`; orchestration glue (job loops, the CLI) is
//! free to widen to `anyhow::Error` via `?`, matching the split the teacher
//! repo draws between `pbs-datastore`'s concrete errors and `src/bin`'s use
//! of `anyhow`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("no cached data for {date}: {hint}")]
    MissingData { date: String, hint: String },

    #[error("integrity check failed: {}", .issues.join("; "))]
    Integrity { issues: Vec<String> },

    #[error("corrupted file {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    #[error("upstream report unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("transient failure: {source}")]
    Transient {
        #[source]
        source: anyhow::Error,
    },

    #[error("schema incompatible: found {found}, expected {expected}")]
    SchemaIncompatible { found: String, expected: String },
}

impl PipelineError {
    /// Messages matching these substrings are classified as upstream
    /// unavailability rather than a hard failure (spec §4.9, rule 6).
    pub const UNAVAILABLE_MARKERS: &'static [&'static str] = &[
        "not available",
        "dashboard returned",
        "Date selection failed",
        "not found",
        "404",
    ];

    pub fn classify_fetch_error(err: &anyhow::Error) -> PipelineError {
        let message = err.to_string();
        if Self::UNAVAILABLE_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            PipelineError::UpstreamUnavailable { message }
        } else {
            PipelineError::Transient {
                source: anyhow::anyhow!(message),
            }
        }
    }

    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, PipelineError::UpstreamUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_unavailable_markers() {
        let err = anyhow::anyhow!("Date selection failed for 2026-01-20");
        assert!(PipelineError::classify_fetch_error(&err).is_upstream_unavailable());

        let err = anyhow::anyhow!("dashboard returned empty body");
        assert!(PipelineError::classify_fetch_error(&err).is_upstream_unavailable());
    }

    #[test]
    fn classifies_unknown_errors_as_transient() {
        let err = anyhow::anyhow!("connection reset by peer");
        let classified = PipelineError::classify_fetch_error(&err);
        assert!(!classified.is_upstream_unavailable());
        assert!(matches!(classified, PipelineError::Transient { .. }));
    }
}
