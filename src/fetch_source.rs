//! Abstract retrieval of a report for `(districtId, date)` (spec §2, §6
//! "Fetch Source contract (consumed)") — kept a thin capability interface
//! per SPEC_FULL §9: each consumer is parameterized by the minimal set of
//! methods it needs, rather than depending on any particular transport.
//! Grounded on the teacher's `pbs_client::HttpClient` trait boundary
//! between transport and pipeline: the pipeline only ever calls an
//! abstract method, never a concrete client.

use async_trait::async_trait;

use district_report_types::CsvRecord;

/// Three report record arrays for one district, as returned by one
/// `fetch_district` call (spec §6: "returns three record arrays
/// `(district, division, club)`").
pub struct DistrictReports {
    pub district: Vec<CsvRecord>,
    pub division: Vec<CsvRecord>,
    pub club: Vec<CsvRecord>,
}

/// Consumed by the Snapshot Builder and Backfill Controller. Implementors
/// own the actual transport (browser automation, HTTP, a local fixture for
/// tests) and are expected to apply their own timeout; per spec §5, the
/// pipeline treats a timeout only as whatever its error message classifies
/// to (`PipelineError::classify_fetch_error`).
///
/// On a date absent from the upstream dashboard, an implementation must
/// fail with an error whose message contains one of
/// [`district_report_types::PipelineError::UNAVAILABLE_MARKERS`].
#[async_trait]
pub trait FetchSource: Send + Sync {
    async fn fetch_all_districts(&self, date: &str) -> anyhow::Result<Vec<CsvRecord>>;

    async fn fetch_district(&self, district_id: &str, date: &str) -> anyhow::Result<DistrictReports>;
}
