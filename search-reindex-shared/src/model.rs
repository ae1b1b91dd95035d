//! Bookkeeping rows: merge ranges, upload ranges and per-entity-type status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity_type::ReindexEntityType;
use crate::error::RangeError;
use crate::range::RangeBound;

/// A partition of the source keyspace pulled into staging tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRange {
    pub id: Uuid,
    pub entity_type: ReindexEntityType,
    pub tenant_id: String,
    pub lower_bound: String,
    pub upper_bound: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fail_cause: Option<String>,
}

impl MergeRange {
    /// Create an unfinished range for `tenant_id`.
    pub fn new(entity_type: ReindexEntityType, tenant_id: impl Into<String>, bound: RangeBound) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            tenant_id: tenant_id.into(),
            lower_bound: bound.lower,
            upper_bound: bound.upper,
            created_at: Utc::now(),
            finished_at: None,
            fail_cause: None,
        }
    }

    pub fn bound(&self) -> RangeBound {
        RangeBound {
            lower: self.lower_bound.clone(),
            upper: self.upper_bound.clone(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.fail_cause.is_some()
    }
}

/// Bounds of an upload range over a canonical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadBounds {
    /// Half-open identifier bounds, see [`RangeBound`].
    Ids { lower: String, upper: String },
    /// Offset/limit paging over the table ordered by id.
    Page { offset: i64, limit: i64 },
}

impl From<RangeBound> for UploadBounds {
    fn from(bound: RangeBound) -> Self {
        Self::Ids {
            lower: bound.lower,
            upper: bound.upper,
        }
    }
}

/// A partition of a canonical table written to the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRange {
    pub id: Uuid,
    pub entity_type: ReindexEntityType,
    #[serde(flatten)]
    pub bounds: UploadBounds,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl UploadRange {
    pub fn new(entity_type: ReindexEntityType, bounds: UploadBounds) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            bounds,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Reindex phase of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    NotStarted,
    MergeInProgress,
    MergeFailed,
    UploadInProgress,
    UploadFailed,
    Completed,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::MergeInProgress => "MERGE_IN_PROGRESS",
            Self::MergeFailed => "MERGE_FAILED",
            Self::UploadInProgress => "UPLOAD_IN_PROGRESS",
            Self::UploadFailed => "UPLOAD_FAILED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::MergeFailed | Self::UploadFailed)
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusKind {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::NotStarted,
            Self::MergeInProgress,
            Self::MergeFailed,
            Self::UploadInProgress,
            Self::UploadFailed,
            Self::Completed,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
        .ok_or_else(|| RangeError::invalid_value(format!("Unknown reindex status: {}", s)))
    }
}

/// A change applied to one status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    MergeStarted { total: i32 },
    UploadStarted { total: i32 },
    ProcessedMerge(i32),
    ProcessedUpload(i32),
    MergeFailed,
    UploadFailed,
    /// Operator retry of failed merge ranges.
    MergeRetried,
    /// Staging rows reached the canonical tables; ends merge-only types.
    MergeCompleted,
}

/// Outcome of a successful merge-phase completion claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCompletion {
    /// Set when the cycle re-synchronizes a single member tenant.
    pub target_tenant_id: Option<String>,
}

/// Progress and failure counters of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexStatus {
    pub entity_type: ReindexEntityType,
    pub status: StatusKind,
    pub total_merge_ranges: i32,
    pub processed_merge_ranges: i32,
    pub total_upload_ranges: i32,
    pub processed_upload_ranges: i32,
    pub start_time_merge: Option<DateTime<Utc>>,
    pub end_time_merge: Option<DateTime<Utc>>,
    pub start_time_upload: Option<DateTime<Utc>>,
    pub end_time_upload: Option<DateTime<Utc>>,
    pub target_tenant_id: Option<String>,
}

impl ReindexStatus {
    /// The row a new cycle starts with: merge types are already merging,
    /// upload-only types wait for the upload phase.
    pub fn initial(entity_type: ReindexEntityType, target_tenant_id: Option<String>) -> Self {
        let status = if entity_type.supports_merge() {
            StatusKind::MergeInProgress
        } else {
            StatusKind::NotStarted
        };

        Self {
            entity_type,
            status,
            total_merge_ranges: 0,
            processed_merge_ranges: 0,
            total_upload_ranges: 0,
            processed_upload_ranges: 0,
            start_time_merge: None,
            end_time_merge: None,
            start_time_upload: None,
            end_time_upload: None,
            target_tenant_id,
        }
    }

    /// Apply `update`, returning true if the row changed.
    ///
    /// Transitions only move forward within a cycle; failure states are
    /// terminal and applying a failure twice is a no-op. Processed counters
    /// never exceed their totals.
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> bool {
        use StatusKind::*;

        match update {
            StatusUpdate::MergeStarted { total } => match self.status {
                NotStarted | MergeInProgress => {
                    self.status = MergeInProgress;
                    self.total_merge_ranges = total.max(0);
                    self.processed_merge_ranges =
                        self.processed_merge_ranges.min(self.total_merge_ranges);
                    self.start_time_merge.get_or_insert(now);
                    true
                }
                _ => false,
            },
            StatusUpdate::ProcessedMerge(n) => {
                let processed = clamp_add(self.processed_merge_ranges, n, self.total_merge_ranges);
                let changed = processed != self.processed_merge_ranges;
                self.processed_merge_ranges = processed;
                changed
            }
            StatusUpdate::UploadStarted { total } => match self.status {
                NotStarted | MergeInProgress | UploadInProgress => {
                    self.total_upload_ranges = total.max(0);
                    self.processed_upload_ranges = 0;
                    self.start_time_upload = Some(now);
                    self.end_time_upload = None;
                    if self.total_upload_ranges == 0 {
                        self.status = Completed;
                        self.end_time_upload = Some(now);
                    } else {
                        self.status = UploadInProgress;
                    }
                    true
                }
                _ => false,
            },
            StatusUpdate::ProcessedUpload(n) => {
                let processed =
                    clamp_add(self.processed_upload_ranges, n, self.total_upload_ranges);
                let mut changed = processed != self.processed_upload_ranges;
                self.processed_upload_ranges = processed;

                if self.status == UploadInProgress && processed == self.total_upload_ranges {
                    self.status = Completed;
                    self.end_time_upload = Some(now);
                    changed = true;
                }
                changed
            }
            StatusUpdate::MergeFailed => match self.status {
                NotStarted | MergeInProgress => {
                    self.status = MergeFailed;
                    self.end_time_merge = Some(now);
                    true
                }
                _ => false,
            },
            StatusUpdate::UploadFailed => match self.status {
                NotStarted | MergeInProgress | UploadInProgress => {
                    self.status = UploadFailed;
                    self.end_time_upload = Some(now);
                    true
                }
                _ => false,
            },
            StatusUpdate::MergeRetried => match self.status {
                MergeFailed => {
                    self.status = MergeInProgress;
                    self.end_time_merge = None;
                    true
                }
                _ => false,
            },
            StatusUpdate::MergeCompleted => {
                if self.status == MergeInProgress
                    && self.end_time_merge.is_some()
                    && !self.entity_type.supports_upload()
                {
                    self.status = Completed;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn is_merge_complete(&self) -> bool {
        self.status == StatusKind::MergeInProgress
            && self.start_time_merge.is_some()
            && self.end_time_merge.is_none()
            && self.total_merge_ranges > 0
            && self.processed_merge_ranges >= self.total_merge_ranges
    }
}

/// Claim the end of the merge phase.
///
/// Succeeds only if every merge-capable row has processed all of its ranges
/// and the phase has not been claimed yet. On success the merge end time is
/// stamped; statuses stay `MERGE_IN_PROGRESS` until the staging migration
/// either lands ([`StatusUpdate::MergeCompleted`]) or fails.
pub fn complete_merge_phase(
    rows: &mut [ReindexStatus],
    now: DateTime<Utc>,
) -> Option<MergeCompletion> {
    let merge_rows: Vec<&mut ReindexStatus> = rows
        .iter_mut()
        .filter(|row| row.entity_type.supports_merge())
        .collect();

    if merge_rows.is_empty() || !merge_rows.iter().all(|row| row.is_merge_complete()) {
        return None;
    }

    let target_tenant_id = merge_rows
        .iter()
        .find_map(|row| row.target_tenant_id.clone());

    for row in merge_rows {
        row.end_time_merge = Some(now);
    }

    Some(MergeCompletion { target_tenant_id })
}

fn clamp_add(current: i32, n: i32, total: i32) -> i32 {
    if n <= 0 {
        return current;
    }
    current.saturating_add(n).min(total.max(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::empty_range;

    fn merging(entity_type: ReindexEntityType, total: i32) -> ReindexStatus {
        let mut row = ReindexStatus::initial(entity_type, None);
        row.apply(StatusUpdate::MergeStarted { total }, Utc::now());
        row
    }

    #[test]
    fn test_initial_status_by_capability() {
        assert_eq!(
            ReindexStatus::initial(ReindexEntityType::Item, None).status,
            StatusKind::MergeInProgress
        );
        assert_eq!(
            ReindexStatus::initial(ReindexEntityType::Subject, None).status,
            StatusKind::NotStarted
        );
    }

    #[test]
    fn test_processed_never_exceeds_total() {
        let mut row = merging(ReindexEntityType::Instance, 3);
        for _ in 0..10 {
            row.apply(StatusUpdate::ProcessedMerge(2), Utc::now());
            assert!(row.processed_merge_ranges <= row.total_merge_ranges);
        }
        assert_eq!(row.processed_merge_ranges, 3);

        row.apply(StatusUpdate::UploadStarted { total: 2 }, Utc::now());
        row.apply(StatusUpdate::ProcessedUpload(5), Utc::now());
        assert_eq!(row.processed_upload_ranges, 2);
        assert_eq!(row.status, StatusKind::Completed);
    }

    #[test]
    fn test_failure_is_terminal_and_idempotent() {
        let mut row = merging(ReindexEntityType::Instance, 4);
        row.apply(StatusUpdate::ProcessedMerge(3), Utc::now());

        assert!(row.apply(StatusUpdate::MergeFailed, Utc::now()));
        assert_eq!(row.status, StatusKind::MergeFailed);
        assert_eq!(row.processed_merge_ranges, 3);

        assert!(!row.apply(StatusUpdate::MergeFailed, Utc::now()));
        assert!(!row.apply(StatusUpdate::UploadStarted { total: 1 }, Utc::now()));
        assert!(!row.apply(StatusUpdate::UploadFailed, Utc::now()));
        assert_eq!(row.status, StatusKind::MergeFailed);
        assert_eq!(row.processed_merge_ranges, 3);
    }

    #[test]
    fn test_upload_failed_after_partial_progress() {
        let mut row = ReindexStatus::initial(ReindexEntityType::Subject, None);
        row.apply(StatusUpdate::UploadStarted { total: 10 }, Utc::now());
        row.apply(StatusUpdate::ProcessedUpload(9), Utc::now());

        assert!(row.apply(StatusUpdate::UploadFailed, Utc::now()));
        assert_eq!(row.status, StatusKind::UploadFailed);
        row.apply(StatusUpdate::ProcessedUpload(1), Utc::now());
        assert_eq!(row.processed_upload_ranges, 10);
        assert_eq!(row.status, StatusKind::UploadFailed);
    }

    #[test]
    fn test_upload_with_no_ranges_completes() {
        let mut row = ReindexStatus::initial(ReindexEntityType::CallNumber, None);
        row.apply(StatusUpdate::UploadStarted { total: 0 }, Utc::now());
        assert_eq!(row.status, StatusKind::Completed);
    }

    #[test]
    fn test_merge_retry_reopens_failed_merge() {
        let mut row = merging(ReindexEntityType::Holdings, 2);
        row.apply(StatusUpdate::MergeFailed, Utc::now());
        assert!(row.apply(StatusUpdate::MergeRetried, Utc::now()));
        assert_eq!(row.status, StatusKind::MergeInProgress);
        assert!(row.end_time_merge.is_none());
        assert!(!row.apply(StatusUpdate::MergeRetried, Utc::now()));
    }

    #[test]
    fn test_complete_merge_phase_claims_once() {
        let mut rows: Vec<ReindexStatus> = ReindexEntityType::ALL
            .into_iter()
            .map(|t| {
                let mut row = ReindexStatus::initial(t, Some("member".into()));
                if t.supports_merge() {
                    row.apply(StatusUpdate::MergeStarted { total: 2 }, Utc::now());
                }
                row
            })
            .collect();

        assert!(complete_merge_phase(&mut rows, Utc::now()).is_none());

        for row in rows.iter_mut() {
            row.apply(StatusUpdate::ProcessedMerge(2), Utc::now());
        }

        let completion = complete_merge_phase(&mut rows, Utc::now()).unwrap();
        assert_eq!(completion.target_tenant_id.as_deref(), Some("member"));
        assert!(complete_merge_phase(&mut rows, Utc::now()).is_none());

        let status_of = |rows: &[ReindexStatus], t: ReindexEntityType| {
            rows.iter().find(|r| r.entity_type == t).unwrap().status
        };
        assert_eq!(status_of(&rows, ReindexEntityType::Holdings), StatusKind::MergeInProgress);
        assert_eq!(status_of(&rows, ReindexEntityType::Item), StatusKind::MergeInProgress);
        assert_eq!(status_of(&rows, ReindexEntityType::Instance), StatusKind::MergeInProgress);
        assert_eq!(status_of(&rows, ReindexEntityType::Subject), StatusKind::NotStarted);

        for row in rows.iter_mut() {
            let merge_only = row.entity_type.supports_merge() && !row.entity_type.supports_upload();
            assert_eq!(row.apply(StatusUpdate::MergeCompleted, Utc::now()), merge_only);
        }
        assert_eq!(status_of(&rows, ReindexEntityType::Holdings), StatusKind::Completed);
        assert_eq!(status_of(&rows, ReindexEntityType::Instance), StatusKind::MergeInProgress);
    }

    #[test]
    fn test_claimed_merge_phase_can_still_fail() {
        let mut rows = vec![
            merging(ReindexEntityType::Instance, 1),
            merging(ReindexEntityType::Holdings, 1),
            merging(ReindexEntityType::Item, 1),
        ];
        for row in rows.iter_mut() {
            row.apply(StatusUpdate::ProcessedMerge(1), Utc::now());
        }
        assert!(complete_merge_phase(&mut rows, Utc::now()).is_some());

        for row in rows.iter_mut() {
            assert!(row.apply(StatusUpdate::MergeFailed, Utc::now()));
            assert_eq!(row.status, StatusKind::MergeFailed);
            assert!(!row.apply(StatusUpdate::MergeCompleted, Utc::now()));
        }
    }

    #[test]
    fn test_merge_completed_requires_claim() {
        let mut row = merging(ReindexEntityType::Holdings, 1);
        row.apply(StatusUpdate::ProcessedMerge(1), Utc::now());

        assert!(!row.apply(StatusUpdate::MergeCompleted, Utc::now()));
        assert_eq!(row.status, StatusKind::MergeInProgress);
    }

    #[test]
    fn test_complete_merge_phase_blocked_by_failure() {
        let mut rows = vec![
            merging(ReindexEntityType::Instance, 1),
            merging(ReindexEntityType::Holdings, 1),
        ];
        rows[0].apply(StatusUpdate::ProcessedMerge(1), Utc::now());
        rows[1].apply(StatusUpdate::ProcessedMerge(1), Utc::now());
        rows[1].apply(StatusUpdate::MergeFailed, Utc::now());

        assert!(complete_merge_phase(&mut rows, Utc::now()).is_none());
    }

    #[test]
    fn test_upload_range_serializes_flat_bounds() {
        let range = UploadRange::new(ReindexEntityType::Instance, empty_range().into());
        let json = serde_json::to_value(&range).unwrap();
        assert_eq!(json["lower"], "00000000000000000000000000000000");
        assert_eq!(json["entityType"], "INSTANCE");

        let paged = UploadRange::new(
            ReindexEntityType::Subject,
            UploadBounds::Page { offset: 100, limit: 50 },
        );
        let json = serde_json::to_value(&paged).unwrap();
        assert_eq!(json["offset"], 100);
        let back: UploadRange = serde_json::from_value(json).unwrap();
        assert_eq!(back.bounds, UploadBounds::Page { offset: 100, limit: 50 });
    }
}
