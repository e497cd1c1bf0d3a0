use chrono::{DateTime, Utc};
use respdiff_common::{ComparisonMetrics, ComparisonRecord, ContentFormat, DiffStats, RecordId};
use respdiff_core::{diff_summary, render_split, render_unified, SplitRow};
use serde::Serialize;

/// JSON projection of a comparison, shared by `--json` output and the HTTP API
#[derive(Debug, Serialize)]
pub struct ComparisonReport {
    pub id: RecordId,
    pub status: &'static str,
    pub left_url: String,
    pub right_url: String,
    pub left_content_type: ContentFormat,
    pub right_content_type: ContentFormat,
    pub metrics: ComparisonMetrics,
    pub stats: DiffStats,
    pub diff_summary: String,
    pub unified: Vec<String>,
    pub split: Vec<SplitRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl ComparisonReport {
    pub fn new(record: &ComparisonRecord, summary_chars: usize, persisted: Option<bool>) -> Self {
        Self {
            id: record.id,
            status: "success",
            left_url: record.left_url.clone(),
            right_url: record.right_url.clone(),
            left_content_type: record.left_format,
            right_content_type: record.right_format,
            metrics: record.metrics,
            stats: record.diff_result.stats(),
            diff_summary: diff_summary(&record.diff_result, summary_chars),
            unified: render_unified(&record.diff_result)
                .iter()
                .map(ToString::to_string)
                .collect(),
            split: render_split(&record.diff_result),
            persisted,
            created_at: record.created_at,
        }
    }
}

/// One line of comparison history
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub left_url: String,
    pub right_url: String,
    pub left_content_type: ContentFormat,
    pub right_content_type: ContentFormat,
    pub diff_count: usize,
    pub formats_matched: bool,
}

impl From<&ComparisonRecord> for HistoryEntry {
    fn from(record: &ComparisonRecord) -> Self {
        Self {
            id: record.id,
            created_at: record.created_at,
            left_url: record.left_url.clone(),
            right_url: record.right_url.clone(),
            left_content_type: record.left_format,
            right_content_type: record.right_format,
            diff_count: record.metrics.diff_count,
            formats_matched: record.metrics.formats_matched,
        }
    }
}
