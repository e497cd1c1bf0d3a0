use crate::cache::{CacheKey, NormalizationCache};
use crate::detect::detect_format;
use crate::differ::Differ;
use crate::metrics;
use crate::normalizer::{Normalizer, NormalizerOptions};
use chrono::Utc;
use similar::Algorithm;
use respdiff_common::{
    CompareRequest, ComparisonRecord, ContentFormat, DiffAlgorithm, EngineConfig, NormalizedDocument,
    RawResponse, RecordId, RespDiffError, Side,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// One side after detection and normalization
#[derive(Debug, Clone)]
pub struct PreparedSide {
    pub format: ContentFormat,
    pub document: Arc<NormalizedDocument>,
}

/// Comparison engine: detect, normalize, diff and measure two responses
#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    normalizer: Normalizer,
    differ: Differ,
    cache: NormalizationCache,
}

impl ComparisonEngine {
    pub fn new(normalizer: Normalizer, differ: Differ, cache: NormalizationCache) -> Self {
        Self {
            normalizer,
            differ,
            cache,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let normalizer = Normalizer::with_options(NormalizerOptions {
            expand_embedded_json: config.expand_embedded_json,
        });
        let algorithm = match config.diff_algorithm {
            DiffAlgorithm::Myers => Algorithm::Myers,
            DiffAlgorithm::Patience => Algorithm::Patience,
            DiffAlgorithm::Lcs => Algorithm::Lcs,
        };
        Self::new(
            normalizer,
            Differ::new().with_algorithm(algorithm),
            NormalizationCache::new(config.cache_capacity),
        )
    }

    pub fn differ(&self) -> &Differ {
        &self.differ
    }

    pub fn cache(&self) -> &NormalizationCache {
        &self.cache
    }

    /// Compare two fetched responses and assemble a record.
    ///
    /// Fails with `EmptyResponse` when either body is empty and with
    /// `UnsupportedFormat` when a body does not parse as its detected format.
    pub fn compare(
        &self,
        request: &CompareRequest,
        left: RawResponse,
        right: RawResponse,
    ) -> Result<ComparisonRecord, RespDiffError> {
        self.compare_with_cancel(request, left, right, None)
    }

    pub fn compare_with_cancel(
        &self,
        request: &CompareRequest,
        left: RawResponse,
        right: RawResponse,
        cancel: Option<&AtomicBool>,
    ) -> Result<ComparisonRecord, RespDiffError> {
        ensure_not_empty(Side::Left, &left)?;
        ensure_not_empty(Side::Right, &right)?;

        let (left_side, right_side) = rayon::join(
            || self.prepare(Side::Left, &left),
            || self.prepare(Side::Right, &right),
        );
        let (left_side, right_side) = (left_side?, right_side?);

        if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
            return Err(RespDiffError::Cancelled);
        }

        let diff_result = self.differ.diff(&left_side.document, &right_side.document);
        let metrics = metrics::compute(&left_side.document, &right_side.document, &diff_result);

        info!(
            "Compared {} ({}) with {} ({}): {} differences",
            request.left.url,
            left_side.format,
            request.right.url,
            right_side.format,
            metrics.diff_count
        );

        let right_request_payload = if request.right.payload != request.left.payload {
            request.right.payload.clone()
        } else {
            None
        };

        Ok(ComparisonRecord {
            id: RecordId::new(),
            left_url: request.left.url.clone(),
            right_url: request.right.url.clone(),
            method: request.left.method,
            request_payload: request.left.payload.clone(),
            right_request_payload,
            left_raw: left,
            right_raw: right,
            left_format: left_side.format,
            right_format: right_side.format,
            diff_result,
            metrics,
            created_at: Utc::now(),
        })
    }

    /// Detect and normalize one body, going through the cache
    pub fn prepare(&self, side: Side, raw: &RawResponse) -> Result<PreparedSide, RespDiffError> {
        let format = detect_format(&raw.content_type, &raw.body);
        let key = CacheKey::new(&raw.content_type, format, &raw.body, self.normalizer.options());

        if let Some(document) = self.cache.get(&key) {
            return Ok(PreparedSide { format, document });
        }

        let document = self
            .normalizer
            .normalize(format, &raw.body)
            .map(Arc::new)
            .map_err(|e| e.into_unsupported(side))?;
        debug!("{} side detected as {}", side, format);

        self.cache.put(key, Arc::clone(&document));
        Ok(PreparedSide { format, document })
    }
}

impl Default for ComparisonEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

fn ensure_not_empty(side: Side, raw: &RawResponse) -> Result<(), RespDiffError> {
    if raw.is_empty() {
        return Err(RespDiffError::EmptyResponse {
            side,
            reason: format!("status {} with an empty body", raw.status_code),
        });
    }
    Ok(())
}
