use crate::comparison::ComparisonEngine;
use crate::fetch::Fetcher;
use crate::store::ComparisonStore;
use respdiff_common::{
    CompareRequest, ComparisonRecord, RawResponse, RespDiffError, ServiceConfig, Side,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{error, info};

/// Result of one end-to-end comparison
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub record: ComparisonRecord,
    /// False when the record was computed but could not be saved
    pub persisted: bool,
}

/// Runs comparison requests concurrently with a bounded number in flight.
///
/// Each request fetches both sides, hands them to the engine on the blocking
/// pool and saves the resulting record.
#[derive(Clone)]
pub struct ComparisonService {
    fetcher: Arc<dyn Fetcher>,
    engine: Arc<ComparisonEngine>,
    store: Arc<dyn ComparisonStore>,
    permits: Arc<Semaphore>,
}

impl ComparisonService {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        engine: Arc<ComparisonEngine>,
        store: Arc<dyn ComparisonStore>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            fetcher,
            engine,
            store,
            permits: Arc::new(Semaphore::new(config.max_concurrent_comparisons.max(1))),
        }
    }

    pub fn engine(&self) -> &Arc<ComparisonEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn ComparisonStore> {
        &self.store
    }

    pub async fn run(&self, request: &CompareRequest) -> Result<ComparisonOutcome, RespDiffError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RespDiffError::Cancelled)?;

        let (left, right) = tokio::try_join!(
            self.fetch_side(request, Side::Left),
            self.fetch_side(request, Side::Right)
        )?;

        // Dropping this future (client gone) tells the engine to stop
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancel));

        let engine = Arc::clone(&self.engine);
        let owned_request = request.clone();
        let record = tokio::task::spawn_blocking(move || {
            engine.compare_with_cancel(&owned_request, left, right, Some(cancel.as_ref()))
        })
        .await
        .map_err(join_error)??;

        let store = Arc::clone(&self.store);
        let stored = record.clone();
        let saved = tokio::task::spawn_blocking(move || store.save(&stored))
            .await
            .map_err(join_error)
            .and_then(|result| result);

        let persisted = match saved {
            Ok(id) => {
                info!("Stored comparison {}", id);
                true
            }
            Err(e) => {
                error!("Failed to store comparison {}: {}", record.id, e);
                false
            }
        };

        Ok(ComparisonOutcome { record, persisted })
    }

    /// Fetch one side; a transport failure surfaces as an empty response
    async fn fetch_side(&self, request: &CompareRequest, side: Side) -> Result<RawResponse, RespDiffError> {
        match self.fetcher.fetch(request.endpoint(side)).await {
            Ok(raw) => Ok(raw),
            Err(RespDiffError::Transport { url, message }) => Err(RespDiffError::EmptyResponse {
                side,
                reason: format!("fetching {} failed: {}", url, message),
            }),
            Err(other) => Err(other),
        }
    }
}

/// Raises the cancel flag when dropped
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn join_error(err: JoinError) -> RespDiffError {
    if err.is_cancelled() {
        RespDiffError::Cancelled
    } else {
        RespDiffError::Io(std::io::Error::other(format!("Comparison task failed: {}", err)))
    }
}
