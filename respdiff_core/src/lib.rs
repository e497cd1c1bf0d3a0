pub mod cache;
pub mod comparison;
pub mod detect;
pub mod differ;
pub mod fetch;
pub mod metrics;
pub mod normalizer;
pub mod render;
pub mod service;
pub mod store;

pub use cache::{CacheKey, NormalizationCache};
pub use comparison::{ComparisonEngine, PreparedSide};
pub use detect::detect_format;
pub use differ::Differ;
pub use fetch::{Fetcher, HttpFetcher};
pub use normalizer::{Normalizer, NormalizerOptions};
pub use render::{
    diff_summary, format_split, format_unified, inline_changes, render_split, render_unified,
    truncate, InlineSegment, LineMarker, SplitRow, UnifiedLine,
};
pub use service::{ComparisonOutcome, ComparisonService};
pub use store::{ComparisonStore, FileStore, MemoryStore};
