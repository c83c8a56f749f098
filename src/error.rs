use thiserror::Error;

/// Failure kinds raised by the layout, translation and composition stages.
///
/// Correspondence-breaking kinds (count mismatches, provider errors) abort a
/// run. `CompositionFailure` is recovered per page by the composer and only
/// surfaces through logs. Page fields hold zero-based indices; messages
/// print them one-based.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("layout detection failed on page {}: {message}", .page + 1)]
    DetectionFailure { page: usize, message: String },

    #[error("page {}: expected {expected} translated paragraphs, got {actual}", .page + 1)]
    MismatchedParagraphCount {
        page: usize,
        expected: usize,
        actual: usize,
    },

    #[error("translation provider returned {actual} texts for {expected} requested")]
    MismatchedBatchLength { expected: usize, actual: usize },

    #[error("expected {expected} pages, got {actual}")]
    MismatchedPageCount { expected: usize, actual: usize },

    #[error("{provider} translation failed: {message}")]
    TranslationProviderError { provider: String, message: String },

    #[error("failed to compose page {}: {message}", .page + 1)]
    CompositionFailure { page: usize, message: String },

    #[error("malformed layout file: {0}")]
    MalformedLayoutFile(String),
}
