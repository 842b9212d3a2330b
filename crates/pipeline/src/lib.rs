//! Lazy page fetching, batched parsing, and render caching.
//!
//! Symbols are registered against their page at ingest time; nothing is
//! fetched until somebody asks for one of them. The first lookup of any
//! symbol on a page fetches that page exactly once, queues every known
//! symbol on it for rendering, and hands each caller a completion handle.
//! Rendered text is written through to the [`RenderCache`], which callers
//! consult before involving the pipeline at all.

use std::sync::Arc;

mod batch;
mod cache;
mod fetch;
mod render;

pub use batch::BatchPipeline;
pub use cache::RenderCache;
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use render::{ParseError, Render};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by [`BatchPipeline::get_markdown`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Fetching the symbol's page failed. The error is shared: every caller
	/// awaiting a symbol of that page sees the same failure.
	#[error("page fetch failed")]
	Fetch(#[source] Arc<FetchError>),
	/// The pipeline was cleared while this lookup was in flight.
	#[error("pipeline cleared while waiting for a result")]
	Cleared,
}
