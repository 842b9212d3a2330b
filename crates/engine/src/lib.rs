//! Documentation symbol resolution engine.
//!
//! Ties the inventory decoder, symbol registry, and page-parse pipeline
//! together: ingestion (fetch → decode → register → map to page), the
//! refresh lifecycle with retry scheduling for unreachable inventories, and
//! the lookup path (registry search → render cache → pipeline).
//!
//! The engine is the only component that mutates shared state, and it does
//! so under two cooperating guards: a shared-access gate drained before any
//! refresh rebuild, and a keyed lock serializing refresh-triggering
//! operations against each other.

mod config;
mod engine;

pub use config::EngineConfig;
pub use engine::{DocsEngine, RefreshReport, base_url_from_inventory_url};

pub use lore_inventory::Inventory;
pub use lore_pipeline::{FetchError, Fetcher, HttpFetcher, Render, RenderCache};
pub use lore_symbols::{DocItem, NamingPolicy};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the engine's public operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// A refresh-triggering operation found another refresh in progress.
	#[error("an inventory refresh is already in progress")]
	RefreshInProgress,
	/// The inventory could not be fetched and decoded after all attempts.
	#[error("no inventory available at `{url}`")]
	InventoryUnavailable {
		/// The inventory URL that stayed unreachable.
		url: String,
	},
	/// A supplied URL does not parse.
	#[error("invalid url: {0}")]
	Url(#[from] url::ParseError),
	/// A base URL must end with a slash for relative paths to join onto it.
	#[error("base url `{0}` does not end with a slash")]
	BaseUrlShape(String),
	/// Retrieving a symbol's page failed.
	#[error(transparent)]
	Pipeline(#[from] lore_pipeline::Error),
}
