//! Rendering seam: structural page parse plus per-symbol text conversion.

use lore_symbols::DocItem;

/// A symbol's page fragment could not be converted to text.
#[derive(Debug, thiserror::Error)]
#[error("malformed page markup: {0}")]
pub struct ParseError(pub String);

/// Converts fetched page bytes into per-symbol rendered text.
///
/// `parse` does the CPU-bound structural work once per page; `render`
/// extracts and converts one symbol's fragment from the parsed document.
/// The pipeline runs both on blocking workers, so implementations must be
/// self-contained pure functions over their inputs.
pub trait Render: Send + Sync + 'static {
	/// Parsed form of one page, shared by every symbol on it.
	type Document: Send + Sync + 'static;

	/// Structurally parse a fetched page.
	fn parse(&self, bytes: &[u8]) -> Result<Self::Document, ParseError>;

	/// Render the fragment `item` points at inside `document`.
	fn render(&self, document: &Self::Document, item: &DocItem) -> Result<String, ParseError>;
}
