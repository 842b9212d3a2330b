//! Documentation symbol identity and naming.
//!
//! [`DocItem`] identifies one documented symbol and where it lives on its
//! documentation site. [`SymbolRegistry`] owns the public name → item
//! mapping and the collision-resolution algorithm that keeps every name
//! unique when several packages or symbol groups claim the same one.
//! [`search`] ranks registered names against a fuzzy query.

mod finder;
mod item;
mod registry;

pub use finder::search;
pub use item::DocItem;
pub use registry::{
	DEFAULT_FORCE_PREFIX_GROUPS, DEFAULT_PRIORITY_PACKAGES, NamingPolicy, SymbolRegistry,
};
