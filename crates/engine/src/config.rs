//! Engine configuration.

use std::time::Duration;

use lore_symbols::NamingPolicy;

/// Tunables for [`crate::DocsEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Inventories ingested by the initial refresh and re-ingested by every
	/// later one, as `(package name, documentation base URL)` pairs. Base
	/// URLs must end with a slash.
	pub seed_inventories: Vec<(String, String)>,
	/// Naming policy driving symbol collision resolution.
	pub naming: NamingPolicy,
	/// Most lookup candidates returned per query.
	pub lookup_limit: usize,
	/// Attempts per inventory fetch before it counts as unreachable.
	pub fetch_attempts: usize,
	/// Wait before retrying an unreachable inventory for the first time.
	pub reschedule_first: Duration,
	/// Wait before every later retry of an unreachable inventory.
	pub reschedule_repeated: Duration,
	/// Socket connect timeout for fetches.
	pub connect_timeout: Duration,
	/// Socket read timeout for fetches.
	pub read_timeout: Duration,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			seed_inventories: Vec::new(),
			naming: NamingPolicy::default(),
			lookup_limit: 4,
			fetch_attempts: 3,
			reschedule_first: Duration::from_secs(2 * 60),
			reschedule_repeated: Duration::from_secs(5 * 60),
			connect_timeout: Duration::from_secs(5),
			read_timeout: Duration::from_secs(5),
		}
	}
}
