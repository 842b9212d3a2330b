//! Per-symbol render cache, partitioned by package.

use std::collections::HashMap;

use lore_symbols::DocItem;
use parking_lot::Mutex;

/// Caches rendered text per `(package, symbol id)`.
///
/// Entries have no expiry; invalidation is explicit, per package or in full,
/// and dropping a package discards its whole partition at once.
#[derive(Debug, Default)]
pub struct RenderCache {
	packages: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl RenderCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Store the rendered text for `item`.
	pub fn set(&self, item: &DocItem, text: String) {
		self.packages
			.lock()
			.entry(item.package().to_owned())
			.or_default()
			.insert(item.symbol_id().to_owned(), text);
	}

	/// Rendered text for `item`, if present.
	pub fn get(&self, item: &DocItem) -> Option<String> {
		self.packages
			.lock()
			.get(item.package())?
			.get(item.symbol_id())
			.cloned()
	}

	/// Drop `package`'s entries, or every entry when `package` is `None`.
	/// Reports whether anything was removed.
	pub fn delete(&self, package: Option<&str>) -> bool {
		let mut packages = self.packages.lock();
		match package {
			Some(package) => packages.remove(package).is_some(),
			None => {
				let had_entries = !packages.is_empty();
				packages.clear();
				had_entries
			}
		}
	}
}
