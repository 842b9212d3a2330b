use std::sync::Arc;

/// Identity and location of one documented symbol.
///
/// Items are immutable once built, and several public names may point at the
/// same item when a site exposes a symbol under aliases. The fields shared by
/// many items of one package or page (`package`, `group`, `base_url`,
/// `relative_url_path`) are reference-counted strings so an inventory with
/// tens of thousands of symbols does not store each value once per symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocItem {
	package: Arc<str>,
	group: Arc<str>,
	base_url: Arc<str>,
	relative_url_path: Arc<str>,
	symbol_id: Arc<str>,
}

impl DocItem {
	pub fn new(
		package: impl Into<Arc<str>>,
		group: impl Into<Arc<str>>,
		base_url: impl Into<Arc<str>>,
		relative_url_path: impl Into<Arc<str>>,
		symbol_id: impl Into<Arc<str>>,
	) -> Self {
		Self {
			package: package.into(),
			group: group.into(),
			base_url: base_url.into(),
			relative_url_path: relative_url_path.into(),
			symbol_id: symbol_id.into(),
		}
	}

	/// Package the symbol was inventoried under.
	pub fn package(&self) -> &str {
		&self.package
	}

	/// The symbol's role, e.g. `class` or `label`.
	pub fn group(&self) -> &str {
		&self.group
	}

	/// Root documentation URL of the package; same for all of its items.
	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	/// Path of the symbol's page, relative to [`Self::base_url`].
	pub fn relative_url_path(&self) -> &str {
		&self.relative_url_path
	}

	/// Fragment id locating the symbol on its page.
	pub fn symbol_id(&self) -> &str {
		&self.symbol_id
	}

	/// Absolute URL of the page the symbol lives on.
	pub fn url(&self) -> String {
		format!("{}{}", self.base_url, self.relative_url_path)
	}

	/// Absolute URL including the fragment anchoring the symbol on its page.
	pub fn anchored_url(&self) -> String {
		format!("{}#{}", self.url(), self.symbol_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn url_joins_base_and_relative_path() {
		let item = DocItem::new("python", "class", "https://docs.example/", "api.html", "Foo");
		assert_eq!(item.url(), "https://docs.example/api.html");
		assert_eq!(item.anchored_url(), "https://docs.example/api.html#Foo");
	}

	#[test]
	fn aliased_items_compare_equal() {
		let a = DocItem::new("python", "class", "https://docs.example/", "api.html", "Foo");
		let b = a.clone();
		assert_eq!(a, b);
	}
}
