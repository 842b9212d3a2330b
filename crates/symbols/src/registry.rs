//! Public symbol naming and collision resolution.

use std::collections::HashMap;

use tracing::debug;

use crate::DocItem;

/// Packages whose symbols win the bare name on cross-package conflicts.
pub const DEFAULT_PRIORITY_PACKAGES: &[&str] = &["python"];

/// Symbol groups that are inherently ambiguous (a `label` or `term` named
/// `function` says little by itself) and therefore qualified on conflict.
/// Order matters: the earlier a group appears, the more authoritative it is.
pub const DEFAULT_FORCE_PREFIX_GROUPS: &[&str] =
	&["term", "label", "token", "doc", "pdbcommand", "2to3fixer"];

/// Naming policy driving collision resolution.
#[derive(Debug, Clone)]
pub struct NamingPolicy {
	/// Packages that keep bare names against other packages.
	pub priority_packages: Vec<String>,
	/// Ambiguous groups in authority order; see [`DEFAULT_FORCE_PREFIX_GROUPS`].
	pub force_prefix_groups: Vec<String>,
}

impl Default for NamingPolicy {
	fn default() -> Self {
		Self {
			priority_packages: DEFAULT_PRIORITY_PACKAGES
				.iter()
				.map(|package| (*package).to_owned())
				.collect(),
			force_prefix_groups: DEFAULT_FORCE_PREFIX_GROUPS
				.iter()
				.map(|group| (*group).to_owned())
				.collect(),
		}
	}
}

/// Owns the public symbol name → [`DocItem`] mapping.
///
/// Names are resolved against the registry state at registration time, so
/// the outcome of a conflict depends on registration order. A conflict only
/// ever re-keys one side to a longer qualified name; no symbol name is lost.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
	symbols: HashMap<String, DocItem>,
	policy: NamingPolicy,
}

impl SymbolRegistry {
	pub fn new(policy: NamingPolicy) -> Self {
		Self {
			symbols: HashMap::new(),
			policy,
		}
	}

	/// Register `item` under `symbol_name`, resolving any naming conflict,
	/// and return the public name the item ended up with.
	pub fn register(&mut self, symbol_name: &str, item: DocItem) -> String {
		let name = self.disambiguate(&item, symbol_name);
		self.symbols.insert(name.clone(), item);
		name
	}

	/// Item registered under the exact public name `name`.
	pub fn get(&self, name: &str) -> Option<&DocItem> {
		self.symbols.get(name)
	}

	/// Iterate over `(public name, item)` pairs in unspecified order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &DocItem)> {
		self.symbols.iter().map(|(name, item)| (name.as_str(), item))
	}

	pub fn len(&self) -> usize {
		self.symbols.len()
	}

	pub fn is_empty(&self) -> bool {
		self.symbols.is_empty()
	}

	/// Drop every registered symbol, e.g. ahead of a full re-ingest.
	pub fn clear(&mut self) {
		self.symbols.clear();
	}

	/// Pick the public name for an incoming symbol, re-keying the current
	/// holder of the bare name when it loses the conflict.
	fn disambiguate(&mut self, incoming: &DocItem, symbol_name: &str) -> String {
		let Some(existing) = self.symbols.get(symbol_name).cloned() else {
			return symbol_name.to_owned();
		};

		if incoming.package() != existing.package() {
			// Cross-package conflict: a priority package evicts the current
			// holder to its fully qualified name; anyone else gets their own
			// package as a prefix.
			let incoming_has_priority = self
				.policy
				.priority_packages
				.iter()
				.any(|package| package == incoming.package());
			return if incoming_has_priority {
				let prefix = format!("{}.{}", existing.package(), existing.group());
				self.rekey_existing(&existing, &prefix, symbol_name)
			} else {
				self.qualify_incoming(incoming, incoming.package(), symbol_name)
			};
		}

		let authority = |group: &str| {
			self.policy
				.force_prefix_groups
				.iter()
				.position(|candidate| candidate == group)
		};
		if let Some(incoming_rank) = authority(incoming.group()) {
			// Same package, ambiguous incoming group: the earlier-listed
			// group keeps the bare name, the later one is qualified by its
			// own group.
			let existing_rank = authority(existing.group());
			let evict_existing = existing_rank.is_some_and(|rank| incoming_rank < rank);
			return if evict_existing {
				let prefix = existing.group().to_owned();
				self.rekey_existing(&existing, &prefix, symbol_name)
			} else {
				self.qualify_incoming(incoming, incoming.group(), symbol_name)
			};
		}

		// Either the existing holder is the ambiguous one, or choosing a
		// side would be arbitrary; re-key the existing entry under its group.
		let prefix = existing.group().to_owned();
		self.rekey_existing(&existing, &prefix, symbol_name)
	}

	/// Re-key the current holder of `symbol_name` under `prefix.symbol_name`
	/// (escalating to the fully qualified form when that is taken) and hand
	/// the bare name to the incoming symbol.
	fn rekey_existing(&mut self, existing: &DocItem, prefix: &str, symbol_name: &str) -> String {
		let mut new_name = format!("{prefix}.{symbol_name}");
		if self.symbols.contains_key(&new_name) {
			new_name = format!("{}.{}.{symbol_name}", existing.package(), existing.group());
		}
		debug!(from = symbol_name, to = %new_name, "re-keyed existing symbol");
		self.symbols.insert(new_name, existing.clone());
		symbol_name.to_owned()
	}

	/// Qualify the incoming name with `prefix`, escalating to the fully
	/// qualified form when the qualified name is also taken.
	fn qualify_incoming(&self, incoming: &DocItem, prefix: &str, symbol_name: &str) -> String {
		let new_name = format!("{prefix}.{symbol_name}");
		if self.symbols.contains_key(&new_name) {
			format!("{}.{}.{symbol_name}", incoming.package(), incoming.group())
		} else {
			new_name
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use proptest::prelude::*;

	use super::*;

	fn item(package: &str, group: &str) -> DocItem {
		DocItem::new(
			package,
			group,
			format!("https://{package}.example/"),
			"api.html",
			"anchor",
		)
	}

	fn registry() -> SymbolRegistry {
		SymbolRegistry::new(NamingPolicy::default())
	}

	#[test]
	fn unique_name_is_kept_as_is() {
		let mut registry = registry();
		assert_eq!(registry.register("Foo", item("alpha", "class")), "Foo");
		assert_eq!(registry.get("Foo"), Some(&item("alpha", "class")));
	}

	#[test]
	fn priority_package_evicts_existing_holder_to_fully_qualified_name() {
		let mut registry = registry();
		registry.register("Foo", item("alpha", "class"));
		let name = registry.register("Foo", item("python", "class"));

		assert_eq!(name, "Foo");
		assert_eq!(registry.get("Foo"), Some(&item("python", "class")));
		assert_eq!(registry.get("alpha.class.Foo"), Some(&item("alpha", "class")));
	}

	#[test]
	fn non_priority_package_is_qualified_by_its_own_name() {
		let mut registry = registry();
		registry.register("Foo", item("alpha", "class"));
		let name = registry.register("Foo", item("beta", "class"));

		assert_eq!(name, "beta.Foo");
		assert_eq!(registry.get("Foo"), Some(&item("alpha", "class")));
		assert_eq!(registry.get("beta.Foo"), Some(&item("beta", "class")));
	}

	#[test]
	fn package_qualified_collision_escalates_to_fully_qualified_name() {
		let mut registry = registry();
		registry.register("beta.Foo", item("gamma", "class"));
		registry.register("Foo", item("alpha", "class"));
		let name = registry.register("Foo", item("beta", "class"));

		assert_eq!(name, "beta.class.Foo");
	}

	#[test]
	fn earlier_force_prefix_group_claims_the_bare_name() {
		let mut registry = registry();
		registry.register("iterator", item("alpha", "label"));
		// `term` outranks `label`, so the label is the one qualified.
		let name = registry.register("iterator", item("alpha", "term"));

		assert_eq!(name, "iterator");
		assert_eq!(registry.get("iterator"), Some(&item("alpha", "term")));
		assert_eq!(registry.get("label.iterator"), Some(&item("alpha", "label")));
	}

	#[test]
	fn later_force_prefix_group_is_qualified_by_its_own_group() {
		let mut registry = registry();
		registry.register("iterator", item("alpha", "term"));
		let name = registry.register("iterator", item("alpha", "label"));

		assert_eq!(name, "label.iterator");
		assert_eq!(registry.get("iterator"), Some(&item("alpha", "term")));
	}

	#[test]
	fn force_prefix_incoming_against_plain_existing_is_qualified() {
		let mut registry = registry();
		registry.register("iterator", item("alpha", "class"));
		let name = registry.register("iterator", item("alpha", "label"));

		assert_eq!(name, "label.iterator");
		assert_eq!(registry.get("iterator"), Some(&item("alpha", "class")));
	}

	#[test]
	fn same_package_plain_conflict_rekeys_the_existing_entry() {
		let mut registry = registry();
		registry.register("connect", item("alpha", "method"));
		let name = registry.register("connect", item("alpha", "function"));

		assert_eq!(name, "connect");
		assert_eq!(registry.get("connect"), Some(&item("alpha", "function")));
		assert_eq!(registry.get("method.connect"), Some(&item("alpha", "method")));
	}

	proptest! {
		/// Distinct `(package, group, name)` triples never collapse onto one
		/// key: every registration survives under some public name.
		#[test]
		fn no_symbol_is_ever_lost(
			triples in proptest::collection::hash_set(
				("(python|alpha|beta)", "(term|label|class|function)", "(Foo|Bar|connect|iterator)"),
				1..24,
			)
		) {
			let mut registry = registry();
			for (package, group, name) in &triples {
				registry.register(name, item(package, group));
			}
			prop_assert_eq!(registry.len(), triples.len());
		}
	}
}
