//! Fuzzy lookup over registered symbol names.

use regex::RegexBuilder;

use crate::{DocItem, SymbolRegistry};

/// Rank registered names against `query`, returning at most `limit` results.
///
/// A name matches when the query's characters appear in it in order, case
/// insensitively. Candidates rank by how tight the match is (shorter matched
/// span first), then by how early it starts, then by name, so `Client` beats
/// `ClientSession` for the query `client` while both stay in the running.
pub fn search<'a>(
	registry: &'a SymbolRegistry,
	query: &str,
	limit: usize,
) -> Vec<(&'a str, &'a DocItem)> {
	let pattern = query
		.chars()
		.map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
		.collect::<Vec<_>>()
		.join(".*?");
	let Ok(matcher) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
		return Vec::new();
	};

	let mut ranked: Vec<(usize, usize, &str, &DocItem)> = registry
		.iter()
		.filter_map(|(name, item)| {
			let found = matcher.find(name)?;
			Some((found.len(), found.start(), name, item))
		})
		.collect();
	ranked.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
	ranked.truncate(limit);
	ranked
		.into_iter()
		.map(|(_, _, name, item)| (name, item))
		.collect()
}
