//! Decoder for the Sphinx `objects.inv` inventory format.
//!
//! An inventory is a versioned manifest listing every symbol a documentation
//! site exposes. The header line names the format version: version 1 stores
//! the symbol table as plain text, version 2 compresses it with zlib.
//! [`decode`] parses either into an [`Inventory`] of `(name, location)`
//! entries grouped by the symbol's `domain:role`.
//!
//! Version 2 payloads are decompressed incrementally in fixed-size chunks
//! rather than buffered whole; decoding is CPU-bound, so callers on a
//! cooperative scheduler should run it on a blocking worker.

use std::io::BufRead;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

mod stream;

use stream::ZlibLineReader;

/// A convenient type alias for `Result` with `E` = [`FormatError`].
pub type Result<T, E = FormatError> = std::result::Result<T, E>;

/// Bytes fed to the zlib decompressor per read.
pub(crate) const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Version 2 symbol line: name, `domain:role`, priority, location, display name.
static V2_LINE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^(.+?)\s+(\S*:\S*)\s+(-?\d+)\s+?(\S*)\s+(.*)").expect("v2 line pattern is valid")
});

/// Errors raised while decoding an inventory stream.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FormatError {
	/// The header line is missing or carries no version character.
	#[error("unparseable inventory header")]
	Header,
	/// The header names a version this decoder does not understand.
	#[error("unsupported inventory version `{0}`")]
	UnsupportedVersion(char),
	/// A version 2 inventory did not declare its payload as zlib compressed.
	#[error("inventory payload is not marked as zlib compressed")]
	MissingZlibMarker,
	/// A symbol line does not match the format of its inventory version.
	#[error("malformed inventory line: {0:?}")]
	Line(String),
	/// The payload is not valid UTF-8.
	#[error("inventory text is not valid UTF-8")]
	Encoding,
	/// The zlib payload could not be decompressed.
	#[error("zlib decompression failed: {0}")]
	Compression(#[from] flate2::DecompressError),
	/// Reading the underlying stream failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// One `(symbol name, relative location)` inventory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
	/// The symbol's name as listed by the documentation site.
	pub name: String,
	/// Location relative to the site root, including the `#fragment`
	/// anchoring the symbol on its page.
	pub location: String,
}

/// A decoded inventory: entries grouped by `domain:role`, preserving the
/// discovery order of groups and of entries within each group.
#[derive(Debug, Default, Clone)]
pub struct Inventory {
	groups: IndexMap<String, Vec<InventoryEntry>>,
}

impl Inventory {
	fn push(&mut self, group: String, name: String, location: String) {
		self.groups
			.entry(group)
			.or_default()
			.push(InventoryEntry { name, location });
	}

	/// Iterate over `(group, entries)` pairs in discovery order.
	pub fn groups(&self) -> impl Iterator<Item = (&str, &[InventoryEntry])> {
		self.groups
			.iter()
			.map(|(group, entries)| (group.as_str(), entries.as_slice()))
	}

	/// Total number of entries across all groups.
	pub fn len(&self) -> usize {
		self.groups.values().map(Vec::len).sum()
	}

	/// Whether the inventory holds no entries at all.
	pub fn is_empty(&self) -> bool {
		self.groups.values().all(Vec::is_empty)
	}
}

/// Decode an `objects.inv` stream.
///
/// The last character of the header line selects the format version; the two
/// metadata lines after it (project name and version) carry no symbol data
/// and are skipped. Version 2 additionally requires a line declaring the
/// zlib payload before the compressed symbol table begins.
pub fn decode(mut input: impl BufRead) -> Result<Inventory> {
	let header = read_line(&mut input)?.ok_or(FormatError::Header)?;
	let version = header.trim_end().chars().last().ok_or(FormatError::Header)?;

	read_line(&mut input)?;
	read_line(&mut input)?;

	let inventory = match version {
		'1' => decode_v1(input)?,
		'2' => {
			let marker = read_line(&mut input)?.ok_or(FormatError::MissingZlibMarker)?;
			if !marker.contains("zlib") {
				return Err(FormatError::MissingZlibMarker);
			}
			decode_v2(input)?
		}
		other => return Err(FormatError::UnsupportedVersion(other)),
	};

	debug!(symbols = inventory.len(), %version, "decoded inventory");
	Ok(inventory)
}

/// Version 1 is plain text and predates explicit anchors: the anchor is
/// reconstructed from the symbol name, and the bare `mod` type is mapped to
/// the `py:module` group.
fn decode_v1(input: impl BufRead) -> Result<Inventory> {
	let mut inventory = Inventory::default();
	for line in input.lines() {
		let line = line.map_err(io_error)?;
		let line = line.trim_end();
		let (name, group, location) =
			split_v1(line).ok_or_else(|| FormatError::Line(line.to_owned()))?;
		let (group, location) = if group == "mod" {
			("py:module".to_owned(), format!("{location}#module-{name}"))
		} else {
			(format!("py:{group}"), format!("{location}#{name}"))
		};
		inventory.push(group, name.to_owned(), location);
	}
	Ok(inventory)
}

/// Split a v1 line into `(name, type, location)` on runs of whitespace; any
/// whitespace past the second run belongs to the location.
fn split_v1(line: &str) -> Option<(&str, &str, &str)> {
	let (name, rest) = line.split_once(char::is_whitespace)?;
	let (group, location) = rest.trim_start().split_once(char::is_whitespace)?;
	let location = location.trim_start();
	(!location.is_empty()).then_some((name, group, location))
}

fn decode_v2(input: impl BufRead) -> Result<Inventory> {
	let mut inventory = Inventory::default();
	let mut lines = ZlibLineReader::new(input);
	while let Some(line) = lines.next_line()? {
		let line = line.trim_end();
		let captures = V2_LINE
			.captures(line)
			.ok_or_else(|| FormatError::Line(line.to_owned()))?;
		let (name, group) = (&captures[1], captures[2].to_owned());
		// Captures 3 and 5 are the priority and display name; neither is kept.
		let mut location = captures[4].to_owned();
		if location.ends_with('$') {
			// A trailing `$` stands for the symbol's own name.
			location.truncate(location.len() - 1);
			location.push_str(name);
		}
		inventory.push(group, name.to_owned(), location);
	}
	Ok(inventory)
}

fn read_line(input: &mut impl BufRead) -> Result<Option<String>> {
	let mut line = String::new();
	let read = input.read_line(&mut line).map_err(io_error)?;
	Ok((read > 0).then_some(line))
}

fn io_error(err: std::io::Error) -> FormatError {
	if err.kind() == std::io::ErrorKind::InvalidData {
		FormatError::Encoding
	} else {
		FormatError::Io(err)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use flate2::Compression;
	use flate2::write::ZlibEncoder;
	use pretty_assertions::assert_eq;

	use super::*;

	fn v2_inventory(lines: &str) -> Vec<u8> {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(b"# Sphinx inventory version 2\n");
		bytes.extend_from_slice(b"# Project: test\n");
		bytes.extend_from_slice(b"# Version: 1.0\n");
		bytes.extend_from_slice(b"# The remainder of this file is compressed using zlib.\n");
		let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(lines.as_bytes()).expect("compress");
		bytes.extend_from_slice(&encoder.finish().expect("finish"));
		bytes
	}

	fn entries<'a>(inventory: &'a Inventory, group: &str) -> &'a [InventoryEntry] {
		inventory
			.groups()
			.find(|(name, _)| *name == group)
			.map(|(_, entries)| entries)
			.unwrap_or_default()
	}

	#[test]
	fn v1_module_line_gains_module_anchor() {
		let body = b"# Sphinx inventory version 1\nProject: test\nVersion: 1.0\nfoo mod /lib\n";
		let inventory = decode(&body[..]).expect("decode");

		assert_eq!(
			entries(&inventory, "py:module"),
			&[InventoryEntry {
				name: "foo".to_owned(),
				location: "/lib#module-foo".to_owned(),
			}]
		);
	}

	#[test]
	fn v1_plain_line_gains_name_anchor() {
		let body =
			b"# Sphinx inventory version 1\nProject: test\nVersion: 1.0\ngreet func /api.html\n";
		let inventory = decode(&body[..]).expect("decode");

		assert_eq!(
			entries(&inventory, "py:func"),
			&[InventoryEntry {
				name: "greet".to_owned(),
				location: "/api.html#greet".to_owned(),
			}]
		);
	}

	#[test]
	fn v1_short_line_is_a_format_error() {
		let body = b"# Sphinx inventory version 1\nProject: test\nVersion: 1.0\nfoo mod\n";
		assert!(matches!(decode(&body[..]), Err(FormatError::Line(_))));
	}

	#[test]
	fn v2_dollar_location_is_rewritten_to_the_symbol_name() {
		let body = v2_inventory("bar py:class 1 api.html#$ -\n");
		let inventory = decode(body.as_slice()).expect("decode");

		assert_eq!(
			entries(&inventory, "py:class"),
			&[InventoryEntry {
				name: "bar".to_owned(),
				location: "api.html#bar".to_owned(),
			}]
		);
	}

	#[test]
	fn v2_display_name_may_contain_whitespace() {
		let body = v2_inventory("with-statement std:label 1 compound.html#with The with statement\n");
		let inventory = decode(body.as_slice()).expect("decode");

		assert_eq!(
			entries(&inventory, "std:label"),
			&[InventoryEntry {
				name: "with-statement".to_owned(),
				location: "compound.html#with".to_owned(),
			}]
		);
	}

	#[test]
	fn v2_malformed_line_is_a_format_error() {
		let body = v2_inventory("just-a-name\n");
		assert!(matches!(decode(body.as_slice()), Err(FormatError::Line(_))));
	}

	#[test]
	fn v2_payload_larger_than_one_chunk_round_trips() {
		let mut lines = String::new();
		for index in 0..5000 {
			lines.push_str(&format!("symbol_{index} py:function 1 api.html#$ -\n"));
		}
		let body = v2_inventory(&lines);
		let inventory = decode(body.as_slice()).expect("decode");

		assert_eq!(inventory.len(), 5000);
		let functions = entries(&inventory, "py:function");
		assert_eq!(functions[0].name, "symbol_0");
		assert_eq!(functions[4999].location, "api.html#symbol_4999");
	}

	#[test]
	fn group_order_follows_first_occurrence() {
		let body = v2_inventory(
			"a py:class 1 a.html#$ -\nb py:function 1 b.html#$ -\nc py:class 1 c.html#$ -\n",
		);
		let inventory = decode(body.as_slice()).expect("decode");

		let order: Vec<&str> = inventory.groups().map(|(group, _)| group).collect();
		assert_eq!(order, ["py:class", "py:function"]);
		assert_eq!(entries(&inventory, "py:class").len(), 2);
	}

	#[test]
	fn unknown_version_is_rejected() {
		let body = b"# Sphinx inventory version 3\nProject: test\nVersion: 1.0\n";
		assert!(matches!(
			decode(&body[..]),
			Err(FormatError::UnsupportedVersion('3'))
		));
	}

	#[test]
	fn v2_without_zlib_marker_is_rejected() {
		let body = b"# Sphinx inventory version 2\nProject: test\nVersion: 1.0\n# Uncompressed.\n";
		assert!(matches!(
			decode(&body[..]),
			Err(FormatError::MissingZlibMarker)
		));
	}

	#[test]
	fn empty_stream_is_a_header_error() {
		assert!(matches!(decode(&b""[..]), Err(FormatError::Header)));
	}
}
