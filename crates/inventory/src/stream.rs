//! Streaming zlib line reader.
//!
//! Feeds fixed-size chunks of a compressed stream through a zlib
//! decompressor, carrying decompressor state across reads, and hands the
//! decompressed text back split at `\n` boundaries. The version 2 symbol
//! table is one compressed line per symbol, so lines become available long
//! before the whole payload has been inflated.

use std::io::Read;

use flate2::{Decompress, FlushDecompress, Status};
use memchr::memchr;

use crate::{FormatError, READ_CHUNK_SIZE, Result};

pub(crate) struct ZlibLineReader<R> {
	input: R,
	decompress: Decompress,
	/// Raw bytes read from `input` but not yet consumed by the decompressor.
	chunk: Vec<u8>,
	/// Prefix of `chunk` the decompressor has already consumed.
	consumed: usize,
	/// Decompressed bytes not yet split into lines.
	pending: Vec<u8>,
	exhausted: bool,
}

impl<R: Read> ZlibLineReader<R> {
	pub fn new(input: R) -> Self {
		Self {
			input,
			decompress: Decompress::new(true),
			chunk: Vec::with_capacity(READ_CHUNK_SIZE),
			consumed: 0,
			pending: Vec::new(),
			exhausted: false,
		}
	}

	/// Next decompressed line, without its trailing newline.
	pub fn next_line(&mut self) -> Result<Option<String>> {
		loop {
			if let Some(newline) = memchr(b'\n', &self.pending) {
				let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
				line.pop();
				return Ok(Some(into_utf8(line)?));
			}
			if self.exhausted {
				if self.pending.is_empty() {
					return Ok(None);
				}
				let tail = std::mem::take(&mut self.pending);
				return Ok(Some(into_utf8(tail)?));
			}
			self.refill()?;
		}
	}

	/// Pull one chunk through the decompressor into `pending`.
	fn refill(&mut self) -> Result<()> {
		if self.consumed == self.chunk.len() {
			self.chunk.resize(READ_CHUNK_SIZE, 0);
			self.consumed = 0;
			let read = self.input.read(&mut self.chunk)?;
			self.chunk.truncate(read);
			if read == 0 {
				// Input ran out; drain whatever the decompressor still holds.
				self.pending.reserve(READ_CHUNK_SIZE);
				self.decompress
					.decompress_vec(&[], &mut self.pending, FlushDecompress::Finish)?;
				self.exhausted = true;
				return Ok(());
			}
		}

		let consumed_before = self.decompress.total_in();
		self.pending.reserve(READ_CHUNK_SIZE);
		let status = self.decompress.decompress_vec(
			&self.chunk[self.consumed..],
			&mut self.pending,
			FlushDecompress::None,
		)?;
		self.consumed += (self.decompress.total_in() - consumed_before) as usize;
		if status == Status::StreamEnd {
			self.exhausted = true;
		}
		Ok(())
	}
}

fn into_utf8(bytes: Vec<u8>) -> Result<String> {
	String::from_utf8(bytes).map_err(|_| FormatError::Encoding)
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use flate2::Compression;
	use flate2::write::ZlibEncoder;

	use super::*;

	fn compress(text: &str) -> Vec<u8> {
		let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(text.as_bytes()).expect("compress");
		encoder.finish().expect("finish")
	}

	/// Deterministic noisy lines; repetitive text compresses far below one
	/// read chunk and would never exercise the cross-chunk path.
	fn noisy_line(seed: &mut u64) -> String {
		let mut line = String::new();
		for _ in 0..8 {
			*seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
			line.push_str(&format!("{:016x}", *seed));
		}
		line
	}

	#[test]
	fn splits_lines_across_chunk_boundaries() {
		let mut seed = 7;
		let lines: Vec<String> = (0..800).map(|_| noisy_line(&mut seed)).collect();
		let mut text = lines.join("\n");
		text.push('\n');
		let compressed = compress(&text);
		assert!(compressed.len() > READ_CHUNK_SIZE);

		let mut reader = ZlibLineReader::new(compressed.as_slice());
		for expected in &lines {
			assert_eq!(reader.next_line().expect("line").as_deref(), Some(expected.as_str()));
		}
		assert_eq!(reader.next_line().expect("line"), None);
	}

	#[test]
	fn yields_a_final_line_without_trailing_newline() {
		let compressed = compress("first\nsecond");
		let mut reader = ZlibLineReader::new(compressed.as_slice());

		assert_eq!(reader.next_line().expect("line").as_deref(), Some("first"));
		assert_eq!(reader.next_line().expect("line").as_deref(), Some("second"));
		assert_eq!(reader.next_line().expect("line"), None);
	}

	#[test]
	fn corrupt_stream_is_a_compression_error() {
		let garbage = b"this is not a zlib stream at all";
		let mut reader = ZlibLineReader::new(&garbage[..]);
		assert!(matches!(
			reader.next_line(),
			Err(FormatError::Compression(_))
		));
	}
}
