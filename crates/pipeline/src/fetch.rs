//! Network fetch seam.

use std::time::Duration;

use async_trait::async_trait;

/// Failures fetching remote bytes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
	/// Transport-level failure: connect, timeout, or protocol error.
	#[error(transparent)]
	Transport(#[from] reqwest::Error),
	/// The server answered with a non-success status.
	#[error("unexpected status {0}")]
	Status(u16),
}

/// Fetches raw bytes from a URL.
///
/// Implementations own connection reuse and socket timeouts. The pipeline
/// calls this exactly once per page per ingest cycle; inventory retrieval
/// layers its own retry policy on top.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
	/// Fetch `url` and return the whole response body.
	async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`Fetcher`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
	client: reqwest::Client,
}

impl HttpFetcher {
	/// Build a fetcher with the given socket connect and read timeouts.
	pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, FetchError> {
		let client = reqwest::Client::builder()
			.connect_timeout(connect_timeout)
			.read_timeout(read_timeout)
			.build()?;
		Ok(Self { client })
	}
}

#[async_trait]
impl Fetcher for HttpFetcher {
	async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
		let response = self.client.get(url).send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(FetchError::Status(status.as_u16()));
		}
		Ok(response.bytes().await?.to_vec())
	}
}
