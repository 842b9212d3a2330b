//! Engine orchestration: ingestion, refresh lifecycle, lookup path.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::future;
use lore_inventory::Inventory;
use lore_pipeline::{BatchPipeline, Fetcher, Render, RenderCache};
use lore_sched::{KeyedLocks, Scheduler, SharedGate};
use lore_symbols::{DocItem, SymbolRegistry, search};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::{EngineConfig, Error, Result};

/// Lock namespace for refresh-triggering operations.
const NAMESPACE: &str = "doc";
/// Resource id shared by every refresh-triggering operation, so only one
/// can rebuild shared state at a time.
const REFRESH_SINGLETON: &str = "inventory refresh";
/// Final path segment of a standard inventory URL.
const INVENTORY_FILE: &str = "objects.inv";

/// Packages added and removed by one refresh, relative to the state before it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
	/// Packages available now that were not before.
	pub added: Vec<String>,
	/// Packages that were available before and are gone now.
	pub removed: Vec<String>,
}

/// Documentation symbol resolution engine.
///
/// Cheap to clone; all clones share state. See the [crate docs](crate) for
/// the overall data flow.
pub struct DocsEngine<R: Render> {
	inner: Arc<EngineInner<R>>,
}

impl<R: Render> Clone for DocsEngine<R> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

struct EngineInner<R: Render> {
	config: EngineConfig,
	fetcher: Arc<dyn Fetcher>,
	/// Documentation home URL per ingested package; doubles as the record of
	/// which packages are currently available.
	base_urls: Mutex<BTreeMap<String, String>>,
	registry: Mutex<SymbolRegistry>,
	cache: Arc<RenderCache>,
	pipeline: BatchPipeline<R>,
	/// Retry tasks for unreachable inventories, keyed by package name.
	scheduler: Scheduler,
	/// `true` while no refresh is rebuilding shared state; lookups wait on
	/// this before touching the registry.
	refresh_idle: watch::Sender<bool>,
	/// Lookups hold this gate; a refresh drains it before mutating.
	lookup_gate: SharedGate,
	locks: KeyedLocks,
	init_task: Mutex<Option<JoinHandle<()>>>,
}

/// Everything that can go wrong between fetching inventory bytes and holding
/// a decoded [`Inventory`].
#[derive(Debug, thiserror::Error)]
enum InventoryFetchError {
	#[error(transparent)]
	Fetch(#[from] lore_pipeline::FetchError),
	#[error(transparent)]
	Format(#[from] lore_inventory::FormatError),
	#[error("decode task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}

impl<R: Render> DocsEngine<R> {
	/// Create an engine over the given fetcher and renderer. Nothing is
	/// fetched until [`Self::start`] or an explicit refresh.
	pub fn new(config: EngineConfig, fetcher: Arc<dyn Fetcher>, render: Arc<R>) -> Self {
		let cache = Arc::new(RenderCache::new());
		let pipeline = BatchPipeline::new(Arc::clone(&fetcher), render, Arc::clone(&cache));
		let (refresh_idle, _) = watch::channel(true);
		Self {
			inner: Arc::new(EngineInner {
				registry: Mutex::new(SymbolRegistry::new(config.naming.clone())),
				config,
				fetcher,
				base_urls: Mutex::new(BTreeMap::new()),
				cache,
				pipeline,
				scheduler: Scheduler::new("inventory"),
				refresh_idle,
				lookup_gate: SharedGate::new(),
				locks: KeyedLocks::new(),
				init_task: Mutex::new(None),
			}),
		}
	}

	/// Spawn the initial refresh of the seeded inventories.
	///
	/// Runs under the refresh lock in wait mode, so a manual refresh issued
	/// while startup is still ingesting queues behind it instead of racing.
	pub fn start(&self) {
		let engine = self.clone();
		let handle = tokio::spawn(async move {
			let _lock = engine.inner.locks.acquire(NAMESPACE, REFRESH_SINGLETON).await;
			engine.refresh_inventories().await;
		});
		*self.inner.init_task.lock() = Some(handle);
	}

	/// Re-fetch every seeded inventory, rebuilding all shared state.
	///
	/// Fails with [`Error::RefreshInProgress`] instead of queuing behind a
	/// refresh that is already running.
	pub async fn refresh(&self) -> Result<RefreshReport> {
		let Some(_lock) = self.inner.locks.try_acquire(NAMESPACE, REFRESH_SINGLETON) else {
			return Err(Error::RefreshInProgress);
		};
		Ok(self.refresh_inventories().await)
	}

	/// Fetch one inventory and add its symbols to the running engine.
	///
	/// An empty `base_url` is derived from the inventory URL by dropping its
	/// final path segment.
	pub async fn add_inventory(
		&self,
		package: &str,
		base_url: &str,
		inventory_url: &str,
	) -> Result<()> {
		let Some(_lock) = self.inner.locks.try_acquire(NAMESPACE, REFRESH_SINGLETON) else {
			return Err(Error::RefreshInProgress);
		};
		if !base_url.is_empty() && !base_url.ends_with('/') {
			return Err(Error::BaseUrlShape(base_url.to_owned()));
		}
		Url::parse(inventory_url)?;

		let inventory = self
			.fetch_inventory(inventory_url)
			.await
			.ok_or_else(|| Error::InventoryUnavailable {
				url: inventory_url.to_owned(),
			})?;
		let base_url = if base_url.is_empty() {
			base_url_from_inventory_url(inventory_url)
		} else {
			base_url.to_owned()
		};
		self.ingest_inventory(package, &base_url, inventory);
		Ok(())
	}

	/// Wait for any in-progress refresh, then rank registered symbol names
	/// against `query`.
	pub async fn lookup_symbol(&self, query: &str) -> Vec<(String, DocItem)> {
		self.wait_until_idle().await;
		let _gate = self.inner.lookup_gate.enter();
		let registry = self.inner.registry.lock();
		search(&registry, query, self.inner.config.lookup_limit)
			.into_iter()
			.map(|(name, item)| (name.to_owned(), item.clone()))
			.collect()
	}

	/// Rendered text for `item`: cache hit, or fetch-and-parse via the
	/// pipeline. `Ok(None)` means the page was reachable but the symbol's
	/// fragment could not be rendered.
	pub async fn get_rendered_text(&self, item: &DocItem) -> Result<Option<String>> {
		self.wait_until_idle().await;
		let _gate = self.inner.lookup_gate.enter();
		if let Some(text) = self.inner.cache.get(item) {
			return Ok(Some(text));
		}
		Ok(self.inner.pipeline.get_markdown(item).await?)
	}

	/// Registered packages and their documentation home URLs, sorted by name.
	pub fn packages(&self) -> Vec<(String, String)> {
		self.inner
			.base_urls
			.lock()
			.iter()
			.map(|(package, base_url)| (package.clone(), base_url.clone()))
			.collect()
	}

	/// Drop cached text for `package`, or all of it when `None`. Reports
	/// whether anything was removed.
	pub fn clear_cache(&self, package: Option<&str>) -> bool {
		self.inner.cache.delete(package)
	}

	/// Cancel retries and background work and spawn (without awaiting) a
	/// final pipeline clear.
	pub fn shutdown(&self) {
		self.inner.scheduler.cancel_all();
		if let Some(task) = self.inner.init_task.lock().take() {
			task.abort();
		}
		let pipeline = self.inner.pipeline.clone();
		tokio::spawn(async move {
			pipeline.clear().await;
		});
	}

	/// Register every symbol of a decoded inventory and map it to its page.
	pub fn ingest_inventory(&self, package: &str, base_url: &str, inventory: Inventory) {
		self.inner
			.base_urls
			.lock()
			.insert(package.to_owned(), base_url.to_owned());

		let package: Arc<str> = Arc::from(package);
		let base_url: Arc<str> = Arc::from(base_url);
		// One allocation per distinct group and page path; thousands of
		// items per inventory share these fields.
		let mut groups: HashMap<String, Arc<str>> = HashMap::new();
		let mut paths: HashMap<String, Arc<str>> = HashMap::new();

		let mut registered = 0usize;
		let mut registry = self.inner.registry.lock();
		for (group, entries) in inventory.groups() {
			// `py:class` → `class`; the domain adds nothing to public names.
			let role = group.split_once(':').map_or(group, |(_, role)| role);
			let role: Arc<str> = groups
				.entry(role.to_owned())
				.or_insert_with(|| Arc::from(role))
				.clone();
			for entry in entries {
				let (relative_path, symbol_id) = match entry.location.split_once('#') {
					Some((path, fragment)) => (path, fragment),
					None => (entry.location.as_str(), ""),
				};
				let relative_path: Arc<str> = paths
					.entry(relative_path.to_owned())
					.or_insert_with(|| Arc::from(relative_path))
					.clone();
				let item = DocItem::new(
					Arc::clone(&package),
					Arc::clone(&role),
					Arc::clone(&base_url),
					relative_path,
					symbol_id,
				);
				registry.register(&entry.name, item.clone());
				self.inner.pipeline.add_item(item);
				registered += 1;
			}
		}
		info!(package = %package, symbols = registered, "ingested inventory");
	}

	/// The full refresh transaction: drain lookups, drop retries, rebuild
	/// every shared structure, re-ingest the seeds, report the difference.
	async fn refresh_inventories(&self) -> RefreshReport {
		self.inner.refresh_idle.send_replace(false);
		self.inner.lookup_gate.drained().await;
		self.inner.scheduler.cancel_all();

		let previous: BTreeSet<String> = {
			let mut base_urls = self.inner.base_urls.lock();
			let previous = base_urls.keys().cloned().collect();
			base_urls.clear();
			previous
		};
		self.inner.registry.lock().clear();
		self.inner.cache.delete(None);
		self.inner.pipeline.clear().await;

		let fetches = self.inner.config.seed_inventories.iter().map(
			|(package, base_url)| {
				let engine = self.clone();
				let package = package.clone();
				let base_url = base_url.clone();
				async move {
					let inventory_url = format!("{base_url}{INVENTORY_FILE}");
					engine
						.update_or_reschedule(package, base_url, inventory_url)
						.await;
				}
			},
		);
		future::join_all(fetches).await;

		self.inner.refresh_idle.send_replace(true);

		let current: BTreeSet<String> = self.inner.base_urls.lock().keys().cloned().collect();
		let report = RefreshReport {
			added: current.difference(&previous).cloned().collect(),
			removed: previous.difference(&current).cloned().collect(),
		};
		info!(added = report.added.len(), removed = report.removed.len(), "refreshed inventories");
		report
	}

	/// Ingest `package`'s inventory, or schedule a retry when the remote is
	/// unreachable: a short wait for the first failure, a longer one for
	/// every failure after it.
	fn update_or_reschedule(
		&self,
		package: String,
		base_url: String,
		inventory_url: String,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
		Box::pin(async move {
		match self.fetch_inventory(&inventory_url).await {
			Some(inventory) => {
				let base_url = if base_url.is_empty() {
					base_url_from_inventory_url(&inventory_url)
				} else {
					base_url
				};
				self.ingest_inventory(&package, &base_url, inventory);
			}
			None => {
				let delay = if self.inner.scheduler.contains(&package) {
					self.inner.scheduler.cancel(&package);
					self.inner.config.reschedule_repeated
				} else {
					self.inner.config.reschedule_first
				};
				warn!(
					package = %package,
					url = %inventory_url,
					delay_secs = delay.as_secs(),
					"inventory unreachable, rescheduling"
				);
				let engine = self.clone();
				self.inner
					.scheduler
					.schedule_later(delay, package.clone(), async move {
						engine.update_or_reschedule(package, base_url, inventory_url).await;
					});
			}
		}
		})
	}

	/// Fetch and decode an inventory, retrying failed attempts. Failures do
	/// not mutate shared state; `None` means every attempt failed.
	async fn fetch_inventory(&self, url: &str) -> Option<Inventory> {
		for attempt in 1..=self.inner.config.fetch_attempts {
			match self.try_fetch_inventory(url).await {
				Ok(inventory) => return Some(inventory),
				Err(error) => {
					debug!(url, attempt, error = %error, "inventory fetch attempt failed");
				}
			}
		}
		None
	}

	async fn try_fetch_inventory(&self, url: &str) -> Result<Inventory, InventoryFetchError> {
		let bytes = self.inner.fetcher.fetch(url).await?;
		// Decompression and line parsing are CPU-bound; keep them off the
		// scheduling threads.
		let inventory =
			tokio::task::spawn_blocking(move || lore_inventory::decode(bytes.as_slice())).await??;
		Ok(inventory)
	}

	async fn wait_until_idle(&self) {
		let mut idle = self.inner.refresh_idle.subscribe();
		// Waiting only fails when the sender is dropped, and the engine owns it.
		let _ = idle.wait_for(|idle| *idle).await;
	}
}

/// Base URL for a package, derived from its inventory URL by dropping the
/// final path segment.
pub fn base_url_from_inventory_url(inventory_url: &str) -> String {
	let trimmed = inventory_url.strip_suffix('/').unwrap_or(inventory_url);
	match trimmed.rsplit_once('/') {
		Some((base, _)) => format!("{base}/"),
		None => format!("{trimmed}/"),
	}
}
