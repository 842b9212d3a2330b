//! Coalesced page fetching and batched symbol rendering.
//!
//! # How a lookup flows
//!
//! [`BatchPipeline::add_item`] records which symbols live on which page; it
//! never fetches. The first [`BatchPipeline::get_markdown`] for any symbol
//! of a page creates a completion handle for *every* symbol registered on
//! that page before suspending on the network, so concurrent lookups — for
//! the same symbol or a sibling on the same page — attach to those handles
//! instead of fetching again. The fetched page is parsed once off-thread and
//! its whole batch joins the pending queue; a background loop renders one
//! symbol at a time, newest page first, user-requested symbols before
//! page-warm background ones.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use lore_symbols::DocItem;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::RenderCache;
use crate::fetch::Fetcher;
use crate::render::Render;
use crate::{Error, Result};

/// Pause between rendered queue items, so one long page batch cannot starve
/// other work scheduled on the runtime.
const PARSE_THROTTLE: Duration = Duration::from_millis(100);

/// One symbol's terminal result: rendered text, `None` when its fragment
/// could not be converted, or the page fetch error shared by its batch.
type SymbolOutcome = std::result::Result<Option<String>, Arc<crate::FetchError>>;

/// Completion handle for one in-flight symbol. At most one live slot exists
/// per item; it is removed the moment its outcome is published.
struct ParseSlot {
	outcome: watch::Sender<Option<SymbolOutcome>>,
	/// Set when a caller is awaiting this slot, as opposed to it existing
	/// only because its page happened to be fetched. [`BatchPipeline::clear`]
	/// drains user-requested slots before destroying state.
	user_requested: bool,
}

impl ParseSlot {
	fn new() -> Self {
		let (outcome, _) = watch::channel(None);
		Self {
			outcome,
			user_requested: false,
		}
	}
}

struct QueueEntry<D> {
	item: DocItem,
	document: Arc<D>,
}

struct State<D> {
	/// Symbols registered per page URL, in registration order.
	page_items: HashMap<String, Vec<DocItem>>,
	/// Fetched but not yet rendered work; the back of the deque is served
	/// first.
	queue: VecDeque<QueueEntry<D>>,
	/// Live completion handles.
	slots: HashMap<DocItem, ParseSlot>,
	/// The background render loop, while one is running.
	render_task: Option<JoinHandle<()>>,
}

impl<D> Default for State<D> {
	fn default() -> Self {
		Self {
			page_items: HashMap::new(),
			queue: VecDeque::new(),
			slots: HashMap::new(),
			render_task: None,
		}
	}
}

/// How [`BatchPipeline::get_markdown`] joins the in-flight work.
enum Attach {
	/// A completion handle already existed (or was re-created for a queued
	/// duplicate); await it.
	Existing(watch::Receiver<Option<SymbolOutcome>>),
	/// This caller owns the page fetch for the given batch of symbols.
	Fetch(watch::Receiver<Option<SymbolOutcome>>, Vec<DocItem>),
}

/// Coalesces page fetches and distributes per-symbol render results.
///
/// Cheap to clone; all clones share state.
pub struct BatchPipeline<R: Render> {
	inner: Arc<Inner<R>>,
}

impl<R: Render> Clone for BatchPipeline<R> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

struct Inner<R: Render> {
	fetcher: Arc<dyn Fetcher>,
	render: Arc<R>,
	cache: Arc<RenderCache>,
	state: Mutex<State<R::Document>>,
}

impl<R: Render> BatchPipeline<R> {
	/// Create a pipeline writing rendered text through to `cache`.
	pub fn new(fetcher: Arc<dyn Fetcher>, render: Arc<R>, cache: Arc<RenderCache>) -> Self {
		Self {
			inner: Arc::new(Inner {
				fetcher,
				render,
				cache,
				state: Mutex::new(State::default()),
			}),
		}
	}

	/// Register `item` under its page. No fetch is triggered; may be called
	/// any number of times before the page is first requested.
	pub fn add_item(&self, item: DocItem) {
		let mut state = self.inner.state.lock();
		state.page_items.entry(item.url()).or_default().push(item);
	}

	/// Rendered text for `item`, fetching and batch-parsing its page on
	/// first use.
	///
	/// `Ok(None)` means the page was retrieved but this symbol's fragment
	/// could not be rendered; a fetch failure is an error for every symbol
	/// of the page. Not safe to run concurrently with [`Self::clear`]; the
	/// refresh lock serializes the two.
	pub async fn get_markdown(&self, item: &DocItem) -> Result<Option<String>> {
		let mut receiver = match self.attach(item) {
			Attach::Existing(receiver) => receiver,
			Attach::Fetch(receiver, batch) => {
				self.fetch_and_enqueue(item, batch).await?;
				receiver
			}
		};

		let outcome = receiver
			.wait_for(Option::is_some)
			.await
			.map_err(|_| Error::Cleared)?
			.clone();
		match outcome {
			Some(Ok(text)) => Ok(text),
			Some(Err(error)) => Err(Error::Fetch(error)),
			None => Err(Error::Cleared),
		}
	}

	/// Join the in-flight work for `item` under one state lock, deciding
	/// whether this caller must fetch the page itself.
	fn attach(&self, item: &DocItem) -> Attach {
		let mut state = self.inner.state.lock();

		if let Some(slot) = state.slots.get_mut(item) {
			slot.user_requested = true;
			let receiver = slot.outcome.subscribe();
			promote(&mut state.queue, item);
			return Attach::Existing(receiver);
		}

		if state.queue.iter().any(|entry| entry.item == *item) {
			// The item was already served under another public name and its
			// handle is gone; a fresh handle attaches to the queued copy.
			let slot = state.slots.entry(item.clone()).or_insert_with(ParseSlot::new);
			slot.user_requested = true;
			let receiver = slot.outcome.subscribe();
			promote(&mut state.queue, item);
			return Attach::Existing(receiver);
		}

		// First interest in this page: materialize a handle for every symbol
		// registered on it, so concurrent lookups coalesce onto one fetch.
		let mut batch = state.page_items.get(&item.url()).cloned().unwrap_or_default();
		if !batch.contains(item) {
			batch.push(item.clone());
		}
		let mut receiver = None;
		for batch_item in &batch {
			let slot = state
				.slots
				.entry(batch_item.clone())
				.or_insert_with(ParseSlot::new);
			if batch_item == item {
				slot.user_requested = true;
				receiver = Some(slot.outcome.subscribe());
			}
		}
		match receiver {
			Some(receiver) => Attach::Fetch(receiver, batch),
			// The requested item is always part of its own batch.
			None => unreachable!("requested item missing from its page batch"),
		}
	}

	/// Fetch the requested item's page, parse it off-thread, and queue the
	/// page's batch for rendering.
	async fn fetch_and_enqueue(&self, requested: &DocItem, batch: Vec<DocItem>) -> Result<()> {
		let url = requested.url();
		let bytes = match self.inner.fetcher.fetch(&url).await {
			Ok(bytes) => bytes,
			Err(error) => {
				let error = Arc::new(error);
				warn!(url = %url, error = %error, "failed to fetch documentation page");
				self.resolve_batch(&batch, Err(Arc::clone(&error)));
				return Err(Error::Fetch(error));
			}
		};

		let render = Arc::clone(&self.inner.render);
		let parsed = tokio::task::spawn_blocking(move || render.parse(&bytes)).await;
		let document = match parsed {
			Ok(Ok(document)) => Arc::new(document),
			Ok(Err(error)) => {
				warn!(url = %url, error = %error, "failed to parse documentation page");
				self.resolve_batch(&batch, Ok(None));
				return Ok(());
			}
			Err(join_error) => {
				warn!(url = %url, error = %join_error, "page parse task failed");
				self.resolve_batch(&batch, Ok(None));
				return Ok(());
			}
		};

		let mut state = self.inner.state.lock();
		// The freshest page renders first: its batch lands at the served end
		// of the queue, first-registered symbol on top, and the symbol the
		// caller actually asked for ahead of its page siblings.
		for batch_item in batch.into_iter().rev() {
			state.queue.push_back(QueueEntry {
				item: batch_item,
				document: Arc::clone(&document),
			});
		}
		promote(&mut state.queue, requested);
		if state
			.render_task
			.as_ref()
			.is_none_or(JoinHandle::is_finished)
		{
			let inner = Arc::clone(&self.inner);
			state.render_task = Some(tokio::spawn(render_loop(inner)));
		}
		Ok(())
	}

	/// Publish `outcome` for every still-live handle in `batch`.
	fn resolve_batch(&self, batch: &[DocItem], outcome: SymbolOutcome) {
		let mut state = self.inner.state.lock();
		for item in batch {
			if let Some(slot) = state.slots.remove(item) {
				slot.outcome.send_replace(Some(outcome.clone()));
			}
		}
	}

	/// Discard all pipeline state.
	///
	/// User-requested lookups still in flight are awaited first, so no
	/// caller is left holding a handle this call destroys; page-warm
	/// background work is dropped unrendered. Cancels the render loop.
	pub async fn clear(&self) {
		let awaited: Vec<watch::Receiver<Option<SymbolOutcome>>> = {
			let state = self.inner.state.lock();
			state
				.slots
				.values()
				.filter(|slot| slot.user_requested)
				.map(|slot| slot.outcome.subscribe())
				.collect()
		};
		debug!(pending = awaited.len(), "clearing pipeline");
		for mut receiver in awaited {
			let _ = receiver.wait_for(Option::is_some).await;
		}

		let render_task = {
			let mut state = self.inner.state.lock();
			let render_task = state.render_task.take();
			state.queue.clear();
			state.page_items.clear();
			state.slots.clear();
			render_task
		};
		if let Some(render_task) = render_task {
			render_task.abort();
		}
	}
}

/// Move `item`'s queue entry to the served end, when still queued.
fn promote<D>(queue: &mut VecDeque<QueueEntry<D>>, item: &DocItem) {
	if let Some(index) = queue.iter().position(|entry| entry.item == *item)
		&& let Some(entry) = queue.remove(index)
	{
		queue.push_back(entry);
	}
}

/// Drain the pending queue, rendering one symbol at a time off-thread.
async fn render_loop<R: Render>(inner: Arc<Inner<R>>) {
	loop {
		let entry = {
			let mut state = inner.state.lock();
			match state.queue.pop_back() {
				Some(entry) => entry,
				None => {
					state.render_task = None;
					return;
				}
			}
		};

		// A symbol exposed under several public names renders once; its
		// handle disappears when the first copy's outcome is published.
		if !inner.state.lock().slots.contains_key(&entry.item) {
			continue;
		}

		let render = Arc::clone(&inner.render);
		let render_item = entry.item.clone();
		let document = Arc::clone(&entry.document);
		let rendered =
			tokio::task::spawn_blocking(move || render.render(&document, &render_item)).await;

		let text = match rendered {
			Ok(Ok(text)) => Some(text),
			Ok(Err(error)) => {
				debug!(symbol = entry.item.symbol_id(), error = %error, "symbol failed to render");
				None
			}
			Err(join_error) => {
				warn!(symbol = entry.item.symbol_id(), error = %join_error, "render task failed");
				None
			}
		};

		if let Some(text) = &text {
			inner.cache.set(&entry.item, text.clone());
		}

		{
			let mut state = inner.state.lock();
			if let Some(slot) = state.slots.remove(&entry.item) {
				slot.outcome.send_replace(Some(Ok(text)));
			}
		}

		tokio::time::sleep(PARSE_THROTTLE).await;
	}
}
