//! Readers-active counter with a drain signal.

use tokio::sync::watch;

/// Tracks how many readers are inside a critical region and signals when the
/// last one leaves.
///
/// Lookups hold a [`GateGuard`] while they touch shared state; a rebuild
/// awaits [`SharedGate::drained`] before mutating that state, so no reader
/// ever observes it half-rebuilt. The gate does not block new readers from
/// entering; serializing rebuilds against each other is a separate concern
/// (see [`crate::KeyedLocks`]).
#[derive(Debug)]
pub struct SharedGate {
	active: watch::Sender<usize>,
}

impl SharedGate {
	pub fn new() -> Self {
		let (active, _) = watch::channel(0);
		Self { active }
	}

	/// Enter the gate; the drain signal stays cleared until every guard from
	/// every holder has dropped.
	pub fn enter(&self) -> GateGuard<'_> {
		self.active.send_modify(|count| *count += 1);
		GateGuard { gate: self }
	}

	/// Wait until no guard is held. Returns immediately when the gate is idle.
	pub async fn drained(&self) {
		let mut active = self.active.subscribe();
		// Waiting only fails when the sender is dropped, and `self` owns it.
		let _ = active.wait_for(|count| *count == 0).await;
	}
}

impl Default for SharedGate {
	fn default() -> Self {
		Self::new()
	}
}

/// Releases one hold on its [`SharedGate`] when dropped.
#[derive(Debug)]
pub struct GateGuard<'a> {
	gate: &'a SharedGate,
}

impl Drop for GateGuard<'_> {
	fn drop(&mut self) {
		self.gate.active.send_modify(|count| *count -= 1);
	}
}
