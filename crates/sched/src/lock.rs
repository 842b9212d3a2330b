//! Mutual exclusion keyed by `(namespace, resource id)`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type LockKey = (String, String);

/// A table of named locks, created on first use and removed when the last
/// holder or waiter departs, so the table never accumulates dead keys.
///
/// Callers choose per call site whether to wait for a busy lock
/// ([`KeyedLocks::acquire`]) or give up immediately
/// ([`KeyedLocks::try_acquire`]).
#[derive(Debug, Default)]
pub struct KeyedLocks {
	table: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Acquire the lock for `(namespace, resource)`, waiting for any current
	/// holder to release it.
	pub async fn acquire(&self, namespace: &str, resource: &str) -> KeyedLockGuard<'_> {
		let lock = self.entry(namespace, resource);
		let permit = lock.lock_owned().await;
		debug!(namespace, resource, "acquired keyed lock");
		KeyedLockGuard {
			owner: self,
			key: (namespace.to_owned(), resource.to_owned()),
			_permit: permit,
		}
	}

	/// Acquire the lock only when it is free; `None` means somebody holds it.
	pub fn try_acquire(&self, namespace: &str, resource: &str) -> Option<KeyedLockGuard<'_>> {
		let lock = self.entry(namespace, resource);
		match lock.try_lock_owned() {
			Ok(permit) => {
				debug!(namespace, resource, "acquired keyed lock");
				Some(KeyedLockGuard {
					owner: self,
					key: (namespace.to_owned(), resource.to_owned()),
					_permit: permit,
				})
			}
			Err(_) => None,
		}
	}

	fn entry(&self, namespace: &str, resource: &str) -> Arc<AsyncMutex<()>> {
		let mut table = self.table.lock();
		table
			.entry((namespace.to_owned(), resource.to_owned()))
			.or_default()
			.clone()
	}

	fn release(&self, key: &LockKey) {
		let mut table = self.table.lock();
		if let Some(lock) = table.get(key)
			&& Arc::strong_count(lock) <= 2
		{
			// Just the table and the departing guard: nobody else holds or
			// waits on this key, so the entry can go. Waiters clone the Arc
			// under the table lock, which serializes against this check.
			table.remove(key);
		}
	}

	#[cfg(test)]
	fn key_count(&self) -> usize {
		self.table.lock().len()
	}
}

/// Holds a keyed lock until dropped.
#[derive(Debug)]
pub struct KeyedLockGuard<'a> {
	owner: &'a KeyedLocks,
	key: LockKey,
	_permit: OwnedMutexGuard<()>,
}

impl Drop for KeyedLockGuard<'_> {
	fn drop(&mut self) {
		self.owner.release(&self.key);
		debug!(namespace = %self.key.0, resource = %self.key.1, "released keyed lock");
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	#[tokio::test]
	async fn second_try_acquire_is_refused_while_held() {
		let locks = KeyedLocks::new();
		let guard = locks.try_acquire("doc", "refresh").expect("free lock");
		assert!(locks.try_acquire("doc", "refresh").is_none());

		drop(guard);
		assert!(locks.try_acquire("doc", "refresh").is_some());
	}

	#[tokio::test]
	async fn distinct_resources_do_not_contend() {
		let locks = KeyedLocks::new();
		let _a = locks.try_acquire("doc", "refresh").expect("free lock");
		let _b = locks.try_acquire("doc", "other").expect("free lock");
		let _c = locks.try_acquire("cache", "refresh").expect("free lock");
	}

	#[tokio::test]
	async fn entry_is_removed_when_the_last_holder_departs() {
		let locks = KeyedLocks::new();
		let guard = locks.acquire("doc", "refresh").await;
		assert_eq!(locks.key_count(), 1);

		drop(guard);
		assert_eq!(locks.key_count(), 0);
	}

	#[tokio::test]
	async fn waiter_keeps_the_entry_alive_and_gets_the_lock() {
		let locks = Arc::new(KeyedLocks::new());
		let guard = locks.acquire("doc", "refresh").await;

		let waiter = tokio::spawn({
			let locks = Arc::clone(&locks);
			async move {
				let _guard = locks.acquire("doc", "refresh").await;
			}
		});
		tokio::task::yield_now().await;
		assert!(!waiter.is_finished());

		drop(guard);
		waiter.await.expect("waiter acquires");
		assert_eq!(locks.key_count(), 0);
	}
}
