//! In-flight call registry.
//!
//! Tracks the cancellation handle of every call that has been issued but not
//! yet settled, keyed by the call's REQUEST type. The orchestrator uses it to
//! enforce single-flight: a newer call cancels the older call sharing its key
//! before registering itself.
//!
//! The registry itself permits duplicate keys. Removal only ever takes the
//! first matching entry, so a cancelled call cleaning up after itself never
//! removes the entry of the call that superseded it out of order.
//!
//! # Example
//!
//! ```
//! use composable_api_runtime::registry::CallRegistry;
//! use composable_api_core::CancelSource;
//!
//! let registry = CallRegistry::new();
//! let source = CancelSource::new();
//! registry.add("FETCH_USER", source.clone());
//!
//! assert_eq!(registry.cancel_existing("FETCH_USER", "FETCH_USER call was canceled."), 1);
//! assert!(source.is_cancelled());
//!
//! registry.remove("FETCH_USER");
//! assert!(registry.is_empty());
//! ```

use composable_api_core::CancelSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A registered in-flight call
#[derive(Debug, Clone)]
pub struct CallEntry {
    /// REQUEST type; the registry key
    pub call: String,
    /// Unique id, used to tell duplicate keys apart
    pub id: u64,
    /// Cancels the call
    pub cancel: CancelSource,
}

/// Shared table of in-flight calls
///
/// Cloning shares the underlying table and its id sequence.
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    entries: Arc<Mutex<Vec<CallEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl CallRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First entry registered under `key`
    #[must_use]
    pub fn exists(&self, key: &str) -> Option<CallEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|entry| entry.call == key)
            .cloned()
    }

    /// Register a call, even if its key is already present
    ///
    /// Returns the id assigned to the new entry.
    pub fn add(&self, call: impl Into<String>, cancel: CancelSource) -> u64 {
        let entry = CallEntry {
            call: call.into(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            cancel,
        };
        let id = entry.id;

        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        tracing::trace!(call = %entry.call, id, "Registering call");
        entries.push(entry);
        id
    }

    /// Remove the first entry registered under `key`
    ///
    /// Returns the removed entry, if any.
    pub fn remove(&self, key: &str) -> Option<CallEntry> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let index = entries.iter().position(|entry| entry.call == key)?;
        let entry = entries.remove(index);
        tracing::trace!(call = %entry.call, id = entry.id, "Removed call");
        Some(entry)
    }

    /// Cancel every live call registered under `key`
    ///
    /// Entries already cancelled but not yet settled are skipped. The lock is
    /// released before the cancel handles run, so cancellation may re-enter
    /// the registry. Entries stay registered until their calls settle.
    /// Returns how many calls were cancelled.
    pub fn cancel_existing(&self, key: &str, reason: &str) -> usize {
        let live: Vec<CallEntry> = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.call == key && !entry.cancel.is_cancelled())
            .cloned()
            .collect();

        for entry in &live {
            tracing::debug!(call = %entry.call, id = entry.id, reason, "Cancelling superseded call");
            entry.cancel.cancel(reason);
        }
        live.len()
    }

    /// Number of registered entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether no call is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
