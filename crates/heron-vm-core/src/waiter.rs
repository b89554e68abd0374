//! Waiter registry for `Atomics.wait` / `Atomics.notify`
//!
//! Blocked agents are recorded in lists keyed by the absolute address of the
//! element they wait on. One mutex guards every list; each waiter parks on
//! its own condition variable against that mutex. A notifier clears the
//! `waiting` flag of a node before signalling it, so a waiter only leaves
//! its loop when that flag is clear or its deadline has passed. Condition
//! variable returns alone prove nothing.
//!
//! The registry is a service object: agents hold an `Arc<WaiterList>`.
//! [`WaiterList::global`] is created on first use and lives until process
//! exit; tests and embedders that need isolation create their own with
//! [`WaiterList::new`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::data_block::{AtomicElement, DataBlock};

/// Outcome of a single wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Woken by a notify
    Ok,
    /// The value did not match; the agent never blocked
    NotEqual,
    /// The timeout elapsed first
    TimedOut,
}

impl WaitResult {
    /// The string `Atomics.wait` returns for this outcome
    pub const fn as_str(self) -> &'static str {
        match self {
            WaitResult::Ok => "ok",
            WaitResult::NotEqual => "not-equal",
            WaitResult::TimedOut => "timed-out",
        }
    }
}

struct WaiterNode {
    byte_index: usize,
    /// Only read or written with the registry mutex held
    waiting: AtomicBool,
    condvar: Condvar,
}

/// Address-keyed lists of blocked agents
#[derive(Default)]
pub struct WaiterList {
    lists: Mutex<FxHashMap<usize, VecDeque<Arc<WaiterNode>>>>,
}

impl std::fmt::Debug for WaiterList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaiterList")
            .field("addresses", &self.lists.lock().len())
            .finish()
    }
}

static GLOBAL_WAITERS: OnceLock<Arc<WaiterList>> = OnceLock::new();

impl WaiterList {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> Arc<WaiterList> {
        GLOBAL_WAITERS
            .get_or_init(|| Arc::new(WaiterList::new()))
            .clone()
    }

    /// Block until notified, or until `timeout` passes (`None` waits
    /// forever), provided the element at `byte_index` still equals
    /// `expected`.
    ///
    /// The comparison happens with the registry lock held, so a notify that
    /// follows a store to the same element can never be missed.
    pub fn wait<T: AtomicElement>(
        &self,
        block: &DataBlock,
        byte_index: usize,
        expected: T,
        timeout: Option<Duration>,
    ) -> WaitResult {
        let address = block.base_address() + byte_index;
        let mut lists = self.lists.lock();

        match block.load::<T>(byte_index) {
            Some(current) if current == expected => {}
            _ => return WaitResult::NotEqual,
        }

        let node = Arc::new(WaiterNode {
            byte_index,
            waiting: AtomicBool::new(true),
            condvar: Condvar::new(),
        });
        lists.entry(address).or_default().push_back(node.clone());
        // A deadline beyond what `Instant` can represent waits forever.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        trace!(address, ?timeout, "agent blocked");

        let mut result = WaitResult::Ok;
        while node.waiting.load(Ordering::Relaxed) {
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        result = WaitResult::TimedOut;
                        break;
                    }
                    node.condvar.wait_until(&mut lists, deadline);
                }
                None => node.condvar.wait(&mut lists),
            }
        }

        if let Some(list) = lists.get_mut(&address) {
            list.retain(|n| !Arc::ptr_eq(n, &node));
            if list.is_empty() {
                lists.remove(&address);
            }
        }
        node.waiting.store(false, Ordering::Relaxed);
        trace!(address, byte_index = node.byte_index, ?result, "agent resumed");
        result
    }

    /// Wake up to `count` agents waiting on `byte_index` of `block` (`None`
    /// wakes all). Returns how many were woken.
    pub fn notify(&self, block: &DataBlock, byte_index: usize, count: Option<u64>) -> u64 {
        let address = block.base_address() + byte_index;
        let lists = self.lists.lock();
        let Some(list) = lists.get(&address) else {
            return 0;
        };

        let mut woken = 0;
        for node in list {
            if count.is_some_and(|budget| woken >= budget) {
                break;
            }
            if !node.waiting.load(Ordering::Relaxed) {
                continue;
            }
            node.waiting.store(false, Ordering::Relaxed);
            node.condvar.notify_one();
            woken += 1;
        }
        debug!(address, woken, "notify");
        woken
    }

    /// Number of agents currently blocked on `address`
    pub fn waiter_count(&self, address: usize) -> usize {
        self.lists
            .lock()
            .get(&address)
            .map_or(0, |list| list.iter().filter(|n| n.waiting.load(Ordering::Relaxed)).count())
    }

    /// Whether no agent is blocked anywhere
    pub fn is_empty(&self) -> bool {
        self.lists.lock().is_empty()
    }

    /// Signal every parked waiter without clearing its flag.
    #[cfg(test)]
    fn wake_all_spuriously(&self) {
        let lists = self.lists.lock();
        for node in lists.values().flatten() {
            node.condvar.notify_all();
        }
    }
}
