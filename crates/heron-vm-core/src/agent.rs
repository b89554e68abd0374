//! Execution agents
//!
//! An `Agent` is the per-thread view of the VM that the typed array and
//! atomics operations run against: its configuration, the memory manager
//! that books buffer allocations, and the waiter registry used by
//! `Atomics.wait` / `Atomics.notify`.
//!
//! Agents are cheap to clone. Agents that should be able to wake each other
//! must share a [`WaiterList`]; `Agent::new` uses the process-wide one.
//!
//! ```ignore
//! let main = Agent::new(AgentConfig { can_block: false, ..Default::default() });
//! let worker = Agent::new(AgentConfig::default());
//! std::thread::spawn(move || atomics::wait(&worker, &ta, &idx, &v, &timeout));
//! ```

use std::sync::Arc;

use crate::memory::MemoryManager;
use crate::waiter::WaiterList;

/// Configuration for creating a new Agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Whether `Atomics.wait` may suspend this agent
    pub can_block: bool,
    /// Largest ArrayBuffer that may be allocated, in bytes
    pub max_array_buffer_byte_length: usize,
    /// Maximum bytes held by buffer backing stores
    pub max_heap_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            can_block: true,
            max_array_buffer_byte_length: i32::MAX as usize,
            max_heap_size: 512 * 1024 * 1024, // 512 MB
        }
    }
}

/// A thread of execution participating in shared-memory atomics.
#[derive(Debug, Clone)]
pub struct Agent {
    config: AgentConfig,
    memory_manager: Arc<MemoryManager>,
    waiters: Arc<WaiterList>,
}

impl Agent {
    /// Create an agent that uses the process-wide waiter registry.
    pub fn new(config: AgentConfig) -> Self {
        Self::with_waiter_list(config, WaiterList::global())
    }

    /// Create an agent bound to an explicit waiter registry.
    pub fn with_waiter_list(config: AgentConfig, waiters: Arc<WaiterList>) -> Self {
        let memory_manager = Arc::new(MemoryManager::new(config.max_heap_size));
        Self {
            config,
            memory_manager,
            waiters,
        }
    }

    /// Another agent sharing this agent's waiter registry and memory budget.
    pub fn spawn_peer(&self, config: AgentConfig) -> Self {
        Self {
            config,
            memory_manager: self.memory_manager.clone(),
            waiters: self.waiters.clone(),
        }
    }

    /// The configuration this agent was created with
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Whether `Atomics.wait` may block this agent
    pub fn can_block(&self) -> bool {
        self.config.can_block
    }

    /// Get the memory manager for this agent
    pub fn memory_manager(&self) -> &Arc<MemoryManager> {
        &self.memory_manager
    }

    /// Get the waiter registry for this agent
    pub fn waiter_list(&self) -> &Arc<WaiterList> {
        &self.waiters
    }
}
