//! # Heron VM Core
//!
//! Typed arrays, ArrayBuffer / SharedArrayBuffer storage and the `Atomics`
//! namespace for the Heron JavaScript VM.
//!
//! ## Design Principles
//!
//! - **Thread-safe**: Values, buffers and typed arrays are `Send + Sync`
//! - **Race-free storage**: every element access is one atomic operation on
//!   the 8-byte word that contains it
//! - **Injected waiters**: `Atomics.wait` / `Atomics.notify` go through an
//!   agent-held waiter registry

#![warn(clippy::all)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod array_buffer;
pub mod atomic_helper;
pub mod atomics;
pub mod convert;
pub mod data_block;
pub mod element_kind;
pub mod error;
pub mod memory;
pub mod object;
pub mod typed_array;
pub mod typed_array_helper;
pub mod value;
pub mod waiter;

pub use agent::{Agent, AgentConfig};
pub use array_buffer::JsArrayBuffer;
pub use atomics::create_atomics_object;
pub use data_block::{DataBlock, RmwOp};
pub use element_kind::{ContentType, ElementKind};
pub use error::{ErrorKind, VmError, VmResult};
pub use memory::MemoryManager;
pub use object::{JsObject, PropertyKey};
pub use typed_array::JsTypedArray;
pub use value::Value;
pub use waiter::{WaitResult, WaiterList};
