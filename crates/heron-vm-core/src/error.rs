//! VM error types

use crate::value::Value;
use thiserror::Error;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (wrong kind of operand, detached buffer, ...)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error (index overflow, misaligned offset, length too large)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Syntax error raised by string to BigInt conversion
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// The current agent is not allowed to suspend.
    ///
    /// Scripts observe this as a `TypeError`.
    #[error("TypeError: {0}")]
    CannotSuspend(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Out of memory
    #[error("OutOfMemory")]
    OutOfMemory,

    /// Value thrown by user code (a callback, valueOf hook, iterator)
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),
}

/// A thrown JavaScript value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// The thrown value (as a string representation)
    pub message: String,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Coarse classification of a [`VmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operand is not the required kind of object, or its buffer is detached
    TypeKind,
    /// Numeric argument outside of its valid domain
    RangeViolation,
    /// The agent may not block
    CapabilityDenied,
    /// Failure inside a coercion primitive that is neither of the above
    Coercion,
    /// A value thrown by user code
    Thrown,
    /// Engine failure (allocation, invariant)
    Internal,
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create a syntax error
    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError(msg.into())
    }

    /// Create a "cannot suspend" error
    pub fn cannot_suspend(msg: impl Into<String>) -> Self {
        Self::CannotSuspend(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create an exception from a thrown JS value
    pub fn exception(value: Value) -> Self {
        let message = match value.as_str() {
            Some(s) => s.to_string(),
            None => format!("{:?}", value),
        };
        Self::Exception(Box::new(ThrownValue { message, value }))
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeError(_) => ErrorKind::TypeKind,
            Self::RangeError(_) => ErrorKind::RangeViolation,
            Self::CannotSuspend(_) => ErrorKind::CapabilityDenied,
            Self::SyntaxError(_) => ErrorKind::Coercion,
            Self::Exception(_) => ErrorKind::Thrown,
            Self::InternalError(_) | Self::OutOfMemory => ErrorKind::Internal,
        }
    }

    /// Whether scripts would observe this error as a `TypeError`.
    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::TypeError(_) | Self::CannotSuspend(_))
    }

    /// Whether scripts would observe this error as a `RangeError`.
    pub fn is_range_error(&self) -> bool {
        matches!(self, Self::RangeError(_))
    }

    /// The value carried by a user-code exception, if any.
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            Self::Exception(thrown) => Some(&thrown.value),
            _ => None,
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;
