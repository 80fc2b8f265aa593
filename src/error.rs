//! Error handling for the node execution core
//!
//! This module defines the crate error type and a Result alias. Per-sample
//! and per-invocation faults raised while a node runs are not returned
//! through this type; they are reported through
//! [`ErrorSink`](crate::runtime::ErrorSink) instead.

use thiserror::Error;

/// Main error type for node execution operations
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A node, function, export or channel does not exist
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or inconsistent graph IR
    #[error("Graph error: {0}")]
    Ir(String),

    /// Sandbox engine, compilation or instantiation failures
    #[error("Sandbox error: {0}")]
    Wasm(String),

    /// The sandboxed function trapped or panicked
    #[error("Trap: {message}")]
    Trap { message: String },

    /// Linear memory access outside the instance's memory
    #[error("Memory access out of range at offset {offset} (len {len})")]
    Memory { offset: usize, len: usize },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RuntimeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        RuntimeError::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// True for a missing capability, looking through any added context.
    pub fn is_not_found(&self) -> bool {
        match self {
            RuntimeError::NotFound { .. } => true,
            RuntimeError::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True when the failure came from the sandboxed code itself rather than
    /// from the host side of the call.
    pub fn is_trap(&self) -> bool {
        match self {
            RuntimeError::Trap { .. } => true,
            RuntimeError::WithContext { source, .. } => source.is_trap(),
            _ => false,
        }
    }

    /// Classify an error returned by a sandbox call.
    ///
    /// Wasm traps (including fuel exhaustion) and guest panics raised through
    /// the `panic` host binding become [`RuntimeError::Trap`]. Anything else
    /// originated in a host binding and is kept as a fatal sandbox error.
    pub fn from_wasm_error(err: wasmtime::Error) -> Self {
        if let Some(RuntimeError::Memory { offset, len }) = err.downcast_ref::<RuntimeError>() {
            return RuntimeError::Memory {
                offset: *offset,
                len: *len,
            };
        }
        let is_trap = err.downcast_ref::<wasmtime::Trap>().is_some()
            || err.downcast_ref::<crate::wasm::GuestPanic>().is_some();
        let message = err.root_cause().to_string();
        if is_trap {
            RuntimeError::Trap { message }
        } else {
            RuntimeError::Wasm(message)
        }
    }
}

/// Result type alias for node execution operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, wasmtime::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RuntimeError::from_wasm_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| RuntimeError::from_wasm_error(e).with_context(f()))
    }
}
