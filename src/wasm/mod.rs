//! Sandboxed execution of compiled node functions.
//!
//! A [`Module`] holds one wasmtime instance. Each exported function named
//! in the IR becomes a node type: [`WasmFactory`] binds the export to a
//! [`Function`] and wraps it in a [`WasmNode`] that runs it once per sample.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  refresh_inputs   ┌──────────┐  pack/call/unpack  ┌────────────┐
//! │  NodeState   │ ────────────────► │ WasmNode │ ─────────────────► │  Function  │
//! │  (snapshot)  │                   │  (loop)  │ ◄───────────────── │ (sandbox)  │
//! └──────────────┘                   └──────────┘   flagged results  └─────┬──────┘
//!                                         │                                │ env.*
//!                                         ▼                                ▼
//!                                    ValueStore                      HostState
//!                                    + mark_changed       (channels, vars, series)
//! ```
//!
//! # Failure handling
//!
//! - A trap or guest `panic` fails only the current sample.
//! - Host violations (bad memory access, missing exports, unknown series
//!   handles) abandon the tick.
//! - Neither propagates: both are reported to the [`ErrorSink`](crate::runtime::ErrorSink).

pub mod abi;
pub mod bindings;
pub mod function;
pub mod handles;
pub mod module;
pub mod node;
pub mod ops;

pub use bindings::{register_host_functions, GuestPanic, HostState, HOST_MODULE};
pub use function::{Function, OutputMode};
pub use handles::{SeriesHandles, MAX_SERIES_BYTES};
pub use module::{Module, ModuleConfig, Sandbox};
pub use node::{WasmFactory, WasmNode};
