//! # nodegraph-rs: node execution core for dataflow graphs
//!
//! Runs the nodes of a compiled dataflow graph. Each node waits for fresh
//! upstream data, snapshots one aligned batch per input, and runs a
//! sandboxed compiled function over it sample by sample.
//!
//! ## Architecture
//!
//! - **Runtime**: value store, input synchronization, channel state and the
//!   node/factory traits ([`runtime`])
//! - **Wasm**: module loading, host bindings and the per-sample execution
//!   loop ([`wasm`])
//! - **Telemetry**: typed series and frames ([`telem`])
//! - **IR**: graph and function declarations ([`ir`])
//!
//! ## Example
//!
//! ```ignore
//! use nodegraph_rs::{
//!     ir::Ir,
//!     runtime::{Context, ErrorSink, Factory, NodeConfig, State, StateConfig},
//!     wasm::{Module, ModuleConfig, WasmFactory},
//! };
//!
//! let ir = Ir::from_json(&std::fs::read_to_string("graph.json")?)?;
//! let mut state = State::new(StateConfig::new(ir.clone()));
//! let module = Module::open(ModuleConfig::new(std::fs::read("graph.wasm")?, ir), &state)?;
//! let factory = WasmFactory::new(module);
//! let mut node = factory.create(NodeConfig::from_state(&state, "add")?)?;
//!
//! let errors = ErrorSink::logging();
//! let mut changed = |param: &str| println!("add.{} changed", param);
//! node.next(&mut Context::new(&mut state, &mut changed, &errors));
//! ```

pub mod config;
pub mod error;
pub mod ir;
pub mod runtime;
pub mod telem;
pub mod types;
pub mod wasm;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{Result, ResultExt, RuntimeError};
pub use runtime::{Context, ErrorSink, Factory, MultiFactory, Node, NodeConfig, NodeFault, State};
pub use wasm::{Module, ModuleConfig, WasmFactory};
