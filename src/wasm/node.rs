//! Wasm-backed node: the per-sample execution loop.
//!
//! On each triggered tick the node runs its compiled function once per
//! output sample. Inputs shorter than the longest one cycle, so a slowly
//! changing scalar broadcasts against a fast stream. A trap on one sample
//! is reported and skipped; any other failure abandons the tick without
//! touching the node's outputs.

use super::abi;
use super::function::Function;
use super::module::{Module, Sandbox};
use crate::error::Result;
use crate::runtime::{
    Context, ErrorSink, Factory, Node, NodeConfig, NodeFault, NodeState, Output, SharedClock,
    State,
};
use crate::telem::Series;
use crate::types::{Alignment, DataType, TimeRange, TimeStamp};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

pub struct WasmNode {
    key: String,
    state: NodeState,
    function: Function,
    sandbox: Arc<Mutex<Sandbox>>,
    clock: SharedClock,
    args: Vec<u64>,
    results: Vec<Option<u64>>,
}

impl WasmNode {
    pub fn new(key: impl Into<String>, state: NodeState, function: Function, module: &Module) -> Self {
        Self {
            key: key.into(),
            args: vec![0; function.inputs().len()],
            results: vec![None; function.outputs().len()],
            state,
            function,
            sandbox: module.shared(),
            clock: module.clock(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Run the sample loop over the current snapshot. `Ok(None)` when there
    /// is nothing to compute.
    fn execute(&mut self, errors: &ErrorSink) -> Result<Option<Vec<Output>>> {
        let input_count = self.state.input_count();
        let max_len = if input_count == 0 {
            1
        } else {
            (0..input_count)
                .map(|i| self.state.input(i).len())
                .max()
                .unwrap_or(0)
        };
        if max_len == 0 {
            return Ok(None);
        }

        let alignment: Alignment = (0..input_count).map(|i| self.state.input(i).alignment).sum();
        let time_range = (0..input_count)
            .map(|i| self.state.input(i).time_range)
            .reduce(TimeRange::union)
            .unwrap_or_default();

        // First input of maximal length supplies output timestamps.
        let mut longest: Option<usize> = None;
        for i in 0..input_count {
            if longest.map_or(true, |l| self.state.input(i).len() > self.state.input(l).len()) {
                longest = Some(i);
            }
        }

        let mut outputs: Vec<Output> = self
            .function
            .outputs()
            .iter()
            .map(|dt| {
                Output::new(
                    Series::zeroed(*dt, max_len)
                        .with_alignment(alignment)
                        .with_time_range(time_range),
                    Series::zeroed(DataType::TimeStamp, max_len)
                        .with_alignment(alignment)
                        .with_time_range(time_range),
                )
            })
            .collect();
        let mut cursors = vec![0usize; outputs.len()];

        let mut sandbox = self.sandbox.lock().unwrap_or_else(PoisonError::into_inner);
        for i in 0..max_len {
            for (j, arg) in self.args.iter_mut().enumerate().take(input_count) {
                let input = self.state.input(j);
                *arg = match input.len() {
                    0 => 0,
                    len => abi::pack(input.data_type(), input.element(i % len).unwrap_or(&[])),
                };
            }

            let timestamp = longest
                .and_then(|l| self.state.input_time(l).at::<TimeStamp>(i))
                .unwrap_or_else(|| self.clock.now());

            match self.function.call(&mut sandbox, &self.args, &mut self.results) {
                Ok(()) => {}
                Err(e) if e.is_trap() => {
                    errors.report(NodeFault::Sample {
                        node: self.key.clone(),
                        index: i,
                        total: max_len,
                        message: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            }

            for (k, result) in self.results.iter().enumerate() {
                let Some(word) = result else {
                    continue;
                };
                let out = &mut outputs[k];
                let dt = out.data.data_type();
                out.data.set_element(cursors[k], &abi::unpack(dt, *word));
                out.time.set_element(cursors[k], &timestamp.nanos().to_le_bytes());
                cursors[k] += 1;
            }
        }

        for (out, len) in outputs.iter_mut().zip(&cursors) {
            out.data.truncate(*len);
            out.time.truncate(*len);
        }
        tracing::trace!(
            node = %self.key,
            samples = max_len,
            written = ?cursors,
            "executed"
        );
        Ok(Some(outputs))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl Node for WasmNode {
    fn next(&mut self, ctx: &mut Context<'_>) {
        if !self.state.refresh_inputs(ctx.state.store()) {
            return;
        }

        let errors = ctx.errors;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(errors)));
        let outputs = match outcome {
            Ok(Ok(Some(outputs))) => outputs,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                errors.report(NodeFault::Invocation {
                    node: self.key.clone(),
                    message: e.to_string(),
                });
                return;
            }
            Err(payload) => {
                errors.report(NodeFault::Invocation {
                    node: self.key.clone(),
                    message: panic_message(payload.as_ref()),
                });
                return;
            }
        };

        for (k, output) in outputs.into_iter().enumerate() {
            let Some(id) = self.state.output_id(k) else {
                continue;
            };
            let changed = !output.is_empty();
            ctx.state.store_mut().set(id, output);
            if changed {
                if let Some(name) = self.state.output_name(k) {
                    (ctx.mark_changed)(name);
                }
            }
        }
    }

    fn is_output_truthy(&self, state: &State, param: &str) -> bool {
        self.state.is_output_truthy(state.store(), param)
    }
}

impl std::fmt::Debug for WasmNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmNode")
            .field("key", &self.key)
            .field("function", &self.function)
            .finish()
    }
}

/// Creates [`WasmNode`]s for node types exported by a module
#[derive(Debug, Clone)]
pub struct WasmFactory {
    module: Module,
}

impl WasmFactory {
    pub fn new(module: Module) -> Self {
        Self { module }
    }
}

impl Factory for WasmFactory {
    fn create(&self, config: NodeConfig) -> Result<Box<dyn Node>> {
        let function = self.module.function(&config.node.node_type)?;
        tracing::debug!(node = %config.node.key, function = function.key(), "created wasm node");
        Ok(Box::new(WasmNode::new(
            config.node.key,
            config.state,
            function,
            &self.module,
        )))
    }
}
