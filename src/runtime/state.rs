//! Runtime state for one graph.
//!
//! [`State`] owns the value store (one cell per node output), the map from
//! output handles to cells, and the channel store shared with the sandbox
//! host bindings. Nodes get their wiring through [`State::node`].

use super::channel::{ChannelDigest, ChannelStore, SharedChannels};
use super::id::OutputId;
use super::store::{Output, ValueStore};
use super::sync::{InputSource, NodeState};
use crate::error::{Result, RuntimeError};
use crate::ir::{Handle, Ir};
use crate::telem::{ChannelKey, Frame, MultiSeries, Series};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct StateConfig {
    pub ir: Ir,
    pub channel_digests: Vec<ChannelDigest>,
}

impl StateConfig {
    pub fn new(ir: Ir) -> Self {
        Self {
            ir,
            channel_digests: Vec::new(),
        }
    }

    pub fn with_channels(mut self, digests: Vec<ChannelDigest>) -> Self {
        self.channel_digests = digests;
        self
    }
}

pub struct State {
    ir: Ir,
    store: ValueStore,
    outputs: HashMap<Handle, OutputId>,
    channels: SharedChannels,
}

impl State {
    /// Allocate one output cell per declared output of every node.
    /// Nodes whose type has no function definition get no cells.
    pub fn new(config: StateConfig) -> Self {
        let mut store = ValueStore::new();
        let mut outputs = HashMap::new();
        for node in &config.ir.nodes {
            let Some(function) = config.ir.function(&node.node_type) else {
                continue;
            };
            for param in &function.outputs {
                let id = store.alloc(param.data_type);
                outputs.insert(Handle::new(node.key.clone(), param.name.clone()), id);
            }
        }
        tracing::debug!(
            nodes = config.ir.nodes.len(),
            outputs = store.len(),
            "runtime state allocated"
        );
        Self {
            channels: Arc::new(RwLock::new(ChannelStore::new(&config.channel_digests))),
            ir: config.ir,
            store,
            outputs,
        }
    }

    pub fn ir(&self) -> &Ir {
        &self.ir
    }

    /// Build the synchronizer state for one node.
    ///
    /// Inputs follow the function's parameter order, not edge order. An
    /// unconnected input falls back to its declared default; without one
    /// the graph is rejected. Edge sources and defaults must carry the
    /// input's declared type.
    pub fn node(&self, key: &str) -> Result<NodeState> {
        let node = self
            .ir
            .node(key)
            .ok_or_else(|| RuntimeError::not_found("node", key))?;
        let function = self
            .ir
            .function(&node.node_type)
            .ok_or_else(|| RuntimeError::not_found("function", node.node_type.clone()))?;

        let mut inputs = Vec::with_capacity(function.inputs.len());
        for param in &function.inputs {
            let target = Handle::new(key, param.name.clone());
            let source = match (self.ir.edge_into(&target), param.default) {
                (Some(edge), _) => {
                    let id = self.outputs.get(&edge.source).copied().ok_or_else(|| {
                        RuntimeError::Ir(format!(
                            "edge into {} reads {}, which is not a node output",
                            target, edge.source
                        ))
                    })?;
                    let found = self.store.get(id).data.data_type();
                    if found != param.data_type {
                        return Err(RuntimeError::Ir(format!(
                            "input {} expects {} but {} produces {}",
                            target, param.data_type, edge.source, found
                        )));
                    }
                    InputSource::Edge(id)
                }
                (None, Some(value)) => {
                    if value.data_type() != param.data_type {
                        return Err(RuntimeError::Ir(format!(
                            "input {} expects {} but its default is {}",
                            target,
                            param.data_type,
                            value.data_type()
                        )));
                    }
                    InputSource::Default(value)
                }
                (None, None) => {
                    return Err(RuntimeError::Ir(format!(
                        "required input {} is not connected",
                        target
                    )))
                }
            };
            inputs.push((source, param.data_type));
        }

        let outputs = function
            .outputs
            .iter()
            .filter_map(|p| {
                let id = self.outputs.get(&Handle::new(key, p.name.clone()))?;
                Some((p.name.clone(), *id))
            })
            .collect();

        Ok(NodeState::new(key, inputs, outputs))
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ValueStore {
        &mut self.store
    }

    pub fn output_id(&self, node: &str, param: &str) -> Option<OutputId> {
        self.outputs.get(&Handle::new(node, param)).copied()
    }

    /// Current value of a node output
    pub fn output(&self, node: &str, param: &str) -> Option<&Output> {
        self.output_id(node, param).map(|id| self.store.get(id))
    }

    /// Replace a node output. Used by nodes that compute outside the
    /// sandbox and by tests standing in for upstream producers.
    pub fn set_output(&mut self, node: &str, param: &str, data: Series, time: Series) -> Result<()> {
        let id = self
            .output_id(node, param)
            .ok_or_else(|| RuntimeError::not_found("output", Handle::new(node, param).to_string()))?;
        self.store.set(id, Output::new(data, time));
        Ok(())
    }

    /// Handle to the channel store for host bindings
    pub fn channels(&self) -> SharedChannels {
        Arc::clone(&self.channels)
    }

    /// Record the latest channel values carried by `frame`
    pub fn ingest(&self, frame: &Frame) {
        match self.channels.write() {
            Ok(mut channels) => channels.ingest(frame),
            Err(poisoned) => poisoned.into_inner().ingest(frame),
        }
    }

    /// Latest data of a channel plus its index timestamps
    pub fn read_chan(&self, key: ChannelKey) -> Option<(MultiSeries, MultiSeries)> {
        self.channels.read().ok().and_then(|c| c.read(key))
    }

    pub fn write_chan(&self, key: ChannelKey, data: Series, time: Series) {
        match self.channels.write() {
            Ok(mut channels) => channels.write(key, data, time),
            Err(poisoned) => poisoned.into_inner().write(key, data, time),
        }
    }

    /// Drain buffered channel writes into `frame`; the flag reports whether
    /// anything was written since the last flush.
    pub fn flush_writes(&self, frame: Frame) -> (Frame, bool) {
        match self.channels.write() {
            Ok(mut channels) => channels.flush(frame),
            Err(poisoned) => poisoned.into_inner().flush(frame),
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("nodes", &self.ir.nodes.len())
            .field("outputs", &self.store.len())
            .finish()
    }
}
