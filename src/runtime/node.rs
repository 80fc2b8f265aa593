//! Node abstraction and factories.
//!
//! - **`Node` trait**: one graph position, advanced once per scheduler tick.
//! - **`Factory` trait**: builds nodes for the node types it understands and
//!   answers [`RuntimeError::NotFound`] for the rest.
//! - **`MultiFactory`**: tries several factories in order, so separate
//!   node libraries compose without knowing about each other.

use super::state::State;
use super::sync::NodeState;
use crate::config::ErrorSinkConfig;
use crate::error::{Result, RuntimeError};
use crate::ir;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;

/// A failure contained inside one node's tick
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeFault {
    /// One sample failed; the rest of the batch still ran
    #[error("node {node}: sample {index} of {total} failed: {message}")]
    Sample {
        node: String,
        index: usize,
        total: usize,
        message: String,
    },

    /// The whole invocation failed; no outputs were written
    #[error("node {node}: invocation failed: {message}")]
    Invocation { node: String, message: String },
}

impl NodeFault {
    pub fn node(&self) -> &str {
        match self {
            NodeFault::Sample { node, .. } | NodeFault::Invocation { node, .. } => node,
        }
    }
}

/// Receives node faults. Every fault is logged; when built with a channel
/// it is also forwarded to the receiver.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    tx: Option<Sender<NodeFault>>,
}

impl ErrorSink {
    /// Sink that only logs
    pub fn logging() -> Self {
        Self { tx: None }
    }

    /// Sink that logs and forwards to a bounded channel
    pub fn bounded(capacity: usize) -> (Self, Receiver<NodeFault>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn from_config(config: &ErrorSinkConfig) -> (Self, Receiver<NodeFault>) {
        Self::bounded(config.capacity)
    }

    pub fn report(&self, fault: NodeFault) {
        match &fault {
            NodeFault::Sample { .. } => tracing::warn!("{}", fault),
            NodeFault::Invocation { .. } => tracing::error!("{}", fault),
        }
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(fault) {
            Ok(()) => {}
            Err(TrySendError::Full(fault)) => {
                tracing::debug!(node = fault.node(), "error sink full, dropping fault");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Everything a node may touch during one tick.
pub struct Context<'a> {
    pub state: &'a mut State,
    /// Called once per output that produced data this tick
    pub mark_changed: &'a mut dyn FnMut(&str),
    pub errors: &'a ErrorSink,
    activate_stage: Option<&'a mut dyn FnMut()>,
}

impl<'a> Context<'a> {
    pub fn new(
        state: &'a mut State,
        mark_changed: &'a mut dyn FnMut(&str),
        errors: &'a ErrorSink,
    ) -> Self {
        Self {
            state,
            mark_changed,
            errors,
            activate_stage: None,
        }
    }

    /// Install the scheduler's stage-activation hook
    pub fn with_stage_activation(mut self, activate: &'a mut dyn FnMut()) -> Self {
        self.activate_stage = Some(activate);
        self
    }

    /// Ask the scheduler to activate the stage this node leads into.
    /// No-op when the scheduler installed no hook.
    pub fn activate_stage(&mut self) {
        if let Some(activate) = self.activate_stage.as_mut() {
            activate();
        }
    }
}

/// One node in a running graph.
pub trait Node: Send {
    /// Advance by one scheduler tick.
    fn next(&mut self, ctx: &mut Context<'_>);

    /// Clear one-shot latches. Nodes without latches keep the default.
    fn reset(&mut self) {}

    /// Whether the last sample of the named output is non-zero
    fn is_output_truthy(&self, state: &State, param: &str) -> bool;
}

/// What a factory needs to build one node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node: ir::Node,
    pub state: NodeState,
}

impl NodeConfig {
    /// Resolve `key` against the state's IR
    pub fn from_state(state: &State, key: &str) -> Result<Self> {
        let node = state
            .ir()
            .node(key)
            .cloned()
            .ok_or_else(|| RuntimeError::not_found("node", key))?;
        Ok(Self {
            node,
            state: state.node(key)?,
        })
    }
}

/// Builds nodes for the node types it knows.
#[cfg_attr(test, mockall::automock)]
pub trait Factory: Send + Sync {
    /// Returns [`RuntimeError::NotFound`] when the node type is not handled
    /// by this factory.
    fn create(&self, config: NodeConfig) -> Result<Box<dyn Node>>;
}

/// Ordered list of factories; the first one that does not answer
/// `NotFound` wins.
#[derive(Default)]
pub struct MultiFactory {
    factories: Vec<Box<dyn Factory>>,
}

impl MultiFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, factory: impl Factory + 'static) -> Self {
        self.factories.push(Box::new(factory));
        self
    }

    pub fn push(&mut self, factory: Box<dyn Factory>) {
        self.factories.push(factory);
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Factory for MultiFactory {
    fn create(&self, config: NodeConfig) -> Result<Box<dyn Node>> {
        for factory in &self.factories {
            match factory.create(config.clone()) {
                Err(e) if e.is_not_found() => continue,
                other => return other,
            }
        }
        Err(RuntimeError::not_found("node type", config.node.node_type))
    }
}
