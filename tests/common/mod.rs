//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use nodegraph_rs::config::SandboxConfig;
use nodegraph_rs::ir::{Ir, DEFAULT_OUTPUT_PARAM};
use nodegraph_rs::runtime::{
    ChannelDigest, Context, ErrorSink, Factory, Node, NodeConfig, SharedClock, State, StateConfig,
};
use nodegraph_rs::telem::Series;
use nodegraph_rs::types::TimeStamp;
use nodegraph_rs::wasm::{Module, ModuleConfig, WasmFactory};

/// Runtime state plus the module compiled from [`builders::NODE_WAT`]
pub struct Harness {
    pub state: State,
    pub module: Module,
}

impl Harness {
    pub fn new(ir: Ir, clock: SharedClock) -> Self {
        Self::with_sandbox(ir, clock, SandboxConfig::default())
    }

    pub fn with_sandbox(ir: Ir, clock: SharedClock, sandbox: SandboxConfig) -> Self {
        Self::open(StateConfig::new(ir), clock, sandbox)
    }

    /// Harness whose channel store knows `digests`
    pub fn with_channels(ir: Ir, clock: SharedClock, digests: Vec<ChannelDigest>) -> Self {
        Self::open(
            StateConfig::new(ir).with_channels(digests),
            clock,
            SandboxConfig::default(),
        )
    }

    fn open(state_config: StateConfig, clock: SharedClock, sandbox: SandboxConfig) -> Self {
        let ir = state_config.ir.clone();
        let state = State::new(state_config);
        let config = ModuleConfig::new(builders::NODE_WAT, ir)
            .with_sandbox(sandbox)
            .with_clock(clock);
        let module = Module::open(config, &state).expect("test module should open");
        Self { state, module }
    }

    /// Create the node `key` through a [`WasmFactory`]
    pub fn create(&self, key: &str) -> Box<dyn Node> {
        let config = NodeConfig::from_state(&self.state, key).expect("node should resolve");
        WasmFactory::new(self.module.clone())
            .create(config)
            .expect("node should be created")
    }

    /// Write an upstream producer's output with timestamps in seconds
    pub fn produce(&mut self, node: &str, data: Series, seconds: &[i64]) {
        self.state
            .set_output(node, DEFAULT_OUTPUT_PARAM, data, Series::from_seconds(seconds))
            .expect("source output should exist");
    }

    /// Advance `node` one tick, returning the outputs it marked changed
    pub fn tick(&mut self, node: &mut dyn Node, errors: &ErrorSink) -> Vec<String> {
        tick(node, &mut self.state, errors)
    }

    /// Values of `node.param`
    pub fn values<T: nodegraph_rs::telem::Element>(&self, node: &str, param: &str) -> Vec<T> {
        self.state
            .output(node, param)
            .map(|out| out.data.values::<T>())
            .unwrap_or_default()
    }

    /// Timestamps of `node.param` in whole seconds
    pub fn seconds(&self, node: &str, param: &str) -> Vec<i64> {
        self.state
            .output(node, param)
            .map(|out| {
                out.time
                    .values::<TimeStamp>()
                    .into_iter()
                    .map(|ts| ts.nanos() / TimeStamp::SECOND)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Advance `node` one tick against `state`
pub fn tick(node: &mut dyn Node, state: &mut State, errors: &ErrorSink) -> Vec<String> {
    let mut changed = Vec::new();
    {
        let mut mark = |param: &str| changed.push(param.to_string());
        let mut ctx = Context::new(state, &mut mark, errors);
        node.next(&mut ctx);
    }
    changed
}
