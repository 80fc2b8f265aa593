//! Compiled module loading and the shared sandbox instance.

use super::bindings::{register_host_functions, HostState};
use super::function::Function;
use crate::config::SandboxConfig;
use crate::error::{Result, ResultExt, RuntimeError};
use crate::ir::{self, Ir};
use crate::runtime::{SharedClock, State, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use wasmtime::{Engine, Instance, Linker, Memory, Store, StoreLimitsBuilder};

/// Everything needed to open a compiled module
#[derive(Clone)]
pub struct ModuleConfig {
    /// Wasm binary or WAT text
    pub wasm: Vec<u8>,
    /// Function declarations for the module's exports
    pub ir: Ir,
    pub sandbox: SandboxConfig,
    /// Time source for `now()`, channel writes and input-less nodes
    pub clock: SharedClock,
}

impl ModuleConfig {
    pub fn new(wasm: impl Into<Vec<u8>>, ir: Ir) -> Self {
        Self {
            wasm: wasm.into(),
            ir,
            sandbox: SandboxConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

/// One instantiated module: the store, its instance and exported memory.
pub struct Sandbox {
    pub(crate) store: Store<HostState>,
    instance: Instance,
    pub(crate) memory: Option<Memory>,
    pub(crate) fuel: Option<u64>,
}

impl Sandbox {
    pub fn host(&self) -> &HostState {
        self.store.data()
    }
}

/// Handle to an opened module. Cloning shares the same instance; every
/// node created from it locks the sandbox for the duration of its tick.
#[derive(Clone)]
pub struct Module {
    sandbox: Arc<Mutex<Sandbox>>,
    functions: Arc<HashMap<String, ir::Function>>,
    clock: SharedClock,
}

impl Module {
    /// Compile, bind host functions and instantiate.
    ///
    /// Host bindings share the channel store of `state`.
    pub fn open(config: ModuleConfig, state: &State) -> Result<Self> {
        let mut wasm_config = wasmtime::Config::new();
        wasm_config.consume_fuel(config.sandbox.fuel_enabled);
        wasm_config.debug_info(config.sandbox.debug_info);

        let engine = Engine::new(&wasm_config).context("failed to create engine")?;
        let module =
            wasmtime::Module::new(&engine, &config.wasm).context("failed to compile module")?;

        let mut linker = Linker::new(&engine);
        register_host_functions(&mut linker)?;

        let limits = StoreLimitsBuilder::new()
            .memory_size(config.sandbox.max_memory_bytes())
            .build();
        let host = HostState::new(state.channels(), Arc::clone(&config.clock), limits);
        let mut store = Store::new(&engine, host);
        store.limiter(|host| &mut host.limits);
        let fuel = config.sandbox.fuel();
        if let Some(fuel) = fuel {
            store.set_fuel(fuel).context("failed to set fuel")?;
        }

        let instance = linker
            .instantiate(&mut store, &module)
            .context("failed to instantiate module")?;
        let memory = instance.get_memory(&mut store, "memory");

        let functions: HashMap<String, ir::Function> = config
            .ir
            .functions
            .into_iter()
            .map(|f| (f.key.clone(), f))
            .collect();
        tracing::info!(
            functions = functions.len(),
            memory = memory.is_some(),
            fuel = ?fuel,
            "opened wasm module"
        );

        Ok(Self {
            sandbox: Arc::new(Mutex::new(Sandbox {
                store,
                instance,
                memory,
                fuel,
            })),
            functions: Arc::new(functions),
            clock: config.clock,
        })
    }

    /// Bind the export named `key` to its declaration.
    ///
    /// `NotFound` when the key is neither declared nor exported, so other
    /// factories can claim it.
    pub fn function(&self, key: &str) -> Result<Function> {
        let def = self
            .functions
            .get(key)
            .ok_or_else(|| RuntimeError::not_found("function", key))?;
        let mut guard = self.lock();
        let sandbox = &mut *guard;
        let func = sandbox
            .instance
            .get_func(&mut sandbox.store, key)
            .ok_or_else(|| RuntimeError::not_found("export", key))?;
        let function = Function::new(def, func, sandbox)?;
        tracing::debug!(function = key, mode = ?function.mode(), "bound compiled function");
        Ok(function)
    }

    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    pub(crate) fn shared(&self) -> Arc<Mutex<Sandbox>> {
        Arc::clone(&self.sandbox)
    }

    /// Lock the sandbox. A panic in an earlier holder leaves the store
    /// usable, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Sandbox> {
        self.sandbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("functions", &self.functions.len())
            .finish()
    }
}
