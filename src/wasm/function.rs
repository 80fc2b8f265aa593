//! Host/sandbox call adapter.
//!
//! Bridges the scalar-only calling convention of a compiled function to a
//! node's typed outputs. Two output modes are fixed at construction from
//! the function's memory base:
//!
//! - **Direct** (`memory_base == 0`): at most one output, carried by the
//!   call's return value and always flagged changed.
//! - **Dirty flags** (`memory_base != 0`): the function writes outputs into
//!   linear memory. Before the call the adapter zeroes the 64-bit flag word
//!   at `base`; afterwards bit `k` set means output `k` was written at
//!   `base + 8 + Σ density(outputs[..k])`.
//!
//! ```text
//! base        base+8        base+8+d0         ...
//! ┌──────────┬─────────────┬────────────────┬───
//! │ flags u64│ output 0    │ output 1       │
//! └──────────┴─────────────┴────────────────┴───
//! ```

use super::abi;
use super::module::Sandbox;
use crate::error::{Result, ResultExt, RuntimeError};
use crate::ir;
use crate::types::DataType;
use wasmtime::{Func, Memory, Val, ValType};

/// Size of the dirty-flag word preceding the packed outputs
pub const FLAG_WORD_BYTES: usize = 8;

/// Most outputs a dirty-flag function can signal
pub const MAX_FLAGGED_OUTPUTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Direct,
    DirtyFlags { base: u32 },
}

/// A compiled function bound to one node
pub struct Function {
    key: String,
    func: Func,
    inputs: Vec<DataType>,
    outputs: Vec<DataType>,
    offsets: Vec<usize>,
    mode: OutputMode,
    params: Vec<Val>,
    returns: Vec<Val>,
}

fn same_kind(a: &ValType, b: &ValType) -> bool {
    matches!(
        (a, b),
        (ValType::I32, ValType::I32)
            | (ValType::I64, ValType::I64)
            | (ValType::F32, ValType::F32)
            | (ValType::F64, ValType::F64)
    )
}

fn placeholder(ty: &ValType) -> Option<Val> {
    match ty {
        ValType::I32 => Some(Val::I32(0)),
        ValType::I64 => Some(Val::I64(0)),
        ValType::F32 => Some(Val::F32(0)),
        ValType::F64 => Some(Val::F64(0)),
        _ => None,
    }
}

impl Function {
    /// Check the export against its declaration and pick the output mode.
    pub(crate) fn new(def: &ir::Function, func: Func, sandbox: &Sandbox) -> Result<Self> {
        let ty = func.ty(&sandbox.store);
        let inputs: Vec<DataType> = def.inputs.iter().map(|p| p.data_type).collect();
        let outputs: Vec<DataType> = def.outputs.iter().map(|p| p.data_type).collect();

        let params: Vec<ValType> = ty.params().collect();
        if params.len() != inputs.len()
            || !params
                .iter()
                .zip(&inputs)
                .all(|(actual, dt)| same_kind(actual, &abi::val_type(*dt)))
        {
            return Err(RuntimeError::Ir(format!(
                "function {} parameters do not match its {} declared inputs",
                def.key,
                inputs.len()
            )));
        }

        let mode = if def.memory_base == 0 {
            OutputMode::Direct
        } else {
            OutputMode::DirtyFlags {
                base: def.memory_base,
            }
        };

        let results: Vec<ValType> = ty.results().collect();
        match mode {
            OutputMode::Direct => {
                if outputs.len() > 1 {
                    return Err(RuntimeError::Ir(format!(
                        "function {} declares {} outputs but has no memory base",
                        def.key,
                        outputs.len()
                    )));
                }
                let matches = results.len() == outputs.len()
                    && results
                        .iter()
                        .zip(&outputs)
                        .all(|(actual, dt)| same_kind(actual, &abi::val_type(*dt)));
                if !matches {
                    return Err(RuntimeError::Ir(format!(
                        "function {} results do not match its declared outputs",
                        def.key
                    )));
                }
            }
            OutputMode::DirtyFlags { .. } => {
                if outputs.len() > MAX_FLAGGED_OUTPUTS {
                    return Err(RuntimeError::Ir(format!(
                        "function {} declares {} outputs, at most {} can be flagged",
                        def.key,
                        outputs.len(),
                        MAX_FLAGGED_OUTPUTS
                    )));
                }
                if sandbox.memory.is_none() {
                    return Err(RuntimeError::Ir(format!(
                        "function {} writes outputs to memory but the module exports none",
                        def.key
                    )));
                }
            }
        }

        let returns = results
            .iter()
            .map(placeholder)
            .collect::<Option<Vec<Val>>>()
            .ok_or_else(|| {
                RuntimeError::Ir(format!("function {} returns a non-numeric value", def.key))
            })?;

        let mut offsets = Vec::with_capacity(outputs.len());
        let mut offset = def.memory_base as usize + FLAG_WORD_BYTES;
        for dt in &outputs {
            offsets.push(offset);
            offset += dt.density();
        }

        Ok(Self {
            key: def.key.clone(),
            func,
            params: inputs.iter().map(|dt| abi::to_val(*dt, 0)).collect(),
            inputs,
            outputs,
            offsets,
            mode,
            returns,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn inputs(&self) -> &[DataType] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[DataType] {
        &self.outputs
    }

    /// Memory offset of output `k` in dirty-flag mode
    pub fn output_offset(&self, k: usize) -> Option<usize> {
        self.offsets.get(k).copied()
    }

    /// Invoke once with packed argument words.
    ///
    /// `results[k]` is set to the packed value of output `k` when the call
    /// flagged it, `None` otherwise. Series handles from the previous call
    /// are released first. Traps come back as
    /// [`RuntimeError::Trap`]; host-side failures as any other variant.
    pub fn call(
        &mut self,
        sandbox: &mut Sandbox,
        args: &[u64],
        results: &mut [Option<u64>],
    ) -> Result<()> {
        results.iter_mut().for_each(|r| *r = None);
        for ((slot, dt), word) in self.params.iter_mut().zip(&self.inputs).zip(args) {
            *slot = abi::to_val(*dt, *word);
        }
        if let Some(fuel) = sandbox.fuel {
            sandbox.store.set_fuel(fuel).context("failed to refuel")?;
        }
        sandbox.store.data_mut().release_handles();

        match self.mode {
            OutputMode::Direct => {
                self.func
                    .call(&mut sandbox.store, &self.params, &mut self.returns)
                    .map_err(RuntimeError::from_wasm_error)?;
                if let (Some(slot), Some(ret)) = (results.first_mut(), self.returns.first()) {
                    *slot = abi::from_val(ret);
                }
            }
            OutputMode::DirtyFlags { base } => {
                let memory = sandbox
                    .memory
                    .ok_or_else(|| RuntimeError::Wasm("module exports no memory".to_string()))?;
                let base = base as usize;
                write_at(memory, sandbox, base, &[0u8; FLAG_WORD_BYTES])?;

                self.func
                    .call(&mut sandbox.store, &self.params, &mut self.returns)
                    .map_err(RuntimeError::from_wasm_error)?;

                let mut flag_bytes = [0u8; FLAG_WORD_BYTES];
                read_at(memory, sandbox, base, &mut flag_bytes)?;
                let flags = u64::from_le_bytes(flag_bytes);
                for (k, dt) in self.outputs.iter().enumerate() {
                    if flags & (1u64 << k) == 0 {
                        continue;
                    }
                    let mut buf = [0u8; 8];
                    let d = dt.density();
                    read_at(memory, sandbox, self.offsets[k], &mut buf[..d])?;
                    if let Some(slot) = results.get_mut(k) {
                        *slot = Some(abi::pack(*dt, &buf[..d]));
                    }
                }
            }
        }
        Ok(())
    }
}

fn read_at(memory: Memory, sandbox: &Sandbox, offset: usize, buf: &mut [u8]) -> Result<()> {
    let len = buf.len();
    memory
        .read(&sandbox.store, offset, buf)
        .map_err(|_| RuntimeError::Memory { offset, len })
}

fn write_at(memory: Memory, sandbox: &mut Sandbox, offset: usize, bytes: &[u8]) -> Result<()> {
    memory
        .write(&mut sandbox.store, offset, bytes)
        .map_err(|_| RuntimeError::Memory {
            offset,
            len: bytes.len(),
        })
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("key", &self.key)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("mode", &self.mode)
            .finish()
    }
}
