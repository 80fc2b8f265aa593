//! Host function bindings for compiled node modules.
//!
//! Registers the `env` namespace imports that compiled functions can call:
//!
//! - `state_load_<t>(func_id, var_id, init) -> t` / `state_store_<t>(func_id, var_id, v)`
//!   for variables that persist across invocations
//! - `channel_read_<t>(chan) -> t` / `channel_write_<t>(chan, v)` for
//!   channel access
//! - `math_pow_<t>(base, exp) -> t`
//! - the series family over `i32` handles: `series_create_empty_<t>`,
//!   `series_set_element_<t>`, `series_index_<t>`, element and series
//!   arithmetic, comparisons yielding `u8` masks, `series_negate_<t>`,
//!   `series_not_u8`, `series_len`, `series_slice`, and
//!   `state_load_series_<t>` / `state_store_series_<t>`
//! - `now() -> i64` and `panic(ptr, len)`
//!
//! `<t>` is every numeric [`DataType`] name (`u8` .. `f64`).
//!
//! Faults split the same way as wasm traps do. A data-dependent failure
//! (integer division by zero, an index past the end, exhausted series
//! storage) fails only the current sample. Misuse of the interface
//! (unknown handles, type mismatches) fails the whole invocation.

use super::abi;
use super::handles::SeriesHandles;
use super::ops::{self, Arith, Compare};
use crate::error::RuntimeError;
use crate::runtime::{SharedChannels, SharedClock};
use crate::telem::{MultiSeries, Series};
use crate::types::DataType;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::PoisonError;
use wasmtime::{Caller, Extern, FuncType, Linker, StoreLimits, Trap, Val, ValType};

/// Import module name for all host functions
pub const HOST_MODULE: &str = "env";

/// Raised by the `panic` binding. Treated like a trap: it fails the
/// current sample only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("guest panic: {0}")]
pub struct GuestPanic(pub String);

/// State provided to host functions.
pub struct HostState {
    pub(crate) channels: SharedChannels,
    pub(crate) clock: SharedClock,
    /// Stateful variables keyed by (function id, variable id)
    variables: HashMap<(u32, u32), u64>,
    series_variables: HashMap<(u32, u32), Series>,
    handles: SeriesHandles,
    pub(crate) limits: StoreLimits,
}

impl HostState {
    pub fn new(channels: SharedChannels, clock: SharedClock, limits: StoreLimits) -> Self {
        Self {
            channels,
            clock,
            variables: HashMap::new(),
            series_variables: HashMap::new(),
            handles: SeriesHandles::new(),
            limits,
        }
    }

    /// Stored word of a stateful variable
    pub fn variable(&self, func_id: u32, var_id: u32) -> Option<u64> {
        self.variables.get(&(func_id, var_id)).copied()
    }

    /// Stored value of a stateful series variable
    pub fn series_variable(&self, func_id: u32, var_id: u32) -> Option<&Series> {
        self.series_variables.get(&(func_id, var_id))
    }

    /// Series handles issued during the current invocation
    pub fn handles(&self) -> &SeriesHandles {
        &self.handles
    }

    /// Invalidate every series handle. Runs before each invocation.
    pub(crate) fn release_handles(&mut self) {
        self.handles.clear();
    }
}

/// Register all host functions with a Wasmtime Linker.
pub fn register_host_functions(linker: &mut Linker<HostState>) -> crate::error::Result<()> {
    for data_type in DataType::NUMERIC {
        register_state_functions(linker, data_type)?;
        register_channel_functions(linker, data_type)?;
        register_math_functions(linker, data_type)?;
        register_series_functions(linker, data_type)?;
        register_series_state_functions(linker, data_type)?;
    }
    register_series_unary_functions(linker)?;
    register_runtime_functions(linker)?;
    Ok(())
}

fn binding_error(function: &str, e: wasmtime::Error) -> RuntimeError {
    RuntimeError::Wasm(format!("failed to register host function {}: {}", function, e))
}

fn arg_u32(params: &[Val], index: usize, function: &str) -> wasmtime::Result<u32> {
    params
        .get(index)
        .and_then(Val::i32)
        .map(|v| v as u32)
        .ok_or_else(|| wasmtime::Error::msg(format!("{}: argument {} is not an i32", function, index)))
}

fn arg_word(params: &[Val], index: usize, function: &str) -> wasmtime::Result<u64> {
    params
        .get(index)
        .and_then(abi::from_val)
        .ok_or_else(|| wasmtime::Error::msg(format!("{}: argument {} is not numeric", function, index)))
}

/// Interface misuse; fails the invocation.
fn violation(function: &str, message: impl Display) -> wasmtime::Error {
    wasmtime::Error::msg(format!("{}: {}", function, message))
}

/// Data-dependent failure; fails the current sample.
fn sample_fault(function: &str, message: impl Display) -> wasmtime::Error {
    wasmtime::Error::new(GuestPanic(format!("{}: {}", function, message)))
}

fn divide_by_zero(_: ops::DivideByZero) -> wasmtime::Error {
    wasmtime::Error::new(Trap::IntegerDivisionByZero)
}

/// Register `env.<name>` with the binding's own name passed to `f` for
/// error messages.
fn define<F>(
    linker: &mut Linker<HostState>,
    name: String,
    params: Vec<ValType>,
    results: Vec<ValType>,
    f: F,
) -> crate::error::Result<()>
where
    F: Fn(Caller<'_, HostState>, &[Val], &mut [Val], &str) -> wasmtime::Result<()>
        + Send
        + Sync
        + 'static,
{
    let ty = FuncType::new(linker.engine(), params, results);
    let fn_name = name.clone();
    linker
        .func_new(
            HOST_MODULE,
            &name,
            ty,
            move |caller: Caller<'_, HostState>, params: &[Val], results: &mut [Val]| {
                f(caller, params, results, &fn_name)
            },
        )
        .map_err(|e| binding_error(&name, e))?;
    Ok(())
}

/// The series named by handle argument `index`, which must hold
/// `data_type` samples.
fn series_arg<'a>(
    host: &'a HostState,
    params: &[Val],
    index: usize,
    data_type: DataType,
    function: &str,
) -> wasmtime::Result<&'a Series> {
    let handle = arg_u32(params, index, function)?;
    let series = host
        .handles
        .get(handle)
        .ok_or_else(|| violation(function, format!("unknown series handle {}", handle)))?;
    if series.data_type() != data_type {
        return Err(violation(
            function,
            format!("series {} holds {} samples", handle, series.data_type()),
        ));
    }
    Ok(series)
}

/// Issue a handle for `series`
fn issue(host: &mut HostState, series: Series, function: &str) -> wasmtime::Result<Val> {
    let handle = host
        .handles
        .insert(series)
        .ok_or_else(|| sample_fault(function, "series storage exhausted"))?;
    Ok(Val::I32(handle as i32))
}

fn word_at(series: &Series, index: usize) -> u64 {
    abi::pack(series.data_type(), series.element(index).unwrap_or(&[]))
}

/// Element-wise map into a new series of `out_type`
fn map_series(
    src: &Series,
    out_type: DataType,
    mut f: impl FnMut(u64) -> wasmtime::Result<u64>,
) -> wasmtime::Result<Series> {
    let mut out = Series::zeroed(out_type, src.len());
    for i in 0..src.len() {
        out.set_element(i, &abi::unpack(out_type, f(word_at(src, i))?));
    }
    Ok(out)
}

/// Pairwise combination of two equal-length series into `out_type`
fn zip_series(
    lhs: &Series,
    rhs: &Series,
    out_type: DataType,
    function: &str,
    mut f: impl FnMut(u64, u64) -> wasmtime::Result<u64>,
) -> wasmtime::Result<Series> {
    if lhs.len() != rhs.len() {
        return Err(sample_fault(
            function,
            format!("series lengths differ ({} and {})", lhs.len(), rhs.len()),
        ));
    }
    let mut out = Series::zeroed(out_type, lhs.len());
    for i in 0..lhs.len() {
        let word = f(word_at(lhs, i), word_at(rhs, i))?;
        out.set_element(i, &abi::unpack(out_type, word));
    }
    Ok(out)
}

fn element_index(
    series: &Series,
    params: &[Val],
    index: usize,
    function: &str,
) -> wasmtime::Result<usize> {
    let i = arg_u32(params, index, function)? as usize;
    if i >= series.len() {
        return Err(sample_fault(
            function,
            format!("index {} out of range for series of length {}", i, series.len()),
        ));
    }
    Ok(i)
}

fn register_state_functions(
    linker: &mut Linker<HostState>,
    data_type: DataType,
) -> crate::error::Result<()> {
    let engine = linker.engine().clone();
    let vt = abi::val_type(data_type);

    // state_load_<t>(func_id: i32, var_id: i32, init: t) -> t
    let name = format!("state_load_{}", data_type);
    let fn_name = name.clone();
    linker
        .func_new(
            HOST_MODULE,
            &name,
            FuncType::new(&engine, [ValType::I32, ValType::I32, vt.clone()], [vt.clone()]),
            move |caller: Caller<'_, HostState>, params: &[Val], results: &mut [Val]| {
                let key = (arg_u32(params, 0, &fn_name)?, arg_u32(params, 1, &fn_name)?);
                let init = arg_word(params, 2, &fn_name)?;
                let word = caller.data().variables.get(&key).copied().unwrap_or(init);
                results[0] = abi::to_val(data_type, word);
                Ok(())
            },
        )
        .map_err(|e| binding_error(&name, e))?;

    // state_store_<t>(func_id: i32, var_id: i32, value: t)
    let name = format!("state_store_{}", data_type);
    let fn_name = name.clone();
    linker
        .func_new(
            HOST_MODULE,
            &name,
            FuncType::new(&engine, [ValType::I32, ValType::I32, vt], []),
            move |mut caller: Caller<'_, HostState>, params: &[Val], _results: &mut [Val]| {
                let key = (arg_u32(params, 0, &fn_name)?, arg_u32(params, 1, &fn_name)?);
                let value = arg_word(params, 2, &fn_name)?;
                caller.data_mut().variables.insert(key, value);
                Ok(())
            },
        )
        .map_err(|e| binding_error(&name, e))?;

    Ok(())
}

fn register_channel_functions(
    linker: &mut Linker<HostState>,
    data_type: DataType,
) -> crate::error::Result<()> {
    let engine = linker.engine().clone();
    let vt = abi::val_type(data_type);

    // channel_read_<t>(channel: i32) -> t
    // Latest ingested sample; zero when the channel has no data yet.
    let name = format!("channel_read_{}", data_type);
    let fn_name = name.clone();
    linker
        .func_new(
            HOST_MODULE,
            &name,
            FuncType::new(&engine, [ValType::I32], [vt.clone()]),
            move |caller: Caller<'_, HostState>, params: &[Val], results: &mut [Val]| {
                let key = arg_u32(params, 0, &fn_name)?;
                let channels = caller
                    .data()
                    .channels
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(declared) = channels.declared_type(key).filter(|dt| *dt != data_type) {
                    return Err(violation(
                        &fn_name,
                        format!("channel {} is declared {}", key, declared),
                    ));
                }
                let word = match channels.latest(key).and_then(MultiSeries::last_element) {
                    Some((series, bytes)) if series.data_type() == data_type => {
                        abi::pack(data_type, bytes)
                    }
                    Some((series, _)) => {
                        return Err(wasmtime::Error::msg(format!(
                            "{}: channel {} holds {} samples",
                            fn_name,
                            key,
                            series.data_type()
                        )))
                    }
                    None => 0,
                };
                results[0] = abi::to_val(data_type, word);
                Ok(())
            },
        )
        .map_err(|e| binding_error(&name, e))?;

    // channel_write_<t>(channel: i32, value: t)
    let name = format!("channel_write_{}", data_type);
    let fn_name = name.clone();
    linker
        .func_new(
            HOST_MODULE,
            &name,
            FuncType::new(&engine, [ValType::I32, vt], []),
            move |caller: Caller<'_, HostState>, params: &[Val], _results: &mut [Val]| {
                let key = arg_u32(params, 0, &fn_name)?;
                let word = arg_word(params, 1, &fn_name)?;
                let bytes = abi::unpack(data_type, word);
                let data = Series::from_bytes(data_type, &bytes[..data_type.density()]);
                let state = caller.data();
                let mut channels = state.channels.write().unwrap_or_else(PoisonError::into_inner);
                if let Some(declared) = channels.declared_type(key).filter(|dt| *dt != data_type) {
                    return Err(violation(
                        &fn_name,
                        format!("channel {} is declared {}", key, declared),
                    ));
                }
                let time = Series::from_timestamps(&[state.clock.now()]);
                channels.write(key, data, time);
                Ok(())
            },
        )
        .map_err(|e| binding_error(&name, e))?;

    Ok(())
}

fn register_math_functions(
    linker: &mut Linker<HostState>,
    data_type: DataType,
) -> crate::error::Result<()> {
    let vt = abi::val_type(data_type);

    // math_pow_<t>(base: t, exp: t) -> t
    define(
        linker,
        format!("math_pow_{}", data_type),
        vec![vt.clone(), vt.clone()],
        vec![vt],
        move |_caller, params, results, name| {
            let base = arg_word(params, 0, name)?;
            let exp = arg_word(params, 1, name)?;
            results[0] = abi::to_val(data_type, ops::pow(data_type, base, exp));
            Ok(())
        },
    )
}

fn register_series_functions(
    linker: &mut Linker<HostState>,
    data_type: DataType,
) -> crate::error::Result<()> {
    let vt = abi::val_type(data_type);

    // series_create_empty_<t>(len: i32) -> handle
    // Zero-filled series of `len` samples.
    define(
        linker,
        format!("series_create_empty_{}", data_type),
        vec![ValType::I32],
        vec![ValType::I32],
        move |mut caller, params, results, name| {
            let len = arg_u32(params, 0, name)? as usize;
            let fits = len
                .checked_mul(data_type.density())
                .is_some_and(|bytes| caller.data().handles.has_room(bytes));
            if !fits {
                return Err(sample_fault(name, format!("cannot allocate {} samples", len)));
            }
            results[0] = issue(caller.data_mut(), Series::zeroed(data_type, len), name)?;
            Ok(())
        },
    )?;

    // series_set_element_<t>(handle: i32, index: i32, value: t) -> handle
    // Writes in place and hands the same handle back.
    define(
        linker,
        format!("series_set_element_{}", data_type),
        vec![ValType::I32, ValType::I32, vt.clone()],
        vec![ValType::I32],
        move |mut caller, params, results, name| {
            let handle = arg_u32(params, 0, name)?;
            let series = series_arg(caller.data(), params, 0, data_type, name)?;
            let index = element_index(series, params, 1, name)?;
            let word = arg_word(params, 2, name)?;
            if let Some(series) = caller.data_mut().handles.get_mut(handle) {
                series.set_element(index, &abi::unpack(data_type, word));
            }
            results[0] = Val::I32(handle as i32);
            Ok(())
        },
    )?;

    // series_index_<t>(handle: i32, index: i32) -> t
    define(
        linker,
        format!("series_index_{}", data_type),
        vec![ValType::I32, ValType::I32],
        vec![vt.clone()],
        move |caller, params, results, name| {
            let series = series_arg(caller.data(), params, 0, data_type, name)?;
            let index = element_index(series, params, 1, name)?;
            results[0] = abi::to_val(data_type, word_at(series, index));
            Ok(())
        },
    )?;

    for op in Arith::ALL {
        // series_element_<op>_<t>(handle: i32, scalar: t) -> handle
        define(
            linker,
            format!("series_element_{}_{}", op.name(), data_type),
            vec![ValType::I32, vt.clone()],
            vec![ValType::I32],
            move |mut caller, params, results, name| {
                let scalar = arg_word(params, 1, name)?;
                let src = series_arg(caller.data(), params, 0, data_type, name)?;
                let out = map_series(src, data_type, |w| {
                    ops::arith(data_type, op, w, scalar).map_err(divide_by_zero)
                })?;
                results[0] = issue(caller.data_mut(), out, name)?;
                Ok(())
            },
        )?;

        // series_series_<op>_<t>(lhs: i32, rhs: i32) -> handle
        define(
            linker,
            format!("series_series_{}_{}", op.name(), data_type),
            vec![ValType::I32, ValType::I32],
            vec![ValType::I32],
            move |mut caller, params, results, name| {
                let lhs = series_arg(caller.data(), params, 0, data_type, name)?;
                let rhs = series_arg(caller.data(), params, 1, data_type, name)?;
                let out = zip_series(lhs, rhs, data_type, name, |a, b| {
                    ops::arith(data_type, op, a, b).map_err(divide_by_zero)
                })?;
                results[0] = issue(caller.data_mut(), out, name)?;
                Ok(())
            },
        )?;
    }

    // series_element_r<op>_<t>(scalar: t, handle: i32) -> handle
    // Scalar on the left: `scalar - s[i]`, `scalar / s[i]`.
    for (prefix, op) in [("rsub", Arith::Sub), ("rdiv", Arith::Div)] {
        define(
            linker,
            format!("series_element_{}_{}", prefix, data_type),
            vec![vt.clone(), ValType::I32],
            vec![ValType::I32],
            move |mut caller, params, results, name| {
                let scalar = arg_word(params, 0, name)?;
                let src = series_arg(caller.data(), params, 1, data_type, name)?;
                let out = map_series(src, data_type, |w| {
                    ops::arith(data_type, op, scalar, w).map_err(divide_by_zero)
                })?;
                results[0] = issue(caller.data_mut(), out, name)?;
                Ok(())
            },
        )?;
    }

    for op in Compare::ALL {
        // series_compare_<op>_<t>(lhs: i32, rhs: i32) -> u8 mask handle
        define(
            linker,
            format!("series_compare_{}_{}", op.name(), data_type),
            vec![ValType::I32, ValType::I32],
            vec![ValType::I32],
            move |mut caller, params, results, name| {
                let lhs = series_arg(caller.data(), params, 0, data_type, name)?;
                let rhs = series_arg(caller.data(), params, 1, data_type, name)?;
                let out = zip_series(lhs, rhs, DataType::U8, name, |a, b| {
                    Ok(ops::compare(data_type, op, a, b) as u64)
                })?;
                results[0] = issue(caller.data_mut(), out, name)?;
                Ok(())
            },
        )?;

        // series_compare_<op>_scalar_<t>(handle: i32, scalar: t) -> u8 mask handle
        define(
            linker,
            format!("series_compare_{}_scalar_{}", op.name(), data_type),
            vec![ValType::I32, vt.clone()],
            vec![ValType::I32],
            move |mut caller, params, results, name| {
                let scalar = arg_word(params, 1, name)?;
                let src = series_arg(caller.data(), params, 0, data_type, name)?;
                let out = map_series(src, DataType::U8, |w| {
                    Ok(ops::compare(data_type, op, w, scalar) as u64)
                })?;
                results[0] = issue(caller.data_mut(), out, name)?;
                Ok(())
            },
        )?;
    }

    Ok(())
}

fn register_series_state_functions(
    linker: &mut Linker<HostState>,
    data_type: DataType,
) -> crate::error::Result<()> {
    // state_load_series_<t>(func_id: i32, var_id: i32, init: i32) -> handle
    // A fresh handle to a copy of the stored series, or `init` itself when
    // nothing has been stored yet.
    define(
        linker,
        format!("state_load_series_{}", data_type),
        vec![ValType::I32, ValType::I32, ValType::I32],
        vec![ValType::I32],
        move |mut caller, params, results, name| {
            let key = (arg_u32(params, 0, name)?, arg_u32(params, 1, name)?);
            let init = arg_u32(params, 2, name)?;
            let stored = caller.data().series_variables.get(&key).cloned();
            results[0] = match stored {
                Some(series) if series.data_type() == data_type => {
                    issue(caller.data_mut(), series, name)?
                }
                Some(series) => {
                    return Err(violation(
                        name,
                        format!("variable {:?} holds {} samples", key, series.data_type()),
                    ))
                }
                None => {
                    series_arg(caller.data(), params, 2, data_type, name)?;
                    Val::I32(init as i32)
                }
            };
            Ok(())
        },
    )?;

    // state_store_series_<t>(func_id: i32, var_id: i32, handle: i32)
    define(
        linker,
        format!("state_store_series_{}", data_type),
        vec![ValType::I32, ValType::I32, ValType::I32],
        vec![],
        move |mut caller, params, _results, name| {
            let key = (arg_u32(params, 0, name)?, arg_u32(params, 1, name)?);
            let series = series_arg(caller.data(), params, 2, data_type, name)?.clone();
            caller.data_mut().series_variables.insert(key, series);
            Ok(())
        },
    )
}

fn register_series_unary_functions(linker: &mut Linker<HostState>) -> crate::error::Result<()> {
    // series_negate_<t>(handle: i32) -> handle, signed and float types only
    for data_type in DataType::NUMERIC
        .into_iter()
        .filter(|dt| dt.is_signed() || dt.is_float())
    {
        define(
            linker,
            format!("series_negate_{}", data_type),
            vec![ValType::I32],
            vec![ValType::I32],
            move |mut caller, params, results, name| {
                let src = series_arg(caller.data(), params, 0, data_type, name)?;
                let out = map_series(src, data_type, |w| Ok(ops::negate(data_type, w)))?;
                results[0] = issue(caller.data_mut(), out, name)?;
                Ok(())
            },
        )?;
    }

    // series_not_u8(handle: i32) -> handle
    // Logical not of a mask: zero becomes one, anything else zero.
    define(
        linker,
        "series_not_u8".to_string(),
        vec![ValType::I32],
        vec![ValType::I32],
        |mut caller, params, results, name| {
            let src = series_arg(caller.data(), params, 0, DataType::U8, name)?;
            let out = map_series(src, DataType::U8, |w| Ok((w == 0) as u64))?;
            results[0] = issue(caller.data_mut(), out, name)?;
            Ok(())
        },
    )?;

    // series_len(handle: i32) -> i64
    define(
        linker,
        "series_len".to_string(),
        vec![ValType::I32],
        vec![ValType::I64],
        |caller, params, results, name| {
            let handle = arg_u32(params, 0, name)?;
            let series = caller
                .data()
                .handles
                .get(handle)
                .ok_or_else(|| violation(name, format!("unknown series handle {}", handle)))?;
            results[0] = Val::I64(series.len() as i64);
            Ok(())
        },
    )?;

    // series_slice(handle: i32, start: i32, end: i32) -> handle
    // Copy of samples [start, end).
    define(
        linker,
        "series_slice".to_string(),
        vec![ValType::I32, ValType::I32, ValType::I32],
        vec![ValType::I32],
        |mut caller, params, results, name| {
            let handle = arg_u32(params, 0, name)?;
            let start = arg_u32(params, 1, name)? as usize;
            let end = arg_u32(params, 2, name)? as usize;
            let series = caller
                .data()
                .handles
                .get(handle)
                .ok_or_else(|| violation(name, format!("unknown series handle {}", handle)))?;
            if start > end || end > series.len() {
                return Err(sample_fault(
                    name,
                    format!(
                        "slice {}..{} out of range for series of length {}",
                        start,
                        end,
                        series.len()
                    ),
                ));
            }
            let d = series.data_type().density();
            let out = Series::from_bytes(series.data_type(), &series.bytes()[start * d..end * d]);
            results[0] = issue(caller.data_mut(), out, name)?;
            Ok(())
        },
    )
}

fn register_runtime_functions(linker: &mut Linker<HostState>) -> crate::error::Result<()> {
    // now() -> i64
    linker
        .func_wrap(HOST_MODULE, "now", |caller: Caller<'_, HostState>| -> i64 {
            caller.data().clock.now().nanos()
        })
        .map_err(|e| binding_error("now", e))?;

    // panic(ptr: i32, len: i32)
    // Fails the current sample with the UTF-8 message at [ptr, ptr + len).
    linker
        .func_wrap(
            HOST_MODULE,
            "panic",
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> wasmtime::Result<()> {
                let memory = match caller.get_export("memory") {
                    Some(Extern::Memory(m)) => m,
                    _ => return Err(wasmtime::Error::msg("panic: module exports no memory")),
                };
                let (offset, len) = (ptr as usize, len as usize);
                let bytes = offset
                    .checked_add(len)
                    .and_then(|end| memory.data(&caller).get(offset..end))
                    .ok_or_else(|| wasmtime::Error::new(RuntimeError::Memory { offset, len }))?;
                let message = String::from_utf8_lossy(bytes).into_owned();
                Err(wasmtime::Error::new(GuestPanic(message)))
            },
        )
        .map_err(|e| binding_error("panic", e))?;

    Ok(())
}
