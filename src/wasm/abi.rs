//! Scalar packing between series elements and sandbox values.
//!
//! Every value crosses the sandbox boundary as a 64-bit word. 1, 2 and 4
//! byte elements sit in the low bits, sign-extended for signed integers and
//! zero-extended otherwise (float bits included); 8-byte elements fill the
//! word. Words map onto wasm value types by declared element type.

use crate::types::DataType;
use wasmtime::{Val, ValType};

/// Pack one little-endian element into a word. Missing bytes read as zero.
pub fn pack(data_type: DataType, bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = data_type.density().min(bytes.len());
    buf[..n].copy_from_slice(&bytes[..n]);
    let signed = data_type.is_signed();
    match (data_type.density(), signed) {
        (1, true) => buf[0] as i8 as i64 as u64,
        (1, false) => buf[0] as u64,
        (2, true) => i16::from_le_bytes([buf[0], buf[1]]) as i64 as u64,
        (2, false) => u16::from_le_bytes([buf[0], buf[1]]) as u64,
        (4, true) => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as i64 as u64,
        (4, false) => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64,
        _ => u64::from_le_bytes(buf),
    }
}

/// Unpack a word into little-endian element bytes. Only the first
/// `data_type.density()` bytes are meaningful.
pub fn unpack(data_type: DataType, word: u64) -> [u8; 8] {
    let mut out = [0u8; 8];
    let d = data_type.density();
    out[..d].copy_from_slice(&word.to_le_bytes()[..d]);
    out
}

/// Wasm value type a declared element travels as
pub fn val_type(data_type: DataType) -> ValType {
    match data_type {
        DataType::F32 => ValType::F32,
        DataType::F64 => ValType::F64,
        dt if dt.density() == 8 => ValType::I64,
        _ => ValType::I32,
    }
}

pub fn to_val(data_type: DataType, word: u64) -> Val {
    match val_type(data_type) {
        ValType::F32 => Val::F32(word as u32),
        ValType::F64 => Val::F64(word),
        ValType::I64 => Val::I64(word as i64),
        _ => Val::I32(word as u32 as i32),
    }
}

/// Word carried by a numeric wasm value; `None` for reference types.
/// `i32` results are sign-extended so narrowing to any declared width
/// keeps the low bytes.
pub fn from_val(val: &Val) -> Option<u64> {
    match *val {
        Val::I32(v) => Some(v as i64 as u64),
        Val::I64(v) => Some(v as u64),
        Val::F32(bits) => Some(bits as u64),
        Val::F64(bits) => Some(bits),
        _ => None,
    }
}
