//! Test data builders for graphs and compiled modules

use nodegraph_rs::ir::{Function, Handle, Ir, Param, DEFAULT_OUTPUT_PARAM};
use nodegraph_rs::types::DataType;

/// Compiled node functions used across the integration tests.
///
/// Dirty-flag functions use memory bases 1024 (`sum_product`), 2048
/// (`gate`) and 3072 (`split`); the `panic` message lives at offset 16.
/// Stateful variables: `counter` uses function id 0, `window_sum` id 1.
pub const NODE_WAT: &str = r#"
(module
  (import "env" "state_load_i64" (func $load_i64 (param i32 i32 i64) (result i64)))
  (import "env" "state_store_i64" (func $store_i64 (param i32 i32 i64)))
  (import "env" "channel_read_i32" (func $read_i32 (param i32) (result i32)))
  (import "env" "channel_write_f64" (func $write_f64 (param i32 f64)))
  (import "env" "panic" (func $panic (param i32 i32)))
  (import "env" "now" (func $now (result i64)))
  (import "env" "math_pow_i32" (func $pow_i32 (param i32 i32) (result i32)))
  (import "env" "math_pow_f64" (func $pow_f64 (param f64 f64) (result f64)))
  (import "env" "series_create_empty_i64" (func $empty_i64 (param i32) (result i32)))
  (import "env" "series_set_element_i64" (func $set_i64 (param i32 i32 i64) (result i32)))
  (import "env" "series_index_i64" (func $index_i64 (param i32 i32) (result i64)))
  (import "env" "series_index_i32" (func $index_i32 (param i32 i32) (result i32)))
  (import "env" "series_element_div_i64" (func $div_i64 (param i32 i64) (result i32)))
  (import "env" "state_load_series_i64" (func $load_series_i64 (param i32 i32 i32) (result i32)))
  (import "env" "state_store_series_i64" (func $store_series_i64 (param i32 i32 i32)))
  (import "env" "series_create_empty_f64" (func $empty_f64 (param i32) (result i32)))
  (import "env" "series_set_element_f64" (func $set_f64 (param i32 i32 f64) (result i32)))
  (import "env" "series_index_f64" (func $index_f64 (param i32 i32) (result f64)))
  (import "env" "series_element_mul_f64" (func $mul_f64 (param i32 f64) (result i32)))
  (import "env" "series_element_rsub_f64" (func $rsub_f64 (param f64 i32) (result i32)))
  (import "env" "series_series_add_f64" (func $add_series_f64 (param i32 i32) (result i32)))
  (import "env" "series_compare_gt_scalar_f64" (func $gt_scalar_f64 (param i32 f64) (result i32)))
  (import "env" "series_not_u8" (func $not_u8 (param i32) (result i32)))
  (import "env" "series_index_u8" (func $index_u8 (param i32 i32) (result i32)))
  (import "env" "series_len" (func $series_len (param i32) (result i64)))

  (memory (export "memory") 1)
  (data (i32.const 16) "boom!")

  (func (export "add") (param $lhs i32) (param $rhs i32) (result i32)
    (i32.add (local.get $lhs) (local.get $rhs)))

  (func (export "multiply") (param $lhs i64) (param $rhs i64) (result i64)
    (i64.mul (local.get $lhs) (local.get $rhs)))

  (func (export "sum_product") (param $a i32) (param $b i32)
    (i32.store (i32.const 1032) (i32.add (local.get $a) (local.get $b)))
    (i32.store (i32.const 1036) (i32.mul (local.get $a) (local.get $b)))
    (i64.store (i32.const 1024) (i64.const 3)))

  (func (export "gate") (param $x i32)
    (if (i32.gt_s (local.get $x) (i32.const 0))
      (then
        (i32.store (i32.const 2056) (local.get $x))
        (i64.store (i32.const 2048) (i64.const 1)))))

  (func (export "scale") (param $a i32) (param $b f64) (result f64)
    (f64.mul (f64.convert_i32_u (local.get $a)) (local.get $b)))

  (func (export "checked_div") (param $lhs i32) (param $rhs i32) (result i32)
    (i32.div_s (local.get $lhs) (local.get $rhs)))

  (func (export "counter") (result i64)
    (local $n i64)
    (local.set $n
      (i64.add
        (call $load_i64 (i32.const 0) (i32.const 0) (i64.const 0))
        (i64.const 1)))
    (call $store_i64 (i32.const 0) (i32.const 0) (local.get $n))
    (local.get $n))

  (func (export "double_channel") (result i32)
    (i32.mul (call $read_i32 (i32.const 1)) (i32.const 2)))

  (func (export "emit") (param $x f64)
    (call $write_f64 (i32.const 5) (local.get $x)))

  (func (export "fail_on_zero") (param $x i32) (result i32)
    (if (i32.eqz (local.get $x))
      (then (call $panic (i32.const 16) (i32.const 5))))
    (local.get $x))

  (func (export "bad_panic") (param $x i32) (result i32)
    (call $panic (i32.const -16) (i32.const 16))
    (local.get $x))

  (func (export "spin") (param $x i32) (result i32)
    (loop $forever (br $forever))
    (local.get $x))

  (func (export "stamp") (result i64)
    (call $now))

  (func (export "power") (param $lhs i32) (param $rhs i32) (result i32)
    (call $pow_i32 (local.get $lhs) (local.get $rhs)))

  (func (export "root") (param $x f64) (result f64)
    (call $pow_f64 (local.get $x) (f64.const 0.5)))

  ;; output 0 (u8 at 3080) only for positive input, output 1 (i64 at 3081) always
  (func (export "split") (param $x i32)
    (if (i32.gt_s (local.get $x) (i32.const 0))
      (then
        (i32.store8 (i32.const 3080) (local.get $x))
        (i64.store (i32.const 3072) (i64.const 1))))
    (i64.store (i32.const 3081) (i64.extend_i32_s (local.get $x)))
    (i64.store (i32.const 3072)
      (i64.or (i64.load (i32.const 3072)) (i64.const 2))))

  ;; sum of the last three inputs, kept in a series variable
  (func (export "window_sum") (param $x i64) (result i64)
    (local $n i64)
    (local $h i32)
    (local.set $n (call $load_i64 (i32.const 1) (i32.const 1) (i64.const 0)))
    (local.set $h
      (call $load_series_i64 (i32.const 1) (i32.const 0) (call $empty_i64 (i32.const 3))))
    (local.set $h
      (call $set_i64
        (local.get $h)
        (i32.wrap_i64 (i64.rem_u (local.get $n) (i64.const 3)))
        (local.get $x)))
    (call $store_series_i64 (i32.const 1) (i32.const 0) (local.get $h))
    (call $store_i64 (i32.const 1) (i32.const 1) (i64.add (local.get $n) (i64.const 1)))
    (i64.add
      (i64.add
        (call $index_i64 (local.get $h) (i32.const 0))
        (call $index_i64 (local.get $h) (i32.const 1)))
      (call $index_i64 (local.get $h) (i32.const 2))))

  ;; s = [x, 2]; c = 3s + (10 - s); c[0] + len(c) + !(c[0] > 12)
  (func (export "blend") (param $x f64) (result f64)
    (local $s i32)
    (local $c i32)
    (local.set $s (call $empty_f64 (i32.const 2)))
    (local.set $s (call $set_f64 (local.get $s) (i32.const 0) (local.get $x)))
    (local.set $s (call $set_f64 (local.get $s) (i32.const 1) (f64.const 2)))
    (local.set $c
      (call $add_series_f64
        (call $mul_f64 (local.get $s) (f64.const 3))
        (call $rsub_f64 (f64.const 10) (local.get $s))))
    (f64.add
      (f64.add
        (call $index_f64 (local.get $c) (i32.const 0))
        (f64.convert_i64_s (call $series_len (local.get $c))))
      (f64.convert_i32_u
        (call $index_u8
          (call $not_u8 (call $gt_scalar_f64 (local.get $c) (f64.const 12)))
          (i32.const 0)))))

  ;; 100 / x, element-wise over a one-sample series
  (func (export "share") (param $x i64) (result i64)
    (local $h i32)
    (local.set $h (call $set_i64 (call $empty_i64 (i32.const 1)) (i32.const 0) (i64.const 100)))
    (call $index_i64 (call $div_i64 (local.get $h) (local.get $x)) (i32.const 0)))

  ;; element x of [0, 7]
  (func (export "pick") (param $x i32) (result i64)
    (call $index_i64
      (call $set_i64 (call $empty_i64 (i32.const 2)) (i32.const 1) (i64.const 7))
      (local.get $x)))

  ;; reads an i64 series through the i32 accessor
  (func (export "misread") (param $x i32) (result i32)
    (call $index_i32 (call $empty_i64 (i32.const 1)) (i32.const 0)))

  ;; treats its input as a series handle
  (func (export "stale") (param $x i32) (result i64)
    (call $index_i64 (local.get $x) (i32.const 0)))
)
"#;

fn param(name: &str, data_type: DataType) -> Param {
    Param::new(name, data_type)
}

fn binary(key: &str, data_type: DataType) -> Function {
    Function::new(key)
        .input(param("lhs", data_type))
        .input(param("rhs", data_type))
        .output(param(DEFAULT_OUTPUT_PARAM, data_type))
}

fn unary(key: &str, data_type: DataType) -> Function {
    Function::new(key)
        .input(param("input", data_type))
        .output(param(DEFAULT_OUTPUT_PARAM, data_type))
}

/// Declarations for every export in [`NODE_WAT`]
pub fn node_functions() -> Vec<Function> {
    vec![
        binary("add", DataType::I32),
        binary("multiply", DataType::I64),
        Function::new("sum_product")
            .input(param("a", DataType::I32))
            .input(param("b", DataType::I32))
            .output(param("sum", DataType::I32))
            .output(param("product", DataType::I32))
            .memory_base(1024),
        Function::new("gate")
            .input(param("input", DataType::I32))
            .output(param(DEFAULT_OUTPUT_PARAM, DataType::I32))
            .memory_base(2048),
        Function::new("scale")
            .input(param("count", DataType::U8))
            .input(param("factor", DataType::F64))
            .output(param(DEFAULT_OUTPUT_PARAM, DataType::F64)),
        binary("checked_div", DataType::I32),
        Function::new("counter").output(param(DEFAULT_OUTPUT_PARAM, DataType::I64)),
        Function::new("double_channel").output(param(DEFAULT_OUTPUT_PARAM, DataType::I32)),
        Function::new("emit").input(param("input", DataType::F64)),
        unary("fail_on_zero", DataType::I32),
        unary("bad_panic", DataType::I32),
        unary("spin", DataType::I32),
        Function::new("stamp").output(param(DEFAULT_OUTPUT_PARAM, DataType::TimeStamp)),
        binary("power", DataType::I32),
        unary("root", DataType::F64),
        Function::new("split")
            .input(param("input", DataType::I32))
            .output(param("small", DataType::U8))
            .output(param("big", DataType::I64))
            .memory_base(3072),
        unary("window_sum", DataType::I64),
        unary("blend", DataType::F64),
        unary("share", DataType::I64),
        Function::new("pick")
            .input(param("input", DataType::I32))
            .output(param(DEFAULT_OUTPUT_PARAM, DataType::I64)),
        unary("misread", DataType::I32),
        Function::new("stale")
            .input(param("input", DataType::I32))
            .output(param(DEFAULT_OUTPUT_PARAM, DataType::I64)),
    ]
}

/// Upstream producer type with a single `output` of `data_type`. Not
/// exported by any module; tests write its cell directly.
pub fn source_function(data_type: DataType) -> Function {
    Function::new(source_type(data_type)).output(param(DEFAULT_OUTPUT_PARAM, data_type))
}

pub fn source_type(data_type: DataType) -> String {
    format!("source_{}", data_type)
}

/// Builder for test graphs
pub struct GraphBuilder {
    ir: Ir,
}

impl GraphBuilder {
    /// Graph that already declares every compiled test function
    pub fn new() -> Self {
        let mut ir = Ir::new();
        ir.functions = node_functions();
        Self { ir }
    }

    pub fn function(mut self, function: Function) -> Self {
        self.ir.functions.push(function);
        self
    }

    /// Add an upstream producer node of `data_type`
    pub fn source(mut self, key: &str, data_type: DataType) -> Self {
        let type_name = source_type(data_type);
        if self.ir.function(&type_name).is_none() {
            self.ir.functions.push(source_function(data_type));
        }
        self.ir = self.ir.with_node(key, type_name);
        self
    }

    pub fn node(mut self, key: &str, node_type: &str) -> Self {
        self.ir = self.ir.with_node(key, node_type);
        self
    }

    /// Wire `source.output` into `target.param`
    pub fn edge(mut self, source: &str, target: &str, param: &str) -> Self {
        self.ir = self.ir.with_edge(
            Handle::new(source, DEFAULT_OUTPUT_PARAM),
            Handle::new(target, param),
        );
        self
    }

    pub fn edge_from(mut self, source: &str, source_param: &str, target: &str, param: &str) -> Self {
        self.ir = self.ir.with_edge(
            Handle::new(source, source_param),
            Handle::new(target, param),
        );
        self
    }

    pub fn build(self) -> Ir {
        self.ir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_builder() {
        let ir = GraphBuilder::new()
            .source("a", DataType::I32)
            .source("b", DataType::I32)
            .node("sum", "add")
            .edge("a", "sum", "lhs")
            .edge("b", "sum", "rhs")
            .build();

        assert_eq!(ir.nodes.len(), 3);
        assert_eq!(ir.edges.len(), 2);
        assert_eq!(
            ir.functions
                .iter()
                .filter(|f| f.key == source_type(DataType::I32))
                .count(),
            1
        );
    }
}
