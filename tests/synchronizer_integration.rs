//! Input synchronization through the graph-level state

mod common;

use common::builders::GraphBuilder;
use nodegraph_rs::error::RuntimeError;
use nodegraph_rs::ir::{Function, Param, DEFAULT_OUTPUT_PARAM};
use nodegraph_rs::runtime::{State, StateConfig};
use nodegraph_rs::telem::Series;
use nodegraph_rs::types::{DataType, TimeStamp, Value};

fn produce(state: &mut State, node: &str, values: &[i32], seconds: &[i64]) {
    state
        .set_output(
            node,
            DEFAULT_OUTPUT_PARAM,
            Series::from_values(values),
            Series::from_seconds(seconds),
        )
        .unwrap();
}

fn add_graph() -> State {
    let ir = GraphBuilder::new()
        .source("a", DataType::I32)
        .source("b", DataType::I32)
        .node("sum", "add")
        .edge("a", "sum", "lhs")
        .edge("b", "sum", "rhs")
        .build();
    State::new(StateConfig::new(ir))
}

#[test]
fn test_earliest_batch_triggers_with_latest_of_others() {
    let mut state = add_graph();
    let mut node = state.node("sum").unwrap();

    produce(&mut state, "a", &[10], &[100]);
    produce(&mut state, "b", &[20], &[200]);

    assert!(node.refresh_inputs(state.store()));
    assert_eq!(node.input(0).values::<i32>(), vec![10]);
    assert_eq!(node.input(1).values::<i32>(), vec![20]);
    assert_eq!(node.input_time(0).last_timestamp(), Some(TimeStamp::from_seconds(100)));
    assert_eq!(node.input_time(1).last_timestamp(), Some(TimeStamp::from_seconds(200)));

    assert!(!node.refresh_inputs(state.store()));
}

#[test]
fn test_no_trigger_before_every_input_produced() {
    let mut state = add_graph();
    let mut node = state.node("sum").unwrap();

    assert!(!node.refresh_inputs(state.store()));
    produce(&mut state, "a", &[1, 2], &[1, 2]);
    assert!(!node.refresh_inputs(state.store()));
    assert!(!node.refresh_inputs(state.store()));

    produce(&mut state, "b", &[], &[]);
    assert!(!node.refresh_inputs(state.store()));

    produce(&mut state, "b", &[5], &[3]);
    assert!(node.refresh_inputs(state.store()));
}

#[test]
fn test_partial_update_holds_other_inputs() {
    let mut state = add_graph();
    let mut node = state.node("sum").unwrap();

    produce(&mut state, "a", &[1], &[1]);
    produce(&mut state, "b", &[100], &[1]);
    assert!(node.refresh_inputs(state.store()));

    for (i, t) in (2..5).enumerate() {
        let value = 2 + i as i32;
        produce(&mut state, "a", &[value], &[t]);
        assert!(node.refresh_inputs(state.store()));
        assert_eq!(node.input(0).values::<i32>(), vec![value]);
        assert_eq!(node.input(1).values::<i32>(), vec![100]);
        assert!(!node.refresh_inputs(state.store()));
    }
}

#[test]
fn test_repeated_calls_without_data_are_idle() {
    let mut state = add_graph();
    let mut node = state.node("sum").unwrap();

    produce(&mut state, "a", &[1], &[10]);
    produce(&mut state, "b", &[2], &[20]);
    assert!(node.refresh_inputs(state.store()));
    for _ in 0..10 {
        assert!(!node.refresh_inputs(state.store()));
    }
    assert!(node.watermark(0).unwrap() >= TimeStamp::from_seconds(10));
    assert!(node.queued(0) >= 1);
    assert!(node.queued(1) >= 1);
}

#[test]
fn test_defaults_fill_unconnected_inputs() {
    let scaled = Function::new("offset")
        .input(Param::new("input", DataType::I32))
        .input(Param::new("bias", DataType::I32).with_default(Value::I32(7)))
        .output(Param::new(DEFAULT_OUTPUT_PARAM, DataType::I32));
    let ir = GraphBuilder::new()
        .function(scaled)
        .source("a", DataType::I32)
        .node("n", "offset")
        .edge("a", "n", "input")
        .build();
    let mut state = State::new(StateConfig::new(ir));
    let mut node = state.node("n").unwrap();

    assert!(!node.refresh_inputs(state.store()));
    produce(&mut state, "a", &[1], &[1]);
    assert!(node.refresh_inputs(state.store()));
    assert_eq!(node.input(1).values::<i32>(), vec![7]);

    produce(&mut state, "a", &[2], &[2]);
    assert!(node.refresh_inputs(state.store()));
    assert_eq!(node.input(0).values::<i32>(), vec![2]);
    assert_eq!(node.input(1).values::<i32>(), vec![7]);
}

#[test]
fn test_unconnected_required_input_is_rejected() {
    let ir = GraphBuilder::new()
        .source("a", DataType::I32)
        .node("sum", "add")
        .edge("a", "sum", "lhs")
        .build();
    let state = State::new(StateConfig::new(ir));
    let err = state.node("sum").unwrap_err();
    assert!(err.to_string().contains("sum.rhs"));
}

#[test]
fn test_default_must_match_input_type() {
    let add = Function::new("add_f32_default")
        .input(Param::new("lhs", DataType::I32))
        .input(Param::new("rhs", DataType::I32).with_default(Value::F32(2.0)))
        .output(Param::new(DEFAULT_OUTPUT_PARAM, DataType::I32));
    let ir = GraphBuilder::new()
        .function(add)
        .source("a", DataType::I32)
        .node("sum", "add_f32_default")
        .edge("a", "sum", "lhs")
        .build();
    let state = State::new(StateConfig::new(ir));
    let err = state.node("sum").unwrap_err();
    assert!(matches!(err, RuntimeError::Ir(_)));
    assert!(err.to_string().contains("sum.rhs"));
}

#[test]
fn test_edge_source_must_match_input_type() {
    let ir = GraphBuilder::new()
        .source("a", DataType::I32)
        .source("wide", DataType::I64)
        .node("sum", "add")
        .edge("a", "sum", "lhs")
        .edge("wide", "sum", "rhs")
        .build();
    let state = State::new(StateConfig::new(ir));
    let err = state.node("sum").unwrap_err();
    assert!(matches!(err, RuntimeError::Ir(_)));
    assert!(err.to_string().contains("expects i32"));
    assert!(err.to_string().contains("i64"));
}
