//! Input synchronizer.
//!
//! Each consuming node keeps one accumulation queue and one watermark per
//! input. [`NodeState::refresh_inputs`] pulls new batches from the value
//! store, picks the input whose unconsumed batch ends earliest as the
//! trigger, and builds an aligned snapshot: the trigger's batch plus the
//! latest held batch of every other input.
//!
//! ```text
//!   store ──► queue[0] ─┐
//!   store ──► queue[1] ─┼─► earliest new batch ─► snapshot ─► node body
//!   default ► queue[2] ─┘
//! ```

use super::id::OutputId;
use super::store::{Output, ValueStore};
use crate::telem::Series;
use crate::types::{DataType, TimeStamp, Value};

/// Where an input's batches come from
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// Output cell of the upstream node wired to this input
    Edge(OutputId),
    /// Unconnected input with a declared default
    Default(Value),
}

/// Pending batches for one input
#[derive(Debug, Clone)]
pub struct AccumulatedInput {
    source: InputSource,
    queue: Vec<(Series, Series)>,
    watermark: TimeStamp,
}

impl AccumulatedInput {
    fn new(source: InputSource) -> Self {
        let queue = match &source {
            InputSource::Default(value) => vec![(
                value.to_series(),
                Series::from_timestamps(&[TimeStamp::ZERO]),
            )],
            InputSource::Edge(_) => Vec::new(),
        };
        Self {
            source,
            queue,
            watermark: TimeStamp::MIN,
        }
    }

    fn is_edge(&self) -> bool {
        matches!(self.source, InputSource::Edge(_))
    }

    fn last_queued(&self) -> Option<TimeStamp> {
        self.queue.last().and_then(|(_, t)| t.last_timestamp())
    }

    /// Drop batches at or below the watermark, always keeping the newest.
    fn prune(&mut self) {
        let wm = self.watermark;
        let fresh = |(_, t): &(Series, Series)| t.last_timestamp().is_some_and(|ts| ts > wm);
        if self.queue.iter().any(fresh) {
            self.queue.retain(fresh);
        } else if let Some(latest) = self.queue.pop() {
            self.queue.clear();
            self.queue.push(latest);
        }
    }
}

/// Per-node runtime state: input queues, the current aligned snapshot and
/// the node's own output cells.
#[derive(Debug, Clone)]
pub struct NodeState {
    key: String,
    inputs: Vec<AccumulatedInput>,
    snapshot: Vec<Output>,
    outputs: Vec<(String, OutputId)>,
}

impl NodeState {
    /// `inputs` are in declared parameter order.
    pub fn new(
        key: impl Into<String>,
        inputs: Vec<(InputSource, DataType)>,
        outputs: Vec<(String, OutputId)>,
    ) -> Self {
        let mut queues = Vec::with_capacity(inputs.len());
        let mut snapshot = Vec::with_capacity(inputs.len());
        for (source, data_type) in inputs {
            let input = AccumulatedInput::new(source);
            snapshot.push(match input.queue.last() {
                Some((data, time)) => Output::new(data.clone(), time.clone()),
                None => Output::empty(data_type),
            });
            queues.push(input);
        }
        Self {
            key: key.into(),
            inputs: queues,
            snapshot,
            outputs,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Pull new upstream batches and decide whether the node should run.
    ///
    /// On `true` the aligned snapshot is available through [`Self::input`]
    /// and [`Self::input_time`]. A node without connected inputs is ready on
    /// every call.
    pub fn refresh_inputs(&mut self, store: &ValueStore) -> bool {
        let mut connected = 0usize;
        for input in &mut self.inputs {
            let InputSource::Edge(id) = input.source else {
                continue;
            };
            connected += 1;
            let current = store.get(id);
            if current.data.is_empty() || current.time.is_empty() {
                continue;
            }
            let Some(last) = current.time.last_timestamp() else {
                continue;
            };
            if last <= input.watermark || input.last_queued() == Some(last) {
                continue;
            }
            input
                .queue
                .push((current.data.clone(), current.time.clone()));
        }

        if connected == 0 {
            return true;
        }
        if self.inputs.iter().any(|i| i.queue.is_empty()) {
            return false;
        }

        // Earliest unconsumed batch; strict `<` keeps the lowest input index on ties.
        let mut trigger: Option<(usize, usize, TimeStamp)> = None;
        for (i, input) in self.inputs.iter().enumerate() {
            if !input.is_edge() {
                continue;
            }
            for (j, (_, time)) in input.queue.iter().enumerate() {
                let Some(ts) = time.last_timestamp() else {
                    continue;
                };
                if ts > input.watermark && trigger.map_or(true, |(_, _, best)| ts < best) {
                    trigger = Some((i, j, ts));
                }
            }
        }
        let Some((trigger_input, trigger_batch, trigger_ts)) = trigger else {
            return false;
        };
        tracing::trace!(
            node = %self.key,
            input = trigger_input,
            at = %trigger_ts,
            "inputs triggered"
        );

        for (i, input) in self.inputs.iter_mut().enumerate() {
            let chosen = if i == trigger_input {
                input.queue.get(trigger_batch)
            } else {
                input.queue.last()
            };
            let Some((data, time)) = chosen else {
                continue;
            };
            if input.is_edge() {
                let consumed = if i == trigger_input {
                    trigger_ts
                } else {
                    time.last_timestamp().unwrap_or(TimeStamp::MIN)
                };
                input.watermark = input.watermark.max(consumed);
            }
            self.snapshot[i] = Output::new(data.clone(), time.clone());
        }

        for input in &mut self.inputs {
            if input.is_edge() {
                input.prune();
            }
        }
        true
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Data of input `i` in the current snapshot. Panics if `i` is out of range.
    pub fn input(&self, i: usize) -> &Series {
        &self.snapshot[i].data
    }

    /// Timestamps of input `i` in the current snapshot. Panics if `i` is out of range.
    pub fn input_time(&self, i: usize) -> &Series {
        &self.snapshot[i].time
    }

    pub fn watermark(&self, i: usize) -> Option<TimeStamp> {
        self.inputs.get(i).map(|input| input.watermark)
    }

    /// Number of batches waiting on input `i`
    pub fn queued(&self, i: usize) -> usize {
        self.inputs.get(i).map_or(0, |input| input.queue.len())
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn output_id(&self, i: usize) -> Option<OutputId> {
        self.outputs.get(i).map(|(_, id)| *id)
    }

    pub fn output_name(&self, i: usize) -> Option<&str> {
        self.outputs.get(i).map(|(name, _)| name.as_str())
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|(n, _)| n == name)
    }

    /// Current value of output `i`
    pub fn output<'s>(&self, store: &'s ValueStore, i: usize) -> Option<&'s Output> {
        self.output_id(i).map(|id| store.get(id))
    }

    /// Whether the last sample of the named output is non-zero
    pub fn is_output_truthy(&self, store: &ValueStore, param: &str) -> bool {
        self.output_index(param)
            .and_then(|i| self.output(store, i))
            .is_some_and(|out| out.data.is_last_truthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn produce(store: &mut ValueStore, id: OutputId, values: &[i64], seconds: &[i64]) {
        store.set(
            id,
            Output::new(Series::from_values(values), Series::from_seconds(seconds)),
        );
    }

    fn two_input_node(store: &mut ValueStore) -> (NodeState, OutputId, OutputId) {
        let a = store.alloc(DataType::I64);
        let b = store.alloc(DataType::I64);
        let out = store.alloc(DataType::I64);
        let state = NodeState::new(
            "target",
            vec![
                (InputSource::Edge(a), DataType::I64),
                (InputSource::Edge(b), DataType::I64),
            ],
            vec![("output".to_string(), out)],
        );
        (state, a, b)
    }

    #[test]
    fn test_zero_inputs_always_ready() {
        let store = ValueStore::new();
        let mut state = NodeState::new("source", vec![], vec![]);
        assert!(state.refresh_inputs(&store));
        assert!(state.refresh_inputs(&store));
    }

    #[test]
    fn test_no_trigger_until_all_inputs_produced() {
        let mut store = ValueStore::new();
        let (mut state, a, b) = two_input_node(&mut store);
        assert!(!state.refresh_inputs(&store));
        produce(&mut store, a, &[1], &[1]);
        assert!(!state.refresh_inputs(&store));
        produce(&mut store, b, &[2], &[2]);
        assert!(state.refresh_inputs(&store));
    }

    #[test]
    fn test_empty_output_never_triggers() {
        let mut store = ValueStore::new();
        let a = store.alloc(DataType::I64);
        let mut state = NodeState::new("n", vec![(InputSource::Edge(a), DataType::I64)], vec![]);
        produce(&mut store, a, &[], &[]);
        assert!(!state.refresh_inputs(&store));
        assert_eq!(state.watermark(0), Some(TimeStamp::MIN));
    }

    #[test]
    fn test_earliest_trigger_then_idle() {
        let mut store = ValueStore::new();
        let (mut state, a, b) = two_input_node(&mut store);
        produce(&mut store, a, &[10], &[100]);
        produce(&mut store, b, &[20], &[200]);

        assert!(state.refresh_inputs(&store));
        assert_eq!(state.input(0).values::<i64>(), vec![10]);
        assert_eq!(state.input(1).values::<i64>(), vec![20]);
        assert_eq!(state.watermark(0), Some(TimeStamp::from_seconds(100)));
        assert!(!state.refresh_inputs(&store));
    }

    #[test]
    fn test_equal_timestamps_lower_index_wins() {
        let mut store = ValueStore::new();
        let (mut state, a, b) = two_input_node(&mut store);
        produce(&mut store, a, &[1], &[5]);
        produce(&mut store, b, &[2], &[5]);
        assert!(state.refresh_inputs(&store));
        assert!(!state.refresh_inputs(&store));
    }

    #[test]
    fn test_pruning_keeps_latest_batch() {
        let mut store = ValueStore::new();
        let (mut state, a, b) = two_input_node(&mut store);
        produce(&mut store, a, &[1], &[1]);
        produce(&mut store, b, &[2], &[2]);
        assert!(state.refresh_inputs(&store));
        assert_eq!(state.queued(0), 1);
        assert_eq!(state.queued(1), 1);
    }

    #[test]
    fn test_partial_update_uses_held_value() {
        let mut store = ValueStore::new();
        let (mut state, a, b) = two_input_node(&mut store);
        produce(&mut store, a, &[1], &[1]);
        produce(&mut store, b, &[2], &[1]);
        assert!(state.refresh_inputs(&store));

        produce(&mut store, a, &[3], &[2]);
        assert!(state.refresh_inputs(&store));
        assert_eq!(state.input(0).values::<i64>(), vec![3]);
        assert_eq!(state.input(1).values::<i64>(), vec![2]);
    }

    #[test]
    fn test_same_batch_is_not_queued_twice() {
        let mut store = ValueStore::new();
        let (mut state, a, _b) = two_input_node(&mut store);
        produce(&mut store, a, &[1], &[1]);
        assert!(!state.refresh_inputs(&store));
        assert!(!state.refresh_inputs(&store));
        assert_eq!(state.queued(0), 1);
    }

    #[test]
    fn test_default_inputs_only() {
        let store = ValueStore::new();
        let mut state = NodeState::new(
            "n",
            vec![(InputSource::Default(Value::F32(1.5)), DataType::F32)],
            vec![],
        );
        assert!(state.refresh_inputs(&store));
        assert_eq!(state.input(0).values::<f32>(), vec![1.5]);
        assert_eq!(state.input_time(0).len(), 1);
    }

    #[test]
    fn test_output_truthiness() {
        let mut store = ValueStore::new();
        let out = store.alloc(DataType::U8);
        let state = NodeState::new("n", vec![], vec![("output".to_string(), out)]);
        assert!(!state.is_output_truthy(&store, "output"));
        store.set(
            out,
            Output::new(Series::from_values(&[1u8]), Series::from_seconds(&[1])),
        );
        assert!(state.is_output_truthy(&store, "output"));
        assert!(!state.is_output_truthy(&store, "missing"));
    }

    proptest! {
        #[test]
        fn prop_watermarks_monotonic_and_idle_without_new_data(
            writes in proptest::collection::vec((0usize..3, 1i64..4), 1..40)
        ) {
            let mut store = ValueStore::new();
            let ids: Vec<OutputId> = (0..3).map(|_| store.alloc(DataType::I64)).collect();
            let mut state = NodeState::new(
                "n",
                ids.iter().map(|id| (InputSource::Edge(*id), DataType::I64)).collect(),
                vec![],
            );

            let mut now = 0i64;
            let mut previous = vec![TimeStamp::MIN; 3];
            let mut ever_triggered = false;
            for (input, step) in writes {
                now += step;
                produce(&mut store, ids[input], &[now], &[now]);
                let triggered = state.refresh_inputs(&store);
                for (i, prev) in previous.iter_mut().enumerate() {
                    let wm = state.watermark(i).unwrap();
                    prop_assert!(wm >= *prev);
                    *prev = wm;
                }
                if triggered {
                    ever_triggered = true;
                    // Batches queued while waiting drain one per call.
                    let mut drains = 0;
                    while state.refresh_inputs(&store) {
                        drains += 1;
                        prop_assert!(drains <= 40);
                    }
                    prop_assert!(!state.refresh_inputs(&store));
                }
                if ever_triggered {
                    for i in 0..3 {
                        prop_assert!(state.queued(i) >= 1);
                    }
                }
            }
        }
    }
}
