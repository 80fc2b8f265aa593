//! Resolved graph IR consumed by the runtime.
//!
//! The IR is produced by the graph compiler. It lists the compiled
//! functions (with their declared parameters and shared-memory base), the
//! node instances referencing them by key, and the edges wiring node
//! outputs to node inputs.
//!
//! # Example
//!
//! ```ignore
//! let ir = Ir::from_json(r#"{
//!     "functions": [{"key": "add", "inputs": [...], "outputs": [...]}],
//!     "nodes": [{"key": "add_1", "type": "add"}],
//!     "edges": []
//! }"#)?;
//! ```

use crate::error::{Result, RuntimeError};
use crate::types::{DataType, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter name of a single-output function's result
pub const DEFAULT_OUTPUT_PARAM: &str = "output";

/// Parameter name of a single-input function's argument
pub const DEFAULT_INPUT_PARAM: &str = "input";

/// Left operand of a binary operator function
pub const LHS_INPUT_PARAM: &str = "lhs";

/// Right operand of a binary operator function
pub const RHS_INPUT_PARAM: &str = "rhs";

/// Address of one node parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub node: String,
    pub param: String,
}

impl Handle {
    pub fn new(node: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            param: param.into(),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.param)
    }
}

/// A wire from a node output to a node input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: Handle,
    pub target: Handle,
}

impl Edge {
    pub fn new(source: Handle, target: Handle) -> Self {
        Self { source, target }
    }
}

/// A declared function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Value used when the input has no incoming edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// A compiled function definition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Function {
    /// Key shared by the sandbox export and the nodes that use it
    pub key: String,
    #[serde(default)]
    pub inputs: Vec<Param>,
    #[serde(default)]
    pub outputs: Vec<Param>,
    /// Offset of the output flag word in linear memory; 0 means the single
    /// output is returned directly.
    #[serde(default)]
    pub memory_base: u32,
}

impl Function {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn input(mut self, param: Param) -> Self {
        self.inputs.push(param);
        self
    }

    pub fn output(mut self, param: Param) -> Self {
        self.outputs.push(param);
        self
    }

    pub fn memory_base(mut self, base: u32) -> Self {
        self.memory_base = base;
        self
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }
}

/// A node instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub key: String,
    /// Key of the function this node runs
    #[serde(rename = "type")]
    pub node_type: String,
}

impl Node {
    pub fn new(key: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            node_type: node_type.into(),
        }
    }
}

/// The full resolved graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ir {
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Ir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse IR from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RuntimeError::Serialization(format!("Failed to parse graph IR: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RuntimeError::Serialization(format!("Failed to serialize graph IR: {}", e)))
    }

    pub fn function(&self, key: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.key == key)
    }

    pub fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.key == key)
    }

    /// The edge feeding `target`, if any
    pub fn edge_into(&self, target: &Handle) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.target == target)
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_node(mut self, key: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.nodes.push(Node::new(key, node_type));
        self
    }

    pub fn with_edge(mut self, source: Handle, target: Handle) -> Self {
        self.edges.push(Edge::new(source, target));
        self
    }
}
