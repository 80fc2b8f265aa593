//! Node runtime: value store, input synchronization and node plumbing.
//!
//! Upstream nodes write their outputs into a flat [`ValueStore`] arena.
//! Downstream nodes hold a [`NodeState`] that pulls those values, decides
//! when enough new data exists to run, and exposes one aligned snapshot per
//! trigger.
//!
//! # Architecture
//!
//! ```text
//! [producer] ──write──► ValueStore[OutputId] ──refresh_inputs──► NodeState
//!                                                                   │
//!                                              Node::next ◄─────────┘
//!                                                  │
//!                              outputs ◄───────────┴──► Context::mark_changed
//! ```
//!
//! # Design
//!
//! - **Arena + index**: consumers keep [`OutputId`]s, never references.
//! - **Single writer**: only the producing node replaces its own cells.
//! - **Contained failures**: node faults go to an [`ErrorSink`], never up
//!   the call stack.

pub mod channel;
pub mod clock;
pub mod id;
pub mod node;
pub mod state;
pub mod store;
pub mod sync;

pub use channel::{ChannelDigest, ChannelStore, SharedChannels};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use id::OutputId;
pub use node::{Context, ErrorSink, Factory, MultiFactory, Node, NodeConfig, NodeFault};
pub use state::{State, StateConfig};
pub use store::{Output, ValueStore};
pub use sync::{InputSource, NodeState};
