//! Multi-source aggregation
//!
//! The aggregator owns the live [`SourceHandle`](crate::source::SourceHandle)
//! set and the per-channel visibility flags. Once per tick it drains every
//! handle and assembles a single [`Snapshot`].
//!
//! # Architecture
//!
//! ```text
//!                        Arc<Mutex<Aggregator>>
//!                    ┌──────────────────────────┐
//!                    │ handles: Vec<Handle>     │
//!                    │ visibility: (id, ch)→bool│
//!                    │ last_emitted: id → u64   │
//!                    └────────────┬─────────────┘
//!                                 │
//!          ┌──────────────────────┼──────────────────────┐
//!          │                      │                      │
//!          ▼                      ▼                      ▼
//!     [tick loop]           [discover cmd]       [set_visibility cmd]
//!     poll()                add(handles)         set_visibility()
//!     evict_dead()
//! ```
//!
//! All mutation goes through `&mut self`, so the single lock around the
//! aggregator is the only mutation gate: `add`, `evict_dead` and
//! `set_visibility` are each atomic with respect to a concurrent `poll`.

pub mod config;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod visibility;

pub use config::AggregatorConfig;
pub use error::AggregatorError;
pub use snapshot::{ChannelSnapshot, PollReport, Snapshot, SourceSnapshot, ViewerConfig};
pub use store::Aggregator;
pub use visibility::VisibilityState;
