//! Per-source buffering
//!
//! A [`SourceHandle`] wraps one connected source and owns a fixed-depth
//! [`RingBuffer`] of its most recent samples. Handles are created by
//! discovery, owned by the aggregator, and mutated only by their own `pull`.
//!
//! ```text
//!   transport ──pull()──► SourceHandle ──latest(n)──► Aggregator
//!                         ┌────────────────────────┐
//!                         │ RingBuffer             │
//!                         │  [C × channels] values │
//!                         │  cursor, total         │
//!                         └────────────────────────┘
//! ```
//!
//! The buffer is a live view, not a recorder: beyond `C` samples the oldest
//! data is silently overwritten.

pub mod config;
pub mod handle;
pub mod identity;
pub mod ring;

pub use config::SourceConfig;
pub use handle::SourceHandle;
pub use identity::{ChannelDescriptor, ChannelKind, SourceIdentity};
pub use ring::{BufferedSample, RingBuffer};
