//! Viewer wire protocol
//!
//! Viewers exchange JSON text messages over a WebSocket, one message per
//! event, discriminated by a `type` field:
//!
//! ```text
//! Viewer                                     Relay
//!   |                                          |
//!   |<----- snapshot { tick_id, sources } -----|  (every tick)
//!   |                                          |
//!   |------ discover_streams ----------------->|
//!   |<----- discover_result { count } ---------|
//!   |                                          |
//!   |------ set_visibility { identity, ... } ->|
//!   |<----- ack | error { kind, message } -----|
//! ```

pub mod message;

pub use message::{ServerMessage, ViewerCommand};
