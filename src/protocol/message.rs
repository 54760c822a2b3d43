//! Protocol message types

use serde::{Deserialize, Serialize};

use crate::aggregator::Snapshot;
use crate::source::SourceIdentity;

/// Error kind sent when an inbound message cannot be parsed
pub const INVALID_MESSAGE: &str = "invalid_message";

/// Error kind sent when discovery fails as a whole
pub const DISCOVERY_FAILED: &str = "discovery_failed";

/// Error kind sent when the relay is shutting down
pub const SHUTTING_DOWN: &str = "shutting_down";

/// Command sent by a viewer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerCommand {
    /// Resolve sources and add the new ones
    DiscoverStreams,
    /// Show or hide one channel
    SetVisibility {
        identity: SourceIdentity,
        channel_index: usize,
        visible: bool,
    },
}

impl ViewerCommand {
    /// Parse one inbound text message
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            ViewerCommand::DiscoverStreams => "discover_streams",
            ViewerCommand::SetVisibility { .. } => "set_visibility",
        }
    }
}

/// Message sent to viewers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One tick's data
    Snapshot(Snapshot),
    /// Reply to `discover_streams`
    DiscoverResult {
        /// Sources added by this request (0 is a normal outcome)
        count: usize,
        /// Live sources after the request
        total_streams: usize,
    },
    /// Command applied
    Ack { command: String },
    /// Command rejected; sent only to the issuing viewer
    Error { kind: String, message: String },
}

impl ServerMessage {
    /// Build an error reply
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Build an acknowledgement for `command`
    pub fn ack(command: &ViewerCommand) -> Self {
        ServerMessage::Ack {
            command: command.name().to_string(),
        }
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::aggregator::{ChannelSnapshot, SourceSnapshot, ViewerConfig};
    use crate::source::ChannelKind;

    #[test]
    fn test_parse_discover() {
        let cmd = ViewerCommand::parse(r#"{"type":"discover_streams"}"#).unwrap();
        assert_eq!(cmd, ViewerCommand::DiscoverStreams);
        assert_eq!(cmd.name(), "discover_streams");
    }

    #[test]
    fn test_parse_set_visibility() {
        let text = r#"{
            "type": "set_visibility",
            "identity": {"source_id": "dev-1", "name": "EEGStream", "type": "EEG"},
            "channel_index": 3,
            "visible": false
        }"#;

        let cmd = ViewerCommand::parse(text).unwrap();
        assert_eq!(
            cmd,
            ViewerCommand::SetVisibility {
                identity: SourceIdentity::new("dev-1", "EEGStream", "EEG"),
                channel_index: 3,
                visible: false,
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(ViewerCommand::parse(r#"{"type":"reboot"}"#).is_err());
        assert!(ViewerCommand::parse("not json").is_err());
    }

    #[test]
    fn test_snapshot_shape() {
        let snapshot = Snapshot {
            tick_id: 7,
            t_server: 1.5,
            config: ViewerConfig {
                max_samples: 500,
                timer_interval_ms: 2,
            },
            sources: vec![SourceSnapshot {
                identity: SourceIdentity::new("dev-1", "EEGStream", "EEG"),
                nominal_rate: 250.0,
                total_samples: 10,
                new_samples: 2,
                last_timestamp: Some(0.04),
                channels: vec![ChannelSnapshot {
                    index: 0,
                    label: "Fz".into(),
                    unit: "uV".into(),
                    kind: ChannelKind::Eeg,
                    values: vec![1.0, 2.0],
                }],
            }],
        };

        let value: Value =
            serde_json::from_str(&ServerMessage::Snapshot(snapshot).to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["tick_id"], 7);
        assert_eq!(value["config"], json!({"max_samples": 500, "timer_interval_ms": 2}));
        assert_eq!(value["sources"][0]["identity"]["name"], "EEGStream");
        assert_eq!(value["sources"][0]["channels"][0]["kind"], "eeg");
        assert_eq!(value["sources"][0]["channels"][0]["values"], json!([1.0, 2.0]));
    }

    #[test]
    fn test_reply_shapes() {
        let discover = ServerMessage::DiscoverResult {
            count: 0,
            total_streams: 2,
        };
        let value: Value = serde_json::from_str(&discover.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "discover_result", "count": 0, "total_streams": 2}));

        let ack = ServerMessage::ack(&ViewerCommand::DiscoverStreams);
        let value: Value = serde_json::from_str(&ack.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "ack", "command": "discover_streams"}));

        let error = ServerMessage::error("invalid_reference", "no such channel");
        let value: Value = serde_json::from_str(&error.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["kind"], "invalid_reference");
    }
}
