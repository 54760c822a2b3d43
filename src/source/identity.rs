//! Source identity and channel metadata
//!
//! This module defines the key used to deduplicate sources across discovery
//! calls and the per-channel descriptors fixed at handle creation.

use serde::{Deserialize, Serialize};

/// Stable identifier for a physical source (source id + name + type)
///
/// Two discovery results with equal identity refer to the same source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentity {
    /// Transport-level source id (may be empty)
    pub source_id: String,
    /// Stream name (e.g., "EEGStream")
    pub name: String,
    /// Stream type (e.g., "EEG", "Gaze")
    #[serde(rename = "type")]
    pub source_type: String,
}

impl SourceIdentity {
    /// Create a new source identity
    pub fn new(
        source_id: impl Into<String>,
        name: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            source_type: source_type.into(),
        }
    }
}

impl std::fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.source_type, self.source_id)
    }
}

/// Rendering hint carried through to viewers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// EEG-like channel, plotted as a stacked trace
    Eeg,
    /// Any other numeric channel
    Numeric,
}

impl ChannelKind {
    /// Pick the kind from a channel type, falling back to the source type
    pub fn classify(channel_type: Option<&str>, source_type: &str) -> Self {
        let is_eeg = |t: &str| t.trim().eq_ignore_ascii_case("eeg");

        if channel_type.map_or(false, is_eeg) || is_eeg(source_type) {
            ChannelKind::Eeg
        } else {
            ChannelKind::Numeric
        }
    }
}

/// Metadata for one channel, stable for the handle's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelDescriptor {
    pub label: String,
    pub unit: String,
    pub kind: ChannelKind,
}

impl ChannelDescriptor {
    pub fn new(label: impl Into<String>, unit: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            label: label.into(),
            unit: unit.into(),
            kind,
        }
    }

    /// Build descriptors for `count` channels from possibly incomplete metadata
    ///
    /// Missing or empty labels become `Channel {n}` (1-based); missing units
    /// become `unknown`.
    pub fn from_metadata(
        count: usize,
        labels: &[String],
        units: &[String],
        types: &[String],
        source_type: &str,
    ) -> Vec<Self> {
        let non_empty = |values: &[String], i: usize| {
            values
                .get(i)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        (0..count)
            .map(|i| {
                let label = non_empty(labels, i).unwrap_or_else(|| format!("Channel {}", i + 1));
                let unit = non_empty(units, i).unwrap_or_else(|| "unknown".to_string());
                let channel_type = non_empty(types, i);
                let kind = ChannelKind::classify(channel_type.as_deref(), source_type);
                Self::new(label, unit, kind)
            })
            .collect()
    }
}
