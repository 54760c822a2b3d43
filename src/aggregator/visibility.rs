//! Per-channel visibility flags
//!
//! Keyed by (source identity, channel index). Entries are created visible the
//! first time a channel is seen and live for the whole process, surviving
//! eviction of the source they belong to.

use std::collections::HashMap;

use crate::source::SourceIdentity;

use super::error::AggregatorError;

/// Visibility flags for every channel ever seen
#[derive(Debug, Default)]
pub struct VisibilityState {
    flags: HashMap<SourceIdentity, Vec<bool>>,
}

impl VisibilityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `channel_count` channels are tracked for `identity`
    ///
    /// New channels start visible; existing flags are left untouched.
    pub fn ensure(&mut self, identity: &SourceIdentity, channel_count: usize) {
        let flags = self.flags.entry(identity.clone()).or_default();
        if flags.len() < channel_count {
            flags.resize(channel_count, true);
        }
    }

    /// Update one flag in place
    pub fn set(
        &mut self,
        identity: &SourceIdentity,
        channel_index: usize,
        visible: bool,
    ) -> Result<(), AggregatorError> {
        let flag = self
            .flags
            .get_mut(identity)
            .and_then(|flags| flags.get_mut(channel_index))
            .ok_or_else(|| AggregatorError::InvalidReference {
                identity: identity.clone(),
                channel_index,
            })?;

        *flag = visible;
        Ok(())
    }

    /// Stored flag, if the pair is known
    pub fn get(&self, identity: &SourceIdentity, channel_index: usize) -> Option<bool> {
        self.flags
            .get(identity)
            .and_then(|flags| flags.get(channel_index))
            .copied()
    }

    /// Whether a channel should be emitted; unknown pairs count as visible
    pub fn is_visible(&self, identity: &SourceIdentity, channel_index: usize) -> bool {
        self.get(identity, channel_index).unwrap_or(true)
    }

    /// Number of tracked channels across all sources
    pub fn len(&self) -> usize {
        self.flags.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SourceIdentity {
        SourceIdentity::new("a", "A", "EEG")
    }

    #[test]
    fn test_new_channels_default_visible() {
        let mut state = VisibilityState::new();
        state.ensure(&identity(), 2);

        assert_eq!(state.get(&identity(), 0), Some(true));
        assert_eq!(state.get(&identity(), 1), Some(true));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_unknown_treated_as_visible() {
        let state = VisibilityState::new();

        assert!(state.get(&identity(), 0).is_none());
        assert!(state.is_visible(&identity(), 0));
    }

    #[test]
    fn test_set_unknown_fails() {
        let mut state = VisibilityState::new();
        state.ensure(&identity(), 1);

        let result = state.set(&identity(), 1, false);
        assert_eq!(
            result,
            Err(AggregatorError::InvalidReference {
                identity: identity(),
                channel_index: 1
            })
        );

        let other = SourceIdentity::new("b", "B", "EEG");
        assert!(state.set(&other, 0, false).is_err());
    }

    #[test]
    fn test_ensure_keeps_existing_flags() {
        let mut state = VisibilityState::new();
        state.ensure(&identity(), 1);
        state.set(&identity(), 0, false).unwrap();

        state.ensure(&identity(), 3);

        assert_eq!(state.get(&identity(), 0), Some(false));
        assert_eq!(state.get(&identity(), 2), Some(true));
    }
}
