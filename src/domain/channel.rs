// Channel identity and per-channel configuration
use crate::domain::error::EngineError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET: f64 = 0.5;
pub const DEFAULT_OFFSET: f64 = 0.0;

/// A channel's position in the device array together with its display label.
/// The index is where the data lives; the label is free to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelName {
    pub index: usize,
    pub display_name: String,
}

impl ChannelName {
    pub fn new(index: usize, display_name: impl Into<String>) -> Self {
        Self {
            index,
            display_name: display_name.into(),
        }
    }

    /// Positional placeholder, e.g. "tube 1" for index 0.
    pub fn placeholder(index: usize) -> Self {
        Self::new(index, format!("tube {}", index + 1))
    }

    /// Returns the relabelled channel. Blank labels keep the current one.
    pub fn renamed(&self, label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() {
            return self.clone();
        }
        Self::new(self.index, label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub name: String,
    #[serde(default = "default_target")]
    pub target: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_target() -> f64 {
    DEFAULT_TARGET
}

/// Names, targets and offsets for every channel of a device, passed explicitly
/// into each recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channels: Vec<ChannelSettings>,
}

impl ChannelConfig {
    /// The table a freshly selected (or cleared) device starts from.
    pub fn default_for(channel_count: usize) -> Self {
        let channels = (0..channel_count)
            .map(|index| ChannelSettings {
                name: ChannelName::placeholder(index).display_name,
                target: DEFAULT_TARGET,
                offset: DEFAULT_OFFSET,
            })
            .collect();
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn names(&self) -> Vec<ChannelName> {
        self.channels
            .iter()
            .enumerate()
            .map(|(index, c)| ChannelName::placeholder(index).renamed(&c.name))
            .collect()
    }

    pub fn offsets(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.offset).collect()
    }

    pub fn target(&self, index: usize) -> Option<f64> {
        self.channels.get(index).map(|c| c.target)
    }

    /// Checks the config against a series width and rejects unusable targets.
    pub fn validate(&self, channel_count: usize) -> Result<(), EngineError> {
        if self.channels.len() != channel_count {
            return Err(EngineError::ChannelCountMismatch {
                expected: channel_count,
                actual: self.channels.len(),
            });
        }
        for c in &self.channels {
            if !c.target.is_finite() || c.target <= 0.0 {
                return Err(EngineError::InvalidTarget(c.target));
            }
        }
        Ok(())
    }
}
