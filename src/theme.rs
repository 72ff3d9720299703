//! Vibe modes and the theme collaborator interface
//!
//! The companion can restyle its surface to match its mood. The core only
//! knows the closed set of modes and a sink to apply them to; rendering is
//! the front end's concern.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// The closed set of surface themes the companion can switch between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VibeMode {
    Electric,
    BloodRed,
    Chilling,
    StarkWhite,
    Blushing,
    Aggressive,
    CyberChrome,
}

impl VibeMode {
    pub const ALL: [VibeMode; 7] = [
        VibeMode::Electric,
        VibeMode::BloodRed,
        VibeMode::Chilling,
        VibeMode::StarkWhite,
        VibeMode::Blushing,
        VibeMode::Aggressive,
        VibeMode::CyberChrome,
    ];

    /// Parse from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "electric" => Some(Self::Electric),
            "blood-red" => Some(Self::BloodRed),
            "chilling" => Some(Self::Chilling),
            "stark-white" => Some(Self::StarkWhite),
            "blushing" => Some(Self::Blushing),
            "aggressive" => Some(Self::Aggressive),
            "cyber-chrome" => Some(Self::CyberChrome),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electric => "electric",
            Self::BloodRed => "blood-red",
            Self::Chilling => "chilling",
            Self::StarkWhite => "stark-white",
            Self::Blushing => "blushing",
            Self::Aggressive => "aggressive",
            Self::CyberChrome => "cyber-chrome",
        }
    }
}

impl Default for VibeMode {
    fn default() -> Self {
        Self::Electric
    }
}

impl std::fmt::Display for VibeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sink the `set_vibe` tool applies theme changes to
pub trait ThemeSink: Send + Sync {
    fn apply(&self, mode: VibeMode);
    fn current(&self) -> VibeMode;
}

/// In-process theme state; front ends read it back when rendering
#[derive(Debug, Default)]
pub struct VibeState {
    current: Mutex<VibeMode>,
}

impl VibeState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThemeSink for VibeState {
    fn apply(&self, mode: VibeMode) {
        let mut slot = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::info!(vibe = %mode, "vibe changed");
        *slot = mode;
    }

    fn current(&self) -> VibeMode {
        match self.current.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vibe_mode_from_str() {
        assert_eq!(VibeMode::from_str("electric"), Some(VibeMode::Electric));
        assert_eq!(VibeMode::from_str("blood-red"), Some(VibeMode::BloodRed));
        assert_eq!(VibeMode::from_str("CYBER-CHROME"), Some(VibeMode::CyberChrome));
        assert_eq!(VibeMode::from_str("sepia"), None);
    }

    #[test]
    fn test_vibe_mode_roundtrip() {
        for mode in VibeMode::ALL {
            assert_eq!(VibeMode::from_str(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn test_vibe_mode_serialization() {
        let json = serde_json::to_string(&VibeMode::StarkWhite).unwrap();
        assert_eq!(json, "\"stark-white\"");
        let mode: VibeMode = serde_json::from_str("\"blushing\"").unwrap();
        assert_eq!(mode, VibeMode::Blushing);
    }

    #[test]
    fn test_vibe_mode_default() {
        assert_eq!(VibeMode::default(), VibeMode::Electric);
    }

    #[test]
    fn test_vibe_state_apply() {
        let state = VibeState::new();
        assert_eq!(state.current(), VibeMode::Electric);
        state.apply(VibeMode::Aggressive);
        assert_eq!(state.current(), VibeMode::Aggressive);
    }
}
