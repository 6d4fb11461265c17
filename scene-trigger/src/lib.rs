//! Scene trigger library
//!
//! Listens to the default microphone, reduces each frame to an RMS loudness
//! value and executes a SwitchBot scene when loudness crosses a threshold,
//! either immediately (`single`) or after a sustained run of loud windows
//! (`term`). A cooldown rate-limits both.

pub mod actuator;
pub mod audio;
pub mod config;
pub mod loudness;
pub mod monitor;
pub mod playback;
pub mod rolling_log;
pub mod trigger;

// Re-export main types
pub use actuator::{ActuatorError, SceneActuator, SwitchBotActuator, SwitchBotConfig};
pub use audio::{AudioConfig, AudioError, AudioSample, AudioSource, CpalSource, Frame};
pub use config::{AppConfig, ConfigError};
pub use loudness::{compute_rms, Loudness};
pub use monitor::{Monitor, MonitorStats};
pub use playback::{play_wav, write_sine_wav, PlaybackError};
pub use rolling_log::{LogConfig, RollingLogger};
pub use trigger::{FireDecision, Step, TriggerConfig, TriggerEngine, TriggerError, TriggerPolicy};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scene_trigger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_library_exports() {
        let _audio = AudioConfig::default();
        let _trigger = TriggerConfig::default();
        let _log = LogConfig::default();
        let _switchbot = SwitchBotConfig::default();
        let _app = AppConfig::default();
    }
}
