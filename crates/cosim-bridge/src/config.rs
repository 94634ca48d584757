//! Runtime configuration for the bridge.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cosim_common::time::{freq_to_period, MHZ};
use cosim_common::SimTime;

/// Default filesystem path of the listening socket.
pub const DEFAULT_SOCKET_PATH: &str = "cosim.sock";

/// Configuration the embedding application hands to [`Control::start`].
///
/// [`Control::start`]: crate::Control::start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Where the listening socket lives.
    pub socket_path: PathBuf,
    /// Expected simulated time between keep-alive ticks, used by the
    /// profiler to judge tick pacing.
    pub tick_period: SimTime,
    /// Wall-clock interval between profile log lines. `None` disables
    /// profiling output.
    pub profile_interval: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> BridgeConfig {
        BridgeConfig {
            socket_path: DEFAULT_SOCKET_PATH.into(),
            tick_period: freq_to_period(MHZ),
            profile_interval: Some(Duration::from_secs(5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("cosim.sock"));
        assert_eq!(config.tick_period, SimTime::from_us(1));
        assert_eq!(config.profile_interval, Some(Duration::from_secs(5)));
    }
}
