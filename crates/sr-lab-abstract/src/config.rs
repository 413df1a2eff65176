use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the sender reacts to an expired retransmission timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetransmitPolicy {
    /// One timer per outstanding packet; a timeout resends only that packet.
    #[default]
    PerPacket,
    /// One window-wide timer; a timeout resends every unacknowledged packet.
    GoBackN,
}

/// Protocol parameters, fixed for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Sender and receiver window capacity.
    pub window_size: usize,
    /// Modulus of the sequence space. Must be at least twice the window size.
    pub seq_space: u32,
    /// Retransmission timeout in milliseconds.
    pub timeout_ms: u64,
    pub policy: RetransmitPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            window_size: 6,
            seq_space: 12,
            timeout_ms: 250,
            policy: RetransmitPolicy::PerPacket,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        let seq_space_ok = u64::from(self.seq_space) >= 2 * self.window_size as u64;
        if !seq_space_ok {
            return Err(ConfigError::SeqSpaceTooSmall {
                window_size: self.window_size,
                seq_space: self.seq_space,
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Stop processing events scheduled after this time (ms). `None` runs until the queue drains.
    pub time_limit: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            seed: 0,
            time_limit: None,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_rate", self.loss_rate),
            ("corrupt_rate", self.corrupt_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }
        if self.min_latency > self.max_latency {
            return Err(ConfigError::InvalidLatency {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_protocol_config_is_valid() {
        assert!(ProtocolConfig::default().validate().is_ok());
    }

    #[test]
    fn seq_space_must_cover_two_windows() {
        let config = ProtocolConfig {
            window_size: 6,
            seq_space: 7,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SeqSpaceTooSmall {
                window_size: 6,
                seq_space: 7
            })
        );

        let config = ProtocolConfig {
            window_size: 6,
            seq_space: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProtocolConfig {
            window_size: 6,
            seq_space: 12,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_window_and_timeout_are_rejected() {
        let config = ProtocolConfig {
            window_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroWindow));

        let config = ProtocolConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn sim_config_checks_rates_and_latency() {
        let config = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRate { name: "loss_rate", .. })
        ));

        let config = SimConfig {
            min_latency: 50,
            max_latency: 10,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLatency { min: 50, max: 10 })
        );
    }

    #[test]
    fn policy_parses_from_toml() {
        let text = r#"
            policy = "go-back-n"
            window_size = 4
            seq_space = 8
        "#;
        let config: ProtocolConfig = toml::from_str(text).unwrap();
        assert_eq!(config.policy, RetransmitPolicy::GoBackN);
        assert_eq!(config.window_size, 4);
        assert_eq!(config.timeout_ms, 250);
    }
}
