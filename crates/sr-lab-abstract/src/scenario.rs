use crate::config::{ProtocolConfig, RetransmitPolicy, SimConfig};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub protocol: ProtocolConfigOverride,
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
    pub time_limit: Option<u64>,
}

impl SimConfigOverride {
    /// Overwrite the fields of `config` that this override sets.
    pub fn apply_to(&self, config: &mut SimConfig) {
        config.loss_rate = self.loss_rate.unwrap_or(config.loss_rate);
        config.corrupt_rate = self.corrupt_rate.unwrap_or(config.corrupt_rate);
        config.min_latency = self.min_latency.unwrap_or(config.min_latency);
        config.max_latency = self.max_latency.unwrap_or(config.max_latency);
        config.seed = self.seed.unwrap_or(config.seed);
        config.time_limit = self.time_limit.or(config.time_limit);
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProtocolConfigOverride {
    pub window_size: Option<usize>,
    pub seq_space: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub policy: Option<RetransmitPolicy>,
}

impl ProtocolConfigOverride {
    pub fn apply_to(&self, config: &mut ProtocolConfig) {
        config.window_size = self.window_size.unwrap_or(config.window_size);
        config.seq_space = self.seq_space.unwrap_or(config.seq_space);
        config.timeout_ms = self.timeout_ms.unwrap_or(config.timeout_ms);
        config.policy = self.policy.unwrap_or(config.policy);
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Hand `data` to the sender at `time`.
    AppSend { time: u64, data: String },
    /// `count` generated letter messages from `time`, `interval` ms apart.
    AppBurst {
        time: u64,
        count: u32,
        #[serde(default)]
        interval: u64,
    },
    /// Lose the next data packet with sequence number `seq`.
    DropNextFromSenderSeq { seq: u32 },
    /// Lose the next ACK for `ack`.
    DropNextFromReceiverAck { ack: u32 },
    /// Corrupt the next data packet with sequence number `seq`.
    CorruptNextFromSenderSeq { seq: u32 },
    /// Corrupt the next ACK for `ack`.
    CorruptNextFromReceiverAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// `data` (zero-padded) reached the receiving application.
    DataDelivered { data: String },
    /// Every submitted message was accepted and delivered exactly once, in order.
    DeliveredInOrder,
    DeliveredCount { count: usize },
    /// Data packets put on the wire, retransmissions included.
    SenderPacketCount { min: u32, max: Option<u32> },
    Retransmissions { min: u32, max: Option<u32> },
    /// The last event ran no later than `ms`.
    MaxDuration { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scenario_with_defaults() {
        let text = r#"
            name = "hole"
            [protocol]
            window_size = 6
            seq_space = 12

            [[actions]]
            type = "app_burst"
            time = 0
            count = 6

            [[actions]]
            type = "drop_next_from_receiver_ack"
            ack = 3

            [[assertions]]
            type = "delivered_in_order"
        "#;
        let scenario: TestScenario = toml::from_str(text).unwrap();
        assert_eq!(scenario.name, "hole");
        assert!(scenario.config.loss_rate.is_none());
        assert_eq!(scenario.protocol.window_size, Some(6));
        assert!(matches!(
            scenario.actions[0],
            TestAction::AppBurst { count: 6, interval: 0, .. }
        ));
        assert!(matches!(scenario.assertions[0], TestAssertion::DeliveredInOrder));
    }

    #[test]
    fn overrides_only_touch_given_fields() {
        let mut config = ProtocolConfig::default();
        ProtocolConfigOverride {
            policy: Some(RetransmitPolicy::GoBackN),
            ..Default::default()
        }
        .apply_to(&mut config);
        assert_eq!(config.policy, RetransmitPolicy::GoBackN);
        assert_eq!(config.window_size, 6);
    }
}
