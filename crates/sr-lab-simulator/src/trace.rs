use serde::Serialize;
use sr_lab_abstract::SimConfig;
use std::collections::HashMap;

use crate::engine::LinkEventSummary;

/// Per-direction channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Packets handed to the channel.
    pub sent: u32,
    pub lost: u32,
    pub corrupted: u32,
    /// Packets scheduled to arrive (corrupted ones included).
    pub carried: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration_ms: u64,
    pub submitted_data: Vec<Vec<u8>>,
    pub accepted_data: Vec<Vec<u8>>,
    pub delivered_data: Vec<Vec<u8>>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub app_busy_count: u32,
    pub app_dropped_count: u32,
    /// Application data never accepted before the run ended.
    pub backlog: usize,
    pub forward: LinkStats,
    pub reverse: LinkStats,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    /// Most recent sample of a metric.
    pub fn last_metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .and_then(|series| series.last())
            .map(|&(_, value)| value)
    }

    /// Sender retransmissions, as published through the `sender.retransmissions` metric.
    pub fn retransmissions(&self) -> u32 {
        self.last_metric("sender.retransmissions")
            .map_or(0, |value| value as u32)
    }
}
