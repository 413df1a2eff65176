use std::collections::BTreeMap;

use sr_lab_abstract::{Packet, SystemContext};

/// In-memory `SystemContext` that records every side effect of a callback.
#[derive(Default)]
pub struct RecordingContext {
    pub now: u64,
    pub sent: Vec<Packet>,
    pub delivered: Vec<Vec<u8>>,
    /// Currently running timers: id -> delay.
    pub running: BTreeMap<u32, u64>,
    /// Every `start_timer` call, in order.
    pub starts: Vec<u32>,
    pub cancels: Vec<u32>,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
}

impl RecordingContext {
    pub fn take_sent(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }

    pub fn is_running(&self, timer_id: u32) -> bool {
        self.running.contains_key(&timer_id)
    }

    pub fn running_ids(&self) -> Vec<u32> {
        self.running.keys().copied().collect()
    }
}

impl SystemContext for RecordingContext {
    fn send_packet(&mut self, packet: Packet) {
        self.sent.push(packet);
    }

    fn start_timer(&mut self, delay_ms: u64, timer_id: u32) {
        self.running.insert(timer_id, delay_ms);
        self.starts.push(timer_id);
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.running.remove(&timer_id);
        self.cancels.push(timer_id);
    }

    fn deliver_data(&mut self, data: &[u8]) {
        self.delivered.push(data.to_vec());
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}
