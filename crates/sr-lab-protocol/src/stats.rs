use serde::Serialize;

/// Sender-side event counters. Reset by `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    /// Messages accepted into the send window.
    pub messages_accepted: u32,
    /// Submissions rejected because the window was full.
    pub window_full: u32,
    /// First transmissions of data packets.
    pub packets_sent: u32,
    pub retransmissions: u32,
    /// Uncorrupted ACKs, whatever they acknowledged.
    pub acks_received: u32,
    /// ACKs that acknowledged a slot for the first time.
    pub new_acks: u32,
    pub duplicate_acks: u32,
    /// ACKs outside the outstanding window.
    pub stale_acks: u32,
    pub corrupted_acks: u32,
}

/// Receiver-side event counters. Reset by `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    /// Uncorrupted data packets.
    pub packets_received: u32,
    /// Payloads handed to the application.
    pub delivered: u32,
    /// Data packets that were already buffered or delivered.
    pub duplicates: u32,
    pub corrupted: u32,
    pub out_of_window: u32,
    pub acks_sent: u32,
}
