use thiserror::Error;

/// Rejected configuration. Raised once at startup, never during a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    ZeroWindow,

    #[error(
        "sequence space {seq_space} is too small for window size {window_size} \
         (need at least {})",
        2 * window_size
    )]
    SeqSpaceTooSmall { window_size: usize, seq_space: u32 },

    #[error("retransmission timeout must be greater than zero")]
    ZeroTimeout,

    #[error("{name} must lie in [0, 1], got {value}")]
    InvalidRate { name: &'static str, value: f64 },

    #[error("min latency {min} exceeds max latency {max}")]
    InvalidLatency { min: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message of {len} bytes does not fit a {} byte payload", crate::packet::PAYLOAD_SIZE)]
    TooLong { len: usize },
}
