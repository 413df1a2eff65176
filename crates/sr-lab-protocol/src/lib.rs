//! Selective Repeat ARQ endpoints.
//!
//! [`SrSender`] and [`SrReceiver`] implement [`TransportProtocol`] and talk to
//! each other only through the channel behind [`SystemContext`].
//!
//! [`SystemContext`]: sr_lab_abstract::SystemContext

pub mod receiver;
pub mod ring;
pub mod sender;
pub mod seq;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use receiver::{ReceiverSlot, SrReceiver};
pub use ring::RingBuffer;
pub use sender::{SenderSlot, SrSender, Submit, WINDOW_TIMER};
pub use seq::{SeqSpace, circular_distance, in_window};
pub use sr_lab_abstract::checksum::{compute_checksum, is_corrupted};
pub use stats::{ReceiverStats, SenderStats};

use sr_lab_abstract::{ConfigError, ProtocolConfig, TransportProtocol};

/// A boxed sender ready to hand to the simulator.
pub fn sr_sender(config: ProtocolConfig) -> Result<Box<dyn TransportProtocol>, ConfigError> {
    Ok(Box::new(SrSender::new(config)?))
}

/// A boxed receiver ready to hand to the simulator.
pub fn sr_receiver(config: ProtocolConfig) -> Result<Box<dyn TransportProtocol>, ConfigError> {
    Ok(Box::new(SrReceiver::new(config)?))
}
