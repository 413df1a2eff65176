//! Selective Repeat receive side.
//!
//! Out-of-order arrivals inside `[base, base + window)` are buffered and
//! acknowledged individually. Packets from the trailing window
//! `[base - window, base)` were already delivered; they are re-acknowledged
//! so the sender can release them even if the first ACK was lost.

use sr_lab_abstract::{
    AppDataStatus, ConfigError, Packet, ProtocolConfig, SystemContext, TransportProtocol,
};
use tracing::trace;

use crate::ring::RingBuffer;
use crate::seq::SeqSpace;
use crate::stats::ReceiverStats;

#[derive(Debug, Clone)]
pub struct ReceiverSlot {
    pub seq: u32,
    pub packet: Packet,
}

#[derive(Debug)]
pub struct SrReceiver {
    config: ProtocolConfig,
    space: SeqSpace,
    base: u32,
    window: RingBuffer<ReceiverSlot>,
    /// Alternates on every ACK so successive ACKs are distinguishable on the
    /// wire. Carries no protocol meaning.
    ack_bit: u32,
    stats: ReceiverStats,
}

impl SrReceiver {
    pub fn new(config: ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            space: SeqSpace::new(config.seq_space),
            window: RingBuffer::new(config.window_size),
            config,
            base: 0,
            ack_bit: 0,
            stats: ReceiverStats::default(),
        })
    }

    pub fn reset(&mut self) {
        self.base = 0;
        self.window.clear();
        self.ack_bit = 0;
        self.stats = ReceiverStats::default();
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Next sequence number expected in order.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Whether `seq` is buffered, waiting for the gap before it to fill.
    pub fn is_buffered(&self, seq: u32) -> bool {
        self.window_offset(seq)
            .is_some_and(|offset| self.window.get(offset).is_some())
    }

    /// Last sequence number delivered in order.
    fn last_delivered(&self) -> u32 {
        self.space.prev(self.base)
    }

    fn window_offset(&self, seq: u32) -> Option<usize> {
        let size = self.config.window_size;
        if !self.space.contains(seq) || !self.space.in_window(seq, self.base, size) {
            return None;
        }
        Some(self.space.distance(self.base, seq) as usize)
    }

    fn in_trailing_window(&self, seq: u32) -> bool {
        let size = self.config.window_size;
        let trailing_base = self.space.sub(self.base, size as u32);
        self.space.contains(seq) && self.space.in_window(seq, trailing_base, size)
    }

    pub fn on_data(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if packet.is_corrupted() {
            self.stats.corrupted += 1;
            ctx.log("SR receiver got corrupted packet, re-ACK last delivered");
            self.send_ack(ctx, self.last_delivered());
            return;
        }
        if packet.is_ack() {
            ctx.log("SR receiver got an ACK, ignoring");
            return;
        }
        self.stats.packets_received += 1;
        let seq = packet.seqnum;

        if let Some(offset) = self.window_offset(seq) {
            if self.window.get(offset).is_some() {
                self.stats.duplicates += 1;
                ctx.log(&format!("SR receiver duplicate seq={seq}, re-ACK"));
            } else {
                ctx.log(&format!("SR receiver buffered seq={seq}"));
                self.window.insert(offset, ReceiverSlot { seq, packet });
            }
            self.send_ack(ctx, seq);
            self.drain(ctx);
        } else if self.in_trailing_window(seq) {
            self.stats.duplicates += 1;
            ctx.log(&format!("SR receiver already delivered seq={seq}, re-ACK"));
            self.send_ack(ctx, seq);
        } else {
            self.stats.out_of_window += 1;
            ctx.log(&format!(
                "SR receiver seq={seq} outside both windows (base={})",
                self.base
            ));
            self.send_ack(ctx, self.last_delivered());
        }
    }

    /// Deliver the in-order run at the window base.
    fn drain(&mut self, ctx: &mut dyn SystemContext) {
        let mut delivered = 0;
        while let Some(slot) = self.window.take_front() {
            debug_assert_eq!(slot.seq, self.base);
            ctx.deliver_data(&slot.packet.payload);
            self.stats.delivered += 1;
            trace!(seq = slot.seq, "delivered");
            self.base = self.space.next(self.base);
            delivered += 1;
        }
        if delivered > 0 {
            ctx.log(&format!(
                "SR receiver delivered {delivered} message(s), base now {}",
                self.base
            ));
            ctx.record_metric("receiver.base", self.base as f64);
        }
    }

    fn send_ack(&mut self, ctx: &mut dyn SystemContext, acknum: u32) {
        let ack = Packet::ack(self.ack_bit, acknum);
        self.ack_bit ^= 1;
        self.stats.acks_sent += 1;
        ctx.send_packet(ack);
    }
}

impl TransportProtocol for SrReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log(&format!(
            "SR receiver ready (window={}, seq space={})",
            self.config.window_size, self.config.seq_space
        ));
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        self.on_data(ctx, packet);
    }

    fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {}

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, _data: &[u8]) -> AppDataStatus {
        ctx.log("SR receiver does not originate data, ignoring");
        AppDataStatus::Rejected
    }
}
