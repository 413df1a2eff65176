//! Selective Repeat send side.
//!
//! The sender keeps at most `window_size` unacknowledged packets in a ring of
//! [`SenderSlot`]s whose head is always the packet with sequence number
//! `base_seq`. ACKs may arrive for any outstanding slot; the window only
//! slides past a contiguous run of acknowledged slots.

use sr_lab_abstract::{
    AppDataStatus, ConfigError, Message, Packet, ProtocolConfig, RetransmitPolicy, SystemContext,
    TransportProtocol,
};
use tracing::{trace, warn};

use crate::ring::RingBuffer;
use crate::seq::SeqSpace;
use crate::stats::SenderStats;

/// Timer id of the window-wide timer used by [`RetransmitPolicy::GoBackN`].
/// Per-packet timers use the slot's sequence number, which is always smaller.
pub const WINDOW_TIMER: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct SenderSlot {
    pub seq: u32,
    pub packet: Packet,
    pub acknowledged: bool,
    pub timer_active: bool,
}

/// Outcome of [`SrSender::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Accepted { seq: u32 },
    /// The window already holds `window_size` unacknowledged packets.
    /// Nothing was sent; the caller may retry later.
    WindowFull,
}

#[derive(Debug)]
pub struct SrSender {
    config: ProtocolConfig,
    space: SeqSpace,
    next_seq: u32,
    base_seq: u32,
    window: RingBuffer<SenderSlot>,
    outstanding: usize,
    window_timer_active: bool,
    stats: SenderStats,
}

impl SrSender {
    pub fn new(config: ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            space: SeqSpace::new(config.seq_space),
            window: RingBuffer::new(config.window_size),
            config,
            next_seq: 0,
            base_seq: 0,
            outstanding: 0,
            window_timer_active: false,
            stats: SenderStats::default(),
        })
    }

    /// Drop every buffered packet and return to the initial state.
    pub fn reset(&mut self) {
        self.next_seq = 0;
        self.base_seq = 0;
        self.window.clear();
        self.outstanding = 0;
        self.window_timer_active = false;
        self.stats = SenderStats::default();
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Oldest unacknowledged sequence number (equals `next_seq` when idle).
    pub fn base_seq(&self) -> u32 {
        self.base_seq
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Number of slots between the window base and `next_seq`.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// The outstanding slot holding `seq`, if any.
    pub fn slot(&self, seq: u32) -> Option<&SenderSlot> {
        let offset = self.offset_of(seq)?;
        self.window.get(offset)
    }

    fn offset_of(&self, seq: u32) -> Option<usize> {
        if !self.space.contains(seq) || !self.space.in_window(seq, self.base_seq, self.outstanding)
        {
            return None;
        }
        Some(self.space.distance(self.base_seq, seq) as usize)
    }

    pub fn submit(&mut self, ctx: &mut dyn SystemContext, message: &Message) -> Submit {
        if self.outstanding == self.config.window_size {
            self.stats.window_full += 1;
            ctx.log("SR sender window full, message rejected");
            ctx.record_metric("sender.window_full", self.stats.window_full as f64);
            return Submit::WindowFull;
        }

        let seq = self.next_seq;
        let packet = Packet::data(seq, message);
        let was_idle = self.outstanding == 0;
        let offset = self.outstanding;

        self.window.insert(
            offset,
            SenderSlot {
                seq,
                packet: packet.clone(),
                acknowledged: false,
                timer_active: false,
            },
        );
        self.outstanding += 1;
        self.stats.messages_accepted += 1;
        self.stats.packets_sent += 1;

        ctx.log(&format!("SR send seq={seq}"));
        ctx.send_packet(packet);

        match self.config.policy {
            RetransmitPolicy::PerPacket => self.start_slot_timer(ctx, offset),
            RetransmitPolicy::GoBackN if was_idle => self.start_window_timer(ctx),
            RetransmitPolicy::GoBackN => {}
        }

        self.next_seq = self.space.next(seq);
        ctx.record_metric("sender.window", self.outstanding as f64);
        Submit::Accepted { seq }
    }

    pub fn on_ack(&mut self, ctx: &mut dyn SystemContext, packet: &Packet) {
        if packet.is_corrupted() {
            self.stats.corrupted_acks += 1;
            ctx.log("SR sender got corrupted ACK, ignoring");
            return;
        }
        let Some(ack) = packet.acknum else {
            ctx.log(&format!(
                "SR sender got data packet seq={}, ignoring",
                packet.seqnum
            ));
            return;
        };
        self.stats.acks_received += 1;

        let Some(offset) = self.offset_of(ack) else {
            self.stats.stale_acks += 1;
            ctx.log(&format!(
                "SR sender ignoring ACK {ack} outside window [{}, +{})",
                self.base_seq, self.outstanding
            ));
            return;
        };

        let policy = self.config.policy;
        let Some(slot) = self.window.get_mut(offset) else {
            warn!(ack, offset, "outstanding slot missing from send window");
            return;
        };
        if slot.acknowledged {
            self.stats.duplicate_acks += 1;
            ctx.log(&format!("SR sender duplicate ACK {ack}"));
            return;
        }

        slot.acknowledged = true;
        if policy == RetransmitPolicy::PerPacket && slot.timer_active {
            slot.timer_active = false;
            ctx.cancel_timer(slot.seq);
        }
        self.stats.new_acks += 1;
        ctx.log(&format!("SR sender ACK {ack} accepted"));

        self.slide();
        self.rearm_after_ack(ctx);
        ctx.record_metric("sender.window", self.outstanding as f64);
    }

    /// Release the contiguous run of acknowledged slots at the window base.
    fn slide(&mut self) {
        while self.outstanding > 0 && self.window.front().is_some_and(|slot| slot.acknowledged) {
            self.window.pop_front();
            self.outstanding -= 1;
            trace!(released = self.base_seq, "send window slides");
            self.base_seq = self.space.next(self.base_seq);
        }
        debug_assert!(self.outstanding > 0 || self.base_seq == self.next_seq);
    }

    fn rearm_after_ack(&mut self, ctx: &mut dyn SystemContext) {
        match self.config.policy {
            RetransmitPolicy::PerPacket => {
                // Every unacknowledged slot already owns a running timer; make
                // sure the earliest one does without pushing its deadline back.
                let earliest = (0..self.outstanding).find(|&offset| {
                    self.window
                        .get(offset)
                        .is_some_and(|slot| !slot.acknowledged)
                });
                if let Some(offset) = earliest
                    && self.window.get(offset).is_some_and(|slot| !slot.timer_active)
                {
                    self.start_slot_timer(ctx, offset);
                }
            }
            RetransmitPolicy::GoBackN => {
                if self.outstanding > 0 {
                    self.start_window_timer(ctx);
                } else if self.window_timer_active {
                    self.window_timer_active = false;
                    ctx.cancel_timer(WINDOW_TIMER);
                }
            }
        }
    }

    pub fn on_timeout(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        match self.config.policy {
            RetransmitPolicy::PerPacket => self.retransmit_slot(ctx, timer_id),
            RetransmitPolicy::GoBackN => self.retransmit_window(ctx, timer_id),
        }
    }

    fn retransmit_slot(&mut self, ctx: &mut dyn SystemContext, seq: u32) {
        let Some(offset) = self.offset_of(seq) else {
            ctx.log(&format!("SR sender stale timer {seq}, ignoring"));
            return;
        };
        let Some(slot) = self.window.get(offset) else {
            return;
        };
        if slot.acknowledged || !slot.timer_active {
            ctx.log(&format!("SR sender stale timer {seq}, ignoring"));
            return;
        }

        let packet = slot.packet.clone();
        self.stats.retransmissions += 1;
        ctx.log(&format!("SR timeout, retransmitting seq={seq}"));
        ctx.send_packet(packet);
        self.start_slot_timer(ctx, offset);
        ctx.record_metric("sender.retransmissions", self.stats.retransmissions as f64);
    }

    fn retransmit_window(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        if timer_id != WINDOW_TIMER || !self.window_timer_active {
            ctx.log(&format!("SR sender stale timer {timer_id}, ignoring"));
            return;
        }
        if self.outstanding == 0 {
            self.window_timer_active = false;
            return;
        }

        let resend: Vec<Packet> = (0..self.outstanding)
            .filter_map(|offset| self.window.get(offset))
            .filter(|slot| !slot.acknowledged)
            .map(|slot| slot.packet.clone())
            .collect();
        ctx.log(&format!(
            "SR timeout, retransmitting {} unacknowledged packets from seq={}",
            resend.len(),
            self.base_seq
        ));
        for packet in resend {
            self.stats.retransmissions += 1;
            ctx.send_packet(packet);
        }
        self.start_window_timer(ctx);
        ctx.record_metric("sender.retransmissions", self.stats.retransmissions as f64);
    }

    fn start_slot_timer(&mut self, ctx: &mut dyn SystemContext, offset: usize) {
        let timeout = self.config.timeout_ms;
        if let Some(slot) = self.window.get_mut(offset) {
            slot.timer_active = true;
            ctx.start_timer(timeout, slot.seq);
        }
    }

    fn start_window_timer(&mut self, ctx: &mut dyn SystemContext) {
        self.window_timer_active = true;
        ctx.start_timer(self.config.timeout_ms, WINDOW_TIMER);
    }
}

impl TransportProtocol for SrSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log(&format!(
            "SR sender ready (window={}, seq space={}, timeout={}ms, {:?})",
            self.config.window_size,
            self.config.seq_space,
            self.config.timeout_ms,
            self.config.policy
        ));
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        self.on_ack(ctx, &packet);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        self.on_timeout(ctx, timer_id);
    }

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, data: &[u8]) -> AppDataStatus {
        match Message::from_slice(data) {
            Ok(message) => match self.submit(ctx, &message) {
                Submit::Accepted { .. } => AppDataStatus::Accepted,
                Submit::WindowFull => AppDataStatus::Busy,
            },
            Err(err) => {
                warn!(%err, "dropping application data");
                ctx.log(&format!("SR sender dropping application data: {err}"));
                AppDataStatus::Rejected
            }
        }
    }
}
