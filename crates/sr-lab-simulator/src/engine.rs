use crate::trace::{LinkStats, SimulationReport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sr_lab_abstract::{AppDataStatus, ConfigError, Message, PAYLOAD_SIZE, Packet, SimConfig};
use sr_lab_abstract::{SystemContext, TransportProtocol};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }
}

#[derive(Debug)]
pub enum EventType {
    PacketArrival {
        to: NodeId,
        packet: Packet,
    },
    TimerExpiry {
        node: NodeId,
        timer_id: u32,
        generation: u64,
    },
    AppSend {
        data: Vec<u8>,
    },
}

/// Queue entry. Ordered by `(time, id)`; `id` keeps same-time events in
/// scheduling order.
#[derive(Debug)]
struct Event {
    time: u64,
    id: u64,
    kind: EventType,
}

impl Event {
    fn key(&self) -> (u64, u64) {
        (self.time, self.id)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// One line of the link timeline.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
enum TimerOp {
    Start { delay: u64, id: u32 },
    Cancel { id: u32 },
}

/// Side effects collected while one endpoint callback runs.
#[derive(Default)]
struct Effects {
    packets: Vec<Packet>,
    // call order matters: start-then-cancel and cancel-then-start differ
    timers: Vec<TimerOp>,
    logs: Vec<String>,
    deliveries: Vec<Vec<u8>>,
    samples: Vec<(String, f64)>,
}

/// The `SystemContext` an endpoint sees during a callback.
struct CallbackContext<'a> {
    effects: &'a mut Effects,
    now: u64,
}

impl SystemContext for CallbackContext<'_> {
    fn send_packet(&mut self, packet: Packet) {
        self.effects.packets.push(packet);
    }

    fn start_timer(&mut self, delay_ms: u64, timer_id: u32) {
        self.effects.timers.push(TimerOp::Start {
            delay: delay_ms,
            id: timer_id,
        });
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.effects.timers.push(TimerOp::Cancel { id: timer_id });
    }

    fn deliver_data(&mut self, data: &[u8]) {
        self.effects.deliveries.push(data.to_vec());
    }

    fn log(&mut self, message: &str) {
        self.effects.logs.push(message.to_owned());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.effects.samples.push((name.to_owned(), value));
    }
}

/// Which deterministic fault to apply to a matching packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Drop,
    Corrupt,
}

/// Discrete-event simulation of one sender, one receiver and the lossy,
/// order-preserving channel between them.
pub struct Simulator<S = Box<dyn TransportProtocol>, R = Box<dyn TransportProtocol>> {
    time: u64,
    queue: BinaryHeap<Reverse<Event>>,
    next_event_id: u64,

    config: SimConfig,
    rng: StdRng,

    pub sender: S,
    pub receiver: R,

    /// Everything the sending application handed over, in submission order.
    pub submitted_data: Vec<Vec<u8>>,
    /// The subset of `submitted_data` the sender accepted, in acceptance order.
    pub accepted_data: Vec<Vec<u8>>,
    pub delivered_data: Vec<Vec<u8>>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    /// Times the sender answered `Busy`.
    pub app_busy_count: u32,
    /// Data the sender refused outright, or dropped while busy with `retry_busy` off.
    pub app_dropped_count: u32,

    /// Channel counters for Sender -> Receiver.
    pub forward: LinkStats,
    /// Channel counters for Receiver -> Sender.
    pub reverse: LinkStats,

    /// Samples from `SystemContext::record_metric`, keyed by metric name.
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    sender_seq_faults: Vec<(u32, Fault)>,
    receiver_ack_faults: Vec<(u32, Fault)>,

    /// Filled only after `set_record_link_events(true)`.
    pub link_events: Vec<LinkEventSummary>,
    record_link_events: bool,

    /// Bumped on every start or cancel; an expiry carrying an older value is stale.
    timer_generations: HashMap<(NodeId, u32), u64>,

    /// Latest scheduled arrival per destination; keeps each direction FIFO.
    last_arrival: HashMap<NodeId, u64>,

    /// Application data waiting for the sender to stop answering `Busy`.
    app_backlog: VecDeque<Vec<u8>>,
    retry_busy: bool,
}

impl<S: TransportProtocol, R: TransportProtocol> Simulator<S, R> {
    /// Fails if `config` does not pass [`SimConfig::validate`].
    pub fn new(config: SimConfig, sender: S, receiver: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            time: 0,
            queue: BinaryHeap::new(),
            next_event_id: 0,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            sender,
            receiver,
            submitted_data: Vec::new(),
            accepted_data: Vec::new(),
            delivered_data: Vec::new(),
            sender_packet_count: 0,
            receiver_packet_count: 0,
            app_busy_count: 0,
            app_dropped_count: 0,
            forward: LinkStats::default(),
            reverse: LinkStats::default(),
            metrics: HashMap::new(),
            sender_seq_faults: Vec::new(),
            receiver_ack_faults: Vec::new(),
            link_events: Vec::new(),
            record_link_events: false,
            timer_generations: HashMap::new(),
            last_arrival: HashMap::new(),
            app_backlog: VecDeque::new(),
            retry_busy: true,
        })
    }

    /// Whether data refused with `Busy` is queued and offered again (default)
    /// or dropped and counted.
    pub fn set_retry_busy(&mut self, retry: bool) {
        self.retry_busy = retry;
    }

    /// Keep a per-packet timeline in `link_events` (off by default; it grows
    /// with every packet).
    pub fn set_record_link_events(&mut self, record: bool) {
        self.record_link_events = record;
    }

    /// Drop the next data packet the sender transmits with sequence number `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: u32) {
        self.sender_seq_faults.push((seq, Fault::Drop));
    }

    /// Drop the next ACK the receiver transmits for `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: u32) {
        self.receiver_ack_faults.push((ack, Fault::Drop));
    }

    /// Corrupt the next data packet the sender transmits with sequence number `seq`.
    pub fn add_corrupt_sender_seq_once(&mut self, seq: u32) {
        self.sender_seq_faults.push((seq, Fault::Corrupt));
    }

    /// Corrupt the next ACK the receiver transmits for `ack`.
    pub fn add_corrupt_receiver_ack_once(&mut self, ack: u32) {
        self.receiver_ack_faults.push((ack, Fault::Corrupt));
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// `(time_ms, value)` samples recorded under `name`.
    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(Vec::as_slice)
    }

    fn schedule(&mut self, time: u64, kind: EventType) {
        let id = self.next_event_id;
        self.next_event_id += 1;
        self.queue.push(Reverse(Event { time, id, kind }));
    }

    pub fn schedule_app_send(&mut self, time: u64, data: Vec<u8>) {
        self.schedule(time, EventType::AppSend { data });
    }

    /// Schedule `count` generated messages, one every `interval` ms from `start`.
    /// Message `i` is [`PAYLOAD_SIZE`] copies of the letter `'a' + i % 26`.
    pub fn schedule_messages(&mut self, start: u64, count: u32, interval: u64) {
        for i in 0..count {
            let letter = b'a' + (i % 26) as u8;
            let time = start + u64::from(i) * interval;
            self.schedule_app_send(time, Message::filled(letter).as_bytes().to_vec());
        }
    }

    /// Run a sender callback and apply what it did.
    fn on_sender<T>(&mut self, callback: impl FnOnce(&mut S, &mut dyn SystemContext) -> T) -> T {
        let mut effects = Effects::default();
        let mut ctx = CallbackContext {
            effects: &mut effects,
            now: self.time,
        };
        let out = callback(&mut self.sender, &mut ctx);
        self.apply(NodeId::Sender, effects);
        out
    }

    /// Run a receiver callback and apply what it did.
    fn on_receiver<T>(&mut self, callback: impl FnOnce(&mut R, &mut dyn SystemContext) -> T) -> T {
        let mut effects = Effects::default();
        let mut ctx = CallbackContext {
            effects: &mut effects,
            now: self.time,
        };
        let out = callback(&mut self.receiver, &mut ctx);
        self.apply(NodeId::Receiver, effects);
        out
    }

    pub fn init(&mut self) {
        self.on_sender(|sender, ctx| sender.init(ctx));
        self.on_receiver(|receiver, ctx| receiver.init(ctx));
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(event)| event.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.queue.len()
    }

    /// Application data still waiting for the sender.
    pub fn backlog_len(&self) -> usize {
        self.app_backlog.len()
    }

    /// Process the next event. Returns false once the queue is empty or the
    /// next event lies beyond the configured time limit.
    pub fn step(&mut self) -> bool {
        let Some(next) = self.peek_next_event_time() else {
            return false;
        };
        if let Some(limit) = self.config.time_limit
            && next > limit
        {
            debug!("Time limit {} reached, stopping", limit);
            return false;
        }
        let Some(Reverse(event)) = self.queue.pop() else {
            return false;
        };

        self.time = event.time;
        debug!("t={} {:?}", self.time, event.kind);

        match event.kind {
            EventType::PacketArrival { to: NodeId::Sender, packet } => {
                self.on_sender(|sender, ctx| sender.on_packet(ctx, packet));
                self.flush_backlog();
            }
            EventType::PacketArrival { to: NodeId::Receiver, packet } => {
                self.on_receiver(|receiver, ctx| receiver.on_packet(ctx, packet));
            }
            EventType::TimerExpiry {
                node,
                timer_id,
                generation,
            } => {
                if self.timer_generations.get(&(node, timer_id)) != Some(&generation) {
                    debug!("Skipping stale expiry of {:?} timer {}", node, timer_id);
                    return true;
                }
                match node {
                    NodeId::Sender => {
                        self.on_sender(|sender, ctx| sender.on_timer(ctx, timer_id));
                        self.flush_backlog();
                    }
                    NodeId::Receiver => {
                        self.on_receiver(|receiver, ctx| receiver.on_timer(ctx, timer_id));
                    }
                }
            }
            EventType::AppSend { data } => self.submit_app_data(data),
        }
        true
    }

    fn submit_app_data(&mut self, data: Vec<u8>) {
        self.submitted_data.push(data.clone());
        if self.retry_busy && !self.app_backlog.is_empty() {
            // stay behind data that is already waiting
            self.app_backlog.push_back(data);
            self.flush_backlog();
            return;
        }
        match self.offer_app_data(&data) {
            AppDataStatus::Accepted => self.accepted_data.push(data),
            AppDataStatus::Busy if self.retry_busy => self.app_backlog.push_back(data),
            AppDataStatus::Busy | AppDataStatus::Rejected => self.app_dropped_count += 1,
        }
    }

    fn offer_app_data(&mut self, data: &[u8]) -> AppDataStatus {
        let status = self.on_sender(|sender, ctx| sender.on_app_data(ctx, data));
        if status == AppDataStatus::Busy {
            self.app_busy_count += 1;
        }
        status
    }

    /// Offer queued application data until the sender pushes back.
    fn flush_backlog(&mut self) {
        while let Some(data) = self.app_backlog.pop_front() {
            match self.offer_app_data(&data) {
                AppDataStatus::Accepted => self.accepted_data.push(data),
                AppDataStatus::Busy => {
                    self.app_backlog.push_front(data);
                    break;
                }
                AppDataStatus::Rejected => self.app_dropped_count += 1,
            }
        }
    }

    /// Serializable snapshot of the run so far.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration_ms: self.time,
            submitted_data: self.submitted_data.clone(),
            accepted_data: self.accepted_data.clone(),
            delivered_data: self.delivered_data.clone(),
            sender_packet_count: self.sender_packet_count,
            receiver_packet_count: self.receiver_packet_count,
            app_busy_count: self.app_busy_count,
            app_dropped_count: self.app_dropped_count,
            backlog: self.app_backlog.len(),
            forward: self.forward,
            reverse: self.reverse,
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
        info!(
            "Simulation stopped at {}ms: {} delivered, {} sender packets, {} still queued",
            self.time,
            self.delivered_data.len(),
            self.sender_packet_count,
            self.app_backlog.len()
        );
    }

    fn note(&mut self, description: impl FnOnce() -> String) {
        if !self.record_link_events {
            return;
        }
        let description = description();
        self.link_events.push(LinkEventSummary {
            time: self.time,
            description,
        });
    }

    fn apply(&mut self, node: NodeId, effects: Effects) {
        for (name, value) in effects.samples {
            self.metrics.entry(name).or_default().push((self.time, value));
        }
        for line in effects.logs {
            info!("[{:?}] {}", node, line);
        }
        for data in effects.deliveries {
            debug!("[{:?}] delivered {} bytes", node, data.len());
            self.note(|| format!("[{:?}] DELIVER {} bytes", node, data.len()));
            self.delivered_data.push(data);
        }
        for op in effects.timers {
            self.apply_timer_op(node, op);
        }
        for packet in effects.packets {
            self.transmit(node, packet);
        }
    }

    fn apply_timer_op(&mut self, node: NodeId, op: TimerOp) {
        let id = match op {
            TimerOp::Start { id, .. } | TimerOp::Cancel { id } => id,
        };
        let generation = self.timer_generations.entry((node, id)).or_insert(0);
        *generation += 1;
        if let TimerOp::Start { delay, id } = op {
            let generation = *generation;
            self.schedule(
                self.time + delay,
                EventType::TimerExpiry {
                    node,
                    timer_id: id,
                    generation,
                },
            );
        }
    }

    /// Push one packet through the channel: count it, then drop, corrupt or
    /// schedule its arrival behind the previous packet in the same direction.
    fn transmit(&mut self, from: NodeId, mut packet: Packet) {
        let to = from.peer();
        match from {
            NodeId::Sender => self.sender_packet_count += 1,
            NodeId::Receiver => self.receiver_packet_count += 1,
        }
        self.link_stats(from).sent += 1;
        let label = format!(
            "[{:?}->{:?}] seq={} ack={:?}",
            from, to, packet.seqnum, packet.acknum
        );

        let fault = self.take_fault(from, &packet);
        let lost = match fault {
            Some(Fault::Drop) => true,
            Some(Fault::Corrupt) => false,
            None => self.rng.random::<f64>() < self.config.loss_rate,
        };
        if lost {
            self.link_stats(from).lost += 1;
            let cause = if fault.is_some() { "injected" } else { "random" };
            self.note(|| format!("{label} LOST ({cause})"));
            debug!("{label} lost");
            return;
        }

        if fault == Some(Fault::Corrupt) || self.rng.random::<f64>() < self.config.corrupt_rate {
            self.link_stats(from).corrupted += 1;
            self.note(|| format!("{label} CORRUPTED"));
            debug!("{label} corrupted");
            self.corrupt(&mut packet);
        }

        let latency = self
            .rng
            .random_range(self.config.min_latency..=self.config.max_latency);
        let previous = self.last_arrival.get(&to).copied().unwrap_or(0);
        let arrival = (self.time + latency).max(previous);
        self.last_arrival.insert(to, arrival);

        self.link_stats(from).carried += 1;
        self.note(|| format!("{label} SENT, arrives at {arrival}ms"));
        self.schedule(arrival, EventType::PacketArrival { to, packet });
    }

    fn take_fault(&mut self, from: NodeId, packet: &Packet) -> Option<Fault> {
        let (faults, key) = match from {
            NodeId::Sender if !packet.is_ack() => (&mut self.sender_seq_faults, packet.seqnum),
            NodeId::Receiver => (&mut self.receiver_ack_faults, packet.acknum?),
            NodeId::Sender => return None,
        };
        let pos = faults.iter().position(|(k, _)| *k == key)?;
        Some(faults.remove(pos).1)
    }

    /// Alter exactly one field: a payload byte 3/4 of the time, otherwise
    /// seqnum or acknum. The checksum is left untouched.
    fn corrupt(&mut self, packet: &mut Packet) {
        let roll = self.rng.random::<f64>();
        if roll < 0.75 {
            let idx = self.rng.random_range(0..PAYLOAD_SIZE);
            let mask = self.rng.random_range(1..=u8::MAX);
            packet.payload[idx] ^= mask;
        } else if roll < 0.875 {
            let delta = self.rng.random_range(1..=999_999);
            packet.seqnum = packet.seqnum.wrapping_add(delta);
        } else {
            let delta = self.rng.random_range(1..=999_999);
            packet.acknum = Some(packet.wire_acknum().wrapping_add(delta));
        }
    }

    fn link_stats(&mut self, from: NodeId) -> &mut LinkStats {
        match from {
            NodeId::Sender => &mut self.forward,
            NodeId::Receiver => &mut self.reverse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Simulator;
    use sr_lab_abstract::{
        AppDataStatus, ConfigError, Message, Packet, SimConfig, SystemContext, TransportProtocol,
    };

    #[derive(Default)]
    struct TimerProbe {
        fired: Vec<(u64, u32)>,
    }

    impl TransportProtocol for TimerProbe {
        fn init(&mut self, ctx: &mut dyn SystemContext) {
            // 0 is cancelled by 1 before it can fire
            ctx.start_timer(10, 0);
            ctx.start_timer(5, 1);
            // 2 is restarted: only the later deadline may fire
            ctx.start_timer(3, 2);
            ctx.start_timer(8, 2);
            // 3 is started and cancelled in the same callback
            ctx.start_timer(4, 3);
            ctx.cancel_timer(3);
            // cancelling an idle timer is a no-op
            ctx.cancel_timer(42);
        }

        fn on_packet(&mut self, _ctx: &mut dyn SystemContext, _packet: Packet) {}

        fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
            self.fired.push((ctx.now(), timer_id));
            if timer_id == 1 {
                ctx.cancel_timer(0);
            }
        }

        fn on_app_data(&mut self, _ctx: &mut dyn SystemContext, _data: &[u8]) -> AppDataStatus {
            AppDataStatus::Rejected
        }
    }

    #[test]
    fn timers_cancel_and_restart_without_double_fire() {
        let mut simulator =
            Simulator::new(SimConfig::default(), TimerProbe::default(), TimerProbe::default())
                .unwrap();
        simulator.run_until_complete();

        assert_eq!(simulator.sender.fired, vec![(5, 1), (8, 2)]);
        assert_eq!(simulator.receiver.fired, vec![(5, 1), (8, 2)]);
    }

    /// Sends every app message immediately and records arrivals.
    #[derive(Default)]
    struct Blaster {
        next: u32,
        arrivals: Vec<u32>,
    }

    impl TransportProtocol for Blaster {
        fn on_packet(&mut self, _ctx: &mut dyn SystemContext, packet: Packet) {
            self.arrivals.push(packet.seqnum);
        }

        fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {}

        fn on_app_data(&mut self, ctx: &mut dyn SystemContext, data: &[u8]) -> AppDataStatus {
            let Ok(message) = Message::from_slice(data) else {
                return AppDataStatus::Rejected;
            };
            ctx.send_packet(Packet::data(self.next, &message));
            self.next += 1;
            AppDataStatus::Accepted
        }
    }

    #[test]
    fn channel_never_reorders() {
        let config = SimConfig {
            min_latency: 1,
            max_latency: 500,
            seed: 7,
            ..Default::default()
        };
        let mut simulator =
            Simulator::new(config, Blaster::default(), Blaster::default()).unwrap();
        simulator.schedule_messages(0, 200, 1);
        simulator.run_until_complete();

        let expected: Vec<u32> = (0..200).collect();
        assert_eq!(simulator.receiver.arrivals, expected);
    }

    #[test]
    fn corruption_is_always_detectable() {
        let config = SimConfig {
            corrupt_rate: 1.0,
            seed: 3,
            ..Default::default()
        };
        let mut simulator =
            Simulator::new(config, Blaster::default(), Recorder::default()).unwrap();
        simulator.schedule_messages(0, 300, 1);
        simulator.run_until_complete();

        assert_eq!(simulator.receiver.packets.len(), 300);
        assert!(simulator.receiver.packets.iter().all(Packet::is_corrupted));
        assert_eq!(simulator.forward.corrupted, 300);
    }

    #[derive(Default)]
    struct Recorder {
        packets: Vec<Packet>,
    }

    impl TransportProtocol for Recorder {
        fn on_packet(&mut self, _ctx: &mut dyn SystemContext, packet: Packet) {
            self.packets.push(packet);
        }

        fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {}

        fn on_app_data(&mut self, _ctx: &mut dyn SystemContext, _data: &[u8]) -> AppDataStatus {
            AppDataStatus::Rejected
        }
    }

    #[test]
    fn deterministic_faults_hit_first_match_only() {
        let mut simulator =
            Simulator::new(SimConfig::default(), Blaster::default(), Recorder::default())
                .unwrap();
        simulator.add_drop_sender_seq_once(1);
        simulator.add_corrupt_sender_seq_once(2);
        simulator.schedule_messages(0, 4, 10);
        simulator.run_until_complete();

        let seqs: Vec<u32> = simulator.receiver.packets.iter().map(|p| p.seqnum).collect();
        assert_eq!(simulator.receiver.packets.len(), 3);
        assert!(!seqs.contains(&1));
        assert_eq!(simulator.forward.lost, 1);
        assert_eq!(simulator.forward.corrupted, 1);
        assert_eq!(
            simulator.receiver.packets.iter().filter(|p| p.is_corrupted()).count(),
            1
        );
    }

    #[test]
    fn time_limit_stops_the_run() {
        let config = SimConfig {
            time_limit: Some(50),
            ..Default::default()
        };
        let mut simulator =
            Simulator::new(config, Blaster::default(), Recorder::default()).unwrap();
        simulator.schedule_messages(0, 10, 20);
        simulator.run_until_complete();

        assert!(simulator.current_time() <= 50);
        assert_eq!(simulator.submitted_data.len(), 3);
        assert!(simulator.remaining_events() > 0);
    }

    #[test]
    fn generated_messages_cycle_through_letters() {
        let mut simulator =
            Simulator::new(SimConfig::default(), Blaster::default(), Recorder::default())
                .unwrap();
        simulator.schedule_messages(0, 27, 1);
        simulator.run_until_complete();

        assert_eq!(simulator.submitted_data[0], vec![b'a'; 20]);
        assert_eq!(simulator.submitted_data[25], vec![b'z'; 20]);
        assert_eq!(simulator.submitted_data[26], vec![b'a'; 20]);
    }

    #[test]
    fn rejects_inverted_latency_range() {
        let config = SimConfig {
            min_latency: 50,
            max_latency: 10,
            ..Default::default()
        };
        let result = Simulator::new(config, Blaster::default(), Recorder::default());
        assert_eq!(
            result.err(),
            Some(ConfigError::InvalidLatency { min: 50, max: 10 })
        );
    }

    #[test]
    fn rejects_rate_outside_unit_interval() {
        let config = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        let result = Simulator::new(config, Blaster::default(), Recorder::default());
        assert!(matches!(
            result.err(),
            Some(ConfigError::InvalidRate { name: "loss_rate", .. })
        ));
    }

    #[test]
    fn link_timeline_is_opt_in() {
        let mut quiet =
            Simulator::new(SimConfig::default(), Blaster::default(), Recorder::default())
                .unwrap();
        quiet.schedule_messages(0, 5, 1);
        quiet.run_until_complete();
        assert!(quiet.link_events.is_empty());

        let mut traced =
            Simulator::new(SimConfig::default(), Blaster::default(), Recorder::default())
                .unwrap();
        traced.set_record_link_events(true);
        traced.schedule_messages(0, 5, 1);
        traced.run_until_complete();
        assert_eq!(traced.link_events.len(), 5);
        assert!(traced.link_events.iter().all(|e| e.description.contains("SENT")));
    }

    /// Accepts one message, then answers `Busy` until a packet comes back.
    #[derive(Default)]
    struct OneAtATime {
        in_flight: bool,
        next: u32,
    }

    impl TransportProtocol for OneAtATime {
        fn on_packet(&mut self, _ctx: &mut dyn SystemContext, _packet: Packet) {
            self.in_flight = false;
        }

        fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {}

        fn on_app_data(&mut self, ctx: &mut dyn SystemContext, data: &[u8]) -> AppDataStatus {
            if self.in_flight {
                return AppDataStatus::Busy;
            }
            let Ok(message) = Message::from_slice(data) else {
                return AppDataStatus::Rejected;
            };
            ctx.record_metric("probe.sent", f64::from(self.next));
            ctx.send_packet(Packet::data(self.next, &message));
            self.next += 1;
            self.in_flight = true;
            AppDataStatus::Accepted
        }
    }

    /// Echoes every packet straight back.
    #[derive(Default)]
    struct Echo;

    impl TransportProtocol for Echo {
        fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
            ctx.send_packet(packet);
        }

        fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {}

        fn on_app_data(&mut self, _ctx: &mut dyn SystemContext, _data: &[u8]) -> AppDataStatus {
            AppDataStatus::Rejected
        }
    }

    #[test]
    fn busy_data_waits_in_backlog_until_sender_frees_up() {
        let mut simulator =
            Simulator::new(SimConfig::default(), OneAtATime::default(), Echo).unwrap();
        simulator.schedule_messages(0, 3, 0);
        simulator.init();

        // all three submissions share t=0; only the first is taken
        while simulator.peek_next_event_time() == Some(0) {
            simulator.step();
        }
        assert_eq!(simulator.backlog_len(), 2);
        assert_eq!(simulator.accepted_data.len(), 1);

        while simulator.step() {}
        assert_eq!(simulator.backlog_len(), 0);
        assert_eq!(simulator.accepted_data, simulator.submitted_data);
        let sent: Vec<f64> = simulator
            .metric_series("probe.sent")
            .unwrap()
            .iter()
            .map(|&(_, value)| value)
            .collect();
        assert_eq!(sent, vec![0.0, 1.0, 2.0]);
        assert!(simulator.metric_series("missing").is_none());
    }
}
