use crate::packet::Packet;

/// Services the channel simulator provides to a protocol endpoint.
/// Every call is scoped to the endpoint whose callback is running.
pub trait SystemContext {
    /// Hand a packet to the unreliable, order-preserving channel.
    fn send_packet(&mut self, packet: Packet);

    /// Start (or restart) the timer `timer_id` to fire after `delay_ms`.
    /// Restarting a running timer replaces it; it will fire at most once.
    fn start_timer(&mut self, delay_ms: u64, timer_id: u32);

    /// Stop a timer. Stopping a timer that is not running is a no-op.
    fn cancel_timer(&mut self, timer_id: u32);

    /// Deliver a payload to the local application.
    fn deliver_data(&mut self, data: &[u8]);

    /// Log a message to the simulator's debug output.
    fn log(&mut self, message: &str);

    /// Current simulation time in ms.
    fn now(&self) -> u64;

    /// Record a numeric sample (e.g. outstanding window) for the run report.
    fn record_metric(&mut self, _name: &str, _value: f64) {}
}

/// Callback entry points of a protocol endpoint. The simulator never calls
/// these concurrently or re-entrantly on the same instance.
pub trait TransportProtocol {
    /// Called when the simulation starts.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when a packet arrives from the channel.
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet);

    /// Called when a timer started through the context expires.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32);

    /// Called when the local application submits data for reliable transfer.
    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, data: &[u8]) -> AppDataStatus;
}

/// Answer of an endpoint to a chunk of application data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDataStatus {
    /// Taken over for delivery.
    Accepted,
    /// Not taken right now (e.g. the send window is full); offer it again later.
    Busy,
    /// Never acceptable (e.g. oversized, or the endpoint does not send data).
    Rejected,
}

impl<T: TransportProtocol + ?Sized> TransportProtocol for Box<T> {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        (**self).init(ctx)
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        (**self).on_packet(ctx, packet)
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        (**self).on_timer(ctx, timer_id)
    }

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, data: &[u8]) -> AppDataStatus {
        (**self).on_app_data(ctx, data)
    }
}
