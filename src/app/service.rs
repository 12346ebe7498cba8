//! Lock service: the hexagonal core.
//!
//! [`LockService`] owns the FSM, its context, the transport and the
//! clock.  Each tick it drains received notifications into the context,
//! runs the state machine, then applies what the handlers asked for:
//! link open/close and outbound frames.  Events go to an [`EventSink`]
//! passed at the call site.
//!
//! ```text
//!  LockControl ──▶ SharedState ──▶ ┌──────────────────────┐ ──▶ EventSink
//!                                  │     LockService       │
//!  LockTransport ◀── frames ───────│  FSM · codec · tracker │
//!        │                         └──────────────────────┘
//!        └── notify ──▶ Inbox ──────────────▲
//! ```

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::LockConfig;
use crate::error::Error;
use crate::fsm::context::{FsmContext, LinkRequest};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::protocol::codec::{self, ObfuscationRng};
use crate::protocol::commands::OutboundCommand;
use crate::protocol::reply::{LockReply, LockStatus, Outcome};

use super::commands::{PendingCommand, TargetState};
use super::control::{LockControl, LockSnapshot, SharedState};
use super::events::LockEvent;
use super::inbox::Inbox;
use super::ports::{Clock, EventSink, LinkState, LockTransport};

/// Whether the task loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Shutdown,
}

// ───────────────────────────────────────────────────────────────
// LockService
// ───────────────────────────────────────────────────────────────

pub struct LockService<T: LockTransport, C: Clock> {
    fsm: Fsm,
    ctx: FsmContext,
    transport: T,
    clock: C,
    shared: Arc<SharedState>,
    inbox: Arc<Inbox>,
    rng: ObfuscationRng,
    tick_count: u64,
}

impl<T: LockTransport, C: Clock> LockService<T, C> {
    /// Construct the service.  The target starts at `Enable`.
    ///
    /// Does **not** start the FSM: call [`start`](Self::start) or
    /// [`run`](Self::run) next.
    pub fn new(config: LockConfig, mut transport: T, clock: C) -> Result<Self, Error> {
        config.validate()?;

        let inbox = Arc::new(Inbox::new());
        transport.on_notify(inbox.clone());

        let rng = ObfuscationRng::from_seed(clock.now_ms());
        let target = TargetState::default();
        let shared = Arc::new(SharedState::new(target));
        let ctx = FsmContext::new(config, target);
        let fsm = Fsm::new(build_state_table(), StateId::Invalid);

        Ok(Self {
            fsm,
            ctx,
            transport,
            clock,
            shared,
            inbox,
            rng,
            tick_count: 0,
        })
    }

    /// A handle for driving this service from other threads.
    pub fn control(&self) -> LockControl<C>
    where
        C: Clone,
    {
        LockControl::new(
            self.shared.clone(),
            self.clock.clone(),
            self.ctx.config.default_settings,
            self.ctx.config.wait_poll_interval_ms,
        )
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.ctx.now_ms = self.clock.now_ms();
        self.ctx.target = self.shared.target();
        self.fsm.start(&mut self.ctx);
        self.publish();
        sink.emit(&LockEvent::Started(self.fsm.current_state()));
        info!("LockService started in {:?}", self.fsm.current_state());
    }

    /// Tick until a Shutdown request has been carried out.
    pub fn run(&mut self, sink: &mut impl EventSink) {
        self.start(sink);
        while self.tick(sink) == TickOutcome::Continue {
            self.clock.sleep_ms(self.next_delay_ms());
        }
        info!("LockService stopped after {} ticks", self.tick_count);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one cycle: inputs → replies → FSM → link → frames → events.
    pub fn tick(&mut self, sink: &mut impl EventSink) -> TickOutcome {
        self.tick_count += 1;
        let prev_state = self.fsm.current_state();

        // 1. Inputs
        self.ctx.now_ms = self.clock.now_ms();
        self.ctx.link = self.transport.link_state();
        self.ctx.target = self.shared.target();
        if self.shared.take_drop_session() {
            if matches!(prev_state, StateId::Connecting | StateId::Connected) {
                self.ctx.force_disconnect = true;
            } else {
                debug!("Session drop ignored in {:?}", prev_state);
            }
        }

        // 2. Replies received since the last tick
        self.drain_inbox(prev_state);

        // 3. Hand over the next intent once the previous one is done
        if prev_state == StateId::Connected
            && self.ctx.target == TargetState::Enable
            && !self.ctx.is_busy()
            && self.ctx.pending.is_none()
        {
            self.ctx.pending = self.shared.take_pending();
        }

        // 4. FSM tick (pure state logic)
        self.fsm.tick(&mut self.ctx);

        if core::mem::take(&mut self.ctx.clear_pending_slot) {
            self.shared.clear_pending();
        }

        // 5. Link requests and outbound frames
        self.apply_link_request();
        self.flush_outbox();

        // 6. Events
        for event in core::mem::take(&mut self.ctx.events) {
            sink.emit(&event);
        }
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&LockEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }
        self.publish();

        if self.ctx.shutdown {
            sink.emit(&LockEvent::Stopped);
            TickOutcome::Shutdown
        } else {
            TickOutcome::Continue
        }
    }

    /// Delay before the next tick, from the current state and activity.
    pub fn next_delay_ms(&self) -> u32 {
        let cfg = &self.ctx.config;
        match self.fsm.current_state() {
            StateId::Connecting => cfg.link_poll_interval_ms,
            StateId::Connected => {
                if let Some(attempt) = self.ctx.unlock {
                    let elapsed = self.ctx.ms_since(attempt.last_sent_ms);
                    let remaining = u64::from(cfg.unlock_retry_interval_ms).saturating_sub(elapsed);
                    remaining.clamp(1, u64::from(cfg.tick_interval_ms)) as u32
                } else if self.ctx.query.is_some() {
                    cfg.query_poll_interval_ms
                } else {
                    cfg.tick_interval_ms
                }
            }
            StateId::Disconnected if self.ctx.target == TargetState::Disable => {
                cfg.idle_poll_interval_ms
            }
            StateId::Invalid | StateId::Disconnecting | StateId::Disconnected => {
                cfg.tick_interval_ms
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn snapshot(&self) -> LockSnapshot {
        self.shared.snapshot()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Current session key (0 when no session is established).
    pub fn session_key(&self) -> u8 {
        self.ctx.session_key
    }

    pub fn config(&self) -> &LockConfig {
        &self.ctx.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Internal ──────────────────────────────────────────────

    fn drain_inbox(&mut self, state: StateId) {
        while let Ok(frame) = self.inbox.try_receive() {
            match codec::decode(&frame, self.ctx.session_key) {
                Ok(msg) => {
                    let reply = LockReply::parse(&msg);
                    self.apply_reply(reply, state);
                }
                Err(e) => debug!("Dropped notification: {}", e),
            }
        }
    }

    fn apply_reply(&mut self, reply: LockReply, state: StateId) {
        let ctx = &mut self.ctx;
        // Acks and forced disconnects belong to the live session only.
        let in_session = matches!(state, StateId::Connecting | StateId::Connected);
        match reply {
            LockReply::SessionKey { key, accepted } => {
                if state != StateId::Connecting || ctx.key_confirmed {
                    debug!("Unexpected key reply in {:?}", state);
                } else if accepted && key != 0 {
                    info!("Session key obtained: 0x{:02x}", key);
                    ctx.session_key = key;
                    ctx.key_confirmed = true;
                } else {
                    warn!("Key exchange rejected (key 0x{:02x})", key);
                }
            }
            LockReply::Unlock(Outcome::Success) if in_session => {
                info!("Lock reports unlock");
                ctx.ack = Some(PendingCommand::UnlockAck);
            }
            LockReply::Unlock(outcome) => warn!("Unlock reply in {:?}: {:?}", state, outcome),
            LockReply::CommandError(violation) => {
                if violation.forces_disconnect() && in_session {
                    warn!("Lock error: {}, dropping session", violation);
                    ctx.force_disconnect = true;
                } else {
                    warn!("Lock error: {}", violation);
                }
            }
            LockReply::Lock(Outcome::Success) if in_session => {
                info!("Lock reports locked");
                ctx.tracker.expected = LockStatus::Locked;
                ctx.ack = Some(PendingCommand::LockAck);
                ctx.emit(LockEvent::Locked);
            }
            LockReply::Lock(outcome) => warn!("Lock reply in {:?}: {:?}", state, outcome),
            LockReply::Status { battery_mv, status } => {
                debug!("Status: {:?}, battery {} mV", status, battery_mv);
                ctx.tracker.apply_status(battery_mv, status);
            }
            LockReply::RfidRegistration(reg) => {
                info!("RFID registration: {:?}", reg);
                ctx.emit(LockEvent::RfidRegistration(reg));
            }
            LockReply::RfidDeletion(del) => {
                info!("RFID deletion: {:?}", del);
                ctx.emit(LockEvent::RfidDeletion(del));
            }
            LockReply::Settings(report) => {
                info!("Lock settings: {:?}", report);
                ctx.emit(LockEvent::Settings(report));
            }
            LockReply::Unhandled(code) => debug!("Ignoring reply {}", code),
            LockReply::Unknown(code) => debug!("Unknown reply command 0x{:02x}", code),
            LockReply::Malformed(code) => warn!("Malformed {} reply", code),
        }
    }

    fn apply_link_request(&mut self) {
        match self.ctx.link_request.take() {
            Some(LinkRequest::Open) => {
                if let Err(e) = self.transport.open(&self.ctx.config.mac) {
                    warn!("Link open failed: {}", e);
                }
            }
            Some(LinkRequest::Close) => self.transport.close(),
            None => {}
        }
    }

    fn flush_outbox(&mut self) {
        for cmd in core::mem::take(&mut self.ctx.outbox) {
            let key = match cmd {
                OutboundCommand::SessionKeyExchange(_) => 0,
                _ => self.ctx.session_key,
            };
            let frame = match self
                .rng
                .encode(key, cmd.code().code(), &cmd.payload())
            {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Cannot encode {}: {}", cmd.code(), e);
                    continue;
                }
            };
            if let Err(e) = self.transport.send(&frame) {
                warn!("Write of {} failed: {}", cmd.code(), e);
                if self.ctx.link == LinkState::Ready {
                    self.ctx.force_disconnect = true;
                }
                break;
            }
        }
    }

    fn publish(&self) {
        self.shared.publish(LockSnapshot {
            state: self.fsm.current_state(),
            status: self.ctx.tracker.status,
            expected: self.ctx.tracker.expected,
            battery_mv: self.ctx.tracker.battery_mv,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MacAddress;
    use crate::error::TransportError;
    use core::cell::Cell;

    struct NullTransport {
        link: LinkState,
        opened: u32,
        sent: Vec<Vec<u8>>,
    }

    impl LockTransport for NullTransport {
        fn on_notify(&mut self, _inbox: Arc<Inbox>) {}
        fn open(&mut self, _address: &MacAddress) -> Result<(), TransportError> {
            self.opened += 1;
            Ok(())
        }
        fn link_state(&self) -> LinkState {
            self.link
        }
        fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            self.sent.push(frame.to_vec());
            Ok(())
        }
        fn close(&mut self) {
            self.link = LinkState::Down;
        }
    }

    #[derive(Default)]
    struct FixedClock(Cell<u64>);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
        fn sleep_ms(&self, ms: u32) {
            self.0.set(self.0.get() + u64::from(ms));
        }
    }

    struct Events(Vec<LockEvent>);

    impl EventSink for Events {
        fn emit(&mut self, event: &LockEvent) {
            self.0.push(event.clone());
        }
    }

    fn service() -> LockService<NullTransport, FixedClock> {
        let config = LockConfig::new(&[1, 2, 3, 4, 5, 6], "test1234").unwrap();
        let transport = NullTransport {
            link: LinkState::Connecting,
            opened: 0,
            sent: Vec::new(),
        };
        LockService::new(config, transport, FixedClock::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = LockConfig::default();
        let transport = NullTransport {
            link: LinkState::Down,
            opened: 0,
            sent: Vec::new(),
        };
        assert!(matches!(
            LockService::new(config, transport, FixedClock::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn first_tick_opens_link() {
        let mut svc = service();
        let mut events = Events(Vec::new());
        svc.start(&mut events);
        assert_eq!(events.0, vec![LockEvent::Started(StateId::Invalid)]);
        svc.tick(&mut events);
        assert_eq!(svc.state(), StateId::Connecting);
        assert_eq!(svc.transport().opened, 1);
        assert_eq!(svc.next_delay_ms(), 250);
    }

    #[test]
    fn key_exchange_sent_with_zero_key_when_ready() {
        let mut svc = service();
        let mut events = Events(Vec::new());
        svc.start(&mut events);
        svc.tick(&mut events);
        svc.transport_mut().link = LinkState::Ready;
        svc.tick(&mut events);
        let sent = &svc.transport().sent;
        assert_eq!(sent.len(), 1);
        let msg = codec::decode(&sent[0], 0).unwrap();
        assert_eq!(msg.key, 0);
        assert_eq!(msg.cmd, 0x01);
        assert_eq!(&msg.payload[..], b"test1234");
    }

    #[test]
    fn idle_interval_only_while_disabled() {
        let mut svc = service();
        let mut events = Events(Vec::new());
        svc.start(&mut events);
        assert_eq!(svc.next_delay_ms(), 1000);

        svc.tick(&mut events);
        svc.shared.set_target(TargetState::Disable);
        svc.tick(&mut events);
        assert_eq!(svc.state(), StateId::Disconnecting);
        assert_eq!(svc.next_delay_ms(), 1000);

        svc.tick(&mut events);
        assert_eq!(svc.state(), StateId::Disconnected);
        assert_eq!(svc.next_delay_ms(), 10);
    }

    #[test]
    fn shutdown_before_connect_stops() {
        let mut svc = service();
        let mut events = Events(Vec::new());
        svc.shared.set_target(TargetState::Shutdown);
        svc.start(&mut events);
        assert_eq!(svc.tick(&mut events), TickOutcome::Shutdown);
        assert_eq!(svc.state(), StateId::Disconnected);
        assert_eq!(events.0.last(), Some(&LockEvent::Stopped));
        assert_eq!(svc.transport().opened, 0);
    }
}
