//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers: no closures, no
//! dynamic dispatch, no heap.  This is the classic embedded C FSM pattern
//! expressed in safe Rust.
//!
//! ```text
//!  INVALID ──[Enable]──▶ CONNECTING ──[key accepted]──▶ CONNECTED
//!     │                    │    ▲                          │
//!     │            [Disable/Shutdown]                [Disable/Shutdown,
//!     │                    │    │                     fatal error, link lost]
//!     │                    ▼    │                          │
//!     │               DISCONNECTING ◀──────────────────────┘
//!     │                    │    │
//!     │                    ▼  [Enable]
//!     └──[otherwise]──▶ DISCONNECTED
//! ```
//!
//! Unlock and explicit queries span several ticks.  While one is in
//! progress the Connected handler neither takes a new intent nor runs the
//! periodic status check, but Disable/Shutdown still interrupt it.

use super::context::{FsmContext, LinkRequest, QueryWait, UnlockAttempt};
use super::{StateDescriptor, StateId};
use crate::app::commands::{PendingCommand, TargetState};
use crate::app::events::LockEvent;
use crate::app::ports::LinkState;
use crate::protocol::commands::{OutboundCommand, UnlockRequest};
use crate::protocol::reply::LockStatus;
use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Invalid
        StateDescriptor {
            id: StateId::Invalid,
            name: "Invalid",
            on_enter: None,
            on_exit: None,
            on_update: invalid_update,
        },
        // Index 1: Connecting
        StateDescriptor {
            id: StateId::Connecting,
            name: "Connecting",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_update: connecting_update,
        },
        // Index 2: Connected
        StateDescriptor {
            id: StateId::Connected,
            name: "Connected",
            on_enter: Some(connected_enter),
            on_exit: Some(connected_exit),
            on_update: connected_update,
        },
        // Index 3: Disconnecting
        StateDescriptor {
            id: StateId::Disconnecting,
            name: "Disconnecting",
            on_enter: Some(disconnecting_enter),
            on_exit: None,
            on_update: disconnecting_update,
        },
        // Index 4: Disconnected
        StateDescriptor {
            id: StateId::Disconnected,
            name: "Disconnected",
            on_enter: Some(disconnected_enter),
            on_exit: None,
            on_update: disconnected_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  INVALID state: boot, nothing decided yet
// ═══════════════════════════════════════════════════════════════════════════

fn invalid_update(ctx: &mut FsmContext) -> Option<StateId> {
    match ctx.target {
        TargetState::Enable => Some(StateId::Connecting),
        TargetState::Disable | TargetState::Shutdown => Some(StateId::Disconnected),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING state: link setup and key exchange
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut FsmContext) {
    ctx.reset_session();
    // Nothing from an earlier session carries over.
    ctx.force_disconnect = false;
    ctx.ack = None;
    ctx.link_request = Some(LinkRequest::Open);
    info!("CONNECTING: opening link to {}", ctx.config.mac);
}

fn connecting_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.target.wants_disconnect() || ctx.force_disconnect {
        info!("CONNECTING: abandoned ({:?})", ctx.target);
        return Some(StateId::Disconnecting);
    }

    if ctx.key_confirmed {
        info!(
            "CONNECTING: key accepted after {} ms",
            ctx.ms_since(ctx.state_entered_ms)
        );
        return Some(StateId::Connected);
    }

    match ctx.link {
        LinkState::Ready => {
            let due = ctx
                .key_sent_ms
                .is_none_or(|sent| ctx.ms_since(sent) >= u64::from(ctx.config.key_exchange_timeout_ms));
            if due {
                if ctx.key_sent_ms.is_some() {
                    warn!("CONNECTING: no key reply, resending key exchange");
                }
                let password = ctx.config.password.clone();
                ctx.queue(OutboundCommand::SessionKeyExchange(password));
                ctx.key_sent_ms = Some(ctx.now_ms);
            }
        }
        LinkState::Connecting => {}
        LinkState::Failed => {
            warn!("CONNECTING: link failed, retrying");
            ctx.key_sent_ms = None;
            ctx.link_request = Some(LinkRequest::Open);
        }
        LinkState::Down => {
            debug!("CONNECTING: link down, reopening");
            ctx.key_sent_ms = None;
            ctx.link_request = Some(LinkRequest::Open);
        }
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTED state: session key held, intents executed
// ═══════════════════════════════════════════════════════════════════════════

fn connected_enter(ctx: &mut FsmContext) {
    info!("CONNECTED: session key 0x{:02x}", ctx.session_key);
    let key = ctx.session_key;
    ctx.emit(LockEvent::SessionEstablished { key });
}

fn connected_exit(ctx: &mut FsmContext) {
    info!(
        "CONNECTED: session ends after {} ms",
        ctx.ms_since(ctx.state_entered_ms)
    );
    if let Some(attempt) = ctx.unlock {
        warn!(
            "CONNECTED: unlock interrupted after {} attempt(s)",
            attempt.attempts
        );
    }
    if ctx.query.is_some() {
        warn!("CONNECTED: status query interrupted");
    }
}

fn connected_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.target.wants_disconnect() {
        info!("CONNECTED: {:?} requested", ctx.target);
        return Some(StateId::Disconnecting);
    }
    if ctx.force_disconnect {
        warn!("CONNECTED: session dropped");
        return Some(StateId::Disconnecting);
    }
    if ctx.link != LinkState::Ready {
        warn!("CONNECTED: link lost ({:?})", ctx.link);
        return Some(StateId::Disconnecting);
    }

    if let Some(ack) = ctx.ack.take() {
        debug_assert!(ack.is_ack());
        let cmd = outbound(ack, ctx.now_ms);
        ctx.queue(cmd);
    }

    let busy = if ctx.unlock.is_some() {
        unlock_progress(ctx)
    } else if ctx.query.is_some() {
        query_progress(ctx)
    } else if let Some(cmd) = ctx.pending.take() {
        start_command(ctx, cmd)
    } else {
        false
    };

    if !busy {
        status_check(ctx);
    }

    None
}

/// Begin an intent.  Returns `true` if it spans further ticks.
fn start_command(ctx: &mut FsmContext, cmd: PendingCommand) -> bool {
    match cmd {
        PendingCommand::Unlock => {
            if ctx.tracker.status == LockStatus::Unlocked {
                warn!("CONNECTED: lock already unlocked");
                ctx.emit(LockEvent::AlreadyUnlocked);
                return false;
            }
            info!("CONNECTED: unlocking");
            send_unlock(ctx);
            ctx.unlock = Some(UnlockAttempt {
                last_sent_ms: ctx.now_ms,
                attempts: 1,
            });
            true
        }
        PendingCommand::QueryInfo => {
            ctx.tracker.clear_status();
            ctx.queue(OutboundCommand::QueryInfo);
            ctx.query = Some(QueryWait {
                last_sent_ms: ctx.now_ms,
            });
            true
        }
        other => {
            let out = outbound(other, ctx.now_ms);
            info!("CONNECTED: sending {:?}", out.code());
            ctx.queue(out);
            false
        }
    }
}

/// Re-send the unlock until the lock reports unlocked.
fn unlock_progress(ctx: &mut FsmContext) -> bool {
    let Some(mut attempt) = ctx.unlock else {
        return false;
    };

    if ctx.tracker.status == LockStatus::Unlocked {
        ctx.tracker.expected = LockStatus::Unlocked;
        ctx.unlock = None;
        info!("CONNECTED: unlocked after {} attempt(s)", attempt.attempts);
        ctx.emit(LockEvent::Unlocked {
            attempts: attempt.attempts,
        });
        return false;
    }

    if ctx.ms_since(attempt.last_sent_ms) < u64::from(ctx.config.unlock_retry_interval_ms) {
        return true;
    }

    if ctx
        .config
        .unlock_retry_limit
        .is_some_and(|limit| attempt.attempts >= limit)
    {
        warn!(
            "CONNECTED: unlock not confirmed after {} attempt(s), giving up",
            attempt.attempts
        );
        ctx.unlock = None;
        ctx.emit(LockEvent::UnlockAbandoned {
            attempts: attempt.attempts,
        });
        return false;
    }

    debug!("CONNECTED: unlock retry {}", attempt.attempts + 1);
    send_unlock(ctx);
    attempt.attempts = attempt.attempts.saturating_add(1);
    attempt.last_sent_ms = ctx.now_ms;
    ctx.unlock = Some(attempt);
    true
}

/// Wait for the status reply to an explicit query.
fn query_progress(ctx: &mut FsmContext) -> bool {
    let Some(mut wait) = ctx.query else {
        return false;
    };

    let status = ctx.tracker.status;
    if status != LockStatus::Unknown {
        let battery_mv = ctx.tracker.battery_mv;
        info!("CONNECTED: lock {:?}, battery {} mV", status, battery_mv);
        ctx.emit(LockEvent::StatusReport { status, battery_mv });
        ctx.tracker.clear_status();
        ctx.query = None;
        return false;
    }

    if ctx.ms_since(wait.last_sent_ms) >= u64::from(ctx.config.query_poll_interval_ms) {
        ctx.queue_once(OutboundCommand::QueryInfo);
        wait.last_sent_ms = ctx.now_ms;
        ctx.query = Some(wait);
    }
    true
}

/// Periodic query and comparison against the expected position.
fn status_check(ctx: &mut FsmContext) {
    ctx.queue_once(OutboundCommand::QueryInfo);
    if let Some(mismatch) = ctx.tracker.reconcile() {
        warn!(
            "CONNECTED: lock is {:?}, expected {:?}",
            mismatch.observed, mismatch.expected
        );
        ctx.emit(LockEvent::StatusMismatch {
            expected: mismatch.expected,
            observed: mismatch.observed,
        });
    }
}

fn send_unlock(ctx: &mut FsmContext) {
    ctx.queue(OutboundCommand::Unlock(UnlockRequest::at(ctx.now_ms)));
    ctx.queue(OutboundCommand::QueryInfo);
}

fn outbound(cmd: PendingCommand, now_ms: u64) -> OutboundCommand {
    match cmd {
        PendingCommand::Unlock => OutboundCommand::Unlock(UnlockRequest::at(now_ms)),
        PendingCommand::QueryInfo => OutboundCommand::QueryInfo,
        PendingCommand::UnlockAck => OutboundCommand::UnlockAck,
        PendingCommand::LockAck => OutboundCommand::LockAck,
        PendingCommand::ReadRfid => OutboundCommand::ReadRfid,
        PendingCommand::DeleteRfid(card) => OutboundCommand::DeleteRfid(card),
        PendingCommand::PushSettings(settings) => OutboundCommand::PushSettings(settings),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTING state: one-tick teardown
// ═══════════════════════════════════════════════════════════════════════════

fn disconnecting_enter(ctx: &mut FsmContext) {
    if let Some(cmd) = ctx.pending.take() {
        warn!("DISCONNECTING: discarding pending {:?}", cmd);
    }
    ctx.ack = None;
    ctx.unlock = None;
    ctx.query = None;
    ctx.clear_pending_slot = true;
    ctx.outbox.clear();

    ctx.reset_session();
    ctx.tracker.reset();
    ctx.force_disconnect = false;
    ctx.link_request = Some(LinkRequest::Close);
    info!("DISCONNECTING: closing link");
}

fn disconnecting_update(_ctx: &mut FsmContext) -> Option<StateId> {
    Some(StateId::Disconnected)
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTED state: idle until enabled again
// ═══════════════════════════════════════════════════════════════════════════

fn disconnected_enter(ctx: &mut FsmContext) {
    info!("DISCONNECTED: target {:?}", ctx.target);
    if ctx.target == TargetState::Shutdown {
        ctx.shutdown = true;
    }
}

fn disconnected_update(ctx: &mut FsmContext) -> Option<StateId> {
    match ctx.target {
        TargetState::Enable => Some(StateId::Connecting),
        TargetState::Disable => None,
        TargetState::Shutdown => {
            ctx.shutdown = true;
            None
        }
    }
}
