//! Integration tests for the LockService → FSM → transport pipeline.
//!
//! These run on the host (x86_64) against [`SimLock`] and verify the full
//! chain from a control intent down to the frames on the wire and the
//! events coming back, on virtual time.

use core::time::Duration;

use crate::mock_lock::{ManualClock, RecordingSink, SimLock};

use ol305::app::commands::TargetState;
use ol305::app::events::LockEvent;
use ol305::app::ports::LinkState;
use ol305::app::service::{LockService, TickOutcome};
use ol305::config::LockConfig;
use ol305::fsm::StateId;
use ol305::protocol::codec;
use ol305::protocol::reply::{LockStatus, RfidDeletion, RfidRegistration, SettingsReport, SwitchState};

type Service = LockService<SimLock, ManualClock>;

fn config() -> LockConfig {
    LockConfig::new(&[0xd5, 0x7b, 0xf1, 0xca, 0x51, 0x51], "test1234").unwrap()
}

fn make_service_with(config: LockConfig, setup: impl FnOnce(&mut SimLock)) -> (Service, ManualClock, RecordingSink) {
    let clock = ManualClock::new();
    let mut lock = SimLock::new(clock.clone());
    setup(&mut lock);
    let mut svc = LockService::new(config, lock, clock.clone()).unwrap();
    let mut sink = RecordingSink::new();
    svc.start(&mut sink);
    (svc, clock, sink)
}

fn make_service() -> (Service, ManualClock, RecordingSink) {
    make_service_with(config(), |_| {})
}

/// One tick followed by the delay the service asks for.
fn step(svc: &mut Service, clock: &ManualClock, sink: &mut RecordingSink) -> TickOutcome {
    let outcome = svc.tick(sink);
    clock.advance(u64::from(svc.next_delay_ms()));
    outcome
}

fn step_until(
    svc: &mut Service,
    clock: &ManualClock,
    sink: &mut RecordingSink,
    max_ticks: usize,
    done: impl Fn(&Service, &RecordingSink) -> bool,
) -> bool {
    for _ in 0..max_ticks {
        step(svc, clock, sink);
        if done(svc, sink) {
            return true;
        }
    }
    false
}

fn connect(svc: &mut Service, clock: &ManualClock, sink: &mut RecordingSink) {
    assert!(
        step_until(svc, clock, sink, 20, |s, _| s.state() == StateId::Connected),
        "service never reached Connected"
    );
}

// ── Connection lifecycle ──────────────────────────────────────

#[test]
fn connects_and_obtains_session_key() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);

    assert_eq!(svc.session_key(), 0x5c);
    assert!(sink.contains(&LockEvent::SessionEstablished { key: 0x5c }));
    assert!(sink.contains(&LockEvent::StateChanged {
        from: StateId::Connecting,
        to: StateId::Connected
    }));

    let key_frames = svc.transport().sent(0x01);
    assert_eq!(key_frames.len(), 1);
    assert_eq!(key_frames[0].msg.key, 0, "key exchange goes out with key 0");
    assert_eq!(&key_frames[0].msg.payload[..], b"test1234");
    assert_eq!(svc.transport().opened, 1);
}

#[test]
fn status_check_adopts_first_observation() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);

    let snap = svc.snapshot();
    assert_eq!(snap.state, StateId::Connected);
    assert_eq!(snap.status, LockStatus::Locked);
    assert_eq!(snap.expected, LockStatus::Locked);
    assert_eq!(snap.battery_mv, 3600);
    assert!(!svc.transport().sent(0x31).is_empty());
}

#[test]
fn key_exchange_resent_after_timeout() {
    let (mut svc, clock, mut sink) = make_service_with(config(), |lock| {
        lock.password = "other123".into();
    });
    // Wrong password: the lock answers with a key error every time.
    for _ in 0..40 {
        step(&mut svc, &clock, &mut sink);
        assert_ne!(svc.state(), StateId::Connected);
    }
    assert!(svc.transport().opened >= 2, "session rebuilt after key error");
    assert!(svc.transport().sent(0x01).len() >= 2);
}

#[test]
fn silent_lock_gets_key_exchange_again() {
    let (mut svc, clock, mut sink) = make_service_with(config(), |lock| {
        lock.silent = true;
    });
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.transport().sent(0x01).len(), 1);
    let first = svc.transport().sent(0x01)[0].at_ms;

    assert!(step_until(&mut svc, &clock, &mut sink, 40, |s, _| {
        s.transport().sent(0x01).len() >= 2
    }));
    let second = svc.transport().sent(0x01)[1].at_ms;
    assert!(second - first >= 5000);
    assert_eq!(svc.state(), StateId::Connecting);
    assert_eq!(svc.transport().opened, 1);

    svc.transport_mut().silent = false;
    assert!(step_until(&mut svc, &clock, &mut sink, 40, |s, _| {
        s.state() == StateId::Connected
    }));
}

#[test]
fn link_failure_while_connecting_reopens() {
    let (mut svc, clock, mut sink) = make_service_with(config(), |lock| {
        lock.ready_on_open = false;
    });
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.state(), StateId::Connecting);
    assert_eq!(svc.transport().opened, 1);

    svc.transport_mut().set_link(LinkState::Failed);
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.state(), StateId::Connecting);
    assert_eq!(svc.transport().opened, 2);
    assert_eq!(svc.next_delay_ms(), 250);
}

// ── Unlock ────────────────────────────────────────────────────

#[test]
fn unlock_retries_until_lock_reports_unlocked() {
    let (mut svc, clock, mut sink) = make_service_with(config(), |lock| {
        lock.unlock_after = 3;
    });
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);

    control.unlock();
    assert!(step_until(&mut svc, &clock, &mut sink, 50, |_, sink| {
        sink.contains(&LockEvent::Unlocked { attempts: 3 })
    }));

    let unlocks: Vec<u64> = svc
        .transport()
        .sent(0x05)
        .iter()
        .filter(|r| r.msg.payload.len() == 10)
        .map(|r| r.at_ms)
        .collect();
    assert_eq!(unlocks.len(), 3);
    for pair in unlocks.windows(2) {
        assert!(pair[1] - pair[0] >= 2500, "retries too close: {:?}", unlocks);
    }
    assert_eq!(svc.snapshot().expected, LockStatus::Unlocked);
}

#[test]
fn unlock_payload_carries_user_and_timestamp() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);

    control.unlock();
    step(&mut svc, &clock, &mut sink);
    let sent = svc.transport().sent(0x05);
    let frame = sent.last().expect("unlock sent");
    let p = &frame.msg.payload;
    assert_eq!(p[0], 0x01);
    assert_eq!(&p[1..5], &1u32.to_be_bytes());
    assert_eq!(u32::from_be_bytes([p[5], p[6], p[7], p[8]]) as u64, frame.at_ms);
    assert_eq!(p[9], 0x00);
}

#[test]
fn unlock_when_already_unlocked_sends_nothing() {
    let (mut svc, clock, mut sink) = make_service_with(config(), |lock| {
        lock.status = LockStatus::Unlocked;
    });
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);

    control.unlock();
    step(&mut svc, &clock, &mut sink);
    assert!(sink.contains(&LockEvent::AlreadyUnlocked));
    assert_eq!(svc.transport().unlock_commands, 0);
}

#[test]
fn unlock_retry_limit_abandons() {
    let mut cfg = config();
    cfg.unlock_retry_limit = Some(2);
    let (mut svc, clock, mut sink) = make_service_with(cfg, |lock| {
        lock.unlock_after = 100;
    });
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);

    control.unlock();
    assert!(step_until(&mut svc, &clock, &mut sink, 50, |_, sink| {
        sink.contains(&LockEvent::UnlockAbandoned { attempts: 2 })
    }));
    assert_eq!(svc.transport().unlock_commands, 2);
    assert_eq!(svc.state(), StateId::Connected);
}

#[test]
fn disable_interrupts_unlock_retry() {
    let (mut svc, clock, mut sink) = make_service_with(config(), |lock| {
        lock.unlock_after = 100;
    });
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);

    control.unlock();
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.transport().unlock_commands, 1);

    control.disconnect();
    assert!(step_until(&mut svc, &clock, &mut sink, 5, |s, _| s.state() == StateId::Disconnected));
    assert_eq!(svc.transport().unlock_commands, 1);
    assert_eq!(svc.transport().closed, 1);
    assert_eq!(svc.session_key(), 0);
}

// ── Query and other intents ───────────────────────────────────

#[test]
fn query_reports_status_and_battery() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);

    control.query();
    assert!(step_until(&mut svc, &clock, &mut sink, 10, |_, sink| {
        sink.contains(&LockEvent::StatusReport {
            status: LockStatus::Locked,
            battery_mv: 3600,
        })
    }));
}

#[test]
fn query_is_resent_until_answered() {
    let (mut svc, clock, mut sink) = make_service_with(config(), |lock| {
        lock.status = LockStatus::Unknown;
    });
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);

    control.query();
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.next_delay_ms(), 150);
    let before = svc.transport().sent(0x31).len();
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    assert!(svc.transport().sent(0x31).len() >= before + 2);

    svc.transport_mut().status = LockStatus::Unlocked;
    assert!(step_until(&mut svc, &clock, &mut sink, 5, |_, sink| {
        sink.contains(&LockEvent::StatusReport {
            status: LockStatus::Unlocked,
            battery_mv: 3600,
        })
    }));
}

#[test]
fn rfid_and_settings_intents() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);

    control.read_rfid();
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    assert!(sink.contains(&LockEvent::RfidRegistration(RfidRegistration::ReadingStarted)));

    control.delete_rfid();
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    assert!(sink.contains(&LockEvent::RfidDeletion(RfidDeletion::Deleted)));
    let delete = svc.transport().sent(0x86);
    assert_eq!(&delete[0].msg.payload[..], &[0u8; 8]);

    control.push_settings();
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    assert_eq!(&svc.transport().sent(0x61)[0].msg.payload[..], &[0x02, 0x01, 0x01]);
    assert!(sink.contains(&LockEvent::Settings(SettingsReport {
        ble_unlock: SwitchState::On,
        button_unlock: SwitchState::Off,
        rfid_unlock: SwitchState::Off,
    })));

    assert!(control.push_raw_settings(0, 0, 3).is_err());
}

#[test]
fn lock_notification_is_acknowledged() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);

    svc.transport_mut().notify(0x15, &[0x01]);
    step(&mut svc, &clock, &mut sink);
    assert!(sink.contains(&LockEvent::Locked));
    assert_eq!(svc.snapshot().expected, LockStatus::Locked);

    let acks = svc.transport().sent(0x15);
    assert_eq!(acks.len(), 1);
    assert_eq!(&acks[0].msg.payload[..], &[0x02]);
}

#[test]
fn unlock_notification_is_acknowledged() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);

    svc.transport_mut().notify(0x05, &[0x01]);
    step(&mut svc, &clock, &mut sink);
    let acks: Vec<_> = svc
        .transport()
        .sent(0x05)
        .into_iter()
        .filter(|r| r.msg.payload.len() == 1)
        .cloned()
        .collect();
    assert_eq!(acks.len(), 1);
    assert_eq!(&acks[0].msg.payload[..], &[0x02]);
}

// ── Teardown and recovery ─────────────────────────────────────

#[test]
fn disable_discards_pending_intent() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);

    control.unlock();
    control.disconnect();
    assert!(step_until(&mut svc, &clock, &mut sink, 5, |s, _| s.state() == StateId::Disconnected));
    assert_eq!(svc.transport().unlock_commands, 0);
    assert_eq!(svc.snapshot().battery_mv, 0);

    // Re-enabling must not resurrect the discarded unlock.
    control.request(TargetState::Enable, false, None).unwrap();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.transport().unlock_commands, 0);
}

#[test]
fn drop_session_reconnects() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);

    control.drop_session();
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.state(), StateId::Disconnecting);
    connect(&mut svc, &clock, &mut sink);

    assert_eq!(svc.transport().opened, 2);
    assert_eq!(svc.transport().closed, 1);
    assert_eq!(svc.transport().sent(0x01).len(), 2);
    assert_eq!(control.target(), TargetState::Enable);
}

#[test]
fn key_error_reply_forces_reconnect() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);

    svc.transport_mut().notify(0x10, &[0x02]);
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.state(), StateId::Disconnecting);
    connect(&mut svc, &clock, &mut sink);
    assert_eq!(svc.transport().opened, 2);
}

#[test]
fn crc_error_reply_keeps_session() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);

    svc.transport_mut().notify(0x10, &[0x01]);
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.state(), StateId::Connected);
}

#[test]
fn late_key_error_does_not_abort_next_connect() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);

    control.disconnect();
    assert!(step_until(&mut svc, &clock, &mut sink, 5, |s, _| s.state() == StateId::Disconnected));

    // Arrives after teardown, with the pre-session key.
    svc.transport_mut().notify_with_key(0, 0x10, &[0x02]);
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.state(), StateId::Disconnected);

    let first_new = sink.events.len();
    control.request(TargetState::Enable, false, None).unwrap();
    connect(&mut svc, &clock, &mut sink);
    assert!(!sink.events[first_new..].contains(&LockEvent::StateChanged {
        from: StateId::Connecting,
        to: StateId::Disconnecting,
    }));
    assert_eq!(svc.transport().opened, 2);
    assert_eq!(svc.transport().closed, 1);
}

#[test]
fn late_lock_notification_is_not_acked_next_session() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);

    control.disconnect();
    assert!(step_until(&mut svc, &clock, &mut sink, 5, |s, _| s.state() == StateId::Disconnected));

    svc.transport_mut().notify_with_key(0, 0x15, &[0x01]);
    svc.transport_mut().notify_with_key(0, 0x05, &[0x01]);
    step(&mut svc, &clock, &mut sink);

    control.request(TargetState::Enable, false, None).unwrap();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    assert!(svc.transport().sent(0x15).is_empty());
    assert!(svc.transport().sent(0x05).is_empty());
    assert!(!sink.contains(&LockEvent::Locked));
}

#[test]
fn corrupted_and_foreign_frames_are_dropped() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    let events_before = sink.events.len();

    let mut corrupt = codec::encode(0x5c, 0x15, &[0x01], 0x21).unwrap();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x01;
    svc.transport_mut().notify_raw(&corrupt);
    svc.transport_mut().notify_raw(&[0x00; 4]);
    // Valid frame, wrong session key.
    svc.transport_mut().notify_with_key(0x99, 0x15, &[0x01]);
    step(&mut svc, &clock, &mut sink);

    assert_eq!(svc.state(), StateId::Connected);
    assert_eq!(sink.events.len(), events_before);
    assert!(svc.transport().sent(0x15).is_empty());
}

#[test]
fn link_loss_while_connected_reconnects() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);

    svc.transport_mut().drop_link();
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.state(), StateId::Disconnecting);
    connect(&mut svc, &clock, &mut sink);
    assert_eq!(svc.transport().opened, 2);
}

#[test]
fn write_failure_drops_session() {
    let (mut svc, clock, mut sink) = make_service();
    connect(&mut svc, &clock, &mut sink);

    svc.transport_mut().fail_writes = true;
    step(&mut svc, &clock, &mut sink);
    step(&mut svc, &clock, &mut sink);
    assert!(matches!(
        svc.state(),
        StateId::Disconnecting | StateId::Disconnected | StateId::Connecting
    ));
    svc.transport_mut().fail_writes = false;
    connect(&mut svc, &clock, &mut sink);
}

#[test]
fn shutdown_stops_service() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    connect(&mut svc, &clock, &mut sink);

    control.request(TargetState::Shutdown, false, None).unwrap();
    let mut stopped = false;
    for _ in 0..5 {
        if step(&mut svc, &clock, &mut sink) == TickOutcome::Shutdown {
            stopped = true;
            break;
        }
    }
    assert!(stopped);
    assert_eq!(svc.state(), StateId::Disconnected);
    assert_eq!(sink.events.last(), Some(&LockEvent::Stopped));
    assert_eq!(svc.transport().closed, 1);
}

#[test]
fn disabled_service_idles_at_short_interval() {
    let (mut svc, clock, mut sink) = make_service();
    let control = svc.control();
    control.request(TargetState::Disable, false, None).unwrap();
    step(&mut svc, &clock, &mut sink);
    assert_eq!(svc.state(), StateId::Disconnected);
    assert_eq!(svc.next_delay_ms(), 10);
    assert_eq!(svc.transport().opened, 0);
}

// ── Threaded facade ───────────────────────────────────────────

#[test]
fn blocking_requests_against_running_service() {
    let clock = ManualClock::new();
    let lock = SimLock::new(clock.clone());
    let mut svc = LockService::new(config(), lock, clock.clone()).unwrap();
    let control = svc.control();

    let task = std::thread::spawn(move || {
        let mut sink = RecordingSink::new();
        svc.run(&mut sink);
        sink
    });

    control.request(TargetState::Enable, true, None).unwrap();
    assert!(control.is_connected());

    control
        .request(TargetState::Shutdown, true, None)
        .unwrap();
    assert_eq!(control.state(), StateId::Disconnected);

    let sink = task.join().unwrap();
    assert_eq!(sink.events.last(), Some(&LockEvent::Stopped));
}

#[test]
fn blocking_request_times_out_when_lock_unreachable() {
    let clock = ManualClock::new();
    let mut lock = SimLock::new(clock.clone());
    lock.ready_on_open = false;
    let svc = LockService::new(config(), lock, clock.clone()).unwrap();
    let control = svc.control();

    // The service is not running, so the lock can never be reached.
    let result = control.request(TargetState::Enable, true, Some(Duration::from_millis(300)));
    assert!(result.is_err());
    assert!(!control.is_connected());
}
