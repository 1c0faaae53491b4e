//! Literal scenarios from the worked examples that exercise more than one
//! module at once. S1-S4 are covered inline in `economics.rs` (they only
//! need the pure resolution functions); S5 lives in `determinism.rs`. S6
//! needs the signal router itself, so it lives here.

use mince::config::RefractoryConfig;
use mince::models::{Event, EventKind};
use mince::signals::{Channel, Signals};

/// S6: with `raid=2`, an `unopposed_raid` fired at tick t re-arms the raid
/// channel through t+1; a second raid-channel event offered at t or t+1
/// queues instead of emitting; both queued events drain, in FIFO order,
/// once the window expires at t+2.
#[test]
fn s6_refractory_window_queues_and_drains_in_fifo_order() {
    let refractory = RefractoryConfig {
        raid: 2,
        defend: 1,
        bribe: 1,
        trade: 0,
        retainer: 0,
    };
    let mut signals = Signals::new(refractory);

    let mut first = Event::new(0, EventKind::UnopposedRaid);
    first.merc = Some("M-12".to_string());
    first.king = Some("K-01".to_string());

    let emitted_at_t = signals.process_events(vec![first], 0);
    assert_eq!(emitted_at_t.len(), 1, "first raid-channel event emits immediately");
    assert_eq!(emitted_at_t[0].channel, Channel::Raid);

    let mut second = Event::new(0, EventKind::DefendLoss);
    second.merc = Some("M-07".to_string());
    let queued_at_t = signals.process_events(vec![second], 0);
    assert!(queued_at_t.is_empty(), "raid channel is still refractory at tick t");

    let mut third = Event::new(1, EventKind::UnopposedRaid);
    third.merc = Some("M-03".to_string());
    let queued_at_t_plus_1 = signals.process_events(vec![third], 1);
    assert!(queued_at_t_plus_1.is_empty(), "raid channel is still refractory at tick t+1");

    let drained_before_expiry = signals.update_refractory(1);
    assert!(drained_before_expiry.is_empty(), "window has not expired yet at tick t+1");

    let drained = signals.update_refractory(2);
    assert_eq!(drained.len(), 2, "both queued events drain once the window expires at t+2");
    assert_eq!(drained[0].event.merc.as_deref(), Some("M-07"), "FIFO: the event queued at t drains first");
    assert_eq!(drained[1].event.merc.as_deref(), Some("M-03"), "FIFO: the event queued at t+1 drains second");
}
