//! Refractory-aware signal channels that turn raw tick events into ordered,
//! rate-limited signals.

use std::collections::{BTreeMap, VecDeque};

use crate::config::RefractoryConfig;
use crate::models::{Event, EventKind};

/// The five signal channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    /// Unopposed and lost-defense raid outcomes.
    Raid,
    /// Won defense outcomes.
    Defend,
    /// Bribe acceptance and insufficient-funds outcomes.
    Bribe,
    /// Trade-phase investment events.
    Trade,
    /// Retainer-payment events.
    Retainer,
}

impl Channel {
    /// Maps an event kind to the channel it routes through.
    #[must_use]
    pub const fn for_kind(kind: EventKind) -> Self {
        match kind {
            EventKind::UnopposedRaid | EventKind::DefendLoss => Self::Raid,
            EventKind::DefendWin => Self::Defend,
            EventKind::BribeAccept | EventKind::BribeInsufficientFunds => Self::Bribe,
            EventKind::Trade | EventKind::TraitDrip | EventKind::RoleMutated => Self::Trade,
            EventKind::Retainer => Self::Retainer,
        }
    }

    /// Emission priority; higher values are emitted first when multiple
    /// signals fire in the same call.
    #[must_use]
    const fn priority(self) -> u8 {
        match self {
            Self::Raid => 4,
            Self::Defend => 3,
            Self::Bribe => 2,
            Self::Retainer => 1,
            Self::Trade => 0,
        }
    }

    const fn window(self, cfg: &RefractoryConfig) -> u64 {
        match self {
            Self::Raid => cfg.raid,
            Self::Defend => cfg.defend,
            Self::Bribe => cfg.bribe,
            Self::Trade => cfg.trade,
            Self::Retainer => cfg.retainer,
        }
    }
}

/// A channel-routed event, ready for emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// The channel this signal was routed through.
    pub channel: Channel,
    /// Relative emission priority (higher first).
    pub priority: u8,
    /// The underlying event.
    pub event: Event,
}

/// Tracks refractory windows and per-channel FIFO queues.
pub struct Signals {
    refractory: RefractoryConfig,
    refractory_until: BTreeMap<Channel, u64>,
    queued: BTreeMap<Channel, VecDeque<Event>>,
}

impl Signals {
    /// Builds an empty signal router from the configured refractory
    /// windows.
    #[must_use]
    pub fn new(refractory: RefractoryConfig) -> Self {
        Self {
            refractory,
            refractory_until: BTreeMap::new(),
            queued: BTreeMap::new(),
        }
    }

    /// Routes `events` at `current_tick`: active channels emit immediately
    /// and re-arm their refractory window; channels still in refractory
    /// queue the event instead. Returns emitted signals sorted by priority
    /// descending, ties broken by insertion order.
    pub fn process_events(&mut self, events: Vec<Event>, current_tick: u64) -> Vec<Signal> {
        let mut emitted = Vec::new();
        for event in events {
            let channel = Channel::for_kind(event.kind);
            let until = self.refractory_until.get(&channel).copied().unwrap_or(0);
            if current_tick >= until {
                let window = channel.window(&self.refractory);
                self.refractory_until.insert(channel, current_tick + window);
                emitted.push(Signal {
                        channel,
                        priority: channel.priority(),
                        event,
                });
            } else {
                self.queued.entry(channel).or_default().push_back(event);
            }
        }
        emitted.sort_by(|a, b| b.priority.cmp(&a.priority));
        emitted
    }

    /// For every channel whose refractory window expires at `tick`, drains
    /// its queue back through [`Self::process_events`] (now active) and
    /// returns the resulting signals.
    pub fn update_refractory(&mut self, tick: u64) -> Vec<Signal> {
        let expired: Vec<Channel> = self
            .refractory_until
            .iter()
            .filter(|(_, &until)| until <= tick)
            .map(|(&c, _)| c)
            .collect();

        let mut drained = Vec::new();
        for channel in expired {
            if let Some(queue) = self.queued.get_mut(&channel) {
                if !queue.is_empty() {
                    let events: Vec<Event> = queue.drain(..).collect();
                    drained.extend(self.process_events(events, tick));
                }
            }
        }
        drained
    }
}
