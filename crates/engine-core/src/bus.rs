//! Validated, queue-only event bus. Publish never runs a handler; delivery
//! happens in dispatch cycles with a fixed subscriber snapshot per cycle.

use std::collections::{BTreeMap, VecDeque};

use contracts::{DispatchReport, EngineConfig, EventRecord, EventType};
use serde_json::{Map, Value};

use crate::catalog;
use crate::error::EngineError;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubscriberId {
    Layer(String),
    ResetService,
    Probe(String),
}

#[derive(Debug, Clone)]
pub struct SubscriberEntry {
    pub token: SubscriptionToken,
    pub target: SubscriberId,
    pub scope: Option<String>,
}

/// A publish request before normalization. Absent fields take defaults on
/// publish: empty payload, `system` source, the bus's allowed phase.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: EventType,
    pub payload: Value,
    pub source: Option<String>,
    pub phase: Option<Phase>,
    pub meta: Option<Value>,
}

impl EventDraft {
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_type,
            payload,
            source: None,
            phase: None,
            meta: None,
        }
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Resolves a subscriber entry to behavior during a dispatch cycle. The
/// `bus` reborrow is the only channel for handler effects, so publishes land
/// on the next cycle's queue and subscriber changes never touch the running
/// snapshot.
pub trait EventSink {
    fn deliver(
        &mut self,
        subscriber: &SubscriberEntry,
        event: &EventRecord,
        bus: &mut EventBus,
    ) -> Result<(), EngineError>;
}

#[derive(Debug)]
pub struct EventBus {
    queue: VecDeque<EventRecord>,
    subscribers: BTreeMap<EventType, Vec<SubscriberEntry>>,
    next_token: u64,
    allowed_phase: Option<Phase>,
    clock_ts: u64,
    strict: bool,
    max_events_per_tick: u64,
    max_dispatch_cycles_per_tick: u64,
    last_dispatch_report: DispatchReport,
}

impl EventBus {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            subscribers: BTreeMap::new(),
            next_token: 0,
            allowed_phase: None,
            clock_ts: 0,
            strict: config.strict_events,
            max_events_per_tick: config.max_events_per_tick.max(1),
            max_dispatch_cycles_per_tick: config.max_dispatch_cycles_per_tick.max(1),
            last_dispatch_report: DispatchReport::default(),
        }
    }

    pub fn set_allowed_phase(&mut self, phase: Option<Phase>) {
        self.allowed_phase = phase;
    }

    pub fn allowed_phase(&self) -> Option<Phase> {
        self.allowed_phase
    }

    pub fn set_clock(&mut self, ts: u64) {
        self.clock_ts = ts;
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Normalizes, validates against the catalog, and appends to the queue.
    /// No handler runs here.
    pub fn publish(&mut self, draft: EventDraft) -> Result<(), EngineError> {
        let phase = draft.phase.or(self.allowed_phase);
        if self.strict {
            let spec = catalog::event_spec(draft.event_type);
            if let Err(reason) = (spec.validate_payload)(&draft.payload) {
                return Err(EngineError::EventPayloadInvalid {
                    event_type: draft.event_type.as_str(),
                    reason,
                });
            }
            if let Some(phase) = phase {
                if !spec.allowed_phases.contains(&phase) {
                    return Err(EngineError::EventPhaseNotAllowed {
                        event_type: draft.event_type.as_str(),
                        phase: phase.as_str(),
                    });
                }
            }
        }

        self.queue.push_back(EventRecord {
            event_type: draft.event_type,
            payload: draft.payload,
            ts: self.clock_ts,
            source: draft.source.unwrap_or_else(|| "system".to_string()),
            phase: phase.map(|phase| phase.as_str().to_string()),
            meta: draft.meta.unwrap_or_else(|| Value::Object(Map::new())),
        });
        Ok(())
    }

    pub fn subscribe(
        &mut self,
        event_type: EventType,
        target: SubscriberId,
        scope: Option<String>,
    ) -> SubscriptionToken {
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        self.subscribers
            .entry(event_type)
            .or_default()
            .push(SubscriberEntry {
                token,
                target,
                scope,
            });
        token
    }

    /// Removes at most one subscription; reports whether it existed.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        for entries in self.subscribers.values_mut() {
            if let Some(index) = entries.iter().position(|entry| entry.token == token) {
                entries.remove(index);
                return true;
            }
        }
        false
    }

    /// Drains the queue in cycles. Each cycle detaches the current queue,
    /// snapshots the subscribers, and delivers in insertion order; publishes
    /// made by handlers go to the fresh queue and run next cycle. Exceeding
    /// the per-tick event budget is fatal; exceeding the cycle budget defers
    /// the remainder to the next dispatch.
    pub fn dispatch_queued(&mut self, sink: &mut dyn EventSink) -> Result<u64, EngineError> {
        let mut report = DispatchReport::default();

        while !self.queue.is_empty() && report.cycles_processed < self.max_dispatch_cycles_per_tick
        {
            report.cycles_processed += 1;
            let dispatch_queue = std::mem::take(&mut self.queue);
            let snapshot: BTreeMap<EventType, Vec<SubscriberEntry>> = self
                .subscribers
                .iter()
                .filter(|(_, entries)| !entries.is_empty())
                .map(|(event_type, entries)| (*event_type, entries.clone()))
                .collect();

            for event in dispatch_queue {
                report.events_processed += 1;
                if report.events_processed > self.max_events_per_tick {
                    self.last_dispatch_report = report;
                    return Err(EngineError::EventBudgetExceeded {
                        events_processed: report.events_processed,
                        max_events_per_tick: self.max_events_per_tick,
                    });
                }
                if let Some(entries) = snapshot.get(&event.event_type) {
                    for entry in entries {
                        sink.deliver(entry, &event, self)?;
                        report.delivered_handlers += 1;
                    }
                }
            }
        }

        report.deferred_events = self.queue.len() as u64;
        report.deferred_due_to_cycle_limit = report.deferred_events > 0;
        self.last_dispatch_report = report;
        Ok(report.delivered_handlers)
    }

    pub fn last_dispatch_report(&self) -> DispatchReport {
        self.last_dispatch_report
    }
}
