//! Same-tick notifications for renderers and other consumers

use super::registry::SimulationId;
use crate::modifier::ModifierId;
use serde::{Deserialize, Serialize};

/// Something a world did during a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FlowEvent {
    /// The grid of a simulation published new state
    SimulationUpdated(SimulationId),
    /// The particles of a simulation moved
    ParticlesUpdated(SimulationId),
    /// A modifier was applied against every active simulation
    ModifierApplied { modifier: ModifierId, multiplier: f32 },
    SimulationActivated(SimulationId),
    SimulationDeactivated(SimulationId),
}

/// Receives world events synchronously
pub trait FlowObserver {
    fn on_event(&mut self, event: &FlowEvent);
}

impl<F: FnMut(&FlowEvent)> FlowObserver for F {
    fn on_event(&mut self, event: &FlowEvent) {
        self(event);
    }
}

/// Registered observers, notified in registration order
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Box<dyn FlowObserver>>,
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ObserverList {
    pub fn add(&mut self, observer: impl FlowObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer before returning
    pub fn publish(&mut self, event: &FlowEvent) {
        for observer in &mut self.observers {
            observer.on_event(event);
        }
    }
}
