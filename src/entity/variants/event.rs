use crate::entity::{DiscoveryKey, Entity, EntityContext, EntityCore, HaType};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::warn;

const DEFAULT_EVENT_TYPE: &str = "trigger";

/// Fire-and-forget occurrences; nothing is retained
pub struct Event {
    core: EntityCore,
    event_types: Mutex<Vec<String>>,
}

impl Event {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let event = Arc::new(Self {
            core: EntityCore::new(ctx, Some(HaType::Event), id, name),
            event_types: Mutex::new(vec![DEFAULT_EVENT_TYPE.to_string()]),
        });
        ctx.attach(&event);
        event
    }

    /// Replace the declared event types; the first one is fired by
    /// [`Event::trigger`]. An empty list restores the default.
    pub fn set_event_types<I, S>(&self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut types: Vec<String> = types.into_iter().map(Into::into).collect();
        if types.is_empty() {
            types.push(DEFAULT_EVENT_TYPE.to_string());
        }
        *self.event_types.lock().unwrap() = types;
    }

    pub fn event_types(&self) -> Vec<String> {
        self.event_types.lock().unwrap().clone()
    }

    /// Fire the default event type
    pub fn trigger(&self) {
        let event_type = self.event_types()[0].clone();
        self.publish_event(&event_type);
    }

    /// Fire a declared event type; undeclared types are dropped
    pub fn trigger_with(&self, event_type: &str) {
        if !self.event_types().iter().any(|t| t == event_type) {
            warn!(
                entity_id = %self.core.id(),
                event_type = %event_type,
                "Ignoring undeclared event type"
            );
            return;
        }
        self.publish_event(event_type);
    }

    fn publish_event(&self, event_type: &str) {
        let payload = json!({ "event_type": event_type }).to_string();
        self.core.publish_state(payload, false);
    }
}

impl Entity for Event {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        core.set_discovery_config(DiscoveryKey::EventTypes, self.event_types());
        super::announce(core);
    }
}
