use super::{command_handler, reject_command, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{
    decode_integer, DiscoveryKey, Entity, EntityContext, EntityCore, HaType, SET_SUFFIX,
};
use crate::mqtt::IncomingMessage;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::debug;

struct NumberState {
    value: i64,
    min: i64,
    max: i64,
    step: i64,
    unit: Option<String>,
}

/// Integer value within an inclusive range.
///
/// Out-of-range commands and values are clamped to the range, never rejected.
pub struct Number {
    core: EntityCore,
    state: Mutex<NumberState>,
    requests: broadcast::Sender<i64>,
    this: Weak<Number>,
}

impl Number {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (requests, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let number = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::Number), id, name),
            state: Mutex::new(NumberState {
                value: 0,
                min: 0,
                max: 100,
                step: 1,
                unit: None,
            }),
            requests,
            this: this.clone(),
        });
        ctx.attach(&number);
        number
    }

    /// Configure the range; bounds given in the wrong order are swapped.
    ///
    /// Takes effect in discovery at the next registration. An empty unit
    /// means none.
    pub fn set_range(&self, min: i64, max: i64, step: i64, unit: &str) {
        let mut state = self.state.lock().unwrap();
        state.min = min.min(max);
        state.max = min.max(max);
        state.step = step.max(1);
        state.unit = Some(unit.to_string()).filter(|u| !u.is_empty());
        state.value = state.value.clamp(state.min, state.max);
    }

    pub fn range(&self) -> (i64, i64) {
        let state = self.state.lock().unwrap();
        (state.min, state.max)
    }

    pub fn value(&self) -> i64 {
        self.state.lock().unwrap().value
    }

    /// Store the value clamped to the range and publish it
    pub fn set_value(&self, value: i64) {
        {
            let mut state = self.state.lock().unwrap();
            state.value = value.clamp(state.min, state.max);
        }
        self.publish_state();
    }

    /// Value change requests received on `{base}/set`, already clamped
    pub fn subscribe_requests(&self) -> broadcast::Receiver<i64> {
        self.requests.subscribe()
    }

    fn publish_state(&self) {
        self.core.publish_state(self.value().to_string(), true);
    }

    fn handle_command(&self, message: &IncomingMessage) {
        let (min, max) = self.range();
        match decode_integer(&message.payload, min, max) {
            Ok(value) => {
                debug!(entity_id = %self.core.id(), value, "Number value change requested");
                let _ = self.requests.send(value);
            }
            Err(e) => reject_command(&self.core, message, &e),
        }
    }
}

impl Entity for Number {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        core.set_discovery_config(DiscoveryKey::CommandTopic, core.topic(SET_SUFFIX));
        {
            let state = self.state.lock().unwrap();
            core.set_discovery_config(DiscoveryKey::Min, state.min);
            core.set_discovery_config(DiscoveryKey::Max, state.max);
            core.set_discovery_config(DiscoveryKey::Step, state.step);
            if let Some(unit) = &state.unit {
                core.set_discovery_config(DiscoveryKey::UnitOfMeasurement, unit.as_str());
            }
        }
        super::announce(core);
        self.publish_state();

        core.subscribe_command(
            SET_SUFFIX,
            command_handler(&self.this, Number::handle_command),
        );
    }
}
