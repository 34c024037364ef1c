use super::{command_handler, reject_command, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{
    decode_option, DiscoveryKey, Entity, EntityContext, EntityCore, HaType, SET_SUFFIX,
};
use crate::mqtt::IncomingMessage;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

struct SelectState {
    options: Vec<String>,
    current: Option<String>,
}

/// One value out of a fixed list of options
pub struct Select {
    core: EntityCore,
    state: Mutex<SelectState>,
    selections: broadcast::Sender<String>,
    this: Weak<Select>,
}

impl Select {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (selections, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let select = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::Select), id, name),
            state: Mutex::new(SelectState {
                options: Vec::new(),
                current: None,
            }),
            selections,
            this: this.clone(),
        });
        ctx.attach(&select);
        select
    }

    /// Replace the option list; takes effect at the next registration
    pub fn set_options<I, S>(&self, options: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().unwrap().options = options.into_iter().map(Into::into).collect();
    }

    pub fn options(&self) -> Vec<String> {
        self.state.lock().unwrap().options.clone()
    }

    pub fn state(&self) -> Option<String> {
        self.state.lock().unwrap().current.clone()
    }

    /// Store and publish the current option.
    ///
    /// Returns false, leaving the state unchanged, for a value that is not
    /// one of the options.
    pub fn set_state(&self, option: &str) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if !state.options.iter().any(|o| o == option) {
                warn!(
                    entity_id = %self.core.id(),
                    option = %option,
                    "Refusing state that is not a configured option"
                );
                return false;
            }
            state.current = Some(option.to_string());
        }
        self.core.publish_state(option, true);
        true
    }

    /// Options selected on `{base}/set`; only configured options are emitted
    pub fn subscribe_selections(&self) -> broadcast::Receiver<String> {
        self.selections.subscribe()
    }

    fn handle_command(&self, message: &IncomingMessage) {
        let options = self.options();
        match decode_option(&message.payload, &options) {
            Ok(option) => {
                debug!(entity_id = %self.core.id(), option = %option, "Option selected");
                let _ = self.selections.send(option);
            }
            Err(e) => reject_command(&self.core, message, &e),
        }
    }
}

impl Entity for Select {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        core.set_discovery_config(DiscoveryKey::CommandTopic, core.topic(SET_SUFFIX));
        core.set_discovery_config(DiscoveryKey::Options, self.options());
        super::announce(core);

        core.subscribe_command(
            SET_SUFFIX,
            command_handler(&self.this, Select::handle_command),
        );
        if let Some(current) = self.state() {
            core.publish_state(current, true);
        }
    }
}
