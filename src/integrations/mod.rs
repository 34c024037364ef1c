//! Host integrations built on the entity framework.
//!
//! An integration owns its entities and the tasks consuming their command
//! channels. Dropping it (or calling [`Integration::shutdown`]) tears both
//! down.

pub mod scripts;

use crate::config::BridgeConfig;
use crate::entity::EntityContext;
use tracing::info;

pub use self::scripts::Scripts;

pub trait Integration: Send {
    fn name(&self) -> &'static str;

    /// Stop background tasks; entities go away when the integration is dropped
    fn shutdown(&self);
}

/// Create every integration enabled by the configuration.
///
/// Must be called from within a tokio runtime.
pub fn start_integrations(
    context: &EntityContext,
    config: &BridgeConfig,
) -> Vec<Box<dyn Integration>> {
    let mut integrations: Vec<Box<dyn Integration>> = Vec::new();

    if let Some(scripts) = Scripts::start(context, &config.scripts) {
        integrations.push(Box::new(scripts));
    }

    info!(
        count = integrations.len(),
        names = ?integrations.iter().map(|i| i.name()).collect::<Vec<_>>(),
        "Integrations started"
    );
    integrations
}
