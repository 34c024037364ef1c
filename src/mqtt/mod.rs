// MQTT transport: one broker connection shared by every entity

mod client;
mod memory;
mod transport;

pub use client::{MqttDriver, ShutdownHandle};
pub use memory::{MemoryOutbound, OutboundRecord};
pub use transport::{
    ConnectionState, IncomingMessage, MessageHandler, Outbound, Subscription, Transport,
};

#[cfg(test)]
mod tests;
