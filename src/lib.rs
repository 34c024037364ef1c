// Bridge lifecycle and host availability
pub mod bridge;

// Configuration file and environment overrides
pub mod config;

// Entity framework and variants
pub mod entity;

// Host identity and topic naming
pub mod host;

// Integrations exposing host features as entities
pub mod integrations;

// MQTT transport
pub mod mqtt;
