use super::transport::Outbound;
use anyhow::Result;
use std::sync::Mutex;
use tracing::info;

/// A request the transport handed to the broker client
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundRecord {
    Publish {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Subscribe(String),
    Unsubscribe(String),
    Disconnect,
}

/// Outbound client that records requests instead of sending them.
///
/// Backs dry-run mode, where every publish is logged, and the test suites.
pub struct MemoryOutbound {
    records: Mutex<Vec<OutboundRecord>>,
    keep_records: bool,
}

impl MemoryOutbound {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            keep_records: true,
        }
    }

    /// Log requests without keeping them
    pub fn log_only() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            keep_records: false,
        }
    }

    /// All recorded requests, oldest first
    pub fn records(&self) -> Vec<OutboundRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Recorded publishes as `(topic, payload, retain)`
    pub fn published(&self) -> Vec<(String, String, bool)> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|record| match record {
                OutboundRecord::Publish {
                    topic,
                    payload,
                    retain,
                } => Some((
                    topic.clone(),
                    String::from_utf8_lossy(payload).to_string(),
                    *retain,
                )),
                _ => None,
            })
            .collect()
    }

    /// Payloads published to one topic, oldest first
    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, payload, _)| payload)
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    fn record(&self, record: OutboundRecord) {
        if self.keep_records {
            self.records.lock().unwrap().push(record);
        }
    }
}

impl Default for MemoryOutbound {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbound for MemoryOutbound {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        info!(
            topic = %topic,
            retain = retain,
            payload = %String::from_utf8_lossy(&payload),
            "Publish"
        );
        self.record(OutboundRecord::Publish {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<()> {
        info!(filter = %filter, "Subscribe");
        self.record(OutboundRecord::Subscribe(filter.to_string()));
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.record(OutboundRecord::Unsubscribe(filter.to_string()));
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.record(OutboundRecord::Disconnect);
        Ok(())
    }
}
