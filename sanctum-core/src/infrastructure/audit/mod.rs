//! Audit records and their fan-out.
//!
//! Every API request produces exactly one [`AuditRecord`]. Emission goes
//! through the [`AuditHub`], which forwards to live trace subscribers and,
//! when enabled, to the audit log line. Emission never fails the request.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRequest {
    pub ip: String,
    pub path: String,
    pub identity: String,
    pub enclave: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditResponse {
    pub status: u16,
    pub latency_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub time: DateTime<Utc>,
    pub request: AuditRequest,
    pub response: AuditResponse,
}

pub struct AuditHub {
    sender: broadcast::Sender<AuditRecord>,
    log_enabled: bool,
}

impl AuditHub {
    pub fn new(log_enabled: bool) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, log_enabled }
    }

    /// Delivers a record to all trace subscribers and the audit log.
    pub fn emit(&self, record: AuditRecord) {
        if self.log_enabled {
            match serde_json::to_string(&record) {
                Ok(json) => info!(target: "sanctum::audit", "{json}"),
                Err(err) => warn!("audit: failed to serialize record error={err}"),
            }
        }
        // No subscribers is the common case, not an error.
        let _ = self.sender.send(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::now_utc;

    fn record(path: &str) -> AuditRecord {
        AuditRecord {
            time: now_utc(),
            request: AuditRequest {
                ip: "127.0.0.1".to_string(),
                path: path.to_string(),
                identity: "abc".to_string(),
                enclave: "default".to_string(),
            },
            response: AuditResponse { status: 200, latency_ms: 3 },
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_records() {
        let hub = AuditHub::new(false);
        let mut rx = hub.subscribe();
        hub.emit(record("/v1/status"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.request.path, "/v1/status");
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let hub = AuditHub::new(false);
        hub.emit(record("/v1/status"));
    }
}
