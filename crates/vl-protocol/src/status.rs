//! Connection and collection status types broadcast by the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of the adapter connection.
///
/// Mutated only by the connection manager; everyone else observes it
/// through the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    ScanComplete,
    Connecting,
    Connected,
    Ready,
    Disconnecting,
    Error,
}

impl ConnectionState {
    /// Whether a fresh connect attempt may begin from this state.
    pub fn is_idle(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Scanning => "scanning",
            ConnectionState::ScanComplete => "scan_complete",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of one collection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStatus {
    /// True while a cycle is in progress, false once it settled.
    pub collecting: bool,
    /// Failure description when the cycle did not persist readings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Session the attempt belonged to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl CollectionStatus {
    pub fn started(session_id: Uuid) -> Self {
        Self {
            collecting: true,
            error: None,
            session_id: Some(session_id),
            timestamp: Utc::now(),
        }
    }

    pub fn finished(session_id: Uuid, error: Option<String>) -> Self {
        Self {
            collecting: false,
            error,
            session_id: Some(session_id),
            timestamp: Utc::now(),
        }
    }
}

/// Event published on the agent's broadcast channel.
///
/// Delivery is best effort: lagging receivers drop the oldest events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Connection {
        state: ConnectionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
    },
    Collection(CollectionStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::ScanComplete).unwrap(),
            r#""scan_complete""#
        );
        assert_eq!(
            serde_json::to_string(&ConnectionState::Ready).unwrap(),
            r#""ready""#
        );
    }

    #[test]
    fn idle_states() {
        assert!(ConnectionState::Disconnected.is_idle());
        assert!(ConnectionState::Error.is_idle());
        assert!(!ConnectionState::Ready.is_idle());
        assert!(!ConnectionState::Scanning.is_idle());
    }

    #[test]
    fn failed_status_carries_error() {
        let status = CollectionStatus::finished(Uuid::now_v7(), Some("no adapter".into()));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["collecting"], false);
        assert_eq!(json["error"], "no adapter");
    }

    #[test]
    fn event_tagging() {
        let event = AgentEvent::Connection {
            state: ConnectionState::Ready,
            device_id: Some("aa:bb".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection");
        assert_eq!(json["state"], "ready");
    }
}
