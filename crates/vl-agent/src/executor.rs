//! Command executor — drives the shared request/response protocol for
//! every catalog command through the attached modem session.
//!
//! Per command: configure the transmit and flow-control headers (skipped
//! while the header is unchanged), transmit the request, and hand the
//! prompt-terminated response to the frame assembler and the spec's
//! decoder.

use tokio::sync::Mutex;

use vl_ble::ModemSession;
use vl_protocol::command::CommandSpec;
use vl_protocol::fields::FieldMap;
use vl_protocol::frame;
use vl_protocol::ProtocolError;

use crate::error::{AgentError, AgentResult};

/// Sentinel responses meaning "no data for this request" rather than a
/// transport problem.
const SOFT_FAILURES: [&str; 2] = ["NO DATA", "CAN ERROR"];

/// Flow-control separation-time/block-size parameter sent whenever the
/// header changes.
const FLOW_CONTROL_DATA: &str = "300000";

struct ExecutorState {
    session: Option<ModemSession>,
    /// Transmit header currently configured on the adapter.
    header: Option<&'static str>,
}

/// Exclusive owner of the active modem session.
///
/// Only one caller runs commands at a time — the session mutex plus the
/// single-flight collection guard keep the protocol strictly sequential.
pub struct CommandExecutor {
    state: Mutex<ExecutorState>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExecutorState {
                session: None,
                header: None,
            }),
        }
    }

    /// Bind a freshly initialized modem session.
    pub async fn attach(&self, session: ModemSession) {
        let mut state = self.state.lock().await;
        state.session = Some(session);
        state.header = None;
    }

    /// Drop the active session, if any.
    pub async fn detach(&self) {
        let mut state = self.state.lock().await;
        state.session = None;
        state.header = None;
    }

    pub async fn is_attached(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Run one command and decode its response into a field map.
    ///
    /// Soft failures — sentinel responses, malformed frames, undecodable
    /// payloads — come back as an empty map, since many commands are
    /// legitimately unsupported per vehicle variant. Hard errors are
    /// reserved for misuse (no attached session) and transport failures.
    pub async fn run(&self, spec: &CommandSpec) -> AgentResult<FieldMap> {
        let mut state = self.state.lock().await;
        let ExecutorState { session, header } = &mut *state;
        let Some(session) = session.as_mut() else {
            return Err(AgentError::Protocol(ProtocolError::SessionNotReady));
        };

        if *header != Some(spec.header) {
            session
                .send_command(&format!("ATSH{}", spec.header), true)
                .await?;
            session
                .send_command(&format!("ATFCSH{}", spec.header), true)
                .await?;
            session
                .send_command(&format!("ATFCSD{FLOW_CONTROL_DATA}"), true)
                .await?;
            session.send_command("ATFCSM1", true).await?;
            *header = Some(spec.header);
        }

        let response = session.send_command(spec.request, false).await?;
        if is_soft_failure(&response) {
            tracing::debug!(command = spec.id, response = %response, "no data for command");
            return Ok(FieldMap::new());
        }

        let payload = match frame::assemble(&response) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(command = spec.id, error = %err, "discarding malformed response");
                return Ok(FieldMap::new());
            }
        };

        let fields = (spec.decode)(&payload);
        if fields.is_empty() {
            tracing::debug!(command = spec.id, "decoder produced no fields");
        }
        Ok(fields)
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_soft_failure(response: &str) -> bool {
    response.is_empty() || SOFT_FAILURES.iter().any(|s| response.contains(s))
}
