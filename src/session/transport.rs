//! Submission transport between the voice controller and the chat gateway.
//!
//! The production transport posts to the gateway's `/api/text` endpoint
//! from a worker thread that owns its own tokio runtime, so the controller
//! loop never blocks on the network. Cancellation latches a token shared
//! with the in-flight request; dropping the request future aborts the
//! connection.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::messages::SessionContext;
use crate::{BanterError, Result};

/// Notice shown when the gateway cannot be reached or answers garbage.
pub const REQUEST_FAILED_NOTICE: &str = "Sorry, there was an error processing your message.";

/// One submission to the gateway.
#[derive(Clone, Debug)]
pub struct ReplyRequest {
    /// Id used to pair outcomes with this submission and to discard stale
    /// outcomes after a cancellation
    pub id: Uuid,
    pub message: String,
    pub context: SessionContext,
    pub session_id: Option<String>,
}

impl ReplyRequest {
    pub fn new(message: impl Into<String>, context: SessionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            context,
            session_id: None,
        }
    }

    /// Attach a session id echoed back by the gateway
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Terminal outcome of one submission.
#[derive(Clone, Debug)]
pub enum ReplyOutcome {
    /// The gateway answered
    Reply {
        id: Uuid,
        text: String,
        provider: String,
    },
    /// The request failed; `notice` is safe to display
    Failed { id: Uuid, notice: String },
    /// The request was aborted before a response arrived
    Cancelled { id: Uuid },
}

impl ReplyOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            ReplyOutcome::Reply { id, .. }
            | ReplyOutcome::Failed { id, .. }
            | ReplyOutcome::Cancelled { id } => *id,
        }
    }
}

/// Transport capability the controller submits through.
pub trait ReplyTransport: Send {
    /// Queue one submission. The outcome arrives on the event channel.
    fn submit(&mut self, request: ReplyRequest) -> Result<()>;

    /// Abort the in-flight request. Unconditional and idempotent; calling
    /// it with nothing in flight is a no-op.
    fn cancel(&mut self);

    /// Event channel for submission outcomes
    fn events(&self) -> Receiver<ReplyOutcome>;
}

enum TransportCommand {
    Submit(ReplyRequest, CancellationToken),
    Shutdown,
}

/// HTTP transport posting to the gateway's text endpoint.
pub struct HttpReplyTransport {
    command_tx: Sender<TransportCommand>,
    event_rx: Receiver<ReplyOutcome>,
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl HttpReplyTransport {
    /// Create the transport and start its worker thread. `endpoint` is the
    /// full URL of the gateway text endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let (command_tx, command_rx) = bounded(16);
        let (event_tx, event_rx) = bounded(16);
        let active: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));

        thread::spawn(move || run_worker(endpoint, command_rx, event_tx));

        Self {
            command_tx,
            event_rx,
            active,
        }
    }

    /// Stop the worker thread once queued submissions have settled
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown);
    }
}

impl ReplyTransport for HttpReplyTransport {
    fn submit(&mut self, request: ReplyRequest) -> Result<()> {
        let token = CancellationToken::new();
        *self.active.lock() = Some(token.clone());
        self.command_tx
            .send(TransportCommand::Submit(request, token))
            .map_err(|e| BanterError::ChannelError(format!("failed to queue submission: {e}")))
    }

    fn cancel(&mut self) {
        // The token latches, so cancelling twice or cancelling a settled
        // request is a no-op.
        if let Some(token) = self.active.lock().as_ref() {
            token.cancel();
        }
    }

    fn events(&self) -> Receiver<ReplyOutcome> {
        self.event_rx.clone()
    }
}

fn run_worker(
    endpoint: String,
    command_rx: Receiver<TransportCommand>,
    event_tx: Sender<ReplyOutcome>,
) {
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to create transport runtime: {}", e);
            return;
        }
    };
    let client = reqwest::Client::new();

    info!("reply transport worker starting");

    loop {
        match command_rx.recv() {
            Ok(TransportCommand::Submit(request, token)) => {
                let outcome = runtime.block_on(perform(&client, &endpoint, &request, &token));
                let _ = event_tx.send(outcome);
            }
            Ok(TransportCommand::Shutdown) | Err(_) => break,
        }
    }

    info!("reply transport worker stopped");
}

async fn perform(
    client: &reqwest::Client,
    endpoint: &str,
    request: &ReplyRequest,
    token: &CancellationToken,
) -> ReplyOutcome {
    let mut body = json!({ "message": request.message });
    if let Some(session_id) = &request.session_id {
        body["session_id"] = json!(session_id);
    }
    if let Some(prompt) = &request.context.system_prompt {
        body["system_prompt"] = json!(prompt);
    }
    body["language"] = json!(request.context.language_code);

    debug!(id = %request.id, "submitting message to gateway");

    tokio::select! {
        _ = token.cancelled() => {
            debug!(id = %request.id, "submission aborted");
            ReplyOutcome::Cancelled { id: request.id }
        }
        result = client.post(endpoint).json(&body).send() => match result {
            Ok(response) => parse_response(request.id, response).await,
            Err(e) => {
                warn!(id = %request.id, error = %e, "gateway request failed");
                ReplyOutcome::Failed {
                    id: request.id,
                    notice: REQUEST_FAILED_NOTICE.to_string(),
                }
            }
        }
    }
}

async fn parse_response(id: Uuid, response: reqwest::Response) -> ReplyOutcome {
    let status = response.status();
    let body: Value = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            warn!(%id, error = %e, "gateway response was not JSON");
            return ReplyOutcome::Failed {
                id,
                notice: REQUEST_FAILED_NOTICE.to_string(),
            };
        }
    };

    let reply = body.get("reply").and_then(Value::as_str);

    if status.is_success() {
        match reply {
            Some(text) => ReplyOutcome::Reply {
                id,
                text: text.to_string(),
                provider: body
                    .get("provider")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            },
            None => ReplyOutcome::Failed {
                id,
                notice: REQUEST_FAILED_NOTICE.to_string(),
            },
        }
    } else {
        // Error bodies carry a reply the gateway already made safe to show
        ReplyOutcome::Failed {
            id,
            notice: reply.unwrap_or(REQUEST_FAILED_NOTICE).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn test_outcome_id_accessor() {
        let id = Uuid::new_v4();
        assert_eq!(ReplyOutcome::Cancelled { id }.id(), id);
        assert_eq!(
            ReplyOutcome::Failed {
                id,
                notice: "x".into()
            }
            .id(),
            id
        );
    }

    #[test]
    fn test_cancel_without_active_request_is_a_noop() {
        let mut transport = HttpReplyTransport::new("http://127.0.0.1:1/api/text");
        transport.cancel();
        transport.cancel();
        transport.shutdown();
    }

    #[test]
    fn test_unreachable_gateway_reports_failure() {
        // Reserve a port, then free it so the connection is refused
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut transport = HttpReplyTransport::new(format!("http://{addr}/api/text"));
        transport
            .submit(ReplyRequest::new("hello", SessionContext::default()))
            .unwrap();

        let outcome = transport
            .events()
            .recv_timeout(Duration::from_secs(10))
            .expect("worker should report an outcome");
        match outcome {
            ReplyOutcome::Failed { notice, .. } => assert_eq!(notice, REQUEST_FAILED_NOTICE),
            other => panic!("expected Failed, got {other:?}"),
        }
        transport.shutdown();
    }

    #[test]
    fn test_cancel_aborts_in_flight_request() {
        // Accept the connection but never answer, so the request hangs
        // until it is cancelled
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let _conn = listener.accept();
            thread::sleep(Duration::from_secs(5));
        });

        let mut transport = HttpReplyTransport::new(format!("http://{addr}/api/text"));
        transport
            .submit(ReplyRequest::new("hello", SessionContext::default()))
            .unwrap();

        thread::sleep(Duration::from_millis(200));
        transport.cancel();
        transport.cancel(); // must stay a no-op the second time

        let outcome = transport
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should report an outcome");
        assert!(matches!(outcome, ReplyOutcome::Cancelled { .. }));

        transport.shutdown();
        let _ = server.join();
    }

    #[test]
    fn test_request_carries_context() {
        let request = ReplyRequest::new(
            "hi",
            SessionContext::new()
                .with_persona("You are terse.")
                .with_language("de-DE"),
        )
        .with_session_id("s-1");

        assert_eq!(request.message, "hi");
        assert_eq!(request.session_id.as_deref(), Some("s-1"));
        assert_eq!(request.context.language_code, "de-DE");
    }
}
