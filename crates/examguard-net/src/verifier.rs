//! WebSocket link to the remote verifier.
//!
//! [`VerifierLink`] drives a [`CadenceStreamer`] over tokio-tungstenite. The
//! read half stays with the link and is polled by [`VerifierLink::next_event`];
//! the write half runs in a small pump task fed through an unbounded channel,
//! so [`VerifierLink::keystroke`] never awaits.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use examguard_core::{
    CadenceStats, CadenceStreamer, ChannelStatus, ClientConfig, CredentialStore, KeystrokeOutcome,
    Navigator, ProctorError, Result, TelemetrySink, TokenStorage, VerdictOutcome,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long unmount waits for the close frame to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Open the verifier channel for `token`.
pub async fn open_channel(config: &ClientConfig, token: &str) -> Result<WsStream> {
    let url = config.verifier_endpoint(token)?;
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| ProctorError::ChannelUnavailable(e.to_string()))?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Outbound half handed to the streamer.
#[derive(Debug, Default)]
pub struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<Message>>,
}

impl ChannelSink {
    /// A sink with no channel behind it; every transmit fails.
    pub fn detached() -> Self {
        Self { tx: None }
    }
}

impl TelemetrySink for ChannelSink {
    fn transmit(&mut self, payload: &str) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ProctorError::ChannelUnavailable("not connected".into()))?;
        tx.send(Message::text(payload.to_string()))
            .map_err(|_| ProctorError::ChannelUnavailable("writer stopped".into()))
    }

    fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Message::Close(None));
        }
    }
}

async fn pump(mut sink: SplitSink<WsStream, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            log::debug!("verifier write failed: {e}");
            return;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// Something the caller may want to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Continue,
    Reconnected,
    Disconnected,
    /// The verifier ended the attempt. The session is already torn down.
    Terminated(String),
}

impl LinkEvent {
    /// Map a termination to [`ProctorError::SecurityTermination`].
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Terminated(message) => Err(ProctorError::SecurityTermination(message)),
            other => Ok(other),
        }
    }
}

pub struct VerifierLink<S, N> {
    config: ClientConfig,
    streamer: CadenceStreamer<ChannelSink, S, N>,
    inbound: Option<SplitStream<WsStream>>,
    writer: Option<JoinHandle<()>>,
    attempts: u32,
    reconnect_at: Option<Instant>,
}

impl<S, N> VerifierLink<S, N>
where
    S: TokenStorage,
    N: Navigator,
{
    /// Create the streamer and try to open the channel.
    ///
    /// Never fails: an unreachable verifier or a missing credential leaves the
    /// link disconnected.
    pub async fn mount(
        config: ClientConfig,
        student_id: impl Into<String>,
        credentials: Arc<CredentialStore<S>>,
        navigator: N,
    ) -> Self {
        let streamer = CadenceStreamer::new(student_id, ChannelSink::detached(), credentials, navigator)
            .with_reconnect(config.reconnect);
        let mut link = Self {
            config,
            streamer,
            inbound: None,
            writer: None,
            attempts: 0,
            reconnect_at: None,
        };
        if !link.connect().await {
            link.schedule_reconnect();
        }
        link
    }

    pub fn status(&self) -> ChannelStatus {
        self.streamer.status()
    }

    pub fn stats(&self) -> CadenceStats {
        self.streamer.stats()
    }

    pub fn is_ended(&self) -> bool {
        self.streamer.is_ended()
    }

    pub fn streamer(&self) -> &CadenceStreamer<ChannelSink, S, N> {
        &self.streamer
    }

    /// Record a keystroke read from a monotonic clock.
    pub fn keystroke(&mut self, now_ms: f64) -> KeystrokeOutcome {
        self.streamer.record_keystroke(now_ms)
    }

    /// Wait for the next inbound event.
    ///
    /// Cancel-safe: reconnect deadlines survive being dropped mid-wait. Pends
    /// forever once the link is ended or out of reconnect attempts. Fails only
    /// when a TERMINATE verdict could not remove the stored credential; the
    /// link is ended either way.
    pub async fn next_event(&mut self) -> Result<LinkEvent> {
        loop {
            let Some(inbound) = self.inbound.as_mut() else {
                let Some(at) = self.reconnect_at else {
                    return std::future::pending().await;
                };
                tokio::time::sleep_until(at).await;
                let connected = self.connect().await;
                self.reconnect_at = None;
                if connected {
                    return Ok(LinkEvent::Reconnected);
                }
                self.schedule_reconnect();
                continue;
            };

            match inbound.next().await {
                Some(Ok(Message::Text(text))) => {
                    let outcome = self.streamer.handle_message(text.as_str());
                    if self.streamer.is_ended() {
                        self.inbound = None;
                        self.reconnect_at = None;
                    }
                    match outcome? {
                        VerdictOutcome::Terminated(message) => {
                            return Ok(LinkEvent::Terminated(message));
                        }
                        VerdictOutcome::Continue => return Ok(LinkEvent::Continue),
                        VerdictOutcome::Ignored => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.drop_connection();
                    return Ok(LinkEvent::Disconnected);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("verifier read failed: {e}");
                    self.drop_connection();
                    return Ok(LinkEvent::Disconnected);
                }
            }
        }
    }

    /// Close the channel and wait briefly for the close frame to go out.
    pub async fn unmount(mut self) {
        self.streamer.unmount();
        self.inbound = None;
        if let Some(writer) = self.writer.take()
            && tokio::time::timeout(CLOSE_GRACE, writer).await.is_err()
        {
            log::debug!("verifier close did not flush in time");
        }
    }

    async fn connect(&mut self) -> bool {
        let Some(token) = self.streamer.channel_token() else {
            log::info!("no credential; telemetry channel not opened");
            return false;
        };
        match open_channel(&self.config, &token).await {
            Ok(stream) => {
                let (write, read) = stream.split();
                let (tx, rx) = mpsc::unbounded_channel();
                if let Some(old) = self.writer.replace(tokio::spawn(pump(write, rx))) {
                    old.abort();
                }
                self.inbound = Some(read);
                self.streamer.replace_sink(ChannelSink { tx: Some(tx) });
                self.streamer.handle_open();
                self.attempts = 0;
                true
            }
            Err(e) => {
                log::warn!("{e}");
                self.streamer.handle_close();
                false
            }
        }
    }

    fn drop_connection(&mut self) {
        self.inbound = None;
        self.streamer.replace_sink(ChannelSink::detached());
        self.streamer.handle_close();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        self.attempts += 1;
        self.reconnect_at = self
            .streamer
            .reconnect_delay(self.attempts)
            .map(|delay| Instant::now() + delay);
        if let Some(at) = self.reconnect_at {
            log::info!(
                "reconnecting to verifier in {}ms (attempt {})",
                at.saturating_duration_since(Instant::now()).as_millis(),
                self.attempts
            );
        }
    }
}
