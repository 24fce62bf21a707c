//! Keystroke cadence streaming.
//!
//! [`CadenceStreamer`] owns the live telemetry channel for the duration of an
//! exam page. It is a sans-IO state machine: adapters report channel events
//! (`handle_open`, `handle_close`, `handle_message`) and keystrokes, and the
//! streamer pushes outbound samples through a [`TelemetrySink`].
//!
//! ```text
//!            handle_open                  TERMINATE / unmount
//! Disconnected ----------> Secure ------------------------------> (ended)
//!      ^                     |
//!      +---- handle_close ---+
//! ```
//!
//! Flight time is the delta between two monotonic clock readings. The first
//! keystroke of a page lifetime yields no sample, non-positive deltas are
//! dropped as malformed, and samples computed while disconnected are dropped
//! rather than queued: a stale timing sample is meaningless to a live
//! biometric signal.

use std::sync::Arc;
use std::time::Duration;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::ReconnectPolicy;
use crate::credential::{CredentialStore, TokenStorage};
use crate::error::{ProctorError, Result};
use crate::navigation::{Navigator, Route};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// [`Instant`]-based clock, zeroed at construction.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

#[cfg(not(target_arch = "wasm32"))]
impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

/// One outbound timing feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceSample {
    pub student_id: String,
    /// Milliseconds since the previous keystroke. Always positive.
    pub flight_time: f64,
    /// Reserved; always 0.
    pub dwell_time: f64,
}

impl CadenceSample {
    /// Wire form sent to the verifier.
    pub fn to_wire(&self) -> String {
        serde_json::json!({
            "student_id": self.student_id,
            "flight_time": self.flight_time,
            "dwell_time": self.dwell_time,
        })
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictKind {
    Continue,
    Terminate,
    #[serde(other)]
    Unknown,
}

/// Inbound decision from the remote verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default = "unknown_kind")]
    pub status: VerdictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn unknown_kind() -> VerdictKind {
    VerdictKind::Unknown
}

impl Verdict {
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProctorError::MalformedVerdict(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Channel status & sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Disconnected,
    Secure,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Secure => write!(f, "secure"),
        }
    }
}

/// Outbound half of the telemetry channel.
pub trait TelemetrySink {
    fn transmit(&mut self, payload: &str) -> Result<()>;
    fn close(&mut self);
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Box<T> {
    fn transmit(&mut self, payload: &str) -> Result<()> {
        (**self).transmit(payload)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

// ---------------------------------------------------------------------------
// Outcomes & stats
// ---------------------------------------------------------------------------

/// What happened to one keystroke.
#[derive(Debug, Clone, PartialEq)]
pub enum KeystrokeOutcome {
    /// First keystroke of the page lifetime; nothing to measure yet.
    First,
    Sent(CadenceSample),
    DroppedDisconnected,
    /// Clock went backwards, stood still or returned a non-finite reading.
    DroppedNonPositive,
    /// The streamer was terminated or unmounted.
    Ended,
}

/// What an inbound message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictOutcome {
    Continue,
    Terminated(String),
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CadenceStats {
    pub keystrokes: u64,
    pub sent: u64,
    pub dropped_disconnected: u64,
    pub dropped_non_positive: u64,
}

// ---------------------------------------------------------------------------
// Streamer
// ---------------------------------------------------------------------------

/// Message shown when the verifier terminates without a reason.
pub const DEFAULT_TERMINATION_MESSAGE: &str = "Automated typing pattern detected.";

pub struct CadenceStreamer<T, S, N> {
    student_id: String,
    sink: T,
    credentials: Arc<CredentialStore<S>>,
    navigator: N,
    reconnect: ReconnectPolicy,
    status: ChannelStatus,
    last_keystroke_ms: Option<f64>,
    ended: bool,
    stats: CadenceStats,
}

impl<T, S, N> CadenceStreamer<T, S, N>
where
    T: TelemetrySink,
    S: TokenStorage,
    N: Navigator,
{
    pub fn new(
        student_id: impl Into<String>,
        sink: T,
        credentials: Arc<CredentialStore<S>>,
        navigator: N,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            sink,
            credentials,
            navigator,
            reconnect: ReconnectPolicy::Never,
            status: ChannelStatus::Disconnected,
            last_keystroke_ms: None,
            ended: false,
            stats: CadenceStats::default(),
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Credential to open the channel with, if a session exists.
    pub fn channel_token(&self) -> Option<String> {
        if self.ended {
            return None;
        }
        self.credentials.get()
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn stats(&self) -> CadenceStats {
        self.stats
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    /// Swap in the outbound half of a freshly opened channel.
    pub fn replace_sink(&mut self, sink: T) {
        self.sink = sink;
    }

    pub fn handle_open(&mut self) {
        if self.ended {
            return;
        }
        if self.status != ChannelStatus::Secure {
            log::info!("telemetry channel secure");
        }
        self.status = ChannelStatus::Secure;
    }

    pub fn handle_close(&mut self) {
        if self.status != ChannelStatus::Disconnected {
            log::warn!("telemetry channel disconnected");
        }
        self.status = ChannelStatus::Disconnected;
    }

    /// Delay before reconnect attempt `attempt` (1-based), if one is due.
    pub fn reconnect_delay(&self, attempt: u32) -> Option<Duration> {
        if self.ended || self.status == ChannelStatus::Secure {
            return None;
        }
        self.reconnect.delay_for(attempt)
    }

    /// Record a keystroke at the streamer's own notion of now.
    pub fn on_keystroke(&mut self, clock: &impl Clock) -> KeystrokeOutcome {
        self.record_keystroke(clock.now_ms())
    }

    /// Record a keystroke observed at `now_ms` on a monotonic clock.
    pub fn record_keystroke(&mut self, now_ms: f64) -> KeystrokeOutcome {
        if self.ended {
            return KeystrokeOutcome::Ended;
        }
        self.stats.keystrokes += 1;

        let previous = self.last_keystroke_ms.replace(now_ms);
        let Some(previous) = previous else {
            return KeystrokeOutcome::First;
        };

        let flight_time = now_ms - previous;
        if !(flight_time > 0.0 && flight_time.is_finite()) {
            if flight_time != 0.0 {
                log::warn!("unusable keystroke clock delta ({flight_time:.3}ms); sample dropped");
            }
            self.stats.dropped_non_positive += 1;
            return KeystrokeOutcome::DroppedNonPositive;
        }

        if self.status != ChannelStatus::Secure {
            log::debug!("channel disconnected; dropping {flight_time:.1}ms sample");
            self.stats.dropped_disconnected += 1;
            return KeystrokeOutcome::DroppedDisconnected;
        }

        let sample = CadenceSample {
            student_id: self.student_id.clone(),
            flight_time,
            dwell_time: 0.0,
        };
        match self.sink.transmit(&sample.to_wire()) {
            Ok(()) => {
                self.stats.sent += 1;
                KeystrokeOutcome::Sent(sample)
            }
            Err(e) => {
                log::warn!("telemetry send failed: {e}");
                self.handle_close();
                self.stats.dropped_disconnected += 1;
                KeystrokeOutcome::DroppedDisconnected
            }
        }
    }

    /// Dispatch one inbound channel message.
    ///
    /// Malformed messages are ignored. A TERMINATE verdict clears the
    /// credential, notifies the user, navigates away from the exam and closes
    /// the channel; nothing is sent afterwards. If the credential cannot be
    /// removed the rest of the teardown still happens and the storage error
    /// is returned.
    pub fn handle_message(&mut self, text: &str) -> Result<VerdictOutcome> {
        if self.ended {
            return Ok(VerdictOutcome::Ignored);
        }
        let verdict = match Verdict::decode(text) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("{e}");
                return Ok(VerdictOutcome::Ignored);
            }
        };

        match verdict.status {
            VerdictKind::Terminate => {
                let message = verdict
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TERMINATION_MESSAGE.to_string());
                self.terminate(&message)?;
                Ok(VerdictOutcome::Terminated(message))
            }
            VerdictKind::Continue => Ok(VerdictOutcome::Continue),
            VerdictKind::Unknown => Ok(VerdictOutcome::Ignored),
        }
    }

    /// Close the channel deterministically when the exam page goes away.
    pub fn unmount(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.sink.close();
        self.status = ChannelStatus::Disconnected;
        log::debug!("cadence streamer unmounted");
    }

    fn terminate(&mut self, message: &str) -> Result<()> {
        log::warn!("verifier terminated the exam attempt: {message}");
        self.ended = true;
        let cleared = self.credentials.clear();
        self.sink.close();
        self.status = ChannelStatus::Disconnected;
        self.navigator
            .notify(&format!("SECURITY VIOLATION: {message}"));
        self.navigator.navigate(Route::Dashboard);
        cleared.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::credential::MemoryStorage;
    use crate::navigation::{NavigationEvent, RecordingNavigator};

    /// Sink that records transmitted payloads.
    #[derive(Clone, Default)]
    struct Recorder {
        sent: Rc<RefCell<Vec<String>>>,
        closed: Rc<RefCell<bool>>,
        fail: bool,
    }

    impl Recorder {
        fn samples(&self) -> Vec<CadenceSample> {
            self.sent
                .borrow()
                .iter()
                .map(|s| serde_json::from_str(s).unwrap())
                .collect()
        }
    }

    impl TelemetrySink for Recorder {
        fn transmit(&mut self, payload: &str) -> Result<()> {
            if self.fail {
                return Err(ProctorError::ChannelUnavailable("closed".into()));
            }
            self.sent.borrow_mut().push(payload.to_string());
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.borrow_mut() = true;
        }
    }

    type Streamer = CadenceStreamer<Recorder, MemoryStorage, Arc<RecordingNavigator>>;

    fn streamer() -> (Streamer, Recorder, Arc<RecordingNavigator>) {
        let sink = Recorder::default();
        let nav = Arc::new(RecordingNavigator::new());
        let store = Arc::new(CredentialStore::new(MemoryStorage::new()));
        store.set("tok1").unwrap();
        let s = CadenceStreamer::new("1", sink.clone(), store, Arc::clone(&nav));
        (s, sink, nav)
    }

    // -----------------------------------------------------------------------
    // Feature extraction
    // -----------------------------------------------------------------------

    #[test]
    fn three_keystrokes_yield_two_samples() {
        let (mut s, sink, _) = streamer();
        s.handle_open();

        assert_eq!(s.record_keystroke(0.0), KeystrokeOutcome::First);
        s.record_keystroke(120.0);
        s.record_keystroke(305.0);

        let samples = sink.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].flight_time, 120.0);
        assert_eq!(samples[1].flight_time, 185.0);
        assert!(samples.iter().all(|x| x.dwell_time == 0.0 && x.student_id == "1"));
    }

    #[test]
    fn wire_format_matches_verifier() {
        let (mut s, sink, _) = streamer();
        s.handle_open();
        s.record_keystroke(10.0);
        s.record_keystroke(60.5);
        let raw: serde_json::Value = serde_json::from_str(&sink.sent.borrow()[0]).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"student_id": "1", "flight_time": 50.5, "dwell_time": 0.0})
        );
    }

    #[test]
    fn decreasing_timestamps_are_dropped() {
        let (mut s, sink, _) = streamer();
        s.handle_open();
        s.record_keystroke(500.0);
        assert_eq!(s.record_keystroke(400.0), KeystrokeOutcome::DroppedNonPositive);
        assert_eq!(s.record_keystroke(400.0), KeystrokeOutcome::DroppedNonPositive);
        s.record_keystroke(450.0);

        let samples = sink.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].flight_time, 50.0);
        assert!(samples.iter().all(|x| x.flight_time > 0.0));
        assert_eq!(s.stats().dropped_non_positive, 2);
    }

    #[test]
    fn non_finite_clock_readings_count_as_clock_faults() {
        let (mut s, sink, _) = streamer();
        s.handle_open();
        s.record_keystroke(0.0);
        assert_eq!(
            s.record_keystroke(f64::INFINITY),
            KeystrokeOutcome::DroppedNonPositive
        );
        assert_eq!(s.record_keystroke(f64::NAN), KeystrokeOutcome::DroppedNonPositive);
        s.record_keystroke(10.0);
        s.record_keystroke(30.0);

        assert_eq!(sink.samples().len(), 1);
        assert_eq!(sink.samples()[0].flight_time, 20.0);
        let stats = s.stats();
        assert_eq!(stats.dropped_non_positive, 3);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.dropped_disconnected, 0);
    }

    #[test]
    fn samples_while_disconnected_are_dropped_not_queued() {
        let (mut s, sink, _) = streamer();
        s.record_keystroke(0.0);
        assert_eq!(s.record_keystroke(100.0), KeystrokeOutcome::DroppedDisconnected);

        s.handle_open();
        s.record_keystroke(250.0);
        s.handle_close();
        s.record_keystroke(300.0);

        let samples = sink.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].flight_time, 150.0);
        assert_eq!(s.stats().dropped_disconnected, 2);
        assert_eq!(s.stats().keystrokes, 4);
    }

    #[test]
    fn send_failure_degrades_to_disconnected() {
        let (mut s, mut sink, _) = streamer();
        sink.fail = true;
        s.replace_sink(sink.clone());
        s.handle_open();
        s.record_keystroke(0.0);
        assert_eq!(s.record_keystroke(10.0), KeystrokeOutcome::DroppedDisconnected);
        assert_eq!(s.status(), ChannelStatus::Disconnected);
    }

    #[test]
    fn uses_supplied_clock() {
        struct Fixed(f64);
        impl Clock for Fixed {
            fn now_ms(&self) -> f64 {
                self.0
            }
        }
        let (mut s, sink, _) = streamer();
        s.handle_open();
        s.on_keystroke(&Fixed(1.0));
        s.on_keystroke(&Fixed(91.0));
        assert_eq!(sink.samples()[0].flight_time, 90.0);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    #[test]
    fn status_transitions() {
        let (mut s, _, _) = streamer();
        assert_eq!(s.status(), ChannelStatus::Disconnected);
        s.handle_open();
        assert_eq!(s.status().to_string(), "secure");
        s.handle_close();
        assert_eq!(s.status().to_string(), "disconnected");
    }

    #[test]
    fn channel_token_requires_session() {
        let (s, _, _) = streamer();
        assert_eq!(s.channel_token().as_deref(), Some("tok1"));
        s.credentials.clear().unwrap();
        assert_eq!(s.channel_token(), None);
    }

    // -----------------------------------------------------------------------
    // Verdicts
    // -----------------------------------------------------------------------

    #[test]
    fn terminate_ends_session_and_stops_samples() {
        let (mut s, sink, nav) = streamer();
        s.handle_open();
        s.record_keystroke(0.0);
        s.record_keystroke(100.0);

        let outcome = s
            .handle_message(r#"{"status":"TERMINATE","message":"Automated typing pattern detected."}"#)
            .unwrap();
        assert_eq!(
            outcome,
            VerdictOutcome::Terminated("Automated typing pattern detected.".into())
        );

        for t in [200.0, 300.0, 400.0] {
            assert_eq!(s.record_keystroke(t), KeystrokeOutcome::Ended);
        }
        assert_eq!(sink.samples().len(), 1);
        assert_eq!(s.channel_token(), None);
        assert!(s.credentials.get().is_none());
        assert!(*sink.closed.borrow());
        assert_eq!(s.status(), ChannelStatus::Disconnected);
        assert_eq!(
            nav.events(),
            vec![
                NavigationEvent::Notified(
                    "SECURITY VIOLATION: Automated typing pattern detected.".into()
                ),
                NavigationEvent::Navigated(Route::Dashboard),
            ]
        );
    }

    #[test]
    fn terminate_reports_credential_that_could_not_be_removed() {
        struct Sticky(MemoryStorage);
        impl TokenStorage for Sticky {
            fn read(&self, key: &str) -> Option<String> {
                self.0.read(key)
            }
            fn write(&self, key: &str, value: &str) -> Result<()> {
                self.0.write(key, value)
            }
            fn remove(&self, _key: &str) -> Result<()> {
                Err(ProctorError::Storage("read-only volume".into()))
            }
        }

        let sink = Recorder::default();
        let nav = Arc::new(RecordingNavigator::new());
        let store = Arc::new(CredentialStore::new(Sticky(MemoryStorage::new())));
        store.set("tok1").unwrap();
        let mut s = CadenceStreamer::new("1", sink.clone(), store, Arc::clone(&nav));
        s.handle_open();

        let err = s
            .handle_message(r#"{"status":"TERMINATE","message":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, ProctorError::Storage(_)));
        // Everything else still tears down.
        assert!(s.is_ended());
        assert!(*sink.closed.borrow());
        assert_eq!(nav.navigations_to(Route::Dashboard), 1);
        assert_eq!(s.record_keystroke(5.0), KeystrokeOutcome::Ended);
    }

    #[test]
    fn terminate_without_message_uses_default() {
        let (mut s, _, _) = streamer();
        assert_eq!(
            s.handle_message(r#"{"status":"TERMINATE"}"#).unwrap(),
            VerdictOutcome::Terminated(DEFAULT_TERMINATION_MESSAGE.into())
        );
    }

    #[test]
    fn second_terminate_is_ignored() {
        let (mut s, _, nav) = streamer();
        s.handle_message(r#"{"status":"TERMINATE","message":"x"}"#).unwrap();
        assert_eq!(
            s.handle_message(r#"{"status":"TERMINATE","message":"x"}"#).unwrap(),
            VerdictOutcome::Ignored
        );
        assert_eq!(nav.navigations_to(Route::Dashboard), 1);
    }

    #[test]
    fn continue_and_unknown_keep_channel_open() {
        let (mut s, _, nav) = streamer();
        s.handle_open();
        assert_eq!(
            s.handle_message(r#"{"status":"CONTINUE"}"#).unwrap(),
            VerdictOutcome::Continue
        );
        assert_eq!(
            s.handle_message(r#"{"status":"WARN","message":"?"}"#).unwrap(),
            VerdictOutcome::Ignored
        );
        assert_eq!(
            s.handle_message(r#"{"message":"no kind"}"#).unwrap(),
            VerdictOutcome::Ignored
        );
        assert_eq!(s.status(), ChannelStatus::Secure);
        assert!(nav.events().is_empty());
    }

    #[test]
    fn malformed_messages_are_ignored() {
        let (mut s, _, _) = streamer();
        s.handle_open();
        for junk in ["", "not json", "[1,2]", r#"{"status":42}"#] {
            assert_eq!(s.handle_message(junk).unwrap(), VerdictOutcome::Ignored);
        }
        assert_eq!(s.status(), ChannelStatus::Secure);
        assert!(s.credentials.get().is_some());
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn unmount_closes_channel_once() {
        let (mut s, sink, nav) = streamer();
        s.handle_open();
        s.unmount();
        s.unmount();
        assert!(*sink.closed.borrow());
        assert!(s.is_ended());
        assert_eq!(s.record_keystroke(1.0), KeystrokeOutcome::Ended);
        // Unmounting is not a verdict: the session survives.
        assert!(s.credentials.get().is_some());
        assert!(nav.events().is_empty());
    }

    #[test]
    fn reconnect_follows_policy() {
        let (s, _, _) = streamer();
        assert_eq!(s.reconnect_delay(1), None);

        let (s, _, _) = streamer();
        let mut s = s.with_reconnect(ReconnectPolicy::Fixed {
            attempts: 1,
            delay_ms: 250,
        });
        assert_eq!(s.reconnect_delay(1), Some(Duration::from_millis(250)));
        assert_eq!(s.reconnect_delay(2), None);
        s.handle_open();
        assert_eq!(s.reconnect_delay(1), None);
        s.handle_close();
        s.unmount();
        assert_eq!(s.reconnect_delay(1), None);
    }
}
