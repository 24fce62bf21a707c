//! WebSocket cadence streaming for the exam page.
//!
//! [`ExamGuard`] owns a [`CadenceStreamer`] and the browser `WebSocket` it
//! talks through. Socket callbacks hold only a weak reference to the shared
//! state, so dropping the guard (or calling `unmount`) releases everything.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use examguard_core::{
    CadenceStreamer, ClientConfig, CredentialStore, KeystrokeOutcome, ProctorError,
    ReconnectPolicy, Result, TelemetrySink,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use crate::browser::{BrowserNavigator, LocalStorage};
use crate::performance_now;

/// Outbound half: the live socket, if any.
pub struct WsSink {
    socket: Option<WebSocket>,
}

impl TelemetrySink for WsSink {
    fn transmit(&mut self, payload: &str) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ProctorError::ChannelUnavailable("not connected".into()))?;
        socket
            .send_with_str(payload)
            .map_err(|e| ProctorError::ChannelUnavailable(format!("{e:?}")))
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            let _ = socket.close();
        }
    }
}

type Streamer = CadenceStreamer<WsSink, LocalStorage, BrowserNavigator>;

struct Handlers {
    on_open: Closure<dyn FnMut()>,
    on_close: Closure<dyn FnMut(CloseEvent)>,
    on_message: Closure<dyn FnMut(MessageEvent)>,
}

struct Inner {
    config: ClientConfig,
    streamer: Streamer,
    socket: Option<WebSocket>,
    handlers: Option<Handlers>,
    attempts: u32,
}

impl Inner {
    /// Unhook and close the current socket so its late events never reach
    /// dropped closures and no orphaned connection stays open.
    fn detach(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.set_onopen(None);
            socket.set_onclose(None);
            socket.set_onmessage(None);
            if let Err(e) = socket.close() {
                log::debug!("closing previous telemetry socket: {e:?}");
            }
        }
        self.handlers = None;
    }
}

fn connect(shared: &Rc<RefCell<Inner>>) {
    let mut inner = shared.borrow_mut();
    inner.detach();

    let Some(token) = inner.streamer.channel_token() else {
        log::info!("no credential; telemetry channel not opened");
        return;
    };
    let socket = match inner
        .config
        .verifier_endpoint(&token)
        .map_err(|e| e.to_string())
        .and_then(|url| WebSocket::new(url.as_str()).map_err(|e| format!("{e:?}")))
    {
        Ok(socket) => socket,
        Err(e) => {
            log::warn!("telemetry channel unavailable: {e}");
            inner.streamer.handle_close();
            drop(inner);
            schedule_reconnect(shared);
            return;
        }
    };

    let weak = Rc::downgrade(shared);
    let on_open = {
        let weak = Weak::clone(&weak);
        Closure::<dyn FnMut()>::new(move || {
            if let Some(shared) = weak.upgrade() {
                let mut inner = shared.borrow_mut();
                inner.attempts = 0;
                inner.streamer.handle_open();
            }
        })
    };
    let on_close = {
        let weak = Weak::clone(&weak);
        Closure::<dyn FnMut(CloseEvent)>::new(move |_event: CloseEvent| {
            if let Some(shared) = weak.upgrade() {
                {
                    let mut inner = shared.borrow_mut();
                    inner.streamer.replace_sink(WsSink { socket: None });
                    inner.streamer.handle_close();
                }
                schedule_reconnect(&shared);
            }
        })
    };
    let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        let Some(text) = event.data().as_string() else {
            return;
        };
        if let Some(shared) = weak.upgrade()
            && let Err(e) = shared.borrow_mut().streamer.handle_message(&text)
        {
            log::error!("session teardown incomplete: {e}");
        }
    });

    socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
    socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));
    socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

    inner.streamer.replace_sink(WsSink {
        socket: Some(socket.clone()),
    });
    inner.socket = Some(socket);
    inner.handlers = Some(Handlers {
        on_open,
        on_close,
        on_message,
    });
}

fn schedule_reconnect(shared: &Rc<RefCell<Inner>>) {
    let delay = {
        let mut inner = shared.borrow_mut();
        inner.attempts += 1;
        inner.streamer.reconnect_delay(inner.attempts)
    };
    let Some(delay) = delay else {
        return;
    };
    let Some(window) = web_sys::window() else {
        return;
    };
    let weak = Rc::downgrade(shared);
    let retry = Closure::once_into_js(move || {
        if let Some(shared) = weak.upgrade() {
            connect(&shared);
        }
    });
    let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
    if let Err(e) =
        window.set_timeout_with_callback_and_timeout_and_arguments_0(retry.unchecked_ref(), millis)
    {
        log::warn!("failed to schedule reconnect: {e:?}");
    }
}

/// Live telemetry for one exam page.
///
/// ```js
/// const guard = new ExamGuard("1", "ws://localhost:8080/ws");
/// guard.mount();
/// textarea.addEventListener("keydown", () => guard.handleKeyDown());
/// // ...
/// guard.unmount();
/// ```
#[wasm_bindgen]
pub struct ExamGuard {
    shared: Rc<RefCell<Inner>>,
}

#[wasm_bindgen]
impl ExamGuard {
    /// `reconnect` is `"never"` (default) or e.g. `"3x500ms"`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        student_id: String,
        verifier_url: Option<String>,
        reconnect: Option<String>,
    ) -> std::result::Result<ExamGuard, JsValue> {
        let mut config = ClientConfig::default();
        if let Some(url) = verifier_url {
            config.verifier_url = url;
        }
        if let Some(policy) = reconnect {
            config.reconnect = policy
                .parse::<ReconnectPolicy>()
                .map_err(|e| JsValue::from_str(&e))?;
        }
        let credentials = Arc::new(CredentialStore::with_key(
            LocalStorage,
            config.token_key.clone(),
        ));
        let streamer = CadenceStreamer::new(
            student_id,
            WsSink { socket: None },
            credentials,
            BrowserNavigator,
        )
        .with_reconnect(config.reconnect);
        Ok(ExamGuard {
            shared: Rc::new(RefCell::new(Inner {
                config,
                streamer,
                socket: None,
                handlers: None,
                attempts: 0,
            })),
        })
    }

    /// Open the channel if a session credential is present.
    pub fn mount(&self) {
        connect(&self.shared);
    }

    /// Record a keystroke now. Returns what happened to it:
    /// `first`, `sent`, `dropped-disconnected`, `dropped-non-positive` or `ended`.
    #[wasm_bindgen(js_name = handleKeyDown)]
    pub fn handle_key_down(&self) -> String {
        let outcome = self
            .shared
            .borrow_mut()
            .streamer
            .record_keystroke(performance_now());
        match outcome {
            KeystrokeOutcome::First => "first",
            KeystrokeOutcome::Sent(_) => "sent",
            KeystrokeOutcome::DroppedDisconnected => "dropped-disconnected",
            KeystrokeOutcome::DroppedNonPositive => "dropped-non-positive",
            KeystrokeOutcome::Ended => "ended",
        }
        .to_string()
    }

    /// `"secure"` or `"disconnected"`.
    pub fn status(&self) -> String {
        self.shared.borrow().streamer.status().to_string()
    }

    /// Keystroke counters as a JSON string.
    pub fn stats(&self) -> String {
        serde_json::to_string(&self.shared.borrow().streamer.stats()).unwrap_or_default()
    }

    /// Close the channel. Safe to call more than once.
    pub fn unmount(&self) {
        let mut inner = self.shared.borrow_mut();
        inner.streamer.unmount();
        inner.detach();
    }
}

impl Drop for ExamGuard {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.shared.try_borrow_mut() {
            inner.streamer.unmount();
            inner.detach();
        }
    }
}
