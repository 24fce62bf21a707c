//! examguard WebAssembly bindings: the exam client inside a browser page.
//!
//! Exposes via `wasm-bindgen`:
//!
//! 1. **`ProctorSession`**: login, session probe, registration and answer
//!    submission over `fetch`, with the credential in `localStorage`
//! 2. **`ExamGuard`**: keystroke cadence streaming over a `WebSocket`
//! 3. **Forensic rendering**: bait field markup, poisoned question text and
//!    canvas watermarking
//!
//! All decisions stay server-side. The page only reports and obeys verdicts.

use examguard_core::{BaitRenderer, PoisonMarker, WatermarkId};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

mod browser;
mod canvas;
mod session;
mod telemetry;

pub use browser::{BrowserNavigator, FetchDispatcher, LocalStorage};
pub use canvas::paint_secure_question;
pub use session::ProctorSession;
pub use telemetry::{ExamGuard, WsSink};

// ---------------------------------------------------------------------------
// Browser API helpers
// ---------------------------------------------------------------------------

/// Get `performance.now()` as f64 milliseconds.
pub(crate) fn performance_now() -> f64 {
    js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("performance"))
        .ok()
        .and_then(|perf| js_sys::Reflect::get(&perf, &JsValue::from_str("now")).ok())
        .and_then(|func| {
            let func: js_sys::Function = func.dyn_into().ok()?;
            func.call0(&js_sys::global().into()).ok()?.as_f64()
        })
        .unwrap_or(0.0)
}

/// Fill a buffer with `crypto.getRandomValues()`.
pub(crate) fn crypto_get_random(buf: &mut [u8]) -> bool {
    let crypto = match js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("crypto")) {
        Ok(c) if !c.is_undefined() => c,
        _ => return false,
    };
    let func = match js_sys::Reflect::get(&crypto, &JsValue::from_str("getRandomValues"))
        .ok()
        .and_then(|f| f.dyn_into::<js_sys::Function>().ok())
    {
        Some(f) => f,
        None => return false,
    };

    let array = js_sys::Uint8Array::new_with_length(buf.len() as u32);
    if func.call1(&crypto, &array).is_err() {
        return false;
    }
    array.copy_to(buf);
    true
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Route `log` output to the browser console. `level` defaults to `info`.
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: Option<String>) {
    let level = match level.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("trace") => log::Level::Trace,
        Some("debug") => log::Level::Debug,
        Some("warn") => log::Level::Warn,
        Some("error") => log::Level::Error,
        _ => log::Level::Info,
    };
    wasm_logger::init(wasm_logger::Config::new(level));
}

// ---------------------------------------------------------------------------
// Forensic markup
// ---------------------------------------------------------------------------

/// Hidden bait input to place inside the exam form.
#[wasm_bindgen(js_name = baitFieldHtml)]
pub fn bait_field_html() -> String {
    BaitRenderer.render_html()
}

/// Question markup carrying an invisible trap word.
#[wasm_bindgen(js_name = poisonedQuestionHtml)]
pub fn poisoned_question_html(question: &str, trap_word: Option<String>) -> String {
    trap_word
        .map(PoisonMarker::new)
        .unwrap_or_default()
        .poisoned_question_html(question)
}

#[wasm_bindgen(js_name = containsPoisonMarker)]
pub fn contains_poison_marker(text: &str, trap_word: Option<String>) -> bool {
    trap_word
        .map(PoisonMarker::new)
        .unwrap_or_default()
        .detect_in(text)
}

/// Fresh watermark identifier for one rendering of a question.
#[wasm_bindgen(js_name = watermarkId)]
pub fn watermark_id(student_id: f64, exam_id: &str, question_id: &str) -> String {
    let mut nonce = [0u8; 16];
    if !crypto_get_random(&mut nonce) {
        nonce[..8].copy_from_slice(&performance_now().to_le_bytes());
    }
    WatermarkId::derive(student_id as i64, exam_id, question_id, &hex(&nonce)).to_string()
}

/// Crate version.
#[wasm_bindgen]
pub fn version() -> String {
    examguard_core::VERSION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(hex(&[0x00, 0x0f, 0xab]), "000fab");
    }

    #[test]
    fn markup_helpers_delegate_to_core() {
        assert!(bait_field_html().contains("phone_extension_secondary"));
        let html = poisoned_question_html("Why?", Some("Zyzzyva".into()));
        assert!(html.contains("Zyzzyva"));
        assert!(contains_poison_marker("a zyzzyva answer", Some("Zyzzyva".into())));
        assert!(!contains_poison_marker("a plain answer", None));
    }
}
