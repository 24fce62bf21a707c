//! Promise-returning session API for the page.

use std::rc::Rc;
use std::sync::Arc;

use examguard_core::{
    AuthenticatedTransport, BAIT_FIELD_NAME, ClientConfig, CredentialStore, ExamForm,
    ProctorError, Registration, SessionController, submit_exam,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::browser::{BrowserNavigator, FetchDispatcher, LocalStorage};
use crate::performance_now;

type Controller = SessionController<FetchDispatcher, LocalStorage, BrowserNavigator>;

fn to_js(value: &impl Serialize) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&text)
}

fn reject(e: ProctorError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Session bound to `localStorage` and `window.fetch`.
///
/// Every async method returns a `Promise`; failures reject with the error
/// message as a string.
#[wasm_bindgen]
pub struct ProctorSession {
    controller: Rc<Controller>,
}

#[wasm_bindgen]
impl ProctorSession {
    #[wasm_bindgen(constructor)]
    pub fn new(api_base_url: Option<String>) -> ProctorSession {
        let mut config = ClientConfig::default();
        if let Some(url) = api_base_url {
            config.api_base_url = url;
        }
        let credentials = Arc::new(CredentialStore::with_key(LocalStorage, config.token_key));
        let transport = AuthenticatedTransport::new(
            FetchDispatcher::new(config.api_base_url),
            credentials,
            BrowserNavigator,
        );
        ProctorSession {
            controller: Rc::new(SessionController::new(transport)),
        }
    }

    /// Resolves to the principal object.
    pub fn login(&self, email: String, password: String) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            let principal = controller.login(&email, &password).await.map_err(reject)?;
            to_js(&principal)
        })
    }

    /// Resolves to the principal object, or `null` when there is no valid session.
    #[wasm_bindgen(js_name = checkSession)]
    pub fn check_session(&self) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            match controller.check_session().await {
                Some(principal) => to_js(&principal),
                None => Ok(JsValue::NULL),
            }
        })
    }

    pub fn register(&self, email: String, full_name: String, password: String) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            let profile = Registration {
                email,
                full_name,
                password,
            };
            controller.register(&profile).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn logout(&self) -> Result<(), JsValue> {
        self.controller.logout().map_err(reject)
    }

    #[wasm_bindgen(js_name = isAuthenticated)]
    pub fn is_authenticated(&self) -> bool {
        self.controller.principal().is_some()
    }

    /// Submit one answer and resolve to the grading result.
    ///
    /// `bait_value` is whatever ended up in the hidden bait input, passed
    /// through as-is. `opened_at_ms` is the `performance.now()` reading taken
    /// when the question was shown.
    #[wasm_bindgen(js_name = submitAnswer)]
    pub fn submit_answer(
        &self,
        exam_id: String,
        question_id: String,
        answer_text: String,
        bait_value: String,
        opened_at_ms: f64,
    ) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            let principal = match controller.principal() {
                Some(principal) => principal,
                None => controller
                    .check_session()
                    .await
                    .ok_or_else(|| reject(ProctorError::AuthenticationRejected))?,
            };

            let mut form = ExamForm::open(exam_id, question_id, opened_at_ms);
            form.type_answer(&answer_text);
            form.set_field(BAIT_FIELD_NAME, &bait_value);
            let submission = form.into_submission(&principal, performance_now());

            let result = submit_exam(controller.transport(), &submission)
                .await
                .map_err(reject)?;
            log::info!("{}", result.summary());
            to_js(&result)
        })
    }
}
