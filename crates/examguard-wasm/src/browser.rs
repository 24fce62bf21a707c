//! Browser implementations of the core seams: `localStorage`, `fetch`, and
//! `alert` + `location` navigation.

use examguard_core::config::join_url;
use examguard_core::{
    ApiRequest, ApiResponse, Body, Dispatch, Navigator, ProctorError, Result, Route,
    TokenStorage,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Headers, Request, RequestInit, Response};

fn js_error(context: &str, e: JsValue) -> String {
    match e.as_string() {
        Some(s) => format!("{context}: {s}"),
        None => format!("{context}: {e:?}"),
    }
}

fn window() -> Result<web_sys::Window> {
    web_sys::window().ok_or_else(|| ProctorError::Transport("no window".into()))
}

// ---------------------------------------------------------------------------
// localStorage
// ---------------------------------------------------------------------------

/// `window.localStorage`: survives navigation within the exam flow.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

impl LocalStorage {
    fn storage(&self) -> Result<web_sys::Storage> {
        window()?
            .local_storage()
            .map_err(|e| ProctorError::Storage(js_error("localStorage", e)))?
            .ok_or_else(|| ProctorError::Storage("localStorage unavailable".into()))
    }
}

impl TokenStorage for LocalStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.storage().ok()?.get_item(key).ok().flatten()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.storage()?
            .set_item(key, value)
            .map_err(|e| ProctorError::Storage(js_error("setItem", e)))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.storage()?
            .remove_item(key)
            .map_err(|e| ProctorError::Storage(js_error("removeItem", e)))
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn notify(&self, message: &str) {
        if let Some(w) = web_sys::window()
            && let Err(e) = w.alert_with_message(message)
        {
            log::warn!("{}", js_error("alert", e));
        }
    }

    fn navigate(&self, route: Route) {
        let Some(w) = web_sys::window() else {
            return;
        };
        if let Err(e) = w.location().set_href(route.path()) {
            log::warn!("{}", js_error("navigation", e));
        }
    }
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

/// [`Dispatch`] over `window.fetch`.
#[derive(Debug, Clone)]
pub struct FetchDispatcher {
    base_url: String,
}

impl FetchDispatcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

fn form_encode(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

impl Dispatch for FetchDispatcher {
    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
        let transport = |e: JsValue| ProctorError::Transport(js_error("fetch", e));

        let headers = Headers::new().map_err(transport)?;
        for (name, value) in &request.headers {
            headers.set(name, value).map_err(transport)?;
        }

        let init = RequestInit::new();
        init.set_method(request.method.as_str());
        match &request.body {
            Body::Empty => {}
            Body::Json(value) => {
                headers
                    .set("Content-Type", "application/json")
                    .map_err(transport)?;
                init.set_body(&JsValue::from_str(&value.to_string()));
            }
            Body::Form(pairs) => {
                headers
                    .set("Content-Type", "application/x-www-form-urlencoded")
                    .map_err(transport)?;
                init.set_body(&JsValue::from_str(&form_encode(pairs)));
            }
        }
        init.set_headers(&headers);

        let url = join_url(&self.base_url, &request.path);
        let req = Request::new_with_str_and_init(&url, &init).map_err(transport)?;
        let response: Response = JsFuture::from(window()?.fetch_with_request(&req))
            .await
            .map_err(transport)?
            .dyn_into()
            .map_err(transport)?;

        let status = response.status();
        let body = JsFuture::from(response.text().map_err(transport)?)
            .await
            .map_err(transport)?
            .as_string()
            .unwrap_or_default();
        log::debug!("{} {} -> {status}", request.method.as_str(), request.path);
        Ok(ApiResponse::new(status, body))
    }
}
