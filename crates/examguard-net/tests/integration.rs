//! Integration tests for examguard-net.
//!
//! An axum app on an ephemeral port stands in for the auth, grading and
//! verifier collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use examguard_core::{
    AuthenticatedTransport, ChannelStatus, ClientConfig, CredentialStore, ExamForm, ExamStatus,
    KeystrokeOutcome, MemoryStorage, ProctorError, ReconnectPolicy, RecordingNavigator,
    Registration, Route, SessionController, submit_exam,
};
use examguard_net::{LinkEvent, ReqwestDispatcher, VerifierLink};

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Collaborators {
    samples: Mutex<Vec<Value>>,
    terminate_after: Option<usize>,
    drop_first_channel: AtomicBool,
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(Form(form): Form<LoginForm>) -> Response {
    if form.username == "a@b.com" && form.password == "secret123" {
        Json(json!({"access_token": "tok1", "token_type": "bearer"})).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Incorrect email or password"})),
        )
            .into_response()
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["email"] == "a@b.com" {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "The user with this email already exists in the system."})),
        )
            .into_response()
    } else {
        Json(json!({"id": 2, "email": body["email"], "full_name": body["full_name"]})).into_response()
    }
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer tok1")
}

async fn me(headers: HeaderMap) -> Response {
    if !bearer_ok(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Could not validate credentials"})),
        )
            .into_response();
    }
    Json(json!({"id": 1, "email": "a@b.com", "full_name": "Ada B", "typing_baseline": 140.0}))
        .into_response()
}

async fn submit(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let tripped = body["phone_extension_secondary"]
        .as_str()
        .is_some_and(|v| !v.is_empty());
    let (status, score, remarks) = if tripped {
        ("FLAGGED", 0.0, Some("Honeypot triggered"))
    } else {
        ("PASSED", 87.5, None)
    };
    Json(json!({
        "student_id": body["student_id"],
        "status": status,
        "score": score,
        "security_remarks": remarks,
    }))
    .into_response()
}

async fn verifier(
    State(state): State<Arc<Collaborators>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.get("token").map(String::as_str) != Some("tok1") {
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| verifier_session(socket, state))
}

async fn verifier_session(mut socket: WebSocket, state: Arc<Collaborators>) {
    if state.drop_first_channel.swap(false, Ordering::SeqCst) {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    // Junk the client must shrug off.
    let _ = socket.send(Message::Text("not a verdict".into())).await;

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(sample) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let received = {
            let mut samples = state.samples.lock().unwrap();
            samples.push(sample);
            samples.len()
        };
        let reply = if Some(received) == state.terminate_after {
            json!({"status": "TERMINATE", "message": "Automated typing pattern detected."})
        } else {
            json!({"status": "CONTINUE"})
        };
        if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
            break;
        }
    }
}

async fn serve(state: Collaborators) -> (ClientConfig, Arc<Collaborators>) {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/users/open", post(register))
        .route("/api/v1/users/me", get(me))
        .route("/api/v1/exam/submit", post(submit))
        .route("/ws", get(verifier))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ClientConfig {
        api_base_url: format!("http://{addr}/api/v1"),
        verifier_url: format!("ws://{addr}/ws"),
        ..Default::default()
    };
    (config, state)
}

type Session = SessionController<ReqwestDispatcher, MemoryStorage, Arc<RecordingNavigator>>;

fn session(config: &ClientConfig) -> (Session, Arc<RecordingNavigator>) {
    let nav = Arc::new(RecordingNavigator::new());
    let store = Arc::new(CredentialStore::new(MemoryStorage::new()));
    let dispatcher = ReqwestDispatcher::from_config(config).unwrap();
    (
        SessionController::new(AuthenticatedTransport::new(dispatcher, store, Arc::clone(&nav))),
        nav,
    )
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_resolves_principal_over_http() {
    let (config, _) = serve(Collaborators::default()).await;
    let (session, nav) = session(&config);

    let me = session.login("a@b.com", "secret123").await.unwrap();
    assert_eq!(me.full_name, "Ada B");
    assert_eq!(me.typing_baseline, Some(140.0));
    assert_eq!(session.credentials().get().as_deref(), Some("tok1"));
    assert!(session.check_session().await.is_some());

    session.logout().unwrap();
    assert!(session.credentials().get().is_none());
    assert!(session.check_session().await.is_none());
    assert_eq!(nav.navigations_to(Route::Login), 1);
}

#[tokio::test]
async fn refused_login_surfaces_server_reason() {
    let (config, _) = serve(Collaborators::default()).await;
    let (session, nav) = session(&config);

    let err = session.login("a@b.com", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "Incorrect email or password");
    assert!(session.credentials().get().is_none());
    assert!(nav.events().is_empty());
}

#[tokio::test]
async fn stale_credential_forces_logout() {
    let (config, _) = serve(Collaborators::default()).await;
    let (session, nav) = session(&config);
    session.credentials().set("stale").unwrap();

    assert!(session.check_session().await.is_none());
    assert!(session.credentials().get().is_none());
    assert_eq!(nav.navigations_to(Route::Login), 1);
}

#[tokio::test]
async fn duplicate_registration_is_rejected_verbatim() {
    let (config, _) = serve(Collaborators::default()).await;
    let (session, _) = session(&config);

    let taken = Registration {
        email: "a@b.com".into(),
        full_name: "Ada B".into(),
        password: "secret123".into(),
    };
    let err = session.register(&taken).await.unwrap_err();
    assert!(matches!(err, ProctorError::Rejected { status: 400, .. }));
    assert_eq!(err.to_string(), "The user with this email already exists in the system.");

    let fresh = Registration {
        email: "c@d.com".into(),
        ..taken
    };
    session.register(&fresh).await.unwrap();
    assert!(session.credentials().get().is_none());
}

#[tokio::test]
async fn submission_carries_bait_value() {
    let (config, _) = serve(Collaborators::default()).await;
    let (session, _) = session(&config);
    let me = session.login("a@b.com", "secret123").await.unwrap();

    let mut form = ExamForm::open("e1", "q1", 0.0);
    form.type_answer("answer");
    let result = submit_exam(session.transport(), &form.into_submission(&me, 30_000.0))
        .await
        .unwrap();
    assert_eq!(result.status, ExamStatus::Passed);

    let mut form = ExamForm::open("e1", "q1", 0.0);
    form.set_field("phone_extension_secondary", "42");
    let result = submit_exam(session.transport(), &form.into_submission(&me, 1_000.0))
        .await
        .unwrap();
    assert_eq!(result.summary(), "Exam Flagged: Honeypot triggered");
}

// ---------------------------------------------------------------------------
// Verifier channel
// ---------------------------------------------------------------------------

async fn next_non_continue<S, N>(link: &mut VerifierLink<S, N>) -> LinkEvent
where
    S: examguard_core::TokenStorage,
    N: examguard_core::Navigator,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), link.next_event())
            .await
            .unwrap()
            .unwrap();
        if event != LinkEvent::Continue {
            return event;
        }
    }
}

#[tokio::test]
async fn terminate_verdict_ends_session() {
    let (config, state) = serve(Collaborators {
        terminate_after: Some(2),
        ..Default::default()
    })
    .await;
    let (session, nav) = session(&config);
    session.login("a@b.com", "secret123").await.unwrap();

    let mut link = VerifierLink::mount(
        config.clone(),
        "1",
        Arc::clone(session.credentials()),
        Arc::clone(&nav),
    )
    .await;
    assert_eq!(link.status(), ChannelStatus::Secure);

    assert_eq!(link.keystroke(0.0), KeystrokeOutcome::First);
    link.keystroke(120.0);
    link.keystroke(305.0);

    let event = next_non_continue(&mut link).await;
    assert_eq!(
        event,
        LinkEvent::Terminated("Automated typing pattern detected.".into())
    );
    assert!(matches!(
        event.into_result(),
        Err(ProctorError::SecurityTermination(_))
    ));

    assert_eq!(link.keystroke(400.0), KeystrokeOutcome::Ended);
    assert!(session.credentials().get().is_none());
    assert_eq!(nav.navigations_to(Route::Dashboard), 1);
    assert_eq!(
        nav.notifications(),
        vec!["SECURITY VIOLATION: Automated typing pattern detected.".to_string()]
    );

    let samples = state.samples.lock().unwrap().clone();
    let flights: Vec<f64> = samples.iter().map(|s| s["flight_time"].as_f64().unwrap()).collect();
    assert_eq!(flights, vec![120.0, 185.0]);
    assert!(samples.iter().all(|s| s["student_id"] == "1" && s["dwell_time"] == 0.0));

    link.unmount().await;
}

#[tokio::test]
async fn unreachable_verifier_degrades_to_disconnected() {
    let config = ClientConfig {
        verifier_url: "ws://127.0.0.1:1/ws".into(),
        ..Default::default()
    };
    let store = Arc::new(CredentialStore::new(MemoryStorage::new()));
    store.set("tok1").unwrap();
    let nav = Arc::new(RecordingNavigator::new());

    let mut link = VerifierLink::mount(config, "1", Arc::clone(&store), Arc::clone(&nav)).await;
    assert_eq!(link.status(), ChannelStatus::Disconnected);
    link.keystroke(0.0);
    assert_eq!(link.keystroke(50.0), KeystrokeOutcome::DroppedDisconnected);

    // No reconnect by default: nothing ever happens.
    let waited = tokio::time::timeout(Duration::from_millis(100), link.next_event()).await;
    assert!(waited.is_err());
    assert!(store.get().is_some());
    assert!(nav.events().is_empty());
}

#[tokio::test]
async fn dropped_channel_reconnects_when_configured() {
    let (config, state) = serve(Collaborators {
        drop_first_channel: AtomicBool::new(true),
        ..Default::default()
    })
    .await;
    let config = ClientConfig {
        reconnect: ReconnectPolicy::Fixed {
            attempts: 2,
            delay_ms: 10,
        },
        ..config
    };
    let store = Arc::new(CredentialStore::new(MemoryStorage::new()));
    store.set("tok1").unwrap();

    let mut link = VerifierLink::mount(config, "1", store, Arc::new(RecordingNavigator::new())).await;
    assert_eq!(next_non_continue(&mut link).await, LinkEvent::Disconnected);
    assert_eq!(link.status(), ChannelStatus::Disconnected);
    assert_eq!(next_non_continue(&mut link).await, LinkEvent::Reconnected);
    assert_eq!(link.status(), ChannelStatus::Secure);

    link.keystroke(0.0);
    assert!(matches!(link.keystroke(75.0), KeystrokeOutcome::Sent(_)));
    for _ in 0..100 {
        if !state.samples.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.samples.lock().unwrap()[0]["flight_time"], 75.0);
    link.unmount().await;
}

#[tokio::test]
async fn missing_credential_never_opens_channel() {
    let (config, state) = serve(Collaborators::default()).await;
    let store = Arc::new(CredentialStore::new(MemoryStorage::new()));
    let link = VerifierLink::mount(config, "1", store, Arc::new(RecordingNavigator::new())).await;
    assert_eq!(link.status(), ChannelStatus::Disconnected);
    assert!(state.samples.lock().unwrap().is_empty());
}
