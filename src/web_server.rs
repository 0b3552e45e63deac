use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Form, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::sync::broadcast;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::controller::{ConversationController, Notice, StartRequest};
use crate::error::ControllerError;

// Messages pushed to every connected WebSocket client
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    pub message_type: String,
    pub payload: serde_json::Value,
}

/// Unsent form input. Kept across a failed submission, cleared on success.
#[derive(Debug, Clone, Default, Serialize)]
struct Drafts {
    topic: String,
    viewpoint: String,
    reference_url: String,
    message: String,
}

#[derive(Debug, Default)]
struct UiState {
    drafts: Drafts,
    // Shown once on the next page render
    notices: Vec<Notice>,
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    controller: Arc<ConversationController>,
    ui: Arc<Mutex<UiState>>,
}

impl AppState {
    pub fn new(controller: Arc<ConversationController>) -> Self {
        // Capacity of 100 messages
        let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);
        Self {
            templates: Arc::new(create_minijinja_env()),
            broadcast_tx,
            controller,
            ui: Arc::new(Mutex::new(UiState::default())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcast_tx.subscribe()
    }

    fn with_ui<T>(&self, f: impl FnOnce(&mut UiState) -> T) -> T {
        let mut ui = self.ui.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut ui)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "session": self.controller.session(),
            "generating": self.controller.is_generating(),
            "phase": self.controller.phase(),
            "resetPending": self.controller.reset_pending(),
        })
    }

    fn broadcast(&self, message_type: &str, payload: serde_json::Value) {
        let msg = BroadcastMessage {
            message_type: message_type.to_string(),
            payload,
        };
        // No receivers just means no open pages
        if self.broadcast_tx.send(msg).is_err() {
            debug!(message_type, "No WebSocket clients to notify");
        }
    }

    fn session_updated(&self) {
        self.broadcast("SessionUpdated", self.snapshot());
    }
}

fn create_minijinja_env() -> AutoReloader {
    AutoReloader::new(|notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader("templates"));
        // Watch the templates directory for changes
        notifier.watch_path("templates", true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let session = state.controller.session();
    let reference_host = session.as_ref().and_then(|s| s.reference_host());
    let (drafts, notices) = state.with_ui(|ui| (ui.drafts.clone(), std::mem::take(&mut ui.notices)));

    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(minijinja::context! {
                    title => "Counterpoint",
                    session => session,
                    reference_host => reference_host,
                    generating => state.controller.is_generating(),
                    phase => state.controller.phase(),
                    reset_pending => state.controller.reset_pending(),
                    drafts => drafts,
                    notices => notices,
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

#[derive(Debug, Default, Deserialize)]
struct StartForm {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    viewpoint: String,
    #[serde(default)]
    reference_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessageForm {
    #[serde(default)]
    message: String,
}

async fn explore_form(State(state): State<AppState>, Form(form): Form<StartForm>) -> Redirect {
    state.with_ui(|ui| {
        ui.drafts.topic = form.topic.clone();
        ui.drafts.viewpoint = form.viewpoint.clone();
        ui.drafts.reference_url = form.reference_url.clone();
    });

    let request = StartRequest {
        topic: form.topic,
        viewpoint: form.viewpoint,
        reference_url: Some(form.reference_url),
    };
    let notices = match state.controller.start_session(request).await {
        Ok(outcome) => {
            state.with_ui(|ui| ui.drafts = Drafts::default());
            state.session_updated();
            Notice::for_start(&outcome)
        }
        Err(e) => vec![Notice::start_failed(&e)],
    };
    state.with_ui(|ui| ui.notices.extend(notices));
    Redirect::to("/")
}

async fn message_form(State(state): State<AppState>, Form(form): Form<MessageForm>) -> Redirect {
    let result = state.controller.continue_session(&form.message).await;
    let notice = match result {
        Ok(_) => None,
        Err(ref e) => Some(Notice::reply_failed(e)),
    };
    // The user's turn is in the log unless the input was rejected outright
    let keep_draft = matches!(result, Err(ref e) if e.is_validation() || matches!(e, ControllerError::Busy));
    state.with_ui(|ui| {
        ui.drafts.message = if keep_draft { form.message } else { String::new() };
        ui.notices.extend(notice);
    });
    state.session_updated();
    Redirect::to("/")
}

async fn reset_form(State(state): State<AppState>) -> Redirect {
    if let Err(e) = state.controller.request_reset() {
        state.with_ui(|ui| ui.notices.push(Notice::error(e.to_string())));
    }
    Redirect::to("/")
}

async fn reset_confirm_form(State(state): State<AppState>) -> Redirect {
    let notice = match state.controller.confirm_reset() {
        Ok(()) => {
            state.session_updated();
            Notice::reset_done()
        }
        Err(e) => Notice::error(e.to_string()),
    };
    state.with_ui(|ui| ui.notices.push(notice));
    Redirect::to("/")
}

async fn reset_cancel_form(State(state): State<AppState>) -> Redirect {
    state.controller.cancel_reset();
    Redirect::to("/")
}

/// Controller failure rendered as a JSON API response.
pub struct ApiError {
    error: ControllerError,
    notice: Notice,
}

impl ApiError {
    fn start(error: ControllerError) -> Self {
        let notice = Notice::start_failed(&error);
        Self { error, notice }
    }

    fn reply(error: ControllerError) -> Self {
        let notice = Notice::reply_failed(&error);
        Self { error, notice }
    }

    fn other(error: ControllerError) -> Self {
        let notice = Notice::error(error.to_string());
        Self { error, notice }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            ControllerError::MissingStartFields | ControllerError::EmptyMessage => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ControllerError::NoSession => StatusCode::NOT_FOUND,
            ControllerError::Busy | ControllerError::ResetNotRequested => StatusCode::CONFLICT,
            ControllerError::Completion(_) => StatusCode::BAD_GATEWAY,
            ControllerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.error, "API request failed");
        }
        (status, Json(serde_json::json!({ "error": self.notice.text }))).into_response()
    }
}

async fn get_session(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.snapshot())
}

async fn start_session_api(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .controller
        .start_session(request)
        .await
        .map_err(ApiError::start)?;
    state.session_updated();
    Ok(Json(serde_json::json!({
        "session": outcome.session,
        "notices": Notice::for_start(&outcome),
    })))
}

async fn continue_session_api(
    State(state): State<AppState>,
    Json(form): Json<MessageForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state.controller.continue_session(&form.message).await;
    if !matches!(result, Err(ref e) if e.is_validation()) {
        state.session_updated();
    }
    let session = result.map_err(ApiError::reply)?;
    Ok(Json(serde_json::json!({ "session": session })))
}

async fn reset_api(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.controller.request_reset().map_err(ApiError::other)?;
    Ok(Json(state.snapshot()))
}

async fn reset_confirm_api(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.controller.confirm_reset().map_err(ApiError::other)?;
    state.session_updated();
    Ok(Json(serde_json::json!({ "notice": Notice::reset_done() })))
}

async fn reset_cancel_api(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.controller.cancel_reset();
    Json(state.snapshot())
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut broadcast_rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let hello = BroadcastMessage {
        message_type: "Snapshot".to_string(),
        payload: state.snapshot(),
    };
    if let Ok(json_msg) = serde_json::to_string(&hello) {
        if sender.send(Message::Text(json_msg)).await.is_err() {
            warn!("Failed to send snapshot to new WebSocket client");
            return;
        }
    }

    loop {
        tokio::select! {
            Ok(msg) = broadcast_rx.recv() => {
                match serde_json::to_string(&msg) {
                    Ok(json_msg) => {
                        if sender.send(Message::Text(json_msg)).await.is_err() {
                            warn!("WebSocket client disconnected or send error. Closing connection.");
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize broadcast message: {}", e),
                }
            }

            Some(Ok(msg)) = receiver.next() => {
                match msg {
                    Message::Text(text) => {
                        // The page only ever asks for a fresh snapshot
                        debug!("Received text message from client: {}", text);
                        let reply = BroadcastMessage {
                            message_type: "Snapshot".to_string(),
                            payload: state.snapshot(),
                        };
                        if let Ok(json_msg) = serde_json::to_string(&reply) {
                            if sender.send(Message::Text(json_msg)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Binary(_) => warn!("Received unexpected binary message from client"),
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => {
                        info!("Client requested WebSocket close");
                        break;
                    }
                }
            }

            else => {
                info!("WebSocket client disconnected");
                break;
            }
        }
    }
    info!("WebSocket connection closed");
}

/// Forwards controller phase changes to WebSocket clients as `Generating`.
fn spawn_phase_relay(state: AppState) -> tokio::task::JoinHandle<()> {
    let mut phase_rx = state.controller.subscribe();
    tokio::spawn(async move {
        while phase_rx.changed().await.is_ok() {
            let phase = *phase_rx.borrow_and_update();
            state.broadcast(
                "Generating",
                serde_json::json!({ "generating": phase.is_busy(), "phase": phase }),
            );
        }
    })
}

pub fn build_router(state: AppState) -> Router {
    // Serve static files from the `static` directory
    let static_files_service = ServeDir::new("static").not_found_service(tower::service_fn(|_| async {
        Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
    }));

    Router::new()
        .route("/", get(index_handler))
        .route("/explore", post(explore_form))
        .route("/message", post(message_form))
        .route("/reset", post(reset_form))
        .route("/reset/confirm", post(reset_confirm_form))
        .route("/reset/cancel", post(reset_cancel_form))
        .route("/api/session", get(get_session).post(start_session_api))
        .route("/api/session/messages", post(continue_session_api))
        .route("/api/session/reset", post(reset_api))
        .route("/api/session/reset/confirm", post(reset_confirm_api))
        .route("/api/session/reset/cancel", post(reset_cancel_api))
        .route("/ws", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(port: u16, controller: Arc<ConversationController>) -> Result<()> {
    let state = AppState::new(controller);
    let relay = spawn_phase_relay(state.clone());
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    let served = serve(listener, app.into_make_service())
        .await
        .context("Web server failed");
    relay.abort();
    served
}
