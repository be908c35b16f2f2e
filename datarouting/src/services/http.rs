//! Inbound HTTP surface of a worker.
//!
//! - `POST /submit` with a form field `task_token`. The handler only
//!   registers the token; resolution happens later on the scanner.
//! - `POST /deliver` with a JSON [`DeliveryRequest`]. Runs the delivery on
//!   this worker and answers with the final packet.

use crate::config::{DELIVER_PATH, SUBMIT_PATH};
use crate::core::{BoxError, DeliveryRequest, ResumeToken};
use crate::executor::{Component, DeliveryClient, SubmitError};
use crate::services::callback::{CallbackRegistry, Registration};
use async_trait::async_trait;
use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CallbackRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    #[serde(default)]
    pub task_token: String,
}

pub fn router(registry: Arc<CallbackRegistry>) -> Router {
    Router::new()
        .route(SUBMIT_PATH, post(submit_token))
        .with_state(AppState { registry })
}

async fn submit_token(
    State(state): State<AppState>,
    form: Result<Form<SubmitForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!(error = %rejection, "rejecting unparseable callback form");
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    let token: ResumeToken = match form.task_token.parse() {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "rejecting callback without a task_token");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match state.registry.register(token).await {
        Registration::Scheduled { due } => debug!(%due, "callback accepted"),
        Registration::Dropped => debug!("callback accepted and dropped"),
        Registration::Duplicate => debug!("callback accepted, already scheduled"),
    }
    StatusCode::OK.into_response()
}

/// Router accepting deliveries for `client`'s driver.
///
/// `200` with the delivered or undeliverable packet, `502` with the partial
/// packet when route lookup gave up, `503` once the driver has stopped.
pub fn delivery_router(client: DeliveryClient) -> Router {
    Router::new()
        .route(DELIVER_PATH, post(deliver_packet))
        .with_state(client)
}

async fn deliver_packet(
    State(client): State<DeliveryClient>,
    Json(request): Json<DeliveryRequest>,
) -> Response {
    let id = request.packet.id().to_string();
    info!(packet.id = %id, "delivery received");

    match client.submit(request).await {
        Ok(packet) => (StatusCode::OK, Json(packet)).into_response(),
        Err(SubmitError::Delivery(failure)) => {
            warn!(packet.id = %id, error = %failure.error, "delivery failed");
            (StatusCode::BAD_GATEWAY, Json(failure.packet)).into_response()
        }
        Err(e) => {
            warn!(packet.id = %id, error = %e, "delivery not accepted");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

/// Supervised component serving a router until cancelled.
pub struct HttpListener {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    app: Router,
}

impl HttpListener {
    /// Binds `addr` immediately so the port is known before the component starts.
    pub async fn bind(addr: SocketAddr, app: Router) -> std::io::Result<Self> {
        Self::from_listener(TcpListener::bind(addr).await?, app)
    }

    /// Serves `app` on a socket that is already bound.
    pub fn from_listener(listener: TcpListener, app: Router) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            app,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Component for HttpListener {
    fn name(&self) -> &str {
        "http-listener"
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<(), BoxError> {
        let listener = self
            .listener
            .lock()
            .map_err(|_| "listener lock poisoned")?
            .take()
            .ok_or("http listener can only be started once")?;

        info!(addr = %self.local_addr, "http listener started");
        axum::serve(listener, self.app.clone())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        info!("http listener stopped");
        Ok(())
    }
}
