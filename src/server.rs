//! Control API - owner-only routes over the controller and the proxy
//!
//! ```text
//!   GET  /health                 liveness, no auth
//!   POST /api/gateway/start      {provider, apiKey?, model?}
//!   POST /api/gateway/stop
//!   GET  /api/gateway/status
//!   GET  /api/gateway/token
//!   GET  /api/gateway/sessions
//!   ANY  /ui, /ui/*              passthrough to the gateway control UI
//!   GET  /ws                     WebSocket bridge to the gateway
//! ```

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::auth::{Identity, OwnerAuthenticator};
use crate::controller::{GatewayController, GatewayStatus, LifecycleState};
use crate::error::Error;
use crate::gateway::ProviderSelection;
use crate::proxy::{close_socket, ProxyBridge, SessionInfo};

/// WebSocket close code for a caller without an owner session
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

// ---- App State ----

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<GatewayController>,
    pub proxy: Arc<ProxyBridge>,
    pub auth: Arc<dyn OwnerAuthenticator>,
}

// ---- Error Handling ----

pub struct ApiError(pub Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::InvalidTransition(_) => StatusCode::CONFLICT,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::GatewayNotRunning(_) | Error::SupervisorUnreachable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::UpstreamUnavailable(_)
            | Error::UnknownProgram(_)
            | Error::Supervisor(_)
            | Error::WebSocket(_)
            | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::MessageTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::SupervisorTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::IdleTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = self.0.code(), "Request failed: {}", self.0);
        }
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        }));
        (status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

// ---- Extractors ----

/// The authenticated instance owner
pub struct Owner(pub Identity);

impl FromRequestParts<AppState> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.auth.authenticate(&parts.headers).await?;
        Ok(Owner(identity))
    }
}

// ---- Response Types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    state: LifecycleState,
    token: String,
    token_changed: bool,
    status: GatewayStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(flatten)]
    status: GatewayStatus,
    /// Process id reported by the supervisor while running
    pid: Option<u32>,
}

#[derive(Serialize)]
struct StateResponse {
    state: LifecycleState,
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
}

// ---- Handlers ----

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

async fn start_gateway(
    Owner(owner): Owner,
    State(state): State<AppState>,
    Json(selection): Json<ProviderSelection>,
) -> Result<Json<StartResponse>, ApiError> {
    debug!(owner = %owner.owner_id, provider = %selection.provider, "Start requested");
    let outcome = state.controller.start_with_config(selection).await?;
    Ok(Json(StartResponse {
        state: outcome.status.state,
        token: outcome.token,
        token_changed: outcome.token_changed,
        status: outcome.status,
    }))
}

async fn stop_gateway(
    Owner(owner): Owner,
    State(state): State<AppState>,
) -> Result<Json<StateResponse>, ApiError> {
    debug!(owner = %owner.owner_id, "Stop requested");
    let status = state.controller.stop().await?;
    Ok(Json(StateResponse {
        state: status.state,
    }))
}

async fn gateway_status(_owner: Owner, State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.controller.current_status();
    let pid = if status.state == LifecycleState::Running {
        match state.controller.process_status().await {
            Ok(process) => process.pid,
            Err(e) => {
                debug!("Supervisor status unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };
    Json(StatusResponse { status, pid })
}

async fn gateway_token(
    _owner: Owner,
    State(state): State<AppState>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.controller.token().ok_or_else(|| {
        Error::GatewayNotRunning(format!(
            "gateway is {}",
            state.controller.current_status().state
        ))
    })?;
    Ok(Json(TokenResponse { token }))
}

async fn gateway_sessions(_owner: Owner, State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.proxy.sessions())
}

async fn proxy_ui(
    _owner: Owner,
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let path = upstream_path(uri.path());
    let response = state
        .proxy
        .serve_http(method, path, uri.query(), &headers, body)
        .await?;
    Ok(response)
}

async fn proxy_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(e) = state.auth.authenticate(&headers).await {
        debug!("Refusing WebSocket upgrade: {}", e);
        return ws.on_upgrade(|socket| close_socket(socket, CLOSE_UNAUTHORIZED, "unauthorized"));
    }
    state.proxy.serve_websocket(ws)
}

/// `/ui/app.js` → `/app.js`, `/ui` → `/`
fn upstream_path(path: &str) -> &str {
    match path.strip_prefix("/ui") {
        Some("") | None => "/",
        Some(rest) => rest,
    }
}

// ---- Router ----

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/start", post(start_gateway))
        .route("/stop", post(stop_gateway))
        .route("/status", get(gateway_status))
        .route("/token", get(gateway_token))
        .route("/sessions", get(gateway_sessions));

    Router::new()
        .route("/health", get(health))
        .nest("/api/gateway", api)
        .route("/ui", any(proxy_ui))
        .route("/ui/", any(proxy_ui))
        .route("/ui/{*path}", any(proxy_ui))
        .route("/ws", get(proxy_ws))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

/// An empty origin list adds no CORS headers at all
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticOwnerAuthenticator;
    use crate::config::ProxyConfig;
    use crate::test_support::{listening_gateway, serving_gateway, stopped_gateway, TestGateway};
    use futures::StreamExt;
    use secrecy::SecretString;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tower::ServiceExt;
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OWNER: &str = "owner-secret";

    fn app(gw: &TestGateway) -> Router {
        let state = AppState {
            controller: gw.controller.clone(),
            proxy: Arc::new(
                ProxyBridge::new(gw.controller.clone(), ProxyConfig::default()).unwrap(),
            ),
            auth: Arc::new(StaticOwnerAuthenticator::new(
                SecretString::from(OWNER.to_string()),
                "owner",
            )),
        };
        build_router(state, &["https://owner.example".to_string()])
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> axum::http::Request<Body> {
        let builder = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, format!("session_token={}", OWNER));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_upstream_path() {
        assert_eq!(upstream_path("/ui"), "/");
        assert_eq!(upstream_path("/ui/"), "/");
        assert_eq!(upstream_path("/ui/assets/app.js"), "/assets/app.js");
    }

    #[tokio::test]
    async fn test_health_needs_no_owner() {
        let gw = stopped_gateway(1, 1);
        let response = app(&gw)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_requires_owner() {
        let gw = stopped_gateway(1, 1);
        let response = app(&gw)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/gateway/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_invalid_selection_is_bad_request() {
        let gw = stopped_gateway(1, 1);
        let response = app(&gw)
            .oneshot(request(
                "POST",
                "/api/gateway/start",
                Some(serde_json::json!({ "provider": "openai", "apiKey": "short" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "invalid_config");
        assert_eq!(gw.controller.current_status().state, LifecycleState::Stopped);
        assert_eq!(gw.supervisor.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_start_token_stop_cycle() {
        let gw = listening_gateway(1).await;
        let app = app(&gw);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/gateway/start",
                Some(serde_json::json!({
                    "provider": "openai",
                    "apiKey": "sk-validlengthkey1234",
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let started = json_body(response).await;
        assert_eq!(started["state"], "running");
        assert_eq!(started["tokenChanged"], true);
        assert_eq!(started["status"]["provider"], "openai");
        let token = started["token"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request("GET", "/api/gateway/status", None))
            .await
            .unwrap();
        let status = json_body(response).await;
        assert_eq!(status["state"], "running");
        assert_eq!(status["provider"], "openai");
        assert_eq!(status["pid"], 4242);

        let response = app
            .clone()
            .oneshot(request("GET", "/api/gateway/token", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["token"], token.as_str());

        let response = app
            .clone()
            .oneshot(request("POST", "/api/gateway/stop", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["state"], "stopped");

        let response = app
            .clone()
            .oneshot(request("GET", "/api/gateway/token", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .oneshot(request("GET", "/api/gateway/status", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["state"], "stopped");
    }

    #[tokio::test]
    async fn test_ui_when_stopped() {
        let gw = stopped_gateway(1, 1);
        let response = app(&gw)
            .oneshot(request("GET", "/ui/", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["code"], "gateway_not_running");
    }

    #[tokio::test]
    async fn test_ui_is_proxied_without_prefix() {
        let server = MockServer::start().await;
        let gw = serving_gateway(server.address().port()).await;
        let token = gw.token.clone().unwrap();

        Mock::given(method("GET"))
            .and(path("/assets/app.js"))
            .and(header_is(crate::proxy::AUTH_HEADER, token.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("console.log(1)"))
            .expect(1)
            .mount(&server)
            .await;

        let response = app(&gw)
            .oneshot(request("GET", "/ui/assets/app.js", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"console.log(1)");
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin_only() {
        let gw = stopped_gateway(1, 1);
        let preflight = |origin: &str| {
            axum::http::Request::builder()
                .method("OPTIONS")
                .uri("/api/gateway/status")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap()
        };

        let response = app(&gw)
            .oneshot(preflight("https://owner.example"))
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://owner.example"
        );

        let response = app(&gw)
            .oneshot(preflight("https://elsewhere.example"))
            .await
            .unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_ws_without_owner_is_closed() {
        let gw = stopped_gateway(1, 1);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = app(&gw);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), client.next())
            .await
            .unwrap();
        match frame {
            Some(Ok(WsMessage::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), CLOSE_UNAUTHORIZED)
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}
