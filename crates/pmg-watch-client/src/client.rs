//! Session client for the PMG management API.
//!
//! Owns the connection parameters and the ticket credential, and hides
//! credential renewal behind `login()`, `get()`, and `post()`.

use reqwest::header;
use serde_json::Value;
use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

/// Cookie carrying the session ticket on authenticated calls.
const COOKIE_NAME: &str = "PMGAuthCookie";
/// Header carrying the anti-forgery token when the login issued one.
const CSRF_HEADER: &str = "CSRFPreventionToken";

/// Connection parameters for a [`PmgClient`].
///
/// Immutable for the lifetime of the client; a reconfiguration means a
/// new client instance.
#[derive(Debug, Clone)]
pub struct PmgClientConfig {
    /// Appliance hostname or address.
    pub host: String,
    /// Management API port.
    pub port: u16,
    /// Login user, with or without an `@realm` suffix.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Authentication realm appended when `username` carries none.
    pub realm: String,
    /// Verify the appliance's TLS certificate. Disabling this skips
    /// certificate validation for every request the client makes.
    pub verify_tls: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for PmgClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8006,
            username: "root".to_string(),
            password: String::new(),
            realm: "pmg".to_string(),
            verify_tls: true,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PmgClientConfig {
    /// Load connection parameters from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PMGWATCH_HOST`: appliance host, or a full URL to strip (required)
    /// - `PMGWATCH_PORT`: management port (default 8006)
    /// - `PMGWATCH_USERNAME`: login user (required)
    /// - `PMGWATCH_PASSWORD`: login password (required)
    /// - `PMGWATCH_REALM`: authentication realm (default `pmg`)
    /// - `PMGWATCH_VERIFY_TLS`: verify certificates (default true)
    /// - `PMGWATCH_TIMEOUT_SECS`: per-request timeout (default 30)
    ///
    /// # Errors
    ///
    /// Returns [`PmgError::Init`] when a required variable is missing or
    /// a value does not parse.
    pub fn from_env() -> Result<Self, PmgError> {
        let mut config = Self::default();

        let host = env::var("PMGWATCH_HOST")
            .map_err(|_| PmgError::Init("PMGWATCH_HOST is not set".to_string()))?;
        let (host, url_port) = split_host_input(&host)?;
        config.host = host;
        if let Some(port) = url_port {
            config.port = port;
        }

        if let Ok(port) = env::var("PMGWATCH_PORT") {
            config.port = port
                .parse()
                .map_err(|e| PmgError::Init(format!("PMGWATCH_PORT: {e}")))?;
        }

        config.username = env::var("PMGWATCH_USERNAME")
            .map_err(|_| PmgError::Init("PMGWATCH_USERNAME is not set".to_string()))?;
        config.password = env::var("PMGWATCH_PASSWORD")
            .map_err(|_| PmgError::Init("PMGWATCH_PASSWORD is not set".to_string()))?;

        if let Ok(realm) = env::var("PMGWATCH_REALM") {
            config.realm = realm;
        }

        if let Ok(verify) = env::var("PMGWATCH_VERIFY_TLS") {
            config.verify_tls = parse_bool("PMGWATCH_VERIFY_TLS", &verify)?;
        }

        if let Ok(timeout) = env::var("PMGWATCH_TIMEOUT_SECS") {
            let secs: u64 = timeout
                .parse()
                .map_err(|e| PmgError::Init(format!("PMGWATCH_TIMEOUT_SECS: {e}")))?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Accept either a bare host or a full URL, returning host and any
/// explicit port the URL carried.
fn split_host_input(input: &str) -> Result<(String, Option<u16>), PmgError> {
    if !input.contains("://") {
        return Ok((input.to_string(), None));
    }

    let url =
        Url::parse(input).map_err(|e| PmgError::Init(format!("PMGWATCH_HOST: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| PmgError::Init(format!("PMGWATCH_HOST: no host in {input}")))?;
    Ok((host.to_string(), url.port()))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, PmgError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(PmgError::Init(format!("{name}: not a boolean: {other}"))),
    }
}

/// The live session credential issued by `/access/ticket`.
///
/// Validity is discovered reactively through a 401 on a later call; the
/// client never expires a credential on its own.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Opaque session ticket, carried as a cookie.
    pub ticket: String,
    /// Anti-forgery token, attached as a header when present.
    pub csrf_token: Option<String>,
}

/// Outcome of a single authenticated request attempt. Transport and
/// status failures travel separately through `Result`.
enum Attempt {
    /// 200 with the envelope's `data` field (`None` when absent/null).
    Success(Option<Value>),
    /// 401: the ticket was rejected.
    Unauthorized { body: String },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Post,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Session-authenticated client for the PMG management API.
///
/// Safe to share across tasks: the credential is swapped atomically on
/// renewal, and concurrent calls see either the old or the new ticket,
/// never a partial one. Racing logins are tolerated (at most one extra
/// round trip), not serialized.
pub struct PmgClient {
    http: reqwest::Client,
    config: PmgClientConfig,
    base_url: String,
    credential: RwLock<Option<Arc<Credential>>>,
}

impl PmgClient {
    /// Create a new client for `https://{host}:{port}/api2/json`.
    ///
    /// # Errors
    ///
    /// Returns [`PmgError::Init`] if the HTTP client cannot be built.
    pub fn new(config: PmgClientConfig) -> Result<Self, PmgError> {
        let base_url = format!("https://{}:{}/api2/json", config.host, config.port);
        Self::with_base_url(config, base_url)
    }

    fn with_base_url(config: PmgClientConfig, base_url: String) -> Result<Self, PmgError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout);

        if !config.verify_tls {
            tracing::warn!(host = %config.host, "TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| PmgError::Init(e.to_string()))?;

        Ok(Self {
            http,
            config,
            base_url,
            credential: RwLock::new(None),
        })
    }

    /// Username qualified as `user@realm` unless it already carries one.
    fn full_username(&self) -> String {
        if self.config.username.contains('@') {
            self.config.username.clone()
        } else {
            format!("{}@{}", self.config.username, self.config.realm)
        }
    }

    fn current_credential(&self) -> Option<Arc<Credential>> {
        self.credential
            .read()
            .expect("credential lock poisoned")
            .clone()
    }

    /// Authenticate against `/access/ticket` and install the credential.
    ///
    /// A successful login atomically replaces any prior credential.
    ///
    /// # Errors
    ///
    /// Returns [`PmgError::Authentication`] on a non-success status, an
    /// unparseable response, or a payload missing the ticket.
    pub async fn login(&self) -> Result<Arc<Credential>, PmgError> {
        let url = format!("{}/access/ticket", self.base_url);
        let form = [
            ("username", self.full_username()),
            ("password", self.config.password.clone()),
        ];

        tracing::debug!(url, "requesting session ticket");

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| PmgError::Authentication {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PmgError::Authentication {
                status: Some(status),
                message: e.to_string(),
            })?;

        if !(200..300).contains(&status) {
            return Err(PmgError::Authentication {
                status: Some(status),
                message: body,
            });
        }

        let payload: Value =
            serde_json::from_str(&body).map_err(|_| PmgError::Authentication {
                status: Some(status),
                message: format!("unparseable login response: {body}"),
            })?;

        let data = payload.get("data");
        let ticket = data
            .and_then(|d| d.get("ticket"))
            .and_then(Value::as_str)
            .ok_or_else(|| PmgError::Authentication {
                status: Some(status),
                message: "login response missing ticket".to_string(),
            })?;
        let csrf_token = data
            .and_then(|d| d.get(CSRF_HEADER))
            .and_then(Value::as_str)
            .map(ToString::to_string);

        let credential = Arc::new(Credential {
            ticket: ticket.to_string(),
            csrf_token,
        });
        *self.credential.write().expect("credential lock poisoned") =
            Some(Arc::clone(&credential));

        tracing::debug!("session ticket installed");
        Ok(credential)
    }

    /// Authenticated GET returning the envelope's `data` field.
    ///
    /// Logs in first when no credential is held, and renews the
    /// credential exactly once if the call answers 401.
    ///
    /// # Errors
    ///
    /// Returns [`PmgError::Authentication`] when a (re)login fails and
    /// [`PmgError::ApiRequest`] on status or transport failures.
    pub async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Option<Value>, PmgError> {
        self.request(Verb::Get, path, query, &[]).await
    }

    /// Authenticated POST with a form body, same contract as [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns [`PmgError::Authentication`] when a (re)login fails and
    /// [`PmgError::ApiRequest`] on status or transport failures.
    pub async fn post(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<Option<Value>, PmgError> {
        self.request(Verb::Post, path, &[], form).await
    }

    /// The retry-once state machine: no credential → login; a 401 on an
    /// authenticated attempt → one login and one retry; a 401 on the
    /// retry is a hard stop surfaced as an API error.
    async fn request(
        &self,
        verb: Verb,
        path: &str,
        query: &[(String, String)],
        form: &[(String, String)],
    ) -> Result<Option<Value>, PmgError> {
        let mut credential = match self.current_credential() {
            Some(credential) => credential,
            None => self.login().await?,
        };

        let mut renewed = false;
        loop {
            match self.attempt(verb, path, query, form, &credential).await? {
                Attempt::Success(data) => return Ok(data),
                Attempt::Unauthorized { body } => {
                    if renewed {
                        return Err(PmgError::ApiRequest {
                            method: verb.as_str(),
                            path: path.to_string(),
                            status: Some(401),
                            message: body,
                        });
                    }
                    tracing::debug!(path, "ticket rejected, renewing once");
                    renewed = true;
                    credential = self.login().await?;
                }
            }
        }
    }

    /// Issue one authenticated request and classify its outcome.
    async fn attempt(
        &self,
        verb: Verb,
        path: &str,
        query: &[(String, String)],
        form: &[(String, String)],
        credential: &Credential,
    ) -> Result<Attempt, PmgError> {
        let url = format!("{}{}", self.base_url, path);

        tracing::debug!(method = verb.as_str(), url, "API request");

        let mut request = match verb {
            Verb::Get => self.http.get(&url).query(query),
            Verb::Post => self.http.post(&url).form(form),
        };
        request = request.header(
            header::COOKIE,
            format!("{COOKIE_NAME}={}", credential.ticket),
        );
        if let Some(token) = credential.csrf_token.as_deref() {
            request = request.header(CSRF_HEADER, token);
        }

        let response = request.send().await.map_err(|e| PmgError::ApiRequest {
            method: verb.as_str(),
            path: path.to_string(),
            status: None,
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| PmgError::ApiRequest {
            method: verb.as_str(),
            path: path.to_string(),
            status: Some(status),
            message: e.to_string(),
        })?;

        if status == 401 {
            return Ok(Attempt::Unauthorized { body });
        }
        if !(200..300).contains(&status) {
            return Err(PmgError::ApiRequest {
                method: verb.as_str(),
                path: path.to_string(),
                status: Some(status),
                message: body,
            });
        }

        let payload: Value =
            serde_json::from_str(&body).map_err(|e| PmgError::ApiRequest {
                method: verb.as_str(),
                path: path.to_string(),
                status: Some(status),
                message: format!("invalid JSON body: {e}"),
            })?;

        // Absence of `data` is valid-but-empty, not an error.
        let data = match payload.get("data") {
            None | Some(Value::Null) => None,
            Some(data) => Some(data.clone()),
        };
        Ok(Attempt::Success(data))
    }
}

/// Errors produced by the session client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PmgError {
    /// Client initialization or configuration failed.
    #[error("client init error: {0}")]
    Init(String),
    /// The login call failed: bad credentials, unreachable host, or a
    /// malformed ticket response.
    #[error("login failed: {message}")]
    Authentication {
        /// HTTP status, when the appliance answered at all.
        status: Option<u16>,
        /// Response body or transport fault, for diagnostics.
        message: String,
    },
    /// An authenticated call returned a non-success status, or a
    /// transport or parse fault occurred.
    #[error("{method} {path} failed: {message}")]
    ApiRequest {
        /// HTTP method of the failed call.
        method: &'static str,
        /// API path of the failed call.
        path: String,
        /// HTTP status, absent for transport faults.
        status: Option<u16>,
        /// Response body or underlying fault.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Form, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scriptable loopback stand-in for the appliance API.
    #[derive(Default)]
    struct Appliance {
        logins: AtomicUsize,
        /// Tickets currently accepted by data endpoints. Real tickets
        /// stay valid until revoked, so renewals never invalidate a
        /// concurrent caller's credential.
        valid_tickets: Mutex<std::collections::HashSet<String>>,
        /// Username seen by the most recent login.
        last_username: Mutex<Option<String>>,
        /// CSRF header seen by the most recent POST.
        last_csrf: Mutex<Option<String>>,
        /// Form body seen by the most recent POST.
        last_form: Mutex<Option<HashMap<String, String>>>,
        /// Query string seen by the most recent GET.
        last_query: Mutex<Option<HashMap<String, String>>>,
        /// When set, data endpoints answer 401 no matter the ticket.
        reject_all: std::sync::atomic::AtomicBool,
    }

    impl Appliance {
        fn issue_ticket(&self) -> String {
            let serial = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            let ticket = format!("ticket-{serial}");
            self.valid_tickets.lock().unwrap().insert(ticket.clone());
            ticket
        }

        fn revoke(&self) {
            self.valid_tickets.lock().unwrap().clear();
        }

        fn accepts(&self, headers: &HeaderMap) -> bool {
            if self.reject_all.load(Ordering::SeqCst) {
                return false;
            }
            let cookie = headers
                .get(axum::http::header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let ticket = cookie.strip_prefix("PMGAuthCookie=").unwrap_or_default();
            self.valid_tickets.lock().unwrap().contains(ticket)
        }
    }

    async fn ticket_handler(
        State(state): State<Arc<Appliance>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        *state.last_username.lock().unwrap() = form.get("username").cloned();
        let ticket = state.issue_ticket();
        Json(json!({
            "data": {"ticket": ticket, "CSRFPreventionToken": format!("csrf-{ticket}")}
        }))
    }

    async fn version_handler(
        State(state): State<Arc<Appliance>>,
        headers: HeaderMap,
    ) -> Response {
        if state.accepts(&headers) {
            Json(json!({"data": {"version": "8.1", "release": "8.1-2"}})).into_response()
        } else {
            (StatusCode::UNAUTHORIZED, "authentication failure").into_response()
        }
    }

    async fn stats_handler(
        State(state): State<Arc<Appliance>>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        if !state.accepts(&headers) {
            return (StatusCode::UNAUTHORIZED, "authentication failure").into_response();
        }
        *state.last_query.lock().unwrap() = Some(query);
        Json(json!({"data": {"count": 7}})).into_response()
    }

    async fn command_handler(
        State(state): State<Arc<Appliance>>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> Response {
        if !state.accepts(&headers) {
            return (StatusCode::UNAUTHORIZED, "authentication failure").into_response();
        }
        *state.last_csrf.lock().unwrap() = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        *state.last_form.lock().unwrap() = Some(form);
        Json(json!({"data": null})).into_response()
    }

    fn appliance_router(state: Arc<Appliance>) -> Router {
        Router::new()
            .route("/api2/json/access/ticket", post(ticket_handler))
            .route("/api2/json/version", get(version_handler))
            .route("/api2/json/statistics/mail", get(stats_handler))
            .route("/api2/json/nodes/pmg1/status", post(command_handler))
            .with_state(state)
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api2/json")
    }

    fn test_config() -> PmgClientConfig {
        PmgClientConfig {
            host: "127.0.0.1".to_string(),
            username: "monitor".to_string(),
            password: "secret".to_string(),
            ..PmgClientConfig::default()
        }
    }

    fn client_for(base_url: String) -> PmgClient {
        PmgClient::with_base_url(test_config(), base_url).unwrap()
    }

    #[test]
    fn config_default() {
        let config = PmgClientConfig::default();
        assert_eq!(config.port, 8006);
        assert_eq!(config.realm, "pmg");
        assert!(config.verify_tls);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn username_qualified_with_realm() {
        let client = client_for("http://127.0.0.1:1/api2/json".to_string());
        assert_eq!(client.full_username(), "monitor@pmg");
    }

    #[test]
    fn username_with_realm_left_alone() {
        let config = PmgClientConfig {
            username: "monitor@pam".to_string(),
            ..test_config()
        };
        let client =
            PmgClient::with_base_url(config, "http://127.0.0.1:1/api2/json".to_string())
                .unwrap();
        assert_eq!(client.full_username(), "monitor@pam");
    }

    #[test]
    fn host_input_accepts_bare_host_and_url() {
        assert_eq!(
            split_host_input("pmg.example.com").unwrap(),
            ("pmg.example.com".to_string(), None)
        );
        assert_eq!(
            split_host_input("https://pmg.example.com:8006").unwrap(),
            ("pmg.example.com".to_string(), Some(8006))
        );
        assert_eq!(
            split_host_input("https://pmg.example.com").unwrap(),
            ("pmg.example.com".to_string(), None)
        );
        assert!(split_host_input("https://").is_err());
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[tokio::test]
    async fn lazy_login_then_reuse() {
        let state = Arc::new(Appliance::default());
        let base_url = spawn(appliance_router(Arc::clone(&state))).await;
        let client = client_for(base_url);

        let data = client.get("/version", &[]).await.unwrap();
        assert_eq!(data.unwrap()["version"], "8.1");

        // Exactly one login before the first real request, qualified
        // with the realm.
        assert_eq!(state.logins.load(Ordering::SeqCst), 1);
        assert_eq!(
            state.last_username.lock().unwrap().as_deref(),
            Some("monitor@pmg")
        );

        // The credential is reused, not re-requested.
        client.get("/version", &[]).await.unwrap();
        assert_eq!(state.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn relogin_once_on_expired_ticket() {
        let state = Arc::new(Appliance::default());
        let base_url = spawn(appliance_router(Arc::clone(&state))).await;
        let client = client_for(base_url);

        client.get("/version", &[]).await.unwrap();
        state.revoke();

        let data = client.get("/version", &[]).await.unwrap();
        assert_eq!(data.unwrap()["version"], "8.1");
        assert_eq!(state.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_unauthorized_is_surfaced() {
        let state = Arc::new(Appliance::default());
        state.reject_all.store(true, Ordering::SeqCst);
        let base_url = spawn(appliance_router(Arc::clone(&state))).await;
        let client = client_for(base_url);

        let err = client.get("/version", &[]).await.unwrap_err();
        match err {
            PmgError::ApiRequest { status, path, .. } => {
                assert_eq!(status, Some(401));
                assert_eq!(path, "/version");
            }
            other => panic!("expected ApiRequest, got {other:?}"),
        }
        // Lazy login plus exactly one renewal, then a hard stop.
        assert_eq!(state.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn login_rejected_status() {
        let router = Router::new().route(
            "/api2/json/access/ticket",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid credentials") }),
        );
        let base_url = spawn(router).await;
        let client = client_for(base_url);

        let err = client.get("/version", &[]).await.unwrap_err();
        match err {
            PmgError::Authentication { status, message } => {
                assert_eq!(status, Some(401));
                assert!(message.contains("invalid credentials"));
            }
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_response_missing_ticket() {
        let router = Router::new().route(
            "/api2/json/access/ticket",
            post(|| async { Json(json!({"data": {}})) }),
        );
        let base_url = spawn(router).await;
        let client = client_for(base_url);

        let err = client.login().await.unwrap_err();
        assert!(matches!(err, PmgError::Authentication { .. }));
        assert!(err.to_string().contains("missing ticket"));
    }

    #[tokio::test]
    async fn login_response_not_json() {
        let router = Router::new().route(
            "/api2/json/access/ticket",
            post(|| async { "<html>login page</html>" }),
        );
        let base_url = spawn(router).await;
        let client = client_for(base_url);

        let err = client.login().await.unwrap_err();
        assert!(matches!(
            err,
            PmgError::Authentication {
                status: Some(200),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn server_error_names_path_status_and_body() {
        let state = Arc::new(Appliance::default());
        let router = appliance_router(Arc::clone(&state)).route(
            "/api2/json/nodes",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "cluster on fire") }),
        );
        let base_url = spawn(router).await;
        let client = client_for(base_url);

        let err = client.get("/nodes", &[]).await.unwrap_err();
        match err {
            PmgError::ApiRequest {
                method,
                path,
                status,
                message,
            } => {
                assert_eq!(method, "GET");
                assert_eq!(path, "/nodes");
                assert_eq!(status, Some(500));
                assert!(message.contains("cluster on fire"));
            }
            other => panic!("expected ApiRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_data_field_is_empty_not_error() {
        let state = Arc::new(Appliance::default());
        let router = appliance_router(Arc::clone(&state)).route(
            "/api2/json/quarantine/spamstatus",
            get(|| async { Json(json!({"success": 1})) }),
        );
        let base_url = spawn(router).await;
        let client = client_for(base_url);

        let data = client.get("/quarantine/spamstatus", &[]).await.unwrap();
        assert_eq!(data, None);
    }

    #[tokio::test]
    async fn login_transport_fault() {
        // Nothing listens on this port.
        let client = client_for("http://127.0.0.1:9/api2/json".to_string());
        let err = client.login().await.unwrap_err();
        assert!(matches!(
            err,
            PmgError::Authentication { status: None, .. }
        ));
    }

    #[tokio::test]
    async fn non_json_body_maps_to_api_request() {
        let state = Arc::new(Appliance::default());
        let router = appliance_router(Arc::clone(&state)).route(
            "/api2/json/nodes",
            get(|| async { "<html>proxy error</html>" }),
        );
        let base_url = spawn(router).await;
        let client = client_for(base_url);

        let err = client.get("/nodes", &[]).await.unwrap_err();
        match err {
            PmgError::ApiRequest { status, message, .. } => {
                assert_eq!(status, Some(200));
                assert!(message.contains("invalid JSON body"));
            }
            other => panic!("expected ApiRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_parameters_are_forwarded() {
        let state = Arc::new(Appliance::default());
        let base_url = spawn(appliance_router(Arc::clone(&state))).await;
        let client = client_for(base_url);

        let query = vec![
            ("starttime".to_string(), "1710028800".to_string()),
            ("endtime".to_string(), "1710115199".to_string()),
        ];
        client.get("/statistics/mail", &query).await.unwrap();

        let seen = state.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get("starttime").map(String::as_str), Some("1710028800"));
        assert_eq!(seen.get("endtime").map(String::as_str), Some("1710115199"));
    }

    #[tokio::test]
    async fn post_carries_cookie_csrf_and_form() {
        let state = Arc::new(Appliance::default());
        let base_url = spawn(appliance_router(Arc::clone(&state))).await;
        let client = client_for(base_url);

        let form = vec![("command".to_string(), "reboot".to_string())];
        let data = client.post("/nodes/pmg1/status", &form).await.unwrap();
        assert_eq!(data, None);

        assert_eq!(
            state.last_csrf.lock().unwrap().as_deref(),
            Some("csrf-ticket-1")
        );
        let seen = state.last_form.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get("command").map(String::as_str), Some("reboot"));
    }

    #[tokio::test]
    async fn concurrent_calls_converge_on_one_ticket() {
        let state = Arc::new(Appliance::default());
        let base_url = spawn(appliance_router(Arc::clone(&state))).await;
        let client = Arc::new(client_for(base_url));

        client.get("/version", &[]).await.unwrap();
        state.revoke();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                client.get("/version", &[]).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        // Racing renewals may each pay one extra login, never more, and
        // the surviving credential is a fully installed one.
        let logins = state.logins.load(Ordering::SeqCst);
        assert!((2..=5).contains(&logins), "unexpected login count {logins}");
        let held = client.current_credential().unwrap();
        assert!(held.ticket.starts_with("ticket-"));
        assert_eq!(
            held.csrf_token.as_deref(),
            Some(format!("csrf-{}", held.ticket).as_str())
        );
    }
}
