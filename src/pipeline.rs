//! ==============================================================================
//! pipeline.rs - request pipeline for the protected backend
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     the single place outbound backend requests pass through. it is built
//!     once at startup around an injected transport and runs explicit stages:
//!
//!         request ──► BearerAuth ──► transport ──► UnauthorizedGuard ──► caller
//!
//!     - BearerAuth: for urls under the protected base, attach
//!       `Authorization: Bearer <credential>` when a credential is stored.
//!       every other header the caller set is left alone.
//!     - UnauthorizedGuard: for urls under the protected base, a 401 clears
//!       the token store and fires the unauthorized callback, once, before
//!       the response is handed back.
//!
//!     the response itself is never altered; callers still see the 401.
//!
//! relationships:
//!     - used by: api.rs (every backend call), main.rs (construction)
//!     - reads/clears: session.rs (TokenStore)
//! ```
//!
//! ==============================================================================

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::{Origin, Url};

use crate::error::Result;
use crate::session::TokenStore;

/// notification fired when the backend rejects the session
pub type UnauthorizedCallback = Arc<dyn Fn() + Send + Sync>;

type CallbackSlot = Arc<RwLock<Option<UnauthorizedCallback>>>;

// ==============================================================================
// transport
// ==============================================================================

/// the network primitive the pipeline wraps
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> std::result::Result<Response, reqwest::Error>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> std::result::Result<Response, reqwest::Error> {
        self.client.execute(request).await
    }
}

// ==============================================================================
// scope
// ==============================================================================

/// which urls count as the protected backend: same origin (scheme, host,
/// port) as the base url, and a path that is the base path or continues it
/// with a `/`
#[derive(Debug, Clone)]
pub struct ProtectedScope {
    base: String,
    origin: Origin,
    path: String,
}

impl ProtectedScope {
    pub fn new(base_url: &str) -> std::result::Result<Self, url::ParseError> {
        let parsed = Url::parse(base_url.trim())?;
        let path = parsed.path().trim_end_matches('/').to_string();
        let origin = parsed.origin();
        Ok(Self {
            base: format!("{}{}", origin.ascii_serialization(), path),
            origin,
            path,
        })
    }

    /// base url without a trailing slash
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn contains(&self, url: &Url) -> bool {
        if url.origin() != self.origin {
            return false;
        }
        match url.path().strip_prefix(self.path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

// ==============================================================================
// stages
// ==============================================================================

/// one middleware step. `protected` says whether the request targets the
/// protected backend.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_request(&self, _request: &mut Request, _protected: bool) {}

    fn on_response(&self, _response: &Response, _protected: bool) {}
}

pub struct BearerAuth {
    tokens: TokenStore,
}

impl BearerAuth {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }
}

impl Stage for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer-auth"
    }

    fn on_request(&self, request: &mut Request, protected: bool) {
        if !protected {
            return;
        }
        let Some(token) = self.tokens.get_token() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(_) => {
                tracing::warn!("stored credential is not a valid header value, sending request without it");
            }
        }
    }
}

pub struct UnauthorizedGuard {
    tokens: TokenStore,
    callback: CallbackSlot,
}

impl Stage for UnauthorizedGuard {
    fn name(&self) -> &'static str {
        "unauthorized-guard"
    }

    fn on_response(&self, response: &Response, protected: bool) {
        if !protected || response.status() != StatusCode::UNAUTHORIZED {
            return;
        }
        tracing::warn!(url = %response.url(), "backend rejected the session, clearing credential");
        self.tokens.clear_token();

        // clone out of the slot so the callback may re-register itself
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

// ==============================================================================
// pipeline
// ==============================================================================

pub struct RequestPipeline {
    scope: ProtectedScope,
    transport: Arc<dyn Transport>,
    stages: Vec<Box<dyn Stage>>,
    callback: CallbackSlot,
}

impl RequestPipeline {
    pub fn builder(base_url: impl Into<String>, tokens: TokenStore) -> PipelineBuilder {
        PipelineBuilder {
            base_url: base_url.into(),
            tokens,
            transport: None,
            callback: None,
            extra_stages: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.scope.base()
    }

    pub fn is_protected(&self, url: &Url) -> bool {
        self.scope.contains(url)
    }

    /// replace the unauthorized callback; `None` removes it
    pub fn set_on_unauthorized(&self, callback: Option<UnauthorizedCallback>) {
        *self.callback.write() = callback;
    }

    pub fn on_unauthorized(&self) -> Option<UnauthorizedCallback> {
        self.callback.read().clone()
    }

    /// run one request through every stage and the transport
    pub async fn request(&self, mut request: Request) -> Result<Response> {
        let protected = self.scope.contains(request.url());
        for stage in &self.stages {
            stage.on_request(&mut request, protected);
        }

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            protected,
            credential = request.headers().contains_key(AUTHORIZATION),
            "sending request"
        );

        let response = self.transport.send(request).await?;
        tracing::debug!(status = response.status().as_u16(), url = %response.url(), "response");

        for stage in &self.stages {
            stage.on_response(&response, protected);
        }
        Ok(response)
    }
}

pub struct PipelineBuilder {
    base_url: String,
    tokens: TokenStore,
    transport: Option<Arc<dyn Transport>>,
    callback: Option<UnauthorizedCallback>,
    extra_stages: Vec<Box<dyn Stage>>,
}

impl PipelineBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn on_unauthorized(mut self, callback: UnauthorizedCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// append a stage after the built-in ones
    pub fn stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.extra_stages.push(stage);
        self
    }

    pub fn build(self) -> Result<RequestPipeline> {
        let scope = ProtectedScope::new(&self.base_url)?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let callback: CallbackSlot = Arc::new(RwLock::new(self.callback));

        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(BearerAuth::new(self.tokens.clone())),
            Box::new(UnauthorizedGuard { tokens: self.tokens, callback: callback.clone() }),
        ];
        stages.extend(self.extra_stages);

        tracing::debug!(
            base = scope.base(),
            stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "request pipeline ready"
        );

        Ok(RequestPipeline {
            scope,
            transport,
            stages,
            callback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use reqwest::header::HeaderMap;
    use reqwest::{Method, ResponseBuilderExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BASE: &str = "https://api.example.com/prod";

    /// answers every request with a fixed status and remembers what it saw
    struct Recorder {
        status: u16,
        seen: Mutex<Vec<(Url, HeaderMap)>>,
    }

    impl Recorder {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self { status, seen: Mutex::new(Vec::new()) })
        }

        fn last_headers(&self) -> HeaderMap {
            self.seen.lock().last().expect("no request recorded").1.clone()
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: Request) -> std::result::Result<Response, reqwest::Error> {
            self.seen.lock().push((request.url().clone(), request.headers().clone()));
            let response = http::Response::builder()
                .status(self.status)
                .url(request.url().clone())
                .body("{}")
                .unwrap();
            Ok(Response::from(response))
        }
    }

    fn counter() -> (Arc<AtomicUsize>, UnauthorizedCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn get(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn injects_bearer_for_protected_urls() {
        let tokens = TokenStore::in_memory();
        tokens.set_token("abc");
        let transport = Recorder::new(200);
        let pipeline = RequestPipeline::builder(BASE, tokens).transport(transport.clone()).build().unwrap();

        let mut request = get("https://api.example.com/prod/tuya/devices");
        request.headers_mut().insert("x-trace", HeaderValue::from_static("t-1"));
        pipeline.request(request).await.unwrap();

        let headers = transport.last_headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(headers.get("x-trace").unwrap(), "t-1");
    }

    #[tokio::test]
    async fn leaves_foreign_urls_alone() {
        let tokens = TokenStore::in_memory();
        tokens.set_token("abc");
        let transport = Recorder::new(401);
        let (count, callback) = counter();
        let pipeline = RequestPipeline::builder(BASE, tokens.clone())
            .transport(transport.clone())
            .on_unauthorized(callback)
            .build()
            .unwrap();

        let response = pipeline.request(get("https://cognito-idp.us-east-1.amazonaws.com/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(transport.last_headers().get(AUTHORIZATION).is_none());
        assert_eq!(tokens.get_token().as_deref(), Some("abc"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_header_without_credential() {
        let transport = Recorder::new(200);
        let pipeline = RequestPipeline::builder(BASE, TokenStore::in_memory())
            .transport(transport.clone())
            .build()
            .unwrap();

        pipeline.request(get("https://api.example.com/prod/tuya/devices")).await.unwrap();
        assert!(transport.last_headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn unauthorized_clears_and_notifies_once() {
        let tokens = TokenStore::in_memory();
        tokens.set_token("abc");
        let (count, callback) = counter();
        let pipeline = RequestPipeline::builder(BASE, tokens.clone())
            .transport(Recorder::new(401))
            .on_unauthorized(callback)
            .build()
            .unwrap();

        let response = pipeline.request(get("https://api.example.com/prod/mapping/sensor-plug")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(tokens.get_token(), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_keeps_credential() {
        let tokens = TokenStore::in_memory();
        tokens.set_token("abc");
        let (count, callback) = counter();
        let pipeline = RequestPipeline::builder(BASE, tokens.clone())
            .transport(Recorder::new(200))
            .on_unauthorized(callback)
            .build()
            .unwrap();

        pipeline.request(get("https://api.example.com/prod/tuya/devices")).await.unwrap();

        assert_eq!(tokens.get_token().as_deref(), Some("abc"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn latest_callback_replaces_previous() {
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        let pipeline = RequestPipeline::builder(BASE, TokenStore::in_memory())
            .transport(Recorder::new(401))
            .on_unauthorized(first_cb)
            .build()
            .unwrap();

        pipeline.set_on_unauthorized(Some(second_cb));
        pipeline.request(get("https://api.example.com/prod/tuya/devices")).await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        pipeline.set_on_unauthorized(None);
        assert!(pipeline.on_unauthorized().is_none());
        pipeline.request(get("https://api.example.com/prod/tuya/devices")).await.unwrap();
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extra_stages_run_after_builtins() {
        struct Tag;
        impl Stage for Tag {
            fn name(&self) -> &'static str {
                "tag"
            }
            fn on_request(&self, request: &mut Request, _protected: bool) {
                let has_auth = request.headers().contains_key(AUTHORIZATION);
                request
                    .headers_mut()
                    .insert("x-saw-auth", HeaderValue::from_static(if has_auth { "yes" } else { "no" }));
            }
        }

        let tokens = TokenStore::in_memory();
        tokens.set_token("abc");
        let transport = Recorder::new(200);
        let pipeline = RequestPipeline::builder(BASE, tokens)
            .transport(transport.clone())
            .stage(Box::new(Tag))
            .build()
            .unwrap();

        pipeline.request(get("https://api.example.com/prod/tuya/devices")).await.unwrap();
        assert_eq!(transport.last_headers().get("x-saw-auth").unwrap(), "yes");
    }

    #[test]
    fn scope_normalizes_trailing_slash() {
        let scope = ProtectedScope::new("https://API.example.com/").unwrap();
        assert_eq!(scope.base(), "https://api.example.com");
        assert!(scope.contains(&Url::parse("https://api.example.com/tuya/devices").unwrap()));
        assert!(!scope.contains(&Url::parse("https://other.example.com/tuya/devices").unwrap()));
    }

    #[test]
    fn scope_rejects_sibling_hosts_and_ports() {
        let scope = ProtectedScope::new("https://api.example.com/").unwrap();
        assert!(!scope.contains(&Url::parse("https://api.example.com.evil.net/steal").unwrap()));
        assert!(!scope.contains(&Url::parse("http://api.example.com/tuya/devices").unwrap()));
        assert!(!scope.contains(&Url::parse("https://api.example.com:8443/tuya/devices").unwrap()));
        assert!(scope.contains(&Url::parse("https://api.example.com:443/tuya/devices").unwrap()));

        let local = ProtectedScope::new("http://127.0.0.1:4000").unwrap();
        assert!(local.contains(&Url::parse("http://127.0.0.1:4000/status").unwrap()));
        assert!(!local.contains(&Url::parse("http://127.0.0.1:40001/status").unwrap()));
    }

    #[test]
    fn scope_matches_whole_path_segments() {
        let pipeline = RequestPipeline::builder(BASE, TokenStore::in_memory())
            .transport(Recorder::new(200))
            .build()
            .unwrap();
        assert!(pipeline.is_protected(&Url::parse("https://api.example.com/prod").unwrap()));
        assert!(pipeline.is_protected(&Url::parse("https://api.example.com/prod/").unwrap()));
        assert!(pipeline.is_protected(&Url::parse("https://api.example.com/prod/tuya/devices?x=1").unwrap()));
        assert!(!pipeline.is_protected(&Url::parse("https://api.example.com/production/tuya").unwrap()));
        assert!(!pipeline.is_protected(&Url::parse("https://api.example.com/").unwrap()));
    }

    #[tokio::test]
    async fn sibling_host_gets_no_credential_and_no_guard() {
        let tokens = TokenStore::in_memory();
        tokens.set_token("abc");
        let transport = Recorder::new(401);
        let (count, callback) = counter();
        let pipeline = RequestPipeline::builder("https://api.example.com/", tokens.clone())
            .transport(transport.clone())
            .on_unauthorized(callback)
            .build()
            .unwrap();

        pipeline.request(get("https://api.example.com.evil.net/steal")).await.unwrap();

        assert!(transport.last_headers().get(AUTHORIZATION).is_none());
        assert_eq!(tokens.get_token().as_deref(), Some("abc"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bad_base_url_fails_build() {
        let res = RequestPipeline::builder("not a url", TokenStore::in_memory())
            .transport(Recorder::new(200))
            .build();
        assert!(matches!(res, Err(crate::Error::InvalidUrl(_))));
    }
}
