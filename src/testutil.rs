// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared test fixtures: RSA test keys, token minting, a scriptable key
//! source, a fake identity provider and a small resource server.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse, RSAKeyParameters, RSAKeyType,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use url::Url;

use crate::auth::keys::{KeyFetchError, KeyResolver, KeySource};
use crate::auth::{ClaimNames, TokenVerifier, VerifiedClaims, VerifierSettings};
use crate::client::identity::{IdentityError, IdentityProvider, RefreshedTokens};
use crate::client::session::TokenTriple;

pub const ISSUER: &str = "https://issuer.example.com";
pub const AUDIENCE: &str = "inventory-api";

pub struct TestKey {
    pub kid: String,
    pub encoding: EncodingKey,
    pub jwk: Jwk,
}

fn generate(kid: &str) -> TestKey {
    let private_key = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate RSA key");
    let public_key = private_key.to_public_key();
    let pem = private_key.to_pkcs1_pem(LineEnding::LF).expect("encode PEM");

    TestKey {
        kid: kid.to_string(),
        encoding: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("load PEM"),
        jwk: Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_algorithm: Some(KeyAlgorithm::RS256),
                key_id: Some(kid.to_string()),
                ..Default::default()
            },
            algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
                key_type: RSAKeyType::RSA,
                n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
                e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            }),
        },
    }
}

/// Key pairs are expensive to generate, so each is made once per test binary.
pub fn test_key(kid: &str) -> &'static TestKey {
    static K1: OnceLock<TestKey> = OnceLock::new();
    static K2: OnceLock<TestKey> = OnceLock::new();
    match kid {
        "k1" => K1.get_or_init(|| generate("k1")),
        "k2" => K2.get_or_init(|| generate("k2")),
        other => panic!("no test key named {other}"),
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims valid for fifteen minutes.
pub fn claims_for(subject: &str, role: Option<&str>) -> Value {
    let mut claims = json!({
        "sub": subject,
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": now(),
        "exp": now() + 900,
        "custom:employee_id": "E-1",
    });
    if let Some(role) = role {
        claims["custom:role"] = json!(role);
    }
    claims
}

/// Sign `claims` with RS256 under the key's `kid`.
pub fn mint(key: &TestKey, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key.kid.clone());
    encode(&header, claims, &key.encoding).expect("sign token")
}

/// An `alg: none` token.
pub fn mint_unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT","kid":"k1"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.")
}

/// Claims as the verifier would produce them, without a token.
pub fn verified(role: Option<&str>) -> VerifiedClaims {
    let raw = match claims_for("user_1", role) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    VerifiedClaims::from_raw(raw, &ClaimNames::default(), AUDIENCE).expect("valid claims")
}

pub fn verifier_with(source: Arc<FakeKeySource>) -> TokenVerifier {
    TokenVerifier::new(
        Arc::new(KeyResolver::new(source)),
        VerifierSettings::new(ISSUER, AUDIENCE),
    )
}

/// Key source serving a scripted response and counting fetches.
pub struct FakeKeySource {
    response: Mutex<Result<JwkSet, KeyFetchError>>,
    delay: Mutex<Duration>,
    fetches: AtomicUsize,
}

impl FakeKeySource {
    pub fn with_kids(kids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Ok(key_set(kids))),
            delay: Mutex::new(Duration::ZERO),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn serve_kids(&self, kids: &[&str]) {
        *self.response.lock().unwrap() = Ok(key_set(kids));
    }

    pub fn fail_with(&self, error: KeyFetchError) {
        *self.response.lock().unwrap() = Err(error);
    }

    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn key_set(kids: &[&str]) -> JwkSet {
    JwkSet {
        keys: kids.iter().map(|kid| test_key(kid).jwk.clone()).collect(),
    }
}

#[async_trait]
impl KeySource for FakeKeySource {
    async fn fetch_key_set(&self) -> Result<JwkSet, KeyFetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().unwrap().clone()
    }
}

/// Tokens the resource server currently accepts.
pub type ValidTokens = Arc<Mutex<HashSet<String>>>;

pub const GOOD_PASSWORD: &str = "correct-horse";

/// Identity provider that issues `access-<n>` tokens and registers them as
/// valid with the resource server.
pub struct FakeIdentityProvider {
    pub valid: ValidTokens,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    issued: AtomicUsize,
    refresh_delay: Mutex<Duration>,
    refresh_fails: AtomicBool,
    rotate_refresh_token: AtomicBool,
    logout_fails: AtomicBool,
}

impl FakeIdentityProvider {
    pub fn new(valid: ValidTokens) -> Arc<Self> {
        Arc::new(Self {
            valid,
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_fails: AtomicBool::new(false),
            rotate_refresh_token: AtomicBool::new(false),
            logout_fails: AtomicBool::new(false),
        })
    }

    pub fn delay_refresh(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn fail_refresh(&self) {
        self.refresh_fails.store(true, Ordering::SeqCst);
    }

    pub fn rotate_refresh_tokens(&self) {
        self.rotate_refresh_token.store(true, Ordering::SeqCst);
    }

    pub fn fail_logout(&self) {
        self.logout_fails.store(true, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn issue(&self) -> usize {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.valid.lock().unwrap().insert(format!("access-{n}"));
        n
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn login(&self, _username: &str, password: &str) -> Result<TokenTriple, IdentityError> {
        if password != GOOD_PASSWORD {
            return Err(IdentityError::Rejected);
        }
        let n = self.issue();
        Ok(TokenTriple {
            access_token: format!("access-{n}"),
            id_token: format!("id-{n}"),
            refresh_token: "refresh-0".to_string(),
            expires_in: 3600,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedTokens, IdentityError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(IdentityError::Rejected);
        }
        let n = self.issue();
        Ok(RefreshedTokens {
            access_token: format!("access-{n}"),
            id_token: format!("id-{n}"),
            refresh_token: self
                .rotate_refresh_token
                .load(Ordering::SeqCst)
                .then(|| format!("refresh-{n}")),
            expires_in: 3600,
        })
    }

    async fn logout(&self, _access_token: &str) -> Result<(), IdentityError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.logout_fails.load(Ordering::SeqCst) {
            return Err(IdentityError::Status(500));
        }
        Ok(())
    }
}

/// A session whose access token the resource server no longer accepts.
pub fn stale_session() -> TokenTriple {
    TokenTriple {
        access_token: "access-stale".to_string(),
        id_token: "id-stale".to_string(),
        refresh_token: "refresh-0".to_string(),
        expires_in: 3600,
    }
}

#[derive(Clone)]
struct ResourceState {
    valid: ValidTokens,
    hits: Arc<AtomicUsize>,
}

pub struct ResourceServer {
    pub base_url: Url,
    pub hits: Arc<AtomicUsize>,
}

impl ResourceServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn presented(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn items(State(state): State<ResourceState>, headers: HeaderMap) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    match presented(&headers) {
        Some(token) if state.valid.lock().unwrap().contains(&token) => (StatusCode::OK, token),
        _ => (StatusCode::UNAUTHORIZED, String::new()),
    }
}

async fn echo(State(state): State<ResourceState>, headers: HeaderMap, body: String) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    match presented(&headers) {
        Some(token) if state.valid.lock().unwrap().contains(&token) => (StatusCode::OK, body),
        _ => (StatusCode::UNAUTHORIZED, String::new()),
    }
}

async fn always_unauthorized(State(state): State<ResourceState>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::UNAUTHORIZED
}

async fn forbidden(State(state): State<ResourceState>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::FORBIDDEN
}

/// Serve `/items`, `/echo`, `/always-401` and `/forbidden` on an ephemeral port.
pub async fn spawn_resource_server(valid: ValidTokens) -> ResourceServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/items", get(items))
        .route("/echo", post(echo))
        .route("/always-401", get(always_unauthorized))
        .route("/forbidden", get(forbidden))
        .with_state(ResourceState {
            valid,
            hits: Arc::clone(&hits),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("resource server");
    });

    ResourceServer {
        base_url: Url::parse(&format!("http://{addr}/")).expect("url"),
        hits,
    }
}
