//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use apgate::clock::SystemClock;
use apgate::config::{self, AppConfig};
use apgate::data::{ApObject, MemoryStore};
use apgate::error::AppError;
use apgate::federation::{
    KeyResolver, ReadPolicyMode, SignatureAlgorithm, SignatureHeaders, SignatureMaterial,
    sign_request,
};
use apgate::{AppState, build_router};
use axum::async_trait;
use chrono::Utc;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tempfile::TempDir;
use tokio::net::TcpListener;
use url::Url;

pub const ACTIVITY_JSON: &str = "application/activity+json";
pub const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

/// A remote actor with an RSA key pair.
#[derive(Clone)]
pub struct TestActor {
    pub id: Url,
    pub key_id: String,
    pub private_key_pem: String,
    pub public_key_pem: String,
}

impl TestActor {
    pub fn generate(id: &str) -> Self {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);

        Self {
            id: Url::parse(id).unwrap(),
            key_id: format!("{id}#main-key"),
            private_key_pem: private_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            public_key_pem: public_key.to_public_key_pem(LineEnding::LF).unwrap(),
        }
    }

    pub fn material(&self) -> SignatureMaterial {
        SignatureMaterial {
            key_id: self.key_id.clone(),
            public_key_pem: self.public_key_pem.clone(),
            algorithm: SignatureAlgorithm::RsaSha256,
            owner: self.id.clone(),
        }
    }

    /// Signature headers for a GET of `url`, dated now.
    pub fn sign_get(&self, url: &str) -> SignatureHeaders {
        sign_request("GET", url, None, &self.private_key_pem, &self.key_id, Utc::now()).unwrap()
    }
}

/// Key resolver that only knows a fixed set of actors.
pub struct StaticKeyResolver {
    keys: HashMap<String, SignatureMaterial>,
}

impl StaticKeyResolver {
    pub fn new(actors: &[TestActor]) -> Self {
        Self {
            keys: actors
                .iter()
                .map(|actor| (actor.key_id.clone(), actor.material()))
                .collect(),
        }
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<SignatureMaterial, AppError> {
        self.keys
            .get(key_id)
            .cloned()
            .ok_or_else(|| AppError::KeyResolution(format!("unknown key {key_id}")))
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    /// Remote actor whose key the server can resolve
    pub alice: TestActor,
    /// Remote actor whose key the server cannot resolve
    pub stranger: TestActor,
    pub client: reqwest::Client,
    pub _temp_dir: Option<TempDir>,
}

fn test_config(listener: &TcpListener, read_policy: ReadPolicyMode) -> AppConfig {
    let addr = listener.local_addr().unwrap();

    AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            domain: addr.to_string(),
            protocol: "http".to_string(),
        },
        federation: config::FederationConfig {
            read_policy,
            signature_max_skew_seconds: 300,
            key_cache_ttl_seconds: 3600,
            public_max_age_seconds: 180,
            collaborator_timeout_ms: 5_000,
            signing_key_id: None,
            signing_key_path: None,
        },
        store: config::StoreConfig::default(),
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap()
}

async fn serve(listener: TcpListener, state: AppState) -> String {
    let addr = listener.local_addr().unwrap();
    let app = build_router(state);

    // Spawn server in background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Wait a bit for server to start
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    format!("http://{}", addr)
}

impl TestServer {
    /// Server with no policy adapter; signatures are optional.
    pub async fn new() -> Self {
        Self::with_policy(ReadPolicyMode::Optional).await
    }

    pub async fn with_policy(read_policy: ReadPolicyMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = test_config(&listener, read_policy);

        let alice = TestActor::generate("https://remote.example/users/alice");
        let stranger = TestActor::generate("https://elsewhere.example/users/bob");
        let store = Arc::new(MemoryStore::new());
        let keys = StaticKeyResolver::new(std::slice::from_ref(&alice));

        let state = AppState::with_collaborators(
            config,
            store.clone(),
            Arc::new(keys),
            Arc::new(SystemClock),
        )
        .unwrap();
        let addr = serve(listener, state.clone()).await;

        Self {
            addr,
            state,
            store,
            alice,
            stranger,
            client: test_client(),
            _temp_dir: None,
        }
    }

    /// Server built by [`AppState::new`] from a seed file.
    ///
    /// `documents` receives the server's base URL so ids can point at it.
    pub async fn seeded(documents: impl FnOnce(&str) -> serde_json::Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config(&listener, ReadPolicyMode::Optional);
        let base = format!("http://{}", listener.local_addr().unwrap());

        let temp_dir = TempDir::new().unwrap();
        let seed_path: PathBuf = temp_dir.path().join("seed.json");
        std::fs::write(&seed_path, serde_json::to_vec(&documents(&base)).unwrap()).unwrap();
        config.store.seed_path = Some(seed_path);

        let state = AppState::new(config).await.unwrap();
        let addr = serve(listener, state.clone()).await;

        Self {
            addr,
            state,
            store: Arc::new(MemoryStore::new()),
            alice: TestActor::generate("https://remote.example/users/alice"),
            stranger: TestActor::generate("https://elsewhere.example/users/bob"),
            client: test_client(),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Get URL (and object IRI) for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Store a document as-is.
    pub async fn insert(&self, document: serde_json::Value) {
        self.store
            .insert(ApObject::from_value(document).unwrap())
            .await;
    }

    /// Store a public note at `path`.
    pub async fn insert_public_note(&self, path: &str) -> String {
        let id = self.url(path);
        self.insert(serde_json::json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "id": id,
            "type": "Note",
            "attributedTo": self.url("/users/admin"),
            "content": "hello fediverse",
            "to": [PUBLIC],
            "bcc": ["https://remote.example/users/hidden"]
        }))
        .await;
        id
    }

    /// Store a note addressed only to alice.
    pub async fn insert_direct_note(&self, path: &str) -> String {
        let id = self.url(path);
        self.insert(serde_json::json!({
            "id": id,
            "type": "Note",
            "attributedTo": self.url("/users/admin"),
            "content": "just for you",
            "to": [self.alice.id.as_str()]
        }))
        .await;
        id
    }

    /// Unsigned ActivityPub GET.
    pub async fn get_ap(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("Accept", ACTIVITY_JSON)
            .send()
            .await
            .unwrap()
    }

    /// ActivityPub GET signed by `actor`.
    pub async fn get_ap_signed(&self, path: &str, actor: &TestActor) -> reqwest::Response {
        let signed = actor.sign_get(&self.url(path));
        self.client
            .get(self.url(path))
            .header("Accept", ACTIVITY_JSON)
            .header("Date", signed.date)
            .header("Signature", signed.signature)
            .send()
            .await
            .unwrap()
    }
}
