use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use studyforge::config::{Config, LlmConfig};
use studyforge::generation::{GenerationError, GenerationPrompt, ItemGenerator};

enum Step {
    Reply(String),
    Outage(String),
}

/// Generator test double. Replays a scripted sequence of outcomes, then
/// falls back to a well-formed multiple-choice payload for every further
/// call.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        ScriptedGenerator {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a raw model response for the next call.
    pub fn push_reply(&self, raw: impl Into<String>) {
        self.script.lock().unwrap().push_back(Step::Reply(raw.into()));
    }

    /// Queue a service failure for the next call.
    pub fn push_outage(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Step::Outage(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &GenerationPrompt) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(raw)) => Ok(raw),
            Some(Step::Outage(msg)) => Err(GenerationError::Service(msg)),
            None => Ok(valid_payload()),
        }
    }
}

/// A payload that validates for multiple choice and exam items alike.
pub fn valid_payload() -> String {
    json!({
        "question": "Which organelle carries out photosynthesis?",
        "options": ["Chloroplast", "Mitochondrion", "Ribosome", "Nucleus"],
        "answer": "Chloroplast",
        "explanation": "Chloroplasts hold the chlorophyll that captures light energy.",
        "section": "Cell Biology"
    })
    .to_string()
}

/// A standard create-batch request body.
pub fn batch_request(target_count: i64) -> Value {
    json!({
        "parameters": {
            "subject": "Biology",
            "topics": ["photosynthesis", "cell structure", "osmosis"],
            "difficulty": "core",
            "style": "multiple_choice"
        },
        "target_count": target_count
    })
}

/// A running test server with its own on-disk SQLite database and a
/// scripted generator injected in place of the LLM client.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: SqlitePool,
    pub client: Client,
    pub generator: Arc<ScriptedGenerator>,
    pub user_id: Uuid,
    _data_dir: tempfile::TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST with explicit identity headers; `body` is optional JSON.
    pub async fn post_as(
        &self,
        user_id: Uuid,
        plan: &str,
        path: &str,
        body: Option<&Value>,
    ) -> (Value, StatusCode) {
        let mut req = self
            .client
            .post(self.url(path))
            .header("x-user-id", user_id.to_string())
            .header("x-user-plan", plan);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// GET with explicit identity headers.
    pub async fn get_as(&self, user_id: Uuid, plan: &str, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .header("x-user-id", user_id.to_string())
            .header("x-user-plan", plan)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Create a batch as the default user (plus plan, roomy quotas).
    pub async fn create_batch(&self, kind: &str, target_count: i64) -> (Value, StatusCode) {
        self.post_as(
            self.user_id,
            "plus",
            &format!("/api/v1/generation/{kind}/batches"),
            Some(&batch_request(target_count)),
        )
        .await
    }

    pub async fn advance(&self, id: &str) -> (Value, StatusCode) {
        self.post_as(
            self.user_id,
            "plus",
            &format!("/api/v1/batches/{id}/advance"),
            None,
        )
        .await
    }

    pub async fn cancel(&self, id: &str) -> (Value, StatusCode) {
        self.post_as(
            self.user_id,
            "plus",
            &format!("/api/v1/batches/{id}/cancel"),
            None,
        )
        .await
    }

    pub async fn get_batch(&self, id: &str) -> (Value, StatusCode) {
        self.get_as(self.user_id, "plus", &format!("/api/v1/batches/{id}"))
            .await
    }
}

/// Spawn a test app on a random port with a fresh database.
pub async fn spawn_app() -> TestApp {
    let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = data_dir.path().join("studyforge_test.db");

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Failed to open test database");

    studyforge::db::schema::init(&pool)
        .await
        .expect("Failed to initialize schema");

    let config = Config {
        database_url: db_path.to_string_lossy().into_owned(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to a random port
        max_batch_size: 50,
        unit_timeout_secs: 5,
        log_level: "warn".to_string(),
        llm: LlmConfig {
            base_url: "http://127.0.0.1:0".to_string(),
            model: "test".to_string(),
            api_key: None,
            request_timeout_secs: 5,
        },
    };

    let generator = Arc::new(ScriptedGenerator::new());
    let app = studyforge::build_app(pool.clone(), config, generator.clone());

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    // Spawn server in background
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let client = Client::new();

    TestApp {
        addr,
        pool,
        client,
        generator,
        user_id: Uuid::now_v7(),
        _data_dir: data_dir,
    }
}

/// Close the pool; the temp directory holding the database cleans itself
/// up when the app drops.
pub async fn cleanup(app: TestApp) {
    app.pool.close().await;
}
