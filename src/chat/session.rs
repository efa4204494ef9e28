//! Session store for concurrent conversations.
//!
//! A session is one [`Orchestrator`] behind its own async mutex: turns within
//! a session run one at a time, while separate sessions proceed concurrently.
//! All sessions share the LLM client, the provider and the scanned schema,
//! never history.

use crate::chat::Orchestrator;
use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::db::DatabaseProvider;
use crate::error::{ChatError, ChatResult};
use crate::llm::LlmClient;
use crate::models::{ChatResponse, DatabaseMetadata};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Idle sessions older than this are dropped by the cleanup task.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;

const CLEANUP_INTERVAL_SECS: u64 = 60;

pub type SharedSession = Arc<Mutex<Orchestrator>>;

struct SessionEntry {
    orchestrator: SharedSession,
    created_at: DateTime<Utc>,
    last_used: Instant,
}

/// Listing entry; does not lock the session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn DatabaseProvider>,
    schema_metadata: Option<Arc<DatabaseMetadata>>,
    max_iterations: usize,
    read_only: bool,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(llm: Arc<dyn LlmClient>, provider: Arc<dyn DatabaseProvider>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            llm,
            provider,
            schema_metadata: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            read_only: true,
            idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        }
    }

    /// Schema installed into every session created afterwards.
    pub fn with_schema_metadata(mut self, metadata: DatabaseMetadata) -> Self {
        self.schema_metadata = Some(Arc::new(metadata));
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Initial read-only flag for new sessions.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Session for `session_id`, created on first reference.
    pub async fn get_or_create(&self, session_id: &str) -> SharedSession {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_used = Instant::now();
            return entry.orchestrator.clone();
        }

        let orchestrator = Arc::new(Mutex::new(self.new_orchestrator()));
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                orchestrator: orchestrator.clone(),
                created_at: Utc::now(),
                last_used: Instant::now(),
            },
        );
        info!(session_id = %session_id, total = sessions.len(), "Session created");
        orchestrator
    }

    /// Existing session only.
    pub async fn get(&self, session_id: &str) -> ChatResult<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| ChatError::session_not_found(session_id))?;
        entry.last_used = Instant::now();
        Ok(entry.orchestrator.clone())
    }

    /// Run one turn in the session, creating it if needed.
    pub async fn chat(&self, session_id: &str, user_message: &str) -> ChatResponse {
        let session = self.get_or_create(session_id).await;
        let mut orchestrator = session.lock().await;
        debug!(session_id = %session_id, "Session turn started");
        orchestrator.chat_or_error(user_message).await
    }

    /// Destroy a session, e.g. on client disconnect.
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn list_all(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                session_id: id.clone(),
                created_at: entry.created_at,
                idle_secs: entry.last_used.elapsed().as_secs(),
            })
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// Drop sessions idle longer than the timeout. Returns how many went.
    pub async fn cleanup_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let idle_timeout = self.idle_timeout;
        sessions.retain(|_, entry| entry.last_used.elapsed() <= idle_timeout);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Idle sessions cleaned up");
        }
        removed
    }

    /// Periodically run [`cleanup_idle`](Self::cleanup_idle) in the background.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                self.cleanup_idle().await;
            }
        });
    }

    fn new_orchestrator(&self) -> Orchestrator {
        let mut orchestrator = Orchestrator::new(self.llm.clone(), self.provider.clone())
            .with_max_iterations(self.max_iterations);
        orchestrator.set_read_only_mode(self.read_only);
        if let Some(metadata) = &self.schema_metadata {
            orchestrator.set_shared_schema_metadata(metadata.clone());
        }
        orchestrator
    }
}

/// Fresh random session identifier.
pub fn generate_session_id() -> String {
    format!("sess_{}", uuid::Uuid::new_v4().simple())
}
