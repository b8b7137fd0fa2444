use md_translator_core::{Workbench, WorkbenchConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Session data for an open document
pub struct Session {
    /// The document workbench; cheap to clone out of the session lock so
    /// handlers can await on it without holding the lock
    pub workbench: Arc<Workbench>,
    pub original_filename: String,
    pub created_at: std::time::Instant,
    /// Active batch run, if any
    pub batch_job: Option<Arc<BatchJob>>,
}

/// Progress tracking for batch runs
#[derive(Default)]
pub struct BatchJob {
    pub completed: AtomicUsize,
    pub planned: AtomicUsize,
    pub current_unit: AtomicUsize,
    pub done: AtomicBool,
    pub stopped: AtomicBool,
    pub error: RwLock<Option<String>>,
}

impl BatchJob {
    pub fn new(planned: usize) -> Self {
        let job = Self::default();
        job.planned.store(planned, Ordering::SeqCst);
        job
    }

    pub fn record_progress(&self, unit_id: usize, completed: usize) {
        self.current_unit.store(unit_id, Ordering::SeqCst);
        self.completed.store(completed, Ordering::SeqCst);
    }

    pub fn mark_done(&self, completed: usize, stopped: bool) {
        self.completed.store(completed, Ordering::SeqCst);
        self.stopped.store(stopped, Ordering::SeqCst);
        self.done.store(true, Ordering::SeqCst);
    }

    pub async fn set_error(&self, error: String) {
        *self.error.write().await = Some(error);
    }

    pub async fn get_error(&self) -> Option<String> {
        self.error.read().await.clone()
    }
}

/// Global application state
pub struct AppState {
    /// Active sessions indexed by UUID
    sessions: RwLock<HashMap<Uuid, Session>>,
    /// Base workbench configuration applied to every new session
    pub config: WorkbenchConfig,
}

impl AppState {
    pub fn new(config: WorkbenchConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a new session around a freshly parsed document.
    ///
    /// Returns the session ID as a string (for URL embedding).
    pub async fn create_session(&self, workbench: Workbench, filename: String) -> String {
        let id = Uuid::new_v4();

        let session = Session {
            workbench: Arc::new(workbench),
            original_filename: filename,
            created_at: std::time::Instant::now(),
            batch_job: None,
        };

        self.sessions.write().await.insert(id, session);
        id.to_string()
    }

    /// Get a session by ID string.
    ///
    /// Returns `None` if the ID is not a valid UUID or session doesn't exist.
    pub async fn get_session(&self, id: &str) -> Option<SessionRef<'_>> {
        let uuid = Uuid::parse_str(id).ok()?;
        let sessions = self.sessions.read().await;
        if sessions.contains_key(&uuid) {
            Some(SessionRef {
                id: uuid,
                state: self,
            })
        } else {
            None
        }
    }

    /// Cleanup old sessions (older than 1 hour).
    ///
    /// In-flight jobs of evicted sessions are cancelled so they stop
    /// spending upstream tokens on documents nobody can see anymore.
    pub async fn cleanup_old_sessions(&self) {
        let mut sessions = self.sessions.write().await;
        let now = std::time::Instant::now();
        let max_age = std::time::Duration::from_secs(3600);

        sessions.retain(|_, session| {
            let keep = now.duration_since(session.created_at) < max_age;
            if !keep {
                session.workbench.request_stop();
                session.workbench.cancel_all();
            }
            keep
        });
    }
}

/// A borrowed reference to a session that provides safe access patterns.
///
/// Holding a lock guard (like `RwLockReadGuard`) across an `.await` point
/// causes deadlocks and the guard isn't `Send`. This type stores only the
/// session ID and acquires the lock inside synchronous closures, so the
/// lock is always released before any `.await`. Handlers clone the
/// `Arc<Workbench>` out and await on that.
pub struct SessionRef<'a> {
    id: Uuid,
    state: &'a AppState,
}

impl SessionRef<'_> {
    /// Access session data immutably within a closure.
    ///
    /// The closure runs synchronously while holding a read lock.
    /// The lock is released before this method returns.
    pub async fn with_session<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&Session) -> R,
    {
        let sessions = self.state.sessions.read().await;
        sessions.get(&self.id).map(f)
    }

    /// Access session data mutably within a closure.
    ///
    /// The closure runs synchronously while holding a write lock.
    /// The lock is released before this method returns.
    pub async fn with_session_mut<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.state.sessions.write().await;
        sessions.get_mut(&self.id).map(f)
    }

    /// Clone the session's workbench handle.
    pub async fn workbench(&self) -> Option<Arc<Workbench>> {
        self.with_session(|s| Arc::clone(&s.workbench)).await
    }
}
