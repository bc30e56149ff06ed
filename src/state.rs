//! Application state: the in-memory session store, the challenge bank and
//! the loaded configuration.
//!
//! Sessions are isolated; each one owns its page, score and RNG. The map
//! lock is held only long enough to find a session. Every session sits
//! behind its own mutex, so a slow evaluation in one session never stalls
//! another.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use rand::{rngs::StdRng, SeedableRng};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::bank::ChallengeBank;
use crate::config::{load_trainer_config_from_env, Messages, SceneCfg, SessionsCfg, TrainerConfig};
use crate::domain::Difficulty;
use crate::session::Session;

pub type SharedSession = Arc<Mutex<Session>>;

pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
    pub bank: ChallengeBank,
    pub messages: Messages,
    pub scene: SceneCfg,
    pub limits: SessionsCfg,
    created: AtomicU64,
}

impl AppState {
    /// Build state from env: load config (or defaults) and the challenge bank.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_trainer_config_from_env().unwrap_or_default();
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: TrainerConfig) -> Self {
        let bank = ChallengeBank::new(&cfg.hints);
        info!(
            target: "locator_trainer",
            distractors = cfg.scene.distractors,
            seeded = cfg.scene.seed.is_some(),
            hint_overrides = cfg.hints.len(),
            idle_timeout_secs = cfg.sessions.idle_timeout_secs,
            "Trainer state ready"
        );
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            bank,
            messages: cfg.messages,
            scene: cfg.scene,
            limits: cfg.sessions,
            created: AtomicU64::new(0),
        }
    }

    /// A configured seed makes the n-th session replay the same scenes on every run.
    fn session_rng(&self) -> StdRng {
        let n = self.created.fetch_add(1, Ordering::Relaxed);
        match self.scene.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(n)),
            None => StdRng::from_entropy(),
        }
    }

    /// Create a session, play its first round and store it. `view` sees the
    /// session before it is inserted.
    #[instrument(level = "info", skip(self, view), fields(difficulty = difficulty.as_str()))]
    pub async fn create_session<T>(&self, difficulty: Difficulty, view: impl FnOnce(&Session) -> T) -> T {
        let id = Uuid::new_v4().to_string();
        let session = Session::start(id.clone(), difficulty, &self.bank, self.scene.distractors, self.session_rng());
        let out = view(&session);
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        info!(target: "session", %id, live = sessions.len(), "Session created");
        out
    }

    /// Clones the session handle out of the map; the map lock is released on return.
    async fn lookup(&self, id: &str) -> Option<SharedSession> {
        let found = self.sessions.read().await.get(id).cloned();
        if found.is_none() {
            debug!(target: "session", %id, "Unknown session");
        }
        found
    }

    /// Run `f` against the session under its own lock. `None` when the id is unknown.
    #[instrument(level = "debug", skip(self, f), fields(%id))]
    pub async fn with_session<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        let shared = self.lookup(id).await?;
        let mut session = shared.lock().await;
        session.touch();
        Some(f(&mut *session))
    }

    /// Read-only access to a session.
    #[instrument(level = "debug", skip(self, f), fields(%id))]
    pub async fn read_session<T>(&self, id: &str, f: impl FnOnce(&Session) -> T) -> Option<T> {
        let shared = self.lookup(id).await?;
        let mut session = shared.lock().await;
        session.touch();
        Some(f(&*session))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops sessions untouched for at least `max_idle`. Sessions locked by
    /// an operation in flight are in use and stay.
    #[instrument(level = "debug", skip(self))]
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, shared| match shared.try_lock() {
            Ok(session) => session.idle_for() < max_idle,
            Err(_) => true,
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(target: "session", pruned, live = sessions.len(), "Idle sessions dropped");
        }
        pruned
    }

    #[instrument(level = "info", skip(self), fields(%id))]
    pub async fn remove_session(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(target: "session", %id, "Session closed");
        }
        removed
    }
}

/// Background task that drops idle sessions every `sweep_interval_secs`.
/// `None` when the idle timeout is disabled (0).
pub fn spawn_idle_sweeper(state: Arc<AppState>) -> Option<JoinHandle<()>> {
    let limits = state.limits.clone();
    if limits.idle_timeout_secs == 0 {
        return None;
    }
    let max_idle = Duration::from_secs(limits.idle_timeout_secs);
    let every = Duration::from_secs(limits.sweep_interval_secs.max(1));
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            state.prune_idle(max_idle).await;
        }
    }))
}

impl Default for AppState {
    fn default() -> Self {
        Self::from_config(TrainerConfig::default())
    }
}
