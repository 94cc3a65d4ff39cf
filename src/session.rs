use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::services::database::DatabaseConfig;
use crate::services::finalize::SiteConfig;
use crate::services::security;

/// Name of the cookie carrying the installer session id.
pub const SESSION_COOKIE: &str = "academy_install";

/// Form data accumulated across wizard steps. Each step owns one slot; a
/// revisited step replaces its slot wholesale (last-submitted value wins).
#[derive(Debug, Clone, Default)]
pub struct ConfigDraft {
    pub database: Option<DatabaseConfig>,
    pub site: Option<SiteConfig>,
}

impl ConfigDraft {
    pub fn put_database(&mut self, config: DatabaseConfig) {
        self.database = Some(config);
    }

    pub fn put_site(&mut self, config: SiteConfig) {
        self.site = Some(config);
    }
}

/// Ephemeral per-browser wizard state. Lives only in memory; nothing here is
/// persisted to durable storage before finalization.
#[derive(Debug, Clone)]
pub struct InstallSession {
    /// Highest step the session has legitimately reached (1..=5). Requests
    /// for later steps are clamped back to this.
    pub current_step: u8,
    pub config: ConfigDraft,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub requirements_passed: bool,
    pub db_connection_tested: bool,
}

impl Default for InstallSession {
    fn default() -> Self {
        Self {
            current_step: 1,
            config: ConfigDraft::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            requirements_passed: false,
            db_connection_tested: false,
        }
    }
}

impl InstallSession {
    /// Clamp a requested step to what this session may display.
    pub fn resolve_step(&self, requested: Option<u8>) -> u8 {
        let step = requested.unwrap_or(self.current_step);
        step.clamp(1, 5).min(self.current_step)
    }

    /// Record a completed step and advance by one.
    pub fn advance_from(&mut self, step: u8) {
        if step >= self.current_step {
            self.current_step = (step + 1).min(5);
        }
    }

    /// Errors and warnings are display-once; callers drain them per render.
    pub fn take_messages(&mut self) -> (Vec<String>, Vec<String>) {
        (
            std::mem::take(&mut self.errors),
            std::mem::take(&mut self.warnings),
        )
    }
}

/// In-memory, cookie-keyed store for installer sessions.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, InstallSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh session and return its id.
    pub async fn create(&self) -> String {
        let id = security::generate_random_string(32);
        self.inner
            .write()
            .await
            .insert(id.clone(), InstallSession::default());
        id
    }

    pub async fn get(&self, id: &str) -> Option<InstallSession> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn save(&self, id: &str, session: InstallSession) {
        self.inner.write().await.insert(id.to_string(), session);
    }

    /// Drop a session once the installation has completed.
    pub async fn remove(&self, id: &str) {
        self.inner.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_step_clamps_forward_navigation() {
        let session = InstallSession::default();
        // Fresh session may only show step 1, even if the URL asks for 4.
        assert_eq!(session.resolve_step(Some(4)), 1);
        assert_eq!(session.resolve_step(None), 1);
        assert_eq!(session.resolve_step(Some(0)), 1);
    }

    #[test]
    fn test_resolve_step_allows_backward_navigation() {
        let mut session = InstallSession::default();
        session.current_step = 3;
        assert_eq!(session.resolve_step(Some(1)), 1);
        assert_eq!(session.resolve_step(Some(2)), 2);
        assert_eq!(session.resolve_step(Some(5)), 3);
    }

    #[test]
    fn test_advance_caps_at_finish_step() {
        let mut session = InstallSession::default();
        session.current_step = 5;
        session.advance_from(5);
        assert_eq!(session.current_step, 5);
    }

    #[test]
    fn test_advance_ignores_stale_resubmission() {
        let mut session = InstallSession::default();
        session.current_step = 3;
        // Resubmitting step 1 must not rewind progress.
        session.advance_from(1);
        assert_eq!(session.current_step, 3);
    }

    #[test]
    fn test_take_messages_clears_after_render() {
        let mut session = InstallSession::default();
        session.errors.push("bad host".to_string());
        session.warnings.push("missing CREATE".to_string());

        let (errors, warnings) = session.take_messages();
        assert_eq!(errors, vec!["bad host"]);
        assert_eq!(warnings, vec!["missing CREATE"]);
        assert!(session.errors.is_empty());
        assert!(session.warnings.is_empty());
    }

    #[test]
    fn test_draft_last_submitted_wins() {
        let mut draft = ConfigDraft::default();
        let mut first = DatabaseConfig::default();
        first.name = "academy".to_string();
        let mut second = DatabaseConfig::default();
        second.name = "academy_prod".to_string();

        draft.put_database(first);
        draft.put_database(second);
        assert_eq!(draft.database.unwrap().name, "academy_prod");
    }

    #[tokio::test]
    async fn test_store_roundtrip() {
        let store = SessionStore::new();
        let id = store.create().await;

        let mut session = store.get(&id).await.unwrap();
        session.requirements_passed = true;
        session.advance_from(1);
        store.save(&id, session).await;

        let reloaded = store.get(&id).await.unwrap();
        assert!(reloaded.requirements_passed);
        assert_eq!(reloaded.current_step, 2);

        store.remove(&id).await;
        assert!(store.get(&id).await.is_none());
    }
}
