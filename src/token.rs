use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Host-provided token storage
///
/// The library never decides the storage medium; it only loads the token once
/// and saves every token the TV issues.
pub trait TokenPersistence: Send + Sync {
    fn load_token(&self) -> Option<String>;
    fn save_token(&self, token: &str);

    /// Forget the stored token; the next connection pairs from scratch
    fn clear_token(&self) {}
}

/// In-memory persistence, useful for tests and short-lived tools
#[derive(Debug, Default)]
pub struct MemoryTokenPersistence {
    token: Mutex<Option<String>>,
}

impl MemoryTokenPersistence {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }
}

impl TokenPersistence for MemoryTokenPersistence {
    fn load_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn save_token(&self, token: &str) {
        *self.token.lock() = Some(token.to_string());
    }

    fn clear_token(&self) {
        *self.token.lock() = None;
    }
}

/// Current authentication token shared by the remote and control channels
pub struct TokenStore {
    current: RwLock<Option<String>>,
    persistence: Arc<dyn TokenPersistence>,
}

impl TokenStore {
    /// Create a store seeded from the host's persisted token
    pub fn new(persistence: Arc<dyn TokenPersistence>) -> Self {
        let current = persistence.load_token().filter(|t| !t.is_empty());
        Self {
            current: RwLock::new(current),
            persistence,
        }
    }

    /// Token to present on the next connection attempt
    pub fn get(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Record a token issued by the TV
    ///
    /// Returns `true` when the value changed and was handed to persistence.
    pub fn update(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        {
            let mut current = self.current.write();
            if current.as_deref() == Some(token) {
                return false;
            }
            *current = Some(token.to_string());
        }
        tracing::info!("Received new authentication token");
        self.persistence.save_token(token);
        true
    }

    /// Replace the token from outside, e.g. after the TV rejected the old one
    ///
    /// `None` (or an empty token) clears it so the next connection shows the
    /// pairing prompt again.
    pub fn replace(&self, token: Option<&str>) {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => {
                *self.current.write() = Some(token.to_string());
                self.persistence.save_token(token);
            }
            None => {
                *self.current.write() = None;
                self.persistence.clear_token();
            }
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_token", &self.current.read().is_some())
            .finish()
    }
}
