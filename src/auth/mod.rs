// API key authentication module

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Identity resolved from a configured API key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Display name from the key binding
    pub name: String,
    /// The key the caller authenticated with
    pub key: String,
}

/// Result of authenticating a presented credential
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// No keys are configured; authentication is disabled
    Open,
    /// The presented key matched a configured binding
    Authorized(Arc<Caller>),
    /// Keys are configured and the credential is missing or unknown
    Unauthorized,
}

/// Resolves presented API keys against the configured bindings.
///
/// Fail-closed: once any key is configured, a request without a matching
/// key is always `Unauthorized` and never falls through to `Open`.
/// Callers are created lazily on the first successful use of a key; the
/// registry is shared across requests, so concurrent first use of the same
/// key resolves to a single `Caller` instance.
pub struct KeyAuthenticator {
    /// key → display name
    bindings: HashMap<String, String>,
    /// key → resolved caller, populated on first successful match
    callers: RwLock<HashMap<String, Arc<Caller>>>,
}

impl KeyAuthenticator {
    /// Build an authenticator from a comma-separated `key:name` binding
    /// list. A bare `key` entry binds to a name derived from the key
    /// prefix. `None` or an empty list disables authentication.
    pub fn from_bindings(raw: Option<&str>) -> Self {
        Self {
            bindings: parse_bindings(raw),
            callers: RwLock::new(HashMap::new()),
        }
    }

    /// Whether any key is configured
    pub fn enabled(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Resolve a presented credential to an outcome
    pub fn authenticate(&self, presented: Option<&str>) -> AuthOutcome {
        if self.bindings.is_empty() {
            return AuthOutcome::Open;
        }

        let presented = match presented.map(str::trim).filter(|key| !key.is_empty()) {
            Some(key) => key,
            None => return AuthOutcome::Unauthorized,
        };

        match self.bindings.get(presented) {
            Some(name) => AuthOutcome::Authorized(self.caller_for(presented, name)),
            None => AuthOutcome::Unauthorized,
        }
    }

    /// Number of callers created so far (for tests and monitoring)
    pub fn known_caller_count(&self) -> usize {
        self.callers.read().len()
    }

    fn caller_for(&self, key: &str, name: &str) -> Arc<Caller> {
        if let Some(caller) = self.callers.read().get(key) {
            return Arc::clone(caller);
        }

        // entry() under the write lock keeps a concurrent first use of the
        // same key from creating two Caller instances
        let mut callers = self.callers.write();
        let caller = callers.entry(key.to_string()).or_insert_with(|| {
            tracing::info!(caller = %name, "Registered caller on first key use");
            Arc::new(Caller {
                name: name.to_string(),
                key: key.to_string(),
            })
        });
        Arc::clone(caller)
    }
}

fn parse_bindings(raw: Option<&str>) -> HashMap<String, String> {
    let mut bindings = HashMap::new();
    let Some(raw) = raw else {
        return bindings;
    };

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once(':') {
            Some((key, name)) => {
                let key = key.trim();
                let name = name.trim();
                if !key.is_empty() && !name.is_empty() {
                    bindings.insert(key.to_string(), name.to_string());
                } else if !key.is_empty() {
                    bindings.insert(key.to_string(), default_caller_name(key));
                }
            }
            None => {
                bindings.insert(entry.to_string(), default_caller_name(entry));
            }
        }
    }
    bindings
}

/// Name assigned to a key configured without an explicit identity
fn default_caller_name(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("key-{}", prefix)
}
