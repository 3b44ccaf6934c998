use crate::events::CredentialEvent;
use hashbrown::HashMap;
use modelmux_core::{EventListener, EventListeners, ProviderId};
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Shape of a token file under the plugin directory.
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_at_epoch_s: Option<u64>,
}

/// Where credentials may be found, per provider.
#[derive(Debug, Clone, Default)]
pub struct CredentialSources {
    env_aliases: HashMap<ProviderId, Vec<String>>,
    token_dir: Option<PathBuf>,
}

impl CredentialSources {
    pub fn builder() -> CredentialSourcesBuilder {
        CredentialSourcesBuilder::default()
    }
}

/// Builder for [`CredentialSources`].
#[derive(Debug, Default)]
pub struct CredentialSourcesBuilder {
    env_aliases: HashMap<ProviderId, Vec<String>>,
    token_dir: Option<PathBuf>,
}

impl CredentialSourcesBuilder {
    /// Accept an environment variable name as a secret source for
    /// `provider`. Multiple aliases per provider are tolerated.
    pub fn env_alias(mut self, provider: impl Into<ProviderId>, var: impl Into<String>) -> Self {
        self.env_aliases
            .entry(provider.into())
            .or_default()
            .push(var.into());
        self
    }

    /// Directory holding per-provider token files named `<provider>.json`.
    pub fn token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> CredentialSources {
        CredentialSources {
            env_aliases: self.env_aliases,
            token_dir: self.token_dir,
        }
    }
}

/// Answers "is provider P usable now?", with in-memory caching and
/// invalidation callbacks.
pub struct CredentialOracle {
    sources: CredentialSources,
    cache: RwLock<HashMap<ProviderId, bool>>,
    listeners: RwLock<EventListeners<CredentialEvent>>,
}

impl CredentialOracle {
    pub fn new(sources: CredentialSources) -> Self {
        Self {
            sources,
            cache: RwLock::new(HashMap::new()),
            listeners: RwLock::new(EventListeners::new()),
        }
    }

    /// Subscribe to invalidation events.
    pub fn subscribe<L>(&self, listener: L)
    where
        L: EventListener<CredentialEvent> + 'static,
    {
        self.listeners.write().add(listener);
    }

    /// True if a usable credential for `provider` exists. Cached until the
    /// next [`invalidate`](Self::invalidate).
    pub fn is_usable(&self, provider: &ProviderId) -> bool {
        if let Some(cached) = self.cache.read().get(provider) {
            return *cached;
        }
        let usable = self.probe(provider);
        self.cache.write().insert(provider.clone(), usable);
        usable
    }

    /// Drops the cached answer for `provider` and notifies subscribers.
    /// Idempotent.
    pub fn invalidate(&self, provider: &ProviderId) {
        self.cache.write().remove(provider);
        self.listeners.read().emit(&CredentialEvent::Invalidated {
            provider: provider.clone(),
        });
    }

    /// Drops every cached answer.
    pub fn invalidate_all(&self) {
        self.cache.write().clear();
        self.listeners.read().emit(&CredentialEvent::InvalidatedAll);
    }

    fn probe(&self, provider: &ProviderId) -> bool {
        if let Some(aliases) = self.sources.env_aliases.get(provider) {
            for var in aliases {
                if std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false) {
                    return true;
                }
            }
        }

        if let Some(dir) = &self.sources.token_dir {
            if self.probe_token_file(dir, provider) {
                return true;
            }
        }

        false
    }

    fn probe_token_file(&self, dir: &Path, provider: &ProviderId) -> bool {
        let path = dir.join(format!("{provider}.json"));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(provider = %provider, path = %path.display(), error = %_err, "token file unreadable");
                return false;
            }
        };

        let token: TokenFile = match serde_json::from_str(&raw) {
            Ok(token) => token,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(provider = %provider, path = %path.display(), error = %_err, "token file unparseable");
                return false;
            }
        };

        if token.access_token.is_empty() {
            return false;
        }

        match token.expires_at_epoch_s {
            Some(expiry) => expiry > now_epoch_s(),
            None => true,
        }
    }
}

fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
