//! Shared fakes and catalog helpers for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use modelmux::{AdapterError, Mux, MuxConfig, ProviderAdapter, ProviderRequest};
use modelmux_breaker::{BreakerConfig, BreakerSet};
use modelmux_capacity::{CapacityConfig, CapacityRegistry, CooldownPolicy};
use modelmux_core::{
    CapabilitySet, Endpoint, EndpointId, ProviderResponse, TokenUsage, Workload,
};
use modelmux_credentials::CredentialSources;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ok_response(content: &str) -> ProviderResponse {
    ProviderResponse::text(content, TokenUsage::new(100, 20))
}

/// Adapter that replays a scripted list of outcomes, then answers `Ok`
/// forever. Records every request it receives.
pub struct ScriptedAdapter {
    script: Mutex<VecDeque<Result<ProviderResponse, AdapterError>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedAdapter {
    pub fn always_ok() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(outcomes: Vec<Result<ProviderResponse, AdapterError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(ok_response(&format!("reply from {}", request.model))),
        }
    }
}

/// Adapter that never answers; only a deadline gets rid of it.
pub struct HangingAdapter;

#[async_trait]
impl ProviderAdapter for HangingAdapter {
    async fn call(&self, _request: ProviderRequest) -> Result<ProviderResponse, AdapterError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(AdapterError::transport("unreachable"))
    }
}

pub fn endpoint(provider: &str, model: &str, tier: u8) -> Endpoint {
    Endpoint {
        id: EndpointId::new(provider, model),
        tier,
        cost_per_input_token: 1e-6,
        cost_per_output_token: 5e-6,
        max_input_tokens: 100_000,
        max_output_tokens: 8_192,
        tokens_per_minute: 1_000_000,
        requests_per_day: 100_000,
        capabilities: CapabilitySet::all(),
    }
}

/// Environment variable name used as the credential source for a provider.
pub fn credential_var(provider: &str) -> String {
    format!(
        "MODELMUX_TEST_{}_KEY",
        provider.to_uppercase().replace('-', "_")
    )
}

pub fn enable_credentials(provider: &str) {
    std::env::set_var(credential_var(provider), "sk-test");
}

pub fn disable_credentials(provider: &str) {
    std::env::remove_var(credential_var(provider));
}

pub fn credential_sources(providers: &[&str]) -> CredentialSources {
    let mut builder = CredentialSources::builder();
    for provider in providers {
        builder = builder.env_alias(*provider, credential_var(provider));
    }
    builder.build()
}

/// A config with one `Coding` chain over the given endpoints.
pub fn coding_config(endpoints: Vec<Endpoint>) -> MuxConfig {
    let chain = endpoints.iter().map(|e| e.id.clone()).collect();
    MuxConfig {
        endpoints,
        chains: std::collections::HashMap::from([(Workload::Coding, chain)]),
        ..Default::default()
    }
}

/// Capacity registry with millisecond cooldowns so tests never wait.
pub fn fast_capacity() -> CapacityRegistry {
    CapacityConfig::builder()
        .cooldown_policy(CooldownPolicy::Exponential {
            base: Duration::from_millis(50),
            cap: Duration::from_millis(400),
        })
        .build()
}

/// Breaker set with a short recovery window.
pub fn fast_breakers() -> BreakerSet {
    BreakerConfig::builder()
        .failure_threshold(5)
        .recovery_timeout(Duration::from_millis(50))
        .half_open_successes(3)
        .half_open_max_calls(3)
        .build()
}

/// Builds a mux over `config` with credentials for `providers` and the
/// default registries.
pub fn mux_with(
    config: MuxConfig,
    providers: &[&str],
    sink: Arc<modelmux::MemorySink>,
) -> Mux {
    for provider in providers {
        enable_credentials(provider);
    }
    Mux::builder(config)
        .credentials(credential_sources(providers))
        .capacity(fast_capacity())
        .breakers(fast_breakers())
        .observation_sink(sink)
        .build()
        .expect("valid test config")
}
