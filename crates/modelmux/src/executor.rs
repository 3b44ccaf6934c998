//! The failover executor: drives one request down the ranked endpoint
//! list, observing and reporting every attempt.
//!
//! All failover state lives in this loop's locals. Once a response is
//! returned to the caller the loop is finished - no endpoint state changes
//! happen on behalf of that request afterwards.

use crate::adapter::{AdapterError, ProviderRequest};
use crate::decision::RoutingDecision;
use crate::error::RouteError;
use crate::mux::Inner;
use crate::observe::{AttemptOutcome, Observation};
use modelmux_breaker::{AdmitDecision, Outcome};
use modelmux_capacity::RateLimitHeaders;
use modelmux_core::{
    CapabilitySet, CapacityStatus, EndpointId, FailureClass, ProviderResponse, TokenUsage, Turn,
};
use modelmux_limiter::CheckOutcome;
use std::time::Duration;

use crate::catalog::Catalog;

/// Same-endpoint attempts allowed for format violations before the
/// endpoint is given up on.
const FORMAT_ATTEMPTS: u32 = 2;

pub(crate) struct ExecuteParams<'a> {
    pub history: &'a [Turn],
    pub capabilities: CapabilitySet,
    pub deadline: tokio::time::Instant,
    pub estimated_tokens: u32,
}

pub(crate) async fn execute(
    inner: &Inner,
    catalog: &Catalog,
    decision: &RoutingDecision,
    params: &ExecuteParams<'_>,
) -> Result<(EndpointId, ProviderResponse), RouteError> {
    let mut last_error: Option<FailureClass> = None;
    let ordered = std::iter::once(&decision.endpoint).chain(decision.remaining_chain.iter());

    for id in ordered {
        if tokio::time::Instant::now() >= params.deadline {
            return Err(RouteError::Cancelled);
        }
        let Some(endpoint) = catalog.endpoint(id) else {
            continue;
        };

        // Gates re-checked per attempt: earlier failures in this very loop
        // may have cooled the provider down.
        if inner.capacity.provider_cooldown_until(&id.provider).is_some() {
            continue;
        }
        if matches!(
            inner.capacity.status(id),
            CapacityStatus::Cooldown | CapacityStatus::Exhausted
        ) {
            continue;
        }
        let adapter = match inner.adapters.read().get(&id.provider) {
            Some(adapter) => adapter.clone(),
            None => continue,
        };
        if !matches!(
            inner.limiter.check(&id.provider, params.estimated_tokens),
            CheckOutcome::Allow
        ) {
            continue;
        }
        if inner.breakers.admit(id) == AdmitDecision::Reject {
            continue;
        }

        let request = ProviderRequest {
            model: id.model.clone(),
            turns: params.history.to_vec(),
            capabilities: params.capabilities,
            max_output_tokens: endpoint.max_output_tokens,
        };

        let mut format_attempts = 0u32;
        loop {
            let started = std::time::Instant::now();
            let attempt = tokio::time::timeout_at(params.deadline, adapter.call(request.clone())).await;
            let latency = started.elapsed();

            match attempt {
                Err(_elapsed) => {
                    // Surrendered to the caller's deadline: reachability
                    // evidence only once the timeout run grows long enough.
                    inner.breakers.record(id, Outcome::Timeout);
                    observe_attempt(
                        inner,
                        decision,
                        id,
                        AttemptOutcome::Failure(FailureClass::Transport),
                        latency,
                        TokenUsage::default(),
                        0.0,
                        Some("deadline elapsed".to_string()),
                    );
                    return Err(RouteError::Cancelled);
                }
                Ok(Ok(response)) => {
                    let usage = response.usage;
                    let headers = RateLimitHeaders::from_pairs(
                        response.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                    );
                    inner.capacity.observe_response(
                        id,
                        &headers,
                        usage.input_tokens,
                        usage.output_tokens,
                    );
                    inner.breakers.record(id, Outcome::Success);
                    inner
                        .limiter
                        .record(&id.provider, usage.input_tokens, usage.output_tokens);
                    let cost = endpoint.cost_usd(usage.input_tokens, usage.output_tokens);
                    inner.ledger.record(&id.provider, cost);
                    observe_attempt(
                        inner,
                        decision,
                        id,
                        AttemptOutcome::Success,
                        latency,
                        usage,
                        cost,
                        None,
                    );
                    return Ok((id.clone(), response));
                }
                Ok(Err(error)) => {
                    let advanced = handle_failure(inner, decision, id, &error, latency, &mut format_attempts);
                    last_error = Some(effective_class(&error, format_attempts));
                    if advanced {
                        break;
                    }
                    // Format violation within budget: retry this endpoint.
                }
            }
        }
    }

    match last_error {
        Some(last_error) => Err(RouteError::Exhausted { last_error }),
        // Nothing was attempted: every endpoint was gated away after the
        // decision was made.
        None => Err(RouteError::NoRoute {
            retry_after: inner
                .capacity
                .earliest_relief()
                .map(|at| at.saturating_duration_since(std::time::Instant::now())),
        }),
    }
}

/// Applies the per-class recovery policy. Returns true when the executor
/// should advance to the next endpoint.
fn handle_failure(
    inner: &Inner,
    decision: &RoutingDecision,
    id: &EndpointId,
    error: &AdapterError,
    latency: Duration,
    format_attempts: &mut u32,
) -> bool {
    let class = error.class;
    match class {
        FailureClass::RateLimit => {
            inner.capacity.observe_rate_limit(id);
            inner.breakers.release(id);
            observe_attempt(
                inner,
                decision,
                id,
                AttemptOutcome::Failure(class),
                latency,
                TokenUsage::default(),
                0.0,
                Some(error.message.clone()),
            );
            true
        }
        FailureClass::Transport | FailureClass::Fatal => {
            inner.breakers.record(id, Outcome::Failure);
            observe_attempt(
                inner,
                decision,
                id,
                AttemptOutcome::Failure(class),
                latency,
                TokenUsage::default(),
                0.0,
                Some(error.message.clone()),
            );
            true
        }
        FailureClass::Format => {
            *format_attempts += 1;
            let exhausted = *format_attempts >= FORMAT_ATTEMPTS;
            if exhausted {
                inner.breakers.record(id, Outcome::Failure);
            }
            observe_attempt(
                inner,
                decision,
                id,
                AttemptOutcome::Failure(class),
                latency,
                TokenUsage::default(),
                0.0,
                Some(error.message.clone()),
            );
            exhausted
        }
        FailureClass::Auth => {
            inner.oracle.invalidate(&id.provider);
            inner.breakers.release(id);
            observe_attempt(
                inner,
                decision,
                id,
                AttemptOutcome::Failure(class),
                latency,
                TokenUsage::default(),
                0.0,
                Some(error.message.clone()),
            );
            true
        }
    }
}

/// The classification carried into `Exhausted`: a format violation past
/// its retry budget counts as fatal.
fn effective_class(error: &AdapterError, format_attempts: u32) -> FailureClass {
    if error.class == FailureClass::Format && format_attempts >= FORMAT_ATTEMPTS {
        FailureClass::Fatal
    } else {
        error.class
    }
}

#[allow(clippy::too_many_arguments)]
fn observe_attempt(
    inner: &Inner,
    decision: &RoutingDecision,
    id: &EndpointId,
    outcome: AttemptOutcome,
    latency: Duration,
    usage: TokenUsage,
    cost_usd: f64,
    error: Option<String>,
) {
    let observation = Observation {
        decision_id: decision.id.to_string(),
        endpoint: id.clone(),
        workload: decision.workload,
        outcome,
        latency_ms: latency.as_millis() as u64,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cost_usd,
        capacity_status: inner.capacity.status(id),
        breaker_state: inner.breakers.state(id),
        error,
    };

    #[cfg(feature = "tracing")]
    match &observation.outcome {
        AttemptOutcome::Success => tracing::info!(
            decision = %observation.decision_id,
            endpoint = %observation.endpoint,
            latency_ms = observation.latency_ms,
            input_tokens = observation.input_tokens,
            output_tokens = observation.output_tokens,
            "attempt succeeded"
        ),
        AttemptOutcome::Failure(class) => tracing::warn!(
            decision = %observation.decision_id,
            endpoint = %observation.endpoint,
            class = class.as_str(),
            latency_ms = observation.latency_ms,
            "attempt failed"
        ),
    }

    #[cfg(feature = "metrics")]
    metrics::counter!(
        "modelmux_executor_attempts_total",
        "endpoint" => observation.endpoint.to_string(),
        "outcome" => match observation.outcome {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failure(class) => class.as_str(),
        }
    )
    .increment(1);

    for sink in &inner.sinks {
        sink.record(&observation);
    }
}
