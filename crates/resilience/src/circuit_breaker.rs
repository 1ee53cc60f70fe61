//! Circuit breaker for upstream providers
//!
//! State per service lives at `{prefix}{service}` as JSON. Phase transitions
//! are pure functions on [`BreakerState`]; [`CircuitBreaker`] loads the
//! state, applies a transition and writes it back when it changed.
//!
//! ```text
//!   Closed --(failures >= threshold)--> Open
//!   Open --(check after timeout)--> HalfOpen
//!   HalfOpen --(success)--> Closed (failures = 0)
//!   HalfOpen --(failure reaching threshold)--> Open
//!   HalfOpen --(trial calls used up, check after timeout)--> HalfOpen (new round)
//! ```
//!
//! A trial call whose outcome is never recorded (cancelled request, client
//! gone) only holds its slot until the timeout has passed since the last one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use parish_chat_config::BreakerConfig;
use parish_chat_core::{Clock, FailureReason, KeyValueStore, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Phase {
    Closed,
    Open,
    /// `probes` trial calls admitted in the current round, the last at `last_probe_at_ms`
    HalfOpen {
        probes: u32,
        #[serde(default)]
        last_probe_at_ms: i64,
    },
}

/// Phase as reported to callers; `Unknown` when the store could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseKind {
    Closed,
    Open,
    HalfOpen,
    Unknown,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Closed => "closed",
            PhaseKind::Open => "open",
            PhaseKind::HalfOpen => "half-open",
            PhaseKind::Unknown => "unknown",
        }
    }
}

impl From<Phase> for PhaseKind {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Closed => PhaseKind::Closed,
            Phase::Open => PhaseKind::Open,
            Phase::HalfOpen { .. } => PhaseKind::HalfOpen,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerState {
    pub failures: u32,
    pub last_failure_at_ms: i64,
    #[serde(flatten)]
    pub phase: Phase,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            failures: 0,
            last_failure_at_ms: 0,
            phase: Phase::Closed,
        }
    }
}

impl BreakerState {
    /// Admission check. Returns the next state and whether the call may proceed.
    pub fn on_check(self, now_ms: i64, timeout: Duration, max_probes: u32) -> (Self, bool) {
        let timeout_ms = timeout.as_millis() as i64;
        let probe = |probes| {
            (
                Self {
                    phase: Phase::HalfOpen {
                        probes,
                        last_probe_at_ms: now_ms,
                    },
                    ..self
                },
                true,
            )
        };

        match self.phase {
            Phase::Closed => (self, true),
            Phase::Open if now_ms - self.last_failure_at_ms > timeout_ms => probe(1),
            Phase::Open => (self, false),
            Phase::HalfOpen { probes, .. } if probes < max_probes => probe(probes + 1),
            Phase::HalfOpen { last_probe_at_ms, .. } if now_ms - last_probe_at_ms > timeout_ms => probe(1),
            Phase::HalfOpen { .. } => (self, false),
        }
    }

    pub fn on_success(self) -> Self {
        match self.phase {
            Phase::HalfOpen { .. } => Self::default(),
            Phase::Closed => Self {
                failures: self.failures.saturating_sub(1),
                ..self
            },
            // a call admitted before the breaker opened; the timeout still applies
            Phase::Open => self,
        }
    }

    pub fn on_failure(self, now_ms: i64, threshold: u32) -> Self {
        let failures = self.failures.saturating_add(1);
        let phase = if failures >= threshold { Phase::Open } else { self.phase };
        Self {
            failures,
            last_failure_at_ms: now_ms,
            phase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerDecision {
    pub allowed: bool,
    pub phase: PhaseKind,
}

impl BreakerDecision {
    fn fail_open() -> Self {
        Self {
            allowed: true,
            phase: PhaseKind::Unknown,
        }
    }
}

pub struct CircuitBreaker {
    store: Option<Arc<dyn KeyValueStore>>,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, config: BreakerConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Name of the provider service guarded by default
    pub fn default_service(&self) -> &str {
        &self.config.service_name
    }

    fn key(&self, service: &str) -> String {
        format!("{}{}", self.config.key_prefix, service)
    }

    fn store(&self) -> Result<&Arc<dyn KeyValueStore>, FailureReason> {
        self.store.as_ref().ok_or(FailureReason::StoreDisabled)
    }

    /// Current state; a service never seen is closed
    pub async fn state(&self, service: &str) -> Result<BreakerState, FailureReason> {
        let key = self.key(service);
        match self.store()?.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| FailureReason::malformed(&key, e)),
            None => Ok(BreakerState::default()),
        }
    }

    async fn save(&self, service: &str, state: &BreakerState) -> Result<(), FailureReason> {
        let key = self.key(service);
        let value = serde_json::to_string(state).map_err(|e| FailureReason::malformed(&key, e))?;
        self.store()?.set(&key, &value, None).await?;
        Ok(())
    }

    /// Whether a call to `service` may proceed
    pub async fn check(&self, service: &str) -> BreakerDecision {
        match self.try_check(service).await {
            Ok(decision) => decision,
            Err(reason) => self.recover(service, reason).await,
        }
    }

    pub async fn try_check(&self, service: &str) -> Result<BreakerDecision, FailureReason> {
        let state = self.state(service).await?;
        let (next, allowed) = state.on_check(
            self.clock.now_ms(),
            Duration::from_millis(self.config.timeout_ms),
            self.config.half_open_max_probes,
        );

        if next != state {
            self.save(service, &next).await?;
            self.log_transition(service, &state, &next);
        }
        if !allowed {
            tracing::debug!(service = %service, phase = PhaseKind::from(next.phase).as_str(), "Circuit rejected call");
        }

        Ok(BreakerDecision {
            allowed,
            phase: next.phase.into(),
        })
    }

    pub async fn record_success(&self, service: &str) {
        if let Err(reason) = self.try_record_success(service).await {
            self.recover(service, reason).await;
        }
    }

    pub async fn try_record_success(&self, service: &str) -> Result<(), FailureReason> {
        let state = self.state(service).await?;
        let next = state.on_success();
        if next != state {
            self.save(service, &next).await?;
            self.log_transition(service, &state, &next);
        }
        Ok(())
    }

    pub async fn record_failure(&self, service: &str) {
        if let Err(reason) = self.try_record_failure(service).await {
            self.recover(service, reason).await;
        }
    }

    pub async fn try_record_failure(&self, service: &str) -> Result<(), FailureReason> {
        let state = self.state(service).await?;
        let next = state.on_failure(self.clock.now_ms(), self.config.failure_threshold);
        self.save(service, &next).await?;
        self.log_transition(service, &state, &next);
        Ok(())
    }

    /// Apply the fallback for `reason`: malformed state is reset to closed,
    /// anything else allows the call with an unknown phase.
    async fn recover(&self, service: &str, reason: FailureReason) -> BreakerDecision {
        match reason {
            FailureReason::StoreDisabled => BreakerDecision::fail_open(),
            FailureReason::MalformedEntry { .. } => {
                tracing::warn!(service = %service, error = %reason, "Resetting malformed breaker state");
                match self.save(service, &BreakerState::default()).await {
                    Ok(()) => BreakerDecision {
                        allowed: true,
                        phase: PhaseKind::Closed,
                    },
                    Err(_) => BreakerDecision::fail_open(),
                }
            },
            FailureReason::Store(_) => {
                tracing::warn!(service = %service, error = %reason, "Circuit breaker unavailable, allowing call");
                BreakerDecision::fail_open()
            },
        }
    }

    fn log_transition(&self, service: &str, from: &BreakerState, to: &BreakerState) {
        let (from_kind, to_kind) = (PhaseKind::from(from.phase), PhaseKind::from(to.phase));
        if from_kind == to_kind {
            return;
        }
        match to_kind {
            PhaseKind::Open => tracing::warn!(
                service = %service,
                failures = to.failures,
                "Circuit breaker OPEN"
            ),
            _ => tracing::info!(
                service = %service,
                from = from_kind.as_str(),
                to = to_kind.as_str(),
                "Circuit breaker transition"
            ),
        }
        metrics::counter!(
            "circuit_breaker_transitions_total",
            "service" => service.to_string(),
            "to" => to_kind.as_str()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parish_chat_core::ManualClock;
    use parish_chat_persistence::MemoryStore;

    const SERVICE: &str = "llm_provider";

    fn breaker() -> (CircuitBreaker, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let breaker = CircuitBreaker::new(
            Some(store.clone() as Arc<dyn KeyValueStore>),
            BreakerConfig::default(),
        )
        .with_clock(clock.clone());
        (breaker, store, clock)
    }

    #[test]
    fn test_pure_transitions() {
        let timeout = Duration::from_secs(60);
        let mut state = BreakerState::default();
        for i in 0..5 {
            state = state.on_failure(i, 5);
        }
        assert_eq!(state.phase, Phase::Open);
        assert_eq!(state.last_failure_at_ms, 4);

        // exactly at the timeout is still open
        let (same, allowed) = state.on_check(4 + 60_000, timeout, 3);
        assert!(!allowed);
        assert_eq!(same, state);

        let (half, allowed) = state.on_check(4 + 60_001, timeout, 3);
        assert!(allowed);
        assert_eq!(
            half.phase,
            Phase::HalfOpen {
                probes: 1,
                last_probe_at_ms: 4 + 60_001
            }
        );

        assert_eq!(half.on_success(), BreakerState::default());
    }

    #[test]
    fn test_half_open_probe_limit() {
        let state = BreakerState {
            failures: 5,
            last_failure_at_ms: 0,
            phase: Phase::HalfOpen {
                probes: 1,
                last_probe_at_ms: 0,
            },
        };
        let timeout = Duration::from_secs(60);
        let (s, a) = state.on_check(1, timeout, 3);
        assert!(a);
        let (s, a) = s.on_check(1, timeout, 3);
        assert!(a);
        let (s, a) = s.on_check(1, timeout, 3);
        assert!(!a);
        assert_eq!(
            s.phase,
            Phase::HalfOpen {
                probes: 3,
                last_probe_at_ms: 1
            }
        );
    }

    #[test]
    fn test_exhausted_half_open_admits_new_round_after_timeout() {
        let timeout = Duration::from_secs(60);
        let stuck = BreakerState {
            failures: 5,
            last_failure_at_ms: 0,
            phase: Phase::HalfOpen {
                probes: 3,
                last_probe_at_ms: 1_000,
            },
        };

        let (same, allowed) = stuck.on_check(61_000, timeout, 3);
        assert!(!allowed);
        assert_eq!(same, stuck);

        let (next, allowed) = stuck.on_check(61_001, timeout, 3);
        assert!(allowed);
        assert_eq!(
            next.phase,
            Phase::HalfOpen {
                probes: 1,
                last_probe_at_ms: 61_001
            }
        );
    }

    #[test]
    fn test_closed_success_decrements_failures() {
        let state = BreakerState::default().on_failure(10, 5).on_failure(20, 5);
        assert_eq!(state.failures, 2);
        assert_eq!(state.on_success().failures, 1);
        assert_eq!(BreakerState::default().on_success().failures, 0);
    }

    #[test]
    fn test_state_json_shape() {
        let state = BreakerState {
            failures: 5,
            last_failure_at_ms: 42,
            phase: Phase::HalfOpen {
                probes: 2,
                last_probe_at_ms: 40,
            },
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["state"], "half-open");
        assert_eq!(json["probes"], 2);
        assert_eq!(json["last_probe_at_ms"], 40);
        let back: BreakerState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);

        // state written without a probe time still loads
        let legacy: BreakerState =
            serde_json::from_str(r#"{"failures":5,"last_failure_at_ms":0,"state":"half-open","probes":0}"#).unwrap();
        assert_eq!(
            legacy.phase,
            Phase::HalfOpen {
                probes: 0,
                last_probe_at_ms: 0
            }
        );
    }

    #[tokio::test]
    async fn test_open_half_open_closed_cycle() {
        let (breaker, _, clock) = breaker();

        let first = breaker.check(SERVICE).await;
        assert_eq!(first, BreakerDecision { allowed: true, phase: PhaseKind::Closed });

        for _ in 0..5 {
            breaker.record_failure(SERVICE).await;
        }
        let open = breaker.check(SERVICE).await;
        assert!(!open.allowed);
        assert_eq!(open.phase, PhaseKind::Open);

        clock.advance(Duration::from_secs(61));
        let probe = breaker.check(SERVICE).await;
        assert!(probe.allowed);
        assert_eq!(probe.phase, PhaseKind::HalfOpen);

        breaker.record_success(SERVICE).await;
        let state = breaker.state(SERVICE).await.unwrap();
        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(state.failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let (breaker, _, clock) = breaker();
        for _ in 0..5 {
            breaker.record_failure(SERVICE).await;
        }
        clock.advance(Duration::from_secs(61));
        assert!(breaker.check(SERVICE).await.allowed);

        breaker.record_failure(SERVICE).await;
        let decision = breaker.check(SERVICE).await;
        assert!(!decision.allowed);
        assert_eq!(decision.phase, PhaseKind::Open);
    }

    #[tokio::test]
    async fn test_unrecorded_trial_calls_do_not_lock_breaker() {
        let (breaker, _, clock) = breaker();
        for _ in 0..5 {
            breaker.record_failure(SERVICE).await;
        }
        clock.advance(Duration::from_secs(61));

        // three admitted trial calls whose outcome never comes back
        for _ in 0..3 {
            assert!(breaker.check(SERVICE).await.allowed);
        }
        let rejected = breaker.check(SERVICE).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.phase, PhaseKind::HalfOpen);

        clock.advance(Duration::from_secs(61));
        let retry = breaker.check(SERVICE).await;
        assert!(retry.allowed);
        assert_eq!(retry.phase, PhaseKind::HalfOpen);

        breaker.record_success(SERVICE).await;
        assert_eq!(breaker.state(SERVICE).await.unwrap(), BreakerState::default());
    }

    #[tokio::test]
    async fn test_services_are_independent() {
        let (breaker, _, _) = breaker();
        for _ in 0..5 {
            breaker.record_failure("embeddings").await;
        }
        assert!(!breaker.check("embeddings").await.allowed);
        assert!(breaker.check(SERVICE).await.allowed);
    }

    #[tokio::test]
    async fn test_fails_open_when_store_unavailable() {
        let (breaker, store, _) = breaker();
        for _ in 0..5 {
            breaker.record_failure(SERVICE).await;
        }
        store.set_available(false);

        let decision = breaker.check(SERVICE).await;
        assert!(decision.allowed);
        assert_eq!(decision.phase, PhaseKind::Unknown);
        breaker.record_failure(SERVICE).await;
    }

    #[tokio::test]
    async fn test_malformed_state_resets_to_closed() {
        let (breaker, store, _) = breaker();
        store
            .set("circuit_breaker:llm_provider", "{\"state\":\"melted\"}", None)
            .await
            .unwrap();

        let decision = breaker.check(SERVICE).await;
        assert_eq!(decision, BreakerDecision { allowed: true, phase: PhaseKind::Closed });
        assert_eq!(breaker.state(SERVICE).await.unwrap(), BreakerState::default());
    }

    #[tokio::test]
    async fn test_without_store() {
        let breaker = CircuitBreaker::new(None, BreakerConfig::default());
        for _ in 0..10 {
            breaker.record_failure(SERVICE).await;
        }
        assert_eq!(breaker.check(SERVICE).await, BreakerDecision::fail_open());
    }
}
