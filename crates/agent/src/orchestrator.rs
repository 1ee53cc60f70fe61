//! Chat request orchestrator
//!
//! Runs one question through the pipeline:
//! pre-filter → rate limit → cache → breaker → rewrite → retrieval → generation.
//! Every stage that touches an external system degrades to a reply rather
//! than an error, so `handle` only fails on empty input.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use parish_chat_cache::{HitKind, SemanticCache, StoreOutcome};
use parish_chat_config::{CannedReplies, ChatConfig, DomainConfig, LlmConfig};
use parish_chat_core::{recent_turns, ChatTurn, GenerateRequest, LanguageModel};
use parish_chat_llm::prompt::PromptBuilder;
use parish_chat_rag::FusionRetriever;
use parish_chat_resilience::{CircuitBreaker, RateLimiter};
use parish_chat_text_processing::normalize;

use crate::conversational::ConversationalFilter;
use crate::follow_up::FollowUpRewriter;
use crate::quick_actions::{QuickActionDetector, QuickActions};
use crate::resources::{Attachment, ResourceCatalog};
use crate::AgentError;

/// Label returned by intent classification for questions answered without retrieval
const QUICK_INTENT: &str = "quick";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Turns of history passed to generation
    pub history_window: usize,
    pub intent_classification: bool,
    pub classification_timeout: Duration,
    pub generation_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl OrchestratorConfig {
    pub fn from_settings(chat: &ChatConfig, llm: &LlmConfig) -> Self {
        Self {
            history_window: chat.history_window,
            intent_classification: chat.intent_classification,
            classification_timeout: Duration::from_millis(chat.rewrite_timeout_ms),
            generation_timeout: Duration::from_millis(llm.generation_timeout_ms),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            top_p: llm.top_p,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_settings(&ChatConfig::default(), &LlmConfig::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    /// Rate-limit identity: user id or client address
    #[serde(default)]
    pub caller: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, caller: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            caller: caller.into(),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Where an answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Conversational,
    CacheExact,
    CacheFuzzy,
    Generated,
    NoInformation,
    RateLimited,
    Degraded,
    Failed,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Conversational => "conversational",
            AnswerSource::CacheExact => "cache_exact",
            AnswerSource::CacheFuzzy => "cache_fuzzy",
            AnswerSource::Generated => "generated",
            AnswerSource::NoInformation => "no_information",
            AnswerSource::RateLimited => "rate_limited",
            AnswerSource::Degraded => "degraded",
            AnswerSource::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub answer: String,
    /// Whether clients may cache this answer themselves
    pub cacheable: bool,
    pub source: AnswerSource,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_actions: Option<QuickActions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ChatReply {
    fn canned(answer: &str, source: AnswerSource) -> Self {
        Self {
            answer: answer.to_string(),
            cacheable: false,
            source,
            attachments: Vec::new(),
            quick_actions: None,
            retry_after_ms: None,
        }
    }
}

pub struct ChatOrchestrator {
    filter: ConversationalFilter,
    limiter: Arc<RateLimiter>,
    cache: Arc<SemanticCache>,
    breaker: Arc<CircuitBreaker>,
    /// Without one, questions are answered by the model alone
    retriever: Option<Arc<FusionRetriever>>,
    model: Arc<dyn LanguageModel>,
    rewriter: Option<FollowUpRewriter>,
    quick_actions: QuickActionDetector,
    resources: ResourceCatalog,
    replies: CannedReplies,
    config: OrchestratorConfig,
}

impl ChatOrchestrator {
    pub fn new(
        domain: &DomainConfig,
        limiter: Arc<RateLimiter>,
        cache: Arc<SemanticCache>,
        breaker: Arc<CircuitBreaker>,
        model: Arc<dyn LanguageModel>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            filter: ConversationalFilter::new(domain),
            limiter,
            cache,
            breaker,
            retriever: None,
            model,
            rewriter: None,
            quick_actions: QuickActionDetector::new(domain),
            resources: ResourceCatalog::new(domain),
            replies: domain.replies.clone(),
            config,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<FusionRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_rewriter(mut self, rewriter: FollowUpRewriter) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply, AgentError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(AgentError::InvalidInput("message is empty".to_string()));
        }

        let start = Instant::now();
        let reply = self.process(message, &request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        metrics::counter!("chat_requests_total", "outcome" => reply.source.as_str()).increment(1);
        metrics::histogram!("chat_request_duration_ms").record(elapsed_ms as f64);
        tracing::info!(
            source = reply.source.as_str(),
            cacheable = reply.cacheable,
            elapsed_ms,
            "Chat request handled"
        );

        Ok(reply)
    }

    async fn process(&self, message: &str, request: &ChatRequest) -> ChatReply {
        if let Some(kind) = self.filter.detect(message) {
            tracing::debug!(?kind, "Conversational message");
            return ChatReply::canned(self.filter.reply(kind), AnswerSource::Conversational);
        }

        let limit = self.limiter.check(&request.caller).await;
        if !limit.allowed {
            let retry_after_ms = limit.retry_after_ms(self.limiter.now_ms());
            return ChatReply {
                retry_after_ms: Some(retry_after_ms),
                ..ChatReply::canned(&self.replies.rate_limited, AnswerSource::RateLimited)
            };
        }

        let follow_up = self
            .rewriter
            .as_ref()
            .is_some_and(|r| r.needs_rewrite(message, &request.history));

        // Follow-ups depend on the conversation, so a cached answer would be wrong
        if !follow_up {
            if let Some(hit) = self.cache.lookup(message).await {
                let (kind, source) = match hit.kind {
                    HitKind::Exact => ("exact", AnswerSource::CacheExact),
                    HitKind::Fuzzy { .. } => ("fuzzy", AnswerSource::CacheFuzzy),
                };
                metrics::counter!("chat_cache_hits_total", "kind" => kind).increment(1);
                return self.answered(message, hit.answer, source, true);
            }
        }

        let service = self.breaker.default_service();
        let gate = self.breaker.check(service).await;
        if !gate.allowed {
            tracing::warn!(service = %service, phase = gate.phase.as_str(), "Provider unavailable, degrading");
            return ChatReply::canned(&self.replies.degraded, AnswerSource::Degraded);
        }

        let question = match &self.rewriter {
            Some(rewriter) if follow_up => rewriter.rewrite(message, &request.history).await,
            _ => message.to_string(),
        };
        let history = recent_turns(&request.history, self.config.history_window);

        let retriever = match &self.retriever {
            Some(retriever) if !self.is_quick(&question, history).await => Some(retriever),
            _ => None,
        };

        let mut healthy = true;
        let builder = match retriever {
            None => PromptBuilder::quick(),
            Some(retriever) => match retriever.retrieve(&question).await {
                Ok(report) => {
                    if report.is_degraded() {
                        healthy = false;
                        self.breaker.record_failure(service).await;
                    }
                    if report.is_empty() {
                        // the provider answered; a half-open trial call must still release its slot
                        if healthy {
                            self.breaker.record_success(service).await;
                        }
                        tracing::info!(
                            question = %question,
                            fused = report.fused_count,
                            "No passage above the relevance floor"
                        );
                        return ChatReply::canned(&self.replies.no_information, AnswerSource::NoInformation);
                    }
                    PromptBuilder::new().with_passages(report.passage_texts())
                },
                Err(e) => {
                    tracing::error!(error = %e, "Retrieval failed");
                    self.breaker.record_failure(service).await;
                    return ChatReply::canned(&self.replies.failure, AnswerSource::Failed);
                },
            },
        };

        let prompt = builder
            .with_history(history)
            .with_sampling(self.config.max_tokens, self.config.temperature, self.config.top_p)
            .build(&question);

        let answer = match self.generate(prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "Generation failed");
                self.breaker.record_failure(service).await;
                return ChatReply::canned(&self.replies.failure, AnswerSource::Failed);
            },
        };
        if healthy {
            self.breaker.record_success(service).await;
        }

        let cacheable = !follow_up && self.cache.policy().exclusion(&normalize(message)).is_none();
        if cacheable {
            if let StoreOutcome::Stored { ttl, .. } = self.cache.store(message, &answer).await {
                tracing::debug!(ttl_secs = ttl.as_secs(), "Answer cached");
            }
        }

        self.answered(message, answer, AnswerSource::Generated, cacheable)
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, AgentError> {
        let timeout = self.config.generation_timeout;
        let response = tokio::time::timeout(timeout, self.model.generate(request))
            .await
            .map_err(|_| AgentError::Timeout(timeout.as_millis() as u64))??;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(AgentError::Llm("empty completion".to_string()));
        }
        Ok(text.to_string())
    }

    /// Classification failures take the full retrieval path
    async fn is_quick(&self, question: &str, history: &[ChatTurn]) -> bool {
        if !self.config.intent_classification {
            return false;
        }

        let timeout = self.config.classification_timeout;
        match tokio::time::timeout(timeout, self.model.classify(question, history)).await {
            Ok(Ok(classification)) => {
                tracing::debug!(label = %classification.label, reason = %classification.reason, "Intent classified");
                classification.label == QUICK_INTENT
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Intent classification failed");
                false
            },
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Intent classification timed out");
                false
            },
        }
    }

    /// Attach sign-up extras to an answer
    fn answered(&self, message: &str, answer: String, source: AnswerSource, cacheable: bool) -> ChatReply {
        let (quick_actions, attachments) = if self.quick_actions.asks_about_inscription(message) {
            (
                self.quick_actions.detect(message, &answer),
                self.resources.search(message),
            )
        } else {
            (None, Vec::new())
        };

        ChatReply {
            answer,
            cacheable,
            source,
            attachments,
            quick_actions,
            retry_after_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parish_chat_cache::CachePolicy;
    use parish_chat_config::{BreakerConfig, CacheConfig, RateLimitConfig};
    use parish_chat_core::{
        Classification, EmbeddingProvider, Error, GenerateResponse, KeyValueStore, ManualClock,
        Result as CoreResult, RetrievalCandidate, VectorIndex,
    };
    use parish_chat_persistence::MemoryStore;
    use parish_chat_rag::{QueryExpander, QueryExpansionConfig, RetrieverConfig};
    use parish_chat_resilience::{BreakerState, Phase};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const ANSWER: &str = "Eloos es la comunidad de jóvenes de la parroquia.";

    struct ScriptedLlm {
        answer: Option<&'static str>,
        label: &'static str,
        generations: AtomicUsize,
        classifications: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn generate(&self, _request: GenerateRequest) -> CoreResult<GenerateResponse> {
            self.generations.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Some(text) => Ok(GenerateResponse {
                    text: text.to_string(),
                    model: "scripted".to_string(),
                }),
                None => Err(Error::Llm("503 Service Unavailable".to_string())),
            }
        }

        async fn classify(&self, _text: &str, _context: &[ChatTurn]) -> CoreResult<Classification> {
            self.classifications.fetch_add(1, Ordering::SeqCst);
            Ok(Classification {
                label: self.label.to_string(),
                reason: "scripted".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LanguageModel for FixedLlm {
        async fn generate(&self, _request: GenerateRequest) -> CoreResult<GenerateResponse> {
            Ok(GenerateResponse {
                text: self.0.to_string(),
                model: "fixed".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Records every text it embeds; texts containing `reject` fail
    #[derive(Default)]
    struct RecordingEmbedder {
        seen: Mutex<Vec<String>>,
        reject: Option<&'static str>,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingEmbedder {
        async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
            self.seen.lock().unwrap().push(text.to_string());
            if self.reject.is_some_and(|r| text.contains(r)) {
                return Err(Error::Llm("embedding quota exceeded".to_string()));
            }
            Ok(vec![0.1; 4])
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    struct CountingIndex {
        score: f32,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for CountingIndex {
        async fn search(&self, _embedding: &[f32], _top_k: usize) -> CoreResult<Vec<RetrievalCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut metadata = HashMap::new();
            metadata.insert(
                "pageContent".to_string(),
                "Eloos reúne a jóvenes de 18 a 30 años los viernes.".to_string(),
            );
            Ok(vec![RetrievalCandidate {
                id: "eloos".to_string(),
                score: self.score,
                metadata,
            }])
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct Harness {
        orchestrator: ChatOrchestrator,
        store: Arc<MemoryStore>,
        llm: Arc<ScriptedLlm>,
        embedder: Arc<RecordingEmbedder>,
        index: Arc<CountingIndex>,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<SemanticCache>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        async fn breaker_state(&self) -> BreakerState {
            self.breaker.state(self.breaker.default_service()).await.unwrap()
        }

        async fn trip_breaker(&self) {
            let service = self.breaker.default_service().to_string();
            for _ in 0..5 {
                self.breaker.record_failure(&service).await;
            }
        }
    }

    struct Setup {
        answer: Option<&'static str>,
        label: &'static str,
        score: f32,
        max_requests: u32,
        intent_classification: bool,
        /// Paraphrase returned by query expansion; none disables expansion
        expansion: Option<&'static str>,
        /// Embedding fails for texts containing this
        reject_embedding: Option<&'static str>,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                answer: Some(ANSWER),
                label: "retrieve",
                score: 0.8,
                max_requests: 10,
                intent_classification: false,
                expansion: None,
                reject_embedding: None,
            }
        }
    }

    fn harness(setup: Setup) -> Harness {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let shared: Arc<dyn KeyValueStore> = store.clone();
        let domain = DomainConfig::default();

        let limiter = RateLimiter::new(
            Some(shared.clone()),
            &RateLimitConfig {
                max_requests: setup.max_requests,
                ..Default::default()
            },
        )
        .with_clock(clock.clone());
        let cache = Arc::new(
            SemanticCache::new(
                Some(shared.clone()),
                CachePolicy::new(&domain, &CacheConfig::default()),
                CacheConfig::default(),
            )
            .with_clock(clock.clone()),
        );
        let breaker = Arc::new(
            CircuitBreaker::new(Some(shared), BreakerConfig::default()).with_clock(clock.clone()),
        );

        let llm = Arc::new(ScriptedLlm {
            answer: setup.answer,
            label: setup.label,
            generations: AtomicUsize::new(0),
            classifications: AtomicUsize::new(0),
        });
        let embedder = Arc::new(RecordingEmbedder {
            reject: setup.reject_embedding,
            ..Default::default()
        });
        let index = Arc::new(CountingIndex {
            score: setup.score,
            calls: AtomicUsize::new(0),
        });
        let mut retriever = FusionRetriever::new(embedder.clone(), index.clone(), RetrieverConfig::default());
        if let Some(paraphrase) = setup.expansion {
            retriever = retriever.with_expander(QueryExpander::new(
                Arc::new(FixedLlm(paraphrase)),
                QueryExpansionConfig::default(),
            ));
        }
        let retriever = Arc::new(retriever);

        let config = OrchestratorConfig {
            intent_classification: setup.intent_classification,
            ..Default::default()
        };
        let rewriter = FollowUpRewriter::new(
            Arc::new(FixedLlm("¿Qué es el grupo Bartimeo?")),
            &domain,
            &ChatConfig::default(),
        );
        let orchestrator = ChatOrchestrator::new(
            &domain,
            Arc::new(limiter),
            cache.clone(),
            breaker.clone(),
            llm.clone(),
            config,
        )
        .with_retriever(retriever)
        .with_rewriter(rewriter);

        Harness {
            orchestrator,
            store,
            llm,
            embedder,
            index,
            breaker,
            cache,
            clock,
        }
    }

    fn ask(message: &str) -> ChatRequest {
        ChatRequest::new(message, "203.0.113.7")
    }

    #[tokio::test]
    async fn test_greeting_touches_nothing() {
        let h = harness(Setup::default());
        let reply = h.orchestrator.handle(ask("¡Hola!")).await.unwrap();

        assert_eq!(reply.source, AnswerSource::Conversational);
        assert!(!reply.cacheable);
        assert_eq!(h.llm.generations.load(Ordering::SeqCst), 0);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_generated_then_cached() {
        let h = harness(Setup::default());

        let first = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(first.source, AnswerSource::Generated);
        assert_eq!(first.answer, ANSWER);
        assert!(first.cacheable);

        let second = h.orchestrator.handle(ask("que es eloos")).await.unwrap();
        assert_eq!(second.source, AnswerSource::CacheExact);
        assert_eq!(second.answer, ANSWER);
        assert!(second.cacheable);
        assert_eq!(h.llm.generations.load(Ordering::SeqCst), 1);
        assert_eq!(h.index.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_calendar_question_not_cached() {
        let h = harness(Setup::default());

        let first = h.orchestrator.handle(ask("¿Qué eventos hay hoy?")).await.unwrap();
        assert_eq!(first.source, AnswerSource::Generated);
        assert!(!first.cacheable);

        let second = h.orchestrator.handle(ask("¿Qué eventos hay hoy?")).await.unwrap();
        assert_eq!(second.source, AnswerSource::Generated);
        assert_eq!(h.llm.generations.load(Ordering::SeqCst), 2);
        assert_eq!(h.cache.stats().await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_rate_limited_after_quota() {
        let h = harness(Setup {
            max_requests: 2,
            ..Default::default()
        });

        for _ in 0..2 {
            let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
            assert_ne!(reply.source, AnswerSource::RateLimited);
        }

        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::RateLimited);
        assert!(reply.retry_after_ms.unwrap() > 0);
        assert!(!reply.cacheable);

        // Greetings are answered before the limiter
        let greeting = h.orchestrator.handle(ask("hola")).await.unwrap();
        assert_eq!(greeting.source, AnswerSource::Conversational);
    }

    #[tokio::test]
    async fn test_open_breaker_degrades() {
        let h = harness(Setup::default());
        let service = h.breaker.default_service().to_string();
        for _ in 0..5 {
            h.breaker.record_failure(&service).await;
        }

        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::Degraded);
        assert_eq!(h.llm.generations.load(Ordering::SeqCst), 0);
        assert_eq!(h.index.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_counts_against_breaker() {
        let h = harness(Setup {
            answer: None,
            ..Default::default()
        });

        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::Failed);
        assert!(!reply.cacheable);

        let state = h.breaker.state(h.breaker.default_service()).await.unwrap();
        assert_eq!(state.failures, 1);
        assert_eq!(h.cache.stats().await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_half_open_trial_call_closes_breaker() {
        let h = harness(Setup::default());
        h.trip_breaker().await;
        assert_eq!(
            h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap().source,
            AnswerSource::Degraded
        );

        h.clock.advance(Duration::from_secs(61));
        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::Generated);
        assert_eq!(h.breaker_state().await, BreakerState::default());
    }

    #[tokio::test]
    async fn test_empty_retrieval_releases_half_open_slot() {
        let h = harness(Setup {
            score: 0.2,
            ..Default::default()
        });
        h.trip_breaker().await;
        h.clock.advance(Duration::from_secs(61));

        for question in [
            "¿Qué es Eloos?",
            "¿Qué es Bartimeo?",
            "¿Qué es la Mies?",
            "¿Qué es Cáritas?",
        ] {
            let reply = h.orchestrator.handle(ask(question)).await.unwrap();
            assert_eq!(reply.source, AnswerSource::NoInformation);
        }
        assert_eq!(h.breaker_state().await.phase, Phase::Closed);
    }

    #[tokio::test]
    async fn test_exhausted_half_open_recovers_after_timeout() {
        let h = harness(Setup::default());
        let service = h.breaker.default_service().to_string();
        h.trip_breaker().await;
        h.clock.advance(Duration::from_secs(61));

        // trial calls admitted but never reported, as when requests are cancelled
        for _ in 0..3 {
            assert!(h.breaker.check(&service).await.allowed);
        }
        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::Degraded);

        h.clock.advance(Duration::from_secs(61));
        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::Generated);
        assert_eq!(h.breaker_state().await.phase, Phase::Closed);
    }

    #[tokio::test]
    async fn test_degraded_retrieval_counts_against_breaker() {
        let h = harness(Setup {
            expansion: Some("grupo sin vector"),
            reject_embedding: Some("sin vector"),
            ..Default::default()
        });

        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::Generated);
        assert_eq!(reply.answer, ANSWER);

        let state = h.breaker_state().await;
        assert_eq!(state.failures, 1);
        assert_eq!(state.phase, Phase::Closed);
    }

    #[tokio::test]
    async fn test_degraded_trial_call_reopens_breaker() {
        let h = harness(Setup {
            expansion: Some("grupo sin vector"),
            reject_embedding: Some("sin vector"),
            ..Default::default()
        });
        h.trip_breaker().await;
        h.clock.advance(Duration::from_secs(61));

        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::Generated);
        assert_eq!(h.breaker_state().await.phase, Phase::Open);

        let next = h.orchestrator.handle(ask("¿Qué es Bartimeo?")).await.unwrap();
        assert_eq!(next.source, AnswerSource::Degraded);
    }

    #[tokio::test]
    async fn test_no_relevant_passages() {
        let h = harness(Setup {
            score: 0.2,
            ..Default::default()
        });

        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::NoInformation);
        assert!(!reply.cacheable);
        assert_eq!(h.llm.generations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_follow_up_rewritten_and_not_cached() {
        let h = harness(Setup::default());
        let history = vec![
            ChatTurn::user("¿Qué es Eloos?"),
            ChatTurn::assistant(ANSWER),
        ];

        let reply = h
            .orchestrator
            .handle(ask("¿y Bartimeo?").with_history(history))
            .await
            .unwrap();

        assert_eq!(reply.source, AnswerSource::Generated);
        assert!(!reply.cacheable);
        assert_eq!(h.cache.stats().await.unwrap().size, 0);
        let seen = h.embedder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["¿Qué es el grupo Bartimeo?".to_string()]);
    }

    #[tokio::test]
    async fn test_signup_question_gets_extras() {
        let h = harness(Setup::default());
        let reply = h
            .orchestrator
            .handle(ask("¿Cómo me inscribo en Eloos?"))
            .await
            .unwrap();

        assert_eq!(reply.source, AnswerSource::Generated);
        assert!(reply.quick_actions.is_some());
        assert!(!reply.attachments.is_empty());

        let plain = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert!(plain.quick_actions.is_none());
        assert!(plain.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_quick_intent_skips_retrieval() {
        let h = harness(Setup {
            label: "quick",
            intent_classification: true,
            ..Default::default()
        });

        let reply = h.orchestrator.handle(ask("¿Qué es Eloos?")).await.unwrap();
        assert_eq!(reply.source, AnswerSource::Generated);
        assert_eq!(h.llm.classifications.load(Ordering::SeqCst), 1);
        assert_eq!(h.index.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let h = harness(Setup::default());
        let result = h.orchestrator.handle(ask("   ")).await;
        assert!(matches!(result, Err(AgentError::InvalidInput(_))));
    }

    #[test]
    fn test_reply_serialization() {
        let reply = ChatReply {
            retry_after_ms: Some(1_500),
            ..ChatReply::canned("espera", AnswerSource::RateLimited)
        };
        let json = serde_json::to_value(&reply).unwrap();

        assert_eq!(json["source"], "rate_limited");
        assert_eq!(json["retry_after_ms"], 1_500);
        assert!(json.get("attachments").is_none());
        assert!(json.get("quick_actions").is_none());
    }
}
