//! Generation Orchestrator
//!
//! Drives one generation request through
//! sanitize → reserve credits → attempt → validate → retry-with-variation,
//! bounded by attempt count, then fans the winning asset out to the resizer.
//!
//! Partial failures must not corrupt the ledger: the credit debit happens
//! once up front, stays committed on success, and is reversed by an
//! idempotent compensating refund when the request fails terminally.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use adforge_ledger::{CreditGate, GateDecision};

use crate::error::{GenerationError, GenerationResult};
use crate::prompt::{prompt_for_attempt, sanitize_prompt};
use crate::provider::{BusinessContext, CreativeConcept, GenerationProvider, ProviderRequest};
use crate::resize::{AdVariant, ResizeResult, Resizer};

/// Tuning knobs for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on provider attempts per request
    pub max_attempts: u32,
    /// Per-attempt provider timeout; a timeout counts as a provider error
    pub attempt_timeout: Duration,
    /// Credits debited per generation request
    pub credits_per_generation: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            attempt_timeout: Duration::from_secs(60),
            credits_per_generation: 1,
        }
    }
}

/// Completed generation: the fan-out result plus accounting details
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub request_id: Uuid,
    pub variants: Vec<AdVariant>,
    /// Sizes that failed under the accept-partial policy
    pub failed_sizes: Vec<String>,
    pub attempts_used: u32,
    pub credits_charged: i64,
}

/// Orchestrates gated, retryable generation requests
pub struct GenerationOrchestrator {
    gate: CreditGate,
    provider: Arc<dyn GenerationProvider>,
    resizer: Resizer,
    config: OrchestratorConfig,
}

impl GenerationOrchestrator {
    pub fn new(
        gate: CreditGate,
        provider: Arc<dyn GenerationProvider>,
        resizer: Resizer,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            gate,
            provider,
            resizer,
            config,
        }
    }

    /// Run one generation request end to end.
    ///
    /// The prompt precondition is checked before any credits move. After the
    /// debit, every terminal failure path refunds before returning; success
    /// leaves the debit committed.
    pub async fn generate(
        &self,
        account_id: Uuid,
        raw_prompt: &str,
        business_context: BusinessContext,
    ) -> GenerationResult<GenerationOutcome> {
        // Sanitizing: hard precondition, not retried, no ledger access yet
        let sanitized = sanitize_prompt(raw_prompt)?;

        let request_id = Uuid::new_v4();

        let authorization = match self
            .gate
            .check_and_reserve(account_id, self.config.credits_per_generation, request_id)
            .await?
        {
            GateDecision::Authorized(auth) => auth,
            GateDecision::Denied { reason, .. } => {
                return Err(GenerationError::InsufficientCredits { reason });
            }
        };

        tracing::info!(
            account_id = %account_id,
            request_id = %request_id,
            credits = self.config.credits_per_generation,
            "Generation authorized"
        );

        let (creative, attempts_used) = match self
            .attempt_with_retries(&sanitized, &business_context, request_id)
            .await
        {
            Ok(ok) => ok,
            Err(e) => return Err(self.refund_and_return(&authorization, e).await),
        };

        let ResizeResult {
            variants,
            failed_sizes,
        } = match self.resizer.fan_out(&creative.asset_url).await {
            Ok(result) => result,
            Err(e) => return Err(self.refund_and_return(&authorization, e).await),
        };

        tracing::info!(
            account_id = %account_id,
            request_id = %request_id,
            attempts_used = attempts_used,
            variant_count = variants.len(),
            failed_sizes = ?failed_sizes,
            "Generation complete"
        );

        Ok(GenerationOutcome {
            request_id,
            variants,
            failed_sizes,
            attempts_used,
            credits_charged: self.config.credits_per_generation,
        })
    }

    /// Attempting/Validating/Retrying loop.
    ///
    /// A timeout, a provider error, and an empty variant list are all the
    /// same thing to this loop: the attempt failed, the next one (if any)
    /// reframes the prompt.
    async fn attempt_with_retries(
        &self,
        sanitized: &str,
        business_context: &BusinessContext,
        request_id: Uuid,
    ) -> GenerationResult<(CreativeConcept, u32)> {
        let mut last_error = String::new();

        for attempt in 0..self.config.max_attempts {
            let prompt = prompt_for_attempt(sanitized, attempt);
            let request = ProviderRequest::ad_creative(prompt, business_context.clone());

            let outcome =
                tokio::time::timeout(self.config.attempt_timeout, self.provider.generate(&request))
                    .await;

            match outcome {
                Err(_) => {
                    last_error = format!(
                        "provider timed out after {:?}",
                        self.config.attempt_timeout
                    );
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                }
                Ok(Ok(response)) => {
                    // Validating: a missing or empty variant list is a
                    // validation failure, retried like a provider error
                    match response.variants.into_iter().next() {
                        Some(creative) => return Ok((creative, attempt + 1)),
                        None => {
                            last_error = "provider returned no variants".to_string();
                        }
                    }
                }
            }

            tracing::warn!(
                request_id = %request_id,
                attempt = attempt + 1,
                max_attempts = self.config.max_attempts,
                error = %last_error,
                "Generation attempt failed"
            );
        }

        Err(GenerationError::Exhausted {
            attempts: self.config.max_attempts,
            last_error,
        })
    }

    /// Refund the authorization and hand the terminal error back.
    ///
    /// The refund is keyed by the request id, so retrying it after a crash
    /// cannot double-credit. A failed refund is logged and the original
    /// error still surfaces; redelivering the refund later is safe.
    async fn refund_and_return(
        &self,
        authorization: &adforge_ledger::Authorization,
        error: GenerationError,
    ) -> GenerationError {
        if let Err(refund_err) = self.gate.refund(authorization).await {
            tracing::error!(
                account_id = %authorization.account_id,
                request_id = %authorization.request_id,
                amount = authorization.amount,
                error = %refund_err,
                "Refund failed after terminal generation failure; ledger needs reconciliation"
            );
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderResponse;
    use crate::resize::{PartialResizePolicy, ResizeProvider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider that fails `failures` times, then succeeds; records prompts
    struct ScriptedProvider {
        failures: usize,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        respond_empty: bool,
    }

    impl ScriptedProvider {
        fn failing(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                respond_empty: false,
            }
        }

        fn always_empty() -> Self {
            Self {
                failures: usize::MAX,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                respond_empty: true,
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn generate(&self, request: &ProviderRequest) -> GenerationResult<ProviderResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            #[allow(clippy::unwrap_used)]
            self.prompts.lock().unwrap().push(request.prompt.clone());

            if call < self.failures {
                if self.respond_empty {
                    return Ok(ProviderResponse {
                        variants: Vec::new(),
                    });
                }
                return Err(GenerationError::Provider("upstream 503".to_string()));
            }

            Ok(ProviderResponse {
                variants: vec![CreativeConcept {
                    headline: "Fresh Bread Daily".to_string(),
                    body: "Baked before sunrise.".to_string(),
                    asset_url: "https://cdn.test/master.png".to_string(),
                }],
            })
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl GenerationProvider for SlowProvider {
        async fn generate(&self, _request: &ProviderRequest) -> GenerationResult<ProviderResponse> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(ProviderResponse {
                variants: Vec::new(),
            })
        }
    }

    struct OkResize;

    #[async_trait]
    impl ResizeProvider for OkResize {
        async fn resize(
            &self,
            source_asset_url: &str,
            width: u32,
            height: u32,
        ) -> GenerationResult<String> {
            Ok(format!("{}?w={}&h={}", source_asset_url, width, height))
        }
    }

    fn test_context() -> BusinessContext {
        BusinessContext {
            business_name: "Acme Bakery".to_string(),
            industry: Some("food".to_string()),
            audience: Some("commuters".to_string()),
            campaign_parameters: serde_json::json!({}),
        }
    }

    /// Gate over a lazy pool: safe to construct, errors only if actually used
    fn detached_orchestrator(
        provider: Arc<dyn GenerationProvider>,
        config: OrchestratorConfig,
    ) -> GenerationOrchestrator {
        #[allow(clippy::unwrap_used)]
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        GenerationOrchestrator::new(
            CreditGate::new(pool),
            provider,
            Resizer::new(Arc::new(OkResize), PartialResizePolicy::AcceptPartial),
            config,
        )
    }

    #[tokio::test]
    async fn test_retries_until_success_with_distinct_prompts() {
        let provider = Arc::new(ScriptedProvider::failing(2));
        let orchestrator = detached_orchestrator(
            Arc::clone(&provider) as Arc<dyn GenerationProvider>,
            OrchestratorConfig::default(),
        );

        let sanitized = "artisan sourdough bread subscription".to_string();
        #[allow(clippy::unwrap_used)]
        let (creative, attempts) = orchestrator
            .attempt_with_retries(&sanitized, &test_context(), Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(creative.asset_url, "https://cdn.test/master.png");

        // Each failed attempt reframed the prompt: no prompt repeats
        #[allow(clippy::unwrap_used)]
        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        let unique: std::collections::HashSet<_> = prompts.iter().collect();
        assert_eq!(unique.len(), 3);
        assert_eq!(prompts[0], sanitized);
    }

    #[tokio::test]
    async fn test_empty_variants_is_retried_then_exhausted() {
        let provider = Arc::new(ScriptedProvider::always_empty());
        let orchestrator = detached_orchestrator(
            Arc::clone(&provider) as Arc<dyn GenerationProvider>,
            OrchestratorConfig {
                max_attempts: 3,
                ..OrchestratorConfig::default()
            },
        );

        let result = orchestrator
            .attempt_with_retries(
                "artisan sourdough bread subscription",
                &test_context(),
                Uuid::new_v4(),
            )
            .await;

        match result {
            Err(GenerationError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("no variants"));
            }
            other => panic!("Expected exhaustion, got {:?}", other.map(|_| ())),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let orchestrator = detached_orchestrator(
            Arc::new(SlowProvider),
            OrchestratorConfig {
                max_attempts: 2,
                attempt_timeout: Duration::from_millis(20),
                ..OrchestratorConfig::default()
            },
        );

        let result = orchestrator
            .attempt_with_retries(
                "artisan sourdough bread subscription",
                &test_context(),
                Uuid::new_v4(),
            )
            .await;

        match result {
            Err(GenerationError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("Expected exhaustion, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_prompt_precondition_checked_before_any_debit() {
        let provider = Arc::new(ScriptedProvider::failing(0));
        let orchestrator = detached_orchestrator(
            Arc::clone(&provider) as Arc<dyn GenerationProvider>,
            OrchestratorConfig::default(),
        );

        // The lazy pool would surface a connection error if the gate were reached
        let result = orchestrator
            .generate(Uuid::new_v4(), "tiny", test_context())
            .await;

        assert!(matches!(
            result,
            Err(GenerationError::PromptTooShort { .. })
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
