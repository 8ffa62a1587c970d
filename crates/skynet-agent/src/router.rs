//! Multi-provider failover: per-request retries against the current model,
//! then advance to the next model in the fallback chain (DESIGN.md's
//! "Model-fallback vs. per-request retry composition" decision — the two
//! concepts are kept orthogonal rather than multiplying their bounds).

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::provider::{ChatRequest, ProviderError, StreamingProvider, TokenInfo};
use crate::stream::ProviderEvent;

/// One provider in the fallback chain, bounded by its own retry count.
pub struct ProviderSlot {
    pub provider: Box<dyn StreamingProvider>,
    pub max_retries: u32,
}

impl ProviderSlot {
    pub fn new(provider: Box<dyn StreamingProvider>, max_retries: u32) -> Self {
        Self { provider, max_retries }
    }
}

/// Tries providers in priority order (index 0 first). Each provider gets its
/// own bounded retry budget before the router moves to the next.
pub struct ProviderRouter {
    slots: Vec<ProviderSlot>,
}

impl ProviderRouter {
    /// At least one slot is required.
    pub fn new(slots: Vec<ProviderSlot>) -> Self {
        assert!(!slots.is_empty(), "ProviderRouter requires at least one provider slot");
        Self { slots }
    }
}

#[async_trait]
impl StreamingProvider for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<ProviderEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            let provider_name = slot.provider.name();

            for attempt in 0..=slot.max_retries {
                if cancel.is_cancelled() {
                    return Err(ProviderError::Cancelled);
                }

                match slot.provider.stream(req, tx.clone(), cancel.clone()).await {
                    Ok(()) => {
                        if attempt > 0 {
                            info!(provider = %provider_name, attempt, "request succeeded after retry");
                        }
                        return Ok(());
                    }
                    Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled),
                    Err(e) => {
                        warn!(provider = %provider_name, attempt, err = %e, "provider stream failed");

                        // RateLimited is not retriable — skip remaining retries for this provider.
                        if matches!(e, ProviderError::RateLimited { .. }) {
                            last_err = Some(e);
                            break;
                        }

                        last_err = Some(e);
                        if attempt < slot.max_retries {
                            tokio::time::sleep(tokio::time::Duration::from_millis(200 * (attempt as u64 + 1))).await;
                        }
                    }
                }
            }

            info!(provider = %provider_name, "provider exhausted, trying next provider");
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all providers failed".to_string())))
    }

    fn token_info(&self) -> Option<TokenInfo> {
        self.slots.first().and_then(|s| s.provider.token_info())
    }

    async fn refresh_auth(&self) -> Result<(), ProviderError> {
        for slot in &self.slots {
            slot.provider.refresh_auth().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;

    #[tokio::test]
    async fn falls_back_to_next_provider_on_failure() {
        struct AlwaysFail;
        #[async_trait]
        impl StreamingProvider for AlwaysFail {
            fn name(&self) -> &str {
                "always-fail"
            }
            async fn stream(
                &self,
                _req: &ChatRequest,
                _tx: mpsc::Sender<ProviderEvent>,
                _cancel: CancellationToken,
            ) -> Result<(), ProviderError> {
                Err(ProviderError::Unavailable("down".into()))
            }
        }

        let fallback = InMemoryProvider::new(vec![vec![ProviderEvent::Done {
            model: "fallback".into(),
            tokens_in: 1,
            tokens_out: 1,
            stop_reason: "end_turn".into(),
        }]]);

        let router = ProviderRouter::new(vec![
            ProviderSlot::new(Box::new(AlwaysFail), 1),
            ProviderSlot::new(Box::new(fallback), 0),
        ]);

        let req = ChatRequest {
            model: "test".into(),
            system: String::new(),
            system_prompt: None,
            messages: vec![],
            max_tokens: 10,
            thinking: None,
            tools: vec![],
            raw_messages: None,
        };
        let (tx, mut rx) = mpsc::channel(8);
        router.stream(&req, tx, CancellationToken::new()).await.unwrap();
        assert!(matches!(rx.recv().await, Some(ProviderEvent::Done { .. })));
    }

    #[tokio::test]
    async fn rate_limited_error_skips_remaining_retries() {
        struct AlwaysRateLimited;
        #[async_trait]
        impl StreamingProvider for AlwaysRateLimited {
            fn name(&self) -> &str {
                "rate-limited"
            }
            async fn stream(
                &self,
                _req: &ChatRequest,
                _tx: mpsc::Sender<ProviderEvent>,
                _cancel: CancellationToken,
            ) -> Result<(), ProviderError> {
                Err(ProviderError::RateLimited { retry_after_ms: 1000 })
            }
        }

        let router = ProviderRouter::new(vec![ProviderSlot::new(Box::new(AlwaysRateLimited), 5)]);
        let req = ChatRequest {
            model: "test".into(),
            system: String::new(),
            system_prompt: None,
            messages: vec![],
            max_tokens: 10,
            thinking: None,
            tools: vec![],
            raw_messages: None,
        };
        let (tx, _rx) = mpsc::channel(8);
        let result = router.stream(&req, tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
    }
}
