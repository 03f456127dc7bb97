//! Fetch executor over the application's render pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use edge_core::{PrerenderRequest, RenderedResponse};

use crate::retry::RetryPolicy;
use crate::timeout::TimeoutConfig;

/// Error type for fetch operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} for {path}")]
    Http { status: u16, path: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("render pipeline error: {0}")]
    Pipeline(String),
}

impl FetchError {
    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// The application's request pipeline.
///
/// Turns a path plus headers into a response. Any status is a valid response;
/// only transport or application faults are errors.
#[async_trait]
pub trait RenderPipeline: Send + Sync {
    /// Render one request.
    async fn render(&self, request: &PrerenderRequest) -> Result<RenderedResponse, FetchError>;
}

/// Fetch policy combining timeout and retry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Timeout configuration.
    pub timeout: TimeoutConfig,
    /// Retry policy.
    pub retry: RetryPolicy,
}

impl FetchPolicy {
    /// Create a new fetch policy.
    pub fn new(timeout: TimeoutConfig, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    /// Create a single-attempt policy with the given per-request bound.
    pub fn with_timeout(total: Duration) -> Self {
        Self {
            timeout: TimeoutConfig::from_total(total),
            retry: RetryPolicy::none(),
        }
    }
}

/// Issues bounded fetches against a render pipeline.
#[derive(Clone)]
pub struct FetchExecutor {
    pipeline: Arc<dyn RenderPipeline>,
    policy: FetchPolicy,
}

impl FetchExecutor {
    /// Create an executor with the default policy.
    pub fn new(pipeline: Arc<dyn RenderPipeline>) -> Self {
        Self {
            pipeline,
            policy: FetchPolicy::default(),
        }
    }

    /// Set the fetch policy.
    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The active fetch policy.
    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetch one request.
    ///
    /// Each attempt is bounded by the total timeout. Retries only happen when
    /// the retry policy asks for them.
    pub async fn execute(
        &self,
        request: &PrerenderRequest,
    ) -> Result<RenderedResponse, FetchError> {
        let mut attempt = 0;

        loop {
            let result = self.attempt(request).await;

            let retry = match &result {
                Ok(resp) => self.policy.retry.should_retry_status(resp.status, attempt),
                Err(FetchError::Timeout(_)) => self.policy.retry.should_retry_timeout(attempt),
                Err(FetchError::Connection(_)) => {
                    self.policy.retry.should_retry_connection(attempt)
                }
                Err(_) => false,
            };

            if !retry {
                return result;
            }

            let delay = self.policy.retry.backoff.delay_for_attempt(attempt);
            tracing::debug!(
                path = request.path(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying prerender fetch"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, request: &PrerenderRequest) -> Result<RenderedResponse, FetchError> {
        let total = self.policy.timeout.total;
        match tokio::time::timeout(total, self.pipeline.render(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(total)),
        }
    }
}

impl std::fmt::Debug for FetchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::retry::BackoffStrategy;

    /// Returns scripted results in order, then repeats the last one.
    struct Scripted {
        results: Mutex<Vec<Result<RenderedResponse, FetchError>>>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl Scripted {
        fn new(results: Vec<Result<RenderedResponse, FetchError>>) -> Self {
            Self {
                results: Mutex::new(results),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(vec![Ok(RenderedResponse::ok("late"))])
            }
        }
    }

    #[async_trait]
    impl RenderPipeline for Scripted {
        async fn render(&self, _request: &PrerenderRequest) -> Result<RenderedResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.remove(0)
            } else {
                results[0].clone()
            }
        }
    }

    fn root() -> PrerenderRequest {
        PrerenderRequest::new("/").unwrap()
    }

    #[tokio::test]
    async fn test_passes_through_response() {
        let pipeline = Arc::new(Scripted::new(vec![Ok(RenderedResponse::new(404, "missing"))]));
        let executor = FetchExecutor::new(pipeline.clone());

        let resp = executor.execute(&root()).await.unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let pipeline = Arc::new(Scripted::slow(Duration::from_secs(60)));
        let executor = FetchExecutor::new(pipeline)
            .with_policy(FetchPolicy::with_timeout(Duration::from_secs(5)));

        let err = executor.execute(&root()).await.unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_secs(5)));
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_by_default() {
        let pipeline = Arc::new(Scripted::new(vec![
            Err(FetchError::Connection("refused".to_string())),
            Ok(RenderedResponse::ok("ok")),
        ]));
        let executor = FetchExecutor::new(pipeline.clone());

        assert!(executor.execute(&root()).await.is_err());
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_configured() {
        let pipeline = Arc::new(Scripted::new(vec![
            Ok(RenderedResponse::new(503, "busy")),
            Err(FetchError::Connection("reset".to_string())),
            Ok(RenderedResponse::ok("ok")),
        ]));
        let policy = FetchPolicy::new(
            TimeoutConfig::default(),
            RetryPolicy::new(2).with_backoff(BackoffStrategy::Fixed(Duration::from_millis(10))),
        );
        let executor = FetchExecutor::new(pipeline.clone()).with_policy(policy);

        let resp = executor.execute(&root()).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_errors_not_retried() {
        let pipeline = Arc::new(Scripted::new(vec![
            Err(FetchError::Pipeline("panic in handler".to_string())),
            Ok(RenderedResponse::ok("ok")),
        ]));
        let policy = FetchPolicy::new(TimeoutConfig::default(), RetryPolicy::new(3));
        let executor = FetchExecutor::new(pipeline.clone()).with_policy(policy);

        assert!(matches!(
            executor.execute(&root()).await,
            Err(FetchError::Pipeline(_))
        ));
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }
}
