//! Cost-budgeted request executor.
//!
//! Issues one logical request against the metered API and absorbs every
//! retryable failure internally: throttled responses are waited out,
//! too-expensive queries are retried with a smaller batch size, and clean
//! successes repay their realized cost before returning. Only terminal
//! failures and an exhausted retry budget propagate to the caller.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cost::RequestCost;
use crate::error::{
    classify_protocol_errors, collect_user_errors, GraphqlError, RetryableError, SyncError,
};
use crate::transport::Transport;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retry ceiling. A request is abandoned once its retry count exceeds
    /// this value.
    pub max_retries: u32,
    /// Batch size used by callers that have no better hint.
    pub default_batch_size: u32,
    /// Upper clamp for adaptive batch resizing.
    pub max_batch_size: u32,
    /// Lower clamp for adaptive batch resizing.
    pub min_batch_size: u32,
    /// Safety factor applied when shrinking after a cost rejection.
    pub shrink_factor: f64,
    /// Name of the variables field holding the batch size, by convention.
    pub batch_size_variable: String,
    /// Cap on any single throttle or repayment wait. Bounds pathological
    /// telemetry: a wait derived from cost figures larger than this repays
    /// only up to the cap.
    pub max_single_wait: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            default_batch_size: 100,
            max_batch_size: 250,
            min_batch_size: 1,
            shrink_factor: 0.75,
            batch_size_variable: "first".to_string(),
            max_single_wait: Duration::from_secs(120),
        }
    }
}

impl ExecutorConfig {
    /// Set the retry ceiling.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the default batch size.
    #[must_use]
    pub const fn with_default_batch_size(mut self, size: u32) -> Self {
        self.default_batch_size = size;
        self
    }

    /// Set the maximum batch size.
    #[must_use]
    pub const fn with_max_batch_size(mut self, size: u32) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set the batch size variable name.
    #[must_use]
    pub fn with_batch_size_variable(mut self, name: impl Into<String>) -> Self {
        self.batch_size_variable = name.into();
        self
    }

    /// Set the cap on a single wait.
    #[must_use]
    pub const fn with_max_single_wait(mut self, wait: Duration) -> Self {
        self.max_single_wait = wait;
        self
    }

    /// Batch size to retry with after a cost rejection:
    /// `clamp(min, max, floor(max_cost / cost * current * shrink_factor))`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    pub fn resized_batch_size(&self, current: u64, cost: f64, max_cost: f64) -> u32 {
        if cost <= 0.0 {
            return self.min_batch_size.max(1);
        }
        let scaled = (max_cost / cost * current as f64 * self.shrink_factor).floor();
        let floor = f64::from(self.min_batch_size.max(1));
        let ceiling = f64::from(self.max_batch_size);
        scaled.clamp(floor, ceiling) as u32
    }
}

/// Parameters for one logical request.
///
/// Immutable per attempt: adaptation goes through [`Self::retried`] and
/// [`Self::with_batch_size`], which return new copies.
#[derive(Debug, Clone)]
pub struct RequestParameters {
    /// GraphQL document text.
    pub document: String,
    /// Variables object. May contain a batch-size field by convention.
    pub variables: Map<String, Value>,
    /// Retry count for this logical request, starting at zero.
    pub retry_count: u32,
}

impl RequestParameters {
    /// Create parameters for a fresh request.
    #[must_use]
    pub fn new(document: impl Into<String>, variables: Map<String, Value>) -> Self {
        Self {
            document: document.into(),
            variables,
            retry_count: 0,
        }
    }

    /// Current value of the batch-size variable, when exposed.
    #[must_use]
    pub fn batch_size(&self, variable: &str) -> Option<u64> {
        self.variables.get(variable)?.as_u64()
    }

    /// Copy with the retry count incremented and variables unchanged.
    #[must_use]
    pub fn retried(&self) -> Self {
        Self {
            document: self.document.clone(),
            variables: self.variables.clone(),
            retry_count: self.retry_count + 1,
        }
    }

    /// Copy with the batch-size variable replaced.
    #[must_use]
    pub fn with_batch_size(&self, variable: &str, size: u32) -> Self {
        let mut variables = self.variables.clone();
        variables.insert(variable.to_string(), Value::from(size));
        Self {
            document: self.document.clone(),
            variables,
            retry_count: self.retry_count,
        }
    }
}

/// Successful execution result: the response data plus cost telemetry.
#[derive(Debug, Clone)]
pub struct ExecutionSuccess {
    /// The response `data` object.
    pub data: Value,
    /// Cost telemetry, when reported.
    pub cost: Option<RequestCost>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
    #[serde(default)]
    extensions: Option<ResponseExtensions>,
}

#[derive(Debug, Deserialize)]
struct ResponseExtensions {
    #[serde(default)]
    cost: Option<RequestCost>,
}

/// Cost-budgeted request executor.
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    config: ExecutorConfig,
}

impl Executor {
    /// Create an executor with default configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ExecutorConfig::default())
    }

    /// Create an executor with custom configuration.
    #[must_use]
    pub const fn with_config(transport: Arc<dyn Transport>, config: ExecutorConfig) -> Self {
        Self { transport, config }
    }

    /// Executor configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one logical request, absorbing retryable failures.
    ///
    /// Retries are strictly sequential. Parallel retries would double-spend
    /// the cost bucket shared with every other caller of the API.
    pub async fn execute(&self, params: RequestParameters) -> Result<ExecutionSuccess, SyncError> {
        let mut params = params;
        loop {
            if params.retry_count > self.config.max_retries {
                return Err(SyncError::RetryBudgetExceeded {
                    attempts: params.retry_count,
                });
            }

            let variables = Value::Object(params.variables.clone());
            let response = self.transport.send(&params.document, &variables).await?;
            let envelope: ResponseEnvelope = serde_json::from_slice(&response.body)?;

            let user_errors = collect_user_errors(envelope.data.as_ref());
            if !user_errors.is_empty() {
                return Err(SyncError::UserErrors {
                    messages: user_errors,
                });
            }

            let cost = envelope.extensions.and_then(|extensions| extensions.cost);

            if !envelope.errors.is_empty() {
                let classified = classify_protocol_errors(&envelope.errors, cost.as_ref());
                match classified.retryable() {
                    Some(RetryableError::MaxCostExceeded { cost, max_cost }) => {
                        let variable = &self.config.batch_size_variable;
                        let Some(current) = params.batch_size(variable) else {
                            return Err(SyncError::Protocol {
                                message: format!(
                                    "query cost {cost} exceeds maximum {max_cost} and variables \
                                     expose no '{variable}' field to shrink"
                                ),
                            });
                        };
                        let new_size = self.config.resized_batch_size(current, cost, max_cost);
                        debug!(
                            cost,
                            max_cost,
                            current,
                            new_size,
                            retry_count = params.retry_count,
                            "query cost exceeded maximum; shrinking batch size"
                        );
                        params = params.with_batch_size(variable, new_size).retried();
                    }
                    Some(RetryableError::Throttled { cost }) => {
                        if response.from_cache {
                            debug!("throttled response served from cache; retrying without wait");
                        } else {
                            let delay = cost
                                .map(|cost| cost.throttle_status.full_restore_delay())
                                .unwrap_or(Duration::ZERO)
                                .min(self.config.max_single_wait);
                            if !delay.is_zero() {
                                debug!(
                                    ?delay,
                                    retry_count = params.retry_count,
                                    "throttled; waiting for bucket restoration"
                                );
                                sleep(delay).await;
                            }
                        }
                        params = params.retried();
                    }
                    None => {
                        let message = classified.unrecognized.join("; ");
                        warn!(%message, "unhandled GraphQL errors");
                        return Err(SyncError::Protocol { message });
                    }
                }
                continue;
            }

            if !response.from_cache {
                if let Some(cost) = &cost {
                    // Proactive repayment so the next query does not start
                    // from a drained bucket.
                    let delay = cost.repayment_delay().min(self.config.max_single_wait);
                    if !delay.is_zero() {
                        debug!(?delay, "repaying realized query cost");
                        sleep(delay).await;
                    }
                }
            }

            return Ok(ExecutionSuccess {
                data: envelope.data.unwrap_or(Value::Null),
                cost,
            });
        }
    }
}
