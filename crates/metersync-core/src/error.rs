//! Error taxonomy and response error classification.
//!
//! Errors split into terminal kinds (user errors, protocol violations,
//! exhausted retry budget) that propagate to the caller, and retryable kinds
//! (throttled, max cost exceeded) that the executor absorbs internally.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::cost::RequestCost;

/// Discriminant code for throttled responses.
pub const THROTTLED_CODE: &str = "THROTTLED";

/// Discriminant code for queries whose declared cost exceeds the maximum.
pub const MAX_COST_EXCEEDED_CODE: &str = "MAX_COST_EXCEEDED";

/// HTTP error information captured from reqwest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorInfo {
    /// Error message.
    pub message: String,
    /// HTTP status code (if available).
    pub status_code: Option<u16>,
    /// Whether the error was a timeout.
    pub is_timeout: bool,
    /// Whether the error was a connection failure.
    pub is_connect: bool,
}

impl From<reqwest::Error> for HttpErrorInfo {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status_code: err.status().map(|status| status.as_u16()),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
        }
    }
}

/// GraphQL error location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    /// Line number in the query (1-based).
    pub line: u32,
    /// Column number in the query (1-based).
    pub column: u32,
}

/// GraphQL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    /// Field name.
    Key(String),
    /// Array index.
    Index(i64),
}

/// GraphQL error returned in the top-level `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Location(s) within the query.
    #[serde(default)]
    pub locations: Vec<GraphqlErrorLocation>,
    /// Path within the response where the error occurred.
    #[serde(default)]
    pub path: Vec<GraphqlPathSegment>,
    /// Extensions metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphqlError {
    /// Discriminant code from `extensions.code`, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }

    fn extension_number(&self, key: &str) -> Option<f64> {
        self.extensions.as_ref()?.get(key)?.as_f64()
    }
}

/// Protocol error the executor recovers from without involving the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryableError {
    /// The shared cost bucket is exhausted; recovered by waiting.
    Throttled {
        /// Cost telemetry from the throttled response, when present.
        cost: Option<RequestCost>,
    },
    /// The query's declared cost exceeds the per-query maximum; recovered by
    /// shrinking the batch size.
    MaxCostExceeded {
        /// Declared cost of the rejected query.
        cost: f64,
        /// Maximum cost a single query may declare.
        max_cost: f64,
    },
}

/// Result of classifying a response's top-level error list.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedErrors {
    /// At most one throttled error (first match wins).
    pub throttled: Option<RetryableError>,
    /// At most one max-cost error (first match wins).
    pub max_cost_exceeded: Option<RetryableError>,
    /// Messages from errors with no recognized discriminant.
    pub unrecognized: Vec<String>,
}

impl ClassifiedErrors {
    /// The retryable error to act on. Cost shrink takes precedence over
    /// waiting out the throttle, since a too-expensive query would be
    /// rejected again regardless of bucket state.
    #[must_use]
    pub fn retryable(&self) -> Option<RetryableError> {
        self.max_cost_exceeded
            .clone()
            .or_else(|| self.throttled.clone())
    }
}

/// Classify a response's top-level errors by discriminant code.
///
/// Pure and side-effect-free. `cost` is the response-level telemetry, which
/// throttled errors carry forward so the executor can compute the wait.
#[must_use]
pub fn classify_protocol_errors(
    errors: &[GraphqlError],
    cost: Option<&RequestCost>,
) -> ClassifiedErrors {
    let mut classified = ClassifiedErrors::default();
    for error in errors {
        match error.code() {
            Some(THROTTLED_CODE) if classified.throttled.is_none() => {
                classified.throttled = Some(RetryableError::Throttled {
                    cost: cost.cloned(),
                });
            }
            Some(MAX_COST_EXCEEDED_CODE) if classified.max_cost_exceeded.is_none() => {
                match (
                    error.extension_number("cost"),
                    error.extension_number("maxCost"),
                ) {
                    (Some(cost), Some(max_cost)) => {
                        classified.max_cost_exceeded =
                            Some(RetryableError::MaxCostExceeded { cost, max_cost });
                    }
                    // Without the cost figures there is nothing to resize by.
                    _ => classified.unrecognized.push(error.message.clone()),
                }
            }
            Some(THROTTLED_CODE | MAX_COST_EXCEEDED_CODE) => {}
            _ => classified.unrecognized.push(error.message.clone()),
        }
    }
    classified
}

/// Collect field-level user errors from every top-level key of the data
/// object. Messages are deduplicated, preserving first-seen order.
#[must_use]
pub fn collect_user_errors(data: Option<&Value>) -> Vec<String> {
    let mut messages: Vec<String> = Vec::new();
    let Some(Value::Object(fields)) = data else {
        return messages;
    };
    for value in fields.values() {
        let Some(user_errors) = value.get("userErrors").and_then(Value::as_array) else {
            continue;
        };
        for entry in user_errors {
            let Some(message) = entry.get("message").and_then(Value::as_str) else {
                continue;
            };
            if !messages.iter().any(|seen| seen == message) {
                messages.push(message.to_string());
            }
        }
    }
    messages
}

fn bulleted(messages: &[String]) -> String {
    messages
        .iter()
        .map(|message| format!("- {message}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Error type for sync operations.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// HTTP/network error.
    #[error("HTTP error: {0:?}")]
    Http(HttpErrorInfo),

    /// HTTP response status error.
    #[error("HTTP status {status} with body: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: StatusCode,
        /// Response body (truncated if needed).
        body: String,
    },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Field-level user errors. Terminal; shown verbatim, never retried.
    #[error("user errors:\n{}", bulleted(.messages))]
    UserErrors {
        /// Deduplicated error messages.
        messages: Vec<String>,
    },

    /// Unrecognized error shape or protocol violation. Terminal.
    #[error("GraphQL protocol error: {message}")]
    Protocol {
        /// Details.
        message: String,
    },

    /// Retry ceiling crossed. Never swallowed.
    #[error("max retries exceeded after {attempts} attempts")]
    RetryBudgetExceeded {
        /// Retry count at the point of failure.
        attempts: u32,
    },
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(HttpErrorInfo::from(err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::ThrottleStatus;

    fn throttled_error() -> GraphqlError {
        GraphqlError {
            message: "Throttled".to_string(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: Some(serde_json::json!({"code": "THROTTLED"})),
        }
    }

    fn max_cost_error(cost: f64, max_cost: f64) -> GraphqlError {
        GraphqlError {
            message: "Query cost exceeds the maximum".to_string(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: Some(serde_json::json!({
                "code": "MAX_COST_EXCEEDED",
                "cost": cost,
                "maxCost": max_cost,
            })),
        }
    }

    fn telemetry() -> RequestCost {
        RequestCost {
            requested_query_cost: 100.0,
            actual_query_cost: None,
            throttle_status: ThrottleStatus {
                maximum_available: 1000.0,
                currently_available: 50.0,
                restore_rate: 50.0,
            },
        }
    }

    #[test]
    fn classifies_throttled_with_telemetry() {
        let cost = telemetry();
        let classified = classify_protocol_errors(&[throttled_error()], Some(&cost));
        match classified.retryable() {
            Some(RetryableError::Throttled { cost: Some(carried) }) => {
                assert_eq!(carried, cost);
            }
            other => panic!("unexpected classification: {other:?}"),
        }
        assert!(classified.unrecognized.is_empty());
    }

    #[test]
    fn classifies_max_cost_exceeded() {
        let classified = classify_protocol_errors(&[max_cost_error(100.0, 40.0)], None);
        assert_eq!(
            classified.retryable(),
            Some(RetryableError::MaxCostExceeded {
                cost: 100.0,
                max_cost: 40.0
            })
        );
    }

    #[test]
    fn max_cost_takes_precedence_over_throttled() {
        let classified =
            classify_protocol_errors(&[throttled_error(), max_cost_error(100.0, 40.0)], None);
        assert!(matches!(
            classified.retryable(),
            Some(RetryableError::MaxCostExceeded { .. })
        ));
        assert!(classified.throttled.is_some());
    }

    #[test]
    fn duplicate_codes_first_match_wins() {
        let first = max_cost_error(100.0, 40.0);
        let second = max_cost_error(999.0, 1.0);
        let classified = classify_protocol_errors(&[first, second], None);
        assert_eq!(
            classified.max_cost_exceeded,
            Some(RetryableError::MaxCostExceeded {
                cost: 100.0,
                max_cost: 40.0
            })
        );
    }

    #[test]
    fn max_cost_without_figures_is_unrecognized() {
        let error = GraphqlError {
            message: "cost missing".to_string(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: Some(serde_json::json!({"code": "MAX_COST_EXCEEDED"})),
        };
        let classified = classify_protocol_errors(&[error], None);
        assert!(classified.retryable().is_none());
        assert_eq!(classified.unrecognized, vec!["cost missing".to_string()]);
    }

    #[test]
    fn unknown_codes_are_unrecognized() {
        let error = GraphqlError {
            message: "internal error".to_string(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        };
        let classified = classify_protocol_errors(&[error], None);
        assert!(classified.retryable().is_none());
        assert_eq!(classified.unrecognized, vec!["internal error".to_string()]);
    }

    #[test]
    fn collects_user_errors_across_keys() {
        // Keys are deliberately out of alphabetical order; messages must
        // come back in response order.
        let data = serde_json::json!({
            "productCreate": {
                "userErrors": [
                    {"field": ["title"], "message": "Title can't be blank"},
                    {"field": ["sku"], "message": "SKU already taken"},
                ]
            },
            "collectionUpdate": {
                "userErrors": [
                    {"field": ["sku"], "message": "SKU already taken"},
                ]
            },
            "plain": 42,
        });
        let messages = collect_user_errors(Some(&data));
        assert_eq!(
            messages,
            vec![
                "Title can't be blank".to_string(),
                "SKU already taken".to_string(),
            ]
        );
    }

    #[test]
    fn user_errors_render_as_bulleted_list() {
        let err = SyncError::UserErrors {
            messages: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(err.to_string(), "user errors:\n- first\n- second");
    }

    #[test]
    fn no_user_errors_without_data_object() {
        assert!(collect_user_errors(None).is_empty());
        assert!(collect_user_errors(Some(&serde_json::json!(null))).is_empty());
        assert!(collect_user_errors(Some(&serde_json::json!([1, 2]))).is_empty());
    }
}
