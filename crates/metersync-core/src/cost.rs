//! Query cost telemetry and pacing math.
//!
//! The remote API meters every query against a leaky bucket shared across
//! all callers. Each response reports the requested and realized cost plus
//! the bucket state, and the executor uses that telemetry to pace itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Leaky-bucket throttle state reported alongside each response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleStatus {
    /// Bucket capacity in cost points.
    pub maximum_available: f64,
    /// Points currently available.
    pub currently_available: f64,
    /// Points restored per second.
    pub restore_rate: f64,
}

impl ThrottleStatus {
    /// Time until the bucket is fully restored.
    ///
    /// Deliberately conservative: waiting for the whole deficit rather than
    /// just the triggering cost resynchronizes with concurrent callers
    /// draining the same bucket.
    #[must_use]
    pub fn full_restore_delay(&self) -> Duration {
        if self.restore_rate <= 0.0 {
            return Duration::ZERO;
        }
        let deficit = (self.maximum_available - self.currently_available).max(0.0);
        Duration::from_secs_f64(deficit / self.restore_rate)
    }
}

/// Cost telemetry for one request, parsed from the response `extensions.cost`
/// object.
///
/// `actual_query_cost` is at most `requested_query_cost` when present; the
/// API refunds the difference after executing the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCost {
    /// Cost estimated before execution.
    pub requested_query_cost: f64,
    /// Cost realized after execution. Absent on throttled responses.
    #[serde(default)]
    pub actual_query_cost: Option<f64>,
    /// Bucket state after this request.
    pub throttle_status: ThrottleStatus,
}

impl RequestCost {
    /// Delay that repays the realized cost before the next request is issued.
    #[must_use]
    pub fn repayment_delay(&self) -> Duration {
        match self.actual_query_cost {
            Some(actual) if actual > 0.0 && self.throttle_status.restore_rate > 0.0 => {
                Duration::from_secs_f64(actual / self.throttle_status.restore_rate)
            }
            _ => Duration::ZERO,
        }
    }
}
