//! Retry policies decide, from a received response, whether a request
//! should be retried and after how long.
//!
//! The orchestrator only calls [`RetryPolicy::evaluate`]; swap the policy
//! with [`RetryOrchestrator::set_retry_policy`](crate::RetryOrchestrator::set_retry_policy).

use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::ProductResponse;

/// New counters for a retry that should be scheduled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryDecision {
    pub remaining_retries: u32,
    pub retry_delay_millis: u64,
}

impl RetryDecision {
    pub fn new(remaining_retries: u32, retry_delay_millis: u64) -> Self {
        Self {
            remaining_retries,
            retry_delay_millis,
        }
    }
}

/// Settings read by [`DefaultRetryPolicy`] from a chain's policy options.
///
/// Missing keys take their defaults and unknown keys are ignored, so the
/// same options object can carry settings for other policies too.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitOptions {
    /// Status codes treated as rate limited.
    pub retry_statuses: Vec<u16>,
    /// Delay of the first retry when the response gives no hint.
    pub initial_retry_delay_millis: u64,
    /// Growth factor applied to the previous delay.
    pub backoff_multiplier: f64,
    /// Upper bound for any computed delay.
    pub max_retry_delay_millis: u64,
    /// Use the `Retry-After` header (delta-seconds) when present.
    pub honor_retry_after: bool,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            retry_statuses: vec![429],
            initial_retry_delay_millis: 5_000,
            backoff_multiplier: 2.0,
            max_retry_delay_millis: 60_000,
            honor_retry_after: true,
        }
    }
}

impl RateLimitOptions {
    /// Reads the settings out of an options object. `null` yields defaults.
    pub fn from_value(value: &JsonValue) -> serde_json::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(value)
    }
}

impl From<RateLimitOptions> for JsonValue {
    fn from(options: RateLimitOptions) -> Self {
        json!({
            "retryStatuses": options.retry_statuses,
            "initialRetryDelayMillis": options.initial_retry_delay_millis,
            "backoffMultiplier": options.backoff_multiplier,
            "maxRetryDelayMillis": options.max_retry_delay_millis,
            "honorRetryAfter": options.honor_retry_after,
        })
    }
}

/// Decides whether a received response warrants another attempt.
pub trait RetryPolicy: Send + Sync {
    /// Returns `None` when `response` is final, or the counters for the next
    /// attempt.
    ///
    /// `options` is the chain's policy options exactly as the caller
    /// supplied them; each policy interprets them itself.
    fn evaluate(
        &self,
        remaining_retries: u32,
        retry_delay_millis: u64,
        options: &JsonValue,
        response: &ProductResponse,
    ) -> Option<RetryDecision>;
}

/// Retries rate-limited responses with capped exponential backoff.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRetryPolicy;

impl DefaultRetryPolicy {
    fn next_delay(
        &self,
        last_delay_millis: u64,
        options: &RateLimitOptions,
        response: &ProductResponse,
    ) -> u64 {
        let hinted = options
            .honor_retry_after
            .then(|| retry_after_millis(response))
            .flatten();

        let delay = hinted.unwrap_or_else(|| {
            if last_delay_millis == 0 {
                options.initial_retry_delay_millis
            } else {
                let grown = last_delay_millis as f64 * options.backoff_multiplier.max(1.0);
                if grown >= u64::MAX as f64 {
                    u64::MAX
                } else {
                    grown.round() as u64
                }
            }
        });

        delay.min(options.max_retry_delay_millis)
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn evaluate(
        &self,
        remaining_retries: u32,
        retry_delay_millis: u64,
        options: &JsonValue,
        response: &ProductResponse,
    ) -> Option<RetryDecision> {
        if remaining_retries == 0 {
            return None;
        }

        let options = match RateLimitOptions::from_value(options) {
            Ok(options) => options,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "unreadable rate limit options, using defaults");
                RateLimitOptions::default()
            }
        };
        if !options.retry_statuses.contains(&response.status.as_u16()) {
            return None;
        }

        let delay = self.next_delay(retry_delay_millis, &options, response);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            status = response.status.as_u16(),
            remaining_retries,
            delay_ms = delay,
            "rate limited response, retry warranted"
        );

        Some(RetryDecision::new(remaining_retries - 1, delay))
    }
}

/// Forces a retry for every response until the budget is spent, then
/// defers to a baseline policy. Useful for exercising multi-hop chains.
#[derive(Clone, Debug, Default)]
pub struct ForcedRetryPolicy<P = DefaultRetryPolicy> {
    baseline: P,
}

impl ForcedRetryPolicy<DefaultRetryPolicy> {
    pub fn new() -> Self {
        Self {
            baseline: DefaultRetryPolicy,
        }
    }
}

impl<P: RetryPolicy> ForcedRetryPolicy<P> {
    pub fn with_baseline(baseline: P) -> Self {
        Self { baseline }
    }
}

impl<P: RetryPolicy> RetryPolicy for ForcedRetryPolicy<P> {
    fn evaluate(
        &self,
        remaining_retries: u32,
        retry_delay_millis: u64,
        options: &JsonValue,
        response: &ProductResponse,
    ) -> Option<RetryDecision> {
        if remaining_retries > 0 {
            #[cfg(feature = "tracing")]
            tracing::debug!(remaining_retries, "forcing a retry");

            return Some(RetryDecision::new(
                remaining_retries - 1,
                retry_delay_millis.saturating_add(1_000),
            ));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("retry budget spent, delegating to baseline policy");

        self.baseline.evaluate(remaining_retries, retry_delay_millis, options, response)
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after_millis(response: &ProductResponse) -> Option<u64> {
    let value = response.headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds = value.trim().parse::<u64>().ok()?;
    Some(seconds.saturating_mul(1_000))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::{json, Value as JsonValue};

    use super::{
        DefaultRetryPolicy, ForcedRetryPolicy, RateLimitOptions, RetryDecision, RetryPolicy,
    };
    use crate::ProductResponse;

    fn rate_limited() -> ProductResponse {
        ProductResponse::new(StatusCode::TOO_MANY_REQUESTS, "")
    }

    fn options(options: RateLimitOptions) -> JsonValue {
        options.into()
    }

    #[test]
    fn default_ignores_non_rate_limited_statuses() {
        let policy = DefaultRetryPolicy;
        let options = json!({});
        for status in [
            StatusCode::OK,
            StatusCode::NOT_FOUND,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let response = ProductResponse::new(status, "");
            assert_eq!(policy.evaluate(3, 0, &options, &response), None);
        }
    }

    #[test]
    fn default_stops_when_budget_is_spent() {
        let decision = DefaultRetryPolicy.evaluate(0, 5_000, &json!({}), &rate_limited());
        assert_eq!(decision, None);
    }

    #[test]
    fn default_backs_off_exponentially_up_to_cap() {
        let policy = DefaultRetryPolicy;
        let options = json!({ "maxRetryDelayMillis": 15_000 });

        assert_eq!(
            policy.evaluate(3, 0, &options, &rate_limited()),
            Some(RetryDecision::new(2, 5_000))
        );
        assert_eq!(
            policy.evaluate(2, 5_000, &options, &rate_limited()),
            Some(RetryDecision::new(1, 10_000))
        );
        assert_eq!(
            policy.evaluate(1, 10_000, &options, &rate_limited()),
            Some(RetryDecision::new(0, 15_000))
        );
    }

    #[test]
    fn default_prefers_retry_after_header() {
        let response = rate_limited().with_header("Retry-After", "12");
        assert_eq!(
            DefaultRetryPolicy.evaluate(4, 2_000, &JsonValue::Null, &response),
            Some(RetryDecision::new(3, 12_000))
        );

        let ignore_header = options(RateLimitOptions {
            honor_retry_after: false,
            ..RateLimitOptions::default()
        });
        assert_eq!(
            DefaultRetryPolicy.evaluate(4, 2_000, &ignore_header, &response),
            Some(RetryDecision::new(3, 4_000))
        );
    }

    #[test]
    fn default_falls_back_to_backoff_for_http_date_retry_after() {
        let response = rate_limited().with_header("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(
            DefaultRetryPolicy.evaluate(2, 0, &json!({}), &response),
            Some(RetryDecision::new(1, 5_000))
        );
    }

    #[test]
    fn default_respects_custom_statuses() {
        let options = json!({ "retryStatuses": [429, 503] });
        let response = ProductResponse::new(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(DefaultRetryPolicy.evaluate(1, 0, &options, &response).is_some());
    }

    #[test]
    fn default_ignores_keys_meant_for_other_policies() {
        let options = json!({ "maxRetries": 4, "customKey": "x", "initialRetryDelayMillis": 750 });
        assert_eq!(
            DefaultRetryPolicy.evaluate(1, 0, &options, &rate_limited()),
            Some(RetryDecision::new(0, 750))
        );
    }

    #[test]
    fn default_uses_defaults_for_unreadable_options() {
        let options = json!({ "retryStatuses": "all of them" });
        assert_eq!(
            DefaultRetryPolicy.evaluate(1, 0, &options, &rate_limited()),
            Some(RetryDecision::new(0, 5_000))
        );
    }

    #[test]
    fn forced_retries_successful_responses_until_budget_is_spent() {
        let policy = ForcedRetryPolicy::new();
        let options = json!({});
        let ok = ProductResponse::new(StatusCode::OK, "{}");

        assert_eq!(
            policy.evaluate(2, 0, &options, &ok),
            Some(RetryDecision::new(1, 1_000))
        );
        assert_eq!(
            policy.evaluate(1, 1_000, &options, &ok),
            Some(RetryDecision::new(0, 2_000))
        );
        assert_eq!(policy.evaluate(0, 2_000, &options, &ok), None);
    }

    #[test]
    fn options_convert_to_and_from_json() {
        let custom = RateLimitOptions {
            retry_statuses: vec![429, 503],
            backoff_multiplier: 1.5,
            ..RateLimitOptions::default()
        };
        let value: JsonValue = custom.clone().into();
        assert_eq!(value["backoffMultiplier"], json!(1.5));
        assert_eq!(RateLimitOptions::from_value(&value).unwrap(), custom);
        assert_eq!(
            RateLimitOptions::from_value(&JsonValue::Null).unwrap(),
            RateLimitOptions::default()
        );
    }
}
