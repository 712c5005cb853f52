//! Prometheus metrics recorded per HTTP request
//!
//! Two metrics are registered, both partitioned by status code, method and
//! route template: a request counter and a latency histogram.

use std::time::Duration;

use http::{Method, StatusCode};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Counter of processed requests.
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Histogram of request processing time, in seconds.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Label names shared by both metrics, in order.
pub const LABEL_NAMES: [&str; 3] = ["code", "method", "path"];

/// Histogram buckets used when none are configured.
pub const DEFAULT_BUCKETS: [f64; 4] = [0.3, 1.0, 2.5, 5.0];

/// `path` label value for requests no route template was found for.
pub const UNMATCHED_PATH: &str = "";

const REQUESTS_HELP: &str =
    "How many HTTP requests processed, partitioned by status code, method and HTTP path.";
const DURATION_HELP: &str =
    "How long it took to process the request, partitioned by status code, method and HTTP path.";

/// Options for building [`HttpMetrics`].
#[derive(Clone, Default)]
pub struct MetricsOptions {
    /// Histogram bucket boundaries in seconds. Empty means [`DEFAULT_BUCKETS`].
    pub buckets: Vec<f64>,

    /// Registry to register into. `None` means the process-wide default.
    pub registry: Option<Registry>,
}

impl MetricsOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_buckets(mut self, buckets: impl Into<Vec<f64>>) -> Self {
        self.buckets = buckets.into();
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Fill in every unset option.
    #[must_use]
    pub fn with_defaults(self) -> Self {
        let (buckets, registry) = self.resolve();
        Self {
            buckets,
            registry: Some(registry),
        }
    }

    fn resolve(self) -> (Vec<f64>, Registry) {
        let buckets = if self.buckets.is_empty() {
            DEFAULT_BUCKETS.to_vec()
        } else {
            self.buckets
        };
        let registry = self
            .registry
            .unwrap_or_else(|| prometheus::default_registry().clone());
        (buckets, registry)
    }
}

/// Check that histogram buckets are positive, finite and strictly increasing.
pub fn validate_buckets(buckets: &[f64]) -> std::result::Result<(), String> {
    if let Some(bad) = buckets.iter().find(|b| !b.is_finite() || **b <= 0.0) {
        return Err(format!("bucket boundary {bad} must be a positive finite number"));
    }
    if let Some(pair) = buckets.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(format!(
            "bucket boundaries must be strictly increasing, got {} then {}",
            pair[0], pair[1]
        ));
    }
    Ok(())
}

/// The fixed label values one observation is recorded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabelSet {
    pub code: String,
    pub method: String,
    pub path: String,
}

impl MetricLabelSet {
    /// Normalise raw request facts into label values.
    ///
    /// The method is lower-cased, the status rendered as a decimal string and
    /// a missing route template replaced by [`UNMATCHED_PATH`].
    #[must_use]
    pub fn new(status: StatusCode, method: &Method, route: Option<String>) -> Self {
        Self {
            code: sanitize_code(status),
            method: sanitize_method(method),
            path: route.unwrap_or_else(|| UNMATCHED_PATH.to_string()),
        }
    }

    fn values(&self) -> [&str; 3] {
        [&self.code, &self.method, &self.path]
    }
}

fn sanitize_method(method: &Method) -> String {
    method.as_str().to_lowercase()
}

fn sanitize_code(status: StatusCode) -> String {
    status.as_u16().to_string()
}

/// Registered request metrics.
///
/// Cloning is cheap; clones record into the same metric families.
#[derive(Clone)]
pub struct HttpMetrics {
    requests: IntCounterVec,
    latency: HistogramVec,
    buckets: Vec<f64>,
    registry: Registry,
}

impl HttpMetrics {
    /// Create both metrics and register them.
    ///
    /// Fails if either metric cannot be built or is already registered on
    /// the target registry. Nothing stays registered on failure.
    pub fn new(options: MetricsOptions) -> Result<Self> {
        let (buckets, registry) = options.resolve();

        validate_buckets(&buckets).map_err(|msg| Error::Registration {
            name: HTTP_REQUEST_DURATION_SECONDS,
            source: prometheus::Error::Msg(msg),
        })?;

        let requests = IntCounterVec::new(Opts::new(HTTP_REQUESTS_TOTAL, REQUESTS_HELP), &LABEL_NAMES)
            .map_err(|source| Error::Registration {
                name: HTTP_REQUESTS_TOTAL,
                source,
            })?;
        registry
            .register(Box::new(requests.clone()))
            .map_err(|source| Error::Registration {
                name: HTTP_REQUESTS_TOTAL,
                source,
            })?;

        let latency = HistogramVec::new(
            HistogramOpts::new(HTTP_REQUEST_DURATION_SECONDS, DURATION_HELP).buckets(buckets.clone()),
            &LABEL_NAMES,
        )
        .and_then(|latency| {
            registry.register(Box::new(latency.clone()))?;
            Ok(latency)
        });

        let latency = match latency {
            Ok(latency) => latency,
            Err(source) => {
                // Roll back so a failed construction leaves the registry as it was.
                if let Err(e) = registry.unregister(Box::new(requests)) {
                    warn!(
                        counter = HTTP_REQUESTS_TOTAL,
                        error = %e,
                        "failed to unregister counter after histogram registration failed"
                    );
                }
                return Err(Error::Registration {
                    name: HTTP_REQUEST_DURATION_SECONDS,
                    source,
                });
            }
        };

        debug!(
            counter = HTTP_REQUESTS_TOTAL,
            histogram = HTTP_REQUEST_DURATION_SECONDS,
            ?buckets,
            "registered HTTP request metrics"
        );

        Ok(Self {
            requests,
            latency,
            buckets,
            registry,
        })
    }

    /// Count one request and observe its duration, under the same labels.
    pub fn record(&self, labels: &MetricLabelSet, elapsed: Duration) {
        let values = labels.values();
        let seconds = elapsed.as_secs_f64();

        self.requests.with_label_values(&values).inc();
        self.latency.with_label_values(&values).observe(seconds);

        trace!(
            code = %labels.code,
            method = %labels.method,
            path = %labels.path,
            seconds,
            "recorded HTTP request"
        );
    }

    /// Histogram bucket boundaries in use.
    #[must_use]
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Registry the metrics were registered into.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn requests_total(&self) -> &IntCounterVec {
        &self.requests
    }

    #[must_use]
    pub fn request_duration(&self) -> &HistogramVec {
        &self.latency
    }
}

/// Gather a registry and encode it in the Prometheus text format.
pub fn gather_metrics(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| Error::Encode(prometheus::Error::Msg(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(registry: &Registry) -> MetricsOptions {
        MetricsOptions::new().with_registry(registry.clone())
    }

    #[test]
    fn test_with_defaults_fills_unset_options() {
        let options = MetricsOptions::new().with_defaults();
        assert_eq!(options.buckets, DEFAULT_BUCKETS.to_vec());
        assert!(options.registry.is_some());
    }

    #[test]
    fn test_with_defaults_keeps_custom_buckets() {
        let options = MetricsOptions::new()
            .with_buckets(vec![0.1, 0.2])
            .with_defaults();
        assert_eq!(options.buckets, vec![0.1, 0.2]);
    }

    #[test]
    fn test_construction_fills_unset_buckets() {
        let registry = Registry::new();
        let metrics = HttpMetrics::new(options(&registry).with_buckets(Vec::new())).unwrap();
        assert_eq!(metrics.buckets(), &DEFAULT_BUCKETS);

        let labels = MetricLabelSet::new(StatusCode::OK, &Method::GET, None);
        metrics.record(&labels, Duration::from_millis(10));

        // The explicit registry is the one written to.
        let text = gather_metrics(metrics.registry()).unwrap();
        assert!(text.contains(r#"le="0.3"} 1"#));
        assert!(gather_metrics(&registry).unwrap().contains(HTTP_REQUESTS_TOTAL));
    }

    #[test]
    fn test_validate_buckets() {
        assert!(validate_buckets(&DEFAULT_BUCKETS).is_ok());
        assert!(validate_buckets(&[]).is_ok());
        assert!(validate_buckets(&[0.5, 0.5]).is_err());
        assert!(validate_buckets(&[1.0, 0.5]).is_err());
        assert!(validate_buckets(&[0.0, 1.0]).is_err());
        assert!(validate_buckets(&[-1.0]).is_err());
        assert!(validate_buckets(&[f64::NAN]).is_err());
        assert!(validate_buckets(&[1.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn test_label_set_normalisation() {
        let labels = MetricLabelSet::new(
            StatusCode::NOT_FOUND,
            &Method::POST,
            Some("/users/{id}".to_string()),
        );
        assert_eq!(labels.code, "404");
        assert_eq!(labels.method, "post");
        assert_eq!(labels.path, "/users/{id}");

        let unmatched = MetricLabelSet::new(StatusCode::OK, &Method::GET, None);
        assert_eq!(unmatched.path, UNMATCHED_PATH);
    }

    #[test]
    fn test_extension_method_is_lowercased() {
        let method = Method::from_bytes(b"PURGE").unwrap();
        let labels = MetricLabelSet::new(StatusCode::OK, &method, None);
        assert_eq!(labels.method, "purge");
    }

    #[test]
    fn test_record_counts_and_observes() {
        let registry = Registry::new();
        let metrics = HttpMetrics::new(options(&registry)).unwrap();
        let labels = MetricLabelSet::new(StatusCode::OK, &Method::GET, Some("/".to_string()));

        metrics.record(&labels, Duration::from_millis(500));
        metrics.record(&labels, Duration::from_secs(3));

        let values = ["200", "get", "/"];
        assert_eq!(metrics.requests_total().with_label_values(&values).get(), 2);
        let histogram = metrics.request_duration().with_label_values(&values);
        assert_eq!(histogram.get_sample_count(), 2);
        assert!((histogram.get_sample_sum() - 3.5).abs() < 1e-9);

        let text = gather_metrics(&registry).unwrap();
        assert!(text.contains(r#"http_requests_total{code="200",method="get",path="/"} 2"#));
        assert!(text.contains(
            r#"http_request_duration_seconds_bucket{code="200",method="get",path="/",le="0.3"} 0"#
        ));
        assert!(text.contains(
            r#"http_request_duration_seconds_bucket{code="200",method="get",path="/",le="1"} 1"#
        ));
        assert!(text.contains(
            r#"http_request_duration_seconds_bucket{code="200",method="get",path="/",le="2.5"} 1"#
        ));
        assert!(text.contains(
            r#"http_request_duration_seconds_bucket{code="200",method="get",path="/",le="5"} 2"#
        ));
    }

    #[test]
    fn test_custom_buckets_used_verbatim() {
        let registry = Registry::new();
        let metrics = HttpMetrics::new(options(&registry).with_buckets(vec![0.05, 0.5])).unwrap();
        assert_eq!(metrics.buckets(), &[0.05, 0.5]);

        let labels = MetricLabelSet::new(StatusCode::OK, &Method::GET, None);
        metrics.record(&labels, Duration::from_millis(10));

        let text = gather_metrics(&registry).unwrap();
        assert!(text.contains(r#"le="0.05"} 1"#));
        assert!(text.contains(r#"le="0.5"} 1"#));
        assert!(!text.contains(r#"le="0.3""#));
        assert!(!text.contains(r#"le="2.5""#));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        assert!(HttpMetrics::new(options(&registry)).is_ok());

        let err = HttpMetrics::new(options(&registry)).err().unwrap();
        assert!(err.is_already_registered());
        assert!(err.to_string().contains(HTTP_REQUESTS_TOTAL));
    }

    #[test]
    fn test_histogram_collision_rolls_back_counter() {
        let registry = Registry::new();
        let squatter = HistogramVec::new(
            HistogramOpts::new(HTTP_REQUEST_DURATION_SECONDS, DURATION_HELP),
            &LABEL_NAMES,
        )
        .unwrap();
        registry.register(Box::new(squatter.clone())).unwrap();

        let err = HttpMetrics::new(options(&registry)).err().unwrap();
        assert!(err.is_already_registered());
        assert!(err.to_string().contains(HTTP_REQUEST_DURATION_SECONDS));

        // Once the histogram name is free again, the counter must be too.
        registry.unregister(Box::new(squatter)).unwrap();
        assert!(HttpMetrics::new(options(&registry)).is_ok());
    }

    #[test]
    fn test_invalid_buckets_register_nothing() {
        let registry = Registry::new();
        let err = HttpMetrics::new(options(&registry).with_buckets(vec![2.0, 1.0]))
            .err()
            .unwrap();

        assert!(err.to_string().contains(HTTP_REQUEST_DURATION_SECONDS));
        assert!(!err.is_already_registered());
        assert!(HttpMetrics::new(options(&registry)).is_ok());
    }
}
