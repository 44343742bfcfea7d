use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};
use sanctum_core::KesError;

pub struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_requests_in_flight: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, KesError> {
        let registry = Registry::new();
        let http_requests_total = IntCounterVec::new(
            prometheus::Opts::new("http_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )
        .map_err(|err| KesError::Internal(err.to_string()))?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency by route"),
            &["route"],
        )
        .map_err(|err| KesError::Internal(err.to_string()))?;
        let http_requests_in_flight = IntGauge::new("http_requests_in_flight", "HTTP requests currently in flight")
            .map_err(|err| KesError::Internal(err.to_string()))?;

        registry
            .register(Box::new(http_requests_total.clone()))
            .map_err(|err| KesError::Internal(err.to_string()))?;
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .map_err(|err| KesError::Internal(err.to_string()))?;
        registry
            .register(Box::new(http_requests_in_flight.clone()))
            .map_err(|err| KesError::Internal(err.to_string()))?;

        Ok(Self { registry, http_requests_total, http_request_duration_seconds, http_requests_in_flight })
    }

    pub fn observe_request(&self, route: &str, status: u16, seconds: f64) {
        self.http_requests_total.with_label_values(&[route, &status.to_string()]).inc();
        self.http_request_duration_seconds.with_label_values(&[route]).observe(seconds);
    }

    pub fn inc_in_flight(&self) {
        self.http_requests_in_flight.inc();
    }

    pub fn dec_in_flight(&self) {
        self.http_requests_in_flight.dec();
    }

    pub fn encode(&self) -> Result<String, KesError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer).map_err(|err| KesError::Internal(err.to_string()))?;
        String::from_utf8(buffer).map_err(|err| KesError::Internal(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_encode() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_request("/v1/key/create", 200, 0.004);
        metrics.observe_request("/v1/key/create", 403, 0.001);
        let text = metrics.encode().unwrap();
        assert!(text.contains("http_requests_total"));
        assert!(text.contains("http_request_duration_seconds"));
    }
}
