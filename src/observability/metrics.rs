use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_actions_total: IntCounterVec,
    pub claims_created_total: IntCounter,
    pub payouts_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_actions_total = IntCounterVec::new(
            Opts::new(
                "dispatch_actions_total",
                "Total dispatch actions by action and outcome",
            ),
            &["action", "outcome"],
        )
        .expect("valid dispatch_actions_total metric");

        let claims_created_total = IntCounter::new(
            "claims_created_total",
            "Total driver claims created",
        )
        .expect("valid claims_created_total metric");

        let payouts_total = IntCounterVec::new(
            Opts::new("payouts_total", "Total payout operations by outcome"),
            &["outcome"],
        )
        .expect("valid payouts_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch actions in seconds",
            ),
            &["action"],
        )
        .expect("valid dispatch_latency_seconds metric");

        registry
            .register(Box::new(dispatch_actions_total.clone()))
            .expect("register dispatch_actions_total");
        registry
            .register(Box::new(claims_created_total.clone()))
            .expect("register claims_created_total");
        registry
            .register(Box::new(payouts_total.clone()))
            .expect("register payouts_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");

        Self {
            registry,
            dispatch_actions_total,
            claims_created_total,
            payouts_total,
            dispatch_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
