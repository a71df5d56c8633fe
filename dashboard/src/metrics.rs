use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref POLLS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_polls_total",
        "Total polls issued to the sensor"
    ))
    .unwrap();
    pub static ref POLL_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_poll_failures_total",
        "Total polls that produced no reading"
    ))
    .unwrap();
    pub static ref READINGS_RECORDED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_readings_recorded_total",
        "Total readings appended to the table"
    ))
    .unwrap();
    pub static ref PERSIST_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_persist_failures_total",
        "Total failed CSV writes"
    ))
    .unwrap();
    pub static ref POLL_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "dashboard_poll_latency_seconds",
            "Time taken by one sensor request"
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
    pub static ref TABLE_ROWS: Gauge = Gauge::with_opts(Opts::new(
        "dashboard_table_rows",
        "Readings currently held in the table"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(POLLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_RECORDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PERSIST_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(TABLE_ROWS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
