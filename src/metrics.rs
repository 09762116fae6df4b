//! Process-local counters rendered in the Prometheus text format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;

use crate::analysis::Judgment;

const BUCKET_COUNT: usize = 9;

/// Upper bounds (ms) of the provider latency histogram buckets.
const LATENCY_BUCKETS_MS: [u64; BUCKET_COUNT] = [50, 100, 250, 500, 1000, 2000, 5000, 10_000, 30_000];

pub struct Metrics {
    requests_total: AtomicU64,
    rate_limited_total: AtomicU64,
    errors_by_status: DashMap<u16, u64>,
    judgments: [AtomicU64; 4],
    latency_counts: [AtomicU64; BUCKET_COUNT],
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
    process_start_epoch: f64,
    process_start_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let start = chrono::Utc::now();
        Self {
            requests_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            errors_by_status: DashMap::new(),
            judgments: Default::default(),
            latency_counts: Default::default(),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            process_start_epoch: start.timestamp_millis() as f64 / 1000.0,
            process_start_instant: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, status: u16) {
        *self.errors_by_status.entry(status).or_insert(0) += 1;
    }

    pub fn record_judgment(&self, judgment: Judgment) {
        self.judgments[judgment_index(judgment)].fetch_add(1, Ordering::Relaxed);
    }

    /// Observe one provider round trip.
    pub fn observe_provider_latency(&self, ms: u64) {
        self.latency_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        if let Some(idx) = LATENCY_BUCKETS_MS.iter().position(|ub| ms <= *ub) {
            self.latency_counts[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn rate_limited_total(&self) -> u64 {
        self.rate_limited_total.load(Ordering::Relaxed)
    }

    pub fn judgment_count(&self, judgment: Judgment) -> u64 {
        self.judgments[judgment_index(judgment)].load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        let mut buf = String::new();
        writeln!(
            &mut buf,
            "# HELP verdict_requests_total Total analyze requests received\n# TYPE verdict_requests_total counter"
        )
        .ok();
        writeln!(&mut buf, "verdict_requests_total {}", self.requests_total()).ok();
        writeln!(
            &mut buf,
            "# HELP verdict_rate_limited_total Requests rejected by the local rate limiter\n# TYPE verdict_rate_limited_total counter"
        )
        .ok();
        writeln!(
            &mut buf,
            "verdict_rate_limited_total {}",
            self.rate_limited_total()
        )
        .ok();

        writeln!(
            &mut buf,
            "# HELP verdict_errors_total Error responses by HTTP status\n# TYPE verdict_errors_total counter"
        )
        .ok();
        let mut errors: Vec<(u16, u64)> = self
            .errors_by_status
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        errors.sort_unstable();
        for (status, count) in errors {
            writeln!(
                &mut buf,
                "verdict_errors_total{{status=\"{}\"}} {}",
                status, count
            )
            .ok();
        }

        writeln!(
            &mut buf,
            "# HELP verdict_judgments_total Successful analyses by judgment\n# TYPE verdict_judgments_total counter"
        )
        .ok();
        for judgment in Judgment::ALL {
            writeln!(
                &mut buf,
                "verdict_judgments_total{{judgment=\"{}\"}} {}",
                judgment.as_str(),
                self.judgment_count(judgment)
            )
            .ok();
        }

        writeln!(
            &mut buf,
            "# HELP verdict_provider_latency_ms Completion provider latency histogram milliseconds\n# TYPE verdict_provider_latency_ms histogram"
        )
        .ok();
        let mut cumulative: u64 = 0;
        for (i, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += self.latency_counts[i].load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "verdict_provider_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        let count = self.latency_count.load(Ordering::Relaxed);
        writeln!(
            &mut buf,
            "verdict_provider_latency_ms_bucket{{le=\"+Inf\"}} {}",
            count
        )
        .ok();
        writeln!(
            &mut buf,
            "verdict_provider_latency_ms_sum {}",
            self.latency_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(&mut buf, "verdict_provider_latency_ms_count {}", count).ok();

        writeln!(
            &mut buf,
            "# HELP verdict_build_info Build information\n# TYPE verdict_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "verdict_build_info{{version=\"{}\",model=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION"),
            crate::provider::MODEL
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP verdict_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE verdict_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "verdict_process_start_time_seconds {}",
            self.process_start_epoch
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP verdict_process_uptime_seconds Process uptime seconds\n# TYPE verdict_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "verdict_process_uptime_seconds {}",
            self.process_start_instant.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}

fn judgment_index(judgment: Judgment) -> usize {
    match judgment {
        Judgment::Yta => 0,
        Judgment::Nta => 1,
        Judgment::Esh => 2,
        Judgment::Inconclusive => 3,
    }
}
