//! Request statistics and the Prometheus exposition
//!
//! Counters are plain atomics updated by the stats middleware, the upload
//! handlers and the memory monitor. Nothing here takes a lock.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Upper bounds of the latency histogram, in seconds
pub const LATENCY_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

const STATUS_CLASSES: [&str; 5] = ["1xx", "2xx", "3xx", "4xx", "5xx"];

pub struct RequestStats {
    total_requests: AtomicU64,
    /// Sum of response times in microseconds
    total_response_time_us: AtomicU64,
    by_status_class: [AtomicU64; 5],
    /// Non-cumulative counts; rendering accumulates them
    latency_buckets: [AtomicU64; LATENCY_BUCKETS.len()],
    upload_bytes: AtomicU64,
    memory_cleanups: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            by_status_class: Default::default(),
            latency_buckets: Default::default(),
            upload_bytes: AtomicU64::new(0),
            memory_cleanups: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a finished request
    pub fn record(&self, status: u16, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);

        let class = (status / 100).clamp(1, 5) as usize - 1;
        self.by_status_class[class].fetch_add(1, Ordering::Relaxed);

        let seconds = duration_us as f64 / 1_000_000.0;
        if let Some(i) = LATENCY_BUCKETS.iter().position(|le| seconds <= *le) {
            self.latency_buckets[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_upload(&self, bytes: u64) {
        self.upload_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_memory_cleanup(&self) {
        self.memory_cleanups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Responses with a 4xx or 5xx status
    pub fn error_responses(&self) -> u64 {
        self.by_status_class[3].load(Ordering::Relaxed) + self.by_status_class[4].load(Ordering::Relaxed)
    }

    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn upload_bytes(&self) -> u64 {
        self.upload_bytes.load(Ordering::Relaxed)
    }

    pub fn memory_cleanups(&self) -> u64 {
        self.memory_cleanups.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Render every counter in the Prometheus text exposition format (0.0.4)
    pub fn render_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        counter(
            &mut out,
            "mundotango_http_requests_total",
            "HTTP requests handled, by status class",
        );
        for (class, count) in STATUS_CLASSES.iter().zip(&self.by_status_class) {
            let _ = writeln!(
                out,
                "mundotango_http_requests_total{{status=\"{}\"}} {}",
                class,
                count.load(Ordering::Relaxed)
            );
        }

        let _ = writeln!(
            out,
            "# HELP mundotango_http_request_duration_seconds HTTP request latency\n\
             # TYPE mundotango_http_request_duration_seconds histogram"
        );
        let mut cumulative = 0;
        for (le, count) in LATENCY_BUCKETS.iter().zip(&self.latency_buckets) {
            cumulative += count.load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "mundotango_http_request_duration_seconds_bucket{{le=\"{}\"}} {}",
                le, cumulative
            );
        }
        let total = self.total_requests();
        let _ = writeln!(
            out,
            "mundotango_http_request_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            total
        );
        let _ = writeln!(
            out,
            "mundotango_http_request_duration_seconds_sum {}",
            self.total_response_time_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
        );
        let _ = writeln!(out, "mundotango_http_request_duration_seconds_count {}", total);

        counter(&mut out, "mundotango_upload_bytes_total", "Bytes received by upload endpoints");
        let _ = writeln!(out, "mundotango_upload_bytes_total {}", self.upload_bytes());

        counter(
            &mut out,
            "mundotango_memory_cleanups_total",
            "Cache flushes triggered by the memory monitor",
        );
        let _ = writeln!(out, "mundotango_memory_cleanups_total {}", self.memory_cleanups());

        let _ = writeln!(
            out,
            "# HELP mundotango_uptime_seconds Seconds since the process started\n\
             # TYPE mundotango_uptime_seconds gauge\n\
             mundotango_uptime_seconds {}",
            self.uptime_seconds()
        );
        out
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(out: &mut String, name: &str, help: &str) {
    let _ = writeln!(out, "# HELP {} {}\n# TYPE {} counter", name, help, name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_by_status_class() {
        let stats = RequestStats::new();
        stats.record(200, 1_000);
        stats.record(201, 3_000);
        stats.record(404, 1_000);
        stats.record(503, 1_000);

        assert_eq!(stats.total_requests(), 4);
        assert_eq!(stats.error_responses(), 2);
        assert_eq!(stats.avg_response_time_us(), 1_500.0);
    }

    #[test]
    fn test_avg_without_requests() {
        assert_eq!(RequestStats::new().avg_response_time_us(), 0.0);
    }

    #[test]
    fn test_histogram_is_cumulative() {
        let stats = RequestStats::new();
        stats.record(200, 2_000); // 2ms
        stats.record(200, 30_000); // 30ms
        stats.record(200, 9_000_000); // beyond the last bucket

        let text = stats.render_prometheus();
        assert!(text.contains("mundotango_http_request_duration_seconds_bucket{le=\"0.005\"} 1\n"));
        assert!(text.contains("mundotango_http_request_duration_seconds_bucket{le=\"0.05\"} 2\n"));
        assert!(text.contains("mundotango_http_request_duration_seconds_bucket{le=\"5\"} 2\n"));
        assert!(text.contains("mundotango_http_request_duration_seconds_bucket{le=\"+Inf\"} 3\n"));
        assert!(text.contains("mundotango_http_request_duration_seconds_count 3\n"));
    }

    #[test]
    fn test_render_prometheus_counters() {
        let stats = RequestStats::new();
        stats.record(200, 10);
        stats.record_upload(2048);
        stats.record_memory_cleanup();

        let text = stats.render_prometheus();
        assert!(text.contains("# TYPE mundotango_http_requests_total counter"));
        assert!(text.contains("mundotango_http_requests_total{status=\"2xx\"} 1\n"));
        assert!(text.contains("mundotango_http_requests_total{status=\"5xx\"} 0\n"));
        assert!(text.contains("mundotango_upload_bytes_total 2048\n"));
        assert!(text.contains("mundotango_memory_cleanups_total 1\n"));
    }
}
