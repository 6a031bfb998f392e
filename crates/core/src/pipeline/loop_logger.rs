use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for detection loop events.
///
/// Keeps the loop free of any particular output mechanism so the CLI can
/// collect timings for its end-of-run report while tests stay silent.
pub trait LoopLogger: Send {
    /// Count one completed detection cycle.
    fn cycle(&mut self);

    /// Record how long a named stage took for one cycle.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. detections per frame).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullLoopLogger;

impl LoopLogger for NullLoopLogger {
    fn cycle(&mut self) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Logger backed by the `log` facade that aggregates per-stage timings and
/// metrics into a summary when the session ends.
///
/// A progress line is written every `throttle_cycles` cycles.
pub struct LogLoopLogger {
    throttle_cycles: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    cycles: usize,
    messages: Vec<String>,
}

impl LogLoopLogger {
    pub fn new(throttle_cycles: usize) -> Self {
        Self {
            throttle_cycles: throttle_cycles.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            cycles: 0,
            messages: Vec::new(),
        }
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let cycles = self.cycles;
        let mut lines = vec![format!(
            "Detection summary ({cycles} cycles, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = mean(durations);
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            lines.push(format!("  {name}: avg {:.1}", mean(&self.metrics[name])));
        }

        if cycles > 0 && elapsed_ms > 0.0 {
            let rate = cycles as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {rate:.1} cycles/s"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for LogLoopLogger {
    fn default() -> Self {
        Self::new(300)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl LoopLogger for LogLoopLogger {
    fn cycle(&mut self) {
        self.cycles += 1;
        if self.cycles % self.throttle_cycles == 0 {
            log::info!("Detection cycles: {}", self.cycles);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullLoopLogger;
        logger.cycle();
        logger.timing("detect", 5.0);
        logger.metric("detections", 3.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = LogLoopLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("render", 5.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("render").unwrap(), &[5.0]);
        assert!(logger.timings_for("missing").is_none());
    }

    #[test]
    fn test_metric_average_in_summary() {
        let mut logger = LogLoopLogger::new(10);
        logger.metric("annotations", 3.0);
        logger.metric("annotations", 4.0);

        assert_relative_eq!(mean(logger.metrics_for("annotations").unwrap()), 3.5);
        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("annotations: avg 3.5"));
    }

    #[test]
    fn test_summary_includes_stages_and_throughput() {
        let mut logger = LogLoopLogger::new(10);
        for _ in 0..4 {
            logger.cycle();
        }
        logger.timing("detect", 10.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.starts_with("Detection summary (4 cycles"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("cycles/s"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogLoopLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_cycles_are_counted() {
        let mut logger = LogLoopLogger::new(2);
        for _ in 0..5 {
            logger.cycle();
        }
        assert_eq!(logger.cycles(), 5);
    }

    #[test]
    fn test_info_stores_messages() {
        let mut logger = LogLoopLogger::default();
        logger.info("hello world");
        assert_eq!(logger.messages, vec!["hello world".to_string()]);
        assert_eq!(logger.throttle_cycles, 300);
    }
}
