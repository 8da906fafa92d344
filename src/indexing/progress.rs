//! Run statistics and live progress display

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::indexer::ClassificationVerdict;

/// Counters for one indexing run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub discovered: usize,
    pub eligible: usize,
    pub indexed: usize,
    /// Eligible files whose content was blank
    pub skipped: usize,
    pub failed: usize,
    /// Count per verdict, in [`ClassificationVerdict::ALL`] order
    pub verdicts: Vec<(ClassificationVerdict, usize)>,
    pub elapsed: Duration,
    pub interrupted: bool,
}

impl IndexStats {
    /// Eligible files as a percentage of discovered files
    pub fn eligible_percent(&self) -> f64 {
        percent(self.eligible, self.discovered)
    }

    /// Indexed files as a percentage of eligible files
    pub fn indexed_percent(&self) -> f64 {
        percent(self.indexed, self.eligible)
    }

    /// Eligible files that reached a final outcome
    pub fn processed(&self) -> usize {
        self.indexed + self.skipped + self.failed
    }

    pub fn verdict_count(&self, verdict: ClassificationVerdict) -> usize {
        self.verdicts
            .iter()
            .find(|(v, _)| *v == verdict)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn print_summary(&self) {
        println!();
        if self.interrupted {
            println!("⚠️  Indexing interrupted; partial results below");
        } else {
            println!("✅ Indexing complete");
        }
        println!("  Files discovered: {}", self.discovered);
        println!(
            "  Eligible:         {} ({:.1}%)",
            self.eligible,
            self.eligible_percent()
        );
        println!(
            "  Indexed:          {} ({:.1}% of eligible)",
            self.indexed,
            self.indexed_percent()
        );
        println!("  Skipped (blank):  {}", self.skipped);
        println!("  Failed:           {}", self.failed);

        let breakdown: Vec<String> = self
            .verdicts
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(verdict, count)| format!("{}={}", verdict, count))
            .collect();
        if !breakdown.is_empty() {
            println!("  Verdicts:         {}", breakdown.join(", "));
        }
        println!("  Elapsed:          {:.2}s", self.elapsed.as_secs_f64());
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Thread-safe aggregator fed by discovery and by every worker.
///
/// Counters only; nothing here decides what the pipeline does next.
pub struct ProgressReporter {
    discovered: AtomicUsize,
    indexed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    verdicts: [AtomicUsize; ClassificationVerdict::ALL.len()],
    interrupted: AtomicBool,
    bar: ProgressBar,
    started: Instant,
}

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] Files: [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

impl ProgressReporter {
    pub fn new(show_progress: bool) -> Self {
        let bar = if show_progress {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            discovered: AtomicUsize::new(0),
            indexed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            verdicts: Default::default(),
            interrupted: AtomicBool::new(false),
            bar,
            started: Instant::now(),
        }
    }

    /// Reporter that never draws anything
    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verdict(&self, verdict: ClassificationVerdict) {
        self.verdicts[verdict.ordinal()].fetch_add(1, Ordering::Relaxed);
    }

    /// Size the bar once the eligible set is known
    pub fn begin(&self, eligible: usize) {
        self.bar.set_length(eligible as u64);
        self.bar.set_position(0);
    }

    pub fn record_outcome(&self, success: bool) {
        if success {
            self.indexed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.tick();
    }

    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    pub fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    fn tick(&self) {
        self.bar.inc(1);
        let failed = self.failed.load(Ordering::Relaxed);
        if failed > 0 {
            self.bar.set_message(format!("{} failed", failed));
        }
    }

    /// Completed share of eligible files, 0-100
    pub fn completion_percent(&self) -> f64 {
        let done = self.indexed.load(Ordering::Relaxed)
            + self.skipped.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed);
        percent(done, self.eligible())
    }

    fn eligible(&self) -> usize {
        self.verdicts[ClassificationVerdict::Eligible.ordinal()].load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        if self.interrupted.load(Ordering::Relaxed) {
            self.bar.abandon_with_message("Interrupted");
        } else {
            self.bar.finish_with_message("Complete");
        }
    }

    pub fn summary(&self) -> IndexStats {
        IndexStats {
            discovered: self.discovered.load(Ordering::Relaxed),
            eligible: self.eligible(),
            indexed: self.indexed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            verdicts: ClassificationVerdict::ALL
                .iter()
                .map(|verdict| (*verdict, self.verdicts[verdict.ordinal()].load(Ordering::Relaxed)))
                .collect(),
            elapsed: self.started.elapsed(),
            interrupted: self.interrupted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_bar_template_shows_percent() {
        assert!(ProgressStyle::default_bar().template(BAR_TEMPLATE).is_ok());
        assert!(BAR_TEMPLATE.contains("{percent}%"));
    }

    #[test]
    fn test_summary_counts() {
        let reporter = ProgressReporter::hidden();
        for _ in 0..4 {
            reporter.record_discovered();
        }
        reporter.record_verdict(ClassificationVerdict::Eligible);
        reporter.record_verdict(ClassificationVerdict::Eligible);
        reporter.record_verdict(ClassificationVerdict::Binary);
        reporter.record_verdict(ClassificationVerdict::Hidden);
        reporter.begin(2);
        reporter.record_outcome(true);
        reporter.record_outcome(false);

        let stats = reporter.summary();
        assert_eq!(stats.discovered, 4);
        assert_eq!(stats.eligible, 2);
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.verdict_count(ClassificationVerdict::Binary), 1);
        assert_eq!(stats.verdict_count(ClassificationVerdict::Oversized), 0);
        assert!((stats.eligible_percent() - 50.0).abs() < f64::EPSILON);
        assert!((stats.indexed_percent() - 50.0).abs() < f64::EPSILON);
        assert!(!stats.interrupted);
    }

    #[test]
    fn test_percentages_with_nothing_discovered() {
        let stats = ProgressReporter::hidden().summary();
        assert_eq!(stats.eligible_percent(), 0.0);
        assert_eq!(stats.indexed_percent(), 0.0);
    }

    #[test]
    fn test_concurrent_outcomes() {
        let reporter = Arc::new(ProgressReporter::hidden());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        reporter.record_outcome(i % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = reporter.summary();
        assert_eq!(stats.indexed, 400);
        assert_eq!(stats.failed, 400);
    }

    #[test]
    fn test_completion_and_interrupt() {
        let reporter = ProgressReporter::hidden();
        for _ in 0..4 {
            reporter.record_verdict(ClassificationVerdict::Eligible);
        }
        reporter.record_outcome(true);
        reporter.record_skip();
        reporter.mark_interrupted();

        assert!((reporter.completion_percent() - 50.0).abs() < f64::EPSILON);
        let stats = reporter.summary();
        assert!(stats.interrupted);
        assert_eq!(stats.processed(), 2);
    }
}
