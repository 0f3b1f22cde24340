// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh-grant outcomes.
///
/// Shared by every clone of a custodian, including the clones driving background
/// work, so the numbers describe the process-wide refresh behavior.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempted: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
}
impl RefreshMetrics {
	/// Total number of refresh grants attempted.
	pub fn attempts(&self) -> u64 {
		self.attempted.load(Ordering::Relaxed)
	}

	/// Number of refresh grants that produced a stored access token.
	pub fn successes(&self) -> u64 {
		self.succeeded.load(Ordering::Relaxed)
	}

	/// Number of refresh grants that failed, including selection failures.
	pub fn failures(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempted.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.succeeded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}
}
