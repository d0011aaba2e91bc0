use crate::model::{FeedbackStatus, StatusCounts};
use std::fmt;

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub position: u64,
    pub total: u64,
    pub queries: u64,
    pub counts: StatusCounts,
}

impl fmt::Display for ProgressSnapshot {
    /// `[pos/total] q=.. d=.. r=.. w=.. f=.. s=..`: queries completed and
    /// evaluations done, running, waiting, failed, skipped.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] q={} d={} r={} w={} f={} s={}",
            self.position,
            self.total,
            self.queries,
            self.counts.get(FeedbackStatus::Done),
            self.counts.get(FeedbackStatus::Running),
            self.counts.get(FeedbackStatus::None),
            self.counts.get(FeedbackStatus::Failed),
            self.counts.get(FeedbackStatus::Skipped),
        )
    }
}

pub type ProgressObserver = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Monotonic run progress over `total_queries + total_feedback_jobs` units.
///
/// Each finished query counts one unit; each newly resolved scoring job
/// counts one unit. Jobs that will never exist because their query failed
/// are added through [`Progress::add_phantom_jobs`].
pub struct Progress {
    total: u64,
    position: u64,
    queries: u64,
    last_resolved: u64,
    phantom_jobs: u64,
    counts: StatusCounts,
    observer: Option<ProgressObserver>,
}

impl Progress {
    pub fn new(total: u64, finished_queries: u64) -> Self {
        Self {
            total,
            position: finished_queries.min(total),
            queries: finished_queries,
            last_resolved: 0,
            phantom_jobs: 0,
            counts: StatusCounts::default(),
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Option<ProgressObserver>) {
        self.observer = observer;
    }

    pub fn add_phantom_jobs(&mut self, n: u64) {
        self.phantom_jobs += n;
    }

    /// Advances by `query_change` plus the jobs resolved since the last
    /// observation. Never moves backwards.
    pub fn update(&mut self, query_change: u64, counts: StatusCounts) {
        self.queries += query_change;
        let resolved = counts.resolved() + self.phantom_jobs;
        let newly_resolved = resolved.saturating_sub(self.last_resolved);
        self.last_resolved = self.last_resolved.max(resolved);
        self.counts = counts;

        self.position = (self.position + query_change + newly_resolved).min(self.total);
        if let Some(observer) = &self.observer {
            observer(&self.snapshot());
        }
    }

    /// Scoring jobs considered finished, including phantom ones.
    pub fn finished_feedback(&self) -> u64 {
        self.last_resolved
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn queries(&self) -> u64 {
        self.queries
    }

    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            position: self.position,
            total: self.total,
            queries: self.queries,
            counts: self.counts.clone(),
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.total)
            .field("position", &self.position)
            .field("queries", &self.queries)
            .field("last_resolved", &self.last_resolved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(done: u64, failed: u64) -> StatusCounts {
        let mut c = StatusCounts::default();
        c.set(FeedbackStatus::Done, done);
        c.set(FeedbackStatus::Failed, failed);
        c
    }

    #[test]
    fn never_decreases_and_caps_at_total() {
        let mut p = Progress::new(10, 1);
        assert_eq!(p.position(), 1);
        p.update(1, counts(3, 0));
        assert_eq!(p.position(), 5);
        // counts going backwards (e.g. a stale read) do not move it back
        p.update(0, counts(1, 0));
        assert_eq!(p.position(), 5);
        p.update(1, counts(3, 1));
        assert_eq!(p.position(), 7);
        p.update(0, counts(50, 0));
        assert_eq!(p.position(), 10);
    }

    #[test]
    fn phantom_jobs_count_as_resolved() {
        let mut p = Progress::new(10, 0);
        p.add_phantom_jobs(4);
        p.update(1, StatusCounts::default());
        assert_eq!(p.finished_feedback(), 4);
        assert_eq!(p.position(), 5);
    }

    #[test]
    fn snapshot_renders_status_postfix() {
        let mut p = Progress::new(8, 0);
        p.update(2, counts(3, 1));
        assert_eq!(p.snapshot().to_string(), "[6/8] q=2 d=3 r=0 w=0 f=1 s=0");
    }
}
