//! Global counters folded over every PRD.

use rayon::prelude::*;

use crate::models::{PrdRecord, StatusBucket, Summary, percent};
use crate::storage::SourceStore;

use super::aggregate;

/// Partial summary over some subset of PRDs.
///
/// `add` and `merge` are commutative and associative, so PRDs can be folded
/// in any order and on any number of threads. Counters saturate at `u64::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryAccumulator {
    total: u64,
    completed: u64,
    in_progress: u64,
    total_tests: u64,
    passed_tests: u64,
}

impl SummaryAccumulator {
    pub fn add(mut self, record: &PrdRecord) -> Self {
        self.total = self.total.saturating_add(1);
        if record.bucket == StatusBucket::Completed {
            self.completed = self.completed.saturating_add(1);
        } else if record.current_task.as_deref().is_some_and(|t| !t.is_empty()) {
            self.in_progress = self.in_progress.saturating_add(1);
        }
        if let Some(tests) = &record.test_summary {
            self.total_tests = self.total_tests.saturating_add(tests.total);
            self.passed_tests = self.passed_tests.saturating_add(tests.passed);
        }
        self
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            total: self.total.saturating_add(other.total),
            completed: self.completed.saturating_add(other.completed),
            in_progress: self.in_progress.saturating_add(other.in_progress),
            total_tests: self.total_tests.saturating_add(other.total_tests),
            passed_tests: self.passed_tests.saturating_add(other.passed_tests),
        }
    }

    pub fn finish(self) -> Summary {
        Summary {
            total_prds: self.total,
            completed_prds: self.completed,
            in_progress_prds: self.in_progress,
            pending_prds: self
                .total
                .saturating_sub(self.completed)
                .saturating_sub(self.in_progress),
            total_tests: self.total_tests,
            passed_tests: self.passed_tests,
            failed_tests: self.total_tests.saturating_sub(self.passed_tests),
            test_pass_rate: percent(self.passed_tests, self.total_tests).unwrap_or(0),
        }
    }
}

/// Fold already-aggregated records into a summary.
pub fn fold_records<'a>(records: impl IntoIterator<Item = &'a PrdRecord>) -> Summary {
    records
        .into_iter()
        .fold(SummaryAccumulator::default(), SummaryAccumulator::add)
        .finish()
}

/// Aggregate every PRD in the store and fold the results in parallel.
pub fn summarize(store: &SourceStore) -> Summary {
    store
        .prd_documents()
        .par_iter()
        .map(|doc| aggregate(store, doc).record)
        .fold(SummaryAccumulator::default, |acc, record| acc.add(&record))
        .reduce(SummaryAccumulator::default, SummaryAccumulator::merge)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestSummary;
    use crate::test_utils::TestForge;
    use serde_json::json;

    fn record(id: &str, status: &str, current_task: Option<&str>) -> PrdRecord {
        PrdRecord {
            id: id.to_string(),
            title: id.to_string(),
            status: status.to_string(),
            bucket: StatusBucket::classify(status),
            priority: "medium".to_string(),
            created: None,
            current_task: current_task.map(str::to_string),
            current_phase: None,
            completed_tasks: 0,
            total_tasks: 0,
            progress_percent: 0,
            test_summary: None,
            test_pass_rate: None,
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = fold_records(&Vec::<PrdRecord>::new());
        assert_eq!(summary, Summary::default());
        assert_eq!(summary.test_pass_rate, 0);
    }

    #[test]
    fn test_bucket_counting() {
        let records = vec![
            record("a", "completed", None),
            record("b", "all_features_complete", Some("T9")),
            record("c", "building", Some("T1")),
            record("d", "building", None),
            record("e", "pending", Some("")),
        ];
        let summary = fold_records(&records);
        assert_eq!(summary.total_prds, 5);
        assert_eq!(summary.completed_prds, 2);
        assert_eq!(summary.in_progress_prds, 1);
        assert_eq!(summary.pending_prds, 2);
    }

    #[test]
    fn test_pass_rate() {
        let mut a = record("a", "pending", None);
        a.test_summary = Some(TestSummary {
            total: 3,
            passed: 2,
            failed: 1,
            coverage: 0.0,
        });
        let mut b = record("b", "pending", None);
        b.test_summary = Some(TestSummary {
            total: 3,
            passed: 3,
            failed: 0,
            coverage: 0.0,
        });
        let summary = fold_records(&[a, b]);
        assert_eq!(summary.total_tests, 6);
        assert_eq!(summary.passed_tests, 5);
        assert_eq!(summary.failed_tests, 1);
        assert_eq!(summary.test_pass_rate, 83);
    }

    #[test]
    fn test_huge_test_counts_saturate() {
        let mut a = record("a", "building", Some("T1"));
        a.test_summary = Some(TestSummary {
            total: u64::MAX,
            passed: u64::MAX,
            ..Default::default()
        });
        let mut b = record("b", "pending", None);
        b.test_summary = Some(TestSummary {
            total: 5,
            passed: 4,
            ..Default::default()
        });
        let summary = fold_records(&[a.clone(), b.clone()]);
        assert_eq!(summary.total_tests, u64::MAX);
        assert_eq!(summary.passed_tests, u64::MAX);
        assert_eq!(summary.failed_tests, 0);
        assert_eq!(summary.test_pass_rate, 100);

        let left = SummaryAccumulator::default().add(&a);
        let right = SummaryAccumulator::default().add(&b);
        assert_eq!(left.merge(right).finish(), summary);
    }

    #[test]
    fn test_summarize_store_with_huge_counts() {
        let forge = TestForge::new();
        forge.prd("big", "");
        forge.prd("small", "");
        forge.checkpoint(
            "big",
            json!({"test_summary": {"total": u64::MAX, "passed": 1}}),
        );
        forge.checkpoint("small", json!({"test_summary": {"total": 5, "passed": 5}}));

        let summary = summarize(&forge.store());
        assert_eq!(summary.total_prds, 2);
        assert_eq!(summary.total_tests, u64::MAX);
        assert_eq!(summary.passed_tests, 6);
    }

    #[test]
    fn test_merge_matches_sequential_fold() {
        let records = vec![
            record("a", "completed", None),
            record("b", "building", Some("T1")),
            record("c", "pending", None),
        ];
        let left = SummaryAccumulator::default().add(&records[0]);
        let right = SummaryAccumulator::default()
            .add(&records[1])
            .add(&records[2]);
        assert_eq!(left.merge(right).finish(), fold_records(&records));
        assert_eq!(right.merge(left).finish(), fold_records(&records));
    }

    #[test]
    fn test_summarize_store() {
        let forge = TestForge::new();
        forge.prd("done", "---\ntitle: Done\n---\n");
        forge.prd("active", "---\ntitle: Active\n---\n");
        forge.prd("fresh", "---\ntitle: Fresh\nstatus: completed\n---\n");
        forge.prd("idle", "no header");
        forge.checkpoint(
            "done",
            json!({"status": "completed", "test_summary": {"total": 4, "passed": 4}}),
        );
        forge.checkpoint(
            "active",
            json!({"status": "building", "current_task": "T2", "test_summary": {"total": 6, "passed": 3}}),
        );

        let summary = summarize(&forge.store());
        assert_eq!(summary.total_prds, 4);
        assert_eq!(summary.completed_prds, 2);
        assert_eq!(summary.in_progress_prds, 1);
        assert_eq!(summary.pending_prds, 1);
        assert_eq!(summary.total_tests, 10);
        assert_eq!(summary.passed_tests, 7);
        assert_eq!(summary.failed_tests, 3);
        assert_eq!(summary.test_pass_rate, 70);
    }

    #[test]
    fn test_summarize_missing_forge_dir() {
        let forge = TestForge::new();
        assert_eq!(summarize(&forge.store()), Summary::default());
    }
}
