//! Per-object outcomes and the aggregated run report.
//!
//! Workers never share counters: each returns its own outcomes, and the
//! caller merges them into a `RunReport` after the join barrier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kind::ObjectKind;

/// Terminal outcome for one object (or one filtered container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Exported,
    Created,
    Updated,
    SkippedFilter,
    SkippedExists,
    SkippedProvenance,
    Failed,
}

impl Outcome {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Exported => "exported",
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::SkippedFilter => "skipped (filter)",
            Outcome::SkippedExists => "skipped (exists)",
            Outcome::SkippedProvenance => "skipped (provenance)",
            Outcome::Failed => "failed",
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Outcome::SkippedFilter | Outcome::SkippedExists | Outcome::SkippedProvenance
        )
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One recorded decision: what happened to `container/identity` of `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectOutcome {
    pub kind: ObjectKind,
    pub container: String,
    pub identity: String,
    pub outcome: Outcome,
    /// Failure or skip reason; carries the underlying error's message
    /// verbatim, never a substring-matched summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ObjectOutcome {
    pub fn new(
        kind: ObjectKind,
        container: impl Into<String>,
        identity: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            kind,
            container: container.into(),
            identity: identity.into(),
            outcome,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Aggregated counts plus per-failure detail for one export or import run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    counts: BTreeMap<ObjectKind, BTreeMap<Outcome, u64>>,
    failures: Vec<ObjectOutcome>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ObjectOutcome) {
        *self
            .counts
            .entry(outcome.kind)
            .or_default()
            .entry(outcome.outcome)
            .or_default() += 1;
        if outcome.outcome == Outcome::Failed {
            self.failures.push(outcome);
        }
    }

    pub fn record_all(&mut self, outcomes: impl IntoIterator<Item = ObjectOutcome>) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    pub fn merge(&mut self, other: RunReport) {
        for (kind, per_outcome) in other.counts {
            let entry = self.counts.entry(kind).or_default();
            for (outcome, n) in per_outcome {
                *entry.entry(outcome).or_default() += n;
            }
        }
        self.failures.extend(other.failures);
    }

    pub fn count(&self, kind: ObjectKind, outcome: Outcome) -> u64 {
        self.counts
            .get(&kind)
            .and_then(|m| m.get(&outcome))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self, outcome: Outcome) -> u64 {
        self.counts
            .values()
            .filter_map(|m| m.get(&outcome))
            .sum()
    }

    pub fn kinds(&self) -> impl Iterator<Item = ObjectKind> + '_ {
        self.counts.keys().copied()
    }

    pub fn failures(&self) -> &[ObjectOutcome] {
        &self.failures
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Human-readable summary table: one row per kind, one trailing line
    /// per failure.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<22} {:>9} {:>8} {:>8} {:>8} {:>7}\n",
            "kind", "exported", "created", "updated", "skipped", "failed"
        ));
        for (kind, per_outcome) in &self.counts {
            let get = |o: Outcome| per_outcome.get(&o).copied().unwrap_or(0);
            let skipped: u64 = per_outcome
                .iter()
                .filter(|(o, _)| o.is_skip())
                .map(|(_, n)| n)
                .sum();
            out.push_str(&format!(
                "{:<22} {:>9} {:>8} {:>8} {:>8} {:>7}\n",
                kind.name(),
                get(Outcome::Exported),
                get(Outcome::Created),
                get(Outcome::Updated),
                skipped,
                get(Outcome::Failed),
            ));
        }
        for failure in &self.failures {
            out.push_str(&format!(
                "  {} {}/{}: {}\n",
                failure.kind.name(),
                failure.container,
                failure.identity,
                failure.reason.as_deref().unwrap_or("unknown error"),
            ));
        }
        out
    }
}

/// Progress callback for long-running export/import runs.
pub trait RunProgress: Send + Sync {
    /// Called once per recorded object outcome.
    fn on_object(&self, outcome: &ObjectOutcome);

    /// Called when a kind's pass (and its join barrier) completes.
    fn on_kind_complete(&self, kind: ObjectKind);
}

/// No-op progress reporter for when progress isn't needed.
pub struct NoopProgress;

impl RunProgress for NoopProgress {
    fn on_object(&self, _outcome: &ObjectOutcome) {}
    fn on_kind_complete(&self, _kind: ObjectKind) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(kind: ObjectKind, identity: &str, outcome: Outcome) -> ObjectOutcome {
        ObjectOutcome::new(kind, "Prod", identity, outcome)
    }

    #[test]
    fn test_record_and_count() {
        let mut report = RunReport::new();
        report.record(outcome(ObjectKind::Dashboard, "a", Outcome::Created));
        report.record(outcome(ObjectKind::Dashboard, "b", Outcome::Created));
        report.record(
            outcome(ObjectKind::Dashboard, "c", Outcome::Failed).with_reason("boom"),
        );
        assert_eq!(report.count(ObjectKind::Dashboard, Outcome::Created), 2);
        assert_eq!(report.count(ObjectKind::Dashboard, Outcome::Failed), 1);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].reason.as_deref(), Some("boom"));
    }

    #[test]
    fn test_merge_combines_worker_reports() {
        let mut a = RunReport::new();
        a.record(outcome(ObjectKind::ContactPoint, "x", Outcome::Created));
        let mut b = RunReport::new();
        b.record(outcome(ObjectKind::ContactPoint, "y", Outcome::Updated));
        b.record(outcome(ObjectKind::Template, "t", Outcome::Failed).with_reason("nope"));
        a.merge(b);
        assert_eq!(a.count(ObjectKind::ContactPoint, Outcome::Created), 1);
        assert_eq!(a.count(ObjectKind::ContactPoint, Outcome::Updated), 1);
        assert_eq!(a.total(Outcome::Failed), 1);
        assert_eq!(a.failures().len(), 1);
    }

    #[test]
    fn test_summary_lists_failures() {
        let mut report = RunReport::new();
        report.record(outcome(ObjectKind::Dashboard, "latency", Outcome::Created));
        report.record(
            outcome(ObjectKind::Dashboard, "errors", Outcome::Failed).with_reason("timeout"),
        );
        let summary = report.render_summary();
        assert!(summary.contains("dashboard"));
        assert!(summary.contains("Prod/errors: timeout"));
    }
}
