//! Per-resource outcomes and the run report

use std::collections::BTreeMap;
use std::fmt;

/// What happened to one resource instance (or one imported resource)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DestructionOutcome {
    Deleted,
    SkippedDryRun,
    SkippedUnsupportedMode,
    SkippedUnsupportedProvider,
    SkippedImportFailed,
    SkippedReadFailed,
    SkippedAlreadyGone,
    SkippedApplyFailed,
}

impl DestructionOutcome {
    /// Whether the outcome adds to the deleted count.
    ///
    /// A dry-run "would delete" counts, so a preview reports the same total
    /// as the real run would.
    pub fn counts_as_deleted(self) -> bool {
        matches!(self, DestructionOutcome::Deleted | DestructionOutcome::SkippedDryRun)
    }

    pub fn label(self) -> &'static str {
        match self {
            DestructionOutcome::Deleted => "deleted",
            DestructionOutcome::SkippedDryRun => "would delete",
            DestructionOutcome::SkippedUnsupportedMode => "data sources",
            DestructionOutcome::SkippedUnsupportedProvider => "unsupported provider",
            DestructionOutcome::SkippedImportFailed => "import failed",
            DestructionOutcome::SkippedReadFailed => "read failed",
            DestructionOutcome::SkippedAlreadyGone => "already gone",
            DestructionOutcome::SkippedApplyFailed => "delete failed",
        }
    }
}

impl fmt::Display for DestructionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceOutcome {
    /// Address of the instance in the state file
    pub address: String,
    pub resource_type: String,
    /// Not decoded for data sources
    pub id: Option<String>,
    pub outcome: DestructionOutcome,
}

/// Result of a completed run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestroyReport {
    /// Resources deleted, or that would be deleted in a dry run
    pub deleted: usize,
    /// Managed resource instances with a current object
    pub attempted: usize,
    pub outcomes: Vec<ResourceOutcome>,
}

impl DestroyReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ResourceOutcome) {
        if outcome.outcome.counts_as_deleted() {
            self.deleted += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn count(&self, outcome: DestructionOutcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }

    /// Number of outcomes per kind, omitting kinds that never occurred
    pub fn tally(&self) -> BTreeMap<DestructionOutcome, usize> {
        let mut tally = BTreeMap::new();
        for o in &self.outcomes {
            *tally.entry(o.outcome).or_insert(0) += 1;
        }
        tally
    }
}

impl fmt::Display for DestroyReport {
    /// Breakdown such as `deleted: 3, already gone: 1, import failed: 2`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tally = self.tally();
        if tally.is_empty() {
            return write!(f, "no resources processed");
        }
        let parts: Vec<String> = tally
            .iter()
            .map(|(outcome, n)| format!("{}: {}", outcome, n))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(outcome: DestructionOutcome) -> ResourceOutcome {
        ResourceOutcome {
            address: "aws_instance.web".to_string(),
            resource_type: "aws_instance".to_string(),
            id: Some("i-123".to_string()),
            outcome,
        }
    }

    /// Would-be deletions count towards the total
    #[test]
    fn test_dry_run_counts_as_deleted() {
        let mut report = DestroyReport::new();
        report.record(outcome(DestructionOutcome::SkippedDryRun));
        report.record(outcome(DestructionOutcome::Deleted));
        report.record(outcome(DestructionOutcome::SkippedAlreadyGone));
        assert_eq!(report.deleted, 2);
    }

    /// The summary lists each outcome with its count
    #[test]
    fn test_breakdown() {
        let mut report = DestroyReport::new();
        assert_eq!(report.to_string(), "no resources processed");

        report.record(outcome(DestructionOutcome::SkippedImportFailed));
        report.record(outcome(DestructionOutcome::Deleted));
        report.record(outcome(DestructionOutcome::SkippedImportFailed));

        assert_eq!(report.count(DestructionOutcome::SkippedImportFailed), 2);
        assert_eq!(report.to_string(), "deleted: 1, import failed: 2");
    }
}
