use discoursekg_common::{Stage, StageStatus};

/// Outcome of one item's attempt within a stage invocation.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub id: String,
    pub status: StageStatus,
    pub error: Option<String>,
    pub duration_seconds: f64,
}

/// Summary of a single `run_stage` (or `run_discover`) invocation.
#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    pub items_total: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Discover only: candidates skipped as duplicate source urls.
    pub skipped_duplicates: u32,
    pub durations: Vec<f64>,
    /// Failed `(id, error_message)` pairs.
    pub failures: Vec<(String, String)>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            items_total: 0,
            succeeded: 0,
            failed: 0,
            skipped_duplicates: 0,
            durations: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        self.items_total += 1;
        self.durations.push(outcome.duration_seconds);
        match outcome.status {
            StageStatus::Completed => self.succeeded += 1,
            _ => {
                self.failed += 1;
                self.failures.push((
                    outcome.id,
                    outcome.error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
        }
    }

    /// Process exit code: 0 when everything (or nothing) succeeded, 1 when at
    /// least one item failed.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

impl std::fmt::Display for StageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Stage {} Complete ===", self.stage)?;
        writeln!(f, "Items:     {}", self.items_total)?;
        writeln!(f, "Succeeded: {}", self.succeeded)?;
        writeln!(f, "Failed:    {}", self.failed)?;
        if self.skipped_duplicates > 0 {
            writeln!(f, "Skipped:   {} (duplicate source_url)", self.skipped_duplicates)?;
        }
        if !self.durations.is_empty() {
            let total: f64 = self.durations.iter().sum();
            writeln!(
                f,
                "Duration:  {:.2}s total, {:.2}s avg",
                total,
                total / self.durations.len() as f64
            )?;
        }
        for (id, error) in &self.failures {
            writeln!(f, "  FAILED {id}: {error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_and_exit_codes() {
        let mut report = StageReport::new(Stage::Scrape);
        assert_eq!(report.exit_code(), 0);

        report.record(ItemOutcome {
            id: "a".into(),
            status: StageStatus::Completed,
            error: None,
            duration_seconds: 1.0,
        });
        report.record(ItemOutcome {
            id: "b".into(),
            status: StageStatus::Failed,
            error: Some("timeout".into()),
            duration_seconds: 2.0,
        });

        assert_eq!(report.items_total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures, vec![("b".to_string(), "timeout".to_string())]);
        assert_eq!(report.exit_code(), 1);
    }
}
