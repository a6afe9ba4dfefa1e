//! Batch conversion of every series in a source store.
//!
//! The axis is read once and shared by every per-variable decision. Each
//! variable is isolated: an unreadable or misaligned series is recorded as
//! skipped and the batch moves on. Only store failures end the run early.

use serde::Serialize;
use tracing::{info, warn};

use crate::align::decide;
use crate::error::{Result, SkipReason};
use crate::source::SourceStore;
use crate::store::ArrayStore;
use crate::writer::{WriteOutcome, write_aligned};

/// Per-variable outcomes of a batch run, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// One outcome per listed source variable.
    pub outcomes: Vec<WriteOutcome>,
}

impl BatchReport {
    /// Number of variables written.
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_written()).count()
    }

    /// Number of variables skipped.
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.written()
    }

    /// Whether every variable was written.
    pub fn is_clean(&self) -> bool {
        self.skipped() == 0
    }

    /// Skipped variables with a given reason.
    pub fn skipped_for(&self, reason: SkipReason) -> impl Iterator<Item = &WriteOutcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.skip_reason() == Some(reason))
    }
}

/// Aligns and writes every series from `source` into `store`.
///
/// # Errors
///
/// Returns an error if the axis cannot be read, the source cannot be
/// listed, or the store fails while writing. Per-variable problems are
/// reported in the [`BatchReport`] instead.
pub fn convert<S: SourceStore + ?Sized>(source: &S, store: &mut ArrayStore) -> Result<BatchReport> {
    let axis = store.read_axis()?;
    let ids = source.list_variables()?;

    info!(
        variables = ids.len(),
        axis_len = axis.len(),
        axis_start = %axis.first(),
        axis_end = %axis.last(),
        "starting conversion"
    );

    let mut report = BatchReport {
        outcomes: Vec::with_capacity(ids.len()),
    };

    for id in &ids {
        let series = match source.read_series(id) {
            Ok(series) => series,
            Err(e) => {
                warn!(source = %id, error = %e, "skipping unreadable series");
                report.outcomes.push(
                    WriteOutcome::skipped(id.destination_name(), SkipReason::SourceRead, e.to_string())
                        .with_source(id.path()),
                );
                continue;
            }
        };

        let decision = decide(&axis, &series);
        let outcome = write_aligned(store, axis.len(), &decision, &series)?;
        report.outcomes.push(outcome);
    }

    info!(
        written = report.written(),
        skipped = report.skipped(),
        "conversion finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::TimeAxis;
    use crate::series::{Metadata, SourceSeries};
    use crate::source::{MemorySource, VariableId};
    use crate::timestamp::Timestamp;
    use tempfile::tempdir;

    fn day(d: u32) -> Timestamp {
        Timestamp::parse(&format!("2000-01-{d:02} 00:00:00 UTC")).unwrap()
    }

    fn series(name: &str, days: &[u32]) -> SourceSeries {
        SourceSeries::new(
            name,
            days.iter().copied().map(day).collect(),
            days.iter().map(|&d| Some(f64::from(d))).collect(),
            Metadata::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_batch_isolates_failures() {
        let temp_dir = tempdir().unwrap();
        let axis = TimeAxis::new((1..=5).map(day).collect()).unwrap();
        let mut store = ArrayStore::create(temp_dir.path().join("store"), &axis, None).unwrap();

        let mut source = MemorySource::new();
        source
            .insert(VariableId::new("1"), series("exact", &[1, 2, 3, 4, 5]))
            .insert_unreadable(VariableId::new("2"), "truncated record")
            .insert(VariableId::new("3"), series("late", &[4, 5]))
            .insert(VariableId::new("4"), series("overrun", &[4, 5, 6]))
            .insert(VariableId::new("5"), series("late", &[5]));

        let report = convert(&source, &mut store).unwrap();

        let summary: Vec<(&str, Option<SkipReason>)> = report
            .outcomes
            .iter()
            .map(|o| (o.variable(), o.skip_reason()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("exact", None),
                ("2", Some(SkipReason::SourceRead)),
                ("late", None),
                ("overrun", Some(SkipReason::AxisOverrun)),
                ("late", Some(SkipReason::VariableNameCollision)),
            ]
        );
        assert_eq!(report.written(), 2);
        assert_eq!(report.skipped(), 3);
        assert!(!report.is_clean());
        assert_eq!(report.skipped_for(SkipReason::AxisOverrun).count(), 1);
        assert_eq!(report.outcomes[1].source(), Some("2"));
        assert_eq!(report.outcomes[0].source(), None);

        let names: Vec<&str> = store.variables().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["exact", "late"]);
    }

    #[test]
    fn test_batch_continues_past_unusable_names() {
        let temp_dir = tempdir().unwrap();
        let axis = TimeAxis::new((1..=3).map(day).collect()).unwrap();
        let mut store = ArrayStore::create(temp_dir.path().join("store"), &axis, None).unwrap();

        let long_name = "a".repeat(253);
        let mut source = MemorySource::new();
        source
            .insert(VariableId::new("1"), series(&long_name, &[1, 2]))
            .insert(VariableId::new("2"), series("river stage", &[1, 2]))
            .insert(VariableId::new("3"), series("good", &[2, 3]));

        let report = convert(&source, &mut store).unwrap();

        let reasons: Vec<Option<SkipReason>> =
            report.outcomes.iter().map(WriteOutcome::skip_reason).collect();
        assert_eq!(
            reasons,
            vec![
                Some(SkipReason::InvalidVariableName),
                Some(SkipReason::InvalidVariableName),
                None,
            ]
        );
        assert_eq!(&store.read_variable("good").unwrap()[1..], &[2.0, 3.0]);
    }

    #[test]
    fn test_empty_source_is_clean() {
        let temp_dir = tempdir().unwrap();
        let axis = TimeAxis::new((1..=2).map(day).collect()).unwrap();
        let mut store = ArrayStore::create(temp_dir.path().join("store"), &axis, None).unwrap();

        let report = convert(&MemorySource::new(), &mut store).unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.is_clean());
    }
}
