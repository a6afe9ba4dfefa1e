//! Series alignment against a fixed time axis.
//!
//! [`decide`] works out where, if anywhere, a [`SourceSeries`] lands on a
//! [`TimeAxis`]. Matching is by literal timestamp equality only: a series is
//! placed at axis position `p + i` only when its `i`-th timestamp equals the
//! axis timestamp there, for every `i`. Nothing is resampled, shifted to the
//! nearest slot, or truncated.
//!
//! # Decision procedure
//!
//! ```text
//! series[0..overlap] == axis[0..overlap] ?  ── yes ──▶ ExactMatch   (or AxisOverrun if M > N)
//!          │ no
//!          ▼
//! k = position of series[0] on axis      ── none ──▶ NoMatch(no_overlap)
//!          │            k == 0           ─────────▶ NoMatch(elementwise_mismatch)
//!          ▼
//! M > N - k ?                            ── yes ──▶ NoMatch(runs_past_axis_end)
//!          │ no
//!          ▼
//! series == axis[k..k+M] ?               ── no  ──▶ NoMatch(elementwise_mismatch)
//!          │ yes
//!          ▼
//!   OffsetMatch { start_index: k }
//! ```

use serde::Serialize;
use tracing::debug;

use crate::axis::TimeAxis;
use crate::error::SkipReason;
use crate::series::SourceSeries;

/// Outcome of reconciling a series with an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlignmentDecision {
    /// The series starts at axis position 0 and matches element by element.
    ExactMatch,
    /// The series starts at `start_index > 0` and matches element by element.
    OffsetMatch {
        /// Axis position of the series' first timestamp.
        start_index: usize,
    },
    /// The series cannot be placed on the axis.
    NoMatch {
        /// Why not.
        reason: SkipReason,
    },
}

impl AlignmentDecision {
    /// Axis position of the first value to write, or `None` for [`NoMatch`](Self::NoMatch).
    pub fn start_index(&self) -> Option<usize> {
        match *self {
            Self::ExactMatch => Some(0),
            Self::OffsetMatch { start_index } => Some(start_index),
            Self::NoMatch { .. } => None,
        }
    }

    /// Whether the series may be written.
    pub fn is_match(&self) -> bool {
        self.start_index().is_some()
    }

    fn no_match(reason: SkipReason) -> Self {
        Self::NoMatch { reason }
    }
}

/// Decides how `series` maps onto `axis`.
///
/// Pure and deterministic: the same inputs always give the same decision.
/// A series whose head matches the axis but which is longer than the axis is
/// rejected as [`SkipReason::AxisOverrun`] rather than truncated, and an
/// empty series has no overlap.
pub fn decide(axis: &TimeAxis, series: &SourceSeries) -> AlignmentDecision {
    let decision = decide_inner(axis.as_slice(), series.timestamps());
    debug!(
        series = series.name(),
        len = series.len(),
        axis_len = axis.len(),
        ?decision,
        "alignment decided"
    );
    decision
}

fn decide_inner<T: Ord>(axis: &[T], series: &[T]) -> AlignmentDecision {
    let Some(first) = series.first() else {
        return AlignmentDecision::no_match(SkipReason::NoTemporalOverlap);
    };

    let m = series.len();
    let n = axis.len();
    let overlap = m.min(n);

    if series[..overlap] == axis[..overlap] {
        if m > n {
            return AlignmentDecision::no_match(SkipReason::AxisOverrun);
        }
        return AlignmentDecision::ExactMatch;
    }

    let Ok(start_index) = axis.binary_search(first) else {
        return AlignmentDecision::no_match(SkipReason::NoTemporalOverlap);
    };

    // Head already compared unequal from position 0.
    if start_index == 0 {
        return AlignmentDecision::no_match(SkipReason::ElementwiseMismatch);
    }

    let remaining = n - start_index;
    if m > remaining {
        return AlignmentDecision::no_match(SkipReason::AxisOverrun);
    }

    if series != &axis[start_index..start_index + m] {
        return AlignmentDecision::no_match(SkipReason::ElementwiseMismatch);
    }

    AlignmentDecision::OffsetMatch { start_index }
}
