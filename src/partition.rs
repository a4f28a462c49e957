//! Work partitioning policies.
//!
//! A [`PartitionStrategy`] decides which worker handles which slot of a
//! batch. Every strategy returns assignments that cover `0..count` exactly
//! once.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// How the frames of a batch are divided among worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionStrategy {
    /// Each worker decodes and corrects one contiguous run of the batch from
    /// its own reader. This is the default.
    #[default]
    Block,
    /// The batch is decoded sequentially into the window, then worker `r`
    /// corrects positions `r, r + T, r + 2T, …`.
    Stride,
    /// Frames are handled one at a time; the pixel rows of each frame are
    /// split across the threads. The drain cannot overlap with computation.
    RowSplit,
}

impl PartitionStrategy {
    /// Whether draining can run concurrently with computation of later
    /// frames.
    pub fn overlaps_drain(self) -> bool {
        !matches!(self, PartitionStrategy::RowSplit)
    }

    /// Assign the positions `0..count` to `workers` ranks.
    ///
    /// Always returns one [`WorkAssignment`] per rank (possibly empty). For
    /// [`RowSplit`](PartitionStrategy::RowSplit), rank 0 owns the whole batch
    /// since frames are processed sequentially. Returns no assignments when
    /// `workers` is zero.
    pub fn assign(self, count: usize, workers: usize) -> Vec<WorkAssignment> {
        if workers == 0 {
            return Vec::new();
        }

        (0..workers)
            .map(|rank| {
                let positions = match self {
                    PartitionStrategy::Block => {
                        let from = rank * count / workers;
                        let to = if rank == workers - 1 {
                            count
                        } else {
                            (rank + 1) * count / workers
                        };
                        (from..to).collect()
                    }
                    PartitionStrategy::Stride => (rank..count).step_by(workers).collect(),
                    PartitionStrategy::RowSplit if rank == 0 => (0..count).collect(),
                    PartitionStrategy::RowSplit => Vec::new(),
                };
                WorkAssignment { rank, positions }
            })
            .collect()
    }
}

impl Display for PartitionStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            PartitionStrategy::Block => "block",
            PartitionStrategy::Stride => "stride",
            PartitionStrategy::RowSplit => "rows",
        };
        f.write_str(name)
    }
}

impl FromStr for PartitionStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "block" | "blocks" => Ok(PartitionStrategy::Block),
            "stride" | "tdm" => Ok(PartitionStrategy::Stride),
            "rows" | "row" | "row-split" => Ok(PartitionStrategy::RowSplit),
            other => Err(format!("unknown partition strategy: {other}")),
        }
    }
}

/// The slot positions one worker owns within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkAssignment {
    /// Worker rank in `0..workers`.
    pub rank: usize,
    /// Slot positions, ascending.
    pub positions: Vec<usize>,
}

impl WorkAssignment {
    /// Whether this worker has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Split `items` into per-rank groups following `assignments`.
///
/// `items[p]` goes to the rank that owns position `p`. Positions not covered
/// by any assignment are dropped.
pub(crate) fn distribute<T>(items: Vec<T>, assignments: &[WorkAssignment]) -> Vec<Vec<T>> {
    let mut items: Vec<Option<T>> = items.into_iter().map(Some).collect();
    assignments
        .iter()
        .map(|assignment| {
            assignment
                .positions
                .iter()
                .filter_map(|&position| items.get_mut(position).and_then(Option::take))
                .collect()
        })
        .collect()
}
