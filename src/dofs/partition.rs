use crate::CellId;
use std::fmt::Debug;
use std::ops::Range;

/// Decides which partition each active cell belongs to.
pub trait PartitionPolicy: Debug + Send + Sync {
    /// Splits the active cells, given in increasing order, into partitions.
    ///
    /// Every active cell must appear in exactly one partition. Partitions may be empty.
    fn partition(&self, active_cells: &[CellId]) -> Vec<Vec<CellId>>;
}

/// Splits the sorted active cells into contiguous blocks of (nearly) equal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPartitionPolicy {
    num_partitions: usize,
}

impl BlockPartitionPolicy {
    pub fn new(num_partitions: usize) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }
}

impl Default for BlockPartitionPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PartitionPolicy for BlockPartitionPolicy {
    fn partition(&self, active_cells: &[CellId]) -> Vec<Vec<CellId>> {
        let n = active_cells.len();
        let p = self.num_partitions;
        (0..p)
            .map(|k| {
                let begin = k * n / p;
                let end = (k + 1) * n / p;
                active_cells[begin..end].to_vec()
            })
            .collect()
    }
}

/// Contiguous ranges of global DOF indices, one per partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    /// `offsets[k]` is the first index of partition `k`; the last entry is the global count.
    offsets: Vec<usize>,
}

impl PartitionMap {
    pub fn from_counts(counts: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        for count in counts {
            offsets.push(offsets.last().copied().unwrap_or(0) + count);
        }
        Self { offsets }
    }

    pub fn num_partitions(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn global_dof_count(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn partition_dof_offset(&self, partition: usize) -> usize {
        self.offsets[partition]
    }

    pub fn partition_dof_count(&self, partition: usize) -> usize {
        self.offsets[partition + 1] - self.offsets[partition]
    }

    pub fn partition_dof_counts(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn partition_range(&self, partition: usize) -> Range<usize> {
        self.offsets[partition]..self.offsets[partition + 1]
    }

    /// The partition owning a global DOF index, or `None` if the index is out of range.
    pub fn partition_for_global_dof_index(&self, index: usize) -> Option<usize> {
        if index >= self.global_dof_count() {
            return None;
        }
        // Empty partitions share their offset with the next partition, so search for the last
        // offset that is not greater than the index.
        let upper = self.offsets.partition_point(|&offset| offset <= index);
        Some(upper - 1)
    }
}
