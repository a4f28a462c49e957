//! Partition strategy coverage.

use graybalance::{PartitionStrategy, WorkAssignment};

fn covered_positions(assignments: &[WorkAssignment]) -> Vec<usize> {
    let mut positions: Vec<usize> = assignments
        .iter()
        .flat_map(|assignment| assignment.positions.iter().copied())
        .collect();
    positions.sort_unstable();
    positions
}

#[test]
fn every_strategy_covers_each_position_once() {
    for strategy in [
        PartitionStrategy::Block,
        PartitionStrategy::Stride,
        PartitionStrategy::RowSplit,
    ] {
        for workers in 1..=9 {
            for count in 0..=50 {
                let assignments = strategy.assign(count, workers);
                assert_eq!(assignments.len(), workers);
                assert_eq!(
                    covered_positions(&assignments),
                    (0..count).collect::<Vec<_>>(),
                    "{strategy} with {workers} workers over {count} slots"
                );
                for (rank, assignment) in assignments.iter().enumerate() {
                    assert_eq!(assignment.rank, rank);
                    assert!(assignment.positions.windows(2).all(|pair| pair[0] < pair[1]));
                }
            }
        }
    }
}

#[test]
fn block_gives_remainder_to_last_worker() {
    let assignments = PartitionStrategy::Block.assign(10, 3);
    assert_eq!(assignments[0].positions, vec![0, 1, 2]);
    assert_eq!(assignments[1].positions, vec![3, 4, 5]);
    assert_eq!(assignments[2].positions, vec![6, 7, 8, 9]);
}

#[test]
fn block_with_more_workers_than_frames() {
    let assignments = PartitionStrategy::Block.assign(2, 5);
    let busy = assignments.iter().filter(|assignment| !assignment.is_empty()).count();
    assert_eq!(busy, 2);
    assert_eq!(covered_positions(&assignments), vec![0, 1]);
}

#[test]
fn stride_is_round_robin() {
    let assignments = PartitionStrategy::Stride.assign(10, 3);
    assert_eq!(assignments[0].positions, vec![0, 3, 6, 9]);
    assert_eq!(assignments[1].positions, vec![1, 4, 7]);
    assert_eq!(assignments[2].positions, vec![2, 5, 8]);
}

#[test]
fn row_split_keeps_the_batch_on_one_rank() {
    let assignments = PartitionStrategy::RowSplit.assign(4, 3);
    assert_eq!(assignments[0].positions, vec![0, 1, 2, 3]);
    assert!(assignments[1].is_empty());
    assert!(assignments[2].is_empty());
    assert!(!PartitionStrategy::RowSplit.overlaps_drain());
    assert!(PartitionStrategy::Block.overlaps_drain());
    assert!(PartitionStrategy::Stride.overlaps_drain());
}

#[test]
fn zero_workers_yield_no_assignments() {
    assert!(PartitionStrategy::Block.assign(10, 0).is_empty());
}

#[test]
fn display_names_match_command_line() {
    assert_eq!(PartitionStrategy::Block.to_string(), "block");
    assert_eq!(PartitionStrategy::Stride.to_string(), "stride");
    assert_eq!(PartitionStrategy::RowSplit.to_string(), "rows");
    assert_eq!(PartitionStrategy::default(), PartitionStrategy::Block);

    for strategy in [
        PartitionStrategy::Block,
        PartitionStrategy::Stride,
        PartitionStrategy::RowSplit,
    ] {
        assert_eq!(strategy.to_string().parse::<PartitionStrategy>(), Ok(strategy));
    }
    assert!("diagonal".parse::<PartitionStrategy>().is_err());
}
