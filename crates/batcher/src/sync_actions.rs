//! Reconciles the channel manager's queues with the rollup node's view of
//! the chain.

use std::{collections::VecDeque, fmt};

use tracing::{debug, info, warn};

use crate::{
    block::{BlockId, L1BlockRef, SyncStatus},
    channel::ChannelStatus,
    sized_block::SizedBlock,
};

/// A range of L2 block numbers, both ends included.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InclusiveBlockRange {
    /// First block.
    pub start: u64,
    /// Last block.
    pub end: u64,
}

impl fmt::Display for InclusiveBlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// What to do with the channel manager after a sync status update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncActions {
    /// Clear all state, counting channel durations from this L1 origin.
    pub clear_state: Option<BlockId>,
    /// Leading blocks that are now safe.
    pub blocks_to_prune: usize,
    /// Leading channels whose blocks are all safe.
    pub channels_to_prune: usize,
    /// Blocks to fetch from the L2 node.
    pub blocks_to_load: Option<InclusiveBlockRange>,
}

impl fmt::Display for SyncActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncActions{{blocks_to_prune: {}, channels_to_prune: {}",
            self.blocks_to_prune, self.channels_to_prune
        )?;
        if let Some(clear) = self.clear_state {
            write!(f, ", clear_state: {clear}")?;
        }
        if let Some(range) = self.blocks_to_load {
            write!(f, ", blocks_to_load: {range}")?;
        }
        write!(f, "}}")
    }
}

/// Decides how to bring the queued `blocks` and `channels` in line with
/// `status`.
///
/// Returns the actions and whether the sequencer is out of sync. An out of
/// sync sequencer yields no actions, and the caller should keep its previous
/// `current_l1`.
///
/// Checks run in order:
/// 1. any required ref is zero-valued, or `current_l1` went backwards: out of
///    sync,
/// 2. no blocks queued: load everything above the safe head,
/// 3. the next safe block is older than the oldest queued block, the safe
///    head is above the newest queued block, or the queued block at the safe
///    height has another hash: start afresh,
/// 4. a fully submitted channel was included before `current_l1` but the
///    safe head has not reached its blocks: start afresh,
/// 5. otherwise prune what is safe and load what is new.
///
/// Starting afresh clears state from the safe head's L1 origin and reloads
/// every unsafe block.
pub fn compute_sync_actions<C: ChannelStatus>(
    status: &SyncStatus,
    prev_current_l1: &L1BlockRef,
    blocks: &VecDeque<SizedBlock>,
    channels: &[C],
) -> (SyncActions, bool) {
    let local_safe = &status.local_safe_l2;
    let unsafe_l2 = &status.unsafe_l2;

    if status.head_l1.is_zero()
        || status.current_l1.is_zero()
        || local_safe.is_zero()
        || unsafe_l2.is_zero()
    {
        warn!(
            head_l1 = %status.head_l1.id(),
            current_l1 = %status.current_l1.id(),
            local_safe_l2 = %local_safe.id(),
            unsafe_l2 = %unsafe_l2.id(),
            "empty BlockRef in sync status"
        );
        return (SyncActions::default(), true);
    }

    if status.current_l1.number < prev_current_l1.number {
        warn!(
            current_l1 = %status.current_l1.id(),
            prev_current_l1 = %prev_current_l1.id(),
            "sequencer currentL1 reversed"
        );
        return (SyncActions::default(), true);
    }

    let all_unsafe_blocks = (unsafe_l2.number > local_safe.number)
        .then(|| InclusiveBlockRange { start: local_safe.number + 1, end: unsafe_l2.number });

    let (Some(oldest), Some(newest)) = (blocks.front(), blocks.back()) else {
        let actions = SyncActions { blocks_to_load: all_unsafe_blocks, ..Default::default() };
        info!(sync_actions = %actions, "no blocks in state");
        return (actions, false);
    };

    let start_afresh = SyncActions {
        clear_state: Some(local_safe.l1_origin),
        blocks_to_load: all_unsafe_blocks,
        ..Default::default()
    };

    let next_safe = local_safe.number + 1;
    if next_safe < oldest.number {
        warn!(
            sync_actions = %start_afresh,
            oldest_block_in_state = oldest.number,
            "next safe block is below oldest block in state"
        );
        return (start_afresh, false);
    }

    let num_to_dequeue = (next_safe - oldest.number) as usize;
    if num_to_dequeue > blocks.len() {
        warn!(
            sync_actions = %start_afresh,
            newest_block_in_state = %newest.id(),
            "safe head above newest block in state, clearing channel manager state"
        );
        return (start_afresh, false);
    }

    if num_to_dequeue > 0 {
        let existing = &blocks[num_to_dequeue - 1];
        if existing.hash != local_safe.hash {
            warn!(
                sync_actions = %start_afresh,
                existing_block = %existing.id(),
                "safe chain reorg, clearing channel manager state"
            );
            return (start_afresh, false);
        }
    }

    for channel in channels {
        if channel.is_fully_submitted()
            && !channel.is_timed_out()
            && status.current_l1.number > channel.max_inclusion_block()
            && local_safe.number < channel.latest_l2().number
        {
            warn!(
                sync_actions = %start_afresh,
                existing_block = %channel.latest_l2(),
                "sequencer did not make expected progress"
            );
            return (start_afresh, false);
        }
    }

    let channels_to_prune = channels
        .iter()
        .take_while(|channel| channel.latest_l2().number <= local_safe.number)
        .count();

    let blocks_to_load = (unsafe_l2.number > newest.number)
        .then(|| InclusiveBlockRange { start: newest.number + 1, end: unsafe_l2.number });

    let actions = SyncActions {
        clear_state: None,
        blocks_to_prune: num_to_dequeue,
        channels_to_prune,
        blocks_to_load,
    };
    debug!(
        head_l1 = %status.head_l1.id(),
        current_l1 = %status.current_l1.id(),
        local_safe_l2 = %local_safe.id(),
        unsafe_l2 = %unsafe_l2.id(),
        sync_actions = %actions,
        "computed sync actions"
    );
    (actions, false)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{B256, U256};
    use rstest::rstest;

    use super::*;
    use crate::{
        block::{L2Block, L2BlockRef},
        test_utils::capture_logs,
    };

    #[derive(Clone, Copy, Debug)]
    struct TestChannel {
        latest_l2: BlockId,
        inclusion_block: u64,
        fully_submitted: bool,
        timed_out: bool,
    }

    impl ChannelStatus for TestChannel {
        fn latest_l2(&self) -> BlockId {
            self.latest_l2
        }

        fn max_inclusion_block(&self) -> u64 {
            self.inclusion_block
        }

        fn is_fully_submitted(&self) -> bool {
            self.fully_submitted
        }

        fn is_timed_out(&self) -> bool {
            self.timed_out
        }
    }

    fn hash(number: u64) -> B256 {
        B256::from(U256::from(number))
    }

    fn block(number: u64) -> SizedBlock {
        SizedBlock::new(L2Block {
            hash: hash(number),
            number,
            parent_hash: hash(number - 1),
            ..Default::default()
        })
    }

    fn blocks(numbers: &[u64]) -> VecDeque<SizedBlock> {
        numbers.iter().copied().map(block).collect()
    }

    fn channel(latest: u64, fully_submitted: bool) -> TestChannel {
        TestChannel {
            latest_l2: BlockId::new(hash(latest), latest),
            inclusion_block: 1,
            fully_submitted,
            timed_out: false,
        }
    }

    fn l1(number: u64) -> L1BlockRef {
        L1BlockRef { number, ..Default::default() }
    }

    fn l2(number: u64) -> L2BlockRef {
        L2BlockRef { number, ..Default::default() }
    }

    fn l2_with_hash(number: u64, hash: B256) -> L2BlockRef {
        L2BlockRef { number, hash, ..Default::default() }
    }

    fn l2_with_origin(number: u64, hash: B256, l1_origin: u64) -> L2BlockRef {
        L2BlockRef {
            number,
            hash,
            l1_origin: BlockId::new(B256::ZERO, l1_origin),
            ..Default::default()
        }
    }

    fn status(head: u64, current: u64, local_safe: L2BlockRef, unsafe_l2: u64) -> SyncStatus {
        SyncStatus {
            head_l1: l1(head),
            current_l1: l1(current),
            local_safe_l2: local_safe,
            unsafe_l2: l2(unsafe_l2),
            ..Default::default()
        }
    }

    fn clear_from(l1_origin: u64) -> Option<BlockId> {
        Some(BlockId::new(B256::ZERO, l1_origin))
    }

    fn range(start: u64, end: u64) -> Option<InclusiveBlockRange> {
        Some(InclusiveBlockRange { start, end })
    }

    #[rstest]
    #[case::empty_sync_status(
        SyncStatus::default(), 0, &[], vec![],
        SyncActions::default(), true, "empty BlockRef in sync status"
    )]
    #[case::current_l1_reversed(
        status(2, 1, l2(100), 101), 2, &[], vec![],
        SyncActions::default(), true, "sequencer currentL1 reversed"
    )]
    #[case::gap_between_safe_chain_and_state(
        status(6, 1, l2_with_origin(100, B256::ZERO, 1), 109), 1, &[102, 103], vec![channel(103, true)],
        SyncActions { clear_state: clear_from(1), blocks_to_load: range(101, 109), ..Default::default() },
        false, "next safe block is below oldest block in state"
    )]
    #[case::unexpectedly_good_progress(
        status(6, 2, l2_with_origin(104, B256::ZERO, 1), 109), 1, &[101, 102, 103], vec![channel(103, true)],
        SyncActions { clear_state: clear_from(1), blocks_to_load: range(105, 109), ..Default::default() },
        false, "safe head above newest block in state"
    )]
    #[case::safe_chain_reorg(
        status(5, 2, l2_with_origin(103, hash(101), 1), 109), 1, &[101, 102, 103], vec![channel(103, true)],
        SyncActions { clear_state: clear_from(1), blocks_to_load: range(104, 109), ..Default::default() },
        false, "safe chain reorg"
    )]
    #[case::failed_to_make_expected_progress(
        status(3, 2, l2_with_origin(101, hash(101), 1), 109), 1, &[101, 102, 103], vec![channel(103, true)],
        SyncActions { clear_state: clear_from(1), blocks_to_load: range(102, 109), ..Default::default() },
        false, "sequencer did not make expected progress"
    )]
    #[case::failed_to_make_expected_progress_unsafe_equals_safe(
        status(3, 2, l2_with_origin(101, hash(101), 1), 101), 1, &[102, 103], vec![channel(103, true)],
        SyncActions { clear_state: clear_from(1), ..Default::default() },
        false, "sequencer did not make expected progress"
    )]
    #[case::no_progress(
        status(4, 1, l2(100), 109), 1, &[101, 102, 103], vec![channel(103, true)],
        SyncActions { blocks_to_load: range(104, 109), ..Default::default() },
        false, "computed sync actions"
    )]
    #[case::no_blocks(
        status(5, 2, l2_with_hash(103, hash(103)), 109), 1, &[], vec![],
        SyncActions { blocks_to_load: range(104, 109), ..Default::default() },
        false, "no blocks in state"
    )]
    #[case::happy_path(
        status(5, 2, l2_with_hash(103, hash(103)), 109), 1, &[101, 102, 103], vec![channel(103, true)],
        SyncActions { blocks_to_prune: 3, channels_to_prune: 1, blocks_to_load: range(104, 109), ..Default::default() },
        false, "computed sync actions"
    )]
    #[case::happy_path_multiple_channels(
        status(5, 2, l2_with_hash(103, hash(103)), 109), 1, &[101, 102, 103, 104],
        vec![channel(103, true), channel(104, false)],
        SyncActions { blocks_to_prune: 3, channels_to_prune: 1, blocks_to_load: range(105, 109), ..Default::default() },
        false, "computed sync actions"
    )]
    #[case::no_progress_unsafe_equals_safe(
        status(5, 2, l2(100), 100), 1, &[], vec![],
        SyncActions::default(), false, "no blocks in state"
    )]
    #[case::no_progress_unsafe_equals_safe_with_blocks(
        status(5, 2, l2_with_hash(101, hash(101)), 101), 1, &[101], vec![],
        SyncActions { blocks_to_prune: 1, ..Default::default() },
        false, "computed sync actions"
    )]
    #[case::local_safe_ahead_of_safe_no_blocks(
        SyncStatus { safe_l2: l2_with_hash(103, hash(103)), ..status(5, 2, l2_with_hash(104, hash(104)), 109) },
        1, &[], vec![],
        SyncActions { blocks_to_load: range(105, 109), ..Default::default() },
        false, "no blocks in state"
    )]
    #[case::local_safe_zero_safe_nonzero(
        SyncStatus { safe_l2: l2_with_hash(104, hash(104)), ..status(5, 2, L2BlockRef::default(), 109) },
        1, &[], vec![],
        SyncActions::default(), true, "empty BlockRef in sync status"
    )]
    fn test_compute_sync_actions(
        #[case] status: SyncStatus,
        #[case] prev_current_l1: u64,
        #[case] block_numbers: &[u64],
        #[case] channels: Vec<TestChannel>,
        #[case] expected: SyncActions,
        #[case] expected_out_of_sync: bool,
        #[case] expected_log: &str,
    ) {
        let blocks = blocks(block_numbers);
        let ((actions, out_of_sync), logs) = capture_logs(|| {
            compute_sync_actions(&status, &l1(prev_current_l1), &blocks, &channels)
        });
        assert_eq!(actions, expected);
        assert_eq!(out_of_sync, expected_out_of_sync);
        assert!(logs.contains(expected_log), "missing {expected_log:?} in logs: {logs}");
    }

    #[test]
    fn test_state_behind_safe_head_reloads_from_safe_head() {
        let status = status(10, 3, l2_with_origin(98, hash(98), 7), 120);
        let (actions, out_of_sync) =
            compute_sync_actions(&status, &l1(3), &blocks(&[101, 102]), &[channel(102, false)]);
        assert!(!out_of_sync);
        assert_eq!(actions.clear_state, clear_from(7));
        // After a reset, loading restarts right after the safe head (98), not
        // after the first queued block (101), so nothing between them is lost.
        assert_eq!(actions.blocks_to_load, range(99, 120));
        assert_eq!(actions.blocks_to_prune, 0);
    }

    #[test]
    fn test_all_channels_safe_prunes_everything() {
        let channels = [channel(101, true), channel(102, true), channel(104, true)];
        let status = status(10, 5, l2_with_hash(104, hash(104)), 104);
        let (actions, out_of_sync) =
            compute_sync_actions(&status, &l1(4), &blocks(&[101, 102, 103, 104]), &channels);
        assert!(!out_of_sync);
        assert_eq!(
            actions,
            SyncActions { blocks_to_prune: 4, channels_to_prune: 3, ..Default::default() }
        );
    }

    #[test]
    fn test_timed_out_channel_is_not_a_stall() {
        let mut stalled = channel(103, true);
        stalled.timed_out = true;
        let status = status(5, 2, l2_with_hash(101, hash(101)), 109);
        let (actions, _) =
            compute_sync_actions(&status, &l1(1), &blocks(&[101, 102, 103]), &[stalled]);
        assert_eq!(actions.clear_state, None);
        assert_eq!(actions.blocks_to_prune, 1);
        assert_eq!(actions.channels_to_prune, 0);
    }

    #[test]
    fn test_is_pure() {
        let blocks = blocks(&[101, 102, 103]);
        let channels = [channel(103, true)];
        let status = status(5, 2, l2_with_hash(103, hash(103)), 109);
        let first = compute_sync_actions(&status, &l1(1), &blocks, &channels);
        let second = compute_sync_actions(&status, &l1(1), &blocks, &channels);
        assert_eq!(first, second);
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn test_display() {
        let actions = SyncActions {
            clear_state: clear_from(1),
            blocks_to_prune: 2,
            channels_to_prune: 1,
            blocks_to_load: range(5, 9),
        };
        let rendered = actions.to_string();
        assert!(rendered.contains("blocks_to_prune: 2"));
        assert!(rendered.contains("blocks_to_load: [5, 9]"));
    }
}
