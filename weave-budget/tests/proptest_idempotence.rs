//! Property-based test: compaction invariants (SPEC_FULL.md §8, property 8).

use proptest::prelude::*;
use weave_budget::{compact, CompactOpts, CompactionStrategy};
use weave_types::{Message, Role, TimelineEntry};

fn entry(tokens: u32) -> TimelineEntry {
    let mut e = TimelineEntry::new(Message::user("x"));
    e.tokens = Some(tokens);
    e
}

proptest! {
    #[test]
    fn truncate_is_idempotent(
        costs in proptest::collection::vec(0u32..50, 0..20),
        max_tokens in 0u32..500,
    ) {
        let entries: Vec<TimelineEntry> = costs.into_iter().map(entry).collect();
        let opts = CompactOpts { max_tokens, strategy: CompactionStrategy::Truncate, ..Default::default() };
        let first = compact(entries, &opts);
        let second = compact(first.kept.clone(), &opts);
        prop_assert_eq!(first.kept.len(), second.kept.len());
        prop_assert!(second.evicted.is_empty());
    }

    #[test]
    fn sliding_window_is_idempotent(
        costs in proptest::collection::vec(0u32..50, 0..20),
        max_tokens in 0u32..500,
    ) {
        let entries: Vec<TimelineEntry> = costs.into_iter().map(entry).collect();
        let opts = CompactOpts { max_tokens, strategy: CompactionStrategy::SlidingWindow, ..Default::default() };
        let first = compact(entries, &opts);
        let second = compact(first.kept.clone(), &opts);
        prop_assert_eq!(first.kept.len(), second.kept.len());
        prop_assert!(second.evicted.is_empty());
    }
}
