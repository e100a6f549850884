#![deny(missing_docs)]
//! Token budget compaction (SPEC_FULL.md §4.C).
//!
//! A pure, side-effect-free token budget strategy: a `CompactionStrategy`
//! enum covering the built-in policies, plus a `Custom` variant for
//! caller-supplied compaction logic. No
//! I/O, no async — `weave-tick` calls `compact` once per tick and fires its
//! own `onEvict` hook when `evicted` is non-empty.

use std::sync::Arc;

use weave_types::{Role, TimelineEntry};

/// How to reduce a timeline to fit a token budget.
#[non_exhaustive]
#[derive(Clone)]
pub enum CompactionStrategy {
    /// Pass through unchanged regardless of budget.
    None,
    /// Keep newest entries that fit, evicting the oldest first.
    Truncate,
    /// Always keep entries whose role is in `preserve_roles`; fill the rest
    /// of the budget with the newest remaining entries.
    SlidingWindow,
    /// Caller-supplied compaction. Receives the full entry slice and the
    /// budget context; returns the outcome directly. The framework
    /// recomputes `current_tokens` from the returned `kept` set.
    Custom(Arc<dyn Fn(&[TimelineEntry], &CompactContext, Option<&serde_json::Value>) -> CompactOutcome + Send + Sync>),
}

impl std::fmt::Debug for CompactionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionStrategy::None => write!(f, "None"),
            CompactionStrategy::Truncate => write!(f, "Truncate"),
            CompactionStrategy::SlidingWindow => write!(f, "SlidingWindow"),
            CompactionStrategy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// The budget context passed to a `Custom` strategy.
#[derive(Debug, Clone, Copy)]
pub struct CompactContext {
    /// The budget to fit within.
    pub max_tokens: u32,
    /// The sum of `tokens` across all input entries before compaction.
    pub current_tokens: u32,
}

/// Options controlling one `compact` call.
#[derive(Clone)]
pub struct CompactOpts {
    /// Token budget to fit the timeline within.
    pub max_tokens: u32,
    /// Which strategy to apply once the budget is exceeded.
    pub strategy: CompactionStrategy,
    /// Tokens to keep free below `max_tokens` (applied as `max_tokens -
    /// headroom`).
    pub headroom: u32,
    /// Roles that `sliding-window` always retains regardless of recency.
    pub preserve_roles: Vec<Role>,
    /// Opaque guidance forwarded to a `Custom` strategy.
    pub guidance: Option<serde_json::Value>,
}

impl Default for CompactOpts {
    fn default() -> Self {
        Self {
            max_tokens: u32::MAX,
            strategy: CompactionStrategy::None,
            headroom: 0,
            preserve_roles: vec![Role::System],
            guidance: None,
        }
    }
}

/// The result of a `compact` call.
#[derive(Debug, Clone)]
pub struct CompactOutcome {
    /// Entries retained, in original order.
    pub kept: Vec<TimelineEntry>,
    /// Entries dropped, in original order.
    pub evicted: Vec<TimelineEntry>,
    /// Sum of `tokens` across `kept`.
    pub current_tokens: u32,
}

fn entry_tokens(entry: &TimelineEntry) -> u32 {
    entry.tokens.unwrap_or(0)
}

fn sum_tokens(entries: &[TimelineEntry]) -> u32 {
    entries.iter().map(entry_tokens).sum()
}

/// Compact `entries` to fit `opts.max_tokens`, applying `opts.strategy`.
///
/// Returns early without invoking the strategy when `entries` is empty,
/// already within budget, or `strategy` is `None` — `evicted` is empty in
/// all three cases, matching the "onEvict fires exactly when eviction
/// occurred" rule from SPEC_FULL.md §4.C.
pub fn compact(entries: Vec<TimelineEntry>, opts: &CompactOpts) -> CompactOutcome {
    let current_tokens = sum_tokens(&entries);

    if entries.is_empty() || current_tokens <= opts.max_tokens || matches!(opts.strategy, CompactionStrategy::None) {
        return CompactOutcome { kept: entries, evicted: Vec::new(), current_tokens };
    }

    let budget = opts.max_tokens.saturating_sub(opts.headroom);

    match &opts.strategy {
        CompactionStrategy::None => unreachable!("handled above"),
        CompactionStrategy::Truncate => truncate(entries, budget),
        CompactionStrategy::SlidingWindow => sliding_window(entries, budget, &opts.preserve_roles),
        CompactionStrategy::Custom(f) => {
            let ctx = CompactContext { max_tokens: opts.max_tokens, current_tokens };
            let mut outcome = f(&entries, &ctx, opts.guidance.as_ref());
            outcome.current_tokens = sum_tokens(&outcome.kept);
            outcome
        }
    }
}

/// Keep newest entries first, evicting the oldest that don't fit.
fn truncate(entries: Vec<TimelineEntry>, budget: u32) -> CompactOutcome {
    let mut keep_mask = vec![false; entries.len()];
    let mut used = 0u32;
    for (i, entry) in entries.iter().enumerate().rev() {
        let cost = entry_tokens(entry);
        if used + cost > budget && used > 0 {
            break;
        }
        keep_mask[i] = true;
        used += cost;
    }
    split_by_mask(entries, keep_mask)
}

/// Always keep `preserve_roles` entries; fill the remaining budget with the
/// newest non-preserved entries.
fn sliding_window(entries: Vec<TimelineEntry>, budget: u32, preserve_roles: &[Role]) -> CompactOutcome {
    let preserved_mask: Vec<bool> =
        entries.iter().map(|e| preserve_roles.contains(&e.message.role)).collect();

    let preserved_tokens: u32 = entries
        .iter()
        .zip(&preserved_mask)
        .filter(|(_, &p)| p)
        .map(|(e, _)| entry_tokens(e))
        .sum();

    let remaining_budget = budget.saturating_sub(preserved_tokens);

    let mut keep_mask = preserved_mask.clone();
    let mut used = 0u32;
    for (i, entry) in entries.iter().enumerate().rev() {
        if preserved_mask[i] {
            continue;
        }
        let cost = entry_tokens(entry);
        if used + cost > remaining_budget && used > 0 {
            continue;
        }
        keep_mask[i] = true;
        used += cost;
    }

    split_by_mask(entries, keep_mask)
}

fn split_by_mask(entries: Vec<TimelineEntry>, keep_mask: Vec<bool>) -> CompactOutcome {
    let mut kept = Vec::new();
    let mut evicted = Vec::new();
    for (entry, keep) in entries.into_iter().zip(keep_mask) {
        if keep {
            kept.push(entry);
        } else {
            evicted.push(entry);
        }
    }
    let current_tokens = sum_tokens(&kept);
    CompactOutcome { kept, evicted, current_tokens }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::Message;

    fn entry(role: Role, tokens: u32) -> TimelineEntry {
        let mut e = TimelineEntry::new(Message { role, content: "x".into() });
        e.tokens = Some(tokens);
        e
    }

    #[test]
    fn empty_input_returns_early() {
        let opts = CompactOpts { max_tokens: 10, strategy: CompactionStrategy::Truncate, ..Default::default() };
        let outcome = compact(Vec::new(), &opts);
        assert!(outcome.kept.is_empty());
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn within_budget_returns_early_without_evicting() {
        let entries = vec![entry(Role::User, 5), entry(Role::Assistant, 5)];
        let opts = CompactOpts { max_tokens: 100, strategy: CompactionStrategy::Truncate, ..Default::default() };
        let outcome = compact(entries, &opts);
        assert_eq!(outcome.kept.len(), 2);
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn none_strategy_never_evicts() {
        let entries = vec![entry(Role::User, 50), entry(Role::Assistant, 50)];
        let opts = CompactOpts { max_tokens: 10, strategy: CompactionStrategy::None, ..Default::default() };
        let outcome = compact(entries, &opts);
        assert_eq!(outcome.kept.len(), 2);
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn truncate_keeps_newest_in_original_order() {
        let entries = vec![
            entry(Role::User, 10),
            entry(Role::Assistant, 10),
            entry(Role::User, 10),
        ];
        let opts = CompactOpts { max_tokens: 20, strategy: CompactionStrategy::Truncate, ..Default::default() };
        let outcome = compact(entries, &opts);
        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.kept[0].message.role, Role::Assistant);
        assert_eq!(outcome.kept[1].message.role, Role::User);
    }

    #[test]
    fn sliding_window_always_preserves_system_entries() {
        let entries = vec![
            entry(Role::System, 5),
            entry(Role::User, 10),
            entry(Role::Assistant, 10),
            entry(Role::User, 10),
        ];
        let opts = CompactOpts {
            max_tokens: 15,
            strategy: CompactionStrategy::SlidingWindow,
            preserve_roles: vec![Role::System],
            ..Default::default()
        };
        let outcome = compact(entries, &opts);
        assert_eq!(outcome.kept[0].message.role, Role::System);
        assert!(outcome.kept.len() >= 2);
    }

    #[test]
    fn custom_strategy_delegates_and_recomputes_tokens() {
        let entries = vec![entry(Role::User, 10), entry(Role::Assistant, 10)];
        let strategy = CompactionStrategy::Custom(Arc::new(|entries, _ctx, _guidance| {
            let mut iter = entries.iter().cloned();
            let kept = vec![iter.next().unwrap()];
            let evicted = iter.collect();
            CompactOutcome { kept, evicted, current_tokens: 0 }
        }));
        let opts = CompactOpts { max_tokens: 5, strategy, ..Default::default() };
        let outcome = compact(entries, &opts);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.current_tokens, 10);
    }
}
