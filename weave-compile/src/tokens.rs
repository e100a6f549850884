//! Token annotation (SPEC_FULL.md §3 "Token annotation rules").
//!
//! Applied after the collect pass, over whatever `Com` holds once the tree
//! walk has finished mutating it.

use weave_types::{Content, ContentBlock};

/// A token estimator: given a string, returns its estimated token cost.
/// Defaults to `ceil(chars / 4) + 4`; adapters may supply a precise
/// estimator via model metadata (SPEC_FULL.md §3).
pub type Estimator = std::sync::Arc<dyn Fn(&str) -> u32 + Send + Sync>;

/// The default estimator: `ceil(chars/4) + 4`.
pub fn default_estimator() -> Estimator {
    std::sync::Arc::new(|s: &str| (s.chars().count() as u32).div_ceil(4) + 4)
}

const IMAGE_TOKENS: u32 = 85;
const ENTRY_OVERHEAD: u32 = 4;

/// Estimate the token cost of one content value, recursing into nested
/// `tool_result` content per SPEC_FULL.md §3.
pub fn estimate_content(content: &Content, estimator: &Estimator) -> u32 {
    match content {
        Content::Text(text) => estimator(text),
        Content::Blocks(blocks) => blocks.iter().map(|b| estimate_block(b, estimator)).sum(),
    }
}

fn estimate_block(block: &ContentBlock, estimator: &Estimator) -> u32 {
    match block {
        ContentBlock::Text { text } | ContentBlock::Reasoning { text } => estimator(text),
        ContentBlock::Image { .. } | ContentBlock::Document { .. } => IMAGE_TOKENS,
        ContentBlock::ToolUse { name, input, .. } => estimator(&format!("{name}{input}")),
        ContentBlock::ToolResult { content, .. } => estimate_content(content, estimator),
        ContentBlock::Custom { data, .. } => estimator(&data.to_string()),
    }
}

/// Annotate one timeline/system entry's `tokens` field in place: sum over
/// its content blocks plus the flat per-entry overhead.
pub fn annotate_entry(entry: &mut weave_types::TimelineEntry, estimator: &Estimator) {
    entry.tokens = Some(estimate_content(&entry.message.content, estimator) + ENTRY_OVERHEAD);
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::{Message, Role, TimelineEntry};

    #[test]
    fn default_estimator_matches_ceil_chars_over_4_plus_4() {
        let estimator = default_estimator();
        assert_eq!(estimator("abcd"), 1 + 4);
        assert_eq!(estimator("abcde"), 2 + 4);
        assert_eq!(estimator(""), 0 + 4);
    }

    #[test]
    fn image_block_costs_a_fixed_85_tokens() {
        let estimator = default_estimator();
        let content = Content::Blocks(vec![ContentBlock::Image {
            source: weave_types::ImageSource::Url { url: "x".into() },
            media_type: "image/png".into(),
        }]);
        assert_eq!(estimate_content(&content, &estimator), IMAGE_TOKENS);
    }

    #[test]
    fn tool_result_recurses_into_nested_content() {
        let estimator = default_estimator();
        let inner = Content::Text("nested output".into());
        let content = Content::Blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "c1".into(),
            content: Box::new(inner.clone()),
            is_error: false,
        }]);
        assert_eq!(estimate_content(&content, &estimator), estimate_content(&inner, &estimator));
    }

    #[test]
    fn entry_annotation_adds_the_per_entry_overhead() {
        let estimator = default_estimator();
        let mut entry = TimelineEntry::new(Message { role: Role::User, content: Content::Text("abcd".into()) });
        annotate_entry(&mut entry, &estimator);
        assert_eq!(entry.tokens, Some(5 + ENTRY_OVERHEAD));
    }
}
