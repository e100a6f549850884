//! Types produced by the compiler and consumed by the tick engine
//! (SPEC_FULL.md §3 "CompiledStructure", §4.B).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::tool::ToolDefinition;

/// Conversation role. System messages never appear in `timeline` — they are
/// rebuilt each tick from `sections` into `CompiledStructure::system`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the timeline or system prelude.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn user(content: impl Into<Content>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// Visibility for a timeline entry — who this entry is rendered for.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Model,
    User,
    All,
}

/// A compiled timeline or system entry, annotated with token cost per
/// SPEC_FULL.md §3's token-annotation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub message: Message,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub metadata: Option<serde_json::Value>,
    /// Token cost, set by the compiler's annotation pass.
    pub tokens: Option<u32>,
    /// Semantic wrapper hint, e.g. `"collapsed"`.
    pub semantic: Option<String>,
}

impl TimelineEntry {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            tags: None,
            visibility: None,
            metadata: None,
            tokens: None,
            semantic: None,
        }
    }
}

/// Where an ephemeral block is spliced into the compiled timeline.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EphemeralPosition {
    Start,
    BeforeUser,
    AfterUser,
    End,
}

/// An ephemeral content block — cleared every tick, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralEntry {
    pub content: Content,
    pub position: EphemeralPosition,
    pub order: i32,
    pub block_type: Option<String>,
    pub id: Option<String>,
}

/// A value stored in a `Section`. Sections with equal id merge according to
/// the rules in SPEC_FULL.md §3: strings concatenate with newline, lists
/// concatenate, maps shallow-merge, and mixing kinds degrades to a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SectionValue {
    Text(String),
    List(Vec<SectionValue>),
    Map(BTreeMap<String, SectionValue>),
}

impl SectionValue {
    /// Merge `other` into `self` per the COM's section-merge rule.
    pub fn merge(self, other: SectionValue) -> SectionValue {
        match (self, other) {
            (SectionValue::Text(mut a), SectionValue::Text(b)) => {
                a.push('\n');
                a.push_str(&b);
                SectionValue::Text(a)
            }
            (SectionValue::List(mut a), SectionValue::List(b)) => {
                a.extend(b);
                SectionValue::List(a)
            }
            (SectionValue::Map(mut a), SectionValue::Map(b)) => {
                for (k, v) in b {
                    match a.remove(&k) {
                        Some(existing) => {
                            a.insert(k, existing.merge(v));
                        }
                        None => {
                            a.insert(k, v);
                        }
                    }
                }
                SectionValue::Map(a)
            }
            // Mixed types become a sequence.
            (a, b) => SectionValue::List(vec![a, b]),
        }
    }
}

/// A named region of system-prompt-adjacent content. Last writer wins for
/// `title`/`tags`/`visibility`/`audience`/`formatted_content`; `value`
/// merges via `SectionValue::merge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub audience: Option<String>,
    pub formatted_content: Option<String>,
    pub value: SectionValue,
}

impl Section {
    /// Merge a later write of the same section id into this one. Last
    /// writer wins on scalar fields; `value` merges structurally.
    pub fn merge(mut self, other: Section) -> Section {
        self.title = other.title.or(self.title);
        self.tags = other.tags.or(self.tags);
        self.visibility = other.visibility.or(self.visibility);
        self.audience = other.audience.or(self.audience);
        self.formatted_content = other.formatted_content.or(self.formatted_content);
        self.value = self.value.merge(other.value);
        self
    }
}

/// The compiler's output for one tick (SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompiledStructure {
    pub system: Vec<TimelineEntry>,
    pub timeline_entries: Vec<TimelineEntry>,
    pub tools: Vec<ToolDefinition>,
    pub ephemeral: Vec<EphemeralEntry>,
    pub sections: BTreeMap<String, Section>,
    pub total_tokens: u32,
}
