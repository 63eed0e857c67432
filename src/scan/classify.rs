//! Static resource tagging for example scripts.
//!
//! Tags are derived purely from the relative path and the source text. The
//! heuristics live in a single pattern table so they can be inspected and
//! tested in isolation; nothing here ever executes the script.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// A resource or environment dependency that may block unattended runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    /// Reads from stdin or waits for a human approval
    Interactive,
    /// Starts a long-running server or socket listener
    Server,
    /// Needs a microphone/speaker or a realtime audio session
    Audio,
    /// Depends on an extra service (broker, workflow engine, browser, ...)
    External,
}

impl Tag {
    /// All tags, in display order.
    pub const ALL: [Tag; 4] = [Tag::Interactive, Tag::Server, Tag::Audio, Tag::External];

    /// Lowercase name used in logs, flags and skip reasons.
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Interactive => "interactive",
            Tag::Server => "server",
            Tag::Audio => "audio",
            Tag::External => "external",
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of tags.
pub type TagSet = BTreeSet<Tag>;

/// Format a tag set as a comma separated list (`-` when empty).
pub fn format_tags(tags: &TagSet) -> String {
    if tags.is_empty() {
        "-".to_string()
    } else {
        tags.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
    }
}

/// Where a pattern is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Regular expression over the raw source text
    SourceRegex(&'static str),
    /// Case-insensitive substring of the source text
    SourceKeyword(&'static str),
    /// Some lowercased path segment contains the needle
    SegmentContains(&'static str),
    /// Some lowercased path segment equals the needle
    SegmentEquals(&'static str),
}

/// One row of the tagging table.
#[derive(Debug, Clone, Copy)]
pub struct TagRule {
    pub tag: Tag,
    pub matcher: Matcher,
}

const fn rule(tag: Tag, matcher: Matcher) -> TagRule {
    TagRule { tag, matcher }
}

/// The tagging heuristics. A script receives every tag whose rule matches.
pub const TAG_RULES: &[TagRule] = &[
    rule(Tag::Interactive, Matcher::SourceRegex(r"\binput\s*\(")),
    rule(Tag::Interactive, Matcher::SourceKeyword("prompt_toolkit")),
    rule(Tag::Interactive, Matcher::SourceKeyword("questionary")),
    rule(Tag::Interactive, Matcher::SourceKeyword("human_in_the_loop")),
    rule(Tag::Interactive, Matcher::SourceKeyword("hitl")),
    rule(Tag::Server, Matcher::SegmentContains("server")),
    rule(Tag::Server, Matcher::SourceKeyword("uvicorn")),
    rule(Tag::Server, Matcher::SourceKeyword("fastapi")),
    rule(Tag::Server, Matcher::SourceKeyword("websocket")),
    rule(Tag::Audio, Matcher::SegmentEquals("voice")),
    rule(Tag::Audio, Matcher::SegmentEquals("realtime")),
    rule(Tag::Audio, Matcher::SourceKeyword("sounddevice")),
    rule(Tag::Audio, Matcher::SourceKeyword("microphone")),
    rule(Tag::Audio, Matcher::SourceKeyword("audioinput")),
    rule(Tag::External, Matcher::SourceKeyword("redis")),
    rule(Tag::External, Matcher::SourceKeyword("dapr")),
    rule(Tag::External, Matcher::SourceKeyword("twilio")),
    rule(Tag::External, Matcher::SourceKeyword("playwright")),
];

/// Compiled regexes for every `SourceRegex` rule, indexed like `TAG_RULES`.
fn compiled_rules() -> &'static [Option<Regex>] {
    static COMPILED: OnceLock<Vec<Option<Regex>>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        TAG_RULES
            .iter()
            .map(|rule| match rule.matcher {
                // Patterns are literals in this file; a typo shows up in the tests.
                Matcher::SourceRegex(pattern) => Regex::new(pattern).ok(),
                _ => None,
            })
            .collect()
    })
}

/// Detect the tags for a script.
///
/// `relpath` is the forward-slash relative path; `source` is the file text.
pub fn detect_tags(relpath: &str, source: &str) -> TagSet {
    let lower_source = source.to_lowercase();
    let segments: Vec<String> =
        relpath.split('/').filter(|s| !s.is_empty()).map(|s| s.to_lowercase()).collect();
    let compiled = compiled_rules();

    let mut tags = TagSet::new();
    for (idx, rule) in TAG_RULES.iter().enumerate() {
        if tags.contains(&rule.tag) {
            continue;
        }
        let hit = match rule.matcher {
            Matcher::SourceRegex(_) => {
                compiled[idx].as_ref().map(|re| re.is_match(source)).unwrap_or(false)
            }
            Matcher::SourceKeyword(keyword) => lower_source.contains(keyword),
            Matcher::SegmentContains(needle) => segments.iter().any(|s| s.contains(needle)),
            Matcher::SegmentEquals(needle) => segments.iter().any(|s| s == needle),
        };
        if hit {
            tags.insert(rule.tag);
        }
    }
    tags
}
