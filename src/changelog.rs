//! Release note digest
//!
//! Turns the markdown release note returned by the metadata source into a
//! short plaintext digest suitable for a chat message: headings become
//! section titles, list items become bullets, everything else is dropped.
//!
//! ```
//! use mirror_watch::changelog::ReleaseDigest;
//!
//! let digest = ReleaseDigest::parse("### Fixes\n- Fixed *crash* on start\n<!-- hidden -->\n");
//! assert_eq!(digest.render(), "Fixes\n  • Fixed crash on start");
//! ```

use regex::Regex;
use std::sync::LazyLock;

/// Rendered when a release note contains no non-empty section
pub const NO_DETAILS_MARKER: &str = "No detailed release notes";

// The patterns below are literals; compiling them cannot fail.
#[allow(clippy::expect_used)]
static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
#[allow(clippy::expect_used)]
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
#[allow(clippy::expect_used)]
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));
#[allow(clippy::expect_used)]
static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:>[ \t]*)+").expect("valid regex"));
#[allow(clippy::expect_used)]
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*+([^*]+)\*+").expect("valid regex"));

/// One heading and the list items under it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestSection {
    /// Heading text without the leading `#` markers
    pub title: String,
    /// List items in document order
    pub bullets: Vec<String>,
}

/// Sectioned plaintext digest of a release note
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseDigest {
    /// Sections with at least one bullet, in document order
    pub sections: Vec<DigestSection>,
}

impl ReleaseDigest {
    /// Extract sections from a raw markdown release note
    pub fn parse(raw: &str) -> Self {
        let cleaned = strip_markup(raw);

        let mut sections = Vec::new();
        let mut current: Option<DigestSection> = None;

        for line in cleaned.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('#') {
                flush(&mut sections, current.take());
                current = Some(DigestSection {
                    title: line.trim_start_matches('#').trim().to_string(),
                    bullets: Vec::new(),
                });
            } else if line.starts_with(['-', '*'])
                && let Some(section) = current.as_mut()
                && let Some(bullet) = clean_bullet(line)
            {
                section.bullets.push(bullet);
            }
        }
        flush(&mut sections, current);

        Self { sections }
    }

    /// True when no section survived
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Render as `title` lines followed by `"  • bullet"` lines
    pub fn render(&self) -> String {
        if self.sections.is_empty() {
            return NO_DETAILS_MARKER.to_string();
        }

        let mut lines = Vec::new();
        for section in &self.sections {
            lines.push(section.title.clone());
            for bullet in &section.bullets {
                lines.push(format!("  • {bullet}"));
            }
        }
        lines.join("\n")
    }
}

/// Parse and render in one step
pub fn format_release_note(raw: &str) -> String {
    ReleaseDigest::parse(raw).render()
}

fn strip_markup(raw: &str) -> String {
    let text = HTML_COMMENT.replace_all(raw, "");
    // Images first, otherwise the link rule leaves a stray "!alt".
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    BLOCKQUOTE.replace_all(&text, "").into_owned()
}

fn clean_bullet(line: &str) -> Option<String> {
    // Thematic breaks ("---", "***") are not list items.
    if line.chars().all(|c| matches!(c, '-' | '*' | ' ')) {
        return None;
    }
    let item = line[1..].trim_start();
    let item = EMPHASIS.replace_all(item, "$1");
    let item = item.trim();
    (!item.is_empty()).then(|| item.to_string())
}

fn flush(sections: &mut Vec<DigestSection>, section: Option<DigestSection>) {
    if let Some(section) = section
        && !section.bullets.is_empty()
    {
        sections.push(section);
    }
}
