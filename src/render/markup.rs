//! Lightweight markup to Telegram HTML
//!
//! Reserved characters are escaped before any tag is inserted. Code spans
//! and links are set aside behind placeholders so nothing inside them is
//! reinterpreted, then restored once the structural rules have run.

use regex::{Captures, Regex};
use std::sync::LazyLock;

const STASH_OPEN: char = '\u{E000}';
const STASH_CLOSE: char = '\u{E001}';

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*\n?(.*?)```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[([^\]\n]+)\]\((https?://[^\s)"]+)\)"#).unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+)$").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)[-*+][ \t]+").unwrap());
static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^&gt;[ \t]?(.*)$").unwrap());
static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.+?)__").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").unwrap());
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+)_\b").unwrap());
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").unwrap());

/// Escape the characters Telegram HTML reserves
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Convert markdown-flavoured text to Telegram's HTML subset
pub fn to_html(text: &str) -> String {
    let mut stash = Stash::default();

    // Placeholder delimiters already in the text are stashed as literals
    let mut shielded = String::with_capacity(text.len());
    for c in text.chars() {
        if c == STASH_OPEN || c == STASH_CLOSE {
            shielded.push_str(&stash.put_literal(c));
        } else {
            shielded.push(c);
        }
    }

    let html = escape(&shielded);
    let html = FENCED_CODE.replace_all(&html, |caps: &Captures| {
        stash.put(format!("<pre><code>{}</code></pre>", &caps[1]))
    });
    let html = INLINE_CODE.replace_all(&html, |caps: &Captures| {
        stash.put(format!("<code>{}</code>", &caps[1]))
    });
    let html = LINK.replace_all(&html, |caps: &Captures| {
        stash.put(format!("<a href=\"{}\">{}</a>", &caps[2], &caps[1]))
    });

    let html = HEADING.replace_all(&html, "<b>$1</b>");
    let html = BULLET.replace_all(&html, "$1• ");
    let html = BLOCKQUOTE.replace_all(&html, "<blockquote>$1</blockquote>");
    let html = html.replace("</blockquote>\n<blockquote>", "\n");
    let html = BOLD_STARS.replace_all(&html, "<b>$1</b>");
    let html = BOLD_UNDERSCORES.replace_all(&html, "<b>$1</b>");
    let html = STRIKE.replace_all(&html, "<s>$1</s>");
    let html = ITALIC_STAR.replace_all(&html, "<i>$1</i>");
    let html = ITALIC_UNDERSCORE.replace_all(&html, "<i>$1</i>");

    stash.restore(&html)
}

struct Fragment {
    html: String,
    /// Inserted verbatim, never scanned for placeholders
    literal: bool,
}

/// Fragments set aside from the structural rules
#[derive(Default)]
struct Stash {
    fragments: Vec<Fragment>,
}

impl Stash {
    fn put(&mut self, html: String) -> String {
        self.push(Fragment {
            html,
            literal: false,
        })
    }

    fn put_literal(&mut self, c: char) -> String {
        self.push(Fragment {
            html: c.to_string(),
            literal: true,
        })
    }

    fn push(&mut self, fragment: Fragment) -> String {
        let index = self.fragments.len();
        self.fragments.push(fragment);
        format!("{STASH_OPEN}{index}{STASH_CLOSE}")
    }

    fn restore(&self, html: &str) -> String {
        self.expand(html, self.fragments.len())
    }

    /// Replace placeholders in one pass. A fragment only ever holds
    /// placeholders stashed before it, so nested expansion only resolves
    /// indices below its own.
    fn expand(&self, html: &str, below: usize) -> String {
        PLACEHOLDER
            .replace_all(html, |caps: &Captures| {
                let found = caps[1]
                    .parse::<usize>()
                    .ok()
                    .filter(|index| *index < below)
                    .and_then(|index| self.fragments.get(index).map(|f| (index, f)));
                match found {
                    Some((_, fragment)) if fragment.literal => fragment.html.clone(),
                    Some((index, fragment)) => self.expand(&fragment.html, index),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
