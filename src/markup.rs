//! Label mini-markup and character escaping.
//!
//! Labels in manifests (display names, table titles, navigation names) accept
//! a small inline syntax:
//!
//! | markup | HTML |
//! |--------|------|
//! | `**bold**` | `<strong>bold</strong>` |
//! | `__italic__` | `<em>italic</em>` |
//! | `--underline--` | `<u>underline</u>` |
//! | `~~strike~~` | `<del>strike</del>` |
//! | `[rouge]text[/rouge]` | `<span style="color:red">text</span>` |
//! | `[couleur:#336699]text[/couleur]` | `<span style="color:#336699">text</span>` |
//!
//! Named colors are `rouge`, `bleu`, `vert`, `jaune`, `violet`, `orange`,
//! `gris` and `noir`. Custom colors accept `#rrggbb`, `rgb(...)` and
//! `rgba(...)`.
//!
//! Non-ASCII characters are then written as numeric character references,
//! except Hebrew (U+0590..U+05FF), which is kept verbatim so that it keeps
//! its bidirectional shaping in every browser.

use maud::Escaper;
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

static STRONG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.*?)__").unwrap());
static UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--(.*?)--").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.*?)~~").unwrap());
static CUSTOM_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[couleur:(#[0-9a-fA-F]{6}|rgba?\([^)]+\))\]").unwrap()
});

const NAMED_COLORS: [(&str, &str); 8] = [
    ("rouge", "red"),
    ("bleu", "blue"),
    ("vert", "green"),
    ("jaune", "gold"),
    ("violet", "purple"),
    ("orange", "orange"),
    ("gris", "gray"),
    ("noir", "black"),
];

const HEBREW: std::ops::RangeInclusive<u32> = 0x0590..=0x05FF;

/// Expand the inline markup of a label into HTML.
pub fn apply_mini_markup(text: &str) -> String {
    let mut out = STRONG.replace_all(text, "<strong>$1</strong>").into_owned();
    out = EMPHASIS.replace_all(&out, "<em>$1</em>").into_owned();
    out = UNDERLINE.replace_all(&out, "<u>$1</u>").into_owned();
    out = STRIKE.replace_all(&out, "<del>$1</del>").into_owned();

    for (name, css) in NAMED_COLORS {
        out = out
            .replace(&format!("[{name}]"), &format!(r#"<span style="color:{css}">"#))
            .replace(&format!("[/{name}]"), "</span>");
    }

    out = CUSTOM_COLOR
        .replace_all(&out, r#"<span style="color:$1">"#)
        .into_owned();
    out.replace("[/couleur]", "</span>")
}

/// Replace every non-ASCII, non-Hebrew character with `&#<decimal>;`.
pub fn escape_accents(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let code = c as u32;
        if code > 0x7F && !HEBREW.contains(&code) {
            let _ = write!(out, "&#{code};");
        } else {
            out.push(c);
        }
    }
    out
}

/// HTML-escape `&`, `<`, `>` and `"`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let _ = Escaper::new(&mut out).write_str(text);
    out
}

/// Full label pipeline: escape, expand markup, escape accents.
pub fn render_label(text: &str) -> String {
    escape_accents(&apply_mini_markup(&escape_html(text)))
}
