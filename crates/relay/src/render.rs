//! Text rendering for relayed content: author headers, reply markers,
//! poll summaries and length clamping per destination markup.

use tgdc_channels::{Capabilities, Markup, Platform, PollSnapshot};

/// Sent instead of an empty body, which neither platform accepts.
pub const EMPTY_PLACEHOLDER: &str = "…";

const PERSONA_NAME_MAX: usize = 32;

/// Truncate to at most `max` characters (not bytes).
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape(markup: Markup, text: &str) -> String {
    match markup {
        Markup::Html => escape_html(text),
        Markup::Markdown => text.to_string(),
    }
}

/// `[TG | name]` in bold, for messages sent under the bridge's own account.
#[must_use]
pub fn author_header(markup: Markup, origin: Platform, name: &str) -> String {
    let label = format!("[{} | {}]", origin.tag(), name.trim());
    match markup {
        Markup::Html => format!("<b>{}</b>", escape_html(&label)),
        Markup::Markdown => format!("**{label}**"),
    }
}

/// Reply marker for a reply whose target cannot be referenced natively.
/// With a link it points at the mirrored target, otherwise it is plain text.
#[must_use]
pub fn reply_marker(markup: Markup, link: Option<&str>) -> String {
    match (markup, link) {
        (Markup::Html, Some(url)) => {
            format!("⤴️ <a href=\"{}\">In reply to</a>", escape_html(url))
        },
        (Markup::Markdown, Some(url)) => format!("⤴️ [In reply to]({url})"),
        (_, None) => "↪ in reply to".to_string(),
    }
}

/// Plain-text summary of a poll. Markup is applied by the caller.
#[must_use]
pub fn render_poll(poll: &PollSnapshot) -> String {
    let mut out = format!("📊 {}\n", poll.question.trim());
    for option in &poll.options {
        out.push_str(&format!("• {} ({})\n", option.text.trim(), option.votes));
    }
    let kind = if poll.anonymous {
        "anonymous"
    } else {
        "open"
    };
    let state = if poll.closed {
        "closed"
    } else {
        "active"
    };
    out.push_str(&format!("[{kind} poll, {state}]"));
    out
}

/// Notice sent instead of media above the destination's upload cap.
#[must_use]
pub fn too_large_notice(kind: &str, size: u64, cap: u64) -> String {
    format!(
        "[{kind} too large to relay: {:.1} MiB, limit {:.1} MiB]",
        size as f64 / 1_048_576.0,
        cap as f64 / 1_048_576.0
    )
}

/// Display name for impersonated sends. Platforms cap these at 32 chars
/// and reject empty names.
#[must_use]
pub fn persona_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "Unknown".to_string();
    }
    truncate_chars(trimmed, PERSONA_NAME_MAX).to_string()
}

/// Pieces of one outbound text, assembled by [`compose_text`].
#[derive(Debug, Default, Clone)]
pub struct TextParts<'a> {
    /// Already-formatted header line (see [`author_header`]).
    pub header: Option<&'a str>,
    /// Already-formatted reply marker (see [`reply_marker`]).
    pub marker: Option<&'a str>,
    /// Raw user text; escaped here for the destination markup.
    pub body: Option<&'a str>,
    /// Raw notice appended after the body (oversize media, sticker links).
    pub notice: Option<&'a str>,
}

/// Assemble header, marker, body and notice for a destination.
///
/// Raw text is clamped to `max_body_chars` before escaping, then the
/// escaped body is clamped again so the whole message fits the
/// destination's length limit. An empty result becomes
/// [`EMPTY_PLACEHOLDER`] unless `allow_empty` is set (media captions).
#[must_use]
pub fn compose_text(
    caps: &Capabilities,
    max_body_chars: usize,
    parts: &TextParts<'_>,
    allow_empty: bool,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    if let Some(header) = parts.header {
        lines.push(header.to_string());
    }
    if let Some(marker) = parts.marker {
        lines.push(marker.to_string());
    }
    let fixed_len: usize = lines.iter().map(|l| l.chars().count() + 1).sum();

    let notice = parts
        .notice
        .map(|n| escape(caps.markup, n))
        .filter(|n| !n.is_empty());
    let notice_len = notice.as_ref().map_or(0, |n| n.chars().count() + 1);

    let raw = parts
        .body
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(|b| truncate_chars(b, max_body_chars));
    if let Some(raw) = raw {
        let budget = caps
            .max_message_len
            .saturating_sub(fixed_len)
            .saturating_sub(notice_len);
        lines.push(clamp_escaped(caps.markup, raw, budget));
    }
    if let Some(notice) = notice {
        lines.push(notice);
    }

    let text = lines.join("\n");
    if text.trim().is_empty() {
        if allow_empty {
            String::new()
        } else {
            EMPTY_PLACEHOLDER.to_string()
        }
    } else {
        truncate_chars(&text, caps.max_message_len).to_string()
    }
}

/// Escape `raw` and cut it so the escaped form fits `budget` characters
/// without splitting an entity.
fn clamp_escaped(markup: Markup, raw: &str, budget: usize) -> String {
    let escaped = escape(markup, raw);
    if escaped.chars().count() <= budget {
        return escaped;
    }
    let mut out = String::new();
    let mut used = 0;
    for c in raw.chars() {
        let piece = escape(markup, c.encode_utf8(&mut [0; 4]));
        let len = piece.chars().count();
        if used + len > budget {
            break;
        }
        used += len;
        out.push_str(&piece);
    }
    out
}
