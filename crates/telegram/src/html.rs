//! Plain-text fallback for Telegram HTML.
//!
//! When the Bot API rejects a message's entities, the same content is resent
//! without a parse mode. Tags are dropped, links keep their target and the
//! entities the relay emits are decoded.

/// Strip Telegram HTML down to readable plain text.
#[must_use]
pub fn html_to_plain(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pending_href: Option<String> = None;
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..start]));
        let after = &rest[start..];
        let Some(end) = after.find('>') else {
            // Unterminated tag: keep it as text.
            out.push_str(&decode_entities(after));
            rest = "";
            break;
        };
        let tag = &after[1..end];
        if let Some(href) = anchor_href(tag) {
            pending_href = Some(decode_entities(href));
        } else if tag.trim().eq_ignore_ascii_case("/a")
            && let Some(href) = pending_href.take()
        {
            out.push_str(" (");
            out.push_str(&href);
            out.push(')');
        } else if tag.trim_end_matches('/').trim().eq_ignore_ascii_case("br") {
            out.push('\n');
        }
        rest = &after[end + 1..];
    }
    out.push_str(&decode_entities(rest));
    out
}

fn anchor_href(tag: &str) -> Option<&str> {
    let tag = tag.trim();
    let attrs = tag.strip_prefix("a ").or_else(|| tag.strip_prefix("A "))?;
    let value = attrs.trim().strip_prefix("href=")?;
    let quote = value.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let inner = &value[1..];
    inner.find(quote).map(|end| &inner[..end])
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
