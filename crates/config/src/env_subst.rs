//! `${VAR}` and `${VAR:-fallback}` expansion over raw config text.

/// Expand placeholders from the process environment.
///
/// Unset variables without a fallback are left as-is, so a missing token
/// shows up verbatim in validation instead of as an empty string.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(end) = body.find('}') else {
            // Unterminated: keep the tail literally.
            out.push_str(&rest[start..]);
            return out;
        };
        let expr = &body[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };

        match (name.is_empty(), lookup(name).filter(|v| !v.is_empty()), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &body[end + 1..];
    }
    out.push_str(rest);
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn lookup(name: &str) -> Option<String> {
        match name {
            "TG_TOKEN" => Some("123:abc".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[rstest]
    #[case("plain text", "plain text")]
    #[case("token = \"${TG_TOKEN}\"", "token = \"123:abc\"")]
    #[case("${TG_TOKEN}${TG_TOKEN}", "123:abc123:abc")]
    #[case("${MISSING}", "${MISSING}")]
    #[case("${MISSING:-fallback}", "fallback")]
    #[case("${TG_TOKEN:-fallback}", "123:abc")]
    #[case("${EMPTY:-x}", "x")]
    #[case("${}", "${}")]
    #[case("cost ${OPEN", "cost ${OPEN")]
    #[case("$TG_TOKEN", "$TG_TOKEN")]
    fn expands_placeholders(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(substitute_env_with(input, lookup), expected);
    }

    #[test]
    fn reads_the_process_environment() {
        assert_eq!(substitute_env("no placeholders"), "no placeholders");
    }
}
