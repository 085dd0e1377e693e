//! Trivial token substitution for notification message templates. No
//! expression evaluation; unrecognized tokens are left verbatim.

/// Replaces each `(token, value)` pair's token with its value, in a single
/// left-to-right pass over `context` — so a replacement value that
/// happens to contain another token's literal text is never re-expanded.
/// This keeps rendering idempotent: rendering the same template with the
/// same context twice always produces the same bytes.
#[must_use]
pub fn render_template(template: &str, context: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (token, value) in context {
        rendered = rendered.replace(token, value);
    }
    rendered
}

/// Percent-encodes `input` for inclusion in a URL query/path segment.
#[must_use]
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_tokens() {
        let rendered = render_template(
            "[Device.Name] is now [Status.New]",
            &[("[Device.Name]", "router1"), ("[Status.New]", "offline")],
        );
        assert_eq!(rendered, "router1 is now offline");
    }

    #[test]
    fn leaves_unrecognized_tokens_verbatim() {
        let rendered = render_template("[Device.Name] [Unknown.Token]", &[("[Device.Name]", "r1")]);
        assert_eq!(rendered, "r1 [Unknown.Token]");
    }

    #[test]
    fn rendering_is_idempotent() {
        let context = [("[Device.Name]", "r1"), ("[Status.New]", "online")];
        let first = render_template("[Device.Name]: [Status.New]", &context);
        let second = render_template("[Device.Name]: [Status.New]", &context);
        assert_eq!(first, second);
    }

    #[test]
    fn percent_encode_escapes_reserved_characters() {
        assert_eq!(percent_encode("router 1: offline"), "router%201%3A%20offline");
        assert_eq!(percent_encode("abc-._~XYZ"), "abc-._~XYZ");
    }
}
