//! Recursive cleaning of untrusted feed strings.

use scraper::{Html, Node};
use serde_json::Value as JsonValue;

const DROPPED_ELEMENTS: [&str; 2] = ["script", "style"];

pub fn sanitize(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(text) => JsonValue::String(sanitize_text(&text)),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sanitize).collect()),
        JsonValue::Object(map) => {
            JsonValue::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect())
        }
        other => other,
    }
}

/// Decodes entities, drops `<script>` and `<style>` blocks with their content, strips all other
/// markup and trims surrounding whitespace. Repeats until the text stops changing, so the result
/// is a fixed point.
///
/// Text is tokenized as HTML: a `<` directly followed by a letter opens a tag, so `Kids<age`
/// comes out as `Kids`. A `<` followed by a space or digit stays literal.
pub fn sanitize_text(input: &str) -> String {
    let mut current = input.trim().to_string();
    // A pass that changes the text consumes markup or entity syntax, so this terminates.
    loop {
        let next = strip_markup(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_markup(input: &str) -> String {
    if !input.contains(['<', '&']) {
        return input.trim().to_string();
    }

    let fragment = Html::parse_fragment(input);
    let mut out = String::with_capacity(input.len());
    for node in fragment.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let dropped = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().is_some_and(|el| {
                DROPPED_ELEMENTS
                    .iter()
                    .any(|name| el.name().eq_ignore_ascii_case(name))
            })
        });
        if !dropped {
            out.push_str(text);
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn script_blocks_are_removed_with_their_content() {
        assert_eq!(sanitize_text("<script>alert(1)</script>Hello"), "Hello");
        assert_eq!(
            sanitize_text("<SCRIPT type=\"text/javascript\">steal()</SCRIPT>Lobby"),
            "Lobby"
        );
    }

    #[test]
    fn style_blocks_are_removed_with_their_content() {
        assert_eq!(sanitize_text("<style>body{color:red}</style>Lobby"), "Lobby");
    }

    #[test]
    fn less_than_before_a_letter_opens_a_tag() {
        assert_eq!(sanitize_text("Kids<age"), "Kids");
        assert_eq!(sanitize_text("Kids < 12 stay free"), "Kids < 12 stay free");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(sanitize_text("Test &amp; Hotel"), "Test & Hotel");
        assert_eq!(
            sanitize_text("Nested &quot;quoted&quot; text"),
            "Nested \"quoted\" text"
        );
    }

    #[test]
    fn markup_is_stripped_and_whitespace_trimmed() {
        assert_eq!(
            sanitize_text("  <p>Sea <b>view</b> suite</p>\n"),
            "Sea view suite"
        );
        assert_eq!(sanitize_text("Rooms < 40 sqm"), "Rooms < 40 sqm");
    }

    #[test]
    fn encoded_markup_is_stripped_after_decoding() {
        assert_eq!(
            sanitize_text("&lt;script&gt;alert(1)&lt;/script&gt;Hello"),
            "Hello"
        );
    }

    #[test]
    fn nested_structures_keep_shape_and_keys() {
        let raw = json!({
            "Name ": " Beach &amp; Villas ",
            "stars": 5,
            "open": true,
            "note": null,
            "images": {
                "rooms": [{ "caption": "<i>Double</i> room" }]
            },
            "tags": ["<b>Pool</b>", 3.5]
        });

        let clean = sanitize(raw);

        assert_eq!(
            clean,
            json!({
                "Name ": "Beach & Villas",
                "stars": 5,
                "open": true,
                "note": null,
                "images": {
                    "rooms": [{ "caption": "Double room" }]
                },
                "tags": ["Pool", 3.5]
            })
        );
    }

    #[test]
    fn sanitize_is_idempotent() {
        let raw = json!({
            "a": "<script>x()</script> Tom &amp;amp; Jerry &lt;b&gt;bold&lt;/b&gt; ",
            "b": ["&nbsp;spaced&nbsp;", "<div><p>deep</p></div>"],
            "c": { "d": "plain" }
        });
        let once = sanitize(raw);
        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn deeply_encoded_markup_settles_in_one_call() {
        let mut encoded = "&lt;b&gt;x".to_string();
        for _ in 0..20 {
            encoded = encoded.replace('&', "&amp;");
        }

        let once = sanitize(json!({ "name": encoded }));
        assert_eq!(once, json!({ "name": "x" }));
        assert_eq!(sanitize(once.clone()), once);
    }
}
