//! Visible text extraction from HTML pages.

use scraper::{Html, Selector};

const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Visible body text, whitespace collapsed.
#[must_use]
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&selector).next() else {
        return String::new();
    };

    let mut text = String::new();
    for node in body.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = fragment.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    clean_text(&text)
}

/// Collapse runs of whitespace into single spaces.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` chars of `text`.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_and_styles_are_skipped() {
        let html = r"<html><head><title>AAPL</title><style>.x{color:red}</style></head>
            <body><h1>Apple Inc. (AAPL)</h1><script>var price = 1;</script>
            <p>190.12   +1.05
            (+0.55%)</p><noscript>enable js</noscript></body></html>";
        assert_eq!(visible_text(html), "Apple Inc. (AAPL) 190.12 +1.05 (+0.55%)");
    }

    #[test]
    fn missing_body_yields_empty_text() {
        assert_eq!(visible_text(""), "");
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Hello   world  \n\t  test  "), "Hello world test");
    }

    #[test]
    fn truncation_counts_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
