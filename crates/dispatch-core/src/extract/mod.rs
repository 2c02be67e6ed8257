//! Pure parser: job payload (HTML) -> ordered list of fenced code blocks.
//!
//! Sanitation of the payload is an API-layer concern; this function treats
//! its input as already-sanitized HTML and only walks `<pre><code>` pairs.

use scraper::{Html, Selector};

/// One fenced code block extracted from a job payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub content: String,
}

/// Extracts `{language, content}` pairs from `<pre>` elements containing a
/// direct `<code class="language-X">` child, in document order. Content has
/// every `'` replaced with `"`, matching the upstream sanitizer's transform.
pub fn extract(payload_html: &str) -> Vec<CodeBlock> {
    let document = Html::parse_document(payload_html);
    // `scraper`'s selector grammar supports the child combinator directly.
    let selector = Selector::parse("pre > code").expect("static selector is valid");

    document
        .select(&selector)
        .filter_map(|code_el| {
            let class = code_el.value().attr("class")?;
            let language = class.strip_prefix("language-")?.to_string();
            let content = code_el.text().next().unwrap_or_default().replace('\'', "\"");
            Some(CodeBlock { language, content })
        })
        .collect()
}

/// Fixed `language -> file extension` mapping; blocks using anything else
/// are rejected at the API boundary, not here.
pub fn extension_for_language(language: &str) -> Option<&'static str> {
    match language {
        "go" => Some("go"),
        "python" => Some("py"),
        "javascript" => Some("js"),
        "rust" => Some("rs"),
        "bash" => Some("sh"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_block_with_language_and_quote_substitution() {
        let html = r#"<pre><code class="language-go">package main
func main(){println('ok')}</code></pre>"#;
        let blocks = extract(html);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "go");
        assert!(blocks[0].content.contains("\"ok\""));
        assert!(!blocks[0].content.contains('\''));
    }

    #[test]
    fn preserves_document_order_across_multiple_blocks() {
        let html = r#"
            <pre><code class="language-python">print(1)</code></pre>
            <pre><code class="language-rust">fn main() {}</code></pre>
        "#;
        let blocks = extract(html);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[1].language, "rust");
    }

    #[test]
    fn ignores_code_elements_without_a_language_class() {
        let html = r#"<pre><code>no language here</code></pre>"#;
        assert!(extract(html).is_empty());
    }

    #[test]
    fn ignores_code_outside_a_pre_parent() {
        let html = r#"<p><code class="language-go">inline</code></p>"#;
        assert!(extract(html).is_empty());
    }
}
