//! HTML → prose extraction.
//!
//! Keeps only the readable content of a page: script/style/noscript and
//! navigation chrome are dropped, block boundaries become newlines, and
//! whitespace is collapsed. The output feeds the segmenter directly.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Subtrees that never contain prose content.
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe", "svg",
    "button",
];

/// Elements whose boundaries should become line breaks in the output.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "li", "ul", "ol", "table", "tr", "blockquote", "pre", "br",
    "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Extract prose text from an HTML page.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    let mut raw = String::new();
    if let Some(root) = find_content_root(&doc) {
        collect_text(root, &mut raw);
    }

    collapse_whitespace(&raw)
}

/// Readability heuristics: prefer `<main>`/`<article>`, fall back to body.
fn find_content_root(doc: &Html) -> Option<ElementRef<'_>> {
    let selectors = ["main", "article", r#"[role="main"]"#, ".content", "body"];

    for sel_str in selectors {
        let sel = Selector::parse(sel_str).expect("static selector");
        if let Some(el) = doc.select(&sel).next() {
            return Some(el);
        }
    }
    None
}

/// Walk the element's subtree, appending text nodes and marking block
/// boundaries with newlines. Excluded subtrees are skipped entirely.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => out.push_str(text),
            scraper::Node::Element(element) => {
                let name = element.name();
                if EXCLUDED_TAGS.contains(&name) {
                    continue;
                }
                let is_block = BLOCK_TAGS.contains(&name);
                if is_block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if is_block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapse whitespace: spaces/tabs within lines become single spaces, lines
/// are trimmed, and runs of blank lines become one paragraph break.
fn collapse_whitespace(text: &str) -> String {
    static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
    static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

    let joined = text
        .lines()
        .map(|line| SPACE_RUN.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_RUN.replace_all(&joined, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_style_and_chrome() {
        let html = r#"<html><head><style>.x{color:red}</style></head><body>
            <nav><a href="/">Home</a><a href="/help">Help</a></nav>
            <main>
                <h1>Criar conta</h1>
                <p>Baixe o aplicativo    e toque em <b>Criar conta</b>.</p>
                <script>track("page");</script>
            </main>
            <footer>© 2024</footer>
        </body></html>"#;

        let text = extract_text(html);
        assert!(text.contains("Criar conta"));
        assert!(text.contains("Baixe o aplicativo e toque em Criar conta."));
        assert!(!text.contains("Home"));
        assert!(!text.contains("track"));
        assert!(!text.contains("color:red"));
        assert!(!text.contains("© 2024"));
    }

    #[test]
    fn falls_back_to_body_without_main() {
        let html = "<html><body><p>Plain page.</p></body></html>";
        assert_eq!(extract_text(html), "Plain page.");
    }

    #[test]
    fn block_boundaries_become_paragraph_breaks() {
        let html = "<html><body><main><p>First.</p><p>Second.</p></main></body></html>";
        let text = extract_text(html);
        assert_eq!(text, "First.\n\nSecond.");
    }

    #[test]
    fn empty_document_yields_empty_text() {
        assert_eq!(extract_text(""), "");
        assert_eq!(extract_text("<html><body><nav>only nav</nav></body></html>"), "");
    }
}
