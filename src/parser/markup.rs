use roxmltree::Node;

use crate::model::ContentBlock;

/// Element attribute that carries the source identifier, e.g. `N="3B001.a"`.
pub fn identifier_attr<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.attribute("N")
}

pub fn is_heading_element(node: Node<'_, '_>) -> bool {
    if !node.is_element() {
        return false;
    }
    let name = node.tag_name().name();
    name.eq_ignore_ascii_case("HEAD")
        || name.eq_ignore_ascii_case("HED")
        || name.to_ascii_uppercase().starts_with("HD")
}

/// Text of the element's own heading child, if it has one.
pub fn head_text(node: Node<'_, '_>) -> Option<String> {
    let head = node
        .children()
        .find(|child| is_heading_element(*child))?;
    let text = element_text(head);
    if text.is_empty() { None } else { Some(text) }
}

/// All descendant text of an element, whitespace-collapsed.
pub fn element_text(node: Node<'_, '_>) -> String {
    let mut raw = String::new();
    for descendant in node.descendants() {
        if descendant.is_text()
            && let Some(text) = descendant.text()
        {
            raw.push_str(text);
        }
    }
    collapse_whitespace(&raw)
}

/// Text of the element itself: direct text nodes plus inline markup
/// (emphasis, superscripts), but not nested block-level elements. This is
/// what a paragraph "says" before any structural children begin.
pub fn paragraph_text(node: Node<'_, '_>) -> String {
    let mut raw = String::new();
    collect_inline_text(&mut raw, node);
    collapse_whitespace(&raw)
}

fn collect_inline_text(out: &mut String, node: Node<'_, '_>) {
    for child in node.children() {
        if child.is_text() {
            out.push_str(child.text().unwrap_or(""));
        } else if child.is_element() && is_inline_element(child) {
            collect_inline_text(out, child);
        }
    }
}

fn is_inline_element(node: Node<'_, '_>) -> bool {
    matches!(
        node.tag_name().name().to_ascii_uppercase().as_str(),
        "E" | "I" | "B" | "SU" | "SUP"
    )
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold a non-structural element into a content block. Plain paragraphs
/// without nested markup become text blocks; everything else keeps its
/// rendered markup alongside the extracted text and the source element id.
pub fn fold_block(node: Node<'_, '_>) -> ContentBlock {
    let tag = node.tag_name().name().to_ascii_lowercase();
    let text = element_text(node);
    let has_markup = node.children().any(|child| child.is_element());
    let identified = node.attribute("N").is_some() || node.attribute("ID").is_some();

    if (tag == "p" || tag == "fp") && !has_markup && !identified {
        return ContentBlock::Text { text };
    }

    ContentBlock::Html {
        tag,
        html: render_html(node),
        text: if text.is_empty() { None } else { Some(text) },
        id: node
            .attribute("N")
            .or_else(|| node.attribute("ID"))
            .map(ToOwned::to_owned),
    }
}

/// Lowercase-tag rendering of an element subtree for display clients.
pub fn render_html(node: Node<'_, '_>) -> String {
    let mut out = String::new();
    write_node(&mut out, node);
    out
}

fn write_node(out: &mut String, node: Node<'_, '_>) {
    if node.is_text() {
        push_escaped(out, node.text().unwrap_or(""));
        return;
    }
    if !node.is_element() {
        return;
    }

    let tag = node.tag_name().name().to_ascii_lowercase();
    out.push('<');
    out.push_str(&tag);
    out.push('>');
    for child in node.children() {
        write_node(out, child);
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_text_collapses_nested_whitespace() {
        let doc = roxmltree::Document::parse(
            "<P>a.   Equipment <E>designed</E>\n  for epitaxial growth</P>",
        )
        .expect("fixture should parse");

        assert_eq!(
            element_text(doc.root_element()),
            "a. Equipment designed for epitaxial growth"
        );
    }

    #[test]
    fn fold_block_keeps_plain_paragraphs_as_text() {
        let doc = roxmltree::Document::parse("<P>Plain prose.</P>").expect("fixture should parse");

        let block = fold_block(doc.root_element());
        assert_eq!(
            block,
            ContentBlock::Text {
                text: "Plain prose.".to_string()
            }
        );
    }

    #[test]
    fn fold_block_renders_markup_elements_with_id() {
        let doc = roxmltree::Document::parse("<NOTE N=\"n-1\"><HED>Note:</HED><P>See 744.</P></NOTE>")
            .expect("fixture should parse");

        let block = fold_block(doc.root_element());
        match block {
            ContentBlock::Html { tag, html, text, id } => {
                assert_eq!(tag, "note");
                assert_eq!(html, "<note><hed>Note:</hed><p>See 744.</p></note>");
                assert_eq!(text.as_deref(), Some("Note: See 744."));
                assert_eq!(id.as_deref(), Some("n-1"));
            }
            ContentBlock::Text { .. } => panic!("markup element should fold as html"),
        }
    }

    #[test]
    fn render_html_escapes_reserved_characters() {
        let doc = roxmltree::Document::parse("<P>5 &lt; 7 &amp; 9 &gt; 3</P>")
            .expect("fixture should parse");

        assert_eq!(
            render_html(doc.root_element()),
            "<p>5 &lt; 7 &amp; 9 &gt; 3</p>"
        );
    }
}
