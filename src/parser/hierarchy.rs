use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;
use roxmltree::Node;

use crate::parser::markup;
use crate::parser::tree::{NodeArena, TreeNode};

/// Rebuilds the outline hierarchy implied by dotted enumerator identifiers.
///
/// The builder consumes one markup element at a time while carrying the
/// stack of currently open enumerator levels. An element whose identifier
/// extends an open level by exactly one segment becomes a structural child;
/// everything else folds into the current node's content.
#[derive(Debug)]
pub struct HierarchyBuilder {
    code_prefix: Regex,
    code_run: Regex,
    segment: Regex,
    marker_run: Regex,
}

impl HierarchyBuilder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            code_prefix: Regex::new(r"^(\d[A-Z]\d{3})")
                .context("failed to compile classification code regex")?,
            code_run: Regex::new(r"^\d[A-Z]\d{3}(?:\.[A-Za-z0-9-]+)*")
                .context("failed to compile code reference regex")?,
            segment: Regex::new(r"^[A-Za-z0-9]+(?:-[A-Za-z0-9]+)?$")
                .context("failed to compile enumerator segment regex")?,
            marker_run: Regex::new(r"^(?:[a-z0-9]{1,4}\.)+")
                .context("failed to compile enumerator marker regex")?,
        })
    }

    /// Candidate catalog roots inside one supplement: elements whose
    /// identifier attribute or heading text begins with a classification
    /// code. Deduplicated by code (first occurrence wins) and returned in
    /// sorted code order so catalog ordering does not depend on document
    /// scan order.
    pub fn collect_roots<'a, 'input>(
        &self,
        supplement: Node<'a, 'input>,
    ) -> Vec<(String, Node<'a, 'input>)> {
        let mut roots: BTreeMap<String, Node<'a, 'input>> = BTreeMap::new();

        for element in supplement.descendants().filter(|node| node.is_element()) {
            if element == supplement || markup::is_heading_element(element) {
                continue;
            }

            let candidate = markup::identifier_attr(element)
                .and_then(|value| self.code_of(value))
                .or_else(|| {
                    markup::head_text(element).and_then(|heading| self.code_of(&heading))
                });

            if let Some(code) = candidate {
                roots.entry(code).or_insert(element);
            }
        }

        roots.into_iter().collect()
    }

    pub fn build_tree(&self, code: &str, root_element: Node<'_, '_>) -> NodeArena {
        let mut arena = NodeArena::new();

        let mut root = TreeNode::new(
            Some(code.to_string()),
            self.root_heading(root_element, code),
            None,
        );
        root.path = vec![code.to_string()];
        root.is_eccn = true;
        let root_id = arena.push(root);

        let mut stack = vec![root_id];
        self.walk(root_element, &mut arena, &mut stack, root_id);
        self.suppress_duplicate_headings(&mut arena);

        arena
    }

    fn walk(
        &self,
        element: Node<'_, '_>,
        arena: &mut NodeArena,
        stack: &mut Vec<usize>,
        root_id: usize,
    ) {
        for child in element.children() {
            if !child.is_element() {
                continue;
            }

            if markup::is_heading_element(child) {
                let current = current_node(stack, root_id);
                if arena.get(current).heading.is_none() {
                    let text = markup::element_text(child);
                    if !text.is_empty() {
                        arena.get_mut(current).heading = Some(text);
                    }
                }
                continue;
            }

            if let Some(identifier) = markup::identifier_attr(child)
                && let Some(position) = self.continuation_position(arena, stack, identifier)
            {
                let parent_id = stack[position];
                stack.truncate(position + 1);
                let node_id = self.push_child(arena, parent_id, identifier, child);
                stack.push(node_id);
                self.walk(child, arena, stack, root_id);
                continue;
            }

            let current = current_node(stack, root_id);
            if arena.get(current).heading.is_none()
                && is_plain_paragraph(child)
                && markup::identifier_attr(child).is_none()
            {
                let text = markup::paragraph_text(child);
                if !text.is_empty() {
                    arena.get_mut(current).heading = Some(text);
                    continue;
                }
            }
            arena.get_mut(current).content.push(markup::fold_block(child));
        }
    }

    /// Deepest open level the identifier continues by exactly one segment.
    fn continuation_position(
        &self,
        arena: &NodeArena,
        stack: &[usize],
        identifier: &str,
    ) -> Option<usize> {
        for position in (0..stack.len()).rev() {
            let node = arena.get(stack[position]);
            let Some(base) = node.identifier.as_deref() else {
                continue;
            };
            if let Some(rest) = identifier.strip_prefix(base)
                && let Some(segment) = rest.strip_prefix('.')
                && self.segment.is_match(segment)
            {
                return Some(position);
            }
        }
        None
    }

    fn push_child(
        &self,
        arena: &mut NodeArena,
        parent_id: usize,
        identifier: &str,
        element: Node<'_, '_>,
    ) -> usize {
        let parent = arena.get(parent_id);
        let base_len = parent.identifier.as_deref().map_or(0, str::len);
        let segment = identifier.get(base_len + 1..).unwrap_or("").to_string();
        let mut path = parent.path.clone();
        path.push(segment);

        let mut node = TreeNode::new(
            Some(identifier.to_string()),
            self.structural_heading(element, identifier),
            Some(parent_id),
        );
        node.path = path;
        node.is_eccn = true;

        let node_id = arena.push(node);
        arena.get_mut(parent_id).children.push(node_id);
        node_id
    }

    fn root_heading(&self, element: Node<'_, '_>, code: &str) -> Option<String> {
        if let Some(head) = markup::head_text(element) {
            return Some(head);
        }
        if element
            .children()
            .any(|child| child.is_element() && !markup::is_heading_element(child))
        {
            // Container without a heading tag: defer to the first plain
            // paragraph picked up during the walk.
            return None;
        }
        self.heading_with_prose(&markup::paragraph_text(element), code)
    }

    /// Own heading tag first, then the element's own prose. Returns `None`
    /// when the prose is nothing beyond a repeated code reference, so the
    /// walk can pick the heading up from the following paragraph.
    fn structural_heading(&self, element: Node<'_, '_>, identifier: &str) -> Option<String> {
        if let Some(head) = markup::head_text(element) {
            return Some(head);
        }
        self.heading_with_prose(&markup::paragraph_text(element), identifier)
    }

    fn heading_with_prose(&self, text: &str, identifier: &str) -> Option<String> {
        if text.is_empty() || self.strip_enumeration(text, identifier).is_empty() {
            return None;
        }
        Some(text.to_string())
    }

    /// Drop a node's first content block when it merely repeats the heading.
    fn suppress_duplicate_headings(&self, arena: &mut NodeArena) {
        for index in 0..arena.len() {
            let node = arena.get(index);
            let Some(heading) = node.heading.clone() else {
                continue;
            };
            let Some(first) = node.first_content_text().map(ToOwned::to_owned) else {
                continue;
            };
            let identifier = node.identifier.clone().unwrap_or_default();

            let normalized_heading = self.normalized(&heading, &identifier);
            if !normalized_heading.is_empty()
                && normalized_heading == self.normalized(&first, &identifier)
            {
                arena.get_mut(index).content.remove(0);
            }
        }
    }

    fn normalized(&self, text: &str, identifier: &str) -> String {
        self.strip_enumeration(text, identifier).to_lowercase()
    }

    /// Text with enumerator markers, code references, and trailing
    /// punctuation stripped.
    fn strip_enumeration(&self, text: &str, identifier: &str) -> String {
        let trimmed = text.trim();
        let rest = if !identifier.is_empty() && trimmed.starts_with(identifier) {
            trimmed[identifier.len()..].to_string()
        } else {
            self.code_run.replace(trimmed, "").into_owned()
        };
        let rest = self.marker_run.replace(rest.trim_start(), "").into_owned();
        rest.trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | ':' | ';' | ',' | '-' | '–' | '—')
        })
        .to_string()
    }

    fn code_of(&self, value: &str) -> Option<String> {
        self.code_prefix
            .captures(value)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
    }
}

fn current_node(stack: &[usize], root_id: usize) -> usize {
    stack.last().copied().unwrap_or(root_id)
}

fn is_plain_paragraph(node: Node<'_, '_>) -> bool {
    let name = node.tag_name().name();
    name.eq_ignore_ascii_case("P") || name.eq_ignore_ascii_case("FP")
}
