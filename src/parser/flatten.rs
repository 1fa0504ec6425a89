use crate::model::{EccnEntry, StructureNode, SupplementRef};
use crate::parser::tree::NodeArena;

/// Depth-first pre-order walk emitting one catalog entry per addressable
/// node. Bound children are skipped (they remain visible inside the parent
/// entry's structure) but their own descendants are still visited.
pub fn flatten_tree(arena: &NodeArena, supplement: &SupplementRef, entries: &mut Vec<EccnEntry>) {
    if arena.is_empty() {
        return;
    }
    emit(arena, 0, supplement, entries);
}

fn emit(arena: &NodeArena, index: usize, supplement: &SupplementRef, entries: &mut Vec<EccnEntry>) {
    let node = arena.get(index);

    if !node.bound_to_parent
        && let Some(code) = node.identifier.as_deref()
    {
        entries.push(build_entry(arena, index, code, supplement));
    }

    for &child in &node.children {
        emit(arena, child, supplement, entries);
    }
}

fn build_entry(
    arena: &NodeArena,
    index: usize,
    code: &str,
    supplement: &SupplementRef,
) -> EccnEntry {
    let node = arena.get(index);
    let heading = node.heading.clone().unwrap_or_default();

    let child_eccns = if node.requires_all_children {
        Vec::new()
    } else {
        node.children
            .iter()
            .filter(|&&child| !arena.get(child).bound_to_parent)
            .filter_map(|&child| arena.get(child).identifier.clone())
            .collect()
    };

    EccnEntry {
        eccn: code.to_string(),
        title: title_from_heading(&heading, code),
        heading,
        category: code.chars().take(1).collect(),
        group: code.chars().take(2).collect(),
        breadcrumbs: breadcrumbs(arena, index),
        supplement: supplement.clone(),
        structure: serialize_node(arena, index),
        parent_eccn: structural_parent(arena, index),
        child_eccns,
    }
}

/// Ancestor headings collected root-ward and reversed into top-down order.
/// The supplement boundary is the tree root's (absent) parent, so it never
/// appears here.
fn breadcrumbs(arena: &NodeArena, index: usize) -> Vec<String> {
    let mut crumbs = Vec::new();
    let mut current = arena.get(index).parent;
    while let Some(parent) = current {
        let node = arena.get(parent);
        crumbs.push(
            node.heading
                .clone()
                .or_else(|| node.identifier.clone())
                .unwrap_or_default(),
        );
        current = node.parent;
    }
    crumbs.reverse();
    crumbs
}

fn structural_parent(arena: &NodeArena, index: usize) -> Option<String> {
    let mut current = arena.get(index).parent;
    while let Some(parent) = current {
        let node = arena.get(parent);
        if !node.bound_to_parent
            && let Some(identifier) = node.identifier.clone()
        {
            return Some(identifier);
        }
        current = node.parent;
    }
    None
}

/// Strip a leading `<code>` or `ECCN <code>` prefix (case-insensitive,
/// optional separating dash) off the heading.
pub fn title_from_heading(heading: &str, code: &str) -> String {
    let mut rest = heading.trim();
    if let Some(stripped) = strip_prefix_ignore_case(rest, "ECCN") {
        rest = stripped.trim_start();
    }
    if let Some(stripped) = strip_prefix_ignore_case(rest, code) {
        rest = stripped;
    }
    rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | '—' | ':'))
        .to_string()
}

fn strip_prefix_ignore_case<'t>(text: &'t str, prefix: &str) -> Option<&'t str> {
    if text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn serialize_node(arena: &NodeArena, index: usize) -> StructureNode {
    let node = arena.get(index);
    StructureNode {
        identifier: node.identifier.clone(),
        label: node
            .identifier
            .as_deref()
            .and_then(|identifier| identifier.split_once('.'))
            .map(|(_, suffix)| suffix.to_string()),
        heading: node.heading.clone(),
        content: node.content.clone(),
        children: node
            .children
            .iter()
            .map(|&child| serialize_node(arena, child))
            .collect(),
        is_eccn: node.is_eccn,
        bound_to_parent: node.bound_to_parent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tree::TreeNode;

    fn supplement() -> SupplementRef {
        SupplementRef {
            number: 1,
            heading: "Supplement No. 1 to Part 774—The Commerce Control List".to_string(),
        }
    }

    fn push_node(
        arena: &mut NodeArena,
        identifier: &str,
        heading: &str,
        parent: Option<usize>,
    ) -> usize {
        let mut node = TreeNode::new(
            Some(identifier.to_string()),
            Some(heading.to_string()),
            parent,
        );
        node.is_eccn = true;
        let index = arena.push(node);
        if let Some(parent) = parent {
            arena.get_mut(parent).children.push(index);
        }
        index
    }

    fn sample_arena() -> NodeArena {
        let mut arena = NodeArena::new();
        let root = push_node(
            &mut arena,
            "3B001",
            "3B001 Equipment for manufacturing semiconductor devices",
            None,
        );
        let a = push_node(&mut arena, "3B001.a", "a. Epitaxial growth equipment", Some(root));
        push_node(&mut arena, "3B001.a.1", "a.1. MOCVD reactors", Some(a));
        push_node(&mut arena, "3B001.b", "b. Ion implantation equipment", Some(root));
        arena
    }

    #[test]
    fn every_structural_node_produces_an_entry_in_walk_order() {
        let arena = sample_arena();
        let mut entries = Vec::new();
        flatten_tree(&arena, &supplement(), &mut entries);

        let codes: Vec<&str> = entries.iter().map(|entry| entry.eccn.as_str()).collect();
        assert_eq!(codes, vec!["3B001", "3B001.a", "3B001.a.1", "3B001.b"]);

        assert_eq!(entries[0].parent_eccn, None);
        assert_eq!(entries[0].child_eccns, vec!["3B001.a", "3B001.b"]);
        assert_eq!(entries[2].parent_eccn.as_deref(), Some("3B001.a"));
        assert_eq!(entries[0].category, "3");
        assert_eq!(entries[0].group, "3B");
    }

    #[test]
    fn breadcrumbs_reproduce_the_ancestor_heading_chain() {
        let arena = sample_arena();
        let mut entries = Vec::new();
        flatten_tree(&arena, &supplement(), &mut entries);

        assert!(entries[0].breadcrumbs.is_empty());
        assert_eq!(
            entries[2].breadcrumbs,
            vec![
                "3B001 Equipment for manufacturing semiconductor devices",
                "a. Epitaxial growth equipment"
            ]
        );
    }

    #[test]
    fn grouping_suppresses_children_but_keeps_them_in_structure() {
        let mut arena = NodeArena::new();
        let root = push_node(
            &mut arena,
            "3B993.f.4",
            "f.4. Assemblies having all of the following:",
            None,
        );
        let a = push_node(&mut arena, "3B993.f.4.a", "a. A housing", Some(root));
        let b = push_node(&mut arena, "3B993.f.4.b", "b. A controller", Some(root));
        arena.get_mut(root).requires_all_children = true;
        arena.get_mut(a).bound_to_parent = true;
        arena.get_mut(b).bound_to_parent = true;

        let mut entries = Vec::new();
        flatten_tree(&arena, &supplement(), &mut entries);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].eccn, "3B993.f.4");
        assert!(entries[0].child_eccns.is_empty());
        assert!(
            !entries
                .iter()
                .any(|entry| entry.eccn.starts_with("3B993.f.4."))
        );

        let children = &entries[0].structure.children;
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|child| child.bound_to_parent));
        assert_eq!(children[0].identifier.as_deref(), Some("3B993.f.4.a"));
    }

    #[test]
    fn grandchildren_of_a_grouping_node_stay_independent() {
        let mut arena = NodeArena::new();
        let root = push_node(&mut arena, "4A003", "4A003 Digital computers", None);
        let c = push_node(&mut arena, "4A003.c", "c. Assemblies", Some(root));
        let c1 = push_node(&mut arena, "4A003.c.1", "1. A processor", Some(c));
        arena.get_mut(root).requires_all_children = true;
        arena.get_mut(c).bound_to_parent = true;
        let _ = c1;

        let mut entries = Vec::new();
        flatten_tree(&arena, &supplement(), &mut entries);

        let codes: Vec<&str> = entries.iter().map(|entry| entry.eccn.as_str()).collect();
        assert_eq!(codes, vec!["4A003", "4A003.c.1"]);
        assert_eq!(entries[1].parent_eccn.as_deref(), Some("4A003"));
    }

    #[test]
    fn title_strips_the_leading_code_prefix() {
        assert_eq!(
            title_from_heading("3B001 Equipment for manufacturing", "3B001"),
            "Equipment for manufacturing"
        );
        assert_eq!(
            title_from_heading("ECCN 3B001 - Equipment", "3B001"),
            "Equipment"
        );
        assert_eq!(
            title_from_heading("eccn 3b001—Equipment", "3B001"),
            "Equipment"
        );
        assert_eq!(title_from_heading("Equipment", "3B001"), "Equipment");
    }

    #[test]
    fn labels_are_the_identifier_suffix_relative_to_the_code() {
        let arena = sample_arena();
        let mut entries = Vec::new();
        flatten_tree(&arena, &supplement(), &mut entries);

        assert_eq!(entries[0].structure.label, None);
        assert_eq!(
            entries[1].structure.label.as_deref(),
            Some("a"),
        );
        assert_eq!(
            entries[2].structure.label.as_deref(),
            Some("a.1"),
        );
    }
}
