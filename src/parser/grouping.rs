use anyhow::{Context, Result};
use regex::Regex;

use crate::parser::tree::NodeArena;

/// Detects "all of the following" grouping language and marks the affected
/// subtree. The phrase may sit inline in the enumerator line (the node's
/// heading) or in the standalone paragraph right after it (the node's first
/// content block). The effect reaches exactly one level: direct children are
/// bound to the parent; grandchildren stay independent unless they carry
/// their own marker.
#[derive(Debug)]
pub struct GroupingDetector {
    phrase: Regex,
}

impl GroupingDetector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            phrase: Regex::new(r"(?i)all\s+of\s+the\s+following")
                .context("failed to compile grouping phrase regex")?,
        })
    }

    pub fn apply(&self, arena: &mut NodeArena) {
        for index in 0..arena.len() {
            if !self.matches(arena, index) {
                continue;
            }

            arena.get_mut(index).requires_all_children = true;
            let children = arena.get(index).children.clone();
            for child in children {
                arena.get_mut(child).bound_to_parent = true;
            }
        }
    }

    fn matches(&self, arena: &NodeArena, index: usize) -> bool {
        let node = arena.get(index);
        if let Some(heading) = node.heading.as_deref()
            && self.phrase.is_match(heading)
        {
            return true;
        }
        node.first_content_text()
            .is_some_and(|text| self.phrase.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentBlock;
    use crate::parser::tree::TreeNode;

    fn detector() -> GroupingDetector {
        GroupingDetector::new().expect("detector should compile its regex")
    }

    fn node(identifier: &str, heading: &str, parent: Option<usize>) -> TreeNode {
        TreeNode::new(
            Some(identifier.to_string()),
            Some(heading.to_string()),
            parent,
        )
    }

    #[test]
    fn phrase_in_heading_binds_direct_children_only() {
        let mut arena = NodeArena::new();
        let root = arena.push(node(
            "3B993.f.4",
            "f.4. Assemblies having all of the following:",
            None,
        ));
        let a = arena.push(node("3B993.f.4.a", "a. A housing", Some(root)));
        let b = arena.push(node("3B993.f.4.b", "b. A controller", Some(root)));
        let a1 = arena.push(node("3B993.f.4.a.1", "1. A grandchild", Some(a)));
        arena.get_mut(root).children = vec![a, b];
        arena.get_mut(a).children = vec![a1];

        detector().apply(&mut arena);

        assert!(arena.get(root).requires_all_children);
        assert!(arena.get(a).bound_to_parent);
        assert!(arena.get(b).bound_to_parent);
        assert!(!arena.get(a1).bound_to_parent);
        assert!(!arena.get(a1).requires_all_children);
    }

    #[test]
    fn phrase_in_first_content_block_is_detected() {
        let mut arena = NodeArena::new();
        let root = arena.push(node("4A003.c", "c. Digital computers", None));
        let child = arena.push(node("4A003.c.1", "1. A processor", Some(root)));
        arena.get_mut(root).children = vec![child];
        arena.get_mut(root).content.push(ContentBlock::Text {
            text: "Having ALL of the following characteristics:".to_string(),
        });

        detector().apply(&mut arena);

        assert!(arena.get(root).requires_all_children);
        assert!(arena.get(child).bound_to_parent);
    }

    #[test]
    fn nodes_without_the_phrase_are_untouched() {
        let mut arena = NodeArena::new();
        let root = arena.push(node("3B001.a", "a. Equipment, as follows:", None));
        let child = arena.push(node("3B001.a.1", "1. Reactors", Some(root)));
        arena.get_mut(root).children = vec![child];

        detector().apply(&mut arena);

        assert!(!arena.get(root).requires_all_children);
        assert!(!arena.get(child).bound_to_parent);
    }
}
