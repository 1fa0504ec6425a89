use crate::model::ContentBlock;

/// One outline position in a supplement. Nodes live in a `NodeArena` and
/// reference each other by index, so the upward `parent` pointer never forms
/// an ownership cycle; `children` is the owned, document-ordered edge list.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub identifier: Option<String>,
    pub heading: Option<String>,
    pub content: Vec<ContentBlock>,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
    /// Enumerator path segments accumulated from the parent chain, used to
    /// decide whether a later identifier descends from an earlier one.
    pub path: Vec<String>,
    pub requires_all_children: bool,
    pub bound_to_parent: bool,
    pub is_eccn: bool,
}

impl TreeNode {
    pub fn new(identifier: Option<String>, heading: Option<String>, parent: Option<usize>) -> Self {
        Self {
            identifier,
            heading,
            content: Vec::new(),
            children: Vec::new(),
            parent,
            path: Vec::new(),
            requires_all_children: false,
            bound_to_parent: false,
            is_eccn: false,
        }
    }

    pub fn first_content_text(&self) -> Option<&str> {
        self.content.first().map(block_text)
    }
}

pub fn block_text(block: &ContentBlock) -> &str {
    match block {
        ContentBlock::Text { text } => text,
        ContentBlock::Html { text, .. } => text.as_deref().unwrap_or(""),
    }
}

#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<TreeNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn push(&mut self, node: TreeNode) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        index
    }

    pub fn get(&self, index: usize) -> &TreeNode {
        &self.nodes[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut TreeNode {
        &mut self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
