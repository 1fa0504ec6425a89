use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use roxmltree::{Document, Node};
use tracing::{info, warn};

use crate::model::{Supplement, SupplementMetadata, SupplementRef};

pub mod flatten;
pub mod grouping;
pub mod hierarchy;
pub mod locate;
pub mod markup;
pub mod ranges;
pub mod tree;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub part: u32,
    pub supplements: Vec<u32>,
}

/// Parse one Part's XML into the target supplements' ECCN catalogs.
///
/// Pure and deterministic: the same input text always yields the same
/// entry list in the same order. The target part being absent is a hard
/// failure; a target supplement being absent just leaves it out of the
/// result.
pub fn parse_part(xml: &str, options: &ParseOptions) -> Result<Vec<Supplement>> {
    let document = Document::parse(xml).context("failed to parse part XML")?;
    let part = find_part(&document, options.part)?;

    let locator = locate::SupplementLocator::new()?;
    let builder = hierarchy::HierarchyBuilder::new()?;
    let detector = grouping::GroupingDetector::new()?;
    let expander = ranges::RangeExpander::new()?;

    let targets: HashSet<u32> = options.supplements.iter().copied().collect();
    let located = locator.locate(part, &targets);
    if located.is_empty() {
        warn!(
            part = options.part,
            "no target supplements located; part layout may have changed"
        );
    }

    let mut supplements = Vec::with_capacity(located.len());
    for section in located {
        let supplement_ref = SupplementRef {
            number: section.number,
            heading: section.heading.clone(),
        };

        let mut entries = Vec::new();
        for (code, root_element) in builder.collect_roots(section.node) {
            let mut arena = builder.build_tree(&code, root_element);
            detector.apply(&mut arena);
            expander.expand_arena(&mut arena, &code);
            flatten::flatten_tree(&arena, &supplement_ref, &mut entries);
        }

        let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &entries {
            *category_counts.entry(entry.category.clone()).or_insert(0) += 1;
        }

        info!(
            supplement = section.number,
            eccns = entries.len(),
            "parsed supplement"
        );
        supplements.push(Supplement {
            number: section.number,
            heading: section.heading,
            metadata: SupplementMetadata {
                eccn_count: entries.len(),
                category_counts,
            },
            eccns: entries,
        });
    }

    Ok(supplements)
}

fn find_part<'a, 'input>(document: &'a Document<'input>, part: u32) -> Result<Node<'a, 'input>> {
    document
        .descendants()
        .find(|node| is_part_element(*node, part))
        .with_context(|| format!("part {part} not found in document"))
}

fn is_part_element(node: Node<'_, '_>, part: u32) -> bool {
    node.is_element()
        && node
            .attribute("TYPE")
            .is_some_and(|kind| kind.eq_ignore_ascii_case("PART"))
        && markup::identifier_attr(node).is_some_and(|value| part_number(value) == Some(part))
}

fn part_number(value: &str) -> Option<u32> {
    let digits: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
