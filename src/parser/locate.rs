use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;
use roxmltree::Node;
use tracing::{debug, warn};

use crate::parser::markup;

#[derive(Debug)]
pub struct LocatedSupplement<'a, 'input> {
    pub number: u32,
    pub heading: String,
    pub node: Node<'a, 'input>,
}

#[derive(Debug)]
pub struct SupplementLocator {
    supplement_number: Regex,
    plain_number: Regex,
    bare_digit: Regex,
}

impl SupplementLocator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            supplement_number: Regex::new(r"(?i)Supplement\s+No\.?\s*(\d+)")
                .context("failed to compile supplement number regex")?,
            plain_number: Regex::new(r"^\s*(\d+)\s*$")
                .context("failed to compile plain number regex")?,
            bare_digit: Regex::new(r"\d").context("failed to compile bare digit regex")?,
        })
    }

    /// Find the supplement sections of a Part that are in the target set.
    /// Non-target supplements are dropped silently; locating nothing is a
    /// soft failure surfaced as an empty list.
    pub fn locate<'a, 'input>(
        &self,
        part: Node<'a, 'input>,
        targets: &HashSet<u32>,
    ) -> Vec<LocatedSupplement<'a, 'input>> {
        let mut located = Vec::new();

        for section in part.descendants().filter(|node| is_supplement_element(*node)) {
            let heading = markup::head_text(section).unwrap_or_default();
            let Some(number) = self.derive_number(markup::identifier_attr(section), &heading)
            else {
                warn!(heading = %heading, "supplement section without a derivable number");
                continue;
            };

            if !targets.contains(&number) {
                debug!(number, "skipping non-target supplement");
                continue;
            }

            located.push(LocatedSupplement {
                number,
                heading,
                node: section,
            });
        }

        located.sort_by_key(|supplement| supplement.number);
        located
    }

    /// Ordered fallbacks: explicit attribute, "Supplement No. N" heading
    /// text, bare single digit in the heading.
    fn derive_number(&self, attr: Option<&str>, heading: &str) -> Option<u32> {
        if let Some(attr) = attr
            && let Some(number) = self.number_from(attr)
        {
            return Some(number);
        }

        if let Some(captures) = self.supplement_number.captures(heading) {
            return captures.get(1).and_then(|m| m.as_str().parse().ok());
        }

        self.bare_digit
            .find(heading)
            .and_then(|m| m.as_str().parse().ok())
    }

    fn number_from(&self, attr: &str) -> Option<u32> {
        if let Some(captures) = self.supplement_number.captures(attr) {
            return captures.get(1).and_then(|m| m.as_str().parse().ok());
        }
        self.plain_number
            .captures(attr)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

fn is_supplement_element(node: Node<'_, '_>) -> bool {
    if !node.is_element() {
        return false;
    }
    match node.attribute("TYPE") {
        Some(kind) => {
            kind.eq_ignore_ascii_case("APPENDIX") || kind.eq_ignore_ascii_case("SUPPLEMENT")
        }
        None => false,
    }
}
