use anyhow::{Context, Result};
use regex::Regex;

use crate::model::ContentBlock;
use crate::parser::markup::collapse_whitespace;
use crate::parser::tree::NodeArena;

/// Expands compressed sibling-code notation ("a.1 to a.3, b, g to j") into
/// full dotted identifier lists, relative to the enclosing catalog code.
/// Expansion rewrites rendered markup blocks in place; tokens that do not
/// parse are kept verbatim so no information is silently deleted.
#[derive(Debug)]
pub struct RangeExpander {
    table_cell: Regex,
    full_code: Regex,
    code_prefix: Regex,
    letter_segment: Regex,
    numeric_segment: Regex,
    range_split: Regex,
}

impl RangeExpander {
    pub fn new() -> Result<Self> {
        Ok(Self {
            table_cell: Regex::new(r"<ent>([^<]*)</ent>")
                .context("failed to compile table cell regex")?,
            full_code: Regex::new(r"^\d[A-Z]\d{3}(?:\.[a-z0-9]{1,3})*$")
                .context("failed to compile full code regex")?,
            code_prefix: Regex::new(r"^(\d[A-Z]\d{3})")
                .context("failed to compile code prefix regex")?,
            letter_segment: Regex::new(r"^[a-z](?:\.[0-9]{1,3})*$")
                .context("failed to compile letter segment regex")?,
            numeric_segment: Regex::new(r"^[0-9]{1,3}$")
                .context("failed to compile numeric segment regex")?,
            range_split: Regex::new(r"\s+to\s+")
                .context("failed to compile range keyword regex")?,
        })
    }

    pub fn expand_arena(&self, arena: &mut NodeArena, base: &str) {
        for index in 0..arena.len() {
            for block in arena.get_mut(index).content.iter_mut() {
                self.expand_block(block, base);
            }
        }
    }

    fn expand_block(&self, block: &mut ContentBlock, base: &str) {
        let ContentBlock::Html { html, text, .. } = block else {
            return;
        };

        let mut changed = false;
        let new_html = self
            .table_cell
            .replace_all(html, |captures: &regex::Captures| {
                let cell = captures.get(1).map_or("", |m| m.as_str());
                match self.expand_list(base, cell) {
                    Some(expanded) => {
                        changed = true;
                        format!("<ent>{expanded}</ent>")
                    }
                    None => captures.get(0).map_or(String::new(), |m| m.as_str().to_string()),
                }
            })
            .into_owned();

        if changed {
            *html = new_html;
            *text = Some(text_from_html(html));
            return;
        }

        // Non-tabular markup whose whole text is a shorthand list.
        if let Some(current) = text.clone()
            && let Some(expanded) = self.expand_list(base, &current)
        {
            *html = html.replace(current.as_str(), &expanded);
            *text = Some(expanded);
        }
    }

    /// Expand a comma-separated shorthand list. Returns `None` when the text
    /// is not a shorthand list or nothing in it changed; individual tokens
    /// that fail to parse are carried through verbatim.
    pub fn expand_list(&self, base: &str, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let tokens: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if tokens.iter().any(|token| token.is_empty()) {
            return None;
        }
        // A lone bare letter is indistinguishable from prose.
        if tokens.len() == 1 && !self.range_split.is_match(tokens[0]) && !tokens[0].contains('.') {
            return None;
        }

        let mut current_base = base.to_string();
        let mut out: Vec<String> = Vec::new();
        let mut changed = false;

        for token in &tokens {
            match self.expand_token(&mut current_base, token) {
                Some(expanded) => {
                    if expanded.len() != 1 || expanded[0] != *token {
                        changed = true;
                    }
                    out.extend(expanded);
                }
                None => out.push((*token).to_string()),
            }
        }

        if changed { Some(out.join(", ")) } else { None }
    }

    fn expand_token(&self, base: &mut String, token: &str) -> Option<Vec<String>> {
        if let Some((start_token, end_token)) = self.split_range(token) {
            let start_id = self.qualify(base, start_token)?;
            let mut end_base = base.clone();
            let end_id = self.qualify(&mut end_base, end_token)?;

            let (start_prefix, start_last) = split_last_segment(&start_id)?;
            let (end_prefix, end_last) = split_last_segment(&end_id)?;
            if start_prefix != end_prefix {
                return None;
            }

            if let (Ok(start), Ok(end)) = (start_last.parse::<u32>(), end_last.parse::<u32>()) {
                if start > end || end - start > 25 {
                    return None;
                }
                return Some(expand_numeric_range(start_prefix, start, end));
            }

            let start_letter = single_letter(start_last)?;
            let end_letter = single_letter(end_last)?;
            if start_letter > end_letter {
                return None;
            }
            return Some(expand_alpha_range(start_prefix, start_letter, end_letter));
        }

        self.qualify(base, token).map(|identifier| vec![identifier])
    }

    fn split_range<'t>(&self, token: &'t str) -> Option<(&'t str, &'t str)> {
        let mut parts = self.range_split.splitn(token, 2);
        let start = parts.next()?;
        let end = parts.next()?;
        Some((start.trim(), end.trim()))
    }

    /// Turn a token into a full dotted identifier. A token that is itself a
    /// full code passes through and becomes the base for later tokens; bare
    /// segments are qualified against the current base.
    fn qualify(&self, base: &mut String, token: &str) -> Option<String> {
        if self.full_code.is_match(token) {
            if let Some(captures) = self.code_prefix.captures(token)
                && let Some(code) = captures.get(1)
            {
                *base = code.as_str().to_string();
            }
            return Some(token.to_string());
        }
        if self.letter_segment.is_match(token) || self.numeric_segment.is_match(token) {
            return Some(format!("{base}.{token}"));
        }
        None
    }
}

pub fn expand_numeric_range(prefix: &str, start: u32, end: u32) -> Vec<String> {
    (start..=end).map(|n| format!("{prefix}.{n}")).collect()
}

pub fn expand_alpha_range(prefix: &str, start: char, end: char) -> Vec<String> {
    (start as u8..=end as u8)
        .map(|letter| format!("{prefix}.{}", letter as char))
        .collect()
}

fn split_last_segment(identifier: &str) -> Option<(&str, &str)> {
    identifier.rsplit_once('.')
}

fn single_letter(segment: &str) -> Option<char> {
    let mut chars = segment.chars();
    let letter = chars.next()?;
    if chars.next().is_some() || !letter.is_ascii_lowercase() {
        return None;
    }
    Some(letter)
}

fn text_from_html(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    let out = out
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    collapse_whitespace(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expander() -> RangeExpander {
        RangeExpander::new().expect("expander should compile its regexes")
    }

    #[test]
    fn expands_the_full_shorthand_grammar() {
        let expanded = expander()
            .expand_list("3B001", "a.1 to a.3, b, e, f.2 to f.4, g to j")
            .expect("list should expand");

        assert_eq!(
            expanded,
            "3B001.a.1, 3B001.a.2, 3B001.a.3, 3B001.b, 3B001.e, \
             3B001.f.2, 3B001.f.3, 3B001.f.4, 3B001.g, 3B001.h, 3B001.i, 3B001.j"
        );
        assert!(!expanded.contains("a.1 to a.3"));
        assert!(!expanded.contains("g to j"));
    }

    #[test]
    fn full_code_token_resets_the_base_for_later_tokens() {
        let expanded = expander()
            .expand_list("3B001", "3A001.a.1 to a.3, b")
            .expect("list should expand");

        assert_eq!(expanded, "3A001.a.1, 3A001.a.2, 3A001.a.3, 3A001.b");
    }

    #[test]
    fn malformed_tokens_are_kept_verbatim() {
        let expanded = expander()
            .expand_list("3B001", "a.1 to a.3, see Note 2, q-z")
            .expect("parseable tokens should still expand");

        assert_eq!(
            expanded,
            "3B001.a.1, 3B001.a.2, 3B001.a.3, see Note 2, q-z"
        );
    }

    #[test]
    fn prose_is_left_untouched() {
        let expander = expander();
        assert_eq!(expander.expand_list("3B001", "pumps, valves and seals"), None);
        assert_eq!(expander.expand_list("3B001", "b"), None);
        assert_eq!(expander.expand_list("3B001", ""), None);
    }

    #[test]
    fn numeric_and_alpha_helpers_enumerate_inclusively() {
        assert_eq!(
            expand_numeric_range("3B001.f", 2, 4),
            vec!["3B001.f.2", "3B001.f.3", "3B001.f.4"]
        );
        assert_eq!(
            expand_alpha_range("3B001", 'g', 'j'),
            vec!["3B001.g", "3B001.h", "3B001.i", "3B001.j"]
        );
    }

    #[test]
    fn descending_ranges_are_kept_verbatim() {
        let expanded = expander()
            .expand_list("3B001", "a.3 to a.1, f.2 to f.4")
            .expect("the ascending range should still expand");

        assert_eq!(expanded, "a.3 to a.1, 3B001.f.2, 3B001.f.3, 3B001.f.4");
    }

    #[test]
    fn table_cells_are_rewritten_in_place() {
        let mut block = ContentBlock::Html {
            tag: "gpotable".to_string(),
            html: "<gpotable><row><ent>LVS: $5000</ent><ent>a.1 to a.2, b</ent></row></gpotable>"
                .to_string(),
            text: Some("LVS: $5000 a.1 to a.2, b".to_string()),
            id: None,
        };

        expander().expand_block(&mut block, "3B001");

        match block {
            ContentBlock::Html { html, text, .. } => {
                assert_eq!(
                    html,
                    "<gpotable><row><ent>LVS: $5000</ent>\
                     <ent>3B001.a.1, 3B001.a.2, 3B001.b</ent></row></gpotable>"
                );
                assert_eq!(
                    text.as_deref(),
                    Some("LVS: $5000 3B001.a.1, 3B001.a.2, 3B001.b")
                );
            }
            ContentBlock::Text { .. } => panic!("block kind should not change"),
        }
    }
}
