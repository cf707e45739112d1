//! `${...}` placeholder substitution for configured values.
//!
//! | Token | Resolves to |
//! |-------|-------------|
//! | `${meta.Field}` | first non-empty value on the unit, then its ancestors |
//! | `${meta.topstruct.Field}` | value on the top logical element |
//! | `${process.Title}` / `${process.Id}` | process title / numeric id |
//! | `${process.Name}` | process property `Name` |
//! | `${env.NAME}` | environment variable |
//!
//! Tokens that resolve to nothing become the empty string.

use crate::tree::{DocumentTree, LogicalNode};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Substitutes placeholders for one unit.
pub struct VariableReplacer<'a> {
    tree: &'a DocumentTree,
    top: &'a LogicalNode,
    /// The unit first, then its ancestors nearest-first.
    chain: Vec<&'a LogicalNode>,
}

impl<'a> VariableReplacer<'a> {
    pub fn new(tree: &'a DocumentTree, top: &'a LogicalNode, chain: Vec<&'a LogicalNode>) -> Self {
        Self { tree, top, chain }
    }

    /// Replacer whose `meta` lookups see only the top element.
    pub fn for_top(tree: &'a DocumentTree, top: &'a LogicalNode) -> Self {
        Self::new(tree, top, vec![top])
    }

    pub fn replace(&self, template: &str) -> String {
        TOKEN
            .replace_all(template, |caps: &Captures| self.lookup(&caps[1]))
            .into_owned()
    }

    /// Optional convenience: `None` and empty both become `""`.
    pub fn replace_opt(&self, template: Option<&str>) -> String {
        template.map(|t| self.replace(t)).unwrap_or_default()
    }

    fn lookup(&self, token: &str) -> String {
        if let Some(field) = token.strip_prefix("meta.topstruct.") {
            return self.top.value(field).to_string();
        }
        if let Some(field) = token.strip_prefix("meta.") {
            return self
                .chain
                .iter()
                .map(|n| n.value(field).trim())
                .find(|v| !v.is_empty())
                .unwrap_or("")
                .to_string();
        }
        if let Some(name) = token.strip_prefix("process.") {
            return match name {
                "Title" => self.tree.process.title.clone(),
                "Id" => self.tree.process.id.to_string(),
                _ => self
                    .tree
                    .process
                    .properties
                    .get(name)
                    .cloned()
                    .unwrap_or_default(),
            };
        }
        if let Some(name) = token.strip_prefix("env.") {
            return std::env::var(name).unwrap_or_default();
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> DocumentTree {
        let mut tree = DocumentTree::default();
        tree.process.title = "gazette_1921".into();
        tree.process.id = 42;
        tree.process
            .properties
            .insert("Capturing device".into(), "Scanner A".into());
        tree.logical = LogicalNode::new("Newspaper");
        tree.logical.add_value("TitleDocMain", "Gazette");
        tree
    }

    #[test]
    fn replaces_process_tokens() {
        let tree = tree();
        let vr = VariableReplacer::for_top(&tree, &tree.logical);
        assert_eq!(
            vr.replace("${process.Title}/${process.Id} on ${process.Capturing device}"),
            "gazette_1921/42 on Scanner A"
        );
    }

    #[test]
    fn meta_prefers_unit_then_ancestors() {
        let tree = tree();
        let mut issue = LogicalNode::new("NewspaperIssue");
        issue.add_value("DateIssued", "1921-01-03");
        let vr = VariableReplacer::new(&tree, &tree.logical, vec![&issue, &tree.logical]);
        assert_eq!(vr.replace("${meta.TitleDocMain} ${meta.DateIssued}"), "Gazette 1921-01-03");
        assert_eq!(vr.replace("${meta.topstruct.TitleDocMain}"), "Gazette");
    }

    #[test]
    fn unknown_tokens_become_empty() {
        let tree = tree();
        let vr = VariableReplacer::for_top(&tree, &tree.logical);
        assert_eq!(vr.replace("[${bogus}][${meta.Nope}]"), "[][]");
        assert_eq!(vr.replace_opt(None), "");
    }

    #[test]
    fn text_without_tokens_is_untouched() {
        let tree = tree();
        let vr = VariableReplacer::for_top(&tree, &tree.logical);
        assert_eq!(vr.replace("plain $ text {}"), "plain $ text {}");
    }
}
