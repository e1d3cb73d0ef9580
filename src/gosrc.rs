use std::ops::Range;

use tree_sitter::{Node, Parser, Tree};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to load the Go grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("parser produced no syntax tree")]
    NoTree,

    #[error("syntax error at line {line}, column {column} near `{snippet}`")]
    Syntax {
        line: usize,
        column: usize,
        snippet: String,
    },
}

/// A parsed Go file.
pub struct GoSource {
    text: String,
    tree: Tree,
}

impl GoSource {
    /// Parse `text`. Any error or missing node in the tree is a parse failure:
    /// rewriting around a broken region could corrupt the file.
    pub fn parse(text: impl Into<String>) -> Result<Self, SourceError> {
        let text = text.into();
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_go::LANGUAGE.into())?;
        let tree = parser.parse(&text, None).ok_or(SourceError::NoTree)?;

        if let Some(bad) = first_error(tree.root_node()) {
            let pos = bad.start_position();
            let snippet: String = text[bad.byte_range()]
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(40)
                .collect();
            return Err(SourceError::Syntax {
                line: pos.row + 1,
                column: pos.column + 1,
                snippet,
            });
        }

        Ok(Self { text, tree })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn node_text(&self, node: Node<'_>) -> &str {
        &self.text[node.byte_range()]
    }

    /// Text of `node` with the indentation of its first line removed from
    /// every continuation line, ready to be re-indented elsewhere.
    pub fn dedented_text(&self, node: Node<'_>) -> String {
        let start = node.start_byte();
        let line_start = self.text[..start].rfind('\n').map_or(0, |i| i + 1);
        let prefix = &self.text[line_start..start];
        let indent: &str = &prefix[..prefix.len() - prefix.trim_start().len()];

        let mut lines = self.node_text(node).lines();
        let mut out = lines.next().unwrap_or_default().to_string();
        for line in lines {
            out.push('\n');
            out.push_str(line.strip_prefix(indent).unwrap_or(line));
        }
        out
    }

    /// Whitespace at the start of the line holding `byte`.
    pub fn line_indent(&self, byte: usize) -> &str {
        let line_start = self.text[..byte].rfind('\n').map_or(0, |i| i + 1);
        let line = &self.text[line_start..];
        &line[..line.len() - line.trim_start_matches([' ', '\t']).len()]
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// Named children of `node`, comments excluded.
pub fn code_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// All children of `node`, anonymous tokens included.
pub fn all_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn is_string_literal(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "interpreted_string_literal" | "raw_string_literal"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    range: Range<usize>,
    text: String,
}

/// Text edits against one source plus declarations appended at end of file.
#[derive(Debug, Default)]
pub struct EditPlan {
    edits: Vec<Edit>,
    appended: Vec<String>,
}

impl EditPlan {
    pub fn replace(&mut self, range: Range<usize>, text: impl Into<String>) {
        self.edits.push(Edit {
            range,
            text: text.into(),
        });
    }

    pub fn delete(&mut self, range: Range<usize>) {
        self.replace(range, String::new());
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at..at, text);
    }

    /// Queue a top-level declaration for the end of the file.
    pub fn append(&mut self, decl: impl Into<String>) {
        self.appended.push(decl.into());
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.appended.is_empty()
    }

    /// Apply the plan to `source`.
    ///
    /// Edits are applied in source order; one overlapping an edit already
    /// applied is dropped. Insertions at the same offset keep the order they
    /// were planned in. When declarations are appended the file is trimmed
    /// and each declaration follows a single blank line, so output that is
    /// fed back through the same plan reproduces itself.
    pub fn apply(mut self, source: &str) -> String {
        self.edits
            .sort_by_key(|edit| (edit.range.start, edit.range.end));

        let mut out = String::with_capacity(source.len() + self.appended.iter().map(String::len).sum::<usize>());
        let mut cursor = 0;
        for edit in &self.edits {
            if edit.range.start < cursor {
                tracing::debug!(range = ?edit.range, "dropping overlapping edit");
                continue;
            }
            out.push_str(&source[cursor..edit.range.start]);
            out.push_str(&edit.text);
            cursor = edit.range.end;
        }
        out.push_str(&source[cursor..]);

        if !self.appended.is_empty() {
            out.truncate(out.trim_end().len());
            out.push('\n');
            for decl in &self.appended {
                out.push('\n');
                out.push_str(decl.trim_end());
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "package gw\n\nfunc a() {\n\tx := b(\n\t\t1,\n\t)\n}\n";

    fn find<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
        if node.kind() == kind {
            return Some(node);
        }
        all_children(node).into_iter().find_map(|c| find(c, kind))
    }

    #[test]
    fn parses_valid_go() {
        let src = GoSource::parse(SOURCE).unwrap();
        assert_eq!(src.root().kind(), "source_file");
        assert!(find(src.root(), "function_declaration").is_some());
    }

    #[test]
    fn reports_syntax_error_position() {
        let err = GoSource::parse("package gw\n\nfunc a( {\n").err().unwrap();
        match err {
            SourceError::Syntax { line, .. } => assert!(line >= 3, "line was {line}"),
            other => panic!("expected syntax error, got {other}"),
        }
    }

    #[test]
    fn dedents_continuation_lines() {
        let src = GoSource::parse(SOURCE).unwrap();
        let stmt = find(src.root(), "short_var_declaration").unwrap();
        assert_eq!(src.dedented_text(stmt), "x := b(\n\t1,\n)");
        assert_eq!(src.line_indent(stmt.start_byte()), "\t");
    }

    #[test]
    fn applies_edits_in_source_order() {
        let mut plan = EditPlan::default();
        plan.replace(8..10, "XY");
        plan.insert(0, "<");
        plan.delete(2..4);
        plan.insert(0, ">");
        assert_eq!(plan.apply("0123456789"), "<>014567XY");
    }

    #[test]
    fn overlapping_edit_is_dropped() {
        let mut plan = EditPlan::default();
        plan.delete(2..6);
        plan.replace(4..5, "!");
        assert_eq!(plan.apply("0123456789"), "016789");
    }

    #[test]
    fn appended_declarations_normalize_file_end() {
        let mut plan = EditPlan::default();
        plan.append("func z() {}\n");
        let once = plan.apply("package gw\n\n\n");
        assert_eq!(once, "package gw\n\nfunc z() {}\n");

        let mut plan = EditPlan::default();
        plan.delete(10..once.len());
        plan.append("func z() {}");
        assert_eq!(plan.apply(&once), once);
    }
}
