use tracing::warn;
use tree_sitter::Node;

use crate::gosrc::{EditPlan, GoSource, all_children, code_children};
use crate::synth::interceptor_parameter;

fn parameter_declarations(params: Node<'_>) -> Vec<Node<'_>> {
    code_children(params)
        .into_iter()
        .filter(|p| {
            matches!(
                p.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            )
        })
        .collect()
}

fn parameter_names(decl: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = decl.walk();
    decl.children_by_field_name("name", &mut cursor).collect()
}

pub fn has_parameter(src: &GoSource, params: Node<'_>, name: &str) -> bool {
    parameter_declarations(params)
        .into_iter()
        .any(|decl| parameter_names(decl).into_iter().any(|n| src.node_text(n) == name))
}

/// Declared type of the parameter called `name`, as written in the source.
pub fn parameter_type<'s>(src: &'s GoSource, params: Node<'s>, name: &str) -> Option<&'s str> {
    parameter_declarations(params)
        .into_iter()
        .find(|decl| parameter_names(*decl).into_iter().any(|n| src.node_text(n) == name))
        .and_then(|decl| decl.child_by_field_name("type"))
        .map(|ty| src.node_text(ty))
}

/// Plan appending `interceptor *grpc.UnaryServerInterceptor` to a parameter
/// list. Returns false when a parameter of that name already exists.
pub fn plan_interceptor_param(src: &GoSource, params: Node<'_>, plan: &mut EditPlan) -> bool {
    if has_parameter(src, params, crate::naming::INTERCEPTOR_PARAM) {
        return false;
    }
    let Some(close) = all_children(params).into_iter().rev().find(|c| c.kind() == ")") else {
        return false;
    };

    let text = src.text();
    let open_end = params.start_byte() + 1;
    let content = text[open_end..close.start_byte()].trim_end();
    let param = interceptor_parameter().to_go();

    if content.is_empty() {
        plan.insert(open_end, param);
        return true;
    }

    let content_end = open_end + content.len();
    if !content.ends_with(',') {
        plan.insert(content_end, format!(", {param}"));
        return true;
    }

    // One parameter per line, closing paren on its own line.
    let close_line = text[..close.start_byte()].rfind('\n').map_or(0, |i| i + 1);
    if text[close_line..close.start_byte()].trim().is_empty() && close_line > content_end {
        let indent = parameter_declarations(params)
            .last()
            .map(|p| src.line_indent(p.start_byte()).to_string())
            .unwrap_or_else(|| "\t".to_string());
        plan.insert(close_line, format!("{indent}{param},\n"));
    } else {
        plan.insert(content_end, format!(" {param},"));
    }
    true
}

fn unquote(literal: &str) -> &str {
    literal.trim_matches(|c| c == '"' || c == '`')
}

fn is_std_path(path: &str) -> bool {
    !path.split('/').next().unwrap_or_default().contains('.')
}

fn import_path<'s>(src: &'s GoSource, spec: Node<'s>) -> &'s str {
    spec.child_by_field_name("path")
        .map(|p| unquote(src.node_text(p)))
        .unwrap_or_default()
}

/// The alias `spec` imports under when it differs from the package name
/// the path implies.
fn renamed_as<'s>(src: &'s GoSource, spec: Node<'s>, path: &str) -> Option<&'s str> {
    let alias = src.node_text(spec.child_by_field_name("name")?);
    let package = path.rsplit('/').next().unwrap_or(path);
    (alias != package).then_some(alias)
}

/// Alias under which the file imports `path`, if it is renamed.
pub fn import_alias<'s>(src: &'s GoSource, path: &str) -> Option<&'s str> {
    code_children(src.root())
        .into_iter()
        .filter(|n| n.kind() == "import_declaration")
        .flat_map(code_children)
        .flat_map(|child| match child.kind() {
            "import_spec_list" => code_children(child),
            _ => vec![child],
        })
        .filter(|spec| spec.kind() == "import_spec" && import_path(src, *spec) == path)
        .find_map(|spec| renamed_as(src, spec, path))
}

/// Offset of the newline that ends the line containing `byte`.
fn line_end(text: &str, byte: usize) -> usize {
    text[byte..].find('\n').map_or(text.len(), |i| byte + i)
}

/// Plan adding `path` to the file's imports. Returns false when the file
/// already imports it, under any alias.
pub fn plan_import(src: &GoSource, path: &str, plan: &mut EditPlan) -> bool {
    let root = src.root();
    let decls: Vec<Node<'_>> = code_children(root)
        .into_iter()
        .filter(|n| n.kind() == "import_declaration")
        .collect();

    let mut blocks = Vec::new();
    let mut singles = Vec::new();
    for decl in &decls {
        for child in code_children(*decl) {
            match child.kind() {
                "import_spec_list" => blocks.push(child),
                "import_spec" => singles.push(child),
                _ => {}
            }
        }
    }

    let block_specs: Vec<Vec<Node<'_>>> = blocks
        .iter()
        .map(|list| {
            code_children(*list)
                .into_iter()
                .filter(|s| s.kind() == "import_spec")
                .collect()
        })
        .collect();
    let already = singles
        .iter()
        .chain(block_specs.iter().flatten())
        .any(|spec| import_path(src, *spec) == path);
    if already {
        if let Some(alias) = import_alias(src, path) {
            warn!(
                import = path,
                alias,
                "import is renamed; generated wrappers refer to it by its package name"
            );
        }
        return false;
    }

    if let (Some(list), Some(specs)) = (blocks.first(), block_specs.first()) {
        plan_block_import(src, *list, specs, path, plan);
        return true;
    }

    let line = format!("import \"{path}\"");
    if let Some(last) = decls.last() {
        plan.insert(last.end_byte(), format!("\n{line}"));
    } else if let Some(package) = code_children(root)
        .into_iter()
        .find(|n| n.kind() == "package_clause")
    {
        plan.insert(package.end_byte(), format!("\n\n{line}"));
    } else {
        plan.insert(0, format!("{line}\n\n"));
    }
    true
}

fn plan_block_import(
    src: &GoSource,
    list: Node<'_>,
    specs: &[Node<'_>],
    path: &str,
    plan: &mut EditPlan,
) {
    let text = src.text();
    let quoted = format!("\"{path}\"");

    let Some(first) = specs.first() else {
        plan.insert(list.start_byte() + 1, format!("\n\t{quoted}\n"));
        return;
    };

    // Blank lines separate groups.
    let mut groups: Vec<Vec<Node<'_>>> = vec![vec![*first]];
    for pair in specs.windows(2) {
        let gap = &text[pair[0].end_byte()..pair[1].start_byte()];
        if gap.matches('\n').count() > 1 {
            groups.push(Vec::new());
        }
        if let Some(group) = groups.last_mut() {
            group.push(pair[1]);
        }
    }

    let want_std = is_std_path(path);
    let group_is_std = |group: &[Node<'_>]| {
        group
            .first()
            .is_some_and(|spec| is_std_path(import_path(src, *spec)))
    };
    let target = if want_std {
        groups.iter().find(|g| group_is_std(g.as_slice()))
    } else {
        groups.iter().rev().find(|g| !group_is_std(g.as_slice()))
    };

    let Some(group) = target else {
        if want_std {
            let indent = src.line_indent(first.start_byte());
            let line_start = first.start_byte() - indent.len();
            plan.insert(line_start, format!("{indent}{quoted}\n\n"));
        } else if let Some(last) = specs.last() {
            let indent = src.line_indent(last.start_byte());
            plan.insert(line_end(text, last.end_byte()), format!("\n\n{indent}{quoted}"));
        }
        return;
    };

    match group.iter().find(|spec| import_path(src, **spec) > path) {
        Some(next) => {
            let indent = src.line_indent(next.start_byte());
            let line_start = next.start_byte() - indent.len();
            plan.insert(line_start, format!("{indent}{quoted}\n"));
        }
        None => {
            if let Some(last) = group.last() {
                let indent = src.line_indent(last.start_byte());
                plan.insert(line_end(text, last.end_byte()), format!("\n{indent}{quoted}"));
            }
        }
    }
}
