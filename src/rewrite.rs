use std::collections::HashMap;

use tracing::{debug, warn};
use tree_sitter::Node;

use crate::gosrc::{EditPlan, GoSource, SourceError, code_children, is_string_literal};
use crate::naming::{SERVER_PARAM, wrapped_call_name, wrapper_name};
use crate::patch::{parameter_type, plan_import, plan_interceptor_param};
use crate::registry::Registry;
use crate::report::{RewriteSummary, WrapperEntry};
use crate::synth::{REQUIRED_IMPORTS, WrapperTemplate, call_site_statement, wrapper_declaration};

const RUNTIME_PACKAGE: &str = "runtime";
const ANNOTATE_INCOMING_CONTEXT: &str = "AnnotateIncomingContext";
const FULL_METHOD_KEY: &str = "FullMethod";
const EMPTY_LITERAL: &str = "\"\"";

/// Rewritten source text plus what was done to produce it.
#[derive(Debug)]
pub struct RewriteResult {
    pub source: String,
    pub summary: RewriteSummary,
}

/// A call site scheduled for wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRewrite {
    pub synthetic_name: String,
    /// Literal of the last `runtime.AnnotateIncomingContext` seen before the
    /// site, quotes included. Empty when none was seen.
    pub rpc_method: String,
    /// The assignment as it read before replacement, dedented. `None` when
    /// the site already called the wrapper.
    pub original_assignment: Option<String>,
}

/// Captured call sites keyed by wrapper name, in first-capture order.
#[derive(Debug, Default)]
pub struct CaptureMap {
    entries: Vec<CapturedRewrite>,
    index: HashMap<String, usize>,
}

impl CaptureMap {
    /// Insert or overwrite. An overwritten entry keeps its position.
    pub fn insert(&mut self, capture: CapturedRewrite) {
        match self.index.get(&capture.synthetic_name) {
            Some(&i) => self.entries[i] = capture,
            None => {
                self.index
                    .insert(capture.synthetic_name.clone(), self.entries.len());
                self.entries.push(capture);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&CapturedRewrite> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedRewrite> {
        self.entries.iter()
    }
}

/// What a deleted wrapper carried.
#[derive(Debug, Default)]
struct StaleWrapper {
    original_assignment: Option<String>,
    full_method: Option<String>,
}

/// Rewrite one gateway source against the names in `registry`.
pub fn rewrite_gateway_source(
    source: &str,
    registry: &Registry,
) -> Result<RewriteResult, SourceError> {
    let src = GoSource::parse(source)?;
    let mut classifier = Classifier::new(&src, registry);
    classifier.visit(src.root());
    Ok(classifier.finish())
}

struct Classifier<'a> {
    src: &'a GoSource,
    registry: &'a Registry,
    last_rpc_method: String,
    server_type: Option<String>,
    captures: CaptureMap,
    stale: HashMap<String, StaleWrapper>,
    plan: EditPlan,
    summary: RewriteSummary,
}

impl<'a> Classifier<'a> {
    fn new(src: &'a GoSource, registry: &'a Registry) -> Self {
        Self {
            src,
            registry,
            last_rpc_method: String::new(),
            server_type: None,
            captures: CaptureMap::default(),
            stale: HashMap::new(),
            plan: EditPlan::default(),
            summary: RewriteSummary::default(),
        }
    }

    fn visit(&mut self, node: Node<'a>) {
        match node.kind() {
            "function_declaration" => self.visit_function(node),
            "short_var_declaration" | "assignment_statement" => {
                if !self.visit_assignment(node) {
                    self.visit_children(node);
                }
            }
            _ => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: Node<'a>) {
        for child in code_children(node) {
            self.visit(child);
        }
    }

    fn visit_function(&mut self, node: Node<'a>) {
        let src = self.src;
        let Some(name) = node.child_by_field_name("name").map(|n| src.node_text(n)) else {
            return self.visit_children(node);
        };

        if self.registry.root_service(name).is_some() {
            self.patch_root(node, name);
            self.visit_children(node);
        } else if self.registry.is_wrapper_name(name) || self.captures.contains(name) {
            self.remove_stale_wrapper(node, name);
        } else {
            self.visit_children(node);
        }
    }

    fn patch_root(&mut self, node: Node<'a>, name: &str) {
        self.summary.roots_found.push(name.to_string());
        let Some(params) = node.child_by_field_name("parameters") else {
            return;
        };
        if self.server_type.is_none() {
            self.server_type = parameter_type(self.src, params, SERVER_PARAM).map(str::to_string);
        }
        if plan_interceptor_param(self.src, params, &mut self.plan) {
            debug!(function = name, "adding interceptor parameter");
            self.summary.roots_patched.push(name.to_string());
        }
    }

    /// Delete a wrapper from an earlier run along with the blank lines before
    /// it. It is regenerated from the call site, or from what it held when the
    /// call site was already rewritten.
    fn remove_stale_wrapper(&mut self, node: Node<'a>, name: &str) {
        let start = node
            .prev_named_sibling()
            .map_or(node.start_byte(), |prev| prev.end_byte());
        self.plan.delete(start..node.end_byte());
        debug!(wrapper = name, "removing stale wrapper");
        self.summary.stale_wrappers_removed.push(name.to_string());

        let original_assignment = wrapped_call_name(name)
            .and_then(|call| find_assignment_calling(self.src, node, call))
            .map(|assignment| self.src.dedented_text(assignment));
        let full_method = find_full_method(self.src, node).map(str::to_string);
        self.stale.insert(
            name.to_string(),
            StaleWrapper {
                original_assignment,
                full_method,
            },
        );
    }

    /// Returns true when the statement was replaced and must not be descended.
    fn visit_assignment(&mut self, node: Node<'a>) -> bool {
        let Some(call) = single_call(node) else {
            return false;
        };
        let Some(function) = call.child_by_field_name("function") else {
            return false;
        };
        match function.kind() {
            "selector_expression" => {
                self.track_annotation(function, call);
                false
            }
            "identifier" => {
                let callee = self.src.node_text(function);
                self.visit_call_site(node, callee)
            }
            _ => false,
        }
    }

    fn track_annotation(&mut self, selector: Node<'a>, call: Node<'a>) {
        let (Some(operand), Some(field)) = (
            selector.child_by_field_name("operand"),
            selector.child_by_field_name("field"),
        ) else {
            return;
        };
        if operand.kind() != "identifier"
            || self.src.node_text(operand) != RUNTIME_PACKAGE
            || self.src.node_text(field) != ANNOTATE_INCOMING_CONTEXT
        {
            return;
        }
        let Some(args) = call.child_by_field_name("arguments") else {
            return;
        };
        if let Some(literal) = code_children(args)
            .into_iter()
            .rev()
            .find(|arg| is_string_literal(*arg))
        {
            self.last_rpc_method = self.src.node_text(literal).to_string();
        }
    }

    fn visit_call_site(&mut self, node: Node<'a>, callee: &str) -> bool {
        let synthetic = wrapper_name(callee);
        if self.registry.is_expected_call(callee) || self.captures.contains(&synthetic) {
            self.plan
                .replace(node.byte_range(), call_site_statement(&synthetic).to_go());
            debug!(call = callee, wrapper = %synthetic, "rewriting call site");
            self.summary.call_sites_rewritten.push(synthetic.clone());
            self.captures.insert(CapturedRewrite {
                synthetic_name: synthetic,
                rpc_method: self.last_rpc_method.clone(),
                original_assignment: Some(self.src.dedented_text(node)),
            });
            return true;
        }

        // Already rewritten by an earlier run; the wrapper still has to be
        // regenerated for it. The latest site sets the literal, as for fresh
        // sites, and an assignment captured earlier is kept.
        if self.registry.is_wrapper_name(callee) {
            let original_assignment = self
                .captures
                .get(callee)
                .and_then(|c| c.original_assignment.clone());
            self.captures.insert(CapturedRewrite {
                synthetic_name: callee.to_string(),
                rpc_method: self.last_rpc_method.clone(),
                original_assignment,
            });
        }
        false
    }

    fn finish(mut self) -> RewriteResult {
        let server_type = self.server_type.take().unwrap_or_default();
        if server_type.is_empty() && !self.captures.is_empty() {
            warn!("no `server` parameter on any root registration function; wrappers get an empty server type");
        }

        for capture in self.captures.iter() {
            let stale = self.stale.get(&capture.synthetic_name);
            let Some(assignment) = capture
                .original_assignment
                .as_deref()
                .or_else(|| stale.and_then(|s| s.original_assignment.as_deref()))
            else {
                warn!(
                    wrapper = %capture.synthetic_name,
                    "call site already calls a wrapper that is missing; it cannot be regenerated"
                );
                continue;
            };

            let full_method = if capture.rpc_method.is_empty() {
                stale
                    .and_then(|s| s.full_method.as_deref())
                    .unwrap_or(EMPTY_LITERAL)
            } else {
                capture.rpc_method.as_str()
            };
            if full_method == EMPTY_LITERAL {
                warn!(
                    wrapper = %capture.synthetic_name,
                    "no runtime.AnnotateIncomingContext before call site; FullMethod left empty"
                );
            }

            let decl = wrapper_declaration(&WrapperTemplate {
                name: &capture.synthetic_name,
                server_type: &server_type,
                full_method,
                original_assignment: assignment,
            });
            self.plan.append(decl.to_go());
            self.summary.wrappers.push(WrapperEntry {
                name: capture.synthetic_name.clone(),
                full_method: full_method.to_string(),
            });
        }

        if !self.summary.wrappers.is_empty() {
            for path in REQUIRED_IMPORTS {
                if plan_import(self.src, path, &mut self.plan) {
                    debug!(import = path, "adding import");
                    self.summary.imports_added.push(path.to_string());
                }
            }
        }

        let original = self.src.text();
        let source = self.plan.apply(original);
        self.summary.changed = source != original;
        self.summary.server_type = server_type;
        RewriteResult {
            source,
            summary: self.summary,
        }
    }
}

/// The call expression when the right-hand side of an assignment is exactly
/// one call.
fn single_call(assignment: Node<'_>) -> Option<Node<'_>> {
    let right = assignment.child_by_field_name("right")?;
    let values = if right.kind() == "expression_list" {
        code_children(right)
    } else {
        vec![right]
    };
    match values.as_slice() {
        [only] if only.kind() == "call_expression" => Some(*only),
        _ => None,
    }
}

fn find_assignment_calling<'t>(src: &GoSource, node: Node<'t>, callee: &str) -> Option<Node<'t>> {
    if matches!(node.kind(), "short_var_declaration" | "assignment_statement") {
        let calls_it = single_call(node)
            .and_then(|call| call.child_by_field_name("function"))
            .is_some_and(|f| f.kind() == "identifier" && src.node_text(f) == callee);
        if calls_it {
            return Some(node);
        }
    }
    code_children(node)
        .into_iter()
        .find_map(|child| find_assignment_calling(src, child, callee))
}

/// Value of the first `FullMethod: "<literal>"` keyed element under `node`.
fn find_full_method<'s>(src: &'s GoSource, node: Node<'_>) -> Option<&'s str> {
    if node.kind() == "keyed_element" {
        if let [key, value] = code_children(node).as_slice() {
            let value_text = src.node_text(*value).trim();
            if src.node_text(*key).trim() == FULL_METHOD_KEY
                && (value_text.starts_with('"') || value_text.starts_with('`'))
            {
                return Some(value_text);
            }
        }
    }
    code_children(node)
        .into_iter()
        .find_map(|child| find_full_method(src, child))
}
