use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(String),
    /// A literal token, printed as-is (`"/pkg.Svc/Method"`).
    Lit(String),
    Selector(Box<Expr>, String),
    Star(Box<Expr>),
    Paren(Box<Expr>),
    Unary(&'static str, Box<Expr>),
    Binary(Box<Expr>, &'static str, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    TypeAssert(Box<Expr>, Box<Expr>),
    Composite(Box<Expr>, Vec<Expr>),
    KeyValue(Box<Expr>, Box<Expr>),
    FuncLit(FuncType, Block),
    Map(Box<Expr>, Box<Expr>),
    EmptyInterface,
    Struct(Vec<Field>),
}

/// A parameter, result or struct field. An empty `ty` prints the names alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub names: Vec<String>,
    pub ty: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncType {
    pub params: Vec<Field>,
    pub results: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block(pub Vec<Stmt>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Define,
    Assign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assign {
        lhs: Vec<Expr>,
        op: AssignOp,
        rhs: Vec<Expr>,
    },
    TypeDecl {
        name: String,
        ty: Expr,
    },
    VarDecl {
        name: String,
        ty: Expr,
    },
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        body: Block,
        els: Option<Block>,
    },
    Return(Vec<Expr>),
    /// Source text carried over unchanged; continuation lines are re-indented.
    Verbatim(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub name: String,
    pub ty: FuncType,
    pub body: Block,
}

pub fn ident(name: &str) -> Expr {
    Expr::Ident(name.to_string())
}

pub fn lit(token: &str) -> Expr {
    Expr::Lit(token.to_string())
}

/// `x.sel` where `x` is a plain identifier, e.g. a package name.
pub fn sel(x: &str, name: &str) -> Expr {
    Expr::Selector(Box::new(ident(x)), name.to_string())
}

pub fn star(x: Expr) -> Expr {
    Expr::Star(Box::new(x))
}

pub fn paren(x: Expr) -> Expr {
    Expr::Paren(Box::new(x))
}

pub fn unary(op: &'static str, x: Expr) -> Expr {
    Expr::Unary(op, Box::new(x))
}

pub fn binary(x: Expr, op: &'static str, y: Expr) -> Expr {
    Expr::Binary(Box::new(x), op, Box::new(y))
}

pub fn call(fun: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call(Box::new(fun), args)
}

pub fn type_assert(x: Expr, ty: Expr) -> Expr {
    Expr::TypeAssert(Box::new(x), Box::new(ty))
}

pub fn composite(ty: Expr, elts: Vec<Expr>) -> Expr {
    Expr::Composite(Box::new(ty), elts)
}

pub fn key_value(key: &str, value: Expr) -> Expr {
    Expr::KeyValue(Box::new(ident(key)), Box::new(value))
}

pub fn map_type(key: Expr, value: Expr) -> Expr {
    Expr::Map(Box::new(key), Box::new(value))
}

pub fn field(names: &[&str], ty: Expr) -> Field {
    Field {
        names: names.iter().map(|n| n.to_string()).collect(),
        ty,
    }
}

pub fn unnamed(ty: Expr) -> Field {
    Field {
        names: Vec::new(),
        ty,
    }
}

pub fn idents(names: &[&str]) -> Vec<Expr> {
    names.iter().map(|n| ident(n)).collect()
}

pub fn define(lhs: Vec<Expr>, rhs: Expr) -> Stmt {
    Stmt::Assign {
        lhs,
        op: AssignOp::Define,
        rhs: vec![rhs],
    }
}

pub fn assign(lhs: Vec<Expr>, rhs: Expr) -> Stmt {
    Stmt::Assign {
        lhs,
        op: AssignOp::Assign,
        rhs: vec![rhs],
    }
}

impl FuncDecl {
    /// Render as Go source, without a trailing newline.
    pub fn to_go(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "func {}{} ", self.name, signature(&self.ty));
        write_block(&mut out, &self.body, 0);
        out
    }
}

impl Field {
    pub fn to_go(&self) -> String {
        let ty = expr(&self.ty, 0);
        match (self.names.is_empty(), ty.is_empty()) {
            (true, _) => ty,
            (false, true) => self.names.join(", "),
            (false, false) => format!("{} {ty}", self.names.join(", ")),
        }
    }
}

impl Stmt {
    /// Render a statement on its own, at indentation level zero.
    pub fn to_go(&self) -> String {
        let mut out = String::new();
        write_stmt_inline(&mut out, self, 0);
        out
    }
}

fn signature(ty: &FuncType) -> String {
    let params: Vec<String> = ty.params.iter().map(Field::to_go).collect();
    let mut out = format!("({})", params.join(", "));
    match ty.results.as_slice() {
        [] => {}
        [only] if only.names.is_empty() => {
            let _ = write!(out, " {}", only.to_go());
        }
        results => {
            let results: Vec<String> = results.iter().map(Field::to_go).collect();
            let _ = write!(out, " ({})", results.join(", "));
        }
    }
    out
}

fn tabs(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push('\t');
    }
}

fn write_block(out: &mut String, block: &Block, indent: usize) {
    out.push_str("{\n");
    for stmt in &block.0 {
        tabs(out, indent + 1);
        write_stmt_inline(out, stmt, indent + 1);
        out.push('\n');
    }
    tabs(out, indent);
    out.push('}');
}

/// Write `stmt` assuming the cursor already sits after the indentation.
fn write_stmt_inline(out: &mut String, stmt: &Stmt, indent: usize) {
    match stmt {
        Stmt::Assign { lhs, op, rhs } => {
            let op = match op {
                AssignOp::Define => ":=",
                AssignOp::Assign => "=",
            };
            let _ = write!(out, "{} {op} {}", list(lhs, indent), list(rhs, indent));
        }
        Stmt::TypeDecl { name, ty } => {
            let _ = write!(out, "type {name} {}", expr(ty, indent));
        }
        Stmt::VarDecl { name, ty } => {
            let _ = write!(out, "var {name} {}", expr(ty, indent));
        }
        Stmt::If {
            init,
            cond,
            body,
            els,
        } => {
            out.push_str("if ");
            if let Some(init) = init {
                write_stmt_inline(out, init, indent);
                out.push_str("; ");
            }
            out.push_str(&expr(cond, indent));
            out.push(' ');
            write_block(out, body, indent);
            if let Some(els) = els {
                out.push_str(" else ");
                write_block(out, els, indent);
            }
        }
        Stmt::Return(results) if results.is_empty() => out.push_str("return"),
        Stmt::Return(results) => {
            let _ = write!(out, "return {}", list(results, indent));
        }
        Stmt::Verbatim(text) => {
            let mut lines = text.lines();
            out.push_str(lines.next().unwrap_or_default());
            for line in lines {
                out.push('\n');
                if !line.is_empty() {
                    tabs(out, indent);
                }
                out.push_str(line);
            }
        }
    }
}

fn list(exprs: &[Expr], indent: usize) -> String {
    exprs
        .iter()
        .map(|e| expr(e, indent))
        .collect::<Vec<_>>()
        .join(", ")
}

fn expr(e: &Expr, indent: usize) -> String {
    match e {
        Expr::Ident(name) => name.clone(),
        Expr::Lit(token) => token.clone(),
        Expr::Selector(x, name) => format!("{}.{name}", expr(x, indent)),
        Expr::Star(x) => format!("*{}", expr(x, indent)),
        Expr::Paren(x) => format!("({})", expr(x, indent)),
        Expr::Unary(op, x) => format!("{op}{}", expr(x, indent)),
        Expr::Binary(x, op, y) => format!("{} {op} {}", expr(x, indent), expr(y, indent)),
        Expr::Call(fun, args) => format!("{}({})", expr(fun, indent), list(args, indent)),
        Expr::TypeAssert(x, ty) => format!("{}.({})", expr(x, indent), expr(ty, indent)),
        Expr::Composite(ty, elts) => format!("{}{{{}}}", expr(ty, indent), list(elts, indent)),
        Expr::KeyValue(key, value) => format!("{}: {}", expr(key, indent), expr(value, indent)),
        Expr::FuncLit(ty, body) => {
            let mut out = format!("func{} ", signature(ty));
            write_block(&mut out, body, indent);
            out
        }
        Expr::Map(key, value) => format!("map[{}]{}", expr(key, indent), expr(value, indent)),
        Expr::EmptyInterface => "interface{}".to_string(),
        Expr::Struct(fields) => {
            if fields.is_empty() {
                return "struct{}".to_string();
            }
            // gofmt aligns field types into one column.
            let names: Vec<String> = fields.iter().map(|f| f.names.join(", ")).collect();
            let width = names.iter().map(String::len).max().unwrap_or(0);
            let mut out = String::from("struct {\n");
            for (names, f) in names.iter().zip(fields) {
                tabs(&mut out, indent + 1);
                let _ = writeln!(out, "{names:<width$} {}", expr(&f.ty, indent + 1));
            }
            tabs(&mut out, indent);
            out.push('}');
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_signature_with_grouped_names_and_named_results() {
        let decl = FuncDecl {
            name: "f".into(),
            ty: FuncType {
                params: vec![
                    field(&["a", "b"], ident("int")),
                    field(&["m"], map_type(ident("string"), ident("string"))),
                ],
                results: vec![field(&["err"], ident("error"))],
            },
            body: Block(vec![Stmt::Return(vec![])]),
        };
        assert_eq!(
            decl.to_go(),
            "func f(a, b int, m map[string]string) (err error) {\n\treturn\n}"
        );
    }

    #[test]
    fn single_unnamed_result_has_no_parens() {
        let ty = FuncType {
            params: vec![],
            results: vec![unnamed(ident("error"))],
        };
        assert_eq!(signature(&ty), "() error");
    }

    #[test]
    fn aligns_struct_fields() {
        let stmt = Stmt::TypeDecl {
            name: "pair".into(),
            ty: Expr::Struct(vec![
                field(&["md"], sel("runtime", "ServerMetadata")),
                field(&["resp"], sel("proto", "Message")),
            ]),
        };
        assert_eq!(
            stmt.to_go(),
            "type pair struct {\n\tmd   runtime.ServerMetadata\n\tresp proto.Message\n}"
        );
    }

    #[test]
    fn nests_func_literal_blocks() {
        let body = Block(vec![define(
            idents(&["h"]),
            Expr::FuncLit(
                FuncType::default(),
                Block(vec![Stmt::If {
                    init: None,
                    cond: unary("!", ident("ok")),
                    body: Block(vec![Stmt::Return(vec![])]),
                    els: Some(Block(vec![Stmt::Verbatim("x := y(\n\t1,\n)".into())])),
                }]),
            ),
        )]);
        let decl = FuncDecl {
            name: "g".into(),
            ty: FuncType::default(),
            body,
        };
        assert_eq!(
            decl.to_go(),
            "func g() {\n\th := func() {\n\t\tif !ok {\n\t\t\treturn\n\t\t} else {\n\t\t\tx := y(\n\t\t\t\t1,\n\t\t\t)\n\t\t}\n\t}\n}"
        );
    }

    #[test]
    fn field_without_type_prints_names() {
        assert_eq!(field(&["server"], ident("")).to_go(), "server");
        assert_eq!(unnamed(Expr::EmptyInterface).to_go(), "interface{}");
    }
}
