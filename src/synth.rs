use crate::go_ast::{
    AssignOp, Block, Expr, Field, FuncDecl, FuncType, Stmt, assign, binary, call, composite,
    define, field, ident, idents, key_value, lit, map_type, paren, sel, star, type_assert, unary,
    unnamed,
};
use crate::naming::{INTERCEPTOR_PARAM, SERVER_PARAM};

const RESPONSE_TYPE: &str = "handlerResponse";
const RESPONSE_ITEM: &str = "handlerResponseItem";
const HANDLER: &str = "handler";

const CTX: &str = "ctx";
const ANNOTATED_CTX: &str = "annotatedContext";
const MARSHALER: &str = "inboundMarshaler";
const REQ: &str = "req";
const PATH_PARAMS: &str = "pathParams";
const MD: &str = "md";
const RESP: &str = "resp";
const ERR: &str = "err";
const OK: &str = "ok";
const DATA: &str = "data";
const NIL: &str = "nil";

/// Imports the template's body depends on beyond what grpc-gateway output
/// already has.
pub const REQUIRED_IMPORTS: &[&str] = &["fmt", "google.golang.org/grpc"];

/// Values filled into one wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperTemplate<'a> {
    pub name: &'a str,
    pub server_type: &'a str,
    /// Literal token including its quotes; empty yields `""`.
    pub full_method: &'a str,
    pub original_assignment: &'a str,
}

/// `interceptor *grpc.UnaryServerInterceptor`
pub fn interceptor_parameter() -> Field {
    field(&[INTERCEPTOR_PARAM], interceptor_type())
}

fn interceptor_type() -> Expr {
    star(sel("grpc", "UnaryServerInterceptor"))
}

fn http_request() -> Expr {
    star(sel("http", "Request"))
}

/// The statement that replaces a captured call site.
pub fn call_site_statement(wrapper: &str) -> Stmt {
    define(
        idents(&[MD, RESP, ERR]),
        call(
            ident(wrapper),
            idents(&[
                CTX,
                ANNOTATED_CTX,
                MARSHALER,
                SERVER_PARAM,
                INTERCEPTOR_PARAM,
                REQ,
                PATH_PARAMS,
            ]),
        ),
    )
}

pub fn wrapper_declaration(t: &WrapperTemplate<'_>) -> FuncDecl {
    FuncDecl {
        name: t.name.to_string(),
        ty: wrapper_signature(t.server_type),
        body: Block(vec![
            response_type_decl(),
            handler_closure(t.original_assignment),
            Stmt::VarDecl {
                name: RESPONSE_ITEM.to_string(),
                ty: Expr::EmptyInterface,
            },
            interceptor_dispatch(t.full_method),
            Stmt::If {
                init: None,
                cond: binary(ident(ERR), "!=", ident(NIL)),
                body: Block(vec![Stmt::Return(vec![])]),
                els: None,
            },
            define(
                idents(&[DATA, OK]),
                type_assert(ident(RESPONSE_ITEM), ident(RESPONSE_TYPE)),
            ),
            Stmt::If {
                init: None,
                cond: unary("!", ident(OK)),
                body: Block(vec![Stmt::Return(vec![])]),
                els: None,
            },
            Stmt::Return(vec![sel(DATA, MD), sel(DATA, RESP), ident(NIL)]),
        ]),
    }
}

fn wrapper_signature(server_type: &str) -> FuncType {
    FuncType {
        params: vec![
            field(&[CTX, ANNOTATED_CTX], sel("context", "Context")),
            field(&[MARSHALER], sel("runtime", "Marshaler")),
            field(&[SERVER_PARAM], ident(server_type)),
            interceptor_parameter(),
            field(&[REQ], http_request()),
            field(&[PATH_PARAMS], map_type(ident("string"), ident("string"))),
        ],
        results: vec![
            field(&[MD], sel("runtime", "ServerMetadata")),
            field(&[RESP], sel("proto", "Message")),
            field(&[ERR], ident("error")),
        ],
    }
}

fn response_type_decl() -> Stmt {
    Stmt::TypeDecl {
        name: RESPONSE_TYPE.to_string(),
        ty: Expr::Struct(vec![
            field(&[MD], sel("runtime", "ServerMetadata")),
            field(&[RESP], sel("proto", "Message")),
        ]),
    }
}

fn handler_closure(original_assignment: &str) -> Stmt {
    let closure = Expr::FuncLit(
        FuncType {
            params: vec![
                field(&[CTX], sel("context", "Context")),
                field(&[REQ], Expr::EmptyInterface),
            ],
            results: vec![unnamed(Expr::EmptyInterface), unnamed(ident("error"))],
        },
        Block(vec![
            Stmt::If {
                init: Some(Box::new(Stmt::Assign {
                    lhs: idents(&[REQ, OK]),
                    op: AssignOp::Define,
                    rhs: vec![type_assert(ident(REQ), http_request())],
                })),
                cond: ident(OK),
                body: Block(vec![
                    Stmt::Verbatim(original_assignment.to_string()),
                    Stmt::Return(vec![
                        composite(
                            ident(RESPONSE_TYPE),
                            vec![key_value(RESP, ident(RESP)), key_value(MD, ident(MD))],
                        ),
                        ident(ERR),
                    ]),
                ]),
                els: None,
            },
            Stmt::Return(vec![
                ident(NIL),
                call(
                    sel("fmt", "Errorf"),
                    vec![lit("\"error converting req to *http.Request\"")],
                ),
            ]),
        ]),
    );
    define(idents(&[HANDLER]), closure)
}

fn interceptor_dispatch(full_method: &str) -> Stmt {
    let full_method = if full_method.is_empty() {
        "\"\""
    } else {
        full_method
    };
    let info = unary(
        "&",
        composite(
            sel("grpc", "UnaryServerInfo"),
            vec![
                key_value("Server", ident(SERVER_PARAM)),
                key_value("FullMethod", lit(full_method)),
            ],
        ),
    );
    Stmt::If {
        init: None,
        cond: binary(ident(INTERCEPTOR_PARAM), "==", ident(NIL)),
        body: Block(vec![assign(
            idents(&[RESPONSE_ITEM, ERR]),
            call(ident(HANDLER), idents(&[CTX, REQ])),
        )]),
        els: Some(Block(vec![assign(
            idents(&[RESPONSE_ITEM, ERR]),
            call(
                paren(star(ident(INTERCEPTOR_PARAM))),
                vec![ident(CTX), ident(REQ), info, ident(HANDLER)],
            ),
        )])),
    }
}
