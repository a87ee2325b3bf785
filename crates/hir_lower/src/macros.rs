//! Macro-definition fix-up: re-render interpolated front-end fragments into
//! plain tokens so serialised macros carry no AST pointers.

use base::Span;
use hir::{MacroRule, MacroRules, Token, TokenStream};
use intern::IStr;

use crate::Ctx;

pub(crate) fn fixup_macro_def(ctx: &Ctx<'_>, sp: Span, def: &ast::MacroDef) -> MacroRules {
    MacroRules {
        rules: def
            .rules
            .iter()
            .map(|rule| MacroRule {
                pattern: fixup_stream(ctx, sp, &rule.pattern),
                body: fixup_stream(ctx, sp, &rule.body),
            })
            .collect(),
        source_crate: ctx.crate_name.clone(),
    }
}

fn fixup_stream(ctx: &Ctx<'_>, sp: Span, trees: &[ast::TokenTree]) -> TokenStream {
    let mut out = Vec::new();
    for tree in trees {
        match tree {
            ast::TokenTree::Token(t) => out.push(t.clone()),
            ast::TokenTree::Interpolated(frag) => render_frag(ctx, sp, frag, &mut out),
        }
    }
    TokenStream(out)
}

fn render_frag(ctx: &Ctx<'_>, sp: Span, frag: &ast::InterpolatedFrag, out: &mut Vec<Token>) {
    match frag {
        ast::InterpolatedFrag::Ident(name) => out.push(Token::Ident(name.clone())),
        ast::InterpolatedFrag::Path(path) => render_path(path, out),
        ast::InterpolatedFrag::Expr(expr) => match expr {
            ast::Expr::IntLiteral { v, suffix } => {
                let text = match suffix {
                    Some(s) => format!("{}{}", v, s),
                    None => format!("{}", v),
                };
                out.push(Token::Literal(text));
            }
            ast::Expr::NamedValue(path) => render_path(path, out),
            ast::Expr::Opaque(text) => out.push(Token::Literal(text.clone())),
        },
        ast::InterpolatedFrag::Ty(ty) => render_type(ctx, sp, ty, out),
    }
}

fn render_path(path: &ast::Path, out: &mut Vec<Token>) {
    match &path.class {
        ast::PathClass::Absolute { crate_name, nodes } => {
            if !crate_name.is_empty() {
                out.push(Token::Punct(IStr::new("::")));
                out.push(Token::Ident(crate_name.clone()));
            }
            for node in nodes {
                out.push(Token::Punct(IStr::new("::")));
                out.push(Token::Ident(node.name.clone()));
            }
        }
        ast::PathClass::Local { name } => out.push(Token::Ident(name.clone())),
        ast::PathClass::Ufcs { .. } => {
            // Qualified paths re-render via their trailing segments only;
            // the qualifier cannot appear in macro output positions.
            for node in path.nodes() {
                out.push(Token::Punct(IStr::new("::")));
                out.push(Token::Ident(node.name.clone()));
            }
        }
    }
}

fn render_type(ctx: &Ctx<'_>, sp: Span, ty: &ast::Type, out: &mut Vec<Token>) {
    match ty {
        ast::Type::Infer => out.push(Token::Ident(IStr::new("_"))),
        ast::Type::Never => out.push(Token::Punct(IStr::new("!"))),
        ast::Type::Primitive(core) => out.push(Token::Ident(IStr::new(core.name()))),
        ast::Type::Path(path) => render_path(path, out),
        ast::Type::Tuple(items) => {
            out.push(Token::Open(hir::tokens::Delim::Paren));
            for item in items {
                render_type(ctx, sp, item, out);
                out.push(Token::Punct(IStr::new(",")));
            }
            out.push(Token::Close(hir::tokens::Delim::Paren));
        }
        ast::Type::Borrow { is_mut, inner, .. } => {
            out.push(Token::Punct(IStr::new("&")));
            if *is_mut {
                out.push(Token::Ident(IStr::new("mut")));
            }
            render_type(ctx, sp, inner, out);
        }
        ast::Type::Pointer { is_mut, inner } => {
            out.push(Token::Punct(IStr::new("*")));
            out.push(Token::Ident(IStr::new(if *is_mut { "mut" } else { "const" })));
            render_type(ctx, sp, inner, out);
        }
        ast::Type::Slice(inner) => {
            out.push(Token::Open(hir::tokens::Delim::Bracket));
            render_type(ctx, sp, inner, out);
            out.push(Token::Close(hir::tokens::Delim::Bracket));
        }
        other => {
            // Remaining shapes render through the lowered form's syntax.
            let lowered = crate::ty::lower_type(ctx, sp, other);
            out.push(Token::Literal(format!("{}", lowered)));
        }
    }
}
