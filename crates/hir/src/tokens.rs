//! Plain token streams for serialised macro definitions.
//!
//! By the time a macro reaches the HIR its tokens must be self-contained:
//! the lowering pass re-renders any interpolated front-end fragments into the
//! forms below, so metadata never carries front-end pointers.

use std::fmt;

use intern::IStr;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Delim {
    Paren,
    Brace,
    Bracket,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Token {
    Ident(IStr),
    Lifetime(IStr),
    /// Literal, kept in lexeme form.
    Literal(String),
    Punct(IStr),
    Open(Delim),
    Close(Delim),
    /// `$name:frag` in a pattern.
    MetaVar { name: IStr, frag: IStr },
    /// `$name` in an expansion body.
    Subst(IStr),
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TokenStream(pub Vec<Token>);

impl TokenStream {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TokenStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.0 {
            match t {
                Token::Ident(s) => write!(f, "{} ", s)?,
                Token::Lifetime(s) => write!(f, "'{} ", s)?,
                Token::Literal(s) => write!(f, "{} ", s)?,
                Token::Punct(s) => write!(f, "{}", s)?,
                Token::Open(Delim::Paren) => f.write_str("(")?,
                Token::Open(Delim::Brace) => f.write_str("{")?,
                Token::Open(Delim::Bracket) => f.write_str("[")?,
                Token::Close(Delim::Paren) => f.write_str(")")?,
                Token::Close(Delim::Brace) => f.write_str("}")?,
                Token::Close(Delim::Bracket) => f.write_str("]")?,
                Token::MetaVar { name, frag } => write!(f, "${}:{} ", name, frag)?,
                Token::Subst(name) => write!(f, "${} ", name)?,
            }
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MacroRule {
    pub pattern: TokenStream,
    pub body: TokenStream,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MacroRules {
    pub rules: Vec<MacroRule>,
    /// Crate the macro was defined in (for `$crate` resolution).
    pub source_crate: IStr,
}
