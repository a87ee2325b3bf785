//! Source types, in as-written form. Paths inside carry bindings from name
//! resolution; nothing else is resolved.

use intern::IStr;

use crate::path::{Path, TraitRef};
use crate::Expr;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Type {
    Infer,
    Never,
    Primitive(hir::CoreType),
    Path(Path),
    Tuple(Vec<Type>),
    Borrow { is_mut: bool, lifetime: Option<IStr>, inner: Box<Type> },
    Pointer { is_mut: bool, inner: Box<Type> },
    Array { inner: Box<Type>, size: Box<Expr> },
    Slice(Box<Type>),
    Fn {
        hrls: Vec<IStr>,
        is_unsafe: bool,
        is_variadic: bool,
        abi: Option<String>,
        args: Vec<Type>,
        ret: Box<Type>,
    },
    TraitObject { traits: Vec<TraitRef>, lifetime: Option<IStr> },
    ImplTrait { traits: Vec<TraitRef>, lifetimes: Vec<IStr> },
}

impl Type {
    pub fn unit() -> Type {
        Type::Tuple(Vec::new())
    }

    pub fn self_ty() -> Type {
        Type::Path(Path::new_local(IStr::new("Self")))
    }
}

/// One `<…>` parameter list plus its `where` clauses, flattened.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct GenericsDef {
    pub lifetimes: Vec<IStr>,
    pub types: Vec<TypeParamAst>,
    pub consts: Vec<ConstParamAst>,
    pub bounds: Vec<BoundAst>,
}

impl GenericsDef {
    pub fn is_empty(&self) -> bool {
        self.lifetimes.is_empty() && self.types.is_empty() && self.consts.is_empty()
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TypeParamAst {
    pub name: IStr,
    pub default: Option<Type>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConstParamAst {
    pub name: IStr,
    pub ty: Type,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BoundAst {
    /// `'a: 'b`
    Lifetime { lt: IStr, outlives: IStr },
    /// `T: 'a`
    TypeLifetime { ty: Type, lt: IStr },
    /// `for<…> T: Trait`; `is_maybe` for `?Trait` relaxations.
    Trait { hrls: Vec<IStr>, ty: Type, trait_: TraitRef, is_maybe: bool },
    /// `T == U` equality constraint.
    Equality { ty: Type, val: Type },
}
