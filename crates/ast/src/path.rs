//! Source paths as they come out of name resolution: absolute or UFCS, with
//! the resolved binding attached to each.

use std::fmt;

use hir::SimplePath;
use intern::IStr;

use crate::types::Type;
use crate::Expr;

/// What a resolved path points at. Set by the (external) name-resolution
/// pass; `Unbound` reaching lowering is a hard error.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Binding {
    Unbound,
    /// A generic parameter, by its 16-bit binding word.
    TypeParam { binding: u16 },
    ValueParam { binding: u16 },
    Module(SimplePath),
    Struct(SimplePath),
    Enum(SimplePath),
    Union(SimplePath),
    Trait(SimplePath),
    TraitAlias(SimplePath),
    TypeAlias(SimplePath),
    ExternType(SimplePath),
    EnumVariant { path: SimplePath, idx: u32 },
    Function(SimplePath),
    Static(SimplePath),
    Constant(SimplePath),
    StructValue(SimplePath),
    Macro(SimplePath),
    /// A primitive type named through the type namespace.
    Primitive(hir::CoreType),
}

impl Binding {
    pub fn is_unbound(&self) -> bool {
        matches!(self, Binding::Unbound)
    }

    /// The definition path, for bindings that have one.
    pub fn target_path(&self) -> Option<&SimplePath> {
        match self {
            Binding::Unbound | Binding::TypeParam { .. } | Binding::ValueParam { .. } => None,
            Binding::Primitive(_) => None,
            Binding::Module(p)
            | Binding::Struct(p)
            | Binding::Enum(p)
            | Binding::Union(p)
            | Binding::Trait(p)
            | Binding::TraitAlias(p)
            | Binding::TypeAlias(p)
            | Binding::ExternType(p)
            | Binding::EnumVariant { path: p, .. }
            | Binding::Function(p)
            | Binding::Static(p)
            | Binding::Constant(p)
            | Binding::StructValue(p)
            | Binding::Macro(p) => Some(p),
        }
    }
}

/// Generic arguments written on one path segment.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PathArgs {
    pub lifetimes: Vec<IStr>,
    pub types: Vec<Type>,
    pub consts: Vec<Expr>,
    /// Associated-type equalities (`Item = T`).
    pub bindings: Vec<(IStr, Type)>,
    /// Associated-type bounds (`Item: Trait`).
    pub assoc_bounds: Vec<(IStr, Vec<TraitRef>)>,
}

impl PathArgs {
    pub fn is_empty(&self) -> bool {
        self.lifetimes.is_empty()
            && self.types.is_empty()
            && self.consts.is_empty()
            && self.bindings.is_empty()
            && self.assoc_bounds.is_empty()
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PathNode {
    pub name: IStr,
    pub args: PathArgs,
}

impl PathNode {
    pub fn new(name: IStr) -> PathNode {
        PathNode { name, args: PathArgs::default() }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PathClass {
    /// `::"crate"::a::b` — empty crate name means the current crate.
    Absolute { crate_name: IStr, nodes: Vec<PathNode> },
    /// `<Type as Trait>::item…` (trait absent for inherent form).
    Ufcs { ty: Box<Type>, trait_: Option<Box<Path>>, nodes: Vec<PathNode> },
    /// A bare identifier resolved locally (generic parameter, `Self`).
    Local { name: IStr },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Path {
    pub class: PathClass,
    pub binding: Binding,
}

impl Path {
    pub fn new_absolute(crate_name: IStr, nodes: Vec<PathNode>) -> Path {
        Path { class: PathClass::Absolute { crate_name, nodes }, binding: Binding::Unbound }
    }

    pub fn new_local(name: IStr) -> Path {
        Path { class: PathClass::Local { name }, binding: Binding::Unbound }
    }

    pub fn with_binding(mut self, binding: Binding) -> Path {
        self.binding = binding;
        self
    }

    pub fn nodes(&self) -> &[PathNode] {
        match &self.class {
            PathClass::Absolute { nodes, .. } | PathClass::Ufcs { nodes, .. } => nodes,
            PathClass::Local { .. } => &[],
        }
    }

    /// The trailing identifier.
    pub fn last_ident(&self) -> Option<&IStr> {
        match &self.class {
            PathClass::Absolute { nodes, .. } | PathClass::Ufcs { nodes, .. } => {
                nodes.last().map(|n| &n.name)
            }
            PathClass::Local { name } => Some(name),
        }
    }

    /// Build an absolute path (bindingless) from a plain `SimplePath`.
    pub fn from_simple(path: &SimplePath) -> Path {
        Path::new_absolute(
            path.crate_name.clone(),
            path.components.iter().map(|c| PathNode::new(c.clone())).collect(),
        )
    }

    /// Collapse to a `SimplePath`, when absolute and argument-free.
    pub fn as_simple_path(&self) -> Option<SimplePath> {
        match &self.class {
            PathClass::Absolute { crate_name, nodes } => {
                if nodes.iter().any(|n| !n.args.is_empty()) {
                    return None;
                }
                Some(SimplePath::new(crate_name.clone(), nodes.iter().map(|n| n.name.clone())))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class {
            PathClass::Absolute { crate_name, nodes } => {
                write!(f, "::\"{}\"", crate_name)?;
                for n in nodes {
                    write!(f, "::{}", n.name)?;
                }
                Ok(())
            }
            PathClass::Ufcs { trait_, nodes, .. } => {
                match trait_ {
                    Some(t) => write!(f, "<_ as {}>", t)?,
                    None => write!(f, "<_>")?,
                }
                for n in nodes {
                    write!(f, "::{}", n.name)?;
                }
                Ok(())
            }
            PathClass::Local { name } => write!(f, "{}", name),
        }
    }
}

/// A trait reference in bound position, with optional `for<…>` binders.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TraitRef {
    pub hrls: Vec<IStr>,
    pub path: Path,
}
