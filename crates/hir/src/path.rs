//! Item paths: plain [`SimplePath`]s, generic-carrying [`GenericPath`]s,
//! trait references with associated-type bounds ([`TraitPath`]), and the full
//! [`Path`] sum including the UFCS forms.

use std::fmt;

use intern::IStr;
use smallvec::SmallVec;

use crate::generics::GenericParams;
use crate::ty::{ConstGeneric, LifetimeRef, TypeRef};

/// Fully qualified, generics-free item path.
///
/// During lowering the crate name may still be the reserved empty string;
/// after lowering every path carries the real crate name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SimplePath {
    pub crate_name: IStr,
    pub components: SmallVec<[IStr; 2]>,
}

impl SimplePath {
    pub fn new(crate_name: IStr, components: impl IntoIterator<Item = IStr>) -> SimplePath {
        SimplePath { crate_name, components: components.into_iter().collect() }
    }

    /// The crate root.
    pub fn crate_root(crate_name: IStr) -> SimplePath {
        SimplePath { crate_name, components: SmallVec::new() }
    }

    pub fn child(&self, name: IStr) -> SimplePath {
        let mut rv = self.clone();
        rv.components.push(name);
        rv
    }

    pub fn parent(&self) -> SimplePath {
        assert!(!self.components.is_empty(), "SimplePath::parent on crate root");
        let mut rv = self.clone();
        rv.components.pop();
        rv
    }

    pub fn last(&self) -> &IStr {
        self.components.last().expect("SimplePath::last on crate root")
    }

    pub fn starts_with(&self, other: &SimplePath) -> bool {
        self.crate_name == other.crate_name
            && self.components.len() >= other.components.len()
            && self.components[..other.components.len()] == other.components[..]
    }
}

impl fmt::Display for SimplePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "::\"{}\"", self.crate_name)?;
        for c in &self.components {
            write!(f, "::{}", c)?;
        }
        Ok(())
    }
}

/// Ordered generic arguments attached to a path segment.
///
/// Two parameter lists describe the *same instantiation* when their types and
/// values agree; lifetimes only participate in exact (`==`) equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PathParams {
    pub lifetimes: Vec<LifetimeRef>,
    pub types: Vec<TypeRef>,
    pub values: Vec<ConstGeneric>,
}

impl PathParams {
    pub fn new() -> PathParams {
        PathParams::default()
    }

    pub fn with_types(types: Vec<TypeRef>) -> PathParams {
        PathParams { lifetimes: Vec::new(), types, values: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.lifetimes.is_empty() && self.types.is_empty() && self.values.is_empty()
    }

    /// Equality for "is this the same generic instantiation" queries —
    /// ignores lifetimes.
    pub fn same_instantiation(&self, other: &PathParams) -> bool {
        self.types == other.types && self.values == other.values
    }
}

impl fmt::Display for PathParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "<")?;
        let mut sep = "";
        for lt in &self.lifetimes {
            write!(f, "{}{}", sep, lt)?;
            sep = ",";
        }
        for t in &self.types {
            write!(f, "{}{}", sep, t)?;
            sep = ",";
        }
        for v in &self.values {
            write!(f, "{}{{{}}}", sep, v)?;
            sep = ",";
        }
        write!(f, ">")
    }
}

/// A path with generic arguments, e.g. `::"core"::option::Option<u32>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GenericPath {
    pub path: SimplePath,
    pub params: PathParams,
}

impl GenericPath {
    pub fn new(path: SimplePath, params: PathParams) -> GenericPath {
        GenericPath { path, params }
    }
}

impl From<SimplePath> for GenericPath {
    fn from(path: SimplePath) -> GenericPath {
        GenericPath { path, params: PathParams::new() }
    }
}

impl fmt::Display for GenericPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.path, self.params)
    }
}

/// An associated-type equality taken from a trait path, e.g. the
/// `Item = u32` in `Iterator<Item = u32>`. `source_trait` names the (super)
/// trait the associated type is declared on.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtyEqual {
    pub source_trait: GenericPath,
    pub ty: TypeRef,
}

/// An associated-type trait bound from a trait path, e.g. the
/// `Item: Send` in `Iterator<Item: Send>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtyBound {
    pub source_trait: GenericPath,
    pub traits: Vec<TraitPath>,
}

/// Reference to a trait, with `for<…>` binders and any associated-type
/// bounds written on the reference.
///
/// The trait definition itself is resolved on demand through the owning
/// [`Crate`]; no back-pointer is stored (it could never survive
/// serialisation, and resolution is a cheap table walk).
///
/// [`Crate`]: crate::Crate
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitPath {
    /// `for<'a, …>` binders scoped to this reference.
    pub hrtbs: Option<Box<GenericParams>>,
    pub path: GenericPath,
    pub type_bounds: std::collections::BTreeMap<IStr, AtyEqual>,
    pub trait_bounds: std::collections::BTreeMap<IStr, AtyBound>,
}

impl TraitPath {
    pub fn new(path: GenericPath) -> TraitPath {
        TraitPath {
            hrtbs: None,
            path,
            type_bounds: Default::default(),
            trait_bounds: Default::default(),
        }
    }
}

impl From<GenericPath> for TraitPath {
    fn from(path: GenericPath) -> TraitPath {
        TraitPath::new(path)
    }
}

impl fmt::Display for TraitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(hrtbs) = &self.hrtbs {
            write!(f, "for<")?;
            for lt in &hrtbs.lifetimes {
                write!(f, "'{},", lt.name)?;
            }
            write!(f, "> ")?;
        }
        write!(f, "{}", self.path)?;
        for (name, aty) in &self.type_bounds {
            write!(f, " [{} = {}]", name, aty.ty)?;
        }
        Ok(())
    }
}

/// `<T>::item` — inherent UFCS. `impl_params` are the parameters of the
/// source impl block, filled in during resolution.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathUfcsInherent {
    pub ty: TypeRef,
    pub item: IStr,
    pub params: PathParams,
    pub impl_params: PathParams,
}

/// `<T as Trait>::item` — trait UFCS, the projection form.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathUfcsKnown {
    pub ty: TypeRef,
    pub trait_: GenericPath,
    pub item: IStr,
    pub params: PathParams,
    pub hrtbs: Option<Box<GenericParams>>,
}

/// `<T>::item` before the trait has been determined. Transient: must be
/// resolved away before any resolver query runs.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathUfcsUnknown {
    pub ty: TypeRef,
    pub item: IStr,
    pub params: PathParams,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Path {
    Generic(GenericPath),
    UfcsInherent(Box<PathUfcsInherent>),
    UfcsKnown(Box<PathUfcsKnown>),
    UfcsUnknown(Box<PathUfcsUnknown>),
}

impl Path {
    pub fn as_generic(&self) -> Option<&GenericPath> {
        match self {
            Path::Generic(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_generic_mut(&mut self) -> Option<&mut GenericPath> {
        match self {
            Path::Generic(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_ufcs_known(&self) -> Option<&PathUfcsKnown> {
        match self {
            Path::UfcsKnown(p) => Some(p),
            _ => None,
        }
    }
}

impl From<SimplePath> for Path {
    fn from(path: SimplePath) -> Path {
        Path::Generic(path.into())
    }
}

impl From<GenericPath> for Path {
    fn from(path: GenericPath) -> Path {
        Path::Generic(path)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Generic(p) => write!(f, "{}", p),
            Path::UfcsInherent(p) => {
                write!(f, "<{}>::{}{}", p.ty, p.item, p.params)
            }
            Path::UfcsKnown(p) => {
                write!(f, "<{} as {}>::{}{}", p.ty, p.trait_, p.item, p.params)
            }
            Path::UfcsUnknown(p) => {
                write!(f, "<{} as _>::{}{}", p.ty, p.item, p.params)
            }
        }
    }
}

impl_debug_via_display!(SimplePath);
impl_debug_via_display!(PathParams);
impl_debug_via_display!(GenericPath);
impl_debug_via_display!(TraitPath);
impl_debug_via_display!(Path);
