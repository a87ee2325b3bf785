//! The slice of the front-end AST the middle-end consumes: the item tree as
//! produced by the parser, macro expander and name resolver.
//!
//! Two passes read this: AST→HIR lowering, and the module index builder —
//! which also *writes* the per-module name tables defined here, since they
//! are keyed by source paths.

pub mod path;
pub mod types;

use std::fmt;

use base::{Span, TargetVersion};
use hir::SimplePath;
use indexmap::IndexMap;
use intern::IStr;

pub use crate::path::{Binding, Path, PathArgs, PathClass, PathNode, TraitRef};
pub use crate::types::{BoundAst, ConstParamAst, GenericsDef, Type, TypeParamAst};

// ---------------------------------------------------------------------------
// Attributes

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AttrValue {
    None,
    Str(String),
    Int(u128),
    List(Vec<Attribute>),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Attribute {
    pub name: IStr,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new_marker(name: &str) -> Attribute {
        Attribute { name: IStr::new(name), value: AttrValue::None }
    }

    pub fn new_str(name: &str, v: &str) -> Attribute {
        Attribute { name: IStr::new(name), value: AttrValue::Str(v.to_owned()) }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<u128> {
        match &self.value {
            AttrValue::Int(v) => Some(*v),
            // `attr("123")` spellings are accepted by the front-end too.
            AttrValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Attributes(pub Vec<Attribute>);

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.0.iter().find(|a| a.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

// ---------------------------------------------------------------------------
// Expressions (the middle-end only inspects literal shapes; everything else
// stays opaque and is carried by its printed form)

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Expr {
    IntLiteral { v: u128, suffix: Option<IStr> },
    /// A named constant or generic value parameter.
    NamedValue(Path),
    /// Anything else, as written.
    Opaque(String),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntLiteral { v, suffix: Some(s) } => write!(f, "{}{}", v, s),
            Expr::IntLiteral { v, suffix: None } => write!(f, "{}", v),
            Expr::NamedValue(p) => write!(f, "{}", p),
            Expr::Opaque(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Macro tokens

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum InterpolatedFrag {
    Ty(Type),
    Path(Path),
    Expr(Expr),
    Ident(IStr),
}

/// A token as stored in a macro definition. `Interpolated` nodes are AST
/// fragments captured during expansion; lowering re-renders them into plain
/// tokens before the macro can be serialised.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenTree {
    Token(hir::Token),
    Interpolated(Box<InterpolatedFrag>),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MacroRuleAst {
    pub pattern: Vec<TokenTree>,
    pub body: Vec<TokenTree>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MacroDef {
    pub rules: Vec<MacroRuleAst>,
}

// ---------------------------------------------------------------------------
// Visibility

/// Visibility as written, forming the lattice the index builder works in.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Visibility {
    /// Not `pub`: visible within the defining module subtree.
    Private(SimplePath),
    /// `pub(in path)` / `pub(crate)`.
    PathRestricted(SimplePath),
    Public,
}

impl Visibility {
    pub fn is_visible_from(&self, module: &SimplePath) -> bool {
        match self {
            Visibility::Public => true,
            Visibility::Private(p) | Visibility::PathRestricted(p) => module.starts_with(p),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }

    /// Is every module that can see `other` also able to see `self`?
    pub fn contains(&self, other: &Visibility) -> bool {
        match (self, other) {
            (Visibility::Public, _) => true,
            (_, Visibility::Public) => false,
            (
                Visibility::Private(a) | Visibility::PathRestricted(a),
                Visibility::Private(b) | Visibility::PathRestricted(b),
            ) => b.starts_with(a),
        }
    }

    /// In-place union: keep the wider of the two.
    pub fn widen(&mut self, other: &Visibility) {
        if other.contains(self) {
            *self = other.clone();
        }
    }

    /// The intersection used when re-exporting `other` through an import
    /// declared at `self`.
    pub fn intersect(&self, other: &Visibility) -> Visibility {
        if self.contains(other) {
            other.clone()
        } else {
            self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Items

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldAst {
    pub name: IStr,
    pub vis: Visibility,
    pub ty: Type,
    pub attrs: Attributes,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StructDataAst {
    Unit,
    Tuple(Vec<(Visibility, Type)>),
    Named(Vec<FieldAst>),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StructDef {
    pub generics: GenericsDef,
    pub data: StructDataAst,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum VariantKind {
    Unit { disc: Option<Expr> },
    Tuple(Vec<Type>),
    Struct(Vec<FieldAst>),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VariantAst {
    pub name: IStr,
    pub attrs: Attributes,
    pub kind: VariantKind,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EnumDef {
    pub generics: GenericsDef,
    pub variants: Vec<VariantAst>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UnionDef {
    pub generics: GenericsDef,
    pub fields: Vec<FieldAst>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TraitDef {
    pub generics: GenericsDef,
    pub supertraits: Vec<TraitRef>,
    pub lifetime: Option<IStr>,
    pub is_marker: bool,
    pub is_unsafe: bool,
    pub items: Vec<Item>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TraitAliasDef {
    pub generics: GenericsDef,
    pub traits: Vec<TraitRef>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TypeAliasDef {
    pub generics: GenericsDef,
    pub ty: Type,
}

/// An associated type declaration in a trait.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssocTypeDef {
    pub bounds: Vec<BoundAst>,
    pub default: Option<Type>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FnDef {
    pub generics: GenericsDef,
    pub abi: Option<String>,
    pub is_unsafe: bool,
    pub is_const: bool,
    pub is_async: bool,
    pub is_variadic: bool,
    /// Argument names and (fully written) types; the `self` shorthand has
    /// been expanded by the parser.
    pub args: Vec<(IStr, Type)>,
    pub ret: Option<Type>,
    /// `true` when a body is present (`false` for trait method declarations
    /// and extern-block entries). Bodies themselves stay in the front-end.
    pub has_body: bool,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StaticDef {
    pub is_mut: bool,
    pub ty: Type,
    pub expr: Option<Expr>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConstDef {
    pub generics: GenericsDef,
    pub ty: Type,
    pub expr: Option<Expr>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImplDef {
    pub generics: GenericsDef,
    pub trait_: Option<TraitRef>,
    pub is_negative: bool,
    pub ty: Type,
    pub items: Vec<Item>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UseEntry {
    pub span: Span,
    pub path: Path,
    /// Bound name; `None` is a glob (`use foo::*`).
    pub name: Option<IStr>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UseItem {
    pub entries: Vec<UseEntry>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExternBlock {
    pub abi: String,
    pub items: Vec<Item>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ItemKind {
    Module(Module),
    Use(UseItem),
    ExternCrate { name: IStr },
    ExternBlock(ExternBlock),
    Struct(StructDef),
    Enum(EnumDef),
    Union(UnionDef),
    Trait(TraitDef),
    TraitAlias(TraitAliasDef),
    TypeAlias(TypeAliasDef),
    AssocType(AssocTypeDef),
    Function(FnDef),
    Static(StaticDef),
    Const(ConstDef),
    Impl(ImplDef),
    Macro(MacroDef),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Item {
    pub span: Span,
    pub attrs: Attributes,
    pub vis: Visibility,
    pub name: IStr,
    pub kind: ItemKind,
}

// ---------------------------------------------------------------------------
// Modules and the index tables

/// One name-table entry produced by the index builder.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IndexEnt {
    pub is_import: bool,
    pub vis: Visibility,
    pub path: Path,
}

/// Progress of the index build for one module.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum IndexState {
    Unvisited,
    /// Phase 1 done, but the module has a public glob — entries may still be
    /// added while wildcards expand.
    Phase1Glob,
    /// No further mutation.
    Settled,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Module {
    /// This module's own absolute path.
    pub mod_path: SimplePath,
    pub items: Vec<Item>,

    // Populated by the index builder.
    pub namespace_items: IndexMap<IStr, IndexEnt>,
    pub type_items: IndexMap<IStr, IndexEnt>,
    pub value_items: IndexMap<IStr, IndexEnt>,
    pub macro_items: IndexMap<IStr, IndexEnt>,
    pub index_state: IndexState,
}

impl Module {
    pub fn new(mod_path: SimplePath) -> Module {
        Module {
            mod_path,
            items: Vec::new(),
            namespace_items: IndexMap::new(),
            type_items: IndexMap::new(),
            value_items: IndexMap::new(),
            macro_items: IndexMap::new(),
            index_state: IndexState::Unvisited,
        }
    }
}

/// A dependency, with its HIR loaded from metadata by the driver.
pub struct ExternCrateAst {
    pub short_name: IStr,
    pub hir: hir::CratePtr,
}

/// A parsed, macro-expanded, name-resolved crate.
pub struct Crate {
    pub name: IStr,
    pub version: TargetVersion,
    pub root_module: Module,
    pub ext_crates: Vec<ExternCrateAst>,
}

impl Crate {
    pub fn new(name: IStr) -> Crate {
        let root = Module::new(SimplePath::crate_root(name.clone()));
        Crate {
            name,
            version: TargetVersion::default(),
            root_module: root,
            ext_crates: Vec::new(),
        }
    }

    pub fn ext_crate(&self, name: &IStr) -> Option<&hir::Crate> {
        self.ext_crates.iter().find(|e| &e.short_name == name).map(|e| &*e.hir)
    }
}
