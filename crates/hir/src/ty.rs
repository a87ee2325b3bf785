//! The HIR type model: [`TypeRef`] and its [`TypeData`] sum, generic
//! parameter references, lifetimes, const generics and array sizes.
//!
//! `TypeRef` is a cheaply-clonable immutable handle. Mutation (the resolver
//! rewrites projections in place) goes through [`TypeRef::data_mut`], which
//! performs clone-on-write when the node is shared.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use intern::IStr;

use crate::generics::GenericParams;
use crate::literal::EncodedLiteral;
use crate::path::{GenericPath, Path, PathParams, SimplePath, TraitPath};

/// Three-valued result of the resolver's matching queries.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Compare {
    Equal,
    Fuzzy,
    Unequal,
}

impl Compare {
    /// Combine two sub-results: any `Unequal` rejects, any `Fuzzy` taints.
    pub fn and(self, other: Compare) -> Compare {
        match (self, other) {
            (Compare::Unequal, _) | (_, Compare::Unequal) => Compare::Unequal,
            (Compare::Fuzzy, _) | (_, Compare::Fuzzy) => Compare::Fuzzy,
            _ => Compare::Equal,
        }
    }

    pub fn is_unequal(self) -> bool {
        self == Compare::Unequal
    }
}

/// Primitive types of the source language.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum CoreType {
    Bool,
    Char,
    Str,
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
    F16,
    F32,
    F64,
    F128,
}

impl CoreType {
    pub fn name(self) -> &'static str {
        match self {
            CoreType::Bool => "bool",
            CoreType::Char => "char",
            CoreType::Str => "str",
            CoreType::U8 => "u8",
            CoreType::U16 => "u16",
            CoreType::U32 => "u32",
            CoreType::U64 => "u64",
            CoreType::U128 => "u128",
            CoreType::Usize => "usize",
            CoreType::I8 => "i8",
            CoreType::I16 => "i16",
            CoreType::I32 => "i32",
            CoreType::I64 => "i64",
            CoreType::I128 => "i128",
            CoreType::Isize => "isize",
            CoreType::F16 => "f16",
            CoreType::F32 => "f32",
            CoreType::F64 => "f64",
            CoreType::F128 => "f128",
        }
    }

    pub fn from_name(name: &str) -> Option<CoreType> {
        Some(match name {
            "bool" => CoreType::Bool,
            "char" => CoreType::Char,
            "str" => CoreType::Str,
            "u8" => CoreType::U8,
            "u16" => CoreType::U16,
            "u32" => CoreType::U32,
            "u64" => CoreType::U64,
            "u128" => CoreType::U128,
            "usize" => CoreType::Usize,
            "i8" => CoreType::I8,
            "i16" => CoreType::I16,
            "i32" => CoreType::I32,
            "i64" => CoreType::I64,
            "i128" => CoreType::I128,
            "isize" => CoreType::Isize,
            "f16" => CoreType::F16,
            "f32" => CoreType::F32,
            "f64" => CoreType::F64,
            "f128" => CoreType::F128,
            _ => return None,
        })
    }

    pub fn is_float(self) -> bool {
        matches!(self, CoreType::F16 | CoreType::F32 | CoreType::F64 | CoreType::F128)
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            CoreType::U8
                | CoreType::U16
                | CoreType::U32
                | CoreType::U64
                | CoreType::U128
                | CoreType::Usize
        )
    }

    pub fn is_signed_int(self) -> bool {
        matches!(
            self,
            CoreType::I8
                | CoreType::I16
                | CoreType::I32
                | CoreType::I64
                | CoreType::I128
                | CoreType::Isize
        )
    }

    pub fn is_int(self) -> bool {
        self.is_unsigned_int() || self.is_signed_int()
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Class restriction on an inference variable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum InferClass {
    None,
    Integer,
    Float,
}

/// Groups of the 16-bit generic binding word (`group:8 | idx:8`).
pub const GENERIC_GROUP_IMPL: u16 = 0;
pub const GENERIC_GROUP_METHOD: u16 = 1;
/// Inference-time placeholders allocated during impl matching.
pub const GENERIC_GROUP_PLACEHOLDER: u16 = 2;
/// Higher-ranked binders (`for<'a>`).
pub const GENERIC_GROUP_HRB: u16 = 3;
/// The whole-word value reserved for `Self`.
pub const GENERIC_SELF: u16 = 0xFFFF;

/// Reference to a generic parameter: a name for diagnostics plus the binding
/// word that actually identifies it.
#[derive(Clone, Eq)]
pub struct GenericRef {
    pub name: IStr,
    pub binding: u16,
}

impl GenericRef {
    pub fn new(name: IStr, binding: u16) -> GenericRef {
        GenericRef { name, binding }
    }

    pub fn new_self() -> GenericRef {
        GenericRef { name: IStr::new("Self"), binding: GENERIC_SELF }
    }

    pub fn group(&self) -> u16 {
        self.binding >> 8
    }

    pub fn idx(&self) -> usize {
        (self.binding & 0xFF) as usize
    }

    pub fn is_self(&self) -> bool {
        self.binding == GENERIC_SELF
    }

    pub fn is_placeholder(&self) -> bool {
        !self.is_self() && self.group() == GENERIC_GROUP_PLACEHOLDER
    }
}

// The binding alone identifies the parameter; the name is a debugging aid.
impl PartialEq for GenericRef {
    fn eq(&self, other: &GenericRef) -> bool {
        self.binding == other.binding
    }
}
impl PartialOrd for GenericRef {
    fn partial_cmp(&self, other: &GenericRef) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for GenericRef {
    fn cmp(&self, other: &GenericRef) -> Ordering {
        self.binding.cmp(&other.binding)
    }
}
impl Hash for GenericRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.binding.hash(state)
    }
}

impl fmt::Display for GenericRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_self() {
            f.write_str("Self")
        } else if !self.name.is_empty() {
            write!(f, "{}/*{:#x}*/", self.name, self.binding)
        } else {
            write!(f, "{:#x}", self.binding)
        }
    }
}
impl_debug_via_display!(GenericRef);

/// A lifetime annotation. Values below `0x400` are a generic binding word
/// (same group layout as [`GenericRef`]); the high values are the
/// non-parameter lifetimes.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LifetimeRef {
    pub binding: u32,
}

impl LifetimeRef {
    pub const UNKNOWN: u32 = 0xFFFF;
    pub const STATIC: u32 = 0xFFFC;
    pub const INFER: u32 = 0xFFFE;
    const MAX_PARAM: u32 = 0x400;

    pub fn new_unknown() -> LifetimeRef {
        LifetimeRef { binding: Self::UNKNOWN }
    }

    pub fn new_static() -> LifetimeRef {
        LifetimeRef { binding: Self::STATIC }
    }

    pub fn new_param(binding: u16) -> LifetimeRef {
        LifetimeRef { binding: binding as u32 }
    }

    pub fn is_param(&self) -> bool {
        self.binding < Self::MAX_PARAM
    }

    /// The binding word, when this is a parameter reference.
    pub fn as_generic(&self) -> Option<GenericRef> {
        if self.is_param() {
            Some(GenericRef { name: IStr::default(), binding: self.binding as u16 })
        } else {
            None
        }
    }
}

impl Default for LifetimeRef {
    fn default() -> LifetimeRef {
        LifetimeRef::new_unknown()
    }
}

impl fmt::Display for LifetimeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binding {
            Self::UNKNOWN => f.write_str("'_"),
            Self::STATIC => f.write_str("'static"),
            Self::INFER => f.write_str("'_infer"),
            b => write!(f, "'#{:#x}", b),
        }
    }
}
impl_debug_via_display!(LifetimeRef);

/// A not-yet-evaluated constant expression, kept as its printed form plus the
/// generic arguments it was written under. Expression bodies are owned by the
/// front-end; the middle-end only needs a stable identity and a substitution
/// point for the external constant evaluator.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct UnevalConst {
    pub expr: IStr,
    pub impl_params: PathParams,
    pub method_params: PathParams,
}

impl UnevalConst {
    pub fn new(expr: IStr) -> UnevalConst {
        UnevalConst { expr, impl_params: PathParams::new(), method_params: PathParams::new() }
    }
}

/// A const generic argument.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstGeneric {
    Infer,
    Unevaluated(Arc<UnevalConst>),
    Generic(GenericRef),
    Evaluated(Arc<EncodedLiteral>),
}

impl ConstGeneric {
    pub fn as_evaluated(&self) -> Option<&EncodedLiteral> {
        match self {
            ConstGeneric::Evaluated(lit) => Some(lit),
            _ => None,
        }
    }
}

impl fmt::Display for ConstGeneric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstGeneric::Infer => f.write_str("_"),
            ConstGeneric::Unevaluated(e) => write!(f, "?{}", e.expr),
            ConstGeneric::Generic(g) => write!(f, "{}", g),
            ConstGeneric::Evaluated(lit) => write!(f, "={}", lit),
        }
    }
}
impl_debug_via_display!(ConstGeneric);

/// An array length.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArraySize {
    Unevaluated(ConstGeneric),
    Known(u64),
}

impl ArraySize {
    pub fn as_known(&self) -> Option<u64> {
        match self {
            ArraySize::Known(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<u64> for ArraySize {
    fn from(v: u64) -> ArraySize {
        ArraySize::Known(v)
    }
}

impl fmt::Display for ArraySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArraySize::Unevaluated(c) => write!(f, "{}", c),
            ArraySize::Known(v) => write!(f, "{}", v),
        }
    }
}
impl_debug_via_display!(ArraySize);

/// Result of looking the path of a `TypeData::Path` up in the crate tree.
/// A plain tag: the definition itself is fetched through the crate when
/// needed, so the binding survives serialisation and crate reloads.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum TypePathBinding {
    /// Not yet resolved against the item tree.
    Unbound,
    /// An associated-type projection that could not be resolved. Only valid
    /// when the path is `UfcsKnown`.
    Opaque,
    Struct,
    Union,
    Enum,
    ExternType,
}

impl TypePathBinding {
    pub fn is_unbound(&self) -> bool {
        matches!(self, TypePathBinding::Unbound)
    }
}

/// `dyn Trait + Markers + 'lt`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitObjectTy {
    pub trait_: TraitPath,
    pub markers: Vec<GenericPath>,
    pub lifetime: LifetimeRef,
}

/// Origin of an `impl Trait` type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErasedTypeInner {
    /// Return-position `impl Trait`: slot `index` of the function at `path`.
    Fcn { path: Path, index: usize },
    /// `impl Trait` in a type alias or associated type.
    Alias { path: SimplePath, params: PathParams },
    /// Resolved to a concrete type.
    Known(TypeRef),
}

/// `impl Trait`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErasedTy {
    pub is_sized: bool,
    pub traits: Vec<TraitPath>,
    pub lifetimes: Vec<LifetimeRef>,
    pub inner: ErasedTypeInner,
}

/// A function pointer type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnPtr {
    /// Higher-ranked lifetimes (`for<'a> fn(&'a u8)`).
    pub hrls: GenericParams,
    pub is_unsafe: bool,
    pub is_variadic: bool,
    pub abi: IStr,
    pub ret: TypeRef,
    pub args: Vec<TypeRef>,
}

/// Cached classification of a named-function type's target, patched by the
/// post-load pass.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum NamedFunctionKind {
    Unknown,
    Function,
    StructConstructor,
    EnumConstructor,
}

/// How a closure captures, restricting which `Fn*` traits it implements.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum ClosureClass {
    Unknown,
    NoCapture,
    Shared,
    Mut,
    Once,
}

/// The unique anonymous type of one closure expression. The expression body
/// lives in the front-end; the type carries the signature the resolver needs
/// for the `Fn*` family.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClosureTy {
    pub node: u32,
    pub class: ClosureClass,
    pub ret: TypeRef,
    pub args: Vec<TypeRef>,
    pub is_copy: bool,
}

/// The unique anonymous type of one generator expression.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeneratorTy {
    pub node: u32,
    pub yield_ty: TypeRef,
    pub ret_ty: TypeRef,
    pub resume_ty: TypeRef,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum BorrowType {
    Shared,
    Unique,
    /// Present in early lowering only; absent from final HIR.
    Owned,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeData {
    /// An inference variable. Not valid resolver input outside the
    /// documented hook points.
    Infer { class: InferClass },
    /// The never type.
    Diverge,
    Primitive(CoreType),
    /// A nominal type (or an unresolved projection when `binding` is
    /// `Opaque`).
    Path { path: Path, binding: TypePathBinding },
    Generic(GenericRef),
    TraitObject(Box<TraitObjectTy>),
    ErasedType(Box<ErasedTy>),
    Array { inner: TypeRef, size: ArraySize },
    Slice { inner: TypeRef },
    Tuple(Vec<TypeRef>),
    Borrow { btype: BorrowType, inner: TypeRef, lifetime: LifetimeRef },
    Pointer { btype: BorrowType, inner: TypeRef },
    /// The zero-sized unique type of one named function.
    NamedFunction { path: Path, kind: NamedFunctionKind },
    Function(Box<FnPtr>),
    Closure(Box<ClosureTy>),
    Generator(Box<GeneratorTy>),
}

/// Shareable immutable handle on a [`TypeData`].
#[derive(Clone, Eq)]
pub struct TypeRef(Arc<TypeData>);

impl TypeRef {
    pub fn new(data: TypeData) -> TypeRef {
        TypeRef(Arc::new(data))
    }

    pub fn data(&self) -> &TypeData {
        &self.0
    }

    /// Clone-on-write access for in-place rewrites.
    pub fn data_mut(&mut self) -> &mut TypeData {
        Arc::make_mut(&mut self.0)
    }

    pub fn new_unit() -> TypeRef {
        TypeRef::new(TypeData::Tuple(Vec::new()))
    }

    pub fn new_diverge() -> TypeRef {
        TypeRef::new(TypeData::Diverge)
    }

    pub fn new_infer(class: InferClass) -> TypeRef {
        TypeRef::new(TypeData::Infer { class })
    }

    pub fn new_primitive(core: CoreType) -> TypeRef {
        TypeRef::new(TypeData::Primitive(core))
    }

    pub fn new_path(path: Path, binding: TypePathBinding) -> TypeRef {
        TypeRef::new(TypeData::Path { path, binding })
    }

    pub fn new_generic(name: IStr, binding: u16) -> TypeRef {
        TypeRef::new(TypeData::Generic(GenericRef::new(name, binding)))
    }

    pub fn new_self() -> TypeRef {
        TypeRef::new(TypeData::Generic(GenericRef::new_self()))
    }

    pub fn new_borrow(btype: BorrowType, inner: TypeRef) -> TypeRef {
        TypeRef::new(TypeData::Borrow { btype, inner, lifetime: LifetimeRef::new_unknown() })
    }

    pub fn new_pointer(btype: BorrowType, inner: TypeRef) -> TypeRef {
        TypeRef::new(TypeData::Pointer { btype, inner })
    }

    pub fn new_slice(inner: TypeRef) -> TypeRef {
        TypeRef::new(TypeData::Slice { inner })
    }

    pub fn new_array(inner: TypeRef, size: ArraySize) -> TypeRef {
        TypeRef::new(TypeData::Array { inner, size })
    }

    pub fn new_tuple(types: Vec<TypeRef>) -> TypeRef {
        TypeRef::new(TypeData::Tuple(types))
    }

    pub fn new_fn(f: FnPtr) -> TypeRef {
        TypeRef::new(TypeData::Function(Box::new(f)))
    }

    pub fn is_diverge(&self) -> bool {
        matches!(self.data(), TypeData::Diverge)
    }

    pub fn as_generic(&self) -> Option<&GenericRef> {
        match self.data() {
            TypeData::Generic(g) => Some(g),
            _ => None,
        }
    }

    /// The path of a nominal type.
    pub fn as_path(&self) -> Option<&Path> {
        match self.data() {
            TypeData::Path { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Strip any number of borrows.
    pub fn unwrap_borrows(&self) -> &TypeRef {
        let mut t = self;
        while let TypeData::Borrow { inner, .. } = t.data() {
            t = inner;
        }
        t
    }
}

impl From<TypeData> for TypeRef {
    fn from(data: TypeData) -> TypeRef {
        TypeRef::new(data)
    }
}

impl From<CoreType> for TypeRef {
    fn from(core: CoreType) -> TypeRef {
        TypeRef::new_primitive(core)
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &TypeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl PartialOrd for TypeRef {
    fn partial_cmp(&self, other: &TypeRef) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TypeRef {
    fn cmp(&self, other: &TypeRef) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            Ordering::Equal
        } else {
            self.0.cmp(&other.0)
        }
    }
}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data() {
            TypeData::Infer { class } => match class {
                InferClass::None => f.write_str("_"),
                InferClass::Integer => f.write_str("_/*int*/"),
                InferClass::Float => f.write_str("_/*float*/"),
            },
            TypeData::Diverge => f.write_str("!"),
            TypeData::Primitive(core) => write!(f, "{}", core),
            TypeData::Path { path, binding } => {
                write!(f, "{}", path)?;
                if let TypePathBinding::Opaque = binding {
                    f.write_str("/*O*/")?;
                }
                Ok(())
            }
            TypeData::Generic(g) => write!(f, "{}", g),
            TypeData::TraitObject(to) => {
                write!(f, "dyn ({}", to.trait_)?;
                for m in &to.markers {
                    write!(f, "+{}", m)?;
                }
                if to.lifetime.binding != LifetimeRef::UNKNOWN {
                    write!(f, "+{}", to.lifetime)?;
                }
                f.write_str(")")
            }
            TypeData::ErasedType(e) => {
                f.write_str("impl ")?;
                let mut sep = "";
                for t in &e.traits {
                    write!(f, "{}{}", sep, t)?;
                    sep = "+";
                }
                if !e.is_sized {
                    write!(f, "{}?Sized", sep)?;
                }
                Ok(())
            }
            TypeData::Array { inner, size } => write!(f, "[{}; {}]", inner, size),
            TypeData::Slice { inner } => write!(f, "[{}]", inner),
            TypeData::Tuple(types) => {
                f.write_str("(")?;
                for t in types {
                    write!(f, "{},", t)?;
                }
                f.write_str(")")
            }
            TypeData::Borrow { btype, inner, lifetime } => {
                f.write_str("&")?;
                if lifetime.binding != LifetimeRef::UNKNOWN {
                    write!(f, "{} ", lifetime)?;
                }
                match btype {
                    BorrowType::Shared => {}
                    BorrowType::Unique => f.write_str("mut ")?,
                    BorrowType::Owned => f.write_str("move ")?,
                }
                write!(f, "{}", inner)
            }
            TypeData::Pointer { btype, inner } => {
                let prefix = match btype {
                    BorrowType::Shared => "*const ",
                    BorrowType::Unique => "*mut ",
                    BorrowType::Owned => "*move ",
                };
                write!(f, "{}{}", prefix, inner)
            }
            TypeData::NamedFunction { path, .. } => write!(f, "fn{{{}}}", path),
            TypeData::Function(ft) => {
                if ft.is_unsafe {
                    f.write_str("unsafe ")?;
                }
                if &*ft.abi != "Rust" {
                    write!(f, "extern {:?} ", ft.abi.as_str())?;
                }
                f.write_str("fn(")?;
                for a in &ft.args {
                    write!(f, "{},", a)?;
                }
                if ft.is_variadic {
                    f.write_str("...")?;
                }
                write!(f, ") -> {}", ft.ret)
            }
            TypeData::Closure(c) => write!(f, "closure#{}", c.node),
            TypeData::Generator(g) => write!(f, "generator#{}", g.node),
        }
    }
}
impl_debug_via_display!(TypeRef);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural() {
        let a = TypeRef::new_tuple(vec![CoreType::U32.into(), CoreType::Bool.into()]);
        let b = TypeRef::new_tuple(vec![CoreType::U32.into(), CoreType::Bool.into()]);
        assert_eq!(a, b);
        let c = TypeRef::new_tuple(vec![CoreType::U32.into()]);
        assert_ne!(a, c);
    }

    #[test]
    fn cow_mutation_unshares() {
        let a = TypeRef::new_slice(CoreType::U8.into());
        let mut b = a.clone();
        if let TypeData::Slice { inner } = b.data_mut() {
            *inner = CoreType::U16.into();
        }
        assert_eq!(a, TypeRef::new_slice(CoreType::U8.into()));
        assert_eq!(b, TypeRef::new_slice(CoreType::U16.into()));
    }

    #[test]
    fn generic_ref_compares_by_binding() {
        let a = GenericRef::new(IStr::new("T"), 0x0000);
        let b = GenericRef::new(IStr::new("U"), 0x0000);
        assert_eq!(a, b);
        assert!(!a.is_self());
        assert!(GenericRef::new_self().is_self());
    }
}
