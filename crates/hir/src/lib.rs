//! The typed program representation after desugaring: items, types, paths,
//! generics, MIR bodies and the crate root, together with the structural
//! visitor the resolver and the metadata codec share.
//!
//! Ownership is strictly tree-shaped from [`Crate`] down. Cross-references
//! (trait paths, type-path bindings, named-function targets) are stored as
//! paths or plain tags and resolved on demand, so the whole structure can be
//! serialised and reloaded without fix-up pointers.

#[macro_use]
mod macros;

pub mod crate_def;
pub mod generics;
pub mod item;
pub mod literal;
pub mod mir;
pub mod path;
pub mod tokens;
pub mod ty;
pub mod visitor;

mod dump;

pub use crate::crate_def::{
    Crate, CratePtr, ExternCrate, ExternLibrary, ImplEnt, ImplGroup, MarkerImpl, ProcMacro,
    TraitImpl, TypeImpl, VisImplEnt,
};
pub use crate::generics::{
    GenericBound, GenericParams, LifetimeDef, TypeParamDef, ValueParamDef,
};
pub use crate::item::{
    AssociatedType, AutoImplMarking, CoerceUnsized, ConstValueState, Constant, Enum, EnumClass,
    EnumDataVariant, EnumRepr, EnumValueVariant, ExternType, Function, Import, Linkage, Module,
    Publicity, Receiver, Repr, Static, Struct, StructConstant, StructConstructor, StructData,
    StructDstType, StructMarkings, Trait, TraitAlias, TraitMarkings, TraitValueItem, TypeAlias,
    TypeItem, ValueItem, VisEnt,
};
pub use crate::literal::{EncodedLiteral, Reloc, RelocValue};
pub use crate::path::{
    AtyBound, AtyEqual, GenericPath, Path, PathParams, PathUfcsInherent, PathUfcsKnown,
    PathUfcsUnknown, SimplePath, TraitPath,
};
pub use crate::tokens::{MacroRule, MacroRules, Token, TokenStream};
pub use crate::ty::{
    ArraySize, BorrowType, ClosureClass, ClosureTy, Compare, ConstGeneric, CoreType, ErasedTy,
    ErasedTypeInner, FnPtr, GeneratorTy, GenericRef, InferClass, LifetimeRef, NamedFunctionKind,
    TraitObjectTy, TypeData, TypePathBinding, TypeRef, UnevalConst, GENERIC_GROUP_HRB,
    GENERIC_GROUP_IMPL, GENERIC_GROUP_METHOD, GENERIC_GROUP_PLACEHOLDER, GENERIC_SELF,
};
pub use crate::dump::dump_crate;

/// Names of the lang items the middle-end itself consults.
pub mod lang {
    pub const SIZED: &str = "sized";
    pub const POINTEE_SIZED: &str = "pointee_sized";
    pub const METADATA_SIZED: &str = "metadata_sized";
    pub const COPY: &str = "copy";
    pub const CLONE: &str = "clone";
    pub const DROP: &str = "drop";
    pub const UNSIZE: &str = "unsize";
    pub const COERCE_UNSIZED: &str = "coerce_unsized";
    pub const DEREF: &str = "deref";
    pub const PHANTOM_DATA: &str = "phantom_data";
    pub const UNSAFE_CELL: &str = "unsafe_cell";
    pub const OWNED_BOX: &str = "owned_box";
    pub const FN: &str = "fn";
    pub const FN_MUT: &str = "fn_mut";
    pub const FN_ONCE: &str = "fn_once";
    pub const TUPLE_TRAIT: &str = "tuple_trait";
    pub const GENERATOR: &str = "generator";
    pub const DISCRIMINANT_KIND: &str = "discriminant_kind";
    pub const POINTEE: &str = "pointee_trait";
    pub const FUTURE: &str = "future_trait";
}
