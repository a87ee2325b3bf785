//! Items: modules, type definitions, traits, functions, values, and the
//! markings caches attached to them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use intern::IStr;
use rustc_hash::FxHashMap;

use crate::generics::GenericParams;
use crate::literal::EncodedLiteral;
use crate::mir::MirFunction;
use crate::path::{SimplePath, TraitPath};
use crate::ty::{LifetimeRef, TypeRef, UnevalConst};

/// Item visibility in the HIR: global, or restricted to a module path.
/// (The richer AST-side lattice collapses to this once names are resolved.)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Publicity(Option<Arc<SimplePath>>);

impl Publicity {
    pub fn new_global() -> Publicity {
        Publicity(None)
    }

    pub fn new_restricted(path: SimplePath) -> Publicity {
        Publicity(Some(Arc::new(path)))
    }

    /// Visible to other crates.
    pub fn is_global(&self) -> bool {
        self.0.is_none()
    }

    pub fn restriction(&self) -> Option<&SimplePath> {
        self.0.as_deref()
    }

    pub fn is_visible_from(&self, module: &SimplePath) -> bool {
        match &self.0 {
            None => true,
            Some(restrict) => module.starts_with(restrict),
        }
    }
}

impl fmt::Debug for Publicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("pub"),
            Some(p) => write!(f, "pub(in {})", p),
        }
    }
}

/// An item together with its visibility.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VisEnt<T> {
    pub publicity: Publicity,
    pub item: T,
}

impl<T> VisEnt<T> {
    pub fn new(publicity: Publicity, item: T) -> VisEnt<T> {
        VisEnt { publicity, item }
    }
}

/// A name redirection. `is_variant` marks an enum-variant import, with `idx`
/// the variant index in the enum at `path.parent()`.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Import {
    pub path: SimplePath,
    pub is_variant: bool,
    pub idx: u32,
}

// ---------------------------------------------------------------------------
// Markings caches

/// Per-type facts the resolver reads without touching the impl tables.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TraitMarkings {
    pub has_a_deref: bool,
    pub is_copy: bool,
    pub has_drop_impl: bool,
    /// Per auto-trait: field types that must satisfy the trait, and whether a
    /// positive impl was found.
    pub auto_impls: FxHashMap<SimplePath, AutoImplMarking>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AutoImplMarking {
    pub conditions: Vec<TypeRef>,
    pub is_impled: bool,
}

/// What kind of dynamically-sized tail a struct can have.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StructDstType {
    None,
    Possible,
    Slice,
    TraitObject,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CoerceUnsized {
    None,
    /// Coercion passes through to a single field.
    Passthrough,
    /// The struct is pointer-shaped; coerce the pointee.
    Pointer,
}

/// Unsizing/coercion facts about a struct, extracted during lowering and
/// consulted by `Unsize` queries.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StructMarkings {
    pub can_unsize: bool,
    pub unsized_param: Option<usize>,
    pub unsized_field: Option<usize>,
    pub dst_type: StructDstType,
    pub coerce_unsized: CoerceUnsized,
    pub coerce_unsized_index: Option<usize>,
    pub coerce_param: Option<usize>,
    /// From `#[rustc_nonnull_optimization_guaranteed]` /
    /// `#[rustc_layout_scalar_valid_range_start(1)]`.
    pub is_nonzero: bool,
    /// From `#[rustc_layout_scalar_valid_range_end(N)]`.
    pub bounded_max: Option<u128>,
}

impl Default for StructMarkings {
    fn default() -> StructMarkings {
        StructMarkings {
            can_unsize: false,
            unsized_param: None,
            unsized_field: None,
            dst_type: StructDstType::None,
            coerce_unsized: CoerceUnsized::None,
            coerce_unsized_index: None,
            coerce_param: None,
            is_nonzero: false,
            bounded_max: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Type items

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Repr {
    Rust,
    C,
    Simd,
    Transparent,
}

impl Default for Repr {
    fn default() -> Repr {
        Repr::Rust
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StructData {
    Unit,
    Tuple(Vec<VisEnt<TypeRef>>),
    Named(Vec<(IStr, VisEnt<TypeRef>)>),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Struct {
    pub params: GenericParams,
    pub repr: Repr,
    pub data: StructData,
    pub forced_alignment: Option<u32>,
    pub max_field_alignment: Option<u32>,
    pub markings: TraitMarkings,
    pub struct_markings: StructMarkings,
}

impl Struct {
    pub fn new_unit(params: GenericParams) -> Struct {
        Struct {
            params,
            repr: Repr::Rust,
            data: StructData::Unit,
            forced_alignment: None,
            max_field_alignment: None,
            markings: TraitMarkings::default(),
            struct_markings: StructMarkings::default(),
        }
    }
}

/// Representation override of a value-only enum.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EnumRepr {
    Auto,
    Usize,
    Isize,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

/// A brace/tuple variant of a data enum. Its body was desugared into a
/// synthetic sibling struct (`EnumName#VariantName`); `ty` is the path type
/// referring to it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EnumDataVariant {
    pub name: IStr,
    pub is_struct: bool,
    pub ty: TypeRef,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EnumValueVariant {
    pub name: IStr,
    pub expr: Option<Arc<UnevalConst>>,
    pub val: u64,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EnumClass {
    Data(Vec<EnumDataVariant>),
    Value { repr: EnumRepr, variants: Vec<EnumValueVariant> },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Enum {
    pub params: GenericParams,
    pub class: EnumClass,
    pub markings: TraitMarkings,
}

impl Enum {
    pub fn num_variants(&self) -> usize {
        match &self.class {
            EnumClass::Data(v) => v.len(),
            EnumClass::Value { variants, .. } => variants.len(),
        }
    }

    pub fn find_variant(&self, name: &IStr) -> Option<usize> {
        match &self.class {
            EnumClass::Data(v) => v.iter().position(|x| &x.name == name),
            EnumClass::Value { variants, .. } => variants.iter().position(|x| &x.name == name),
        }
    }

    /// Is the variant at `idx` usable as a value (unit or tuple variant)?
    pub fn variant_is_value(&self, idx: usize) -> bool {
        match &self.class {
            EnumClass::Data(v) => !v[idx].is_struct,
            EnumClass::Value { .. } => true,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Union {
    pub params: GenericParams,
    pub repr: Repr,
    pub variants: Vec<(IStr, VisEnt<TypeRef>)>,
    pub markings: TraitMarkings,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExternType {
    pub markings: TraitMarkings,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TypeAlias {
    pub params: GenericParams,
    pub ty: TypeRef,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TraitAlias {
    pub params: GenericParams,
    pub traits: Vec<TraitPath>,
}

// ---------------------------------------------------------------------------
// Traits

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssociatedType {
    pub is_sized: bool,
    pub lifetime_bound: LifetimeRef,
    pub trait_bounds: Vec<TraitPath>,
    pub default: Option<TypeRef>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TraitValueItem {
    Constant(Constant),
    Static(Static),
    Function(Function),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Trait {
    pub params: GenericParams,
    pub lifetime: LifetimeRef,
    /// Supertraits as written.
    pub parent_traits: Vec<TraitPath>,
    /// Auto trait: impls are proven by destructuring fields.
    pub is_marker: bool,
    pub types: BTreeMap<IStr, AssociatedType>,
    pub values: BTreeMap<IStr, TraitValueItem>,

    // Populated by the post-load pass; not serialised.
    /// Flattened supertrait closure (monomorphised into this trait's params).
    pub all_parent_traits: Vec<TraitPath>,
    /// Vtable value slots: method name → (slot, declaring trait).
    pub value_indexes: BTreeMap<IStr, Vec<(usize, crate::path::GenericPath)>>,
    /// Vtable type slots: associated type name → slot.
    pub type_indexes: BTreeMap<IStr, usize>,
    /// Path of the generated vtable struct.
    pub vtable_path: SimplePath,
}

impl Trait {
    pub fn new(params: GenericParams) -> Trait {
        Trait {
            params,
            lifetime: LifetimeRef::new_unknown(),
            parent_traits: Vec::new(),
            is_marker: false,
            types: BTreeMap::new(),
            values: BTreeMap::new(),
            all_parent_traits: Vec::new(),
            value_indexes: BTreeMap::new(),
            type_indexes: BTreeMap::new(),
            vtable_path: SimplePath::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Value items

/// How a method takes `self`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Receiver {
    /// Not a method.
    Free,
    Value,
    BorrowOwned,
    BorrowUnique,
    BorrowShared,
    Box,
    /// Any other type whose structure eventually reaches `Self`.
    Custom,
}

/// Resolved symbol name. Empty means "mangle downstream".
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Linkage {
    pub name: IStr,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Function {
    pub linkage: Linkage,
    pub receiver: Receiver,
    pub abi: IStr,
    pub is_unsafe: bool,
    pub is_const: bool,
    pub is_variadic: bool,
    pub params: GenericParams,
    pub args: Vec<(IStr, TypeRef)>,
    pub ret: TypeRef,
    /// Filled by MIR lowering; absent on signatures loaded for inspection
    /// and reset to argument-name-only form on serialisation.
    pub body: Option<MirFunction>,
}

impl Function {
    pub fn new_sig(abi: IStr, args: Vec<(IStr, TypeRef)>, ret: TypeRef) -> Function {
        Function {
            linkage: Linkage::default(),
            receiver: Receiver::Free,
            abi,
            is_unsafe: false,
            is_const: false,
            is_variadic: false,
            params: GenericParams::new(),
            args,
            ret,
            body: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Static {
    pub linkage: Linkage,
    pub is_mut: bool,
    pub ty: TypeRef,
    /// Evaluated initialiser, when known. The initialiser expression itself
    /// stays in the front-end and is not serialised.
    pub value_res: Option<EncodedLiteral>,
}

/// Evaluation state of a constant's value.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ConstValueState {
    Unknown,
    /// Depends on generics; evaluated per-instantiation.
    Generic,
    Known,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Constant {
    pub params: GenericParams,
    pub ty: TypeRef,
    pub value: Option<Arc<UnevalConst>>,
    pub value_res: Option<EncodedLiteral>,
    pub value_state: ConstValueState,
}

/// The value-namespace projection of a unit/tuple struct.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StructConstant {
    pub ty: SimplePath,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StructConstructor {
    pub ty: SimplePath,
}

// ---------------------------------------------------------------------------
// Namespaces and modules

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TypeItem {
    Import(Import),
    Module(Module),
    TypeAlias(TypeAlias),
    Enum(Enum),
    Struct(Struct),
    Trait(Trait),
    Union(Union),
    ExternType(ExternType),
    TraitAlias(TraitAlias),
}

impl TypeItem {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeItem::Import(_) => "import",
            TypeItem::Module(_) => "module",
            TypeItem::TypeAlias(_) => "type alias",
            TypeItem::Enum(_) => "enum",
            TypeItem::Struct(_) => "struct",
            TypeItem::Trait(_) => "trait",
            TypeItem::Union(_) => "union",
            TypeItem::ExternType(_) => "extern type",
            TypeItem::TraitAlias(_) => "trait alias",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ValueItem {
    Import(Import),
    Constant(Constant),
    Static(Static),
    StructConstant(StructConstant),
    Function(Function),
    StructConstructor(StructConstructor),
}

impl ValueItem {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ValueItem::Import(_) => "import",
            ValueItem::Constant(_) => "constant",
            ValueItem::Static(_) => "static",
            ValueItem::StructConstant(_) => "struct constant",
            ValueItem::Function(_) => "function",
            ValueItem::StructConstructor(_) => "struct constructor",
        }
    }
}

/// One module's item tables. Iteration follows insertion order, which is the
/// source order — diagnostics and serialisation depend on that stability.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Module {
    pub value_items: IndexMap<IStr, Box<VisEnt<ValueItem>>>,
    pub mod_items: IndexMap<IStr, Box<VisEnt<TypeItem>>>,
    /// Traits in scope in this module. Rebuilt after load; not serialised.
    pub traits: Vec<SimplePath>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    pub fn get_mod_item(&self, name: &IStr) -> Option<&VisEnt<TypeItem>> {
        self.mod_items.get(name).map(|b| &**b)
    }

    pub fn get_value_item(&self, name: &IStr) -> Option<&VisEnt<ValueItem>> {
        self.value_items.get(name).map(|b| &**b)
    }
}
