//! Variant tag values shared by the serialiser and deserialiser. These are
//! part of the on-disk format; append, never renumber.

// TypeData — in declaration order.
pub const TY_INFER: u8 = 0;
pub const TY_DIVERGE: u8 = 1;
pub const TY_PRIMITIVE: u8 = 2;
pub const TY_PATH: u8 = 3;
pub const TY_GENERIC: u8 = 4;
pub const TY_TRAIT_OBJECT: u8 = 5;
pub const TY_ERASED: u8 = 6;
pub const TY_ARRAY: u8 = 7;
pub const TY_SLICE: u8 = 8;
pub const TY_TUPLE: u8 = 9;
pub const TY_BORROW: u8 = 10;
pub const TY_POINTER: u8 = 11;
pub const TY_NAMED_FUNCTION: u8 = 12;
pub const TY_FUNCTION: u8 = 13;
pub const TY_CLOSURE: u8 = 14;
pub const TY_GENERATOR: u8 = 15;

// Path — `UfcsUnknown` is transient and must never be serialised.
pub const PATH_GENERIC: u8 = 0;
pub const PATH_UFCS_INHERENT: u8 = 1;
pub const PATH_UFCS_KNOWN: u8 = 2;

pub const TYPE_ITEM_IMPORT: u8 = 0;
pub const TYPE_ITEM_MODULE: u8 = 1;
pub const TYPE_ITEM_TYPE_ALIAS: u8 = 2;
pub const TYPE_ITEM_ENUM: u8 = 3;
pub const TYPE_ITEM_STRUCT: u8 = 4;
pub const TYPE_ITEM_TRAIT: u8 = 5;
pub const TYPE_ITEM_UNION: u8 = 6;
pub const TYPE_ITEM_EXTERN_TYPE: u8 = 7;
pub const TYPE_ITEM_TRAIT_ALIAS: u8 = 8;

pub const VALUE_ITEM_IMPORT: u8 = 0;
pub const VALUE_ITEM_CONSTANT: u8 = 1;
pub const VALUE_ITEM_STATIC: u8 = 2;
pub const VALUE_ITEM_STRUCT_CONSTANT: u8 = 3;
pub const VALUE_ITEM_FUNCTION: u8 = 4;
pub const VALUE_ITEM_STRUCT_CONSTRUCTOR: u8 = 5;

pub const CONSTGENERIC_INFER: u8 = 0;
pub const CONSTGENERIC_UNEVALUATED: u8 = 1;
pub const CONSTGENERIC_GENERIC: u8 = 2;
pub const CONSTGENERIC_EVALUATED: u8 = 3;

pub const ARRAYSIZE_UNEVALUATED: u8 = 0;
pub const ARRAYSIZE_KNOWN: u8 = 1;

pub const RELOC_ITEM: u8 = 0;
pub const RELOC_BYTES: u8 = 1;

pub const BOUND_LIFETIME: u8 = 0;
pub const BOUND_TYPE_LIFETIME: u8 = 1;
pub const BOUND_TRAIT: u8 = 2;
pub const BOUND_TYPE_EQUALITY: u8 = 3;

pub const TRAIT_VALUE_CONSTANT: u8 = 0;
pub const TRAIT_VALUE_STATIC: u8 = 1;
pub const TRAIT_VALUE_FUNCTION: u8 = 2;

pub const ERASED_FCN: u8 = 0;
pub const ERASED_ALIAS: u8 = 1;
pub const ERASED_KNOWN: u8 = 2;

// MIR
pub const LV_ROOT_RETURN: u8 = 0;
pub const LV_ROOT_ARGUMENT: u8 = 1;
pub const LV_ROOT_LOCAL: u8 = 2;
pub const LV_ROOT_STATIC: u8 = 3;

pub const LV_PROJ_FIELD: u8 = 0;
pub const LV_PROJ_DEREF: u8 = 1;
pub const LV_PROJ_INDEX: u8 = 2;
pub const LV_PROJ_DOWNCAST: u8 = 3;

pub const MIR_CONST_INT: u8 = 0;
pub const MIR_CONST_UINT: u8 = 1;
pub const MIR_CONST_FLOAT: u8 = 2;
pub const MIR_CONST_BOOL: u8 = 3;
pub const MIR_CONST_BYTES: u8 = 4;
pub const MIR_CONST_STATIC_STRING: u8 = 5;
pub const MIR_CONST_CONST: u8 = 6;
pub const MIR_CONST_GENERIC: u8 = 7;
pub const MIR_CONST_ITEM_ADDR: u8 = 8;

pub const MIR_PARAM_LVALUE: u8 = 0;
pub const MIR_PARAM_CONSTANT: u8 = 1;

pub const RV_USE: u8 = 0;
pub const RV_CONSTANT: u8 = 1;
pub const RV_SIZED_ARRAY: u8 = 2;
pub const RV_BORROW: u8 = 3;
pub const RV_CAST: u8 = 4;
pub const RV_BINOP: u8 = 5;
pub const RV_UNIOP: u8 = 6;
pub const RV_DST_META: u8 = 7;
pub const RV_DST_PTR: u8 = 8;
pub const RV_MAKE_DST: u8 = 9;
pub const RV_TUPLE: u8 = 10;
pub const RV_ARRAY: u8 = 11;
pub const RV_VARIANT: u8 = 12;
pub const RV_STRUCT: u8 = 13;

pub const STMT_ASSIGN: u8 = 0;
pub const STMT_DROP: u8 = 1;
pub const STMT_ASM: u8 = 2;
pub const STMT_SET_DROP_FLAG: u8 = 3;
pub const STMT_SCOPE_END: u8 = 4;

pub const TERM_INCOMPLETE: u8 = 0;
pub const TERM_RETURN: u8 = 1;
pub const TERM_DIVERGE: u8 = 2;
pub const TERM_GOTO: u8 = 3;
pub const TERM_PANIC: u8 = 4;
pub const TERM_IF: u8 = 5;
pub const TERM_SWITCH: u8 = 6;
pub const TERM_SWITCH_VALUE: u8 = 7;
pub const TERM_CALL: u8 = 8;

pub const SWITCH_VALUES_UNSIGNED: u8 = 0;
pub const SWITCH_VALUES_SIGNED: u8 = 1;
pub const SWITCH_VALUES_STRING: u8 = 2;

pub const CALL_TARGET_VALUE: u8 = 0;
pub const CALL_TARGET_PATH: u8 = 1;
pub const CALL_TARGET_INTRINSIC: u8 = 2;

pub const TOKEN_IDENT: u8 = 0;
pub const TOKEN_LIFETIME: u8 = 1;
pub const TOKEN_LITERAL: u8 = 2;
pub const TOKEN_PUNCT: u8 = 3;
pub const TOKEN_OPEN: u8 = 4;
pub const TOKEN_CLOSE: u8 = 5;
pub const TOKEN_META_VAR: u8 = 6;
pub const TOKEN_SUBST: u8 = 7;

// Unit-variant enums are numbered in declaration order through these paired
// helpers, so the two codec directions cannot drift apart.
macro_rules! tag_pairs {
    ($to:ident, $from:ident, $ty:ty, [ $($variant:path),* $(,)? ]) => {
        pub fn $to(v: &$ty) -> u8 {
            let mut i = 0u8;
            $(
                if matches!(v, $variant) {
                    return i;
                }
                i += 1;
            )*
            let _ = i;
            unreachable!()
        }
        pub fn $from(t: u8) -> Option<$ty> {
            let mut i = 0u8;
            $(
                if t == i {
                    return Some($variant);
                }
                i += 1;
            )*
            let _ = i;
            None
        }
    };
}

use hir::mir::{BinOp, DropKind, UniOp};
use hir::ty::{ClosureClass, InferClass, NamedFunctionKind};
use hir::{
    BorrowType, CoerceUnsized, ConstValueState, CoreType, EnumRepr, Receiver, Repr, StructDstType,
};

tag_pairs!(core_type_tag, core_type_from, CoreType, [
    CoreType::Bool, CoreType::Char, CoreType::Str,
    CoreType::U8, CoreType::U16, CoreType::U32, CoreType::U64, CoreType::U128, CoreType::Usize,
    CoreType::I8, CoreType::I16, CoreType::I32, CoreType::I64, CoreType::I128, CoreType::Isize,
    CoreType::F16, CoreType::F32, CoreType::F64, CoreType::F128,
]);
tag_pairs!(infer_class_tag, infer_class_from, InferClass, [
    InferClass::None, InferClass::Integer, InferClass::Float,
]);
tag_pairs!(borrow_type_tag, borrow_type_from, BorrowType, [
    BorrowType::Shared, BorrowType::Unique, BorrowType::Owned,
]);
tag_pairs!(repr_tag, repr_from, Repr, [Repr::Rust, Repr::C, Repr::Simd, Repr::Transparent]);
tag_pairs!(enum_repr_tag, enum_repr_from, EnumRepr, [
    EnumRepr::Auto, EnumRepr::Usize, EnumRepr::Isize,
    EnumRepr::U8, EnumRepr::U16, EnumRepr::U32, EnumRepr::U64,
    EnumRepr::I8, EnumRepr::I16, EnumRepr::I32, EnumRepr::I64,
]);
tag_pairs!(receiver_tag, receiver_from, Receiver, [
    Receiver::Free, Receiver::Value, Receiver::BorrowOwned, Receiver::BorrowUnique,
    Receiver::BorrowShared, Receiver::Box, Receiver::Custom,
]);
tag_pairs!(const_value_state_tag, const_value_state_from, ConstValueState, [
    ConstValueState::Unknown, ConstValueState::Generic, ConstValueState::Known,
]);
tag_pairs!(closure_class_tag, closure_class_from, ClosureClass, [
    ClosureClass::Unknown, ClosureClass::NoCapture, ClosureClass::Shared,
    ClosureClass::Mut, ClosureClass::Once,
]);
tag_pairs!(named_fn_kind_tag, named_fn_kind_from, NamedFunctionKind, [
    NamedFunctionKind::Unknown, NamedFunctionKind::Function,
    NamedFunctionKind::StructConstructor, NamedFunctionKind::EnumConstructor,
]);
tag_pairs!(dst_type_tag, dst_type_from, StructDstType, [
    StructDstType::None, StructDstType::Possible, StructDstType::Slice,
    StructDstType::TraitObject,
]);
tag_pairs!(coerce_unsized_tag, coerce_unsized_from, CoerceUnsized, [
    CoerceUnsized::None, CoerceUnsized::Passthrough, CoerceUnsized::Pointer,
]);
tag_pairs!(bin_op_tag, bin_op_from, BinOp, [
    BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Mod,
    BinOp::And, BinOp::Or, BinOp::Xor, BinOp::Shr, BinOp::Shl,
    BinOp::Eq, BinOp::Ne, BinOp::Gt, BinOp::Ge, BinOp::Lt, BinOp::Le,
]);
tag_pairs!(uni_op_tag, uni_op_from, UniOp, [UniOp::Inv, UniOp::Neg]);
tag_pairs!(drop_kind_tag, drop_kind_from, DropKind, [DropKind::Shallow, DropKind::Deep]);
tag_pairs!(delim_tag, delim_from, hir::tokens::Delim, [
    hir::tokens::Delim::Paren, hir::tokens::Delim::Brace, hir::tokens::Delim::Bracket,
]);
tag_pairs!(type_path_binding_tag, type_path_binding_from, hir::TypePathBinding, [
    hir::TypePathBinding::Unbound, hir::TypePathBinding::Opaque,
    hir::TypePathBinding::Struct, hir::TypePathBinding::Union,
    hir::TypePathBinding::Enum, hir::TypePathBinding::ExternType,
]);
