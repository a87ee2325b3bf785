//! Tree walk reconstructing a `hir::Crate` from the low-level protocol.
//! Mirrors `encode` field-for-field; any unexpected tag aborts the load.

use std::io::Read;
use std::sync::Arc;

use hir::mir;
use hir::ty::{ErasedTypeInner, TypeData};
use hir::{
    ArraySize, AssociatedType, AtyBound, AtyEqual, ClosureTy, ConstGeneric, Constant, Crate,
    EncodedLiteral, Enum, EnumClass, EnumDataVariant, EnumValueVariant, ErasedTy, ExternCrate,
    ExternLibrary, ExternType, FnPtr, Function, GeneratorTy, GenericBound, GenericParams,
    GenericPath, GenericRef, Import, LifetimeDef, LifetimeRef, Linkage, MacroRule, MacroRules,
    MarkerImpl, Module, Path, PathParams, PathUfcsInherent, PathUfcsKnown, ProcMacro, Publicity,
    Reloc, RelocValue, SimplePath, Static, Struct, StructConstant, StructConstructor, StructData,
    StructMarkings, Token, TokenStream, Trait, TraitAlias, TraitImpl, TraitMarkings,
    TraitObjectTy, TraitPath, TraitValueItem, TypeAlias, TypeImpl, TypeItem, TypeParamDef,
    TypeRef, UnevalConst, ValueItem, ValueParamDef, VisEnt,
};
use intern::IStr;

use crate::lowlevel::{Error, Reader, Result};
use crate::tags;

type R<'r, S> = &'r mut Reader<S>;

fn bad(what: &'static str, found: u8) -> Error {
    Error::BadTag { what, found: found as u64 }
}

fn read_opt<S: Read, T>(
    r: R<'_, S>,
    f: impl FnOnce(R<'_, S>) -> Result<T>,
) -> Result<Option<T>> {
    if r.read_bool()? {
        Ok(Some(f(r)?))
    } else {
        Ok(None)
    }
}

fn read_vec<S: Read, T>(
    r: R<'_, S>,
    mut f: impl FnMut(R<'_, S>) -> Result<T>,
) -> Result<Vec<T>> {
    let n = r.read_count()?;
    let mut rv = Vec::with_capacity(n.min(4096));
    for _ in 0..n {
        rv.push(f(r)?);
    }
    Ok(rv)
}

// ---------------------------------------------------------------------------
// Identifiers, types, paths

pub fn read_simplepath<S: Read>(r: R<'_, S>) -> Result<SimplePath> {
    let crate_name = r.read_istring()?;
    let components = read_vec(r, |r| r.read_istring())?;
    Ok(SimplePath::new(crate_name, components))
}

fn read_lifetime<S: Read>(r: R<'_, S>) -> Result<LifetimeRef> {
    Ok(LifetimeRef { binding: r.read_u32()? })
}

fn read_genericref<S: Read>(r: R<'_, S>) -> Result<GenericRef> {
    let name = r.read_istring()?;
    let binding = r.read_u16()?;
    Ok(GenericRef::new(name, binding))
}

fn read_uneval<S: Read>(r: R<'_, S>) -> Result<UnevalConst> {
    Ok(UnevalConst {
        expr: r.read_istring()?,
        impl_params: read_pathparams(r)?,
        method_params: read_pathparams(r)?,
    })
}

fn read_constgeneric<S: Read>(r: R<'_, S>) -> Result<ConstGeneric> {
    match r.read_tag()? {
        tags::CONSTGENERIC_INFER => Ok(ConstGeneric::Infer),
        tags::CONSTGENERIC_UNEVALUATED => {
            Ok(ConstGeneric::Unevaluated(Arc::new(read_uneval(r)?)))
        }
        tags::CONSTGENERIC_GENERIC => Ok(ConstGeneric::Generic(read_genericref(r)?)),
        tags::CONSTGENERIC_EVALUATED => Ok(ConstGeneric::Evaluated(Arc::new(read_literal(r)?))),
        t => Err(bad("const generic", t)),
    }
}

fn read_arraysize<S: Read>(r: R<'_, S>) -> Result<ArraySize> {
    match r.read_tag()? {
        tags::ARRAYSIZE_UNEVALUATED => Ok(ArraySize::Unevaluated(read_constgeneric(r)?)),
        tags::ARRAYSIZE_KNOWN => Ok(ArraySize::Known(r.read_u64c()?)),
        t => Err(bad("array size", t)),
    }
}

pub fn read_pathparams<S: Read>(r: R<'_, S>) -> Result<PathParams> {
    Ok(PathParams {
        lifetimes: read_vec(r, read_lifetime)?,
        types: read_vec(r, read_type)?,
        values: read_vec(r, read_constgeneric)?,
    })
}

pub fn read_genericpath<S: Read>(r: R<'_, S>) -> Result<GenericPath> {
    Ok(GenericPath { path: read_simplepath(r)?, params: read_pathparams(r)? })
}

fn read_aty_equal<S: Read>(r: R<'_, S>) -> Result<AtyEqual> {
    Ok(AtyEqual { source_trait: read_genericpath(r)?, ty: read_type(r)? })
}

fn read_aty_bound<S: Read>(r: R<'_, S>) -> Result<AtyBound> {
    Ok(AtyBound {
        source_trait: read_genericpath(r)?,
        traits: read_vec(r, read_traitpath)?,
    })
}

pub fn read_traitpath<S: Read>(r: R<'_, S>) -> Result<TraitPath> {
    let hrtbs = read_opt(r, read_generics)?.map(Box::new);
    let path = read_genericpath(r)?;
    let mut type_bounds = std::collections::BTreeMap::new();
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        type_bounds.insert(name, read_aty_equal(r)?);
    }
    let mut trait_bounds = std::collections::BTreeMap::new();
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        trait_bounds.insert(name, read_aty_bound(r)?);
    }
    Ok(TraitPath { hrtbs, path, type_bounds, trait_bounds })
}

pub fn read_path<S: Read>(r: R<'_, S>) -> Result<Path> {
    match r.read_tag()? {
        tags::PATH_GENERIC => Ok(Path::Generic(read_genericpath(r)?)),
        tags::PATH_UFCS_INHERENT => Ok(Path::UfcsInherent(Box::new(PathUfcsInherent {
            ty: read_type(r)?,
            item: r.read_istring()?,
            params: read_pathparams(r)?,
            impl_params: read_pathparams(r)?,
        }))),
        tags::PATH_UFCS_KNOWN => {
            let hrtbs = read_opt(r, read_generics)?.map(Box::new);
            Ok(Path::UfcsKnown(Box::new(PathUfcsKnown {
                hrtbs,
                ty: read_type(r)?,
                trait_: read_genericpath(r)?,
                item: r.read_istring()?,
                params: read_pathparams(r)?,
            })))
        }
        t => Err(bad("path", t)),
    }
}

pub fn read_type<S: Read>(r: R<'_, S>) -> Result<TypeRef> {
    let tag = r.read_tag()?;
    let data = match tag {
        tags::TY_INFER => {
            let c = r.read_tag()?;
            TypeData::Infer {
                class: tags::infer_class_from(c).ok_or_else(|| bad("infer class", c))?,
            }
        }
        tags::TY_DIVERGE => TypeData::Diverge,
        tags::TY_PRIMITIVE => {
            let c = r.read_tag()?;
            TypeData::Primitive(tags::core_type_from(c).ok_or_else(|| bad("core type", c))?)
        }
        tags::TY_PATH => {
            let path = read_path(r)?;
            let b = r.read_tag()?;
            TypeData::Path {
                path,
                binding: tags::type_path_binding_from(b)
                    .ok_or_else(|| bad("type path binding", b))?,
            }
        }
        tags::TY_GENERIC => TypeData::Generic(read_genericref(r)?),
        tags::TY_TRAIT_OBJECT => TypeData::TraitObject(Box::new(TraitObjectTy {
            trait_: read_traitpath(r)?,
            markers: read_vec(r, read_genericpath)?,
            lifetime: read_lifetime(r)?,
        })),
        tags::TY_ERASED => {
            let is_sized = r.read_bool()?;
            let traits = read_vec(r, read_traitpath)?;
            let lifetimes = read_vec(r, read_lifetime)?;
            let inner = match r.read_tag()? {
                tags::ERASED_FCN => {
                    ErasedTypeInner::Fcn { path: read_path(r)?, index: r.read_count()? }
                }
                tags::ERASED_ALIAS => ErasedTypeInner::Alias {
                    path: read_simplepath(r)?,
                    params: read_pathparams(r)?,
                },
                tags::ERASED_KNOWN => ErasedTypeInner::Known(read_type(r)?),
                t => return Err(bad("erased type origin", t)),
            };
            TypeData::ErasedType(Box::new(ErasedTy { is_sized, traits, lifetimes, inner }))
        }
        tags::TY_ARRAY => {
            TypeData::Array { inner: read_type(r)?, size: read_arraysize(r)? }
        }
        tags::TY_SLICE => TypeData::Slice { inner: read_type(r)? },
        tags::TY_TUPLE => TypeData::Tuple(read_vec(r, read_type)?),
        tags::TY_BORROW => {
            let b = r.read_tag()?;
            TypeData::Borrow {
                btype: tags::borrow_type_from(b).ok_or_else(|| bad("borrow type", b))?,
                inner: read_type(r)?,
                lifetime: read_lifetime(r)?,
            }
        }
        tags::TY_POINTER => {
            let b = r.read_tag()?;
            TypeData::Pointer {
                btype: tags::borrow_type_from(b).ok_or_else(|| bad("borrow type", b))?,
                inner: read_type(r)?,
            }
        }
        tags::TY_NAMED_FUNCTION => {
            let path = read_path(r)?;
            let k = r.read_tag()?;
            TypeData::NamedFunction {
                path,
                kind: tags::named_fn_kind_from(k).ok_or_else(|| bad("named fn kind", k))?,
            }
        }
        tags::TY_FUNCTION => {
            let hrls = read_generics(r)?;
            let is_unsafe = r.read_bool()?;
            let is_variadic = r.read_bool()?;
            let abi = r.read_istring()?;
            let ret = read_type(r)?;
            let args = read_vec(r, read_type)?;
            TypeData::Function(Box::new(FnPtr { hrls, is_unsafe, is_variadic, abi, ret, args }))
        }
        tags::TY_CLOSURE => {
            let node = r.read_u32()?;
            let c = r.read_tag()?;
            let class = tags::closure_class_from(c).ok_or_else(|| bad("closure class", c))?;
            let ret = read_type(r)?;
            let args = read_vec(r, read_type)?;
            let is_copy = r.read_bool()?;
            TypeData::Closure(Box::new(ClosureTy { node, class, ret, args, is_copy }))
        }
        tags::TY_GENERATOR => TypeData::Generator(Box::new(GeneratorTy {
            node: r.read_u32()?,
            yield_ty: read_type(r)?,
            ret_ty: read_type(r)?,
            resume_ty: read_type(r)?,
        })),
        t => return Err(bad("type", t)),
    };
    Ok(TypeRef::new(data))
}

// ---------------------------------------------------------------------------
// Generics, literals

pub fn read_generics<S: Read>(r: R<'_, S>) -> Result<GenericParams> {
    Ok(GenericParams {
        types: read_vec(r, |r| {
            Ok(TypeParamDef {
                name: r.read_istring()?,
                default: read_opt(r, read_type)?,
                is_sized: r.read_bool()?,
            })
        })?,
        lifetimes: read_vec(r, |r| Ok(LifetimeDef { name: r.read_istring()? }))?,
        values: read_vec(r, |r| {
            Ok(ValueParamDef { name: r.read_istring()?, ty: read_type(r)? })
        })?,
        bounds: read_vec(r, read_generic_bound)?,
    })
}

fn read_generic_bound<S: Read>(r: R<'_, S>) -> Result<GenericBound> {
    match r.read_tag()? {
        tags::BOUND_LIFETIME => Ok(GenericBound::Lifetime {
            test: read_lifetime(r)?,
            valid_for: read_lifetime(r)?,
        }),
        tags::BOUND_TYPE_LIFETIME => Ok(GenericBound::TypeLifetime {
            ty: read_type(r)?,
            valid_for: read_lifetime(r)?,
        }),
        tags::BOUND_TRAIT => Ok(GenericBound::TraitBound {
            hrtbs: read_opt(r, read_generics)?.map(Box::new),
            ty: read_type(r)?,
            trait_: read_traitpath(r)?,
        }),
        tags::BOUND_TYPE_EQUALITY => Ok(GenericBound::TypeEquality {
            ty: read_type(r)?,
            other_ty: read_type(r)?,
        }),
        t => Err(bad("generic bound", t)),
    }
}

fn read_bytes<S: Read>(r: R<'_, S>, n: usize) -> Result<Vec<u8>> {
    let mut rv = Vec::with_capacity(n.min(1 << 20));
    for _ in 0..n {
        rv.push(r.read_u8()?);
    }
    Ok(rv)
}

pub fn read_literal<S: Read>(r: R<'_, S>) -> Result<EncodedLiteral> {
    let n = r.read_count()?;
    let bytes = read_bytes(r, n)?;
    let relocations = read_vec(r, |r| {
        let ofs = r.read_u64c()? as usize;
        let len = r.read_u64c()? as usize;
        let value = match r.read_tag()? {
            tags::RELOC_ITEM => RelocValue::Item(read_path(r)?),
            tags::RELOC_BYTES => {
                let n = r.read_count()?;
                RelocValue::Bytes(read_bytes(r, n)?)
            }
            t => return Err(bad("relocation", t)),
        };
        Ok(Reloc { ofs, len, value })
    })?;
    Ok(EncodedLiteral { bytes, relocations })
}

// ---------------------------------------------------------------------------
// Items

fn read_publicity<S: Read>(r: R<'_, S>) -> Result<Publicity> {
    if r.read_bool()? {
        Ok(Publicity::new_global())
    } else {
        Ok(Publicity::new_restricted(read_simplepath(r)?))
    }
}

fn read_import<S: Read>(r: R<'_, S>) -> Result<Import> {
    Ok(Import { path: read_simplepath(r)?, is_variant: r.read_bool()?, idx: r.read_u32()? })
}

fn read_trait_markings<S: Read>(r: R<'_, S>) -> Result<TraitMarkings> {
    let mut m = TraitMarkings {
        has_a_deref: r.read_bool()?,
        is_copy: r.read_bool()?,
        has_drop_impl: r.read_bool()?,
        auto_impls: Default::default(),
    };
    for _ in 0..r.read_count()? {
        let path = read_simplepath(r)?;
        let conditions = read_vec(r, read_type)?;
        let is_impled = r.read_bool()?;
        m.auto_impls.insert(path, hir::AutoImplMarking { conditions, is_impled });
    }
    Ok(m)
}

fn read_struct_markings<S: Read>(r: R<'_, S>) -> Result<StructMarkings> {
    let can_unsize = r.read_bool()?;
    let unsized_param = read_opt(r, |r| r.read_count())?;
    let unsized_field = read_opt(r, |r| r.read_count())?;
    let d = r.read_tag()?;
    let dst_type = tags::dst_type_from(d).ok_or_else(|| bad("dst type", d))?;
    let c = r.read_tag()?;
    let coerce_unsized = tags::coerce_unsized_from(c).ok_or_else(|| bad("coerce", c))?;
    let coerce_unsized_index = read_opt(r, |r| r.read_count())?;
    let coerce_param = read_opt(r, |r| r.read_count())?;
    let is_nonzero = r.read_bool()?;
    let bounded_max = read_opt(r, |r| {
        let lo = r.read_u64()? as u128;
        let hi = r.read_u64()? as u128;
        Ok(lo | (hi << 64))
    })?;
    Ok(StructMarkings {
        can_unsize,
        unsized_param,
        unsized_field,
        dst_type,
        coerce_unsized,
        coerce_unsized_index,
        coerce_param,
        is_nonzero,
        bounded_max,
    })
}

fn read_struct<S: Read>(r: R<'_, S>) -> Result<Struct> {
    r.open_object("Struct")?;
    let params = read_generics(r)?;
    let rt = r.read_tag()?;
    let repr = tags::repr_from(rt).ok_or_else(|| bad("repr", rt))?;
    let data = match r.read_tag()? {
        0 => StructData::Unit,
        1 => StructData::Tuple(read_vec(r, |r| {
            Ok(VisEnt::new(read_publicity(r)?, read_type(r)?))
        })?),
        2 => StructData::Named(read_vec(r, |r| {
            let name = r.read_istring()?;
            Ok((name, VisEnt::new(read_publicity(r)?, read_type(r)?)))
        })?),
        t => return Err(bad("struct data", t)),
    };
    let forced_alignment = read_opt(r, |r| r.read_u32())?;
    let max_field_alignment = read_opt(r, |r| r.read_u32())?;
    let markings = read_trait_markings(r)?;
    let struct_markings = read_struct_markings(r)?;
    r.close_object()?;
    Ok(Struct {
        params,
        repr,
        data,
        forced_alignment,
        max_field_alignment,
        markings,
        struct_markings,
    })
}

fn read_enum<S: Read>(r: R<'_, S>) -> Result<Enum> {
    r.open_object("Enum")?;
    let params = read_generics(r)?;
    let class = match r.read_tag()? {
        0 => EnumClass::Data(read_vec(r, |r| {
            Ok(EnumDataVariant {
                name: r.read_istring()?,
                is_struct: r.read_bool()?,
                ty: read_type(r)?,
            })
        })?),
        1 => {
            let rt = r.read_tag()?;
            let repr = tags::enum_repr_from(rt).ok_or_else(|| bad("enum repr", rt))?;
            EnumClass::Value {
                repr,
                variants: read_vec(r, |r| {
                    Ok(EnumValueVariant {
                        name: r.read_istring()?,
                        expr: read_opt(r, read_uneval)?.map(Arc::new),
                        val: r.read_u64()?,
                    })
                })?,
            }
        }
        t => return Err(bad("enum class", t)),
    };
    let markings = read_trait_markings(r)?;
    r.close_object()?;
    Ok(Enum { params, class, markings })
}

fn read_union<S: Read>(r: R<'_, S>) -> Result<hir::item::Union> {
    r.open_object("Union")?;
    let params = read_generics(r)?;
    let rt = r.read_tag()?;
    let repr = tags::repr_from(rt).ok_or_else(|| bad("repr", rt))?;
    let variants = read_vec(r, |r| {
        let name = r.read_istring()?;
        Ok((name, VisEnt::new(read_publicity(r)?, read_type(r)?)))
    })?;
    let markings = read_trait_markings(r)?;
    r.close_object()?;
    Ok(hir::item::Union { params, repr, variants, markings })
}

fn read_extern_type<S: Read>(r: R<'_, S>) -> Result<ExternType> {
    r.open_object("ExternType")?;
    let markings = read_trait_markings(r)?;
    r.close_object()?;
    Ok(ExternType { markings })
}

fn read_trait<S: Read>(r: R<'_, S>) -> Result<Trait> {
    r.open_object("Trait")?;
    let params = read_generics(r)?;
    let lifetime = read_lifetime(r)?;
    let parent_traits = read_vec(r, read_traitpath)?;
    let is_marker = r.read_bool()?;
    let mut types = std::collections::BTreeMap::new();
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        types.insert(
            name,
            AssociatedType {
                is_sized: r.read_bool()?,
                lifetime_bound: read_lifetime(r)?,
                trait_bounds: read_vec(r, read_traitpath)?,
                default: read_opt(r, read_type)?,
            },
        );
    }
    let mut values = std::collections::BTreeMap::new();
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        let item = match r.read_tag()? {
            tags::TRAIT_VALUE_CONSTANT => TraitValueItem::Constant(read_constant(r)?),
            tags::TRAIT_VALUE_STATIC => TraitValueItem::Static(read_static(r)?),
            tags::TRAIT_VALUE_FUNCTION => TraitValueItem::Function(read_function(r)?),
            t => return Err(bad("trait value item", t)),
        };
        values.insert(name, item);
    }
    r.close_object()?;
    let mut t = Trait::new(params);
    t.lifetime = lifetime;
    t.parent_traits = parent_traits;
    t.is_marker = is_marker;
    t.types = types;
    t.values = values;
    Ok(t)
}

fn read_trait_alias<S: Read>(r: R<'_, S>) -> Result<TraitAlias> {
    Ok(TraitAlias { params: read_generics(r)?, traits: read_vec(r, read_traitpath)? })
}

fn read_type_alias<S: Read>(r: R<'_, S>) -> Result<TypeAlias> {
    Ok(TypeAlias { params: read_generics(r)?, ty: read_type(r)? })
}

fn read_function<S: Read>(r: R<'_, S>) -> Result<Function> {
    r.open_object("Function")?;
    let rt = r.read_tag()?;
    let receiver = tags::receiver_from(rt).ok_or_else(|| bad("receiver", rt))?;
    let abi = r.read_istring()?;
    let is_unsafe = r.read_bool()?;
    let is_const = r.read_bool()?;
    let linkage = Linkage { name: r.read_istring()? };
    let params = read_generics(r)?;
    let args = read_vec(r, |r| Ok((IStr::default(), read_type(r)?)))?;
    let is_variadic = r.read_bool()?;
    let ret = read_type(r)?;
    let body = read_opt(r, read_mir)?;
    r.close_object()?;
    Ok(Function {
        linkage,
        receiver,
        abi,
        is_unsafe,
        is_const,
        is_variadic,
        params,
        args,
        ret,
        body,
    })
}

fn read_static<S: Read>(r: R<'_, S>) -> Result<Static> {
    r.open_object("Static")?;
    let linkage = Linkage { name: r.read_istring()? };
    let is_mut = r.read_bool()?;
    let ty = read_type(r)?;
    r.close_object()?;
    Ok(Static { linkage, is_mut, ty, value_res: None })
}

fn read_constant<S: Read>(r: R<'_, S>) -> Result<Constant> {
    r.open_object("Constant")?;
    let params = read_generics(r)?;
    let ty = read_type(r)?;
    let value = read_opt(r, read_uneval)?.map(Arc::new);
    let value_res = read_opt(r, read_literal)?;
    let st = r.read_tag()?;
    let value_state =
        tags::const_value_state_from(st).ok_or_else(|| bad("value state", st))?;
    r.close_object()?;
    Ok(Constant { params, ty, value, value_res, value_state })
}

fn read_type_item<S: Read>(r: R<'_, S>) -> Result<TypeItem> {
    match r.read_tag()? {
        tags::TYPE_ITEM_IMPORT => Ok(TypeItem::Import(read_import(r)?)),
        tags::TYPE_ITEM_MODULE => Ok(TypeItem::Module(read_module(r)?)),
        tags::TYPE_ITEM_TYPE_ALIAS => Ok(TypeItem::TypeAlias(read_type_alias(r)?)),
        tags::TYPE_ITEM_ENUM => Ok(TypeItem::Enum(read_enum(r)?)),
        tags::TYPE_ITEM_STRUCT => Ok(TypeItem::Struct(read_struct(r)?)),
        tags::TYPE_ITEM_TRAIT => Ok(TypeItem::Trait(read_trait(r)?)),
        tags::TYPE_ITEM_UNION => Ok(TypeItem::Union(read_union(r)?)),
        tags::TYPE_ITEM_EXTERN_TYPE => Ok(TypeItem::ExternType(read_extern_type(r)?)),
        tags::TYPE_ITEM_TRAIT_ALIAS => Ok(TypeItem::TraitAlias(read_trait_alias(r)?)),
        t => Err(bad("type item", t)),
    }
}

fn read_value_item<S: Read>(r: R<'_, S>) -> Result<ValueItem> {
    match r.read_tag()? {
        tags::VALUE_ITEM_IMPORT => Ok(ValueItem::Import(read_import(r)?)),
        tags::VALUE_ITEM_CONSTANT => Ok(ValueItem::Constant(read_constant(r)?)),
        tags::VALUE_ITEM_STATIC => Ok(ValueItem::Static(read_static(r)?)),
        tags::VALUE_ITEM_STRUCT_CONSTANT => {
            Ok(ValueItem::StructConstant(StructConstant { ty: read_simplepath(r)? }))
        }
        tags::VALUE_ITEM_FUNCTION => Ok(ValueItem::Function(read_function(r)?)),
        tags::VALUE_ITEM_STRUCT_CONSTRUCTOR => {
            Ok(ValueItem::StructConstructor(StructConstructor { ty: read_simplepath(r)? }))
        }
        t => Err(bad("value item", t)),
    }
}

fn read_module<S: Read>(r: R<'_, S>) -> Result<Module> {
    r.open_object("Module")?;
    let mut module = Module::new();
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        let publicity = read_publicity(r)?;
        let item = read_value_item(r)?;
        module.value_items.insert(name, Box::new(VisEnt::new(publicity, item)));
    }
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        let publicity = read_publicity(r)?;
        let item = read_type_item(r)?;
        module.mod_items.insert(name, Box::new(VisEnt::new(publicity, item)));
    }
    r.close_object()?;
    Ok(module)
}

// ---------------------------------------------------------------------------
// Impls

fn read_type_impl<S: Read>(r: R<'_, S>) -> Result<TypeImpl> {
    r.open_object("TypeImpl")?;
    let params = read_generics(r)?;
    let ty = read_type(r)?;
    let mut methods = std::collections::BTreeMap::new();
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        methods.insert(
            name,
            hir::VisImplEnt {
                publicity: read_publicity(r)?,
                is_specialisable: r.read_bool()?,
                item: read_function(r)?,
            },
        );
    }
    let mut constants = std::collections::BTreeMap::new();
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        constants.insert(
            name,
            hir::VisImplEnt {
                publicity: read_publicity(r)?,
                is_specialisable: r.read_bool()?,
                item: read_constant(r)?,
            },
        );
    }
    let src_module = read_simplepath(r)?;
    r.close_object()?;
    Ok(TypeImpl { params, ty, methods, constants, src_module })
}

fn read_trait_impl<S: Read>(r: R<'_, S>) -> Result<TraitImpl> {
    r.open_object("TraitImpl")?;
    let params = read_generics(r)?;
    let trait_args = read_pathparams(r)?;
    let ty = read_type(r)?;

    fn read_ent_map<S: Read, T>(
        r: R<'_, S>,
        mut f: impl FnMut(R<'_, S>) -> Result<T>,
    ) -> Result<std::collections::BTreeMap<IStr, hir::ImplEnt<T>>> {
        let mut rv = std::collections::BTreeMap::new();
        for _ in 0..r.read_count()? {
            let name = r.read_istring()?;
            let is_specialisable = r.read_bool()?;
            rv.insert(name, hir::ImplEnt { is_specialisable, item: f(r)? });
        }
        Ok(rv)
    }

    let methods = read_ent_map(r, read_function)?;
    let constants = read_ent_map(r, read_constant)?;
    let statics = read_ent_map(r, read_static)?;
    let types = read_ent_map(r, read_type)?;
    let src_module = read_simplepath(r)?;
    r.close_object()?;
    Ok(TraitImpl { params, trait_args, ty, methods, constants, statics, types, src_module })
}

fn read_marker_impl<S: Read>(r: R<'_, S>) -> Result<MarkerImpl> {
    r.open_object("MarkerImpl")?;
    let params = read_generics(r)?;
    let trait_args = read_pathparams(r)?;
    let is_positive = r.read_bool()?;
    let ty = read_type(r)?;
    r.close_object()?;
    Ok(MarkerImpl { params, trait_args, is_positive, ty })
}

// ---------------------------------------------------------------------------
// MIR

fn read_lvalue<S: Read>(r: R<'_, S>) -> Result<mir::LValue> {
    let root = match r.read_tag()? {
        tags::LV_ROOT_RETURN => mir::LValueRoot::Return,
        tags::LV_ROOT_ARGUMENT => mir::LValueRoot::Argument(r.read_u32()?),
        tags::LV_ROOT_LOCAL => mir::LValueRoot::Local(r.read_u32()?),
        tags::LV_ROOT_STATIC => mir::LValueRoot::Static(read_path(r)?),
        t => return Err(bad("lvalue root", t)),
    };
    let projections = read_vec(r, |r| {
        Ok(match r.read_tag()? {
            tags::LV_PROJ_FIELD => mir::Projection::Field(r.read_u32()?),
            tags::LV_PROJ_DEREF => mir::Projection::Deref,
            tags::LV_PROJ_INDEX => mir::Projection::Index(Box::new(read_lvalue(r)?)),
            tags::LV_PROJ_DOWNCAST => mir::Projection::Downcast(r.read_u32()?),
            t => return Err(bad("lvalue projection", t)),
        })
    })?;
    Ok(mir::LValue { root, projections })
}

fn read_u128<S: Read>(r: R<'_, S>) -> Result<u128> {
    let lo = r.read_u64()? as u128;
    let hi = r.read_u64()? as u128;
    Ok(lo | (hi << 64))
}

fn read_mir_constant<S: Read>(r: R<'_, S>) -> Result<mir::Constant> {
    Ok(match r.read_tag()? {
        tags::MIR_CONST_INT => {
            let v = read_u128(r)? as i128;
            let t = r.read_tag()?;
            mir::Constant::Int { v, t: tags::core_type_from(t).ok_or_else(|| bad("int ty", t))? }
        }
        tags::MIR_CONST_UINT => {
            let v = read_u128(r)?;
            let t = r.read_tag()?;
            mir::Constant::Uint { v, t: tags::core_type_from(t).ok_or_else(|| bad("uint ty", t))? }
        }
        tags::MIR_CONST_FLOAT => {
            let v = r.read_double()?;
            let t = r.read_tag()?;
            mir::Constant::Float {
                v,
                t: tags::core_type_from(t).ok_or_else(|| bad("float ty", t))?,
            }
        }
        tags::MIR_CONST_BOOL => mir::Constant::Bool { v: r.read_bool()? },
        tags::MIR_CONST_BYTES => {
            let n = r.read_count()?;
            mir::Constant::Bytes(read_bytes(r, n)?)
        }
        tags::MIR_CONST_STATIC_STRING => mir::Constant::StaticString(r.read_string()?),
        tags::MIR_CONST_CONST => mir::Constant::Const { p: Box::new(read_path(r)?) },
        tags::MIR_CONST_GENERIC => mir::Constant::Generic(read_genericref(r)?),
        tags::MIR_CONST_ITEM_ADDR => mir::Constant::ItemAddr(Box::new(read_path(r)?)),
        t => return Err(bad("mir constant", t)),
    })
}

fn read_param<S: Read>(r: R<'_, S>) -> Result<mir::Param> {
    Ok(match r.read_tag()? {
        tags::MIR_PARAM_LVALUE => mir::Param::LValue(read_lvalue(r)?),
        tags::MIR_PARAM_CONSTANT => mir::Param::Constant(read_mir_constant(r)?),
        t => return Err(bad("mir param", t)),
    })
}

fn read_rvalue<S: Read>(r: R<'_, S>) -> Result<mir::RValue> {
    Ok(match r.read_tag()? {
        tags::RV_USE => mir::RValue::Use(read_lvalue(r)?),
        tags::RV_CONSTANT => mir::RValue::Constant(read_mir_constant(r)?),
        tags::RV_SIZED_ARRAY => mir::RValue::SizedArray {
            val: read_param(r)?,
            count: read_arraysize(r)?,
        },
        tags::RV_BORROW => {
            let b = r.read_tag()?;
            mir::RValue::Borrow {
                btype: tags::borrow_type_from(b).ok_or_else(|| bad("borrow", b))?,
                val: read_lvalue(r)?,
            }
        }
        tags::RV_CAST => mir::RValue::Cast { val: read_lvalue(r)?, ty: read_type(r)? },
        tags::RV_BINOP => {
            let val_l = read_param(r)?;
            let op = r.read_tag()?;
            mir::RValue::BinOp {
                val_l,
                op: tags::bin_op_from(op).ok_or_else(|| bad("binop", op))?,
                val_r: read_param(r)?,
            }
        }
        tags::RV_UNIOP => {
            let val = read_lvalue(r)?;
            let op = r.read_tag()?;
            mir::RValue::UniOp {
                val,
                op: tags::uni_op_from(op).ok_or_else(|| bad("uniop", op))?,
            }
        }
        tags::RV_DST_META => mir::RValue::DstMeta { val: read_lvalue(r)? },
        tags::RV_DST_PTR => mir::RValue::DstPtr { val: read_lvalue(r)? },
        tags::RV_MAKE_DST => mir::RValue::MakeDst {
            ptr_val: read_param(r)?,
            meta_val: read_param(r)?,
        },
        tags::RV_TUPLE => mir::RValue::Tuple { vals: read_vec(r, read_param)? },
        tags::RV_ARRAY => mir::RValue::Array { vals: read_vec(r, read_param)? },
        tags::RV_VARIANT => mir::RValue::Variant {
            path: read_genericpath(r)?,
            index: r.read_u32()?,
            val: read_param(r)?,
        },
        tags::RV_STRUCT => mir::RValue::Struct {
            path: read_genericpath(r)?,
            vals: read_vec(r, read_param)?,
        },
        t => return Err(bad("rvalue", t)),
    })
}

fn read_statement<S: Read>(r: R<'_, S>) -> Result<mir::Statement> {
    Ok(match r.read_tag()? {
        tags::STMT_ASSIGN => {
            mir::Statement::Assign { dst: read_lvalue(r)?, src: read_rvalue(r)? }
        }
        tags::STMT_DROP => {
            let k = r.read_tag()?;
            mir::Statement::Drop {
                kind: tags::drop_kind_from(k).ok_or_else(|| bad("drop kind", k))?,
                slot: read_lvalue(r)?,
                flag_idx: read_opt(r, |r| r.read_u32())?,
            }
        }
        tags::STMT_ASM => {
            let tpl = r.read_string()?;
            let outputs = read_vec(r, |r| Ok((r.read_string()?, read_lvalue(r)?)))?;
            let inputs = read_vec(r, |r| Ok((r.read_string()?, read_lvalue(r)?)))?;
            let clobbers = read_vec(r, |r| r.read_string())?;
            let flags = read_vec(r, |r| r.read_string())?;
            mir::Statement::Asm(mir::AsmStmt { tpl, outputs, inputs, clobbers, flags })
        }
        tags::STMT_SET_DROP_FLAG => mir::Statement::SetDropFlag {
            idx: r.read_u32()?,
            new_val: r.read_bool()?,
            other: read_opt(r, |r| r.read_u32())?,
        },
        tags::STMT_SCOPE_END => {
            mir::Statement::ScopeEnd { slots: read_vec(r, |r| r.read_u32())? }
        }
        t => return Err(bad("statement", t)),
    })
}

fn read_terminator<S: Read>(r: R<'_, S>) -> Result<mir::Terminator> {
    Ok(match r.read_tag()? {
        tags::TERM_INCOMPLETE => mir::Terminator::Incomplete,
        tags::TERM_RETURN => mir::Terminator::Return,
        tags::TERM_DIVERGE => mir::Terminator::Diverge,
        tags::TERM_GOTO => mir::Terminator::Goto(r.read_u32()?),
        tags::TERM_PANIC => mir::Terminator::Panic { dst: r.read_u32()? },
        tags::TERM_IF => mir::Terminator::If {
            cond: read_lvalue(r)?,
            bb_true: r.read_u32()?,
            bb_false: r.read_u32()?,
        },
        tags::TERM_SWITCH => mir::Terminator::Switch {
            val: read_lvalue(r)?,
            targets: read_vec(r, |r| r.read_u32())?,
        },
        tags::TERM_SWITCH_VALUE => {
            let val = read_lvalue(r)?;
            let def_target = r.read_u32()?;
            let targets = read_vec(r, |r| r.read_u32())?;
            let values = match r.read_tag()? {
                tags::SWITCH_VALUES_UNSIGNED => {
                    mir::SwitchValues::Unsigned(read_vec(r, read_u128)?)
                }
                tags::SWITCH_VALUES_SIGNED => mir::SwitchValues::Signed(read_vec(r, |r| {
                    Ok(read_u128(r)? as i128)
                })?),
                tags::SWITCH_VALUES_STRING => mir::SwitchValues::String(read_vec(r, |r| {
                    let n = r.read_count()?;
                    read_bytes(r, n)
                })?),
                t => return Err(bad("switch values", t)),
            };
            mir::Terminator::SwitchValue { val, def_target, targets, values }
        }
        tags::TERM_CALL => {
            let ret_block = r.read_u32()?;
            let panic_block = r.read_u32()?;
            let ret_val = read_lvalue(r)?;
            let fcn = match r.read_tag()? {
                tags::CALL_TARGET_VALUE => mir::CallTarget::Value(read_lvalue(r)?),
                tags::CALL_TARGET_PATH => mir::CallTarget::Path(read_path(r)?),
                tags::CALL_TARGET_INTRINSIC => mir::CallTarget::Intrinsic {
                    name: r.read_istring()?,
                    params: read_pathparams(r)?,
                },
                t => return Err(bad("call target", t)),
            };
            let args = read_vec(r, read_param)?;
            mir::Terminator::Call { ret_block, panic_block, ret_val, fcn, args }
        }
        t => return Err(bad("terminator", t)),
    })
}

fn read_mir<S: Read>(r: R<'_, S>) -> Result<mir::MirFunction> {
    r.open_object("MirFunction")?;
    let locals = read_vec(r, read_type)?;
    let drop_flags = read_vec(r, |r| r.read_bool())?;
    let blocks = read_vec(r, |r| {
        Ok(mir::BasicBlock {
            statements: read_vec(r, read_statement)?,
            terminator: read_terminator(r)?,
        })
    })?;
    r.close_object()?;
    Ok(mir::MirFunction { locals, drop_flags, blocks })
}

// ---------------------------------------------------------------------------
// Macros

fn read_token<S: Read>(r: R<'_, S>) -> Result<Token> {
    Ok(match r.read_tag()? {
        tags::TOKEN_IDENT => Token::Ident(r.read_istring()?),
        tags::TOKEN_LIFETIME => Token::Lifetime(r.read_istring()?),
        tags::TOKEN_LITERAL => Token::Literal(r.read_string()?),
        tags::TOKEN_PUNCT => Token::Punct(r.read_istring()?),
        tags::TOKEN_OPEN => {
            let d = r.read_tag()?;
            Token::Open(tags::delim_from(d).ok_or_else(|| bad("delim", d))?)
        }
        tags::TOKEN_CLOSE => {
            let d = r.read_tag()?;
            Token::Close(tags::delim_from(d).ok_or_else(|| bad("delim", d))?)
        }
        tags::TOKEN_META_VAR => {
            Token::MetaVar { name: r.read_istring()?, frag: r.read_istring()? }
        }
        tags::TOKEN_SUBST => Token::Subst(r.read_istring()?),
        t => return Err(bad("token", t)),
    })
}

fn read_token_stream<S: Read>(r: R<'_, S>) -> Result<TokenStream> {
    Ok(TokenStream(read_vec(r, read_token)?))
}

fn read_macro_rules<S: Read>(r: R<'_, S>) -> Result<MacroRules> {
    r.open_object("MacroRules")?;
    let rules = read_vec(r, |r| {
        Ok(MacroRule { pattern: read_token_stream(r)?, body: read_token_stream(r)? })
    })?;
    let source_crate = r.read_istring()?;
    r.close_object()?;
    Ok(MacroRules { rules, source_crate })
}

// ---------------------------------------------------------------------------
// Crate root

pub fn read_crate<S: Read>(r: R<'_, S>) -> Result<hir::CratePtr> {
    r.open_object("Crate")?;
    let crate_name = r.read_istring()?;
    let mut krate = Crate::new(crate_name);
    krate.root_module = read_module(r)?;

    for _ in 0..r.read_count()? {
        krate.add_type_impl(read_type_impl(r)?);
    }
    for _ in 0..r.read_count()? {
        let trait_path = read_simplepath(r)?;
        let imp = read_trait_impl(r)?;
        krate.add_trait_impl(trait_path, imp);
    }
    for _ in 0..r.read_count()? {
        let trait_path = read_simplepath(r)?;
        let imp = read_marker_impl(r)?;
        krate.add_marker_impl(trait_path, imp);
    }
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        let rules = read_macro_rules(r)?;
        krate.exported_macros.insert(name, rules);
    }
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        let path = read_simplepath(r)?;
        krate.lang_items.insert(name, path);
    }
    for _ in 0..r.read_count()? {
        let name = r.read_istring()?;
        let basename = r.read_string()?;
        // The driver re-resolves and loads the dependency itself.
        krate.ext_crates.insert(name, ExternCrate { basename, data: None });
    }
    for _ in 0..r.read_count()? {
        krate.ext_libs.push(ExternLibrary { name: r.read_string()? });
    }
    for _ in 0..r.read_count()? {
        krate.link_paths.push(r.read_string()?);
    }
    for _ in 0..r.read_count()? {
        krate.proc_macros.push(ProcMacro {
            name: r.read_istring()?,
            path: read_simplepath(r)?,
            attributes: read_vec(r, |r| r.read_string())?,
        });
    }
    r.close_object()?;
    Ok(Box::new(krate))
}
