//! Tree walk emitting a `hir::Crate` onto the low-level protocol, in the
//! fixed crate-root field order. Runs twice per file: once counting
//! interned strings, once for real.

use std::io::Write;

use hir::mir;
use hir::ty::{ErasedTypeInner, TypeData};
use hir::{
    ArraySize, AtyBound, AtyEqual, ConstGeneric, Constant, Crate, EncodedLiteral, Enum, EnumClass,
    ExternType, Function, GenericBound, GenericParams, GenericPath, GenericRef, Import,
    LifetimeRef, MacroRules, MarkerImpl, Module, Path, PathParams, Publicity, SimplePath, Static,
    Struct, StructData, StructMarkings, Token, TokenStream, Trait, TraitAlias, TraitImpl,
    TraitMarkings, TraitPath, TraitValueItem, TypeAlias, TypeImpl, TypeItem, TypeRef, UnevalConst,
    ValueItem, VisEnt,
};

use crate::lowlevel::{Error, Result, Writer};
use crate::tags;

type W<'w, S> = &'w mut Writer<S>;

fn write_opt<S: Write, T>(
    w: W<'_, S>,
    v: &Option<T>,
    f: impl FnOnce(W<'_, S>, &T) -> Result<()>,
) -> Result<()> {
    w.write_bool(v.is_some())?;
    match v {
        Some(x) => f(w, x),
        None => Ok(()),
    }
}

fn write_seq<S: Write, T>(
    w: W<'_, S>,
    items: impl ExactSizeIterator<Item = T>,
    mut f: impl FnMut(W<'_, S>, T) -> Result<()>,
) -> Result<()> {
    w.write_count(items.len())?;
    for item in items {
        f(w, item)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Identifiers, types, paths

pub fn write_simplepath<S: Write>(w: W<'_, S>, p: &SimplePath) -> Result<()> {
    w.write_istring(&p.crate_name)?;
    write_seq(w, p.components.iter(), |w, c| w.write_istring(c))
}

fn write_lifetime<S: Write>(w: W<'_, S>, lt: &LifetimeRef) -> Result<()> {
    w.write_u32(lt.binding)
}

fn write_genericref<S: Write>(w: W<'_, S>, g: &GenericRef) -> Result<()> {
    w.write_istring(&g.name)?;
    w.write_u16(g.binding)
}

fn write_uneval<S: Write>(w: W<'_, S>, uc: &UnevalConst) -> Result<()> {
    w.write_istring(&uc.expr)?;
    write_pathparams(w, &uc.impl_params)?;
    write_pathparams(w, &uc.method_params)
}

fn write_constgeneric<S: Write>(w: W<'_, S>, c: &ConstGeneric) -> Result<()> {
    match c {
        ConstGeneric::Infer => w.write_tag(tags::CONSTGENERIC_INFER),
        ConstGeneric::Unevaluated(uc) => {
            w.write_tag(tags::CONSTGENERIC_UNEVALUATED)?;
            write_uneval(w, uc)
        }
        ConstGeneric::Generic(g) => {
            w.write_tag(tags::CONSTGENERIC_GENERIC)?;
            write_genericref(w, g)
        }
        ConstGeneric::Evaluated(lit) => {
            w.write_tag(tags::CONSTGENERIC_EVALUATED)?;
            write_literal(w, lit)
        }
    }
}

fn write_arraysize<S: Write>(w: W<'_, S>, s: &ArraySize) -> Result<()> {
    match s {
        ArraySize::Unevaluated(c) => {
            w.write_tag(tags::ARRAYSIZE_UNEVALUATED)?;
            write_constgeneric(w, c)
        }
        ArraySize::Known(v) => {
            w.write_tag(tags::ARRAYSIZE_KNOWN)?;
            w.write_u64c(*v)
        }
    }
}

pub fn write_pathparams<S: Write>(w: W<'_, S>, p: &PathParams) -> Result<()> {
    write_seq(w, p.lifetimes.iter(), write_lifetime)?;
    write_seq(w, p.types.iter(), write_type)?;
    write_seq(w, p.values.iter(), write_constgeneric)
}

pub fn write_genericpath<S: Write>(w: W<'_, S>, p: &GenericPath) -> Result<()> {
    write_simplepath(w, &p.path)?;
    write_pathparams(w, &p.params)
}

fn write_aty_equal<S: Write>(w: W<'_, S>, aty: &AtyEqual) -> Result<()> {
    write_genericpath(w, &aty.source_trait)?;
    write_type(w, &aty.ty)
}

fn write_aty_bound<S: Write>(w: W<'_, S>, b: &AtyBound) -> Result<()> {
    write_genericpath(w, &b.source_trait)?;
    write_seq(w, b.traits.iter(), write_traitpath)
}

pub fn write_traitpath<S: Write>(w: W<'_, S>, p: &TraitPath) -> Result<()> {
    write_opt(w, &p.hrtbs, |w, g| write_generics(w, g))?;
    write_genericpath(w, &p.path)?;
    write_seq(w, p.type_bounds.iter(), |w, (name, aty)| {
        w.write_istring(name)?;
        write_aty_equal(w, aty)
    })?;
    write_seq(w, p.trait_bounds.iter(), |w, (name, b)| {
        w.write_istring(name)?;
        write_aty_bound(w, b)
    })
}

pub fn write_path<S: Write>(w: W<'_, S>, p: &Path) -> Result<()> {
    match p {
        Path::Generic(gp) => {
            w.write_tag(tags::PATH_GENERIC)?;
            write_genericpath(w, gp)
        }
        Path::UfcsInherent(pe) => {
            w.write_tag(tags::PATH_UFCS_INHERENT)?;
            write_type(w, &pe.ty)?;
            w.write_istring(&pe.item)?;
            write_pathparams(w, &pe.params)?;
            write_pathparams(w, &pe.impl_params)
        }
        Path::UfcsKnown(pe) => {
            w.write_tag(tags::PATH_UFCS_KNOWN)?;
            write_opt(w, &pe.hrtbs, |w, g| write_generics(w, g))?;
            write_type(w, &pe.ty)?;
            write_genericpath(w, &pe.trait_)?;
            w.write_istring(&pe.item)?;
            write_pathparams(w, &pe.params)
        }
        Path::UfcsUnknown(_) => Err(Error::Unencodable("UfcsUnknown path")),
    }
}

pub fn write_type<S: Write>(w: W<'_, S>, ty: &TypeRef) -> Result<()> {
    match ty.data() {
        TypeData::Infer { class } => {
            w.write_tag(tags::TY_INFER)?;
            w.write_tag(tags::infer_class_tag(class))
        }
        TypeData::Diverge => w.write_tag(tags::TY_DIVERGE),
        TypeData::Primitive(p) => {
            w.write_tag(tags::TY_PRIMITIVE)?;
            w.write_tag(tags::core_type_tag(p))
        }
        TypeData::Path { path, binding } => {
            w.write_tag(tags::TY_PATH)?;
            write_path(w, path)?;
            w.write_tag(tags::type_path_binding_tag(binding))
        }
        TypeData::Generic(g) => {
            w.write_tag(tags::TY_GENERIC)?;
            write_genericref(w, g)
        }
        TypeData::TraitObject(to) => {
            w.write_tag(tags::TY_TRAIT_OBJECT)?;
            write_traitpath(w, &to.trait_)?;
            write_seq(w, to.markers.iter(), write_genericpath)?;
            write_lifetime(w, &to.lifetime)
        }
        TypeData::ErasedType(e) => {
            w.write_tag(tags::TY_ERASED)?;
            w.write_bool(e.is_sized)?;
            write_seq(w, e.traits.iter(), write_traitpath)?;
            write_seq(w, e.lifetimes.iter(), write_lifetime)?;
            match &e.inner {
                ErasedTypeInner::Fcn { path, index } => {
                    w.write_tag(tags::ERASED_FCN)?;
                    write_path(w, path)?;
                    w.write_count(*index)
                }
                ErasedTypeInner::Alias { path, params } => {
                    w.write_tag(tags::ERASED_ALIAS)?;
                    write_simplepath(w, path)?;
                    write_pathparams(w, params)
                }
                ErasedTypeInner::Known(t) => {
                    w.write_tag(tags::ERASED_KNOWN)?;
                    write_type(w, t)
                }
            }
        }
        TypeData::Array { inner, size } => {
            w.write_tag(tags::TY_ARRAY)?;
            write_type(w, inner)?;
            write_arraysize(w, size)
        }
        TypeData::Slice { inner } => {
            w.write_tag(tags::TY_SLICE)?;
            write_type(w, inner)
        }
        TypeData::Tuple(items) => {
            w.write_tag(tags::TY_TUPLE)?;
            write_seq(w, items.iter(), write_type)
        }
        TypeData::Borrow { btype, inner, lifetime } => {
            w.write_tag(tags::TY_BORROW)?;
            w.write_tag(tags::borrow_type_tag(btype))?;
            write_type(w, inner)?;
            write_lifetime(w, lifetime)
        }
        TypeData::Pointer { btype, inner } => {
            w.write_tag(tags::TY_POINTER)?;
            w.write_tag(tags::borrow_type_tag(btype))?;
            write_type(w, inner)
        }
        TypeData::NamedFunction { path, kind } => {
            w.write_tag(tags::TY_NAMED_FUNCTION)?;
            write_path(w, path)?;
            w.write_tag(tags::named_fn_kind_tag(kind))
        }
        TypeData::Function(ft) => {
            w.write_tag(tags::TY_FUNCTION)?;
            write_generics(w, &ft.hrls)?;
            w.write_bool(ft.is_unsafe)?;
            w.write_bool(ft.is_variadic)?;
            w.write_istring(&ft.abi)?;
            write_type(w, &ft.ret)?;
            write_seq(w, ft.args.iter(), write_type)
        }
        TypeData::Closure(c) => {
            w.write_tag(tags::TY_CLOSURE)?;
            w.write_u32(c.node)?;
            w.write_tag(tags::closure_class_tag(&c.class))?;
            write_type(w, &c.ret)?;
            write_seq(w, c.args.iter(), write_type)?;
            w.write_bool(c.is_copy)
        }
        TypeData::Generator(g) => {
            w.write_tag(tags::TY_GENERATOR)?;
            w.write_u32(g.node)?;
            write_type(w, &g.yield_ty)?;
            write_type(w, &g.ret_ty)?;
            write_type(w, &g.resume_ty)
        }
    }
}

// ---------------------------------------------------------------------------
// Generics, literals

pub fn write_generics<S: Write>(w: W<'_, S>, g: &GenericParams) -> Result<()> {
    write_seq(w, g.types.iter(), |w, t| {
        w.write_istring(&t.name)?;
        write_opt(w, &t.default, write_type)?;
        w.write_bool(t.is_sized)
    })?;
    write_seq(w, g.lifetimes.iter(), |w, l| w.write_istring(&l.name))?;
    write_seq(w, g.values.iter(), |w, v| {
        w.write_istring(&v.name)?;
        write_type(w, &v.ty)
    })?;
    write_seq(w, g.bounds.iter(), write_generic_bound)
}

fn write_generic_bound<S: Write>(w: W<'_, S>, b: &GenericBound) -> Result<()> {
    match b {
        GenericBound::Lifetime { test, valid_for } => {
            w.write_tag(tags::BOUND_LIFETIME)?;
            write_lifetime(w, test)?;
            write_lifetime(w, valid_for)
        }
        GenericBound::TypeLifetime { ty, valid_for } => {
            w.write_tag(tags::BOUND_TYPE_LIFETIME)?;
            write_type(w, ty)?;
            write_lifetime(w, valid_for)
        }
        GenericBound::TraitBound { hrtbs, ty, trait_ } => {
            w.write_tag(tags::BOUND_TRAIT)?;
            write_opt(w, hrtbs, |w, g| write_generics(w, g))?;
            write_type(w, ty)?;
            write_traitpath(w, trait_)
        }
        GenericBound::TypeEquality { ty, other_ty } => {
            w.write_tag(tags::BOUND_TYPE_EQUALITY)?;
            write_type(w, ty)?;
            write_type(w, other_ty)
        }
    }
}

pub fn write_literal<S: Write>(w: W<'_, S>, lit: &EncodedLiteral) -> Result<()> {
    w.write_count(lit.bytes.len())?;
    w_raw(w, &lit.bytes)?;
    write_seq(w, lit.relocations.iter(), |w, r| {
        w.write_u64c(r.ofs as u64)?;
        w.write_u64c(r.len as u64)?;
        match &r.value {
            hir::RelocValue::Item(p) => {
                w.write_tag(tags::RELOC_ITEM)?;
                write_path(w, p)
            }
            hir::RelocValue::Bytes(b) => {
                w.write_tag(tags::RELOC_BYTES)?;
                w.write_count(b.len())?;
                w_raw(w, b)
            }
        }
    })
}

fn w_raw<S: Write>(w: W<'_, S>, bytes: &[u8]) -> Result<()> {
    for &b in bytes {
        w.write_u8(b)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Items

fn write_publicity<S: Write>(w: W<'_, S>, p: &Publicity) -> Result<()> {
    match p.restriction() {
        None => w.write_bool(true),
        Some(path) => {
            w.write_bool(false)?;
            write_simplepath(w, path)
        }
    }
}

fn write_import<S: Write>(w: W<'_, S>, imp: &Import) -> Result<()> {
    write_simplepath(w, &imp.path)?;
    w.write_bool(imp.is_variant)?;
    w.write_u32(imp.idx)
}

fn write_trait_markings<S: Write>(w: W<'_, S>, m: &TraitMarkings) -> Result<()> {
    w.write_bool(m.has_a_deref)?;
    w.write_bool(m.is_copy)?;
    w.write_bool(m.has_drop_impl)?;
    let mut autos: Vec<_> = m.auto_impls.iter().collect();
    autos.sort_by_key(|(p, _)| (*p).clone());
    write_seq(w, autos.into_iter(), |w, (path, marking)| {
        write_simplepath(w, path)?;
        write_seq(w, marking.conditions.iter(), write_type)?;
        w.write_bool(marking.is_impled)
    })
}

fn write_struct_markings<S: Write>(w: W<'_, S>, m: &StructMarkings) -> Result<()> {
    w.write_bool(m.can_unsize)?;
    write_opt(w, &m.unsized_param, |w, v| w.write_count(*v))?;
    write_opt(w, &m.unsized_field, |w, v| w.write_count(*v))?;
    w.write_tag(tags::dst_type_tag(&m.dst_type))?;
    w.write_tag(tags::coerce_unsized_tag(&m.coerce_unsized))?;
    write_opt(w, &m.coerce_unsized_index, |w, v| w.write_count(*v))?;
    write_opt(w, &m.coerce_param, |w, v| w.write_count(*v))?;
    w.write_bool(m.is_nonzero)?;
    write_opt(w, &m.bounded_max, |w, v| {
        w.write_u64(*v as u64)?;
        w.write_u64((*v >> 64) as u64)
    })
}

fn write_struct<S: Write>(w: W<'_, S>, s: &Struct) -> Result<()> {
    let t = w.open_object("Struct")?;
    write_generics(w, &s.params)?;
    w.write_tag(tags::repr_tag(&s.repr))?;
    match &s.data {
        StructData::Unit => w.write_tag(0)?,
        StructData::Tuple(ents) => {
            w.write_tag(1)?;
            write_seq(w, ents.iter(), |w, e| {
                write_publicity(w, &e.publicity)?;
                write_type(w, &e.item)
            })?;
        }
        StructData::Named(ents) => {
            w.write_tag(2)?;
            write_seq(w, ents.iter(), |w, (name, e)| {
                w.write_istring(name)?;
                write_publicity(w, &e.publicity)?;
                write_type(w, &e.item)
            })?;
        }
    }
    write_opt(w, &s.forced_alignment, |w, v| w.write_u32(*v))?;
    write_opt(w, &s.max_field_alignment, |w, v| w.write_u32(*v))?;
    write_trait_markings(w, &s.markings)?;
    write_struct_markings(w, &s.struct_markings)?;
    w.close_object(t)
}

fn write_enum<S: Write>(w: W<'_, S>, e: &Enum) -> Result<()> {
    let t = w.open_object("Enum")?;
    write_generics(w, &e.params)?;
    match &e.class {
        EnumClass::Data(variants) => {
            w.write_tag(0)?;
            write_seq(w, variants.iter(), |w, v| {
                w.write_istring(&v.name)?;
                w.write_bool(v.is_struct)?;
                write_type(w, &v.ty)
            })?;
        }
        EnumClass::Value { repr, variants } => {
            w.write_tag(1)?;
            w.write_tag(tags::enum_repr_tag(repr))?;
            write_seq(w, variants.iter(), |w, v| {
                w.write_istring(&v.name)?;
                write_opt(w, &v.expr, |w, e| write_uneval(w, e))?;
                w.write_u64(v.val)
            })?;
        }
    }
    write_trait_markings(w, &e.markings)?;
    w.close_object(t)
}

fn write_union<S: Write>(w: W<'_, S>, u: &hir::item::Union) -> Result<()> {
    let t = w.open_object("Union")?;
    write_generics(w, &u.params)?;
    w.write_tag(tags::repr_tag(&u.repr))?;
    write_seq(w, u.variants.iter(), |w, (name, e)| {
        w.write_istring(name)?;
        write_publicity(w, &e.publicity)?;
        write_type(w, &e.item)
    })?;
    write_trait_markings(w, &u.markings)?;
    w.close_object(t)
}

fn write_extern_type<S: Write>(w: W<'_, S>, e: &ExternType) -> Result<()> {
    let t = w.open_object("ExternType")?;
    write_trait_markings(w, &e.markings)?;
    w.close_object(t)
}

fn write_trait<S: Write>(w: W<'_, S>, tr: &Trait) -> Result<()> {
    let t = w.open_object("Trait")?;
    write_generics(w, &tr.params)?;
    write_lifetime(w, &tr.lifetime)?;
    write_seq(w, tr.parent_traits.iter(), write_traitpath)?;
    w.write_bool(tr.is_marker)?;
    write_seq(w, tr.types.iter(), |w, (name, aty)| {
        w.write_istring(name)?;
        w.write_bool(aty.is_sized)?;
        write_lifetime(w, &aty.lifetime_bound)?;
        write_seq(w, aty.trait_bounds.iter(), write_traitpath)?;
        write_opt(w, &aty.default, write_type)
    })?;
    write_seq(w, tr.values.iter(), |w, (name, item)| {
        w.write_istring(name)?;
        match item {
            TraitValueItem::Constant(c) => {
                w.write_tag(tags::TRAIT_VALUE_CONSTANT)?;
                write_constant(w, c)
            }
            TraitValueItem::Static(s) => {
                w.write_tag(tags::TRAIT_VALUE_STATIC)?;
                write_static(w, s)
            }
            TraitValueItem::Function(f) => {
                w.write_tag(tags::TRAIT_VALUE_FUNCTION)?;
                write_function(w, f)
            }
        }
    })?;
    // all_parent_traits / vtable tables are rebuilt by the post-load pass.
    w.close_object(t)
}

fn write_trait_alias<S: Write>(w: W<'_, S>, a: &TraitAlias) -> Result<()> {
    write_generics(w, &a.params)?;
    write_seq(w, a.traits.iter(), write_traitpath)
}

fn write_type_alias<S: Write>(w: W<'_, S>, a: &TypeAlias) -> Result<()> {
    write_generics(w, &a.params)?;
    write_type(w, &a.ty)
}

fn write_function<S: Write>(w: W<'_, S>, f: &Function) -> Result<()> {
    let t = w.open_object("Function")?;
    w.write_tag(tags::receiver_tag(&f.receiver))?;
    w.write_istring(&f.abi)?;
    w.write_bool(f.is_unsafe)?;
    w.write_bool(f.is_const)?;
    w.write_istring(&f.linkage.name)?;
    write_generics(w, &f.params)?;
    // Argument patterns are reset to empty; only the types travel.
    write_seq(w, f.args.iter(), |w, (_name, ty)| write_type(w, ty))?;
    w.write_bool(f.is_variadic)?;
    write_type(w, &f.ret)?;
    write_opt(w, &f.body, write_mir)?;
    w.close_object(t)
}

fn write_static<S: Write>(w: W<'_, S>, s: &Static) -> Result<()> {
    let t = w.open_object("Static")?;
    w.write_istring(&s.linkage.name)?;
    w.write_bool(s.is_mut)?;
    write_type(w, &s.ty)?;
    // The initialiser is not serialised; its evaluated value is stored
    // elsewhere when required.
    w.close_object(t)
}

fn write_constant<S: Write>(w: W<'_, S>, c: &Constant) -> Result<()> {
    let t = w.open_object("Constant")?;
    write_generics(w, &c.params)?;
    write_type(w, &c.ty)?;
    write_opt(w, &c.value, |w, v| write_uneval(w, v))?;
    write_opt(w, &c.value_res, write_literal)?;
    w.write_tag(tags::const_value_state_tag(&c.value_state))?;
    w.close_object(t)
}

fn write_type_item<S: Write>(w: W<'_, S>, item: &TypeItem) -> Result<()> {
    match item {
        TypeItem::Import(i) => {
            w.write_tag(tags::TYPE_ITEM_IMPORT)?;
            write_import(w, i)
        }
        TypeItem::Module(m) => {
            w.write_tag(tags::TYPE_ITEM_MODULE)?;
            write_module(w, m)
        }
        TypeItem::TypeAlias(a) => {
            w.write_tag(tags::TYPE_ITEM_TYPE_ALIAS)?;
            write_type_alias(w, a)
        }
        TypeItem::Enum(e) => {
            w.write_tag(tags::TYPE_ITEM_ENUM)?;
            write_enum(w, e)
        }
        TypeItem::Struct(s) => {
            w.write_tag(tags::TYPE_ITEM_STRUCT)?;
            write_struct(w, s)
        }
        TypeItem::Trait(t) => {
            w.write_tag(tags::TYPE_ITEM_TRAIT)?;
            write_trait(w, t)
        }
        TypeItem::Union(u) => {
            w.write_tag(tags::TYPE_ITEM_UNION)?;
            write_union(w, u)
        }
        TypeItem::ExternType(e) => {
            w.write_tag(tags::TYPE_ITEM_EXTERN_TYPE)?;
            write_extern_type(w, e)
        }
        TypeItem::TraitAlias(a) => {
            w.write_tag(tags::TYPE_ITEM_TRAIT_ALIAS)?;
            write_trait_alias(w, a)
        }
    }
}

fn write_value_item<S: Write>(w: W<'_, S>, item: &ValueItem) -> Result<()> {
    match item {
        ValueItem::Import(i) => {
            w.write_tag(tags::VALUE_ITEM_IMPORT)?;
            write_import(w, i)
        }
        ValueItem::Constant(c) => {
            w.write_tag(tags::VALUE_ITEM_CONSTANT)?;
            write_constant(w, c)
        }
        ValueItem::Static(s) => {
            w.write_tag(tags::VALUE_ITEM_STATIC)?;
            write_static(w, s)
        }
        ValueItem::StructConstant(s) => {
            w.write_tag(tags::VALUE_ITEM_STRUCT_CONSTANT)?;
            write_simplepath(w, &s.ty)
        }
        ValueItem::Function(f) => {
            w.write_tag(tags::VALUE_ITEM_FUNCTION)?;
            write_function(w, f)
        }
        ValueItem::StructConstructor(s) => {
            w.write_tag(tags::VALUE_ITEM_STRUCT_CONSTRUCTOR)?;
            write_simplepath(w, &s.ty)
        }
    }
}

fn write_module<S: Write>(w: W<'_, S>, m: &Module) -> Result<()> {
    let t = w.open_object("Module")?;
    write_seq(w, m.value_items.iter(), |w, (name, ent)| {
        w.write_istring(name)?;
        write_vis_value(w, ent)
    })?;
    write_seq(w, m.mod_items.iter(), |w, (name, ent)| {
        w.write_istring(name)?;
        write_vis_type(w, ent)
    })?;
    // `traits` is rebuilt post-load.
    w.close_object(t)
}

fn write_vis_value<S: Write>(w: W<'_, S>, ent: &VisEnt<ValueItem>) -> Result<()> {
    write_publicity(w, &ent.publicity)?;
    write_value_item(w, &ent.item)
}

fn write_vis_type<S: Write>(w: W<'_, S>, ent: &VisEnt<TypeItem>) -> Result<()> {
    write_publicity(w, &ent.publicity)?;
    write_type_item(w, &ent.item)
}

// ---------------------------------------------------------------------------
// Impls

fn write_type_impl<S: Write>(w: W<'_, S>, imp: &TypeImpl) -> Result<()> {
    let t = w.open_object("TypeImpl")?;
    write_generics(w, &imp.params)?;
    write_type(w, &imp.ty)?;
    write_seq(w, imp.methods.iter(), |w, (name, ent)| {
        w.write_istring(name)?;
        write_publicity(w, &ent.publicity)?;
        w.write_bool(ent.is_specialisable)?;
        write_function(w, &ent.item)
    })?;
    write_seq(w, imp.constants.iter(), |w, (name, ent)| {
        w.write_istring(name)?;
        write_publicity(w, &ent.publicity)?;
        w.write_bool(ent.is_specialisable)?;
        write_constant(w, &ent.item)
    })?;
    write_simplepath(w, &imp.src_module)?;
    w.close_object(t)
}

fn write_trait_impl<S: Write>(w: W<'_, S>, imp: &TraitImpl) -> Result<()> {
    let t = w.open_object("TraitImpl")?;
    write_generics(w, &imp.params)?;
    write_pathparams(w, &imp.trait_args)?;
    write_type(w, &imp.ty)?;
    write_seq(w, imp.methods.iter(), |w, (name, ent)| {
        w.write_istring(name)?;
        w.write_bool(ent.is_specialisable)?;
        write_function(w, &ent.item)
    })?;
    write_seq(w, imp.constants.iter(), |w, (name, ent)| {
        w.write_istring(name)?;
        w.write_bool(ent.is_specialisable)?;
        write_constant(w, &ent.item)
    })?;
    write_seq(w, imp.statics.iter(), |w, (name, ent)| {
        w.write_istring(name)?;
        w.write_bool(ent.is_specialisable)?;
        write_static(w, &ent.item)
    })?;
    write_seq(w, imp.types.iter(), |w, (name, ent)| {
        w.write_istring(name)?;
        w.write_bool(ent.is_specialisable)?;
        write_type(w, &ent.item)
    })?;
    write_simplepath(w, &imp.src_module)?;
    w.close_object(t)
}

fn write_marker_impl<S: Write>(w: W<'_, S>, imp: &MarkerImpl) -> Result<()> {
    let t = w.open_object("MarkerImpl")?;
    write_generics(w, &imp.params)?;
    write_pathparams(w, &imp.trait_args)?;
    w.write_bool(imp.is_positive)?;
    write_type(w, &imp.ty)?;
    w.close_object(t)
}

// ---------------------------------------------------------------------------
// MIR

fn write_lvalue<S: Write>(w: W<'_, S>, lv: &mir::LValue) -> Result<()> {
    match &lv.root {
        mir::LValueRoot::Return => w.write_tag(tags::LV_ROOT_RETURN)?,
        mir::LValueRoot::Argument(i) => {
            w.write_tag(tags::LV_ROOT_ARGUMENT)?;
            w.write_u32(*i)?;
        }
        mir::LValueRoot::Local(i) => {
            w.write_tag(tags::LV_ROOT_LOCAL)?;
            w.write_u32(*i)?;
        }
        mir::LValueRoot::Static(p) => {
            w.write_tag(tags::LV_ROOT_STATIC)?;
            write_path(w, p)?;
        }
    }
    write_seq(w, lv.projections.iter(), |w, proj| match proj {
        mir::Projection::Field(i) => {
            w.write_tag(tags::LV_PROJ_FIELD)?;
            w.write_u32(*i)
        }
        mir::Projection::Deref => w.write_tag(tags::LV_PROJ_DEREF),
        mir::Projection::Index(inner) => {
            w.write_tag(tags::LV_PROJ_INDEX)?;
            write_lvalue(w, inner)
        }
        mir::Projection::Downcast(i) => {
            w.write_tag(tags::LV_PROJ_DOWNCAST)?;
            w.write_u32(*i)
        }
    })
}

fn write_mir_constant<S: Write>(w: W<'_, S>, c: &mir::Constant) -> Result<()> {
    match c {
        mir::Constant::Int { v, t } => {
            w.write_tag(tags::MIR_CONST_INT)?;
            let bits = *v as u128;
            w.write_u64(bits as u64)?;
            w.write_u64((bits >> 64) as u64)?;
            w.write_tag(tags::core_type_tag(t))
        }
        mir::Constant::Uint { v, t } => {
            w.write_tag(tags::MIR_CONST_UINT)?;
            w.write_u64(*v as u64)?;
            w.write_u64((*v >> 64) as u64)?;
            w.write_tag(tags::core_type_tag(t))
        }
        mir::Constant::Float { v, t } => {
            w.write_tag(tags::MIR_CONST_FLOAT)?;
            w.write_double(*v)?;
            w.write_tag(tags::core_type_tag(t))
        }
        mir::Constant::Bool { v } => {
            w.write_tag(tags::MIR_CONST_BOOL)?;
            w.write_bool(*v)
        }
        mir::Constant::Bytes(b) => {
            w.write_tag(tags::MIR_CONST_BYTES)?;
            w.write_count(b.len())?;
            w_raw(w, b)
        }
        mir::Constant::StaticString(s) => {
            w.write_tag(tags::MIR_CONST_STATIC_STRING)?;
            w.write_string(s)
        }
        mir::Constant::Const { p } => {
            w.write_tag(tags::MIR_CONST_CONST)?;
            write_path(w, p)
        }
        mir::Constant::Generic(g) => {
            w.write_tag(tags::MIR_CONST_GENERIC)?;
            write_genericref(w, g)
        }
        mir::Constant::ItemAddr(p) => {
            w.write_tag(tags::MIR_CONST_ITEM_ADDR)?;
            write_path(w, p)
        }
    }
}

fn write_param<S: Write>(w: W<'_, S>, p: &mir::Param) -> Result<()> {
    match p {
        mir::Param::LValue(lv) => {
            w.write_tag(tags::MIR_PARAM_LVALUE)?;
            write_lvalue(w, lv)
        }
        mir::Param::Constant(c) => {
            w.write_tag(tags::MIR_PARAM_CONSTANT)?;
            write_mir_constant(w, c)
        }
    }
}

fn write_rvalue<S: Write>(w: W<'_, S>, rv: &mir::RValue) -> Result<()> {
    use mir::RValue::*;
    match rv {
        Use(lv) => {
            w.write_tag(tags::RV_USE)?;
            write_lvalue(w, lv)
        }
        Constant(c) => {
            w.write_tag(tags::RV_CONSTANT)?;
            write_mir_constant(w, c)
        }
        SizedArray { val, count } => {
            w.write_tag(tags::RV_SIZED_ARRAY)?;
            write_param(w, val)?;
            write_arraysize(w, count)
        }
        Borrow { btype, val } => {
            w.write_tag(tags::RV_BORROW)?;
            w.write_tag(tags::borrow_type_tag(btype))?;
            write_lvalue(w, val)
        }
        Cast { val, ty } => {
            w.write_tag(tags::RV_CAST)?;
            write_lvalue(w, val)?;
            write_type(w, ty)
        }
        BinOp { val_l, op, val_r } => {
            w.write_tag(tags::RV_BINOP)?;
            write_param(w, val_l)?;
            w.write_tag(tags::bin_op_tag(op))?;
            write_param(w, val_r)
        }
        UniOp { val, op } => {
            w.write_tag(tags::RV_UNIOP)?;
            write_lvalue(w, val)?;
            w.write_tag(tags::uni_op_tag(op))
        }
        DstMeta { val } => {
            w.write_tag(tags::RV_DST_META)?;
            write_lvalue(w, val)
        }
        DstPtr { val } => {
            w.write_tag(tags::RV_DST_PTR)?;
            write_lvalue(w, val)
        }
        MakeDst { ptr_val, meta_val } => {
            w.write_tag(tags::RV_MAKE_DST)?;
            write_param(w, ptr_val)?;
            write_param(w, meta_val)
        }
        Tuple { vals } => {
            w.write_tag(tags::RV_TUPLE)?;
            write_seq(w, vals.iter(), write_param)
        }
        Array { vals } => {
            w.write_tag(tags::RV_ARRAY)?;
            write_seq(w, vals.iter(), write_param)
        }
        Variant { path, index, val } => {
            w.write_tag(tags::RV_VARIANT)?;
            write_genericpath(w, path)?;
            w.write_u32(*index)?;
            write_param(w, val)
        }
        Struct { path, vals } => {
            w.write_tag(tags::RV_STRUCT)?;
            write_genericpath(w, path)?;
            write_seq(w, vals.iter(), write_param)
        }
    }
}

fn write_statement<S: Write>(w: W<'_, S>, stmt: &mir::Statement) -> Result<()> {
    match stmt {
        mir::Statement::Assign { dst, src } => {
            w.write_tag(tags::STMT_ASSIGN)?;
            write_lvalue(w, dst)?;
            write_rvalue(w, src)
        }
        mir::Statement::Drop { kind, slot, flag_idx } => {
            w.write_tag(tags::STMT_DROP)?;
            w.write_tag(tags::drop_kind_tag(kind))?;
            write_lvalue(w, slot)?;
            write_opt(w, flag_idx, |w, v| w.write_u32(*v))
        }
        mir::Statement::Asm(asm) => {
            w.write_tag(tags::STMT_ASM)?;
            w.write_string(&asm.tpl)?;
            write_seq(w, asm.outputs.iter(), |w, (c, lv)| {
                w.write_string(c)?;
                write_lvalue(w, lv)
            })?;
            write_seq(w, asm.inputs.iter(), |w, (c, lv)| {
                w.write_string(c)?;
                write_lvalue(w, lv)
            })?;
            write_seq(w, asm.clobbers.iter(), |w, c| w.write_string(c))?;
            write_seq(w, asm.flags.iter(), |w, c| w.write_string(c))
        }
        mir::Statement::SetDropFlag { idx, new_val, other } => {
            w.write_tag(tags::STMT_SET_DROP_FLAG)?;
            w.write_u32(*idx)?;
            w.write_bool(*new_val)?;
            write_opt(w, other, |w, v| w.write_u32(*v))
        }
        mir::Statement::ScopeEnd { slots } => {
            w.write_tag(tags::STMT_SCOPE_END)?;
            write_seq(w, slots.iter(), |w, s| w.write_u32(*s))
        }
    }
}

fn write_terminator<S: Write>(w: W<'_, S>, term: &mir::Terminator) -> Result<()> {
    use mir::Terminator::*;
    match term {
        Incomplete => w.write_tag(tags::TERM_INCOMPLETE),
        Return => w.write_tag(tags::TERM_RETURN),
        Diverge => w.write_tag(tags::TERM_DIVERGE),
        Goto(bb) => {
            w.write_tag(tags::TERM_GOTO)?;
            w.write_u32(*bb)
        }
        Panic { dst } => {
            w.write_tag(tags::TERM_PANIC)?;
            w.write_u32(*dst)
        }
        If { cond, bb_true, bb_false } => {
            w.write_tag(tags::TERM_IF)?;
            write_lvalue(w, cond)?;
            w.write_u32(*bb_true)?;
            w.write_u32(*bb_false)
        }
        Switch { val, targets } => {
            w.write_tag(tags::TERM_SWITCH)?;
            write_lvalue(w, val)?;
            write_seq(w, targets.iter(), |w, t| w.write_u32(*t))
        }
        SwitchValue { val, def_target, targets, values } => {
            w.write_tag(tags::TERM_SWITCH_VALUE)?;
            write_lvalue(w, val)?;
            w.write_u32(*def_target)?;
            write_seq(w, targets.iter(), |w, t| w.write_u32(*t))?;
            match values {
                mir::SwitchValues::Unsigned(vs) => {
                    w.write_tag(tags::SWITCH_VALUES_UNSIGNED)?;
                    write_seq(w, vs.iter(), |w, v| {
                        w.write_u64(*v as u64)?;
                        w.write_u64((*v >> 64) as u64)
                    })
                }
                mir::SwitchValues::Signed(vs) => {
                    w.write_tag(tags::SWITCH_VALUES_SIGNED)?;
                    write_seq(w, vs.iter(), |w, v| {
                        let bits = *v as u128;
                        w.write_u64(bits as u64)?;
                        w.write_u64((bits >> 64) as u64)
                    })
                }
                mir::SwitchValues::String(vs) => {
                    w.write_tag(tags::SWITCH_VALUES_STRING)?;
                    write_seq(w, vs.iter(), |w, v| {
                        w.write_count(v.len())?;
                        w_raw(w, v)
                    })
                }
            }
        }
        Call { ret_block, panic_block, ret_val, fcn, args } => {
            w.write_tag(tags::TERM_CALL)?;
            w.write_u32(*ret_block)?;
            w.write_u32(*panic_block)?;
            write_lvalue(w, ret_val)?;
            match fcn {
                mir::CallTarget::Value(lv) => {
                    w.write_tag(tags::CALL_TARGET_VALUE)?;
                    write_lvalue(w, lv)?;
                }
                mir::CallTarget::Path(p) => {
                    w.write_tag(tags::CALL_TARGET_PATH)?;
                    write_path(w, p)?;
                }
                mir::CallTarget::Intrinsic { name, params } => {
                    w.write_tag(tags::CALL_TARGET_INTRINSIC)?;
                    w.write_istring(name)?;
                    write_pathparams(w, params)?;
                }
            }
            write_seq(w, args.iter(), write_param)
        }
    }
}

fn write_mir<S: Write>(w: W<'_, S>, body: &mir::MirFunction) -> Result<()> {
    let t = w.open_object("MirFunction")?;
    write_seq(w, body.locals.iter(), write_type)?;
    write_seq(w, body.drop_flags.iter(), |w, f| w.write_bool(*f))?;
    write_seq(w, body.blocks.iter(), |w, bb| {
        write_seq(w, bb.statements.iter(), write_statement)?;
        write_terminator(w, &bb.terminator)
    })?;
    w.close_object(t)
}

// ---------------------------------------------------------------------------
// Macros

fn write_token<S: Write>(w: W<'_, S>, tok: &Token) -> Result<()> {
    match tok {
        Token::Ident(s) => {
            w.write_tag(tags::TOKEN_IDENT)?;
            w.write_istring(s)
        }
        Token::Lifetime(s) => {
            w.write_tag(tags::TOKEN_LIFETIME)?;
            w.write_istring(s)
        }
        Token::Literal(s) => {
            w.write_tag(tags::TOKEN_LITERAL)?;
            w.write_string(s)
        }
        Token::Punct(s) => {
            w.write_tag(tags::TOKEN_PUNCT)?;
            w.write_istring(s)
        }
        Token::Open(d) => {
            w.write_tag(tags::TOKEN_OPEN)?;
            w.write_tag(tags::delim_tag(d))
        }
        Token::Close(d) => {
            w.write_tag(tags::TOKEN_CLOSE)?;
            w.write_tag(tags::delim_tag(d))
        }
        Token::MetaVar { name, frag } => {
            w.write_tag(tags::TOKEN_META_VAR)?;
            w.write_istring(name)?;
            w.write_istring(frag)
        }
        Token::Subst(name) => {
            w.write_tag(tags::TOKEN_SUBST)?;
            w.write_istring(name)
        }
    }
}

fn write_token_stream<S: Write>(w: W<'_, S>, ts: &TokenStream) -> Result<()> {
    write_seq(w, ts.0.iter(), write_token)
}

fn write_macro_rules<S: Write>(w: W<'_, S>, m: &MacroRules) -> Result<()> {
    let t = w.open_object("MacroRules")?;
    write_seq(w, m.rules.iter(), |w, rule| {
        write_token_stream(w, &rule.pattern)?;
        write_token_stream(w, &rule.body)
    })?;
    w.write_istring(&m.source_crate)?;
    w.close_object(t)
}

// ---------------------------------------------------------------------------
// Crate root

pub fn write_crate<S: Write>(w: W<'_, S>, krate: &Crate) -> Result<()> {
    let t = w.open_object("Crate")?;
    w.write_istring(&krate.crate_name)?;
    write_module(w, &krate.root_module)?;

    let type_impls: Vec<_> = sorted_impls(&krate.type_impls, |i| format!("{}", i.ty));
    write_seq(w, type_impls.into_iter(), |w, imp| write_type_impl(w, imp))?;

    let mut trait_keys: Vec<_> = krate.trait_impls.keys().collect();
    trait_keys.sort();
    w.write_count(trait_keys.iter().map(|k| krate.trait_impls[*k].len()).sum())?;
    for key in trait_keys {
        let sorted =
            sorted_impls(&krate.trait_impls[key], |i| format!("{}{}", i.trait_args, i.ty));
        for imp in sorted {
            write_simplepath(w, key)?;
            write_trait_impl(w, imp)?;
        }
    }

    let mut marker_keys: Vec<_> = krate.marker_impls.keys().collect();
    marker_keys.sort();
    w.write_count(marker_keys.iter().map(|k| krate.marker_impls[*k].len()).sum())?;
    for key in marker_keys {
        let sorted =
            sorted_impls(&krate.marker_impls[key], |i| format!("{}{}", i.trait_args, i.ty));
        for imp in sorted {
            write_simplepath(w, key)?;
            write_marker_impl(w, imp)?;
        }
    }

    write_seq(w, krate.exported_macros.iter(), |w, (name, rules)| {
        w.write_istring(name)?;
        write_macro_rules(w, rules)
    })?;
    write_seq(w, krate.lang_items.iter(), |w, (name, path)| {
        w.write_istring(name)?;
        write_simplepath(w, path)
    })?;
    write_seq(w, krate.ext_crates.iter(), |w, (name, ext)| {
        w.write_istring(name)?;
        w.write_string(&ext.basename)
    })?;
    write_seq(w, krate.ext_libs.iter(), |w, lib| w.write_string(&lib.name))?;
    write_seq(w, krate.link_paths.iter(), |w, p| w.write_string(p))?;
    write_seq(w, krate.proc_macros.iter(), |w, pm| {
        w.write_istring(&pm.name)?;
        write_simplepath(w, &pm.path)?;
        write_seq(w, pm.attributes.iter(), |w, a| w.write_string(a))
    })?;
    w.close_object(t)
}

/// Impl groups serialise flattened in a stable order; buckets are rebuilt on
/// load.
fn sorted_impls<'i, T>(
    group: &'i hir::ImplGroup<T>,
    key_of: impl Fn(&T) -> String,
) -> Vec<&'i T> {
    let mut v: Vec<&T> = group.iter_all().collect();
    v.sort_by_key(|i| key_of(i));
    v
}
