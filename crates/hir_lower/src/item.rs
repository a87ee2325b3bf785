//! Item lowering: modules, type definitions, traits, impls, functions and
//! values, plus the attribute-driven details (linkage, repr, scalar-range
//! markings, lang registration).

use base::Span;
use hir::ty::{TypeData, TypePathBinding, TypeRef};
use hir::{
    AssociatedType, Constant, ConstValueState, Enum, EnumClass, EnumDataVariant, EnumRepr,
    EnumValueVariant, ErasedTy, ErasedTypeInner, ExternType, Function, GenericPath, Import,
    LifetimeRef, Linkage, MarkerImpl, Module, Path, Publicity, Receiver, Repr, SimplePath,
    Static, Struct, StructConstant, StructConstructor, StructData, StructDstType, StructMarkings,
    Trait, TraitAlias, TraitImpl, TraitMarkings, TraitPath, TraitValueItem, TypeAlias, TypeImpl,
    TypeItem, ValueItem, VisEnt,
};
use intern::IStr;

use crate::macros::fixup_macro_def;
use crate::ty::{lower_generics, lower_trait_ref, lower_type};
use crate::{Ctx, ImplTraitSource};

pub(crate) fn lower_module(ctx: &Ctx<'_>, mod_path: &SimplePath, m: &ast::Module) -> Module {
    let mut module = Module::new();
    for item in &m.items {
        lower_item(ctx, &mut module, mod_path, item);
    }
    module
}

fn lower_publicity(ctx: &Ctx<'_>, vis: &ast::Visibility) -> Publicity {
    match vis {
        ast::Visibility::Public => Publicity::new_global(),
        ast::Visibility::Private(p) | ast::Visibility::PathRestricted(p) => {
            Publicity::new_restricted(ctx.canonical(p))
        }
    }
}

fn add_type_item(
    module: &mut Module,
    sp: Span,
    name: IStr,
    publicity: Publicity,
    item: TypeItem,
) {
    if module.mod_items.insert(name.clone(), Box::new(VisEnt::new(publicity, item))).is_some() {
        base::fatal!(sp, "duplicate definition of type-namespace item `{}`", name);
    }
}

fn add_value_item(
    module: &mut Module,
    sp: Span,
    name: IStr,
    publicity: Publicity,
    item: ValueItem,
) {
    if module.value_items.insert(name.clone(), Box::new(VisEnt::new(publicity, item))).is_some() {
        base::fatal!(sp, "duplicate definition of value-namespace item `{}`", name);
    }
}

fn lower_item(ctx: &Ctx<'_>, module: &mut Module, mod_path: &SimplePath, item: &ast::Item) {
    let sp = item.span;
    let publicity = lower_publicity(ctx, &item.vis);
    let item_path = mod_path.child(item.name.clone());

    // `#[lang]` registration happens for every item shape.
    if let Some(attr) = item.attrs.get("lang") {
        if let Some(name) = attr.as_str() {
            ctx.lang_items.borrow_mut().insert(IStr::new(name), item_path.clone());
        }
    }

    match &item.kind {
        ast::ItemKind::Module(m) => {
            let lowered = lower_module(ctx, &item_path, m);
            add_type_item(module, sp, item.name.clone(), publicity, TypeItem::Module(lowered));
        }
        ast::ItemKind::Use(u) => lower_use(ctx, module, sp, &publicity, u),
        ast::ItemKind::ExternCrate { .. } => {
            // Dependencies were loaded by the driver; nothing to record here.
        }
        ast::ItemKind::ExternBlock(block) => lower_extern_block(ctx, module, mod_path, block),
        ast::ItemKind::Struct(def) => {
            lower_struct(ctx, module, sp, &item_path, item, def, publicity)
        }
        ast::ItemKind::Enum(def) => {
            lower_enum(ctx, module, sp, &item_path, item, def, publicity)
        }
        ast::ItemKind::Union(def) => {
            let _guard = ctx.enter_item(item_path.clone());
            ctx.push_lifetimes(hir::GENERIC_GROUP_IMPL, def.generics.lifetimes.clone());
            let lowered = hir::item::Union {
                params: lower_generics(ctx, sp, &def.generics),
                repr: lower_repr(sp, &item.attrs),
                variants: def
                    .fields
                    .iter()
                    .map(|f| {
                        (
                            f.name.clone(),
                            VisEnt::new(lower_publicity(ctx, &f.vis), lower_type(ctx, sp, &f.ty)),
                        )
                    })
                    .collect(),
                markings: TraitMarkings::default(),
            };
            ctx.pop_lifetimes();
            add_type_item(module, sp, item.name.clone(), publicity, TypeItem::Union(lowered));
        }
        ast::ItemKind::Trait(def) => {
            lower_trait(ctx, module, sp, &item_path, item, def, publicity)
        }
        ast::ItemKind::TraitAlias(def) => {
            let _guard = ctx.enter_item(item_path.clone());
            let lowered = TraitAlias {
                params: lower_generics(ctx, sp, &def.generics),
                traits: def.traits.iter().map(|t| lower_trait_ref(ctx, sp, t)).collect(),
            };
            add_type_item(module, sp, item.name.clone(), publicity, TypeItem::TraitAlias(lowered));
        }
        ast::ItemKind::TypeAlias(def) => {
            let _guard = ctx.enter_item(item_path.clone());
            ctx.push_lifetimes(hir::GENERIC_GROUP_IMPL, def.generics.lifetimes.clone());
            let params = lower_generics(ctx, sp, &def.generics);
            // `impl Trait` in alias position materialises as the alias.
            ctx.set_impl_trait_source(Some(ImplTraitSource {
                path: item_path.clone(),
                params: params.make_nop_params(hir::GENERIC_GROUP_IMPL),
            }));
            let ty = lower_type(ctx, sp, &def.ty);
            ctx.set_impl_trait_source(None);
            ctx.pop_lifetimes();
            add_type_item(
                module,
                sp,
                item.name.clone(),
                publicity,
                TypeItem::TypeAlias(TypeAlias { params, ty }),
            );
        }
        ast::ItemKind::AssocType(_) => {
            base::fatal!(sp, "associated type `{}` outside a trait", item.name)
        }
        ast::ItemKind::Function(def) => {
            let f = lower_function(ctx, sp, &item_path, item, def, None);
            add_value_item(module, sp, item.name.clone(), publicity, ValueItem::Function(f));
        }
        ast::ItemKind::Static(def) => {
            let s = lower_static(ctx, sp, item, def, false);
            add_value_item(module, sp, item.name.clone(), publicity, ValueItem::Static(s));
        }
        ast::ItemKind::Const(def) => {
            let c = lower_const(ctx, sp, &item_path, def);
            add_value_item(module, sp, item.name.clone(), publicity, ValueItem::Constant(c));
        }
        ast::ItemKind::Impl(def) => lower_impl(ctx, sp, mod_path, def),
        ast::ItemKind::Macro(def) => {
            let rules = fixup_macro_def(ctx, sp, def);
            if item.attrs.has("macro_export") {
                ctx.exported_macros.borrow_mut().insert(item.name.clone(), rules);
            }
        }
    }
}

fn lower_use(
    ctx: &Ctx<'_>,
    module: &mut Module,
    sp: Span,
    publicity: &Publicity,
    u: &ast::UseItem,
) {
    for entry in &u.entries {
        let name = match &entry.name {
            Some(n) => n.clone(),
            // Globs were consumed by the index pass; the HIR records only
            // named redirections.
            None => continue,
        };
        use ast::Binding;
        let target = match entry.path.binding.target_path() {
            Some(p) => ctx.canonical(p),
            None => base::fatal!(sp, "unbound use target `{}`", entry.path),
        };
        let mk = |is_variant: bool, idx: u32| Import { path: target.clone(), is_variant, idx };
        match &entry.path.binding {
            Binding::Module(_)
            | Binding::Struct(_)
            | Binding::Enum(_)
            | Binding::Union(_)
            | Binding::Trait(_)
            | Binding::TraitAlias(_)
            | Binding::TypeAlias(_)
            | Binding::ExternType(_) => {
                add_type_item(
                    module,
                    sp,
                    name.clone(),
                    publicity.clone(),
                    TypeItem::Import(mk(false, 0)),
                );
            }
            Binding::EnumVariant { idx, .. } => {
                add_type_item(
                    module,
                    sp,
                    name.clone(),
                    publicity.clone(),
                    TypeItem::Import(mk(true, *idx)),
                );
                add_value_item(
                    module,
                    sp,
                    name.clone(),
                    publicity.clone(),
                    ValueItem::Import(mk(true, *idx)),
                );
            }
            Binding::Function(_)
            | Binding::Static(_)
            | Binding::Constant(_)
            | Binding::StructValue(_) => {
                add_value_item(
                    module,
                    sp,
                    name.clone(),
                    publicity.clone(),
                    ValueItem::Import(mk(false, 0)),
                );
            }
            Binding::Macro(_) => {
                // Macros live in the exported-macros table, not the module.
            }
            Binding::Primitive(_) | Binding::TypeParam { .. } | Binding::ValueParam { .. } => {
                base::fatal!(sp, "cannot import `{}`", entry.path)
            }
            Binding::Unbound => base::fatal!(sp, "unbound use target `{}`", entry.path),
        }
        // Structs also project into the value namespace.
        if let Binding::Struct(_) = &entry.path.binding {
            add_value_item(
                module,
                sp,
                name,
                publicity.clone(),
                ValueItem::Import(mk(false, 0)),
            );
        }
    }
}

fn lower_extern_block(
    ctx: &Ctx<'_>,
    module: &mut Module,
    mod_path: &SimplePath,
    block: &ast::ExternBlock,
) {
    for item in &block.items {
        let sp = item.span;
        let publicity = lower_publicity(ctx, &item.vis);
        let item_path = mod_path.child(item.name.clone());
        match &item.kind {
            ast::ItemKind::Function(def) => {
                let mut f =
                    lower_function(ctx, sp, &item_path, item, def, Some(block.abi.as_str()));
                // Externally declared items keep their symbol name.
                if f.linkage.name.is_empty() {
                    f.linkage.name = item.name.clone();
                }
                add_value_item(module, sp, item.name.clone(), publicity, ValueItem::Function(f));
            }
            ast::ItemKind::Static(def) => {
                let mut s = lower_static(ctx, sp, item, def, true);
                if s.linkage.name.is_empty() {
                    s.linkage.name = item.name.clone();
                }
                add_value_item(module, sp, item.name.clone(), publicity, ValueItem::Static(s));
            }
            ast::ItemKind::TypeAlias(_) => {
                add_type_item(
                    module,
                    sp,
                    item.name.clone(),
                    publicity,
                    TypeItem::ExternType(ExternType { markings: TraitMarkings::default() }),
                );
            }
            _ => base::fatal!(sp, "item `{}` not allowed in an extern block", item.name),
        }
    }
}

fn lower_repr(sp: Span, attrs: &ast::Attributes) -> Repr {
    let attr = match attrs.get("repr") {
        Some(a) => a,
        None => return Repr::Rust,
    };
    let list = match &attr.value {
        ast::AttrValue::List(items) => items,
        ast::AttrValue::Str(s) if s == "C" => return Repr::C,
        _ => base::fatal!(sp, "malformed #[repr] attribute"),
    };
    let mut rv = Repr::Rust;
    for ent in list {
        match ent.name.as_str() {
            "C" => rv = Repr::C,
            "simd" => rv = Repr::Simd,
            "transparent" => rv = Repr::Transparent,
            "align" | "packed" => {}
            // Integer reprs only affect enums; handled there.
            _ => {}
        }
    }
    rv
}

fn repr_alignments(attrs: &ast::Attributes) -> (Option<u32>, Option<u32>) {
    let mut forced = None;
    let mut max_field = None;
    if let Some(ast::AttrValue::List(items)) = attrs.get("repr").map(|a| &a.value) {
        for ent in items {
            match (ent.name.as_str(), &ent.value) {
                ("align", v) => forced = attr_int(v).map(|x| x as u32),
                ("packed", ast::AttrValue::None) => max_field = Some(1),
                ("packed", v) => max_field = attr_int(v).map(|x| x as u32),
                _ => {}
            }
        }
    }
    (forced, max_field)
}

fn attr_int(v: &ast::AttrValue) -> Option<u128> {
    match v {
        ast::AttrValue::Int(x) => Some(*x),
        ast::AttrValue::Str(s) => s.parse().ok(),
        ast::AttrValue::List(items) => items.first().and_then(|a| match &a.value {
            ast::AttrValue::None => a.name.parse().ok(),
            other => attr_int(other),
        }),
        ast::AttrValue::None => None,
    }
}

fn lower_struct(
    ctx: &Ctx<'_>,
    module: &mut Module,
    sp: Span,
    item_path: &SimplePath,
    item: &ast::Item,
    def: &ast::StructDef,
    publicity: Publicity,
) {
    let _guard = ctx.enter_item(item_path.clone());
    ctx.push_lifetimes(hir::GENERIC_GROUP_IMPL, def.generics.lifetimes.clone());
    let params = lower_generics(ctx, sp, &def.generics);
    let data = match &def.data {
        ast::StructDataAst::Unit => StructData::Unit,
        ast::StructDataAst::Tuple(fields) => StructData::Tuple(
            fields
                .iter()
                .map(|(vis, ty)| {
                    VisEnt::new(lower_publicity(ctx, vis), lower_type(ctx, sp, ty))
                })
                .collect(),
        ),
        ast::StructDataAst::Named(fields) => StructData::Named(
            fields
                .iter()
                .map(|f| {
                    (
                        f.name.clone(),
                        VisEnt::new(lower_publicity(ctx, &f.vis), lower_type(ctx, sp, &f.ty)),
                    )
                })
                .collect(),
        ),
    };
    ctx.pop_lifetimes();

    let (forced_alignment, max_field_alignment) = repr_alignments(&item.attrs);
    let struct_markings = struct_markings_for(ctx, &item.attrs, &params, &data);

    let lowered = Struct {
        params,
        repr: lower_repr(sp, &item.attrs),
        data: data.clone(),
        forced_alignment,
        max_field_alignment,
        markings: TraitMarkings::default(),
        struct_markings,
    };
    add_type_item(module, sp, item.name.clone(), publicity.clone(), TypeItem::Struct(lowered));

    // Value-namespace projections.
    match &data {
        StructData::Unit => add_value_item(
            module,
            sp,
            item.name.clone(),
            publicity,
            ValueItem::StructConstant(StructConstant { ty: item_path.clone() }),
        ),
        StructData::Tuple(_) => add_value_item(
            module,
            sp,
            item.name.clone(),
            publicity,
            ValueItem::StructConstructor(StructConstructor { ty: item_path.clone() }),
        ),
        StructData::Named(_) => {}
    }
}

/// Derive the unsizing facts from the definition shape and the scalar-range
/// attributes. Attribute values that do not fit the field are ignored, not
/// errors.
fn struct_markings_for(
    ctx: &Ctx<'_>,
    attrs: &ast::Attributes,
    params: &hir::GenericParams,
    data: &StructData,
) -> StructMarkings {
    let _ = ctx;
    let mut m = StructMarkings::default();

    let last_field: Option<&TypeRef> = match data {
        StructData::Unit => None,
        StructData::Tuple(fields) => fields.last().map(|f| &f.item),
        StructData::Named(fields) => fields.last().map(|(_, f)| &f.item),
    };
    let field_count = match data {
        StructData::Unit => 0,
        StructData::Tuple(f) => f.len(),
        StructData::Named(f) => f.len(),
    };
    if let Some(last) = last_field {
        match last.data() {
            TypeData::Generic(g) if !g.is_self() => {
                // Only an actually-?Sized parameter makes the struct a
                // potential DST.
                let pidx = g.idx();
                if params.types.get(pidx).map_or(false, |d| !d.is_sized) {
                    m.dst_type = StructDstType::Possible;
                    m.can_unsize = true;
                    m.unsized_param = Some(pidx);
                    m.unsized_field = Some(field_count - 1);
                }
            }
            TypeData::Slice { .. } => {
                m.dst_type = StructDstType::Slice;
                m.unsized_field = Some(field_count - 1);
            }
            TypeData::TraitObject(_) => {
                m.dst_type = StructDstType::TraitObject;
                m.unsized_field = Some(field_count - 1);
            }
            _ => {}
        }
    }

    // Scalar-range attributes apply only to single-field wrappers of an
    // integer or pointer.
    let inner_is_scalar = match data {
        StructData::Tuple(fields) if fields.len() == 1 => match fields[0].item.data() {
            TypeData::Primitive(p) => p.is_int(),
            TypeData::Pointer { .. } => true,
            _ => false,
        },
        StructData::Named(fields) if fields.len() == 1 => match fields[0].1.item.data() {
            TypeData::Primitive(p) => p.is_int(),
            TypeData::Pointer { .. } => true,
            _ => false,
        },
        _ => false,
    };
    if inner_is_scalar {
        if let Some(a) = attrs.get("rustc_layout_scalar_valid_range_start") {
            if a.as_int() == Some(1) {
                m.is_nonzero = true;
            }
        }
        if attrs.has("rustc_nonnull_optimization_guaranteed") {
            m.is_nonzero = true;
        }
        if let Some(a) = attrs.get("rustc_layout_scalar_valid_range_end") {
            if let Some(v) = a.as_int() {
                m.bounded_max = Some(v);
            }
        }
    }
    m
}

fn lower_enum(
    ctx: &Ctx<'_>,
    module: &mut Module,
    sp: Span,
    item_path: &SimplePath,
    item: &ast::Item,
    def: &ast::EnumDef,
    publicity: Publicity,
) {
    let _guard = ctx.enter_item(item_path.clone());
    ctx.push_lifetimes(hir::GENERIC_GROUP_IMPL, def.generics.lifetimes.clone());
    let params = lower_generics(ctx, sp, &def.generics);

    let has_data = def
        .variants
        .iter()
        .any(|v| !matches!(v.kind, ast::VariantKind::Unit { .. }));

    let class = if has_data {
        // Each non-unit variant desugars into a synthetic sibling struct
        // `Enum#Variant`, so downstream passes see uniform struct paths.
        let mut variants = Vec::new();
        for v in &def.variants {
            let synth_name = IStr::new(&format!("{}#{}", item.name, v.name));
            let synth_path = item_path.parent().child(synth_name.clone());
            let (is_struct, data) = match &v.kind {
                ast::VariantKind::Unit { .. } => (false, StructData::Unit),
                ast::VariantKind::Tuple(tys) => (
                    false,
                    StructData::Tuple(
                        tys.iter()
                            .map(|t| {
                                VisEnt::new(Publicity::new_global(), lower_type(ctx, sp, t))
                            })
                            .collect(),
                    ),
                ),
                ast::VariantKind::Struct(fields) => (
                    true,
                    StructData::Named(
                        fields
                            .iter()
                            .map(|f| {
                                (
                                    f.name.clone(),
                                    VisEnt::new(
                                        Publicity::new_global(),
                                        lower_type(ctx, sp, &f.ty),
                                    ),
                                )
                            })
                            .collect(),
                    ),
                ),
            };
            let synth = Struct {
                params: params.clone(),
                repr: Repr::Rust,
                data,
                forced_alignment: None,
                max_field_alignment: None,
                markings: TraitMarkings::default(),
                struct_markings: StructMarkings::default(),
            };
            add_type_item(
                module,
                sp,
                synth_name,
                publicity.clone(),
                TypeItem::Struct(synth),
            );
            let ty = TypeRef::new_path(
                Path::Generic(GenericPath::new(
                    synth_path,
                    params.make_nop_params(hir::GENERIC_GROUP_IMPL),
                )),
                TypePathBinding::Struct,
            );
            variants.push(EnumDataVariant { name: v.name.clone(), is_struct, ty });
        }
        EnumClass::Data(variants)
    } else {
        let repr = enum_value_repr(&item.attrs);
        let mut next = 0u64;
        let mut variants = Vec::new();
        for v in &def.variants {
            let disc = match &v.kind {
                ast::VariantKind::Unit { disc } => disc,
                _ => unreachable!(),
            };
            let (expr, val) = match disc {
                Some(ast::Expr::IntLiteral { v, .. }) => (None, *v as u64),
                Some(other) => (
                    Some(std::sync::Arc::new(hir::UnevalConst::new(IStr::new(&format!(
                        "{}",
                        other
                    ))))),
                    next,
                ),
                None => (None, next),
            };
            next = val.wrapping_add(1);
            variants.push(EnumValueVariant { name: v.name.clone(), expr, val });
        }
        EnumClass::Value { repr, variants }
    };
    ctx.pop_lifetimes();

    let lowered = Enum { params, class, markings: TraitMarkings::default() };
    add_type_item(module, sp, item.name.clone(), publicity, TypeItem::Enum(lowered));
}

fn enum_value_repr(attrs: &ast::Attributes) -> EnumRepr {
    if let Some(ast::AttrValue::List(items)) = attrs.get("repr").map(|a| &a.value) {
        for ent in items {
            let r = match ent.name.as_str() {
                "u8" => EnumRepr::U8,
                "u16" => EnumRepr::U16,
                "u32" => EnumRepr::U32,
                "u64" => EnumRepr::U64,
                "usize" => EnumRepr::Usize,
                "i8" => EnumRepr::I8,
                "i16" => EnumRepr::I16,
                "i32" => EnumRepr::I32,
                "i64" => EnumRepr::I64,
                "isize" => EnumRepr::Isize,
                _ => continue,
            };
            return r;
        }
    }
    EnumRepr::Auto
}

fn lower_trait(
    ctx: &Ctx<'_>,
    module: &mut Module,
    sp: Span,
    item_path: &SimplePath,
    item: &ast::Item,
    def: &ast::TraitDef,
    publicity: Publicity,
) {
    let _outer = ctx.enter_item(item_path.clone());
    let _impl_guard = ctx.enter_impl(None, true);
    ctx.push_lifetimes(hir::GENERIC_GROUP_IMPL, def.generics.lifetimes.clone());

    let mut tr = Trait::new(lower_generics(ctx, sp, &def.generics));
    tr.is_marker = def.is_marker;
    tr.lifetime = match &def.lifetime {
        Some(lt) => crate::ty::lower_lifetime(ctx, Some(lt)),
        None => LifetimeRef::new_unknown(),
    };
    tr.parent_traits = def.supertraits.iter().map(|t| lower_trait_ref(ctx, sp, t)).collect();

    for sub in &def.items {
        let sub_sp = sub.span;
        match &sub.kind {
            ast::ItemKind::AssocType(aty) => {
                let mut trait_bounds = Vec::new();
                let mut is_sized = true;
                let mut lifetime_bound = LifetimeRef::new_unknown();
                for bound in &aty.bounds {
                    match bound {
                        ast::BoundAst::Trait { trait_, is_maybe, .. } => {
                            if *is_maybe {
                                if let ast::Binding::Trait(p) = &trait_.path.binding {
                                    if ctx.is_sized_family(p) {
                                        is_sized = false;
                                    }
                                }
                                continue;
                            }
                            trait_bounds.push(lower_trait_ref(ctx, sub_sp, trait_));
                        }
                        ast::BoundAst::TypeLifetime { lt, .. } => {
                            lifetime_bound = crate::ty::lower_lifetime(ctx, Some(lt));
                        }
                        _ => {}
                    }
                }
                // `impl Trait` in an associated-type default materialises as
                // this associated type.
                ctx.set_impl_trait_source(Some(ImplTraitSource {
                    path: item_path.child(sub.name.clone()),
                    params: tr.params.make_nop_params(hir::GENERIC_GROUP_IMPL),
                }));
                let default = aty.default.as_ref().map(|t| lower_type(ctx, sub_sp, t));
                ctx.set_impl_trait_source(None);
                tr.types.insert(
                    sub.name.clone(),
                    AssociatedType { is_sized, lifetime_bound, trait_bounds, default },
                );
            }
            ast::ItemKind::Function(fdef) => {
                let f = lower_function(
                    ctx,
                    sub_sp,
                    &item_path.child(sub.name.clone()),
                    sub,
                    fdef,
                    None,
                );
                tr.values.insert(sub.name.clone(), TraitValueItem::Function(f));
            }
            ast::ItemKind::Const(cdef) => {
                let c = lower_const(ctx, sub_sp, &item_path.child(sub.name.clone()), cdef);
                tr.values.insert(sub.name.clone(), TraitValueItem::Constant(c));
            }
            ast::ItemKind::Static(sdef) => {
                let s = lower_static(ctx, sub_sp, sub, sdef, false);
                tr.values.insert(sub.name.clone(), TraitValueItem::Static(s));
            }
            _ => base::fatal!(sub_sp, "item `{}` not allowed in a trait", sub.name),
        }
    }
    ctx.pop_lifetimes();
    add_type_item(module, sp, item.name.clone(), publicity, TypeItem::Trait(tr));
}

fn lower_impl(ctx: &Ctx<'_>, sp: Span, mod_path: &SimplePath, def: &ast::ImplDef) {
    ctx.push_lifetimes(hir::GENERIC_GROUP_IMPL, def.generics.lifetimes.clone());
    let params = lower_generics(ctx, sp, &def.generics);
    let self_ty = lower_type(ctx, sp, &def.ty);
    let _guard = ctx.enter_impl(Some(self_ty.clone()), false);

    match &def.trait_ {
        None => {
            let mut imp = TypeImpl {
                params,
                ty: self_ty,
                methods: Default::default(),
                constants: Default::default(),
                src_module: mod_path.clone(),
            };
            for sub in &def.items {
                let sub_sp = sub.span;
                let publicity = lower_publicity(ctx, &sub.vis);
                let is_specialisable = sub.attrs.has("default");
                match &sub.kind {
                    ast::ItemKind::Function(fdef) => {
                        let f = lower_function(
                            ctx,
                            sub_sp,
                            &mod_path.child(sub.name.clone()),
                            sub,
                            fdef,
                            None,
                        );
                        imp.methods.insert(
                            sub.name.clone(),
                            hir::VisImplEnt { publicity, is_specialisable, item: f },
                        );
                    }
                    ast::ItemKind::Const(cdef) => {
                        let c =
                            lower_const(ctx, sub_sp, &mod_path.child(sub.name.clone()), cdef);
                        imp.constants.insert(
                            sub.name.clone(),
                            hir::VisImplEnt { publicity, is_specialisable, item: c },
                        );
                    }
                    _ => base::fatal!(sub_sp, "item not allowed in an inherent impl"),
                }
            }
            ctx.type_impls.borrow_mut().push(imp);
        }
        Some(trait_ref) => {
            let tp = lower_trait_ref(ctx, sp, trait_ref);
            let trait_path = tp.path.path.clone();
            let trait_args = tp.path.params.clone();

            let trait_is_marker = ast_trait_is_marker(ctx, &trait_ref.path);
            if def.is_negative || (def.items.is_empty() && trait_is_marker) {
                ctx.marker_impls.borrow_mut().push((
                    trait_path,
                    MarkerImpl {
                        params,
                        trait_args,
                        is_positive: !def.is_negative,
                        ty: self_ty,
                    },
                ));
                ctx.pop_lifetimes();
                return;
            }

            let mut imp = TraitImpl {
                params,
                trait_args,
                ty: self_ty,
                methods: Default::default(),
                constants: Default::default(),
                statics: Default::default(),
                types: Default::default(),
                src_module: mod_path.clone(),
            };
            for sub in &def.items {
                let sub_sp = sub.span;
                let is_specialisable = sub.attrs.has("default");
                match &sub.kind {
                    ast::ItemKind::Function(fdef) => {
                        let f = lower_function(
                            ctx,
                            sub_sp,
                            &mod_path.child(sub.name.clone()),
                            sub,
                            fdef,
                            None,
                        );
                        imp.methods.insert(
                            sub.name.clone(),
                            hir::ImplEnt { is_specialisable, item: f },
                        );
                    }
                    ast::ItemKind::Const(cdef) => {
                        let c =
                            lower_const(ctx, sub_sp, &mod_path.child(sub.name.clone()), cdef);
                        imp.constants.insert(
                            sub.name.clone(),
                            hir::ImplEnt { is_specialisable, item: c },
                        );
                    }
                    ast::ItemKind::Static(sdef) => {
                        let s = lower_static(ctx, sub_sp, sub, sdef, false);
                        imp.statics.insert(
                            sub.name.clone(),
                            hir::ImplEnt { is_specialisable, item: s },
                        );
                    }
                    ast::ItemKind::TypeAlias(adef) => {
                        let ty = lower_type(ctx, sub_sp, &adef.ty);
                        imp.types.insert(
                            sub.name.clone(),
                            hir::ImplEnt { is_specialisable, item: ty },
                        );
                    }
                    _ => base::fatal!(sub_sp, "item not allowed in a trait impl"),
                }
            }
            ctx.trait_impls.borrow_mut().push((trait_path, imp));
        }
    }
    ctx.pop_lifetimes();
}

/// Is the named trait an auto (marker) trait? Looks at this crate's AST
/// first, then loaded dependencies.
fn ast_trait_is_marker(ctx: &Ctx<'_>, path: &ast::Path) -> bool {
    let target = match path.binding.target_path() {
        Some(p) => ctx.canonical(p),
        None => return false,
    };
    if target.crate_name == ctx.crate_name {
        fn find_in<'m>(m: &'m ast::Module, components: &[IStr]) -> Option<&'m ast::Item> {
            let (first, rest) = components.split_first()?;
            let item = m.items.iter().find(|i| &i.name == first)?;
            if rest.is_empty() {
                Some(item)
            } else {
                match &item.kind {
                    ast::ItemKind::Module(sub) => find_in(sub, rest),
                    _ => None,
                }
            }
        }
        match find_in(&ctx.ast.root_module, &target.components) {
            Some(ast::Item { kind: ast::ItemKind::Trait(t), .. }) => t.is_marker,
            _ => false,
        }
    } else {
        ctx.ast
            .ext_crate(&target.crate_name)
            .and_then(|hir_crate| hir_crate.get_trait_by_path(&target))
            .map_or(false, |t| t.is_marker)
    }
}

fn lower_function(
    ctx: &Ctx<'_>,
    sp: Span,
    item_path: &SimplePath,
    item: &ast::Item,
    def: &ast::FnDef,
    extern_abi: Option<&str>,
) -> Function {
    let _guard = ctx.enter_item(item_path.clone());
    ctx.push_lifetimes(hir::GENERIC_GROUP_METHOD, def.generics.lifetimes.clone());
    let params = lower_generics(ctx, sp, &def.generics);

    let args: Vec<(IStr, TypeRef)> = def
        .args
        .iter()
        .map(|(name, ty)| (name.clone(), lower_type(ctx, sp, ty)))
        .collect();

    let mut ret = match &def.ret {
        Some(t) => lower_type(ctx, sp, t),
        None => TypeRef::new_unit(),
    };
    if def.is_async {
        ret = desugar_async_return(ctx, sp, item_path, ret);
    }

    let receiver = match args.first() {
        Some((name, ty)) if &**name == "self" => classify_receiver(ctx, sp, ty),
        _ => Receiver::Free,
    };

    let linkage = lower_linkage(item);
    ctx.pop_lifetimes();
    Function {
        linkage,
        receiver,
        abi: IStr::new(def.abi.as_deref().or(extern_abi).unwrap_or("Rust")),
        is_unsafe: def.is_unsafe,
        is_const: def.is_const,
        is_variadic: def.is_variadic,
        params,
        args,
        ret,
        // Bodies stay with the front-end until MIR lowering runs.
        body: None,
    }
}

/// `async fn` keeps its written return type wrapped in the future the body
/// block will produce.
fn desugar_async_return(
    ctx: &Ctx<'_>,
    sp: Span,
    item_path: &SimplePath,
    ret: TypeRef,
) -> TypeRef {
    let future = match &ctx.lang_future {
        Some(p) => p.clone(),
        None => base::fatal!(sp, "`async fn` requires the `future_trait` lang item"),
    };
    let mut tp = TraitPath::new(GenericPath::from(future.clone()));
    tp.type_bounds.insert(
        IStr::new("Output"),
        hir::AtyEqual { source_trait: GenericPath::from(future), ty: ret },
    );
    TypeRef::new(TypeData::ErasedType(Box::new(ErasedTy {
        is_sized: true,
        traits: vec![tp],
        lifetimes: Vec::new(),
        inner: ErasedTypeInner::Fcn { path: Path::from(item_path.clone()), index: 0 },
    })))
}

/// Receiver classification: what shape of `self` does the first argument
/// take? `Custom` receivers must structurally reach `Self`.
fn classify_receiver(ctx: &Ctx<'_>, sp: Span, arg_ty: &TypeRef) -> Receiver {
    let is_self = |t: &TypeRef| {
        t.as_generic().map_or(false, |g| g.is_self())
            || Some(t) == ctx.self_ty.borrow().as_ref()
    };
    if is_self(arg_ty) {
        return Receiver::Value;
    }
    match arg_ty.data() {
        TypeData::Borrow { btype, inner, .. } if is_self(inner) => match btype {
            hir::BorrowType::Shared => Receiver::BorrowShared,
            hir::BorrowType::Unique => Receiver::BorrowUnique,
            hir::BorrowType::Owned => Receiver::BorrowOwned,
        },
        TypeData::Path { path: Path::Generic(gp), .. }
            if Some(&gp.path) == ctx.lang_box.as_ref()
                && gp.params.types.first().map_or(false, |t| is_self(t)) =>
        {
            Receiver::Box
        }
        _ => {
            // Arbitrary receiver: it must reach `Self` through paths,
            // borrows or pointers.
            let reaches = hir::visitor::visit_ty_with(arg_ty, &mut |t| is_self(t));
            if !reaches {
                base::fatal!(sp, "method receiver type {} does not reach `Self`", arg_ty);
            }
            Receiver::Custom
        }
    }
}

fn lower_linkage(item: &ast::Item) -> Linkage {
    if let Some(attr) = item.attrs.get("link_name") {
        if let Some(name) = attr.as_str() {
            return Linkage { name: IStr::new(name) };
        }
    }
    if item.attrs.has("no_mangle") || item.attrs.has("rustc_std_internal_symbol") {
        return Linkage { name: item.name.clone() };
    }
    Linkage::default()
}

fn lower_static(
    ctx: &Ctx<'_>,
    sp: Span,
    item: &ast::Item,
    def: &ast::StaticDef,
    _in_extern: bool,
) -> Static {
    Static {
        linkage: lower_linkage(item),
        is_mut: def.is_mut,
        ty: lower_type(ctx, sp, &def.ty),
        // The initialiser is evaluated by the constant evaluator later.
        value_res: None,
    }
}

fn lower_const(
    ctx: &Ctx<'_>,
    sp: Span,
    item_path: &SimplePath,
    def: &ast::ConstDef,
) -> Constant {
    let _guard = ctx.enter_item(item_path.clone());
    let params = lower_generics(ctx, sp, &def.generics);
    let value = def.expr.as_ref().map(|e| {
        std::sync::Arc::new(hir::UnevalConst::new(IStr::new(&format!("{}", e))))
    });
    let value_state =
        if params.is_empty() { ConstValueState::Unknown } else { ConstValueState::Generic };
    Constant { params, ty: lower_type(ctx, sp, &def.ty), value, value_res: None, value_state }
}
