//! Lowering of source types, paths and generic parameter lists.

use base::Span;
use hir::ty::{
    ArraySize, BorrowType, ConstGeneric, ErasedTy, ErasedTypeInner, FnPtr, InferClass,
    LifetimeRef, TraitObjectTy, TypeData, TypePathBinding, TypeRef, UnevalConst,
};
use hir::{
    AtyBound, AtyEqual, GenericBound, GenericParams, GenericPath, LifetimeDef, Path, PathParams,
    PathUfcsInherent, PathUfcsKnown, SimplePath, TraitPath, TypeParamDef, ValueParamDef,
};
use intern::IStr;

use crate::Ctx;

pub(crate) fn lower_type(ctx: &Ctx<'_>, sp: Span, ty: &ast::Type) -> TypeRef {
    match ty {
        ast::Type::Infer => TypeRef::new_infer(InferClass::None),
        ast::Type::Never => TypeRef::new_diverge(),
        ast::Type::Primitive(core) => TypeRef::new_primitive(*core),
        ast::Type::Path(path) => lower_type_path(ctx, sp, path),
        ast::Type::Tuple(items) => {
            TypeRef::new_tuple(items.iter().map(|t| lower_type(ctx, sp, t)).collect())
        }
        ast::Type::Borrow { is_mut, lifetime, inner } => TypeRef::new(TypeData::Borrow {
            btype: if *is_mut { BorrowType::Unique } else { BorrowType::Shared },
            inner: lower_type(ctx, sp, inner),
            lifetime: lower_lifetime(ctx, lifetime.as_ref()),
        }),
        ast::Type::Pointer { is_mut, inner } => TypeRef::new_pointer(
            if *is_mut { BorrowType::Unique } else { BorrowType::Shared },
            lower_type(ctx, sp, inner),
        ),
        ast::Type::Array { inner, size } => {
            TypeRef::new_array(lower_type(ctx, sp, inner), lower_array_size(ctx, sp, size))
        }
        ast::Type::Slice(inner) => TypeRef::new_slice(lower_type(ctx, sp, inner)),
        ast::Type::Fn { hrls, is_unsafe, is_variadic, abi, args, ret } => {
            let mut hrl_params = GenericParams::new();
            for name in hrls {
                hrl_params.lifetimes.push(LifetimeDef { name: name.clone() });
            }
            TypeRef::new_fn(FnPtr {
                hrls: hrl_params,
                is_unsafe: *is_unsafe,
                is_variadic: *is_variadic,
                abi: IStr::new(abi.as_deref().unwrap_or("Rust")),
                ret: lower_type(ctx, sp, ret),
                args: args.iter().map(|t| lower_type(ctx, sp, t)).collect(),
            })
        }
        ast::Type::TraitObject { traits, lifetime } => {
            let mut it = traits.iter();
            let principal = match it.next() {
                Some(t) => lower_trait_ref(ctx, sp, t),
                None => base::fatal!(sp, "trait object with no principal trait"),
            };
            let markers = it
                .map(|t| {
                    let tp = lower_trait_ref(ctx, sp, t);
                    tp.path
                })
                .collect();
            TypeRef::new(TypeData::TraitObject(Box::new(TraitObjectTy {
                trait_: principal,
                markers,
                lifetime: lower_lifetime(ctx, lifetime.as_ref()),
            })))
        }
        ast::Type::ImplTrait { traits, lifetimes } => {
            let traits: Vec<TraitPath> =
                traits.iter().map(|t| lower_trait_ref(ctx, sp, t)).collect();
            let is_sized = !traits
                .iter()
                .any(|t| ctx.is_unsized_relaxation(&t.path.path));
            let inner = match ctx.impl_trait_source() {
                Some(src) => ErasedTypeInner::Alias { path: src.path, params: src.params },
                None => ErasedTypeInner::Fcn {
                    path: ctx.current_fn_path(sp),
                    index: ctx.next_erased_index(),
                },
            };
            TypeRef::new(TypeData::ErasedType(Box::new(ErasedTy {
                is_sized,
                traits,
                lifetimes: lifetimes
                    .iter()
                    .map(|l| lower_lifetime(ctx, Some(l)))
                    .collect(),
                inner,
            })))
        }
    }
}

pub(crate) fn lower_lifetime(ctx: &Ctx<'_>, lifetime: Option<&IStr>) -> LifetimeRef {
    match lifetime {
        None => LifetimeRef::new_unknown(),
        Some(name) if &**name == "static" => LifetimeRef::new_static(),
        Some(name) => match ctx.lookup_lifetime(name) {
            Some(binding) => LifetimeRef::new_param(binding),
            None => LifetimeRef::new_unknown(),
        },
    }
}

/// Array sizes: literal integers collapse immediately, bare value-parameter
/// references become generic sizes, everything else stays unevaluated for
/// the constant evaluator.
pub(crate) fn lower_array_size(ctx: &Ctx<'_>, sp: Span, expr: &ast::Expr) -> ArraySize {
    match expr {
        ast::Expr::IntLiteral { v, suffix } => {
            let plain = match suffix {
                None => true,
                Some(s) => &**s == "usize",
            };
            if plain {
                if *v > u64::MAX as u128 {
                    base::fatal!(sp, "array size literal {} overflows", v);
                }
                ArraySize::Known(*v as u64)
            } else {
                base::fatal!(sp, "array size literal with non-usize suffix");
            }
        }
        ast::Expr::NamedValue(path) => match &path.binding {
            ast::Binding::ValueParam { binding } => {
                let name = path.last_ident().cloned().unwrap_or_default();
                ArraySize::Unevaluated(ConstGeneric::Generic(hir::GenericRef::new(
                    name, *binding,
                )))
            }
            _ => {
                // A named constant: keep its canonical path for the
                // evaluator.
                let lowered = lower_value_path(ctx, sp, path);
                ArraySize::Unevaluated(ConstGeneric::Unevaluated(std::sync::Arc::new(
                    UnevalConst::new(IStr::new(&format!("{}", lowered))),
                )))
            }
        },
        ast::Expr::Opaque(text) => ArraySize::Unevaluated(ConstGeneric::Unevaluated(
            std::sync::Arc::new(UnevalConst::new(IStr::new(text))),
        )),
    }
}

fn lower_path_args(ctx: &Ctx<'_>, sp: Span, args: &ast::PathArgs) -> PathParams {
    PathParams {
        lifetimes: args.lifetimes.iter().map(|l| lower_lifetime(ctx, Some(l))).collect(),
        types: args.types.iter().map(|t| lower_type(ctx, sp, t)).collect(),
        values: args
            .consts
            .iter()
            .map(|e| match lower_array_size(ctx, sp, e) {
                ArraySize::Known(v) => {
                    let mut lit = hir::EncodedLiteral::new_zeroed(8);
                    lit.write_uint(&Default::default(), 0, 8, v as u128);
                    ConstGeneric::Evaluated(std::sync::Arc::new(lit))
                }
                ArraySize::Unevaluated(c) => c,
            })
            .collect(),
    }
}

/// A resolved path in type position.
pub(crate) fn lower_type_path(ctx: &Ctx<'_>, sp: Span, path: &ast::Path) -> TypeRef {
    use ast::Binding;
    match &path.binding {
        Binding::Unbound => {
            base::fatal!(sp, "unbound path `{}` reached lowering", path)
        }
        Binding::Primitive(core) => TypeRef::new_primitive(*core),
        Binding::TypeParam { binding } => {
            let name = path.last_ident().cloned().unwrap_or_default();
            if &*name == "Self" {
                ctx.self_type(sp)
            } else {
                TypeRef::new_generic(name, *binding)
            }
        }
        Binding::Struct(target) => nominal(ctx, sp, path, target, TypePathBinding::Struct),
        Binding::Enum(target) => nominal(ctx, sp, path, target, TypePathBinding::Enum),
        Binding::Union(target) => nominal(ctx, sp, path, target, TypePathBinding::Union),
        Binding::ExternType(target) => {
            nominal(ctx, sp, path, target, TypePathBinding::ExternType)
        }
        Binding::TypeAlias(target) => {
            // Alias expansion happens in a later pass; carry the reference.
            nominal(ctx, sp, path, target, TypePathBinding::Unbound)
        }
        Binding::Trait(_) | Binding::TraitAlias(_) => {
            base::fatal!(sp, "trait `{}` used in type position", path)
        }
        Binding::EnumVariant { .. }
        | Binding::Function(_)
        | Binding::Static(_)
        | Binding::Constant(_)
        | Binding::StructValue(_)
        | Binding::Macro(_) => {
            base::fatal!(sp, "value-namespace path `{}` used in type position", path)
        }
        Binding::Module(_) => {
            base::fatal!(sp, "module path `{}` used in type position", path)
        }
        Binding::ValueParam { .. } => {
            base::fatal!(sp, "const parameter `{}` used in type position", path)
        }
    }
}

fn nominal(
    ctx: &Ctx<'_>,
    sp: Span,
    path: &ast::Path,
    target: &SimplePath,
    binding: TypePathBinding,
) -> TypeRef {
    let params = last_args(ctx, sp, path);
    TypeRef::new_path(
        Path::Generic(GenericPath::new(ctx.canonical(target), params)),
        binding,
    )
}

fn last_args(ctx: &Ctx<'_>, sp: Span, path: &ast::Path) -> PathParams {
    match path.nodes().iter().rev().find(|n| !n.args.is_empty()) {
        Some(node) => lower_path_args(ctx, sp, &node.args),
        None => PathParams::new(),
    }
}

/// A resolved path in value/expression position.
pub(crate) fn lower_value_path(ctx: &Ctx<'_>, sp: Span, path: &ast::Path) -> Path {
    use ast::Binding;
    if let ast::PathClass::Ufcs { ty, trait_, nodes } = &path.class {
        let item = match nodes.last() {
            Some(n) => n.name.clone(),
            None => base::fatal!(sp, "UFCS path with no item"),
        };
        let params = last_args(ctx, sp, path);
        let ty = lower_type(ctx, sp, ty);
        return match trait_ {
            Some(trait_path) => {
                let tp = lower_trait_path_ref(ctx, sp, trait_path);
                Path::UfcsKnown(Box::new(PathUfcsKnown {
                    ty,
                    trait_: tp,
                    item,
                    params,
                    hrtbs: None,
                }))
            }
            None => Path::UfcsInherent(Box::new(PathUfcsInherent {
                ty,
                item,
                params,
                impl_params: PathParams::new(),
            })),
        };
    }
    match &path.binding {
        Binding::EnumVariant { path: enum_path, idx } => {
            let variant_name = path.last_ident().cloned().unwrap_or_default();
            let _ = idx;
            let params = last_args(ctx, sp, path);
            Path::Generic(GenericPath::new(
                ctx.canonical(enum_path).child(variant_name),
                params,
            ))
        }
        _ => match path.binding.target_path() {
            Some(target) => {
                Path::Generic(GenericPath::new(ctx.canonical(target), last_args(ctx, sp, path)))
            }
            None => base::fatal!(sp, "unresolvable value path `{}`", path),
        },
    }
}

/// Trait reference in bound or impl-header position.
pub(crate) fn lower_trait_ref(ctx: &Ctx<'_>, sp: Span, tr: &ast::TraitRef) -> TraitPath {
    let mut tp = TraitPath::new(lower_trait_path_ref(ctx, sp, &tr.path));
    if !tr.hrls.is_empty() {
        let mut hrtbs = GenericParams::new();
        for name in &tr.hrls {
            hrtbs.lifetimes.push(LifetimeDef { name: name.clone() });
        }
        tp.hrtbs = Some(Box::new(hrtbs));
    }
    // Associated-type bindings written on the final segment.
    if let Some(node) = tr.path.nodes().last() {
        for (name, ty) in &node.args.bindings {
            tp.type_bounds.insert(
                name.clone(),
                AtyEqual {
                    source_trait: tp.path.clone(),
                    ty: lower_type(ctx, sp, ty),
                },
            );
        }
        for (name, bounds) in &node.args.assoc_bounds {
            tp.trait_bounds.insert(
                name.clone(),
                AtyBound {
                    source_trait: tp.path.clone(),
                    traits: bounds.iter().map(|b| lower_trait_ref(ctx, sp, b)).collect(),
                },
            );
        }
    }
    tp
}

fn lower_trait_path_ref(ctx: &Ctx<'_>, sp: Span, path: &ast::Path) -> GenericPath {
    let target = match &path.binding {
        ast::Binding::Trait(p) | ast::Binding::TraitAlias(p) => p,
        _ => base::fatal!(sp, "`{}` is not a trait", path),
    };
    GenericPath::new(ctx.canonical(target), last_args(ctx, sp, path))
}

/// One `<…>` list plus `where` clauses. Parameter binding words were
/// assigned by name resolution; only shapes are translated here.
pub(crate) fn lower_generics(ctx: &Ctx<'_>, sp: Span, def: &ast::GenericsDef) -> GenericParams {
    let mut rv = GenericParams::new();
    for lt in &def.lifetimes {
        rv.lifetimes.push(LifetimeDef { name: lt.clone() });
    }
    for tp in &def.types {
        rv.types.push(TypeParamDef {
            name: tp.name.clone(),
            default: tp.default.as_ref().map(|t| lower_type(ctx, sp, t)),
            is_sized: true,
        });
    }
    for cp in &def.consts {
        rv.values.push(ValueParamDef {
            name: cp.name.clone(),
            ty: lower_type(ctx, sp, &cp.ty),
        });
    }
    for bound in &def.bounds {
        match bound {
            ast::BoundAst::Lifetime { lt, outlives } => {
                let test = lower_lifetime(ctx, Some(lt));
                let valid_for = lower_lifetime(ctx, Some(outlives));
                rv.bounds.push(GenericBound::Lifetime { test, valid_for });
            }
            ast::BoundAst::TypeLifetime { ty, lt } => {
                rv.bounds.push(GenericBound::TypeLifetime {
                    ty: lower_type(ctx, sp, ty),
                    valid_for: lower_lifetime(ctx, Some(lt)),
                });
            }
            ast::BoundAst::Trait { hrls, ty, trait_, is_maybe } => {
                if *is_maybe {
                    // `?Sized` (and its newer spellings) relax the implicit
                    // sized default on the named parameter; all other maybe
                    // bounds are ignored.
                    if let ast::Binding::Trait(p) = &trait_.path.binding {
                        if ctx.is_sized_family(p) {
                            if let ast::Type::Path(tp) = ty {
                                if let Some(name) = tp.last_ident() {
                                    if let Some(def) =
                                        rv.types.iter_mut().find(|d| &d.name == name)
                                    {
                                        def.is_sized = false;
                                    }
                                }
                            }
                        }
                    }
                    continue;
                }
                let mut tpath = lower_trait_ref(ctx, sp, trait_);
                if !hrls.is_empty() && tpath.hrtbs.is_none() {
                    let mut hrtbs = GenericParams::new();
                    for name in hrls {
                        hrtbs.lifetimes.push(LifetimeDef { name: name.clone() });
                    }
                    tpath.hrtbs = Some(Box::new(hrtbs));
                }
                rv.bounds.push(GenericBound::TraitBound {
                    hrtbs: tpath.hrtbs.clone(),
                    ty: lower_type(ctx, sp, ty),
                    trait_: tpath,
                });
            }
            ast::BoundAst::Equality { ty, val } => {
                rv.bounds.push(GenericBound::TypeEquality {
                    ty: lower_type(ctx, sp, ty),
                    other_ty: lower_type(ctx, sp, val),
                });
            }
        }
    }
    rv
}
