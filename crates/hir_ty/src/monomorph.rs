//! Generic-parameter substitution.
//!
//! [`Monomorphiser`] is the substitution engine: implementers supply the
//! three parameter lookups and inherit the structural walk. The walk keeps
//! count of the higher-ranked binders currently in scope — a group-3
//! (`for<…>`) lifetime is left untouched while any binder is active, and
//! routed to [`Monomorphiser::get_lifetime`] otherwise. This is the only
//! place that rule lives.

use base::{Span, TargetSpec};
use hir::ty::{
    ArraySize, ConstGeneric, ErasedTypeInner, GenericRef, LifetimeRef, TypeData, TypePathBinding,
    TypeRef, UnevalConst, GENERIC_GROUP_HRB, GENERIC_GROUP_IMPL, GENERIC_GROUP_METHOD,
    GENERIC_GROUP_PLACEHOLDER,
};
use hir::{
    AtyBound, AtyEqual, GenericPath, Path, PathParams, PathUfcsInherent, PathUfcsKnown,
    PathUfcsUnknown, TraitPath,
};

pub trait Monomorphiser {
    fn get_type(&self, sp: Span, g: &GenericRef) -> TypeRef;
    fn get_value(&self, sp: Span, g: &GenericRef) -> ConstGeneric;
    fn get_lifetime(&self, sp: Span, g: &GenericRef) -> LifetimeRef;

    /// Evaluate a substituted array-size constant, when a constant evaluator
    /// is available. The default handles already-evaluated literals only.
    fn consteval_array_size(&self, _sp: Span, c: &ConstGeneric) -> Option<u64> {
        match c {
            ConstGeneric::Evaluated(lit) => Some(lit.read_usize(&TargetSpec::default(), 0)),
            _ => None,
        }
    }

    fn monomorph_type(&self, sp: Span, ty: &TypeRef, allow_infer: bool) -> TypeRef
    where
        Self: Sized,
    {
        monomorph_type_ext(self, sp, ty, allow_infer)
    }

    fn monomorph_path(&self, sp: Span, path: &Path, allow_infer: bool) -> Path
    where
        Self: Sized,
    {
        path_inner(self, sp, path, allow_infer, 0)
    }

    fn monomorph_genericpath(&self, sp: Span, path: &GenericPath, allow_infer: bool) -> GenericPath
    where
        Self: Sized,
    {
        genericpath_inner(self, sp, path, allow_infer, 0)
    }

    fn monomorph_traitpath(
        &self,
        sp: Span,
        path: &TraitPath,
        allow_infer: bool,
        ignore_hrls: bool,
    ) -> TraitPath
    where
        Self: Sized,
    {
        traitpath_inner(self, sp, path, allow_infer, ignore_hrls, 0)
    }

    fn monomorph_pathparams(&self, sp: Span, params: &PathParams, allow_infer: bool) -> PathParams
    where
        Self: Sized,
    {
        pathparams_inner(self, sp, params, allow_infer, 0)
    }

    fn monomorph_constgeneric(&self, sp: Span, c: &ConstGeneric) -> ConstGeneric
    where
        Self: Sized,
    {
        constgeneric_inner(self, sp, c, 0)
    }

    fn monomorph_arraysize(&self, sp: Span, size: &ArraySize) -> ArraySize
    where
        Self: Sized,
    {
        arraysize_inner(self, sp, size, 0)
    }

    fn monomorph_lifetime(&self, sp: Span, lt: LifetimeRef) -> LifetimeRef
    where
        Self: Sized,
    {
        lifetime_inner(self, sp, lt, 0)
    }
}

pub fn monomorph_type_ext<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    ty: &TypeRef,
    allow_infer: bool,
) -> TypeRef {
    type_inner(m, sp, ty, allow_infer, 0)
}

// `hrb` is the number of higher-ranked binders currently entered. Binders
// are pushed by trait paths carrying HRTBs and by function pointers carrying
// HRLs, and popped simply by the call returning.

fn lifetime_inner<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    lt: LifetimeRef,
    hrb: usize,
) -> LifetimeRef {
    match lt.as_generic() {
        Some(g) if g.group() == GENERIC_GROUP_HRB && hrb > 0 => lt,
        Some(g) => m.get_lifetime(sp, &g),
        None => lt,
    }
}

fn constgeneric_inner<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    c: &ConstGeneric,
    hrb: usize,
) -> ConstGeneric {
    match c {
        ConstGeneric::Infer => ConstGeneric::Infer,
        ConstGeneric::Generic(g) => m.get_value(sp, g),
        ConstGeneric::Unevaluated(uc) => {
            ConstGeneric::Unevaluated(std::sync::Arc::new(UnevalConst {
                expr: uc.expr.clone(),
                impl_params: pathparams_inner(m, sp, &uc.impl_params, true, hrb),
                method_params: pathparams_inner(m, sp, &uc.method_params, true, hrb),
            }))
        }
        ConstGeneric::Evaluated(lit) => ConstGeneric::Evaluated(lit.clone()),
    }
}

fn arraysize_inner<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    size: &ArraySize,
    hrb: usize,
) -> ArraySize {
    match size {
        ArraySize::Known(v) => ArraySize::Known(*v),
        ArraySize::Unevaluated(c) => {
            let c = constgeneric_inner(m, sp, c, hrb);
            match m.consteval_array_size(sp, &c) {
                Some(v) => ArraySize::Known(v),
                None => ArraySize::Unevaluated(c),
            }
        }
    }
}

fn pathparams_inner<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    params: &PathParams,
    allow_infer: bool,
    hrb: usize,
) -> PathParams {
    PathParams {
        lifetimes: params.lifetimes.iter().map(|lt| lifetime_inner(m, sp, *lt, hrb)).collect(),
        types: params.types.iter().map(|t| type_inner(m, sp, t, allow_infer, hrb)).collect(),
        values: params.values.iter().map(|v| constgeneric_inner(m, sp, v, hrb)).collect(),
    }
}

fn genericpath_inner<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    path: &GenericPath,
    allow_infer: bool,
    hrb: usize,
) -> GenericPath {
    GenericPath {
        path: path.path.clone(),
        params: pathparams_inner(m, sp, &path.params, allow_infer, hrb),
    }
}

fn traitpath_inner<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    path: &TraitPath,
    allow_infer: bool,
    ignore_hrls: bool,
    hrb: usize,
) -> TraitPath {
    let hrb = if path.hrtbs.is_some() && !ignore_hrls { hrb + 1 } else { hrb };
    TraitPath {
        hrtbs: path.hrtbs.clone(),
        path: genericpath_inner(m, sp, &path.path, allow_infer, hrb),
        type_bounds: path
            .type_bounds
            .iter()
            .map(|(name, aty)| {
                (
                    name.clone(),
                    AtyEqual {
                        source_trait: genericpath_inner(m, sp, &aty.source_trait, allow_infer, hrb),
                        ty: type_inner(m, sp, &aty.ty, allow_infer, hrb),
                    },
                )
            })
            .collect(),
        trait_bounds: path
            .trait_bounds
            .iter()
            .map(|(name, b)| {
                (
                    name.clone(),
                    AtyBound {
                        source_trait: genericpath_inner(m, sp, &b.source_trait, allow_infer, hrb),
                        traits: b
                            .traits
                            .iter()
                            .map(|t| traitpath_inner(m, sp, t, allow_infer, false, hrb))
                            .collect(),
                    },
                )
            })
            .collect(),
    }
}

fn path_inner<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    path: &Path,
    allow_infer: bool,
    hrb: usize,
) -> Path {
    match path {
        Path::Generic(p) => Path::Generic(genericpath_inner(m, sp, p, allow_infer, hrb)),
        Path::UfcsInherent(p) => Path::UfcsInherent(Box::new(PathUfcsInherent {
            ty: type_inner(m, sp, &p.ty, allow_infer, hrb),
            item: p.item.clone(),
            params: pathparams_inner(m, sp, &p.params, allow_infer, hrb),
            impl_params: pathparams_inner(m, sp, &p.impl_params, allow_infer, hrb),
        })),
        Path::UfcsKnown(p) => {
            let hrb = if p.hrtbs.is_some() { hrb + 1 } else { hrb };
            Path::UfcsKnown(Box::new(PathUfcsKnown {
                ty: type_inner(m, sp, &p.ty, allow_infer, hrb),
                trait_: genericpath_inner(m, sp, &p.trait_, allow_infer, hrb),
                item: p.item.clone(),
                params: pathparams_inner(m, sp, &p.params, allow_infer, hrb),
                hrtbs: p.hrtbs.clone(),
            }))
        }
        Path::UfcsUnknown(p) => Path::UfcsUnknown(Box::new(PathUfcsUnknown {
            ty: type_inner(m, sp, &p.ty, allow_infer, hrb),
            item: p.item.clone(),
            params: pathparams_inner(m, sp, &p.params, allow_infer, hrb),
        })),
    }
}

fn type_inner<M: Monomorphiser + ?Sized>(
    m: &M,
    sp: Span,
    ty: &TypeRef,
    allow_infer: bool,
    hrb: usize,
) -> TypeRef {
    match ty.data() {
        TypeData::Infer { .. } => {
            if !allow_infer {
                base::bug!(sp, "monomorph", "inference variable in substitution input: {}", ty);
            }
            ty.clone()
        }
        TypeData::Diverge | TypeData::Primitive(_) => ty.clone(),
        TypeData::Path { path, binding } => {
            // A substituted projection is no longer opaque: the defining
            // projection has been resolved away.
            let binding = match binding {
                TypePathBinding::Opaque => TypePathBinding::Unbound,
                b => *b,
            };
            TypeRef::new(TypeData::Path {
                path: path_inner(m, sp, path, allow_infer, hrb),
                binding,
            })
        }
        TypeData::Generic(g) => m.get_type(sp, g),
        TypeData::TraitObject(to) => {
            let inner_hrb = if to.trait_.hrtbs.is_some() { hrb + 1 } else { hrb };
            TypeRef::new(TypeData::TraitObject(Box::new(hir::TraitObjectTy {
                trait_: traitpath_inner(m, sp, &to.trait_, allow_infer, false, hrb),
                markers: to
                    .markers
                    .iter()
                    .map(|p| genericpath_inner(m, sp, p, allow_infer, inner_hrb))
                    .collect(),
                lifetime: lifetime_inner(m, sp, to.lifetime, hrb),
            })))
        }
        TypeData::ErasedType(e) => {
            let inner = match &e.inner {
                ErasedTypeInner::Fcn { path, index } => ErasedTypeInner::Fcn {
                    path: path_inner(m, sp, path, allow_infer, hrb),
                    index: *index,
                },
                ErasedTypeInner::Alias { path, params } => ErasedTypeInner::Alias {
                    path: path.clone(),
                    params: pathparams_inner(m, sp, params, allow_infer, hrb),
                },
                ErasedTypeInner::Known(t) => {
                    ErasedTypeInner::Known(type_inner(m, sp, t, allow_infer, hrb))
                }
            };
            TypeRef::new(TypeData::ErasedType(Box::new(hir::ErasedTy {
                is_sized: e.is_sized,
                traits: e
                    .traits
                    .iter()
                    .map(|t| traitpath_inner(m, sp, t, allow_infer, false, hrb))
                    .collect(),
                lifetimes: e.lifetimes.iter().map(|lt| lifetime_inner(m, sp, *lt, hrb)).collect(),
                inner,
            })))
        }
        TypeData::Array { inner, size } => TypeRef::new(TypeData::Array {
            inner: type_inner(m, sp, inner, allow_infer, hrb),
            size: arraysize_inner(m, sp, size, hrb),
        }),
        TypeData::Slice { inner } => {
            TypeRef::new_slice(type_inner(m, sp, inner, allow_infer, hrb))
        }
        TypeData::Tuple(types) => TypeRef::new_tuple(
            types.iter().map(|t| type_inner(m, sp, t, allow_infer, hrb)).collect(),
        ),
        TypeData::Borrow { btype, inner, lifetime } => TypeRef::new(TypeData::Borrow {
            btype: *btype,
            inner: type_inner(m, sp, inner, allow_infer, hrb),
            lifetime: lifetime_inner(m, sp, *lifetime, hrb),
        }),
        TypeData::Pointer { btype, inner } => {
            TypeRef::new_pointer(*btype, type_inner(m, sp, inner, allow_infer, hrb))
        }
        TypeData::NamedFunction { path, kind } => TypeRef::new(TypeData::NamedFunction {
            path: path_inner(m, sp, path, allow_infer, hrb),
            kind: *kind,
        }),
        TypeData::Function(ft) => {
            let hrb = if !ft.hrls.lifetimes.is_empty() { hrb + 1 } else { hrb };
            TypeRef::new(TypeData::Function(Box::new(hir::FnPtr {
                hrls: ft.hrls.clone(),
                is_unsafe: ft.is_unsafe,
                is_variadic: ft.is_variadic,
                abi: ft.abi.clone(),
                ret: type_inner(m, sp, &ft.ret, allow_infer, hrb),
                args: ft.args.iter().map(|t| type_inner(m, sp, t, allow_infer, hrb)).collect(),
            })))
        }
        TypeData::Closure(c) => TypeRef::new(TypeData::Closure(Box::new(hir::ClosureTy {
            node: c.node,
            class: c.class,
            ret: type_inner(m, sp, &c.ret, allow_infer, hrb),
            args: c.args.iter().map(|t| type_inner(m, sp, t, allow_infer, hrb)).collect(),
            is_copy: c.is_copy,
        }))),
        TypeData::Generator(g) => TypeRef::new(TypeData::Generator(Box::new(hir::GeneratorTy {
            node: g.node,
            yield_ty: type_inner(m, sp, &g.yield_ty, allow_infer, hrb),
            ret_ty: type_inner(m, sp, &g.ret_ty, allow_infer, hrb),
            resume_ty: type_inner(m, sp, &g.resume_ty, allow_infer, hrb),
        }))),
    }
}

// ---------------------------------------------------------------------------

/// Substitution source built from up to three parameter lists plus a `Self`
/// type: the impl's arguments, the method's, and any higher-ranked binder's.
///
/// This is both the convenience monomorphiser for callers holding resolved
/// parameters, and the state handed back by value-path resolution.
#[derive(Clone, Default)]
pub struct MonomorphState {
    pub self_ty: Option<TypeRef>,
    pub impl_params: Option<PathParams>,
    pub method_params: Option<PathParams>,
    pub hrb_params: Option<PathParams>,
}

impl MonomorphState {
    pub fn new_impl(self_ty: Option<TypeRef>, impl_params: PathParams) -> MonomorphState {
        MonomorphState {
            self_ty,
            impl_params: Some(impl_params),
            method_params: None,
            hrb_params: None,
        }
    }

    fn params_for(&self, group: u16) -> Option<&PathParams> {
        match group {
            GENERIC_GROUP_IMPL => self.impl_params.as_ref(),
            GENERIC_GROUP_METHOD => self.method_params.as_ref(),
            GENERIC_GROUP_HRB => self.hrb_params.as_ref(),
            _ => None,
        }
    }

    /// When no supplied set carries lifetimes, lifetime substitution is the
    /// identity — user-written lifetimes survive verbatim.
    fn lifetimes_are_identity(&self) -> bool {
        [&self.impl_params, &self.method_params, &self.hrb_params]
            .iter()
            .all(|p| p.as_ref().map_or(true, |p| p.lifetimes.is_empty()))
    }
}

impl Monomorphiser for MonomorphState {
    fn get_type(&self, sp: Span, g: &GenericRef) -> TypeRef {
        if g.is_self() {
            return match &self.self_ty {
                Some(t) => t.clone(),
                None => base::bug!(sp, "monomorph", "no Self type available for {}", g),
            };
        }
        if g.group() == GENERIC_GROUP_PLACEHOLDER {
            // Placeholders are owned by impl matching; pass them through.
            return TypeRef::new(TypeData::Generic(g.clone()));
        }
        match self.params_for(g.group()).and_then(|p| p.types.get(g.idx())) {
            Some(t) => t.clone(),
            None => base::bug!(sp, "monomorph", "type parameter {} not in state", g),
        }
    }

    fn get_value(&self, sp: Span, g: &GenericRef) -> ConstGeneric {
        if g.group() == GENERIC_GROUP_PLACEHOLDER {
            return ConstGeneric::Generic(g.clone());
        }
        match self.params_for(g.group()).and_then(|p| p.values.get(g.idx())) {
            Some(v) => v.clone(),
            None => base::bug!(sp, "monomorph", "value parameter {} not in state", g),
        }
    }

    fn get_lifetime(&self, sp: Span, g: &GenericRef) -> LifetimeRef {
        if self.lifetimes_are_identity() {
            return LifetimeRef { binding: g.binding as u32 };
        }
        match self.params_for(g.group()).and_then(|p| p.lifetimes.get(g.idx())) {
            Some(lt) => *lt,
            None => {
                log::trace!("{}: lifetime {} not in state, leaving as-is", sp, g);
                LifetimeRef { binding: g.binding as u32 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hir::ty::CoreType;
    use hir::GenericParams;
    use hir::TypeParamDef;
    use intern::IStr;

    fn t_param(name: &str, binding: u16) -> TypeRef {
        TypeRef::new_generic(IStr::new(name), binding)
    }

    #[test]
    fn substitutes_impl_params() {
        let sp = Span::default();
        let ms = MonomorphState::new_impl(
            None,
            PathParams::with_types(vec![CoreType::U32.into()]),
        );
        let tpl = TypeRef::new_slice(TypeRef::new_tuple(vec![t_param("T", 0x0000)]));
        let out = ms.monomorph_type(sp, &tpl, false);
        assert_eq!(
            out,
            TypeRef::new_slice(TypeRef::new_tuple(vec![CoreType::U32.into()]))
        );
    }

    #[test]
    fn identity_substitution_is_identity() {
        let sp = Span::default();
        let mut params = GenericParams::new();
        params.types.push(TypeParamDef::new(IStr::new("T")));
        params.types.push(TypeParamDef::new(IStr::new("U")));
        let ms = MonomorphState::new_impl(
            None,
            params.make_nop_params(hir::GENERIC_GROUP_IMPL),
        );
        let tpl = TypeRef::new_tuple(vec![
            t_param("T", 0x0000),
            TypeRef::new_slice(t_param("U", 0x0001)),
            CoreType::Bool.into(),
        ]);
        assert_eq!(ms.monomorph_type(sp, &tpl, false), tpl);
    }

    #[test]
    fn no_generics_means_no_work() {
        let tpl = TypeRef::new_tuple(vec![CoreType::U8.into()]);
        assert!(!hir::visitor::monomorphise_type_needed(&tpl));
        let ms = MonomorphState::default();
        // With nothing to substitute, the walk must still return an equal type.
        assert_eq!(ms.monomorph_type(Span::default(), &tpl, false), tpl);
    }

    #[test]
    fn hrb_lifetime_passes_through_under_binder() {
        // for<'a> fn(&'a u8) — the group-3 lifetime inside the fn-ptr binder
        // must survive even when the state would otherwise substitute it.
        let sp = Span::default();
        let mut hrls = GenericParams::new();
        hrls.lifetimes.push(hir::LifetimeDef { name: IStr::new("a") });
        let lt = LifetimeRef::new_param((GENERIC_GROUP_HRB << 8) as u16);
        let fn_ty = TypeRef::new(TypeData::Function(Box::new(hir::FnPtr {
            hrls,
            is_unsafe: false,
            is_variadic: false,
            abi: IStr::new("Rust"),
            ret: TypeRef::new_unit(),
            args: vec![TypeRef::new(TypeData::Borrow {
                btype: hir::BorrowType::Shared,
                inner: CoreType::U8.into(),
                lifetime: lt,
            })],
        })));
        let mut ms = MonomorphState::default();
        ms.hrb_params = Some(PathParams {
            lifetimes: vec![LifetimeRef::new_static()],
            types: vec![],
            values: vec![],
        });
        let out = ms.monomorph_type(sp, &fn_ty, false);
        assert_eq!(out, fn_ty);

        // Outside any binder the same reference is routed to get_lifetime.
        let bare = TypeRef::new(TypeData::Borrow {
            btype: hir::BorrowType::Shared,
            inner: CoreType::U8.into(),
            lifetime: lt,
        });
        let out = ms.monomorph_type(sp, &bare, false);
        match out.data() {
            TypeData::Borrow { lifetime, .. } => {
                assert_eq!(lifetime.binding, LifetimeRef::STATIC)
            }
            _ => unreachable!(),
        }
    }
}
