//! Structural walks over types and paths, shared by the resolver and the
//! metadata codec, plus the `monomorphise_*_needed` predicates built on them.
//!
//! The callback returns `true` to stop the walk; each `visit_*_with` returns
//! whether any callback did.

use crate::generics::{GenericBound, GenericParams};
use crate::path::{GenericPath, Path, PathParams, TraitPath};
use crate::ty::{ConstGeneric, ErasedTypeInner, TypeData, TypeRef};

pub fn visit_ty_with(ty: &TypeRef, cb: &mut impl FnMut(&TypeRef) -> bool) -> bool {
    if cb(ty) {
        return true;
    }
    match ty.data() {
        TypeData::Infer { .. }
        | TypeData::Diverge
        | TypeData::Primitive(_)
        | TypeData::Generic(_) => false,
        TypeData::Path { path, .. } => visit_path_with(path, cb),
        TypeData::TraitObject(to) => {
            if visit_trait_path_with(&to.trait_, cb) {
                return true;
            }
            to.markers.iter().any(|m| visit_genericpath_with(m, cb))
        }
        TypeData::ErasedType(e) => {
            if e.traits.iter().any(|t| visit_trait_path_with(t, cb)) {
                return true;
            }
            match &e.inner {
                ErasedTypeInner::Fcn { path, .. } => visit_path_with(path, cb),
                ErasedTypeInner::Alias { params, .. } => visit_path_params_with(params, cb),
                ErasedTypeInner::Known(inner) => visit_ty_with(inner, cb),
            }
        }
        TypeData::Array { inner, .. } => visit_ty_with(inner, cb),
        TypeData::Slice { inner } => visit_ty_with(inner, cb),
        TypeData::Tuple(types) => types.iter().any(|t| visit_ty_with(t, cb)),
        TypeData::Borrow { inner, .. } => visit_ty_with(inner, cb),
        TypeData::Pointer { inner, .. } => visit_ty_with(inner, cb),
        TypeData::NamedFunction { path, .. } => visit_path_with(path, cb),
        TypeData::Function(ft) => {
            if visit_ty_with(&ft.ret, cb) {
                return true;
            }
            ft.args.iter().any(|t| visit_ty_with(t, cb))
        }
        TypeData::Closure(c) => {
            if visit_ty_with(&c.ret, cb) {
                return true;
            }
            c.args.iter().any(|t| visit_ty_with(t, cb))
        }
        TypeData::Generator(g) => {
            visit_ty_with(&g.yield_ty, cb)
                || visit_ty_with(&g.ret_ty, cb)
                || visit_ty_with(&g.resume_ty, cb)
        }
    }
}

pub fn visit_path_params_with(params: &PathParams, cb: &mut impl FnMut(&TypeRef) -> bool) -> bool {
    params.types.iter().any(|t| visit_ty_with(t, cb))
}

pub fn visit_genericpath_with(path: &GenericPath, cb: &mut impl FnMut(&TypeRef) -> bool) -> bool {
    visit_path_params_with(&path.params, cb)
}

pub fn visit_trait_path_with(path: &TraitPath, cb: &mut impl FnMut(&TypeRef) -> bool) -> bool {
    if visit_genericpath_with(&path.path, cb) {
        return true;
    }
    if path.type_bounds.values().any(|aty| visit_ty_with(&aty.ty, cb)) {
        return true;
    }
    path.trait_bounds
        .values()
        .any(|b| b.traits.iter().any(|t| visit_trait_path_with(t, cb)))
}

pub fn visit_path_with(path: &Path, cb: &mut impl FnMut(&TypeRef) -> bool) -> bool {
    match path {
        Path::Generic(p) => visit_genericpath_with(p, cb),
        Path::UfcsInherent(p) => {
            visit_ty_with(&p.ty, cb)
                || visit_path_params_with(&p.params, cb)
                || visit_path_params_with(&p.impl_params, cb)
        }
        Path::UfcsKnown(p) => {
            visit_ty_with(&p.ty, cb)
                || visit_genericpath_with(&p.trait_, cb)
                || visit_path_params_with(&p.params, cb)
        }
        Path::UfcsUnknown(p) => visit_ty_with(&p.ty, cb) || visit_path_params_with(&p.params, cb),
    }
}

pub fn visit_generic_params_with(
    params: &GenericParams,
    cb: &mut impl FnMut(&TypeRef) -> bool,
) -> bool {
    if params.types.iter().any(|d| d.default.as_ref().map_or(false, |t| visit_ty_with(t, cb))) {
        return true;
    }
    if params.values.iter().any(|d| visit_ty_with(&d.ty, cb)) {
        return true;
    }
    params.bounds.iter().any(|b| match b {
        GenericBound::Lifetime { .. } => false,
        GenericBound::TypeLifetime { ty, .. } => visit_ty_with(ty, cb),
        GenericBound::TraitBound { ty, trait_, .. } => {
            visit_ty_with(ty, cb) || visit_trait_path_with(trait_, cb)
        }
        GenericBound::TypeEquality { ty, other_ty } => {
            visit_ty_with(ty, cb) || visit_ty_with(other_ty, cb)
        }
    })
}

/// Does the node reference a generic parameter (type, value or `Self`)?
fn ty_is_or_has_generic(ty: &TypeRef) -> bool {
    match ty.data() {
        TypeData::Generic(_) => true,
        TypeData::Array { size: crate::ty::ArraySize::Unevaluated(c), .. } => {
            constgeneric_needs_monomorph(c)
        }
        _ => false,
    }
}

fn constgeneric_needs_monomorph(c: &ConstGeneric) -> bool {
    match c {
        ConstGeneric::Generic(_) => true,
        ConstGeneric::Unevaluated(_) => true,
        ConstGeneric::Infer | ConstGeneric::Evaluated(_) => false,
    }
}

/// `true` when substituting generics into the type could change it.
pub fn monomorphise_type_needed(ty: &TypeRef) -> bool {
    visit_ty_with(ty, &mut ty_is_or_has_generic)
}

pub fn monomorphise_pathparams_needed(params: &PathParams) -> bool {
    params.values.iter().any(constgeneric_needs_monomorph)
        || visit_path_params_with(params, &mut ty_is_or_has_generic)
}

pub fn monomorphise_genericpath_needed(path: &GenericPath) -> bool {
    monomorphise_pathparams_needed(&path.params)
}

pub fn monomorphise_traitpath_needed(path: &TraitPath) -> bool {
    visit_trait_path_with(path, &mut ty_is_or_has_generic)
}

pub fn monomorphise_path_needed(path: &Path) -> bool {
    visit_path_with(path, &mut ty_is_or_has_generic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::CoreType;
    use intern::IStr;

    #[test]
    fn concrete_types_need_no_substitution() {
        let ty = TypeRef::new_tuple(vec![
            CoreType::U32.into(),
            TypeRef::new_slice(CoreType::U8.into()),
        ]);
        assert!(!monomorphise_type_needed(&ty));
    }

    #[test]
    fn generic_occurrence_is_found_at_depth() {
        let ty = TypeRef::new_slice(TypeRef::new_tuple(vec![TypeRef::new_generic(
            IStr::new("T"),
            0x0000,
        )]));
        assert!(monomorphise_type_needed(&ty));
        assert!(monomorphise_type_needed(&TypeRef::new_self()));
    }
}
