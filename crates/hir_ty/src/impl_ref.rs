//! [`ImplRef`]: what `find_impl` hands to its callback — either a matched
//! crate-level impl with the parameters discovered for it, or a bound taken
//! from the environment / a trait object / a built-in.

use std::collections::BTreeMap;

use base::Span;
use hir::{AtyEqual, Crate, PathParams, SimplePath, TraitImpl, TypeRef};
use intern::IStr;

use crate::monomorph::{Monomorphiser, MonomorphState};

pub type AtyMap = BTreeMap<IStr, AtyEqual>;

pub enum ImplRef<'a> {
    /// A `TraitImpl` from some crate, with `impl_params` resolved against the
    /// queried type.
    Impl { impl_params: PathParams, trait_path: SimplePath, imp: &'a TraitImpl },
    /// A bound: the environment, a trait object's principal/markers, an
    /// erased type, or one of the built-in trait families. Everything is
    /// already concrete.
    Bound { ty: TypeRef, trait_args: PathParams, assoc: AtyMap },
}

impl<'a> ImplRef<'a> {
    pub fn new_bound(ty: &TypeRef, trait_args: Option<&PathParams>) -> ImplRef<'a> {
        ImplRef::Bound {
            ty: ty.clone(),
            trait_args: trait_args.cloned().unwrap_or_default(),
            assoc: AtyMap::new(),
        }
    }

    pub fn new_bound_with(
        ty: &TypeRef,
        trait_args: Option<&PathParams>,
        assoc: AtyMap,
    ) -> ImplRef<'a> {
        ImplRef::Bound {
            ty: ty.clone(),
            trait_args: trait_args.cloned().unwrap_or_default(),
            assoc,
        }
    }

    fn state(&self) -> MonomorphState {
        match self {
            ImplRef::Impl { impl_params, .. } => {
                MonomorphState::new_impl(None, impl_params.clone())
            }
            ImplRef::Bound { .. } => MonomorphState::default(),
        }
    }

    /// The implementing type, with impl parameters substituted.
    pub fn get_impl_type(&self, sp: Span) -> TypeRef {
        match self {
            ImplRef::Impl { imp, .. } => self.state().monomorph_type(sp, &imp.ty, true),
            ImplRef::Bound { ty, .. } => ty.clone(),
        }
    }

    /// The trait arguments, with impl parameters substituted.
    pub fn get_trait_params(&self, sp: Span) -> PathParams {
        match self {
            ImplRef::Impl { imp, .. } => {
                self.state().monomorph_pathparams(sp, &imp.trait_args, true)
            }
            ImplRef::Bound { trait_args, .. } => trait_args.clone(),
        }
    }

    /// The value bound to associated type `name`, if this impl provides one.
    pub fn get_type(&self, sp: Span, name: &str) -> Option<TypeRef> {
        match self {
            ImplRef::Impl { imp, .. } => {
                let ent = imp.types.get(name)?;
                Some(self.state().monomorph_type(sp, &ent.item, true))
            }
            ImplRef::Bound { assoc, .. } => assoc.get(name).map(|aty| aty.ty.clone()),
        }
    }

    /// Is the associated type `name` declared `default` (specialisable)?
    pub fn type_is_specialisable(&self, name: &str) -> bool {
        match self {
            ImplRef::Impl { imp, .. } => {
                imp.types.get(name).map_or(false, |ent| ent.is_specialisable)
            }
            ImplRef::Bound { .. } => false,
        }
    }

    /// Specialisation ordering against another candidate, for best-impl
    /// tracking. Bounds never participate.
    pub fn more_specific_than(&self, krate: &Crate, other: &Option<ImplRef<'_>>) -> bool {
        match (self, other) {
            (_, None) => true,
            (ImplRef::Impl { imp: a, .. }, Some(ImplRef::Impl { imp: b, .. })) => {
                crate::specialise::more_specific_than(krate, a, b)
            }
            (ImplRef::Impl { .. }, Some(ImplRef::Bound { .. })) => true,
            (ImplRef::Bound { .. }, Some(_)) => false,
        }
    }
}

impl<'a> std::fmt::Debug for ImplRef<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImplRef::Impl { impl_params, trait_path, imp } => {
                write!(f, "impl{:?} {}{} for {}", impl_params, trait_path, imp.trait_args, imp.ty)
            }
            ImplRef::Bound { ty, trait_args, assoc } => {
                write!(f, "bound {}{:?} ({} atys)", ty, trait_args, assoc.len())
            }
        }
    }
}
