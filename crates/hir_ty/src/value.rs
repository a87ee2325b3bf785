//! Value-path resolution: mapping a `Path` in value position to its
//! definition, together with the substitution state needed to use it.

use base::Span;
use hir::ty::{TypeData, TypeRef};
use hir::{Compare, Path, PathParams, SimplePath, TypeItem, ValueItem};

use crate::impl_ref::ImplRef;
use crate::monomorph::MonomorphState;
use crate::resolve::StaticTraitResolve;
use crate::unify;

/// Outcome of [`StaticTraitResolve::get_value`].
pub enum ValuePtr<'a> {
    NotFound,
    /// Resolution depends on generics that are still abstract here.
    NotYetKnown,
    Function(&'a hir::Function),
    Static(&'a hir::Static),
    Constant(&'a hir::Constant),
    StructConstant { path: SimplePath, def: &'a hir::Struct },
    StructConstructor { path: SimplePath, def: &'a hir::Struct },
    EnumConstructor { enm: &'a hir::Enum, idx: usize },
    EnumValue { enm: &'a hir::Enum, idx: usize },
}

impl<'a> ValuePtr<'a> {
    pub fn is_found(&self) -> bool {
        !matches!(self, ValuePtr::NotFound | ValuePtr::NotYetKnown)
    }
}

impl<'a> StaticTraitResolve<'a> {
    /// Resolve a value path to its definition. `out_params` receives the
    /// substitution (self type, impl params, method params) under which the
    /// definition's signature is valid.
    pub fn get_value(
        &self,
        sp: Span,
        path: &Path,
        out_params: &mut MonomorphState,
        signature_only: bool,
    ) -> ValuePtr<'a> {
        log::trace!("get_value({})", path);
        match path {
            Path::Generic(gp) => self.get_value_generic(sp, &gp.path, &gp.params, out_params),
            Path::UfcsKnown(pe) => {
                self.get_value_ufcs_known(sp, path, pe, out_params, signature_only)
            }
            Path::UfcsInherent(pe) => self.get_value_ufcs_inherent(sp, pe, out_params),
            Path::UfcsUnknown(_) => {
                base::bug!(sp, "resolver", "UfcsUnknown in get_value: {}", path)
            }
        }
    }

    fn get_value_generic(
        &self,
        sp: Span,
        path: &SimplePath,
        params: &PathParams,
        out_params: &mut MonomorphState,
    ) -> ValuePtr<'a> {
        // Enum variant: second-to-last component names the enum.
        if path.components.len() >= 2 {
            let enum_path = path.parent();
            if let Some(TypeItem::Enum(enm)) = self.krate.get_typeitem_by_path(&enum_path) {
                if let Some(idx) = enm.find_variant(path.last()) {
                    out_params.impl_params = Some(params.clone());
                    return match &enm.class {
                        // Struct-like variants are not values.
                        hir::EnumClass::Data(variants) if variants[idx].is_struct => {
                            ValuePtr::NotFound
                        }
                        hir::EnumClass::Data(_) => ValuePtr::EnumConstructor { enm, idx },
                        hir::EnumClass::Value { .. } => ValuePtr::EnumValue { enm, idx },
                    };
                }
            }
        }
        match self.krate.get_valitem_by_path(path) {
            Some(ValueItem::Function(f)) => {
                out_params.method_params = Some(params.clone());
                ValuePtr::Function(f)
            }
            Some(ValueItem::Static(s)) => ValuePtr::Static(s),
            Some(ValueItem::Constant(c)) => {
                out_params.method_params = Some(params.clone());
                ValuePtr::Constant(c)
            }
            Some(ValueItem::StructConstant(sc)) => {
                match self.krate.get_struct_by_path(&sc.ty) {
                    Some(def) => {
                        out_params.impl_params = Some(params.clone());
                        ValuePtr::StructConstant { path: sc.ty.clone(), def }
                    }
                    None => ValuePtr::NotFound,
                }
            }
            Some(ValueItem::StructConstructor(sc)) => {
                match self.krate.get_struct_by_path(&sc.ty) {
                    Some(def) => {
                        out_params.impl_params = Some(params.clone());
                        ValuePtr::StructConstructor { path: sc.ty.clone(), def }
                    }
                    None => ValuePtr::NotFound,
                }
            }
            Some(ValueItem::Import(_)) => {
                base::bug!(sp, "resolver", "unnormalised import reached get_value: {}", path)
            }
            None => ValuePtr::NotFound,
        }
    }

    fn get_value_ufcs_known(
        &self,
        sp: Span,
        full_path: &Path,
        pe: &hir::PathUfcsKnown,
        out_params: &mut MonomorphState,
        _signature_only: bool,
    ) -> ValuePtr<'a> {
        let trait_def = match self.krate.get_trait_by_path(&pe.trait_.path) {
            Some(t) => t,
            None => base::bug!(sp, "resolver", "trait {} not found for {}", pe.trait_, full_path),
        };

        let mut rv = ValuePtr::NotFound;
        let found = self.find_impl(
            sp,
            &pe.trait_.path,
            Some(&pe.trait_.params),
            &pe.ty,
            &mut |ir, fuzzy| {
                if fuzzy {
                    return false;
                }
                match &ir {
                    ImplRef::Impl { impl_params, imp, .. } => {
                        if let Some(ent) = imp.methods.get(&pe.item) {
                            out_params.self_ty = Some(pe.ty.clone());
                            out_params.impl_params = Some(impl_params.clone());
                            out_params.method_params = Some(pe.params.clone());
                            rv = ValuePtr::Function(&ent.item);
                            return true;
                        }
                        if let Some(ent) = imp.constants.get(&pe.item) {
                            out_params.self_ty = Some(pe.ty.clone());
                            out_params.impl_params = Some(impl_params.clone());
                            rv = ValuePtr::Constant(&ent.item);
                            return true;
                        }
                        if let Some(ent) = imp.statics.get(&pe.item) {
                            out_params.self_ty = Some(pe.ty.clone());
                            out_params.impl_params = Some(impl_params.clone());
                            rv = ValuePtr::Static(&ent.item);
                            return true;
                        }
                        // Not in the impl: fall back to the trait default.
                        false
                    }
                    ImplRef::Bound { .. } => false,
                }
            },
            false,
        );
        if found {
            return rv;
        }

        // Trait-provided default bodies.
        if let Some(item) = trait_def.values.get(&pe.item) {
            out_params.self_ty = Some(pe.ty.clone());
            out_params.impl_params = Some(pe.trait_.params.clone());
            out_params.method_params = Some(pe.params.clone());
            return match item {
                hir::TraitValueItem::Function(f) => {
                    if hir::visitor::monomorphise_type_needed(&pe.ty) {
                        // A more specific impl may exist per-instantiation.
                        ValuePtr::NotYetKnown
                    } else {
                        ValuePtr::Function(f)
                    }
                }
                hir::TraitValueItem::Constant(c) => ValuePtr::Constant(c),
                hir::TraitValueItem::Static(s) => ValuePtr::Static(s),
            };
        }

        if hir::visitor::monomorphise_type_needed(&pe.ty) {
            ValuePtr::NotYetKnown
        } else {
            ValuePtr::NotFound
        }
    }

    fn get_value_ufcs_inherent(
        &self,
        sp: Span,
        pe: &hir::PathUfcsInherent,
        out_params: &mut MonomorphState,
    ) -> ValuePtr<'a> {
        let mut rv = ValuePtr::NotFound;
        self.krate.find_type_impls(&pe.ty, |imp| {
            let item_is_here = imp.methods.contains_key(&pe.item)
                || imp.constants.contains_key(&pe.item);
            if !item_is_here {
                return false;
            }
            // Infer the impl parameters from the query type, backfilling any
            // slot the unification left open from the written impl params.
            // Unset slots are accepted here; expression typing re-checks the
            // instantiation.
            let mut impl_params = PathParams {
                lifetimes: vec![
                    hir::LifetimeRef::new_unknown();
                    imp.params.lifetimes.len()
                ],
                types: vec![
                    TypeRef::new_infer(hir::InferClass::None);
                    imp.params.types.len()
                ],
                values: vec![hir::ConstGeneric::Infer; imp.params.values.len()],
            };
            struct Cap<'x> {
                impl_params: &'x mut PathParams,
            }
            impl<'x> unify::MatchGenerics for Cap<'x> {
                fn match_ty(&mut self, g: &hir::GenericRef, ty: &TypeRef) -> Compare {
                    let idx = g.binding as usize;
                    if idx < self.impl_params.types.len() {
                        self.impl_params.types[idx] = ty.clone();
                    }
                    Compare::Equal
                }
                fn match_val(
                    &mut self,
                    g: &hir::GenericRef,
                    v: &hir::ConstGeneric,
                ) -> Compare {
                    let idx = g.binding as usize;
                    if idx < self.impl_params.values.len() {
                        self.impl_params.values[idx] = v.clone();
                    }
                    Compare::Equal
                }
            }
            let mut cap = Cap { impl_params: &mut impl_params };
            if unify::match_type(&mut cap, &imp.ty, &pe.ty) == Compare::Unequal {
                return false;
            }
            for (i, slot) in impl_params.types.iter_mut().enumerate() {
                if matches!(slot.data(), TypeData::Infer { .. }) {
                    if let Some(t) = pe.impl_params.types.get(i) {
                        *slot = t.clone();
                    } else {
                        log::debug!(
                            "{}: impl param {} of inherent impl for {} left unset",
                            sp,
                            imp.params.types[i].name,
                            imp.ty
                        );
                    }
                }
            }

            if let Some(ent) = imp.methods.get(&pe.item) {
                out_params.self_ty = Some(pe.ty.clone());
                out_params.impl_params = Some(impl_params);
                out_params.method_params = Some(pe.params.clone());
                rv = ValuePtr::Function(&ent.item);
                return true;
            }
            if let Some(ent) = imp.constants.get(&pe.item) {
                out_params.self_ty = Some(pe.ty.clone());
                out_params.impl_params = Some(impl_params);
                rv = ValuePtr::Constant(&ent.item);
                return true;
            }
            false
        });
        if rv.is_found() {
            rv
        } else if hir::visitor::monomorphise_type_needed(&pe.ty) {
            ValuePtr::NotYetKnown
        } else {
            ValuePtr::NotFound
        }
    }
}
