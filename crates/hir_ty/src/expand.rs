//! Associated-type expansion: rewriting `<T as Trait>::Item` projections to
//! concrete types where an impl or bound pins them down, or marking them
//! `Opaque` where nothing does.
//!
//! The walk is in-place. A per-level recursion stack breaks projection
//! cycles: when the same projection is seen twice at one level, every
//! projection co-visited at that level is replaced by the lexicographically
//! smallest representative and marked opaque. Results are cached by printed
//! path, which also makes repeated expansion cheap and idempotent.

use base::Span;
use hir::ty::{TypeData, TypePathBinding, TypeRef};
use hir::{Compare, GenericPath, Path, PathParams, TraitPath};

use crate::impl_ref::ImplRef;
use crate::monomorph::{Monomorphiser, MonomorphState};
use crate::resolve::StaticTraitResolve;
use crate::unify;

impl<'a> StaticTraitResolve<'a> {
    pub fn expand_associated_types(&self, sp: Span, input: &mut TypeRef) {
        self.expand_associated_types_inner(sp, input);
    }

    /// One expansion step only; returns whether a rewrite happened.
    pub fn expand_associated_types_single(&self, sp: Span, input: &mut TypeRef) -> bool {
        if matches!(
            input.data(),
            TypeData::Path { path: Path::UfcsKnown(_), .. }
        ) {
            self.expand_ufcs_known(sp, input, false)
        } else {
            false
        }
    }

    pub fn expand_associated_types_path(&self, sp: Span, input: &mut Path) {
        match input {
            Path::Generic(p) => self.expand_associated_types_params(sp, &mut p.params),
            Path::UfcsInherent(p) => {
                self.expand_associated_types_inner(sp, &mut p.ty);
                self.expand_associated_types_params(sp, &mut p.params);
                self.expand_associated_types_params(sp, &mut p.impl_params);
            }
            Path::UfcsKnown(p) => {
                self.expand_associated_types_inner(sp, &mut p.ty);
                self.expand_associated_types_params(sp, &mut p.trait_.params);
                self.expand_associated_types_params(sp, &mut p.params);
            }
            Path::UfcsUnknown(_) => {
                base::bug!(sp, "resolver", "UfcsUnknown in associated-type expansion: {}", input)
            }
        }
    }

    pub fn expand_associated_types_params(&self, sp: Span, params: &mut PathParams) {
        for ty in &mut params.types {
            self.expand_associated_types_inner(sp, ty);
        }
    }

    pub fn expand_associated_types_tp(&self, sp: Span, input: &mut TraitPath) {
        self.expand_associated_types_params(sp, &mut input.path.params);
        for aty in input.type_bounds.values_mut() {
            self.expand_associated_types_params(sp, &mut aty.source_trait.params);
            self.expand_associated_types_inner(sp, &mut aty.ty);
        }
        for bound in input.trait_bounds.values_mut() {
            self.expand_associated_types_params(sp, &mut bound.source_trait.params);
            for t in &mut bound.traits {
                self.expand_associated_types_tp(sp, t);
            }
        }
    }

    fn expand_associated_types_inner(&self, sp: Span, input: &mut TypeRef) {
        let is_unbound_projection = matches!(
            input.data(),
            TypeData::Path { path: Path::UfcsKnown(_), binding: TypePathBinding::Unbound }
        );
        if is_unbound_projection {
            let key = format!("{}", input.as_path().unwrap());
            if let Some(cached) = self.aty_cache.borrow().get(&key) {
                *input = cached.clone();
                return;
            }
            self.expand_ufcs_known(sp, input, true);
            self.aty_cache.borrow_mut().insert(key, input.clone());
            return;
        }

        match input.data_mut() {
            TypeData::Infer { .. }
            | TypeData::Diverge
            | TypeData::Primitive(_)
            | TypeData::Generic(_)
            | TypeData::Closure(_)
            | TypeData::Generator(_)
            | TypeData::ErasedType(_) => {}
            TypeData::Path { path, .. } => match path {
                Path::Generic(p) => {
                    for ty in &mut p.params.types {
                        self.expand_associated_types_inner(sp, ty);
                    }
                }
                Path::UfcsInherent(p) => {
                    self.expand_associated_types_inner(sp, &mut p.ty);
                    for ty in &mut p.params.types {
                        self.expand_associated_types_inner(sp, ty);
                    }
                    for ty in &mut p.impl_params.types {
                        self.expand_associated_types_inner(sp, ty);
                    }
                }
                // Already-opaque projection: leave the binding alone.
                Path::UfcsKnown(p) => {
                    self.expand_associated_types_inner(sp, &mut p.ty);
                    for ty in &mut p.trait_.params.types {
                        self.expand_associated_types_inner(sp, ty);
                    }
                    for ty in &mut p.params.types {
                        self.expand_associated_types_inner(sp, ty);
                    }
                }
                Path::UfcsUnknown(_) => {
                    base::bug!(sp, "resolver", "UfcsUnknown in associated-type expansion")
                }
            },
            TypeData::TraitObject(to) => {
                let to = &mut **to;
                self.expand_associated_types_tp(sp, &mut to.trait_);
                for m in &mut to.markers {
                    self.expand_associated_types_params(sp, &mut m.params);
                }
            }
            TypeData::Array { inner, .. } => self.expand_associated_types_inner(sp, inner),
            TypeData::Slice { inner } => self.expand_associated_types_inner(sp, inner),
            TypeData::Tuple(items) => {
                for t in items {
                    self.expand_associated_types_inner(sp, t);
                }
            }
            TypeData::Borrow { inner, .. } => self.expand_associated_types_inner(sp, inner),
            TypeData::Pointer { inner, .. } => self.expand_associated_types_inner(sp, inner),
            TypeData::NamedFunction { path, .. } => {
                let mut p = path.clone();
                self.expand_associated_types_path(sp, &mut p);
                *path = p;
            }
            TypeData::Function(ft) => {
                let ft = &mut **ft;
                self.expand_associated_types_inner(sp, &mut ft.ret);
                for t in &mut ft.args {
                    self.expand_associated_types_inner(sp, t);
                }
            }
        }
    }

    /// The projection core. Returns whether the projection was rewritten to
    /// something new (false when it was left in place / marked opaque).
    fn expand_ufcs_known(&self, sp: Span, input: &mut TypeRef, recurse: bool) -> bool {
        // Cycle detection: same projection at the same level → opaque.
        let key_ty = {
            let pe = match input.data() {
                TypeData::Path { path: Path::UfcsKnown(pe), .. } => pe,
                _ => unreachable!(),
            };
            TypeRef::new_path(
                Path::UfcsKnown(Box::new(hir::PathUfcsKnown {
                    ty: pe.ty.clone(),
                    trait_: pe.trait_.clone(),
                    item: pe.item.clone(),
                    params: PathParams::new(),
                    hrtbs: None,
                })),
                TypePathBinding::Unbound,
            )
        };
        let level = self.eat_level.get();
        {
            let stack = self.eat_stack.borrow();
            let mut same_level_hit = false;
            for (ent_ty, ent_level) in stack.iter() {
                if ent_ty == &key_ty {
                    if *ent_level == level {
                        same_level_hit = true;
                    } else {
                        base::bug!(sp, "resolver", "projection loop across levels: {}", key_ty);
                    }
                }
            }
            if same_level_hit {
                cov_mark::hit!(eat_loop_broken);
                let mut ents: Vec<&TypeRef> = stack
                    .iter()
                    .filter(|(_, l)| *l == level)
                    .map(|(t, _)| t)
                    .collect();
                ents.sort();
                if let Some(min) = ents.first() {
                    if ents.len() > 1 {
                        *input = (*min).clone();
                    }
                }
                if let TypeData::Path { binding, .. } = input.data_mut() {
                    *binding = TypePathBinding::Opaque;
                }
                return false;
            }
        }
        self.eat_stack.borrow_mut().push((key_ty, level));
        let rv = self.expand_ufcs_known_guarded(sp, input, recurse);
        self.eat_stack.borrow_mut().pop();
        rv
    }

    fn expand_ufcs_known_guarded(&self, sp: Span, input: &mut TypeRef, recurse: bool) -> bool {
        // Expand the projectee and the trait arguments one level down.
        {
            let pe = match input.data_mut() {
                TypeData::Path { path: Path::UfcsKnown(pe), .. } => pe,
                _ => unreachable!(),
            };
            self.eat_level.set(self.eat_level.get() + 1);
            self.expand_associated_types_inner(sp, &mut pe.ty);
            for ty in &mut pe.trait_.params.types {
                self.expand_associated_types_inner(sp, ty);
            }
            self.eat_level.set(self.eat_level.get() - 1);
        }

        let (proj_ty, proj_trait, proj_item) = {
            let pe = match input.data() {
                TypeData::Path { path: Path::UfcsKnown(pe), .. } => pe,
                _ => unreachable!(),
            };
            (pe.ty.clone(), pe.trait_.clone(), pe.item.clone())
        };

        // Projections whose root is still an inference variable stay put.
        {
            let mut t = &proj_ty;
            while let TypeData::Path { path: Path::UfcsKnown(pe), .. } = t.data() {
                t = &pe.ty;
            }
            if matches!(t.data(), TypeData::Infer { .. }) {
                return false;
            }
        }

        // Shortcuts by projectee shape.
        match proj_ty.data() {
            TypeData::Closure(c) => {
                let is_fn = crate::resolve::is_lang(&self.lang.fn_, &proj_trait.path)
                    || crate::resolve::is_lang(&self.lang.fn_mut, &proj_trait.path)
                    || crate::resolve::is_lang(&self.lang.fn_once, &proj_trait.path);
                if is_fn {
                    if proj_item == "Output" {
                        *input = c.ret.clone();
                        return true;
                    }
                    base::fatal!(
                        sp,
                        "no associated type `{}` on the fn-call traits",
                        proj_item
                    );
                }
            }
            TypeData::TraitObject(to) => {
                if to.trait_.path == proj_trait {
                    if let Some(aty) = to.trait_.type_bounds.get(&proj_item) {
                        *input = aty.ty.clone();
                        return true;
                    }
                }
            }
            _ => {}
        }

        // Equality bounds from the environment.
        if self.replace_equalities(input) {
            if recurse {
                self.expand_associated_types_inner(sp, input);
            }
            return true;
        }

        // Environment scan: a bound on exactly this (type, trait).
        for ((b_type, b_trait), cached) in self.trait_bounds.iter() {
            if b_type != &proj_ty {
                continue;
            }
            if b_trait != &proj_trait {
                continue;
            }
            match cached.assoc.get(&proj_item) {
                Some(aty) => {
                    *input = aty.ty.clone();
                    if recurse {
                        self.expand_associated_types_inner(sp, input);
                    }
                    return true;
                }
                None => {
                    // Bound proves the trait but not the item: opaque.
                    log::debug!("bound on {} lacks {}, assuming opaque", b_trait, proj_item);
                }
            }
        }

        // Nested projection: consult the inner trait's associated-type
        // declaration for a bound pinning this item.
        if let TypeData::Path { path: Path::UfcsKnown(pe_inner), .. } = proj_ty.data() {
            if let Some(trait_def) = self.krate.get_trait_by_path(&pe_inner.trait_.path) {
                if let Some(aty_def) = trait_def.types.get(&pe_inner.item) {
                    let ms = MonomorphState {
                        self_ty: Some(pe_inner.ty.clone()),
                        impl_params: Some(pe_inner.trait_.params.clone()),
                        method_params: None,
                        hrb_params: None,
                    };
                    for bound in &aty_def.trait_bounds {
                        if bound.path == proj_trait {
                            if let Some(aty) = bound.type_bounds.get(&proj_item) {
                                *input = if hir::visitor::monomorphise_type_needed(&aty.ty) {
                                    ms.monomorph_type(sp, &aty.ty, true)
                                } else {
                                    aty.ty.clone()
                                };
                                if recurse {
                                    self.expand_associated_types_inner(sp, input);
                                }
                                return true;
                            }
                        }
                        // Maybe the wanted trait is reachable through this
                        // bound's parents.
                        let bound_params =
                            ms.monomorph_pathparams(sp, &bound.path.params, true);
                        let mut replaced = false;
                        self.find_named_trait_in_trait(
                            sp,
                            &proj_trait.path,
                            &proj_trait.params,
                            &bound.path.path,
                            &bound_params,
                            &proj_ty,
                            &mut |_params, assoc| match assoc.get(&proj_item) {
                                Some(aty) => {
                                    *input = aty.ty.clone();
                                    replaced = true;
                                    true
                                }
                                None => false,
                            },
                        );
                        if replaced {
                            if recurse {
                                self.expand_associated_types_inner(sp, input);
                            }
                            return true;
                        }
                    }
                }
            }
        }

        // Crate-level impl search, preferring non-specialisable matches.
        let trait_gp = match self.trait_contains_type(sp, &proj_trait, &proj_item) {
            Some(gp) => gp,
            None => base::bug!(
                sp,
                "resolver",
                "associated type {} not found in {}",
                proj_item,
                proj_trait
            ),
        };

        let mut new_ty: Option<TypeRef> = None;
        let mut set_opaque = false;
        let mut best_impl: Option<ImplRef<'a>> = None;
        let found = self.find_impl(
            sp,
            &trait_gp.path,
            Some(&trait_gp.params),
            &proj_ty,
            &mut |ir, fuzzy| {
                if fuzzy {
                    // Re-check after expansion; a fuzzy match may be an
                    // opaque false positive.
                    let mut impl_ty = ir.get_impl_type(sp);
                    self.expand_associated_types(sp, &mut impl_ty);
                    if impl_ty != proj_ty {
                        return false;
                    }
                    let mut pp = ir.get_trait_params(sp);
                    for ty in &mut pp.types {
                        self.expand_associated_types(sp, ty);
                    }
                    if unify::compare_pathparams_fuzzy(&pp, &trait_gp.params)
                        == Compare::Unequal
                    {
                        return false;
                    }
                }
                if ir.type_is_specialisable(&proj_item) {
                    if ir.more_specific_than(self.krate, &best_impl) {
                        best_impl = Some(ir);
                    }
                    false
                } else {
                    match ir.get_type(sp, &proj_item) {
                        Some(t) => new_ty = Some(t),
                        None => set_opaque = true,
                    }
                    true
                }
            },
            false,
        );

        if found {
            if let Some(t) = new_ty {
                let changed = *input != t;
                *input = t;
                if recurse {
                    self.expand_associated_types_inner(sp, input);
                }
                return changed;
            }
            if set_opaque {
                if let TypeData::Path { binding, .. } = input.data_mut() {
                    *binding = TypePathBinding::Opaque;
                }
                return self.replace_equalities(input);
            }
        }
        if best_impl.is_some() {
            // Only specialisable impls matched and the query still has
            // generics: not yet known.
            if let TypeData::Path { binding, .. } = input.data_mut() {
                *binding = TypePathBinding::Opaque;
            }
            self.replace_equalities(input);
            log::debug!("only specialisable impls for {}, leaving opaque", trait_gp);
            return false;
        }

        // Nothing pinned the projection down: it names an opaque type.
        if let TypeData::Path { binding, .. } = input.data_mut() {
            *binding = TypePathBinding::Opaque;
        }
        let rv = self.replace_equalities(input);
        if recurse {
            self.expand_associated_types_inner(sp, input);
        }
        rv
    }

    /// Apply an environment equality (`<T as Trait>::Item = U`) to the type.
    pub(crate) fn replace_equalities(&self, input: &mut TypeRef) -> bool {
        // Equality keys are stored with opaque binding; compare module the
        // binding tag.
        let lookup = |t: &TypeRef| self.type_equalities.get(t).cloned();
        let direct = lookup(input).or_else(|| {
            let mut alt = input.clone();
            if let TypeData::Path { binding, .. } = alt.data_mut() {
                *binding = match binding {
                    TypePathBinding::Opaque => TypePathBinding::Unbound,
                    _ => TypePathBinding::Opaque,
                };
                lookup(&alt)
            } else {
                None
            }
        });
        match direct {
            Some(t) => {
                log::debug!("replace_equalities: {} -> {}", input, t);
                *input = t;
                true
            }
            None => false,
        }
    }

    /// Every trait-bound on the associated types reachable from a
    /// projection's trait, for callers that need to iterate them.
    pub fn iterate_aty_bounds(
        &self,
        sp: Span,
        pe_ty: &TypeRef,
        pe_trait: &GenericPath,
        pe_item: &intern::IStr,
        cb: &mut dyn FnMut(&TraitPath) -> bool,
    ) -> bool {
        let trait_def = match self.krate.get_trait_by_path(&pe_trait.path) {
            Some(t) => t,
            None => return false,
        };
        let aty_def = match trait_def.types.get(pe_item) {
            Some(a) => a,
            None => return false,
        };
        let ms = MonomorphState {
            self_ty: Some(pe_ty.clone()),
            impl_params: Some(pe_trait.params.clone()),
            method_params: None,
            hrb_params: None,
        };
        for bound in &aty_def.trait_bounds {
            let b = ms.monomorph_traitpath(sp, bound, true, false);
            if cb(&b) {
                return true;
            }
        }
        false
    }
}
