//! The static trait resolver: implementation search over a fully-indexed
//! crate, without type inference.
//!
//! [`StaticTraitResolve::find_impl`] works through a fixed priority list:
//! built-in traits, placeholder parameters, magic impls for built-in type
//! shapes, trait objects and erased types, opaque projections, marker
//! (auto) traits, the crate impl tables, and finally the caller's bound
//! environment. The callback decides whether a candidate is accepted;
//! returning `true` stops the search.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use base::{Span, TargetVersion};
use hir::ty::{
    GenericRef, TypeData, TypePathBinding, TypeRef, GENERIC_GROUP_PLACEHOLDER,
};
use hir::{
    Compare, ConstGeneric, Crate, EnumClass, GenericParams, GenericPath, LifetimeRef, MarkerImpl,
    Path, PathParams, SimplePath, StructData, TraitPath, TypeItem,
};
use intern::IStr;
use rustc_hash::FxHashMap;

use crate::impl_ref::{AtyMap, ImplRef};
use crate::monomorph::{Monomorphiser, MonomorphState};
use crate::unify::{self, MatchGenerics};

/// A bound from the environment, pre-digested for lookup.
pub struct CachedBound {
    pub hrtbs: Option<Box<GenericParams>>,
    pub assoc: AtyMap,
}

pub(crate) struct LangPaths {
    pub copy: Option<SimplePath>,
    pub clone: Option<SimplePath>,
    pub sized: Option<SimplePath>,
    pub unsize: Option<SimplePath>,
    pub coerce_unsized: Option<SimplePath>,
    pub deref: Option<SimplePath>,
    pub drop: Option<SimplePath>,
    pub phantom_data: Option<SimplePath>,
    pub unsafe_cell: Option<SimplePath>,
    pub owned_box: Option<SimplePath>,
    pub fn_: Option<SimplePath>,
    pub fn_mut: Option<SimplePath>,
    pub fn_once: Option<SimplePath>,
    pub tuple_trait: Option<SimplePath>,
    pub generator: Option<SimplePath>,
    pub discriminant_kind: Option<SimplePath>,
    pub pointee: Option<SimplePath>,
    pub dyn_metadata: Option<SimplePath>,
}

impl LangPaths {
    fn load(krate: &Crate) -> LangPaths {
        let get = |name: &str| krate.get_lang_item_path_opt(name).cloned();
        LangPaths {
            copy: get(hir::lang::COPY),
            clone: get(hir::lang::CLONE),
            sized: get(hir::lang::SIZED),
            unsize: get(hir::lang::UNSIZE),
            coerce_unsized: get(hir::lang::COERCE_UNSIZED),
            deref: get(hir::lang::DEREF),
            drop: get(hir::lang::DROP),
            phantom_data: get(hir::lang::PHANTOM_DATA),
            unsafe_cell: get(hir::lang::UNSAFE_CELL),
            owned_box: get(hir::lang::OWNED_BOX),
            fn_: get(hir::lang::FN),
            fn_mut: get(hir::lang::FN_MUT),
            fn_once: get(hir::lang::FN_ONCE),
            tuple_trait: get(hir::lang::TUPLE_TRAIT),
            generator: get(hir::lang::GENERATOR),
            discriminant_kind: get(hir::lang::DISCRIMINANT_KIND),
            pointee: get(hir::lang::POINTEE),
            dyn_metadata: get("dyn_metadata"),
        }
    }
}

pub(crate) fn is_lang(lang: &Option<SimplePath>, path: &SimplePath) -> bool {
    lang.as_ref() == Some(path)
}

pub struct StaticTraitResolve<'a> {
    pub krate: &'a Crate,
    pub impl_generics: Option<&'a GenericParams>,
    pub item_generics: Option<&'a GenericParams>,

    pub(crate) trait_bounds: BTreeMap<(TypeRef, GenericPath), CachedBound>,
    pub(crate) type_equalities: FxHashMap<TypeRef, TypeRef>,

    pub(crate) lang: LangPaths,
    pub(crate) version: TargetVersion,

    /// Metadata assumed for `Self` (trait-level queries where `Self` may be
    /// unsized).
    pub(crate) self_metadata: Cell<crate::markers::MetadataType>,

    // Query caches: write-once per key, so interior mutability stays
    // observationally pure.
    pub(crate) aty_cache: RefCell<FxHashMap<String, TypeRef>>,
    pub(crate) copy_cache: RefCell<FxHashMap<TypeRef, bool>>,
    pub(crate) clone_cache: RefCell<FxHashMap<TypeRef, bool>>,
    pub(crate) drop_cache: RefCell<FxHashMap<TypeRef, bool>>,

    // Recursion guards.
    pub(crate) eat_stack: RefCell<Vec<(TypeRef, u32)>>,
    pub(crate) eat_level: Cell<u32>,
    marker_stack: RefCell<Vec<(SimplePath, Option<PathParams>, TypeRef)>>,
}

impl<'a> StaticTraitResolve<'a> {
    pub fn new(krate: &'a Crate) -> StaticTraitResolve<'a> {
        StaticTraitResolve {
            krate,
            impl_generics: None,
            item_generics: None,
            trait_bounds: BTreeMap::new(),
            type_equalities: FxHashMap::default(),
            lang: LangPaths::load(krate),
            version: TargetVersion::default(),
            self_metadata: Cell::new(crate::markers::MetadataType::None),
            aty_cache: RefCell::new(FxHashMap::default()),
            copy_cache: RefCell::new(FxHashMap::default()),
            clone_cache: RefCell::new(FxHashMap::default()),
            drop_cache: RefCell::new(FxHashMap::default()),
            eat_stack: RefCell::new(Vec::new()),
            eat_level: Cell::new(0),
            marker_stack: RefCell::new(Vec::new()),
        }
    }

    pub fn with_generics(
        krate: &'a Crate,
        impl_generics: Option<&'a GenericParams>,
        item_generics: Option<&'a GenericParams>,
    ) -> StaticTraitResolve<'a> {
        let mut rv = StaticTraitResolve::new(krate);
        rv.impl_generics = impl_generics;
        rv.item_generics = item_generics;
        if let Some(g) = impl_generics {
            rv.add_bounds_from(Span::default(), g);
        }
        if let Some(g) = item_generics {
            rv.add_bounds_from(Span::default(), g);
        }
        rv
    }

    pub fn set_target_version(&mut self, version: TargetVersion) {
        self.version = version;
    }

    /// Digest `where` clauses into the lookup tables, including the implied
    /// supertrait bounds and associated-type equalities.
    fn add_bounds_from(&mut self, sp: Span, params: &'a GenericParams) {
        for bound in &params.bounds {
            match bound {
                hir::GenericBound::TraitBound { ty, trait_, .. } => {
                    self.add_trait_bound(sp, ty, trait_);
                }
                hir::GenericBound::TypeEquality { ty, other_ty } => {
                    self.type_equalities.insert(ty.clone(), other_ty.clone());
                }
                _ => {}
            }
        }
    }

    fn add_trait_bound(&mut self, sp: Span, ty: &TypeRef, tp: &TraitPath) {
        log::debug!("env bound: {} : {}", ty, tp);
        self.trait_bounds.insert(
            (ty.clone(), tp.path.clone()),
            CachedBound { hrtbs: tp.hrtbs.clone(), assoc: tp.type_bounds.clone() },
        );
        // `<T as Trait>::Name = U` equalities implied by the bound.
        for (name, aty) in &tp.type_bounds {
            let proj = TypeRef::new_path(
                Path::UfcsKnown(Box::new(hir::PathUfcsKnown {
                    ty: ty.clone(),
                    trait_: aty.source_trait.clone(),
                    item: name.clone(),
                    params: PathParams::new(),
                    hrtbs: None,
                })),
                TypePathBinding::Opaque,
            );
            self.type_equalities.insert(proj, aty.ty.clone());
        }
        // Implied supertrait bounds (flattened list is populated post-load).
        if let Some(trait_def) = self.krate.get_trait_by_path(&tp.path.path) {
            let ms = MonomorphState {
                self_ty: Some(ty.clone()),
                impl_params: Some(tp.path.params.clone()),
                method_params: None,
                hrb_params: None,
            };
            for pt in &trait_def.all_parent_traits {
                let pt_mono = ms.monomorph_traitpath(sp, pt, true, false);
                self.trait_bounds.insert(
                    (ty.clone(), pt_mono.path.clone()),
                    CachedBound { hrtbs: pt_mono.hrtbs.clone(), assoc: pt_mono.type_bounds },
                );
            }
        }
    }

    // -----------------------------------------------------------------------

    /// Search for an implementation of `trait_path` for `type`.
    ///
    /// `found_cb` receives each candidate and a fuzziness flag; returning
    /// `true` accepts it and ends the search. `dont_handoff_to_specialised`
    /// skips the built-in trait shortcuts (used when those shortcuts
    /// themselves need the raw impl list).
    pub fn find_impl(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
        dont_handoff_to_specialised: bool,
    ) -> bool {
        log::trace!("find_impl({}{:?} for {})", trait_path, trait_params, ty);

        if !dont_handoff_to_specialised {
            if let Some(rv) =
                self.find_impl_builtin(sp, trait_path, trait_params, ty, found_cb)
            {
                return rv;
            }
        }

        // Placeholder parameters are assumed to satisfy everything; the
        // bounds that introduced them are checked by the impl match.
        if let TypeData::Generic(g) = ty.data() {
            if g.group() == GENERIC_GROUP_PLACEHOLDER && !g.is_self() {
                return found_cb(ImplRef::new_bound(ty, trait_params), false);
            }
        }

        if let Some(rv) = self.find_impl_magic(sp, trait_path, trait_params, ty, found_cb) {
            return rv;
        }

        if let Some(rv) = self.find_impl_object(sp, trait_path, trait_params, ty, found_cb) {
            return rv;
        }

        if let Some(rv) =
            self.find_impl_opaque_bounds(sp, trait_path, trait_params, ty, found_cb)
        {
            return rv;
        }

        let is_marker =
            self.krate.get_trait_by_path(trait_path).map_or(false, |t| t.is_marker);
        if is_marker {
            let mut rv = false;
            let found = self.krate.find_marker_impls(trait_path, ty, |imp| {
                self.find_impl_marker_check(sp, trait_path, trait_params, ty, found_cb, imp, &mut rv)
            });
            if found {
                return rv;
            }

            // A cycle through the same query means "assume it holds" — the
            // outer frame will reject if a field genuinely fails.
            {
                let stack = self.marker_stack.borrow();
                let hit = stack.iter().any(|(t, p, t2)| {
                    t == trait_path
                        && (p.is_none()
                            || trait_params.is_none()
                            || p.as_ref() == trait_params.map(|x| x))
                        && t2 == ty
                });
                if hit {
                    cov_mark::hit!(auto_trait_recursion_assumed);
                    return found_cb(ImplRef::new_bound(ty, trait_params), false);
                }
            }
            self.marker_stack.borrow_mut().push((
                trait_path.clone(),
                trait_params.cloned(),
                ty.clone(),
            ));
            let cmp = self.check_auto_trait_impl_destructure(sp, trait_path, trait_params, ty);
            self.marker_stack.borrow_mut().pop();
            if cmp != Compare::Unequal {
                return found_cb(ImplRef::new_bound(ty, trait_params), cmp == Compare::Fuzzy);
            }
        } else {
            let mut accepted = false;
            let found = self.krate.find_trait_impls(trait_path, ty, |imp| {
                self.find_impl_check_crate_raw(
                    sp,
                    trait_path,
                    trait_params,
                    ty,
                    &imp.params,
                    &imp.trait_args,
                    &imp.ty,
                    &mut |impl_params, match_| {
                        accepted = found_cb(
                            ImplRef::Impl { impl_params, trait_path: trait_path.clone(), imp },
                            match_ == Compare::Fuzzy,
                        );
                        accepted
                    },
                )
            });
            if found {
                return accepted;
            }
        }

        if self.find_impl_bounds(sp, trait_path, trait_params, ty, found_cb) {
            return true;
        }

        false
    }

    /// Trait-object (`dyn Trait`) and `impl Trait` sources: the principal
    /// trait, its markers, and anything reachable through supertraits.
    fn find_impl_object(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
    ) -> Option<bool> {
        let check_params = |target: &PathParams| match trait_params {
            None => true,
            Some(p) => unify::compare_pathparams_fuzzy(target, p) != Compare::Unequal,
        };
        let traits: &[TraitPath] = match ty.data() {
            TypeData::TraitObject(to) => {
                for marker in &to.markers {
                    if &marker.path == trait_path && check_params(&marker.params) {
                        return Some(found_cb(
                            ImplRef::new_bound(ty, Some(&marker.params)),
                            false,
                        ));
                    }
                }
                std::slice::from_ref(&to.trait_)
            }
            TypeData::ErasedType(e) => &e.traits,
            _ => return None,
        };
        for tp in traits {
            if &tp.path.path == trait_path && check_params(&tp.path.params) {
                return Some(found_cb(
                    ImplRef::new_bound_with(ty, Some(&tp.path.params), tp.type_bounds.clone()),
                    false,
                ));
            }
            // Supertraits of the principal trait.
            if let Some(trait_params) = trait_params {
                let mut rv = false;
                let hit = self.find_named_trait_in_trait(
                    sp,
                    trait_path,
                    trait_params,
                    &tp.path.path,
                    &tp.path.params,
                    ty,
                    &mut |i_params, i_assoc| {
                        let mut assoc = i_assoc;
                        for (k, v) in &tp.type_bounds {
                            assoc.entry(k.clone()).or_insert_with(|| v.clone());
                        }
                        rv = found_cb(
                            ImplRef::new_bound_with(ty, Some(&i_params), assoc),
                            false,
                        );
                        true
                    },
                );
                if hit {
                    return Some(rv);
                }
            }
        }
        None
    }

    /// An opaque `<T as Trait>::Item` type: prove the trait from the bounds
    /// on the associated type's declaration, the trait's own `where` clauses,
    /// and any `impl Trait` the projection chain bottoms out in.
    fn find_impl_opaque_bounds(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
    ) -> Option<bool> {
        let pe = match ty.data() {
            TypeData::Path { path, binding: TypePathBinding::Opaque } => match path {
                Path::UfcsKnown(pe) => pe,
                _ => base::bug!(sp, "resolver", "opaque binding on non-UfcsKnown path: {}", ty),
            },
            _ => return None,
        };
        let trait_def = match self.krate.get_trait_by_path(&pe.trait_.path) {
            Some(t) => t,
            None => base::bug!(sp, "resolver", "trait {} not found", pe.trait_),
        };
        let aty_def = match trait_def.types.get(&pe.item) {
            Some(a) => a,
            None => base::bug!(
                sp,
                "resolver",
                "trait {} has no associated type {}",
                pe.trait_,
                pe.item
            ),
        };

        let ms = MonomorphState {
            self_ty: Some(pe.ty.clone()),
            impl_params: Some(pe.trait_.params.clone()),
            method_params: None,
            hrb_params: None,
        };

        let mut check_bound = |bound: &TraitPath| -> Option<bool> {
            let b_mono = ms.monomorph_traitpath(sp, bound, true, false);
            if &b_mono.path.path == trait_path {
                let ok = match trait_params {
                    None => true,
                    Some(p) => {
                        unify::compare_pathparams_fuzzy(&b_mono.path.params, p)
                            != Compare::Unequal
                    }
                };
                if ok {
                    let mut assoc = AtyMap::new();
                    for (name, aty) in &b_mono.type_bounds {
                        let mut v = aty.clone();
                        self.expand_associated_types(sp, &mut v.ty);
                        assoc.insert(name.clone(), v);
                    }
                    return Some(found_cb(
                        ImplRef::new_bound_with(ty, Some(&b_mono.path.params), assoc),
                        false,
                    ));
                }
            }
            // The desired trait may be a supertrait of the bound.
            if let Some(trait_params) = trait_params {
                let mut rv = false;
                let hit = self.find_named_trait_in_trait(
                    sp,
                    trait_path,
                    trait_params,
                    &b_mono.path.path,
                    &b_mono.path.params,
                    ty,
                    &mut |i_params, _assoc| {
                        rv = found_cb(ImplRef::new_bound(ty, Some(&i_params)), false);
                        true
                    },
                );
                if hit {
                    return Some(rv);
                }
            }
            None
        };

        for bound in &aty_def.trait_bounds {
            if let Some(rv) = check_bound(bound) {
                if rv {
                    return Some(true);
                }
            }
        }

        // `where <Self as Trait>::Item: OtherTrait` on the trait itself.
        for bound in &trait_def.params.bounds {
            if let hir::GenericBound::TraitBound { ty: b_ty, trait_: b_trait, .. } = bound {
                let is_this_aty = match b_ty.data() {
                    TypeData::Path { path: Path::UfcsKnown(pe2), .. } => {
                        pe2.ty == TypeRef::new_self()
                            && pe2.trait_.path == pe.trait_.path
                            && pe2.item == pe.item
                    }
                    _ => false,
                };
                if is_this_aty {
                    if let Some(rv) = check_bound(b_trait) {
                        if rv {
                            return Some(true);
                        }
                    }
                }
            }
        }

        // Walk nested projections down to an `impl Trait` and use the bound
        // list attached to the chain.
        let mut chain: Vec<&hir::PathUfcsKnown> = vec![pe];
        let mut inner_ty = &pe.ty;
        while let TypeData::Path { path: Path::UfcsKnown(inner), .. } = inner_ty.data() {
            chain.push(inner);
            inner_ty = &inner.ty;
        }
        if let TypeData::ErasedType(erased) = inner_ty.data() {
            let mut traits: &[TraitPath] = &erased.traits;
            while let Some(step) = chain.pop() {
                let tp = traits.iter().find(|t| t.path == step.trait_);
                match tp.and_then(|t| t.trait_bounds.get(&step.item)) {
                    Some(b) => traits = &b.traits,
                    None => {
                        traits = &[];
                        break;
                    }
                }
            }
            for t in traits {
                if let Some(rv) = check_bound(t) {
                    if rv {
                        return Some(true);
                    }
                }
            }
        }

        log::debug!("no bound on {} proves {}", ty, trait_path);
        None
    }

    fn find_impl_marker_check(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
        imp: &MarkerImpl,
        out_rv: &mut bool,
    ) -> bool {
        self.find_impl_check_crate_raw(
            sp,
            trait_path,
            trait_params,
            ty,
            &imp.params,
            &imp.trait_args,
            &imp.ty,
            &mut |_impl_params, cmp| {
                if imp.is_positive {
                    *out_rv =
                        found_cb(ImplRef::new_bound(ty, trait_params), cmp == Compare::Fuzzy);
                    *out_rv
                } else {
                    *out_rv = false;
                    true
                }
            },
        )
    }

    /// Prove a marker (auto) trait by structural recursion over fields.
    pub(crate) fn check_auto_trait_impl_destructure(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
    ) -> Compare {
        log::trace!("destructure {} for {}", trait_path, ty);
        let mut check = |inner: &TypeRef| -> Compare {
            let mut fuzzy = false;
            let found = self.find_impl(
                sp,
                trait_path,
                trait_params,
                inner,
                &mut |_, f| {
                    fuzzy |= f;
                    true
                },
                false,
            );
            if !found {
                Compare::Unequal
            } else if fuzzy {
                Compare::Fuzzy
            } else {
                Compare::Equal
            }
        };
        match ty.data() {
            TypeData::Primitive(_) | TypeData::Diverge => Compare::Equal,
            TypeData::Infer { .. } => Compare::Fuzzy,
            TypeData::Function(_) | TypeData::NamedFunction { .. } => Compare::Equal,
            TypeData::Borrow { inner, .. } | TypeData::Pointer { inner, .. } => check(inner),
            TypeData::Slice { inner } | TypeData::Array { inner, .. } => check(inner),
            TypeData::Tuple(items) => {
                let mut cmp = Compare::Equal;
                for t in items {
                    cmp = cmp.and(check(t));
                    if cmp == Compare::Unequal {
                        return cmp;
                    }
                }
                cmp
            }
            TypeData::Path { path: Path::Generic(gp), binding } => {
                let params = MonomorphState::new_impl(Some(ty.clone()), gp.params.clone());
                let mut fields: Vec<TypeRef> = Vec::new();
                match (binding, self.krate.get_typeitem_by_path(&gp.path)) {
                    (TypePathBinding::Struct, Some(TypeItem::Struct(def))) => {
                        match &def.data {
                            StructData::Unit => {}
                            StructData::Tuple(ents) => {
                                fields.extend(ents.iter().map(|e| e.item.clone()))
                            }
                            StructData::Named(ents) => {
                                fields.extend(ents.iter().map(|(_, e)| e.item.clone()))
                            }
                        }
                    }
                    (TypePathBinding::Enum, Some(TypeItem::Enum(def))) => match &def.class {
                        EnumClass::Data(variants) => {
                            fields.extend(variants.iter().map(|v| v.ty.clone()))
                        }
                        EnumClass::Value { .. } => {}
                    },
                    (TypePathBinding::Union, Some(TypeItem::Union(def))) => {
                        fields.extend(def.variants.iter().map(|(_, e)| e.item.clone()))
                    }
                    _ => return Compare::Unequal,
                }
                let mut cmp = Compare::Equal;
                for fld in fields {
                    let fld = params.monomorph_type(sp, &fld, true);
                    cmp = cmp.and(check(&fld));
                    if cmp == Compare::Unequal {
                        return cmp;
                    }
                }
                cmp
            }
            // Projections must be proven by bounds, not destructuring.
            TypeData::Path { .. } => Compare::Unequal,
            TypeData::Generic(_) => Compare::Unequal,
            TypeData::TraitObject(_) | TypeData::ErasedType(_) => Compare::Unequal,
            TypeData::Closure(_) | TypeData::Generator(_) => Compare::Unequal,
        }
    }

    /// Last resort: the caller's bound environment.
    fn find_impl_bounds(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
    ) -> bool {
        let compare_pp = |left: &PathParams, right: &PathParams| {
            unify::compare_pathparams_fuzzy(left, right) != Compare::Unequal
        };

        let has_infer =
            hir::visitor::visit_ty_with(ty, &mut |t| matches!(t.data(), TypeData::Infer { .. }));
        if has_infer {
            // `_` in the query: linear scan with fuzzy type comparison.
            for ((b_type, b_trait), cached) in &self.trait_bounds {
                if &b_trait.path != trait_path {
                    continue;
                }
                if unify::compare_types_fuzzy(b_type, ty) == Compare::Unequal {
                    continue;
                }
                if let Some(p) = trait_params {
                    if !compare_pp(p, &b_trait.params) {
                        continue;
                    }
                }
                if found_cb(
                    ImplRef::new_bound_with(b_type, Some(&b_trait.params), cached.assoc.clone()),
                    false,
                ) {
                    return true;
                }
            }
        } else {
            for ((b_type, b_trait), cached) in self
                .trait_bounds
                .range((ty.clone(), GenericPath::default())..)
                .take_while(|((t, _), _)| t == ty)
            {
                if &b_trait.path != trait_path {
                    continue;
                }
                if let Some(p) = trait_params {
                    if !compare_pp(p, &b_trait.params) {
                        continue;
                    }
                }
                if found_cb(
                    ImplRef::new_bound_with(b_type, Some(&b_trait.params), cached.assoc.clone()),
                    false,
                ) {
                    return true;
                }
            }
        }

        // `<T as Trait>::Aty: OtherTrait` — project through the bound list
        // on `Trait`'s associated-type declaration.
        if let TypeData::Path { path: Path::UfcsKnown(pe), .. } = ty.data() {
            for ((_b_type, b_trait), _cached) in self
                .trait_bounds
                .range((pe.ty.clone(), GenericPath::default())..)
                .take_while(|((t, _), _)| t == &pe.ty)
            {
                if b_trait.path != pe.trait_.path {
                    continue;
                }
                if !compare_pp(&b_trait.params, &pe.trait_.params) {
                    continue;
                }
                let trait_def = match self.krate.get_trait_by_path(&b_trait.path) {
                    Some(t) => t,
                    None => continue,
                };
                let aty = match trait_def.types.get(&pe.item) {
                    Some(a) => a,
                    None => continue,
                };
                for bound in &aty.trait_bounds {
                    if &bound.path.path != trait_path {
                        continue;
                    }
                    if let Some(p) = trait_params {
                        if !compare_pp(&bound.path.params, p) {
                            continue;
                        }
                    }
                    let ms = MonomorphState {
                        self_ty: Some(pe.ty.clone()),
                        impl_params: Some(pe.trait_.params.clone()),
                        method_params: None,
                        hrb_params: None,
                    };
                    let mut tp_mono = ms.monomorph_traitpath(sp, bound, true, false);
                    for aty in tp_mono.type_bounds.values_mut() {
                        self.expand_associated_types(sp, &mut aty.ty);
                    }
                    if found_cb(
                        ImplRef::new_bound_with(
                            ty,
                            Some(&tp_mono.path.params),
                            tp_mono.type_bounds.clone(),
                        ),
                        false,
                    ) {
                        return true;
                    }
                }
            }
        }

        false
    }

    // -----------------------------------------------------------------------

    /// Match one crate impl against the query, discovering impl
    /// parameters, allocating placeholders for the undetermined ones, and
    /// checking the impl's bounds under the resulting substitution.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn find_impl_check_crate_raw(
        &self,
        sp: Span,
        des_trait_path: &SimplePath,
        des_trait_params: Option<&PathParams>,
        des_type: &TypeRef,
        impl_params_def: &GenericParams,
        impl_trait_params: &PathParams,
        impl_type: &TypeRef,
        found_cb: &mut dyn FnMut(PathParams, Compare) -> bool,
    ) -> bool {
        log::trace!(
            "check impl{} {}{} for {} against {}{:?} for {}",
            impl_params_def,
            des_trait_path,
            impl_trait_params,
            impl_type,
            des_trait_path,
            des_trait_params,
            des_type
        );

        // Unify the impl's self type and trait args against the query,
        // capturing impl parameters as they are discovered.
        let mut impl_params = PathParams {
            lifetimes: vec![LifetimeRef::new_unknown(); impl_params_def.lifetimes.len()],
            types: vec![TypeRef::new_infer(hir::InferClass::None); impl_params_def.types.len()],
            values: vec![ConstGeneric::Infer; impl_params_def.values.len()],
        };
        let mut set = ParamsSet::new(impl_params_def);
        let mut match_ = {
            let mut get_params = GetParams { sp, impl_params: &mut impl_params, set: &mut set };
            unify::match_type(&mut get_params, impl_type, des_type)
        };
        if let Some(des_trait_params) = des_trait_params {
            if des_trait_params.types.len() != impl_trait_params.types.len() {
                base::bug!(
                    sp,
                    "resolver",
                    "arity mismatch for {}: {:?} vs {:?}",
                    des_trait_path,
                    des_trait_params,
                    impl_trait_params
                );
            }
            let mut get_params = GetParams { sp, impl_params: &mut impl_params, set: &mut set };
            match_ = match_.and(unify::match_pathparams(
                &mut get_params,
                impl_trait_params,
                des_trait_params,
            ));
        }
        if match_ == Compare::Unequal {
            return false;
        }

        // Base indexes for fresh placeholders: clear of any placeholder
        // already present in the query's trait params.
        let mut base = PlaceholderBases::default();
        if let Some(des_trait_params) = des_trait_params {
            base.raise_above(des_trait_params);
        }

        let ph_name = IStr::new("impl_?");
        let matcher = Matcher {
            sp,
            impl_params: RefCell::new(&mut impl_params),
            set: &set,
            base,
            ph_name,
        };

        // Check the impl's bounds under the discovered substitution.
        for bound in &impl_params_def.bounds {
            let (b_ty, b_trait) = match bound {
                hir::GenericBound::TraitBound { ty, trait_, .. } => (ty, trait_),
                _ => continue,
            };
            let mut b_ty_mono = matcher.monomorph_type(sp, b_ty, true);
            self.expand_associated_types(sp, &mut b_ty_mono);
            let mut b_tp_mono = matcher.monomorph_traitpath(sp, b_trait, true, false);
            self.expand_associated_types_tp(sp, &mut b_tp_mono);
            if matches!(b_ty_mono.data(), TypeData::Infer { .. }) {
                continue;
            }
            let is_placeholder_ty = |t: &TypeRef| {
                matches!(t.data(), TypeData::Generic(g) if g.is_placeholder())
            };

            // Associated-type requirements written on the bound.
            for (aty_name, aty_req) in &b_tp_mono.type_bounds {
                if is_placeholder_ty(&b_ty_mono) {
                    continue;
                }
                let src_trait = &aty_req.source_trait;
                let exp = &aty_req.ty;
                let rv = self.find_impl(
                    sp,
                    &src_trait.path,
                    Some(&src_trait.params),
                    &b_ty_mono,
                    &mut |ir, _fuzzy| {
                        let mut have = match ir.get_type(sp, aty_name) {
                            Some(t) => t,
                            None => TypeRef::new_path(
                                Path::UfcsKnown(Box::new(hir::PathUfcsKnown {
                                    ty: ir.get_impl_type(sp),
                                    trait_: GenericPath::new(
                                        src_trait.path.clone(),
                                        ir.get_trait_params(sp),
                                    ),
                                    item: aty_name.clone(),
                                    params: PathParams::new(),
                                    hrtbs: None,
                                })),
                                TypePathBinding::Unbound,
                            ),
                        };
                        self.expand_associated_types(sp, &mut have);
                        let cmp = {
                            let mut m = MatcherSink(&matcher);
                            unify::match_type(&mut m, exp, &have)
                        };
                        cmp != Compare::Unequal
                    },
                    false,
                );
                if !rv {
                    log::debug!("impl rejected: {}::{} != required", b_ty_mono, aty_name);
                    return false;
                }
            }

            // The bound itself.
            let rv = if is_placeholder_ty(&b_ty_mono) {
                true
            } else {
                self.find_impl(
                    sp,
                    &b_tp_mono.path.path,
                    Some(&b_tp_mono.path.params),
                    &b_ty_mono,
                    &mut |_, _| true,
                    false,
                )
            };
            let rv = rv
                || hir::visitor::visit_ty_with(&b_ty_mono, &mut |t| {
                    matches!(t.data(), TypeData::Generic(g) if g.is_placeholder())
                });
            if !rv {
                log::debug!("impl rejected: {} : {} unsatisfied", b_ty_mono, b_tp_mono);
                return false;
            }
        }

        // Merge the placeholders back, then check `Sized` defaults.
        matcher.finalise();

        for (i, def) in impl_params_def.types.iter().enumerate() {
            if def.is_sized {
                let t = &impl_params.types[i];
                if !matches!(t.data(), TypeData::Infer { .. }) && !self.type_is_sized(sp, t) {
                    log::debug!("impl rejected: param {} = {} not Sized", def.name, t);
                    return false;
                }
            }
        }

        found_cb(impl_params, match_)
    }

    // -----------------------------------------------------------------------

    /// Search `trait` (by path+params, applied to `target_type`) and its
    /// flattened parents for `des` with matching params. The callback gets
    /// the found parent's params and associated-type equalities.
    pub(crate) fn find_named_trait_in_trait(
        &self,
        sp: Span,
        des: &SimplePath,
        des_params: &PathParams,
        trait_path: &SimplePath,
        trait_params: &PathParams,
        target_type: &TypeRef,
        found_cb: &mut dyn FnMut(PathParams, AtyMap) -> bool,
    ) -> bool {
        let trait_def = match self.krate.get_trait_by_path(trait_path) {
            Some(t) => t,
            None => return false,
        };
        let ms = MonomorphState {
            self_ty: Some(target_type.clone()),
            impl_params: Some(trait_params.clone()),
            method_params: None,
            hrb_params: None,
        };
        for pt in &trait_def.all_parent_traits {
            if &pt.path.path != des {
                continue;
            }
            let pt_mono = ms.monomorph_traitpath(sp, pt, true, false);
            if unify::compare_pathparams_fuzzy(&pt_mono.path.params, des_params)
                != Compare::Unequal
            {
                if found_cb(pt_mono.path.params, pt_mono.type_bounds) {
                    return true;
                }
            }
        }
        false
    }

    /// Locate the (super)trait of `trait_gp` that declares associated type
    /// `name`, returning its concrete path.
    pub(crate) fn trait_contains_type(
        &self,
        sp: Span,
        trait_gp: &GenericPath,
        name: &IStr,
    ) -> Option<GenericPath> {
        let trait_def = self.krate.get_trait_by_path(&trait_gp.path)?;
        if trait_def.types.contains_key(name) {
            return Some(trait_gp.clone());
        }
        let ms = MonomorphState {
            self_ty: Some(TypeRef::new_self()),
            impl_params: Some(trait_gp.params.clone()),
            method_params: None,
            hrb_params: None,
        };
        for pt in &trait_def.all_parent_traits {
            let parent_def = self.krate.get_trait_by_path(&pt.path.path)?;
            if parent_def.types.contains_key(name) {
                return Some(ms.monomorph_genericpath(sp, &pt.path, true));
            }
        }
        log::debug!("{}: associated type {} not found in {}", sp, name, trait_gp);
        None
    }
}

// ---------------------------------------------------------------------------
// Impl-parameter discovery and placeholder handling

pub(crate) struct ParamsSet {
    types: Vec<bool>,
    values: Vec<bool>,
    lifetimes: Vec<bool>,
}

impl ParamsSet {
    fn new(def: &GenericParams) -> ParamsSet {
        ParamsSet {
            types: vec![false; def.types.len()],
            values: vec![false; def.values.len()],
            lifetimes: vec![false; def.lifetimes.len()],
        }
    }
}

/// Writes discovered impl parameters into `impl_params`, first-come-wins
/// with fuzzy comparison on repeats.
struct GetParams<'p> {
    sp: Span,
    impl_params: &'p mut PathParams,
    set: &'p mut ParamsSet,
}

impl<'p> MatchGenerics for GetParams<'p> {
    fn match_ty(&mut self, g: &GenericRef, ty: &TypeRef) -> Compare {
        let idx = g.binding as usize;
        if idx >= self.impl_params.types.len() {
            base::bug!(self.sp, "resolver", "impl type param {} out of range", g);
        }
        if !self.set.types[idx] {
            self.set.types[idx] = true;
            self.impl_params.types[idx] = ty.clone();
            Compare::Equal
        } else {
            unify::compare_types_fuzzy(&self.impl_params.types[idx], ty)
        }
    }

    fn match_val(&mut self, g: &GenericRef, v: &ConstGeneric) -> Compare {
        let idx = g.binding as usize;
        if idx >= self.impl_params.values.len() {
            base::bug!(self.sp, "resolver", "impl value param {} out of range", g);
        }
        if !self.set.values[idx] {
            self.set.values[idx] = true;
            self.impl_params.values[idx] = v.clone();
            Compare::Equal
        } else if &self.impl_params.values[idx] == v {
            Compare::Equal
        } else {
            Compare::Unequal
        }
    }

    fn match_lft(&mut self, g: &GenericRef, lft: LifetimeRef) -> Compare {
        let idx = g.binding as usize;
        if idx >= self.impl_params.lifetimes.len() {
            return Compare::Equal;
        }
        if !self.set.lifetimes[idx] {
            self.set.lifetimes[idx] = true;
            self.impl_params.lifetimes[idx] = lft;
            Compare::Equal
        } else if self.impl_params.lifetimes[idx] == lft {
            Compare::Equal
        } else {
            Compare::Unequal
        }
    }
}

/// First free placeholder index per kind: one past the highest placeholder
/// visible in the query, so fresh placeholders never collide.
#[derive(Default, Clone, Copy)]
struct PlaceholderBases {
    ty: usize,
    val: usize,
    lft: usize,
}

impl PlaceholderBases {
    fn raise_above(&mut self, params: &PathParams) {
        let mut max_ty = self.ty;
        let mut max_val = self.val;
        let mut max_lft = self.lft;
        for t in &params.types {
            hir::visitor::visit_ty_with(t, &mut |t| {
                match t.data() {
                    TypeData::Generic(g) if g.is_placeholder() => {
                        max_ty = max_ty.max(g.idx() + 1);
                    }
                    TypeData::Borrow { lifetime, .. } => {
                        if let Some(g) = lifetime.as_generic() {
                            if g.is_placeholder() {
                                max_lft = max_lft.max(g.idx() + 1);
                            }
                        }
                    }
                    _ => {}
                }
                false
            });
        }
        for v in &params.values {
            if let ConstGeneric::Generic(g) = v {
                if g.is_placeholder() {
                    max_val = max_val.max(g.idx() + 1);
                }
            }
        }
        for l in &params.lifetimes {
            if let Some(g) = l.as_generic() {
                if g.is_placeholder() {
                    max_lft = max_lft.max(g.idx() + 1);
                }
            }
        }
        self.ty = max_ty;
        self.val = max_val;
        self.lft = max_lft;
    }
}

/// Substitution used while checking an impl's bounds: determined parameters
/// read through, undetermined ones become placeholders which later unify
/// with whatever the bound check discovers.
struct Matcher<'p> {
    sp: Span,
    impl_params: RefCell<&'p mut PathParams>,
    set: &'p ParamsSet,
    base: PlaceholderBases,
    ph_name: IStr,
}

impl<'p> Matcher<'p> {
    fn ph_binding(base: usize, idx: usize) -> u16 {
        ((GENERIC_GROUP_PLACEHOLDER as usize) * 256 + base + idx) as u16
    }

    /// Nothing to do beyond dropping the borrow: placeholders were written
    /// directly into `impl_params` as they were allocated or bound.
    fn finalise(&self) {}
}

impl MatchGenerics for MatcherSink<'_> {
    fn match_ty(&mut self, g: &GenericRef, ty: &TypeRef) -> Compare {
        let m = self.0;
        if let TypeData::Generic(g2) = ty.data() {
            if g2.binding == g.binding {
                return Compare::Equal;
            }
        }
        if g.is_placeholder() {
            if g.idx() >= m.base.ty {
                let i = g.idx() - m.base.ty;
                let mut params = m.impl_params.borrow_mut();
                if i >= params.types.len() {
                    // A placeholder from some other impl's matching pass.
                    return Compare::Fuzzy;
                }
                if !m.set.types[i] {
                    let slot = &mut params.types[i];
                    if matches!(slot.data(), TypeData::Infer { .. })
                        || matches!(slot.data(), TypeData::Generic(g3) if g3.is_placeholder())
                    {
                        cov_mark::hit!(placeholder_bound_during_bounds);
                        *slot = ty.clone();
                        return Compare::Equal;
                    }
                }
                return unify::compare_types_fuzzy(&params.types[i], ty);
            }
            return Compare::Fuzzy;
        }
        Compare::Unequal
    }

    fn match_val(&mut self, g: &GenericRef, v: &ConstGeneric) -> Compare {
        let m = self.0;
        if let ConstGeneric::Generic(g2) = v {
            if g2.binding == g.binding {
                return Compare::Equal;
            }
        }
        if g.is_placeholder() {
            if g.idx() >= m.base.val {
                let i = g.idx() - m.base.val;
                let mut params = m.impl_params.borrow_mut();
                if i >= params.values.len() {
                    return Compare::Fuzzy;
                }
                if !m.set.values[i] {
                    params.values[i] = v.clone();
                    return Compare::Equal;
                }
                return if &params.values[i] == v { Compare::Equal } else { Compare::Unequal };
            }
            return Compare::Fuzzy;
        }
        Compare::Unequal
    }
}

/// Adapter: `Matcher` as a match sink (it is also a `Monomorphiser`).
struct MatcherSink<'m>(&'m Matcher<'m>);

impl<'p> Monomorphiser for Matcher<'p> {
    fn get_type(&self, sp: Span, g: &GenericRef) -> TypeRef {
        if g.is_self() {
            base::bug!(sp, "resolver", "Self seen while checking impl bounds");
        }
        if g.is_placeholder() {
            return TypeRef::new(TypeData::Generic(g.clone()));
        }
        let idx = g.binding as usize;
        let params = self.impl_params.borrow();
        if idx < params.types.len() && self.set.types[idx] {
            return params.types[idx].clone();
        }
        drop(params);
        // Undetermined: allocate (or reuse) the placeholder for this slot.
        let ph = TypeRef::new(TypeData::Generic(GenericRef::new(
            self.ph_name.clone(),
            Self::ph_binding(self.base.ty, idx),
        )));
        let mut params = self.impl_params.borrow_mut();
        if idx < params.types.len()
            && matches!(params.types[idx].data(), TypeData::Infer { .. })
        {
            params.types[idx] = ph.clone();
        }
        ph
    }

    fn get_value(&self, _sp: Span, g: &GenericRef) -> ConstGeneric {
        if g.is_placeholder() {
            return ConstGeneric::Generic(g.clone());
        }
        let idx = g.binding as usize;
        let params = self.impl_params.borrow();
        if idx < params.values.len() && self.set.values[idx] {
            return params.values[idx].clone();
        }
        drop(params);
        let ph = ConstGeneric::Generic(GenericRef::new(
            self.ph_name.clone(),
            Self::ph_binding(self.base.val, idx),
        ));
        let mut params = self.impl_params.borrow_mut();
        if idx < params.values.len() && matches!(params.values[idx], ConstGeneric::Infer) {
            params.values[idx] = ph.clone();
        }
        ph
    }

    fn get_lifetime(&self, _sp: Span, g: &GenericRef) -> LifetimeRef {
        if g.group() == hir::GENERIC_GROUP_HRB {
            return LifetimeRef { binding: g.binding as u32 };
        }
        let idx = g.idx();
        let params = self.impl_params.borrow();
        if idx < params.lifetimes.len() && self.set.lifetimes[idx] {
            return params.lifetimes[idx];
        }
        LifetimeRef::new_param(Self::ph_binding(self.base.lft, idx))
    }
}
