//! Built-in trait handling and the marker queries: `Copy`, `Clone`, `Sized`
//! (via pointer metadata), `Unsize`, drop glue, interior mutability and
//! impossibility.
//!
//! These answer from type shape and the markings caches; the impl tables are
//! only consulted where a user impl can genuinely change the answer.

use base::Span;
use hir::ty::{ClosureClass, GenericRef, InferClass, TypeData, TypePathBinding, TypeRef};
use hir::{
    AtyEqual, Compare, CoreType, EnumClass, GenericPath, Path, PathParams, SimplePath, StructData,
    StructDstType, TypeItem,
};
use intern::IStr;
use rustc_hash::FxHashSet;

use crate::impl_ref::{AtyMap, ImplRef};
use crate::monomorph::{Monomorphiser, MonomorphState};
use crate::resolve::{is_lang, StaticTraitResolve};
use crate::unify;

/// What a pointer to the type carries besides the address.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MetadataType {
    /// Thin pointer: the type is statically sized.
    None,
    /// Thin pointer to an opaque (extern) type; size unknown but no metadata.
    Zero,
    /// Element count.
    Slice,
    /// Vtable pointer.
    TraitObject,
    /// Cannot be determined (unbounded generic, opaque projection).
    Unknown,
}

impl<'a> StaticTraitResolve<'a> {
    pub(crate) fn find_impl_builtin(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
    ) -> Option<bool> {
        if is_lang(&self.lang.copy, trait_path) {
            if self.type_is_copy(sp, ty) {
                return Some(found_cb(ImplRef::new_bound(ty, None), false));
            }
        } else if self.version >= base::TargetVersion::V1_29
            && is_lang(&self.lang.clone, trait_path)
        {
            // Only the shapes with compiler-provided Clone; nominal types go
            // through the ordinary impl search.
            let is_magic_shape = matches!(
                ty.data(),
                TypeData::Tuple(_)
                    | TypeData::Array { .. }
                    | TypeData::Function(_)
                    | TypeData::NamedFunction { .. }
                    | TypeData::Closure(_)
            );
            if is_magic_shape && self.type_is_clone(sp, ty) {
                return Some(found_cb(ImplRef::new_bound(ty, None), false));
            }
        } else if is_lang(&self.lang.sized, trait_path) {
            if self.type_is_sized(sp, ty) {
                return Some(found_cb(ImplRef::new_bound(ty, None), false));
            }
        } else if is_lang(&self.lang.unsize, trait_path) {
            let trait_params = match trait_params {
                Some(p) => p,
                None => base::bug!(sp, "resolver", "Unsize query without parameters"),
            };
            let dst_ty = &trait_params.types[0];
            if self.can_unsize(sp, dst_ty, ty) {
                return Some(found_cb(ImplRef::new_bound(ty, Some(trait_params)), false));
            }
        } else if self.version >= base::TargetVersion::V1_54
            && is_lang(&self.lang.discriminant_kind, trait_path)
        {
            return Some(self.builtin_discriminant_kind(sp, trait_params, ty, found_cb));
        } else if self.version >= base::TargetVersion::V1_54
            && is_lang(&self.lang.pointee, trait_path)
        {
            return Some(self.builtin_pointee(sp, trait_params, ty, found_cb));
        }
        None
    }

    fn builtin_discriminant_kind(
        &self,
        _sp: Span,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
    ) -> bool {
        let discriminant = IStr::new("Discriminant");
        let src = GenericPath::from(self.lang.discriminant_kind.clone().unwrap_or_default());
        let is_opaque_or_generic = match ty.data() {
            TypeData::Generic(_) => true,
            TypeData::Path { binding: TypePathBinding::Opaque, .. } => true,
            _ => false,
        };
        if is_opaque_or_generic {
            // Leave the associated type unresolved.
            return found_cb(ImplRef::new_bound(ty, trait_params), false);
        }
        let tag_ty = match ty.data() {
            TypeData::Path { path: Path::Generic(gp), binding: TypePathBinding::Enum } => {
                match self.krate.get_enum_by_path(&gp.path) {
                    Some(def) => Some(enum_tag_type(def)),
                    None => None,
                }
            }
            _ => None,
        };
        let mut assoc = AtyMap::new();
        assoc.insert(
            discriminant,
            AtyEqual {
                source_trait: src,
                ty: tag_ty.unwrap_or_else(TypeRef::new_unit),
            },
        );
        found_cb(ImplRef::new_bound_with(ty, trait_params, assoc), false)
    }

    fn builtin_pointee(
        &self,
        sp: Span,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
    ) -> bool {
        let metadata = IStr::new("Metadata");
        let src = GenericPath::from(self.lang.pointee.clone().unwrap_or_default());
        let mk = |meta_ty: TypeRef| {
            let mut assoc = AtyMap::new();
            assoc.insert(metadata.clone(), AtyEqual { source_trait: src.clone(), ty: meta_ty });
            assoc
        };
        match self.metadata_type(sp, ty) {
            MetadataType::None | MetadataType::Zero => {
                found_cb(ImplRef::new_bound_with(ty, trait_params, mk(TypeRef::new_unit())), false)
            }
            MetadataType::Slice => found_cb(
                ImplRef::new_bound_with(ty, trait_params, mk(CoreType::Usize.into())),
                false,
            ),
            MetadataType::TraitObject => {
                let meta = match &self.lang.dyn_metadata {
                    Some(p) => TypeRef::new_path(
                        Path::Generic(GenericPath::new(
                            p.clone(),
                            PathParams::with_types(vec![ty.clone()]),
                        )),
                        TypePathBinding::Struct,
                    ),
                    None => base::fatal!(sp, "missing lang item `dyn_metadata`"),
                };
                found_cb(ImplRef::new_bound_with(ty, trait_params, mk(meta)), false)
            }
            MetadataType::Unknown => {
                // Unbounded: implements the trait, metadata unknowable here.
                found_cb(ImplRef::new_bound(ty, trait_params), false)
            }
        }
    }

    /// Magic impls for built-in type shapes (tuples, the fn-call family,
    /// generators).
    pub(crate) fn find_impl_magic(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
    ) -> Option<bool> {
        let is_fn_family = is_lang(&self.lang.fn_, trait_path)
            || is_lang(&self.lang.fn_mut, trait_path)
            || is_lang(&self.lang.fn_once, trait_path);

        match ty.data() {
            TypeData::Tuple(_)
                if self.version >= base::TargetVersion::V1_74
                    && is_lang(&self.lang.tuple_trait, trait_path) =>
            {
                Some(found_cb(ImplRef::new_bound(ty, None), false))
            }
            TypeData::Function(ft) if is_fn_family => {
                Some(self.fn_family_impl(sp, trait_params, ty, &ft.args, &ft.ret, found_cb))
            }
            TypeData::NamedFunction { path, .. } if is_fn_family => {
                let (args, ret) = self.named_function_signature(sp, path)?;
                Some(self.fn_family_impl(sp, trait_params, ty, &args, &ret, found_cb))
            }
            TypeData::Closure(c) if is_fn_family => {
                // The capture class caps which of the family apply.
                let excluded = match c.class {
                    ClosureClass::Once => {
                        is_lang(&self.lang.fn_mut, trait_path)
                            || is_lang(&self.lang.fn_, trait_path)
                    }
                    ClosureClass::Mut => is_lang(&self.lang.fn_, trait_path),
                    ClosureClass::Shared
                    | ClosureClass::NoCapture
                    | ClosureClass::Unknown => false,
                };
                if excluded {
                    return Some(false);
                }
                if let Some(p) = trait_params {
                    if !self.fn_args_match(sp, p, &c.args) {
                        return Some(false);
                    }
                }
                let params = trait_params.cloned().unwrap_or_else(|| {
                    PathParams::with_types(vec![TypeRef::new_tuple(c.args.clone())])
                });
                let mut assoc = AtyMap::new();
                assoc.insert(
                    IStr::new("Output"),
                    AtyEqual {
                        source_trait: GenericPath::new(
                            self.lang.fn_once.clone().unwrap_or_default(),
                            params.clone(),
                        ),
                        ty: c.ret.clone(),
                    },
                );
                Some(found_cb(ImplRef::new_bound_with(ty, Some(&params), assoc), false))
            }
            TypeData::Generator(g)
                if self.version >= base::TargetVersion::V1_39
                    && is_lang(&self.lang.generator, trait_path) =>
            {
                let src = GenericPath::from(trait_path.clone());
                let mut assoc = AtyMap::new();
                assoc.insert(
                    IStr::new("Yield"),
                    AtyEqual { source_trait: src.clone(), ty: g.yield_ty.clone() },
                );
                assoc.insert(
                    IStr::new("Return"),
                    AtyEqual { source_trait: src, ty: g.ret_ty.clone() },
                );
                let mut params = PathParams::new();
                if self.version >= base::TargetVersion::V1_74 {
                    params.types.push(g.resume_ty.clone());
                }
                Some(found_cb(ImplRef::new_bound_with(ty, Some(&params), assoc), false))
            }
            _ => None,
        }
    }

    fn fn_args_match(&self, _sp: Span, trait_params: &PathParams, args: &[TypeRef]) -> bool {
        let des = match trait_params.types.get(0).map(|t| t.data()) {
            Some(TypeData::Tuple(tys)) => tys,
            _ => return true,
        };
        if des.len() != args.len() {
            return false;
        }
        des.iter()
            .zip(args)
            .all(|(a, b)| unify::compare_types_fuzzy(a, b) != Compare::Unequal)
    }

    fn fn_family_impl(
        &self,
        sp: Span,
        trait_params: Option<&PathParams>,
        ty: &TypeRef,
        args: &[TypeRef],
        ret: &TypeRef,
        found_cb: &mut dyn FnMut(ImplRef<'a>, bool) -> bool,
    ) -> bool {
        if let Some(p) = trait_params {
            if !self.fn_args_match(sp, p, args) {
                return false;
            }
        }
        let params = PathParams::with_types(vec![TypeRef::new_tuple(args.to_vec())]);
        let mut assoc = AtyMap::new();
        assoc.insert(
            IStr::new("Output"),
            AtyEqual {
                source_trait: GenericPath::new(
                    self.lang.fn_once.clone().unwrap_or_default(),
                    params.clone(),
                ),
                ty: ret.clone(),
            },
        );
        found_cb(ImplRef::new_bound_with(ty, Some(&params), assoc), false)
    }

    /// Signature of a named-function type, with its generic arguments
    /// substituted.
    fn named_function_signature(
        &self,
        sp: Span,
        path: &Path,
    ) -> Option<(Vec<TypeRef>, TypeRef)> {
        let gp = path.as_generic()?;
        match self.krate.get_valitem_by_path(&gp.path)? {
            hir::ValueItem::Function(f) => {
                let ms = MonomorphState {
                    self_ty: None,
                    impl_params: None,
                    method_params: Some(gp.params.clone()),
                    hrb_params: None,
                };
                let args =
                    f.args.iter().map(|(_, t)| ms.monomorph_type(sp, t, true)).collect();
                let ret = ms.monomorph_type(sp, &f.ret, true);
                Some((args, ret))
            }
            hir::ValueItem::StructConstructor(sc) => {
                let def = self.krate.get_struct_by_path(&sc.ty)?;
                let ms = MonomorphState::new_impl(None, gp.params.clone());
                let args = match &def.data {
                    StructData::Tuple(ents) => ents
                        .iter()
                        .map(|e| ms.monomorph_type(sp, &e.item, true))
                        .collect(),
                    _ => return None,
                };
                let ret = TypeRef::new_path(
                    Path::Generic(GenericPath::new(sc.ty.clone(), gp.params.clone())),
                    TypePathBinding::Struct,
                );
                Some((args, ret))
            }
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Marker queries

    fn has_env_bound(&self, ty: &TypeRef, trait_path: Option<&SimplePath>) -> bool {
        let trait_path = match trait_path {
            Some(p) => p,
            None => return false,
        };
        self.trait_bounds
            .range((ty.clone(), GenericPath::default())..)
            .take_while(|((t, _), _)| t == ty)
            .any(|((_, tp), _)| &tp.path == trait_path)
    }

    pub fn type_is_copy(&self, sp: Span, ty: &TypeRef) -> bool {
        if let Some(&v) = self.copy_cache.borrow().get(ty) {
            return v;
        }
        let rv = self.type_is_copy_inner(sp, ty);
        self.copy_cache.borrow_mut().insert(ty.clone(), rv);
        rv
    }

    fn type_is_copy_inner(&self, sp: Span, ty: &TypeRef) -> bool {
        match ty.data() {
            TypeData::Infer { class } => {
                matches!(class, InferClass::Integer | InferClass::Float)
            }
            TypeData::Diverge => true,
            TypeData::Primitive(p) => *p != CoreType::Str,
            TypeData::Generic(_) => {
                self.has_env_bound(ty, self.lang.copy.as_ref())
                    || self.search_copy_impl(sp, ty)
            }
            TypeData::Path { binding: TypePathBinding::Opaque, .. } => {
                self.search_copy_impl(sp, ty)
            }
            TypeData::Path { path: Path::Generic(gp), binding } => {
                let markings = match (binding, self.krate.get_typeitem_by_path(&gp.path)) {
                    (TypePathBinding::Struct, Some(TypeItem::Struct(d))) => Some(&d.markings),
                    (TypePathBinding::Enum, Some(TypeItem::Enum(d))) => Some(&d.markings),
                    (TypePathBinding::Union, Some(TypeItem::Union(d))) => Some(&d.markings),
                    (TypePathBinding::ExternType, Some(TypeItem::ExternType(d))) => {
                        Some(&d.markings)
                    }
                    _ => None,
                };
                match markings {
                    Some(m) => m.is_copy,
                    None => false,
                }
            }
            TypeData::Path { .. } => false,
            TypeData::TraitObject(_) | TypeData::ErasedType(_) => false,
            TypeData::Array { size, .. } if size.as_known() == Some(0) => true,
            TypeData::Array { inner, .. } => self.type_is_copy(sp, inner),
            TypeData::Slice { .. } => false,
            TypeData::Tuple(items) => items.iter().all(|t| self.type_is_copy(sp, t)),
            TypeData::Borrow { btype: hir::BorrowType::Shared, .. } => true,
            TypeData::Borrow { .. } => false,
            TypeData::Pointer { .. } => true,
            TypeData::NamedFunction { .. } | TypeData::Function(_) => true,
            TypeData::Closure(c) => c.is_copy,
            TypeData::Generator(_) => false,
        }
    }

    /// Impl/bound search for `Copy`, skipping the built-in handler (which
    /// would recurse straight back here).
    fn search_copy_impl(&self, sp: Span, ty: &TypeRef) -> bool {
        let copy = match &self.lang.copy {
            Some(p) => p,
            None => return false,
        };
        self.find_impl(sp, copy, None, ty, &mut |_, _| true, true)
    }

    pub fn type_is_clone(&self, sp: Span, ty: &TypeRef) -> bool {
        if self.version < base::TargetVersion::V1_29 {
            base::bug!(sp, "resolver", "type_is_clone not valid before 1.29");
        }
        if let Some(&v) = self.clone_cache.borrow().get(ty) {
            return v;
        }
        let rv = self.type_is_clone_inner(sp, ty);
        self.clone_cache.borrow_mut().insert(ty.clone(), rv);
        rv
    }

    fn type_is_clone_inner(&self, sp: Span, ty: &TypeRef) -> bool {
        match ty.data() {
            TypeData::Tuple(items) => items.iter().all(|t| self.type_is_clone(sp, t)),
            TypeData::Array { size, .. } if size.as_known() == Some(0) => true,
            TypeData::Array { inner, .. } => self.type_is_clone(sp, inner),
            TypeData::Function(_) | TypeData::NamedFunction { .. } => true,
            // Closure captures clone iff they copy; per-capture cloning is a
            // typeck-time refinement this resolver does not see.
            TypeData::Closure(c) => c.is_copy,
            TypeData::Generator(_) => false,
            _ => {
                if self.type_is_copy(sp, ty) {
                    return true;
                }
                let clone = match &self.lang.clone {
                    Some(p) => p,
                    None => return false,
                };
                self.find_impl(sp, clone, None, ty, &mut |_, _| true, true)
            }
        }
    }

    pub fn type_is_sized(&self, sp: Span, ty: &TypeRef) -> bool {
        self.metadata_type(sp, ty) == MetadataType::None
    }

    fn generic_param_is_sized(&self, g: &GenericRef) -> bool {
        let def = match g.group() {
            hir::GENERIC_GROUP_IMPL => {
                self.impl_generics.and_then(|p| p.types.get(g.idx()))
            }
            hir::GENERIC_GROUP_METHOD => {
                self.item_generics.and_then(|p| p.types.get(g.idx()))
            }
            _ => None,
        };
        def.map_or(true, |d| d.is_sized)
    }

    /// The pointer-metadata class of a type (`None` means `Sized`).
    pub fn metadata_type(&self, sp: Span, ty: &TypeRef) -> MetadataType {
        match ty.data() {
            TypeData::Generic(g) if g.is_self() => self.self_metadata.get(),
            TypeData::Generic(g) => {
                if self.generic_param_is_sized(g) {
                    MetadataType::None
                } else {
                    MetadataType::Unknown
                }
            }
            TypeData::Infer { .. } => MetadataType::Unknown,
            TypeData::Diverge => MetadataType::None,
            TypeData::Primitive(CoreType::Str) => MetadataType::Slice,
            TypeData::Primitive(_) => MetadataType::None,
            TypeData::Slice { .. } => MetadataType::Slice,
            TypeData::TraitObject(_) => MetadataType::TraitObject,
            TypeData::ErasedType(e) => {
                if e.is_sized {
                    MetadataType::None
                } else {
                    MetadataType::Unknown
                }
            }
            TypeData::Path { binding: TypePathBinding::Opaque, .. } => {
                if self.has_env_bound(ty, self.lang.sized.as_ref()) {
                    MetadataType::None
                } else if self.find_impl_is_sized_via_bounds(sp, ty) {
                    MetadataType::None
                } else {
                    MetadataType::Unknown
                }
            }
            TypeData::Path { path: Path::Generic(gp), binding } => match binding {
                TypePathBinding::Struct => {
                    let def = match self.krate.get_struct_by_path(&gp.path) {
                        Some(d) => d,
                        None => base::bug!(sp, "resolver", "struct {} not found", gp.path),
                    };
                    match def.struct_markings.dst_type {
                        StructDstType::None => MetadataType::None,
                        StructDstType::Slice => MetadataType::Slice,
                        StructDstType::TraitObject => MetadataType::TraitObject,
                        StructDstType::Possible => {
                            let idx = def.struct_markings.unsized_param.unwrap_or(0);
                            match gp.params.types.get(idx) {
                                Some(t) => self.metadata_type(sp, t),
                                None => MetadataType::Unknown,
                            }
                        }
                    }
                }
                TypePathBinding::ExternType => MetadataType::Zero,
                TypePathBinding::Enum | TypePathBinding::Union => MetadataType::None,
                TypePathBinding::Unbound | TypePathBinding::Opaque => MetadataType::Unknown,
            },
            TypeData::Path { .. } => MetadataType::Unknown,
            TypeData::Array { .. } | TypeData::Tuple(_) => MetadataType::None,
            TypeData::Borrow { .. } | TypeData::Pointer { .. } => MetadataType::None,
            TypeData::NamedFunction { .. } | TypeData::Function(_) => MetadataType::None,
            TypeData::Closure(_) | TypeData::Generator(_) => MetadataType::None,
        }
    }

    /// Sized-ness of an opaque projection through its bounds.
    fn find_impl_is_sized_via_bounds(&self, sp: Span, ty: &TypeRef) -> bool {
        let sized = match &self.lang.sized {
            Some(p) => p,
            None => return false,
        };
        self.find_impl(sp, sized, None, ty, &mut |_, _| true, true)
    }

    // -----------------------------------------------------------------------

    /// Can `src_ty` coerce-unsize to `dst_ty`?
    pub fn can_unsize(&self, sp: Span, dst_ty: &TypeRef, src_ty: &TypeRef) -> bool {
        log::trace!("can_unsize({} <- {})", dst_ty, src_ty);
        // (a) identical types
        if dst_ty == src_ty {
            return true;
        }

        // (b) an environment bound `Src: Unsize<Dst>`
        if let Some(unsize) = &self.lang.unsize {
            let found = self
                .trait_bounds
                .range((src_ty.clone(), GenericPath::default())..)
                .take_while(|((t, _), _)| t == src_ty)
                .any(|((_, tp), _)| {
                    &tp.path == unsize && tp.params.types.get(0) == Some(dst_ty)
                });
            if found {
                return true;
            }
            // (c) associated-type bounds on an opaque projection
            if matches!(src_ty.data(), TypeData::Path { binding: TypePathBinding::Opaque, .. }) {
                let params = PathParams::with_types(vec![dst_ty.clone()]);
                let mut hit = false;
                self.find_impl_opaque_bounds_probe(sp, unsize, &params, src_ty, &mut hit);
                if hit {
                    return true;
                }
            }
        }

        match (dst_ty.data(), src_ty.data()) {
            // (g) [T; n] -> [T]
            (TypeData::Slice { inner: d }, TypeData::Array { inner: s, .. }) => d == s,

            // (d) Struct<..., T, ...> -> Struct<..., U, ...>
            (
                TypeData::Path { path: Path::Generic(dgp), .. },
                TypeData::Path { path: Path::Generic(sgp), .. },
            ) => {
                if dgp.path != sgp.path {
                    return false;
                }
                let def = match self.krate.get_struct_by_path(&sgp.path) {
                    Some(d) => d,
                    None => return false,
                };
                if !def.struct_markings.can_unsize {
                    return false;
                }
                let idx = match def.struct_markings.unsized_param {
                    Some(i) => i,
                    None => return false,
                };
                let (d_param, s_param) =
                    match (dgp.params.types.get(idx), sgp.params.types.get(idx)) {
                        (Some(d), Some(s)) => (d, s),
                        _ => return false,
                    };
                self.can_unsize(sp, d_param, s_param)
            }

            // (e) dyn Trait' -> dyn Trait (supertrait or identical, markers superset)
            (TypeData::TraitObject(dst), TypeData::TraitObject(src)) => {
                let principal_ok = if dst.trait_.path == src.trait_.path {
                    true
                } else {
                    let mut hit = false;
                    self.find_named_trait_in_trait(
                        sp,
                        &dst.trait_.path.path,
                        &dst.trait_.path.params,
                        &src.trait_.path.path,
                        &src.trait_.path.params,
                        src_ty,
                        &mut |_params, _assoc| {
                            hit = true;
                            true
                        },
                    );
                    hit
                };
                if !principal_ok {
                    return false;
                }
                dst.markers.iter().all(|dm| {
                    src.markers.iter().any(|sm| sm.path == dm.path)
                        || src.trait_.path.path == dm.path
                })
            }

            // (f) T -> dyn Trait
            (TypeData::TraitObject(dst), _) => {
                let principal = &dst.trait_;
                let mut assoc_ok = true;
                let found = self.find_impl(
                    sp,
                    &principal.path.path,
                    Some(&principal.path.params),
                    src_ty,
                    &mut |ir, _fuzzy| {
                        for (name, req) in &principal.type_bounds {
                            let mut have = match ir.get_type(sp, name) {
                                Some(t) => t,
                                None => {
                                    assoc_ok = false;
                                    break;
                                }
                            };
                            self.expand_associated_types(sp, &mut have);
                            if unify::compare_types_fuzzy(&have, &req.ty) == Compare::Unequal {
                                assoc_ok = false;
                                break;
                            }
                        }
                        true
                    },
                    false,
                );
                if !found || !assoc_ok {
                    return false;
                }
                dst.markers.iter().all(|m| {
                    self.find_impl(sp, &m.path, Some(&m.params), src_ty, &mut |_, _| true, false)
                })
            }

            _ => false,
        }
    }

    /// Probe the opaque-projection bound rules for a specific trait query.
    fn find_impl_opaque_bounds_probe(
        &self,
        sp: Span,
        trait_path: &SimplePath,
        trait_params: &PathParams,
        ty: &TypeRef,
        hit: &mut bool,
    ) {
        *hit = self.find_impl(sp, trait_path, Some(trait_params), ty, &mut |_, _| true, true);
    }

    // -----------------------------------------------------------------------

    /// Is the type uninhabited (contains no values)?
    pub fn type_is_impossible(&self, sp: Span, ty: &TypeRef) -> bool {
        let mut seen = FxHashSet::default();
        self.type_is_impossible_inner(sp, ty, &mut seen)
    }

    fn type_is_impossible_inner(
        &self,
        sp: Span,
        ty: &TypeRef,
        seen: &mut FxHashSet<TypeRef>,
    ) -> bool {
        if !seen.insert(ty.clone()) {
            // Recursive type: assume inhabited on the cycle.
            return false;
        }
        match ty.data() {
            TypeData::Diverge => true,
            TypeData::Tuple(items) => {
                items.iter().any(|t| self.type_is_impossible_inner(sp, t, seen))
            }
            TypeData::Array { inner, size } => {
                size.as_known() != Some(0) && self.type_is_impossible_inner(sp, inner, seen)
            }
            TypeData::Path { path: Path::Generic(gp), binding: TypePathBinding::Enum } => {
                match self.krate.get_enum_by_path(&gp.path) {
                    Some(def) => match &def.class {
                        EnumClass::Data(variants) if variants.is_empty() => true,
                        EnumClass::Value { variants, .. } if variants.is_empty() => true,
                        EnumClass::Data(variants) => {
                            let ms =
                                MonomorphState::new_impl(Some(ty.clone()), gp.params.clone());
                            variants.iter().all(|v| {
                                let vt = ms.monomorph_type(sp, &v.ty, true);
                                self.type_is_impossible_inner(sp, &vt, seen)
                            })
                        }
                        EnumClass::Value { .. } => false,
                    },
                    None => false,
                }
            }
            TypeData::Path { path: Path::Generic(gp), binding: TypePathBinding::Struct } => {
                match self.krate.get_struct_by_path(&gp.path) {
                    Some(def) => {
                        let ms = MonomorphState::new_impl(Some(ty.clone()), gp.params.clone());
                        let mut fields: Vec<&TypeRef> = Vec::new();
                        match &def.data {
                            StructData::Unit => {}
                            StructData::Tuple(ents) => fields.extend(ents.iter().map(|e| &e.item)),
                            StructData::Named(ents) => {
                                fields.extend(ents.iter().map(|(_, e)| &e.item))
                            }
                        }
                        fields.iter().any(|f| {
                            let ft = ms.monomorph_type(sp, f, true);
                            self.type_is_impossible_inner(sp, &ft, seen)
                        })
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// `Equal` when the type transitively contains an `UnsafeCell`,
    /// `Fuzzy` when that depends on generics. `&mut T` is `Unequal`: the
    /// cell definition of interior mutability, not the aliasing one.
    pub fn type_is_interior_mutable(&self, sp: Span, ty: &TypeRef) -> Compare {
        match ty.data() {
            TypeData::Infer { .. } => Compare::Fuzzy,
            TypeData::Generic(_) => Compare::Fuzzy,
            TypeData::Path { binding: TypePathBinding::Opaque, .. } => Compare::Fuzzy,
            TypeData::Path { path: Path::Generic(gp), binding } => {
                if is_lang(&self.lang.unsafe_cell, &gp.path) {
                    return Compare::Equal;
                }
                let ms = MonomorphState::new_impl(Some(ty.clone()), gp.params.clone());
                let mut fields: Vec<TypeRef> = Vec::new();
                match (binding, self.krate.get_typeitem_by_path(&gp.path)) {
                    (TypePathBinding::Struct, Some(TypeItem::Struct(def))) => match &def.data {
                        StructData::Unit => {}
                        StructData::Tuple(ents) => {
                            fields.extend(ents.iter().map(|e| e.item.clone()))
                        }
                        StructData::Named(ents) => {
                            fields.extend(ents.iter().map(|(_, e)| e.item.clone()))
                        }
                    },
                    (TypePathBinding::Enum, Some(TypeItem::Enum(def))) => {
                        if let EnumClass::Data(variants) = &def.class {
                            fields.extend(variants.iter().map(|v| v.ty.clone()));
                        }
                    }
                    (TypePathBinding::Union, Some(TypeItem::Union(def))) => {
                        fields.extend(def.variants.iter().map(|(_, e)| e.item.clone()));
                    }
                    _ => return Compare::Fuzzy,
                }
                let mut rv = Compare::Unequal;
                for f in fields {
                    let ft = ms.monomorph_type(sp, &f, true);
                    match self.type_is_interior_mutable(sp, &ft) {
                        Compare::Equal => return Compare::Equal,
                        Compare::Fuzzy => rv = Compare::Fuzzy,
                        Compare::Unequal => {}
                    }
                }
                rv
            }
            TypeData::Path { .. } => Compare::Fuzzy,
            TypeData::Tuple(items) => {
                let mut rv = Compare::Unequal;
                for t in items {
                    match self.type_is_interior_mutable(sp, t) {
                        Compare::Equal => return Compare::Equal,
                        Compare::Fuzzy => rv = Compare::Fuzzy,
                        Compare::Unequal => {}
                    }
                }
                rv
            }
            TypeData::Array { inner, .. } | TypeData::Slice { inner } => {
                self.type_is_interior_mutable(sp, inner)
            }
            _ => Compare::Unequal,
        }
    }

    /// Does dropping a value of this type run any code?
    pub fn type_needs_drop_glue(&self, sp: Span, ty: &TypeRef) -> bool {
        if let Some(&v) = self.drop_cache.borrow().get(ty) {
            return v;
        }
        let rv = self.type_needs_drop_glue_inner(sp, ty);
        self.drop_cache.borrow_mut().insert(ty.clone(), rv);
        rv
    }

    fn type_needs_drop_glue_inner(&self, sp: Span, ty: &TypeRef) -> bool {
        match ty.data() {
            TypeData::Infer { .. } => true,
            TypeData::Diverge => false,
            TypeData::Primitive(_) => false,
            TypeData::Generic(_) => !self.type_is_copy(sp, ty),
            TypeData::Path { binding: TypePathBinding::Opaque, .. } => {
                !self.type_is_copy(sp, ty)
            }
            TypeData::Path { path: Path::Generic(gp), binding } => {
                if self.is_type_phantom_data(ty).is_some() {
                    return false;
                }
                if is_lang(&self.lang.owned_box, &gp.path) {
                    return true;
                }
                let ms = MonomorphState::new_impl(Some(ty.clone()), gp.params.clone());
                let check_fields = |fields: Vec<TypeRef>| {
                    fields
                        .into_iter()
                        .any(|f| self.type_needs_drop_glue(sp, &ms.monomorph_type(sp, &f, true)))
                };
                match (binding, self.krate.get_typeitem_by_path(&gp.path)) {
                    (TypePathBinding::Struct, Some(TypeItem::Struct(def))) => {
                        if def.markings.has_drop_impl {
                            return true;
                        }
                        match &def.data {
                            StructData::Unit => false,
                            StructData::Tuple(ents) => {
                                check_fields(ents.iter().map(|e| e.item.clone()).collect())
                            }
                            StructData::Named(ents) => check_fields(
                                ents.iter().map(|(_, e)| e.item.clone()).collect(),
                            ),
                        }
                    }
                    (TypePathBinding::Enum, Some(TypeItem::Enum(def))) => {
                        if def.markings.has_drop_impl {
                            return true;
                        }
                        match &def.class {
                            EnumClass::Data(variants) => {
                                check_fields(variants.iter().map(|v| v.ty.clone()).collect())
                            }
                            EnumClass::Value { .. } => false,
                        }
                    }
                    (TypePathBinding::Union, Some(TypeItem::Union(def))) => {
                        // Union fields are never dropped implicitly.
                        def.markings.has_drop_impl
                    }
                    (TypePathBinding::ExternType, _) => false,
                    _ => true,
                }
            }
            TypeData::Path { .. } => true,
            TypeData::TraitObject(_) | TypeData::ErasedType(_) => true,
            TypeData::Array { inner, size } => {
                size.as_known() != Some(0) && self.type_needs_drop_glue(sp, inner)
            }
            TypeData::Slice { inner } => self.type_needs_drop_glue(sp, inner),
            TypeData::Tuple(items) => items.iter().any(|t| self.type_needs_drop_glue(sp, t)),
            TypeData::Borrow { .. } | TypeData::Pointer { .. } => false,
            TypeData::NamedFunction { .. } | TypeData::Function(_) => false,
            TypeData::Closure(_) | TypeData::Generator(_) => true,
        }
    }

    /// `Box<T>` → `T`.
    pub fn is_type_owned_box<'t>(&self, ty: &'t TypeRef) -> Option<&'t TypeRef> {
        self.struct_first_param(ty, self.lang.owned_box.as_ref()?)
    }

    /// `PhantomData<T>` → `T`.
    pub fn is_type_phantom_data<'t>(&self, ty: &'t TypeRef) -> Option<&'t TypeRef> {
        self.struct_first_param(ty, self.lang.phantom_data.as_ref()?)
    }

    fn struct_first_param<'t>(
        &self,
        ty: &'t TypeRef,
        want_path: &SimplePath,
    ) -> Option<&'t TypeRef> {
        match ty.data() {
            TypeData::Path { path: Path::Generic(gp), .. } if &gp.path == want_path => {
                gp.params.types.get(0)
            }
            _ => None,
        }
    }

    /// Type of a (possibly tuple-indexed) field of a nominal type, with the
    /// nominal type's parameters applied.
    pub fn get_field_type(&self, sp: Span, ty: &TypeRef, name: &str) -> Option<TypeRef> {
        let gp = match ty.data() {
            TypeData::Path { path: Path::Generic(gp), .. } => gp,
            TypeData::Tuple(items) => {
                let idx: usize = name.parse().ok()?;
                return items.get(idx).cloned();
            }
            _ => return None,
        };
        let ms = MonomorphState::new_impl(Some(ty.clone()), gp.params.clone());
        match self.krate.get_typeitem_by_path(&gp.path)? {
            TypeItem::Struct(def) => match &def.data {
                StructData::Named(ents) => {
                    let (_, e) = ents.iter().find(|(n, _)| n == name)?;
                    Some(ms.monomorph_type(sp, &e.item, true))
                }
                StructData::Tuple(ents) => {
                    let idx: usize = name.parse().ok()?;
                    Some(ms.monomorph_type(sp, &ents.get(idx)?.item, true))
                }
                StructData::Unit => None,
            },
            TypeItem::Union(def) => {
                let (_, e) = def.variants.iter().find(|(n, _)| n == name)?;
                Some(ms.monomorph_type(sp, &e.item, true))
            }
            _ => None,
        }
    }
}

fn enum_tag_type(def: &hir::Enum) -> TypeRef {
    let repr = match &def.class {
        EnumClass::Value { repr, .. } => *repr,
        EnumClass::Data(_) => hir::EnumRepr::Auto,
    };
    let core = match repr {
        hir::EnumRepr::Auto | hir::EnumRepr::Isize => CoreType::Isize,
        hir::EnumRepr::Usize => CoreType::Usize,
        hir::EnumRepr::U8 => CoreType::U8,
        hir::EnumRepr::U16 => CoreType::U16,
        hir::EnumRepr::U32 => CoreType::U32,
        hir::EnumRepr::U64 => CoreType::U64,
        hir::EnumRepr::I8 => CoreType::I8,
        hir::EnumRepr::I16 => CoreType::I16,
        hir::EnumRepr::I32 => CoreType::I32,
        hir::EnumRepr::I64 => CoreType::I64,
    };
    core.into()
}
