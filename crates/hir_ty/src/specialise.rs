//! Specialisation ordering and coherence overlap between trait impls.

use hir::ty::{TypeData, TypeRef};
use hir::{Compare, ConstGeneric, Crate, GenericBound, GenericRef, LifetimeRef, TraitImpl, TraitPath};

use crate::unify::{self, MatchGenerics};

/// Pairwise specificity of two types in impl headers.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Specificity {
    Equal,
    /// Left is the more specific.
    LeftMore,
    RightMore,
    /// Contradictory orderings in sub-positions: neither is more specific.
    Mixed,
}

impl Specificity {
    fn combine(self, other: Specificity) -> Specificity {
        use Specificity::*;
        match (self, other) {
            (Equal, x) | (x, Equal) => x,
            (Mixed, _) | (_, Mixed) => Mixed,
            (LeftMore, LeftMore) => LeftMore,
            (RightMore, RightMore) => RightMore,
            (LeftMore, RightMore) | (RightMore, LeftMore) => Mixed,
        }
    }
}

fn is_generic(ty: &TypeRef) -> bool {
    matches!(ty.data(), TypeData::Generic(_))
}

fn type_specificity(a: &TypeRef, b: &TypeRef) -> Specificity {
    match (is_generic(a), is_generic(b)) {
        (true, true) => return Specificity::Equal,
        (true, false) => return Specificity::RightMore,
        (false, true) => return Specificity::LeftMore,
        (false, false) => {}
    }
    match (a.data(), b.data()) {
        (TypeData::Primitive(pa), TypeData::Primitive(pb)) => {
            if pa == pb {
                Specificity::Equal
            } else {
                Specificity::Mixed
            }
        }
        (TypeData::Path { path: pa, .. }, TypeData::Path { path: pb, .. }) => {
            match (pa.as_generic(), pb.as_generic()) {
                (Some(ga), Some(gb)) if ga.path == gb.path => {
                    typelist_specificity(&ga.params.types, &gb.params.types)
                }
                _ => Specificity::Mixed,
            }
        }
        (TypeData::TraitObject(ta), TypeData::TraitObject(tb)) => {
            if ta.trait_.path.path != tb.trait_.path.path {
                return Specificity::Mixed;
            }
            let mut ms: Vec<_> = ta.markers.iter().map(|m| &m.path).collect();
            let mut os: Vec<_> = tb.markers.iter().map(|m| &m.path).collect();
            ms.sort();
            os.sort();
            if ms != os {
                return Specificity::Mixed;
            }
            typelist_specificity(&ta.trait_.path.params.types, &tb.trait_.path.params.types)
        }
        (TypeData::Function(fa), TypeData::Function(fb)) => {
            if fa.args.len() != fb.args.len() {
                return Specificity::Mixed;
            }
            let mut s = type_specificity(&fa.ret, &fb.ret);
            for (x, y) in fa.args.iter().zip(&fb.args) {
                s = s.combine(type_specificity(x, y));
            }
            s
        }
        (TypeData::Borrow { btype: ba, inner: ia, .. }, TypeData::Borrow { btype: bb, inner: ib, .. })
            if ba == bb =>
        {
            type_specificity(ia, ib)
        }
        (TypeData::Pointer { btype: ba, inner: ia }, TypeData::Pointer { btype: bb, inner: ib })
            if ba == bb =>
        {
            type_specificity(ia, ib)
        }
        (TypeData::Slice { inner: ia }, TypeData::Slice { inner: ib }) => {
            type_specificity(ia, ib)
        }
        (TypeData::Array { inner: ia, .. }, TypeData::Array { inner: ib, .. }) => {
            type_specificity(ia, ib)
        }
        (TypeData::Tuple(xa), TypeData::Tuple(xb)) => {
            if xa.len() != xb.len() {
                return Specificity::Mixed;
            }
            typelist_specificity(xa, xb)
        }
        _ => {
            if a == b {
                Specificity::Equal
            } else {
                Specificity::Mixed
            }
        }
    }
}

fn typelist_specificity(a: &[TypeRef], b: &[TypeRef]) -> Specificity {
    if a.len() != b.len() {
        return Specificity::Mixed;
    }
    let mut s = Specificity::Equal;
    for (x, y) in a.iter().zip(b) {
        s = s.combine(type_specificity(x, y));
    }
    s
}

/// Every trait bound of an impl, flattened through the supertrait closures.
fn flattened_bounds(krate: &Crate, imp: &TraitImpl) -> Vec<(TypeRef, TraitPath)> {
    let mut rv = Vec::new();
    for bound in &imp.params.bounds {
        if let GenericBound::TraitBound { ty, trait_, .. } = bound {
            rv.push((ty.clone(), trait_.clone()));
            if let Some(trait_def) = krate.get_trait_by_path(&trait_.path.path) {
                let ms = crate::monomorph::MonomorphState {
                    self_ty: Some(ty.clone()),
                    impl_params: Some(trait_.path.params.clone()),
                    method_params: None,
                    hrb_params: None,
                };
                for pt in &trait_def.all_parent_traits {
                    use crate::monomorph::Monomorphiser;
                    let pt = ms.monomorph_traitpath(base::Span::default(), pt, true, false);
                    rv.push((ty.clone(), pt));
                }
            }
        }
    }
    rv.sort();
    rv.dedup();
    rv
}

/// Is `a` strictly more specific than `b`?
pub fn more_specific_than(krate: &Crate, a: &TraitImpl, b: &TraitImpl) -> bool {
    // 1. Trait argument lists.
    match typelist_specificity(&a.trait_args.types, &b.trait_args.types) {
        Specificity::LeftMore => return true,
        Specificity::RightMore | Specificity::Mixed => return false,
        Specificity::Equal => {}
    }
    // 2. The self type.
    match type_specificity(&a.ty, &b.ty) {
        Specificity::LeftMore => return true,
        Specificity::RightMore | Specificity::Mixed => return false,
        Specificity::Equal => {}
    }
    // 3. Bound sets: a strict superset of bounds constrains more.
    let ba = flattened_bounds(krate, a);
    let bb = flattened_bounds(krate, b);
    if ba.len() != bb.len() {
        let (small, large) = if ba.len() < bb.len() { (&ba, &bb) } else { (&bb, &ba) };
        if small.iter().all(|x| large.contains(x)) {
            return ba.len() > bb.len();
        }
    }
    // Bound-by-bound: same (type, trait) pairs, more specific trait args win.
    let mut any_more = false;
    for (ty_a, tp_a) in &ba {
        for (ty_b, tp_b) in &bb {
            if ty_a == ty_b && tp_a.path.path == tp_b.path.path {
                match typelist_specificity(&tp_a.path.params.types, &tp_b.path.params.types) {
                    Specificity::LeftMore => any_more = true,
                    Specificity::RightMore | Specificity::Mixed => return false,
                    Specificity::Equal => {}
                }
            }
        }
    }
    any_more
}

/// Binds one side's impl parameters to anything during overlap testing.
struct OverlapMatcher;

impl MatchGenerics for OverlapMatcher {
    fn match_ty(&mut self, _g: &GenericRef, _ty: &TypeRef) -> Compare {
        Compare::Fuzzy
    }
    fn match_val(&mut self, _g: &GenericRef, _v: &ConstGeneric) -> Compare {
        Compare::Fuzzy
    }
    fn match_lft(&mut self, _g: &GenericRef, _lft: LifetimeRef) -> Compare {
        Compare::Equal
    }
}

fn could_match(tpl_ty: &TypeRef, tpl_args: &hir::PathParams, other: &TraitImpl) -> bool {
    let mut m = OverlapMatcher;
    if unify::match_type(&mut m, tpl_ty, &other.ty) == Compare::Unequal {
        return false;
    }
    unify::match_pathparams(&mut m, tpl_args, &other.trait_args) != Compare::Unequal
}

/// Could the two impls apply to a common type? (Coherence check.)
pub fn overlaps_with(krate: &Crate, a: &TraitImpl, b: &TraitImpl) -> bool {
    // Symmetric unification: each side's generics may assume any value.
    if !could_match(&a.ty, &a.trait_args, b) || !could_match(&b.ty, &b.trait_args, a) {
        return false;
    }

    // Bounds-satisfiability under the candidate overlap: a bound whose type
    // still contains generics is assumed satisfiable; concrete bounds must
    // have some impl in the crate.
    let check_bounds = |imp: &TraitImpl| {
        imp.params.bounds.iter().all(|bound| {
            let (ty, tp) = match bound {
                GenericBound::TraitBound { ty, trait_, .. } => (ty, trait_),
                _ => return true,
            };
            if hir::visitor::monomorphise_type_needed(ty) {
                return true;
            }
            krate.find_trait_impls(&tp.path.path, ty, |_| true)
        })
    };
    check_bounds(a) && check_bounds(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hir::ty::CoreType;
    use intern::IStr;

    fn impl_for(ty: TypeRef, n_params: usize) -> TraitImpl {
        let mut params = hir::GenericParams::new();
        for i in 0..n_params {
            params.types.push(hir::TypeParamDef::new(IStr::new(&format!("T{}", i))));
        }
        TraitImpl {
            params,
            trait_args: hir::PathParams::new(),
            ty,
            methods: Default::default(),
            constants: Default::default(),
            statics: Default::default(),
            types: Default::default(),
            src_module: hir::SimplePath::default(),
        }
    }

    #[test]
    fn concrete_beats_generic() {
        let krate = Crate::new(IStr::new("test"));
        let generic = impl_for(TypeRef::new_generic(IStr::new("T"), 0), 1);
        let concrete = impl_for(CoreType::U32.into(), 0);
        assert!(more_specific_than(&krate, &concrete, &generic));
        assert!(!more_specific_than(&krate, &generic, &concrete));
        assert!(overlaps_with(&krate, &concrete, &generic));
    }

    #[test]
    fn distinct_primitives_do_not_overlap() {
        let krate = Crate::new(IStr::new("test"));
        let a = impl_for(CoreType::U32.into(), 0);
        let b = impl_for(CoreType::U64.into(), 0);
        assert!(!overlaps_with(&krate, &a, &b));
    }

    #[test]
    fn mixed_ordering_is_neither() {
        let krate = Crate::new(IStr::new("test"));
        // (u32, T) vs (T, u32): contradictory positions.
        let a = impl_for(
            TypeRef::new_tuple(vec![
                CoreType::U32.into(),
                TypeRef::new_generic(IStr::new("T"), 0),
            ]),
            1,
        );
        let b = impl_for(
            TypeRef::new_tuple(vec![
                TypeRef::new_generic(IStr::new("T"), 0),
                CoreType::U32.into(),
            ]),
            1,
        );
        assert!(!more_specific_than(&krate, &a, &b));
        assert!(!more_specific_than(&krate, &b, &a));
        assert!(overlaps_with(&krate, &a, &b));
    }
}
