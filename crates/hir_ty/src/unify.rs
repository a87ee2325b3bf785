//! Fuzzy structural comparison and template matching over types.
//!
//! Two entry points:
//! * [`compare_types_fuzzy`] — symmetric comparison where inference
//!   variables, matching placeholders and opaque projections yield `Fuzzy`.
//! * [`match_type`] — one-directional template match: generics on the
//!   template side are routed to a [`MatchGenerics`] sink (used by impl
//!   matching to discover impl parameters).

use hir::ty::{ArraySize, ConstGeneric, GenericRef, LifetimeRef, TypeData, TypePathBinding, TypeRef};
use hir::{Compare, GenericPath, Path, PathParams};

pub trait MatchGenerics {
    fn match_ty(&mut self, g: &GenericRef, ty: &TypeRef) -> Compare;
    fn match_val(&mut self, g: &GenericRef, v: &ConstGeneric) -> Compare;
    fn match_lft(&mut self, _g: &GenericRef, _lft: LifetimeRef) -> Compare {
        Compare::Equal
    }
}

fn is_opaque_path(ty: &TypeRef) -> bool {
    matches!(ty.data(), TypeData::Path { binding: TypePathBinding::Opaque, .. })
}

/// Match the template `tpl` (an impl's type, possibly containing impl
/// generics) against `query`.
pub fn match_type(m: &mut dyn MatchGenerics, tpl: &TypeRef, query: &TypeRef) -> Compare {
    if let TypeData::Generic(g) = tpl.data() {
        return m.match_ty(g, query);
    }
    if tpl == query {
        return Compare::Equal;
    }
    match query.data() {
        TypeData::Infer { .. } => return Compare::Fuzzy,
        TypeData::Generic(g) if g.is_placeholder() => return Compare::Fuzzy,
        _ => {}
    }
    if is_opaque_path(tpl) || is_opaque_path(query) {
        return Compare::Fuzzy;
    }
    match (tpl.data(), query.data()) {
        (TypeData::Diverge, TypeData::Diverge) => Compare::Equal,
        (TypeData::Primitive(a), TypeData::Primitive(b)) => {
            if a == b {
                Compare::Equal
            } else {
                Compare::Unequal
            }
        }
        (TypeData::Path { path: a, .. }, TypeData::Path { path: b, .. }) => {
            match_path(m, a, b)
        }
        (TypeData::TraitObject(a), TypeData::TraitObject(b)) => {
            if a.trait_.path.path != b.trait_.path.path {
                return Compare::Unequal;
            }
            if a.markers.len() != b.markers.len() {
                return Compare::Unequal;
            }
            let mut cmp =
                match_pathparams(m, &a.trait_.path.params, &b.trait_.path.params);
            for (ma, mb) in a.markers.iter().zip(&b.markers) {
                if ma.path != mb.path {
                    return Compare::Unequal;
                }
                cmp = cmp.and(match_pathparams(m, &ma.params, &mb.params));
            }
            cmp
        }
        (TypeData::ErasedType(a), TypeData::ErasedType(b)) => {
            if a.traits.len() != b.traits.len() {
                return Compare::Unequal;
            }
            let mut cmp = Compare::Equal;
            for (ta, tb) in a.traits.iter().zip(&b.traits) {
                if ta.path.path != tb.path.path {
                    return Compare::Unequal;
                }
                cmp = cmp.and(match_pathparams(m, &ta.path.params, &tb.path.params));
            }
            cmp
        }
        (TypeData::Array { inner: ia, size: sa }, TypeData::Array { inner: ib, size: sb }) => {
            match_type(m, ia, ib).and(match_arraysize(m, sa, sb))
        }
        (TypeData::Slice { inner: ia }, TypeData::Slice { inner: ib }) => match_type(m, ia, ib),
        (TypeData::Tuple(a), TypeData::Tuple(b)) => {
            if a.len() != b.len() {
                return Compare::Unequal;
            }
            let mut cmp = Compare::Equal;
            for (ta, tb) in a.iter().zip(b) {
                cmp = cmp.and(match_type(m, ta, tb));
            }
            cmp
        }
        (
            TypeData::Borrow { btype: ba, inner: ia, .. },
            TypeData::Borrow { btype: bb, inner: ib, .. },
        ) => {
            if ba != bb {
                return Compare::Unequal;
            }
            match_type(m, ia, ib)
        }
        (
            TypeData::Pointer { btype: ba, inner: ia },
            TypeData::Pointer { btype: bb, inner: ib },
        ) => {
            if ba != bb {
                return Compare::Unequal;
            }
            match_type(m, ia, ib)
        }
        (TypeData::NamedFunction { path: a, .. }, TypeData::NamedFunction { path: b, .. }) => {
            match_path(m, a, b)
        }
        (TypeData::Function(a), TypeData::Function(b)) => {
            if a.is_unsafe != b.is_unsafe || a.abi != b.abi || a.is_variadic != b.is_variadic {
                return Compare::Unequal;
            }
            if a.args.len() != b.args.len() {
                return Compare::Unequal;
            }
            let mut cmp = match_type(m, &a.ret, &b.ret);
            for (ta, tb) in a.args.iter().zip(&b.args) {
                cmp = cmp.and(match_type(m, ta, tb));
            }
            cmp
        }
        (TypeData::Closure(a), TypeData::Closure(b)) => {
            if a.node == b.node {
                Compare::Equal
            } else {
                Compare::Unequal
            }
        }
        (TypeData::Generator(a), TypeData::Generator(b)) => {
            if a.node == b.node {
                Compare::Equal
            } else {
                Compare::Unequal
            }
        }
        _ => Compare::Unequal,
    }
}

pub fn match_path(m: &mut dyn MatchGenerics, tpl: &Path, query: &Path) -> Compare {
    match (tpl, query) {
        (Path::Generic(a), Path::Generic(b)) => match_genericpath(m, a, b),
        (Path::UfcsKnown(a), Path::UfcsKnown(b)) => {
            if a.item != b.item || a.trait_.path != b.trait_.path {
                return Compare::Unequal;
            }
            match_type(m, &a.ty, &b.ty)
                .and(match_pathparams(m, &a.trait_.params, &b.trait_.params))
                .and(match_pathparams(m, &a.params, &b.params))
        }
        (Path::UfcsInherent(a), Path::UfcsInherent(b)) => {
            if a.item != b.item {
                return Compare::Unequal;
            }
            match_type(m, &a.ty, &b.ty).and(match_pathparams(m, &a.params, &b.params))
        }
        _ => Compare::Unequal,
    }
}

pub fn match_genericpath(
    m: &mut dyn MatchGenerics,
    tpl: &GenericPath,
    query: &GenericPath,
) -> Compare {
    if tpl.path != query.path {
        return Compare::Unequal;
    }
    match_pathparams(m, &tpl.params, &query.params)
}

pub fn match_pathparams(
    m: &mut dyn MatchGenerics,
    tpl: &PathParams,
    query: &PathParams,
) -> Compare {
    if tpl.types.len() != query.types.len() || tpl.values.len() != query.values.len() {
        return Compare::Unequal;
    }
    let mut cmp = Compare::Equal;
    for (lt_t, lt_q) in tpl.lifetimes.iter().zip(&query.lifetimes) {
        if let Some(g) = lt_t.as_generic() {
            cmp = cmp.and(m.match_lft(&g, *lt_q));
        }
    }
    for (ta, tb) in tpl.types.iter().zip(&query.types) {
        cmp = cmp.and(match_type(m, ta, tb));
    }
    for (va, vb) in tpl.values.iter().zip(&query.values) {
        cmp = cmp.and(match_constgeneric(m, va, vb));
    }
    cmp
}

fn match_constgeneric(m: &mut dyn MatchGenerics, tpl: &ConstGeneric, query: &ConstGeneric) -> Compare {
    if let ConstGeneric::Generic(g) = tpl {
        return m.match_val(g, query);
    }
    if tpl == query {
        return Compare::Equal;
    }
    match query {
        ConstGeneric::Infer => Compare::Fuzzy,
        ConstGeneric::Generic(g) if g.is_placeholder() => Compare::Fuzzy,
        _ => Compare::Unequal,
    }
}

fn match_arraysize(m: &mut dyn MatchGenerics, tpl: &ArraySize, query: &ArraySize) -> Compare {
    match (tpl, query) {
        (ArraySize::Known(a), ArraySize::Known(b)) => {
            if a == b {
                Compare::Equal
            } else {
                Compare::Unequal
            }
        }
        (ArraySize::Unevaluated(a), ArraySize::Unevaluated(b)) => match_constgeneric(m, a, b),
        (ArraySize::Unevaluated(a), ArraySize::Known(_)) => match a {
            ConstGeneric::Generic(g) => {
                m.match_val(g, &ConstGeneric::Evaluated(std::sync::Arc::new(known_literal(query))))
            }
            _ => Compare::Fuzzy,
        },
        (ArraySize::Known(_), ArraySize::Unevaluated(_)) => Compare::Fuzzy,
    }
}

fn known_literal(size: &ArraySize) -> hir::EncodedLiteral {
    let v = size.as_known().unwrap_or(0);
    let mut lit = hir::EncodedLiteral::new_zeroed(8);
    let t = base::TargetSpec::default();
    lit.write_uint(&t, 0, 8, v as u128);
    lit
}

// ---------------------------------------------------------------------------

struct FuzzyCompare;

impl MatchGenerics for FuzzyCompare {
    fn match_ty(&mut self, g: &GenericRef, ty: &TypeRef) -> Compare {
        match ty.data() {
            TypeData::Generic(g2) if g2 == g => Compare::Equal,
            _ if g.is_placeholder() => Compare::Fuzzy,
            TypeData::Generic(g2) if g2.is_placeholder() => Compare::Fuzzy,
            _ => Compare::Unequal,
        }
    }
    fn match_val(&mut self, g: &GenericRef, v: &ConstGeneric) -> Compare {
        match v {
            ConstGeneric::Generic(g2) if g2 == g => Compare::Equal,
            _ if g.is_placeholder() => Compare::Fuzzy,
            ConstGeneric::Generic(g2) if g2.is_placeholder() => Compare::Fuzzy,
            _ => Compare::Unequal,
        }
    }
}

/// Symmetric comparison: equal, compatible-modulo-unknowns, or distinct.
pub fn compare_types_fuzzy(a: &TypeRef, b: &TypeRef) -> Compare {
    match_type(&mut FuzzyCompare, a, b)
}

pub fn compare_pathparams_fuzzy(a: &PathParams, b: &PathParams) -> Compare {
    match_pathparams(&mut FuzzyCompare, a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hir::ty::{CoreType, InferClass};
    use intern::IStr;

    #[test]
    fn fuzzy_on_infer() {
        let a: TypeRef = CoreType::U32.into();
        let b = TypeRef::new_infer(InferClass::None);
        assert_eq!(compare_types_fuzzy(&a, &b), Compare::Fuzzy);
        assert_eq!(compare_types_fuzzy(&a, &a), Compare::Equal);
        assert_eq!(
            compare_types_fuzzy(&a, &CoreType::U64.into()),
            Compare::Unequal
        );
    }

    #[test]
    fn template_generic_routed_to_matcher() {
        struct Capture(Option<TypeRef>);
        impl MatchGenerics for Capture {
            fn match_ty(&mut self, _g: &GenericRef, ty: &TypeRef) -> Compare {
                self.0 = Some(ty.clone());
                Compare::Equal
            }
            fn match_val(&mut self, _g: &GenericRef, _v: &ConstGeneric) -> Compare {
                Compare::Equal
            }
        }
        let tpl = TypeRef::new_slice(TypeRef::new_generic(IStr::new("T"), 0));
        let query = TypeRef::new_slice(CoreType::Bool.into());
        let mut cap = Capture(None);
        assert_eq!(match_type(&mut cap, &tpl, &query), Compare::Equal);
        assert_eq!(cap.0, Some(CoreType::Bool.into()));
    }
}
