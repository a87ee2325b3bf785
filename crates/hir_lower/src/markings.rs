//! Markings pass: after all items and impls are collected, push per-type
//! facts (`Copy`/`Drop`/`Deref` impls, `CoerceUnsized` wiring) into the
//! markings caches the resolver reads.

use hir::ty::{TypeData, TypeRef};
use hir::{
    CoerceUnsized, Crate, Module, Path, SimplePath, TraitMarkings, TypeItem,
};

#[derive(Default)]
struct Facts {
    is_copy: bool,
    has_drop_impl: bool,
    has_a_deref: bool,
    coerce_unsized: Option<CoerceUnsized>,
    coerce_param: Option<usize>,
}

pub(crate) fn apply_markings(krate: &mut Crate) {
    let lang = |name: &str| krate.get_lang_item_path_opt(name).cloned();
    let copy = lang(hir::lang::COPY);
    let drop = lang(hir::lang::DROP);
    let deref = lang(hir::lang::DEREF);
    let coerce = lang(hir::lang::COERCE_UNSIZED);

    let mut facts: rustc_hash::FxHashMap<SimplePath, Facts> = Default::default();
    let mut record = |ty: &TypeRef, f: &dyn Fn(&mut Facts)| {
        if let TypeData::Path { path: Path::Generic(gp), .. } = ty.data() {
            f(facts.entry(gp.path.clone()).or_default());
        }
    };

    for (trait_path, group) in &krate.trait_impls {
        for imp in group.iter_all() {
            if Some(trait_path) == drop.as_ref() {
                record(&imp.ty, &|f| f.has_drop_impl = true);
            } else if Some(trait_path) == deref.as_ref() {
                record(&imp.ty, &|f| f.has_a_deref = true);
            } else if Some(trait_path) == coerce.as_ref() {
                // `impl CoerceUnsized<Target> for Self` — pointer-shaped
                // wrappers coerce their pointee parameter.
                let param = match imp.ty.data() {
                    TypeData::Path { path: Path::Generic(gp), .. } => gp
                        .params
                        .types
                        .iter()
                        .position(|t| matches!(t.data(), TypeData::Generic(_))),
                    _ => None,
                };
                record(&imp.ty, &|f| {
                    f.coerce_unsized = Some(CoerceUnsized::Pointer);
                    f.coerce_param = param;
                });
            }
        }
    }
    for (trait_path, group) in &krate.marker_impls {
        if Some(trait_path) != copy.as_ref() {
            continue;
        }
        for imp in group.iter_all() {
            if imp.is_positive {
                record(&imp.ty, &|f| f.is_copy = true);
            }
        }
    }
    // `impl Copy` with a body lowers as a plain trait impl.
    if let Some(copy_path) = &copy {
        if let Some(group) = krate.trait_impls.get(copy_path) {
            for imp in group.iter_all() {
                record(&imp.ty, &|f| f.is_copy = true);
            }
        }
    }

    apply_to_module(&mut krate.root_module, &SimplePath::crate_root(krate.crate_name.clone()), &facts);
}

fn apply_to_module(
    module: &mut Module,
    mod_path: &SimplePath,
    facts: &rustc_hash::FxHashMap<SimplePath, Facts>,
) {
    for (name, ent) in module.mod_items.iter_mut() {
        let item_path = mod_path.child(name.clone());
        match &mut ent.item {
            TypeItem::Module(m) => apply_to_module(m, &item_path, facts),
            TypeItem::Struct(s) => {
                if let Some(f) = facts.get(&item_path) {
                    copy_facts(&mut s.markings, f);
                    if let Some(c) = f.coerce_unsized {
                        s.struct_markings.coerce_unsized = c;
                        s.struct_markings.coerce_param = f.coerce_param;
                    }
                }
            }
            TypeItem::Enum(e) => {
                if let Some(f) = facts.get(&item_path) {
                    copy_facts(&mut e.markings, f);
                }
            }
            TypeItem::Union(u) => {
                if let Some(f) = facts.get(&item_path) {
                    copy_facts(&mut u.markings, f);
                }
            }
            TypeItem::ExternType(x) => {
                if let Some(f) = facts.get(&item_path) {
                    copy_facts(&mut x.markings, f);
                }
            }
            _ => {}
        }
    }
}

fn copy_facts(m: &mut TraitMarkings, f: &Facts) {
    m.is_copy |= f.is_copy;
    m.has_drop_impl |= f.has_drop_impl;
    m.has_a_deref |= f.has_a_deref;
}
