//! Post-load pass: recompute everything that is derived rather than
//! serialised. Runs after lowering and after metadata load, before any
//! resolver query.
//!
//! * flattens supertrait closures into `Trait::all_parent_traits`,
//! * assigns vtable slot indexes for methods and associated types,
//! * generates the vtable struct path,
//! * rebuilds each module's in-scope trait list.

use std::collections::BTreeMap;

use base::Span;
use hir::{Crate, GenericPath, Module, SimplePath, TraitPath, TraitValueItem, TypeItem, TypeRef};
use intern::IStr;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::monomorph::{Monomorphiser, MonomorphState};

/// Slots reserved at the front of every vtable (drop glue, size, align).
const VTABLE_HEADER_SLOTS: usize = 3;

type ValueIndexes = BTreeMap<IStr, Vec<(usize, GenericPath)>>;
type TypeIndexes = BTreeMap<IStr, usize>;

struct TraitFixup {
    parents: Vec<TraitPath>,
    value_indexes: ValueIndexes,
    type_indexes: TypeIndexes,
}

pub fn run_post_load(krate: &mut Crate) {
    let sp = Span::default();

    // Pass 1 (immutable): derive everything that needs cross-trait lookups.
    let mut trait_paths: Vec<SimplePath> = Vec::new();
    krate.iter_modules_with_path(|mod_path, module| {
        for (name, ent) in &module.mod_items {
            if let TypeItem::Trait(_) = &ent.item {
                trait_paths.push(mod_path.child(name.clone()));
            }
        }
    });

    let mut fixups: FxHashMap<SimplePath, TraitFixup> = FxHashMap::default();
    for path in &trait_paths {
        let mut seen = FxHashSet::default();
        seen.insert(path.clone());
        let parents = flatten_parents(krate, sp, path, &mut seen);
        let (value_indexes, type_indexes) = assign_vtable_slots(krate, path, &parents);
        fixups.insert(path.clone(), TraitFixup { parents, value_indexes, type_indexes });
    }

    // Pass 2 (mutable): install.
    let root_path = SimplePath::crate_root(krate.crate_name.clone());
    install(&mut krate.root_module, &root_path, &fixups);
}

fn flatten_parents(
    krate: &Crate,
    sp: Span,
    path: &SimplePath,
    seen: &mut FxHashSet<SimplePath>,
) -> Vec<TraitPath> {
    let def = match krate.get_trait_by_path(path) {
        Some(d) => d,
        None => return Vec::new(),
    };
    let mut out: Vec<TraitPath> = Vec::new();
    for pt in &def.parent_traits {
        out.push(pt.clone());
        if seen.insert(pt.path.path.clone()) {
            let sub = flatten_parents(krate, sp, &pt.path.path, seen);
            let ms = MonomorphState {
                self_ty: Some(TypeRef::new_self()),
                impl_params: Some(pt.path.params.clone()),
                method_params: None,
                hrb_params: None,
            };
            for s in sub {
                out.push(ms.monomorph_traitpath(sp, &s, true, false));
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Vtable layout: header, inherited methods in flattened-parent order, then
/// this trait's own methods. Associated-type slots are parallel.
fn assign_vtable_slots(
    krate: &Crate,
    path: &SimplePath,
    parents: &[TraitPath],
) -> (ValueIndexes, TypeIndexes) {
    let mut value_indexes = ValueIndexes::new();
    let mut type_indexes = TypeIndexes::new();
    let def = match krate.get_trait_by_path(path) {
        Some(d) => d,
        None => return (value_indexes, type_indexes),
    };

    let mut value_slot = VTABLE_HEADER_SLOTS;
    let mut type_slot = 0usize;

    for parent in parents {
        if let Some(pdef) = krate.get_trait_by_path(&parent.path.path) {
            for (name, item) in &pdef.values {
                if let TraitValueItem::Function(_) = item {
                    value_indexes
                        .entry(name.clone())
                        .or_default()
                        .push((value_slot, parent.path.clone()));
                    value_slot += 1;
                }
            }
            for name in pdef.types.keys() {
                if !type_indexes.contains_key(name) {
                    type_indexes.insert(name.clone(), type_slot);
                    type_slot += 1;
                }
            }
        }
    }
    let own_path = GenericPath::from(path.clone());
    for (name, item) in &def.values {
        if let TraitValueItem::Function(_) = item {
            value_indexes
                .entry(name.clone())
                .or_default()
                .push((value_slot, own_path.clone()));
            value_slot += 1;
        }
    }
    for name in def.types.keys() {
        if !type_indexes.contains_key(name) {
            type_indexes.insert(name.clone(), type_slot);
            type_slot += 1;
        }
    }
    (value_indexes, type_indexes)
}

fn install(
    module: &mut Module,
    mod_path: &SimplePath,
    fixups: &FxHashMap<SimplePath, TraitFixup>,
) {
    let mut traits_here: Vec<SimplePath> = Vec::new();
    for (name, ent) in module.mod_items.iter_mut() {
        let item_path = mod_path.child(name.clone());
        match &mut ent.item {
            TypeItem::Module(m) => install(m, &item_path, fixups),
            TypeItem::Trait(t) => {
                traits_here.push(item_path.clone());
                if let Some(f) = fixups.get(&item_path) {
                    t.all_parent_traits = f.parents.clone();
                    t.value_indexes = f.value_indexes.clone();
                    t.type_indexes = f.type_indexes.clone();
                }
                t.vtable_path =
                    item_path.parent().child(IStr::new(&format!("{}#vtable", item_path.last())));
            }
            _ => {}
        }
    }
    module.traits = traits_here;
}
