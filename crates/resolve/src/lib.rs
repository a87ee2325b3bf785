//! Module index builder: populates each module's four name tables
//! (namespace / type / value / macro) in three sequenced phases.
//!
//! 1. **Base** — every directly-declared item and named import.
//! 2. **Wildcards** — `use foo::*` expansion, with transitive settling of
//!    glob-dependent modules and a module-stack cycle guard.
//! 3. **Normalise** — rewrite every stored path to point at the item's
//!    definition, following import chains across crates.
//!
//! A final pass redirects `#[macro_export]` macros to the crate root. The
//! whole sequence is idempotent once complete.

use ast::{Binding, IndexEnt, IndexState, ItemKind, Path, UseEntry, Visibility};
use base::Span;
use hir::{SimplePath, TypeItem, ValueItem};
use intern::IStr;

#[cfg(test)]
mod tests;

/// Which table(s) an entry lands in. `Type` implies the namespace table.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Ns {
    Namespace,
    Type,
    Value,
    Macro,
}

/// Run all phases over the crate. Idempotent after completion.
pub fn resolve_index(krate: &mut ast::Crate) {
    log::debug!("indexing crate {}", krate.name);
    let root_path = SimplePath::crate_root(krate.name.clone());

    index_module_base(&mut krate.root_module);

    let mut all_modules = Vec::new();
    collect_module_paths(&krate.root_module, &root_path, &mut all_modules);
    for path in &all_modules {
        let mut stack = Vec::new();
        index_module_wildcard(krate, path, &mut stack);
    }

    for path in &all_modules {
        index_module_normalise(krate, path);
    }

    export_macros(krate);
}

// ---------------------------------------------------------------------------
// Shared helpers

fn collect_module_paths(module: &ast::Module, path: &SimplePath, out: &mut Vec<SimplePath>) {
    out.push(path.clone());
    for item in &module.items {
        if let ItemKind::Module(sub) = &item.kind {
            collect_module_paths(sub, &path.child(item.name.clone()), out);
        }
    }
}

fn module_mut<'a>(krate: &'a mut ast::Crate, path: &SimplePath) -> &'a mut ast::Module {
    let mut module = &mut krate.root_module;
    for name in &path.components {
        module = module
            .items
            .iter_mut()
            .find_map(|i| match &mut i.kind {
                ItemKind::Module(m) if i.name == *name => Some(m),
                _ => None,
            })
            .unwrap_or_else(|| panic!("module path {} missing", path));
    }
    module
}

fn module_ref<'a>(krate: &'a ast::Crate, path: &SimplePath) -> Option<&'a ast::Module> {
    let mut module = &krate.root_module;
    for name in &path.components {
        module = module.items.iter().find_map(|i| match &i.kind {
            ItemKind::Module(m) if i.name == *name => Some(m),
            _ => None,
        })?;
    }
    Some(module)
}

/// Do two entries name the same definition?
fn same_target(a: &Path, b: &Path) -> bool {
    match (&a.binding, &b.binding) {
        (
            Binding::EnumVariant { path: pa, idx: ia },
            Binding::EnumVariant { path: pb, idx: ib },
        ) => pa == pb && ia == ib,
        (Binding::Primitive(x), Binding::Primitive(y)) => x == y,
        _ => match (a.binding.target_path(), b.binding.target_path()) {
            (Some(x), Some(y)) => {
                x == y && std::mem::discriminant(&a.binding) == std::mem::discriminant(&b.binding)
            }
            _ => false,
        },
    }
}

/// Insertion with the collision policy: same target widens visibility,
/// different targets error unless `allow_collide` (imports overlaying
/// imports — the earlier entry wins).
fn index_add(
    table: &mut indexmap::IndexMap<IStr, IndexEnt>,
    sp: Span,
    name: &IStr,
    ent: IndexEnt,
    allow_collide: bool,
) {
    match table.get_mut(name) {
        None => {
            table.insert(name.clone(), ent);
        }
        Some(existing) if same_target(&existing.path, &ent.path) => {
            existing.vis.widen(&ent.vis);
        }
        Some(_) if allow_collide => {
            log::trace!("ignoring colliding import `{}`", name);
        }
        Some(existing) => {
            base::fatal!(
                sp,
                "duplicate definition of `{}` ({} and {})",
                name,
                existing.path,
                ent.path
            );
        }
    }
}

fn add_to(module: &mut ast::Module, ns: Ns, sp: Span, name: &IStr, ent: IndexEnt, collide: bool) {
    match ns {
        Ns::Namespace => index_add(&mut module.namespace_items, sp, name, ent, collide),
        Ns::Type => {
            index_add(&mut module.namespace_items, sp, name, ent.clone(), collide);
            index_add(&mut module.type_items, sp, name, ent, collide);
        }
        Ns::Value => index_add(&mut module.value_items, sp, name, ent, collide),
        Ns::Macro => index_add(&mut module.macro_items, sp, name, ent, collide),
    }
}

fn namespaces_for_binding(binding: &Binding) -> Vec<Ns> {
    match binding {
        Binding::Module(_) => vec![Ns::Namespace],
        Binding::Struct(_) => vec![Ns::Type, Ns::Value],
        Binding::Enum(_)
        | Binding::Union(_)
        | Binding::Trait(_)
        | Binding::TraitAlias(_)
        | Binding::TypeAlias(_)
        | Binding::ExternType(_)
        | Binding::Primitive(_) => vec![Ns::Type],
        Binding::EnumVariant { .. } => vec![Ns::Type, Ns::Value],
        Binding::Function(_)
        | Binding::Static(_)
        | Binding::Constant(_)
        | Binding::StructValue(_) => vec![Ns::Value],
        Binding::Macro(_) => vec![Ns::Macro],
        Binding::Unbound | Binding::TypeParam { .. } | Binding::ValueParam { .. } => vec![],
    }
}

// ---------------------------------------------------------------------------
// Phase 1: Base

fn index_module_base(module: &mut ast::Module) {
    struct Pending {
        ns: Ns,
        sp: Span,
        name: IStr,
        ent: IndexEnt,
        allow_collide: bool,
    }

    let mod_path = module.mod_path.clone();
    let mut pending: Vec<Pending> = Vec::new();
    let mut has_public_glob = false;

    fn mk_def(item: &ast::Item, item_path: &SimplePath, ns: Ns, binding: Binding) -> Pending {
        Pending {
            ns,
            sp: item.span,
            name: item.name.clone(),
            ent: IndexEnt {
                is_import: false,
                vis: item.vis.clone(),
                path: Path::from_simple(item_path).with_binding(binding),
            },
            allow_collide: false,
        }
    }

    for item in &module.items {
        let sp = item.span;
        let item_path = mod_path.child(item.name.clone());
        match &item.kind {
            ItemKind::Module(_) => pending.push(mk_def(item, &item_path, Ns::Namespace, Binding::Module(item_path.clone()))),
            ItemKind::ExternCrate { name } => {
                pending.push(Pending {
                    ns: Ns::Namespace,
                    sp,
                    name: item.name.clone(),
                    ent: IndexEnt {
                        is_import: false,
                        vis: item.vis.clone(),
                        path: Path::from_simple(&SimplePath::crate_root(name.clone()))
                            .with_binding(Binding::Module(SimplePath::crate_root(name.clone()))),
                    },
                    allow_collide: false,
                });
            }
            ItemKind::ExternBlock(block) => {
                for sub in &block.items {
                    let sub_path = mod_path.child(sub.name.clone());
                    let (ns, binding) = match &sub.kind {
                        ItemKind::Function(_) => (Ns::Value, Binding::Function(sub_path)),
                        ItemKind::Static(_) => (Ns::Value, Binding::Static(sub_path)),
                        ItemKind::TypeAlias(_) => (Ns::Type, Binding::ExternType(sub_path)),
                        _ => continue,
                    };
                    pending.push(Pending {
                        ns,
                        sp: sub.span,
                        name: sub.name.clone(),
                        ent: IndexEnt {
                            is_import: false,
                            vis: sub.vis.clone(),
                            path: Path::from_simple(&mod_path.child(sub.name.clone()))
                                .with_binding(binding),
                        },
                        allow_collide: false,
                    });
                }
            }
            ItemKind::Struct(def) => {
                pending.push(mk_def(item, &item_path, Ns::Type, Binding::Struct(item_path.clone())));
                if !matches!(def.data, ast::StructDataAst::Named(_)) {
                    pending.push(mk_def(item, &item_path, Ns::Value, Binding::StructValue(item_path.clone())));
                }
            }
            ItemKind::Enum(_) => pending.push(mk_def(item, &item_path, Ns::Type, Binding::Enum(item_path.clone()))),
            ItemKind::Union(_) => pending.push(mk_def(item, &item_path, Ns::Type, Binding::Union(item_path.clone()))),
            ItemKind::Trait(_) => pending.push(mk_def(item, &item_path, Ns::Type, Binding::Trait(item_path.clone()))),
            ItemKind::TraitAlias(_) => {
                pending.push(mk_def(item, &item_path, Ns::Type, Binding::TraitAlias(item_path.clone())))
            }
            ItemKind::TypeAlias(_) => pending.push(mk_def(item, &item_path, Ns::Type, Binding::TypeAlias(item_path.clone()))),
            ItemKind::AssocType(_) => {}
            ItemKind::Function(_) => pending.push(mk_def(item, &item_path, Ns::Value, Binding::Function(item_path.clone()))),
            ItemKind::Static(_) => pending.push(mk_def(item, &item_path, Ns::Value, Binding::Static(item_path.clone()))),
            ItemKind::Const(_) => pending.push(mk_def(item, &item_path, Ns::Value, Binding::Constant(item_path.clone()))),
            ItemKind::Impl(_) => {}
            ItemKind::Macro(_) => pending.push(mk_def(item, &item_path, Ns::Macro, Binding::Macro(item_path.clone()))),
            ItemKind::Use(u) => {
                for entry in &u.entries {
                    match &entry.name {
                        Some(name) => {
                            for ns in namespaces_for_binding(&entry.path.binding) {
                                pending.push(Pending {
                                    ns,
                                    sp: entry.span,
                                    name: name.clone(),
                                    ent: IndexEnt {
                                        is_import: true,
                                        vis: item.vis.clone(),
                                        path: entry.path.clone(),
                                    },
                                    allow_collide: true,
                                });
                            }
                        }
                        None => {
                            if item.vis.is_public() {
                                has_public_glob = true;
                            }
                        }
                    }
                }
            }
        }
    }

    for p in pending {
        add_to(module, p.ns, p.sp, &p.name, p.ent, p.allow_collide);
    }
    module.index_state =
        if has_public_glob { IndexState::Phase1Glob } else { IndexState::Settled };

    for item in &mut module.items {
        if let ItemKind::Module(sub) = &mut item.kind {
            index_module_base(sub);
        }
    }
}

// ---------------------------------------------------------------------------
// Phase 2: Wildcards

fn glob_entries(module: &ast::Module) -> Vec<(Visibility, UseEntry)> {
    let mut rv = Vec::new();
    for item in &module.items {
        if let ItemKind::Use(u) = &item.kind {
            for entry in &u.entries {
                if entry.name.is_none() {
                    rv.push((item.vis.clone(), entry.clone()));
                }
            }
        }
    }
    rv
}

fn index_module_wildcard(krate: &mut ast::Crate, path: &SimplePath, stack: &mut Vec<SimplePath>) {
    // A module already being expanded: skip silently to break the cycle.
    if stack.contains(path) {
        cov_mark::hit!(glob_cycle_skipped);
        log::debug!("glob cycle through {}, skipping", path);
        return;
    }

    let (globs, dest_path) = {
        let module = match module_ref(krate, path) {
            Some(m) => m,
            None => return,
        };
        if module.index_state == IndexState::Settled && glob_entries(module).is_empty() {
            return;
        }
        (glob_entries(module), module.mod_path.clone())
    };

    stack.push(path.clone());
    for (glob_vis, entry) in globs {
        let sp = entry.span;
        match &entry.path.binding {
            Binding::Module(target) if target.crate_name == krate.name => {
                // Same-crate module: settle its own globs first so the copy
                // sees the transitive contents.
                if module_ref(krate, target).map_or(false, |m| {
                    m.index_state == IndexState::Phase1Glob || !glob_entries(m).is_empty()
                }) {
                    index_module_wildcard(krate, &target.clone(), stack);
                }
                let source = match module_ref(krate, target) {
                    Some(m) => m,
                    None => continue,
                };
                let mut copied: Vec<(Ns, IStr, IndexEnt)> = Vec::new();
                let tables = [
                    (Ns::Namespace, &source.namespace_items),
                    (Ns::Type, &source.type_items),
                    (Ns::Value, &source.value_items),
                    (Ns::Macro, &source.macro_items),
                ];
                for (ns, table) in &tables {
                    for (name, ent) in table.iter() {
                        // Only names visible from the importing module.
                        if !ent.vis.is_visible_from(&dest_path) {
                            continue;
                        }
                        copied.push((
                            *ns,
                            name.clone(),
                            IndexEnt {
                                is_import: true,
                                vis: glob_vis.intersect(&ent.vis),
                                path: ent.path.clone(),
                            },
                        ));
                    }
                }
                // The namespace table already includes the type entries;
                // avoid double insertion by downgrading type copies.
                let dest = module_mut(krate, path);
                for (ns, name, ent) in copied {
                    match ns {
                        Ns::Namespace => {
                            index_add(&mut dest.namespace_items, sp, &name, ent, true)
                        }
                        Ns::Type => index_add(&mut dest.type_items, sp, &name, ent, true),
                        Ns::Value => index_add(&mut dest.value_items, sp, &name, ent, true),
                        Ns::Macro => index_add(&mut dest.macro_items, sp, &name, ent, true),
                    }
                }
            }
            Binding::Module(target) => {
                // A module in a dependency: copy its globally-visible names,
                // resolving import chains as they are met.
                let entries = hir_module_entries(krate, sp, target);
                let dest = module_mut(krate, path);
                for (ns, name, mut ent) in entries {
                    ent.vis = glob_vis.intersect(&ent.vis);
                    add_to(dest, ns, sp, &name, ent, true);
                }
            }
            Binding::Enum(target) => {
                cov_mark::hit!(glob_from_enum);
                let entries = enum_variant_entries(krate, sp, target, &glob_vis);
                let dest = module_mut(krate, path);
                for (ns, name, ent) in entries {
                    add_to(dest, ns, sp, &name, ent, true);
                }
            }
            other => {
                log::debug!("glob from non-module/enum {:?}", other);
            }
        }
    }
    let dest = module_mut(krate, path);
    dest.index_state = IndexState::Settled;
    stack.pop();
}

/// Globally-visible names of a module in a loaded dependency.
fn hir_module_entries(
    krate: &ast::Crate,
    sp: Span,
    target: &SimplePath,
) -> Vec<(Ns, IStr, IndexEnt)> {
    let hir_crate = match krate.ext_crate(&target.crate_name) {
        Some(c) => c,
        None => base::fatal!(sp, "dependency `{}` not loaded", target.crate_name),
    };
    let module = match hir_crate.get_module_by_path(target) {
        Some(m) => m,
        None => base::fatal!(sp, "`{}` is not a module", target),
    };
    let mut rv = Vec::new();
    for (name, ent) in &module.mod_items {
        if !ent.publicity.is_global() {
            continue;
        }
        let item_path = target.child(name.clone());
        let (path, item) = follow_type_imports(hir_crate, sp, &item_path, &ent.item);
        let binding = match item {
            TypeItem::Import(_) => continue,
            TypeItem::Module(_) => Binding::Module(path.clone()),
            TypeItem::TypeAlias(_) => Binding::TypeAlias(path.clone()),
            TypeItem::Enum(_) => Binding::Enum(path.clone()),
            TypeItem::Struct(_) => Binding::Struct(path.clone()),
            TypeItem::Trait(_) => Binding::Trait(path.clone()),
            TypeItem::Union(_) => Binding::Union(path.clone()),
            TypeItem::ExternType(_) => Binding::ExternType(path.clone()),
            TypeItem::TraitAlias(_) => Binding::TraitAlias(path.clone()),
        };
        let ns = if matches!(binding, Binding::Module(_)) { Ns::Namespace } else { Ns::Type };
        rv.push((
            ns,
            name.clone(),
            IndexEnt {
                is_import: true,
                vis: Visibility::Public,
                path: Path::from_simple(&path).with_binding(binding),
            },
        ));
    }
    for (name, ent) in &module.value_items {
        if !ent.publicity.is_global() {
            continue;
        }
        let item_path = target.child(name.clone());
        let (path, item, variant) = follow_value_imports(hir_crate, sp, &item_path, &ent.item);
        let binding = match (item, variant) {
            (_, Some(idx)) => Binding::EnumVariant { path: path.parent(), idx },
            (ValueItem::Import(_), None) => continue,
            (ValueItem::Constant(_), None) => Binding::Constant(path.clone()),
            (ValueItem::Static(_), None) => Binding::Static(path.clone()),
            (ValueItem::Function(_), None) => Binding::Function(path.clone()),
            (ValueItem::StructConstant(_), None) | (ValueItem::StructConstructor(_), None) => {
                Binding::StructValue(path.clone())
            }
        };
        rv.push((
            Ns::Value,
            name.clone(),
            IndexEnt {
                is_import: true,
                vis: Visibility::Public,
                path: Path::from_simple(&path).with_binding(binding),
            },
        ));
    }
    rv
}

/// Follow `use` chains in a dependency's type namespace.
fn follow_type_imports<'h>(
    hir_crate: &'h hir::Crate,
    sp: Span,
    path: &SimplePath,
    item: &'h TypeItem,
) -> (SimplePath, &'h TypeItem) {
    let mut path = path.clone();
    let mut item = item;
    for _ in 0..64 {
        match item {
            TypeItem::Import(imp) => {
                path = imp.path.clone();
                item = match hir_crate.get_typeitem_by_path(&imp.path) {
                    Some(i) => i,
                    None => base::fatal!(sp, "dangling import {}", imp.path),
                };
            }
            _ => return (path, item),
        }
    }
    base::fatal!(sp, "import chain through {} does not terminate", path)
}

/// Same for the value namespace, noticing enum variants at the penultimate
/// path component.
fn follow_value_imports<'h>(
    hir_crate: &'h hir::Crate,
    sp: Span,
    path: &SimplePath,
    item: &'h ValueItem,
) -> (SimplePath, &'h ValueItem, Option<u32>) {
    let mut path = path.clone();
    let mut item = item;
    for _ in 0..64 {
        match item {
            ValueItem::Import(imp) if imp.is_variant => {
                return (imp.path.clone(), item, Some(imp.idx));
            }
            ValueItem::Import(imp) => {
                // An import whose penultimate component is an enum is a
                // variant reference even without the flag.
                if imp.path.components.len() >= 2 {
                    let enum_path = imp.path.parent();
                    if let Some(enm) = hir_crate.get_enum_by_path(&enum_path) {
                        if let Some(idx) = enm.find_variant(imp.path.last()) {
                            return (imp.path.clone(), item, Some(idx as u32));
                        }
                    }
                }
                path = imp.path.clone();
                item = match hir_crate.get_valitem_by_path(&imp.path) {
                    Some(i) => i,
                    None => base::fatal!(sp, "dangling import {}", imp.path),
                };
            }
            _ => return (path, item, None),
        }
    }
    base::fatal!(sp, "import chain through {} does not terminate", path)
}

/// `use Enum::*`: every variant under its own name. Struct-like variants go
/// to the type table, tuple/unit variants to the value table.
fn enum_variant_entries(
    krate: &ast::Crate,
    sp: Span,
    target: &SimplePath,
    glob_vis: &Visibility,
) -> Vec<(Ns, IStr, IndexEnt)> {
    let mut rv = Vec::new();
    let mut push = |idx: usize, name: &IStr, is_struct: bool| {
        let ent = IndexEnt {
            is_import: true,
            vis: glob_vis.clone(),
            path: Path::from_simple(&target.child(name.clone())).with_binding(
                Binding::EnumVariant { path: target.clone(), idx: idx as u32 },
            ),
        };
        rv.push((if is_struct { Ns::Type } else { Ns::Value }, name.clone(), ent));
    };

    if target.crate_name == krate.name {
        // Find the AST enum definition.
        let parent = module_ref(krate, &target.parent());
        let def = parent.and_then(|m| {
            m.items.iter().find_map(|i| match &i.kind {
                ItemKind::Enum(e) if &i.name == target.last() => Some(e),
                _ => None,
            })
        });
        let def = match def {
            Some(d) => d,
            None => base::fatal!(sp, "`{}` is not an enum", target),
        };
        for (idx, v) in def.variants.iter().enumerate() {
            push(idx, &v.name, matches!(v.kind, ast::VariantKind::Struct(_)));
        }
    } else {
        let hir_crate = match krate.ext_crate(&target.crate_name) {
            Some(c) => c,
            None => base::fatal!(sp, "dependency `{}` not loaded", target.crate_name),
        };
        let enm = match hir_crate.get_enum_by_path(target) {
            Some(e) => e,
            None => base::fatal!(sp, "`{}` is not an enum", target),
        };
        match &enm.class {
            hir::EnumClass::Data(variants) => {
                for (idx, v) in variants.iter().enumerate() {
                    push(idx, &v.name, v.is_struct);
                }
            }
            hir::EnumClass::Value { variants, .. } => {
                for (idx, v) in variants.iter().enumerate() {
                    push(idx, &v.name, false);
                }
            }
        }
    }
    rv
}

// ---------------------------------------------------------------------------
// Phase 3: Normalise

fn index_module_normalise(krate: &mut ast::Crate, path: &SimplePath) {
    let crate_name = krate.name.clone();
    let ext_resolved: Vec<(usize, usize, Path)> = {
        let module = match module_ref(krate, path) {
            Some(m) => m,
            None => return,
        };
        let mut updates = Vec::new();
        let tables = [
            &module.namespace_items,
            &module.type_items,
            &module.value_items,
            &module.macro_items,
        ];
        for (t_idx, table) in tables.iter().enumerate() {
            for (e_idx, (_name, ent)) in table.iter().enumerate() {
                if let Some(new_path) = normalise_entry(krate, &crate_name, ent) {
                    updates.push((t_idx, e_idx, new_path));
                }
            }
        }
        updates
    };

    let module = module_mut(krate, path);
    for (t_idx, e_idx, new_path) in ext_resolved {
        let table = match t_idx {
            0 => &mut module.namespace_items,
            1 => &mut module.type_items,
            2 => &mut module.value_items,
            _ => &mut module.macro_items,
        };
        if let Some((_, ent)) = table.get_index_mut(e_idx) {
            ent.path = new_path;
        }
    }
}

/// The normalised path for one entry, if it changes: the definition's own
/// path with the canonical crate name.
fn normalise_entry(krate: &ast::Crate, crate_name: &IStr, ent: &IndexEnt) -> Option<Path> {
    let binding = &ent.path.binding;
    let target = binding.target_path()?;

    // Canonical crate name: the reserved empty name becomes this crate's.
    let mut target = target.clone();
    if target.crate_name.is_empty() {
        target.crate_name = crate_name.clone();
    }

    // Follow import chains landing in dependencies until the final item.
    for _ in 0..64 {
        if target.crate_name == *crate_name {
            break;
        }
        let hir_crate = match krate.ext_crate(&target.crate_name) {
            Some(c) => c,
            None => break,
        };
        match hir_crate.get_typeitem_by_path_raw(&target) {
            Some(TypeItem::Import(imp)) => target = imp.path.clone(),
            _ => break,
        }
    }

    let new = Path::from_simple(&target).with_binding(rebind(binding, &target));
    if new == ent.path {
        None
    } else {
        Some(new)
    }
}

/// The same binding kind, pointing at a new target.
fn rebind(binding: &Binding, target: &SimplePath) -> Binding {
    match binding {
        Binding::EnumVariant { idx, .. } => {
            Binding::EnumVariant { path: target.parent(), idx: *idx }
        }
        Binding::Module(_) => Binding::Module(target.clone()),
        Binding::Struct(_) => Binding::Struct(target.clone()),
        Binding::Enum(_) => Binding::Enum(target.clone()),
        Binding::Union(_) => Binding::Union(target.clone()),
        Binding::Trait(_) => Binding::Trait(target.clone()),
        Binding::TraitAlias(_) => Binding::TraitAlias(target.clone()),
        Binding::TypeAlias(_) => Binding::TypeAlias(target.clone()),
        Binding::ExternType(_) => Binding::ExternType(target.clone()),
        Binding::Function(_) => Binding::Function(target.clone()),
        Binding::Static(_) => Binding::Static(target.clone()),
        Binding::Constant(_) => Binding::Constant(target.clone()),
        Binding::StructValue(_) => Binding::StructValue(target.clone()),
        Binding::Macro(_) => Binding::Macro(target.clone()),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Exported macros

/// `#[macro_export]` macros in nested modules get a redirecting entry in the
/// crate root's macro table at global visibility.
fn export_macros(krate: &mut ast::Crate) {
    let mut exported: Vec<(IStr, SimplePath)> = Vec::new();
    fn walk(module: &ast::Module, path: &SimplePath, out: &mut Vec<(IStr, SimplePath)>) {
        for item in &module.items {
            match &item.kind {
                ItemKind::Macro(_) if item.attrs.has("macro_export") => {
                    out.push((item.name.clone(), path.child(item.name.clone())));
                }
                ItemKind::Module(sub) => {
                    walk(sub, &path.child(item.name.clone()), out);
                }
                _ => {}
            }
        }
    }
    let root_path = SimplePath::crate_root(krate.name.clone());
    walk(&krate.root_module, &root_path, &mut exported);

    for (name, def_path) in exported {
        if def_path.components.len() == 1 {
            continue;
        }
        let ent = IndexEnt {
            is_import: true,
            vis: Visibility::Public,
            path: Path::from_simple(&def_path).with_binding(Binding::Macro(def_path.clone())),
        };
        index_add(&mut krate.root_module.macro_items, Span::default(), &name, ent, true);
    }
}
