//! Lang-item discovery: the pre-scan that finds the traits the lowering
//! itself must recognise, and the legacy `core` auto-registration.

use base::TargetVersion;
use hir::{Crate, SimplePath, TypeItem};
use intern::IStr;

use crate::Ctx;

/// Find `#[lang]`-tagged items in this crate's AST and inherit the tables of
/// loaded dependencies, before any item is lowered.
pub(crate) fn prescan_lang_items(ctx: &mut Ctx<'_>) {
    let mut found: Vec<(IStr, SimplePath)> = Vec::new();
    for ext in &ctx.ast.ext_crates {
        for (name, path) in &ext.hir.lang_items {
            found.push((name.clone(), path.clone()));
        }
    }

    fn walk(
        module: &ast::Module,
        path: &SimplePath,
        found: &mut Vec<(IStr, SimplePath)>,
    ) {
        for item in &module.items {
            let item_path = path.child(item.name.clone());
            if let Some(attr) = item.attrs.get("lang") {
                if let Some(name) = attr.as_str() {
                    found.push((IStr::new(name), item_path.clone()));
                }
            }
            if let ast::ItemKind::Module(sub) = &item.kind {
                walk(sub, &item_path, found);
            }
        }
    }
    let root = SimplePath::crate_root(ctx.ast.name.clone());
    walk(&ctx.ast.root_module, &root, &mut found);

    for (name, path) in found {
        match name.as_str() {
            "sized" => ctx.lang_sized = Some(path),
            "pointee_sized" => ctx.lang_pointee_sized = Some(path),
            "metadata_sized" => ctx.lang_metadata_sized = Some(path),
            "owned_box" => ctx.lang_box = Some(path),
            "future_trait" => ctx.lang_future = Some(path),
            _ => {}
        }
    }
}

/// Well-known `core` items that predate `#[lang]` coverage: on the oldest
/// bootstrap target, the placement-new traits are looked up by structural
/// path and registered if the module tree has them but the table does not.
pub(crate) fn register_core_magic(ctx: &Ctx<'_>, krate: &mut Crate) {
    if &*krate.crate_name != "core" {
        return;
    }
    if ctx.version != TargetVersion::V1_19 {
        return;
    }
    for name in &["Boxed", "Placer", "Place", "BoxPlace", "InPlace"] {
        let lang_key = IStr::new(&name.to_lowercase());
        if krate.lang_items.contains_key(&lang_key) {
            continue;
        }
        let path = SimplePath::new(
            krate.crate_name.clone(),
            vec![IStr::new("ops"), IStr::new(name)],
        );
        if let Some(TypeItem::Trait(_)) | Some(TypeItem::Struct(_)) =
            krate.get_typeitem_by_path(&path)
        {
            log::debug!("auto-registering legacy lang item {} -> {}", lang_key, path);
            krate.lang_items.insert(lang_key, path);
        }
    }
}
