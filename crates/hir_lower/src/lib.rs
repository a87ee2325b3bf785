//! AST→HIR lowering: structural translation and desugaring of the parsed,
//! macro-expanded, name-resolved crate into the typed representation.
//!
//! The pass is driven by a [`Ctx`] threaded through every function — the
//! crate name, the sized-family trait paths and the current `Self` type all
//! live there rather than in process globals, so nothing needs re-clearing
//! on exit.

mod item;
mod lang;
mod macros;
mod markings;
mod ty;

#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use base::{Span, TargetVersion};
use hir::{Crate, CratePtr, MacroRules, MarkerImpl, SimplePath, TraitImpl, TypeImpl, TypeRef};
use intern::IStr;

/// Where an `impl Trait` written in alias position should be materialised.
#[derive(Clone)]
pub(crate) struct ImplTraitSource {
    pub path: SimplePath,
    pub params: hir::PathParams,
}

pub(crate) struct Ctx<'a> {
    pub ast: &'a ast::Crate,
    pub crate_name: IStr,
    pub version: TargetVersion,

    // Paths of the well-known traits the lowering itself must recognise,
    // pre-scanned from `#[lang]` attributes and dependency lang tables.
    pub lang_sized: Option<SimplePath>,
    pub lang_pointee_sized: Option<SimplePath>,
    pub lang_metadata_sized: Option<SimplePath>,
    pub lang_box: Option<SimplePath>,
    pub lang_future: Option<SimplePath>,

    // Current-item state.
    self_ty: RefCell<Option<TypeRef>>,
    in_trait: Cell<bool>,
    impl_trait_source: RefCell<Option<ImplTraitSource>>,
    current_item_path: RefCell<SimplePath>,
    erased_counter: Cell<usize>,
    /// Lifetime-name scopes: (group, names), innermost last.
    lifetime_scopes: RefCell<Vec<(u16, Vec<IStr>)>>,

    // Crate-level accumulation.
    pub(crate) type_impls: RefCell<Vec<TypeImpl>>,
    pub(crate) trait_impls: RefCell<Vec<(SimplePath, TraitImpl)>>,
    pub(crate) marker_impls: RefCell<Vec<(SimplePath, MarkerImpl)>>,
    pub(crate) lang_items: RefCell<BTreeMap<IStr, SimplePath>>,
    pub(crate) exported_macros: RefCell<BTreeMap<IStr, MacroRules>>,
}

impl<'a> Ctx<'a> {
    fn new(ast_crate: &'a ast::Crate) -> Ctx<'a> {
        Ctx {
            ast: ast_crate,
            crate_name: ast_crate.name.clone(),
            version: ast_crate.version,
            lang_sized: None,
            lang_pointee_sized: None,
            lang_metadata_sized: None,
            lang_box: None,
            lang_future: None,
            self_ty: RefCell::new(None),
            in_trait: Cell::new(false),
            impl_trait_source: RefCell::new(None),
            current_item_path: RefCell::new(SimplePath::crate_root(ast_crate.name.clone())),
            erased_counter: Cell::new(0),
            lifetime_scopes: RefCell::new(Vec::new()),
            type_impls: RefCell::new(Vec::new()),
            trait_impls: RefCell::new(Vec::new()),
            marker_impls: RefCell::new(Vec::new()),
            lang_items: RefCell::new(BTreeMap::new()),
            exported_macros: RefCell::new(BTreeMap::new()),
        }
    }

    /// Rewrite the reserved empty crate name to this crate's.
    pub(crate) fn canonical(&self, path: &SimplePath) -> SimplePath {
        if path.crate_name.is_empty() {
            SimplePath { crate_name: self.crate_name.clone(), components: path.components.clone() }
        } else {
            path.clone()
        }
    }

    /// `Self` in type position: literal inside trait items, the surrounding
    /// impl's type elsewhere.
    pub(crate) fn self_type(&self, sp: Span) -> TypeRef {
        if self.in_trait.get() {
            return TypeRef::new_self();
        }
        match &*self.self_ty.borrow() {
            Some(t) => t.clone(),
            None => base::fatal!(sp, "use of `Self` outside an impl or trait"),
        }
    }

    pub(crate) fn enter_impl(&self, self_ty: Option<TypeRef>, in_trait: bool) -> ImplGuard<'_, 'a> {
        let prev_self = self.self_ty.replace(self_ty);
        let prev_trait = self.in_trait.replace(in_trait);
        ImplGuard { ctx: self, prev_self, prev_trait }
    }

    pub(crate) fn enter_item(&self, path: SimplePath) -> ItemGuard<'_, 'a> {
        let prev = self.current_item_path.replace(path);
        self.erased_counter.set(0);
        ItemGuard { ctx: self, prev }
    }

    pub(crate) fn set_impl_trait_source(&self, src: Option<ImplTraitSource>) {
        *self.impl_trait_source.borrow_mut() = src;
    }

    pub(crate) fn impl_trait_source(&self) -> Option<ImplTraitSource> {
        self.impl_trait_source.borrow().clone()
    }

    pub(crate) fn current_fn_path(&self, _sp: Span) -> hir::Path {
        hir::Path::from(self.current_item_path.borrow().clone())
    }

    pub(crate) fn next_erased_index(&self) -> usize {
        let i = self.erased_counter.get();
        self.erased_counter.set(i + 1);
        i
    }

    pub(crate) fn push_lifetimes(&self, group: u16, names: Vec<IStr>) {
        self.lifetime_scopes.borrow_mut().push((group, names));
    }

    pub(crate) fn pop_lifetimes(&self) {
        self.lifetime_scopes.borrow_mut().pop();
    }

    pub(crate) fn lookup_lifetime(&self, name: &IStr) -> Option<u16> {
        for (group, names) in self.lifetime_scopes.borrow().iter().rev() {
            if let Some(idx) = names.iter().position(|n| n == name) {
                return Some((group << 8) | idx as u16);
            }
        }
        None
    }

    /// Is this one of the sized-family traits (`Sized` / `?PointeeSized` /
    /// `?MetadataSized`)? All are equivalent for sizedness purposes.
    pub(crate) fn is_sized_family(&self, path: &SimplePath) -> bool {
        let canon = self.canonical(path);
        [&self.lang_sized, &self.lang_pointee_sized, &self.lang_metadata_sized]
            .iter()
            .any(|l| l.as_ref() == Some(&canon))
            || matches!(
                canon.components.last().map(|c| c.as_str()),
                Some("Sized") | Some("PointeeSized") | Some("MetadataSized")
            )
    }

    pub(crate) fn is_unsized_relaxation(&self, path: &SimplePath) -> bool {
        self.is_sized_family(path)
    }
}

pub(crate) struct ImplGuard<'c, 'a> {
    ctx: &'c Ctx<'a>,
    prev_self: Option<TypeRef>,
    prev_trait: bool,
}

impl Drop for ImplGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.self_ty.replace(self.prev_self.take());
        self.ctx.in_trait.set(self.prev_trait);
    }
}

pub(crate) struct ItemGuard<'c, 'a> {
    ctx: &'c Ctx<'a>,
    prev: SimplePath,
}

impl Drop for ItemGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.current_item_path.replace(std::mem::take(&mut self.prev));
    }
}

/// Lower a parsed, expanded, resolved crate into its HIR.
///
/// The result still needs the post-load pass (supertrait closures, vtable
/// tables) before resolver queries run.
pub fn lower_crate(ast_crate: &ast::Crate) -> CratePtr {
    let mut ctx = Ctx::new(ast_crate);
    lang::prescan_lang_items(&mut ctx);

    let mut krate = Crate::new(ast_crate.name.clone());
    let root_path = SimplePath::crate_root(ast_crate.name.clone());
    krate.root_module = item::lower_module(&ctx, &root_path, &ast_crate.root_module);

    for imp in ctx.type_impls.borrow_mut().drain(..) {
        krate.add_type_impl(imp);
    }
    for (trait_path, imp) in ctx.trait_impls.borrow_mut().drain(..) {
        krate.add_trait_impl(trait_path, imp);
    }
    for (trait_path, imp) in ctx.marker_impls.borrow_mut().drain(..) {
        krate.add_marker_impl(trait_path, imp);
    }
    krate.lang_items = std::mem::take(&mut *ctx.lang_items.borrow_mut());
    krate.exported_macros = std::mem::take(&mut *ctx.exported_macros.borrow_mut());

    // Dependency lang items merge in; conflicts are fatal.
    for ext in &ast_crate.ext_crates {
        krate.merge_lang_items(Span::default(), &ext.hir.lang_items);
        krate.ext_crates.insert(
            ext.short_name.clone(),
            hir::ExternCrate { basename: String::new(), data: None },
        );
    }

    lang::register_core_magic(&ctx, &mut krate);
    markings::apply_markings(&mut krate);

    Box::new(krate)
}
