//! The crate root: module tree, impl tables bucketed for sublinear lookup,
//! lang items, external crates, exported macros.

use std::collections::BTreeMap;

use base::Span;
use intern::IStr;
use rustc_hash::FxHashMap;

use crate::generics::GenericParams;
use crate::item::{
    Constant, Function, Module, Publicity, Static, Trait, TypeItem, ValueItem, VisEnt,
};
use crate::path::{PathParams, SimplePath};
use crate::tokens::MacroRules;
use crate::ty::{TypeData, TypePathBinding, TypeRef};
use crate::Path;

/// An impl item plus its `default` flag.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImplEnt<T> {
    pub is_specialisable: bool,
    pub item: T,
}

/// An impl item with visibility (inherent impls only).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VisImplEnt<T> {
    pub publicity: Publicity,
    pub is_specialisable: bool,
    pub item: T,
}

/// `impl<P…> Type { … }`
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TypeImpl {
    pub params: GenericParams,
    pub ty: TypeRef,
    pub methods: BTreeMap<IStr, VisImplEnt<Function>>,
    pub constants: BTreeMap<IStr, VisImplEnt<Constant>>,
    /// Module the impl appeared in (trait scoping for method resolution).
    pub src_module: SimplePath,
}

/// `impl<P…> Trait<Args> for Type where … { … }`
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TraitImpl {
    pub params: GenericParams,
    pub trait_args: PathParams,
    pub ty: TypeRef,
    pub methods: BTreeMap<IStr, ImplEnt<Function>>,
    pub constants: BTreeMap<IStr, ImplEnt<Constant>>,
    pub statics: BTreeMap<IStr, ImplEnt<Static>>,
    pub types: BTreeMap<IStr, ImplEnt<TypeRef>>,
    pub src_module: SimplePath,
}

/// `impl<P…> Marker for Type {}` or its negative form.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MarkerImpl {
    pub params: GenericParams,
    pub trait_args: PathParams,
    pub is_positive: bool,
    pub ty: TypeRef,
}

/// Impls bucketed by the self type's sort path: named nominal types each get
/// a bucket, everything concrete-but-unnamed shares one, and impls whose self
/// type is a bare generic go in the catch-all.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImplGroup<T> {
    pub named: FxHashMap<SimplePath, Vec<T>>,
    pub non_named: Vec<T>,
    pub generic: Vec<T>,
}

impl<T> Default for ImplGroup<T> {
    fn default() -> ImplGroup<T> {
        ImplGroup { named: FxHashMap::default(), non_named: Vec::new(), generic: Vec::new() }
    }
}

/// Which buckets a query type can possibly match.
enum Buckets<'a> {
    Named(&'a SimplePath),
    NonNamed,
    All,
}

/// The sort path of a type, when it is a plain named nominal type.
fn type_sort_path(ty: &TypeRef) -> Buckets<'_> {
    match ty.data() {
        TypeData::Path { path: Path::Generic(gp), binding } => match binding {
            // Unresolved projections can match anything.
            TypePathBinding::Opaque | TypePathBinding::Unbound => Buckets::All,
            _ => Buckets::Named(&gp.path),
        },
        // Projections and inference variables can become any type.
        TypeData::Path { .. } | TypeData::Infer { .. } | TypeData::Generic(_) => Buckets::All,
        _ => Buckets::NonNamed,
    }
}

impl<T> ImplGroup<T> {
    pub fn add(&mut self, imp: T)
    where
        T: ImplSelfType,
    {
        match type_sort_path(imp.self_type()) {
            Buckets::Named(p) => {
                let p = p.clone();
                self.named.entry(p).or_default().push(imp)
            }
            Buckets::NonNamed => self.non_named.push(imp),
            Buckets::All => self.generic.push(imp),
        }
    }

    /// Candidate lists for a query type: its own bucket first, the generic
    /// bucket after. An inference-variable query sees every bucket.
    pub fn lists_for_type<'a>(&'a self, ty: &TypeRef) -> Vec<&'a [T]> {
        let mut rv: Vec<&[T]> = Vec::with_capacity(3);
        match type_sort_path(ty) {
            Buckets::Named(p) => {
                if let Some(l) = self.named.get(p) {
                    rv.push(l);
                }
            }
            Buckets::NonNamed => rv.push(&self.non_named),
            Buckets::All => {
                for l in self.named.values() {
                    rv.push(l);
                }
                rv.push(&self.non_named);
            }
        }
        rv.push(&self.generic);
        rv
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &T> {
        self.named
            .values()
            .flat_map(|v| v.iter())
            .chain(self.non_named.iter())
            .chain(self.generic.iter())
    }

    pub fn len(&self) -> usize {
        self.named.values().map(|v| v.len()).sum::<usize>()
            + self.non_named.len()
            + self.generic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Access to an impl's self type, for bucketing.
pub trait ImplSelfType {
    fn self_type(&self) -> &TypeRef;
}
impl ImplSelfType for TypeImpl {
    fn self_type(&self) -> &TypeRef {
        &self.ty
    }
}
impl ImplSelfType for TraitImpl {
    fn self_type(&self) -> &TypeRef {
        &self.ty
    }
}
impl ImplSelfType for MarkerImpl {
    fn self_type(&self) -> &TypeRef {
        &self.ty
    }
}

/// An external crate referenced by this one. The driver re-resolves and
/// loads the actual metadata; only the names survive serialisation.
#[derive(Default)]
pub struct ExternCrate {
    pub basename: String,
    pub data: Option<Box<Crate>>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExternLibrary {
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProcMacro {
    pub name: IStr,
    pub path: SimplePath,
    pub attributes: Vec<String>,
}

/// Root owner of a lowered or deserialised crate.
///
/// Mutated by lowering, the index passes and the post-load pass; effectively
/// immutable afterwards except for the documented cache fields.
#[derive(Default)]
pub struct Crate {
    pub crate_name: IStr,
    pub root_module: Module,

    pub type_impls: ImplGroup<TypeImpl>,
    /// Trait impls keyed by trait path, then bucketed by self type.
    pub trait_impls: FxHashMap<SimplePath, ImplGroup<TraitImpl>>,
    pub marker_impls: FxHashMap<SimplePath, ImplGroup<MarkerImpl>>,

    pub lang_items: BTreeMap<IStr, SimplePath>,
    pub ext_crates: BTreeMap<IStr, ExternCrate>,
    pub ext_libs: Vec<ExternLibrary>,
    pub link_paths: Vec<String>,
    pub exported_macros: BTreeMap<IStr, MacroRules>,
    pub proc_macros: Vec<ProcMacro>,
}

impl Crate {
    pub fn new(crate_name: IStr) -> Crate {
        Crate { crate_name, ..Crate::default() }
    }

    pub fn add_type_impl(&mut self, imp: TypeImpl) {
        self.type_impls.add(imp);
    }

    pub fn add_trait_impl(&mut self, trait_path: SimplePath, imp: TraitImpl) {
        self.trait_impls.entry(trait_path).or_default().add(imp);
    }

    pub fn add_marker_impl(&mut self, trait_path: SimplePath, imp: MarkerImpl) {
        self.marker_impls.entry(trait_path).or_default().add(imp);
    }

    /// The path registered for a lang item, if any.
    pub fn get_lang_item_path_opt(&self, name: &str) -> Option<&SimplePath> {
        self.lang_items.get(name).filter(|p| !(p.crate_name.is_empty() && p.components.is_empty()))
    }

    pub fn get_lang_item_path(&self, sp: Span, name: &str) -> &SimplePath {
        match self.get_lang_item_path_opt(name) {
            Some(p) => p,
            None => base::fatal!(sp, "missing lang item `{}`", name),
        }
    }

    /// Merge another crate's lang items into this one. Identical paths merge
    /// silently, empty-path markers are tolerated, genuine conflicts are
    /// fatal.
    pub fn merge_lang_items(&mut self, sp: Span, other: &BTreeMap<IStr, SimplePath>) {
        for (name, path) in other {
            let is_empty = |p: &SimplePath| p.crate_name.is_empty() && p.components.is_empty();
            match self.lang_items.get(name) {
                None => {
                    self.lang_items.insert(name.clone(), path.clone());
                }
                Some(existing) if existing == path => {}
                Some(existing) if is_empty(existing) => {
                    self.lang_items.insert(name.clone(), path.clone());
                }
                Some(_) if is_empty(path) => {}
                Some(existing) => {
                    base::fatal!(
                        sp,
                        "conflicting definitions of lang item `{}`: {} and {}",
                        name,
                        existing,
                        path
                    );
                }
            }
        }
    }

    fn target_crate(&self, path: &SimplePath) -> Option<&Crate> {
        if path.crate_name == self.crate_name || path.crate_name.is_empty() {
            Some(self)
        } else {
            self.ext_crates.get(&path.crate_name)?.data.as_deref()
        }
    }

    /// Walk the module tree to the module containing `path`'s last component.
    /// A `use` in the middle of the path splices the remaining components
    /// onto the import target and restarts.
    fn get_module_for(&self, path: &SimplePath) -> Option<(&Crate, &Module)> {
        let krate = self.target_crate(path)?;
        let parent_len = path.components.len().checked_sub(1)?;
        let mut module = &krate.root_module;
        for (i, name) in path.components[..parent_len].iter().enumerate() {
            match &module.get_mod_item(name)?.item {
                TypeItem::Module(m) => module = m,
                TypeItem::Import(imp) => {
                    let mut target = imp.path.clone();
                    target.components.extend(path.components[i + 1..].iter().cloned());
                    return krate.get_module_for(&target);
                }
                _ => return None,
            }
        }
        Some((krate, module))
    }

    /// Resolve a path naming a module itself.
    pub fn get_module_by_path(&self, path: &SimplePath) -> Option<&Module> {
        let krate = self.target_crate(path)?;
        let mut module = &krate.root_module;
        for name in &path.components {
            match krate_follow_type_import(krate, module.get_mod_item(name)?)? {
                TypeItem::Module(m) => module = m,
                _ => return None,
            }
        }
        Some(module)
    }

    /// Look up a type-namespace item, following import redirections.
    pub fn get_typeitem_by_path(&self, path: &SimplePath) -> Option<&TypeItem> {
        let (krate, module) = self.get_module_for(path)?;
        let ent = module.get_mod_item(path.last())?;
        match &ent.item {
            TypeItem::Import(imp) => krate.get_typeitem_by_path(&imp.path),
            item => Some(item),
        }
    }

    /// As [`get_typeitem_by_path`], but the final item is returned as-is —
    /// an `Import` stays an `Import` (used by index normalisation).
    ///
    /// [`get_typeitem_by_path`]: Crate::get_typeitem_by_path
    pub fn get_typeitem_by_path_raw(&self, path: &SimplePath) -> Option<&TypeItem> {
        let (_krate, module) = self.get_module_for(path)?;
        module.get_mod_item(path.last()).map(|ent| &ent.item)
    }

    /// Look up a value-namespace item, following import redirections.
    pub fn get_valitem_by_path(&self, path: &SimplePath) -> Option<&ValueItem> {
        let (krate, module) = self.get_module_for(path)?;
        let ent = module.get_value_item(path.last())?;
        match &ent.item {
            ValueItem::Import(imp) => krate.get_valitem_by_path(&imp.path),
            item => Some(item),
        }
    }

    pub fn get_trait_by_path(&self, path: &SimplePath) -> Option<&Trait> {
        match self.get_typeitem_by_path(path)? {
            TypeItem::Trait(t) => Some(t),
            _ => None,
        }
    }

    pub fn get_struct_by_path(&self, path: &SimplePath) -> Option<&crate::item::Struct> {
        match self.get_typeitem_by_path(path)? {
            TypeItem::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_enum_by_path(&self, path: &SimplePath) -> Option<&crate::item::Enum> {
        match self.get_typeitem_by_path(path)? {
            TypeItem::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn get_union_by_path(&self, path: &SimplePath) -> Option<&crate::item::Union> {
        match self.get_typeitem_by_path(path)? {
            TypeItem::Union(u) => Some(u),
            _ => None,
        }
    }

    /// Iterate trait impls that could apply to `ty`; `cb` returning `true`
    /// stops the search. The yielded references live as long as the crate
    /// borrow, so callers can keep the best candidate around.
    pub fn find_trait_impls<'s>(
        &'s self,
        trait_path: &SimplePath,
        ty: &TypeRef,
        mut cb: impl FnMut(&'s TraitImpl) -> bool,
    ) -> bool {
        for krate in self.self_and_ext_crates() {
            if let Some(group) = krate.trait_impls.get(trait_path) {
                for list in group.lists_for_type(ty) {
                    for imp in list {
                        if cb(imp) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Iterate positive/negative marker (auto) impls for `ty`.
    pub fn find_marker_impls<'s>(
        &'s self,
        trait_path: &SimplePath,
        ty: &TypeRef,
        mut cb: impl FnMut(&'s MarkerImpl) -> bool,
    ) -> bool {
        for krate in self.self_and_ext_crates() {
            if let Some(group) = krate.marker_impls.get(trait_path) {
                for list in group.lists_for_type(ty) {
                    for imp in list {
                        if cb(imp) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Iterate inherent impls for `ty`.
    pub fn find_type_impls<'s>(
        &'s self,
        ty: &TypeRef,
        mut cb: impl FnMut(&'s TypeImpl) -> bool,
    ) -> bool {
        for krate in self.self_and_ext_crates() {
            for list in krate.type_impls.lists_for_type(ty) {
                for imp in list {
                    if cb(imp) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// This crate, then every loaded dependency (transitively deduplicated by
    /// the loader — dependencies are flattened into one level).
    pub fn self_and_ext_crates(&self) -> impl Iterator<Item = &Crate> {
        std::iter::once(self)
            .chain(self.ext_crates.values().filter_map(|e| e.data.as_deref()))
    }

    pub fn iter_modules_with_path(
        &self,
        mut cb: impl FnMut(&SimplePath, &Module),
    ) {
        fn walk(
            path: &SimplePath,
            module: &Module,
            cb: &mut impl FnMut(&SimplePath, &Module),
        ) {
            cb(path, module);
            for (name, ent) in &module.mod_items {
                if let TypeItem::Module(m) = &ent.item {
                    walk(&path.child(name.clone()), m, cb);
                }
            }
        }
        let root = SimplePath::crate_root(self.crate_name.clone());
        walk(&root, &self.root_module, &mut cb);
    }
}

fn krate_follow_type_import<'a>(krate: &'a Crate, ent: &'a VisEnt<TypeItem>) -> Option<&'a TypeItem> {
    match &ent.item {
        TypeItem::Import(imp) => krate.get_typeitem_by_path(&imp.path),
        item => Some(item),
    }
}

/// Owning handle used at crate boundaries (lowering output, metadata load).
pub type CratePtr = Box<Crate>;
