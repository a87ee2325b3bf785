//! Index-builder tests.

use ast::{Binding, IndexState, ItemKind, Visibility};
use base::Span;
use hir::SimplePath;
use intern::IStr;

use crate::resolve_index;

fn n(s: &str) -> IStr {
    IStr::new(s)
}

fn p(krate: &str, items: &[&str]) -> SimplePath {
    SimplePath::new(n(krate), items.iter().map(|s| n(s)))
}

fn item(name: &str, vis: Visibility, kind: ItemKind) -> ast::Item {
    ast::Item { span: Span::default(), attrs: ast::Attributes::default(), vis, name: n(name), kind }
}

fn unit_struct(name: &str, vis: Visibility) -> ast::Item {
    item(
        name,
        vis,
        ItemKind::Struct(ast::StructDef {
            generics: ast::GenericsDef::default(),
            data: ast::StructDataAst::Unit,
        }),
    )
}

fn glob_use(vis: Visibility, target: &SimplePath) -> ast::Item {
    item(
        "",
        vis,
        ItemKind::Use(ast::UseItem {
            entries: vec![ast::UseEntry {
                span: Span::default(),
                path: ast::Path::from_simple(target)
                    .with_binding(Binding::Module(target.clone())),
                name: None,
            }],
        }),
    )
}

fn module(name: &str, vis: Visibility, path: SimplePath, items: Vec<ast::Item>) -> ast::Item {
    let mut m = ast::Module::new(path);
    m.items = items;
    item(name, vis, ItemKind::Module(m))
}

#[test]
fn base_phase_populates_tables() {
    let mut krate = ast::Crate::new(n("demo"));
    krate.root_module.items = vec![
        unit_struct("S", Visibility::Public),
        item(
            "f",
            Visibility::Public,
            ItemKind::Function(ast::FnDef {
                generics: ast::GenericsDef::default(),
                abi: None,
                is_unsafe: false,
                is_const: false,
                is_async: false,
                is_variadic: false,
                args: vec![],
                ret: None,
                has_body: true,
            }),
        ),
    ];
    resolve_index(&mut krate);

    let root = &krate.root_module;
    assert!(root.type_items.contains_key("S"));
    assert!(root.namespace_items.contains_key("S"));
    // Unit structs project into the value namespace too.
    assert!(root.value_items.contains_key("S"));
    assert!(root.value_items.contains_key("f"));
    assert!(!root.type_items.contains_key("f"));
    assert_eq!(root.index_state, IndexState::Settled);
}

#[test]
fn glob_respects_visibility() {
    // mod foo (private) { struct Hidden; pub(crate) struct Shared; pub struct Open; }
    // pub use foo::*;
    let foo_path = p("demo", &["foo"]);
    let crate_root = p("demo", &[]);
    let mut krate = ast::Crate::new(n("demo"));
    krate.root_module.items = vec![
        module(
            "foo",
            Visibility::Private(crate_root.clone()),
            foo_path.clone(),
            vec![
                unit_struct("Hidden", Visibility::Private(foo_path.clone())),
                unit_struct("Shared", Visibility::PathRestricted(crate_root.clone())),
                unit_struct("Open", Visibility::Public),
            ],
        ),
        glob_use(Visibility::Public, &foo_path),
    ];
    resolve_index(&mut krate);

    let root = &krate.root_module;
    // `Hidden` is only visible inside `foo` — not copied out.
    assert!(!root.type_items.contains_key("Hidden"));
    // `Shared` appears, still capped at pub(crate).
    let shared = &root.type_items["Shared"];
    assert!(shared.is_import);
    assert_eq!(shared.vis, Visibility::PathRestricted(crate_root));
    // `Open` is public through the public glob.
    assert_eq!(root.type_items["Open"].vis, Visibility::Public);
}

#[test]
fn glob_cycle_is_broken() {
    cov_mark::check!(glob_cycle_skipped);
    let a_path = p("demo", &["a"]);
    let b_path = p("demo", &["b"]);
    let mut krate = ast::Crate::new(n("demo"));
    krate.root_module.items = vec![
        module(
            "a",
            Visibility::Public,
            a_path.clone(),
            vec![
                unit_struct("InA", Visibility::Public),
                glob_use(Visibility::Public, &b_path),
            ],
        ),
        module(
            "b",
            Visibility::Public,
            b_path.clone(),
            vec![
                unit_struct("InB", Visibility::Public),
                glob_use(Visibility::Public, &a_path),
            ],
        ),
    ];
    resolve_index(&mut krate);

    let a = match &krate.root_module.items[0].kind {
        ItemKind::Module(m) => m,
        _ => unreachable!(),
    };
    let b = match &krate.root_module.items[1].kind {
        ItemKind::Module(m) => m,
        _ => unreachable!(),
    };
    assert!(a.type_items.contains_key("InA"));
    assert!(a.type_items.contains_key("InB"));
    assert!(b.type_items.contains_key("InA"));
    assert!(b.type_items.contains_key("InB"));
    assert_eq!(a.index_state, IndexState::Settled);
    assert_eq!(b.index_state, IndexState::Settled);
}

#[test]
fn glob_from_enum_splits_namespaces() {
    cov_mark::check!(glob_from_enum);
    let e_path = p("demo", &["E"]);
    let mut krate = ast::Crate::new(n("demo"));
    krate.root_module.items = vec![
        item(
            "E",
            Visibility::Public,
            ItemKind::Enum(ast::EnumDef {
                generics: ast::GenericsDef::default(),
                variants: vec![
                    ast::VariantAst {
                        name: n("Unit"),
                        attrs: ast::Attributes::default(),
                        kind: ast::VariantKind::Unit { disc: None },
                    },
                    ast::VariantAst {
                        name: n("Tup"),
                        attrs: ast::Attributes::default(),
                        kind: ast::VariantKind::Tuple(vec![ast::Type::Primitive(
                            hir::CoreType::U8,
                        )]),
                    },
                    ast::VariantAst {
                        name: n("Rec"),
                        attrs: ast::Attributes::default(),
                        kind: ast::VariantKind::Struct(vec![]),
                    },
                ],
            }),
        ),
        item(
            "",
            Visibility::Public,
            ItemKind::Use(ast::UseItem {
                entries: vec![ast::UseEntry {
                    span: Span::default(),
                    path: ast::Path::from_simple(&e_path)
                        .with_binding(Binding::Enum(e_path.clone())),
                    name: None,
                }],
            }),
        ),
    ];
    resolve_index(&mut krate);

    let root = &krate.root_module;
    assert!(root.value_items.contains_key("Unit"));
    assert!(root.value_items.contains_key("Tup"));
    assert!(!root.value_items.contains_key("Rec"));
    // Struct-like variants land in the type namespace.
    assert!(root.type_items.contains_key("Rec"));
    assert!(!root.type_items.contains_key("Unit"));
}

#[test]
fn normalisation_follows_dependency_imports() {
    // ext crate: mod inner { struct Thing; }  +  use inner::Thing at root.
    let mut ext = hir::Crate::new(n("ext"));
    let mut inner = hir::Module::new();
    inner.mod_items.insert(
        n("Thing"),
        Box::new(hir::VisEnt::new(
            hir::Publicity::new_global(),
            hir::TypeItem::Struct(hir::Struct::new_unit(hir::GenericParams::new())),
        )),
    );
    ext.root_module
        .mod_items
        .insert(n("inner"), Box::new(hir::VisEnt::new(
            hir::Publicity::new_global(),
            hir::TypeItem::Module(inner),
        )));
    ext.root_module.mod_items.insert(
        n("Thing"),
        Box::new(hir::VisEnt::new(
            hir::Publicity::new_global(),
            hir::TypeItem::Import(hir::Import {
                path: p("ext", &["inner", "Thing"]),
                is_variant: false,
                idx: 0,
            }),
        )),
    );

    let mut krate = ast::Crate::new(n("demo"));
    krate.ext_crates.push(ast::ExternCrateAst { short_name: n("ext"), hir: Box::new(ext) });
    // `use ext::Thing` — bound by name resolution to the re-export path.
    let reexport = p("ext", &["Thing"]);
    krate.root_module.items = vec![item(
        "",
        Visibility::Public,
        ItemKind::Use(ast::UseItem {
            entries: vec![ast::UseEntry {
                span: Span::default(),
                path: ast::Path::from_simple(&reexport)
                    .with_binding(Binding::Struct(reexport.clone())),
                name: Some(n("Thing")),
            }],
        }),
    )];
    resolve_index(&mut krate);

    // After normalisation the entry points straight at the definition.
    let ent = &krate.root_module.type_items["Thing"];
    assert_eq!(
        ent.path.binding.target_path(),
        Some(&p("ext", &["inner", "Thing"]))
    );
}

#[test]
fn index_is_idempotent() {
    let foo_path = p("demo", &["foo"]);
    let mut krate = ast::Crate::new(n("demo"));
    krate.root_module.items = vec![
        module(
            "foo",
            Visibility::Public,
            foo_path.clone(),
            vec![unit_struct("Open", Visibility::Public)],
        ),
        glob_use(Visibility::Public, &foo_path),
    ];
    resolve_index(&mut krate);
    let first = krate.root_module.clone();
    resolve_index(&mut krate);
    assert_eq!(first.type_items, krate.root_module.type_items);
    assert_eq!(first.value_items, krate.root_module.value_items);
    assert_eq!(first.namespace_items, krate.root_module.namespace_items);
}
