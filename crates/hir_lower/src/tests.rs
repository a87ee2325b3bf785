//! Lowering tests over hand-built ASTs.

use base::Span;
use hir::ty::{ArraySize, ConstGeneric, TypeData, TypeRef};
use hir::{CoreType, Receiver, SimplePath, TypeItem, ValueItem};
use intern::IStr;

fn n(s: &str) -> IStr {
    IStr::new(s)
}

fn item(name: &str, kind: ast::ItemKind) -> ast::Item {
    ast::Item {
        span: Span::default(),
        attrs: ast::Attributes::default(),
        vis: ast::Visibility::Public,
        name: n(name),
        kind,
    }
}

fn tuple_struct(name: &str, fields: Vec<ast::Type>) -> ast::Item {
    item(
        name,
        ast::ItemKind::Struct(ast::StructDef {
            generics: ast::GenericsDef::default(),
            data: ast::StructDataAst::Tuple(
                fields.into_iter().map(|t| (ast::Visibility::Public, t)).collect(),
            ),
        }),
    )
}

fn crate_with(items: Vec<ast::Item>) -> ast::Crate {
    let mut krate = ast::Crate::new(n("demo"));
    krate.root_module.items = items;
    krate
}

fn self_path(name: &str) -> ast::Path {
    ast::Path::new_local(n(name)).with_binding(ast::Binding::TypeParam { binding: 0xFFFF })
}

#[test]
fn enum_variants_get_synthetic_structs() {
    let krate = crate_with(vec![item(
        "E",
        ast::ItemKind::Enum(ast::EnumDef {
            generics: ast::GenericsDef::default(),
            variants: vec![
                ast::VariantAst {
                    name: n("A"),
                    attrs: ast::Attributes::default(),
                    kind: ast::VariantKind::Tuple(vec![ast::Type::Primitive(CoreType::U8)]),
                },
                ast::VariantAst {
                    name: n("B"),
                    attrs: ast::Attributes::default(),
                    kind: ast::VariantKind::Struct(vec![ast::FieldAst {
                        name: n("x"),
                        vis: ast::Visibility::Public,
                        ty: ast::Type::Primitive(CoreType::Bool),
                        attrs: ast::Attributes::default(),
                    }]),
                },
            ],
        }),
    )]);
    let hir_crate = crate::lower_crate(&krate);

    let enm = match &hir_crate.root_module.get_mod_item(&n("E")).unwrap().item {
        TypeItem::Enum(e) => e,
        _ => panic!("expected enum"),
    };
    match &enm.class {
        hir::EnumClass::Data(variants) => {
            assert_eq!(variants.len(), 2);
            assert!(!variants[0].is_struct);
            assert!(variants[1].is_struct);
        }
        _ => panic!("expected data enum"),
    }
    // The sibling structs exist under the mangled names.
    assert!(matches!(
        hir_crate.root_module.get_mod_item(&n("E#A")).map(|e| &e.item),
        Some(TypeItem::Struct(_))
    ));
    assert!(matches!(
        hir_crate.root_module.get_mod_item(&n("E#B")).map(|e| &e.item),
        Some(TypeItem::Struct(_))
    ));
}

#[test]
fn struct_value_namespace_projections() {
    let krate = crate_with(vec![
        item(
            "Unit",
            ast::ItemKind::Struct(ast::StructDef {
                generics: ast::GenericsDef::default(),
                data: ast::StructDataAst::Unit,
            }),
        ),
        tuple_struct("Pair", vec![
            ast::Type::Primitive(CoreType::U8),
            ast::Type::Primitive(CoreType::U8),
        ]),
    ]);
    let hir_crate = crate::lower_crate(&krate);
    assert!(matches!(
        hir_crate.root_module.get_value_item(&n("Unit")).map(|e| &e.item),
        Some(ValueItem::StructConstant(_))
    ));
    assert!(matches!(
        hir_crate.root_module.get_value_item(&n("Pair")).map(|e| &e.item),
        Some(ValueItem::StructConstructor(_))
    ));
}

#[test]
fn receiver_classification() {
    let _ = env_logger::builder().is_test(true).try_init();
    let s_ty = ast::Type::Path(
        ast::Path::new_absolute(n(""), vec![ast::PathNode::new(n("S"))])
            .with_binding(ast::Binding::Struct(SimplePath::new(n(""), vec![n("S")]))),
    );
    let mk_fn = |name: &str, args: Vec<(&str, ast::Type)>| {
        item(
            name,
            ast::ItemKind::Function(ast::FnDef {
                generics: ast::GenericsDef::default(),
                abi: None,
                is_unsafe: false,
                is_const: false,
                is_async: false,
                is_variadic: false,
                args: args.into_iter().map(|(a, t)| (n(a), t)).collect(),
                ret: None,
                has_body: true,
            }),
        )
    };
    let imp = item(
        "",
        ast::ItemKind::Impl(ast::ImplDef {
            generics: ast::GenericsDef::default(),
            trait_: None,
            is_negative: false,
            ty: s_ty.clone(),
            items: vec![
                mk_fn("by_val", vec![("self", ast::Type::Path(self_path("Self")))]),
                mk_fn(
                    "by_ref",
                    vec![(
                        "self",
                        ast::Type::Borrow {
                            is_mut: false,
                            lifetime: None,
                            inner: Box::new(ast::Type::Path(self_path("Self"))),
                        },
                    )],
                ),
                mk_fn(
                    "by_mut",
                    vec![(
                        "self",
                        ast::Type::Borrow {
                            is_mut: true,
                            lifetime: None,
                            inner: Box::new(ast::Type::Path(self_path("Self"))),
                        },
                    )],
                ),
                mk_fn(
                    "by_ptr_chain",
                    vec![(
                        "self",
                        ast::Type::Pointer {
                            is_mut: false,
                            inner: Box::new(ast::Type::Borrow {
                                is_mut: false,
                                lifetime: None,
                                inner: Box::new(ast::Type::Path(self_path("Self"))),
                            }),
                        },
                    )],
                ),
                mk_fn("free", vec![("x", ast::Type::Primitive(CoreType::U8))]),
            ],
        }),
    );
    let krate = crate_with(vec![
        item(
            "S",
            ast::ItemKind::Struct(ast::StructDef {
                generics: ast::GenericsDef::default(),
                data: ast::StructDataAst::Unit,
            }),
        ),
        imp,
    ]);
    let hir_crate = crate::lower_crate(&krate);
    let imp = hir_crate.type_impls.iter_all().next().expect("one inherent impl");
    let recv = |name: &str| imp.methods[&n(name)].item.receiver;
    assert_eq!(recv("by_val"), Receiver::Value);
    assert_eq!(recv("by_ref"), Receiver::BorrowShared);
    assert_eq!(recv("by_mut"), Receiver::BorrowUnique);
    assert_eq!(recv("by_ptr_chain"), Receiver::Custom);
    assert_eq!(recv("free"), Receiver::Free);
}

#[test]
fn array_sizes_collapse_by_shape() {
    let mk = |size: ast::Expr| ast::Type::Array {
        inner: Box::new(ast::Type::Primitive(CoreType::U8)),
        size: Box::new(size),
    };
    let mut generics = ast::GenericsDef::default();
    generics.consts.push(ast::ConstParamAst {
        name: n("N"),
        ty: ast::Type::Primitive(CoreType::Usize),
    });
    let krate = crate_with(vec![item(
        "f",
        ast::ItemKind::Function(ast::FnDef {
            generics,
            abi: None,
            is_unsafe: false,
            is_const: false,
            is_async: false,
            is_variadic: false,
            args: vec![
                (n("a"), mk(ast::Expr::IntLiteral { v: 3, suffix: None })),
                (
                    n("b"),
                    mk(ast::Expr::NamedValue(
                        ast::Path::new_local(n("N"))
                            .with_binding(ast::Binding::ValueParam { binding: 0x0100 }),
                    )),
                ),
                (n("c"), mk(ast::Expr::Opaque("3 + 4".into()))),
            ],
            ret: None,
            has_body: true,
        }),
    )]);
    let hir_crate = crate::lower_crate(&krate);
    let f = match &hir_crate.root_module.get_value_item(&n("f")).unwrap().item {
        ValueItem::Function(f) => f,
        _ => panic!(),
    };
    let size_of = |i: usize| match f.args[i].1.data() {
        TypeData::Array { size, .. } => size.clone(),
        _ => panic!("not an array"),
    };
    assert_eq!(size_of(0), ArraySize::Known(3));
    assert!(matches!(size_of(1), ArraySize::Unevaluated(ConstGeneric::Generic(_))));
    assert!(matches!(size_of(2), ArraySize::Unevaluated(ConstGeneric::Unevaluated(_))));
}

#[test]
fn self_is_substituted_in_impls_but_kept_in_traits() {
    let s_path = SimplePath::new(n(""), vec![n("S")]);
    let s_ty_ast = ast::Type::Path(
        ast::Path::new_absolute(n(""), vec![ast::PathNode::new(n("S"))])
            .with_binding(ast::Binding::Struct(s_path)),
    );
    let ret_self_fn = ast::ItemKind::Function(ast::FnDef {
        generics: ast::GenericsDef::default(),
        abi: None,
        is_unsafe: false,
        is_const: false,
        is_async: false,
        is_variadic: false,
        args: vec![],
        ret: Some(ast::Type::Path(self_path("Self"))),
        has_body: true,
    });
    let krate = crate_with(vec![
        item(
            "S",
            ast::ItemKind::Struct(ast::StructDef {
                generics: ast::GenericsDef::default(),
                data: ast::StructDataAst::Unit,
            }),
        ),
        item(
            "Tr",
            ast::ItemKind::Trait(ast::TraitDef {
                generics: ast::GenericsDef::default(),
                supertraits: vec![],
                lifetime: None,
                is_marker: false,
                is_unsafe: false,
                items: vec![item("make", ret_self_fn.clone())],
            }),
        ),
        item(
            "",
            ast::ItemKind::Impl(ast::ImplDef {
                generics: ast::GenericsDef::default(),
                trait_: None,
                is_negative: false,
                ty: s_ty_ast,
                items: vec![item("make", ret_self_fn)],
            }),
        ),
    ]);
    let hir_crate = crate::lower_crate(&krate);

    let tr = match &hir_crate.root_module.get_mod_item(&n("Tr")).unwrap().item {
        TypeItem::Trait(t) => t,
        _ => panic!(),
    };
    match &tr.values[&n("make")] {
        hir::TraitValueItem::Function(f) => assert_eq!(f.ret, TypeRef::new_self()),
        _ => panic!(),
    }

    let imp = hir_crate.type_impls.iter_all().next().unwrap();
    // In the impl the written `Self` became the impl type.
    assert_eq!(imp.methods[&n("make")].item.ret, imp.ty);
}

#[test]
fn lang_items_and_linkage() {
    let mut f = item(
        "external",
        ast::ItemKind::Function(ast::FnDef {
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
    );
    f.attrs.0.push(ast::Attribute::new_str("link_name", "c_external"));
    let mut s = item(
        "Special",
        ast::ItemKind::Struct(ast::StructDef {
            generics: ast::GenericsDef::default(),
            data: ast::StructDataAst::Unit,
        }),
    );
    s.attrs.0.push(ast::Attribute::new_str("lang", "special_struct"));

    let krate = crate_with(vec![f, s]);
    let hir_crate = crate::lower_crate(&krate);

    match &hir_crate.root_module.get_value_item(&n("external")).unwrap().item {
        ValueItem::Function(f) => assert_eq!(f.linkage.name, "c_external"),
        _ => panic!(),
    }
    assert_eq!(
        hir_crate.lang_items.get(&n("special_struct")),
        Some(&SimplePath::new(n("demo"), vec![n("Special")]))
    );
}
