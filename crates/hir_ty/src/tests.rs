//! Resolver tests over a hand-built miniature `core` crate.

use base::Span;
use hir::ty::{TypeData, TypePathBinding, TypeRef};
use hir::{
    AssociatedType, Compare, Crate, CoreType, GenericParams, GenericPath, ImplEnt, LifetimeRef,
    MarkerImpl, Module, Path, PathParams, PathUfcsKnown, Publicity, SimplePath, Struct,
    StructData, Trait, TraitImpl, TypeItem, TypeParamDef, VisEnt,
};
use intern::IStr;

use crate::{ImplRef, StaticTraitResolve};

fn n(s: &str) -> IStr {
    IStr::new(s)
}

fn core_path(items: &[&str]) -> SimplePath {
    SimplePath::new(n("core"), items.iter().map(|s| n(s)))
}

fn ty_struct(path: SimplePath, params: Vec<TypeRef>) -> TypeRef {
    TypeRef::new_path(
        Path::Generic(GenericPath::new(path, PathParams::with_types(params))),
        TypePathBinding::Struct,
    )
}

fn t_param(name: &str, binding: u16) -> TypeRef {
    TypeRef::new_generic(n(name), binding)
}

fn one_param(name: &str) -> GenericParams {
    let mut params = GenericParams::new();
    params.types.push(TypeParamDef::new(n(name)));
    params
}

fn add_type_item(module: &mut Module, name: &str, item: TypeItem) {
    module
        .mod_items
        .insert(n(name), Box::new(VisEnt::new(Publicity::new_global(), item)));
}

fn empty_trait_impl(params: GenericParams, trait_args: PathParams, ty: TypeRef) -> TraitImpl {
    TraitImpl {
        params,
        trait_args,
        ty,
        methods: Default::default(),
        constants: Default::default(),
        statics: Default::default(),
        types: Default::default(),
        src_module: core_path(&[]),
    }
}

/// A miniature `core`: `Sized`/`Copy`/`Unsize` lang traits, a `Sync` auto
/// trait with the `UnsafeCell` opt-out, and `Index` with its slice impl.
fn mini_core() -> Crate {
    let mut krate = Crate::new(n("core"));
    let root = &mut krate.root_module;

    add_type_item(root, "Sized", TypeItem::Trait(Trait::new(GenericParams::new())));
    add_type_item(root, "Copy", TypeItem::Trait(Trait::new(GenericParams::new())));
    add_type_item(root, "Unsize", TypeItem::Trait(Trait::new(one_param("T"))));
    let mut sync = Trait::new(GenericParams::new());
    sync.is_marker = true;
    add_type_item(root, "Sync", TypeItem::Trait(sync));

    // trait Index<Idx> { type Output: ?Sized; }
    let mut index = Trait::new(one_param("Idx"));
    index.types.insert(
        n("Output"),
        AssociatedType {
            is_sized: false,
            lifetime_bound: LifetimeRef::new_unknown(),
            trait_bounds: Vec::new(),
            default: None,
        },
    );
    add_type_item(root, "Index", TypeItem::Trait(index));

    // struct Range<T> { start: T, end: T }
    let mut range = Struct::new_unit(one_param("T"));
    range.data = StructData::Named(vec![
        (n("start"), VisEnt::new(Publicity::new_global(), t_param("T", 0))),
        (n("end"), VisEnt::new(Publicity::new_global(), t_param("T", 0))),
    ]);
    add_type_item(root, "Range", TypeItem::Struct(range));

    // struct UnsafeCell<T> { value: T }
    let mut cell = Struct::new_unit(one_param("T"));
    cell.data = StructData::Named(vec![(
        n("value"),
        VisEnt::new(Publicity::new_global(), t_param("T", 0)),
    )]);
    add_type_item(root, "UnsafeCell", TypeItem::Struct(cell));

    for (lang, item) in &[
        (hir::lang::SIZED, "Sized"),
        (hir::lang::COPY, "Copy"),
        (hir::lang::UNSIZE, "Unsize"),
        (hir::lang::UNSAFE_CELL, "UnsafeCell"),
    ] {
        krate.lang_items.insert(n(lang), core_path(&[item]));
    }

    // impl<T> !Sync for UnsafeCell<T>
    krate.add_marker_impl(
        core_path(&["Sync"]),
        MarkerImpl {
            params: one_param("T"),
            trait_args: PathParams::new(),
            is_positive: false,
            ty: ty_struct(core_path(&["UnsafeCell"]), vec![t_param("T", 0)]),
        },
    );

    // impl<T> Index<Range<usize>> for [T] { type Output = [T]; }
    let mut slice_index = empty_trait_impl(
        one_param("T"),
        PathParams::with_types(vec![ty_struct(
            core_path(&["Range"]),
            vec![CoreType::Usize.into()],
        )]),
        TypeRef::new_slice(t_param("T", 0)),
    );
    slice_index.types.insert(
        n("Output"),
        ImplEnt { is_specialisable: false, item: TypeRef::new_slice(t_param("T", 0)) },
    );
    krate.add_trait_impl(core_path(&["Index"]), slice_index);

    crate::fixup::run_post_load(&mut krate);
    krate
}

fn projection(ty: TypeRef, trait_: GenericPath, item: &str) -> TypeRef {
    TypeRef::new_path(
        Path::UfcsKnown(Box::new(PathUfcsKnown {
            ty,
            trait_,
            item: n(item),
            params: PathParams::new(),
            hrtbs: None,
        })),
        TypePathBinding::Unbound,
    )
}

#[test]
fn specialisation_precedence() {
    let mut krate = mini_core();
    add_type_item(
        &mut krate.root_module,
        "Mark",
        TypeItem::Trait(Trait::new(GenericParams::new())),
    );
    let mark = core_path(&["Mark"]);
    // impl<T> Mark for T
    krate.add_trait_impl(
        mark.clone(),
        empty_trait_impl(one_param("T"), PathParams::new(), t_param("T", 0)),
    );
    // impl Mark for u32
    krate.add_trait_impl(
        mark.clone(),
        empty_trait_impl(GenericParams::new(), PathParams::new(), CoreType::U32.into()),
    );

    let resolve = StaticTraitResolve::new(&krate);
    let sp = Span::default();
    let u32_ty: TypeRef = CoreType::U32.into();

    let mut seen: Vec<TypeRef> = Vec::new();
    let found = resolve.find_impl(
        sp,
        &mark,
        None,
        &u32_ty,
        &mut |ir, _fuzzy| {
            if let ImplRef::Impl { imp, .. } = &ir {
                seen.push(imp.ty.clone());
            }
            // Keep iterating to observe the order.
            seen.len() >= 2
        },
        false,
    );
    assert!(found);
    // Concrete bucket is visited before the generic one.
    assert_eq!(seen[0], u32_ty);

    let group = &krate.trait_impls[&mark];
    let generic_impl = &group.generic[0];
    let concrete_impl = &group.non_named[0];
    assert!(crate::more_specific_than(&krate, concrete_impl, generic_impl));
    assert!(!crate::more_specific_than(&krate, generic_impl, concrete_impl));
    assert!(crate::overlaps_with(&krate, concrete_impl, generic_impl));
}

#[test]
fn auto_trait_destructuring() {
    let _ = env_logger::builder().is_test(true).try_init();
    let krate = mini_core();
    let resolve = StaticTraitResolve::new(&krate);
    let sp = Span::default();
    let sync = core_path(&["Sync"]);

    let good = TypeRef::new_tuple(vec![
        CoreType::I32.into(),
        TypeRef::new_pointer(hir::BorrowType::Shared, CoreType::U8.into()),
    ]);
    assert!(resolve.find_impl(sp, &sync, None, &good, &mut |_, _| true, false));

    let cell_u8 = ty_struct(core_path(&["UnsafeCell"]), vec![CoreType::U8.into()]);
    let bad = TypeRef::new_tuple(vec![CoreType::I32.into(), cell_u8.clone()]);
    assert!(!resolve.find_impl(sp, &sync, None, &bad, &mut |_, _| true, false));

    assert_eq!(resolve.type_is_interior_mutable(sp, &bad), Compare::Equal);
    assert_eq!(resolve.type_is_interior_mutable(sp, &good), Compare::Unequal);
}

#[test]
fn projection_expands_and_is_idempotent() {
    let krate = mini_core();
    let resolve = StaticTraitResolve::new(&krate);
    let sp = Span::default();

    let index_range = GenericPath::new(
        core_path(&["Index"]),
        PathParams::with_types(vec![ty_struct(
            core_path(&["Range"]),
            vec![CoreType::Usize.into()],
        )]),
    );
    let mut ty = projection(TypeRef::new_slice(CoreType::U8.into()), index_range, "Output");

    resolve.expand_associated_types(sp, &mut ty);
    assert_eq!(ty, TypeRef::new_slice(CoreType::U8.into()));

    let once = ty.clone();
    resolve.expand_associated_types(sp, &mut ty);
    assert_eq!(ty, once);
}

#[test]
fn unsize_array_to_slice() {
    let krate = mini_core();
    let resolve = StaticTraitResolve::new(&krate);
    let sp = Span::default();

    let arr_u8 = TypeRef::new_array(CoreType::U8.into(), 3u64.into());
    assert!(resolve.can_unsize(sp, &TypeRef::new_slice(CoreType::U8.into()), &arr_u8));
    assert!(!resolve.can_unsize(sp, &TypeRef::new_slice(CoreType::U16.into()), &arr_u8));
}

#[test]
fn marker_consistency() {
    let krate = mini_core();
    let resolve = StaticTraitResolve::new(&krate);
    let sp = Span::default();
    let copy = core_path(&["Copy"]);

    let cases: Vec<TypeRef> = vec![
        CoreType::U32.into(),
        TypeRef::new_tuple(vec![CoreType::Bool.into(), CoreType::Char.into()]),
        TypeRef::new_array(CoreType::U8.into(), 0u64.into()),
        TypeRef::new_pointer(hir::BorrowType::Unique, CoreType::U8.into()),
    ];
    for ty in cases {
        assert!(resolve.type_is_copy(sp, &ty), "{} should be Copy", ty);
        assert!(
            resolve.find_impl(sp, &copy, None, &ty, &mut |_, _| true, false),
            "find_impl(Copy) must agree for {}",
            ty
        );
    }

    // str and slices are neither Copy nor Sized.
    let str_ty: TypeRef = CoreType::Str.into();
    assert!(!resolve.type_is_copy(sp, &str_ty));
    assert!(!resolve.type_is_sized(sp, &str_ty));
    assert_eq!(resolve.metadata_type(sp, &str_ty), crate::MetadataType::Slice);
    assert!(resolve.type_is_sized(sp, &CoreType::U64.into()));
}

#[test]
fn find_impl_is_deterministic() {
    let mut krate = mini_core();
    add_type_item(
        &mut krate.root_module,
        "Mark",
        TypeItem::Trait(Trait::new(GenericParams::new())),
    );
    let mark = core_path(&["Mark"]);
    krate.add_trait_impl(
        mark.clone(),
        empty_trait_impl(one_param("T"), PathParams::new(), t_param("T", 0)),
    );
    krate.add_trait_impl(
        mark.clone(),
        empty_trait_impl(GenericParams::new(), PathParams::new(), CoreType::U32.into()),
    );
    let resolve = StaticTraitResolve::new(&krate);
    let sp = Span::default();
    let u32_ty: TypeRef = CoreType::U32.into();

    let collect = || {
        let mut order: Vec<String> = Vec::new();
        resolve.find_impl(
            sp,
            &mark,
            None,
            &u32_ty,
            &mut |ir, _| {
                order.push(format!("{:?}", ir));
                false
            },
            false,
        );
        order
    };
    assert_eq!(collect(), collect());
}

#[test]
fn env_bound_satisfies_query() {
    let mut krate = mini_core();
    add_type_item(
        &mut krate.root_module,
        "Mark",
        TypeItem::Trait(Trait::new(GenericParams::new())),
    );
    let mark = core_path(&["Mark"]);

    // fn f<T: Mark>(..) — within the function, `T: Mark` must hold with no
    // impls in the crate at all.
    let mut generics = one_param("T");
    generics.bounds.push(hir::GenericBound::TraitBound {
        hrtbs: None,
        ty: t_param("T", 0x0100),
        trait_: hir::TraitPath::new(GenericPath::from(mark.clone())),
    });
    let resolve = StaticTraitResolve::with_generics(&krate, None, Some(&generics));
    let sp = Span::default();
    let t = t_param("T", 0x0100);
    assert!(resolve.find_impl(sp, &mark, None, &t, &mut |_, _| true, false));
    // And an unrelated type still fails.
    assert!(!resolve.find_impl(
        sp,
        &mark,
        None,
        &CoreType::U8.into(),
        &mut |_, _| true,
        false
    ));
}
