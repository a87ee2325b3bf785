//! Crate metadata: a self-describing, length-prefixed binary format over a
//! zlib-compressed stream, used to save a compiled crate's HIR and reload it
//! when the crate is referenced.
//!
//! File layout: an 8-byte magic, then a zlib stream holding the
//! interned-string dictionary (most-used first) followed by the crate object
//! tree. Writing is two-pass: a counting pass discovers the string
//! population, the real pass emits it.
//!
//! Loads produce a crate whose derived fields (supertrait closures, vtable
//! tables, per-module trait lists) are empty; the driver runs the post-load
//! pass before the first query.

mod decode;
mod encode;
mod tags;

pub mod lowlevel;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hir::Crate;

use crate::lowlevel::{Error, Reader, Result, Writer, MAGIC};

/// Serialise `krate` to `path`.
pub fn write_crate_file(path: &Path, krate: &Crate) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(MAGIC)?;
    let encoder = ZlibEncoder::new(file, Compression::best());
    let encoder = write_crate_stream(encoder, krate)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Serialise `krate` into a byte vector (testing / in-memory pipelines).
pub fn write_crate_bytes(krate: &Crate) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    let encoder = ZlibEncoder::new(out, Compression::best());
    let encoder = write_crate_stream(encoder, krate)?;
    Ok(encoder.finish()?)
}

fn write_crate_stream<W: Write>(out: W, krate: &Crate) -> Result<W> {
    // Pass 1: discover and order the interned strings.
    let mut counter = Writer::new_counter();
    encode::write_crate(&mut counter, krate)?;
    let dictionary = counter.into_dictionary();

    // Pass 2: dictionary, then the crate tree.
    let mut w = Writer::new(out, &dictionary);
    w.write_count(dictionary.len())?;
    for s in &dictionary {
        w.write_string(s.as_str())?;
    }
    encode::write_crate(&mut w, krate)?;
    Ok(w.into_inner().expect("real pass always has a sink"))
}

/// Load a crate from `path`. Derived fields are left for the post-load pass.
pub fn read_crate_file(path: &Path) -> Result<hir::CratePtr> {
    let mut file = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::BadMagic);
    }
    read_crate_stream(ZlibDecoder::new(file))
}

pub fn read_crate_bytes(bytes: &[u8]) -> Result<hir::CratePtr> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::BadMagic);
    }
    read_crate_stream(ZlibDecoder::new(&bytes[MAGIC.len()..]))
}

fn read_crate_stream<R: Read>(input: R) -> Result<hir::CratePtr> {
    let mut r = Reader::new(input);
    r.read_dictionary()?;
    decode::read_crate(&mut r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::Span;
    use hir::ty::{TypePathBinding, TypeRef};
    use hir::{
        CoreType, Function, GenericParams, GenericPath, ImplEnt, Linkage, Path, PathParams,
        Publicity, Receiver, SimplePath, Struct, StructData, Trait, TraitImpl, TraitValueItem,
        TypeItem, TypeParamDef, ValueItem, VisEnt,
    };
    use hir_ty::{ImplRef, StaticTraitResolve};
    use intern::IStr;

    fn n(s: &str) -> IStr {
        IStr::new(s)
    }

    fn p(items: &[&str]) -> SimplePath {
        SimplePath::new(n("test"), items.iter().map(|s| n(s)))
    }

    /// A minimal crate exercising most item shapes: `struct S<T>{v:T}`,
    /// `trait Tr { fn f(&self) -> u32; }`, `impl Tr for S<u32>`.
    fn smoke_crate() -> Crate {
        let mut krate = Crate::new(n("test"));

        let mut s = Struct::new_unit({
            let mut g = GenericParams::new();
            g.types.push(TypeParamDef::new(n("T")));
            g
        });
        s.data = StructData::Named(vec![(
            n("v"),
            VisEnt::new(Publicity::new_global(), TypeRef::new_generic(n("T"), 0)),
        )]);
        krate
            .root_module
            .mod_items
            .insert(n("S"), Box::new(VisEnt::new(Publicity::new_global(), TypeItem::Struct(s))));

        let mut tr = Trait::new(GenericParams::new());
        let f_sig = Function {
            linkage: Linkage::default(),
            receiver: Receiver::BorrowShared,
            abi: n("Rust"),
            is_unsafe: false,
            is_const: false,
            is_variadic: false,
            params: GenericParams::new(),
            args: vec![(
                IStr::default(),
                TypeRef::new_borrow(hir::BorrowType::Shared, TypeRef::new_self()),
            )],
            ret: CoreType::U32.into(),
            body: None,
        };
        tr.values.insert(n("f"), TraitValueItem::Function(f_sig.clone()));
        krate
            .root_module
            .mod_items
            .insert(n("Tr"), Box::new(VisEnt::new(Publicity::new_global(), TypeItem::Trait(tr))));

        let s_u32 = TypeRef::new_path(
            Path::Generic(GenericPath::new(
                p(&["S"]),
                PathParams::with_types(vec![CoreType::U32.into()]),
            )),
            TypePathBinding::Struct,
        );
        let mut imp = TraitImpl {
            params: GenericParams::new(),
            trait_args: PathParams::new(),
            ty: s_u32,
            methods: Default::default(),
            constants: Default::default(),
            statics: Default::default(),
            types: Default::default(),
            src_module: p(&[]),
        };
        imp.methods.insert(n("f"), ImplEnt { is_specialisable: false, item: f_sig });
        krate.add_trait_impl(p(&["Tr"]), imp);

        krate.lang_items.insert(n("sized"), p(&["Tr"]));
        krate.exported_macros.insert(
            n("m"),
            hir::MacroRules {
                rules: vec![hir::MacroRule {
                    pattern: hir::TokenStream(vec![hir::Token::MetaVar {
                        name: n("x"),
                        frag: n("expr"),
                    }]),
                    body: hir::TokenStream(vec![hir::Token::Subst(n("x"))]),
                }],
                source_crate: n("test"),
            },
        );
        krate
    }

    /// Argument names do not travel through metadata (patterns are reset);
    /// normalise before comparing.
    fn strip_arg_names(krate: &mut Crate) {
        fn fix_fn(f: &mut Function) {
            for (name, _) in f.args.iter_mut() {
                *name = IStr::default();
            }
        }
        fn fix_module(m: &mut hir::Module) {
            for ent in m.value_items.values_mut() {
                if let ValueItem::Function(f) = &mut ent.item {
                    fix_fn(f);
                }
            }
            for ent in m.mod_items.values_mut() {
                match &mut ent.item {
                    TypeItem::Module(sub) => fix_module(sub),
                    TypeItem::Trait(t) => {
                        for item in t.values.values_mut() {
                            if let TraitValueItem::Function(f) = item {
                                fix_fn(f);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        fix_module(&mut krate.root_module);
        for group in krate.trait_impls.values_mut() {
            for imp in group
                .named
                .values_mut()
                .flat_map(|v| v.iter_mut())
                .chain(group.non_named.iter_mut())
                .chain(group.generic.iter_mut())
            {
                for ent in imp.methods.values_mut() {
                    fix_fn(&mut ent.item);
                }
            }
        }
    }

    #[test]
    fn round_trip_smoke() {
        let mut original = smoke_crate();
        let bytes = write_crate_bytes(&original).unwrap();
        let reloaded = read_crate_bytes(&bytes).unwrap();

        strip_arg_names(&mut original);
        assert_eq!(original.crate_name, reloaded.crate_name);
        assert_eq!(original.root_module, reloaded.root_module);
        assert_eq!(original.lang_items, reloaded.lang_items);
        assert_eq!(original.exported_macros, reloaded.exported_macros);
        let orig_impls: Vec<_> = original.trait_impls[&p(&["Tr"])].iter_all().collect();
        let new_impls: Vec<_> = reloaded.trait_impls[&p(&["Tr"])].iter_all().collect();
        assert_eq!(orig_impls, new_impls);

        // And the reloaded crate answers the find_impl query.
        let mut krate = *reloaded;
        hir_ty::fixup::run_post_load(&mut krate);
        let resolve = StaticTraitResolve::new(&krate);
        let s_u32 = TypeRef::new_path(
            Path::Generic(GenericPath::new(
                p(&["S"]),
                PathParams::with_types(vec![CoreType::U32.into()]),
            )),
            TypePathBinding::Struct,
        );
        let mut got = None;
        let found = resolve.find_impl(
            Span::default(),
            &p(&["Tr"]),
            None,
            &s_u32,
            &mut |ir, _| {
                if let ImplRef::Impl { impl_params, .. } = &ir {
                    got = Some(impl_params.clone());
                }
                true
            },
            false,
        );
        assert!(found);
        assert_eq!(got, Some(PathParams::new()));
    }

    #[test]
    fn generic_impl_params_are_discovered() {
        // impl<T> Tr2 for S<T> — querying with S<u32> must yield T = u32.
        let mut krate = smoke_crate();
        let mut tr2 = Trait::new(GenericParams::new());
        let _ = &mut tr2;
        krate.root_module.mod_items.insert(
            n("Tr2"),
            Box::new(VisEnt::new(Publicity::new_global(), TypeItem::Trait(tr2))),
        );
        let mut g = GenericParams::new();
        g.types.push(TypeParamDef::new(n("T")));
        let imp = TraitImpl {
            params: g,
            trait_args: PathParams::new(),
            ty: TypeRef::new_path(
                Path::Generic(GenericPath::new(
                    p(&["S"]),
                    PathParams::with_types(vec![TypeRef::new_generic(n("T"), 0)]),
                )),
                TypePathBinding::Struct,
            ),
            methods: Default::default(),
            constants: Default::default(),
            statics: Default::default(),
            types: Default::default(),
            src_module: p(&[]),
        };
        krate.add_trait_impl(p(&["Tr2"]), imp);

        let bytes = write_crate_bytes(&krate).unwrap();
        let mut krate = *read_crate_bytes(&bytes).unwrap();
        hir_ty::fixup::run_post_load(&mut krate);
        let resolve = StaticTraitResolve::new(&krate);
        let s_u32 = TypeRef::new_path(
            Path::Generic(GenericPath::new(
                p(&["S"]),
                PathParams::with_types(vec![CoreType::U32.into()]),
            )),
            TypePathBinding::Struct,
        );
        let mut got = None;
        assert!(resolve.find_impl(
            Span::default(),
            &p(&["Tr2"]),
            None,
            &s_u32,
            &mut |ir, _| {
                if let ImplRef::Impl { impl_params, .. } = &ir {
                    got = Some(impl_params.clone());
                }
                true
            },
            false,
        ));
        assert_eq!(got, Some(PathParams::with_types(vec![CoreType::U32.into()])));
    }

    #[test]
    fn corrupt_magic_is_fatal() {
        let krate = smoke_crate();
        let mut bytes = write_crate_bytes(&krate).unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(read_crate_bytes(&bytes), Err(Error::BadMagic)));
    }

    #[test]
    fn truncated_stream_is_fatal() {
        let krate = smoke_crate();
        let bytes = write_crate_bytes(&krate).unwrap();
        let cut = bytes.len() / 2;
        assert!(read_crate_bytes(&bytes[..cut]).is_err());
    }
}
