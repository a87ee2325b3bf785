//! Generic parameter lists and bounds.

use std::fmt;

use intern::IStr;

use crate::path::{PathParams, TraitPath};
use crate::ty::{
    ConstGeneric, GenericRef, LifetimeRef, TypeRef, GENERIC_GROUP_HRB, GENERIC_GROUP_IMPL,
    GENERIC_GROUP_METHOD,
};

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeParamDef {
    pub name: IStr,
    pub default: Option<TypeRef>,
    /// `false` for `?Sized` parameters (and the newer `?PointeeSized` /
    /// `?MetadataSized` forms, which are equivalent for sizedness).
    pub is_sized: bool,
}

impl TypeParamDef {
    pub fn new(name: IStr) -> TypeParamDef {
        TypeParamDef { name, default: None, is_sized: true }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LifetimeDef {
    pub name: IStr,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueParamDef {
    pub name: IStr,
    pub ty: TypeRef,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenericBound {
    /// `'a: 'b`
    Lifetime { test: LifetimeRef, valid_for: LifetimeRef },
    /// `T: 'a`
    TypeLifetime { ty: TypeRef, valid_for: LifetimeRef },
    /// `for<…> T: Trait`
    TraitBound { hrtbs: Option<Box<GenericParams>>, ty: TypeRef, trait_: TraitPath },
    /// `T = U` (associated-type equality recorded as a bound)
    TypeEquality { ty: TypeRef, other_ty: TypeRef },
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GenericParams {
    pub types: Vec<TypeParamDef>,
    pub lifetimes: Vec<LifetimeDef>,
    pub values: Vec<ValueParamDef>,
    pub bounds: Vec<GenericBound>,
}

impl GenericParams {
    pub fn new() -> GenericParams {
        GenericParams::default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.lifetimes.is_empty()
            && self.values.is_empty()
            && self.bounds.is_empty()
    }

    pub fn find_type_param(&self, name: &IStr) -> Option<usize> {
        self.types.iter().position(|p| &p.name == name)
    }

    /// Identity arguments for these parameters: every parameter referred to as
    /// itself, in the given binding group.
    pub fn make_nop_params(&self, group: u16) -> PathParams {
        assert!(matches!(group, GENERIC_GROUP_IMPL | GENERIC_GROUP_METHOD | GENERIC_GROUP_HRB));
        let base = group << 8;
        PathParams {
            lifetimes: self
                .lifetimes
                .iter()
                .enumerate()
                .map(|(i, _)| LifetimeRef::new_param(base | i as u16))
                .collect(),
            types: self
                .types
                .iter()
                .enumerate()
                .map(|(i, d)| TypeRef::new_generic(d.name.clone(), base | i as u16))
                .collect(),
            values: self
                .values
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    ConstGeneric::Generic(GenericRef::new(d.name.clone(), base | i as u16))
                })
                .collect(),
        }
    }
}

impl fmt::Display for GenericParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lifetimes.is_empty() && self.types.is_empty() && self.values.is_empty() {
            return Ok(());
        }
        f.write_str("<")?;
        for lt in &self.lifetimes {
            write!(f, "'{},", lt.name)?;
        }
        for t in &self.types {
            write!(f, "{}", t.name)?;
            if !t.is_sized {
                f.write_str(": ?Sized")?;
            }
            if let Some(d) = &t.default {
                write!(f, " = {}", d)?;
            }
            f.write_str(",")?;
        }
        for v in &self.values {
            write!(f, "const {}: {},", v.name, v.ty)?;
        }
        f.write_str(">")
    }
}
impl_debug_via_display!(GenericParams);
