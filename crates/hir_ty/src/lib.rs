//! Static trait resolution and monomorphisation over the HIR.
//!
//! The resolver answers "which impl applies" ([`StaticTraitResolve::find_impl`]),
//! rewrites associated-type projections in place
//! ([`StaticTraitResolve::expand_associated_types`]), classifies types against
//! the built-in marker traits, resolves value paths, and orders impls for
//! specialisation and coherence. The monomorphiser substitutes generic
//! parameters with correct handling of higher-ranked binders.
//!
//! Everything here is a pure query over an immutable [`hir::Crate`] (plus
//! interior write-once caches); the only mutating entry point is the
//! post-load pass in [`fixup`].

mod expand;
mod impl_ref;
mod markers;
mod resolve;
mod unify;
mod value;

pub mod fixup;
pub mod monomorph;
pub mod specialise;

#[cfg(test)]
mod tests;

pub use crate::impl_ref::{AtyMap, ImplRef};
pub use crate::markers::MetadataType;
pub use crate::monomorph::{monomorph_type_ext, Monomorphiser, MonomorphState};
pub use crate::resolve::{CachedBound, StaticTraitResolve};
pub use crate::specialise::{more_specific_than, overlaps_with};
pub use crate::unify::{
    compare_pathparams_fuzzy, compare_types_fuzzy, match_pathparams, match_type, MatchGenerics,
};
pub use crate::value::ValuePtr;
