//! Crate-local helper macros.

/// The path/type grammar has one canonical rendering; `Debug` reuses it so
/// logs and panics print real syntax instead of struct dumps.
macro_rules! impl_debug_via_display {
    ($t:ty) => {
        impl ::std::fmt::Debug for $t {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(self, f)
            }
        }
    };
}
