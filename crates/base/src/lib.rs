//! Base types shared by every layer of the middle-end: source spans, the
//! target description, and the error-escalation macros.
//!
//! Error policy:
//! * User-facing semantic errors escalate through [`fatal!`] — a
//!   span-annotated diagnostic followed by process-level abort. There is no
//!   recovery within a crate compile.
//! * Broken invariants from an earlier pass escalate through [`bug!`], which
//!   names the phase so the offending pass can be found.
//! * Query-shaped code (the trait resolver) returns outcomes instead and
//!   never uses either macro on well-formed input.

use std::fmt;

use intern::IStr;

/// A location in the source text. `file` is an index into the driver's file
/// table; `0` is the synthetic "no file" entry used by generated items.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct Span {
    pub file: u32,
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(file: u32, line: u32, col: u32) -> Span {
        Span { file, line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}:{}", self.file, self.line, self.col)
    }
}

/// The subset of the target description the middle-end reads: literal
/// byte order and pointer width for [`EncodedLiteral`] accesses.
///
/// [`EncodedLiteral`]: ../hir/literal/struct.EncodedLiteral.html
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TargetSpec {
    pub pointer_bits: u32,
    pub big_endian: bool,
}

impl Default for TargetSpec {
    fn default() -> TargetSpec {
        TargetSpec { pointer_bits: 64, big_endian: false }
    }
}

impl TargetSpec {
    pub fn pointer_bytes(&self) -> usize {
        (self.pointer_bits / 8) as usize
    }
}

/// Version of the source language this compile is bootstrapping. Gates the
/// handful of behaviours that changed across bootstrap targets: `Clone` as a
/// built-in resolver trait (1.29), `DiscriminantKind`/`Pointee` (1.54), the
/// tuple trait and generator resume arguments (1.74), and the legacy
/// placement-new lang items (1.19 only).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum TargetVersion {
    V1_19,
    V1_29,
    V1_39,
    V1_54,
    V1_74,
}

impl Default for TargetVersion {
    fn default() -> TargetVersion {
        TargetVersion::V1_74
    }
}

/// Payload carried by a [`fatal!`] unwind; the driver formats it and exits
/// non-zero.
#[derive(Debug)]
pub struct FatalError {
    pub span: Span,
    pub msg: String,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: error: {}", self.span, self.msg)
    }
}

#[doc(hidden)]
pub fn fatal_error(span: Span, msg: String) -> ! {
    log::error!("{}: {}", span, msg);
    std::panic::panic_any(FatalError { span, msg })
}

#[doc(hidden)]
pub fn bug_error(span: Span, phase: &str, msg: String) -> ! {
    log::error!("{}: BUG in {}: {}", span, phase, msg);
    panic!("{}: BUG in {}: {}", span, phase, msg)
}

/// Fatal semantic error: span-annotated diagnostic, no recovery.
#[macro_export]
macro_rules! fatal {
    ($sp:expr, $($arg:tt)*) => {
        $crate::fatal_error($sp, format!($($arg)*))
    };
}

/// Internal invariant breach: an earlier pass produced something this phase
/// was promised it would never see.
#[macro_export]
macro_rules! bug {
    ($sp:expr, $phase:expr, $($arg:tt)*) => {
        $crate::bug_error($sp, $phase, format!($($arg)*))
    };
}

/// Interns a well-known name. Shorthand for the paths module and tests.
pub fn istr(s: &str) -> IStr {
    IStr::new(s)
}
