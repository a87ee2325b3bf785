//! The low-level metadata protocol: tagged, length-prefixed values over a
//! zlib stream, with a front-loaded interned-string dictionary and
//! self-describing object framing.
//!
//! The bit-level encodings here are a compatibility surface — changing any
//! of them invalidates every existing metadata file.

use std::fmt;
use std::io::{self, Read, Write};

use drop_bomb::DropBomb;
use intern::IStr;
use rustc_hash::FxHashMap;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    BadMagic,
    /// A variant or framing tag outside the expected range.
    BadTag { what: &'static str, found: u64 },
    /// Framed object name does not match the expected class.
    BadObjectName { expected: &'static str, found: String },
    BadBool(u8),
    BadLength { found: u8 },
    StringTooLong(usize),
    DictIndexOutOfRange(usize),
    /// A value that must never be serialised (e.g. an unresolved path).
    Unencodable(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::BadMagic => f.write_str("bad metadata magic"),
            Error::BadTag { what, found } => write!(f, "bad {} tag {:#x}", what, found),
            Error::BadObjectName { expected, found } => {
                write!(f, "expected object `{}`, found `{}`", expected, found)
            }
            Error::BadBool(v) => write!(f, "expected bool (0x00/0xFF), got {:#04x}", v),
            Error::BadLength { found } => write!(f, "expected length, got byte {:#04x}", found),
            Error::StringTooLong(n) => write!(f, "string of {} bytes exceeds the format limit", n),
            Error::DictIndexOutOfRange(i) => write!(f, "string dictionary index {} out of range", i),
            Error::Unencodable(what) => write!(f, "cannot serialise {}", what),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

/// File header preceding the compressed stream.
pub const MAGIC: &[u8; 8] = b"FRSMETA\x01";

/// Maximum length of a non-interned string (`(0x7F << 16) | 0xFFFF`).
const MAX_STRING: usize = (0x7F << 16) | 0xFFFF;

// ---------------------------------------------------------------------------
// Writer

enum Sink<W: Write> {
    /// First pass: count interned-string uses, discard the bytes.
    Count,
    Real(W),
}

/// Protocol writer. Used twice per file: a counting pass that discovers the
/// interned-string population, then a real pass with the dictionary fixed
/// (most-used first, so hot strings get one-byte indices).
pub struct Writer<W: Write> {
    sink: Sink<W>,
    istring_counts: FxHashMap<IStr, (u64, usize)>,
    istring_dict: FxHashMap<IStr, usize>,
    objname_dict: FxHashMap<&'static str, usize>,
    depth: usize,
}

impl Writer<std::io::Sink> {
    /// The counting pass.
    pub fn new_counter() -> Writer<std::io::Sink> {
        Writer {
            sink: Sink::Count,
            istring_counts: FxHashMap::default(),
            istring_dict: FxHashMap::default(),
            objname_dict: FxHashMap::default(),
            depth: 0,
        }
    }

    /// Dictionary order: descending use count, first-seen order tie-break.
    pub fn into_dictionary(self) -> Vec<IStr> {
        let mut entries: Vec<(IStr, u64, usize)> =
            self.istring_counts.into_iter().map(|(s, (n, first))| (s, n, first)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        entries.into_iter().map(|(s, _, _)| s).collect()
    }
}

impl<W: Write> Writer<W> {
    /// The real pass, over an already-emitted dictionary.
    pub fn new(out: W, dictionary: &[IStr]) -> Writer<W> {
        let istring_dict =
            dictionary.iter().enumerate().map(|(i, s)| (s.clone(), i)).collect();
        Writer {
            sink: Sink::Real(out),
            istring_counts: FxHashMap::default(),
            istring_dict,
            objname_dict: FxHashMap::default(),
            depth: 0,
        }
    }

    pub fn into_inner(self) -> Option<W> {
        assert!(self.depth == 0, "unclosed object at end of serialisation");
        match self.sink {
            Sink::Real(w) => Some(w),
            Sink::Count => None,
        }
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.sink {
            Sink::Count => Ok(()),
            Sink::Real(w) => Ok(w.write_all(bytes)?),
        }
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.emit(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.emit(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.emit(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.emit(&v.to_le_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_u64(v as u64)
    }

    /// Variable-length `u64`: 1, 3, 5 or 9 bytes. The 5-byte form carries
    /// its 32-bit tail MSB-first.
    pub fn write_u64c(&mut self, v: u64) -> Result<()> {
        if v < 1 << 7 {
            self.write_u8(v as u8)
        } else if v < 1 << (6 + 16) {
            self.emit(&[0x80 + (v >> 16) as u8, (v >> 8) as u8, v as u8])
        } else if v < 0x3F << 32 {
            self.emit(&[
                0xC0 + (v >> 32) as u8,
                (v >> 24) as u8,
                (v >> 16) as u8,
                (v >> 8) as u8,
                v as u8,
            ])
        } else {
            self.write_u8(0xFF)?;
            self.write_u64(v)
        }
    }

    /// Zigzag signed form: low bit is the sign. `i64::MIN` wraps to the
    /// reserved `0|1` encoding.
    pub fn write_i64c(&mut self, v: i64) -> Result<()> {
        let sign = v < 0;
        let mag = (v as i128).unsigned_abs() as u64;
        self.write_u64c(mag.wrapping_shl(1) | sign as u64)
    }

    pub fn write_double(&mut self, v: f64) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    pub fn write_tag(&mut self, t: u8) -> Result<()> {
        self.write_u8(t)
    }

    pub fn write_count(&mut self, c: usize) -> Result<()> {
        if c == usize::MAX {
            self.write_u8(0xFF)
        } else if c < 0xFD {
            self.write_u8(c as u8)
        } else if c < 1 << 16 {
            self.write_u8(0xFD)?;
            self.write_u16(c as u16)
        } else {
            assert!(c < 1 << 31);
            self.write_u8(0xFE)?;
            self.write_u32(c as u32)
        }
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        let len = s.len();
        if len >= 128 {
            if len > MAX_STRING {
                return Err(Error::StringTooLong(len));
            }
            self.write_u8(128 + (len >> 16) as u8)?;
            self.write_u16(len as u16)?;
        } else {
            self.write_u8(len as u8)?;
        }
        self.emit(s.as_bytes())
    }

    pub fn write_istring(&mut self, s: &IStr) -> Result<()> {
        match &self.sink {
            Sink::Count => {
                let next = self.istring_counts.len();
                let ent = self.istring_counts.entry(s.clone()).or_insert((0, next));
                ent.0 += 1;
                Ok(())
            }
            Sink::Real(_) => {
                let idx = *self
                    .istring_dict
                    .get(s)
                    .unwrap_or_else(|| panic!("istring `{}` missing from dictionary", s));
                self.write_count(idx)
            }
        }
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(if v { 0xFF } else { 0x00 })
    }

    // Core protocol: self-length-prefixed values used by object framing.
    fn raw_write_uint(&mut self, mut v: u64) -> Result<()> {
        if v < 0xC0 {
            self.write_u8(v as u8)
        } else {
            let mut bytes = [0u8; 8];
            let mut len = 0;
            while v > 0 {
                bytes[len] = v as u8;
                v >>= 8;
                len += 1;
            }
            self.write_u8(0xC0 + len as u8)?;
            self.emit(&bytes[..len])
        }
    }

    fn raw_write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < (0xFC - 0xC0) {
            self.write_u8(0xC0 + data.len() as u8)?;
        } else {
            self.write_u8(0xFC)?;
            self.raw_write_uint(data.len() as u64)?;
        }
        self.emit(data)
    }

    /// Begin a named object. The name string itself is emitted only on the
    /// first use; later uses carry the dictionary index alone.
    pub fn open_object(&mut self, name: &'static str) -> Result<ObjToken> {
        self.write_u8(0xFD)?;
        match self.objname_dict.get(name) {
            Some(&idx) => self.raw_write_uint(idx as u64)?,
            None => {
                let idx = self.objname_dict.len();
                self.objname_dict.insert(name, idx);
                self.raw_write_uint(idx as u64)?;
                self.raw_write_bytes(name.as_bytes())?;
            }
        }
        self.depth += 1;
        Ok(ObjToken { bomb: DropBomb::new("object opened but never closed") })
    }

    pub fn open_anon_object(&mut self) -> Result<ObjToken> {
        self.write_u8(0xFE)?;
        self.depth += 1;
        Ok(ObjToken { bomb: DropBomb::new("object opened but never closed") })
    }

    pub fn close_object(&mut self, mut token: ObjToken) -> Result<()> {
        token.bomb.defuse();
        self.depth -= 1;
        self.write_u8(0xFF)
    }
}

/// Proof that an opened object is eventually closed; detonates on drop.
pub struct ObjToken {
    bomb: DropBomb,
}

// ---------------------------------------------------------------------------
// Reader

pub struct Reader<R: Read> {
    inner: R,
    strings: Vec<IStr>,
    objnames: Vec<String>,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Reader<R> {
        Reader { inner, strings: Vec::new(), objnames: Vec::new() }
    }

    /// Load the front-of-stream interned-string dictionary.
    pub fn read_dictionary(&mut self) -> Result<()> {
        let count = self.read_count()?;
        let mut strings = Vec::with_capacity(count);
        for _ in 0..count {
            let s = self.read_string()?;
            strings.push(IStr::new(&s));
        }
        self.strings = strings;
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        Ok(self.inner.read_exact(buf)?)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.fill(&mut b)?;
        Ok(b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.fill(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.fill(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.fill(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_u64c(&mut self) -> Result<u64> {
        let b = self.read_u8()?;
        if b < 0x80 {
            Ok(b as u64)
        } else if b < 0xC0 {
            let mut rv = ((b & 0x3F) as u64) << 16;
            rv |= (self.read_u8()? as u64) << 8;
            rv |= self.read_u8()? as u64;
            Ok(rv)
        } else if b < 0xFF {
            // The four tail bytes are MSB-first.
            let mut rv = ((b & 0x3F) as u64) << 32;
            rv |= (self.read_u8()? as u64) << 24;
            rv |= (self.read_u8()? as u64) << 16;
            rv |= (self.read_u8()? as u64) << 8;
            rv |= self.read_u8()? as u64;
            Ok(rv)
        } else {
            self.read_u64()
        }
    }

    pub fn read_i64c(&mut self) -> Result<i64> {
        let raw = self.read_u64c()?;
        let sign = raw & 1 != 0;
        let mag = raw >> 1;
        Ok(if mag == 0 && sign {
            i64::MIN
        } else if sign {
            -(mag as i64)
        } else {
            mag as i64
        })
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        self.fill(&mut b)?;
        Ok(f64::from_ne_bytes(b))
    }

    pub fn read_tag(&mut self) -> Result<u8> {
        self.read_u8()
    }

    pub fn read_count(&mut self) -> Result<usize> {
        let b = self.read_u8()?;
        Ok(match b {
            0xFD => self.read_u16()? as usize,
            0xFE => self.read_u32()? as usize,
            0xFF => usize::MAX,
            v => v as usize,
        })
    }

    pub fn read_string(&mut self) -> Result<String> {
        let b = self.read_u8()?;
        let len = if b < 128 {
            b as usize
        } else {
            (((b & 0x7F) as usize) << 16) | self.read_u16()? as usize
        };
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|_| Error::BadTag { what: "string utf-8", found: 0 })
    }

    pub fn read_istring(&mut self) -> Result<IStr> {
        let idx = self.read_count()?;
        self.strings.get(idx).cloned().ok_or(Error::DictIndexOutOfRange(idx))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0x00 => Ok(false),
            0xFF => Ok(true),
            v => Err(Error::BadBool(v)),
        }
    }

    fn raw_read_uint(&mut self) -> Result<u64> {
        let b = self.read_u8()?;
        if b < 0xC0 {
            Ok(b as u64)
        } else {
            let len = (b - 0xC0) as usize;
            if len > 8 {
                return Err(Error::BadTag { what: "raw uint length", found: b as u64 });
            }
            let mut rv = 0u64;
            for p in 0..len {
                rv |= (self.read_u8()? as u64) << (8 * p);
            }
            Ok(rv)
        }
    }

    fn raw_read_len(&mut self) -> Result<usize> {
        let b = self.read_u8()?;
        if b < 0xC0 {
            Err(Error::BadLength { found: b })
        } else if b < 0xFC {
            Ok((b - 0xC0) as usize)
        } else if b == 0xFC {
            Ok(self.raw_read_uint()? as usize)
        } else {
            Err(Error::BadLength { found: b })
        }
    }

    fn raw_read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.raw_read_len()?;
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Consume a named-object open and validate the class name — the
    /// format's corruption-detection mechanism.
    pub fn open_object(&mut self, name: &'static str) -> Result<()> {
        match self.read_u8()? {
            0xFD => {}
            v => return Err(Error::BadTag { what: "object open", found: v as u64 }),
        }
        let key = self.raw_read_uint()? as usize;
        if key == self.objnames.len() {
            let raw = self.raw_read_bytes()?;
            let s = String::from_utf8(raw)
                .map_err(|_| Error::BadTag { what: "object name utf-8", found: 0 })?;
            self.objnames.push(s);
        }
        let found = self
            .objnames
            .get(key)
            .ok_or(Error::BadTag { what: "object name index", found: key as u64 })?;
        if found != name {
            return Err(Error::BadObjectName { expected: name, found: found.clone() });
        }
        Ok(())
    }

    pub fn open_anon_object(&mut self) -> Result<()> {
        match self.read_u8()? {
            0xFE => Ok(()),
            v => Err(Error::BadTag { what: "anon object open", found: v as u64 }),
        }
    }

    pub fn close_object(&mut self) -> Result<()> {
        match self.read_u8()? {
            0xFF => Ok(()),
            v => Err(Error::BadTag { what: "object close", found: v as u64 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<F, G, T>(write: F, read: G) -> T
    where
        F: FnOnce(&mut Writer<Vec<u8>>),
        G: FnOnce(&mut Reader<&[u8]>) -> T,
    {
        let mut w = Writer::new(Vec::new(), &[]);
        write(&mut w);
        let buf = w.into_inner().unwrap();
        let mut r = Reader::new(&buf[..]);
        read(&mut r)
    }

    #[test]
    fn u64c_closure() {
        // Byte-boundary values for every encoded form.
        let cases: &[u64] = &[
            0,
            1,
            0x7F,
            0x80,
            0x3F_FFFF,
            0x40_0000,
            0x3E_FFFF_FFFF,
            0x3F_0000_0000,
            u64::MAX,
        ];
        for &v in cases {
            let got = round_trip(
                |w| w.write_u64c(v).unwrap(),
                |r| r.read_u64c().unwrap(),
            );
            assert_eq!(got, v, "u64c {:#x}", v);
        }
    }

    #[test]
    fn u64c_encoded_sizes() {
        let size_of = |v: u64| {
            let mut w = Writer::new(Vec::new(), &[]);
            w.write_u64c(v).unwrap();
            w.into_inner().unwrap().len()
        };
        assert_eq!(size_of(0x7F), 1);
        assert_eq!(size_of(0x80), 3);
        assert_eq!(size_of(0x3F_FFFF), 3);
        assert_eq!(size_of(0x40_0000), 5);
        assert_eq!(size_of(0x3E_FFFF_FFFF), 5);
        assert_eq!(size_of(0x3F_0000_0000), 9);
    }

    #[test]
    fn u64c_five_byte_tail_is_msb_first() {
        let mut w = Writer::new(Vec::new(), &[]);
        w.write_u64c(0x01_1234_5678).unwrap();
        assert_eq!(w.into_inner().unwrap(), vec![0xC1, 0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn i64c_closure_including_min() {
        let cases: &[i64] = &[0, 1, -1, 63, -64, i64::MAX, i64::MIN];
        for &v in cases {
            let got = round_trip(
                |w| w.write_i64c(v).unwrap(),
                |r| r.read_i64c().unwrap(),
            );
            assert_eq!(got, v, "i64c {}", v);
        }
        // i64::MIN is the reserved `0|1` encoding.
        let mut w = Writer::new(Vec::new(), &[]);
        w.write_i64c(i64::MIN).unwrap();
        assert_eq!(w.into_inner().unwrap(), vec![0x01]);
    }

    #[test]
    fn count_escapes() {
        for &c in &[0usize, 0xFC, 0xFD, 0xFFFF, 0x10000, usize::MAX] {
            let got = round_trip(
                |w| w.write_count(c).unwrap(),
                |r| r.read_count().unwrap(),
            );
            assert_eq!(got, c);
        }
    }

    #[test]
    fn strict_bool() {
        let mut r = Reader::new(&[0x01u8][..]);
        assert!(matches!(r.read_bool(), Err(Error::BadBool(0x01))));
        assert!(round_trip(|w| w.write_bool(true).unwrap(), |r| r.read_bool().unwrap()));
        assert!(!round_trip(|w| w.write_bool(false).unwrap(), |r| r.read_bool().unwrap()));
    }

    #[test]
    fn long_strings() {
        let s = "x".repeat(5000);
        let got = round_trip(
            |w| w.write_string(&s).unwrap(),
            |r| r.read_string().unwrap(),
        );
        assert_eq!(got, s);
    }

    #[test]
    fn object_name_mismatch_is_detected() {
        let mut w = Writer::new(Vec::new(), &[]);
        let t = w.open_object("Struct").unwrap();
        w.close_object(t).unwrap();
        let buf = w.into_inner().unwrap();
        let mut r = Reader::new(&buf[..]);
        assert!(matches!(
            r.open_object("Enum"),
            Err(Error::BadObjectName { expected: "Enum", .. })
        ));
    }

    #[test]
    fn object_names_are_cached_after_first_use() {
        let mut w = Writer::new(Vec::new(), &[]);
        let a = w.open_object("Module").unwrap();
        w.close_object(a).unwrap();
        let b = w.open_object("Module").unwrap();
        w.close_object(b).unwrap();
        let buf = w.into_inner().unwrap();
        let mut r = Reader::new(&buf[..]);
        r.open_object("Module").unwrap();
        r.close_object().unwrap();
        r.open_object("Module").unwrap();
        r.close_object().unwrap();
        // Second open carries only the index: 0xFD + uint.
        assert!(buf.len() < 2 * (1 + 1 + 1 + "Module".len() + 1));
    }

    #[test]
    fn istring_dictionary_round_trip() {
        let a = IStr::new("alpha");
        let b = IStr::new("beta");
        // Count pass: `a` used twice, `b` once.
        let mut counter = Writer::new_counter();
        counter.write_istring(&a).unwrap();
        counter.write_istring(&b).unwrap();
        counter.write_istring(&a).unwrap();
        let dict = counter.into_dictionary();
        assert_eq!(dict, vec![a.clone(), b.clone()]);

        let mut w = Writer::new(Vec::new(), &dict);
        w.write_count(dict.len()).unwrap();
        for s in &dict {
            w.write_string(s.as_str()).unwrap();
        }
        w.write_istring(&a).unwrap();
        w.write_istring(&b).unwrap();
        w.write_istring(&a).unwrap();
        let buf = w.into_inner().unwrap();

        let mut r = Reader::new(&buf[..]);
        r.read_dictionary().unwrap();
        assert_eq!(r.read_istring().unwrap(), a);
        assert_eq!(r.read_istring().unwrap(), b);
        assert_eq!(r.read_istring().unwrap(), a);
    }
}
