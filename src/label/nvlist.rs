//! XDR-encoded name/value lists, the format of the label config record.
//!
//! Stream layout (all integers big-endian):
//!
//! ```text
//! header    encoding:u8 endian:u8 reserved:u16
//! nvlist    version:i32 nvflag:u32 pair* terminator
//! pair      encoded_size:i32 decoded_size:i32 name:xdr_string
//!           type:i32 nelem:i32 value
//! term      0:i32 0:i32
//! ```
//!
//! `decoded_size` is the in-memory size a native decoder allocates for the
//! pair; it is recomputed on every pack so other implementations can read
//! what this one writes.

use crate::error::NvListError;

/// Header encoding byte for XDR.
pub const NV_ENCODE_XDR: u8 = 1;

/// Names are unique within the list.
pub const NV_UNIQUE_NAME: u32 = 0x1;

/// Name and type pairs are unique within the list.
pub const NV_UNIQUE_NAME_TYPE: u32 = 0x2;

const NV_VERSION: i32 = 0;
const MAX_DEPTH: usize = 64;

const DATA_TYPE_BOOLEAN: i32 = 1;
const DATA_TYPE_UINT64: i32 = 8;
const DATA_TYPE_STRING: i32 = 9;
const DATA_TYPE_UINT64_ARRAY: i32 = 16;
const DATA_TYPE_NVLIST: i32 = 19;
const DATA_TYPE_NVLIST_ARRAY: i32 = 20;

// Native struct sizes used for decoded_size.
const NVPAIR_HEADER_SIZE: usize = 16;
const NVLIST_STRUCT_SIZE: usize = 24;
const POINTER_SIZE: usize = 8;

/// A value held by a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NvValue {
    /// Presence flag with no payload.
    Boolean,
    Uint64(u64),
    String(String),
    Uint64Array(Vec<u64>),
    NvList(NvList),
    NvListArray(Vec<NvList>),
}

impl NvValue {
    fn type_code(&self) -> i32 {
        match self {
            NvValue::Boolean => DATA_TYPE_BOOLEAN,
            NvValue::Uint64(_) => DATA_TYPE_UINT64,
            NvValue::String(_) => DATA_TYPE_STRING,
            NvValue::Uint64Array(_) => DATA_TYPE_UINT64_ARRAY,
            NvValue::NvList(_) => DATA_TYPE_NVLIST,
            NvValue::NvListArray(_) => DATA_TYPE_NVLIST_ARRAY,
        }
    }

    fn nelem(&self) -> usize {
        match self {
            NvValue::Boolean => 0,
            NvValue::Uint64(_) | NvValue::String(_) | NvValue::NvList(_) => 1,
            NvValue::Uint64Array(v) => v.len(),
            NvValue::NvListArray(v) => v.len(),
        }
    }

    /// Native payload size, before alignment.
    fn native_size(&self) -> usize {
        match self {
            NvValue::Boolean => 0,
            NvValue::Uint64(_) => 8,
            NvValue::String(s) => s.len() + 1,
            NvValue::Uint64Array(v) => 8 * v.len(),
            NvValue::NvList(_) => NVLIST_STRUCT_SIZE,
            NvValue::NvListArray(v) => (POINTER_SIZE + NVLIST_STRUCT_SIZE) * v.len(),
        }
    }
}

/// An ordered list of named values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvList {
    pub version: i32,
    pub nvflag: u32,
    pairs: Vec<(String, NvValue)>,
}

impl Default for NvList {
    fn default() -> Self {
        Self::new()
    }
}

impl NvList {
    /// Create an empty list with unique-name semantics.
    pub fn new() -> Self {
        Self {
            version: NV_VERSION,
            nvflag: NV_UNIQUE_NAME,
            pairs: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NvValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&NvValue> {
        self.pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn lookup_u64(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            NvValue::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn lookup_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            NvValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn lookup_nvlist(&self, name: &str) -> Option<&NvList> {
        match self.get(name)? {
            NvValue::NvList(l) => Some(l),
            _ => None,
        }
    }

    /// Add a pair, honouring the list's uniqueness flags.
    pub fn insert(&mut self, name: impl Into<String>, value: NvValue) {
        let name = name.into();
        if self.nvflag & NV_UNIQUE_NAME != 0 {
            self.pairs.retain(|(k, _)| *k != name);
        } else if self.nvflag & NV_UNIQUE_NAME_TYPE != 0 {
            let code = value.type_code();
            self.pairs
                .retain(|(k, v)| !(*k == name && v.type_code() == code));
        }
        self.pairs.push((name, value));
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: NvValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Remove every pair named `name`, returning how many were dropped.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|(k, _)| k != name);
        before - self.pairs.len()
    }

    /// Size of the packed XDR stream, header included.
    pub fn packed_size(&self) -> usize {
        4 + self.encoded_size()
    }

    fn encoded_size(&self) -> usize {
        8 + self
            .pairs
            .iter()
            .map(|(k, v)| pair_encoded_size(k, v))
            .sum::<usize>()
            + 8
    }

    /// Pack into a fresh buffer.
    pub fn pack(&self) -> Vec<u8> {
        let mut enc = Encoder {
            out: Vec::with_capacity(self.packed_size()),
        };
        enc.out.extend_from_slice(&[NV_ENCODE_XDR, native_endian_byte(), 0, 0]);
        enc.nvlist(self);
        enc.out
    }

    /// Pack into the front of `window`, leaving any trailing bytes untouched.
    ///
    /// Returns the number of bytes written.
    pub fn pack_into(&self, window: &mut [u8]) -> Result<usize, NvListError> {
        let needed = self.packed_size();
        if needed > window.len() {
            return Err(NvListError::BufferTooSmall {
                needed,
                available: window.len(),
            });
        }
        let packed = self.pack();
        window[..packed.len()].copy_from_slice(&packed);
        Ok(packed.len())
    }

    /// Unpack a stream; trailing bytes after the terminator are ignored.
    pub fn unpack(buf: &[u8]) -> Result<Self, NvListError> {
        if buf.len() < 4 {
            return Err(NvListError::Truncated(buf.len()));
        }
        if buf[0] != NV_ENCODE_XDR {
            return Err(NvListError::UnsupportedEncoding(buf[0]));
        }
        let mut dec = Decoder { buf, pos: 4 };
        dec.nvlist(0)
    }
}

fn native_endian_byte() -> u8 {
    if cfg!(target_endian = "big") {
        0
    } else {
        1
    }
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

fn xdr_string_size(s: &str) -> usize {
    4 + align4(s.len())
}

fn pair_encoded_size(name: &str, value: &NvValue) -> usize {
    // encoded_size, decoded_size, name, type, nelem
    let header = 4 + 4 + xdr_string_size(name) + 4 + 4;
    let payload = match value {
        NvValue::Boolean => 0,
        NvValue::Uint64(_) => 8,
        NvValue::String(s) => xdr_string_size(s),
        NvValue::Uint64Array(v) => 4 + 8 * v.len(),
        NvValue::NvList(l) => l.encoded_size(),
        NvValue::NvListArray(v) => v.iter().map(NvList::encoded_size).sum(),
    };
    header + payload
}

fn pair_decoded_size(name: &str, value: &NvValue) -> usize {
    align8(NVPAIR_HEADER_SIZE + name.len() + 1) + align8(value.native_size())
}

struct Encoder {
    out: Vec<u8>,
}

impl Encoder {
    fn i32(&mut self, v: i32) {
        self.out.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.out.extend_from_slice(&v.to_be_bytes());
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.out.extend_from_slice(s.as_bytes());
        let pad = align4(s.len()) - s.len();
        self.out.extend(std::iter::repeat(0u8).take(pad));
    }

    fn nvlist(&mut self, list: &NvList) {
        self.i32(list.version);
        self.u32(list.nvflag);
        for (name, value) in &list.pairs {
            self.i32(pair_encoded_size(name, value) as i32);
            self.i32(pair_decoded_size(name, value) as i32);
            self.string(name);
            self.i32(value.type_code());
            self.i32(value.nelem() as i32);
            match value {
                NvValue::Boolean => {}
                NvValue::Uint64(v) => self.u64(*v),
                NvValue::String(s) => self.string(s),
                NvValue::Uint64Array(v) => {
                    self.u32(v.len() as u32);
                    for x in v {
                        self.u64(*x);
                    }
                }
                NvValue::NvList(l) => self.nvlist(l),
                NvValue::NvListArray(v) => {
                    for l in v {
                        self.nvlist(l);
                    }
                }
            }
        }
        self.i32(0);
        self.i32(0);
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], NvListError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(NvListError::Truncated(self.pos))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u32(&mut self) -> Result<u32, NvListError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, NvListError> {
        Ok(self.u32()? as i32)
    }

    fn u64(&mut self) -> Result<u64, NvListError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    fn count(&mut self, what: &'static str) -> Result<usize, NvListError> {
        let at = self.pos;
        let n = self.i32()?;
        usize::try_from(n).map_err(|_| NvListError::Malformed { offset: at, what })
    }

    fn string(&mut self) -> Result<String, NvListError> {
        let at = self.pos;
        let len = self.u32()? as usize;
        if len > self.remaining() {
            return Err(NvListError::Malformed {
                offset: at,
                what: "string length",
            });
        }
        let bytes = self.take(len)?;
        self.take(align4(len) - len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NvListError::InvalidString(at))
    }

    fn nvlist(&mut self, depth: usize) -> Result<NvList, NvListError> {
        if depth > MAX_DEPTH {
            return Err(NvListError::TooDeep(MAX_DEPTH));
        }
        let version = self.i32()?;
        let nvflag = self.u32()?;
        let mut pairs = Vec::new();

        loop {
            let start = self.pos;
            let encoded = self.i32()?;
            let decoded = self.i32()?;
            if encoded == 0 && decoded == 0 {
                break;
            }
            if encoded < 0 || decoded < 0 {
                return Err(NvListError::Malformed {
                    offset: start,
                    what: "pair size",
                });
            }

            let name = self.string()?;
            let kind = self.i32()?;
            let nelem = self.count("element count")?;
            let value = self.value(&name, kind, nelem, depth)?;

            if self.pos - start != encoded as usize {
                return Err(NvListError::Malformed {
                    offset: start,
                    what: "encoded size",
                });
            }
            if (decoded as usize) < pair_decoded_size(&name, &value) {
                return Err(NvListError::Malformed {
                    offset: start,
                    what: "decoded size",
                });
            }
            pairs.push((name, value));
        }

        Ok(NvList {
            version,
            nvflag,
            pairs,
        })
    }

    fn value(
        &mut self,
        name: &str,
        kind: i32,
        nelem: usize,
        depth: usize,
    ) -> Result<NvValue, NvListError> {
        let at = self.pos;
        let single = |nelem: usize| {
            if nelem == 1 {
                Ok(())
            } else {
                Err(NvListError::Malformed {
                    offset: at,
                    what: "element count",
                })
            }
        };

        match kind {
            DATA_TYPE_BOOLEAN => Ok(NvValue::Boolean),
            DATA_TYPE_UINT64 => {
                single(nelem)?;
                Ok(NvValue::Uint64(self.u64()?))
            }
            DATA_TYPE_STRING => {
                single(nelem)?;
                Ok(NvValue::String(self.string()?))
            }
            DATA_TYPE_UINT64_ARRAY => {
                let n = self.count("array length")?;
                if n != nelem || n > self.remaining() / 8 {
                    return Err(NvListError::Malformed {
                        offset: at,
                        what: "array length",
                    });
                }
                let mut values = Vec::with_capacity(n);
                for _ in 0..n {
                    values.push(self.u64()?);
                }
                Ok(NvValue::Uint64Array(values))
            }
            DATA_TYPE_NVLIST => {
                single(nelem)?;
                Ok(NvValue::NvList(self.nvlist(depth + 1)?))
            }
            DATA_TYPE_NVLIST_ARRAY => {
                // Each embedded list needs at least its 16 framing bytes.
                if nelem > self.remaining() / 16 {
                    return Err(NvListError::Malformed {
                        offset: at,
                        what: "element count",
                    });
                }
                let mut lists = Vec::with_capacity(nelem);
                for _ in 0..nelem {
                    lists.push(self.nvlist(depth + 1)?);
                }
                Ok(NvValue::NvListArray(lists))
            }
            kind => Err(NvListError::UnsupportedType {
                name: name.to_string(),
                kind,
            }),
        }
    }
}
