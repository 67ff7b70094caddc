//! Name segments and name paths
//!
//! A [`NameSeg`] is the four-character identity of a namespace node. A
//! [`NamePath`] is a prefix (root, a run of parent prefixes, or none) followed
//! by zero or more segments. Paths are accepted in two encodings:
//!
//! ```text
//! ASL text:   \_SB.PCI0.SLOT      ^^FOO      FOO.BAR
//! AML bytes:  '\' | '^'* followed by
//!             NullName   0x00
//!             NameSeg    4 bytes
//!             DualName   0x2E seg seg
//!             MultiName  0x2F count seg*count
//! ```

use crate::{AmlError, AmlResult};
use std::fmt;
use std::str::FromStr;

const ROOT_CHAR: u8 = b'\\';
const PARENT_PREFIX: u8 = b'^';
const DUAL_NAME_PREFIX: u8 = 0x2E;
const MULTI_NAME_PREFIX: u8 = 0x2F;
const NULL_NAME: u8 = 0x00;

/// Four-character name of a namespace node
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameSeg([u8; 4]);

impl NameSeg {
    /// Name of the namespace root
    pub const ROOT: NameSeg = NameSeg(*b"\\___");

    /// Create a segment from text, padding short names with `_`
    pub fn new(name: &str) -> AmlResult<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(AmlError::InvalidPath(format!("bad name segment '{}'", name)));
        }

        let mut seg = [b'_'; 4];
        seg[..bytes.len()].copy_from_slice(bytes);
        Self::from_bytes(seg)
    }

    /// Create a segment from its raw encoding
    pub fn from_bytes(bytes: [u8; 4]) -> AmlResult<Self> {
        let lead_ok = bytes[0].is_ascii_uppercase() || bytes[0] == b'_';
        let rest_ok = bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || *b == b'_');
        if !lead_ok || !rest_ok {
            return Err(AmlError::InvalidPath(format!(
                "bad name segment {:02x?}",
                bytes
            )));
        }
        Ok(NameSeg(bytes))
    }

    /// Raw four bytes
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Segment as text (always four characters)
    pub fn as_str(&self) -> &str {
        // Validated to be ASCII on construction; ROOT is ASCII too.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameSeg({})", self.as_str())
    }
}

impl fmt::Display for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leading prefix of a name path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathPrefix {
    /// Resolved from the current scope
    Relative,
    /// Resolved from the namespace root
    Root,
    /// Resolved from the N-th ancestor of the current scope
    Parent(usize),
}

/// A parsed name path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamePath {
    prefix: PathPrefix,
    segments: Vec<NameSeg>,
}

impl NamePath {
    /// Build a path from parts
    pub fn new(prefix: PathPrefix, segments: Vec<NameSeg>) -> Self {
        Self { prefix, segments }
    }

    /// The absolute root path `\`
    pub fn root() -> Self {
        Self::new(PathPrefix::Root, Vec::new())
    }

    /// A relative single-segment path
    pub fn single(seg: NameSeg) -> Self {
        Self::new(PathPrefix::Relative, vec![seg])
    }

    /// Parse ASL text (`\_SB.PCI0`, `^^FOO`, `FOO.BAR`)
    pub fn parse(text: &str) -> AmlResult<Self> {
        let bytes = text.as_bytes();
        let mut pos = 0;

        let prefix = if bytes.first() == Some(&ROOT_CHAR) {
            pos = 1;
            PathPrefix::Root
        } else {
            while bytes.get(pos) == Some(&PARENT_PREFIX) {
                pos += 1;
            }
            if pos > 0 {
                PathPrefix::Parent(pos)
            } else {
                PathPrefix::Relative
            }
        };

        let rest = &text[pos..];
        let segments = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('.').map(NameSeg::new).collect::<AmlResult<Vec<_>>>()?
        };

        if prefix == PathPrefix::Relative && segments.is_empty() {
            return Err(AmlError::InvalidPath("empty path".to_string()));
        }

        Ok(Self { prefix, segments })
    }

    /// Decode an AML NameString, returning the path and the number of bytes consumed
    pub fn from_aml(bytes: &[u8]) -> AmlResult<(Self, usize)> {
        let truncated = || AmlError::InvalidPath("truncated name string".to_string());
        let mut pos = 0;

        let prefix = match bytes.first() {
            Some(&ROOT_CHAR) => {
                pos = 1;
                PathPrefix::Root
            }
            Some(&PARENT_PREFIX) => {
                while bytes.get(pos) == Some(&PARENT_PREFIX) {
                    pos += 1;
                }
                PathPrefix::Parent(pos)
            }
            Some(_) => PathPrefix::Relative,
            None => return Err(truncated()),
        };

        let count = match *bytes.get(pos).ok_or_else(truncated)? {
            NULL_NAME => {
                pos += 1;
                0
            }
            DUAL_NAME_PREFIX => {
                pos += 1;
                2
            }
            MULTI_NAME_PREFIX => {
                let count = *bytes.get(pos + 1).ok_or_else(truncated)? as usize;
                pos += 2;
                count
            }
            _ => 1,
        };

        let mut segments = Vec::with_capacity(count);
        for _ in 0..count {
            let raw = bytes.get(pos..pos + 4).ok_or_else(truncated)?;
            segments.push(NameSeg::from_bytes([raw[0], raw[1], raw[2], raw[3]])?);
            pos += 4;
        }

        Ok((Self { prefix, segments }, pos))
    }

    /// Encode as an AML NameString
    ///
    /// # Errors
    ///
    /// Returns `AmlError::InvalidPath` when the path has more segments than
    /// a multi-name prefix can count.
    pub fn to_aml(&self) -> AmlResult<Vec<u8>> {
        let mut out = Vec::with_capacity(2 + self.segments.len() * 4);
        match self.prefix {
            PathPrefix::Relative => {}
            PathPrefix::Root => out.push(ROOT_CHAR),
            PathPrefix::Parent(n) => out.extend(std::iter::repeat(PARENT_PREFIX).take(n)),
        }

        match self.segments.len() {
            0 => out.push(NULL_NAME),
            1 => {}
            2 => out.push(DUAL_NAME_PREFIX),
            n => {
                let count = u8::try_from(n).map_err(|_| {
                    AmlError::InvalidPath(format!("{} segments exceed the multi-name limit", n))
                })?;
                out.push(MULTI_NAME_PREFIX);
                out.push(count);
            }
        }
        for seg in &self.segments {
            out.extend_from_slice(seg.as_bytes());
        }
        Ok(out)
    }

    /// Path prefix
    #[inline]
    pub fn prefix(&self) -> PathPrefix {
        self.prefix
    }

    /// Path segments
    #[inline]
    pub fn segments(&self) -> &[NameSeg] {
        &self.segments
    }

    /// Last segment, if any
    pub fn last(&self) -> Option<NameSeg> {
        self.segments.last().copied()
    }

    /// Whether the path starts at the root
    #[inline]
    pub fn is_absolute(&self) -> bool {
        self.prefix == PathPrefix::Root
    }

    /// Number of parent prefixes
    pub fn parent_count(&self) -> usize {
        match self.prefix {
            PathPrefix::Parent(n) => n,
            _ => 0,
        }
    }

    /// Whether upward search may apply: one segment, no prefix
    pub fn is_single_relative(&self) -> bool {
        self.prefix == PathPrefix::Relative && self.segments.len() == 1
    }
}

impl FromStr for NamePath {
    type Err = AmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix {
            PathPrefix::Relative => {}
            PathPrefix::Root => f.write_str("\\")?,
            PathPrefix::Parent(n) => {
                for _ in 0..n {
                    f.write_str("^")?;
                }
            }
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(seg.as_str())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nameseg_padding() {
        let seg = NameSeg::new("_SB").unwrap();
        assert_eq!(seg.as_str(), "_SB_");
        assert_eq!(NameSeg::new("PCI0").unwrap().as_bytes(), b"PCI0");
    }

    #[test]
    fn test_nameseg_rejects_bad_chars() {
        assert!(NameSeg::new("").is_err());
        assert!(NameSeg::new("TOOLONG").is_err());
        assert!(NameSeg::new("1ABC").is_err());
        assert!(NameSeg::new("ab").is_err());
    }

    #[test]
    fn test_parse_absolute() {
        let path = NamePath::parse("\\_SB.PCI0.SLOT").unwrap();
        assert!(path.is_absolute());
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.to_string(), "\\_SB_.PCI0.SLOT");
    }

    #[test]
    fn test_parse_parent_prefix() {
        let path = NamePath::parse("^^FOO").unwrap();
        assert_eq!(path.prefix(), PathPrefix::Parent(2));
        assert_eq!(path.parent_count(), 2);
        assert_eq!(path.last(), Some(NameSeg::new("FOO").unwrap()));
        assert!(!path.is_single_relative());
    }

    #[test]
    fn test_parse_root_only() {
        let path = NamePath::parse("\\").unwrap();
        assert!(path.is_absolute());
        assert!(path.segments().is_empty());
        assert!(NamePath::parse("").is_err());
    }

    #[test]
    fn test_aml_encodings() {
        // Single segment
        let (path, used) = NamePath::from_aml(b"FOO_").unwrap();
        assert_eq!(used, 4);
        assert!(path.is_single_relative());

        // Dual name with root prefix
        let (path, used) = NamePath::from_aml(b"\\\x2E_SB_PCI0").unwrap();
        assert_eq!(used, 10);
        assert_eq!(path.to_string(), "\\_SB_.PCI0");

        // Multi name with parent prefix
        let (path, used) = NamePath::from_aml(b"^\x2F\x03AAAABBBBCCCC").unwrap();
        assert_eq!(used, 15);
        assert_eq!(path.parent_count(), 1);
        assert_eq!(path.segments().len(), 3);

        // Null name
        let (path, used) = NamePath::from_aml(b"\\\x00").unwrap();
        assert_eq!(used, 2);
        assert!(path.segments().is_empty());
    }

    #[test]
    fn test_aml_truncated() {
        assert!(NamePath::from_aml(b"\\\x2E_SB_").is_err());
        assert!(NamePath::from_aml(b"").is_err());
    }

    #[test]
    fn test_to_aml() {
        let path = NamePath::parse("\\_SB.PCI0.SLOT").unwrap();
        let encoded = path.to_aml().unwrap();
        assert_eq!(&encoded[..3], &[b'\\', 0x2F, 3]);
        let (decoded, used) = NamePath::from_aml(&encoded).unwrap();
        assert_eq!(used, encoded.len());
        assert_eq!(decoded, path);
    }

    #[test]
    fn test_to_aml_segment_limit() {
        let seg = NameSeg::new("ABCD").unwrap();
        let longest = NamePath::new(PathPrefix::Root, vec![seg; 255]);
        let encoded = longest.to_aml().unwrap();
        assert_eq!(&encoded[..3], &[b'\\', 0x2F, 0xFF]);
        assert_eq!(encoded.len(), 3 + 255 * 4);

        let too_long = NamePath::new(PathPrefix::Root, vec![seg; 256]);
        assert!(matches!(too_long.to_aml(), Err(AmlError::InvalidPath(_))));
    }
}
