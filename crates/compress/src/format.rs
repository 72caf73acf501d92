//! Format names and magic bytes.

use crate::Compression;
use crate::error::{Error, ErrorKind};
use std::str::FromStr;

impl Compression {
    /// Leading bytes every stream of this format starts with. Empty for
    /// [`None`](Compression::None), which has no framing.
    #[must_use]
    pub const fn magic(self) -> &'static [u8] {
        match self {
            Compression::None => &[],
            Compression::Bzip2 => b"BZh",
            Compression::Gzip => &[0x1F, 0x8B],
            #[cfg(feature = "zstd")]
            Compression::Zstd => &[0x28, 0xB5, 0x2F, 0xFD],
        }
    }

    /// Guess the format of `bytes` from their leading bytes; anything
    /// unrecognised is taken to be uncompressed.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Self {
        Self::ALL
            .iter()
            .copied()
            .filter(|format| format.is_enabled())
            .find(|format| bytes.starts_with(format.magic()))
            .unwrap_or(Compression::None)
    }

    /// Whether a decrypted payload looks like it was written in this format.
    #[must_use]
    pub fn matches_payload(self, payload: &[u8]) -> bool {
        Self::detect(payload) == self
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = name.trim().to_ascii_lowercase();
        if let Some(format) = Self::ALL.iter().find(|format| format.to_string() == name) {
            return Ok(*format);
        }
        match name.as_str() {
            "bz2" => Ok(Compression::Bzip2),
            "gz" => Ok(Compression::Gzip),
            #[cfg(feature = "zstd")]
            "zst" => Ok(Compression::Zstd),
            #[cfg(not(feature = "zstd"))]
            "zst" | "zstd" => exn::bail!(ErrorKind::NotBuilt(name.clone())),
            _ => exn::bail!(ErrorKind::Unknown(name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case("none", Compression::None)]
    #[case("bzip2", Compression::Bzip2)]
    #[case("bz2", Compression::Bzip2)]
    #[case(" Gzip ", Compression::Gzip)]
    #[case("gz", Compression::Gzip)]
    #[cfg_attr(feature = "zstd", case("ZSTD", Compression::Zstd))]
    #[cfg_attr(feature = "zstd", case("zst", Compression::Zstd))]
    fn test_parse(#[case] name: &str, #[case] expected: Compression) {
        assert_eq!(name.parse::<Compression>().unwrap(), expected);
    }

    #[rstest]
    #[case("lz4")]
    #[case("brotli")]
    #[case("")]
    fn test_parse_unknown(#[case] name: &str) {
        assert!(name.parse::<Compression>().is_err());
    }

    #[test]
    fn test_names_parse_back() {
        for format in Compression::ALL {
            assert_eq!(format.to_string().parse::<Compression>().unwrap(), *format);
        }
    }

    #[rstest]
    #[case(b"{\"version\":1}", Compression::None)]
    #[case(b"", Compression::None)]
    #[case(b"BZh91AY", Compression::Bzip2)]
    #[case(&[0x1F, 0x8B, 0x08, 0x00], Compression::Gzip)]
    #[cfg_attr(feature = "zstd", case(&[0x28, 0xB5, 0x2F, 0xFD, 0x00], Compression::Zstd))]
    fn test_detect(#[case] bytes: &[u8], #[case] expected: Compression) {
        assert_eq!(Compression::detect(bytes), expected);
    }

    #[test]
    fn test_matches_payload() {
        let gzip = Compression::Gzip.compress(b"payload").unwrap();
        assert!(Compression::Gzip.matches_payload(&gzip));
        assert!(!Compression::Bzip2.matches_payload(&gzip));
        assert!(!Compression::Gzip.matches_payload(b"{\"plain\":true}"));
        assert!(Compression::None.matches_payload(b"{\"plain\":true}"));
        assert!(!Compression::None.matches_payload(&gzip));
    }
}
