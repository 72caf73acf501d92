use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use exn::ResultExt;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};
use tracing::instrument;

// Backups are written rarely and kept for a long time, so favour size. Zstd
// stops at 19: the levels above it need a window the decoder must also
// allocate on restore.
const BZIP2_LEVEL: bzip2::Compression = bzip2::Compression::best();
const GZIP_LEVEL: flate2::Compression = flate2::Compression::best();
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: i32 = 19;

impl Compression {
    /// Compress a whole payload.
    ///
    /// ```
    /// use strongbox_compress::Compression;
    ///
    /// let packed = Compression::Gzip.compress(&[b'a'; 512]).unwrap();
    /// assert!(packed.len() < 512);
    /// ```
    #[instrument(skip(input), fields(format = %self, input_size = input.len()))]
    pub fn compress(self, input: &[u8]) -> Result<Vec<u8>> {
        let output = match self {
            Compression::None => input.to_vec(),
            Compression::Bzip2 => {
                let mut encoder = BzEncoder::new(Vec::new(), BZIP2_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Codec)?;
                encoder.finish().or_raise(|| ErrorKind::Codec)?
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GZIP_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Codec)?;
                encoder.finish().or_raise(|| ErrorKind::Codec)?
            },
            #[cfg(feature = "zstd")]
            Compression::Zstd => zstd::bulk::compress(input, ZSTD_LEVEL).or_raise(|| ErrorKind::Codec)?,
        };
        tracing::trace!(output_size = output.len(), "compressed");
        Ok(output)
    }

    /// Decompress a whole payload of unknown size.
    pub fn decompress(self, input: &[u8]) -> Result<Vec<u8>> {
        self.decode(input, u64::MAX)
    }

    /// Decompress a payload that must come out at exactly `expected` bytes.
    ///
    /// Decoding stops one byte past `expected`, so a payload that expands
    /// further than its metadata admits is never fully inflated.
    ///
    /// ```
    /// use strongbox_compress::Compression;
    ///
    /// let packed = Compression::Bzip2.compress(b"twelve bytes").unwrap();
    /// assert_eq!(Compression::Bzip2.decompress_exact(&packed, 12).unwrap(), b"twelve bytes");
    /// assert!(Compression::Bzip2.decompress_exact(&packed, 11).is_err());
    /// ```
    #[instrument(skip(input), fields(format = %self, input_size = input.len()))]
    pub fn decompress_exact(self, input: &[u8], expected: u64) -> Result<Vec<u8>> {
        let output = self.decode(input, expected.saturating_add(1))?;
        let actual = output.len() as u64;
        if actual != expected {
            exn::bail!(ErrorKind::SizeMismatch { expected, actual });
        }
        Ok(output)
    }

    fn decode(self, input: &[u8], limit: u64) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match self {
            Compression::None => output.extend(input.iter().take(usize::try_from(limit).unwrap_or(usize::MAX))),
            Compression::Bzip2 => {
                BzDecoder::new(input).take(limit).read_to_end(&mut output).or_raise(|| ErrorKind::Malformed)?;
            },
            Compression::Gzip => {
                GzDecoder::new(input).take(limit).read_to_end(&mut output).or_raise(|| ErrorKind::Malformed)?;
            },
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(input).or_raise(|| ErrorKind::Codec)?;
                decoder.take(limit).read_to_end(&mut output).or_raise(|| ErrorKind::Malformed)?;
            },
        }
        Ok(output)
    }
}
