//! Compression for spill segments. `Zstd` and `Lz4` are feature-gated.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Codec {
    #[default]
    None = 0,
    Zstd = 1,
    Lz4 = 2,
}

impl Codec {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Codec::None),
            1 => Ok(Codec::Zstd),
            2 => Ok(Codec::Lz4),
            other => Err(Error::CodecUnsupported(format!("tag {other}"))),
        }
    }

    /// Parse the configuration spelling (`none`, `zstd`, `lz4`).
    ///
    /// Fails when the codec is known but its feature was not compiled in, so a
    /// misconfigured task stops before its first spill rather than during it.
    pub fn from_name(name: &str) -> Result<Self> {
        let codec = match name.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Codec::None,
            "zstd" => Codec::Zstd,
            "lz4" => Codec::Lz4,
            other => return Err(Error::CodecUnsupported(other.to_string())),
        };
        if !codec.is_available() {
            return Err(Error::CodecUnsupported(codec.name().to_string()));
        }
        Ok(codec)
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Zstd => "zstd",
            Codec::Lz4 => "lz4",
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            Codec::None => true,
            Codec::Zstd => cfg!(feature = "zstd"),
            Codec::Lz4 => cfg!(feature = "lz4"),
        }
    }
}

pub fn compress(codec: Codec, input: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(input.to_vec()),
        Codec::Zstd => {
            #[cfg(feature = "zstd")]
            {
                let mut out = Vec::new();
                zstd::stream::copy_encode(input, &mut out, 3)
                    .map_err(|e| Error::Codec(format!("zstd: {e}")))?;
                Ok(out)
            }
            #[cfg(not(feature = "zstd"))]
            {
                Err(Error::CodecUnsupported("zstd".into()))
            }
        }
        Codec::Lz4 => {
            #[cfg(feature = "lz4")]
            {
                Ok(lz4_flex::compress_prepend_size(input))
            }
            #[cfg(not(feature = "lz4"))]
            {
                Err(Error::CodecUnsupported("lz4".into()))
            }
        }
    }
}

pub fn decompress(codec: Codec, input: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(input.to_vec()),
        Codec::Zstd => {
            #[cfg(feature = "zstd")]
            {
                let mut out = Vec::new();
                zstd::stream::copy_decode(input, &mut out)
                    .map_err(|e| Error::Codec(format!("zstd: {e}")))?;
                Ok(out)
            }
            #[cfg(not(feature = "zstd"))]
            {
                Err(Error::CodecUnsupported("zstd".into()))
            }
        }
        Codec::Lz4 => {
            #[cfg(feature = "lz4")]
            {
                lz4_flex::decompress_size_prepended(input)
                    .map_err(|e| Error::Codec(format!("lz4: {e}")))
            }
            #[cfg(not(feature = "lz4"))]
            {
                Err(Error::CodecUnsupported("lz4".into()))
            }
        }
    }
}
