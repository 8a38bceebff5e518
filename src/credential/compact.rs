// src/credential/compact.rs
use base64::{engine::general_purpose, Engine as _};
use flate2::{write::GzEncoder, Compression};
use std::io::{self, Write};

/// Gzip then base64 encode `bytes`. Empty input compacts to an empty string
/// so optional credentials stay empty all the way to the templates.
pub fn compact(bytes: &[u8]) -> io::Result<String> {
    if bytes.is_empty() {
        return Ok(String::new());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    let gzipped = encoder.finish()?;
    Ok(general_purpose::STANDARD.encode(gzipped))
}

/// Inverse of [`compact`]; production code never reads compacted values back.
#[cfg(test)]
pub fn decompact(compacted: &str) -> io::Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    if compacted.is_empty() {
        return Ok(Vec::new());
    }
    let gzipped = general_purpose::STANDARD
        .decode(compacted)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut decoder = GzDecoder::new(gzipped.as_slice());
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
