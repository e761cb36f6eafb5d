use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

pub use flate2::Compression;

/// Gzip `data` at the given level.
pub fn gzip(data: &[u8], level: Compression) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 4);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_output_is_readable_back() {
        let text = b"{\"short_message\":\"hello\"}".repeat(50);
        for level in [Compression::fast(), Compression::best()] {
            let packed = gzip(&text, level).unwrap();
            assert!(packed.len() < text.len());
            assert_eq!(&packed[..2], &[0x1f, 0x8b]);
            assert_eq!(gunzip(&packed).unwrap(), text);
        }
    }

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(gunzip(b"definitely not gzip").is_err());
    }
}
