//! Image classification
//!
//! Extension allow-list first, then a signature check on the leading bytes.
//! Every I/O failure is folded into "not an image".

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// Extensions accepted without opening the file
pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "tiff", "webp"];

/// Bytes read for signature sniffing
const SNIFF_BYTES: u64 = 32;

/// Check whether `path` is an image.
///
/// Zero-length, non-regular and unreadable files are never images.
pub fn is_image(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {}
        _ => return false,
    }

    if has_image_extension(path) {
        return true;
    }

    match read_header(path) {
        Some(header) => sniff_image(&header),
        None => false,
    }
}

/// Extension fast path (case-insensitive)
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Read the first `SNIFF_BYTES` of a file; `None` on any I/O error
fn read_header(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let mut header = Vec::with_capacity(SNIFF_BYTES as usize);
    file.take(SNIFF_BYTES).read_to_end(&mut header).ok()?;
    Some(header)
}

/// Match leading bytes against known image signatures
pub fn sniff_image(header: &[u8]) -> bool {
    if header.is_empty() {
        return false;
    }
    image::guess_format(header).is_ok() || matches_legacy_signature(header)
}

/// Formats `image::guess_format` does not know about
fn matches_legacy_signature(header: &[u8]) -> bool {
    match header {
        // SGI image
        [0x01, 0xDA, ..] => true,
        // Sun raster
        [0x59, 0xA6, 0x6A, 0x95, ..] => true,
        // X bitmap
        _ if header.starts_with(b"#define ") => true,
        _ => false,
    }
}
