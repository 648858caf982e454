//! Firmware image loader.
//!
//! Three on-disk shapes are accepted:
//!
//! 1. Pre-extracted binary — `.bin` extension and exactly one or four
//!    64 KB banks; loaded verbatim.
//! 2. Update package — the bytes `"BNS"` at offset 2; the 0x3000-byte
//!    distribution header is stripped.  Detection is magic-only (the
//!    format has no checksum), so a raw image with incidental `"BNS"`
//!    at that offset will be mis-extracted.
//! 3. Anything else — treated as a raw firmware dump.
//!
//! The result is truncated to four 64 KB banks and loads at physical 0.

use std::fs;
use std::io;
use std::path::Path;

/// Firmware ceiling: four 64 KB banks.
pub const FIRMWARE_MAX: usize = 256 * 1024;

/// Update-package header length.
const PACKAGE_HEADER: usize = 0x3000;

/// Package magic, found at offset 2.
const PACKAGE_MAGIC: &[u8] = b"BNS";

/// Sizes a pre-extracted `.bin` may have.
const BIN_SIZES: [usize; 2] = [0x1_0000, 0x4_0000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomShape {
    PreExtracted,
    UpdatePackage,
    RawFirmware,
}

/// Decide the image shape from the file name and contents.
pub fn detect_shape(path: &Path, data: &[u8]) -> RomShape {
    let is_bin = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("bin"))
        .unwrap_or(false);
    if is_bin && BIN_SIZES.contains(&data.len()) {
        return RomShape::PreExtracted;
    }
    if data.len() >= 5 && &data[2..5] == PACKAGE_MAGIC {
        return RomShape::UpdatePackage;
    }
    RomShape::RawFirmware
}

/// Extract the firmware bytes for a detected shape.
pub fn extract_firmware(shape: RomShape, mut data: Vec<u8>) -> Vec<u8> {
    match shape {
        RomShape::PreExtracted | RomShape::RawFirmware => {}
        RomShape::UpdatePackage => {
            if data.len() > PACKAGE_HEADER {
                data.drain(..PACKAGE_HEADER);
            } else {
                log::warn!(
                    "update package is only {} bytes, treating as raw firmware",
                    data.len()
                );
            }
        }
    }
    data.truncate(FIRMWARE_MAX);
    data
}

/// Load a ROM file and return the firmware image to place at
/// physical 0.
pub fn load_rom_file(path: &Path) -> io::Result<Vec<u8>> {
    let data = fs::read(path)?;
    let shape = detect_shape(path, &data);
    log::debug!("ROM {} detected as {shape:?}", path.display());
    Ok(extract_firmware(shape, data))
}
