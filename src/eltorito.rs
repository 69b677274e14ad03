// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! El Torito boot catalog: validates a caller-nominated boot image against its
//! emulation type, and encodes the validation/default/section entries of the boot catalog sector.
//!
//! Grounded on `original_source/src/eltorito.h`'s `el_torito_validation_entry`/
//! `el_torito_default_entry`/`el_torito_section_entry` layouts and `eltorito.c`'s `create_image`
//! (the per-emulation-type size/MBR validation) and `write_validation_entry` (the checksum rule:
//! the sum of every little-endian 16-bit word in the 32-byte entry must be zero mod 0x10000).
//! isolinux boot-info-table patching and isohybrid MBR stamping aren't present in
//! `original_source/` (the retrieved sources predate both); both are implemented here from their
//! published on-disk layouts.

#[allow(unused)]
use log::{debug, trace, warn};

use std::rc::Rc;

use crate::{
    error::{ImageError, Result},
    node::{BootPlaceholder, Node, NodeRef},
    parse::susp::PosixFileMode,
    stream::Stream,
};

/// El Torito emulation type for a boot image (El Torito §1.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMediaType {
    /// No emulation: the BIOS loads the image directly, `load_size` sectors at `load_seg`.
    NoEmulation,
    /// Emulates a floppy disk; the image size must be exactly 1.2, 1.44, or 2.88 MiB.
    FloppyEmulation,
    /// Emulates a hard disk; the image's first 512 bytes must be a valid MBR with exactly one
    /// used partition, whose type byte is captured for the catalog.
    HardDiskEmulation,
}

const FLOPPY_1200K: u64 = 1200 * 1024;
const FLOPPY_1440K: u64 = 1440 * 1024;
const FLOPPY_2880K: u64 = 2880 * 1024;

/// A validated boot image: the stream plus the parameters the catalog's default entry needs.
pub struct BootImage {
    /// The file node providing the boot image's bytes.
    pub stream: Rc<dyn Stream>,
    pub media_type: BootMediaType,
    /// Load segment, no-emulation only.
    pub load_seg: u16,
    /// Sectors (512 B units) to load at boot, no-emulation only; always 1 for emulation modes.
    pub load_size: u16,
    /// Captured from the probed MBR, HD-emulation only.
    pub partition_type: u8,
    pub bootable: bool,
    /// Whether the image needs an isolinux boot-info table patched into its first 64 bytes.
    pub isolinux: bool,
}

fn floppy_media_code(size: u64) -> Result<u8> {
    match size {
        FLOPPY_1200K => Ok(1),
        FLOPPY_1440K => Ok(2),
        FLOPPY_2880K => Ok(3),
        _ => Err(ImageError::Format(
            "floppy-emulation boot image size must be 1.2, 1.44, or 2.88 MiB",
        )),
    }
}

impl BootImage {
    fn media_code(&self) -> Result<u8> {
        match self.media_type {
            BootMediaType::NoEmulation => Ok(0),
            BootMediaType::HardDiskEmulation => Ok(4),
            BootMediaType::FloppyEmulation => floppy_media_code(self.stream.size()),
        }
    }
}

/// Validates `stream` as a boot image for `media_type`: the stream must be
/// repeatable (it gets read at least twice: once here for validation, once during emission), its
/// size must match floppy-emulation's three permitted geometries, and for hard-disk emulation the
/// first 512 bytes must parse as an MBR with exactly one used partition entry.
pub fn validate_boot_image(stream: &Rc<dyn Stream>, media_type: BootMediaType) -> Result<u8> {
    if !stream.is_repeatable() {
        return Err(ImageError::Precondition("boot image stream must be repeatable"));
    }

    match media_type {
        BootMediaType::NoEmulation => Ok(0),
        BootMediaType::FloppyEmulation => floppy_media_code(stream.size()),
        BootMediaType::HardDiskEmulation => {
            let mbr = read_mbr(stream)?;
            probe_mbr_partition_type(&mbr)?;
            Ok(4)
        }
    }
}

fn read_mbr(stream: &Rc<dyn Stream>) -> Result<[u8; 512]> {
    stream.open()?;
    let mut buf = [0u8; 512];
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    stream.close()?;
    if filled != 512 {
        return Err(ImageError::Format("boot image too small to contain an MBR"));
    }
    if buf[510] != 0x55 || buf[511] != 0xAA {
        return Err(ImageError::Format("boot image MBR has an invalid signature"));
    }
    Ok(buf)
}

/// Scans the four MBR partition table entries (offset 446, 16 bytes each) and requires exactly
/// one to have a non-zero type byte, returning it.
fn probe_mbr_partition_type(mbr: &[u8; 512]) -> Result<u8> {
    let mut found = None;
    for i in 0..4 {
        let entry = &mbr[446 + i * 16..446 + (i + 1) * 16];
        let part_type = entry[4];
        if part_type != 0 {
            if found.is_some() {
                return Err(ImageError::Format(
                    "hard-disk-emulation boot image MBR has more than one used partition",
                ));
            }
            found = Some(part_type);
        }
    }
    found.ok_or(ImageError::Format(
        "hard-disk-emulation boot image MBR has no used partition",
    ))
}

/// Validates `stream` against `media_type` and assembles the [`BootImage`] the catalog's default
/// entry needs, resolving `partition_type` from the image's own MBR for hard-disk emulation.
pub fn build_boot_image(
    stream: Rc<dyn Stream>,
    media_type: BootMediaType,
    load_seg: u16,
    load_size: u16,
    bootable: bool,
    isolinux: bool,
) -> Result<BootImage> {
    validate_boot_image(&stream, media_type)?;
    let partition_type = if media_type == BootMediaType::HardDiskEmulation {
        probe_mbr_partition_type(&read_mbr(&stream)?)?
    } else {
        0
    };
    Ok(BootImage {
        stream,
        media_type,
        load_seg,
        load_size,
        partition_type,
        bootable,
        isolinux,
    })
}

/// The boot catalog: the validated boot image plus the synthetic placeholder node occupying the
/// catalog's position in the tree.
pub struct BootCatalog {
    pub image: BootImage,
    pub catalog_node: NodeRef,
}

impl BootCatalog {
    /// Creates the synthetic `Boot` placeholder node for the catalog sector, to be inserted into
    /// the logical tree at the caller's chosen path (mirrors `iso_tree_add_boot_node`'s mode
    /// inheritance: read-only, derived from the parent directory's permission bits).
    pub fn new_catalog_node(name: impl Into<String>, parent_mode: PosixFileMode) -> NodeRef {
        use std::cell::RefCell;
        let mode = parent_mode & (PosixFileMode::OWN_READ | PosixFileMode::GROUP_READ | PosixFileMode::WORLD_READ);
        Rc::new(RefCell::new(Node::BootPlaceholder(BootPlaceholder::new(name, mode, None))))
    }
}

fn checksum16(entry: &[u8; 32]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in entry.chunks_exact(2) {
        sum = sum.wrapping_add(u16::from_le_bytes([chunk[0], chunk[1]]) as u32);
    }
    (0u32.wrapping_sub(sum) & 0xffff) as u16
}

/// Encodes the 32-byte validation entry (El Torito §2.1): platform id, id string, and a checksum
/// chosen so the sum of every 16-bit word in the entry is zero mod 0x10000.
pub fn encode_validation_entry() -> [u8; 32] {
    let mut entry = [0u8; 32];
    entry[0] = 1; // header id
    entry[1] = 0; // platform id: 80x86
    entry[30] = 0x55;
    entry[31] = 0xAA;
    let checksum = checksum16(&entry);
    entry[28..30].copy_from_slice(&checksum.to_le_bytes());
    entry
}

/// Encodes the 32-byte default (or section) entry (El Torito §2.2/§2.4) for a validated boot
/// image at `block`.
pub fn encode_boot_entry(image: &BootImage, block: u32) -> Result<[u8; 32]> {
    let mut entry = [0u8; 32];
    entry[0] = if image.bootable { 0x88 } else { 0x00 };
    entry[1] = image.media_code()?;
    entry[2..4].copy_from_slice(&image.load_seg.to_le_bytes());
    entry[4] = if image.media_type == BootMediaType::HardDiskEmulation {
        image.partition_type
    } else {
        0
    };
    let sec_count = if image.media_type == BootMediaType::NoEmulation {
        image.load_size
    } else {
        1
    };
    entry[6..8].copy_from_slice(&sec_count.to_le_bytes());
    entry[8..12].copy_from_slice(&block.to_le_bytes());
    Ok(entry)
}

/// Assembles the full 2048-byte boot catalog sector: validation entry followed by the default
/// entry, zero-padded to a full block.
pub fn encode_catalog_block(image: &BootImage, boot_image_block: u32) -> Result<[u8; 2048]> {
    let mut buf = [0u8; 2048];
    buf[0..32].copy_from_slice(&encode_validation_entry());
    let default_entry = encode_boot_entry(image, boot_image_block)?;
    buf[32..64].copy_from_slice(&default_entry);
    Ok(buf)
}

/// isolinux boot-info-table patch: overwrites bytes 8-63 of the boot image at
/// write time with the PVD's LBA, the boot image's own LBA, its length in bytes, and a checksum
/// of the remainder of the file (the sum of every little-endian 32-bit word from byte 64 onward).
pub fn patch_isolinux_boot_info_table(
    image_bytes: &mut [u8],
    pvd_lba: u32,
    boot_image_lba: u32,
) {
    let len = image_bytes.len() as u32;
    let mut checksum: u32 = 0;
    for chunk in image_bytes[64..].chunks_exact(4) {
        checksum = checksum.wrapping_add(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    image_bytes[8..12].copy_from_slice(&pvd_lba.to_le_bytes());
    image_bytes[12..16].copy_from_slice(&boot_image_lba.to_le_bytes());
    image_bytes[16..20].copy_from_slice(&len.to_le_bytes());
    image_bytes[20..24].copy_from_slice(&checksum.to_le_bytes());
    image_bytes[24..64].fill(0);
}

/// isohybrid MBR geometry: a fixed head/sector count used to round the image's
/// total block count up to a whole cylinder for the single spanning partition entry.
pub const ISOHYBRID_HEADS: u32 = 64;
pub const ISOHYBRID_SECTORS: u32 = 32;

/// Stamps the first 512 bytes of the output image with an isohybrid MBR: `boot_blob` (typically
/// isolinux's `isohdpfx.bin`, 432 bytes or less) followed by a single primary partition (type
/// `0x17`, the "hidden NTFS/ISO9660" convention isohybrid uses) spanning the image rounded up to
/// a full cylinder boundary.
pub fn stamp_isohybrid_mbr(boot_blob: &[u8], total_blocks: u32) -> Result<[u8; 512]> {
    if boot_blob.len() > 440 {
        return Err(ImageError::TooBig("isohybrid boot blob exceeds the 440-byte MBR code area"));
    }
    let mut mbr = [0u8; 512];
    mbr[..boot_blob.len()].copy_from_slice(boot_blob);

    let sectors_per_cylinder = ISOHYBRID_HEADS * ISOHYBRID_SECTORS;
    // total_blocks is in 2048-byte blocks; isohybrid addresses in 512-byte sectors.
    let total_sectors = total_blocks.saturating_mul(4);
    let cylinders = total_sectors.div_ceil(sectors_per_cylinder).max(1);
    let rounded_sectors = cylinders * sectors_per_cylinder;

    let entry = &mut mbr[446..462];
    entry[0] = 0x80; // bootable
    entry[4] = 0x17; // partition type
    entry[8..12].copy_from_slice(&1u32.to_le_bytes()); // start LBA (sector 1)
    entry[12..16].copy_from_slice(&(rounded_sectors.saturating_sub(1)).to_le_bytes());

    mbr[510] = 0x55;
    mbr[511] = 0xAA;
    Ok(mbr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    #[test]
    fn validation_entry_checksum_is_zero_sum() {
        let entry = encode_validation_entry();
        let mut sum: u32 = 0;
        for chunk in entry.chunks_exact(2) {
            sum = sum.wrapping_add(u16::from_le_bytes([chunk[0], chunk[1]]) as u32);
        }
        assert_eq!(sum & 0xffff, 0);
    }

    #[test]
    fn floppy_size_must_match_one_of_three() {
        let stream: Rc<dyn Stream> = Rc::new(MemoryStream::new(vec![0u8; 1440 * 1024]));
        assert!(validate_boot_image(&stream, BootMediaType::FloppyEmulation).is_ok());

        let bad: Rc<dyn Stream> = Rc::new(MemoryStream::new(vec![0u8; 1000]));
        assert!(validate_boot_image(&bad, BootMediaType::FloppyEmulation).is_err());
    }

    #[test]
    fn hard_disk_emulation_requires_valid_mbr() {
        let mut data = vec![0u8; 512];
        data[510] = 0x55;
        data[511] = 0xAA;
        data[446 + 4] = 0x0c; // FAT32 LBA partition type
        let stream: Rc<dyn Stream> = Rc::new(MemoryStream::new(data));
        let code = validate_boot_image(&stream, BootMediaType::HardDiskEmulation).unwrap();
        assert_eq!(code, 4);
    }

    #[test]
    fn hard_disk_emulation_rejects_missing_signature() {
        let data = vec![0u8; 512];
        let stream: Rc<dyn Stream> = Rc::new(MemoryStream::new(data));
        assert!(validate_boot_image(&stream, BootMediaType::HardDiskEmulation).is_err());
    }

    #[test]
    fn isohybrid_mbr_has_valid_signature_and_partition() {
        let mbr = stamp_isohybrid_mbr(b"\x90\x90", 1000).unwrap();
        assert_eq!(&mbr[510..512], &[0x55, 0xAA]);
        assert_eq!(mbr[446 + 4], 0x17);
    }

    #[test]
    fn isolinux_patch_fills_boot_info_table() {
        let mut image = vec![0u8; 256];
        patch_isolinux_boot_info_table(&mut image, 16, 100);
        assert_eq!(&image[8..12], &16u32.to_le_bytes());
        assert_eq!(&image[12..16], &100u32.to_le_bytes());
    }
}
