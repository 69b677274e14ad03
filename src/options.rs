// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Build-time and import-time option structs, covering every image-authoring toggle libisofs
//! exposes as `IsoWriteOpts`/`IsoReadOpts` fields.

use crate::{ecma119::names::NameRelaxation, eltorito::BootMediaType, node::NodeRef};

/// Policy for resolving a uid/gid/mode/timestamp conflict when importing on top of an existing
/// image during a recursive add, mirroring libisofs's replace-policy enum. `Ask` is named for
/// completeness but interactive confirmation is unimplemented: a caller selecting it is treated
/// the same as `Never`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacePolicy {
    /// Never replace an existing node's value with a new one.
    #[default]
    Never,
    /// Always replace.
    Always,
    /// Replace only if the new value looks newer, per mtime.
    IfNewer,
    /// Out of scope; treated as [`ReplacePolicy::Never`].
    Ask,
}

/// El Torito boot catalog parameters for [`WriteOpts::eltorito`], resolved against the logical
/// tree at write time rather than by path, so the caller keeps whatever [`NodeRef`]s it already
/// holds from building the tree.
#[derive(Clone)]
pub struct EltoritoOpts {
    /// The synthetic catalog-sector node, created with
    /// [`crate::eltorito::BootCatalog::new_catalog_node`] and inserted into the tree like any
    /// other node.
    pub catalog_node: NodeRef,
    /// The boot image node (a [`crate::node::BootPlaceholder`] with `stream: Some(..)`, or any
    /// regular file node used as the boot image).
    pub boot_image_node: NodeRef,
    pub media_type: BootMediaType,
    /// Load segment, no-emulation only.
    pub load_seg: u16,
    /// Sectors (512 B units) to load, no-emulation only.
    pub load_size: u16,
    pub bootable: bool,
    /// Patch bytes 8-63 of the boot image with an isolinux boot-info table at write time.
    pub patch_isolinux_boot_info: bool,
}

impl std::fmt::Debug for EltoritoOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EltoritoOpts")
            .field("media_type", &self.media_type)
            .field("load_seg", &self.load_seg)
            .field("load_size", &self.load_size)
            .field("bootable", &self.bootable)
            .field("patch_isolinux_boot_info", &self.patch_isolinux_boot_info)
            .finish_non_exhaustive()
    }
}

/// Options controlling how an image is written.
#[derive(Clone)]
pub struct WriteOpts {
    /// ISO 9660 conformance level: 1 (8.3 names) or 2/3 (30-char names, level 3 allows
    /// multi-extent files which this crate does not produce).
    pub iso_level: u8,
    /// Whether to add Rock Ridge extensions.
    pub rockridge: bool,
    /// Whether to add a Joliet (UCS-2BE) secondary tree.
    pub joliet: bool,
    /// Whether to add an ISO 9660:1999 secondary tree. Not implemented by this writer;
    /// [`crate::ecma119::writer::compute_data_blocks`] rejects it with
    /// [`crate::error::ImageError::Precondition`] rather than silently ignoring it.
    pub iso1999: bool,
    /// Omit the `;VERSION` suffix from file identifiers.
    pub omit_version_numbers: bool,
    /// Allow directory nesting beyond ECMA-119's 8-level cap without relocating under
    /// `RR_MOVED`.
    pub allow_deep_paths: bool,
    /// Allow paths longer than 255 bytes.
    pub allow_longer_paths: bool,
    /// Allow Joliet paths longer than the nominal 240-byte cap.
    pub joliet_longer_paths: bool,
    /// Allow file identifiers up to 37 characters instead of 30 at levels 2/3.
    pub max_37_char_filenames: bool,
    /// Do not force a trailing `.` onto extension-less file identifiers.
    pub no_force_dots: bool,
    /// Allow lowercase ASCII letters in identifiers.
    pub allow_lowercase: bool,
    /// Allow the full printable ASCII range in identifiers.
    pub allow_full_ascii: bool,
    /// Sort files by [`crate::node::File::sort_weight`] before block assignment.
    pub sort_files: bool,

    /// Force every directory's mode to `dir_mode` regardless of the logical tree's value.
    pub replace_dir_mode: bool,
    /// The mode applied when `replace_dir_mode` is set.
    pub dir_mode: u32,
    /// Force every file's mode to `file_mode` regardless of the logical tree's value.
    pub replace_file_mode: bool,
    /// The mode applied when `replace_file_mode` is set.
    pub file_mode: u32,
    /// Force every node's uid to `uid`.
    pub replace_uid: bool,
    /// The uid applied when `replace_uid` is set.
    pub uid: u32,
    /// Force every node's gid to `gid`.
    pub replace_gid: bool,
    /// The gid applied when `replace_gid` is set.
    pub gid: u32,

    /// Force every node's atime/mtime/ctime to `timestamp`.
    pub replace_timestamps: bool,
    /// The timestamp applied when `replace_timestamps` is set (Unix seconds).
    pub timestamp: i64,
    /// Always encode timestamps as GMT (offset 0) regardless of the node's recorded offset.
    pub always_gmt: bool,

    /// Write the image as an appendable (multi-session) volume. Not implemented by this writer;
    /// [`crate::ecma119::writer::compute_data_blocks`] rejects it with
    /// [`crate::error::ImageError::Precondition`] rather than silently producing a
    /// non-appendable image.
    pub appendable: bool,
    /// The block a previous session started at, required when `appendable` is set.
    pub ms_block: Option<u32>,
    /// When writing an appendable image to a random-access medium, the in-memory buffer used to
    /// patch the first 32 (reserved/system area) blocks in place instead of re-emitting them.
    pub overwrite_first_blocks: bool,

    /// Ring buffer capacity in blocks; `None` uses [`crate::ringbuffer::DEFAULT_CAPACITY_BLOCKS`].
    pub fifo_size: Option<usize>,

    /// Charset identifiers are encoded in for the primary (non-Joliet) tree. Only `"ASCII"` is
    /// meaningfully different from the default in this crate since full charset conversion is out
    /// of scope; retained as a pass-through field for API completeness.
    pub output_charset: Option<String>,

    /// El Torito boot catalog, if this image should be bootable.
    pub eltorito: Option<EltoritoOpts>,
    /// isohybrid MBR boot blob (e.g. isolinux's `isohdpfx.bin`) stamped into the first 512 bytes
    /// of the output when set, making the same image bootable as a USB/hard-disk image too.
    pub isohybrid_mbr: Option<Vec<u8>>,
}

impl std::fmt::Debug for WriteOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteOpts")
            .field("iso_level", &self.iso_level)
            .field("rockridge", &self.rockridge)
            .field("joliet", &self.joliet)
            .field("appendable", &self.appendable)
            .field("ms_block", &self.ms_block)
            .field("eltorito", &self.eltorito)
            .field("isohybrid_mbr_len", &self.isohybrid_mbr.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl Default for WriteOpts {
    fn default() -> WriteOpts {
        WriteOpts {
            iso_level: 1,
            rockridge: true,
            joliet: false,
            iso1999: false,
            omit_version_numbers: false,
            allow_deep_paths: false,
            allow_longer_paths: false,
            joliet_longer_paths: false,
            max_37_char_filenames: false,
            no_force_dots: false,
            allow_lowercase: false,
            allow_full_ascii: false,
            sort_files: false,

            replace_dir_mode: false,
            dir_mode: 0o755,
            replace_file_mode: false,
            file_mode: 0o644,
            replace_uid: false,
            uid: 0,
            replace_gid: false,
            gid: 0,

            replace_timestamps: false,
            timestamp: 0,
            always_gmt: false,

            appendable: false,
            ms_block: None,
            overwrite_first_blocks: false,

            fifo_size: None,

            output_charset: None,

            eltorito: None,
            isohybrid_mbr: None,
        }
    }
}

impl WriteOpts {
    /// Derives the [`NameRelaxation`] profile used by [`crate::ecma119::names`] from the relevant
    /// toggles.
    pub fn name_relaxation(&self) -> NameRelaxation {
        NameRelaxation {
            omit_version_numbers: self.omit_version_numbers,
            no_force_dots: self.no_force_dots,
            allow_lowercase: self.allow_lowercase,
            allow_full_ascii: self.allow_full_ascii,
            max_37_char_filenames: self.max_37_char_filenames,
        }
    }
}

/// Options controlling how an existing image's tree is imported, e.g. before a multi-session
/// append.
#[derive(Debug, Clone, Default)]
pub struct ImportOpts {
    /// How to resolve a conflict between the imported node's attributes and a new one added on
    /// top of it during the same build.
    pub replace: ReplacePolicy,
    /// Block number the previous session began at (`ms_block`); required to resolve relative
    /// extent locations recorded in the previous session's directory records.
    pub ms_block: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reasonable() {
        let opts = WriteOpts::default();
        assert_eq!(opts.iso_level, 1);
        assert!(opts.rockridge);
        assert!(!opts.joliet);
    }

    #[test]
    fn ask_policy_is_distinct_from_never_but_unimplemented() {
        // Documents the Open Questions decision (DESIGN.md): Ask is accepted as a value but
        // treated identically to Never by the recursive-add conflict resolver.
        assert_ne!(ReplacePolicy::Ask, ReplacePolicy::Never);
    }
}
