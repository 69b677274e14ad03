// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! ECMA-119 §7.4/§7.5 d-character / a-character name shaping.
//!
//! Grounded on `original_source/src/ecma119_tree.c`'s `get_iso_name` (which defers to libisofs's
//! `iso_1_fileid`/`iso_2_fileid`/`iso_dirid` depending on conformance level and the relaxed-profile
//! flags carried on the image's [`crate::options::WriteOpts`]).

/// How strictly a name must conform to ECMA-119's base character set and length limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConformanceLevel {
    /// ISO level 1: 8.3 names (`NAME.EXT;VERSION`), 8 + 3 d-characters.
    Level1,
    /// ISO level 2/3: up to 30 d-characters plus a dot and version suffix.
    Level2Or3,
}

/// Relaxation flags controlling how far the name shaping deviates from strict ECMA-119, mirroring
/// the matching [`crate::options::WriteOpts`] toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameRelaxation {
    /// Omit the `;VERSION` suffix entirely.
    pub omit_version_numbers: bool,
    /// Do not force a `.` separator onto extension-less names.
    pub no_force_dots: bool,
    /// Allow lowercase ASCII letters (normally folded to uppercase).
    pub allow_lowercase: bool,
    /// Allow the full printable ASCII range rather than only d-characters.
    pub allow_full_ascii: bool,
    /// Allow filenames longer than the conformance level's nominal cap, up to 37 characters.
    pub max_37_char_filenames: bool,
}

const DCHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

fn is_allowed_char(c: u8, relax: &NameRelaxation) -> bool {
    if relax.allow_full_ascii {
        return (0x20..0x7f).contains(&c);
    }
    if relax.allow_lowercase && c.is_ascii_lowercase() {
        return true;
    }
    DCHARS.contains(&c)
}

fn shape_chars(input: &str, relax: &NameRelaxation) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let upper = if relax.allow_lowercase { c } else { c.to_ascii_uppercase() };
        let byte = if upper.is_ascii() { upper as u8 } else { b'_' };
        if is_allowed_char(byte, relax) {
            out.push(byte as char);
        } else {
            out.push('_');
        }
    }
    out
}

/// Splits a source filename into (stem, extension), ECMA-119 style: the extension is everything
/// after the *last* `.`, unless the name starts with `.` (hidden files keep their leading dot as
/// part of the stem, since a leading dot has no extension meaning on POSIX).
fn split_stem_ext(name: &str) -> (&str, Option<&str>) {
    let trimmed = name.trim_start_matches('.');
    let leading_dots = name.len() - trimmed.len();
    match trimmed.rfind('.') {
        Some(idx) if idx > 0 => (&name[..leading_dots + idx], Some(&name[leading_dots + idx + 1..])),
        _ => (name, None),
    }
}

/// Shapes a file name for ISO level 1: 8-character stem, 3-character extension, `;1` version.
pub fn iso_1_fileid(name: &str, relax: &NameRelaxation) -> String {
    let (stem, ext) = split_stem_ext(name);
    let stem = shape_chars(stem, relax);
    let stem: String = stem.chars().take(8).collect();
    let ext = ext.map(|e| shape_chars(e, relax));
    let ext: Option<String> = ext.map(|e| e.chars().take(3).collect());

    let mut out = stem;
    if let Some(ext) = ext.filter(|e| !e.is_empty()) {
        out.push('.');
        out.push_str(&ext);
    } else if !relax.no_force_dots {
        out.push('.');
    }
    if !relax.omit_version_numbers {
        out.push_str(";1");
    }
    out
}

/// Shapes a file name for ISO level 2/3: up to 30 d-characters total (stem+ext+dot), `;1` version.
pub fn iso_2_fileid(name: &str, relax: &NameRelaxation) -> String {
    let max_len = if relax.max_37_char_filenames { 37 } else { 30 };
    let (stem, ext) = split_stem_ext(name);
    let stem = shape_chars(stem, relax);
    let ext = ext.map(|e| shape_chars(e, relax)).filter(|e| !e.is_empty());

    let budget = max_len.saturating_sub(ext.as_ref().map(|e| e.len() + 1).unwrap_or(0));
    let stem: String = stem.chars().take(budget.max(1)).collect();

    let mut out = stem;
    if let Some(ext) = ext {
        out.push('.');
        out.push_str(&ext);
    } else if !relax.no_force_dots {
        out.push('.');
    }
    if !relax.omit_version_numbers {
        out.push_str(";1");
    }
    out
}

/// Shapes a directory name: no extension, no version suffix, d-characters only, capped at the
/// conformance level's length (8 for level 1, 30/37 for level 2/3).
pub fn iso_dirid(name: &str, level: ConformanceLevel, relax: &NameRelaxation) -> String {
    let max_len = match level {
        ConformanceLevel::Level1 => 8,
        ConformanceLevel::Level2Or3 => {
            if relax.max_37_char_filenames {
                37
            } else {
                30
            }
        }
    };
    shape_chars(name, relax).chars().take(max_len).collect()
}

/// Produces the on-disk name for a node at the given conformance level, choosing the file or
/// directory shaping function based on `is_dir`. This is the entry point the ECMA-119 tree
/// builder calls; the total function guaranteed by the mangling pass (§4.3) is layered on top of
/// this by appending/truncating to make the result unique among siblings.
pub fn shape_name(
    name: &str,
    is_dir: bool,
    level: ConformanceLevel,
    relax: &NameRelaxation,
) -> String {
    if is_dir {
        iso_dirid(name, level, relax)
    } else {
        match level {
            ConformanceLevel::Level1 => iso_1_fileid(name, relax),
            ConformanceLevel::Level2Or3 => iso_2_fileid(name, relax),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relax() -> NameRelaxation {
        NameRelaxation::default()
    }

    #[test]
    fn level1_truncates_and_uppercases() {
        let out = iso_1_fileid("readme.txt", &relax());
        assert_eq!(out, "README.TXT;1");
    }

    #[test]
    fn level1_long_name_is_truncated_to_8_3() {
        let out = iso_1_fileid("verylongfilename.extension", &relax());
        assert_eq!(out, "VERYLONG.EXT;1");
    }

    #[test]
    fn level1_no_extension_forces_dot() {
        let out = iso_1_fileid("readme", &relax());
        assert_eq!(out, "README.;1");
    }

    #[test]
    fn level2_allows_30_chars() {
        let out = iso_2_fileid("a_reasonably_long_filename.dat", &relax());
        assert!(out.starts_with("A_REASONABLY_LONG_FILENAME"));
        assert!(out.ends_with(".DAT;1"));
    }

    #[test]
    fn dirid_strips_extension_meaning() {
        let out = iso_dirid("my.dir", ConformanceLevel::Level2Or3, &relax());
        assert_eq!(out, "MY_DIR");
    }

    #[test]
    fn omit_version_numbers_drops_suffix() {
        let relax = NameRelaxation {
            omit_version_numbers: true,
            ..Default::default()
        };
        let out = iso_1_fileid("a.b", &relax);
        assert_eq!(out, "A.B");
    }

    #[test]
    fn disallowed_chars_replaced_with_underscore() {
        let out = iso_1_fileid("a b!.c", &relax());
        assert_eq!(out, "A_B_.C;1");
    }
}
