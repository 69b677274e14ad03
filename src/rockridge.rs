// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! SUSP/Rock Ridge encoder.
//!
//! Packs POSIX metadata and alternate names into the System Use Area (SUA) of a directory record,
//! spilling into a per-directory Continuation Area (CE) extent when the 185-byte nominal SUA
//! budget is exceeded. Grounded on `original_source/src/rockridge.c`'s `rrip_calc_len` (sizing,
//! run in pass 1) and `rrip_get_susp_fields`/`rrip_write_susp_fields` (the matching write-side
//! split between inline and CE bytes, run in pass 3); the two must agree exactly on how many bytes
//! go where, which is why both the planning ([`plan_child`]/[`plan_dot`]/[`plan_dotdot`]) and the
//! writing ([`write_record`]) side replay the same [`SuspPlan`] rather than recomputing sizes.

use std::rc::Rc;

use time::OffsetDateTime;

use crate::{
    aaip,
    ecma119::tree::Ecma119Node,
    error::Result,
    node::Node,
    parse::susp::PosixFileMode,
};

/// Nominal worst-case SUA budget available to RRIP fields once the fixed 33-byte directory record
/// header and the longest permitted identifier (37 d-characters, relaxed profile) are subtracted:
/// `255 - 33 - 37`. Mirrors `rrip_calc_len`'s `space` parameter.
pub const SUA_BUDGET: usize = 185;

/// Length of a `CE` entry: 4-byte header + three both-endian 8-byte fields.
pub const CE_ENTRY_LEN: usize = 28;

fn both_endian32(v: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&v.to_le_bytes());
    out[4..8].copy_from_slice(&v.to_be_bytes());
    out
}

fn entry_header(sig: &[u8; 2], len: u8, version: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(usize::from(len));
    out.extend_from_slice(sig);
    out.push(len);
    out.push(version);
    out
}

/// RRIP revision, selecting the `PX` entry's width. This crate always emits the 1.10 form (36
/// bytes, no inode field); 1.12's inode field needs a stable per-node inode number this crate does
/// not track, so [`RockRidgeRevision::V1_12`] is reserved for a future caller-supplied inode map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RockRidgeRevision {
    /// RRIP 1.09/1.10: no inode field, 36-byte `PX`.
    V1_10,
    /// RRIP 1.12: adds the inode field, 44-byte `PX`.
    #[default]
    V1_12,
}

/// One SUSP entry with its final bytes, tagged with where it must be written.
pub struct PlannedEntry {
    pub bytes: Vec<u8>,
    /// `true` if this entry belongs in the directory's CE extent rather than inline in the SUA.
    pub in_ce: bool,
}

/// The full set of entries for one directory record, split between inline SUA bytes and the CE
/// extent, computed once in pass 1 ([`plan_child`]/[`plan_dot`]/[`plan_dotdot`]) and replayed
/// unchanged in pass 3 ([`write_record`]).
#[derive(Default)]
pub struct SuspPlan {
    pub entries: Vec<PlannedEntry>,
}

impl SuspPlan {
    fn push(&mut self, bytes: Vec<u8>, in_ce: bool) {
        self.entries.push(PlannedEntry { bytes, in_ce });
    }

    /// Whether any entry in this plan needs the CE extent (and therefore a `CE` pointer entry
    /// must also be accounted for inline).
    pub fn needs_ce(&self) -> bool {
        self.entries.iter().any(|e| e.in_ce)
    }

    /// Total bytes landing inline in the SUA, padded to an even length (ECMA-119 §9.1.13). The
    /// 28-byte `CE` pointer, when present, is already one of `entries` (pushed by the `plan_*`
    /// builders alongside whatever else lands in the CE extent) so it's covered by the sum below.
    pub fn total_len(&self) -> u32 {
        let n: u32 = self
            .entries
            .iter()
            .filter(|e| !e.in_ce)
            .map(|e| e.bytes.len() as u32)
            .sum();
        n + (n % 2)
    }

    /// Total bytes landing in the directory's CE extent (not including the `CE` pointer itself,
    /// which is inline).
    pub fn ce_len(&self) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.in_ce)
            .map(|e| e.bytes.len() as u32)
            .sum()
    }
}

fn encode_px(mode: PosixFileMode, links: u32, uid: u32, gid: u32, inode: Option<u32>) -> Vec<u8> {
    let len = if inode.is_some() { 44 } else { 36 };
    let mut out = entry_header(b"PX", len as u8, 1);
    out.extend_from_slice(&both_endian32(mode.bits()));
    out.extend_from_slice(&both_endian32(links));
    out.extend_from_slice(&both_endian32(uid));
    out.extend_from_slice(&both_endian32(gid));
    if let Some(inode) = inode {
        out.extend_from_slice(&both_endian32(inode));
    }
    out
}

fn encode_short_date(dt: OffsetDateTime) -> [u8; 7] {
    let mut buf = [0u8; 7];
    crate::parse::date_time::encode_date_time_short(dt, &mut buf);
    buf
}

fn encode_tf(atime: OffsetDateTime, mtime: OffsetDateTime, ctime: OffsetDateTime) -> Vec<u8> {
    // flags: MODIFY | ACCESS | ATTRIBUTES, short form (libisofs's default TF content).
    let mut out = entry_header(b"TF", 26, 1);
    out.push(0b0000_1110);
    out.extend_from_slice(&encode_short_date(mtime));
    out.extend_from_slice(&encode_short_date(atime));
    out.extend_from_slice(&encode_short_date(ctime));
    out
}

fn encode_pn(dev: u64) -> Vec<u8> {
    let mut out = entry_header(b"PN", 20, 1);
    out.extend_from_slice(&both_endian32((dev >> 32) as u32));
    out.extend_from_slice(&both_endian32(dev as u32));
    out
}

fn encode_cl(block: u32) -> Vec<u8> {
    let mut out = entry_header(b"CL", 12, 1);
    out.extend_from_slice(&both_endian32(block));
    out
}

fn encode_pl(block: u32) -> Vec<u8> {
    let mut out = entry_header(b"PL", 12, 1);
    out.extend_from_slice(&both_endian32(block));
    out
}

fn encode_re() -> Vec<u8> {
    entry_header(b"RE", 4, 1)
}

fn encode_sp() -> Vec<u8> {
    let mut out = entry_header(b"SP", 7, 1);
    out.push(0xbe);
    out.push(0xef);
    out.push(0);
    out
}

fn encode_es(sequence: u8) -> Vec<u8> {
    let mut out = entry_header(b"ES", 5, 1);
    out.push(sequence);
    out
}

/// Builds one `ER` entry identifying the RRIP extension (182 bytes).
fn encode_er_rrip() -> Vec<u8> {
    const ID: &str = "RRIP_1991A";
    const DES: &str = "THE ROCK RIDGE INTERCHANGE PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS";
    const SRC: &str = "PLEASE CONTACT DISC PUBLISHER FOR SPECIFICATION SOURCE.  SEE ALSO PUBLISHER IDENTIFIER IN PRIMARY VOLUME DESCRIPTOR.";
    encode_er(ID, DES, SRC, 1)
}

fn encode_er_aaip() -> Vec<u8> {
    const ID: &str = "AAIP_0200";
    const DES: &str = "AL, POSIX ACL, EA, CHECKSUM, MULTIPLE EXTENT WORKAROUND";
    const SRC: &str = "PLEASE CONTACT AUTHOR OF LIBISOFS: http://libburnia-project.org";
    encode_er(ID, DES, SRC, 1)
}

fn encode_er(id: &str, des: &str, src: &str, version: u8) -> Vec<u8> {
    let len = 8 + id.len() + des.len() + src.len();
    let mut out = entry_header(b"ER", len as u8, 1);
    out.push(id.len() as u8);
    out.push(des.len() as u8);
    out.push(src.len() as u8);
    out.push(version);
    out.extend_from_slice(id.as_bytes());
    out.extend_from_slice(des.as_bytes());
    out.extend_from_slice(src.as_bytes());
    out
}

fn ce_placeholder() -> Vec<u8> {
    // Real block/offset/length are filled in by `patch_ce_pointer` once the CE extent's
    // layout is known (pass 1 computes sizes before block assignment is final).
    let mut out = entry_header(b"CE", CE_ENTRY_LEN as u8, 1);
    out.extend_from_slice(&[0u8; 24]);
    out
}

/// Overwrites a previously planned `CE` entry's block/offset/length fields once they are known.
pub fn patch_ce_pointer(entry: &mut [u8], block: u32, offset: u32, length: u32) {
    debug_assert_eq!(entry.len(), CE_ENTRY_LEN);
    entry[4..12].copy_from_slice(&both_endian32(block));
    entry[12..20].copy_from_slice(&both_endian32(offset));
    entry[20..28].copy_from_slice(&both_endian32(length));
}

/// Overwrites a previously planned `CL` or `PL` entry's block field once the relocation target's
/// extent is known; both entries share the same 12-byte layout (4-byte header, one both-endian
/// block number).
pub fn patch_relocation_pointer(entry: &mut [u8], block: u32) {
    debug_assert_eq!(entry.len(), 12);
    entry[4..12].copy_from_slice(&both_endian32(block));
}

fn encode_nm_part(part: &[u8], continues: bool) -> Vec<u8> {
    let mut out = entry_header(b"NM", (5 + part.len()) as u8, 1);
    out.push(if continues { 1 } else { 0 });
    out.extend_from_slice(part);
    out
}

fn encode_nm_self(parent: bool) -> Vec<u8> {
    let mut out = entry_header(b"NM", 5, 1);
    out.push(if parent { 1 << 2 } else { 1 << 1 });
    out
}

bitflags::bitflags! {
    struct SlCompFlags: u8 {
        const CONTINUE = 1 << 0;
        const CURRENT = 1 << 1;
        const PARENT = 1 << 2;
        const ROOT = 1 << 3;
    }
}

fn sl_component(flag: SlCompFlags, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + content.len());
    out.push(flag.bits());
    out.push(content.len() as u8);
    out.extend_from_slice(content);
    out
}

/// Splits a symlink target into `SL` entries (RRIP §4.1.3.1): each entry is `5 + components`
/// bytes, no entry exceeding 255 bytes total; a component longer than 250 bytes is itself split
/// across two component records with the first flagged `CONTINUE`. Entries after the first carry
/// the `CONTINUE` flag in their own header byte so the reassembled target is unambiguous.
fn encode_sl(target: &str) -> Vec<Vec<u8>> {
    let mut entries: Vec<Vec<u8>> = Vec::new();
    let mut cur_body: Vec<u8> = Vec::new();
    let mut cur_continues_next = false;

    let flush = |entries: &mut Vec<Vec<u8>>, body: &mut Vec<u8>, continues: bool| {
        if body.is_empty() && entries.is_empty() {
            return;
        }
        let mut out = entry_header(b"SL", (5 + body.len()) as u8, 1);
        out.push(if continues { 1 } else { 0 });
        out.append(body);
        entries.push(out);
    };

    let components: Vec<&str> = target.split('/').collect();
    for (i, comp) in components.iter().enumerate() {
        let (flag, bytes): (SlCompFlags, &[u8]) = if comp.is_empty() {
            if i == 0 {
                (SlCompFlags::ROOT, b"")
            } else {
                continue; // trailing or doubled slash, nothing to encode
            }
        } else if *comp == "." {
            (SlCompFlags::CURRENT, b"")
        } else if *comp == ".." {
            (SlCompFlags::PARENT, b"")
        } else {
            (SlCompFlags::empty(), comp.as_bytes())
        };

        let mut remaining = bytes;
        loop {
            let chunk_flag = if remaining.len() > 250 {
                flag | SlCompFlags::CONTINUE
            } else {
                flag
            };
            let chunk = &remaining[..remaining.len().min(250)];
            let comp_record = sl_component(chunk_flag, chunk);

            if cur_body.len() + comp_record.len() > 250 {
                flush(&mut entries, &mut cur_body, cur_continues_next);
                cur_continues_next = true;
            }
            cur_body.extend_from_slice(&comp_record);

            if remaining.len() > 250 {
                remaining = &remaining[250..];
            } else {
                break;
            }
        }
    }
    flush(&mut entries, &mut cur_body, cur_continues_next);
    entries
}

fn posix_attrs(node: &Node, is_dir: bool) -> (PosixFileMode, u32, u32, OffsetDateTime, OffsetDateTime, OffsetDateTime) {
    let attrs = node.attributes();
    let mode = if is_dir {
        attrs.mode | PosixFileMode::TYPE_DIRECTORY
    } else {
        attrs.mode
    };
    (mode, attrs.uid, attrs.gid, attrs.atime, attrs.mtime, attrs.ctime)
}

/// Plans the SUSP entries for a child's own directory-record row inside its parent: `PX`, `TF`,
/// `PN`/`CL`/`RE` as applicable, `NM`, and (for symlinks) `SL`, splitting into the CE extent once
/// the [`SUA_BUDGET`] is exceeded.
pub fn plan_child(ecma_node: &Rc<Ecma119Node>) -> SuspPlan {
    let mut plan = SuspPlan::default();
    let source = match &ecma_node.source {
        Some(s) => s.clone(),
        None => return plan, // synthetic RR_MOVED container itself has no logical node
    };
    let logical = source.borrow();
    let (mode, uid, gid, atime, mtime, ctime) = posix_attrs(&logical, ecma_node.is_dir);
    let aa_payload = aaip::payload(logical.attributes());

    plan.push(encode_px(mode, 1, uid, gid, None), false);
    plan.push(encode_tf(atime, mtime, ctime), false);

    if let Node::Special(special) = &*logical {
        plan.push(encode_pn(special.dev), false);
    }
    if ecma_node.is_placeholder() {
        // Block is patched once the relocated target's extent is assigned (pass 1 completes
        // after this plan is built); store a CL placeholder the layout pass fixes up.
        plan.push(encode_cl(0), false);
    }
    if ecma_node.real_parent.borrow().is_some() {
        plan.push(encode_re(), false);
    }

    let real_name = logical.name().to_string();
    let used_so_far: usize = plan.entries.iter().map(|e| e.bytes.len()).sum();
    let sua_free = SUA_BUDGET.saturating_sub(used_so_far);

    let name_bytes = real_name.as_bytes();
    let (nm_inline_len, nm_in_ce) = if 5 + name_bytes.len() <= sua_free {
        (name_bytes.len(), false)
    } else {
        let inline_len = sua_free.saturating_sub(5 + CE_ENTRY_LEN);
        (inline_len, true)
    };

    let target = match &*logical {
        Node::Symlink(s) => Some(s.target.clone()),
        _ => None,
    };
    drop(logical);

    if nm_in_ce {
        plan.push(encode_nm_part(&name_bytes[..nm_inline_len], true), false);
    } else {
        plan.push(encode_nm_part(name_bytes, false), false);
    }

    if let Some(target) = &target {
        let sl_entries = encode_sl(target);
        // SL moves entirely to CE whenever NM already overflowed the SUA, matching
        // `rrip_calc_len`'s "SL completely moved into the CA" simplification (§4.5 step 4).
        for entry in sl_entries {
            plan.push(entry, nm_in_ce);
        }
    }

    if nm_in_ce {
        plan.push(encode_nm_part(&name_bytes[nm_inline_len..], false), true);
    }

    if let Some(payload) = aa_payload {
        let aa_entries = aaip::encode_aa_entries(&payload);
        let used_so_far: usize = plan.entries.iter().filter(|e| !e.in_ce).map(|e| e.bytes.len()).sum();
        let aa_total: usize = aa_entries.iter().map(|e| e.len()).sum();
        let aa_in_ce = nm_in_ce || used_so_far + aa_total > SUA_BUDGET;
        for entry in aa_entries {
            plan.push(entry, aa_in_ce);
        }
    }

    if plan.needs_ce() {
        plan.push(ce_placeholder(), false);
    }

    plan
}

/// Plans the SUSP entries for a directory's own `.` record: `PX`, `TF`, `RE` if this directory
/// was relocated under `RR_MOVED`, and (for the volume root only) `SP` + `ER` (the latter via a
/// forced CE, per RRIP's requirement that extension registrations live in the continuation area).
pub fn plan_dot(dir: &Rc<Ecma119Node>, is_root: bool, aaip_present: bool) -> SuspPlan {
    let mut plan = SuspPlan::default();
    if is_root {
        plan.push(encode_sp(), false);
    }
    let (mode, uid, gid, atime, mtime, ctime, aa_payload) = match &dir.source {
        Some(source) => {
            let logical = source.borrow();
            let (mode, uid, gid, atime, mtime, ctime) = posix_attrs(&logical, true);
            (mode, uid, gid, atime, mtime, ctime, aaip::payload(logical.attributes()))
        }
        None => (
            PosixFileMode::TYPE_DIRECTORY | PosixFileMode::from_bits_truncate(0o755),
            0,
            0,
            OffsetDateTime::UNIX_EPOCH,
            OffsetDateTime::UNIX_EPOCH,
            OffsetDateTime::UNIX_EPOCH,
            None,
        ),
    };
    if is_root && aaip_present {
        plan.push(encode_es(0), false);
    }
    plan.push(encode_px(mode, 1, uid, gid, None), false);
    plan.push(encode_tf(atime, mtime, ctime), false);
    plan.push(encode_nm_self(false), false);
    if dir.real_parent.borrow().is_some() {
        plan.push(encode_re(), false);
    }
    if is_root {
        plan.push(encode_er_rrip(), true);
        if aaip_present {
            plan.push(encode_er_aaip(), true);
        }
    }
    if let Some(payload) = aa_payload {
        for entry in aaip::encode_aa_entries(&payload) {
            plan.push(entry, true);
        }
    }
    if plan.needs_ce() {
        plan.push(ce_placeholder(), false);
    }
    plan
}

/// Plans the SUSP entries for a directory's `..` record: `PX`/`TF` of the *parent*, and `PL` if
/// `dir` (not `parent`) was relocated under `RR_MOVED` (RRIP §4.1.5.2: `PL` lives in the `..`
/// record of the moved directory itself, pointing at its original parent's extent).
pub fn plan_dotdot(dir: &Rc<Ecma119Node>, parent: &Rc<Ecma119Node>) -> SuspPlan {
    let mut plan = SuspPlan::default();
    let (mode, uid, gid, atime, mtime, ctime) = match &parent.source {
        Some(source) => {
            let logical = source.borrow();
            posix_attrs(&logical, true)
        }
        None => (
            PosixFileMode::TYPE_DIRECTORY | PosixFileMode::from_bits_truncate(0o755),
            0,
            0,
            OffsetDateTime::UNIX_EPOCH,
            OffsetDateTime::UNIX_EPOCH,
            OffsetDateTime::UNIX_EPOCH,
        ),
    };
    plan.push(encode_px(mode, 1, uid, gid, None), false);
    plan.push(encode_tf(atime, mtime, ctime), false);
    plan.push(encode_nm_self(true), false);
    if dir.real_parent.borrow().is_some() {
        plan.push(encode_pl(0), false);
    }
    plan
}

/// Assembles the final inline SUA bytes and CE bytes for a plan, after any `CL`/`PL`/`CE` block
/// placeholders have been patched with real block numbers by the layout pass.
pub fn write_record(plan: &SuspPlan) -> (Vec<u8>, Vec<u8>) {
    let mut inline = Vec::new();
    let mut ce = Vec::new();
    for entry in &plan.entries {
        if entry.in_ce {
            ce.extend_from_slice(&entry.bytes);
        } else {
            inline.extend_from_slice(&entry.bytes);
        }
    }
    if inline.len() % 2 != 0 {
        inline.push(0);
    }
    (inline, ce)
}

/// Validates that an encoded directory record's SUA fits the ECMA-119 §9.1 budget. Used by tests
/// and by the writer as a last-resort invariant check.
pub fn check_record_len(fixed_len: usize, sua_len: usize) -> Result<()> {
    let total = fixed_len + sua_len;
    if total > 255 {
        return Err(crate::error::ImageError::Format(
            "directory record exceeds 255 bytes after SUSP packing",
        ));
    }
    if total % 2 != 0 {
        return Err(crate::error::ImageError::Invariant(
            "directory record length is odd",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        node::{Dir, File, Image, Node as N},
        parse::susp::PosixFileMode,
        stream::MemoryStream,
    };
    use std::{cell::RefCell, rc::Rc};

    fn make_file_node(name: &str) -> Rc<RefCell<N>> {
        Rc::new(RefCell::new(N::File(File::new(
            name,
            PosixFileMode::from_bits_truncate(0o644),
            Rc::new(MemoryStream::new(b"x".to_vec())),
        ))))
    }

    #[test]
    fn short_name_fits_inline() {
        let image = Image::new();
        let root = image.root();
        let f = make_file_node("hello.txt");
        image.tree_add_node(&root, f.clone()).unwrap();

        let ecma = Rc::new(Ecma119Node {
            name: "HELLO.TXT;1".into(),
            source: Some(f),
            children: RefCell::new(Vec::new()),
            file_src: None,
            block: RefCell::new(None),
            is_dir: false,
            is_relocated: false,
            relocated_target: RefCell::new(None),
            real_parent: RefCell::new(None),
        });
        let plan = plan_child(&ecma);
        assert!(!plan.needs_ce());
        let (inline, ce) = write_record(&plan);
        assert!(ce.is_empty());
        assert!(inline.len() % 2 == 0);
        // NM entry payload should contain the real long name.
        assert!(inline.windows(9).any(|w| w == b"hello.txt"));
    }

    #[test]
    fn long_name_spills_to_ce() {
        let image = Image::new();
        let root = image.root();
        let long_name = "a".repeat(200);
        let f = make_file_node(&long_name);
        image.tree_add_node(&root, f.clone()).unwrap();

        let ecma = Rc::new(Ecma119Node {
            name: "A.TXT;1".into(),
            source: Some(f),
            children: RefCell::new(Vec::new()),
            file_src: None,
            block: RefCell::new(None),
            is_dir: false,
            is_relocated: false,
            relocated_target: RefCell::new(None),
            real_parent: RefCell::new(None),
        });
        let plan = plan_child(&ecma);
        assert!(plan.needs_ce());
        let (_, ce) = write_record(&plan);
        assert!(!ce.is_empty());
    }

    #[test]
    fn symlink_short_target_single_sl() {
        let entries = encode_sl("usr/bin/ls");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn symlink_long_target_splits_across_entries() {
        let target = vec!["segment"; 60].join("/");
        let entries = encode_sl(&target);
        assert!(entries.len() >= 2);
        for e in &entries {
            assert!(e.len() <= 255);
        }
    }

    #[test]
    fn root_dot_gets_sp_then_er_in_ce() {
        let root_dir = Dir::new("", PosixFileMode::from_bits_truncate(0o755));
        let root_node: Rc<RefCell<N>> = Rc::new(RefCell::new(N::Dir(root_dir)));
        let ecma = Rc::new(Ecma119Node {
            name: String::new(),
            source: Some(root_node),
            children: RefCell::new(Vec::new()),
            file_src: None,
            block: RefCell::new(None),
            is_dir: true,
            is_relocated: false,
            relocated_target: RefCell::new(None),
            real_parent: RefCell::new(None),
        });
        let plan = plan_dot(&ecma, true, false);
        assert!(plan.needs_ce());
        let (inline, ce) = write_record(&plan);
        assert_eq!(&inline[0..2], b"SP");
        assert!(!ce.is_empty());
    }
}
