// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Joliet secondary volume tree: a parallel on-disk tree using UCS-2BE names and
//! Microsoft's relaxed length limits, built and written independently of the primary ECMA-119
//! tree but over the same logical tree and [`crate::filesrc::FileSrcRegistry`].
//!
//! Grounded on `original_source/src/joliet.c`'s `create_tree`/`create_node` (the recursive
//! builder, including the per-node 240-byte path cap and the 4 GiB Joliet file size cap) and
//! `calc_dir_size`/`calc_file_size` (record sizing: a Joliet directory record has no SUSP entries,
//! so its length is just the fixed 34-byte header plus `2 * name_len_in_ucs2_units`).

#[allow(unused)]
use log::{debug, trace, warn};

use std::{cell::RefCell, collections::HashSet, rc::Rc};

use crate::{
    error::{ImageError, Result},
    filesrc::{FileSrc, FileSrcRegistry},
    message::{Message, MessageSink, Severity},
    node::{Node, NodeRef},
    options::WriteOpts,
};

/// Joliet's nominal path-length cap, 15 bytes tighter than ECMA-119's own 255.
pub const MAX_PATH_LEN: usize = 240;
/// Joliet name length cap in UCS-2 code units (Level 3, the level this crate always uses).
pub const MAX_NAME_UNITS: usize = 64;
/// Files larger than this cannot be referenced from a Joliet directory record (32-bit size field).
pub const MAX_FILE_SIZE: u64 = 0xffff_ffff;

/// A node in the Joliet tree, shadowing a [`Node`] from the logical tree the same way
/// [`crate::ecma119::tree::Ecma119Node`] does for the primary tree.
pub struct JolietNode {
    /// On-disk name, UCS-2BE code units (already shaped/mangled, no trailing `;1` unless
    /// versioned names are enabled).
    pub name: Vec<u16>,
    /// The logical node this was built from. `None` for the synthetic root record.
    pub source: Option<NodeRef>,
    /// Children, directories only, sorted per ECMA-119 §9.3 on the UCS-2 bytes.
    pub children: RefCell<Vec<Rc<JolietNode>>>,
    /// Content location, shared with the primary tree via the same dedup registry.
    pub file_src: Option<Rc<FileSrc>>,
    /// Block this directory's own extent was assigned to.
    pub block: RefCell<Option<u32>>,
    /// True if this is a directory.
    pub is_dir: bool,
}

impl JolietNode {
    fn leaf(name: Vec<u16>, source: NodeRef, file_src: Option<Rc<FileSrc>>) -> Rc<JolietNode> {
        Rc::new(JolietNode {
            name,
            source: Some(source),
            children: RefCell::new(Vec::new()),
            file_src,
            block: RefCell::new(None),
            is_dir: false,
        })
    }

    fn dir(name: Vec<u16>, source: Option<NodeRef>) -> Rc<JolietNode> {
        Rc::new(JolietNode {
            name,
            source,
            children: RefCell::new(Vec::new()),
            file_src: None,
            block: RefCell::new(None),
            is_dir: true,
        })
    }

    /// Fixed-size directory record length for this node's row in its parent: 34-byte ECMA-119
    /// header plus the UCS-2BE name, padded to even. Mirrors `joliet.c`'s `calc_dir_size`/
    /// `calc_file_size` (34 is `calc_dir_size`'s constant for a childless directory row).
    pub fn record_len(&self) -> u32 {
        let name_bytes = (self.name.len() * 2) as u32;
        let len = 33 + name_bytes.max(1);
        len + (len % 2)
    }
}

/// Encodes a name into Joliet's restricted UCS-2 character set: everything is allowed except
/// `*`, `/`, `:`, `;`, `?`, `\`, which `iso_j_id` replaces with `_`; case is preserved (Joliet,
/// unlike the primary tree, is case-sensitive).
fn joliet_shape_name(name: &str, relax_longer: bool) -> Vec<u16> {
    const FORBIDDEN: &[char] = &['*', '/', ':', ';', '?', '\\'];
    let mut units: Vec<u16> = name
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect::<String>()
        .encode_utf16()
        .collect();
    let cap = if relax_longer { units.len() } else { MAX_NAME_UNITS };
    units.truncate(cap);
    units
}

/// Appends a numeric suffix to `name` until it is unique within `used`, the UCS-2 analogue of
/// [`crate::ecma119::tree`]'s `mangle_unique`.
fn mangle_unique(name: &[u16], used: &mut HashSet<Vec<u16>>) -> Vec<u16> {
    if used.insert(name.to_vec()) {
        return name.to_vec();
    }
    for n in 1u64.. {
        let suffix: Vec<u16> = n.to_string().encode_utf16().collect();
        let budget = name.len().saturating_sub(suffix.len()).max(1).min(name.len());
        let mut candidate = name[..budget].to_vec();
        candidate.extend_from_slice(&suffix);
        if used.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!("suffix space is unbounded")
}

/// Builds the full Joliet tree rooted at `logical_root`, reusing `registry` so file content is
/// shared (not duplicated) between the primary and Joliet trees.
pub fn build_tree(
    logical_root: &NodeRef,
    opts: &WriteOpts,
    registry: &mut FileSrcRegistry,
    sink: &dyn MessageSink,
) -> Result<Rc<JolietNode>> {
    let root = JolietNode::dir(Vec::new(), Some(logical_root.clone()));
    build_children(&root, logical_root, String::new(), opts, registry, sink)?;
    sort_tree(&root);
    Ok(root)
}

fn build_children(
    parent: &Rc<JolietNode>,
    logical_parent: &NodeRef,
    path_so_far: String,
    opts: &WriteOpts,
    registry: &mut FileSrcRegistry,
    sink: &dyn MessageSink,
) -> Result<()> {
    let logical = logical_parent.borrow();
    let dir = match logical.as_dir() {
        Some(d) => d,
        None => return Ok(()),
    };

    let mut used_names: HashSet<Vec<u16>> = HashSet::new();
    let mut built = Vec::new();

    for child_ref in dir.iter() {
        let child = child_ref.borrow();
        if child.attributes().hidden {
            continue;
        }

        let is_dir = matches!(&*child, Node::Dir(_));
        let mut shaped = joliet_shape_name(child.name(), opts.joliet_longer_paths);
        shaped = mangle_unique(&shaped, &mut used_names);

        let path_len = path_so_far.len() + 1 + shaped.len() * 2;
        if !opts.joliet_longer_paths && path_len > MAX_PATH_LEN {
            sink.report(&Message::new(
                Severity::Sorry,
                1101,
                format!("'{}' exceeds Joliet's {MAX_PATH_LEN}-byte path cap, skipping", child.name()),
            ));
            continue;
        }

        drop(child);
        match &*child_ref.borrow() {
            Node::Dir(_) => {
                let node = JolietNode::dir(shaped, Some(child_ref.clone()));
                build_children(&node, child_ref, format!("{path_so_far}/?"), opts, registry, sink)?;
                built.push(node);
            }
            Node::File(file) => {
                if file.stream.size() > MAX_FILE_SIZE {
                    sink.report(&Message::new(
                        Severity::Note,
                        1102,
                        format!("'{}' exceeds 4 GiB, omitted from Joliet tree", file.attributes.name),
                    ));
                    continue;
                }
                let file_src = registry.register(file.stream.clone(), file.msblock, file.sort_weight);
                built.push(JolietNode::leaf(shaped, child_ref.clone(), Some(file_src)));
            }
            Node::Symlink(_) | Node::Special(_) | Node::BootPlaceholder(_) => {
                built.push(JolietNode::leaf(shaped, child_ref.clone(), None));
            }
        }
    }

    *parent.children.borrow_mut() = built;
    Ok(())
}

fn sort_tree(node: &Rc<JolietNode>) {
    {
        let mut children = node.children.borrow_mut();
        children.sort_by(|a, b| a.name.cmp(&b.name));
    }
    for child in node.children.borrow().iter() {
        if child.is_dir {
            sort_tree(child);
        }
    }
}

/// Encodes the Joliet Supplementary Volume Descriptor (ECMA-119 §8.5, with the UCS-2 Level 3
/// escape sequence in the Escape Sequences field), given the already-assigned root extent
/// location/size and the volume-wide fields shared with the primary PVD.
#[allow(clippy::too_many_arguments)]
pub fn encode_svd(
    volume_id: &str,
    volume_space_size: u32,
    path_table_size: u32,
    l_path_table_block: u32,
    m_path_table_block: u32,
    root_block: u32,
    root_len: u32,
    volume_creation: [u8; 17],
) -> Result<[u8; 2048]> {
    let mut buf = [0u8; 2048];
    buf[0] = 2; // Supplementary Volume Descriptor type
    buf[1..6].copy_from_slice(b"CD001");
    buf[6] = 1;

    // Escape sequence for UCS-2 Level 3 (ECMA-119 §8.5.6 / Joliet SVD spec).
    buf[88..91].copy_from_slice(&[0x25, 0x2f, 0x45]);

    let volume_id_ucs2 = encode_ucs2(volume_id, 16);
    buf[40..72].copy_from_slice(&volume_id_ucs2);

    both_endian32_into(&mut buf[80..88], volume_space_size);
    both_endian16_into(&mut buf[120..124], 1); // volume set size
    both_endian16_into(&mut buf[124..128], 1); // volume sequence number
    both_endian16_into(&mut buf[128..132], 2048); // logical block size
    both_endian32_into(&mut buf[132..140], path_table_size);

    buf[140..144].copy_from_slice(&l_path_table_block.to_le_bytes());
    buf[148..152].copy_from_slice(&m_path_table_block.to_be_bytes());

    // Root directory record, embedded directly in the SVD (ECMA-119 §8.5.24).
    let root_record = &mut buf[156..190];
    root_record[0] = 34;
    root_record[2..6].copy_from_slice(&root_block.to_le_bytes());
    root_record[6..10].copy_from_slice(&root_block.to_be_bytes());
    root_record[10..14].copy_from_slice(&root_len.to_le_bytes());
    root_record[14..18].copy_from_slice(&root_len.to_be_bytes());
    root_record[25] = 0x02; // directory flag
    root_record[28..30].copy_from_slice(&1u16.to_le_bytes());
    root_record[30..32].copy_from_slice(&1u16.to_be_bytes());
    root_record[32] = 1;

    buf[813..830].copy_from_slice(&volume_creation);
    let no_timestamp = {
        let mut t = [0u8; 17];
        t[16] = 0;
        t
    };
    buf[830..847].copy_from_slice(&no_timestamp);
    buf[847..864].copy_from_slice(&no_timestamp);
    buf[864..881].copy_from_slice(&no_timestamp);
    buf[881] = 1; // file structure version

    Ok(buf)
}

fn encode_ucs2(s: &str, max_units: usize) -> Vec<u8> {
    let mut units: Vec<u16> = s.encode_utf16().collect();
    units.truncate(max_units);
    let mut out = vec![0x20u8; max_units * 2]; // space-pad, ECMA-119 §8.5
    for (i, u) in units.iter().enumerate() {
        out[i * 2..i * 2 + 2].copy_from_slice(&u.to_be_bytes());
    }
    out
}

fn both_endian32_into(dst: &mut [u8], v: u32) {
    dst[0..4].copy_from_slice(&v.to_le_bytes());
    dst[4..8].copy_from_slice(&v.to_be_bytes());
}

fn both_endian16_into(dst: &mut [u8], v: u16) {
    dst[0..2].copy_from_slice(&v.to_le_bytes());
    dst[2..4].copy_from_slice(&v.to_be_bytes());
}

/// Validates a directory record length stays within the format's 255-byte cap; Joliet records
/// have no SUSP payload so this only matters for pathological (64-unit) names.
pub fn check_record_len(len: u32) -> Result<()> {
    if len > 255 {
        return Err(ImageError::Format("Joliet directory record exceeds 255 bytes"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        message::NullSink,
        node::{Dir, File, Image},
        parse::susp::PosixFileMode,
        stream::MemoryStream,
    };

    #[test]
    fn shapes_name_to_ucs2() {
        let units = joliet_shape_name("héllo*.txt", false);
        let s = String::from_utf16(&units).unwrap();
        assert_eq!(s, "héllo_.txt");
    }

    #[test]
    fn mangles_duplicates() {
        let mut used = HashSet::new();
        let a: Vec<u16> = "NAME".encode_utf16().collect();
        let m1 = mangle_unique(&a, &mut used);
        let m2 = mangle_unique(&a, &mut used);
        assert_eq!(m1, a);
        assert_ne!(m2, a);
    }

    #[test]
    fn builds_simple_tree() {
        let image = Image::new();
        let root = image.root();
        let file = Rc::new(RefCell::new(Node::File(File::new(
            "readme.txt",
            PosixFileMode::from_bits_truncate(0o644),
            Rc::new(MemoryStream::new(b"hi".to_vec())),
        ))));
        image.tree_add_node(&root, file).unwrap();
        let dir = Rc::new(RefCell::new(Node::Dir(Dir::new(
            "subdir",
            PosixFileMode::from_bits_truncate(0o755),
        ))));
        image.tree_add_node(&root, dir).unwrap();

        let mut registry = FileSrcRegistry::new();
        let opts = WriteOpts::default();
        let sink = NullSink;
        let tree = build_tree(&root, &opts, &mut registry, &sink).unwrap();
        assert_eq!(tree.children.borrow().len(), 2);
    }

    #[test]
    fn record_len_is_even_and_includes_name() {
        let node = JolietNode::leaf(vec![b'A' as u16], {
            let image = Image::new();
            let root = image.root();
            let file = Rc::new(RefCell::new(Node::File(File::new(
                "a",
                PosixFileMode::from_bits_truncate(0o644),
                Rc::new(MemoryStream::new(b"x".to_vec())),
            ))));
            image.tree_add_node(&root, file.clone()).unwrap();
            file
        }, None);
        assert_eq!(node.record_len() % 2, 0);
    }
}
