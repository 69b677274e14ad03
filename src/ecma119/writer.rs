// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! The three-pass writer: `compute_data_blocks` assigns every directory/file its block extent,
//! `write_vol_desc` emits the volume descriptor set, `write_data` streams directory records, path
//! tables, CE extents, the optional El Torito boot catalog, and file content in block order.
//!
//! Grounded on `original_source/src/writer.h`'s `Iso_Image_Writer` vtable (three function
//! pointers: `compute_data_blocks`, `write_vol_desc`, `write_data`) and `src/ecma119.c`'s
//! descriptor-slot reservation order. Unlike `original_source`'s pthread-driven producer, pass 3
//! here runs synchronously on the caller's thread: every node in the logical/ECMA-119/Joliet trees
//! is `Rc`-linked by design (see `crate::node`'s module doc), so a second OS thread would need
//! `Send` data it doesn't have. [`crate::ringbuffer::RingBuffer`] stays available for a caller that
//! wants to decouple a slow sink using its own thread-confined adaptation; this module doesn't
//! spawn one itself.

#[allow(unused)]
use log::{debug, info, trace, warn};

use std::{
    collections::{HashMap, VecDeque},
    io::Write,
    rc::{Rc, Weak},
};

use time::OffsetDateTime;

use crate::{
    aaip,
    ecma119::tree::Ecma119Node,
    eltorito::{self, BootImage},
    error::{ImageError, Result},
    filesrc::{FileSrc, FileSrcRegistry},
    joliet::{self, JolietNode},
    message::MessageSink,
    node::NodeRef,
    options::WriteOpts,
    parse::date_time::{encode_date_time_long, encode_date_time_short},
    rockridge::{self, SuspPlan},
    BlockBuffer, BlockBufferCtor, BLOCK_SIZE,
};

/// First block usable for volume descriptors; blocks 0-15 are the unused "system area".
pub const SYSTEM_AREA_BLOCKS: u32 = 16;

/// The planned SUSP entries for one directory's own row (`.`), its `..` row, and every child row,
/// built once in pass 1 and replayed unchanged by pass 3.
pub(crate) struct DirPlan {
    dot: SuspPlan,
    dotdot: SuspPlan,
    children: Vec<SuspPlan>,
}

/// The resolved El Torito boot catalog: the validated image plus the blocks pass 1 assigned it.
pub(crate) struct ResolvedEltorito {
    image: BootImage,
    catalog_node: NodeRef,
    catalog_block: u32,
    boot_image_block: u32,
    patch_isolinux: bool,
}

/// Tracks block assignments and the SUSP/Joliet/El Torito layout computed by pass 1.
pub struct Ecma119Layout {
    pub(crate) root: Rc<Ecma119Node>,
    pub(crate) joliet_root: Option<Rc<JolietNode>>,
    pub(crate) volume_space_size: u32,
    pub(crate) path_table_size: u32,
    pub(crate) path_table_l_block: u32,
    pub(crate) path_table_m_block: u32,
    pub(crate) joliet_path_table_size: u32,
    pub(crate) joliet_path_table_l_block: u32,
    pub(crate) joliet_path_table_m_block: u32,
    pub(crate) registry: FileSrcRegistry,
    dir_plans: HashMap<usize, DirPlan>,
    dir_extent_blocks: HashMap<usize, u32>,
    joliet_extent_blocks: HashMap<usize, u32>,
    ce_blocks: HashMap<usize, u32>,
    eltorito: Option<ResolvedEltorito>,
}

/// Pass 1: walks the already-built [`Ecma119Node`] (and, if requested, [`JolietNode`]) tree,
/// assigns every directory its extent and CE block, every distinct file its content block (via
/// [`FileSrcRegistry::assign_blocks`]), and the El Torito boot catalog its block, if any.
pub fn compute_data_blocks(
    root: Rc<Ecma119Node>,
    joliet_root: Option<Rc<JolietNode>>,
    mut registry: FileSrcRegistry,
    opts: &WriteOpts,
    msg_sink: &dyn MessageSink,
) -> Result<Ecma119Layout> {
    let _ = msg_sink;

    if opts.appendable {
        return Err(ImageError::Precondition(
            "appendable multi-session writes are not implemented by this writer; \
             write a single-session image instead",
        ));
    }
    if opts.iso1999 {
        return Err(ImageError::Precondition(
            "ISO 9660:1999 secondary trees are not implemented by this writer; \
             use Joliet or drop iso1999",
        ));
    }

    for entry in registry.entries() {
        if entry.size > u64::from(u32::MAX) {
            return Err(ImageError::TooBig(
                "file exceeds the 4 GiB ECMA-119 extent size cap",
            ));
        }
    }

    let any_aaip = any_aaip_present(&root);
    let mut dir_plans = HashMap::new();
    build_dir_plans(&root, None, true, any_aaip, opts.rockridge, &mut dir_plans);

    let mut path_table_size = 0u32;
    walk_dirs(&root, &mut |node| {
        let name_len = node.name.len().max(1) as u32;
        path_table_size += 8 + name_len + (name_len % 2);
    });

    let mut joliet_path_table_size = 0u32;
    if let Some(jr) = &joliet_root {
        walk_joliet_dirs(jr, &mut |node| {
            let name_len = (node.name.len() * 2).max(1) as u32;
            joliet_path_table_size += 8 + name_len + (name_len % 2);
        });
    }

    let mut vol_desc_count = 2u32; // PVD + terminator
    if joliet_root.is_some() {
        vol_desc_count += 1;
    }
    if opts.eltorito.is_some() {
        vol_desc_count += 1;
    }
    let mut next_block = SYSTEM_AREA_BLOCKS + vol_desc_count;

    let path_table_blocks = blocks_for_bytes(path_table_size);
    let path_table_l_block = next_block;
    next_block += path_table_blocks;
    let path_table_m_block = next_block;
    next_block += path_table_blocks;

    let (joliet_path_table_l_block, joliet_path_table_m_block) = if joliet_root.is_some() {
        let jblocks = blocks_for_bytes(joliet_path_table_size);
        let l = next_block;
        next_block += jblocks;
        let m = next_block;
        next_block += jblocks;
        (l, m)
    } else {
        (0, 0)
    };

    let mut dir_extent_blocks = HashMap::new();
    let mut ce_blocks = HashMap::new();
    assign_dir_blocks(&root, &mut next_block, &mut dir_plans, &mut dir_extent_blocks, &mut ce_blocks)?;
    patch_relocations(&root, None, &mut dir_plans);

    let mut joliet_extent_blocks = HashMap::new();
    if let Some(jr) = &joliet_root {
        assign_joliet_dir_blocks(jr, &mut next_block, &mut joliet_extent_blocks)?;
    }

    let catalog_block = if opts.eltorito.is_some() {
        let block = next_block;
        next_block += 1;
        Some(block)
    } else {
        None
    };

    let after_fixed = next_block;
    let end = registry.assign_blocks(after_fixed);

    let eltorito = match (&opts.eltorito, catalog_block) {
        (Some(spec), Some(catalog_block)) => {
            let boot_ecma = find_ecma_node_for(&root, &spec.boot_image_node).ok_or(
                ImageError::Precondition("El Torito boot image node is not part of this image's tree"),
            )?;
            let stream = boot_ecma.file_src.as_ref().map(|f| f.stream.clone()).ok_or(
                ImageError::Precondition("El Torito boot image node has no registered content"),
            )?;
            let boot_image_block = boot_ecma.file_src.as_ref().and_then(|f| f.assigned_block()).unwrap_or(0);
            let image = eltorito::build_boot_image(
                stream,
                spec.media_type,
                spec.load_seg,
                spec.load_size,
                spec.bootable,
                spec.patch_isolinux_boot_info,
            )?;
            Some(ResolvedEltorito {
                image,
                catalog_node: spec.catalog_node.clone(),
                catalog_block,
                boot_image_block,
                patch_isolinux: spec.patch_isolinux_boot_info,
            })
        }
        _ => None,
    };

    Ok(Ecma119Layout {
        root,
        joliet_root,
        volume_space_size: end,
        path_table_size,
        path_table_l_block,
        path_table_m_block,
        joliet_path_table_size,
        joliet_path_table_l_block,
        joliet_path_table_m_block,
        registry,
        dir_plans,
        dir_extent_blocks,
        joliet_extent_blocks,
        ce_blocks,
        eltorito,
    })
}

fn find_ecma_node_for(root: &Rc<Ecma119Node>, target: &NodeRef) -> Option<Rc<Ecma119Node>> {
    if let Some(src) = &root.source {
        if Rc::ptr_eq(src, target) {
            return Some(root.clone());
        }
    }
    for child in root.children.borrow().iter() {
        if let Some(found) = find_ecma_node_for(child, target) {
            return Some(found);
        }
    }
    None
}

fn any_aaip_present(node: &Rc<Ecma119Node>) -> bool {
    if let Some(src) = &node.source {
        if aaip::payload(src.borrow().attributes()).is_some() {
            return true;
        }
    }
    node.children.borrow().iter().any(any_aaip_present)
}

fn build_dir_plans(
    node: &Rc<Ecma119Node>,
    parent: Option<&Rc<Ecma119Node>>,
    is_root: bool,
    any_aaip: bool,
    rockridge: bool,
    out: &mut HashMap<usize, DirPlan>,
) {
    if !node.is_dir {
        return;
    }
    let dot = if rockridge {
        rockridge::plan_dot(node, is_root, any_aaip)
    } else {
        SuspPlan::default()
    };
    let dotdot = if rockridge {
        match parent {
            Some(p) => rockridge::plan_dotdot(node, p),
            None => rockridge::plan_dotdot(node, node),
        }
    } else {
        SuspPlan::default()
    };
    let children: Vec<SuspPlan> = node
        .children
        .borrow()
        .iter()
        .map(|c| if rockridge { rockridge::plan_child(c) } else { SuspPlan::default() })
        .collect();
    out.insert(Rc::as_ptr(node) as usize, DirPlan { dot, dotdot, children });
    for child in node.children.borrow().iter() {
        if child.is_dir {
            build_dir_plans(child, Some(node), false, any_aaip, rockridge, out);
        }
    }
}

fn blocks_for_bytes(len: u32) -> u32 {
    let block_size = u32::from(BLOCK_SIZE);
    (len + block_size - 1) / block_size.max(1)
}

/// Directory record length (fixed header + identifier, padded to even) plus `susp_len` bytes of
/// inline SUSP payload. ECMA-119 §9.1; Joliet records call this with `susp_len = 0`.
fn dir_record_len(name_len: usize, susp_len: u32) -> u32 {
    let mut base = 33u32 + name_len as u32;
    if base % 2 != 0 {
        base += 1;
    }
    base + susp_len
}

/// Packs directory records into whole blocks without letting one straddle a block boundary
/// (ECMA-119 §6.8.1.1), padding with zeros wherever a record wouldn't otherwise fit. Used both to
/// size a directory's extent in pass 1 (with placeholder-length dummy records) and to assemble the
/// real bytes in pass 3, so the two always agree.
fn pack_records(records: &[Vec<u8>]) -> Vec<u8> {
    let block_size = usize::from(BLOCK_SIZE);
    let mut out = Vec::new();
    let mut used = 0usize;
    for rec in records {
        if used + rec.len() > block_size {
            out.resize(out.len() + (block_size - used), 0);
            used = 0;
        }
        out.extend_from_slice(rec);
        used += rec.len();
    }
    if used > 0 {
        out.resize(out.len() + (block_size - used), 0);
    }
    out
}

fn walk_dirs(node: &Rc<Ecma119Node>, f: &mut impl FnMut(&Rc<Ecma119Node>)) {
    if node.is_dir {
        f(node);
        for child in node.children.borrow().iter() {
            if child.is_dir {
                walk_dirs(child, f);
            }
        }
    }
}

fn walk_joliet_dirs(node: &Rc<JolietNode>, f: &mut impl FnMut(&Rc<JolietNode>)) {
    if node.is_dir {
        f(node);
        for child in node.children.borrow().iter() {
            if child.is_dir {
                walk_joliet_dirs(child, f);
            }
        }
    }
}

fn push_record_len(lens: &mut Vec<usize>, name_len: usize, plan: &SuspPlan) -> Result<()> {
    let fixed = dir_record_len(name_len, 0);
    rockridge::check_record_len(fixed as usize, plan.total_len() as usize)?;
    lens.push((fixed + plan.total_len()) as usize);
    Ok(())
}

fn assign_dir_blocks(
    node: &Rc<Ecma119Node>,
    next_block: &mut u32,
    dir_plans: &mut HashMap<usize, DirPlan>,
    extent_blocks: &mut HashMap<usize, u32>,
    ce_blocks: &mut HashMap<usize, u32>,
) -> Result<()> {
    if !node.is_dir {
        return Ok(());
    }
    let key = Rc::as_ptr(node) as usize;

    let (packed_len, ce_total) = {
        let plan = dir_plans.get(&key).expect("every directory has a plan");
        let mut lens = Vec::with_capacity(plan.children.len() + 2);
        push_record_len(&mut lens, 1, &plan.dot)?;
        push_record_len(&mut lens, 1, &plan.dotdot)?;
        for (child, cp) in node.children.borrow().iter().zip(plan.children.iter()) {
            push_record_len(&mut lens, child.name.len().max(1), cp)?;
        }
        let dummy: Vec<Vec<u8>> = lens.iter().map(|&l| vec![0u8; l]).collect();
        let packed = pack_records(&dummy);
        let ce_total =
            plan.dot.ce_len() + plan.dotdot.ce_len() + plan.children.iter().map(SuspPlan::ce_len).sum::<u32>();
        (packed.len() as u32, ce_total)
    };

    *node.block.borrow_mut() = Some(*next_block);
    let dir_blocks = (packed_len / u32::from(BLOCK_SIZE)).max(1);
    extent_blocks.insert(key, dir_blocks);
    *next_block += dir_blocks;

    if ce_total > 0 {
        let ce_block = *next_block;
        ce_blocks.insert(key, ce_block);
        *next_block += blocks_for_bytes(ce_total).max(1);

        let plan = dir_plans.get_mut(&key).expect("plan exists");
        let mut offset = 0u32;
        patch_ce_pointers(&mut plan.dot, ce_block, &mut offset);
        patch_ce_pointers(&mut plan.dotdot, ce_block, &mut offset);
        for child_plan in plan.children.iter_mut() {
            patch_ce_pointers(child_plan, ce_block, &mut offset);
        }
    }

    for child in node.children.borrow().iter() {
        if child.is_dir {
            assign_dir_blocks(child, next_block, dir_plans, extent_blocks, ce_blocks)?;
        }
    }
    Ok(())
}

fn patch_ce_pointers(plan: &mut SuspPlan, ce_block: u32, offset: &mut u32) {
    if !plan.needs_ce() {
        return;
    }
    let len = plan.ce_len();
    for entry in plan.entries.iter_mut() {
        if entry.bytes.len() >= 2 && &entry.bytes[0..2] == b"CE" {
            rockridge::patch_ce_pointer(&mut entry.bytes, ce_block, *offset, len);
        }
    }
    *offset += len;
}

/// Patches every `CL` entry (in a placeholder's row within its original parent) and `PL` entry (in
/// a relocated directory's own `..` record) with the real block number now that both sides of the
/// relocation have been assigned their extents.
fn patch_relocations(node: &Rc<Ecma119Node>, parent: Option<&Rc<Ecma119Node>>, dir_plans: &mut HashMap<usize, DirPlan>) {
    if !node.is_dir {
        return;
    }
    if let Some(parent) = parent {
        if let Some(target) = node.relocated_target.borrow().as_ref().and_then(Weak::upgrade) {
            let target_block = target.block.borrow().unwrap_or(0);
            let parent_key = Rc::as_ptr(parent) as usize;
            let idx = parent.children.borrow().iter().position(|c| Rc::ptr_eq(c, node));
            if let (Some(plan), Some(idx)) = (dir_plans.get_mut(&parent_key), idx) {
                if let Some(child_plan) = plan.children.get_mut(idx) {
                    for entry in child_plan.entries.iter_mut() {
                        if entry.bytes.len() >= 2 && &entry.bytes[0..2] == b"CL" {
                            rockridge::patch_relocation_pointer(&mut entry.bytes, target_block);
                        }
                    }
                }
            }
        }
    }
    if let Some(real_parent) = node.real_parent.borrow().as_ref().and_then(Weak::upgrade) {
        let rp_block = real_parent.block.borrow().unwrap_or(0);
        let key = Rc::as_ptr(node) as usize;
        if let Some(plan) = dir_plans.get_mut(&key) {
            for entry in plan.dotdot.entries.iter_mut() {
                if entry.bytes.len() >= 2 && &entry.bytes[0..2] == b"PL" {
                    rockridge::patch_relocation_pointer(&mut entry.bytes, rp_block);
                }
            }
        }
    }
    for child in node.children.borrow().iter() {
        patch_relocations(child, Some(node), dir_plans);
    }
}

fn assign_joliet_dir_blocks(node: &Rc<JolietNode>, next_block: &mut u32, extent_blocks: &mut HashMap<usize, u32>) -> Result<()> {
    if !node.is_dir {
        return Ok(());
    }
    let dot_len = dir_record_len(1, 0);
    joliet::check_record_len(dot_len)?;
    let mut lens = vec![dot_len as usize, dot_len as usize];
    for child in node.children.borrow().iter() {
        let len = dir_record_len(child.name.len() * 2, 0);
        joliet::check_record_len(len)?;
        lens.push(len as usize);
    }
    let dummy: Vec<Vec<u8>> = lens.iter().map(|&l| vec![0u8; l]).collect();
    let blocks = (pack_records(&dummy).len() as u32 / u32::from(BLOCK_SIZE)).max(1);

    extent_blocks.insert(Rc::as_ptr(node) as usize, blocks);
    *node.block.borrow_mut() = Some(*next_block);
    *next_block += blocks;

    for child in node.children.borrow().iter() {
        if child.is_dir {
            assign_joliet_dir_blocks(child, next_block, extent_blocks)?;
        }
    }
    Ok(())
}

/// Pass 2: encodes the Primary Volume Descriptor, an optional Boot Record (El Torito) and
/// Supplementary Volume Descriptor (Joliet), and the Volume Descriptor Set Terminator.
pub fn write_vol_desc(layout: &Ecma119Layout, opts: &WriteOpts, volume_id: &str) -> Result<Vec<BlockBuffer>> {
    let mut out = Vec::new();
    out.push(encode_pvd(layout, opts, volume_id));
    if let Some(el) = &layout.eltorito {
        out.push(encode_boot_record(el.catalog_block));
    }
    if let Some(jr) = &layout.joliet_root {
        let creation = volume_creation_bytes(opts);
        let root_key = Rc::as_ptr(jr) as usize;
        let root_len = layout.joliet_extent_blocks.get(&root_key).copied().unwrap_or(1) * u32::from(BLOCK_SIZE);
        let root_block = jr.block.borrow().unwrap_or(0);
        out.push(joliet::encode_svd(
            volume_id,
            layout.volume_space_size,
            layout.joliet_path_table_size,
            layout.joliet_path_table_l_block,
            layout.joliet_path_table_m_block,
            root_block,
            root_len,
            creation,
        )?);
    }
    out.push(encode_terminator());
    Ok(out)
}

fn opts_now(opts: &WriteOpts) -> OffsetDateTime {
    if opts.replace_timestamps {
        OffsetDateTime::from_unix_timestamp(opts.timestamp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    } else {
        OffsetDateTime::now_utc()
    }
}

fn volume_creation_bytes(opts: &WriteOpts) -> [u8; 17] {
    let mut buf = [0u8; 17];
    encode_date_time_long(Some(opts_now(opts)), &mut buf);
    buf
}

fn encode_pvd(layout: &Ecma119Layout, opts: &WriteOpts, volume_id: &str) -> BlockBuffer {
    let mut buf = BlockBuffer::new();
    buf[0] = 1; // type code: primary
    buf[1..6].copy_from_slice(b"CD001");
    buf[6] = 1; // version

    write_a_chars(&mut buf[8..40], "");
    write_d_chars(&mut buf[40..72], volume_id);

    write_both_endian32(&mut buf[80..88], layout.volume_space_size);
    write_both_endian16(&mut buf[120..124], 1); // volume_set_size
    write_both_endian16(&mut buf[124..128], 1); // volume_sequence_number
    write_both_endian16(&mut buf[128..132], BLOCK_SIZE);

    write_both_endian32(&mut buf[132..140], layout.path_table_size);
    buf[140..144].copy_from_slice(&layout.path_table_l_block.to_le_bytes());
    buf[144..148].copy_from_slice(&0u32.to_le_bytes()); // optional L path table
    buf[148..152].copy_from_slice(&layout.path_table_m_block.to_be_bytes());
    buf[152..156].copy_from_slice(&0u32.to_be_bytes()); // optional M path table

    encode_root_record(&mut buf[156..190], layout);

    write_d_chars(&mut buf[190..318], ""); // volume set id
    write_a_chars(&mut buf[318..446], ""); // publisher id
    write_a_chars(&mut buf[446..574], ""); // data preparer id
    write_a_chars(&mut buf[574..702], ""); // application id
    write_d_chars(&mut buf[702..739], ""); // copyright file id
    write_d_chars(&mut buf[739..776], ""); // abstract file id
    write_d_chars(&mut buf[776..813], ""); // bibliographic file id

    let creation = volume_creation_bytes(opts);
    let no_timestamp = {
        let mut t = [0u8; 17];
        encode_date_time_long(None, &mut t);
        t
    };
    buf[813..830].copy_from_slice(&creation);
    buf[830..847].copy_from_slice(&creation);
    buf[847..864].copy_from_slice(&no_timestamp);
    buf[864..881].copy_from_slice(&no_timestamp);

    buf[881] = 1; // file structure version
    buf
}

fn encode_root_record(buf: &mut [u8], layout: &Ecma119Layout) {
    let block = layout.root.block.borrow().unwrap_or(0);
    let len =
        layout.dir_extent_blocks.get(&(Rc::as_ptr(&layout.root) as usize)).copied().unwrap_or(1) * u32::from(BLOCK_SIZE);
    buf[0] = 34;
    buf[2..6].copy_from_slice(&block.to_le_bytes());
    buf[6..10].copy_from_slice(&block.to_be_bytes());
    buf[10..14].copy_from_slice(&len.to_le_bytes());
    buf[14..18].copy_from_slice(&len.to_be_bytes());
    let mut date_buf = [0u8; 7];
    encode_date_time_short(OffsetDateTime::now_utc(), &mut date_buf);
    buf[18..25].copy_from_slice(&date_buf);
    buf[25] = 0x02; // directory flag
    buf[28..30].copy_from_slice(&1u16.to_le_bytes());
    buf[30..32].copy_from_slice(&1u16.to_be_bytes());
    buf[32] = 1; // name length
    buf[33] = 0; // root identifier: single 0x00 byte
}

fn encode_boot_record(catalog_block: u32) -> BlockBuffer {
    let mut buf = BlockBuffer::new();
    buf[0] = 0; // type code: boot record
    buf[1..6].copy_from_slice(b"CD001");
    buf[6] = 1;
    let mut id = [0u8; 32];
    let label = b"EL TORITO SPECIFICATION";
    id[..label.len()].copy_from_slice(label);
    buf[7..39].copy_from_slice(&id);
    buf[71..75].copy_from_slice(&catalog_block.to_le_bytes());
    buf
}

fn encode_terminator() -> BlockBuffer {
    let mut buf = BlockBuffer::new();
    buf[0] = 255;
    buf[1..6].copy_from_slice(b"CD001");
    buf[6] = 1;
    buf
}

fn write_d_chars(dst: &mut [u8], s: &str) {
    for b in dst.iter_mut() {
        *b = b' ';
    }
    let bytes = s.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
}

fn write_a_chars(dst: &mut [u8], s: &str) {
    write_d_chars(dst, s);
}

fn write_both_endian16(dst: &mut [u8], v: u16) {
    dst[0..2].copy_from_slice(&v.to_le_bytes());
    dst[2..4].copy_from_slice(&v.to_be_bytes());
}

fn write_both_endian32(dst: &mut [u8], v: u32) {
    dst[0..4].copy_from_slice(&v.to_le_bytes());
    dst[4..8].copy_from_slice(&v.to_be_bytes());
}

fn node_mtime(node: &Rc<Ecma119Node>) -> OffsetDateTime {
    node.source.as_ref().map(|s| s.borrow().attributes().mtime).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn joliet_mtime(node: &Rc<JolietNode>) -> OffsetDateTime {
    node.source.as_ref().map(|s| s.borrow().attributes().mtime).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn encode_dir_record(name: &[u8], extent_block: u32, data_len: u32, is_dir: bool, mtime: OffsetDateTime, susp_inline: &[u8]) -> Vec<u8> {
    let fixed = dir_record_len(name.len().max(1), 0) as usize;
    let mut out = vec![0u8; fixed + susp_inline.len()];
    out[2..6].copy_from_slice(&extent_block.to_le_bytes());
    out[6..10].copy_from_slice(&extent_block.to_be_bytes());
    out[10..14].copy_from_slice(&data_len.to_le_bytes());
    out[14..18].copy_from_slice(&data_len.to_be_bytes());
    let mut date_buf = [0u8; 7];
    encode_date_time_short(mtime, &mut date_buf);
    out[18..25].copy_from_slice(&date_buf);
    out[25] = if is_dir { 0x02 } else { 0x00 };
    out[28..30].copy_from_slice(&1u16.to_le_bytes());
    out[30..32].copy_from_slice(&1u16.to_be_bytes());
    out[32] = name.len() as u8;
    out[33..33 + name.len()].copy_from_slice(name);
    out[fixed..].copy_from_slice(susp_inline);
    out[0] = out.len() as u8;
    out
}

fn is_boot_catalog_entry(child: &Rc<Ecma119Node>, layout: &Ecma119Layout) -> bool {
    match (&child.source, &layout.eltorito) {
        (Some(src), Some(el)) => Rc::ptr_eq(src, &el.catalog_node),
        _ => false,
    }
}

fn child_location(child: &Rc<Ecma119Node>, layout: &Ecma119Layout, self_dir_block: u32) -> (u32, u32, bool) {
    if child.is_dir {
        let len = layout.dir_extent_blocks.get(&(Rc::as_ptr(child) as usize)).copied().unwrap_or(1) * u32::from(BLOCK_SIZE);
        (child.block.borrow().unwrap_or(0), len, true)
    } else if let Some(fs) = &child.file_src {
        (fs.assigned_block().unwrap_or(0), fs.size as u32, false)
    } else if is_boot_catalog_entry(child, layout) {
        let block = layout.eltorito.as_ref().map(|e| e.catalog_block).unwrap_or(0);
        (block, u32::from(BLOCK_SIZE), false)
    } else {
        (self_dir_block, 0, false)
    }
}

fn build_directory_extent(node: &Rc<Ecma119Node>, parent: Option<&Rc<Ecma119Node>>, plan: &DirPlan, layout: &Ecma119Layout) -> Vec<u8> {
    let self_block = node.block.borrow().unwrap_or(0);
    let self_len = layout.dir_extent_blocks.get(&(Rc::as_ptr(node) as usize)).copied().unwrap_or(1) * u32::from(BLOCK_SIZE);
    let parent_node = parent.unwrap_or(node);
    let parent_block = parent_node.block.borrow().unwrap_or(0);
    let parent_len =
        layout.dir_extent_blocks.get(&(Rc::as_ptr(parent_node) as usize)).copied().unwrap_or(1) * u32::from(BLOCK_SIZE);

    let (dot_inline, _) = rockridge::write_record(&plan.dot);
    let (dotdot_inline, _) = rockridge::write_record(&plan.dotdot);

    let mut records = Vec::with_capacity(plan.children.len() + 2);
    records.push(encode_dir_record(&[0u8], self_block, self_len, true, node_mtime(node), &dot_inline));
    records.push(encode_dir_record(&[1u8], parent_block, parent_len, true, node_mtime(parent_node), &dotdot_inline));

    for (child, child_plan) in node.children.borrow().iter().zip(plan.children.iter()) {
        let (inline, _) = rockridge::write_record(child_plan);
        let (block, len, is_dir) = child_location(child, layout, self_block);
        records.push(encode_dir_record(child.name.as_bytes(), block, len, is_dir, node_mtime(child), &inline));
    }

    pack_records(&records)
}

fn build_ce_extent(plan: &DirPlan) -> Vec<u8> {
    let mut out = Vec::new();
    for p in std::iter::once(&plan.dot).chain(std::iter::once(&plan.dotdot)).chain(plan.children.iter()) {
        let (_, ce) = rockridge::write_record(p);
        out.extend_from_slice(&ce);
    }
    let block_size = usize::from(BLOCK_SIZE);
    let pad = (block_size - (out.len() % block_size)) % block_size;
    out.extend(std::iter::repeat(0u8).take(pad));
    out
}

fn joliet_child_location(child: &Rc<JolietNode>, layout: &Ecma119Layout) -> (u32, u32, bool) {
    if child.is_dir {
        let len = layout.joliet_extent_blocks.get(&(Rc::as_ptr(child) as usize)).copied().unwrap_or(1) * u32::from(BLOCK_SIZE);
        (child.block.borrow().unwrap_or(0), len, true)
    } else if let Some(fs) = &child.file_src {
        (fs.assigned_block().unwrap_or(0), fs.size as u32, false)
    } else {
        (0, 0, false)
    }
}

fn build_joliet_directory_extent(node: &Rc<JolietNode>, parent: Option<&Rc<JolietNode>>, layout: &Ecma119Layout) -> Vec<u8> {
    let self_block = node.block.borrow().unwrap_or(0);
    let self_len = layout.joliet_extent_blocks.get(&(Rc::as_ptr(node) as usize)).copied().unwrap_or(1) * u32::from(BLOCK_SIZE);
    let parent_node = parent.unwrap_or(node);
    let parent_block = parent_node.block.borrow().unwrap_or(0);
    let parent_len =
        layout.joliet_extent_blocks.get(&(Rc::as_ptr(parent_node) as usize)).copied().unwrap_or(1) * u32::from(BLOCK_SIZE);

    let mut records = Vec::new();
    records.push(encode_dir_record(&[0u8], self_block, self_len, true, joliet_mtime(node), &[]));
    records.push(encode_dir_record(&[1u8], parent_block, parent_len, true, joliet_mtime(parent_node), &[]));

    for child in node.children.borrow().iter() {
        let (block, len, is_dir) = joliet_child_location(child, layout);
        let mut name_bytes = Vec::with_capacity(child.name.len() * 2);
        for unit in &child.name {
            name_bytes.extend_from_slice(&unit.to_be_bytes());
        }
        records.push(encode_dir_record(&name_bytes, block, len, is_dir, joliet_mtime(child), &[]));
    }
    pack_records(&records)
}

fn collect_ecma_path_entries(root: &Rc<Ecma119Node>) -> Vec<(Vec<u8>, u32, u16)> {
    let mut out = Vec::new();
    let mut queue: VecDeque<(Rc<Ecma119Node>, u16)> = VecDeque::new();
    queue.push_back((root.clone(), 1));
    while let Some((node, parent_number)) = queue.pop_front() {
        let number = (out.len() + 1) as u16;
        let name = if out.is_empty() { Vec::new() } else { node.name.as_bytes().to_vec() };
        let block = node.block.borrow().unwrap_or(0);
        out.push((name, block, parent_number));
        for child in node.children.borrow().iter() {
            if child.is_dir {
                queue.push_back((child.clone(), number));
            }
        }
    }
    out
}

fn collect_joliet_path_entries(root: &Rc<JolietNode>) -> Vec<(Vec<u8>, u32, u16)> {
    let mut out = Vec::new();
    let mut queue: VecDeque<(Rc<JolietNode>, u16)> = VecDeque::new();
    queue.push_back((root.clone(), 1));
    while let Some((node, parent_number)) = queue.pop_front() {
        let number = (out.len() + 1) as u16;
        let name = if out.is_empty() {
            Vec::new()
        } else {
            let mut bytes = Vec::with_capacity(node.name.len() * 2);
            for unit in &node.name {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            bytes
        };
        let block = node.block.borrow().unwrap_or(0);
        out.push((name, block, parent_number));
        for child in node.children.borrow().iter() {
            if child.is_dir {
                queue.push_back((child.clone(), number));
            }
        }
    }
    out
}

fn encode_path_table(entries: &[(Vec<u8>, u32, u16)], little_endian: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, block, parent_number) in entries {
        let name_len = name.len().max(1);
        out.push(name_len as u8);
        out.push(0);
        if little_endian {
            out.extend_from_slice(&block.to_le_bytes());
            out.extend_from_slice(&parent_number.to_le_bytes());
        } else {
            out.extend_from_slice(&block.to_be_bytes());
            out.extend_from_slice(&parent_number.to_be_bytes());
        }
        if name.is_empty() {
            out.push(0);
        } else {
            out.extend_from_slice(name);
        }
        if name_len % 2 != 0 {
            out.push(0);
        }
    }
    out
}

/// Pass 3: streams the whole image, in block order, to `sink`.
pub fn write_data(layout: Ecma119Layout, opts: WriteOpts, vol_desc: Vec<BlockBuffer>, mut sink: impl Write, msg_sink: &dyn MessageSink) -> Result<()> {
    let _ = msg_sink;
    produce_blocks(&layout, &opts, &vol_desc, &mut sink)
}

fn produce_blocks(layout: &Ecma119Layout, opts: &WriteOpts, vol_desc: &[BlockBuffer], sink: &mut impl Write) -> Result<()> {
    let block_size = usize::from(BLOCK_SIZE);

    let mut first_block = vec![0u8; block_size];
    if let Some(blob) = &opts.isohybrid_mbr {
        let mbr = eltorito::stamp_isohybrid_mbr(blob, layout.volume_space_size)?;
        first_block[..512].copy_from_slice(&mbr);
    }
    sink.write_all(&first_block)?;
    for _ in 1..SYSTEM_AREA_BLOCKS {
        sink.write_all(&vec![0u8; block_size])?;
    }

    for block in vol_desc {
        sink.write_all(block)?;
    }

    let pt_blocks = blocks_for_bytes(layout.path_table_size) as usize;
    let ecma_entries = collect_ecma_path_entries(&layout.root);
    let mut l_table = encode_path_table(&ecma_entries, true);
    l_table.resize(pt_blocks * block_size, 0);
    sink.write_all(&l_table)?;
    let mut m_table = encode_path_table(&ecma_entries, false);
    m_table.resize(pt_blocks * block_size, 0);
    sink.write_all(&m_table)?;

    if let Some(jr) = &layout.joliet_root {
        let jpt_blocks = blocks_for_bytes(layout.joliet_path_table_size) as usize;
        let joliet_entries = collect_joliet_path_entries(jr);
        let mut jl_table = encode_path_table(&joliet_entries, true);
        jl_table.resize(jpt_blocks * block_size, 0);
        sink.write_all(&jl_table)?;
        let mut jm_table = encode_path_table(&joliet_entries, false);
        jm_table.resize(jpt_blocks * block_size, 0);
        sink.write_all(&jm_table)?;
    }

    write_ecma_dir_extents(&layout.root, None, layout, sink)?;
    if let Some(jr) = &layout.joliet_root {
        write_joliet_dir_extents(jr, None, layout, sink)?;
    }

    if let Some(el) = &layout.eltorito {
        let cat = eltorito::encode_catalog_block(&el.image, el.boot_image_block)?;
        sink.write_all(&cat)?;
    }

    let mut entries = layout.registry.entries();
    entries.sort_by_key(|e| e.assigned_block().unwrap_or(u32::MAX));
    for entry in entries {
        if entry.prev_block.is_some() {
            continue;
        }
        write_file_content(&entry, layout.eltorito.as_ref(), sink)?;
    }

    Ok(())
}

fn write_ecma_dir_extents(node: &Rc<Ecma119Node>, parent: Option<&Rc<Ecma119Node>>, layout: &Ecma119Layout, sink: &mut impl Write) -> Result<()> {
    if !node.is_dir {
        return Ok(());
    }
    let key = Rc::as_ptr(node) as usize;
    let plan = layout.dir_plans.get(&key).expect("every directory has a plan");
    let block_count = layout.dir_extent_blocks.get(&key).copied().unwrap_or(1);

    let mut extent_bytes = build_directory_extent(node, parent, plan, layout);
    extent_bytes.resize(block_count as usize * usize::from(BLOCK_SIZE), 0);
    sink.write_all(&extent_bytes)?;

    if layout.ce_blocks.contains_key(&key) {
        sink.write_all(&build_ce_extent(plan))?;
    }

    for child in node.children.borrow().iter() {
        if child.is_dir {
            write_ecma_dir_extents(child, Some(node), layout, sink)?;
        }
    }
    Ok(())
}

fn write_joliet_dir_extents(node: &Rc<JolietNode>, parent: Option<&Rc<JolietNode>>, layout: &Ecma119Layout, sink: &mut impl Write) -> Result<()> {
    if !node.is_dir {
        return Ok(());
    }
    let key = Rc::as_ptr(node) as usize;
    let block_count = layout.joliet_extent_blocks.get(&key).copied().unwrap_or(1);

    let mut extent_bytes = build_joliet_directory_extent(node, parent, layout);
    extent_bytes.resize(block_count as usize * usize::from(BLOCK_SIZE), 0);
    sink.write_all(&extent_bytes)?;

    for child in node.children.borrow().iter() {
        if child.is_dir {
            write_joliet_dir_extents(child, Some(node), layout, sink)?;
        }
    }
    Ok(())
}

fn write_file_content(entry: &Rc<FileSrc>, el: Option<&ResolvedEltorito>, sink: &mut impl Write) -> Result<()> {
    let block_size = usize::from(BLOCK_SIZE);
    let total_len = entry.block_count() as usize * block_size;

    if let Some(el) = el {
        if el.patch_isolinux && Rc::ptr_eq(&entry.stream, &el.image.stream) {
            entry.stream.open()?;
            let mut bytes = vec![0u8; entry.size as usize];
            let mut filled = 0;
            while filled < bytes.len() {
                let n = entry.stream.read(&mut bytes[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            entry.stream.close()?;
            bytes.truncate(filled);
            eltorito::patch_isolinux_boot_info_table(&mut bytes, SYSTEM_AREA_BLOCKS, entry.assigned_block().unwrap_or(0));
            bytes.resize(total_len, 0);
            sink.write_all(&bytes)?;
            return Ok(());
        }
    }

    entry.stream.open()?;
    let mut written = 0usize;
    let mut buf = vec![0u8; block_size];
    while written < entry.size as usize {
        let n = entry.stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])?;
        written += n;
    }
    entry.stream.close()?;
    let pad = total_len.saturating_sub(written);
    if pad > 0 {
        sink.write_all(&vec![0u8; pad])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ecma119::tree,
        message::NullSink,
        node::{File, Image, Node},
        parse::susp::PosixFileMode,
        stream::MemoryStream,
    };
    use std::cell::RefCell;

    #[test]
    fn blocks_for_bytes_rounds_up() {
        assert_eq!(blocks_for_bytes(1), 1);
        assert_eq!(blocks_for_bytes(2048), 1);
        assert_eq!(blocks_for_bytes(2049), 2);
    }

    #[test]
    fn dir_record_len_is_even_and_includes_susp() {
        assert_eq!(dir_record_len(1, 0) % 2, 0);
        assert_eq!(dir_record_len(1, 0), 34);
        assert_eq!(dir_record_len(1, 10), 44);
    }

    #[test]
    fn pack_records_pads_to_block_boundary() {
        let records = vec![vec![0u8; 40], vec![0u8; 40]];
        let packed = pack_records(&records);
        assert_eq!(packed.len() % usize::from(BLOCK_SIZE), 0);
    }

    #[test]
    fn path_table_numbers_root_first() {
        let image = Image::new();
        let root = image.root();
        let dir = Rc::new(RefCell::new(Node::Dir(crate::node::Dir::new(
            "SUBDIR",
            PosixFileMode::from_bits_truncate(0o755),
        ))));
        image.tree_add_node(&root, dir).unwrap();

        let opts = WriteOpts::default();
        let sink = NullSink;
        let mut registry = FileSrcRegistry::new();
        let tree = tree::build_tree(&root, &opts, &mut registry, &sink).unwrap();
        *tree.block.borrow_mut() = Some(20);
        for child in tree.children.borrow().iter() {
            *child.block.borrow_mut() = Some(21);
        }

        let entries = collect_ecma_path_entries(&tree);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, 20);
        assert_eq!(entries[0].2, 1); // root's parent number is itself, 1
        assert_eq!(entries[1].2, 1); // SUBDIR's parent is root, directory number 1
    }

    #[test]
    fn writes_minimal_image_with_correct_pvd_signature() {
        let image = Image::new();
        let root = image.root();
        let file = Rc::new(RefCell::new(Node::File(File::new(
            "readme.txt",
            PosixFileMode::from_bits_truncate(0o644),
            Rc::new(MemoryStream::new(b"hello world".to_vec())),
        ))));
        image.tree_add_node(&root, file).unwrap();

        let opts = WriteOpts::default();
        let sink = NullSink;
        let mut registry = FileSrcRegistry::new();
        let ecma_tree = tree::build_tree(&root, &opts, &mut registry, &sink).unwrap();
        let layout = compute_data_blocks(ecma_tree, None, registry, &opts, &sink).unwrap();
        let vol_desc = write_vol_desc(&layout, &opts, "TESTVOL").unwrap();

        let mut out = Vec::new();
        write_data(layout, opts, vol_desc, &mut out, &sink).unwrap();

        assert_eq!(out.len() % usize::from(BLOCK_SIZE), 0);
        let pvd_offset = usize::from(BLOCK_SIZE) * usize::from(SYSTEM_AREA_BLOCKS);
        assert_eq!(out[pvd_offset], 1);
        assert_eq!(&out[pvd_offset + 1..pvd_offset + 6], b"CD001");
    }

    #[test]
    fn joliet_tree_gets_its_own_path_tables_and_extents() {
        let image = Image::new();
        let root = image.root();
        let file = Rc::new(RefCell::new(Node::File(File::new(
            "readme.txt",
            PosixFileMode::from_bits_truncate(0o644),
            Rc::new(MemoryStream::new(b"hi".to_vec())),
        ))));
        image.tree_add_node(&root, file).unwrap();

        let mut opts = WriteOpts::default();
        opts.joliet = true;
        let sink = NullSink;
        let mut registry = FileSrcRegistry::new();
        let ecma_tree = tree::build_tree(&root, &opts, &mut registry, &sink).unwrap();
        let joliet_tree = joliet::build_tree(&root, &opts, &mut registry, &sink).unwrap();
        let layout = compute_data_blocks(ecma_tree, Some(joliet_tree), registry, &opts, &sink).unwrap();
        let vol_desc = write_vol_desc(&layout, &opts, "TESTVOL").unwrap();
        assert_eq!(vol_desc.len(), 3); // PVD, SVD, terminator

        let mut out = Vec::new();
        write_data(layout, opts, vol_desc, &mut out, &sink).unwrap();
        assert_eq!(out.len() % usize::from(BLOCK_SIZE), 0);
    }
}
