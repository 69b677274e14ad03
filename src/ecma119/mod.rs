// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! The ECMA-119 image-building engine: builds the on-disk tree(s) from the logical tree, assigns
//! every directory and file its block extent, and streams the finished image.
//!
//! Grounded on `original_source/src/ecma119.c`'s `iso_image_writer`-driven pipeline: a caller
//! builds the logical tree with [`crate::node::Image`], then calls [`write_image`] to run the
//! three-pass writer (`src/ecma119/writer.rs`) over it.

pub mod names;
pub mod tree;
pub mod writer;

use std::io::Write;

use crate::{
    error::Result,
    filesrc::FileSrcRegistry,
    message::MessageSink,
    node::NodeRef,
    options::WriteOpts,
};

/// Builds and streams a complete ISO 9660 / ECMA-119 image (with Rock Ridge and/or Joliet
/// extensions per `opts`) for the logical tree rooted at `logical_root`, writing every byte to
/// `sink` in block order.
///
/// This is the single entry point most callers need; it simply sequences the three passes
/// ([`tree::build_tree`], [`writer::compute_data_blocks`], [`writer::write_vol_desc`],
/// [`writer::write_data`]) the way `iso_image_new`/`bs_write_data` do in `original_source/`.
pub fn write_image(
    logical_root: &NodeRef,
    opts: &WriteOpts,
    volume_id: &str,
    sink: impl Write,
    msg_sink: &dyn MessageSink,
) -> Result<()> {
    let mut registry = FileSrcRegistry::new();
    let root = tree::build_tree(logical_root, opts, &mut registry, msg_sink)?;
    let joliet_root = if opts.joliet {
        Some(crate::joliet::build_tree(logical_root, opts, &mut registry, msg_sink)?)
    } else {
        None
    };

    let layout = writer::compute_data_blocks(root, joliet_root, registry, opts, msg_sink)?;
    let vol_desc = writer::write_vol_desc(&layout, opts, volume_id);
    writer::write_data(layout, opts.clone(), vol_desc, sink, msg_sink)
}
