// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Builds the on-disk ECMA-119 tree (`Ecma119Node`) from the logical tree (`crate::node::Node`).
//!
//! Grounded on `original_source/src/ecma119_tree.c`: `create_ecma119_node`/`create_dir`/
//! `create_file`/`create_tree` (recursive builder, skipping nodes whose path would exceed the
//! active depth/length caps, each skip reported through the message sink rather than aborting),
//! `cmp_node_name`/`sort_tree` (ECMA-119 §9.3 sibling sort), and the deep-directory relocation
//! scheme (RR_MOVED placeholder/CL/RE/PL). The original's own TODO comments mark reparenting and
//! mangling as unfinished there; this crate implements both in full.

#[allow(unused)]
use log::{debug, trace, warn};

use std::{
    cell::RefCell,
    collections::HashSet,
    rc::{Rc, Weak},
};

use crate::{
    ecma119::names::{self, ConformanceLevel, NameRelaxation},
    error::Result,
    filesrc::{FileSrc, FileSrcRegistry},
    message::{Message, MessageSink, Severity},
    node::{Node, NodeRef},
    options::WriteOpts,
};

/// ECMA-119's hard cap on directory nesting depth (root counts as depth 0; §6.8.2.1).
pub const MAX_DEPTH: usize = 8;
/// ECMA-119's cap on total path length, including separators (§6.8.2.1).
pub const MAX_PATH_LEN: usize = 255;

/// A node in the on-disk ECMA-119 tree, shadowing the logical [`Node`] it was built from.
pub struct Ecma119Node {
    /// The on-disk, already-mangled name.
    pub name: String,
    /// The logical node this was built from. `None` for the synthetic `RR_MOVED` directory.
    pub source: Option<NodeRef>,
    /// Children, present only for directories, in final §9.3 sort order.
    pub children: RefCell<Vec<Rc<Ecma119Node>>>,
    /// Content location, present only for files (shared with other hard-linked/deduped nodes via
    /// [`FileSrc`]).
    pub file_src: Option<Rc<FileSrc>>,
    /// Block this directory's own extent (its directory record table) was assigned to. Filled in
    /// by `compute_data_blocks`.
    pub block: RefCell<Option<u32>>,
    /// True if this is a directory.
    pub is_dir: bool,
    /// True if this is the synthetic `RR_MOVED` relocation directory or one of the placeholder
    /// entries inside it (§4.3's deep-directory relocation).
    pub is_relocated: bool,
    /// Set on a placeholder left at a relocated directory's original position: points at the
    /// directory that actually holds its children under `RR_MOVED`. Encoded as a `CL` entry.
    pub relocated_target: RefCell<Option<Weak<Ecma119Node>>>,
    /// Set on a directory that was moved under `RR_MOVED`: points back at the parent it would
    /// have had in its original position, so its `..` record can carry a `PL` entry there.
    pub real_parent: RefCell<Option<Weak<Ecma119Node>>>,
}

impl Ecma119Node {
    fn leaf(name: String, source: NodeRef, file_src: Option<Rc<FileSrc>>) -> Rc<Ecma119Node> {
        Rc::new(Ecma119Node {
            name,
            source: Some(source),
            children: RefCell::new(Vec::new()),
            file_src,
            block: RefCell::new(None),
            is_dir: false,
            is_relocated: false,
            relocated_target: RefCell::new(None),
            real_parent: RefCell::new(None),
        })
    }

    fn dir(name: String, source: Option<NodeRef>) -> Rc<Ecma119Node> {
        Rc::new(Ecma119Node {
            name,
            source,
            children: RefCell::new(Vec::new()),
            file_src: None,
            block: RefCell::new(None),
            is_dir: true,
            is_relocated: false,
            relocated_target: RefCell::new(None),
            real_parent: RefCell::new(None),
        })
    }

    /// True if this is a placeholder left behind by relocation (carries a `CL` entry).
    pub fn is_placeholder(&self) -> bool {
        self.relocated_target.borrow().is_some()
    }
}

/// Builds the full ECMA-119 tree rooted at `logical_root`, mangling names for uniqueness,
/// relocating directories that would exceed [`MAX_DEPTH`] into a synthetic `RR_MOVED` directory
/// under the root, and sorting every directory's children per ECMA-119 §9.3.
pub fn build_tree(
    logical_root: &NodeRef,
    opts: &WriteOpts,
    registry: &mut FileSrcRegistry,
    sink: &dyn MessageSink,
) -> Result<Rc<Ecma119Node>> {
    let level = if opts.iso_level <= 1 {
        ConformanceLevel::Level1
    } else {
        ConformanceLevel::Level2Or3
    };
    let relax = opts.name_relaxation();

    let root = Ecma119Node::dir(String::new(), Some(logical_root.clone()));
    let mut relocated = Vec::new();
    build_children(&root, logical_root, 1, String::new(), level, &relax, opts, registry, sink, &mut relocated)?;

    if !relocated.is_empty() {
        let rr_moved = Ecma119Node::dir("RR_MOVED".to_string(), None);
        *rr_moved.children.borrow_mut() = relocated;
        root.children.borrow_mut().push(rr_moved);
    }

    sort_tree(&root);
    Ok(root)
}

#[allow(clippy::too_many_arguments)]
fn build_children(
    parent: &Rc<Ecma119Node>,
    logical_parent: &NodeRef,
    depth: usize,
    path_so_far: String,
    level: ConformanceLevel,
    relax: &NameRelaxation,
    opts: &WriteOpts,
    registry: &mut FileSrcRegistry,
    sink: &dyn MessageSink,
    relocated_out: &mut Vec<Rc<Ecma119Node>>,
) -> Result<()> {
    let logical = logical_parent.borrow();
    let dir = match logical.as_dir() {
        Some(d) => d,
        None => return Ok(()),
    };

    let mut used_names: HashSet<String> = HashSet::new();
    let mut built = Vec::new();

    for child_ref in dir.iter() {
        let child = child_ref.borrow();
        if child.attributes().hidden {
            continue;
        }

        let is_dir = matches!(&*child, Node::Dir(_));
        let mut shaped = names::shape_name(child.name(), is_dir, level, relax);
        shaped = mangle_unique(&shaped, &mut used_names);

        let child_path = format!("{path_so_far}/{shaped}");
        if !opts.allow_longer_paths && child_path.len() > MAX_PATH_LEN {
            sink.report(&Message::new(
                Severity::Sorry,
                1001,
                format!("path '{child_path}' exceeds {MAX_PATH_LEN} bytes, skipping"),
            ));
            continue;
        }

        drop(child);
        match &*child_ref.borrow() {
            Node::Dir(_) => {
                let next_depth = depth + 1;
                if next_depth > MAX_DEPTH && !opts.allow_deep_paths {
                    sink.report(&Message::new(
                        Severity::Hint,
                        1002,
                        format!("'{child_path}' exceeds depth {MAX_DEPTH}, relocating under RR_MOVED"),
                    ));
                    let placeholder = Ecma119Node::dir(shaped.clone(), Some(child_ref.clone()));
                    built.push(placeholder.clone());
                    let real = Ecma119Node::dir(shaped, Some(child_ref.clone()));
                    build_children(&real, child_ref, 1, String::new(), level, relax, opts, registry, sink, relocated_out)?;
                    *placeholder.relocated_target.borrow_mut() = Some(Rc::downgrade(&real));
                    *real.real_parent.borrow_mut() = Some(Rc::downgrade(parent));
                    relocated_out.push(real);
                } else {
                    let node = Ecma119Node::dir(shaped, Some(child_ref.clone()));
                    build_children(&node, child_ref, next_depth, child_path, level, relax, opts, registry, sink, relocated_out)?;
                    built.push(node);
                }
            }
            Node::File(file) => {
                let file_src = registry.register(file.stream.clone(), file.msblock, file.sort_weight);
                built.push(Ecma119Node::leaf(shaped, child_ref.clone(), Some(file_src)));
            }
            Node::BootPlaceholder(boot) => {
                let file_src = boot
                    .stream
                    .as_ref()
                    .map(|stream| registry.register(stream.clone(), None, 0));
                built.push(Ecma119Node::leaf(shaped, child_ref.clone(), file_src));
            }
            Node::Symlink(_) | Node::Special(_) => {
                built.push(Ecma119Node::leaf(shaped, child_ref.clone(), None));
            }
        }
    }

    *parent.children.borrow_mut() = built;
    Ok(())
}

/// Appends a numeric suffix (`NAME1`, `NAME2`, ...) to `name` until it is unique within
/// `used_names`, truncating to make room for the suffix. A total function: always terminates
/// because the suffix space is unbounded even though the name length budget is fixed (the suffix
/// eventually displaces the entire stem if needed).
fn mangle_unique(name: &str, used_names: &mut HashSet<String>) -> String {
    if used_names.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, rest) = match name.find('.') {
        Some(idx) => (&name[..idx], &name[idx..]),
        None => (name, ""),
    };

    for n in 1u64.. {
        let suffix = n.to_string();
        let budget = stem.len().saturating_sub(suffix.len()).max(1);
        let truncated_stem = &stem[..budget.min(stem.len())];
        let candidate = format!("{truncated_stem}{suffix}{rest}");
        if used_names.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!("suffix space is unbounded")
}

/// Sorts every directory's children per ECMA-119 §9.3 (byte-value order of the on-disk name),
/// recursively. Mirrors `sort_tree`'s `cmp_node_name` + qsort.
fn sort_tree(node: &Rc<Ecma119Node>) {
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
    fn mangles_duplicate_names() {
        let mut used = HashSet::new();
        assert_eq!(mangle_unique("A", &mut used), "A");
        assert_eq!(mangle_unique("A", &mut used), "A1");
        assert_eq!(mangle_unique("A", &mut used), "A2");
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
}
