// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! The logical tree: the in-memory filesystem image being assembled, independent of any on-disk
//! format. [`Image`] owns the root [`Node`]; every other node is reached through `Rc<RefCell<_>>`
//! sharing grounded on `original_source/src/node.h`'s `Iso_Node`/`Iso_Dir`/`Iso_File`/
//! `Iso_Symlink`/`Iso_Special` structs. The C side tracks an explicit `refcount` and an intrusive
//! `next` pointer list; here `Rc::strong_count` and an owning `Vec` on [`Dir`] do the same job.

#[allow(unused)]
use log::{debug, trace, warn};

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};
use time::OffsetDateTime;

use crate::{
    error::{ImageError, Result},
    parse::susp::{PosixAttributes, PosixFileMode},
    stream::Stream,
};

/// Bit flags selecting which special node kinds a recursive add should skip. Mirrors libisofs's
/// `IsoExcludeFlag`-adjacent "special" kind mask used by `check_special`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipSpecialMask {
    /// Skip FIFOs (named pipes).
    pub fifo: bool,
    /// Skip character devices.
    pub char_device: bool,
    /// Skip block devices.
    pub block_device: bool,
    /// Skip sockets.
    pub socket: bool,
}

/// A shared handle to a node in the logical tree.
pub type NodeRef = Rc<RefCell<Node>>;

/// Common POSIX-ish metadata every node carries, regardless of kind.
#[derive(Debug, Clone)]
pub struct NodeAttributes {
    /// Real name, expected to be valid UTF-8.
    pub name: String,
    /// `st_mode` permission bits (type bits are derived from the [`Node`] variant, not stored
    /// here, matching libisofs keeping `IsoNodeType` separate from `mode_t mode`).
    pub mode: PosixFileMode,
    /// `st_uid`.
    pub uid: u32,
    /// `st_gid`.
    pub gid: u32,
    /// `st_atime`.
    pub atime: OffsetDateTime,
    /// `st_mtime`.
    pub mtime: OffsetDateTime,
    /// `st_ctime`.
    pub ctime: OffsetDateTime,
    /// Whether this node should be omitted from every written directory hierarchy.
    pub hidden: bool,
    /// Opaque *extra info* entries keyed by extension identifier, allowing opt-in payloads (ACLs,
    /// xattrs) without touching the core node type. [`crate::aaip`] is the one consumer
    /// in this crate, storing a prebuilt AAIP component stream under [`crate::aaip::XINFO_KEY`];
    /// the map is otherwise opaque to the core node type, matching libisofs's `iso_node_xinfo`
    /// registration by function pointer.
    pub xinfo: HashMap<String, Rc<Vec<u8>>>,
}

impl NodeAttributes {
    /// A reasonable set of defaults for a synthetically created node (current time, mode 0755 for
    /// directories / 0644 for files is applied by the caller).
    pub fn new(name: impl Into<String>, mode: PosixFileMode) -> NodeAttributes {
        let now = OffsetDateTime::now_utc();
        NodeAttributes {
            name: name.into(),
            mode,
            uid: 0,
            gid: 0,
            atime: now,
            mtime: now,
            ctime: now,
            hidden: false,
            xinfo: HashMap::new(),
        }
    }
}

/// One entry in the logical tree.
pub enum Node {
    /// A directory: an ordered, name-unique collection of children.
    Dir(Dir),
    /// A regular file backed by a [`Stream`].
    File(File),
    /// A symbolic link.
    Symlink(Symlink),
    /// A block/char device, FIFO, or socket.
    Special(Special),
    /// A synthetic node created to hold the El Torito boot catalog / boot image; never present on
    /// the originating filesystem.
    BootPlaceholder(BootPlaceholder),
}

impl Node {
    /// Attributes common to every node kind.
    pub fn attributes(&self) -> &NodeAttributes {
        match self {
            Node::Dir(d) => &d.attributes,
            Node::File(f) => &f.attributes,
            Node::Symlink(s) => &s.attributes,
            Node::Special(s) => &s.attributes,
            Node::BootPlaceholder(b) => &b.attributes,
        }
    }

    /// Mutable attributes common to every node kind.
    pub fn attributes_mut(&mut self) -> &mut NodeAttributes {
        match self {
            Node::Dir(d) => &mut d.attributes,
            Node::File(f) => &mut f.attributes,
            Node::Symlink(s) => &mut s.attributes,
            Node::Special(s) => &mut s.attributes,
            Node::BootPlaceholder(b) => &mut b.attributes,
        }
    }

    /// The node's name. Convenience wrapper over [`Node::attributes`].
    pub fn name(&self) -> &str {
        &self.attributes().name
    }

    /// The parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<NodeRef> {
        match self {
            Node::Dir(d) => d.parent.as_ref().and_then(Weak::upgrade),
            Node::File(f) => f.parent.as_ref().and_then(Weak::upgrade),
            Node::Symlink(s) => s.parent.as_ref().and_then(Weak::upgrade),
            Node::Special(s) => s.parent.as_ref().and_then(Weak::upgrade),
            Node::BootPlaceholder(b) => b.parent.as_ref().and_then(Weak::upgrade),
        }
    }

    fn set_parent(&mut self, parent: Weak<RefCell<Node>>) {
        match self {
            Node::Dir(d) => d.parent = Some(parent),
            Node::File(f) => f.parent = Some(parent),
            Node::Symlink(s) => s.parent = Some(parent),
            Node::Special(s) => s.parent = Some(parent),
            Node::BootPlaceholder(b) => b.parent = Some(parent),
        }
    }

    /// Returns `Some(&Dir)` if this node is a directory.
    pub fn as_dir(&self) -> Option<&Dir> {
        match self {
            Node::Dir(d) => Some(d),
            _ => None,
        }
    }

    /// Returns `Some(&mut Dir)` if this node is a directory.
    pub fn as_dir_mut(&mut self) -> Option<&mut Dir> {
        match self {
            Node::Dir(d) => Some(d),
            _ => None,
        }
    }

    /// Returns `Some(&File)` if this node is a regular file.
    pub fn as_file(&self) -> Option<&File> {
        match self {
            Node::File(f) => Some(f),
            _ => None,
        }
    }
}

/// A directory: an ordered list of children, plus a name index enforcing sibling uniqueness.
///
/// Modeled after `Iso_Dir`'s `nchildren`/intrusive `children` list; the name → index map is the
/// Rust realization of a set of children keyed by name, with sibling-name uniqueness enforced
/// on insert and rename.
pub struct Dir {
    /// Common attributes.
    pub attributes: NodeAttributes,
    parent: Option<Weak<RefCell<Node>>>,
    children: Vec<NodeRef>,
    by_name: HashMap<String, usize>,
}

impl Dir {
    /// Creates a new, empty directory with the given name and mode.
    pub fn new(name: impl Into<String>, mode: PosixFileMode) -> Dir {
        Dir {
            attributes: NodeAttributes::new(name, mode | PosixFileMode::TYPE_DIRECTORY),
            parent: None,
            children: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True if this directory has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterates over direct children in their stable insertion/sort order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRef> {
        self.children.iter()
    }

    /// The same iteration as [`Dir::iter`], but as a concrete, nameable type (used by
    /// [`crate::builder::dir_find_children`], which stores the iterator in a struct field).
    pub fn children_slice(&self) -> std::slice::Iter<'_, NodeRef> {
        self.children.iter()
    }

    /// Looks up a direct child by name.
    pub fn get(&self, name: &str) -> Option<&NodeRef> {
        self.by_name.get(name).map(|&i| &self.children[i])
    }

    /// True if a direct child with this name already exists.
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Sorts children by name (ECMA-119 § 9.3 byte-value order of the eventual on-disk name is
    /// applied later by the ECMA-119 tree builder; this sort keeps iteration order stable and
    /// locale-independent in the logical tree itself).
    pub fn sort_by_name(&mut self) {
        self.children.sort_by(|a, b| {
            a.borrow().name().cmp(b.borrow().name())
        });
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_name.clear();
        for (i, child) in self.children.iter().enumerate() {
            self.by_name.insert(child.borrow().name().to_string(), i);
        }
    }

    fn insert_unindexed(&mut self, node: NodeRef) {
        let idx = self.children.len();
        let name = node.borrow().name().to_string();
        self.children.push(node);
        self.by_name.insert(name, idx);
    }

    fn remove_by_name(&mut self, name: &str) -> Option<NodeRef> {
        let idx = *self.by_name.get(name)?;
        let removed = self.children.remove(idx);
        self.reindex();
        Some(removed)
    }
}

/// A regular file, backed by a content [`Stream`].
pub struct File {
    /// Common attributes.
    pub attributes: NodeAttributes,
    parent: Option<Weak<RefCell<Node>>>,
    /// Location of the file's first extent on a previous session's image, or `None` for a newly
    /// added file. Mirrors `Iso_File.msblock`.
    pub msblock: Option<u32>,
    /// Higher-weighted files are written earlier in the image; default 0. Mirrors
    /// `Iso_File.sort_weight`.
    pub sort_weight: i32,
    /// The file's content.
    pub stream: Rc<dyn Stream>,
}

impl File {
    /// Creates a new file node from a content stream.
    pub fn new(name: impl Into<String>, mode: PosixFileMode, stream: Rc<dyn Stream>) -> File {
        File {
            attributes: NodeAttributes::new(name, mode | PosixFileMode::TYPE_FILE),
            parent: None,
            msblock: None,
            sort_weight: 0,
            stream,
        }
    }
}

/// A symbolic link.
pub struct Symlink {
    /// Common attributes.
    pub attributes: NodeAttributes,
    parent: Option<Weak<RefCell<Node>>>,
    /// The link's target, verbatim.
    pub target: String,
}

impl Symlink {
    /// Creates a new symlink node.
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Symlink {
        Symlink {
            attributes: NodeAttributes::new(name, PosixFileMode::TYPE_SYMLINK),
            parent: None,
            target: target.into(),
        }
    }
}

/// A block device, character device, FIFO, or socket. Mirrors `Iso_Special`.
pub struct Special {
    /// Common attributes. `attributes.mode`'s type bits select which kind this is.
    pub attributes: NodeAttributes,
    parent: Option<Weak<RefCell<Node>>>,
    /// `st_rdev` for block/char devices; meaningless otherwise.
    pub dev: u64,
}

impl Special {
    /// Creates a new special-file node.
    pub fn new(name: impl Into<String>, mode: PosixFileMode, dev: u64) -> Special {
        Special {
            attributes: NodeAttributes::new(name, mode),
            parent: None,
            dev,
        }
    }
}

/// A synthetic placeholder occupying the position where the El Torito boot catalog or a boot
/// image will be written. Never present on the source filesystem; created by
/// [`crate::eltorito::BootCatalog`] setup.
pub struct BootPlaceholder {
    /// Common attributes.
    pub attributes: NodeAttributes,
    parent: Option<Weak<RefCell<Node>>>,
    /// Content stream for a boot image placeholder; `None` for the catalog sector itself, whose
    /// bytes are produced directly by the El Torito writer.
    pub stream: Option<Rc<dyn Stream>>,
}

impl BootPlaceholder {
    /// Creates a new boot placeholder node (the catalog sector when `stream` is `None`, a boot
    /// image placeholder otherwise).
    pub fn new(name: impl Into<String>, mode: PosixFileMode, stream: Option<Rc<dyn Stream>>) -> BootPlaceholder {
        BootPlaceholder {
            attributes: NodeAttributes::new(name, mode | PosixFileMode::TYPE_FILE),
            parent: None,
            stream,
        }
    }
}

/// Owns the root of the logical tree and global per-image policy toggles.
///
/// Grounded on libisofs's `Iso_Image` plus the `iso_tree_set_*` global toggles from
/// `original_source/libisofs/tree.c`.
pub struct Image {
    root: NodeRef,
    /// Whether symlinks encountered while recursively adding a filesystem subtree should be
    /// followed (and their target added as a regular file/dir) instead of added as symlink nodes.
    pub follow_symlinks: bool,
    /// Whether dotfiles are skipped during a recursive add.
    pub ignore_hidden: bool,
    /// Which kinds of special files are skipped during a recursive add.
    pub ignore_special: SkipSpecialMask,
    /// Glob-style path exclusion patterns, checked against both the absolute source path and the
    /// path relative to the subtree root being added.
    pub excludes: Vec<String>,
}

impl Image {
    /// Creates a new, empty image with a fresh root directory.
    pub fn new() -> Image {
        let root = Dir::new("", PosixFileMode::from_bits_truncate(0o755));
        Image {
            root: Rc::new(RefCell::new(Node::Dir(root))),
            follow_symlinks: false,
            ignore_hidden: false,
            ignore_special: SkipSpecialMask::default(),
            excludes: Vec::new(),
        }
    }

    /// The root directory node.
    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    /// Checks `path` against every configured exclude pattern. An absolute pattern (leading `/`)
    /// must match the whole path; a relative pattern need only match one `/`-anchored suffix of
    /// it (so `"a.txt"` excludes `a.txt` at any depth, not just at the root), mirroring
    /// `check_excludes` in `original_source/libisofs/tree.c`.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excludes.iter().any(|pat| {
            if pat.starts_with('/') {
                glob_match(pat, path)
            } else {
                std::iter::once(path)
                    .chain(path.match_indices('/').map(|(i, _)| &path[i + 1..]))
                    .any(|suffix| glob_match(pat, suffix))
            }
        })
    }

    /// Checks whether `name` should be skipped under the current `ignore_hidden` policy.
    pub fn is_hidden_by_policy(&self, name: &str) -> bool {
        self.ignore_hidden && name.starts_with('.') && name != "." && name != ".."
    }

    /// Checks whether a special node of the given kind should be skipped under the current
    /// `ignore_special` policy.
    pub fn is_special_excluded(&self, mode: PosixFileMode) -> bool {
        let m = &self.ignore_special;
        (m.fifo && mode.contains(PosixFileMode::TYPE_PIPE))
            || (m.char_device && mode.contains(PosixFileMode::TYPE_CHAR_DEV))
            || (m.block_device && mode.contains(PosixFileMode::TYPE_BLOCK_DEV))
            || (m.socket && mode.contains(PosixFileMode::TYPE_SOCKET))
    }

    /// Adds `node` as a child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Invariant`] if `parent` is not a directory, or if a child with the
    /// same name already exists.
    pub fn tree_add_node(&self, parent: &NodeRef, node: NodeRef) -> Result<NodeRef> {
        let name = node.borrow().name().to_string();
        {
            let mut parent_mut = parent.borrow_mut();
            let dir = parent_mut
                .as_dir_mut()
                .ok_or(ImageError::Invariant("parent node is not a directory"))?;
            if dir.contains_name(&name) {
                return Err(ImageError::Invariant("duplicate sibling name"));
            }
            dir.insert_unindexed(node.clone());
        }
        node.borrow_mut().set_parent(Rc::downgrade(parent));
        Ok(node)
    }

    /// Removes the named child from `parent`, if present.
    pub fn tree_remove_node(&self, parent: &NodeRef, name: &str) -> Option<NodeRef> {
        parent
            .borrow_mut()
            .as_dir_mut()
            .and_then(|dir| dir.remove_by_name(name))
    }

    /// Resolves a `/`-separated path starting at the root to the node it names, if any.
    pub fn tree_path_to_node(&self, path: &str) -> Option<NodeRef> {
        let mut cur = self.root.clone();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let next = {
                let node = cur.borrow();
                let dir = node.as_dir()?;
                dir.get(component)?.clone()
            };
            cur = next;
        }
        Some(cur)
    }

    /// Computes the absolute `/`-separated path of `node` by walking parent links to the root.
    pub fn tree_get_node_path(&self, node: &NodeRef) -> String {
        let mut components = Vec::new();
        let mut cur = node.clone();
        loop {
            let parent = cur.borrow().parent();
            match parent {
                Some(p) => {
                    components.push(cur.borrow().name().to_string());
                    cur = p;
                }
                None => break,
            }
        }
        components.reverse();
        format!("/{}", components.join("/"))
    }
}

impl Default for Image {
    fn default() -> Image {
        Image::new()
    }
}

/// Minimal glob matcher supporting `*` and `?`, sufficient for exclude-pattern matching. Grounded
/// on the exclude-pattern semantics described for `check_excludes` in
/// `original_source/libisofs/tree.c` (shell-style glob, not full regex).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    fn rec(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => rec(&p[1..], t) || (!t.is_empty() && rec(p, &t[1..])),
            Some(b'?') => !t.is_empty() && rec(&p[1..], &t[1..]),
            Some(&c) => !t.is_empty() && t[0] == c && rec(&p[1..], &t[1..]),
        }
    }
    rec(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn mode(bits: u32) -> PosixFileMode {
        PosixFileMode::from_bits_truncate(bits)
    }

    #[test]
    fn add_and_lookup() {
        let image = Image::new();
        let root = image.root();
        let dir = Rc::new(RefCell::new(Node::Dir(Dir::new("docs", mode(0o755)))));
        image.tree_add_node(&root, dir.clone()).unwrap();
        assert!(image.tree_path_to_node("/docs").is_some());
        assert_eq!(image.tree_get_node_path(&dir), "/docs");
    }

    #[test]
    fn duplicate_name_rejected() {
        let image = Image::new();
        let root = image.root();
        let a = Rc::new(RefCell::new(Node::Dir(Dir::new("a", mode(0o755)))));
        let b = Rc::new(RefCell::new(Node::Dir(Dir::new("a", mode(0o755)))));
        image.tree_add_node(&root, a).unwrap();
        assert!(image.tree_add_node(&root, b).is_err());
    }

    #[test]
    fn file_under_dir_roundtrip() {
        let image = Image::new();
        let root = image.root();
        let stream = Rc::new(MemoryStream::new(b"hello".to_vec()));
        let file = Rc::new(RefCell::new(Node::File(File::new(
            "hello.txt",
            mode(0o644),
            stream,
        ))));
        image.tree_add_node(&root, file).unwrap();
        let found = image.tree_path_to_node("/hello.txt").unwrap();
        assert!(found.borrow().as_file().is_some());
    }

    #[test]
    fn glob_matches_suffix_patterns() {
        assert!(glob_match("*.o", "foo.o"));
        assert!(!glob_match("*.o", "foo.c"));
        assert!(glob_match("cache?", "cache1"));
    }
}
