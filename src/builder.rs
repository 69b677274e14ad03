// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Turns a [`FileSystem`](crate::fs::FileSystem) tree into nodes in the logical tree: a
//! [`NodeBuilder`] converting one resolved entry at a time, and [`add_dir_rec`] driving a
//! recursive directory walk over it (excludes, hidden-file and special-kind filtering, an
//! optional cancellation callback, and a [`ReplacePolicy`] for conflicts with nodes already
//! present at the destination).
//!
//! Grounded on `original_source/libisofs/tree.c`'s `iso_add_dir_src_rec`/`iso_tree_add_dir_rec`
//! (the recursive walk, its three filters in `check_excludes`/`check_hidden`/`check_special`, and
//! the report-callback cancellation) and `src/builder.c`'s `default_node_builder`'s per-mode
//! dispatch (the stat-mode-to-node-variant decision `NodeBuilder` makes here).

#[allow(unused)]
use log::{debug, trace, warn};

use std::{path::PathBuf, rc::Rc};

use crate::{
    error::{ImageError, Result},
    fs::{FileSystem, SourceKind, SourceMetadata},
    message::{Message, MessageSink, Severity},
    node::{Dir, File, Image, Node, NodeRef, Special, Symlink},
    options::ReplacePolicy,
    parse::susp::PosixFileMode,
};

/// Converts one resolved [`FileSystem`] entry into a logical [`Node`], choosing the variant from
/// `meta.kind` the way libisofs's default node builder switches on `st_mode & S_IFMT`.
///
/// A caller with its own notion of "what a node for this path should look like" (e.g. applying a
/// filter stream to certain extensions) can swap this out; the type exists mostly so `add_dir_rec`
/// has a single seam to call through, matching `IsoNodeBuilder`'s role in the original.
pub struct NodeBuilder;

impl NodeBuilder {
    /// Builds a node for `meta` at `path`, reading its content/link-target/device id from `fs` as
    /// needed. The returned node has no parent yet; the caller inserts it.
    pub fn build(fs: &dyn FileSystem, path: &std::path::Path, meta: &SourceMetadata) -> Result<NodeRef> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(ImageError::Precondition("path has no valid UTF-8 file name"))?
            .to_string();

        let node = match meta.kind {
            SourceKind::Dir => {
                let mut dir = Dir::new(name, meta.mode);
                dir.attributes.uid = meta.uid();
                dir.attributes.gid = meta.gid();
                dir.attributes.atime = meta.atime;
                dir.attributes.mtime = meta.mtime;
                dir.attributes.ctime = meta.ctime;
                Node::Dir(dir)
            }
            SourceKind::File => {
                let stream = fs.open_stream(path, meta)?;
                let mut file = File::new(name, meta.mode, stream);
                file.attributes.uid = meta.uid();
                file.attributes.gid = meta.gid();
                file.attributes.atime = meta.atime;
                file.attributes.mtime = meta.mtime;
                file.attributes.ctime = meta.ctime;
                Node::File(file)
            }
            SourceKind::Symlink => {
                let target = fs.read_link(path)?;
                let mut link = Symlink::new(name, target);
                link.attributes.uid = meta.uid();
                link.attributes.gid = meta.gid();
                link.attributes.atime = meta.atime;
                link.attributes.mtime = meta.mtime;
                link.attributes.ctime = meta.ctime;
                Node::Symlink(link)
            }
            SourceKind::Special => {
                // `SourceMetadata` doesn't carry rdev directly (not every `FileSystem` has one);
                // a local-disk `FileSystem` willing to support device nodes folds it into `mode`'s
                // reserved bits or resolves it itself before calling `build`. Treated as 0 here,
                // matching a `FileSystem` implementation that cannot report it.
                let mut special = Special::new(name, meta.mode, 0);
                special.attributes.uid = meta.uid();
                special.attributes.gid = meta.gid();
                special.attributes.atime = meta.atime;
                special.attributes.mtime = meta.mtime;
                special.attributes.ctime = meta.ctime;
                Node::Special(special)
            }
        };

        Ok(Rc::new(std::cell::RefCell::new(node)))
    }
}

/// Resolves a conflict between an already-present child named `name` in `parent` and a freshly
/// built node that would replace it, per `policy`. Returns `true` if the new node should be
/// inserted (replacing the old one, which the caller removes first).
fn resolve_replace(policy: ReplacePolicy, existing: &NodeRef, incoming: &NodeRef) -> bool {
    match policy {
        ReplacePolicy::Never | ReplacePolicy::Ask => false,
        ReplacePolicy::Always => true,
        ReplacePolicy::IfNewer => {
            incoming.borrow().attributes().mtime > existing.borrow().attributes().mtime
        }
    }
}

/// Recursively adds the contents of `fs_dir` (a path resolved against `fs`) as children of
/// `parent`, applying `image`'s exclude/hidden/special-kind policies, `image.follow_symlinks`, and
/// `replace` for name conflicts.
///
/// `report`, if given, is called with each candidate path before it is built; returning `false`
/// skips that one entry (its subtree, if a directory) without treating it as an error, matching
/// `IsoImage`'s optional report callback. A recoverable error (an unreadable child, a name
/// conflict under [`ReplacePolicy::Never`]) is reported to `msg_sink` at [`Severity::Sorry`] or
/// [`Severity::Warning`] and the walk continues; only an error reading `fs_dir` itself is fatal.
pub fn add_dir_rec(
    image: &Image,
    parent: &NodeRef,
    fs: &dyn FileSystem,
    fs_dir: &std::path::Path,
    replace: ReplacePolicy,
    msg_sink: &dyn MessageSink,
    mut report: Option<&mut dyn FnMut(&std::path::Path) -> bool>,
) -> Result<()> {
    let children = fs.read_dir(fs_dir).map_err(|e| {
        msg_sink.report(&Message::new(
            Severity::Sorry,
            1000,
            format!("can't read dir {}: {e}", fs_dir.display()),
        ));
        e
    })?;

    for child_name in children {
        let full_path = fs_dir.join(&child_name);

        let path_str = full_path.to_string_lossy().replace('\\', "/");
        if image.is_excluded(&path_str) {
            trace!("skipping excluded path {path_str}");
            continue;
        }

        let name = match child_name.to_str() {
            Some(n) => n,
            None => {
                msg_sink.report(&Message::new(
                    Severity::Sorry,
                    1001,
                    format!("skipping non-UTF-8 file name under {}", fs_dir.display()),
                ));
                continue;
            }
        };
        if image.is_hidden_by_policy(name) {
            trace!("skipping hidden path {path_str}");
            continue;
        }

        let meta = match fs.get_by_path(&full_path, image.follow_symlinks) {
            Ok(m) => m,
            Err(e) => {
                msg_sink.report(&Message::new(
                    Severity::Sorry,
                    1002,
                    format!("can't stat {}: {e}", full_path.display()),
                ));
                continue;
            }
        };

        if meta.kind == SourceKind::Special && image.is_special_excluded(meta.mode) {
            trace!("skipping special file {path_str}");
            continue;
        }

        if let Some(cb) = report.as_deref_mut() {
            if !cb(&full_path) {
                continue;
            }
        }

        let new_node = match NodeBuilder::build(fs, &full_path, &meta) {
            Ok(n) => n,
            Err(e) => {
                msg_sink.report(&Message::new(
                    Severity::Sorry,
                    1003,
                    format!("error building node for {}: {e}", full_path.display()),
                ));
                continue;
            }
        };

        let existing = parent.borrow().as_dir().and_then(|d| d.get(name).cloned());
        let inserted = match existing {
            Some(existing) => {
                if resolve_replace(replace, &existing, &new_node) {
                    image.tree_remove_node(parent, name);
                    Some(image.tree_add_node(parent, new_node.clone())?)
                } else {
                    msg_sink.report(&Message::new(
                        Severity::Update,
                        1004,
                        format!("skipping {path_str}, a node with that name already exists"),
                    ));
                    None
                }
            }
            None => Some(image.tree_add_node(parent, new_node.clone())?),
        };

        if inserted.is_some() && meta.kind == SourceKind::Dir {
            add_dir_rec(image, &new_node, fs, &full_path, replace, msg_sink, report.as_deref_mut())?;
        }
    }

    Ok(())
}

/// Resolves `fs_path` against `fs` and adds it (recursively, if a directory) under `parent`.
/// Convenience wrapper mirroring `iso_tree_add_dir_rec`'s single-call ergonomics over
/// [`add_dir_rec`].
pub fn add_path_rec(
    image: &Image,
    parent: &NodeRef,
    fs: &dyn FileSystem,
    fs_path: impl Into<PathBuf>,
    replace: ReplacePolicy,
    msg_sink: &dyn MessageSink,
) -> Result<()> {
    let fs_path = fs_path.into();
    let meta = fs.get_by_path(&fs_path, true)?;
    if meta.kind != SourceKind::Dir {
        return Err(ImageError::Precondition("fs_path does not name a directory"));
    }
    add_dir_rec(image, parent, fs, &fs_path, replace, msg_sink, None)
}

/// Adds a single entry (file, directory, symlink, or special node — not recursively) at `fs_path`
/// as a child of `parent`, mirroring `iso_tree_add_node`.
pub fn add_node(
    image: &Image,
    parent: &NodeRef,
    fs: &dyn FileSystem,
    fs_path: impl Into<PathBuf>,
) -> Result<NodeRef> {
    let fs_path = fs_path.into();
    let meta = fs.get_by_path(&fs_path, image.follow_symlinks)?;
    let node = NodeBuilder::build(fs, &fs_path, &meta)?;
    image.tree_add_node(parent, node)
}

/// One leaf or combinator in the find-conditions algebra (§4.1): `Name` (glob), `ModeMask`,
/// `Uid`/`Gid`, a timestamp comparison against one of the three POSIX times, and the boolean
/// combinators `And`/`Or`/`Not`. Mirrors `IsoFindCondition`'s `matches` vtable, collapsed into a
/// single recursive enum since Rust doesn't need the C side's manual vtable-plus-free-function
/// dance to get dynamic dispatch.
pub enum Condition {
    /// Node name matches a shell-style glob (`?`, `*`, `[...]`).
    Name(String),
    /// `node.mode & mask != 0`.
    ModeMask(PosixFileMode),
    /// `node.uid == uid`.
    Uid(u32),
    /// `node.gid == gid`.
    Gid(u32),
    /// A timestamp comparison.
    Time(TimeField, TimeOp, time::OffsetDateTime),
    /// Both sub-conditions match.
    And(Box<Condition>, Box<Condition>),
    /// Either sub-condition matches.
    Or(Box<Condition>, Box<Condition>),
    /// The sub-condition does not match.
    Not(Box<Condition>),
}

/// Which of a node's three POSIX timestamps a [`Condition::Time`] compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Atime,
    Mtime,
    Ctime,
}

/// Comparison operator for a [`Condition::Time`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOp {
    Greater,
    GreaterOrEqual,
    Equal,
    Less,
    LessOrEqual,
}

impl Condition {
    /// Evaluates this condition against `node`.
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Condition::Name(pattern) => crate::node::glob_match(pattern, node.name()),
            Condition::ModeMask(mask) => node.attributes().mode.intersects(*mask),
            Condition::Uid(uid) => node.attributes().uid == *uid,
            Condition::Gid(gid) => node.attributes().gid == *gid,
            Condition::Time(field, op, value) => {
                let attrs = node.attributes();
                let ts = match field {
                    TimeField::Atime => attrs.atime,
                    TimeField::Mtime => attrs.mtime,
                    TimeField::Ctime => attrs.ctime,
                };
                match op {
                    TimeOp::Greater => ts > *value,
                    TimeOp::GreaterOrEqual => ts >= *value,
                    TimeOp::Equal => ts == *value,
                    TimeOp::Less => ts < *value,
                    TimeOp::LessOrEqual => ts <= *value,
                }
            }
            Condition::And(a, b) => a.matches(node) && b.matches(node),
            Condition::Or(a, b) => a.matches(node) || b.matches(node),
            Condition::Not(inner) => !inner.matches(node),
        }
    }
}

/// Lazily filters `dir`'s children by `cond`, without materializing a matched list up front.
///
/// `has_next` is one-sided ("there may be more") rather than exact, the same simplification
/// libisofs's own `find_iter_has_next` took (its authors flagged the precise version as
/// unimplemented): it reports whether the underlying child iterator has more entries, not whether
/// any of them will match `cond`. A caller that needs to know "is there a match remaining" should
/// call `next()` and check for `None` instead of trusting `has_next`.
pub struct FindIter<'a> {
    children: std::slice::Iter<'a, NodeRef>,
    cond: &'a Condition,
}

impl<'a> FindIter<'a> {
    /// One-sided "the underlying iterator may still produce entries" check; see the type's docs
    /// for why this isn't an exact "a match remains" predicate.
    pub fn has_next(&self) -> bool {
        self.children.len() > 0
    }
}

impl<'a> Iterator for FindIter<'a> {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        for child in self.children.by_ref() {
            if cond_matches_ref(self.cond, child) {
                return Some(child.clone());
            }
        }
        None
    }
}

fn cond_matches_ref(cond: &Condition, node: &NodeRef) -> bool {
    cond.matches(&node.borrow())
}

/// Returns an iterator over `dir`'s children matching `cond`, mirroring `iso_dir_find_children`.
pub fn dir_find_children<'a>(dir: &'a Dir, cond: &'a Condition) -> FindIter<'a> {
    FindIter {
        children: dir.children_slice(),
        cond,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::LocalFileSystem,
        message::NullSink,
        node::Image,
        stream::MemoryStream,
    };
    use std::fs;

    fn make_tmp_tree() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("isoimage-builder-test-{}-{}", std::process::id(), rand_suffix()));
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("a.txt"), b"hello").unwrap();
        fs::write(dir.join(".hidden"), b"secret").unwrap();
        fs::write(dir.join("sub/b.txt"), b"world").unwrap();
        dir
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    #[test]
    fn add_dir_rec_builds_tree_and_skips_hidden() {
        let tmp = make_tmp_tree();
        let fs = LocalFileSystem::new(&tmp);
        let mut image = Image::new();
        image.ignore_hidden = true;
        let root = image.root();
        let sink = NullSink;

        add_path_rec(&image, &root, &fs, "", ReplacePolicy::Never, &sink).unwrap();

        let root_ref = root.borrow();
        let dir = root_ref.as_dir().unwrap();
        assert!(dir.get("a.txt").is_some());
        assert!(dir.get(".hidden").is_none());
        let sub = dir.get("sub").unwrap();
        let sub_ref = sub.borrow();
        assert!(sub_ref.as_dir().unwrap().get("b.txt").is_some());

        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn excludes_skip_matching_paths() {
        let tmp = make_tmp_tree();
        let fs = LocalFileSystem::new(&tmp);
        let mut image = Image::new();
        image.excludes.push("a.txt".to_string());
        let root = image.root();
        let sink = NullSink;

        add_path_rec(&image, &root, &fs, "", ReplacePolicy::Never, &sink).unwrap();

        let root_ref = root.borrow();
        assert!(root_ref.as_dir().unwrap().get("a.txt").is_none());
        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn replace_never_keeps_existing_node() {
        let image = Image::new();
        let root = image.root();
        let original = Rc::new(std::cell::RefCell::new(Node::File(File::new(
            "a.txt",
            PosixFileMode::from_bits_truncate(0o644),
            Rc::new(MemoryStream::new(b"old".to_vec())),
        ))));
        image.tree_add_node(&root, original.clone()).unwrap();

        let incoming = Rc::new(std::cell::RefCell::new(Node::File(File::new(
            "a.txt",
            PosixFileMode::from_bits_truncate(0o644),
            Rc::new(MemoryStream::new(b"new".to_vec())),
        ))));
        assert!(!resolve_replace(ReplacePolicy::Never, &original, &incoming));
        assert!(resolve_replace(ReplacePolicy::Always, &original, &incoming));
    }

    #[test]
    fn find_name_glob_matches() {
        let image = Image::new();
        let root = image.root();
        for name in ["readme.txt", "readme.md", "LICENSE"] {
            let node = Rc::new(std::cell::RefCell::new(Node::File(File::new(
                name,
                PosixFileMode::from_bits_truncate(0o644),
                Rc::new(MemoryStream::new(Vec::new())),
            ))));
            image.tree_add_node(&root, node).unwrap();
        }

        let root_ref = root.borrow();
        let dir = root_ref.as_dir().unwrap();
        let cond = Condition::Name("readme.*".to_string());
        let matched: Vec<String> = dir_find_children(dir, &cond).map(|n| n.borrow().name().to_string()).collect();
        assert_eq!(matched.len(), 2);
        assert!(matched.contains(&"readme.txt".to_string()));
        assert!(matched.contains(&"readme.md".to_string()));
    }

    #[test]
    fn find_and_or_not_combinators() {
        let image = Image::new();
        let root = image.root();
        let dir_node = Rc::new(std::cell::RefCell::new(Node::Dir(Dir::new(
            "sub",
            PosixFileMode::from_bits_truncate(0o755),
        ))));
        image.tree_add_node(&root, dir_node).unwrap();
        let file_node = Rc::new(std::cell::RefCell::new(Node::File(File::new(
            "file.txt",
            PosixFileMode::from_bits_truncate(0o644),
            Rc::new(MemoryStream::new(Vec::new())),
        ))));
        image.tree_add_node(&root, file_node).unwrap();

        let root_ref = root.borrow();
        let dir = root_ref.as_dir().unwrap();

        let only_files = Condition::ModeMask(PosixFileMode::TYPE_DIRECTORY).matches(&dir.get("sub").unwrap().borrow());
        assert!(only_files);

        let not_dirs = Condition::Not(Box::new(Condition::ModeMask(PosixFileMode::TYPE_DIRECTORY)));
        let matched: Vec<String> = dir_find_children(dir, &not_dirs).map(|n| n.borrow().name().to_string()).collect();
        assert_eq!(matched, vec!["file.txt".to_string()]);

        let either = Condition::Or(
            Box::new(Condition::Name("sub".to_string())),
            Box::new(Condition::Name("file.txt".to_string())),
        );
        let matched: Vec<String> = dir_find_children(dir, &either).map(|n| n.borrow().name().to_string()).collect();
        assert_eq!(matched.len(), 2);

        let neither = Condition::And(
            Box::new(Condition::Name("sub".to_string())),
            Box::new(Condition::Name("file.txt".to_string())),
        );
        assert_eq!(dir_find_children(dir, &neither).count(), 0);
    }
}
