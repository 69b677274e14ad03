// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Builds an image entirely in memory with the authoring engine and reads it back with the
//! ISO9660 reader, exercising the write → read round trip end to end without needing a
//! pre-existing fixture image.

use std::{cell::RefCell, io::Cursor, rc::Rc};

use cdfs::{
    ecma119,
    message::NullSink,
    node::{Dir, File, Image, Node, Symlink},
    options::WriteOpts,
    stream::MemoryStream,
    DirectoryEntry, PosixFileMode, ISO9660,
};

mod common;
use common::collect_filenames;

fn mode(bits: u32) -> PosixFileMode {
    PosixFileMode::from_bits_truncate(bits)
}

fn build_sample_image() -> Image {
    let image = Image::new();
    let root = image.root();

    let readme = Rc::new(RefCell::new(Node::File(File::new(
        "readme.txt",
        mode(0o644),
        Rc::new(MemoryStream::new(b"hello world".to_vec())),
    ))));
    image.tree_add_node(&root, readme).unwrap();

    let docs = Rc::new(RefCell::new(Node::Dir(Dir::new("docs", mode(0o755)))));
    let docs = image.tree_add_node(&root, docs).unwrap();

    let license = Rc::new(RefCell::new(Node::File(File::new(
        "license.txt",
        mode(0o644),
        Rc::new(MemoryStream::new(b"MIT OR Apache-2.0".to_vec())),
    ))));
    image.tree_add_node(&docs, license).unwrap();

    let link = Rc::new(RefCell::new(Node::Symlink(Symlink::new(
        "latest",
        "readme.txt",
    ))));
    image.tree_add_node(&root, link).unwrap();

    image
}

#[test]
fn level1_image_round_trips_through_reader() {
    let image = build_sample_image();
    let mut opts = WriteOpts::default();
    opts.rockridge = true;

    let mut out = Vec::new();
    ecma119::write_image(&image.root(), &opts, "ROUNDTRIP", &mut out, &NullSink).unwrap();
    assert_eq!(out.len() % usize::from(cdfs::BLOCK_SIZE), 0);

    let iso = ISO9660::new(Cursor::new(out)).unwrap();
    let names = collect_filenames(iso.root());
    assert!(names.iter().any(|n| n.eq_ignore_ascii_case("readme.txt")));

    let entry = iso
        .open("/readme.txt")
        .unwrap()
        .or_else(|| iso.open("/README.TXT").unwrap())
        .expect("readme should be reachable after round trip");
    match entry {
        DirectoryEntry::File(mut f) => {
            let mut buf = Vec::new();
            use std::io::Read;
            f.read().read_to_end(&mut buf).unwrap();
            assert_eq!(buf, b"hello world");
        }
        _ => panic!("expected a file"),
    }
}

#[test]
fn joliet_tree_preserves_long_mixed_case_names() {
    let image = build_sample_image();
    let mut opts = WriteOpts::default();
    opts.rockridge = true;
    opts.joliet = true;

    let mut out = Vec::new();
    ecma119::write_image(&image.root(), &opts, "ROUNDTRIP", &mut out, &NullSink).unwrap();

    let iso = ISO9660::new(Cursor::new(out)).unwrap();
    assert!(iso.is_rr());

    let sup_root = iso.root_at(1).expect("supplementary (Joliet) root should be present");
    let names = collect_filenames(sup_root);
    assert!(names.contains(&"docs".to_string()));
}

#[test]
fn two_files_with_identical_content_both_read_back_correctly() {
    let image = Image::new();
    let root = image.root();
    let shared = Rc::new(MemoryStream::new(b"same bytes".to_vec()));

    let a = Rc::new(RefCell::new(Node::File(File::new("a", mode(0o644), shared.clone()))));
    image.tree_add_node(&root, a).unwrap();
    let sub = Rc::new(RefCell::new(Node::Dir(Dir::new("sub", mode(0o755)))));
    let sub = image.tree_add_node(&root, sub).unwrap();
    let b = Rc::new(RefCell::new(Node::File(File::new("b", mode(0o644), shared))));
    image.tree_add_node(&sub, b).unwrap();

    let opts = WriteOpts::default();
    let mut out = Vec::new();
    ecma119::write_image(&image.root(), &opts, "DEDUP", &mut out, &NullSink).unwrap();

    let iso = ISO9660::new(Cursor::new(out)).unwrap();
    let a_entry = iso.open("/A").unwrap().expect("a exists");
    let b_entry = iso.open("/SUB/B").unwrap().expect("b exists");

    use std::io::Read;
    let read_file = |entry: DirectoryEntry<Cursor<Vec<u8>>>| match entry {
        DirectoryEntry::File(mut f) => {
            let mut buf = Vec::new();
            f.read().read_to_end(&mut buf).unwrap();
            buf
        }
        _ => panic!("expected file"),
    };

    assert_eq!(read_file(a_entry), b"same bytes");
    assert_eq!(read_file(b_entry), b"same bytes");
}
