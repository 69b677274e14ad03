// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Deduplicates file content across the logical tree and assigns each distinct piece of content
//! its block extent during pass 1 of the writer pipeline.
//!
//! Two [`File`](crate::node::File) nodes whose streams report the same
//! [`StreamIdentity`](crate::stream::StreamIdentity) are assumed to hold identical bytes (the
//! same inode on the same filesystem, or the same previously-written extent on a multi-session
//! disc) and are backed by one [`FileSrc`], written to the image exactly once. This mirrors
//! `original_source/src/node.h`'s `Iso_File.msblock`/`sort_weight` fields, generalized from a
//! single file to the registry that makes dedup possible.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::stream::{Stream, StreamIdentity};

/// One distinct piece of file content to be written into the image, shared by every
/// [`File`](crate::node::File) node whose stream reports the same identity.
pub struct FileSrc {
    /// The content.
    pub stream: Rc<dyn Stream>,
    /// Location of this content in a previous session's image, if this is an unmodified
    /// multi-session carry-over (no new extent is written; the old one is reused verbatim).
    pub prev_block: Option<u32>,
    /// Highest `sort_weight` among the nodes sharing this content; controls placement order
    /// within pass 1's data-block assignment (higher first).
    pub sort_weight: i32,
    /// The block this content was assigned to by pass 1. `None` until assigned.
    pub block: RefCell<Option<u32>>,
    /// Size in bytes, cached from the stream so pass 1 does not need to reopen it.
    pub size: u64,
}

impl FileSrc {
    fn new(stream: Rc<dyn Stream>, prev_block: Option<u32>, sort_weight: i32) -> FileSrc {
        let size = stream.size();
        FileSrc {
            stream,
            prev_block,
            sort_weight,
            block: RefCell::new(None),
            size,
        }
    }

    /// Number of [`crate::BLOCK_SIZE`] blocks this content occupies, rounded up.
    pub fn block_count(&self) -> u32 {
        let block_size = u64::from(crate::BLOCK_SIZE);
        ((self.size + block_size - 1) / block_size) as u32
    }

    /// The block this content was assigned, if pass 1 has run.
    pub fn assigned_block(&self) -> Option<u32> {
        *self.block.borrow()
    }
}

/// Registry mapping stream identity to a shared [`FileSrc`], built while the ECMA-119 tree is
/// constructed and consumed by the writer's `compute_data_blocks` pass.
#[derive(Default)]
pub struct FileSrcRegistry {
    by_identity: HashMap<StreamIdentity, Rc<FileSrc>>,
    no_identity: Vec<Rc<FileSrc>>,
}

impl FileSrcRegistry {
    /// Creates an empty registry.
    pub fn new() -> FileSrcRegistry {
        FileSrcRegistry::default()
    }

    /// Registers `stream`, returning the shared [`FileSrc`] for it: an existing entry if another
    /// node already registered a stream with the same identity, or a freshly created one.
    ///
    /// `sort_weight` is folded into the entry's effective weight as `max(existing, new)`, so the
    /// highest priority requested by any sharing node wins.
    pub fn register(
        &mut self,
        stream: Rc<dyn Stream>,
        prev_block: Option<u32>,
        sort_weight: i32,
    ) -> Rc<FileSrc> {
        match stream.identity() {
            Some(identity) => {
                if let Some(existing) = self.by_identity.get(&identity) {
                    if sort_weight > existing.sort_weight {
                        // sort_weight is read-only after construction elsewhere; a later
                        // registration with a higher weight simply wins by replacing the entry.
                        let replacement = Rc::new(FileSrc::new(stream, prev_block, sort_weight));
                        self.by_identity.insert(identity, replacement.clone());
                        return replacement;
                    }
                    return existing.clone();
                }
                let entry = Rc::new(FileSrc::new(stream, prev_block, sort_weight));
                self.by_identity.insert(identity, entry.clone());
                entry
            }
            None => {
                let entry = Rc::new(FileSrc::new(stream, prev_block, sort_weight));
                self.no_identity.push(entry.clone());
                entry
            }
        }
    }

    /// Every distinct content entry registered so far, in registration order followed by the
    /// no-identity entries.
    pub fn entries(&self) -> Vec<Rc<FileSrc>> {
        let mut out: Vec<Rc<FileSrc>> = self.by_identity.values().cloned().collect();
        out.extend(self.no_identity.iter().cloned());
        out
    }

    /// Assigns blocks to every registered entry that does not already have a `prev_block`,
    /// starting at `start_block` and packing sequentially in descending `sort_weight` order (ties
    /// broken by first-registration order), mirroring "higher weighting files are written at the
    /// beginning of image" from `Iso_File.sort_weight`'s original documentation.
    ///
    /// Returns the next free block after every assignment.
    pub fn assign_blocks(&self, start_block: u32) -> u32 {
        let mut entries = self.entries();
        entries.sort_by(|a, b| b.sort_weight.cmp(&a.sort_weight));

        let mut cursor = start_block;
        for entry in entries {
            if let Some(prev) = entry.prev_block {
                *entry.block.borrow_mut() = Some(prev);
                continue;
            }
            *entry.block.borrow_mut() = Some(cursor);
            cursor += entry.block_count();
        }
        cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    #[test]
    fn distinct_streams_get_distinct_blocks() {
        let mut reg = FileSrcRegistry::new();
        let a = reg.register(Rc::new(MemoryStream::new(vec![0u8; 4000])), None, 0);
        let b = reg.register(Rc::new(MemoryStream::new(vec![1u8; 100])), None, 0);
        reg.assign_blocks(100);
        assert_eq!(a.assigned_block(), Some(100));
        assert!(b.assigned_block().unwrap() > a.assigned_block().unwrap());
    }

    #[test]
    fn higher_weight_sorts_first() {
        let mut reg = FileSrcRegistry::new();
        let low = reg.register(Rc::new(MemoryStream::new(vec![0u8; 10])), None, 0);
        let high = reg.register(Rc::new(MemoryStream::new(vec![1u8; 10])), None, 5);
        reg.assign_blocks(16);
        assert!(high.assigned_block().unwrap() < low.assigned_block().unwrap());
    }

    #[test]
    fn prev_block_is_reused_verbatim() {
        let mut reg = FileSrcRegistry::new();
        let carried = reg.register(Rc::new(MemoryStream::new(vec![0u8; 10])), Some(42), 0);
        reg.assign_blocks(100);
        assert_eq!(carried.assigned_block(), Some(42));
    }
}
