// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! A bounded, block-granularity single-producer/single-consumer buffer decoupling the writer
//! thread (pass 3 of [`crate::ecma119::writer`]) from whatever [`std::io::Write`] sink the caller
//! hands the image to.
//!
//! Grounded on libisofs's `IsoRingBuffer`: a fixed-capacity circular buffer of `BLOCK_SIZE` slots,
//! guarded by one mutex and two condition variables (one the writer waits on for "not full", one
//! the reader waits on for "not empty"), with independent close semantics for each side so a
//! reader that no longer wants data can unblock a writer stuck on a full buffer, and a writer that
//! has finished can unblock a reader waiting on more data that will never come.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

use crate::BLOCK_SIZE;

/// Default buffer capacity in blocks: 2 MiB / [`BLOCK_SIZE`], matching libisofs's `BUFFER_SIZE`.
pub const DEFAULT_CAPACITY_BLOCKS: usize = 1024;

struct State {
    blocks: VecDeque<Box<[u8]>>,
    capacity: usize,
    writer_closed: bool,
    reader_closed: bool,
    times_full: u64,
    times_empty: u64,
}

/// A bounded channel of `BLOCK_SIZE`-byte blocks with independent writer/reader close semantics.
pub struct RingBuffer {
    state: Mutex<State>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl RingBuffer {
    /// Creates a buffer holding at most `capacity_blocks` blocks of [`BLOCK_SIZE`] bytes each.
    pub fn new(capacity_blocks: usize) -> RingBuffer {
        RingBuffer {
            state: Mutex::new(State {
                blocks: VecDeque::with_capacity(capacity_blocks.min(64)),
                capacity: capacity_blocks.max(1),
                writer_closed: false,
                reader_closed: false,
                times_full: 0,
                times_empty: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Writes one block of exactly [`BLOCK_SIZE`] bytes. Blocks while the buffer is full.
    ///
    /// Returns `true` if the block was accepted, `false` if the reader has closed its end and the
    /// writer should stop producing further blocks.
    pub fn write_block(&self, block: &[u8]) -> bool {
        debug_assert_eq!(block.len(), usize::from(BLOCK_SIZE));
        let mut state = self.state.lock().expect("ring buffer mutex poisoned");
        loop {
            if state.reader_closed {
                return false;
            }
            if state.blocks.len() < state.capacity {
                break;
            }
            state.times_full += 1;
            state = self
                .not_full
                .wait(state)
                .expect("ring buffer mutex poisoned");
        }
        state.blocks.push_back(block.to_vec().into_boxed_slice());
        self.not_empty.notify_one();
        true
    }

    /// Reads one block into `dest`, which must be exactly [`BLOCK_SIZE`] bytes. Blocks while the
    /// buffer is empty and the writer has not closed.
    ///
    /// Returns `true` if a block was read, `false` on end-of-stream (the writer closed and the
    /// buffer has drained).
    pub fn read_block(&self, dest: &mut [u8]) -> bool {
        debug_assert_eq!(dest.len(), usize::from(BLOCK_SIZE));
        let mut state = self.state.lock().expect("ring buffer mutex poisoned");
        loop {
            if let Some(block) = state.blocks.pop_front() {
                dest.copy_from_slice(&block);
                self.not_full.notify_one();
                return true;
            }
            if state.writer_closed {
                return false;
            }
            state.times_empty += 1;
            state = self
                .not_empty
                .wait(state)
                .expect("ring buffer mutex poisoned");
        }
    }

    /// Called by the writer once no more blocks will be produced. Wakes any blocked reader.
    pub fn writer_close(&self) {
        let mut state = self.state.lock().expect("ring buffer mutex poisoned");
        state.writer_closed = true;
        self.not_empty.notify_all();
    }

    /// Called by the reader (or the consumer driving it) to stop accepting data early. Wakes any
    /// blocked writer.
    pub fn reader_close(&self) {
        let mut state = self.state.lock().expect("ring buffer mutex poisoned");
        state.reader_closed = true;
        self.not_full.notify_all();
    }

    /// Number of times a writer had to block because the buffer was full.
    pub fn times_full(&self) -> u64 {
        self.state.lock().expect("ring buffer mutex poisoned").times_full
    }

    /// Number of times a reader had to block because the buffer was empty.
    pub fn times_empty(&self) -> u64 {
        self.state.lock().expect("ring buffer mutex poisoned").times_empty
    }
}

impl Default for RingBuffer {
    fn default() -> RingBuffer {
        RingBuffer::new(DEFAULT_CAPACITY_BLOCKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_thread_round_trip() {
        let rb = RingBuffer::new(4);
        let block = vec![7u8; usize::from(BLOCK_SIZE)];
        assert!(rb.write_block(&block));
        let mut out = vec![0u8; usize::from(BLOCK_SIZE)];
        assert!(rb.read_block(&mut out));
        assert_eq!(out, block);
    }

    #[test]
    fn writer_close_unblocks_reader() {
        let rb = Arc::new(RingBuffer::new(4));
        rb.writer_close();
        let mut out = vec![0u8; usize::from(BLOCK_SIZE)];
        assert!(!rb.read_block(&mut out));
    }

    #[test]
    fn reader_close_unblocks_writer() {
        let rb = Arc::new(RingBuffer::new(1));
        let block = vec![1u8; usize::from(BLOCK_SIZE)];
        assert!(rb.write_block(&block));
        rb.reader_close();
        assert!(!rb.write_block(&block));
    }

    #[test]
    fn producer_consumer_threads() {
        let rb = Arc::new(RingBuffer::new(2));
        let producer_rb = rb.clone();
        let producer = thread::spawn(move || {
            for i in 0..16u8 {
                let block = vec![i; usize::from(BLOCK_SIZE)];
                assert!(producer_rb.write_block(&block));
            }
            producer_rb.writer_close();
        });

        let mut received = Vec::new();
        let mut buf = vec![0u8; usize::from(BLOCK_SIZE)];
        while rb.read_block(&mut buf) {
            received.push(buf[0]);
        }
        producer.join().unwrap();
        assert_eq!(received, (0..16u8).collect::<Vec<_>>());
    }
}
