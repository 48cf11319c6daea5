//! Timed execution of raw executable memory.
//!
//! Every probe brackets its work with two `Instant` reads and nothing else:
//! no allocation, no logging, no locking between the captures. `Instant`
//! is monotonic (`CLOCK_MONOTONIC` on Linux) so wall-clock adjustments
//! cannot produce negative or inflated samples.

use crate::exec_memory::ExecutableRegion;
use std::hint::black_box;
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::time::{Duration, Instant};

/// An entry point inside an executable region.
///
/// Borrowing the region keeps the mapping alive for as long as the address
/// can be called.
#[derive(Debug, Clone, Copy)]
pub struct CodeAddress<'a> {
    ptr: *const u8,
    _region: PhantomData<&'a ExecutableRegion>,
}

impl<'a> CodeAddress<'a> {
    /// Entry point at `offset` bytes into `region`, or `None` if out of bounds.
    ///
    /// # Safety
    /// The bytes at `offset` must begin a valid instruction stream for the
    /// host that returns to its caller without touching the stack frame,
    /// e.g. the code laid down by [`crate::pattern::write`].
    pub unsafe fn in_region(region: &'a ExecutableRegion, offset: usize) -> Option<Self> {
        if offset >= region.size() {
            return None;
        }
        Some(Self {
            ptr: region.as_ptr().add(offset),
            _region: PhantomData,
        })
    }

    pub fn addr(&self) -> usize {
        self.ptr as usize
    }

    fn call(&self) -> u64 {
        // SAFETY: `in_region` requires the address to hold code that returns.
        let func: extern "C" fn() -> u64 = unsafe { mem::transmute(self.ptr) };
        func()
    }
}

/// A readable span of an executable region, for timing plain loads.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRange<'a> {
    ptr: *const usize,
    words: usize,
    _region: PhantomData<&'a ExecutableRegion>,
}

impl<'a> MemoryRange<'a> {
    /// The whole region. The base is page aligned, so every word is aligned.
    pub fn of(region: &'a ExecutableRegion) -> Self {
        Self {
            ptr: region.as_ptr() as *const usize,
            words: region.size() / mem::size_of::<usize>(),
            _region: PhantomData,
        }
    }

    /// From the word containing `offset` to the end of the region.
    pub fn from_offset(region: &'a ExecutableRegion, offset: usize) -> Option<Self> {
        if offset >= region.size() {
            return None;
        }
        let word = mem::size_of::<usize>();
        let first = offset / word;
        let whole = Self::of(region);
        Some(Self {
            // SAFETY: `first < whole.words`, so the pointer stays inside the mapping.
            ptr: unsafe { whole.ptr.add(first) },
            words: whole.words - first,
            _region: PhantomData,
        })
    }

    pub fn addr(&self) -> usize {
        self.ptr as usize
    }

    pub fn len_bytes(&self) -> usize {
        self.words * mem::size_of::<usize>()
    }
}

#[inline(always)]
fn nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

/// Calls `code` once and returns the elapsed nanoseconds.
#[inline(never)]
pub fn execute_and_time(code: CodeAddress<'_>) -> u64 {
    execute_and_time_with_value(code).0
}

/// Calls `code` once; returns the elapsed nanoseconds and whatever the
/// code left in the return register.
#[inline(never)]
pub fn execute_and_time_with_value(code: CodeAddress<'_>) -> (u64, u64) {
    let code = black_box(code);
    let start = Instant::now();
    let value = black_box(code.call());
    let elapsed = start.elapsed();
    (nanos(elapsed), value)
}

/// Times a single volatile load of the first machine word.
#[inline(never)]
pub fn read_word_and_time(range: MemoryRange<'_>) -> u64 {
    let range = black_box(range);
    let start = Instant::now();
    // SAFETY: the range borrows a live, readable, word-aligned mapping.
    let word = unsafe { ptr::read_volatile(range.ptr) };
    let elapsed = start.elapsed();
    black_box(word);
    nanos(elapsed)
}

/// Times volatile loads of every word in the range, in address order.
#[inline(never)]
pub fn read_page_and_time(range: MemoryRange<'_>) -> u64 {
    let range = black_box(range);
    let start = Instant::now();
    let mut acc = 0usize;
    for i in 0..range.words {
        // SAFETY: `i < words`, all within the borrowed mapping.
        acc ^= unsafe { ptr::read_volatile(range.ptr.add(i)) };
    }
    let elapsed = start.elapsed();
    black_box(acc);
    nanos(elapsed)
}
