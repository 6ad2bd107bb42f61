//! Stack Segment Allocation
//!
//! A segment is one contiguous frame area `[base, limit)` with a bump
//! pointer `sp`; frames grow upward and `base <= sp <= limit` always
//! holds. Each meta-stack node owns exactly one segment.
//!
//! On Unix the full reservation is mapped `PROT_NONE` up front and pages
//! are committed on demand in page-rounded doublings, so a segment costs
//! address space until frames actually touch it. Elsewhere the reservation
//! is allocated eagerly from the host allocator; either way the block never
//! moves, which the interior pointers held by live frames depend on.

use std::ptr;

use crate::config;
use crate::fault::{self, Fault};
use crate::stats;

#[cfg(unix)]
use nix::libc;

/// A stack pointer: one past the topmost frame of a segment.
pub type Sp = *mut u8;

/// Alignment of segment base addresses on the fallback allocation path.
#[cfg(not(unix))]
const SEGMENT_ALIGN: usize = 16;

/// Round `value` up to the nearest multiple of `align` (a power of two).
#[cfg(unix)]
fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf(_SC_PAGESIZE) is always safe and returns a positive value.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// One contiguous stack segment.
///
/// Move-only; freed when dropped. The segment is owned 1:1 by the
/// meta-stack node containing it.
pub struct Segment {
    base: *mut u8,
    sp: *mut u8,
    limit: *mut u8,
    /// Bytes committed (readable/writable) from `base`.
    #[cfg(unix)]
    committed: usize,
}

impl Segment {
    /// Allocate a fresh segment using the configured reservation sizes.
    pub fn new() -> Segment {
        let segment = config::runtime_config().segment;
        Segment::with_reservation(segment.reserve, segment.commit)
    }

    /// Allocate a segment with an explicit reservation (Unix).
    #[cfg(unix)]
    fn with_reservation(reserve: usize, commit: usize) -> Segment {
        let ps = page_size();
        let reserved = round_up(reserve.max(ps), ps);
        let initial_commit = round_up(commit.max(1), ps).min(reserved);

        // Reserve address space with no access; pages are committed below.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                reserved,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            fault::fatal(Fault::OutOfMemory(reserved));
        }
        let base = base as *mut u8;

        let ret = unsafe {
            libc::mprotect(
                base as *mut libc::c_void,
                initial_commit,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if ret != 0 {
            unsafe {
                libc::munmap(base as *mut libc::c_void, reserved);
            }
            fault::fatal(Fault::OutOfMemory(initial_commit));
        }

        stats::record_segment_alloc();
        Segment {
            base,
            sp: base,
            limit: unsafe { base.add(reserved) },
            committed: initial_commit,
        }
    }

    /// Allocate a segment with an explicit reservation (fallback).
    ///
    /// The whole reservation is taken from the host allocator eagerly; the
    /// commit parameter is meaningless without page protection.
    #[cfg(not(unix))]
    fn with_reservation(reserve: usize, _commit: usize) -> Segment {
        let layout = match std::alloc::Layout::from_size_align(reserve, SEGMENT_ALIGN) {
            Ok(layout) => layout,
            Err(_) => fault::fatal(Fault::OutOfMemory(reserve)),
        };
        // SAFETY: layout has nonzero size (builder validation floors the reserve).
        let base = unsafe { std::alloc::alloc(layout) };
        if base.is_null() {
            fault::fatal(Fault::OutOfMemory(reserve));
        }
        stats::record_segment_alloc();
        Segment {
            base,
            sp: base,
            // SAFETY: base..base+reserve is the allocation just made.
            limit: unsafe { base.add(reserve) },
        }
    }

    /// The segment base (lowest frame address).
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// The current stack pointer.
    pub fn sp(&self) -> Sp {
        self.sp
    }

    /// One past the end of the reservation.
    pub fn limit(&self) -> *mut u8 {
        self.limit
    }

    /// Bytes of the segment currently holding frames.
    pub fn used(&self) -> usize {
        self.sp as usize - self.base as usize
    }

    /// Total reserved bytes.
    pub fn reserved(&self) -> usize {
        self.limit as usize - self.base as usize
    }

    /// Bump-allocate `n` bytes, returning the old `sp` (the base of the
    /// newly allocated region).
    ///
    /// Exceeding the reservation is a fatal fault: the reservation is
    /// fixed, and growing would move frames out from under live interior
    /// pointers.
    ///
    /// # Safety
    ///
    /// The segment must be live (not torn down).
    pub unsafe fn allocate(&mut self, n: usize) -> Sp {
        let used = self.used();
        let needed = match used.checked_add(n) {
            Some(needed) if needed <= self.reserved() => needed,
            _ => fault::fatal(Fault::SegmentOverflow {
                requested: used.saturating_add(n),
                reserved: self.reserved(),
            }),
        };
        #[cfg(unix)]
        self.ensure_committed(needed);
        let old = self.sp;
        self.sp = self.base.add(needed);
        old
    }

    /// Release the top `n` bytes, returning the new `sp`.
    ///
    /// # Safety
    ///
    /// `n` must not exceed the used portion of the segment.
    pub unsafe fn deallocate(&mut self, n: usize) -> Sp {
        debug_assert!(n <= self.used(), "segment pop below base");
        self.sp = self.sp.sub(n);
        self.sp
    }

    /// Commit pages so at least `needed` bytes from `base` are usable.
    #[cfg(unix)]
    fn ensure_committed(&mut self, needed: usize) {
        if needed <= self.committed {
            return;
        }
        let ps = page_size();
        // Double the committed size or fit the request, whichever is larger.
        let desired = round_up((self.committed * 2).max(needed), ps).min(self.reserved());
        let additional = desired - self.committed;
        let ret = unsafe {
            libc::mprotect(
                self.base.add(self.committed) as *mut libc::c_void,
                additional,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if ret != 0 {
            fault::fatal(Fault::OutOfMemory(additional));
        }
        self.committed = desired;
    }

    /// Deep-copy the segment: a block of identical total size whose used
    /// portion `[base, sp)` is duplicated byte for byte. The copy's `sp`
    /// and `limit` are translated to the new block.
    pub fn deep_copy(&self) -> Segment {
        let used = self.used();
        // The constructor commits at least `used` bytes up front.
        let mut copy = Segment::with_reservation(self.reserved(), used.max(1));
        // SAFETY: both blocks are at least `used` bytes; they do not overlap.
        unsafe {
            ptr::copy_nonoverlapping(self.base, copy.base, used);
            copy.sp = copy.base.add(used);
        }
        copy
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        stats::record_segment_free();
        #[cfg(unix)]
        // SAFETY: base/reserved describe the mapping made in with_reservation.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.reserved());
        }
        #[cfg(not(unix))]
        // SAFETY: base was allocated in with_reservation with this layout.
        unsafe {
            let layout =
                std::alloc::Layout::from_size_align_unchecked(self.reserved(), SEGMENT_ALIGN);
            std::alloc::dealloc(self.base, layout);
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("base", &self.base)
            .field("used", &self.used())
            .field("reserved", &self.reserved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_segment_is_empty() {
        let segment = Segment::new();
        assert_eq!(segment.used(), 0);
        assert_eq!(segment.sp(), segment.base());
        assert!(segment.reserved() >= config::DEFAULT_SEGMENT_COMMIT);
    }

    #[test]
    fn test_allocate_returns_old_sp() {
        let mut segment = Segment::new();
        let first = unsafe { segment.allocate(32) };
        assert_eq!(first, segment.base());
        let second = unsafe { segment.allocate(16) };
        assert_eq!(second as usize, segment.base() as usize + 32);
        assert_eq!(segment.used(), 48);
    }

    #[test]
    fn test_deallocate_returns_new_sp() {
        let mut segment = Segment::new();
        unsafe {
            segment.allocate(64);
            let sp = segment.deallocate(24);
            assert_eq!(sp as usize, segment.base() as usize + 40);
            assert_eq!(segment.used(), 40);
        }
    }

    #[test]
    fn test_allocate_past_initial_commit() {
        let mut segment = Segment::new();
        let commit = config::runtime_config().segment.commit;
        unsafe {
            let base = segment.allocate(commit + 4096);
            // Touch both ends of the allocation.
            base.write(0xAB);
            base.add(commit + 4095).write(0xCD);
            assert_eq!(base.read(), 0xAB);
            assert_eq!(base.add(commit + 4095).read(), 0xCD);
        }
    }

    #[test]
    fn test_deep_copy_duplicates_used_bytes() {
        let mut segment = Segment::new();
        unsafe {
            let dst = segment.allocate(64);
            for i in 0..64 {
                dst.add(i).write(i as u8);
            }
            let copy = segment.deep_copy();
            assert_eq!(copy.used(), 64);
            assert_eq!(copy.reserved(), segment.reserved());
            assert_ne!(copy.base(), segment.base());
            for i in 0..64 {
                assert_eq!(copy.base().add(i).read(), i as u8);
            }
            // Writes through the copy do not show through the original.
            copy.base().write(0xFF);
            assert_eq!(segment.base().read(), 0);
        }
    }

}
