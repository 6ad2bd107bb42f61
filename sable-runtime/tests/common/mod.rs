//! Shared helpers for the scenario tests.
//!
//! These play the role of the code generator: they push frames with
//! hand-written sharers and erasers, allocate reference cells as frame
//! locals, and build program closures for the drivers.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use sable_runtime::frame::{FrameHeader, FRAME_HEADER_SIZE};
use sable_runtime::heap::{self, Obj};
use sable_runtime::reference::{self, Reference};
use sable_runtime::segment::Sp;
use sable_runtime::stack::{push_frame, stack_allocate, Stack};

/// Serializes tests that assert on the process-wide allocation counters.
pub static SERIAL: Mutex<()> = Mutex::new(());

/// Number of environments erased through [`counting_eraser`].
pub static ERASED: AtomicUsize = AtomicUsize::new(0);

/// An eraser that counts invocations (for objects without heap fields).
pub unsafe extern "C" fn counting_eraser(_env: *mut u8) {
    ERASED.fetch_add(1, Ordering::SeqCst);
}

/// Return address for frames that are only ever walked, never returned
/// into.
pub unsafe extern "C" fn unreachable_return(_result: i64, _stack: Stack) {
    unreachable!("walk-only test frame returned");
}

/// Sharer for a frame whose single local is a heap object.
pub unsafe extern "C" fn share_one_obj(sp: Sp) -> Sp {
    let slot = sp.sub(FRAME_HEADER_SIZE + 8) as *mut Obj;
    heap::share_object(*slot);
    slot as Sp
}

/// Eraser for a frame whose single local is a heap object.
pub unsafe extern "C" fn erase_one_obj(sp: Sp) -> Sp {
    let slot = sp.sub(FRAME_HEADER_SIZE + 8) as *mut Obj;
    heap::erase_object(*slot);
    slot as Sp
}

/// Walker for a frame whose single local is a word cell (no heap refs).
pub unsafe extern "C" fn walk_skip_word(sp: Sp) -> Sp {
    sp.sub(FRAME_HEADER_SIZE + 8)
}

/// Push a frame owning one heap object.
///
/// The frame takes its own ownership of `obj` (shares before storing).
pub unsafe fn push_obj_frame(stack: Stack, obj: Obj) {
    heap::share_object(obj);
    let slot = stack_allocate(stack, 8) as *mut Obj;
    slot.write(obj);
    push_frame(
        stack,
        FrameHeader::new(unreachable_return, share_one_obj, erase_one_obj),
    );
}

/// Allocate a word cell as a frame local and return its reference.
pub unsafe fn push_word_cell(stack: Stack) -> Reference {
    let r = reference::new_reference(stack);
    stack_allocate(stack, 8);
    push_frame(
        stack,
        FrameHeader::new(unreachable_return, walk_skip_word, walk_skip_word),
    );
    r
}
