//! Frame Headers and Frame Walks
//!
//! Every frame ends with a three-slot header (return address, sharer,
//! eraser), pushed last, so at any call boundary the topmost frame's
//! header sits immediately below `sp`. Returning pops the header and
//! tail-calls the return address; capturing or erasing a stack walks the
//! headers, dispatching into the code-generator-emitted callbacks that
//! know each frame's locals.
//!
//! ## Walk protocol
//!
//! Rust does not guarantee tail calls, so the walk is a trampoline rather
//! than mutual recursion: each sharer/eraser handles exactly one frame and
//! returns the walk position of the frame below (its own frame base), or
//! null from the bottom sentinel. The driver loops. Native call depth is
//! constant no matter how many frames a segment holds.

use std::mem;

use crate::segment::Sp;
use crate::stack::Stack;

/// A return address: receives the callee's result and the current stack.
pub type ReturnFn = unsafe extern "C" fn(result: i64, stack: Stack);

/// A frame sharer or eraser.
///
/// Called with `sp` positioned one past the frame's own header. The
/// callback processes the locals below the header and returns the frame's
/// base (the walk position of the next frame down), or null to stop the
/// walk.
pub type FrameWalkFn = unsafe extern "C" fn(sp: Sp) -> Sp;

/// The three-slot record ending every frame.
///
/// Slot order is part of the code-generator contract: (return address,
/// sharer, eraser), each pointer-sized, no padding.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FrameHeader {
    /// Where control goes when the frame returns.
    pub return_address: ReturnFn,
    /// Propagates `share_object` into the frame's heap-typed locals.
    pub sharer: FrameWalkFn,
    /// Propagates `erase_object` into the frame's heap-typed locals.
    pub eraser: FrameWalkFn,
}

/// Size of a frame header in bytes (three pointer slots).
pub const FRAME_HEADER_SIZE: usize = mem::size_of::<FrameHeader>();

impl FrameHeader {
    /// Build a header from its three slots.
    pub fn new(return_address: ReturnFn, sharer: FrameWalkFn, eraser: FrameWalkFn) -> FrameHeader {
        FrameHeader {
            return_address,
            sharer,
            eraser,
        }
    }
}

/// Walk terminator installed in bottom sentinel frames.
///
/// Sentinels have no locals; their walkers stop the walk by returning
/// null.
pub unsafe extern "C" fn walk_stop(_sp: Sp) -> Sp {
    std::ptr::null_mut()
}

/// Share every live frame of the segment whose stack pointer is `sp`.
///
/// Dispatches each frame's sharer in turn until the bottom sentinel stops
/// the walk. Every heap object referenced from a local gains an owner.
///
/// # Safety
///
/// `sp` must point one past a well-formed frame chain ending in a sentinel
/// header (any segment built by `with_empty_stack`/`reset` plus
/// code-generator pushes satisfies this).
pub unsafe fn share_frames(sp: Sp) {
    let mut cursor = sp;
    while !cursor.is_null() {
        let header = cursor.sub(FRAME_HEADER_SIZE) as *const FrameHeader;
        cursor = ((*header).sharer)(cursor);
    }
}

/// Erase every live frame of the segment whose stack pointer is `sp`.
///
/// Symmetric to [`share_frames`], using the eraser slot. Every heap object
/// referenced from a local drops an owner.
///
/// # Safety
///
/// As [`share_frames`]; additionally the caller must own the frames'
/// references (the segment is being torn down or was duplicated).
pub unsafe fn erase_frames(sp: Sp) {
    let mut cursor = sp;
    while !cursor.is_null() {
        let header = cursor.sub(FRAME_HEADER_SIZE) as *const FrameHeader;
        cursor = ((*header).eraser)(cursor);
    }
}
