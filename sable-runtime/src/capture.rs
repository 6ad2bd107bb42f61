//! Continuation Duplication and Prefix Ownership
//!
//! A captured prefix is a first-class value the program may resume zero,
//! one, or many times. Multi-shot correctness hinges on `unique_stack`:
//! whenever a shared prefix is about to be mutated (resumed), it is cloned
//! first. Each segment is duplicated byte for byte, every heap object
//! referenced from a live frame gains an owner, and the overlaid reference
//! cells are physically copied so the two prefixes observe independent
//! stores.
//!
//! Prompts are deliberately preserved across cloning: references baked
//! into copied frames keep resolving, and because the original and the
//! copy are separate chains, a lookup always finds the local node.

use std::ptr;

use crate::frame;
use crate::log::{self, LogBuilder, LogLevel};
use crate::stack::{free_stack_value, new_stack_value, Stack};

/// Add an owner to a captured prefix.
///
/// # Safety
///
/// `stack` must point to the head of a captured prefix.
pub unsafe fn share_stack(stack: Stack) {
    (*stack).rc += 1;
}

/// Drop an owner from a captured prefix. The last owner's erase walks the
/// chain: every segment's frames are erased (propagating drops into heap
/// objects), then segment and node are freed, down to the null terminator.
///
/// Never called on the live meta-stack head; the live chain is torn down
/// by underflow.
///
/// # Safety
///
/// `stack` must point to the head of a captured prefix the caller owns.
pub unsafe fn erase_stack(stack: Stack) {
    if (*stack).rc > 0 {
        (*stack).rc -= 1;
        return;
    }
    let mut node = stack;
    while !node.is_null() {
        let rest = (*node).rest;
        frame::erase_frames((*node).mem.sp());
        free_stack_value(node);
        node = rest;
    }
}

/// Return a prefix the caller may mutate: `stack` itself when it is the
/// sole owner, otherwise a full clone.
///
/// Cloning walks the chain head to terminator; per node the segment is
/// deep-copied, the copy's live frames are shared (each heap local gains
/// an owner), and the prompt is carried over unchanged. The original loses
/// the caller's ownership (rc - 1); the clone starts at rc 0.
///
/// # Safety
///
/// `stack` must point to the head of a captured prefix the caller owns.
pub unsafe fn unique_stack(stack: Stack) -> Stack {
    if (*stack).rc == 0 {
        return stack;
    }
    (*stack).rc -= 1;
    if log::would_log(LogLevel::Debug) {
        LogBuilder::new(LogLevel::Debug, "capture")
            .message("cloning shared continuation")
            .field_uint("prompt", (*stack).prompt)
            .field_int("rc", (*stack).rc)
            .emit();
    }
    let head = clone_node(stack);
    let mut old = (*stack).rest;
    let mut tail = head;
    while !old.is_null() {
        let next = clone_node(old);
        (*tail).rest = next;
        tail = next;
        old = (*old).rest;
    }
    (*tail).rest = ptr::null_mut();
    head
}

unsafe fn clone_node(old: Stack) -> Stack {
    let mem = (*old).mem.deep_copy();
    frame::share_frames(mem.sp());
    new_stack_value(mem, (*old).prompt, ptr::null_mut())
}

/// Splice a captured prefix back atop the current meta-stack, cloning
/// first when the prefix is shared. Returns the new top.
///
/// # Safety
///
/// `prefix` must be a captured prefix the caller owns; `stack` must be
/// the live meta-stack head (or null when reinstating a whole machine).
pub unsafe fn resume(prefix: Stack, stack: Stack) -> Stack {
    let prefix = unique_stack(prefix);
    let mut last = prefix;
    while !(*last).rest.is_null() {
        last = (*last).rest;
    }
    (*last).rest = stack;
    prefix
}
