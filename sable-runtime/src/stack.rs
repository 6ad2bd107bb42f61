//! Meta-Stack Management
//!
//! The meta-stack is an intrusive linked list of stack segments, one node
//! per prompt boundary. The list head is the running program's current
//! stack; following `rest` to null walks outward through enclosing
//! prompts. `reset` pushes a boundary, `shift` detaches the prefix above a
//! prompt as a first-class value, `resume` splices a captured prefix back,
//! and underflow pops a segment whose frames are exhausted.
//!
//! A node's segment, frames, and overlaid reference cells all travel
//! together: capturing a prefix captures its mutable state, and
//! duplicating it (see `capture`) duplicates that state.

use std::ptr;

use crate::fault::{self, Fault};
use crate::frame::{self, FrameHeader, FRAME_HEADER_SIZE};
use crate::log::{LogBuilder, LogLevel};
use crate::prompt::{fresh_prompt, Prompt};
use crate::segment::{Segment, Sp};
use crate::stats;

/// One meta-stack node: a reference count, the owned segment, the prompt
/// this node delimits, and the link outward.
///
/// `rest == null` marks the bottom of a *captured* prefix; on the live
/// meta-stack only the global base node has a null `rest`.
pub struct StackValue {
    /// Additional owners beyond the first (captured prefixes only; live
    /// nodes stay at 0).
    pub rc: i64,
    /// The node's frame segment, cells included.
    pub mem: Segment,
    /// The prompt this node was created to delimit.
    pub prompt: Prompt,
    /// Next node outward, or null.
    pub rest: Stack,
}

/// A (possibly null) meta-stack node pointer.
pub type Stack = *mut StackValue;

/// Allocate a node owning `mem`.
pub(crate) fn new_stack_value(mem: Segment, prompt: Prompt, rest: Stack) -> Stack {
    stats::record_node_alloc();
    Box::into_raw(Box::new(StackValue {
        rc: 0,
        mem,
        prompt,
        rest,
    }))
}

/// Free a node and its segment.
///
/// # Safety
///
/// `stack` must have come from [`new_stack_value`] and must not be
/// referenced afterwards.
pub(crate) unsafe fn free_stack_value(stack: Stack) {
    stats::record_node_free();
    drop(Box::from_raw(stack));
}

/// Bump-allocate `n` bytes on the top node's segment, returning the base
/// of the new region (the old `sp`).
///
/// # Safety
///
/// `stack` must point to a live node.
pub unsafe fn stack_allocate(stack: Stack, n: usize) -> Sp {
    (*stack).mem.allocate(n)
}

/// Pop `n` bytes off the top node's segment, returning the new `sp`.
///
/// # Safety
///
/// `stack` must point to a live node with at least `n` used bytes.
pub unsafe fn stack_deallocate(stack: Stack, n: usize) -> Sp {
    (*stack).mem.deallocate(n)
}

/// Push a frame header onto the top node's segment.
///
/// # Safety
///
/// `stack` must point to a live node.
pub unsafe fn push_frame(stack: Stack, header: FrameHeader) -> Sp {
    let base = stack_allocate(stack, FRAME_HEADER_SIZE);
    (base as *mut FrameHeader).write(header);
    base
}

/// Pop the top frame header and tail-call its return address with
/// `result`.
///
/// # Safety
///
/// The top of `stack`'s segment must be a frame header.
pub unsafe fn return_to(result: i64, stack: Stack) {
    let header = stack_deallocate(stack, FRAME_HEADER_SIZE) as *const FrameHeader;
    ((*header).return_address)(result, stack)
}

/// Sentinel return address at the bottom of every `reset` segment.
///
/// When a segment's frames are exhausted, the code generator's return
/// sequence pops the sentinel header and lands here; the segment
/// underflows and the return continues in the node below.
pub unsafe extern "C" fn underflow_return(result: i64, stack: Stack) {
    let next = underflow_stack(stack);
    return_to(result, next);
}

/// Install a prompt boundary: a fresh segment and node with a newly
/// minted prompt, linked above `stack`. The new segment starts with a
/// sentinel frame so both returns and frame walks terminate there.
///
/// # Safety
///
/// `stack` must be null or point to a live meta-stack.
pub unsafe fn reset(stack: Stack) -> Stack {
    let prompt = fresh_prompt();
    let top = new_stack_value(Segment::new(), prompt, stack);
    push_frame(
        top,
        FrameHeader::new(underflow_return, frame::walk_stop, frame::walk_stop),
    );
    if crate::log::would_log(LogLevel::Debug) {
        LogBuilder::new(LogLevel::Debug, "stack")
            .message("reset")
            .field_uint("prompt", prompt)
            .emit();
    }
    top
}

/// The prompt delimited by the top node.
///
/// # Safety
///
/// `stack` must point to a live node.
pub unsafe fn current_prompt(stack: Stack) -> Prompt {
    (*stack).prompt
}

/// Find the node bearing `prompt`, searching from `top` outward.
///
/// # Safety
///
/// `top` must be null or point to a valid chain.
pub(crate) unsafe fn find_prompt(top: Stack, prompt: Prompt) -> Option<Stack> {
    let mut node = top;
    while !node.is_null() {
        if (*node).prompt == prompt {
            return Some(node);
        }
        node = (*node).rest;
    }
    None
}

/// Detach the meta-stack prefix delimited by `prompt`.
///
/// The captured prefix runs from the current top down to and including the
/// node bearing `prompt`; its bottom link is severed to null and the node
/// below becomes the new live top. Returns `(prefix, new_top)`. The prefix
/// starts with rc 0 (one owner: the capturing program).
///
/// A prompt that is not on the live meta-stack is a fatal fault.
///
/// # Safety
///
/// `top` must point to the live meta-stack head.
pub unsafe fn shift(top: Stack, prompt: Prompt) -> (Stack, Stack) {
    let node = match find_prompt(top, prompt) {
        Some(node) => node,
        None => fault::fatal_with_stack(Fault::UnknownPrompt(prompt), top),
    };
    let new_top = (*node).rest;
    (*node).rest = ptr::null_mut();
    if crate::log::would_log(LogLevel::Debug) {
        LogBuilder::new(LogLevel::Debug, "stack")
            .message("shift")
            .field_uint("prompt", prompt)
            .emit();
    }
    (top, new_top)
}

/// Pop an exhausted segment: free the top node and its segment and return
/// the node below as the new top.
///
/// # Safety
///
/// `stack` must point to a live node that no captured prefix references.
pub unsafe fn underflow_stack(stack: Stack) -> Stack {
    let rest = (*stack).rest;
    free_stack_value(stack);
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::GLOBAL_PROMPT;

    unsafe fn base_node() -> Stack {
        new_stack_value(Segment::new(), GLOBAL_PROMPT, ptr::null_mut())
    }

    #[test]
    fn test_reset_links_and_mints() {
        unsafe {
            let base = base_node();
            let top = reset(base);
            assert_eq!((*top).rest, base);
            assert_ne!(current_prompt(top), GLOBAL_PROMPT);
            assert_eq!((*top).rc, 0);
            // The sentinel frame is already in place.
            assert_eq!((*top).mem.used(), FRAME_HEADER_SIZE);
            free_stack_value(underflow_stack(top));
        }
    }

    #[test]
    fn test_underflow_returns_rest() {
        unsafe {
            let base = base_node();
            let top = reset(base);
            assert_eq!(underflow_stack(top), base);
            free_stack_value(base);
        }
    }

    #[test]
    fn test_shift_severs_at_prompt() {
        unsafe {
            let base = base_node();
            let outer = reset(base);
            let p_outer = current_prompt(outer);
            let inner = reset(outer);

            let (prefix, new_top) = shift(inner, p_outer);
            assert_eq!(prefix, inner);
            assert_eq!(new_top, base);
            // The prefix holds both segments and ends at null.
            assert_eq!((*prefix).rest, outer);
            assert!((*outer).rest.is_null());

            free_stack_value(underflow_stack(prefix));
            free_stack_value(base);
        }
    }

    #[test]
    fn test_find_prompt_walks_outward() {
        unsafe {
            let base = base_node();
            let top = reset(base);
            assert_eq!(find_prompt(top, GLOBAL_PROMPT), Some(base));
            assert_eq!(find_prompt(top, current_prompt(top)), Some(top));
            assert_eq!(find_prompt(top, u32::MAX as Prompt), None);
            free_stack_value(underflow_stack(top));
        }
    }

    #[test]
    fn test_stack_allocate_tracks_sp() {
        unsafe {
            let base = base_node();
            let frame = stack_allocate(base, 32);
            assert_eq!(frame, (*base).mem.base());
            let sp = stack_deallocate(base, 32);
            assert_eq!(sp, (*base).mem.base());
            free_stack_value(base);
        }
    }
}
