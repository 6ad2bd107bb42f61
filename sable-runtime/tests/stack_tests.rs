//! Meta-stack scenario tests: identity continuations, nested prompts,
//! underflow to the top level, and the share/erase and reset/underflow
//! round-trip laws.

mod common;

use std::ptr;
use std::sync::atomic::Ordering;

use common::*;
use sable_runtime::capture::{erase_stack, resume, share_stack};
use sable_runtime::entry::{run, EnterFn};
use sable_runtime::frame::FrameHeader;
use sable_runtime::heap::{self, Negative, Obj, RawMethod};
use sable_runtime::reference::{load_word, store_word};
use sable_runtime::stack::{
    current_prompt, push_frame, reset, return_to, shift, stack_allocate, stack_deallocate,
    underflow_stack, Stack,
};
use sable_runtime::stats::memory_report;

/// S1: install a prompt, immediately shift it. The captured prefix is
/// exactly the node bearing the prompt; the new top is its predecessor;
/// resuming restores the pre-shift structure.
#[test]
fn identity_continuation() {
    let _guard = SERIAL.lock();
    unsafe {
        let base = reset(ptr::null_mut());
        let top = reset(base);
        let p = current_prompt(top);

        let (prefix, new_top) = shift(top, p);
        assert_eq!(prefix, top);
        assert!((*prefix).rest.is_null());
        assert_eq!(new_top, base);

        let restored = resume(prefix, new_top);
        assert_eq!(restored, top);
        assert_eq!((*restored).rest, base);
        assert_eq!(current_prompt(restored), p);

        erase_stack(restored);
    }
}

/// Property 4: after a capture forced through the clone path, the copy's
/// segment is bit-identical to the original's.
#[test]
fn duality_clone_preserves_segment_bytes() {
    let _guard = SERIAL.lock();
    unsafe {
        let base = reset(ptr::null_mut());
        let top = reset(base);
        let p = current_prompt(top);
        let r = push_word_cell(top);
        store_word(r, top, 0x5AB1E);

        let snapshot: Vec<u8> = {
            let mem = &(*top).mem;
            std::slice::from_raw_parts(mem.base(), mem.used()).to_vec()
        };

        let (k, rest) = shift(top, p);
        share_stack(k); // force resume through the clone path
        let restored = resume(k, rest);
        assert_ne!(restored, k);
        assert_eq!(current_prompt(restored), p);

        let mem = &(*restored).mem;
        let copied = std::slice::from_raw_parts(mem.base(), mem.used());
        assert_eq!(copied, snapshot.as_slice());
        assert_eq!(load_word(r, restored), 0x5AB1E);

        erase_stack(restored);
        erase_stack(k);
    }
}

/// S5: shifting an outer prompt from inside an inner one detaches both
/// segments; resuming re-splices both, and references bound to the inner
/// prompt stay resolvable.
#[test]
fn nested_prompts_detach_together() {
    let _guard = SERIAL.lock();
    unsafe {
        let base = reset(ptr::null_mut());
        let outer = reset(base);
        let p_outer = current_prompt(outer);
        let inner = reset(outer);
        let p_inner = current_prompt(inner);

        let r = push_word_cell(inner);
        store_word(r, inner, 5);

        let (prefix, new_top) = shift(inner, p_outer);
        assert_eq!(new_top, base);
        // Both nodes travel with the prefix.
        assert_eq!(prefix, inner);
        assert_eq!((*prefix).rest, outer);
        assert!((*outer).rest.is_null());

        let restored = resume(prefix, new_top);
        assert_eq!(current_prompt(restored), p_inner);
        assert_eq!((*(*restored).rest).prompt, p_outer);
        assert_eq!(load_word(r, restored), 5);

        erase_stack(restored);
    }
}

/// Round-trip law: share followed by erase leaves a captured prefix
/// untouched.
#[test]
fn share_erase_is_noop() {
    let _guard = SERIAL.lock();
    unsafe {
        let prefix = reset(ptr::null_mut());
        let rc = (*prefix).rc;
        let used = (*prefix).mem.used();
        share_stack(prefix);
        erase_stack(prefix);
        assert_eq!((*prefix).rc, rc);
        assert_eq!((*prefix).mem.used(), used);
        erase_stack(prefix);
    }
}

/// Round-trip law: reset followed by immediate underflow leaves the
/// observable meta-stack unchanged.
#[test]
fn reset_underflow_is_noop() {
    let _guard = SERIAL.lock();
    unsafe {
        let base = reset(ptr::null_mut());
        let prompt_before = current_prompt(base);
        let used_before = (*base).mem.used();

        let top = reset(base);
        assert_eq!(underflow_stack(top), base);
        assert_eq!(current_prompt(base), prompt_before);
        assert_eq!((*base).mem.used(), used_before);

        erase_stack(base);
    }
}

// A small generated-code-shaped program for the driver: the entry pushes
// a frame owning one heap object, calls a helper, and doubles its result
// on the way back out.

unsafe extern "C" fn add_one(x: i64, stack: Stack) {
    return_to(x + 1, stack);
}

unsafe extern "C" fn after_add(result: i64, stack: Stack) {
    // The header is already popped; drop the frame's locals.
    let slot = stack_deallocate(stack, 8) as *mut Obj;
    heap::erase_object(*slot);
    return_to(result * 2, stack);
}

unsafe extern "C" fn program_enter(_obj: Obj, evidence: i64, stack: Stack) {
    assert_eq!(evidence, 0);
    let obj = heap::new_object(counting_eraser, 8);
    let slot = stack_allocate(stack, 8) as *mut Obj;
    slot.write(obj); // the frame takes the creation ownership
    push_frame(
        stack,
        FrameHeader::new(after_add, share_one_obj, erase_one_obj),
    );
    add_one(20, stack);
}

static PROGRAM_VTABLE: [EnterFn; 1] = [program_enter];

/// S6: a program returning through `top_level` tears down the program and
/// global nodes and leaks nothing.
#[test]
fn underflow_to_top() {
    let _guard = SERIAL.lock();
    let before = memory_report();
    let erased_before = ERASED.load(Ordering::SeqCst);

    let f = Negative {
        vtable: PROGRAM_VTABLE.as_ptr() as *const RawMethod,
        obj: ptr::null_mut(),
    };
    let result = unsafe { run(f) };
    assert_eq!(result, 42);

    let after = memory_report();
    assert_eq!(after.balance(), before.balance());
    assert_eq!(ERASED.load(Ordering::SeqCst), erased_before + 1);
}
