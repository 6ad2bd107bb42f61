//! Entry Runtime
//!
//! The drivers that bridge from ordinary Rust control flow into the
//! tail-called world of generated code: build the two-node empty
//! meta-stack (global base + program node), invoke the program closure's
//! entry method with evidence 0, and collect the final result when the
//! program's last frame returns through the `top_level` sentinel.

use std::mem;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::config;
use crate::fault::{self, Fault};
use crate::frame::{walk_stop, FrameHeader};
use crate::heap::{Negative, Obj, Positive};
use crate::log::{self, LogLevel};
use crate::prompt::{fresh_prompt, GLOBAL_PROMPT};
use crate::segment::Segment;
use crate::stack::{new_stack_value, push_frame, underflow_stack, Stack};
use crate::stats;

/// Entry method of a no-argument program closure.
pub type EnterFn = unsafe extern "C" fn(obj: Obj, evidence: i64, stack: Stack);

/// Entry method of a program closure taking an integer.
pub type EnterIntFn = unsafe extern "C" fn(obj: Obj, evidence: i64, arg: i64, stack: Stack);

/// Entry method of a program closure taking a positive value.
pub type EnterPosFn = unsafe extern "C" fn(obj: Obj, evidence: i64, arg: Positive, stack: Stack);

/// Result slot filled by `top_level` and read back by the drivers.
static FINAL_RESULT: AtomicI64 = AtomicI64::new(0);

/// Build the empty meta-stack: a global base node (prompt 0, no parent)
/// with a program node on top (fresh prompt). Both segments begin with a
/// sentinel frame; the program node's sentinel returns into [`top_level`].
///
/// Returns the program node.
pub unsafe fn with_empty_stack() -> Stack {
    let global = new_stack_value(Segment::new(), GLOBAL_PROMPT, std::ptr::null_mut());
    push_frame(
        global,
        FrameHeader::new(return_past_top_level, walk_stop, walk_stop),
    );
    let program = new_stack_value(Segment::new(), fresh_prompt(), global);
    push_frame(program, FrameHeader::new(top_level, walk_stop, walk_stop));
    program
}

/// Sentinel return address of the program segment.
///
/// Runs when the program's last frame returns: tears down the program and
/// global nodes, checks that nothing is left below them, and stashes the
/// program's result for the driver.
pub unsafe extern "C" fn top_level(result: i64, stack: Stack) {
    let rest = underflow_stack(stack);
    let rest = underflow_stack(rest);
    if !rest.is_null() {
        fault::fatal_with_stack(Fault::NonEmptyTopLevel, rest);
    }
    FINAL_RESULT.store(result, Ordering::SeqCst);
}

/// Sentinel return address of the global segment. Control can only get
/// here past `top_level`, which is an invariant violation.
unsafe extern "C" fn return_past_top_level(_result: i64, stack: Stack) {
    fault::fatal_with_stack(Fault::ReturnPastTopLevel, stack);
}

unsafe fn finish_run() -> i64 {
    let result = FINAL_RESULT.load(Ordering::SeqCst);
    if config::runtime_config().leak_check {
        let report = stats::memory_report();
        if report.balance() != 0 {
            log::error("entry", "allocator imbalance at run exit");
            eprintln!("sable runtime: leak check failed:\n{}", report);
        } else if log::would_log(LogLevel::Debug) {
            log::debug("entry", "leak check passed");
        }
    }
    result
}

/// Run a no-argument program closure to completion and return its result.
///
/// # Safety
///
/// `f`'s vtable must begin with a method of type [`EnterFn`] that follows
/// the runtime calling convention.
pub unsafe fn run(f: Negative) -> i64 {
    crate::init();
    let stack = with_empty_stack();
    // SAFETY: the first vtable slot is the entry method per the driver
    // contract; evidence 0 means the current prompt.
    let enter: EnterFn = mem::transmute(*f.vtable);
    enter(f.obj, 0, stack);
    finish_run()
}

/// Run a program closure on an integer argument.
///
/// # Safety
///
/// As [`run`], with an [`EnterIntFn`] entry method.
pub unsafe fn run_int(f: Negative, arg: i64) -> i64 {
    crate::init();
    let stack = with_empty_stack();
    let enter: EnterIntFn = mem::transmute(*f.vtable);
    enter(f.obj, 0, arg, stack);
    finish_run()
}

/// Run a program closure on a positive-value argument.
///
/// # Safety
///
/// As [`run`], with an [`EnterPosFn`] entry method; `f` takes ownership
/// of `arg`.
pub unsafe fn run_pos(f: Negative, arg: Positive) -> i64 {
    crate::init();
    let stack = with_empty_stack();
    let enter: EnterPosFn = mem::transmute(*f.vtable);
    enter(f.obj, 0, arg, stack);
    finish_run()
}
