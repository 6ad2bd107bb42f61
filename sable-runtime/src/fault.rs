//! Fatal Faults
//!
//! The runtime recognizes only unrecoverable faults: allocator exhaustion,
//! segment reservation overflow, and invariant violations (unknown prompt,
//! dangling reference, negative reference count). An invariant violation
//! means either a code-generator bug or memory corruption; there is nothing
//! to recover to, so the runtime prints a diagnostic and terminates.
//!
//! Effect-handler programs express their own error handling through the
//! ordinary shift/reset machinery; none of it passes through this module.

use std::fmt;
use std::process;

use crate::log::{self, LogLevel};
use crate::prompt::Prompt;
use crate::stack::Stack;

/// Exit code for all fatal runtime faults (EX_SOFTWARE).
pub const FAULT_EXIT_CODE: i32 = 70;

/// The unrecoverable fault taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `shift` named a prompt that is not on the live meta-stack.
    UnknownPrompt(Prompt),
    /// A reference resolved to no live node, or to a cell outside the
    /// used portion of its segment.
    DanglingReference {
        /// The reference's prompt field.
        prompt: u32,
        /// The reference's offset field.
        offset: u32,
    },
    /// A reference count went below zero.
    NegativeRc,
    /// A bump allocation exceeded the segment's reservation.
    SegmentOverflow {
        /// Bytes the segment would have needed.
        requested: usize,
        /// The segment's fixed reservation.
        reserved: usize,
    },
    /// The host allocator returned null.
    OutOfMemory(usize),
    /// `top_level` tore down the program and global nodes and found more
    /// meta-stack below them.
    NonEmptyTopLevel,
    /// Control returned through the global node's sentinel frame.
    ReturnPastTopLevel,
    /// The prompt counter left the range representable in references.
    PromptSpaceExhausted,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnknownPrompt(p) => write!(f, "no such prompt: {}", p),
            Fault::DanglingReference { prompt, offset } => {
                write!(f, "dangling reference: prompt {} offset {}", prompt, offset)
            }
            Fault::NegativeRc => write!(f, "negative reference count"),
            Fault::SegmentOverflow {
                requested,
                reserved,
            } => write!(
                f,
                "stack segment overflow: {} bytes needed, {} reserved",
                requested, reserved
            ),
            Fault::OutOfMemory(bytes) => {
                write!(f, "host allocator failed for {} bytes", bytes)
            }
            Fault::NonEmptyTopLevel => {
                write!(f, "meta-stack not empty after top-level teardown")
            }
            Fault::ReturnPastTopLevel => {
                write!(f, "control returned past the top-level frame")
            }
            Fault::PromptSpaceExhausted => write!(f, "prompt counter exhausted"),
        }
    }
}

/// Report a fault and terminate the process.
pub fn fatal(fault: Fault) -> ! {
    log::error("fault", fault.to_string());
    eprintln!("sable runtime: fatal: {}", fault);
    process::exit(FAULT_EXIT_CODE);
}

/// Report a fault with a dump of the live meta-stack, then terminate.
///
/// The dump is emitted at debug level only; production failures print the
/// one-line diagnostic.
///
/// # Safety
///
/// `top` must be null or point to a valid meta-stack chain.
pub unsafe fn fatal_with_stack(fault: Fault, top: Stack) -> ! {
    if log::would_log(LogLevel::Debug) {
        log::debug("fault", "meta-stack at fault:");
        let mut node = top;
        let mut depth = 0usize;
        while !node.is_null() {
            log::LogBuilder::new(LogLevel::Debug, "fault")
                .message("node")
                .field_uint("depth", depth as u64)
                .field_uint("prompt", (*node).prompt)
                .field_uint("used", (*node).mem.used() as u64)
                .field_int("rc", (*node).rc)
                .emit();
            node = (*node).rest;
            depth += 1;
        }
    }
    fatal(fault)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display() {
        assert_eq!(Fault::UnknownPrompt(7).to_string(), "no such prompt: 7");
        assert!(Fault::DanglingReference {
            prompt: 3,
            offset: 16
        }
        .to_string()
        .contains("dangling"));
        assert!(Fault::SegmentOverflow {
            requested: 10,
            reserved: 5
        }
        .to_string()
        .contains("overflow"));
    }
}
