//! # Sable Runtime Library
//!
//! The runtime system for the Sable effect-handler language. Generated
//! code links against this crate and drives three interlocking
//! mechanisms:
//!
//! - **Segmented meta-stack**: an intrusive list of stack segments that
//!   delimits, captures, clones, and reinstates continuations in
//!   O(segment count) (`stack`, `capture`).
//! - **Reference-counted heap**: header+payload objects for user data,
//!   with per-frame share/erase callbacks so stack capture participates
//!   in ownership (`heap`, `frame`).
//! - **Prompt-indexed regions**: mutable cells overlaid on stack
//!   segments, addressed by (prompt, offset) and duplicated on capture so
//!   captured continuations observe independent stores (`reference`).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        SABLE RUNTIME                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐             │
//! │  │ meta-stack │   │  capture   │   │ references │             │
//! │  │ (stack.rs) │   │(capture.rs)│   │  (ref..rs) │             │
//! │  └────────────┘   └────────────┘   └────────────┘             │
//! │        │                │                │                    │
//! │        └────────────────┼────────────────┘                    │
//! │                         │                                     │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐             │
//! │  │  segments  │   │   frames   │   │    heap    │             │
//! │  │(segment.rs)│   │ (frame.rs) │   │ (heap.rs)  │             │
//! │  └────────────┘   └────────────┘   └────────────┘             │
//! │                                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The machine is single-threaded and cooperative: all control transfer
//! in generated code is tail calls threading the stack explicitly, and
//! the runtime introduces no reordering of observable effects. The C
//! surface lives in `exports`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod capture;
pub mod config;
pub mod entry;
pub mod exports;
pub mod fault;
pub mod frame;
pub mod heap;
pub mod log;
pub mod prompt;
pub mod reference;
pub mod segment;
pub mod stack;
pub mod stats;

// Re-exports
pub use capture::{erase_stack, resume, share_stack, unique_stack};
pub use config::{ConfigError, RuntimeConfig, RuntimeConfigBuilder};
pub use entry::{run, run_int, run_pos, with_empty_stack};
pub use fault::Fault;
pub use frame::{FrameHeader, FrameWalkFn, ReturnFn, FRAME_HEADER_SIZE};
pub use heap::{Negative, Obj, ObjectHeader, Positive};
pub use prompt::{fresh_prompt, Prompt, GLOBAL_PROMPT};
pub use reference::Reference;
pub use segment::{Segment, Sp};
pub use stack::{reset, shift, underflow_stack, Stack, StackValue};
pub use stats::{memory_report, MemoryReport};

/// Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static INIT: std::sync::Once = std::sync::Once::new();

/// Initialize the runtime: install configuration (from the environment if
/// none was installed programmatically) and apply the configured log
/// level. One-shot; the `run*` drivers call it implicitly.
pub fn init() {
    INIT.call_once(|| {
        let config = config::runtime_config();
        log::set_level(config.log_level);
    });
}

/// Initialize the runtime with an explicit configuration.
///
/// Must run before any segment is created; a configuration installed
/// after first use is ignored (the earlier sizing is already live).
pub fn init_with(config: RuntimeConfig) {
    config::install(config);
    init();
}
