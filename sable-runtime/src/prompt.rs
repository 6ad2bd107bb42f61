//! Prompt Allocation
//!
//! Prompts are process-unique identifiers naming dynamic scope boundaries.
//! Every `reset` mints a fresh one; references and `shift` use them as
//! search keys into the live meta-stack.
//!
//! The counter is the runtime's only genuine global. It is atomic for
//! data-race hygiene; the machine itself is single-threaded.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::fault::{self, Fault};

/// A prompt identifier.
pub type Prompt = u64;

/// The prompt of the global base node installed by `with_empty_stack`.
pub const GLOBAL_PROMPT: Prompt = 0;

/// Global prompt counter. Prompt 0 is reserved for the global node.
static NEXT_PROMPT: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh prompt. Strictly increasing across a process run.
///
/// References store prompts in 32 bits, so minting past `u32::MAX` is a
/// fatal fault rather than a silent wrap.
pub fn fresh_prompt() -> Prompt {
    let prompt = NEXT_PROMPT.fetch_add(1, Ordering::Relaxed);
    if prompt > u32::MAX as u64 {
        fault::fatal(Fault::PromptSpaceExhausted);
    }
    prompt
}
