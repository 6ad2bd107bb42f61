//! Heap Object Management
//!
//! User data lives in reference-counted heap objects: a fixed header
//! (`rc`, eraser) immediately followed by an opaque payload, the object's
//! *environment*. The eraser is emitted by the code generator and knows
//! the environment's static shape; it propagates an erase into every
//! heap-typed field before the block is freed.
//!
//! ## Counter convention
//!
//! `rc` counts *additional* owners beyond the first: a freshly allocated
//! object has `rc == 0` and exactly one owner. `erase` on `rc == 0` frees
//! the object; otherwise it decrements. This inverts the customary counter
//! but makes the single-owner path free of any increment/decrement pair.
//! The convention must be preserved exactly; changing it miscounts every
//! owner in the system.

use std::alloc::{self, Layout};
use std::mem;

use crate::fault::{self, Fault};
use crate::stats;

/// A code-generator-emitted destructor for an object environment.
///
/// Receives the environment pointer (one past the header) and erases every
/// heap-typed field in it.
pub type Eraser = unsafe extern "C" fn(env: *mut u8);

/// The fixed object header: (rc, eraser), immediately followed by the
/// environment bytes. Layout is part of the code-generator contract.
#[repr(C)]
pub struct ObjectHeader {
    /// Number of additional owners beyond the first.
    pub rc: i64,
    /// Environment destructor.
    pub eraser: Eraser,
}

/// A (possibly null) heap object pointer.
pub type Obj = *mut ObjectHeader;

/// Opaque method entry in a negative value's vtable. Concrete signatures
/// are fixed by the code generator per interface; the runtime casts at its
/// own call sites.
pub type RawMethod = unsafe extern "C" fn();

/// A positive value: one variant of a source-level sum type.
///
/// `obj` is null for zero-field constructors.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Positive {
    /// Variant tag.
    pub tag: i64,
    /// Field environment, or null.
    pub obj: Obj,
}

impl Positive {
    /// A zero-field variant with the given tag.
    pub fn tagged(tag: i64) -> Positive {
        Positive {
            tag,
            obj: std::ptr::null_mut(),
        }
    }
}

/// A negative value: codata dispatched through a vtable.
///
/// Methods have shape `fn(obj, evidence, args..., stack)`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Negative {
    /// Method table; entries are cast to their concrete signatures by the
    /// caller.
    pub vtable: *const RawMethod,
    /// Captured environment, or null.
    pub obj: Obj,
}

/// Bytes between the block the allocator hands out and the object header.
///
/// The host allocator needs the allocation size back at free time, so the
/// block carries a hidden size word ahead of the header. The code
/// generator never sees this: an `Obj` points at the header, and the
/// environment follows it directly, exactly as the layout contract states.
const OBJECT_PREFIX: usize = 16;

fn block_layout(env_size: usize) -> Layout {
    let size = OBJECT_PREFIX + mem::size_of::<ObjectHeader>() + env_size;
    // SAFETY: 16 is a valid alignment; the size cannot overflow isize for
    // any environment the code generator emits.
    unsafe { Layout::from_size_align_unchecked(size, 16) }
}

unsafe fn block_of(obj: Obj) -> (*mut u8, usize) {
    let block = (obj as *mut u8).sub(OBJECT_PREFIX);
    let env_size = *(block as *const usize);
    (block, env_size)
}

/// Allocate a heap object with an environment of `env_size` bytes.
///
/// The environment is uninitialized; the caller populates it before the
/// object can be shared or erased. `rc` starts at 0 (one owner).
pub unsafe fn new_object(eraser: Eraser, env_size: usize) -> Obj {
    let layout = block_layout(env_size);
    let block = alloc::alloc(layout);
    if block.is_null() {
        fault::fatal(Fault::OutOfMemory(layout.size()));
    }
    *(block as *mut usize) = env_size;
    let obj = block.add(OBJECT_PREFIX) as Obj;
    (*obj).rc = 0;
    (*obj).eraser = eraser;
    stats::record_object_alloc(env_size);
    obj
}

/// Pointer to the object's environment (one past the header).
///
/// # Safety
///
/// `obj` must be a live object from [`new_object`].
pub unsafe fn object_environment(obj: Obj) -> *mut u8 {
    (obj as *mut u8).add(mem::size_of::<ObjectHeader>())
}

/// Add an owner. Null-safe.
///
/// # Safety
///
/// `obj` must be null or a live object.
pub unsafe fn share_object(obj: Obj) {
    if !obj.is_null() {
        (*obj).rc += 1;
    }
}

/// Drop an owner. Null-safe. The last owner's erase runs the eraser over
/// the environment and frees the block.
///
/// # Safety
///
/// `obj` must be null or a live object the caller owns.
pub unsafe fn erase_object(obj: Obj) {
    if obj.is_null() {
        return;
    }
    let rc = (*obj).rc;
    if rc == 0 {
        ((*obj).eraser)(object_environment(obj));
        let (block, env_size) = block_of(obj);
        alloc::dealloc(block, block_layout(env_size));
        stats::record_object_free(env_size);
    } else if rc < 0 {
        fault::fatal(Fault::NegativeRc);
    } else {
        (*obj).rc = rc - 1;
    }
}

/// Share a positive value by sharing its object field.
///
/// # Safety
///
/// The value's `obj` must be null or live.
pub unsafe fn share_positive(value: Positive) {
    share_object(value.obj);
}

/// Erase a positive value by erasing its object field.
///
/// # Safety
///
/// The value's `obj` must be null or live and owned by the caller.
pub unsafe fn erase_positive(value: Positive) {
    erase_object(value.obj);
}

/// Share a negative value by sharing its object field.
///
/// # Safety
///
/// The value's `obj` must be null or live.
pub unsafe fn share_negative(value: Negative) {
    share_object(value.obj);
}

/// Erase a negative value by erasing its object field.
///
/// # Safety
///
/// The value's `obj` must be null or live and owned by the caller.
pub unsafe fn erase_negative(value: Negative) {
    erase_object(value.obj);
}

/// An eraser for environments with no heap-typed fields.
pub unsafe extern "C" fn erase_nothing(_env: *mut u8) {}
