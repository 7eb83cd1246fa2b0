//! Reading the object graph of a suspended managed heap.
//!
//! The crate knows nothing about which objects matter; it only knows how to
//! address heap bytes ([`Memory`]), decode a type's layout descriptor
//! ([`GcDesc`]) and hand every non-null reference slot of an object to a
//! [`SlotVisitor`].

mod arena;
mod descriptor;
mod memory;
mod raw;
mod walker;
mod width;

pub use arena::Arena;
pub use descriptor::GcDesc;
pub use memory::{Memory, MemoryError, Slot};
pub use raw::RawMemory;
pub use walker::SlotVisitor;
pub use width::{PointerWidth, WidthTable};
