//! `sirocco-gpu` contains the host-side GPU plumbing shared by Sirocco's
//! guest GPU translation front-ends.
//!
//! Currently this crate provides:
//! - The transient upload heap used to stage per-draw data (see
//!   [`UploadHeap`]).
//! - The host graphics device capability surface the translation core is
//!   written against (see [`HostGraphicsDevice`]).
//! - A minimal guest memory interface (see [`GuestMemory`]).

mod device;
mod guest_memory;
mod heap;

pub use device::{
    ConstantBufferView, HostCapabilities, HostGraphicsDevice, IndexBufferView, IndexWidth,
    InvalidIndexWidth,
};
pub use guest_memory::{GuestMemory, GuestMemoryError, VecGuestMemory};
pub use heap::{
    align_up, FenceValue, HeapError, HeapStats, OverflowPolicy, RetirementFence, UploadHeap,
    UploadHeapDescriptor,
};
