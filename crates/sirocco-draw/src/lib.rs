//! Fixed-function guest GPU draw translation.
//!
//! The guest exposes an immediate-mode, fixed-function draw model: 16 vertex
//! attribute slots fed from guest memory arrays or immediate registers,
//! topologies the host cannot always rasterize directly, and fixed-layout
//! uniform state. This crate converts one draw command plus a snapshot of
//! that state into host-API-neutral buffer views, index streams and constant
//! blocks, staged in a [`sirocco_gpu::UploadHeap`]:
//!
//! - [`vertex`] maps guest attribute descriptors to host element formats and
//!   channel mappings.
//! - [`state::topology`] classifies topologies and synthesizes index streams
//!   for the emulated ones.
//! - [`draw`] dispatches array / indexed / inlined draw commands.
//! - [`constants`] materializes the per-draw constant blocks.

pub mod constants;
pub mod draw;
mod error;
pub mod state;
pub mod vertex;

pub use constants::{ConstantsMaterializer, DrawConstants, DrawConstantsSource};
pub use draw::{AttributeView, DrawCall, DrawCommand, DrawRange, DrawTranslation, DrawTranslator};
pub use error::TranslateError;
pub use state::{AlphaTest, DrawState, FragmentProgramKey, TextureSlot, TEXTURE_UNITS};
pub use vertex::{
    AttributeSource, ElementType, RegisterValue, VertexAttributeDescriptor,
    VERTEX_ATTRIBUTE_SLOTS,
};
