//! Immutable guest state snapshot consumed by one translation call.
//!
//! The guest's register file is ambient and mutable; the dispatcher instead
//! takes an explicit [`DrawState`] per draw so there is no hidden cross-draw
//! coupling.

pub mod topology;

pub use topology::{HostTopology, PrimitiveTopology};

use crate::vertex::{AttributeSource, VertexAttributeDescriptor, VERTEX_ATTRIBUTE_SLOTS};

/// Number of texture units the guest exposes.
pub const TEXTURE_UNITS: usize = 16;

/// Per-texture-unit state the scale-offset block needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextureSlot {
    pub enabled: bool,
    /// Whether the bound format is unsigned-normalized.
    pub unorm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaTest {
    pub enabled: bool,
    pub reference: f32,
}

impl Default for AlphaTest {
    fn default() -> Self {
        Self {
            enabled: false,
            reference: 0.0,
        }
    }
}

/// Identifies the bound fragment program to the constants source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FragmentProgramKey(pub u32);

/// Snapshot of the guest state one draw command is translated against.
#[derive(Debug, Clone)]
pub struct DrawState {
    pub attributes: [VertexAttributeDescriptor; VERTEX_ATTRIBUTE_SLOTS],
    /// Bit i enables attribute slot i.
    pub input_mask: u16,
    pub topology: PrimitiveTopology,
    pub textures: [TextureSlot; TEXTURE_UNITS],
    pub alpha_test: AlphaTest,
    pub fragment_program: FragmentProgramKey,
}

impl DrawState {
    /// A slot contributes to the draw iff its mask bit is set AND it has a
    /// source. Mask-enabled but sourceless slots are normal sparse
    /// configuration and are skipped silently.
    pub fn slot_active(&self, slot: usize) -> bool {
        self.input_mask & (1u16 << slot) != 0
            && !matches!(self.attributes[slot].source, AttributeSource::Disabled)
    }

    pub fn active_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..VERTEX_ATTRIBUTE_SLOTS).filter(move |&slot| self.slot_active(slot))
    }
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            attributes: [VertexAttributeDescriptor::disabled(); VERTEX_ATTRIBUTE_SLOTS],
            input_mask: 0,
            topology: PrimitiveTopology::Triangles,
            textures: [TextureSlot::default(); TEXTURE_UNITS],
            alpha_test: AlphaTest::default(),
            fragment_program: FragmentProgramKey::default(),
        }
    }
}
