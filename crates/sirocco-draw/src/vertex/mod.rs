//! Guest vertex attribute descriptors and their host representation.

pub mod format_map;

pub use format_map::{
    component_mapping, convert_element, map_element_format, Channel, ComponentMapping,
    ElementConversion, ElementFormat, HostElementFormat, HostScalar,
};

/// Number of vertex attribute slots the guest exposes.
pub const VERTEX_ATTRIBUTE_SLOTS: usize = 16;

/// Numeric encodings a guest attribute element can use.
///
/// This is a semantic enum, not the raw guest register encoding, so the rest
/// of the translator stays independent of the guest's method layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 32-bit float.
    Float32,
    /// 16-bit half float.
    Float16,
    /// Unsigned 8-bit, normalized to [0, 1].
    Unorm8,
    /// Signed 16-bit, normalized to [-1, 1].
    Snorm16,
    /// Signed 16-bit integer.
    Sint16,
    /// Unsigned 8-bit integer.
    Uint8,
    /// One 32-bit word packing three signed-normalized 11/11/10 components.
    /// Guest component count must be 1; the host sees three floats.
    Packed11_11_10,
}

impl ElementType {
    /// Byte width of one component as stored in guest memory.
    pub fn guest_scalar_size(self) -> u32 {
        match self {
            ElementType::Float32 => 4,
            ElementType::Float16 => 2,
            ElementType::Unorm8 => 1,
            ElementType::Snorm16 => 2,
            ElementType::Sint16 => 2,
            ElementType::Uint8 => 1,
            ElementType::Packed11_11_10 => 4,
        }
    }
}

/// One immediate-register element: up to four 32-bit components written
/// directly through the command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue {
    bytes: [u8; 16],
    len: u8,
}

impl RegisterValue {
    pub fn new(data: &[u8]) -> Self {
        assert!(data.len() <= 16, "register element exceeds 16 bytes");
        let mut bytes = [0u8; 16];
        bytes[..data.len()].copy_from_slice(data);
        Self {
            bytes,
            len: data.len() as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Where a slot's element data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSource {
    Disabled,
    /// Per-vertex elements in guest memory, `stride` bytes apart.
    /// A stride of 0 means tightly packed.
    Array { address: u32, stride: u32 },
    /// A single element latched in an immediate register.
    Register(RegisterValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributeDescriptor {
    pub ty: ElementType,
    /// Component count, 1..=4.
    pub components: u8,
    pub source: AttributeSource,
}

impl VertexAttributeDescriptor {
    pub const fn disabled() -> Self {
        Self {
            ty: ElementType::Float32,
            components: 0,
            source: AttributeSource::Disabled,
        }
    }

    /// Element size in guest memory: type width times component count.
    pub fn guest_element_size(&self) -> u32 {
        self.ty.guest_scalar_size() * u32::from(self.components)
    }
}

impl Default for VertexAttributeDescriptor {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_element_size_is_width_times_count() {
        let desc = VertexAttributeDescriptor {
            ty: ElementType::Snorm16,
            components: 3,
            source: AttributeSource::Disabled,
        };
        assert_eq!(desc.guest_element_size(), 6);

        let packed = VertexAttributeDescriptor {
            ty: ElementType::Packed11_11_10,
            components: 1,
            source: AttributeSource::Disabled,
        };
        assert_eq!(packed.guest_element_size(), 4);
    }

    #[test]
    fn register_value_holds_at_most_one_element() {
        let reg = RegisterValue::new(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(reg.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
