use half::f16;
use sirocco_gpu::HostCapabilities;

use crate::error::TranslateError;
use crate::vertex::ElementType;

/// Scalar encodings the host element formats are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostScalar {
    Float32,
    Float16,
    Unorm8,
    Snorm16,
    Sint16,
    Uint8,
}

impl HostScalar {
    pub fn byte_size(self) -> u32 {
        match self {
            HostScalar::Float32 => 4,
            HostScalar::Float16 => 2,
            HostScalar::Unorm8 => 1,
            HostScalar::Snorm16 => 2,
            HostScalar::Sint16 => 2,
            HostScalar::Uint8 => 1,
        }
    }
}

/// Host-API-neutral element format: a scalar encoding and a component count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostElementFormat {
    pub scalar: HostScalar,
    pub components: u8,
}

impl HostElementFormat {
    pub fn byte_size(self) -> u32 {
        self.scalar.byte_size() * u32::from(self.components)
    }
}

/// Where one shader-visible channel of an element view reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Component `n` of the element in memory.
    Memory(u8),
    /// Constant 0.
    Zero,
    /// Constant 1.
    One,
}

/// Four-channel mapping applied by the host when sampling the element view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentMapping(pub [Channel; 4]);

/// Channel mapping for an element with `components` stored components:
/// missing channels read 0, except the last, which reads 1.
pub fn component_mapping(components: u8) -> ComponentMapping {
    debug_assert!((1..=4).contains(&components));
    let mut channels = [Channel::Zero; 4];
    for (i, channel) in channels.iter_mut().enumerate().take(components as usize) {
        *channel = Channel::Memory(i as u8);
    }
    if components < 4 {
        channels[3] = Channel::One;
    }
    ComponentMapping(channels)
}

/// Per-element rewrite applied while copying guest data into the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementConversion {
    None,
    /// Widen a half-float vector to 32-bit floats (host lacks 16-bit fetch).
    HalfToF32 { components: u8 },
    /// Expand a packed signed-normalized 11/11/10 word to three floats.
    Unpack11_11_10,
}

/// How a guest attribute element is represented on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementFormat {
    pub format: HostElementFormat,
    pub mapping: ComponentMapping,
    /// Bytes one element occupies in guest memory.
    pub guest_size: u32,
    /// Bytes one element occupies in the upload heap.
    pub host_size: u32,
    pub conversion: ElementConversion,
}

pub fn map_element_format(
    ty: ElementType,
    components: u8,
    caps: &HostCapabilities,
) -> Result<ElementFormat, TranslateError> {
    let unsupported = TranslateError::UnsupportedElementFormat { ty, components };
    if components == 0 || components > 4 {
        return Err(unsupported);
    }

    let out = match ty {
        ElementType::Packed11_11_10 => {
            // One packed word per element; the host sees float32x3.
            if components != 1 {
                return Err(unsupported);
            }
            ElementFormat {
                format: HostElementFormat {
                    scalar: HostScalar::Float32,
                    components: 3,
                },
                mapping: component_mapping(3),
                guest_size: 4,
                host_size: 12,
                conversion: ElementConversion::Unpack11_11_10,
            }
        }
        ElementType::Float16 if !caps.supports_float16_vertex => ElementFormat {
            format: HostElementFormat {
                scalar: HostScalar::Float32,
                components,
            },
            mapping: component_mapping(components),
            guest_size: 2 * u32::from(components),
            host_size: 4 * u32::from(components),
            conversion: ElementConversion::HalfToF32 { components },
        },
        _ => {
            let scalar = match ty {
                ElementType::Float32 => HostScalar::Float32,
                ElementType::Float16 => HostScalar::Float16,
                ElementType::Unorm8 => HostScalar::Unorm8,
                ElementType::Snorm16 => HostScalar::Snorm16,
                ElementType::Sint16 => HostScalar::Sint16,
                ElementType::Uint8 => HostScalar::Uint8,
                ElementType::Packed11_11_10 => unreachable!(),
            };
            let format = HostElementFormat { scalar, components };
            ElementFormat {
                format,
                mapping: component_mapping(components),
                guest_size: format.byte_size(),
                host_size: format.byte_size(),
                conversion: ElementConversion::None,
            }
        }
    };

    Ok(out)
}

/// Copy one element from `src` (guest layout) into `dst` (host layout),
/// applying the plan's conversion. `src` must hold `guest_size` bytes and
/// `dst` must hold `host_size` bytes.
pub fn convert_element(plan: &ElementFormat, src: &[u8], dst: &mut [u8]) {
    debug_assert!(src.len() >= plan.guest_size as usize);
    debug_assert!(dst.len() >= plan.host_size as usize);

    match plan.conversion {
        ElementConversion::None => {
            let bytes = plan.guest_size as usize;
            dst[..bytes].copy_from_slice(&src[..bytes]);
        }
        ElementConversion::HalfToF32 { components } => {
            for i in 0..components as usize {
                let half_bits = u16::from_le_bytes([src[i * 2], src[i * 2 + 1]]);
                let v = f16::from_bits(half_bits).to_f32();
                dst[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
        }
        ElementConversion::Unpack11_11_10 => {
            let packed = u32::from_le_bytes(src[..4].try_into().unwrap());
            let (x, y, z) = unpack_11_11_10(packed);
            dst[0..4].copy_from_slice(&x.to_le_bytes());
            dst[4..8].copy_from_slice(&y.to_le_bytes());
            dst[8..12].copy_from_slice(&z.to_le_bytes());
        }
    }
}

fn unpack_11_11_10(packed: u32) -> (f32, f32, f32) {
    let x = sign_extend(packed & 0x7ff, 11);
    let y = sign_extend((packed >> 11) & 0x7ff, 11);
    let z = sign_extend((packed >> 22) & 0x3ff, 10);
    (
        snorm_to_f32(x, 1023.0),
        snorm_to_f32(y, 1023.0),
        snorm_to_f32(z, 511.0),
    )
}

fn sign_extend(v: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((v << shift) as i32) >> shift
}

fn snorm_to_f32(v: i32, max: f32) -> f32 {
    // Signed normalized: [-max-1, max] maps to [-1, 1], with the most
    // negative code clamped to -1.
    if (v as f32) < -max {
        -1.0
    } else {
        v as f32 / max
    }
}
