//! Per-draw constant block materialization.
//!
//! Three independently sized blocks are staged in the upload heap before
//! every submission: the fixed scale-offset block, the vertex constants
//! window, and the fragment constants window sized by the bound fragment
//! program.

use bytemuck::{Pod, Zeroable};
use hashbrown::HashMap;
use sirocco_gpu::{align_up, ConstantBufferView, HostGraphicsDevice, UploadHeap};
use tracing::trace;

use crate::error::TranslateError;
use crate::state::{DrawState, FragmentProgramKey, TEXTURE_UNITS};

/// Scale-offset block size. Fixed regardless of how many texture units are
/// enabled so addressing stays constant.
pub const SCALE_OFFSET_BLOCK_SIZE: u64 = 256;

/// Vertex constants window: 512 vec4 of f32.
pub const VERTEX_CONSTANTS_SIZE: u64 = 512 * 4 * 4;

/// Fragment constant windows are rounded up to this granularity, never 0.
pub const FRAGMENT_BLOCK_GRANULARITY: u64 = 256;

/// Supplies the externally owned constant data for one draw.
///
/// The `dst` windows handed to the fill methods are exactly the mapped heap
/// regions the blocks are submitted from.
pub trait DrawConstantsSource {
    /// The 4x4 viewport transform, row by row.
    fn transform(&self) -> [f32; 16];

    /// Fill the 8192-byte vertex constants window.
    fn fill_vertex_constants(&self, dst: &mut [u8]);

    /// Bytes of fragment constants the given program requires.
    fn fragment_constants_size(&self, program: FragmentProgramKey) -> u32;

    /// Fill the fragment constants window for the given program.
    fn fill_fragment_constants(&self, program: FragmentProgramKey, dst: &mut [u8]);
}

// Byte layout of the scale-offset block: transform at 0, alpha test enable
// at 64, alpha reference at 68, one unorm flag per texture unit from 72,
// padded to 256.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ScaleOffsetBlock {
    transform: [f32; 16],
    alpha_test_enable: u32,
    alpha_ref: f32,
    texture_unorm: [u32; TEXTURE_UNITS],
    _pad: [u32; 30],
}

const _: () = assert!(std::mem::size_of::<ScaleOffsetBlock>() == SCALE_OFFSET_BLOCK_SIZE as usize);

/// The three constant buffer views bound for one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawConstants {
    pub scale_offset: ConstantBufferView,
    pub vertex: ConstantBufferView,
    pub fragment: ConstantBufferView,
}

/// Stages the per-draw constant blocks, caching fragment constant sizes per
/// program so the source is only asked once per program.
#[derive(Default)]
pub struct ConstantsMaterializer {
    fragment_sizes: HashMap<FragmentProgramKey, u32>,
    hits: u64,
    misses: u64,
}

impl ConstantsMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn materialize(
        &mut self,
        device: &mut dyn HostGraphicsDevice,
        heap: &mut UploadHeap,
        state: &DrawState,
        source: &dyn DrawConstantsSource,
    ) -> Result<DrawConstants, TranslateError> {
        device.begin_heap_writes();
        let result = self.materialize_inner(device, heap, state, source);
        device.end_heap_writes();
        result
    }

    fn materialize_inner(
        &mut self,
        device: &dyn HostGraphicsDevice,
        heap: &mut UploadHeap,
        state: &DrawState,
        source: &dyn DrawConstantsSource,
    ) -> Result<DrawConstants, TranslateError> {
        let alignment = device.capabilities().min_constant_buffer_alignment.max(1);
        let base = device.upload_base_address();

        // Scale-offset block.
        let block = ScaleOffsetBlock {
            transform: source.transform(),
            alpha_test_enable: u32::from(state.alpha_test.enabled),
            alpha_ref: state.alpha_test.reference,
            texture_unorm: std::array::from_fn(|unit| {
                let slot = state.textures[unit];
                u32::from(slot.enabled && slot.unorm)
            }),
            _pad: [0; 30],
        };
        let offset = heap.alloc(SCALE_OFFSET_BLOCK_SIZE, alignment)?;
        let dst = heap.map(offset, SCALE_OFFSET_BLOCK_SIZE)?;
        dst.copy_from_slice(bytemuck::bytes_of(&block));
        heap.unmap(offset, SCALE_OFFSET_BLOCK_SIZE);
        let scale_offset = ConstantBufferView {
            device_address: base + offset,
            byte_size: SCALE_OFFSET_BLOCK_SIZE,
        };

        // Vertex constants.
        let offset = heap.alloc(VERTEX_CONSTANTS_SIZE, alignment)?;
        let dst = heap.map(offset, VERTEX_CONSTANTS_SIZE)?;
        dst.fill(0);
        source.fill_vertex_constants(dst);
        heap.unmap(offset, VERTEX_CONSTANTS_SIZE);
        let vertex = ConstantBufferView {
            device_address: base + offset,
            byte_size: VERTEX_CONSTANTS_SIZE,
        };

        // Fragment constants, sized by the bound program.
        let size = self.fragment_block_size(state.fragment_program, source);
        let offset = heap.alloc(size, alignment)?;
        let dst = heap.map(offset, size)?;
        dst.fill(0);
        source.fill_fragment_constants(state.fragment_program, dst);
        heap.unmap(offset, size);
        let fragment = ConstantBufferView {
            device_address: base + offset,
            byte_size: size,
        };

        trace!(
            program = state.fragment_program.0,
            fragment_size = size,
            "constant blocks staged"
        );

        Ok(DrawConstants {
            scale_offset,
            vertex,
            fragment,
        })
    }

    fn fragment_block_size(
        &mut self,
        program: FragmentProgramKey,
        source: &dyn DrawConstantsSource,
    ) -> u64 {
        let raw = match self.fragment_sizes.get(&program) {
            Some(&size) => {
                self.hits += 1;
                size
            }
            None => {
                let size = source.fragment_constants_size(program);
                self.fragment_sizes.insert(program, size);
                self.misses += 1;
                size
            }
        };
        align_up(u64::from(raw.max(1)), FRAGMENT_BLOCK_GRANULARITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TextureSlot;
    use sirocco_gpu::{
        HostCapabilities, OverflowPolicy, RetirementFence, UploadHeapDescriptor,
    };

    struct TestDevice;

    impl HostGraphicsDevice for TestDevice {
        fn capabilities(&self) -> HostCapabilities {
            HostCapabilities::default()
        }

        fn upload_base_address(&self) -> u64 {
            0x10_0000
        }

        fn begin_heap_writes(&mut self) {}

        fn end_heap_writes(&mut self) {}
    }

    struct IdleFence;

    impl RetirementFence for IdleFence {
        fn completed(&self) -> u64 {
            0
        }

        fn wait(&self, value: u64) -> u64 {
            value
        }
    }

    struct TestSource {
        fragment_size: u32,
    }

    impl DrawConstantsSource for TestSource {
        fn transform(&self) -> [f32; 16] {
            std::array::from_fn(|i| i as f32)
        }

        fn fill_vertex_constants(&self, dst: &mut [u8]) {
            dst.fill(0x11);
        }

        fn fragment_constants_size(&self, _program: FragmentProgramKey) -> u32 {
            self.fragment_size
        }

        fn fill_fragment_constants(&self, _program: FragmentProgramKey, dst: &mut [u8]) {
            dst[0] = 0x22;
        }
    }

    fn heap() -> UploadHeap {
        UploadHeap::new(
            UploadHeapDescriptor {
                capacity: 64 * 1024,
                policy: OverflowPolicy::Fail,
            },
            Box::new(IdleFence),
        )
    }

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn read_f32(bytes: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn scale_offset_block_layout_is_fixed() {
        let mut state = DrawState::default();
        state.alpha_test.enabled = true;
        state.alpha_test.reference = 0.5;
        state.textures[0] = TextureSlot {
            enabled: true,
            unorm: true,
        };
        state.textures[1] = TextureSlot {
            enabled: true,
            unorm: false,
        };

        let mut device = TestDevice;
        let mut heap = heap();
        let source = TestSource { fragment_size: 16 };
        let constants = ConstantsMaterializer::new()
            .materialize(&mut device, &mut heap, &state, &source)
            .unwrap();

        assert_eq!(constants.scale_offset.byte_size, 256);
        let offset = constants.scale_offset.device_address - device.upload_base_address();
        let bytes = heap.bytes(offset, 256).unwrap();

        assert_eq!(read_f32(bytes, 0), 0.0);
        assert_eq!(read_f32(bytes, 60), 15.0);
        assert_eq!(read_u32(bytes, 64), 1);
        assert_eq!(read_f32(bytes, 68), 0.5);
        assert_eq!(read_u32(bytes, 72), 1);
        assert_eq!(read_u32(bytes, 76), 0);
        // Disabled units read the defined "not applicable" value.
        assert_eq!(read_u32(bytes, 80), 0);
    }

    #[test]
    fn vertex_constants_are_a_fixed_8192_byte_window() {
        let mut device = TestDevice;
        let mut heap = heap();
        let source = TestSource { fragment_size: 16 };
        let constants = ConstantsMaterializer::new()
            .materialize(&mut device, &mut heap, &DrawState::default(), &source)
            .unwrap();

        assert_eq!(constants.vertex.byte_size, 8192);
        let offset = constants.vertex.device_address - device.upload_base_address();
        let bytes = heap.bytes(offset, 8192).unwrap();
        assert!(bytes.iter().all(|&b| b == 0x11));
    }

    #[test]
    fn fragment_block_rounds_up_and_is_never_zero() {
        let mut device = TestDevice;
        let mut materializer = ConstantsMaterializer::new();

        for (reported, expected) in [(0u32, 256u64), (1, 256), (256, 256), (257, 512)] {
            let mut heap = heap();
            let mut state = DrawState::default();
            state.fragment_program = FragmentProgramKey(reported);
            let source = TestSource {
                fragment_size: reported,
            };
            let constants = materializer
                .materialize(&mut device, &mut heap, &state, &source)
                .unwrap();
            assert_eq!(constants.fragment.byte_size, expected);
            assert_eq!(constants.fragment.device_address % 256, device.upload_base_address() % 256);
        }
    }

    #[test]
    fn fragment_sizes_are_cached_per_program() {
        let mut device = TestDevice;
        let mut heap = heap();
        let mut materializer = ConstantsMaterializer::new();
        let source = TestSource { fragment_size: 64 };

        let state = DrawState::default();
        materializer
            .materialize(&mut device, &mut heap, &state, &source)
            .unwrap();
        materializer
            .materialize(&mut device, &mut heap, &state, &source)
            .unwrap();

        assert_eq!(materializer.misses(), 1);
        assert_eq!(materializer.hits(), 1);
    }
}
