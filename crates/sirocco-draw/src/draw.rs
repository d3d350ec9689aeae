//! Draw command dispatch.
//!
//! One guest draw command plus one [`DrawState`] snapshot goes in; one
//! [`DrawCall`] (host topology, staged attribute views, optional index view)
//! comes out. Each command is translated independently; the only state
//! shared between draws is the upload heap cursor.

use sirocco_gpu::{
    align_up, GuestMemory, HostCapabilities, HostGraphicsDevice, IndexBufferView, IndexWidth,
    UploadHeap,
};
use tracing::debug;

use crate::constants::{ConstantsMaterializer, DrawConstants, DrawConstantsSource};
use crate::error::TranslateError;
use crate::state::topology::{
    emulated_index_count, expand_indexed, expand_nonindexed, index_bounds, translate_topology,
    width_for_max_index, HostTopology, TopologyTranslation,
};
use crate::state::DrawState;
use crate::vertex::{
    convert_element, map_element_format, AttributeSource, ComponentMapping, ElementFormat,
    HostElementFormat, RegisterValue, VertexAttributeDescriptor,
};

/// Index regions are padded to this size before allocation.
const INDEX_SIZE_PADDING: u64 = 64;

/// One `(first, count)` vertex or index range of a draw command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    pub first: u32,
    pub count: u32,
}

/// A guest draw command. Borrows the raw guest payloads; nothing is retained
/// past the translation call.
#[derive(Debug, Clone, Copy)]
pub enum DrawCommand<'a> {
    /// Non-indexed draw over vertex ranges.
    Array { ranges: &'a [DrawRange] },
    /// Indexed draw: `ranges` select elements of the raw guest index stream.
    Indexed {
        ranges: &'a [DrawRange],
        width: IndexWidth,
        index_data: &'a [u8],
    },
    /// Vertex payload embedded in the command stream, already interleaved in
    /// host layout.
    InlinedArray { words: &'a [u32] },
}

impl DrawCommand<'_> {
    fn kind(&self) -> &'static str {
        match self {
            DrawCommand::Array { .. } => "array",
            DrawCommand::Indexed { .. } => "indexed",
            DrawCommand::InlinedArray { .. } => "inlined_array",
        }
    }
}

/// One staged attribute buffer, ready for view creation and binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeView {
    /// Guest attribute slot this view feeds.
    pub slot: usize,
    pub format: HostElementFormat,
    pub mapping: ComponentMapping,
    pub heap_offset: u64,
    /// `heap_offset` in elements; exact because attribute regions are
    /// aligned to a common multiple of the active element sizes.
    pub first_element: u64,
    pub element_count: u32,
    pub stride: u32,
}

/// Result of translating one draw command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub topology: HostTopology,
    /// Indices to draw when indexed, vertices otherwise.
    pub element_count: u32,
    pub attributes: Vec<AttributeView>,
    pub index: Option<IndexBufferView>,
}

impl DrawCall {
    pub fn uses_index_buffer(&self) -> bool {
        self.index.is_some()
    }
}

/// Geometry plus the three constant blocks for one draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawTranslation {
    pub call: DrawCall,
    pub constants: DrawConstants,
}

struct ActiveAttribute {
    slot: usize,
    desc: VertexAttributeDescriptor,
    plan: ElementFormat,
}

/// Translates guest draw commands against a host device.
///
/// Owns the upload heap for its rendering context; everything else is passed
/// in per call.
pub struct DrawTranslator {
    heap: UploadHeap,
    constants: ConstantsMaterializer,
}

impl DrawTranslator {
    pub fn new(heap: UploadHeap) -> Self {
        Self {
            heap,
            constants: ConstantsMaterializer::new(),
        }
    }

    pub fn heap(&self) -> &UploadHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut UploadHeap {
        &mut self.heap
    }

    pub fn constants(&self) -> &ConstantsMaterializer {
        &self.constants
    }

    /// Translate one draw: stage geometry and materialize the constant
    /// blocks.
    pub fn translate_draw(
        &mut self,
        device: &mut dyn HostGraphicsDevice,
        memory: &dyn GuestMemory,
        state: &DrawState,
        command: &DrawCommand<'_>,
        source: &dyn DrawConstantsSource,
    ) -> Result<DrawTranslation, TranslateError> {
        let call = self.translate_geometry(device, memory, state, command)?;
        let constants = self
            .constants
            .materialize(device, &mut self.heap, state, source)?;
        Ok(DrawTranslation { call, constants })
    }

    /// Stage attribute buffers and the (synthesized or pass-through) index
    /// stream for one draw command.
    pub fn translate_geometry(
        &mut self,
        device: &mut dyn HostGraphicsDevice,
        memory: &dyn GuestMemory,
        state: &DrawState,
        command: &DrawCommand<'_>,
    ) -> Result<DrawCall, TranslateError> {
        let translation = translate_topology(state.topology);
        debug!(
            command = command.kind(),
            topology = %state.topology,
            emulated = translation.needs_index_emulation,
            "translating draw"
        );

        device.begin_heap_writes();
        let result = self.translate_geometry_inner(&*device, memory, state, command, translation);
        device.end_heap_writes();
        result
    }

    fn translate_geometry_inner(
        &mut self,
        device: &dyn HostGraphicsDevice,
        memory: &dyn GuestMemory,
        state: &DrawState,
        command: &DrawCommand<'_>,
        translation: TopologyTranslation,
    ) -> Result<DrawCall, TranslateError> {
        match *command {
            DrawCommand::Array { ranges } => {
                validate_ranges(ranges)?;
                let vertex_count: u32 = ranges.iter().map(|r| r.count).sum();

                if !translation.needs_index_emulation {
                    let attributes = self.upload_attributes(device, memory, state, ranges)?;
                    return Ok(DrawCall {
                        topology: translation.host,
                        element_count: vertex_count,
                        attributes,
                        index: None,
                    });
                }

                // Synthesize indices spanning the concatenated ranges: range
                // j's pattern starts at the running total of prior counts.
                let mut indices =
                    Vec::with_capacity(emulated_index_count(state.topology, vertex_count) as usize);
                let mut base = 0u32;
                for range in ranges {
                    expand_nonindexed(state.topology, base, range.count, &mut indices);
                    base += range.count;
                }
                if indices.is_empty() {
                    return Ok(empty_call(translation.host));
                }

                let index = self.stage_synthesized_indices(device, &indices)?;
                let attributes = self.upload_attributes(device, memory, state, ranges)?;
                Ok(DrawCall {
                    topology: translation.host,
                    element_count: indices.len() as u32,
                    attributes,
                    index: Some(index),
                })
            }

            DrawCommand::Indexed {
                ranges,
                width,
                index_data,
            } => {
                validate_ranges(ranges)?;
                let decoded = decode_index_ranges(index_data, width, ranges)?;

                if !translation.needs_index_emulation {
                    let (min, max) = index_bounds(&decoded).ok_or(TranslateError::EmptyDrawRange)?;
                    debug!(min, max, "guest index bounds");
                    let index = self.stage_index_stream(device, &decoded, width)?;
                    let upload = [DrawRange {
                        first: 0,
                        count: max + 1,
                    }];
                    let attributes = self.upload_attributes(device, memory, state, &upload)?;
                    return Ok(DrawCall {
                        topology: translation.host,
                        element_count: decoded.len() as u32,
                        attributes,
                        index: Some(index),
                    });
                }

                // Rewrite the guest stream with the emulation pattern, then
                // bound the attribute upload by the rewritten indices.
                let mut rewritten = Vec::with_capacity(emulated_index_count(
                    state.topology,
                    decoded.len() as u32,
                ) as usize);
                expand_indexed(state.topology, &decoded, &mut rewritten);
                let Some((min, max)) = index_bounds(&rewritten) else {
                    return Ok(empty_call(translation.host));
                };
                debug!(min, max, "rewritten index bounds");

                let index = self.stage_synthesized_indices(device, &rewritten)?;
                let upload = [DrawRange {
                    first: 0,
                    count: max + 1,
                }];
                let attributes = self.upload_attributes(device, memory, state, &upload)?;
                Ok(DrawCall {
                    topology: translation.host,
                    element_count: rewritten.len() as u32,
                    attributes,
                    index: Some(index),
                })
            }

            DrawCommand::InlinedArray { words } => {
                let caps = device.capabilities();
                let active = active_attributes(state, &caps)?;
                if active.is_empty() {
                    return Err(TranslateError::EmptyVertexLayout);
                }

                let stride: u32 = active.iter().map(|a| a.plan.host_size).sum();
                let bytes: &[u8] = bytemuck::cast_slice(words);
                if bytes.len() % stride as usize != 0 {
                    return Err(TranslateError::TruncatedInlinedPayload {
                        bytes: bytes.len(),
                        stride,
                    });
                }
                let vertex_count = (bytes.len() / stride as usize) as u32;

                // The payload is already interleaved in host layout; slice it
                // into one region verbatim.
                let alignment = region_alignment(&active, &caps);
                let size = bytes.len() as u64;
                let offset = self.heap.alloc(size, alignment)?;
                let dst = self.heap.map(offset, size)?;
                dst.copy_from_slice(bytes);
                self.heap.unmap(offset, size);

                let mut attr_offset = 0u64;
                let attributes = active
                    .iter()
                    .map(|attr| {
                        let view = AttributeView {
                            slot: attr.slot,
                            format: attr.plan.format,
                            mapping: attr.plan.mapping,
                            heap_offset: offset + attr_offset,
                            first_element: 0,
                            element_count: vertex_count,
                            stride,
                        };
                        attr_offset += u64::from(attr.plan.host_size);
                        view
                    })
                    .collect();

                if !translation.needs_index_emulation {
                    return Ok(DrawCall {
                        topology: translation.host,
                        element_count: vertex_count,
                        attributes,
                        index: None,
                    });
                }

                let mut indices =
                    Vec::with_capacity(emulated_index_count(state.topology, vertex_count) as usize);
                expand_nonindexed(state.topology, 0, vertex_count, &mut indices);
                if indices.is_empty() {
                    return Ok(empty_call(translation.host));
                }
                let index = self.stage_synthesized_indices(device, &indices)?;
                Ok(DrawCall {
                    topology: translation.host,
                    element_count: indices.len() as u32,
                    attributes,
                    index: Some(index),
                })
            }
        }
    }

    fn upload_attributes(
        &mut self,
        device: &dyn HostGraphicsDevice,
        memory: &dyn GuestMemory,
        state: &DrawState,
        ranges: &[DrawRange],
    ) -> Result<Vec<AttributeView>, TranslateError> {
        let caps = device.capabilities();
        let active = active_attributes(state, &caps)?;
        let alignment = region_alignment(&active, &caps);
        let vertex_count: u32 = ranges.iter().map(|r| r.count).sum();

        let mut views = Vec::with_capacity(active.len());
        for attr in &active {
            let view = match attr.desc.source {
                AttributeSource::Disabled => unreachable!("active slots always have a source"),
                AttributeSource::Array { address, stride } => self.upload_array_attribute(
                    memory,
                    attr,
                    address,
                    stride,
                    ranges,
                    vertex_count,
                    alignment,
                )?,
                AttributeSource::Register(value) => {
                    self.upload_register_attribute(attr, value, alignment)?
                }
            };
            views.push(view);
        }
        Ok(views)
    }

    fn upload_array_attribute(
        &mut self,
        memory: &dyn GuestMemory,
        attr: &ActiveAttribute,
        address: u32,
        stride: u32,
        ranges: &[DrawRange],
        vertex_count: u32,
        alignment: u64,
    ) -> Result<AttributeView, TranslateError> {
        let plan = &attr.plan;
        let stride = if stride == 0 { plan.guest_size } else { stride };
        let guest_size = plan.guest_size as usize;
        let host_size = plan.host_size as usize;
        let size = u64::from(plan.host_size) * u64::from(vertex_count);

        // Read and convert into a staging run first so a faulting guest read
        // never leaves the heap mapped.
        let mut staged = vec![0u8; size as usize];
        let mut element = [0u8; 16];
        let mut written = 0usize;
        for range in ranges {
            for i in 0..range.count {
                let src =
                    u64::from(address) + u64::from(range.first + i) * u64::from(stride);
                memory.read(src, &mut element[..guest_size])?;
                convert_element(plan, &element[..guest_size], &mut staged[written..written + host_size]);
                written += host_size;
            }
        }

        let offset = self.heap.alloc(size, alignment)?;
        let dst = self.heap.map(offset, size)?;
        dst.copy_from_slice(&staged);
        self.heap.unmap(offset, size);

        Ok(attribute_view(attr, offset, vertex_count))
    }

    fn upload_register_attribute(
        &mut self,
        attr: &ActiveAttribute,
        value: RegisterValue,
        alignment: u64,
    ) -> Result<AttributeView, TranslateError> {
        let plan = &attr.plan;
        if value.as_bytes().len() != plan.guest_size as usize {
            return Err(TranslateError::RegisterSizeMismatch {
                slot: attr.slot,
                expected: plan.guest_size,
                actual: value.as_bytes().len(),
            });
        }

        let size = u64::from(plan.host_size);
        let offset = self.heap.alloc(size, alignment)?;
        let dst = self.heap.map(offset, size)?;
        convert_element(plan, value.as_bytes(), dst);
        self.heap.unmap(offset, size);

        Ok(attribute_view(attr, offset, 1))
    }

    fn stage_synthesized_indices(
        &mut self,
        device: &dyn HostGraphicsDevice,
        indices: &[u32],
    ) -> Result<IndexBufferView, TranslateError> {
        let max = indices.iter().copied().max().unwrap_or(0);
        self.stage_index_stream(device, indices, width_for_max_index(max))
    }

    fn stage_index_stream(
        &mut self,
        device: &dyn HostGraphicsDevice,
        indices: &[u32],
        width: IndexWidth,
    ) -> Result<IndexBufferView, TranslateError> {
        let caps = device.capabilities();
        let byte_size = indices.len() as u64 * width.byte_size();
        let padded = align_up(byte_size, INDEX_SIZE_PADDING);

        let mut staged = vec![0u8; padded as usize];
        match width {
            IndexWidth::U16 => {
                for (i, &v) in indices.iter().enumerate() {
                    debug_assert!(v <= u32::from(u16::MAX));
                    staged[i * 2..i * 2 + 2].copy_from_slice(&(v as u16).to_le_bytes());
                }
            }
            IndexWidth::U32 => {
                staged[..byte_size as usize].copy_from_slice(bytemuck::cast_slice(indices));
            }
        }

        let offset = self
            .heap
            .alloc(padded, caps.min_constant_buffer_alignment.max(1))?;
        let dst = self.heap.map(offset, padded)?;
        dst.copy_from_slice(&staged);
        self.heap.unmap(offset, padded);

        Ok(IndexBufferView {
            width,
            byte_size: padded,
            device_address: device.upload_base_address() + offset,
        })
    }
}

fn empty_call(topology: HostTopology) -> DrawCall {
    DrawCall {
        topology,
        element_count: 0,
        attributes: Vec::new(),
        index: None,
    }
}

fn validate_ranges(ranges: &[DrawRange]) -> Result<(), TranslateError> {
    if ranges.is_empty() || ranges.iter().any(|r| r.count == 0) {
        return Err(TranslateError::EmptyDrawRange);
    }
    Ok(())
}

fn active_attributes(
    state: &DrawState,
    caps: &HostCapabilities,
) -> Result<Vec<ActiveAttribute>, TranslateError> {
    state
        .active_slots()
        .map(|slot| {
            let desc = state.attributes[slot];
            let plan = map_element_format(desc.ty, desc.components, caps)?;
            Ok(ActiveAttribute { slot, desc, plan })
        })
        .collect()
}

/// Alignment for attribute regions: the least common multiple of the active
/// host element sizes, floored at the device's constant buffer granularity.
/// This keeps `offset / element_size` exact for every active attribute.
fn region_alignment(active: &[ActiveAttribute], caps: &HostCapabilities) -> u64 {
    active
        .iter()
        .fold(caps.min_constant_buffer_alignment.max(1), |alignment, attr| {
            lcm(alignment, u64::from(attr.plan.host_size))
        })
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

fn attribute_view(attr: &ActiveAttribute, heap_offset: u64, element_count: u32) -> AttributeView {
    AttributeView {
        slot: attr.slot,
        format: attr.plan.format,
        mapping: attr.plan.mapping,
        heap_offset,
        first_element: heap_offset / u64::from(attr.plan.host_size),
        element_count,
        stride: attr.plan.host_size,
    }
}

fn decode_index_ranges(
    data: &[u8],
    width: IndexWidth,
    ranges: &[DrawRange],
) -> Result<Vec<u32>, TranslateError> {
    let element_size = width.byte_size() as usize;
    let total: u32 = ranges.iter().map(|r| r.count).sum();

    let mut out = Vec::with_capacity(total as usize);
    for range in ranges {
        for element in range.first..range.first + range.count {
            let offset = element as usize * element_size;
            let bytes = data.get(offset..offset + element_size).ok_or(
                TranslateError::GuestIndexOutOfBounds {
                    element,
                    width: width.bits(),
                    len: data.len(),
                },
            )?;
            let value = match width {
                IndexWidth::U16 => u32::from(u16::from_le_bytes(bytes.try_into().unwrap())),
                IndexWidth::U32 => u32::from_le_bytes(bytes.try_into().unwrap()),
            };
            out.push(value);
        }
    }
    Ok(out)
}
