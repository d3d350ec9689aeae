use std::fmt;

use sirocco_gpu::IndexWidth;

/// Guest primitive topologies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
    LineLoop,
}

impl fmt::Display for PrimitiveTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveTopology::Points => "points",
            PrimitiveTopology::Lines => "lines",
            PrimitiveTopology::LineStrip => "line_strip",
            PrimitiveTopology::Triangles => "triangles",
            PrimitiveTopology::TriangleStrip => "triangle_strip",
            PrimitiveTopology::TriangleFan => "triangle_fan",
            PrimitiveTopology::Quads => "quads",
            PrimitiveTopology::QuadStrip => "quad_strip",
            PrimitiveTopology::Polygon => "polygon",
            PrimitiveTopology::LineLoop => "line_loop",
        };
        f.write_str(s)
    }
}

/// Topologies the host rasterizes directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopologyTranslation {
    pub host: HostTopology,
    /// The host has no native rasterization for the guest topology; callers
    /// must draw with a synthesized index stream.
    pub needs_index_emulation: bool,
}

pub fn is_native(topology: PrimitiveTopology) -> bool {
    !translate_topology(topology).needs_index_emulation
}

pub fn translate_topology(topology: PrimitiveTopology) -> TopologyTranslation {
    let native = |host| TopologyTranslation {
        host,
        needs_index_emulation: false,
    };
    let emulated = |host| TopologyTranslation {
        host,
        needs_index_emulation: true,
    };

    match topology {
        PrimitiveTopology::Points => native(HostTopology::PointList),
        PrimitiveTopology::Lines => native(HostTopology::LineList),
        PrimitiveTopology::LineStrip => native(HostTopology::LineStrip),
        PrimitiveTopology::Triangles => native(HostTopology::TriangleList),
        PrimitiveTopology::TriangleStrip => native(HostTopology::TriangleStrip),
        PrimitiveTopology::TriangleFan => emulated(HostTopology::TriangleList),
        PrimitiveTopology::Quads => emulated(HostTopology::TriangleList),
        PrimitiveTopology::QuadStrip => emulated(HostTopology::TriangleList),
        PrimitiveTopology::Polygon => emulated(HostTopology::TriangleList),
        // A loop is a strip plus one closing index.
        PrimitiveTopology::LineLoop => emulated(HostTopology::LineStrip),
    }
}

/// Number of indices synthesized for `vertex_count` vertices of an emulated
/// topology. Native topologies consume one index per vertex.
///
/// Per-topology formulas (counts below the topology minimum yield 0):
/// - triangle fan / polygon: `(n - 2) * 3`
/// - quads: `n / 4 * 6`
/// - quad strip: `(n - 2) / 2 * 6`
/// - line loop: `n + 1` (drawn as a line strip)
pub fn emulated_index_count(topology: PrimitiveTopology, vertex_count: u32) -> u32 {
    match topology {
        PrimitiveTopology::TriangleFan | PrimitiveTopology::Polygon => {
            vertex_count.saturating_sub(2) * 3
        }
        PrimitiveTopology::Quads => vertex_count / 4 * 6,
        PrimitiveTopology::QuadStrip => vertex_count.saturating_sub(2) / 2 * 6,
        PrimitiveTopology::LineLoop => {
            if vertex_count < 2 {
                0
            } else {
                vertex_count + 1
            }
        }
        _ => vertex_count,
    }
}

/// Synthesize indices for one non-indexed `(base, count)` vertex range of an
/// emulated topology, appended to `out`. Indices are relative to the
/// concatenated vertex upload, so `base` is the running total of prior range
/// counts.
pub fn expand_nonindexed(
    topology: PrimitiveTopology,
    base: u32,
    count: u32,
    out: &mut Vec<u32>,
) {
    debug_assert!(!is_native(topology));
    match topology {
        PrimitiveTopology::TriangleFan | PrimitiveTopology::Polygon => {
            for i in 0..count.saturating_sub(2) {
                out.extend_from_slice(&[base, base + i + 1, base + i + 2]);
            }
        }
        PrimitiveTopology::Quads => {
            for q in 0..count / 4 {
                let b = base + q * 4;
                out.extend_from_slice(&[b, b + 1, b + 2, b + 2, b + 3, b]);
            }
        }
        PrimitiveTopology::QuadStrip => {
            for q in 0..count.saturating_sub(2) / 2 {
                let b = base + q * 2;
                out.extend_from_slice(&[b, b + 1, b + 2, b + 2, b + 1, b + 3]);
            }
        }
        PrimitiveTopology::LineLoop => {
            if count >= 2 {
                out.extend(base..base + count);
                out.push(base);
            }
        }
        _ => {}
    }
}

/// Synthesize an emulated-topology stream over already-decoded guest index
/// values, appended to `out`. The same patterns as [`expand_nonindexed`],
/// applied to the values instead of a contiguous range.
pub fn expand_indexed(topology: PrimitiveTopology, indices: &[u32], out: &mut Vec<u32>) {
    debug_assert!(!is_native(topology));
    let n = indices.len();
    match topology {
        PrimitiveTopology::TriangleFan | PrimitiveTopology::Polygon => {
            for i in 0..n.saturating_sub(2) {
                out.extend_from_slice(&[indices[0], indices[i + 1], indices[i + 2]]);
            }
        }
        PrimitiveTopology::Quads => {
            for quad in indices.chunks_exact(4) {
                out.extend_from_slice(&[quad[0], quad[1], quad[2], quad[2], quad[3], quad[0]]);
            }
        }
        PrimitiveTopology::QuadStrip => {
            for q in 0..n.saturating_sub(2) / 2 {
                let b = q * 2;
                out.extend_from_slice(&[
                    indices[b],
                    indices[b + 1],
                    indices[b + 2],
                    indices[b + 2],
                    indices[b + 1],
                    indices[b + 3],
                ]);
            }
        }
        PrimitiveTopology::LineLoop => {
            if n >= 2 {
                out.extend_from_slice(indices);
                out.push(indices[0]);
            }
        }
        _ => {}
    }
}

/// `[min, max]` referenced vertex index across a stream.
pub fn index_bounds(indices: &[u32]) -> Option<(u32, u32)> {
    indices
        .iter()
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v))),
        })
}

/// Synthesized streams are 16-bit unless the addressed index domain exceeds
/// what 16 bits can name.
pub fn width_for_max_index(max: u32) -> IndexWidth {
    if max > u32::from(u16::MAX) {
        IndexWidth::U32
    } else {
        IndexWidth::U16
    }
}
