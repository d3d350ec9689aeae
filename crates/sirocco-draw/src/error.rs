use sirocco_gpu::{GuestMemoryError, HeapError, InvalidIndexWidth};
use thiserror::Error;

use crate::vertex::ElementType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    GuestMemory(#[from] GuestMemoryError),
    #[error(transparent)]
    IndexWidth(#[from] InvalidIndexWidth),
    #[error("unsupported vertex element format {ty:?} x{components}")]
    UnsupportedElementFormat { ty: ElementType, components: u8 },
    #[error("draw command has no ranges or contains a zero-length range")]
    EmptyDrawRange,
    #[error("index {element} ({width}-bit) is out of bounds of the {len}-byte guest index stream")]
    GuestIndexOutOfBounds {
        element: u32,
        width: u32,
        len: usize,
    },
    #[error("inlined draw has no active vertex attributes")]
    EmptyVertexLayout,
    #[error("inlined vertex payload of {bytes} bytes is not a multiple of the {stride}-byte vertex stride")]
    TruncatedInlinedPayload { bytes: usize, stride: u32 },
    #[error("attribute slot {slot} register holds {actual} bytes, expected a {expected}-byte element")]
    RegisterSizeMismatch {
        slot: usize,
        expected: u32,
        actual: usize,
    },
}
