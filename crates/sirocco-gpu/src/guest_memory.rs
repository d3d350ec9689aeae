//! Guest memory abstraction used by the draw translation core.
//!
//! The real emulator provides an implementation backed by its memory system;
//! the trait stays intentionally small so translation code and tests can
//! share it.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("guest memory access out of bounds: address=0x{address:x}, len=0x{len:x}")]
pub struct GuestMemoryError {
    pub address: u64,
    pub len: usize,
}

/// Minimal guest memory interface. The translation core only reads.
pub trait GuestMemory {
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError>;
}

/// Simple contiguous in-memory guest RAM implementation for tests.
#[derive(Clone, Debug)]
pub struct VecGuestMemory {
    mem: Vec<u8>,
}

impl VecGuestMemory {
    pub fn new(size_bytes: usize) -> Self {
        Self {
            mem: vec![0u8; size_bytes],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }

    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<(), GuestMemoryError> {
        let range = checked_range(address, data.len(), self.mem.len())?;
        self.mem[range].copy_from_slice(data);
        Ok(())
    }
}

impl GuestMemory for VecGuestMemory {
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let range = checked_range(address, dst.len(), self.mem.len())?;
        dst.copy_from_slice(&self.mem[range]);
        Ok(())
    }
}

fn checked_range(
    address: u64,
    len: usize,
    mem_len: usize,
) -> Result<std::ops::Range<usize>, GuestMemoryError> {
    let oob = GuestMemoryError { address, len };
    let start = usize::try_from(address).map_err(|_| oob)?;
    let end = start.checked_add(len).ok_or(oob)?;
    if end > mem_len {
        return Err(oob);
    }
    Ok(start..end)
}
