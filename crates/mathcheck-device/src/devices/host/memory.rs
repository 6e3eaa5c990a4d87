//! Buffer storage for the host device

use std::collections::HashMap;

use crate::device::BufferHandle;
use crate::error::{DeviceError, Result};

/// Buffers owned by one host queue.
#[derive(Debug)]
pub(crate) struct HostMemory {
    buffers: HashMap<u64, Vec<u8>>,
    next_buffer_id: u64,
}

impl HostMemory {
    pub(crate) fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            next_buffer_id: 1,
        }
    }

    pub(crate) fn allocate(&mut self, size: usize) -> BufferHandle {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, vec![0u8; size]);
        BufferHandle::new(id)
    }

    pub(crate) fn free(&mut self, handle: BufferHandle) -> Result<()> {
        self.buffers
            .remove(&handle.id())
            .map(|_| ())
            .ok_or(DeviceError::InvalidBufferHandle(handle))
    }

    pub(crate) fn buffer(&self, handle: BufferHandle) -> Result<&[u8]> {
        self.buffers
            .get(&handle.id())
            .map(Vec::as_slice)
            .ok_or(DeviceError::InvalidBufferHandle(handle))
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut Vec<u8>> {
        self.buffers
            .get_mut(&handle.id())
            .ok_or(DeviceError::InvalidBufferHandle(handle))
    }

    pub(crate) fn write(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let buffer = self.buffer_mut(handle)?;
        if data.len() > buffer.len() {
            return Err(DeviceError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: buffer.len(),
            });
        }
        buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn fill(&mut self, handle: BufferHandle, pattern: &[u8]) -> Result<()> {
        let buffer = self.buffer_mut(handle)?;
        if pattern.is_empty() || buffer.len() % pattern.len() != 0 {
            return Err(DeviceError::InvalidFillPattern {
                pattern: pattern.len(),
                size: buffer.len(),
            });
        }
        for chunk in buffer.chunks_exact_mut(pattern.len()) {
            chunk.copy_from_slice(pattern);
        }
        Ok(())
    }

    pub(crate) fn read(&self, handle: BufferHandle, dst: &mut [u8]) -> Result<()> {
        let buffer = self.buffer(handle)?;
        if dst.len() > buffer.len() {
            return Err(DeviceError::BufferOutOfBounds {
                offset: 0,
                size: dst.len(),
                buffer_size: buffer.len(),
            });
        }
        dst.copy_from_slice(&buffer[..dst.len()]);
        Ok(())
    }

    /// Detach a buffer so a launch can write it while reading the others.
    pub(crate) fn take(&mut self, handle: BufferHandle) -> Result<Vec<u8>> {
        self.buffers
            .remove(&handle.id())
            .ok_or(DeviceError::InvalidBufferHandle(handle))
    }

    pub(crate) fn restore(&mut self, handle: BufferHandle, data: Vec<u8>) {
        self.buffers.insert(handle.id(), data);
    }

    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }
}
