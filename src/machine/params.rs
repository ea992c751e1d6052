//! Parameter block: animated values read at byte offsets
//!
//! Author: Moroya Sakamoto

use super::instruction::{Transform, TransformKind};
use super::MachineError;
use glam::Mat4;

/// Read-only view of a parameter block
///
/// Values are little-endian f32, laid out exactly like the inline
/// operands of the matching static transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterBlock<'a> {
    bytes: &'a [u8],
}

impl<'a> ParameterBlock<'a> {
    /// Wrap a byte buffer
    pub fn new(bytes: &'a [u8]) -> Self {
        ParameterBlock { bytes }
    }

    /// Block with no parameters
    pub fn empty() -> Self {
        ParameterBlock { bytes: &[] }
    }

    /// Block length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the block holds no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read `count` floats starting at `offset`
    fn read_floats(
        &self,
        offset: u32,
        count: usize,
        out: &mut [f32; 16],
    ) -> Result<(), MachineError> {
        let size = count * 4;
        let start = offset as usize;
        let slice = start
            .checked_add(size)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or(MachineError::ParameterOutOfRange {
                offset,
                size,
                block_len: self.bytes.len(),
            })?;
        for (dst, c) in out.iter_mut().zip(slice.chunks_exact(4)) {
            *dst = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
        }
        Ok(())
    }

    /// Read a transform of the given shape
    pub fn read_transform(
        &self,
        kind: TransformKind,
        offset: u32,
    ) -> Result<Transform, MachineError> {
        let mut floats = [0.0f32; 16];
        self.read_floats(offset, kind.float_count(), &mut floats)?;
        Ok(Transform::from_floats(kind, &floats))
    }

    /// Read a transform and promote it to a matrix
    #[inline]
    pub fn read_matrix(&self, kind: TransformKind, offset: u32) -> Result<Mat4, MachineError> {
        Ok(self.read_transform(kind, offset)?.to_mat4())
    }

    /// Read a single float
    pub fn read_f32(&self, offset: u32) -> Result<f32, MachineError> {
        let mut floats = [0.0f32; 16];
        self.read_floats(offset, 1, &mut floats)?;
        Ok(floats[0])
    }
}

/// Builds parameter blocks, returning the byte offset of each value
#[derive(Debug, Clone, Default)]
pub struct ParameterBlockBuilder {
    bytes: Vec<u8>,
}

impl ParameterBlockBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform payload and return its byte offset
    pub fn push_transform(&mut self, transform: &Transform) -> u32 {
        let offset = self.bytes.len() as u32;
        let floats = transform.to_floats();
        for f in &floats[..transform.kind().float_count()] {
            self.bytes.extend_from_slice(&f.to_le_bytes());
        }
        offset
    }

    /// Append a single float and return its byte offset
    pub fn push_f32(&mut self, value: f32) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(&value.to_le_bytes());
        offset
    }

    /// Overwrite a transform payload at an existing offset
    ///
    /// Returns false if the payload would not fit.
    pub fn set_transform(&mut self, offset: u32, transform: &Transform) -> bool {
        let size = transform.kind().parameter_size();
        let start = offset as usize;
        let Some(dst) = self.bytes.get_mut(start..start + size) else {
            return false;
        };
        let floats = transform.to_floats();
        for (c, f) in dst.chunks_exact_mut(4).zip(floats.iter()) {
            c.copy_from_slice(&f.to_le_bytes());
        }
        true
    }

    /// Current size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if nothing has been pushed
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the bytes as a block
    pub fn as_block(&self) -> ParameterBlock<'_> {
        ParameterBlock::new(&self.bytes)
    }

    /// Finish and return the raw bytes
    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
