//! Command stream container and instruction boundaries
//!
//! Author: Moroya Sakamoto

use super::instruction::{decode_all, encode_all, Instruction};
use super::opcode::OpCode;
use super::MachineError;

/// Return the word offset of the instruction after the one at `cursor`
///
/// This is the single definition of instruction size. Binding points
/// include their inline defaults, which must be static transforms.
pub fn advance(words: &[u32], cursor: usize) -> Result<usize, MachineError> {
    let len = words.len();
    let word = *words.get(cursor).ok_or(MachineError::Truncated {
        offset: cursor,
        needed: 1,
        len,
    })?;
    let op = OpCode::decode(word, cursor)?;

    let mut next = cursor + 1 + op.operand_words();
    if next > len {
        return Err(MachineError::Truncated {
            offset: cursor,
            needed: next - cursor,
            len,
        });
    }

    if let Some(count) = op.binding_default_count() {
        for _ in 0..count {
            let default = *words.get(next).ok_or(MachineError::Truncated {
                offset: cursor,
                needed: next + 1 - cursor,
                len,
            })?;
            if !OpCode::decode(default, next)?.is_static_transform() {
                return Err(MachineError::InvalidBindingDefault {
                    opcode: default,
                    offset: next,
                });
            }
            next = advance(words, next)?;
        }
    }
    Ok(next)
}

/// Owned word stream of a transformation machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandStream {
    words: Vec<u32>,
}

impl CommandStream {
    /// Wrap raw words without validation
    pub fn from_words(words: Vec<u32>) -> Self {
        CommandStream { words }
    }

    /// Encode a sequence of instructions
    pub fn from_instructions(instructions: &[Instruction]) -> Self {
        CommandStream {
            words: encode_all(instructions),
        }
    }

    /// Raw words
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Consume into raw words
    pub fn into_words(self) -> Vec<u32> {
        self.words
    }

    /// Stream length in words
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns true if the stream holds no instructions
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Stream size in bytes
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    /// Decode into typed instructions
    pub fn instructions(&self) -> Result<Vec<Instruction>, MachineError> {
        decode_all(&self.words)
    }

    /// Iterate instruction start offsets
    pub fn offsets(&self) -> Offsets<'_> {
        Offsets {
            words: &self.words,
            cursor: 0,
        }
    }

    /// Little-endian byte image
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Parse a little-endian byte image
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MachineError> {
        if bytes.len() % 4 != 0 {
            return Err(MachineError::MisalignedBytes(bytes.len()));
        }
        let words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(CommandStream { words })
    }

    /// Check that every instruction decodes and push/pop are balanced
    ///
    /// Pops never exceed pushes and no frame is left pushed at the end.
    pub fn validate(&self) -> Result<(), MachineError> {
        let mut depth = 0usize;
        let mut cursor = 0;
        while cursor < self.words.len() {
            let next = advance(&self.words, cursor)?;
            match OpCode::decode(self.words[cursor], cursor)? {
                OpCode::PushLocalToWorld => depth += 1,
                OpCode::PopLocalToWorld => {
                    let pop_count = self.words[cursor + 1];
                    depth = depth.checked_sub(pop_count as usize).ok_or(
                        MachineError::StackUnderflow { pop_count, depth },
                    )?;
                }
                _ => {}
            }
            cursor = next;
        }
        if depth != 0 {
            return Err(MachineError::UnbalancedStream { depth });
        }
        Ok(())
    }
}

impl From<Vec<u32>> for CommandStream {
    fn from(words: Vec<u32>) -> Self {
        CommandStream::from_words(words)
    }
}

/// Iterator over instruction start offsets
///
/// Yields `Err` once and stops if the stream is malformed.
pub struct Offsets<'a> {
    words: &'a [u32],
    cursor: usize,
}

impl Iterator for Offsets<'_> {
    type Item = Result<usize, MachineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.words.len() {
            return None;
        }
        let at = self.cursor;
        match advance(self.words, at) {
            Ok(next) => {
                self.cursor = next;
                Some(Ok(at))
            }
            Err(e) => {
                self.cursor = self.words.len();
                Some(Err(e))
            }
        }
    }
}
