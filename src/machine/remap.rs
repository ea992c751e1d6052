//! Output slot remapping
//!
//! Author: Moroya Sakamoto

use super::opcode::OpCode;
use super::stream::{advance, CommandStream};
use super::MachineError;

/// Mapping value that drops an output command
pub const UNMAPPED: u32 = u32::MAX;

/// Rewrite every output command's slot through `mapping`
///
/// Output commands whose slot is outside the table, or maps to
/// [`UNMAPPED`], are removed along with their operands. Everything else is
/// copied unchanged.
pub fn remap_output_matrices(
    stream: &CommandStream,
    mapping: &[u32],
) -> Result<CommandStream, MachineError> {
    let words = stream.words();
    let mut result = Vec::with_capacity(words.len());
    let mut cursor = 0;
    let mut dropped = 0usize;

    while cursor < words.len() {
        let next = advance(words, cursor)?;
        let op = OpCode::decode(words[cursor], cursor)?;
        if op.is_output() {
            let old = words[cursor + 1];
            let new = mapping.get(old as usize).copied().unwrap_or(UNMAPPED);
            if new != UNMAPPED {
                result.push(words[cursor]);
                result.push(new);
                result.extend_from_slice(&words[cursor + 2..next]);
            } else {
                dropped += 1;
            }
        } else {
            result.extend_from_slice(&words[cursor..next]);
        }
        cursor = next;
    }

    if dropped > 0 {
        log::debug!("remap dropped {} output commands", dropped);
    }
    Ok(CommandStream::from_words(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{Instruction, Transform};
    use glam::{Mat4, Vec3};

    #[test]
    fn test_remap_and_drop() {
        let stream = CommandStream::from_instructions(&[
            Instruction::Static(Transform::Translate(Vec3::X)),
            Instruction::WriteOutput(0),
            Instruction::WriteOutput(1),
            Instruction::TransformAndWriteStatic {
                output: 2,
                matrix: Mat4::IDENTITY,
            },
            Instruction::WriteOutput(9),
        ]);
        let remapped = remap_output_matrices(&stream, &[5, UNMAPPED, 0]).unwrap();
        assert_eq!(
            remapped.instructions().unwrap(),
            vec![
                Instruction::Static(Transform::Translate(Vec3::X)),
                Instruction::WriteOutput(5),
                Instruction::TransformAndWriteStatic {
                    output: 0,
                    matrix: Mat4::IDENTITY,
                },
            ]
        );
    }

    #[test]
    fn test_identity_mapping_is_noop() {
        let stream = CommandStream::from_instructions(&[
            Instruction::Push,
            Instruction::WriteOutput(1),
            Instruction::Pop(1),
            Instruction::WriteOutput(0),
        ]);
        let remapped = remap_output_matrices(&stream, &[0, 1]).unwrap();
        assert_eq!(remapped, stream);
    }
}
