//! Macro pattern fusion
//!
//! ```text
//! PushLocalToWorld
//!   TransformFloat4x4_Static (M)          PushLocalToWorld
//!   WriteOutputMatrix [5]          →        TransformFloat4x4AndWrite_Static [5] (M)
//! PopLocalToWorld (1)                     PopLocalToWorld (1)
//! ```
//!
//! The surrounding push/pop is left for the redundant push pass, which
//! removes it because the fused write no longer modifies the frame.
//!
//! Author: Moroya Sakamoto

use super::rewrite::Rewrite;
use crate::machine::{Instruction, Transform, TransformKind};

/// Fuse a Float4x4 transform followed by a write at the end of its branch
///
/// The write must be followed by a pop or by the end of the stream, so the
/// transform is not observed by anything after it.
pub fn fuse_patterns(mut insts: Vec<Instruction>) -> Vec<Instruction> {
    let mut i = 0;
    while i + 1 < insts.len() {
        let closes = match insts.get(i + 2) {
            None => true,
            Some(Instruction::Pop(n)) => *n > 0,
            Some(_) => false,
        };
        let fused = match (&insts[i], &insts[i + 1]) {
            (Instruction::Static(Transform::Matrix(m)), Instruction::WriteOutput(o)) if closes => {
                Some(Instruction::TransformAndWriteStatic {
                    output: *o,
                    matrix: *m,
                })
            }
            (
                Instruction::Parameter {
                    kind: TransformKind::Float4x4,
                    offset,
                },
                Instruction::WriteOutput(o),
            ) if closes => Some(Instruction::TransformAndWriteParameter {
                output: *o,
                offset: *offset,
            }),
            _ => None,
        };

        if let Some(fused) = fused {
            let mut rw = Rewrite::new();
            rw.replace(i, [fused]).remove(i + 1);
            insts = rw.apply(&insts);
        }
        i += 1;
    }
    insts
}
