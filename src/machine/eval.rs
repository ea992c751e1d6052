//! Stack-based evaluation of transformation machines
//!
//! The interpreter walks the word stream once, keeping a working stack of
//! local-to-world frames. Transforms compose on the right of the top frame
//! (`top = top * local`), so the last transform in the stream is applied
//! to points first.
//!
//! Author: Moroya Sakamoto

use super::instruction::{Transform, TransformKind};
use super::opcode::OpCode;
use super::params::ParameterBlock;
use super::stream::{advance, CommandStream};
use super::{EvalConfig, MachineError};
use glam::Mat4;
use rayon::prelude::*;

/// Parent index reported for outputs with no parent (or never written)
pub const NO_PARENT: u32 = u32::MAX;

/// Fixed-capacity working stack
///
/// The root frame is never popped; `depth` counts frames pushed above it.
struct WorkingStack<T> {
    frames: Vec<T>,
    limit: usize,
}

impl<T: Copy> WorkingStack<T> {
    fn new(root: T, limit: usize) -> Self {
        let mut frames = Vec::with_capacity(limit.max(1));
        frames.push(root);
        WorkingStack { frames, limit }
    }

    #[inline]
    fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    #[inline]
    fn top(&self) -> T {
        self.frames[self.frames.len() - 1]
    }

    #[inline]
    fn parent(&self) -> Option<T> {
        self.frames.len().checked_sub(2).map(|i| self.frames[i])
    }

    #[inline]
    fn top_mut(&mut self) -> &mut T {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    #[inline]
    fn push(&mut self) -> Result<(), MachineError> {
        if self.frames.len() >= self.limit {
            return Err(MachineError::StackOverflow { limit: self.limit });
        }
        let top = self.top();
        self.frames.push(top);
        Ok(())
    }

    #[inline]
    fn pop(&mut self, pop_count: u32) -> Result<(), MachineError> {
        let depth = self.depth();
        if pop_count as usize > depth {
            return Err(MachineError::StackUnderflow { pop_count, depth });
        }
        self.frames.truncate(self.frames.len() - pop_count as usize);
        Ok(())
    }
}

/// Evaluate a machine into `output`
///
/// Every output slot is reset to identity first, so slots the stream never
/// writes stay identity. A slot written more than once keeps the last value.
pub fn evaluate(
    stream: &CommandStream,
    params: &ParameterBlock<'_>,
    output: &mut [Mat4],
) -> Result<(), MachineError> {
    run(stream.words(), params, output, &EvalConfig::default(), None)
}

/// Evaluate with an explicit configuration
pub fn evaluate_with_config(
    stream: &CommandStream,
    params: &ParameterBlock<'_>,
    output: &mut [Mat4],
    config: &EvalConfig,
) -> Result<(), MachineError> {
    run(stream.words(), params, output, config, None)
}

/// Evaluate, reporting `(parent, child)` frame pairs to `visitor`
///
/// The visitor is called before every push with the frame below the top
/// (identity at the root) and the top frame, after every in-range
/// `WriteOutputMatrix` with the same pair, and after every fused write with
/// the top frame and the written matrix. Useful for drawing skeletons.
pub fn evaluate_with_visitor<F>(
    stream: &CommandStream,
    params: &ParameterBlock<'_>,
    output: &mut [Mat4],
    mut visitor: F,
) -> Result<(), MachineError>
where
    F: FnMut(&Mat4, &Mat4),
{
    run(
        stream.words(),
        params,
        output,
        &EvalConfig::default(),
        Some(&mut visitor),
    )
}

/// Evaluate into a freshly allocated output array
pub fn evaluate_to_vec(
    stream: &CommandStream,
    params: &ParameterBlock<'_>,
    output_count: usize,
) -> Result<Vec<Mat4>, MachineError> {
    let mut output = vec![Mat4::IDENTITY; output_count];
    evaluate(stream, params, &mut output)?;
    Ok(output)
}

/// Evaluate one machine against many parameter blocks in parallel
pub fn evaluate_batch_parallel<B>(
    stream: &CommandStream,
    blocks: &[B],
    output_count: usize,
) -> Result<Vec<Vec<Mat4>>, MachineError>
where
    B: AsRef<[u8]> + Sync,
{
    blocks
        .par_iter()
        .map(|b| evaluate_to_vec(stream, &ParameterBlock::new(b.as_ref()), output_count))
        .collect()
}

fn run(
    words: &[u32],
    params: &ParameterBlock<'_>,
    output: &mut [Mat4],
    config: &EvalConfig,
    mut visitor: Option<&mut (dyn FnMut(&Mat4, &Mat4) + '_)>,
) -> Result<(), MachineError> {
    output.fill(Mat4::IDENTITY);

    let mut stack = WorkingStack::new(Mat4::IDENTITY, config.max_stack_depth);
    let mut cursor = 0;

    while cursor < words.len() {
        let next = advance(words, cursor)?;
        let op = OpCode::decode(words[cursor], cursor)?;
        let operands = &words[cursor + 1..cursor + 1 + op.operand_words()];

        match op {
            OpCode::PushLocalToWorld => {
                if let Some(v) = visitor.as_deref_mut() {
                    v(&stack.parent().unwrap_or(Mat4::IDENTITY), &stack.top());
                }
                stack.push()?;
            }
            OpCode::PopLocalToWorld => stack.pop(operands[0])?,
            OpCode::WriteOutputMatrix => {
                let index = operands[0];
                match output.get_mut(index as usize) {
                    Some(slot) => {
                        *slot = stack.top();
                        if let Some(v) = visitor.as_deref_mut() {
                            v(&stack.parent().unwrap_or(Mat4::IDENTITY), &stack.top());
                        }
                    }
                    None => log::warn!("bad output matrix index ({})", index),
                }
            }
            OpCode::TransformFloat4x4AndWriteStatic => {
                let index = operands[0];
                let local = static_matrix(op, &operands[1..], cursor)?;
                write_fused(output, index, stack.top(), local, op, visitor.as_deref_mut());
            }
            OpCode::TransformFloat4x4AndWriteParameter => {
                let index = operands[0];
                let local = params.read_matrix(TransformKind::Float4x4, operands[1])?;
                write_fused(output, index, stack.top(), local, op, visitor.as_deref_mut());
            }
            OpCode::BindingPoint0
            | OpCode::BindingPoint1
            | OpCode::BindingPoint2
            | OpCode::BindingPoint3 => {
                // defaults behave exactly like ordinary static transforms
                let mut c = cursor + 1 + op.operand_words();
                while c < next {
                    let after = advance(words, c)?;
                    let dop = OpCode::decode(words[c], c)?;
                    let local = static_matrix(dop, &words[c + 1..after], c)?;
                    *stack.top_mut() *= local;
                    c = after;
                }
            }
            OpCode::Comment => {}
            op if op.is_static_transform() => {
                let local = static_matrix(op, operands, cursor)?;
                *stack.top_mut() *= local;
            }
            op => {
                if let Some(kind) = TransformKind::from_opcode(op) {
                    let local = params.read_matrix(kind, operands[0])?;
                    *stack.top_mut() *= local;
                }
            }
        }

        cursor = next;
    }

    Ok(())
}

#[inline]
fn static_matrix(op: OpCode, operands: &[u32], offset: usize) -> Result<Mat4, MachineError> {
    Transform::decode(
        if op == OpCode::TransformFloat4x4AndWriteStatic {
            OpCode::TransformFloat4x4Static
        } else {
            op
        },
        operands,
    )
    .map(|t| t.to_mat4())
    .ok_or(MachineError::UnknownOpcode {
        opcode: op as u32,
        offset,
    })
}

#[inline]
fn write_fused(
    output: &mut [Mat4],
    index: u32,
    top: Mat4,
    local: Mat4,
    op: OpCode,
    visitor: Option<&mut (dyn FnMut(&Mat4, &Mat4) + '_)>,
) {
    match output.get_mut(index as usize) {
        Some(slot) => {
            *slot = top * local;
            if let Some(v) = visitor {
                v(&top, slot);
            }
        }
        None => log::warn!("bad output matrix index in {} ({})", op.name(), index),
    }
}

/// Infer the parent of every output slot from the push/pop structure
///
/// The parent of a slot is the slot most recently written at the same or an
/// enclosing stack level before it. Slots never written, and slots written
/// at the root before any other write, report [`NO_PARENT`]. Siblings with
/// no transform between them are indistinguishable from parent and child,
/// so the later one is reported as a child of the earlier.
pub fn calculate_parent_pointers(
    stream: &CommandStream,
    output_count: usize,
) -> Result<Vec<u32>, MachineError> {
    let words = stream.words();
    let mut result = vec![NO_PARENT; output_count];
    let mut stack = WorkingStack::new(NO_PARENT, EvalConfig::default().max_stack_depth);
    let mut cursor = 0;

    while cursor < words.len() {
        let next = advance(words, cursor)?;
        let op = OpCode::decode(words[cursor], cursor)?;

        match op {
            OpCode::PushLocalToWorld => stack.push()?,
            OpCode::PopLocalToWorld => stack.pop(words[cursor + 1])?,
            OpCode::WriteOutputMatrix => {
                let index = words[cursor + 1];
                match result.get_mut(index as usize) {
                    Some(slot) => *slot = stack.top(),
                    None => log::warn!("bad output matrix index ({})", index),
                }
                *stack.top_mut() = index;
            }
            OpCode::TransformFloat4x4AndWriteStatic
            | OpCode::TransformFloat4x4AndWriteParameter => {
                let index = words[cursor + 1];
                match result.get_mut(index as usize) {
                    Some(slot) => {
                        *slot = stack.top();
                        *stack.top_mut() = index;
                    }
                    None => log::warn!("bad output matrix index in {} ({})", op.name(), index),
                }
            }
            _ => {}
        }

        cursor = next;
    }

    Ok(result)
}
