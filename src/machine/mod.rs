//! Transformation machine: bytecode for skeleton hierarchies
//!
//! A transformation machine is a flat stream of 32-bit words describing how
//! to build the world-space matrix of every joint in a skeleton. Evaluation
//! is a small stack VM: the top of the working stack is the current
//! local-to-world frame, transforms compose into it, and output commands
//! copy it into an output array.
//!
//! # Architecture
//!
//! - **Word stream**: opcodes followed by inline operands ([`OpCode`])
//! - **Working stack**: up to [`EvalConfig::max_stack_depth`] `Mat4` frames
//! - **Parameter block**: byte buffer of animated values, read at
//!   byte offsets ([`ParameterBlock`])
//! - **Output array**: one `Mat4` per output slot, identity until written
//!
//! ## Instruction Format
//!
//! ```text
//! ┌────────┬──────────────────────────────────────────┐
//! │ opcode │ operands (0..17 words, see OpCode docs)  │
//! └────────┴──────────────────────────────────────────┘
//! BindingPointN: opcode, name lo, name hi, then N complete static transforms
//! ```
//!
//! # Usage
//!
//! ```rust
//! use skeleton_machine::machine::*;
//! use glam::{Mat4, Vec3};
//!
//! let stream = CommandStream::from_instructions(&[
//!     Instruction::Static(Transform::Translate(Vec3::new(1.0, 0.0, 0.0))),
//!     Instruction::WriteOutput(0),
//! ]);
//! let mut out = [Mat4::ZERO; 1];
//! evaluate(&stream, &ParameterBlock::empty(), &mut out).unwrap();
//! assert_eq!(out[0], Mat4::from_translation(Vec3::X));
//! ```
//!
//! Author: Moroya Sakamoto

mod eval;
mod instruction;
mod opcode;
mod params;
mod remap;
mod stream;
mod trace;

pub use eval::{
    calculate_parent_pointers, evaluate, evaluate_batch_parallel, evaluate_to_vec,
    evaluate_with_config, evaluate_with_visitor, NO_PARENT,
};
pub use instruction::{
    decode_all, encode_all, CommentText, Instruction, Transform, TransformKind,
    MAX_BINDING_DEFAULTS,
};
pub use opcode::{OpCode, COMMENT_WORDS};
pub use params::{ParameterBlock, ParameterBlockBuilder};
pub use remap::{remap_output_matrices, UNMAPPED};
pub use stream::{advance, CommandStream, Offsets};
pub use trace::{trace, trace_with_names, trace_to_string};

use serde::{Deserialize, Serialize};

/// Default working stack capacity
pub const MAX_STACK_DEPTH: usize = 64;

/// Error type for malformed streams and evaluation failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MachineError {
    /// Leading word is not a known opcode
    #[error("unknown opcode {opcode} at word {offset}")]
    UnknownOpcode {
        /// Raw word value
        opcode: u32,
        /// Word offset in the stream
        offset: usize,
    },
    /// Instruction extends past the end of the stream
    #[error("truncated instruction at word {offset}: needs {needed} words, stream has {len}")]
    Truncated {
        /// Word offset of the instruction
        offset: usize,
        /// Words the instruction needs
        needed: usize,
        /// Stream length in words
        len: usize,
    },
    /// Push beyond the working stack capacity
    #[error("working stack overflow (limit {limit})")]
    StackOverflow {
        /// Configured capacity
        limit: usize,
    },
    /// Pop of more frames than were pushed
    #[error("working stack underflow: pop {pop_count} with {depth} pushed frames")]
    StackUnderflow {
        /// Requested pop count
        pop_count: u32,
        /// Frames pushed above the root
        depth: usize,
    },
    /// Parameter read outside the parameter block
    #[error("parameter read at byte {offset} (size {size}) exceeds block of {block_len} bytes")]
    ParameterOutOfRange {
        /// Byte offset
        offset: u32,
        /// Bytes requested
        size: usize,
        /// Block length in bytes
        block_len: usize,
    },
    /// Binding point default that is not a static transform
    #[error("binding point default at word {offset} is not a static transform (opcode {opcode})")]
    InvalidBindingDefault {
        /// Raw word value of the offending default
        opcode: u32,
        /// Word offset in the stream
        offset: usize,
    },
    /// Stream leaves frames on the stack
    #[error("unbalanced stream: {depth} frames left pushed")]
    UnbalancedStream {
        /// Frames still pushed at end of stream
        depth: usize,
    },
    /// Byte buffer length is not a multiple of four
    #[error("byte length {0} is not a multiple of 4")]
    MisalignedBytes(usize),
}

/// Interpreter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Working stack capacity, including the root frame
    pub max_stack_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_stack_depth: MAX_STACK_DEPTH,
        }
    }
}
