//! # skeleton-machine
//!
//! **Transformation machines for skeletal animation**
//!
//! A skeleton is stored as a compact bytecode program instead of a node
//! tree. Running the program against a block of animated parameters
//! produces the world-space matrix of every joint in one linear pass.
//!
//! ## Features
//!
//! - **Bytecode**: push/pop frames, static and parameterized transforms,
//!   output writes, binding points, comments
//! - **Interpreter**: bounded working stack, visitor hook, parallel batches
//! - **Optimizer**: dead code, redundant pushes, transform merging, type
//!   simplification, macro fusion
//! - **Utilities**: output remapping, parent inference, disassembly
//! - **Builder**: emit machines from a node hierarchy with named outputs
//!
//! ## Example
//!
//! ```rust
//! use skeleton_machine::prelude::*;
//! use glam::{Mat4, Vec3};
//!
//! let stream = CommandStream::from_instructions(&[
//!     Instruction::Static(Transform::Translate(Vec3::new(1.0, 0.0, 0.0))),
//!     Instruction::Static(Transform::Translate(Vec3::new(2.0, 0.0, 0.0))),
//!     Instruction::WriteOutput(0),
//! ]);
//!
//! let optimized = optimize(&stream, &mut NoFold).unwrap();
//! let out = evaluate_to_vec(&optimized, &ParameterBlock::empty(), 1).unwrap();
//! assert_eq!(out[0], Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0)));
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

#![warn(missing_docs)]

pub mod machine;
pub mod optimize;
pub mod skeleton;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::machine::{
        advance, calculate_parent_pointers, evaluate, evaluate_batch_parallel, evaluate_to_vec,
        evaluate_with_config, evaluate_with_visitor, remap_output_matrices, trace, trace_to_string,
        trace_with_names, CommandStream, EvalConfig, Instruction, MachineError, OpCode,
        ParameterBlock, ParameterBlockBuilder, Transform, TransformKind, NO_PARENT, UNMAPPED,
    };
    pub use crate::optimize::{
        optimize, optimize_with_config, NoFold, OptimizationStats, OptimizeError,
        OptimizerConfig, OutputFoldTable, TransformMachineOptimizer,
    };
    pub use crate::skeleton::{JointTag, SkeletonError, SkeletonMachine, SkeletonMachineBuilder};
}

pub use machine::{evaluate, CommandStream, Instruction, Transform};
pub use optimize::optimize;
pub use skeleton::{SkeletonMachine, SkeletonMachineBuilder};
