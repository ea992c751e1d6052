//! Transformation machine optimizer
//!
//! Rewrites a naively generated machine into a smaller equivalent one. The
//! stream is decoded once into [`Instruction`]s, each pass builds a new
//! instruction vector, and the result is encoded back to words.
//!
//! # Passes
//!
//! Run in this order; the order is part of the result:
//!
//! 1. **Dead transform elimination**: transforms that never reach an output
//! 2. **Redundant push removal**
//! 3. **Sequential transform merging**: static transforms pushed forward into
//!    the instructions they influence, or folded into outputs via the hook
//! 4. **Redundant push removal**
//! 5. **Transform type simplification**: matrices → translate/rotate/scale
//! 6. **Macro pattern fusion**: `Float4x4, WriteOutputMatrix` at the end of a
//!    branch → `TransformFloat4x4AndWrite`
//! 7. **Redundant push removal**
//!
//! The sequence is repeated until a round leaves the instructions unchanged
//! (at most [`MAX_PIPELINE_ROUNDS`] rounds), so optimizing an optimized
//! stream returns it as is.
//!
//! # Usage
//!
//! ```rust
//! use skeleton_machine::machine::*;
//! use skeleton_machine::optimize::{optimize, NoFold};
//! use glam::Vec3;
//!
//! let stream = CommandStream::from_instructions(&[
//!     Instruction::Static(Transform::Translate(Vec3::new(1.0, 0.0, 0.0))),
//!     Instruction::Static(Transform::Translate(Vec3::new(2.0, 0.0, 0.0))),
//!     Instruction::WriteOutput(0),
//! ]);
//! let optimized = optimize(&stream, &mut NoFold).unwrap();
//! assert_eq!(optimized.instructions().unwrap().len(), 2);
//! ```
//!
//! Author: Moroya Sakamoto

mod dead;
mod fusion;
mod hook;
mod merge;
mod push_pop;
mod rewrite;
mod scan;
mod simplify;

pub use dead::eliminate_dead_transforms;
pub use fusion::fuse_patterns;
pub use hook::{NoFold, OutputFoldTable, TransformMachineOptimizer};
pub use merge::{merge_sequential_transforms, merge_transforms, should_do_simple_merge};
pub use push_pop::{coalesce_pops, remove_redundant_pushes};
pub use rewrite::Rewrite;
pub use scan::{find_downstream_influences, has_following_output, merge_type, MergeType};
pub use simplify::{is_uniform_scale, median_element, simplify_matrix, simplify_transform_types};

use crate::machine::{encode_all, trace_to_string, CommandStream, Instruction, MachineError};
use serde::{Deserialize, Serialize};

/// Error type for optimizer failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizeError {
    /// The input stream is malformed
    #[error(transparent)]
    Machine(#[from] MachineError),
    /// Two folds requested for the same output slot in one merge pass
    #[error("transform folded into output matrix {0} more than once")]
    DuplicateFold(u32),
}

/// Optimizer configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Tolerance for treating rotation, scale or translation as absent
    pub identity_threshold: f32,
    /// Relative tolerance for treating three scale factors as uniform
    pub scale_threshold: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            identity_threshold: 1e-4,
            scale_threshold: 1e-4,
        }
    }
}

/// Optimize a stream with the default configuration
pub fn optimize<H>(stream: &CommandStream, hook: &mut H) -> Result<CommandStream, OptimizeError>
where
    H: TransformMachineOptimizer + ?Sized,
{
    optimize_with_config(stream, hook, &OptimizerConfig::default()).map(|(s, _)| s)
}

/// Optimize a stream, returning it with before/after statistics
pub fn optimize_with_config<H>(
    stream: &CommandStream,
    hook: &mut H,
    config: &OptimizerConfig,
) -> Result<(CommandStream, OptimizationStats), OptimizeError>
where
    H: TransformMachineOptimizer + ?Sized,
{
    let insts = stream.instructions()?;
    let instructions_before = insts.len();

    if log::log_enabled!(log::Level::Trace) {
        log::trace!("before optimization:\n{}", trace_to_string(stream));
    }

    let insts = optimize_instructions(insts, hook, config)?;
    let result = CommandStream::from_words(encode_all(&insts));

    if log::log_enabled!(log::Level::Trace) {
        log::trace!("after optimization:\n{}", trace_to_string(&result));
    }

    let stats = OptimizationStats {
        instructions_before,
        instructions_after: insts.len(),
        words_before: stream.len(),
        words_after: result.len(),
    };
    log::debug!("{}", stats);
    Ok((result, stats))
}

/// Upper bound on repetitions of the pass sequence
pub const MAX_PIPELINE_ROUNDS: usize = 8;

/// Run the pass pipeline over decoded instructions until it settles
pub fn optimize_instructions<H>(
    mut insts: Vec<Instruction>,
    hook: &mut H,
    config: &OptimizerConfig,
) -> Result<Vec<Instruction>, OptimizeError>
where
    H: TransformMachineOptimizer + ?Sized,
{
    for round in 1..=MAX_PIPELINE_ROUNDS {
        let next = run_passes(insts.clone(), hook, config)?;
        if next == insts {
            log::debug!("optimizer settled after {} round(s)", round);
            return Ok(next);
        }
        insts = next;
    }
    log::warn!(
        "optimizer still changing after {} rounds; stopping",
        MAX_PIPELINE_ROUNDS
    );
    Ok(insts)
}

/// One round of the seven passes in their fixed order
fn run_passes<H>(
    insts: Vec<Instruction>,
    hook: &mut H,
    config: &OptimizerConfig,
) -> Result<Vec<Instruction>, OptimizeError>
where
    H: TransformMachineOptimizer + ?Sized,
{
    let insts = pass("dead transform elimination", insts, eliminate_dead_transforms);
    let insts = pass("redundant push removal", insts, remove_redundant_pushes);
    let before = insts.len();
    let insts = merge_sequential_transforms(insts, hook)?;
    log::debug!(
        "sequential transform merging: {} -> {} instructions",
        before,
        insts.len()
    );
    let insts = pass("redundant push removal", insts, remove_redundant_pushes);
    let insts = pass("transform type simplification", insts, |v| {
        simplify_transform_types(v, config)
    });
    let insts = pass("macro pattern fusion", insts, fuse_patterns);
    let insts = pass("redundant push removal", insts, remove_redundant_pushes);
    Ok(insts)
}

fn pass<F>(name: &str, insts: Vec<Instruction>, f: F) -> Vec<Instruction>
where
    F: FnOnce(Vec<Instruction>) -> Vec<Instruction>,
{
    let before = insts.len();
    let insts = f(insts);
    log::debug!("{}: {} -> {} instructions", name, before, insts.len());
    insts
}

/// Statistics from an optimizer run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationStats {
    /// Instructions before optimization
    pub instructions_before: usize,
    /// Instructions after optimization
    pub instructions_after: usize,
    /// Stream words before optimization
    pub words_before: usize,
    /// Stream words after optimization
    pub words_after: usize,
}

impl OptimizationStats {
    /// Instructions removed (zero if the stream grew)
    pub fn instructions_removed(&self) -> usize {
        self.instructions_before.saturating_sub(self.instructions_after)
    }
}

impl std::fmt::Display for OptimizationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Optimization: {} → {} instructions ({} removed, {:.1}% reduction), {} → {} words",
            self.instructions_before,
            self.instructions_after,
            self.instructions_removed(),
            if self.instructions_before > 0 {
                self.instructions_removed() as f64 / self.instructions_before as f64 * 100.0
            } else {
                0.0
            },
            self.words_before,
            self.words_after
        )
    }
}
