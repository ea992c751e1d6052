//! Output fold hooks
//!
//! The merge pass can bake a static transform directly into whatever
//! consumes an output slot (for example skinned vertex data) instead of
//! leaving a runtime instruction. The consumer decides which slots accept
//! folds through [`TransformMachineOptimizer`].
//!
//! Author: Moroya Sakamoto

use glam::Mat4;

/// Capability set the optimizer calls into when folding transforms
pub trait TransformMachineOptimizer {
    /// Returns true if a static transform may be baked into `output`
    fn can_fold_into_output(&self, output: u32) -> bool;

    /// Bake `transform` into `output`
    ///
    /// Only called for slots where [`can_fold_into_output`] returned true,
    /// and never twice for the same slot within one merge pass.
    ///
    /// [`can_fold_into_output`]: TransformMachineOptimizer::can_fold_into_output
    fn fold_into_output(&mut self, output: u32, transform: Mat4);
}

/// Hook that never folds
///
/// With this hook the optimized stream evaluates to exactly the same
/// outputs as the input stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFold;

impl TransformMachineOptimizer for NoFold {
    #[inline]
    fn can_fold_into_output(&self, _output: u32) -> bool {
        false
    }

    #[inline]
    fn fold_into_output(&mut self, _output: u32, _transform: Mat4) {}
}

/// Per-output fold flags plus the transforms folded so far
///
/// Each slot accumulates every transform folded into it, composed in fold
/// order. A consumer applies [`folded`](OutputFoldTable::folded) to its
/// geometry, after which the optimized machine's outputs reproduce the
/// unoptimized ones.
#[derive(Debug, Clone, Default)]
pub struct OutputFoldTable {
    can_fold: Vec<bool>,
    folded: Vec<Mat4>,
}

impl OutputFoldTable {
    /// Table for `output_count` slots, none foldable
    pub fn new(output_count: usize) -> Self {
        OutputFoldTable {
            can_fold: vec![false; output_count],
            folded: vec![Mat4::IDENTITY; output_count],
        }
    }

    /// Table where every slot is foldable
    pub fn all_foldable(output_count: usize) -> Self {
        OutputFoldTable {
            can_fold: vec![true; output_count],
            folded: vec![Mat4::IDENTITY; output_count],
        }
    }

    /// Mark a slot as accepting folds; out-of-range slots are ignored
    pub fn set_can_fold(&mut self, output: u32, can_fold: bool) {
        if let Some(flag) = self.can_fold.get_mut(output as usize) {
            *flag = can_fold;
        }
    }

    /// Accumulated transform for a slot (identity if nothing was folded)
    pub fn folded(&self, output: u32) -> Mat4 {
        self.folded
            .get(output as usize)
            .copied()
            .unwrap_or(Mat4::IDENTITY)
    }

    /// All accumulated transforms
    pub fn folded_transforms(&self) -> &[Mat4] {
        &self.folded
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.can_fold.len()
    }

    /// Returns true if the table has no slots
    pub fn is_empty(&self) -> bool {
        self.can_fold.is_empty()
    }
}

impl TransformMachineOptimizer for OutputFoldTable {
    fn can_fold_into_output(&self, output: u32) -> bool {
        self.can_fold.get(output as usize).copied().unwrap_or(false)
    }

    fn fold_into_output(&mut self, output: u32, transform: Mat4) {
        debug_assert!(
            self.can_fold_into_output(output),
            "fold into output {} which does not accept folds",
            output
        );
        if let Some(slot) = self.folded.get_mut(output as usize) {
            // later folds sit closer to world space than earlier ones
            *slot = transform * *slot;
        }
    }
}
