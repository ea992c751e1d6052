//! Skeleton machine builder
//!
//! Producer side of the transformation machine. A model importer walks its
//! node hierarchy and emits pushes, transforms and output markers in order;
//! the builder turns that into a naive command stream plus an output
//! interface naming the joint behind every output slot.
//!
//! ```text
//! root              PushLocalToWorld
//! ├── hip     →       Translate (0, 1, 0)
//! └── ...             WriteOutputMatrix [0] (body : hip)
//!                   PopLocalToWorld (1)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use skeleton_machine::prelude::*;
//! use glam::Vec3;
//!
//! let mut builder = SkeletonMachineBuilder::new();
//! builder.push_local_to_world();
//! builder.write_static_transform(Transform::Translate(Vec3::Y));
//! let hip = builder.write_output_marker("body", "hip");
//! builder.pop_local_to_world(1);
//!
//! let machine = builder.finish();
//! let out = machine.default_output_transforms().unwrap();
//! assert_eq!(out[hip as usize].w_axis.y, 1.0);
//! ```
//!
//! Author: Moroya Sakamoto

use crate::machine::{
    calculate_parent_pointers, evaluate_batch_parallel, evaluate_to_vec, evaluate_with_visitor,
    remap_output_matrices, trace_with_names, CommandStream, Instruction, MachineError,
    ParameterBlock, Transform, TransformKind, UNMAPPED,
};
use crate::optimize::{
    optimize_with_config, OptimizationStats, OptimizeError, OptimizerConfig,
    TransformMachineOptimizer,
};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::machine::MAX_BINDING_DEFAULTS;

/// Error type for builder operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkeletonError {
    /// Binding point with more inline defaults than the encoding allows
    #[error("binding point takes at most {max} defaults, got {0}", max = MAX_BINDING_DEFAULTS)]
    TooManyDefaults(usize),
    /// The stream is malformed
    #[error(transparent)]
    Machine(#[from] MachineError),
    /// Optimization failed
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}

/// Name of the joint behind an output slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointTag {
    /// Skeleton the joint belongs to
    pub skeleton: String,
    /// Joint name
    pub joint: String,
}

impl JointTag {
    /// Create a tag
    pub fn new(skeleton: impl Into<String>, joint: impl Into<String>) -> Self {
        JointTag {
            skeleton: skeleton.into(),
            joint: joint.into(),
        }
    }
}

impl fmt::Display for JointTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.skeleton, self.joint)
    }
}

/// Incrementally emits a transformation machine
///
/// Pops are deferred: consecutive `pop_local_to_world` calls are summed and
/// emitted as a single `PopLocalToWorld` just before the next instruction,
/// or when the stream is read.
#[derive(Debug, Clone, Default)]
pub struct SkeletonMachineBuilder {
    words: Vec<u32>,
    pending_pops: u32,
    output_count: u32,
    joints: Vec<JointTag>,
}

impl SkeletonMachineBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a copy of the current frame
    pub fn push_local_to_world(&mut self) {
        self.emit(&Instruction::Push);
    }

    /// Pop `count` frames (deferred)
    pub fn pop_local_to_world(&mut self, count: u32) {
        self.pending_pops += count;
    }

    /// Compose a constant transform into the current frame
    pub fn write_static_transform(&mut self, transform: Transform) {
        self.emit(&Instruction::Static(transform));
    }

    /// Compose a transform read from the parameter block at `offset`
    pub fn write_parameter_transform(&mut self, kind: TransformKind, offset: u32) {
        self.emit(&Instruction::Parameter { kind, offset });
    }

    /// Mark an animatable binding, with the static transforms it replaces
    pub fn write_binding_point(
        &mut self,
        name: u64,
        defaults: &[Transform],
    ) -> Result<(), SkeletonError> {
        if defaults.len() > MAX_BINDING_DEFAULTS {
            return Err(SkeletonError::TooManyDefaults(defaults.len()));
        }
        self.emit(&Instruction::BindingPoint {
            name,
            defaults: defaults.to_vec(),
        });
        Ok(())
    }

    /// Insert a comment (truncated to 63 bytes)
    pub fn write_comment(&mut self, text: &str) {
        self.emit(&Instruction::comment(text));
    }

    /// Write the current frame to a new output slot named after the joint
    ///
    /// Returns the slot index. Slots are allocated densely in call order; the
    /// same joint registered twice gets two slots.
    pub fn write_output_marker(&mut self, skeleton: &str, joint: &str) -> u32 {
        let index = self.joints.len() as u32;
        self.joints.push(JointTag::new(skeleton, joint));
        self.emit(&Instruction::WriteOutput(index));
        self.output_count = self.output_count.max(index + 1);
        index
    }

    /// Run the optimizer over the stream emitted so far
    pub fn optimize<H>(
        &mut self,
        hook: &mut H,
        config: &OptimizerConfig,
    ) -> Result<OptimizationStats, SkeletonError>
    where
        H: TransformMachineOptimizer + ?Sized,
    {
        self.resolve_pending_pops();
        let stream = CommandStream::from_words(std::mem::take(&mut self.words));
        match optimize_with_config(&stream, hook, config) {
            Ok((optimized, stats)) => {
                self.words = optimized.into_words();
                Ok(stats)
            }
            Err(e) => {
                self.words = stream.into_words();
                Err(e.into())
            }
        }
    }

    /// Move every output to `mapping[old]`, dropping [`UNMAPPED`] slots
    ///
    /// The output count becomes one past the largest mapped slot. Joint
    /// names move with their slots; when several old slots land on the same
    /// new one the first keeps its name.
    pub fn remap_output_matrices(&mut self, mapping: &[u32]) -> Result<(), SkeletonError> {
        self.resolve_pending_pops();
        let current = CommandStream::from_words(self.words.clone());
        let remapped = remap_output_matrices(&current, mapping)?;

        let limit = mapping.len().min(self.output_count as usize);
        let new_count = mapping[..limit]
            .iter()
            .filter(|&&m| m != UNMAPPED)
            .map(|&m| m + 1)
            .max()
            .unwrap_or(0);

        let mut joints = vec![JointTag::default(); new_count as usize];
        let mut named = vec![false; new_count as usize];
        for (old, &new) in mapping[..limit].iter().enumerate() {
            if new == UNMAPPED || named[new as usize] {
                continue;
            }
            if let Some(tag) = self.joints.get(old) {
                joints[new as usize] = tag.clone();
                named[new as usize] = true;
            }
        }

        log::debug!(
            "remapped outputs: {} -> {} slots",
            self.output_count,
            new_count
        );
        self.words = remapped.into_words();
        self.output_count = new_count;
        self.joints = joints;
        Ok(())
    }

    /// Keep only outputs whose joint appears in `keep`
    ///
    /// Surviving joints are renumbered densely in their current order. A
    /// joint registered more than once collapses to a single slot.
    pub fn filter_output_interface(&mut self, keep: &[JointTag]) -> Result<(), SkeletonError> {
        let mut interface: Vec<JointTag> = Vec::new();
        let mut mapping = vec![UNMAPPED; self.joints.len()];

        for (old, tag) in self.joints.iter().enumerate() {
            if let Some(existing) = interface.iter().position(|t| t == tag) {
                mapping[old] = existing as u32;
            } else if keep.contains(tag) {
                mapping[old] = interface.len() as u32;
                interface.push(tag.clone());
            }
        }

        self.remap_output_matrices(&mapping)?;
        self.output_count = interface.len() as u32;
        self.joints = interface;
        Ok(())
    }

    /// Number of output slots
    pub fn output_count(&self) -> u32 {
        self.output_count
    }

    /// Joint names, indexed by output slot
    pub fn joint_names(&self) -> &[JointTag] {
        &self.joints
    }

    /// Snapshot of the stream, including pending pops
    pub fn stream(&self) -> CommandStream {
        let mut words = self.words.clone();
        if self.pending_pops > 0 {
            Instruction::Pop(self.pending_pops).encode(&mut words);
        }
        CommandStream::from_words(words)
    }

    /// Finish building
    pub fn finish(mut self) -> SkeletonMachine {
        self.resolve_pending_pops();
        SkeletonMachine {
            stream: CommandStream::from_words(self.words),
            output_count: self.output_count as usize,
            joints: self.joints,
        }
    }

    fn emit(&mut self, inst: &Instruction) {
        self.resolve_pending_pops();
        inst.encode(&mut self.words);
    }

    fn resolve_pending_pops(&mut self) {
        if self.pending_pops > 0 {
            Instruction::Pop(self.pending_pops).encode(&mut self.words);
            self.pending_pops = 0;
        }
    }
}

/// A finished transformation machine with its output interface
#[derive(Debug, Clone)]
pub struct SkeletonMachine {
    stream: CommandStream,
    output_count: usize,
    joints: Vec<JointTag>,
}

impl SkeletonMachine {
    /// Wrap an existing stream
    ///
    /// The output count is the larger of `output_count` and the number of
    /// joint names.
    pub fn from_parts(stream: CommandStream, output_count: usize, joints: Vec<JointTag>) -> Self {
        SkeletonMachine {
            stream,
            output_count: output_count.max(joints.len()),
            joints,
        }
    }

    /// Command stream
    pub fn stream(&self) -> &CommandStream {
        &self.stream
    }

    /// Number of output slots
    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Joint names, indexed by output slot
    pub fn joint_names(&self) -> &[JointTag] {
        &self.joints
    }

    /// Output slot of a joint, if present
    pub fn find_joint(&self, skeleton: &str, joint: &str) -> Option<u32> {
        self.joints
            .iter()
            .position(|t| t.skeleton == skeleton && t.joint == joint)
            .map(|i| i as u32)
    }

    /// Evaluate every output for one parameter block
    pub fn generate_output_transforms(
        &self,
        params: &ParameterBlock<'_>,
    ) -> Result<Vec<Mat4>, MachineError> {
        evaluate_to_vec(&self.stream, params, self.output_count)
    }

    /// Evaluate, reporting `(parent, child)` frame pairs to `visitor`
    pub fn generate_output_transforms_with<F>(
        &self,
        params: &ParameterBlock<'_>,
        visitor: F,
    ) -> Result<Vec<Mat4>, MachineError>
    where
        F: FnMut(&Mat4, &Mat4),
    {
        let mut output = vec![Mat4::IDENTITY; self.output_count];
        evaluate_with_visitor(&self.stream, params, &mut output, visitor)?;
        Ok(output)
    }

    /// Evaluate against many parameter blocks in parallel
    pub fn generate_output_transforms_batch_parallel<B>(
        &self,
        blocks: &[B],
    ) -> Result<Vec<Vec<Mat4>>, MachineError>
    where
        B: AsRef<[u8]> + Sync,
    {
        evaluate_batch_parallel(&self.stream, blocks, self.output_count)
    }

    /// Evaluate with an empty parameter block
    pub fn default_output_transforms(&self) -> Result<Vec<Mat4>, MachineError> {
        self.generate_output_transforms(&ParameterBlock::empty())
    }

    /// Infer the parent slot of every output
    pub fn calculate_parent_pointers(&self) -> Result<Vec<u32>, MachineError> {
        calculate_parent_pointers(&self.stream, self.output_count)
    }

    /// Disassembly with joint names next to output slots
    pub fn trace(&self) -> String {
        let name = |index: u32| match self.joints.get(index as usize) {
            Some(tag) => tag.to_string(),
            None => "<unnamed>".to_string(),
        };
        let mut s = String::new();
        let _ = trace_with_names(&mut s, &self.stream, Some(&name), None);
        s
    }
}

impl fmt::Display for SkeletonMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Output interface: {} slots", self.output_count)?;
        for (i, tag) in self.joints.iter().enumerate() {
            writeln!(f, "  [{}] {}", i, tag)?;
        }
        writeln!(f, "Command stream:")?;
        write!(f, "{}", self.trace())?;
        match self.default_output_transforms() {
            Ok(transforms) => {
                writeln!(f, "Default output translations:")?;
                for (i, m) in transforms.iter().enumerate() {
                    let t = m.w_axis;
                    writeln!(f, "  [{}] ({:.3}, {:.3}, {:.3})", i, t.x, t.y, t.z)?;
                }
                Ok(())
            }
            Err(e) => writeln!(f, "Default output transforms unavailable: {}", e),
        }
    }
}
