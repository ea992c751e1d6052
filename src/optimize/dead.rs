//! Dead transform elimination
//!
//! A transform that cannot reach any output command before its branch is
//! popped (or the stream ends) has no observable effect.
//!
//! Author: Moroya Sakamoto

use super::rewrite::Rewrite;
use super::scan::has_following_output;
use crate::machine::Instruction;

/// Remove static and parameter transforms that never reach an output
///
/// Reachability depends only on outputs and branch structure, so every
/// dead transform is found against the input and removed in one rewrite.
pub fn eliminate_dead_transforms(insts: Vec<Instruction>) -> Vec<Instruction> {
    let mut rw = Rewrite::new();
    for (i, inst) in insts.iter().enumerate() {
        if inst.is_transform() && !has_following_output(&insts, i + 1) {
            rw.remove(i);
        }
    }
    if rw.is_empty() {
        return insts;
    }
    rw.apply(&insts)
}
