//! Forward scans over decoded instructions shared by the passes
//!
//! Author: Moroya Sakamoto

use super::hook::TransformMachineOptimizer;
use crate::machine::Instruction;

/// How an instruction relates to a preceding static transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeType {
    /// Static transform: can absorb the preceding one
    StaticTransform,
    /// Plain output write: can be folded into, or wrapped
    OutputMatrix,
    /// Opens a branch
    Push,
    /// Closes one or more branches
    Pop,
    /// Anything else that consumes the top frame
    Blocker,
}

/// Classify an instruction for influence analysis
pub fn merge_type(inst: &Instruction) -> MergeType {
    match inst {
        Instruction::Static(_) => MergeType::StaticTransform,
        Instruction::WriteOutput(_) => MergeType::OutputMatrix,
        Instruction::Push => MergeType::Push,
        Instruction::Pop(_) => MergeType::Pop,
        _ => MergeType::Blocker,
    }
}

/// Skip forward to the pop that closes the current branch
///
/// Scanning starts inside the branch. Returns the index after the closing
/// pop and how many levels that pop closes beyond the current branch.
/// Reaching the end of the stream returns `(len, 0)`.
pub fn skip_until_pop(insts: &[Instruction], start: usize) -> (usize, u32) {
    let mut level: i64 = 1;
    for (i, inst) in insts.iter().enumerate().skip(start) {
        match inst {
            Instruction::Push => level += 1,
            Instruction::Pop(n) => {
                level -= i64::from(*n);
                if level <= 0 {
                    return (i + 1, (-level) as u32);
                }
            }
            _ => {}
        }
    }
    (insts.len(), 0)
}

/// Returns true if an output command is reachable from `start` before the
/// current branch is popped
pub fn has_following_output(insts: &[Instruction], start: usize) -> bool {
    let mut depth: i64 = 0;
    let mut i = start;
    while i < insts.len() && depth >= 0 {
        match &insts[i] {
            Instruction::Push => depth += 1,
            Instruction::Pop(n) => depth -= i64::from(*n),
            inst if inst.output_index().is_some() => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

/// Indices of the instructions directly affected by a transform placed
/// just before `start`
///
/// A static transform or blocker stops the search in its branch; a write
/// is recorded and the search continues; a push recurses into the branch
/// and continues after its pop.
pub fn find_downstream_influences(insts: &[Instruction], start: usize) -> Vec<usize> {
    let mut result = Vec::new();
    walk(insts, start, &mut result);
    result
}

fn walk(insts: &[Instruction], mut pos: usize, result: &mut Vec<usize>) -> (usize, u32) {
    while pos < insts.len() {
        match merge_type(&insts[pos]) {
            MergeType::StaticTransform | MergeType::Blocker => {
                result.push(pos);
                return skip_until_pop(insts, pos + 1);
            }
            MergeType::OutputMatrix => {
                result.push(pos);
                pos += 1;
            }
            MergeType::Pop => {
                let n = match insts[pos] {
                    Instruction::Pop(n) => n,
                    _ => 1,
                };
                if n == 0 {
                    pos += 1;
                    continue;
                }
                return (pos + 1, n - 1);
            }
            MergeType::Push => {
                let (next, extra) = walk(insts, pos + 1, result);
                if extra > 0 {
                    return (next, extra - 1);
                }
                pos = next;
            }
        }
    }
    (insts.len(), 0)
}

/// Instructions a non-foldable write gains when the source is cloned in
/// front of it: `Push`, the copy and `Pop(1)`
pub const WRAPPED_WRITE_COST: i64 = 3;

/// Cost heuristic: merge only if it removes more instructions than it adds
///
/// Starts at -1 for the source transform itself. Each static influence is
/// another potential saving; each blocker needs a cloned copy of the source
/// and each non-foldable write needs a wrapped copy. The merge must also
/// never make the rewritten stream longer.
pub fn should_do_merge<H>(insts: &[Instruction], influences: &[usize], hook: &H) -> bool
where
    H: TransformMachineOptimizer + ?Sized,
{
    let mut adjustment: i64 = -1;
    let mut growth: i64 = -1;
    for &c in influences {
        match &insts[c] {
            Instruction::Static(_) => adjustment -= 1,
            Instruction::WriteOutput(o) => {
                if !hook.can_fold_into_output(*o) {
                    adjustment += WRAPPED_WRITE_COST;
                    growth += WRAPPED_WRITE_COST;
                }
            }
            _ => {
                adjustment += 1;
                growth += 1;
            }
        }
    }
    adjustment < 0 && growth <= 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{Transform, TransformKind};
    use crate::optimize::{NoFold, OutputFoldTable};
    use glam::Vec3;

    fn t() -> Instruction {
        Instruction::Static(Transform::Translate(Vec3::X))
    }

    #[test]
    fn test_skip_until_pop() {
        let insts = vec![t(), Instruction::Push, Instruction::Pop(1), Instruction::Pop(3), t()];
        assert_eq!(skip_until_pop(&insts, 0), (4, 2));
        assert_eq!(skip_until_pop(&insts[..3], 0), (3, 0));
    }

    #[test]
    fn test_has_following_output() {
        let insts = vec![
            Instruction::Push,
            Instruction::WriteOutput(0),
            Instruction::Pop(1),
            Instruction::Pop(1),
            Instruction::WriteOutput(1),
        ];
        assert!(has_following_output(&insts, 0));
        assert!(!has_following_output(&insts, 2));
        assert!(has_following_output(&insts, 4));
    }

    #[test]
    fn test_influences_through_branches() {
        // S | Push T W0 Pop | Push W1 Pop | P W2
        let insts = vec![
            t(),
            Instruction::Push,
            t(),
            Instruction::WriteOutput(0),
            Instruction::Pop(1),
            Instruction::Push,
            Instruction::WriteOutput(1),
            Instruction::Pop(1),
            Instruction::Parameter {
                kind: TransformKind::RotateX,
                offset: 0,
            },
            Instruction::WriteOutput(2),
        ];
        assert_eq!(find_downstream_influences(&insts, 1), vec![2, 6, 8]);
    }

    #[test]
    fn test_influences_stop_at_enclosing_pop() {
        // Push S Push W0 Pop(2) W1
        let insts = vec![
            Instruction::Push,
            t(),
            Instruction::Push,
            Instruction::WriteOutput(0),
            Instruction::Pop(2),
            Instruction::WriteOutput(1),
        ];
        assert_eq!(find_downstream_influences(&insts, 2), vec![3]);
    }

    #[test]
    fn test_should_do_merge() {
        let insts = vec![t(), t(), Instruction::WriteOutput(0), Instruction::WriteOutput(1)];
        assert!(should_do_merge(&insts, &[1], &NoFold));
        assert!(!should_do_merge(&insts, &[2], &NoFold));
        assert!(!should_do_merge(&insts, &[1, 2, 3], &NoFold));

        let table = OutputFoldTable::all_foldable(2);
        assert!(should_do_merge(&insts, &[2], &table));
        assert!(should_do_merge(&insts, &[2, 3], &table));
    }

    #[test]
    fn test_wrapped_writes_never_grow_stream() {
        // R W0 W1 Push T W2 Pop M W3 W4: two wrapped writes outweigh two statics
        let insts = vec![
            t(),
            Instruction::WriteOutput(0),
            Instruction::WriteOutput(1),
            Instruction::Push,
            t(),
            Instruction::WriteOutput(2),
            Instruction::Pop(1),
            t(),
            Instruction::WriteOutput(3),
        ];
        let influences = find_downstream_influences(&insts, 1);
        assert_eq!(influences, vec![1, 2, 4, 7]);
        assert!(!should_do_merge(&insts, &influences, &NoFold));
        assert!(should_do_merge(&insts, &influences, &OutputFoldTable::all_foldable(4)));
    }

    #[test]
    fn test_blocker_copies_are_bounded() {
        let blocker = Instruction::Parameter {
            kind: TransformKind::RotateZ,
            offset: 0,
        };
        // one copy is paid for by the absorbed static
        let insts = vec![t(), Instruction::Push, t(), Instruction::Pop(1), blocker.clone()];
        assert!(should_do_merge(&insts, &[2, 4], &NoFold));
        // a lone blocker is never worth a copy
        assert!(!should_do_merge(&insts, &[4], &NoFold));
        // two copies would grow the stream
        let insts = vec![
            t(),
            Instruction::Push,
            t(),
            Instruction::Pop(1),
            Instruction::Push,
            blocker.clone(),
            Instruction::Pop(1),
            blocker,
        ];
        assert!(!should_do_merge(&insts, &[2, 5, 7], &NoFold));
    }
}
