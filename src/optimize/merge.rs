//! Sequential transform merging
//!
//! Each static transform is pushed forward into the instructions it
//! directly influences: merged into following static transforms, folded
//! into output slots through the hook, or cloned in front of anything else
//! that consumes the frame. The source is then deleted.
//!
//! ```text
//! Translate (1, 0, 0)              Translate (3, 0, 0)
//! Translate (2, 0, 0)      →       WriteOutputMatrix [0]
//! WriteOutputMatrix [0]
//! ```
//!
//! Author: Moroya Sakamoto

use super::hook::TransformMachineOptimizer;
use super::rewrite::Rewrite;
use super::scan::{find_downstream_influences, should_do_merge};
use super::OptimizeError;
use crate::machine::{Instruction, Transform};
use std::collections::HashSet;

/// Merge static transforms into the instructions they influence
pub fn merge_sequential_transforms<H>(
    mut insts: Vec<Instruction>,
    hook: &mut H,
) -> Result<Vec<Instruction>, OptimizeError>
where
    H: TransformMachineOptimizer + ?Sized,
{
    let mut folded: HashSet<u32> = HashSet::new();
    let mut i = 0;

    while i < insts.len() {
        let source = match &insts[i] {
            Instruction::Static(t) => *t,
            _ => {
                i += 1;
                continue;
            }
        };

        let influences = find_downstream_influences(&insts, i + 1);
        if influences.is_empty() {
            let mut rw = Rewrite::new();
            rw.remove(i);
            insts = rw.apply(&insts);
            continue;
        }

        let do_merge = match single_static(&insts, &influences) {
            Some((j, target)) => {
                // only merge further if the target itself will not be merged away
                let secondary = find_downstream_influences(&insts, j + 1);
                if should_do_merge(&insts, &secondary, &*hook) {
                    should_do_merge(&insts, &influences, &*hook)
                } else {
                    should_do_simple_merge(&source, &target)
                }
            }
            None => should_do_merge(&insts, &influences, &*hook),
        };

        if !do_merge {
            i += 1;
            continue;
        }

        // reject duplicate folds before touching the hook
        let mut pending = HashSet::new();
        for &c in &influences {
            if let Instruction::WriteOutput(o) = insts[c] {
                if hook.can_fold_into_output(o) && (folded.contains(&o) || !pending.insert(o)) {
                    return Err(OptimizeError::DuplicateFold(o));
                }
            }
        }

        let mut rw = Rewrite::new();
        for &c in &influences {
            match &insts[c] {
                Instruction::Static(target) => {
                    rw.replace(c, [Instruction::Static(merge_transforms(&source, target))]);
                }
                Instruction::WriteOutput(o) => {
                    if hook.can_fold_into_output(*o) {
                        hook.fold_into_output(*o, source.to_mat4());
                        folded.insert(*o);
                    } else {
                        rw.insert_before(c, [Instruction::Push, Instruction::Static(source)]);
                        rw.insert_after(c, [Instruction::Pop(1)]);
                    }
                }
                _ => {
                    rw.insert_before(c, [Instruction::Static(source)]);
                }
            }
        }
        rw.remove(i);
        insts = rw.apply(&insts);
    }

    Ok(insts)
}

fn single_static(insts: &[Instruction], influences: &[usize]) -> Option<(usize, Transform)> {
    match influences {
        [j] => match &insts[*j] {
            Instruction::Static(t) => Some((*j, *t)),
            _ => None,
        },
        _ => None,
    }
}

#[derive(PartialEq, Eq)]
enum Category {
    Matrix,
    Translate,
    RotateX,
    RotateY,
    RotateZ,
    ArbitraryRotate,
    Scale,
}

fn category(t: &Transform) -> Category {
    match t {
        Transform::Matrix(_) => Category::Matrix,
        Transform::Translate(_) => Category::Translate,
        Transform::RotateX(_) => Category::RotateX,
        Transform::RotateY(_) => Category::RotateY,
        Transform::RotateZ(_) => Category::RotateZ,
        Transform::RotateAxisAngle { .. } | Transform::RotateQuaternion(_) => {
            Category::ArbitraryRotate
        }
        Transform::UniformScale(_) | Transform::ArbitraryScale(_) => Category::Scale,
    }
}

/// Pairwise rule used when the target will stay in the stream anyway
///
/// Matrices absorb anything; otherwise both transforms must be of the same
/// category.
pub fn should_do_simple_merge(source: &Transform, target: &Transform) -> bool {
    let (a, b) = (category(source), category(target));
    a == Category::Matrix || b == Category::Matrix || a == b
}

/// Compose `source` (earlier in the stream) with `target`
///
/// Same-type pairs stay in their native representation; anything else is
/// promoted to a matrix.
pub fn merge_transforms(source: &Transform, target: &Transform) -> Transform {
    match (*source, *target) {
        (Transform::Translate(a), Transform::Translate(b)) => Transform::Translate(a + b),
        (Transform::RotateX(a), Transform::RotateX(b)) => Transform::RotateX(a + b),
        (Transform::RotateY(a), Transform::RotateY(b)) => Transform::RotateY(a + b),
        (Transform::RotateZ(a), Transform::RotateZ(b)) => Transform::RotateZ(a + b),
        (Transform::UniformScale(a), Transform::UniformScale(b)) => Transform::UniformScale(a * b),
        (Transform::ArbitraryScale(a), Transform::ArbitraryScale(b)) => {
            Transform::ArbitraryScale(a * b)
        }
        (s, t) => Transform::Matrix(s.to_mat4() * t.to_mat4()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::TransformKind;
    use crate::optimize::{NoFold, OutputFoldTable};
    use glam::{Mat4, Vec3};

    #[test]
    fn test_translate_pair_merges() {
        let out = merge_sequential_transforms(
            vec![
                Instruction::Static(Transform::Translate(Vec3::new(1.0, 0.0, 0.0))),
                Instruction::Static(Transform::Translate(Vec3::new(2.0, 0.0, 0.0))),
                Instruction::WriteOutput(0),
            ],
            &mut NoFold,
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                Instruction::Static(Transform::Translate(Vec3::new(3.0, 0.0, 0.0))),
                Instruction::WriteOutput(0),
            ]
        );
    }

    #[test]
    fn test_mismatched_pair_kept() {
        let insts = vec![
            Instruction::Static(Transform::Translate(Vec3::X)),
            Instruction::Static(Transform::RotateZ(30.0)),
            Instruction::WriteOutput(0),
        ];
        let out = merge_sequential_transforms(insts.clone(), &mut NoFold).unwrap();
        assert_eq!(out, insts);
    }

    #[test]
    fn test_merge_into_branches() {
        // S Push A W1 Pop Push B W2 Pop  ->  Push S*A W1 Pop Push S*B W2 Pop
        let s = Transform::UniformScale(2.0);
        let a = Transform::Translate(Vec3::X);
        let b = Transform::Translate(Vec3::Y);
        let out = merge_sequential_transforms(
            vec![
                Instruction::Static(s),
                Instruction::Push,
                Instruction::Static(a),
                Instruction::WriteOutput(1),
                Instruction::Pop(1),
                Instruction::Push,
                Instruction::Static(b),
                Instruction::WriteOutput(2),
                Instruction::Pop(1),
            ],
            &mut NoFold,
        )
        .unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out[1], Instruction::Static(Transform::Matrix(s.to_mat4() * a.to_mat4())));
        assert_eq!(out[5], Instruction::Static(Transform::Matrix(s.to_mat4() * b.to_mat4())));
    }

    #[test]
    fn test_blocker_gets_copy() {
        // S Push T W1 Pop P W2: S merges into T and is cloned before P
        let s = Transform::Translate(Vec3::Z);
        let p = Instruction::Parameter {
            kind: TransformKind::RotateX,
            offset: 0,
        };
        let out = merge_sequential_transforms(
            vec![
                Instruction::Static(s),
                Instruction::Push,
                Instruction::Static(Transform::Translate(Vec3::X)),
                Instruction::WriteOutput(1),
                Instruction::Pop(1),
                p.clone(),
                Instruction::WriteOutput(2),
            ],
            &mut NoFold,
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                Instruction::Push,
                Instruction::Static(Transform::Translate(Vec3::new(1.0, 0.0, 1.0))),
                Instruction::WriteOutput(1),
                Instruction::Pop(1),
                Instruction::Static(s),
                p,
                Instruction::WriteOutput(2),
            ]
        );
    }

    #[test]
    fn test_wrapped_writes_block_merge() {
        // wrapping W0 and W1 would add six instructions for two merges
        let insts = vec![
            Instruction::Static(Transform::RotateAxisAngle {
                axis: Vec3::Y,
                degrees: 40.0,
            }),
            Instruction::WriteOutput(0),
            Instruction::WriteOutput(1),
            Instruction::Push,
            Instruction::Static(Transform::Translate(Vec3::X)),
            Instruction::WriteOutput(2),
            Instruction::Pop(1),
            Instruction::Static(Transform::Matrix(Mat4::from_rotation_x(0.3))),
            Instruction::WriteOutput(3),
            Instruction::WriteOutput(4),
        ];
        let out = merge_sequential_transforms(insts.clone(), &mut NoFold).unwrap();
        assert_eq!(out, insts);
    }

    #[test]
    fn test_unused_source_removed() {
        let out = merge_sequential_transforms(
            vec![
                Instruction::WriteOutput(0),
                Instruction::Static(Transform::RotateX(10.0)),
                Instruction::Static(Transform::RotateY(10.0)),
            ],
            &mut NoFold,
        )
        .unwrap();
        // neither rotation reaches an output
        assert_eq!(out, vec![Instruction::WriteOutput(0)]);
    }

    #[test]
    fn test_fold_into_output() {
        let s = Transform::Translate(Vec3::new(0.0, 5.0, 0.0));
        let mut table = OutputFoldTable::all_foldable(1);
        let out = merge_sequential_transforms(
            vec![Instruction::Static(s), Instruction::WriteOutput(0)],
            &mut table,
        )
        .unwrap();
        assert_eq!(out, vec![Instruction::WriteOutput(0)]);
        assert_eq!(table.folded(0), s.to_mat4());
    }

    #[test]
    fn test_duplicate_fold_rejected() {
        let mut table = OutputFoldTable::all_foldable(1);
        let result = merge_sequential_transforms(
            vec![
                Instruction::Static(Transform::UniformScale(3.0)),
                Instruction::WriteOutput(0),
                Instruction::WriteOutput(0),
            ],
            &mut table,
        );
        assert!(matches!(result, Err(OptimizeError::DuplicateFold(0))));
        assert_eq!(table.folded(0), Mat4::IDENTITY);
    }

    #[test]
    fn test_native_merges() {
        assert_eq!(
            merge_transforms(&Transform::RotateY(10.0), &Transform::RotateY(20.0)),
            Transform::RotateY(30.0)
        );
        assert_eq!(
            merge_transforms(&Transform::UniformScale(2.0), &Transform::UniformScale(4.0)),
            Transform::UniformScale(8.0)
        );
        assert_eq!(
            merge_transforms(
                &Transform::ArbitraryScale(Vec3::new(1.0, 2.0, 3.0)),
                &Transform::ArbitraryScale(Vec3::splat(2.0))
            ),
            Transform::ArbitraryScale(Vec3::new(2.0, 4.0, 6.0))
        );
        assert!(should_do_simple_merge(
            &Transform::UniformScale(2.0),
            &Transform::ArbitraryScale(Vec3::ONE)
        ));
        assert!(!should_do_simple_merge(&Transform::RotateX(1.0), &Transform::RotateY(1.0)));
        assert!(should_do_simple_merge(
            &Transform::RotateX(1.0),
            &Transform::Matrix(Mat4::IDENTITY)
        ));
    }
}
