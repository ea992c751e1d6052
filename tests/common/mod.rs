//! Common test helpers for skeleton-machine integration tests
//!
//! Author: Moroya Sakamoto

#![allow(dead_code)]

use glam::{Mat4, Quat, Vec3};
use skeleton_machine::prelude::*;

// ============================================================================
// Standard test streams
// ============================================================================

/// Single output behind two translations
pub fn test_chain() -> CommandStream {
    CommandStream::from_instructions(&[
        Instruction::Static(Transform::Translate(Vec3::new(1.0, 0.0, 0.0))),
        Instruction::Static(Transform::Translate(Vec3::new(2.0, 0.0, 0.0))),
        Instruction::WriteOutput(0),
    ])
}

/// Root, two branches and a nested branch with a trailing transform
pub fn test_branches() -> CommandStream {
    CommandStream::from_instructions(&[
        Instruction::Static(Transform::Translate(Vec3::new(0.0, 1.0, 0.0))),
        Instruction::Static(Transform::RotateZ(45.0)),
        Instruction::WriteOutput(0),
        Instruction::Push,
        Instruction::Static(Transform::Translate(Vec3::X)),
        Instruction::WriteOutput(1),
        Instruction::Pop(1),
        Instruction::Push,
        Instruction::Static(Transform::UniformScale(0.5)),
        Instruction::Push,
        Instruction::Static(Transform::Translate(Vec3::Z)),
        Instruction::WriteOutput(2),
        Instruction::Pop(2),
        Instruction::Static(Transform::RotateX(10.0)),
    ])
}

/// Output count of [`test_branches`]
pub const BRANCH_OUTPUTS: usize = 3;

/// Naive humanoid-ish rig: every joint gets its own push, a static bind
/// pose, an animated parameter and a comment
///
/// Returns the stream, its parameter block and the output count.
pub fn test_rig() -> (CommandStream, Vec<u8>, usize) {
    let mut params = ParameterBlockBuilder::new();
    let spine = params.push_transform(&Transform::RotateQuaternion(Quat::from_rotation_y(0.3)));
    let neck = params.push_transform(&Transform::RotateX(12.0));
    let arm = params.push_transform(&Transform::Matrix(
        Mat4::from_rotation_z(0.5) * Mat4::from_scale(Vec3::new(1.0, 1.2, 1.0)),
    ));

    let insts = vec![
        Instruction::comment("root"),
        Instruction::Push,
        Instruction::Static(Transform::Translate(Vec3::new(0.0, 1.0, 0.0))),
        Instruction::WriteOutput(0),
        Instruction::Push,
        Instruction::Static(Transform::Translate(Vec3::new(0.0, 0.5, 0.0))),
        Instruction::Parameter {
            kind: TransformKind::RotateQuaternion,
            offset: spine,
        },
        Instruction::WriteOutput(1),
        Instruction::Push,
        Instruction::Static(Transform::Translate(Vec3::new(0.0, 0.4, 0.0))),
        Instruction::Static(Transform::RotateY(20.0)),
        Instruction::Parameter {
            kind: TransformKind::RotateX,
            offset: neck,
        },
        Instruction::WriteOutput(2),
        Instruction::Pop(1),
        Instruction::Push,
        Instruction::Static(Transform::Translate(Vec3::new(0.3, 0.3, 0.0))),
        Instruction::Static(Transform::UniformScale(1.0)),
        Instruction::BindingPoint {
            name: 0xA11C_E000_0000_0001,
            defaults: vec![Transform::RotateZ(5.0)],
        },
        Instruction::Parameter {
            kind: TransformKind::Float4x4,
            offset: arm,
        },
        Instruction::WriteOutput(3),
        Instruction::Pop(1),
        Instruction::Push,
        Instruction::Static(Transform::ArbitraryScale(Vec3::splat(2.0))),
        Instruction::Pop(1),
        Instruction::Pop(1),
        Instruction::Pop(1),
        Instruction::Push,
        Instruction::Static(Transform::RotateAxisAngle {
            axis: Vec3::new(1.0, 1.0, 0.0),
            degrees: 30.0,
        }),
        Instruction::WriteOutput(4),
        Instruction::Pop(1),
    ];
    (CommandStream::from_instructions(&insts), params.build(), 5)
}

// ============================================================================
// Randomized streams
// ============================================================================

/// Deterministic PRNG (splitmix64) for reproducible stream generation
pub struct Rng64 {
    state: u64,
}

impl Rng64 {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E3779B97F4A7C15),
        }
    }

    pub fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Uniform f32 in [0, 1)
    pub fn next_f32(&mut self) -> f32 {
        (self.next() >> 40) as f32 / (1u64 << 24) as f32
    }

    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Uniform integer in [0, n)
    pub fn below(&mut self, n: u32) -> u32 {
        (self.next() % u64::from(n.max(1))) as u32
    }

    pub fn vec3(&mut self, lo: f32, hi: f32) -> Vec3 {
        Vec3::new(self.range(lo, hi), self.range(lo, hi), self.range(lo, hi))
    }

    pub fn axis(&mut self) -> Vec3 {
        let v = self.vec3(-1.0, 1.0);
        if v.length() < 0.1 {
            Vec3::Y
        } else {
            v.normalize()
        }
    }
}

/// Random transform of any kind, with matrices that are often decomposable
pub fn random_transform(rng: &mut Rng64) -> Transform {
    match rng.below(10) {
        0 => Transform::Translate(rng.vec3(-2.0, 2.0)),
        1 => Transform::RotateX(rng.range(-180.0, 180.0)),
        2 => Transform::RotateY(rng.range(-180.0, 180.0)),
        3 => Transform::RotateZ(rng.range(-180.0, 180.0)),
        4 => Transform::RotateAxisAngle {
            axis: rng.axis(),
            degrees: rng.range(-180.0, 180.0),
        },
        5 => Transform::RotateQuaternion(Quat::from_axis_angle(rng.axis(), rng.range(-3.0, 3.0))),
        6 => Transform::UniformScale(rng.range(0.7, 1.4)),
        7 => {
            // uniform half the time so simplification has something to do
            if rng.below(2) == 0 {
                Transform::ArbitraryScale(Vec3::splat(rng.range(0.7, 1.4)))
            } else {
                Transform::ArbitraryScale(rng.vec3(0.7, 1.4))
            }
        }
        8 => Transform::Matrix(random_matrix(rng)),
        _ => Transform::Translate(Vec3::new(0.0, rng.range(0.1, 1.0), 0.0)),
    }
}

/// Random matrix: pure translation, pure rotation, translate-scale or general
pub fn random_matrix(rng: &mut Rng64) -> Mat4 {
    match rng.below(4) {
        0 => Mat4::from_translation(rng.vec3(-2.0, 2.0)),
        1 => Mat4::from_axis_angle(rng.axis(), rng.range(-3.0, 3.0)),
        2 => Mat4::from_translation(rng.vec3(-2.0, 2.0)) * Mat4::from_scale(rng.vec3(0.7, 1.4)),
        _ => Mat4::from_scale_rotation_translation(
            rng.vec3(0.7, 1.4),
            Quat::from_axis_angle(rng.axis(), rng.range(-3.0, 3.0)),
            rng.vec3(-2.0, 2.0),
        ),
    }
}

/// Deepest branch nesting in generated streams
pub const RANDOM_MAX_DEPTH: u32 = 6;

/// Balanced random machine with its parameter block and output count
///
/// Mixes statics and parameters of every kind, plain and fused writes,
/// binding points with zero to three defaults, comments, nested branches,
/// `Pop(0)` and multi-level pops. Every write targets a fresh output slot.
pub fn random_stream(seed: u64) -> (CommandStream, Vec<u8>, usize) {
    let mut rng = Rng64::new(seed);
    let mut params = ParameterBlockBuilder::new();
    let mut insts = Vec::new();
    let mut depth = 0u32;
    let mut outputs = 0u32;

    let len = 6 + rng.below(26);
    for _ in 0..len {
        match rng.below(20) {
            0..=4 => insts.push(Instruction::Static(random_transform(&mut rng))),
            5..=6 => {
                let t = random_transform(&mut rng);
                let offset = params.push_transform(&t);
                insts.push(Instruction::Parameter {
                    kind: t.kind(),
                    offset,
                });
            }
            7..=9 => {
                insts.push(Instruction::WriteOutput(outputs));
                outputs += 1;
            }
            10 => {
                let m = random_matrix(&mut rng);
                if rng.below(2) == 0 {
                    insts.push(Instruction::TransformAndWriteStatic {
                        output: outputs,
                        matrix: m,
                    });
                } else {
                    let offset = params.push_transform(&Transform::Matrix(m));
                    insts.push(Instruction::TransformAndWriteParameter {
                        output: outputs,
                        offset,
                    });
                }
                outputs += 1;
            }
            11..=13 if depth < RANDOM_MAX_DEPTH => {
                insts.push(Instruction::Push);
                depth += 1;
            }
            14..=15 if depth > 0 => {
                let n = 1 + rng.below(depth.min(3));
                insts.push(Instruction::Pop(n));
                depth -= n;
            }
            16 => insts.push(Instruction::Pop(0)),
            17 => {
                let count = rng.below(4) as usize;
                let defaults = (0..count).map(|_| random_transform(&mut rng)).collect();
                insts.push(Instruction::BindingPoint {
                    name: rng.next(),
                    defaults,
                });
            }
            18 => insts.push(Instruction::comment("joint")),
            _ => insts.push(Instruction::Static(random_transform(&mut rng))),
        }
    }
    while depth > 0 {
        let n = 1 + rng.below(depth);
        insts.push(Instruction::Pop(n));
        depth -= n;
    }

    (
        CommandStream::from_instructions(&insts),
        params.build(),
        outputs as usize,
    )
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Evaluate a stream with a raw parameter buffer
pub fn eval(stream: &CommandStream, params: &[u8], output_count: usize) -> Vec<Mat4> {
    evaluate_to_vec(stream, &ParameterBlock::new(params), output_count)
        .unwrap_or_else(|e| panic!("evaluation failed: {}", e))
}

/// Assert two output arrays match element-wise within tolerance
pub fn assert_outputs_close(a: &[Mat4], b: &[Mat4], tol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: output count differs", msg);
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!(
            x.abs_diff_eq(*y, tol),
            "{}: output {} differs\n  {:?}\n  {:?}",
            msg,
            i,
            x,
            y
        );
    }
}

/// Like [`assert_outputs_close`], with the tolerance scaled by each
/// matrix's largest element
pub fn assert_outputs_close_scaled(a: &[Mat4], b: &[Mat4], rel: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: output count differs", msg);
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        let magnitude = x
            .to_cols_array()
            .iter()
            .fold(1.0f32, |acc, v| acc.max(v.abs()));
        assert!(
            x.abs_diff_eq(*y, rel * magnitude),
            "{}: output {} differs\n  {:?}\n  {:?}",
            msg,
            i,
            x,
            y
        );
    }
}

/// Assert optimizing `stream` leaves every output unchanged
pub fn assert_optimization_preserves(stream: &CommandStream, params: &[u8], output_count: usize) {
    let optimized = optimize(stream, &mut NoFold)
        .unwrap_or_else(|e| panic!("optimization failed: {}", e));
    assert_outputs_close(
        &eval(stream, params, output_count),
        &eval(&optimized, params, output_count),
        1e-4,
        "optimized",
    );
}
