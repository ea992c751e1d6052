//! Transform type simplification
//!
//! Rewrites static matrices that only translate, rotate or scale into the
//! smallest equivalent instruction(s), and downgrades uniform arbitrary
//! scales.
//!
//! Author: Moroya Sakamoto

use super::OptimizerConfig;
use crate::machine::{Instruction, Transform};
use glam::{Mat3, Mat4, Vec3};

/// Simplify every static matrix and arbitrary scale in the stream
pub fn simplify_transform_types(
    insts: Vec<Instruction>,
    config: &OptimizerConfig,
) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(insts.len());
    for inst in insts {
        match inst {
            Instruction::Static(Transform::Matrix(m)) => match simplify_matrix(&m, config) {
                Some(parts) => out.extend(parts.into_iter().map(Instruction::Static)),
                None => out.push(inst),
            },
            Instruction::Static(Transform::ArbitraryScale(s))
                if is_uniform_scale(s, config.scale_threshold) =>
            {
                out.push(Instruction::Static(Transform::UniformScale(median_element(s))));
            }
            _ => out.push(inst),
        }
    }
    out
}

/// Decompose a matrix into at most two simpler transforms
///
/// Returns `None` when the matrix cannot be decomposed exactly, is the
/// identity, or needs rotation together with scale or translation.
pub fn simplify_matrix(m: &Mat4, config: &OptimizerConfig) -> Option<Vec<Transform>> {
    let (scale, rotation, translation) = m.to_scale_rotation_translation();
    let recomposed = Mat4::from_scale_rotation_translation(scale, rotation, translation);
    let magnitude = m
        .to_cols_array()
        .iter()
        .fold(1.0f32, |acc, v| acc.max(v.abs()));
    if !recomposed.abs_diff_eq(*m, config.identity_threshold * magnitude) {
        return None;
    }

    let eps = config.identity_threshold;
    let has_rotation = !Mat3::from_quat(rotation).abs_diff_eq(Mat3::IDENTITY, eps);
    let has_scale = !scale.abs_diff_eq(Vec3::ONE, eps);
    let has_translation = !translation.abs_diff_eq(Vec3::ZERO, eps);

    if has_rotation && !has_scale && !has_translation {
        let (axis, angle) = rotation.to_axis_angle();
        let degrees = angle.to_degrees();
        let rotate = if let Some(sign) = canonical_axis(axis, Vec3::X, eps) {
            Transform::RotateX(sign * degrees)
        } else if let Some(sign) = canonical_axis(axis, Vec3::Y, eps) {
            Transform::RotateY(sign * degrees)
        } else if let Some(sign) = canonical_axis(axis, Vec3::Z, eps) {
            Transform::RotateZ(sign * degrees)
        } else {
            Transform::RotateAxisAngle { axis, degrees }
        };
        Some(vec![rotate])
    } else if has_translation && !has_rotation {
        let mut parts = vec![Transform::Translate(translation)];
        if has_scale {
            parts.push(scale_transform(scale, config.scale_threshold));
        }
        Some(parts)
    } else if has_scale && !has_rotation {
        Some(vec![scale_transform(scale, config.scale_threshold)])
    } else {
        None
    }
}

fn scale_transform(scale: Vec3, threshold: f32) -> Transform {
    if is_uniform_scale(scale, threshold) {
        Transform::UniformScale(median_element(scale))
    } else {
        Transform::ArbitraryScale(scale)
    }
}

fn canonical_axis(axis: Vec3, canonical: Vec3, eps: f32) -> Option<f32> {
    if axis.abs_diff_eq(canonical, eps) {
        Some(1.0)
    } else if axis.abs_diff_eq(-canonical, eps) {
        Some(-1.0)
    } else {
        None
    }
}

/// Returns true if all three factors agree within a relative threshold
pub fn is_uniform_scale(scale: Vec3, threshold: f32) -> bool {
    let close = |a: f32, b: f32| (a - b).abs() <= a.abs().max(b.abs()) * threshold;
    close(scale.x, scale.y) && close(scale.x, scale.z) && close(scale.y, scale.z)
}

/// Element with the median magnitude (sign preserved)
pub fn median_element(v: Vec3) -> f32 {
    let a = v.abs();
    if a.x < a.y {
        if a.z < a.x {
            v.x
        } else if a.z < a.y {
            v.z
        } else {
            v.y
        }
    } else if a.z > a.x {
        v.x
    } else if a.z > a.y {
        v.z
    } else {
        v.y
    }
}
