//! Human-readable disassembly of transformation machines
//!
//! Author: Moroya Sakamoto

use super::instruction::{Instruction, Transform};
use super::stream::CommandStream;
use glam::{Mat4, Quat, Vec3};
use std::fmt::{self, Write};

/// Names an output slot
pub type OutputNamer<'a> = &'a dyn Fn(u32) -> String;
/// Names a binding point from its hashed name
pub type BindingNamer<'a> = &'a dyn Fn(u64) -> String;

const INDENT_LIMIT: usize = 15;

fn indent(level: i64) -> String {
    " ".repeat(2 * level.clamp(0, INDENT_LIMIT as i64) as usize)
}

/// Disassemble `stream` into `out`
pub fn trace<W: Write>(out: &mut W, stream: &CommandStream) -> fmt::Result {
    trace_with_names(out, stream, None, None)
}

/// Disassemble into a `String`
pub fn trace_to_string(stream: &CommandStream) -> String {
    let mut s = String::new();
    // writing into a String never fails
    let _ = trace(&mut s, stream);
    s
}

/// Disassemble with optional names for output slots and binding points
///
/// One line per instruction, indented two spaces per stack level starting
/// at level 1. A malformed stream ends the listing with an error line.
pub fn trace_with_names<W: Write>(
    out: &mut W,
    stream: &CommandStream,
    output_name: Option<OutputNamer<'_>>,
    binding_name: Option<BindingNamer<'_>>,
) -> fmt::Result {
    writeln!(out, "Transformation machine size: ({}) bytes", stream.byte_len())?;

    let words = stream.words();
    let mut level: i64 = 1;
    let mut cursor = 0;

    let named = |index: u32| match output_name {
        Some(f) => format!(" ({})", f(index)),
        None => String::new(),
    };

    while cursor < words.len() {
        let (inst, next) = match Instruction::decode(words, cursor) {
            Ok(decoded) => decoded,
            Err(e) => {
                writeln!(out, "{}<malformed stream: {}>", indent(level), e)?;
                break;
            }
        };
        let pad = indent(level);

        match &inst {
            Instruction::Push => {
                writeln!(out, "{}PushLocalToWorld", pad)?;
                level += 1;
            }
            Instruction::Pop(n) => {
                writeln!(out, "{}PopLocalToWorld ({})", pad, n)?;
                level -= i64::from(*n);
            }
            Instruction::Static(t) => {
                writeln!(out, "{}{}", pad, describe_static(t))?;
            }
            Instruction::Parameter { kind, offset } => {
                writeln!(
                    out,
                    "{}{} at offset (0x{:x})",
                    pad,
                    kind.parameter_opcode().name(),
                    offset
                )?;
            }
            Instruction::WriteOutput(index) => {
                writeln!(out, "{}WriteOutputMatrix [{}]{}", pad, index, named(*index))?;
            }
            Instruction::TransformAndWriteStatic { output, matrix } => {
                writeln!(
                    out,
                    "{}TransformFloat4x4AndWrite_Static [{}]{} ({})",
                    pad,
                    output,
                    named(*output),
                    describe_matrix(matrix)
                )?;
            }
            Instruction::TransformAndWriteParameter { output, offset } => {
                writeln!(
                    out,
                    "{}TransformFloat4x4AndWrite_Parameter [{}]{} at offset (0x{:x})",
                    pad,
                    output,
                    named(*output),
                    offset
                )?;
            }
            Instruction::BindingPoint { name, defaults } => {
                write!(out, "{}Binding point for parameter [0x{:016x}]", pad, name)?;
                if let Some(f) = binding_name {
                    write!(out, " ({})", f(*name))?;
                }
                match defaults.len() {
                    0 => writeln!(out, " with no defaults")?,
                    n => writeln!(out, " with {} defaults", n)?,
                }
                let inner = indent(level + 1);
                for d in defaults {
                    writeln!(out, "{}Default: {}", inner, describe_static(d))?;
                }
            }
            Instruction::Comment(text) => {
                writeln!(out, "{}Comment: {}", pad, text.as_str())?;
            }
        }

        cursor = next;
    }
    Ok(())
}

fn describe_static(t: &Transform) -> String {
    let name = t.opcode().name();
    match *t {
        Transform::Matrix(m) => format!("{} ({})", name, describe_matrix(&m)),
        Transform::Translate(v) | Transform::ArbitraryScale(v) => {
            format!("{} ({}, {}, {})", name, v.x, v.y, v.z)
        }
        Transform::RotateX(a)
        | Transform::RotateY(a)
        | Transform::RotateZ(a)
        | Transform::UniformScale(a) => format!("{} ({})", name, a),
        Transform::RotateAxisAngle { axis, degrees } => {
            format!("{} ({}, {}, {})({})", name, axis.x, axis.y, axis.z, degrees)
        }
        Transform::RotateQuaternion(q) => {
            format!("{} ({}, {}, {}, {})", name, q.x, q.y, q.z, q.w)
        }
    }
}

/// Compact description of a matrix: only the components it actually has
fn describe_matrix(m: &Mat4) -> String {
    if *m == Mat4::IDENTITY {
        return "identity".to_string();
    }
    let (scale, rotation, translation) = m.to_scale_rotation_translation();
    let mut parts = Vec::new();
    if translation != Vec3::ZERO {
        parts.push(format!(
            "T: {}, {}, {}",
            translation.x, translation.y, translation.z
        ));
    }
    if !rotation.abs_diff_eq(Quat::IDENTITY, 1e-6) {
        let (axis, angle) = rotation.to_axis_angle();
        parts.push(format!(
            "R: ({}, {}, {}) {} deg",
            axis.x,
            axis.y,
            axis.z,
            angle.to_degrees()
        ));
    }
    if !scale.abs_diff_eq(Vec3::ONE, 1e-6) {
        parts.push(format!("S: {}, {}, {}", scale.x, scale.y, scale.z));
    }
    let recomposed = Mat4::from_scale_rotation_translation(scale, rotation, translation);
    if !recomposed.abs_diff_eq(*m, 1e-4) {
        parts.push("with skew/projection".to_string());
    }
    parts.join(", ")
}
