//! Instruction model for the transformation machine
//!
//! The word stream is the canonical form. [`Instruction`] is its decoded,
//! typed view: the optimizer rewrites vectors of instructions and encodes
//! them back, while the interpreter decodes transforms on the fly.
//!
//! Author: Moroya Sakamoto

use super::opcode::{OpCode, COMMENT_WORDS};
use super::stream::advance;
use super::MachineError;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Largest number of inline defaults a binding point can carry
pub const MAX_BINDING_DEFAULTS: usize = 3;

/// Shape of a transform payload, shared by static and parameter variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    /// Full 4x4 matrix
    Float4x4,
    /// Translation
    Translate,
    /// Rotation about the X axis (degrees)
    RotateX,
    /// Rotation about the Y axis (degrees)
    RotateY,
    /// Rotation about the Z axis (degrees)
    RotateZ,
    /// Rotation about an arbitrary axis (degrees)
    RotateAxisAngle,
    /// Quaternion rotation
    RotateQuaternion,
    /// Uniform scale
    UniformScale,
    /// Per-axis scale
    ArbitraryScale,
}

impl TransformKind {
    /// Number of f32 values in the payload (inline or in the parameter block)
    #[inline]
    pub fn float_count(self) -> usize {
        match self {
            TransformKind::Float4x4 => 16,
            TransformKind::Translate | TransformKind::ArbitraryScale => 3,
            TransformKind::RotateX
            | TransformKind::RotateY
            | TransformKind::RotateZ
            | TransformKind::UniformScale => 1,
            TransformKind::RotateAxisAngle | TransformKind::RotateQuaternion => 4,
        }
    }

    /// Payload size in bytes inside a parameter block
    #[inline]
    pub fn parameter_size(self) -> usize {
        self.float_count() * 4
    }

    /// Opcode of the static variant
    pub fn static_opcode(self) -> OpCode {
        match self {
            TransformKind::Float4x4 => OpCode::TransformFloat4x4Static,
            TransformKind::Translate => OpCode::TranslateStatic,
            TransformKind::RotateX => OpCode::RotateXStatic,
            TransformKind::RotateY => OpCode::RotateYStatic,
            TransformKind::RotateZ => OpCode::RotateZStatic,
            TransformKind::RotateAxisAngle => OpCode::RotateAxisAngleStatic,
            TransformKind::RotateQuaternion => OpCode::RotateQuaternionStatic,
            TransformKind::UniformScale => OpCode::UniformScaleStatic,
            TransformKind::ArbitraryScale => OpCode::ArbitraryScaleStatic,
        }
    }

    /// Opcode of the parameter variant
    pub fn parameter_opcode(self) -> OpCode {
        match self {
            TransformKind::Float4x4 => OpCode::TransformFloat4x4Parameter,
            TransformKind::Translate => OpCode::TranslateParameter,
            TransformKind::RotateX => OpCode::RotateXParameter,
            TransformKind::RotateY => OpCode::RotateYParameter,
            TransformKind::RotateZ => OpCode::RotateZParameter,
            TransformKind::RotateAxisAngle => OpCode::RotateAxisAngleParameter,
            TransformKind::RotateQuaternion => OpCode::RotateQuaternionParameter,
            TransformKind::UniformScale => OpCode::UniformScaleParameter,
            TransformKind::ArbitraryScale => OpCode::ArbitraryScaleParameter,
        }
    }

    /// Kind of a static or parameter transform opcode
    pub fn from_opcode(op: OpCode) -> Option<TransformKind> {
        Some(match op {
            OpCode::TransformFloat4x4Static | OpCode::TransformFloat4x4Parameter => {
                TransformKind::Float4x4
            }
            OpCode::TranslateStatic | OpCode::TranslateParameter => TransformKind::Translate,
            OpCode::RotateXStatic | OpCode::RotateXParameter => TransformKind::RotateX,
            OpCode::RotateYStatic | OpCode::RotateYParameter => TransformKind::RotateY,
            OpCode::RotateZStatic | OpCode::RotateZParameter => TransformKind::RotateZ,
            OpCode::RotateAxisAngleStatic | OpCode::RotateAxisAngleParameter => {
                TransformKind::RotateAxisAngle
            }
            OpCode::RotateQuaternionStatic | OpCode::RotateQuaternionParameter => {
                TransformKind::RotateQuaternion
            }
            OpCode::UniformScaleStatic | OpCode::UniformScaleParameter => {
                TransformKind::UniformScale
            }
            OpCode::ArbitraryScaleStatic | OpCode::ArbitraryScaleParameter => {
                TransformKind::ArbitraryScale
            }
            _ => return None,
        })
    }
}

/// A local transform in its native representation
///
/// Angles are stored in degrees, exactly as they appear in the stream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    /// Full 4x4 matrix
    Matrix(Mat4),
    /// Translation
    Translate(Vec3),
    /// Rotation about X (degrees)
    RotateX(f32),
    /// Rotation about Y (degrees)
    RotateY(f32),
    /// Rotation about Z (degrees)
    RotateZ(f32),
    /// Rotation about an arbitrary axis
    RotateAxisAngle {
        /// Rotation axis
        axis: Vec3,
        /// Angle in degrees
        degrees: f32,
    },
    /// Quaternion rotation
    RotateQuaternion(Quat),
    /// Uniform scale
    UniformScale(f32),
    /// Per-axis scale
    ArbitraryScale(Vec3),
}

impl Transform {
    /// Payload shape
    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Matrix(_) => TransformKind::Float4x4,
            Transform::Translate(_) => TransformKind::Translate,
            Transform::RotateX(_) => TransformKind::RotateX,
            Transform::RotateY(_) => TransformKind::RotateY,
            Transform::RotateZ(_) => TransformKind::RotateZ,
            Transform::RotateAxisAngle { .. } => TransformKind::RotateAxisAngle,
            Transform::RotateQuaternion(_) => TransformKind::RotateQuaternion,
            Transform::UniformScale(_) => TransformKind::UniformScale,
            Transform::ArbitraryScale(_) => TransformKind::ArbitraryScale,
        }
    }

    /// Static opcode encoding this transform
    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.kind().static_opcode()
    }

    /// Promote to a 4x4 matrix
    pub fn to_mat4(&self) -> Mat4 {
        match *self {
            Transform::Matrix(m) => m,
            Transform::Translate(t) => Mat4::from_translation(t),
            Transform::RotateX(deg) => Mat4::from_rotation_x(deg.to_radians()),
            Transform::RotateY(deg) => Mat4::from_rotation_y(deg.to_radians()),
            Transform::RotateZ(deg) => Mat4::from_rotation_z(deg.to_radians()),
            Transform::RotateAxisAngle { axis, degrees } => {
                let axis = axis.normalize_or_zero();
                if axis == Vec3::ZERO {
                    Mat4::IDENTITY
                } else {
                    Mat4::from_axis_angle(axis, degrees.to_radians())
                }
            }
            Transform::RotateQuaternion(q) => Mat4::from_quat(q),
            Transform::UniformScale(s) => Mat4::from_scale(Vec3::splat(s)),
            Transform::ArbitraryScale(s) => Mat4::from_scale(s),
        }
    }

    /// Build from raw payload floats
    ///
    /// `floats` must hold at least `kind.float_count()` values.
    pub fn from_floats(kind: TransformKind, floats: &[f32]) -> Transform {
        let v3 = |f: &[f32]| Vec3::new(f[0], f[1], f[2]);
        match kind {
            TransformKind::Float4x4 => {
                let mut cols = [0.0f32; 16];
                cols.copy_from_slice(&floats[..16]);
                Transform::Matrix(Mat4::from_cols_array(&cols))
            }
            TransformKind::Translate => Transform::Translate(v3(floats)),
            TransformKind::RotateX => Transform::RotateX(floats[0]),
            TransformKind::RotateY => Transform::RotateY(floats[0]),
            TransformKind::RotateZ => Transform::RotateZ(floats[0]),
            TransformKind::RotateAxisAngle => Transform::RotateAxisAngle {
                axis: v3(floats),
                degrees: floats[3],
            },
            TransformKind::RotateQuaternion => Transform::RotateQuaternion(Quat::from_xyzw(
                floats[0], floats[1], floats[2], floats[3],
            )),
            TransformKind::UniformScale => Transform::UniformScale(floats[0]),
            TransformKind::ArbitraryScale => Transform::ArbitraryScale(v3(floats)),
        }
    }

    /// Raw payload floats; only the first `kind().float_count()` are meaningful
    pub fn to_floats(&self) -> [f32; 16] {
        let mut out = [0.0f32; 16];
        match *self {
            Transform::Matrix(m) => out = m.to_cols_array(),
            Transform::Translate(v) | Transform::ArbitraryScale(v) => {
                out[..3].copy_from_slice(&v.to_array());
            }
            Transform::RotateX(a)
            | Transform::RotateY(a)
            | Transform::RotateZ(a)
            | Transform::UniformScale(a) => out[0] = a,
            Transform::RotateAxisAngle { axis, degrees } => {
                out[..3].copy_from_slice(&axis.to_array());
                out[3] = degrees;
            }
            Transform::RotateQuaternion(q) => out[..4].copy_from_slice(&q.to_array()),
        }
        out
    }

    /// Decode the operand words of a static transform opcode
    pub fn decode(op: OpCode, operands: &[u32]) -> Option<Transform> {
        if !op.is_static_transform() {
            return None;
        }
        let kind = TransformKind::from_opcode(op)?;
        let mut floats = [0.0f32; 16];
        for (dst, w) in floats.iter_mut().zip(operands.iter().take(kind.float_count())) {
            *dst = f32::from_bits(*w);
        }
        Some(Transform::from_floats(kind, &floats))
    }

    /// Append the opcode and operand words
    pub fn encode(&self, out: &mut Vec<u32>) {
        out.push(self.opcode() as u32);
        let floats = self.to_floats();
        out.extend(floats[..self.kind().float_count()].iter().map(|f| f.to_bits()));
    }
}

/// Fixed 64-byte comment payload
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommentText(pub [u8; 64]);

impl CommentText {
    /// Build from text, truncated so a terminating NUL always fits
    pub fn new(text: &str) -> Self {
        let mut bytes = [0u8; 64];
        let src = text.as_bytes();
        let n = src.len().min(63);
        bytes[..n].copy_from_slice(&src[..n]);
        CommentText(bytes)
    }

    /// Text up to the first NUL
    pub fn as_str(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(64);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }

    fn from_words(words: &[u32]) -> Self {
        let mut bytes = [0u8; 64];
        for (chunk, w) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&w.to_le_bytes());
        }
        CommentText(bytes)
    }

    fn encode(&self, out: &mut Vec<u32>) {
        out.extend(
            self.0
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
    }
}

impl std::fmt::Debug for CommentText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// A single decoded instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Duplicate the top frame
    Push,
    /// Pop `n` frames
    Pop(u32),
    /// Compose an inline transform into the top frame
    Static(Transform),
    /// Compose a transform read from the parameter block
    Parameter {
        /// Payload shape
        kind: TransformKind,
        /// Byte offset into the parameter block
        offset: u32,
    },
    /// Write the top frame to an output slot
    WriteOutput(u32),
    /// Write `top * matrix` without changing the top frame
    TransformAndWriteStatic {
        /// Output slot
        output: u32,
        /// Inline matrix
        matrix: Mat4,
    },
    /// Write `top * parameter` without changing the top frame
    TransformAndWriteParameter {
        /// Output slot
        output: u32,
        /// Byte offset of a Float4x4 parameter
        offset: u32,
    },
    /// Animation binding point with inline default transforms
    BindingPoint {
        /// Hashed binding name
        name: u64,
        /// 0..=3 default static transforms, applied like ordinary statics
        defaults: Vec<Transform>,
    },
    /// Inline text, ignored by evaluation
    Comment(CommentText),
}

impl Instruction {
    /// Build a comment instruction
    pub fn comment(text: &str) -> Self {
        Instruction::Comment(CommentText::new(text))
    }

    /// Leading opcode word
    pub fn opcode(&self) -> OpCode {
        match self {
            Instruction::Push => OpCode::PushLocalToWorld,
            Instruction::Pop(_) => OpCode::PopLocalToWorld,
            Instruction::Static(t) => t.opcode(),
            Instruction::Parameter { kind, .. } => kind.parameter_opcode(),
            Instruction::WriteOutput(_) => OpCode::WriteOutputMatrix,
            Instruction::TransformAndWriteStatic { .. } => OpCode::TransformFloat4x4AndWriteStatic,
            Instruction::TransformAndWriteParameter { .. } => {
                OpCode::TransformFloat4x4AndWriteParameter
            }
            Instruction::BindingPoint { defaults, .. } => {
                OpCode::binding_point(defaults.len()).unwrap_or(OpCode::BindingPoint3)
            }
            Instruction::Comment(_) => OpCode::Comment,
        }
    }

    /// Encoded size in words
    pub fn word_len(&self) -> usize {
        let own = 1 + self.opcode().operand_words();
        match self {
            Instruction::BindingPoint { defaults, .. } => {
                own + defaults
                    .iter()
                    .take(MAX_BINDING_DEFAULTS)
                    .map(|d| 1 + d.kind().float_count())
                    .sum::<usize>()
            }
            _ => own,
        }
    }

    /// Output slot written by this instruction, if any
    #[inline]
    pub fn output_index(&self) -> Option<u32> {
        match *self {
            Instruction::WriteOutput(o)
            | Instruction::TransformAndWriteStatic { output: o, .. }
            | Instruction::TransformAndWriteParameter { output: o, .. } => Some(o),
            _ => None,
        }
    }

    /// Returns true for static or parameter transforms
    #[inline]
    pub fn is_transform(&self) -> bool {
        matches!(self, Instruction::Static(_) | Instruction::Parameter { .. })
    }

    /// Returns true if evaluating this instruction changes the top frame
    #[inline]
    pub fn modifies_frame(&self) -> bool {
        match self {
            Instruction::Static(_) | Instruction::Parameter { .. } => true,
            Instruction::BindingPoint { defaults, .. } => !defaults.is_empty(),
            _ => false,
        }
    }

    /// Append the encoded words
    ///
    /// Binding points carry at most [`MAX_BINDING_DEFAULTS`] defaults;
    /// [`crate::SkeletonMachineBuilder`] enforces this when instructions are
    /// produced. Extra defaults are a contract violation: debug builds panic
    /// and release builds drop them.
    pub fn encode(&self, out: &mut Vec<u32>) {
        match self {
            Instruction::Push => out.push(OpCode::PushLocalToWorld as u32),
            Instruction::Pop(n) => out.extend([OpCode::PopLocalToWorld as u32, *n]),
            Instruction::Static(t) => t.encode(out),
            Instruction::Parameter { kind, offset } => {
                out.extend([kind.parameter_opcode() as u32, *offset]);
            }
            Instruction::WriteOutput(o) => out.extend([OpCode::WriteOutputMatrix as u32, *o]),
            Instruction::TransformAndWriteStatic { output, matrix } => {
                out.extend([OpCode::TransformFloat4x4AndWriteStatic as u32, *output]);
                out.extend(matrix.to_cols_array().iter().map(|f| f.to_bits()));
            }
            Instruction::TransformAndWriteParameter { output, offset } => {
                out.extend([
                    OpCode::TransformFloat4x4AndWriteParameter as u32,
                    *output,
                    *offset,
                ]);
            }
            Instruction::BindingPoint { name, defaults } => {
                debug_assert!(
                    defaults.len() <= MAX_BINDING_DEFAULTS,
                    "binding point with {} defaults",
                    defaults.len()
                );
                out.extend([self.opcode() as u32, *name as u32, (*name >> 32) as u32]);
                for d in defaults.iter().take(MAX_BINDING_DEFAULTS) {
                    d.encode(out);
                }
            }
            Instruction::Comment(text) => {
                out.push(OpCode::Comment as u32);
                text.encode(out);
            }
        }
    }

    /// Decode the instruction starting at `cursor`
    ///
    /// Returns the instruction and the cursor of the next one.
    pub fn decode(words: &[u32], cursor: usize) -> Result<(Instruction, usize), MachineError> {
        let next = advance(words, cursor)?;
        let op = OpCode::decode(words[cursor], cursor)?;
        let operands = &words[cursor + 1..cursor + 1 + op.operand_words()];

        let inst = match op {
            OpCode::PushLocalToWorld => Instruction::Push,
            OpCode::PopLocalToWorld => Instruction::Pop(operands[0]),
            OpCode::WriteOutputMatrix => Instruction::WriteOutput(operands[0]),
            OpCode::TransformFloat4x4AndWriteStatic => {
                let decoded = Transform::decode(OpCode::TransformFloat4x4Static, &operands[1..]);
                let matrix = match decoded {
                    Some(Transform::Matrix(m)) => m,
                    _ => Mat4::IDENTITY,
                };
                Instruction::TransformAndWriteStatic {
                    output: operands[0],
                    matrix,
                }
            }
            OpCode::TransformFloat4x4AndWriteParameter => {
                Instruction::TransformAndWriteParameter {
                    output: operands[0],
                    offset: operands[1],
                }
            }
            OpCode::Comment => {
                Instruction::Comment(CommentText::from_words(&operands[..COMMENT_WORDS]))
            }
            OpCode::BindingPoint0
            | OpCode::BindingPoint1
            | OpCode::BindingPoint2
            | OpCode::BindingPoint3 => {
                let name = u64::from(operands[0]) | (u64::from(operands[1]) << 32);
                let mut defaults = Vec::new();
                let mut c = cursor + 1 + op.operand_words();
                while c < next {
                    let (inst, after) = Instruction::decode(words, c)?;
                    match inst {
                        Instruction::Static(t) => defaults.push(t),
                        _ => {
                            return Err(MachineError::InvalidBindingDefault {
                                opcode: words[c],
                                offset: c,
                            })
                        }
                    }
                    c = after;
                }
                Instruction::BindingPoint { name, defaults }
            }
            op if op.is_static_transform() => match Transform::decode(op, operands) {
                Some(t) => Instruction::Static(t),
                None => {
                    return Err(MachineError::UnknownOpcode {
                        opcode: words[cursor],
                        offset: cursor,
                    })
                }
            },
            op => match TransformKind::from_opcode(op) {
                Some(kind) => Instruction::Parameter {
                    kind,
                    offset: operands[0],
                },
                None => {
                    return Err(MachineError::UnknownOpcode {
                        opcode: words[cursor],
                        offset: cursor,
                    })
                }
            },
        };
        Ok((inst, next))
    }
}

/// Decode a whole word stream
pub fn decode_all(words: &[u32]) -> Result<Vec<Instruction>, MachineError> {
    let mut out = Vec::with_capacity(words.len() / 2);
    let mut cursor = 0;
    while cursor < words.len() {
        let (inst, next) = Instruction::decode(words, cursor)?;
        out.push(inst);
        cursor = next;
    }
    Ok(out)
}

/// Encode instructions back into words
pub fn encode_all(instructions: &[Instruction]) -> Vec<u32> {
    let mut out = Vec::with_capacity(instructions.iter().map(Instruction::word_len).sum());
    for inst in instructions {
        inst.encode(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_len_matches_encoding() {
        let insts = vec![
            Instruction::Push,
            Instruction::Static(Transform::Translate(Vec3::new(1.0, 2.0, 3.0))),
            Instruction::Static(Transform::Matrix(Mat4::IDENTITY)),
            Instruction::Parameter {
                kind: TransformKind::RotateQuaternion,
                offset: 16,
            },
            Instruction::WriteOutput(3),
            Instruction::TransformAndWriteStatic {
                output: 1,
                matrix: Mat4::IDENTITY,
            },
            Instruction::BindingPoint {
                name: 0xDEAD_BEEF_0000_0001,
                defaults: vec![Transform::RotateX(30.0), Transform::UniformScale(2.0)],
            },
            Instruction::comment("root"),
            Instruction::Pop(1),
        ];
        for inst in &insts {
            let mut words = Vec::new();
            inst.encode(&mut words);
            assert_eq!(words.len(), inst.word_len(), "{:?}", inst);
        }
        let words = encode_all(&insts);
        assert_eq!(decode_all(&words).unwrap(), insts);
    }

    #[test]
    fn test_binding_point_name_split() {
        let inst = Instruction::BindingPoint {
            name: 0x1122_3344_5566_7788,
            defaults: Vec::new(),
        };
        let words = encode_all(&[inst]);
        assert_eq!(words, vec![OpCode::BindingPoint0 as u32, 0x5566_7788, 0x1122_3344]);
    }

    #[test]
    fn test_binding_point_word_len_matches_encoding() {
        let inst = Instruction::BindingPoint {
            name: 9,
            defaults: vec![
                Transform::Translate(Vec3::X),
                Transform::RotateQuaternion(Quat::from_rotation_z(0.5)),
                Transform::Matrix(Mat4::IDENTITY),
            ],
        };
        let mut words = Vec::new();
        inst.encode(&mut words);
        assert_eq!(inst.word_len(), words.len());
        assert_eq!(words[0], OpCode::BindingPoint3 as u32);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "binding point with 4 defaults")]
    fn test_binding_point_rejects_fourth_default() {
        let inst = Instruction::BindingPoint {
            name: 9,
            defaults: vec![Transform::UniformScale(2.0); 4],
        };
        inst.encode(&mut Vec::new());
    }

    #[test]
    fn test_transform_to_mat4() {
        let m = Transform::Translate(Vec3::new(1.0, 2.0, 3.0)).to_mat4();
        assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));

        let r = Transform::RotateZ(90.0).to_mat4();
        let p = r.transform_point3(Vec3::X);
        assert!((p - Vec3::Y).length() < 1e-5);

        let aa = Transform::RotateAxisAngle {
            axis: Vec3::new(0.0, 0.0, 2.0),
            degrees: 90.0,
        }
        .to_mat4();
        assert!(aa.abs_diff_eq(r, 1e-5));

        let s = Transform::ArbitraryScale(Vec3::new(1.0, 2.0, 3.0)).to_mat4();
        assert_eq!(s.transform_vector3(Vec3::ONE), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_comment_truncation() {
        let long = "x".repeat(100);
        let c = CommentText::new(&long);
        assert_eq!(c.as_str().len(), 63);
        assert_eq!(c.0[63], 0);
    }

    #[test]
    fn test_decode_rejects_dynamic_binding_default() {
        let words = vec![
            OpCode::BindingPoint1 as u32,
            0,
            0,
            OpCode::TranslateParameter as u32,
            0,
        ];
        let err = decode_all(&words).unwrap_err();
        assert!(matches!(err, MachineError::InvalidBindingDefault { offset: 3, .. }));
    }
}
