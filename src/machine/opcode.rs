//! OpCode definitions for the transformation machine
//!
//! Author: Moroya Sakamoto

use super::MachineError;

/// Operation codes for the transformation machine
///
/// Each opcode occupies one 32-bit word and is followed by its operand
/// words. Values are part of the binary format and must never be
/// renumbered; the category tests below rely on the contiguous ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OpCode {
    // === Stack ===
    /// Duplicate the top local-to-world frame
    PushLocalToWorld = 0,
    /// Pop `n` frames: operand[0] = pop count
    PopLocalToWorld = 1,

    // === Static transforms (payload inline) ===
    /// operand[0..16] = column-major 4x4 matrix
    TransformFloat4x4Static = 2,
    /// operand[0..3] = offset (x, y, z)
    TranslateStatic = 3,
    /// operand[0] = angle in degrees
    RotateXStatic = 4,
    /// operand[0] = angle in degrees
    RotateYStatic = 5,
    /// operand[0] = angle in degrees
    RotateZStatic = 6,
    /// operand[0..3] = axis, operand[3] = angle in degrees
    RotateAxisAngleStatic = 7,
    /// operand[0..4] = quaternion (x, y, z, w)
    RotateQuaternionStatic = 8,
    /// operand[0] = scale factor
    UniformScaleStatic = 9,
    /// operand[0..3] = scale factors (x, y, z)
    ArbitraryScaleStatic = 10,

    // === Parameter transforms (operand[0] = byte offset into parameter block) ===
    /// Float4x4 read from the parameter block
    TransformFloat4x4Parameter = 11,
    /// Float3 offset read from the parameter block
    TranslateParameter = 12,
    /// Degrees read from the parameter block
    RotateXParameter = 13,
    /// Degrees read from the parameter block
    RotateYParameter = 14,
    /// Degrees read from the parameter block
    RotateZParameter = 15,
    /// Axis + degrees read from the parameter block
    RotateAxisAngleParameter = 16,
    /// Quaternion read from the parameter block
    RotateQuaternionParameter = 17,
    /// Scale factor read from the parameter block
    UniformScaleParameter = 18,
    /// Float3 scale read from the parameter block
    ArbitraryScaleParameter = 19,

    // === Output ===
    /// Write the top frame: operand[0] = output index
    WriteOutputMatrix = 20,
    /// operand[0] = output index, operand[1..17] = matrix
    TransformFloat4x4AndWriteStatic = 21,
    /// operand[0] = output index, operand[1] = parameter offset
    TransformFloat4x4AndWriteParameter = 22,

    // === Binding points (operand[0..2] = 64-bit binding name, then N inline statics) ===
    /// No inline defaults
    BindingPoint0 = 23,
    /// One inline default static transform
    BindingPoint1 = 24,
    /// Two inline default static transforms
    BindingPoint2 = 25,
    /// Three inline default static transforms
    BindingPoint3 = 26,

    // === Misc ===
    /// 64 bytes of NUL-padded text
    Comment = 27,
}

/// Number of operand words carried by a `Comment`
pub const COMMENT_WORDS: usize = 64 / 4;

impl OpCode {
    /// Every opcode, in encoding order
    pub const ALL: [OpCode; 28] = [
        OpCode::PushLocalToWorld,
        OpCode::PopLocalToWorld,
        OpCode::TransformFloat4x4Static,
        OpCode::TranslateStatic,
        OpCode::RotateXStatic,
        OpCode::RotateYStatic,
        OpCode::RotateZStatic,
        OpCode::RotateAxisAngleStatic,
        OpCode::RotateQuaternionStatic,
        OpCode::UniformScaleStatic,
        OpCode::ArbitraryScaleStatic,
        OpCode::TransformFloat4x4Parameter,
        OpCode::TranslateParameter,
        OpCode::RotateXParameter,
        OpCode::RotateYParameter,
        OpCode::RotateZParameter,
        OpCode::RotateAxisAngleParameter,
        OpCode::RotateQuaternionParameter,
        OpCode::UniformScaleParameter,
        OpCode::ArbitraryScaleParameter,
        OpCode::WriteOutputMatrix,
        OpCode::TransformFloat4x4AndWriteStatic,
        OpCode::TransformFloat4x4AndWriteParameter,
        OpCode::BindingPoint0,
        OpCode::BindingPoint1,
        OpCode::BindingPoint2,
        OpCode::BindingPoint3,
        OpCode::Comment,
    ];

    /// Decode an opcode word
    #[inline]
    pub fn from_word(word: u32) -> Option<OpCode> {
        Self::ALL.get(word as usize).copied()
    }

    /// Decode an opcode word, reporting its position on failure
    #[inline]
    pub fn decode(word: u32, offset: usize) -> Result<OpCode, MachineError> {
        Self::from_word(word).ok_or(MachineError::UnknownOpcode {
            opcode: word,
            offset,
        })
    }

    /// Returns true for transforms whose payload is embedded in the stream
    #[inline]
    pub fn is_static_transform(self) -> bool {
        let v = self as u32;
        (2..=10).contains(&v)
    }

    /// Returns true for transforms read from the parameter block
    #[inline]
    pub fn is_parameter_transform(self) -> bool {
        let v = self as u32;
        (11..=19).contains(&v)
    }

    /// Returns true for any static or parameter transform
    #[inline]
    pub fn is_transform(self) -> bool {
        self.is_static_transform() || self.is_parameter_transform()
    }

    /// Returns true for opcodes that write an output matrix
    #[inline]
    pub fn is_output(self) -> bool {
        let v = self as u32;
        (20..=22).contains(&v)
    }

    /// Number of inline defaults following a binding point, `None` otherwise
    #[inline]
    pub fn binding_default_count(self) -> Option<usize> {
        match self {
            OpCode::BindingPoint0 => Some(0),
            OpCode::BindingPoint1 => Some(1),
            OpCode::BindingPoint2 => Some(2),
            OpCode::BindingPoint3 => Some(3),
            _ => None,
        }
    }

    /// Binding point opcode for `count` inline defaults
    #[inline]
    pub fn binding_point(count: usize) -> Option<OpCode> {
        match count {
            0 => Some(OpCode::BindingPoint0),
            1 => Some(OpCode::BindingPoint1),
            2 => Some(OpCode::BindingPoint2),
            3 => Some(OpCode::BindingPoint3),
            _ => None,
        }
    }

    /// Fixed operand words following the opcode word
    ///
    /// For binding points this excludes the inline default instructions,
    /// which are walked separately by [`advance`](super::advance).
    #[inline]
    pub fn operand_words(self) -> usize {
        match self {
            OpCode::PushLocalToWorld => 0,
            OpCode::PopLocalToWorld => 1,
            OpCode::TransformFloat4x4Static => 16,
            OpCode::TranslateStatic => 3,
            OpCode::RotateXStatic | OpCode::RotateYStatic | OpCode::RotateZStatic => 1,
            OpCode::RotateAxisAngleStatic | OpCode::RotateQuaternionStatic => 4,
            OpCode::UniformScaleStatic => 1,
            OpCode::ArbitraryScaleStatic => 3,
            OpCode::TransformFloat4x4Parameter
            | OpCode::TranslateParameter
            | OpCode::RotateXParameter
            | OpCode::RotateYParameter
            | OpCode::RotateZParameter
            | OpCode::RotateAxisAngleParameter
            | OpCode::RotateQuaternionParameter
            | OpCode::UniformScaleParameter
            | OpCode::ArbitraryScaleParameter => 1,
            OpCode::WriteOutputMatrix => 1,
            OpCode::TransformFloat4x4AndWriteStatic => 1 + 16,
            OpCode::TransformFloat4x4AndWriteParameter => 1 + 1,
            OpCode::BindingPoint0
            | OpCode::BindingPoint1
            | OpCode::BindingPoint2
            | OpCode::BindingPoint3 => 2,
            OpCode::Comment => COMMENT_WORDS,
        }
    }

    /// Mnemonic used by the disassembler
    pub fn name(self) -> &'static str {
        match self {
            OpCode::PushLocalToWorld => "PushLocalToWorld",
            OpCode::PopLocalToWorld => "PopLocalToWorld",
            OpCode::TransformFloat4x4Static => "TransformFloat4x4_Static",
            OpCode::TranslateStatic => "Translate_Static",
            OpCode::RotateXStatic => "RotateX_Static",
            OpCode::RotateYStatic => "RotateY_Static",
            OpCode::RotateZStatic => "RotateZ_Static",
            OpCode::RotateAxisAngleStatic => "RotateAxisAngle_Static",
            OpCode::RotateQuaternionStatic => "RotateQuaternion_Static",
            OpCode::UniformScaleStatic => "UniformScale_Static",
            OpCode::ArbitraryScaleStatic => "ArbitraryScale_Static",
            OpCode::TransformFloat4x4Parameter => "TransformFloat4x4_Parameter",
            OpCode::TranslateParameter => "Translate_Parameter",
            OpCode::RotateXParameter => "RotateX_Parameter",
            OpCode::RotateYParameter => "RotateY_Parameter",
            OpCode::RotateZParameter => "RotateZ_Parameter",
            OpCode::RotateAxisAngleParameter => "RotateAxisAngle_Parameter",
            OpCode::RotateQuaternionParameter => "RotateQuaternion_Parameter",
            OpCode::UniformScaleParameter => "UniformScale_Parameter",
            OpCode::ArbitraryScaleParameter => "ArbitraryScale_Parameter",
            OpCode::WriteOutputMatrix => "WriteOutputMatrix",
            OpCode::TransformFloat4x4AndWriteStatic => "TransformFloat4x4AndWrite_Static",
            OpCode::TransformFloat4x4AndWriteParameter => "TransformFloat4x4AndWrite_Parameter",
            OpCode::BindingPoint0 => "BindingPoint_0",
            OpCode::BindingPoint1 => "BindingPoint_1",
            OpCode::BindingPoint2 => "BindingPoint_2",
            OpCode::BindingPoint3 => "BindingPoint_3",
            OpCode::Comment => "Comment",
        }
    }
}
