use super::types::VmError;
use crate::u4;

/// A decoded CHIP-8 instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instr {
    Cls,
    Ret,

    Jp { nnn: u16 },
    JpV0 { nnn: u16 },
    Call { nnn: u16 },

    SeImm { x: u4, kk: u8 },
    SneImm { x: u4, kk: u8 },
    SeReg { x: u4, y: u4 },
    SneReg { x: u4, y: u4 },

    LdImm { x: u4, kk: u8 },
    AddImm { x: u4, kk: u8 },
    Alu { x: u4, y: u4, op: AluOp },

    LdI { nnn: u16 },
    AddI { x: u4 },

    Rnd { x: u4, kk: u8 },
    Drw { x: u4, y: u4, n: u4 },

    Skp { x: u4 },
    Sknp { x: u4 },
    WaitKey { x: u4 },

    LdFromDt { x: u4 },
    LdToDt { x: u4 },
    LdSt { x: u4 },

    LdFont { x: u4 },
    Bcd { x: u4 },

    StoreRegs { x: u4 },
    LoadRegs { x: u4 },
}

/// Register-register operations of the 0x8xy_ group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Ld,
    Or,
    And,
    Xor,
    Add,
    Sub,
    Shr,
    Subn,
    Shl,
}

impl Instr {
    /// Decodes a 16-bit instruction word.
    ///
    /// Exactly the 35 base instructions are recognized; any other bit
    /// pattern is an [`VmError::InvalidOpcode`].
    pub fn decode(opcode: u16) -> Result<Self, VmError> {
        let nibble = (
            ((opcode & 0xF000) >> 12) as u8,
            ((opcode & 0x0F00) >> 8) as u8,
            ((opcode & 0x00F0) >> 4) as u8,
            (opcode & 0x000F) as u8,
        );

        let x = u4::new(nibble.1);
        let y = u4::new(nibble.2);
        let n = u4::new(nibble.3);
        let kk = (opcode & 0x00FF) as u8;
        let nnn = opcode & 0x0FFF;

        let instr = match (nibble.0, nibble.1, nibble.2, nibble.3) {
            (0x0, 0x0, 0xE, 0x0) => Instr::Cls,
            (0x0, 0x0, 0xE, 0xE) => Instr::Ret,
            (0x1, _, _, _) => Instr::Jp { nnn },
            (0x2, _, _, _) => Instr::Call { nnn },
            (0x3, _, _, _) => Instr::SeImm { x, kk },
            (0x4, _, _, _) => Instr::SneImm { x, kk },
            (0x5, _, _, 0x0) => Instr::SeReg { x, y },
            (0x6, _, _, _) => Instr::LdImm { x, kk },
            (0x7, _, _, _) => Instr::AddImm { x, kk },
            (0x8, _, _, _) => Instr::Alu {
                x,
                y,
                op: match nibble.3 {
                    0x0 => AluOp::Ld,
                    0x1 => AluOp::Or,
                    0x2 => AluOp::And,
                    0x3 => AluOp::Xor,
                    0x4 => AluOp::Add,
                    0x5 => AluOp::Sub,
                    0x6 => AluOp::Shr,
                    0x7 => AluOp::Subn,
                    0xE => AluOp::Shl,
                    _ => return Err(VmError::InvalidOpcode { opcode }),
                },
            },
            (0x9, _, _, 0x0) => Instr::SneReg { x, y },
            (0xA, _, _, _) => Instr::LdI { nnn },
            (0xB, _, _, _) => Instr::JpV0 { nnn },
            (0xC, _, _, _) => Instr::Rnd { x, kk },
            (0xD, _, _, _) => Instr::Drw { x, y, n },
            (0xE, _, 0x9, 0xE) => Instr::Skp { x },
            (0xE, _, 0xA, 0x1) => Instr::Sknp { x },
            (0xF, _, 0x0, 0x7) => Instr::LdFromDt { x },
            (0xF, _, 0x0, 0xA) => Instr::WaitKey { x },
            (0xF, _, 0x1, 0x5) => Instr::LdToDt { x },
            (0xF, _, 0x1, 0x8) => Instr::LdSt { x },
            (0xF, _, 0x1, 0xE) => Instr::AddI { x },
            (0xF, _, 0x2, 0x9) => Instr::LdFont { x },
            (0xF, _, 0x3, 0x3) => Instr::Bcd { x },
            (0xF, _, 0x5, 0x5) => Instr::StoreRegs { x },
            (0xF, _, 0x6, 0x5) => Instr::LoadRegs { x },

            _ => return Err(VmError::InvalidOpcode { opcode }),
        };

        Ok(instr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_instruction_group() {
        assert_eq!(Instr::decode(0x00E0).unwrap(), Instr::Cls);
        assert_eq!(Instr::decode(0x00EE).unwrap(), Instr::Ret);
        assert_eq!(Instr::decode(0x1ABC).unwrap(), Instr::Jp { nnn: 0xABC });
        assert_eq!(Instr::decode(0x2ABC).unwrap(), Instr::Call { nnn: 0xABC });
        assert_eq!(
            Instr::decode(0x3A42).unwrap(),
            Instr::SeImm {
                x: u4::new(0xA),
                kk: 0x42
            }
        );
        assert_eq!(
            Instr::decode(0x4A42).unwrap(),
            Instr::SneImm {
                x: u4::new(0xA),
                kk: 0x42
            }
        );
        assert_eq!(
            Instr::decode(0x5AB0).unwrap(),
            Instr::SeReg {
                x: u4::new(0xA),
                y: u4::new(0xB)
            }
        );
        assert_eq!(
            Instr::decode(0x6A42).unwrap(),
            Instr::LdImm {
                x: u4::new(0xA),
                kk: 0x42
            }
        );
        assert_eq!(
            Instr::decode(0x7A42).unwrap(),
            Instr::AddImm {
                x: u4::new(0xA),
                kk: 0x42
            }
        );
        assert_eq!(
            Instr::decode(0x9AB0).unwrap(),
            Instr::SneReg {
                x: u4::new(0xA),
                y: u4::new(0xB)
            }
        );
        assert_eq!(Instr::decode(0xAABC).unwrap(), Instr::LdI { nnn: 0xABC });
        assert_eq!(Instr::decode(0xBABC).unwrap(), Instr::JpV0 { nnn: 0xABC });
        assert_eq!(
            Instr::decode(0xCA42).unwrap(),
            Instr::Rnd {
                x: u4::new(0xA),
                kk: 0x42
            }
        );
        assert_eq!(
            Instr::decode(0xDAB5).unwrap(),
            Instr::Drw {
                x: u4::new(0xA),
                y: u4::new(0xB),
                n: u4::new(5)
            }
        );
        assert_eq!(Instr::decode(0xEA9E).unwrap(), Instr::Skp { x: u4::new(0xA) });
        assert_eq!(Instr::decode(0xEAA1).unwrap(), Instr::Sknp { x: u4::new(0xA) });
        assert_eq!(
            Instr::decode(0xFA07).unwrap(),
            Instr::LdFromDt { x: u4::new(0xA) }
        );
        assert_eq!(
            Instr::decode(0xFA0A).unwrap(),
            Instr::WaitKey { x: u4::new(0xA) }
        );
        assert_eq!(
            Instr::decode(0xFA15).unwrap(),
            Instr::LdToDt { x: u4::new(0xA) }
        );
        assert_eq!(Instr::decode(0xFA18).unwrap(), Instr::LdSt { x: u4::new(0xA) });
        assert_eq!(Instr::decode(0xFA1E).unwrap(), Instr::AddI { x: u4::new(0xA) });
        assert_eq!(
            Instr::decode(0xFA29).unwrap(),
            Instr::LdFont { x: u4::new(0xA) }
        );
        assert_eq!(Instr::decode(0xFA33).unwrap(), Instr::Bcd { x: u4::new(0xA) });
        assert_eq!(
            Instr::decode(0xFA55).unwrap(),
            Instr::StoreRegs { x: u4::new(0xA) }
        );
        assert_eq!(
            Instr::decode(0xFA65).unwrap(),
            Instr::LoadRegs { x: u4::new(0xA) }
        );
    }

    #[test]
    fn decodes_every_alu_minor_code() {
        let expected = [
            (0x8AB0, AluOp::Ld),
            (0x8AB1, AluOp::Or),
            (0x8AB2, AluOp::And),
            (0x8AB3, AluOp::Xor),
            (0x8AB4, AluOp::Add),
            (0x8AB5, AluOp::Sub),
            (0x8AB6, AluOp::Shr),
            (0x8AB7, AluOp::Subn),
            (0x8ABE, AluOp::Shl),
        ];

        for (opcode, op) in expected {
            assert_eq!(
                Instr::decode(opcode).unwrap(),
                Instr::Alu {
                    x: u4::new(0xA),
                    y: u4::new(0xB),
                    op
                }
            );
        }
    }

    #[test]
    fn rejects_unknown_bit_patterns() {
        for opcode in [0x5001, 0x9AB1, 0x00E1, 0x0000, 0x0230, 0x8AB8, 0xEA9F, 0xFA00, 0xFAFF] {
            assert_eq!(
                Instr::decode(opcode).unwrap_err(),
                VmError::InvalidOpcode { opcode }
            );
        }
    }
}
