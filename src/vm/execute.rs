use super::font;
use super::machine::Machine;
use super::opcode::{AluOp, Instr};
use super::types::DISPLAY_X;
use crate::u4;

impl Machine {
    /// Applies one decoded instruction to the machine state.
    ///
    /// The default program counter advance is +2; skip handlers add another
    /// +2, jump/call/return assign the counter directly, and wait-for-key
    /// restores the fetch address so the scheduler re-runs it next cycle.
    pub(crate) fn execute(&mut self, instr: Instr) {
        // Address the instruction was fetched from.
        let at = self.pc;
        self.pc = at.wrapping_add(2);

        match instr {
            Instr::Cls => {
                self.framebuffer.fill(0);
                self.draw_flag = true;
            }
            Instr::Ret => {
                // The stack holds call-site addresses, so returning lands on
                // the instruction after the CALL.
                self.sp -= 1;
                self.pc = self.stack[self.sp].wrapping_add(2);
            }
            Instr::Jp { nnn } => {
                self.pc = nnn;
            }
            Instr::JpV0 { nnn } => {
                self.pc = nnn.wrapping_add(u16::from(self.v[0]));
            }
            Instr::Call { nnn } => {
                self.stack[self.sp] = at;
                self.sp += 1;
                self.pc = nnn;
            }
            Instr::SeImm { x, kk } => {
                self.skip_if(self.v[x] == kk);
            }
            Instr::SneImm { x, kk } => {
                self.skip_if(self.v[x] != kk);
            }
            Instr::SeReg { x, y } => {
                self.skip_if(self.v[x] == self.v[y]);
            }
            Instr::SneReg { x, y } => {
                self.skip_if(self.v[x] != self.v[y]);
            }
            Instr::LdImm { x, kk } => {
                self.v[x] = kk;
            }
            Instr::AddImm { x, kk } => {
                self.v[x] = self.v[x].wrapping_add(kk);
            }
            Instr::Alu { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Instr::LdI { nnn } => {
                self.i = nnn;
            }
            Instr::AddI { x } => {
                let sum = u32::from(self.i) + u32::from(self.v[x]);
                self.v[0xF] = u8::from(sum > 0xFFF);
                self.i = self.i.wrapping_add(u16::from(self.v[x]));
            }
            Instr::Rnd { x, kk } => {
                self.v[x] = rand::random::<u8>() & kk;
            }
            Instr::Drw { x, y, n } => {
                self.execute_draw(x, y, n);
            }
            Instr::Skp { x } => {
                self.skip_if(self.keypad[usize::from(self.v[x] & 0x0F)]);
            }
            Instr::Sknp { x } => {
                self.skip_if(!self.keypad[usize::from(self.v[x] & 0x0F)]);
            }
            Instr::WaitKey { x } => {
                self.execute_wait_key(x, at);
            }
            Instr::LdFromDt { x } => {
                self.v[x] = self.delay_timer;
            }
            Instr::LdToDt { x } => {
                self.delay_timer = self.v[x];
            }
            Instr::LdSt { x } => {
                self.sound_timer = self.v[x];
            }
            Instr::LdFont { x } => {
                let digit = self.v[x] & 0x0F;
                self.i = u16::from(digit) * font::GLYPH_BYTES;
            }
            Instr::Bcd { x } => {
                let value = self.v[x];
                let addr = usize::from(self.i);

                self.memory[addr] = value / 100;
                self.memory[addr + 1] = (value % 100) / 10;
                self.memory[addr + 2] = value % 10;
            }
            Instr::StoreRegs { x } => {
                let base = usize::from(self.i);
                for reg_index in 0..=usize::from(x) {
                    self.memory[base + reg_index] = self.v[reg_index];
                }
                self.i = self.i.wrapping_add(u16::from(x) + 1);
            }
            Instr::LoadRegs { x } => {
                let base = usize::from(self.i);
                for reg_index in 0..=usize::from(x) {
                    self.v[reg_index] = self.memory[base + reg_index];
                }
                self.i = self.i.wrapping_add(u16::from(x) + 1);
            }
        }
    }

    /// Adds the extra +2 that turns the default advance into a skip.
    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: AluOp) {
        match op {
            AluOp::Ld => self.v[x] = self.v[y],
            AluOp::Or => self.v[x] |= self.v[y],
            AluOp::And => self.v[x] &= self.v[y],
            AluOp::Xor => self.v[x] ^= self.v[y],
            // The flag is written before the arithmetic, so an operation
            // targeting VF itself sees the flag, not the operand.
            AluOp::Add => {
                self.v[0xF] = u8::from(self.v[y] > 0xFF - self.v[x]);
                self.v[x] = self.v[x].wrapping_add(self.v[y]);
            }
            AluOp::Sub => {
                // VF = NOT borrow, so equal operands leave VF set.
                self.v[0xF] = u8::from(self.v[x] >= self.v[y]);
                self.v[x] = self.v[x].wrapping_sub(self.v[y]);
            }
            AluOp::Subn => {
                self.v[0xF] = u8::from(self.v[x] <= self.v[y]);
                self.v[x] = self.v[y].wrapping_sub(self.v[x]);
            }
            AluOp::Shr => {
                self.v[0xF] = self.v[x] & 0x01;
                self.v[x] >>= 1;
            }
            AluOp::Shl => {
                self.v[0xF] = self.v[x] >> 7;
                self.v[x] <<= 1;
            }
        }
    }

    /// XORs an n-row sprite read from memory at I onto the framebuffer at
    /// (Vx, Vy) and records collisions in VF.
    ///
    /// Coordinates are not wrapped or clamped against the 64x32 grid: a
    /// sprite reaching past the bottom row indexes out of bounds and panics.
    /// Standard CHIP-8 wraps instead.
    fn execute_draw(&mut self, x: u4, y: u4, n: u4) {
        let x_pos = usize::from(self.v[x]);
        let y_pos = usize::from(self.v[y]);

        self.v[0xF] = 0;

        for row in 0..usize::from(n) {
            let sprite_byte = self.memory[usize::from(self.i) + row];

            for col in 0..8 {
                if (sprite_byte & (0x80 >> col)) != 0 {
                    let index = x_pos + col + (y_pos + row) * DISPLAY_X;

                    if self.framebuffer[index] == 1 {
                        self.v[0xF] = 1;
                    }
                    self.framebuffer[index] ^= 1;
                }
            }
        }

        self.draw_flag = true;
    }

    /// Busy-wait for a key press: while no key is down the fetch address is
    /// restored so the same instruction runs again next cycle, leaving the
    /// scheduler's per-cycle render/input/timer work running.
    fn execute_wait_key(&mut self, x: u4, at: u16) {
        match self.keypad.iter().rposition(|&down| down) {
            Some(key) => self.v[x] = key as u8,
            None => self.pc = at,
        }
    }
}
