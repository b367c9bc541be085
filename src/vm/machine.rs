use super::font::FONT;
use super::opcode::Instr;
use super::types::{DISPLAY_X, DISPLAY_Y, FrameBuffer, Keypad, VmError};

pub const MEMORY_SIZE: usize = 4096;
pub const ROM_START_ADDRESS: usize = 0x200;
pub(crate) const STACK_SIZE: usize = 16;

/// The CHIP-8 machine state.
///
/// A single owned aggregate: fields are only mutated by the instruction
/// handlers and the scheduler, the outside world reads them through the
/// accessor methods.
pub struct Machine {
    /// 4KB of memory; 0x000-0x04F holds the fontset, programs start at 0x200.
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// 64x32 monochrome framebuffer, row-major.
    pub(crate) framebuffer: FrameBuffer,

    /// Program counter, address of the next instruction to fetch.
    pub(crate) pc: u16,
    /// Address register, used as a memory pointer operand.
    pub(crate) i: u16,
    /// General-purpose registers V0-VF; VF doubles as the flag register.
    pub(crate) v: [u8; 16],
    /// Return-address stack and its depth. Overflow and underflow are a
    /// program error and are not guarded.
    pub(crate) stack: [u16; STACK_SIZE],
    pub(crate) sp: usize,

    pub(crate) delay_timer: u8,
    pub(crate) sound_timer: u8,

    /// Key-down state of the 16-key keypad, refreshed by the scheduler.
    pub(crate) keypad: Keypad,

    /// Set by any instruction that touched the framebuffer, cleared once the
    /// scheduler has rendered.
    pub(crate) draw_flag: bool,
    /// Checked by the scheduler at each cycle boundary.
    pub(crate) stop_flag: bool,
}

impl Machine {
    pub fn new() -> Self {
        let mut memory = [0; MEMORY_SIZE];
        memory[..FONT.len()].copy_from_slice(&FONT);

        Machine {
            memory,
            framebuffer: [0; DISPLAY_X * DISPLAY_Y],
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: [0; STACK_SIZE],
            sp: 0,
            delay_timer: 0,
            sound_timer: 0,
            keypad: [false; 16],
            draw_flag: false,
            stop_flag: false,
        }
    }

    /// Loads a program image at 0x200.
    ///
    /// The size is validated before anything is written: on failure memory
    /// is left byte-for-byte unchanged.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), VmError> {
        let max_size = MEMORY_SIZE - ROM_START_ADDRESS;
        if rom.len() > max_size {
            return Err(VmError::RomTooLarge {
                max_size,
                size: rom.len(),
            });
        }

        self.memory[ROM_START_ADDRESS..ROM_START_ADDRESS + rom.len()].copy_from_slice(rom);
        self.pc = ROM_START_ADDRESS as u16;

        Ok(())
    }

    /// Executes a single fetch-decode-execute step.
    ///
    /// A decode failure leaves the machine exactly as of the failed fetch.
    pub fn step(&mut self) -> Result<(), VmError> {
        let instr = Instr::decode(self.fetch())?;
        self.execute(instr);
        Ok(())
    }

    /// Decrements the nonzero timers by one.
    ///
    /// Returns true when the sound timer just expired, i.e. a beep should be
    /// signaled to the platform.
    pub(crate) fn tick_timers(&mut self) -> bool {
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }

        if self.sound_timer > 0 {
            self.sound_timer -= 1;
            return self.sound_timer == 0;
        }

        false
    }

    /// Requests a stop; takes effect at the next cycle boundary. Idempotent.
    pub fn stop(&mut self) {
        self.stop_flag = true;
    }

    /// Reads the big-endian 16-bit instruction word at the program counter.
    fn fetch(&self) -> u16 {
        let high = self.memory[usize::from(self.pc)];
        let low = self.memory[usize::from(self.pc.wrapping_add(1))];

        u16::from_be_bytes([high, low])
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn i(&self) -> u16 {
        self.i
    }

    pub fn v(&self) -> &[u8; 16] {
        &self.v
    }

    /// The live portion of the return-address stack, bottom first.
    pub fn stack(&self) -> &[u16] {
        &self.stack[..self.sp]
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn keypad(&self) -> &Keypad {
        &self.keypad
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_flag
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_machine_has_fontset_and_start_pc() {
        let machine = Machine::new();

        assert_eq!(&machine.memory[..80], &FONT);
        assert!(machine.memory[80..].iter().all(|&b| b == 0));
        assert_eq!(machine.pc, 0x200);
        assert_eq!(machine.sp, 0);
    }

    #[test]
    fn load_copies_rom_at_0x200_and_leaves_the_rest_untouched() {
        let mut machine = Machine::new();
        let rom = [0xAA, 0xBB, 0xCC];

        machine.load(&rom).unwrap();

        assert_eq!(&machine.memory[0x200..0x203], &rom);
        assert_eq!(&machine.memory[..80], &FONT);
        assert!(machine.memory[0x203..].iter().all(|&b| b == 0));
    }

    #[test]
    fn load_accepts_a_maximum_size_rom() {
        let mut machine = Machine::new();
        let rom = vec![0x42; MEMORY_SIZE - ROM_START_ADDRESS];

        machine.load(&rom).unwrap();

        assert_eq!(machine.memory[MEMORY_SIZE - 1], 0x42);
    }

    #[test]
    fn load_rejects_an_oversized_rom_without_touching_memory() {
        let mut machine = Machine::new();
        let rom = vec![0x42; MEMORY_SIZE - ROM_START_ADDRESS + 1];

        let err = machine.load(&rom).unwrap_err();

        assert_eq!(
            err,
            VmError::RomTooLarge {
                max_size: 3584,
                size: 3585
            }
        );
        assert_eq!(&machine.memory[..80], &FONT);
        assert!(machine.memory[80..].iter().all(|&b| b == 0));
    }

    #[test]
    fn fetch_combines_two_bytes_big_endian() {
        let mut machine = Machine::new();
        machine.load(&[0xAB, 0xCD]).unwrap();

        assert_eq!(machine.fetch(), 0xABCD);
    }

    #[test]
    fn step_reports_an_invalid_opcode_and_mutates_nothing() {
        let mut machine = Machine::new();
        machine.load(&[0x50, 0x01]).unwrap();

        let err = machine.step().unwrap_err();

        assert_eq!(err, VmError::InvalidOpcode { opcode: 0x5001 });
        assert_eq!(machine.pc, 0x200);
    }

    #[test]
    fn timers_decrement_when_nonzero() {
        let mut machine = Machine::new();
        machine.delay_timer = 2;
        machine.sound_timer = 3;

        assert!(!machine.tick_timers());
        assert_eq!(machine.delay_timer, 1);
        assert_eq!(machine.sound_timer, 2);

        machine.tick_timers();
        assert_eq!(machine.delay_timer, 0);

        machine.tick_timers();
        assert_eq!(machine.delay_timer, 0);
    }

    #[test]
    fn sound_timer_expiry_signals_a_beep_exactly_once() {
        let mut machine = Machine::new();
        machine.sound_timer = 2;

        assert!(!machine.tick_timers());
        assert!(machine.tick_timers());
        assert!(!machine.tick_timers());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut machine = Machine::new();

        machine.stop();
        machine.stop();

        assert!(machine.is_stopped());
    }
}
