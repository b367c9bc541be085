pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;

/// The 64x32 monochrome framebuffer, row-major, one byte per pixel (0 or 1).
pub type FrameBuffer = [u8; DISPLAY_X * DISPLAY_Y];

/// Key-down state of the 16-key hex keypad, indexed 0x0-0xF.
pub type Keypad = [bool; 16];

/// Errors the virtual machine can detect.
///
/// Out-of-range memory, stack or sprite accesses caused by a malformed
/// program are not part of this taxonomy; they panic instead.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("program image is {size} bytes, at most {max_size} bytes fit above 0x200")]
    RomTooLarge { max_size: usize, size: usize },

    #[error("invalid opcode {opcode:#06X}")]
    InvalidOpcode { opcode: u16 },
}
