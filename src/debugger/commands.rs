use clap::{Parser, Subcommand};
use clap_num::maybe_hex;

use crate::u4;
use crate::vm::VmError;

#[derive(Parser)]
#[command(multicall = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Resume free-running execution
    #[command(visible_alias = "r")]
    Run,

    /// Pause execution
    #[command(visible_alias = "p")]
    Pause,

    /// Execute a number of scheduler cycles
    #[command(visible_alias = "s")]
    Step {
        #[arg(default_value = "1", value_parser = maybe_hex::<u16>)]
        count: u16,
    },

    /// Manage breakpoints
    #[command(visible_alias = "b")]
    Breakpoint {
        #[command(subcommand)]
        action: BreakpointAction,
    },

    /// Overwrite a register, timer or the program counter
    Set {
        #[arg(value_parser = parse_set_target)]
        target: SetTarget,
        #[arg(value_parser = maybe_hex::<u16>)]
        value: u16,
    },

    /// Dump a region of machine memory
    #[command(visible_alias = "m")]
    Mem {
        #[arg(default_value = "0x200", value_parser = maybe_hex::<u16>)]
        start: u16,
        #[arg(default_value = "64", value_parser = maybe_hex::<u16>)]
        len: u16,
    },

    #[command(visible_alias = "q")]
    Quit,
}

#[derive(Subcommand, Clone)]
pub enum BreakpointAction {
    #[command(visible_alias = "s")]
    Set {
        #[arg(value_parser = maybe_hex::<u16>)]
        addr: u16,
    },

    #[command(visible_alias = "c")]
    Clear {
        #[arg(value_parser = maybe_hex::<u16>)]
        addr: u16,
    },

    #[command(visible_alias = "l")]
    List,

    #[command(visible_alias = "ca")]
    ClearAll,
}

#[derive(Debug)]
pub enum CommandResult {
    Ok,
    Breakpoints(Vec<u16>),
    MemDump { offset: u16, data: Vec<u8> },
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("execution error: {0}")]
    Vm(#[from] VmError),
    #[error("value out of range")]
    ValueOutOfRange,
}

#[derive(Clone, Copy)]
pub enum SetTarget {
    V(u4),
    I,
    Pc,
    Dt,
    St,
}

fn parse_set_target(s: &str) -> Result<SetTarget, String> {
    let lower = s.to_lowercase();

    match lower.as_str() {
        "index" | "i" => Ok(SetTarget::I),
        "pc" => Ok(SetTarget::Pc),
        "dt" => Ok(SetTarget::Dt),
        "st" => Ok(SetTarget::St),

        _ if lower.starts_with('v') => match u8::from_str_radix(&lower[1..], 16) {
            Ok(reg) if reg < 16 => Ok(SetTarget::V(u4::new(reg))),
            _ => Err(format!("Invalid register: '{}'", s)),
        },

        _ => Err(format!("Unknown set target: '{}'", s)),
    }
}
