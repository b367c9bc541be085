use std::collections::HashSet;

use super::commands::{BreakpointAction, Command, CommandError, CommandResult, SetTarget};
use crate::vm::{MEMORY_SIZE, Machine, Platform, Runner, VmError};

/// Scheduler cycles executed per poll while free-running. Keeps the UI
/// responsive without a wall-clock in the core.
const CYCLES_PER_POLL: u32 = 256;

#[derive(Debug)]
pub enum PollOutcome {
    Idle,
    Ran,
    HitBreakpoint,
}

/// Drives a [`Runner`] cycle-by-cycle on behalf of a debugger front-end.
pub struct Executor<P: Platform> {
    runner: Runner<P>,
    breakpoints: HashSet<u16>,
    running: bool,
}

impl<P: Platform> Executor<P> {
    pub fn new(runner: Runner<P>) -> Self {
        Executor {
            runner,
            breakpoints: HashSet::new(),
            running: false,
        }
    }

    /// Executes a batch of cycles if free-running; pauses on a breakpoint
    /// hit or an execution error.
    pub fn poll(&mut self) -> Result<PollOutcome, VmError> {
        if !self.running {
            return Ok(PollOutcome::Idle);
        }

        for _ in 0..CYCLES_PER_POLL {
            if let Err(error) = self.runner.cycle() {
                self.running = false;
                return Err(error);
            }

            if self.breakpoints.contains(&self.runner.machine().pc()) {
                self.running = false;
                return Ok(PollOutcome::HitBreakpoint);
            }
        }

        Ok(PollOutcome::Ran)
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.running = true;
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.running = false;
                Ok(CommandResult::Ok)
            }
            Command::Step { count } => self.execute_step(count),
            Command::Breakpoint { action } => self.execute_breakpoint(action),
            Command::Set { target, value } => self.execute_set(target, value),
            Command::Mem { start, len } => self.execute_mem(start, len),
            Command::Quit => Ok(CommandResult::Quit),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn machine(&self) -> &Machine {
        self.runner.machine()
    }

    fn execute_step(&mut self, count: u16) -> Result<CommandResult, CommandError> {
        for _ in 0..count {
            self.runner.cycle()?;

            if self.breakpoints.contains(&self.runner.machine().pc()) {
                break;
            }
        }

        Ok(CommandResult::Ok)
    }

    fn execute_breakpoint(
        &mut self,
        action: BreakpointAction,
    ) -> Result<CommandResult, CommandError> {
        match action {
            BreakpointAction::Set { addr } => {
                self.breakpoints.insert(addr);
            }
            BreakpointAction::Clear { addr } => {
                self.breakpoints.remove(&addr);
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
            }
            BreakpointAction::List => {
                let mut breakpoints: Vec<u16> = self.breakpoints.iter().copied().collect();
                breakpoints.sort_unstable();
                return Ok(CommandResult::Breakpoints(breakpoints));
            }
        }

        Ok(CommandResult::Ok)
    }

    fn execute_set(&mut self, target: SetTarget, value: u16) -> Result<CommandResult, CommandError> {
        let machine = self.runner.machine_mut();

        match target {
            SetTarget::V(reg) => {
                machine.v[reg] = byte_value(value)?;
            }
            SetTarget::I => {
                machine.i = value;
            }
            SetTarget::Pc => {
                machine.pc = value;
            }
            SetTarget::Dt => {
                machine.delay_timer = byte_value(value)?;
            }
            SetTarget::St => {
                machine.sound_timer = byte_value(value)?;
            }
        }

        Ok(CommandResult::Ok)
    }

    fn execute_mem(&self, start: u16, len: u16) -> Result<CommandResult, CommandError> {
        let begin = usize::from(start);
        if begin >= MEMORY_SIZE {
            return Err(CommandError::ValueOutOfRange);
        }

        let end = (begin + usize::from(len)).min(MEMORY_SIZE);
        Ok(CommandResult::MemDump {
            offset: start,
            data: self.machine().memory()[begin..end].to_vec(),
        })
    }
}

fn byte_value(value: u16) -> Result<u8, CommandError> {
    u8::try_from(value).map_err(|_| CommandError::ValueOutOfRange)
}
