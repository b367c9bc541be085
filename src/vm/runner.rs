use super::machine::Machine;
use super::types::{FrameBuffer, Keypad, VmError};

/// What a [`StepObserver`] wants the scheduler to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    Continue,
    Stop,
}

/// Hook invoked once per cycle before execution.
///
/// Used for tracing, breakpoints, or detecting a stalled program counter.
/// A `Stop` answer requests a halt that takes effect at the next cycle
/// boundary; the current cycle still executes.
pub trait StepObserver {
    fn on_before_cycle(&mut self, machine: &Machine) -> Observation;
}

/// The host side of the machine: rendering, input and sound.
pub trait Platform {
    /// Called whenever the framebuffer changed during the preceding cycle.
    fn render(&mut self, framebuffer: &FrameBuffer);

    /// Called once per cycle to refresh the key-down states.
    fn poll_keys(&mut self, keypad: &mut Keypad);

    /// Called when the sound timer expires.
    fn beep(&mut self);
}

/// The per-cycle execution scheduler.
///
/// Owns the machine and the platform adapter; an optional step observer is
/// injected at construction. The loop runs as fast as the host permits, any
/// pacing is the platform's business.
pub struct Runner<P: Platform> {
    machine: Machine,
    platform: P,
    observer: Option<Box<dyn StepObserver>>,
}

impl<P: Platform> Runner<P> {
    pub fn new(machine: Machine, platform: P) -> Self {
        Runner {
            machine,
            platform,
            observer: None,
        }
    }

    pub fn with_observer(
        machine: Machine,
        platform: P,
        observer: Box<dyn StepObserver>,
    ) -> Self {
        Runner {
            machine,
            platform,
            observer: Some(observer),
        }
    }

    /// Runs cycles until a stop is requested or a fatal decode error occurs.
    ///
    /// At most one fatal error is delivered per run; the machine is halted
    /// before it is returned.
    pub fn run(&mut self) -> Result<(), VmError> {
        self.machine.stop_flag = false;

        while !self.machine.stop_flag {
            self.cycle()?;
        }

        Ok(())
    }

    /// Executes one scheduler iteration: observer hook, one instruction,
    /// render on demand, input refresh, timer tick.
    pub fn cycle(&mut self) -> Result<(), VmError> {
        if let Some(observer) = self.observer.as_mut()
            && observer.on_before_cycle(&self.machine) == Observation::Stop
        {
            self.machine.stop();
        }

        if let Err(error) = self.machine.step() {
            self.machine.stop();
            return Err(error);
        }

        if self.machine.draw_flag {
            self.platform.render(&self.machine.framebuffer);
            self.machine.draw_flag = false;
        }

        self.platform.poll_keys(&mut self.machine.keypad);

        if self.machine.tick_timers() {
            self.platform.beep();
        }

        Ok(())
    }

    /// Requests a stop; takes effect at the next cycle boundary.
    pub fn stop(&mut self) {
        self.machine.stop();
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub(crate) fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        renders: usize,
        polls: usize,
        beeps: usize,
        last_frame: Option<FrameBuffer>,
        press: Option<u8>,
    }

    struct RecordingPlatform(Rc<Cell<Recorder>>);

    impl RecordingPlatform {
        fn with_recorder() -> (Self, Rc<Cell<Recorder>>) {
            let recorder = Rc::new(Cell::new(Recorder::default()));
            (RecordingPlatform(recorder.clone()), recorder)
        }

        fn update(&self, f: impl FnOnce(&mut Recorder)) {
            let mut recorder = self.0.take();
            f(&mut recorder);
            self.0.set(recorder);
        }
    }

    impl Platform for RecordingPlatform {
        fn render(&mut self, framebuffer: &FrameBuffer) {
            let frame = *framebuffer;
            self.update(|r| {
                r.renders += 1;
                r.last_frame = Some(frame);
            });
        }

        fn poll_keys(&mut self, keypad: &mut Keypad) {
            let mut press = None;
            self.update(|r| {
                r.polls += 1;
                press = r.press;
            });
            if let Some(key) = press {
                keypad[usize::from(key)] = true;
            }
        }

        fn beep(&mut self) {
            self.update(|r| r.beeps += 1);
        }
    }

    struct StopAfter(usize);

    impl StepObserver for StopAfter {
        fn on_before_cycle(&mut self, _machine: &Machine) -> Observation {
            if self.0 == 0 {
                return Observation::Stop;
            }
            self.0 -= 1;
            Observation::Continue
        }
    }

    fn loaded_machine(rom: &[u8]) -> Machine {
        let mut machine = Machine::new();
        machine.load(rom).unwrap();
        machine
    }

    #[test]
    fn render_fires_only_when_the_draw_flag_was_set() {
        // LD V1, 0 then CLS
        let machine = loaded_machine(&[0x61, 0x00, 0x00, 0xE0]);
        let (platform, recorder) = RecordingPlatform::with_recorder();
        let mut runner = Runner::new(machine, platform);

        runner.cycle().unwrap();
        assert_eq!(recorder.take().renders, 0);

        runner.cycle().unwrap();
        let recorded = recorder.take();
        assert_eq!(recorded.renders, 1);
        assert!(recorded.last_frame.unwrap().iter().all(|&p| p == 0));
        assert!(!runner.machine().draw_flag);
    }

    #[test]
    fn keypad_is_refreshed_every_cycle() {
        let machine = loaded_machine(&[0x61, 0x00, 0x62, 0x00]);
        let (platform, recorder) = RecordingPlatform::with_recorder();
        let mut runner = Runner::new(machine, platform);

        runner.cycle().unwrap();
        runner.cycle().unwrap();

        assert_eq!(recorder.take().polls, 2);
    }

    #[test]
    fn platform_key_state_reaches_the_machine() {
        let machine = loaded_machine(&[0x61, 0x00]);
        let (platform, recorder) = RecordingPlatform::with_recorder();
        let mut recorded = recorder.take();
        recorded.press = Some(0xA);
        recorder.set(recorded);

        let mut runner = Runner::new(machine, platform);
        runner.cycle().unwrap();

        assert!(runner.machine().keypad()[0xA]);
    }

    #[test]
    fn timers_tick_once_per_cycle_and_beep_on_expiry() {
        // LD V1, 2; LD ST, V1; then two spacer loads
        let machine = loaded_machine(&[0x61, 0x02, 0xF1, 0x18, 0x62, 0x00, 0x63, 0x00]);
        let (platform, recorder) = RecordingPlatform::with_recorder();
        let mut runner = Runner::new(machine, platform);

        runner.cycle().unwrap();
        runner.cycle().unwrap(); // sound timer set to 2, then ticked to 1
        assert_eq!(runner.machine().sound_timer(), 1);
        assert_eq!(recorder.take().beeps, 0);

        runner.cycle().unwrap();
        assert_eq!(runner.machine().sound_timer(), 0);
        assert_eq!(recorder.take().beeps, 1);

        runner.cycle().unwrap();
        assert_eq!(recorder.take().beeps, 0);
    }

    #[test]
    fn observer_stop_halts_at_the_next_cycle_boundary() {
        // An endless chain of LD V1, 0
        let machine = loaded_machine(&[0x61, 0x00].repeat(8));
        let (platform, _recorder) = RecordingPlatform::with_recorder();
        let mut runner = Runner::with_observer(machine, platform, Box::new(StopAfter(3)));

        runner.run().unwrap();

        // Three observed cycles plus the one whose observer requested the stop.
        assert_eq!(runner.machine().pc(), 0x200 + 4 * 2);
        assert!(runner.machine().is_stopped());
    }

    #[test]
    fn fatal_decode_error_stops_the_run_with_state_as_of_the_fetch() {
        let machine = loaded_machine(&[0x61, 0x00, 0x50, 0x01]);
        let (platform, _recorder) = RecordingPlatform::with_recorder();
        let mut runner = Runner::new(machine, platform);

        let err = runner.run().unwrap_err();

        assert_eq!(err, VmError::InvalidOpcode { opcode: 0x5001 });
        assert_eq!(runner.machine().pc(), 0x202);
        assert!(runner.machine().is_stopped());
    }
}
