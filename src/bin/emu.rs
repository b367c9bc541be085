use std::{
    cell::Cell,
    path::PathBuf,
    rc::Rc,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    layout::Alignment,
    style::{Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Paragraph},
};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source, source::SquareWave};

use chip8_vm::vm::{
    DISPLAY_X, FrameBuffer, Keypad, Machine, Observation, Platform, Runner, StepObserver,
};

/// Mapping from terminal keys to the CHIP-8 hex keypad (0x0-0xF).
const KEY_MAP: [KeyCode; 16] = [
    KeyCode::Char('x'), // 0x0
    KeyCode::Char('1'), // 0x1
    KeyCode::Char('2'), // 0x2
    KeyCode::Char('3'), // 0x3
    KeyCode::Char('q'), // 0x4
    KeyCode::Char('w'), // 0x5
    KeyCode::Char('e'), // 0x6
    KeyCode::Char('a'), // 0x7
    KeyCode::Char('s'), // 0x8
    KeyCode::Char('d'), // 0x9
    KeyCode::Char('z'), // 0xA
    KeyCode::Char('c'), // 0xB
    KeyCode::Char('4'), // 0xC
    KeyCode::Char('r'), // 0xD
    KeyCode::Char('f'), // 0xE
    KeyCode::Char('v'), // 0xF
];

// Key release events are not fired in terminals on Linux; a key counts as
// released once this long has passed since its last press event.
const KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(50);

// The scheduler itself is unthrottled; blocking this long on the event queue
// each cycle is the only pacing the emulator applies.
const INPUT_POLL_TIMEOUT: Duration = Duration::from_micros(700);

const BEEP_FREQUENCY: f32 = 440.0;
const BEEP_LENGTH: Duration = Duration::from_millis(150);

/// Platform adapter that renders to the terminal, reads terminal key events
/// and beeps through the default audio output.
struct TerminalPlatform {
    terminal: DefaultTerminal,

    /// Audio output stream (must be kept alive). None when no audio device
    /// is available; beeps are dropped in that case.
    _audio_stream: Option<OutputStream>,
    audio_sink: Option<Sink>,

    key_press_times: [Option<Instant>; 16],
    quit: Rc<Cell<bool>>,
}

impl TerminalPlatform {
    fn new(terminal: DefaultTerminal, quit: Rc<Cell<bool>>) -> Self {
        let mut audio_stream = OutputStreamBuilder::open_default_stream().ok();
        let audio_sink = audio_stream.as_mut().map(|stream| {
            stream.log_on_drop(false);
            Sink::connect_new(stream.mixer())
        });

        TerminalPlatform {
            terminal,
            _audio_stream: audio_stream,
            audio_sink,
            key_press_times: [None; 16],
            quit,
        }
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers, keypad: &mut Keypad) {
        let ctrl_c = code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL);
        if code == KeyCode::Esc || ctrl_c {
            self.quit.set(true);
            return;
        }

        if let Some(key) = KEY_MAP.iter().position(|&k| k == code) {
            keypad[key] = true;
            self.key_press_times[key] = Some(Instant::now());
        }
    }

    fn release_stale_keys(&mut self, keypad: &mut Keypad) {
        let now = Instant::now();

        for (key, press_time) in self.key_press_times.iter_mut().enumerate() {
            if let Some(time) = press_time
                && now.duration_since(*time) > KEY_RELEASE_TIMEOUT
            {
                *press_time = None;
                keypad[key] = false;
            }
        }
    }
}

impl Platform for TerminalPlatform {
    fn render(&mut self, framebuffer: &FrameBuffer) {
        let result = self.terminal.draw(|frame| draw_display(frame, framebuffer));

        if result.is_err() {
            self.quit.set(true);
        }
    }

    fn poll_keys(&mut self, keypad: &mut Keypad) {
        self.release_stale_keys(keypad);

        if !event::poll(INPUT_POLL_TIMEOUT).unwrap_or(false) {
            return;
        }

        while event::poll(Duration::ZERO).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(key)) => self.handle_key(key.code, key.modifiers, keypad),
                Ok(_) => {}
                Err(_) => {
                    self.quit.set(true);
                    return;
                }
            }
        }
    }

    fn beep(&mut self) {
        if let Some(sink) = &self.audio_sink {
            sink.append(
                SquareWave::new(BEEP_FREQUENCY)
                    .amplify(0.25)
                    .take_duration(BEEP_LENGTH),
            );
        }
    }
}

fn draw_display(frame: &mut Frame, framebuffer: &FrameBuffer) {
    let text: Vec<Line> = framebuffer
        .chunks(DISPLAY_X)
        .map(|row| {
            row.iter()
                .map(|&pixel| {
                    Span::styled(if pixel != 0 { "█" } else { " " }, Style::default().green())
                })
                .collect()
        })
        .collect();

    let widget = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(Block::bordered().title(" chip8-vm (Esc quits) "));

    frame.render_widget(widget, frame.area());
}

/// Stops the run once the user asked to quit.
struct QuitObserver {
    quit: Rc<Cell<bool>>,
}

impl StepObserver for QuitObserver {
    fn on_before_cycle(&mut self, _machine: &Machine) -> Observation {
        if self.quit.get() {
            Observation::Stop
        } else {
            Observation::Continue
        }
    }
}

/// CHIP-8 emulator running in the terminal.
///
/// Keys 1-4, Q-R, A-F, Z-V map to the hex keypad. Escape quits.
#[derive(Parser)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    let mut machine = Machine::new();
    machine.load(&rom).context("Failed to load ROM")?;

    let quit = Rc::new(Cell::new(false));
    let terminal = ratatui::init();
    let platform = TerminalPlatform::new(terminal, quit.clone());
    let observer = Box::new(QuitObserver { quit });

    let mut runner = Runner::with_observer(machine, platform, observer);
    let result = runner.run();
    ratatui::restore();

    result.context("Emulation halted on a fatal error")
}
