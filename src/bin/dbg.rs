use std::{
    cell::Cell,
    path::PathBuf,
    rc::Rc,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Paragraph},
};

use chip8_vm::debugger::{Cli, Command, CommandResult, Executor, PollOutcome};
use chip8_vm::vm::{DISPLAY_X, DISPLAY_Y, FrameBuffer, Keypad, Machine, Platform, Runner};

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

/// Headless platform adapter: the debugger TUI reads machine state directly
/// each tick, so rendering and sound are no-ops and the keypad comes from a
/// key state shared with the TUI event handler.
struct DebugIo {
    keys: Rc<Cell<Keypad>>,
}

impl Platform for DebugIo {
    fn render(&mut self, _framebuffer: &FrameBuffer) {}

    fn poll_keys(&mut self, keypad: &mut Keypad) {
        *keypad = self.keys.get();
    }

    fn beep(&mut self) {}
}

struct App {
    executor: Executor<DebugIo>,
    keys: Rc<Cell<Keypad>>,
    key_press_times: [Option<Instant>; 16],

    input: String,
    output: String,
    last_command: Option<Command>,
    should_quit: bool,
}

impl App {
    fn new(rom: &[u8]) -> anyhow::Result<Self> {
        let mut machine = Machine::new();
        machine.load(rom).context("Failed to load ROM")?;

        let keys = Rc::new(Cell::new([false; 16]));
        let platform = DebugIo { keys: keys.clone() };

        Ok(App {
            executor: Executor::new(Runner::new(machine, platform)),
            keys,
            key_press_times: [None; 16],
            input: String::new(),
            output: String::new(),
            last_command: None,
            should_quit: false,
        })
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            match self.executor.poll() {
                Ok(PollOutcome::HitBreakpoint) => self.output = "Hit breakpoint".to_string(),
                Err(e) => self.output = e.to_string(),
                Ok(_) => {}
            }

            terminal.draw(|frame| self.draw(frame))?;

            self.release_stale_keys();

            if event::poll(Duration::from_millis(16))?
                && let Event::Key(key) = event::read()?
            {
                self.handle_key_event(key);
            }
        }

        Ok(())
    }

    fn release_stale_keys(&mut self) {
        let now = Instant::now();
        let mut keys = self.keys.get();

        for (key, press_time) in self.key_press_times.iter_mut().enumerate() {
            if let Some(time) = press_time
                && now.duration_since(*time) > KEY_RELEASE_TIMEOUT
            {
                *press_time = None;
                keys[key] = false;
            }
        }

        self.keys.set(keys);
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if self.executor.is_running() {
            match key.code {
                KeyCode::Esc => {
                    self.execute_command(Command::Pause);
                    self.output = "Paused".to_string();
                }
                code => {
                    if let Some(idx) = KEY_MAP.iter().position(|&k| k == code) {
                        let mut keys = self.keys.get();
                        keys[idx] = true;
                        self.keys.set(keys);
                        self.key_press_times[idx] = Some(Instant::now());
                    }
                }
            }
        } else if key.kind == KeyEventKind::Press {
            match key.code {
                KeyCode::Esc => self.should_quit = true,
                KeyCode::Enter => self.handle_enter(),
                KeyCode::Char(c) => self.input.push(c),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                _ => {}
            }
        }
    }

    fn handle_enter(&mut self) {
        if self.input.is_empty() {
            // An empty line repeats the previous command.
            if let Some(command) = self.last_command.clone() {
                self.execute_command(command);
            }
        } else {
            match Cli::try_parse_from(self.input.split_whitespace()) {
                Ok(cli) => {
                    self.last_command = Some(cli.command.clone());
                    self.execute_command(cli.command);
                }
                Err(e) => {
                    self.last_command = None;
                    self.output = e.to_string();
                }
            }
        }

        self.input.clear();
    }

    fn execute_command(&mut self, command: Command) {
        match self.executor.execute(command) {
            Ok(CommandResult::Ok) => self.output = "OK".to_string(),
            Ok(CommandResult::Quit) => self.should_quit = true,
            Ok(CommandResult::Breakpoints(breakpoints)) => {
                let addrs: Vec<String> =
                    breakpoints.iter().map(|a| format!("{:03X}", a)).collect();
                self.output = format!("Breakpoints: [{}]", addrs.join(", "));
            }
            Ok(CommandResult::MemDump { offset, data }) => {
                let mut output = String::new();
                for (i, byte) in data.iter().enumerate() {
                    if i % 16 == 0 {
                        output.push_str(&format!("\n{:03X}: ", usize::from(offset) + i));
                    }
                    output.push_str(&format!("{:02X} ", byte));
                }
                self.output = output;
            }
            Err(e) => self.output = e.to_string(),
        }
    }

    fn draw(&self, frame: &mut Frame) {
        const SIDEBAR_WIDTH: u16 = 17;
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + SIDEBAR_WIDTH;
        const MIN_HEIGHT: u16 = DISPLAY_Y as u16 + 2 + 3 + 3;

        let area = frame.area();
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            let widget = Paragraph::new(format!(
                "Terminal is too small ({}x{} min)",
                MIN_WIDTH, MIN_HEIGHT
            ))
            .style(Style::default().fg(Color::Red))
            .block(Block::bordered());
            frame.render_widget(widget, area);
            return;
        }

        let [left, right] = Layout::horizontal([
            Constraint::Min(DISPLAY_X as u16 + 2),
            Constraint::Length(SIDEBAR_WIDTH),
        ])
        .areas(area);

        let [display, output, input] = Layout::vertical([
            Constraint::Length(DISPLAY_Y as u16 + 2),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .areas(left);

        let [state, registers, keypad, stack] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(13),
            Constraint::Length(6),
            Constraint::Min(3),
        ])
        .areas(right);

        self.draw_display(frame, display);
        self.draw_state(frame, state);
        self.draw_registers(frame, registers);
        self.draw_keypad(frame, keypad);
        self.draw_stack(frame, stack);

        frame.render_widget(
            Paragraph::new(self.output.as_str()).block(Block::bordered().title(" Output ")),
            output,
        );
        frame.render_widget(
            Paragraph::new(self.input.as_str()).block(Block::bordered().title(" Command ")),
            input,
        );
    }

    fn draw_display(&self, frame: &mut Frame, area: Rect) {
        let text: Vec<Line> = self
            .executor
            .machine()
            .framebuffer()
            .chunks(DISPLAY_X)
            .map(|row| {
                row.iter()
                    .map(|&pixel| {
                        Span::styled(if pixel != 0 { "█" } else { " " }, Style::default().green())
                    })
                    .collect()
            })
            .collect();

        frame.render_widget(
            Paragraph::new(text)
                .alignment(Alignment::Center)
                .block(Block::bordered().title(" Display ")),
            area,
        );
    }

    fn draw_state(&self, frame: &mut Frame, area: Rect) {
        let (text, color) = if self.executor.is_running() {
            ("RUNNING", Color::Green)
        } else {
            ("PAUSED", Color::Yellow)
        };

        frame.render_widget(
            Paragraph::new(Span::styled(text, Style::default().fg(color)))
                .alignment(Alignment::Center)
                .block(Block::bordered().title(" State ")),
            area,
        );
    }

    fn draw_registers(&self, frame: &mut Frame, area: Rect) {
        let machine = self.executor.machine();
        let v = machine.v();

        let mut lines = vec![
            Line::from(format!("PC: {:03X}  I: {:03X}", machine.pc(), machine.i())),
            Line::from(format!(
                "DT: {:02X}   ST: {:02X}",
                machine.delay_timer(),
                machine.sound_timer()
            )),
            Line::from(""),
        ];

        for idx in 0..8 {
            lines.push(Line::from(format!(
                "V{:X}: {:02X}   V{:X}: {:02X}",
                idx,
                v[idx],
                idx + 8,
                v[idx + 8]
            )));
        }

        frame.render_widget(
            Paragraph::new(lines).block(Block::bordered().title(" Registers ")),
            area,
        );
    }

    fn draw_keypad(&self, frame: &mut Frame, area: Rect) {
        let keypad = self.executor.machine().keypad();
        let layout = [
            [0x1, 0x2, 0x3, 0xC],
            [0x4, 0x5, 0x6, 0xD],
            [0x7, 0x8, 0x9, 0xE],
            [0xA, 0x0, 0xB, 0xF],
        ];

        let lines: Vec<Line> = layout
            .iter()
            .map(|row| {
                let spans: Vec<Span> = row
                    .iter()
                    .map(|&key| {
                        let style = if keypad[key] {
                            Style::default().fg(Color::Black).bg(Color::White)
                        } else {
                            Style::default()
                        };
                        Span::styled(format!("{:X}", key), style)
                    })
                    .flat_map(|span| [span, Span::raw(" ")])
                    .take(row.len() * 2 - 1)
                    .collect();
                Line::from(spans)
            })
            .collect();

        frame.render_widget(
            Paragraph::new(lines)
                .alignment(Alignment::Center)
                .block(Block::bordered().title(" Keypad ")),
            area,
        );
    }

    fn draw_stack(&self, frame: &mut Frame, area: Rect) {
        let max_lines = usize::from(area.height.saturating_sub(2));

        let mut lines: Vec<Line> = self
            .executor
            .machine()
            .stack()
            .iter()
            .enumerate()
            .map(|(depth, addr)| Line::from(format!("{:02}: {:03X}", depth, addr)))
            .collect();

        if lines.is_empty() {
            lines.push(Line::from("Empty"));
        }

        if lines.len() > max_lines && max_lines > 0 {
            // Keep the top of the stack visible, elide the bottom.
            lines.drain(..lines.len() - (max_lines - 1));
            lines.insert(0, Line::from("..."));
        }

        frame.render_widget(
            Paragraph::new(lines)
                .alignment(Alignment::Center)
                .block(Block::bordered().title(" Stack ")),
            area,
        );
    }
}

/// TUI debugger for the CHIP-8 virtual machine.
///
/// While paused, commands are entered on the command line (try `help`).
/// While running, keys 1-4, Q-R, A-F, Z-V feed the keypad and Escape pauses.
#[derive(Parser)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;
    let mut app = App::new(&rom).context("Failed to initialize debugger")?;

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}
