use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use micmeter::{AggregatorConfig, LevelFrame, LoudnessAggregator, SessionPhase, StopSummary};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Paragraph, Sparkline, Widget},
    DefaultTerminal, Frame,
};
use tracing::{info, warn};

use crate::audio::MicSource;
use crate::band::Bands;
use crate::cli::Cli;

const TICK: Duration = Duration::from_millis(50);

/// Session bookkeeping between the audio frames and the screen.
#[derive(Debug)]
pub struct Meter {
    aggregator: LoudnessAggregator,
    config: AggregatorConfig,
    bands: Bands,
    max_session_secs: Option<f64>,
    last_peak_db: Option<f32>,
    last_error: Option<String>,
}

impl Meter {
    pub fn new(config: AggregatorConfig, bands: Bands, max_session_secs: Option<f64>) -> Self {
        Self {
            aggregator: LoudnessAggregator::new(config),
            config,
            bands,
            max_session_secs,
            last_peak_db: None,
            last_error: None,
        }
    }

    pub fn aggregator(&self) -> &LoudnessAggregator {
        &self.aggregator
    }

    pub fn is_recording(&self) -> bool {
        self.aggregator.state() == SessionPhase::Active
    }

    pub fn start(&mut self) -> Result<()> {
        self.last_error = None;
        self.last_peak_db = None;
        self.aggregator
            .start_with(self.config)
            .map_err(|err| eyre!("cannot start session: {err}"))
    }

    pub fn stop(&mut self) -> Option<StopSummary> {
        self.aggregator.stop().ok()
    }

    pub fn clear(&mut self) {
        self.last_error = None;
        self.last_peak_db = None;
        self.aggregator.clear();
    }

    /// Feed captured frames in order. Returns the summary if the session hit
    /// its time limit.
    pub fn ingest<I>(&mut self, frames: I) -> Option<StopSummary>
    where
        I: IntoIterator<Item = LevelFrame>,
    {
        for frame in frames {
            self.last_peak_db = Some(frame.peak_db);
            if let Err(err) = self
                .aggregator
                .push_sample(f64::from(frame.rms_db), frame.time_secs)
            {
                warn!(time_secs = frame.time_secs, "sample rejected: {err}");
                self.last_error = Some(err.to_string());
            }
            if let Some(summary) = self.enforce_limit() {
                return Some(summary);
            }
        }
        None
    }

    /// Display levels of the newest `width` window samples, for the chart.
    pub fn chart_levels(&self, width: usize) -> Vec<u64> {
        let window = self.aggregator.window();
        let skip = window.len().saturating_sub(width);
        window
            .skip(skip)
            .map(|s| s.display_level.round() as u64)
            .collect()
    }

    fn enforce_limit(&mut self) -> Option<StopSummary> {
        let limit = self.max_session_secs?;
        if !self.is_recording() || self.aggregator.snapshot().elapsed_secs < limit {
            return None;
        }
        info!(limit, "session limit reached");
        self.stop()
    }
}

pub struct App {
    meter: Meter,
    source: Option<MicSource>,
    input_device: Option<String>,
    frame_ms: u32,
    status: String,
    exit: bool,
}

impl App {
    pub fn new(cli: &Cli) -> Self {
        Self {
            meter: Meter::new(cli.aggregator_config(), cli.bands(), cli.max_session_secs),
            source: None,
            input_device: cli.input_device.clone(),
            frame_ms: cli.frame_ms,
            status: "Idle".to_string(),
            exit: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        while !self.exit {
            terminal.draw(|frame| self.draw(frame))?;
            if event::poll(TICK)? {
                self.handle_events()?;
            }
            self.pump();
        }

        Ok(())
    }

    pub fn final_summary(&self) -> Option<StopSummary> {
        self.meter.aggregator().last_summary()
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn exit(&mut self) {
        self.stop_recording();
        self.exit = true;
    }

    fn toggle_recording(&mut self) {
        if self.meter.is_recording() {
            self.stop_recording();
        } else {
            self.start_recording();
        }
    }

    fn start_recording(&mut self) {
        let source = match MicSource::open(self.input_device.as_deref(), self.frame_ms) {
            Ok(source) => source,
            Err(err) => {
                warn!("microphone unavailable: {err:#}");
                self.status = format!("Microphone unavailable: {err}");
                return;
            }
        };
        if let Err(err) = self.meter.start() {
            self.status = err.to_string();
            return;
        }
        self.status = format!("Recording from {}...", source.device_name());
        self.source = Some(source);
    }

    fn stop_recording(&mut self) {
        self.source = None;
        if self.meter.stop().is_some() {
            self.status = "Stopped".to_string();
        }
    }

    fn pump(&mut self) {
        let Some(source) = &self.source else {
            return;
        };
        if self.meter.ingest(source.drain()).is_some() {
            self.source = None;
            self.status = "Stopped (time limit)".to_string();
        }
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        match key_event.code {
            KeyCode::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                self.exit()
            }
            KeyCode::Char('q') => self.exit(),
            KeyCode::Char(' ') => self.toggle_recording(),
            KeyCode::Char('c') => self.meter.clear(),
            _ => {}
        }
    }

    fn handle_events(&mut self) -> Result<()> {
        match event::read()? {
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                self.handle_key_event(key_event)
            }
            _ => {}
        };
        Ok(())
    }

    fn readout(&self) -> Text<'static> {
        let agg = self.meter.aggregator();
        let snap = agg.snapshot();
        let bands = &self.meter.bands;
        let band_span = |level: f64| {
            let band = bands.classify(level);
            Span::styled(
                band.label(),
                Style::default()
                    .fg(band.color())
                    .add_modifier(Modifier::BOLD),
            )
        };

        let mut lines = vec![
            Line::from(vec![
                "Level:   ".into(),
                format!("{:5.1} ", snap.current_level).yellow(),
                band_span(snap.current_level),
            ]),
            Line::from(vec![
                "Average: ".into(),
                format!("{:5.1} ", snap.running_average).yellow(),
                band_span(snap.running_average),
            ]),
            Line::from(vec![
                "Peak:    ".into(),
                self.meter
                    .last_peak_db
                    .map_or_else(|| "  --".to_string(), |db| format!("{db:5.1} dBFS"))
                    .yellow(),
            ]),
            Line::from(vec![
                "Speech:  ".into(),
                format!("{:5.1}s", snap.active_duration_secs).yellow(),
            ]),
            Line::from(vec![
                "Elapsed: ".into(),
                format!("{:5.1}s", snap.elapsed_secs).yellow(),
            ]),
            Line::from(vec![
                "Samples: ".into(),
                snap.sample_count.to_string().yellow(),
            ]),
        ];

        if agg.state() == SessionPhase::Stopped {
            if let Some(summary) = agg.last_summary() {
                lines.push(Line::from(vec![
                    "Final:   ".into(),
                    format!("{:5.1} ", summary.final_average).green().bold(),
                    band_span(summary.final_average),
                ]));
            }
        }
        if let Some(err) = &self.meter.last_error {
            lines.push(Line::from(err.clone().red()));
        }
        Text::from(lines)
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let instructions = Line::from(vec![
            " Start/Stop ".into(),
            "<Space>".blue().bold(),
            " Clear ".into(),
            "<c>".blue().bold(),
            " Quit ".into(),
            "<q> ".blue().bold(),
        ]);

        let block = Block::bordered()
            .title_bottom(Line::from(format!(" {}", self.status)).left_aligned())
            .title_bottom(instructions.right_aligned())
            .border_set(border::ROUNDED);

        let inner = block.inner(area);
        block.render(area, buf);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let chart_height = (inner.height / 4).min(6);
        let [inner, chart_area] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(chart_height)]).areas(inner);
        let max_display = self.meter.config.normalization.max_display;
        if chart_area.height > 0 {
            let levels = self.meter.chart_levels(chart_area.width as usize);
            Sparkline::default()
                .data(&levels)
                .max(max_display.round() as u64)
                .style(Style::default().fg(Color::Cyan))
                .render(chart_area, buf);
        }
        if inner.height == 0 {
            return;
        }

        let center_y = inner.y + inner.height / 2;
        let center_x = inner.x + inner.width / 2;

        let snap = self.meter.aggregator().snapshot();
        let fraction = (snap.current_level / max_display).clamp(0.0, 1.0);
        let max_bar_height = (inner.height / 2).saturating_sub(1);
        let bar_height = (fraction * max_bar_height as f64).round() as u16;
        let color = self.meter.bands.classify(snap.current_level).color();

        let left = center_x.saturating_sub(1).max(inner.x);
        let right = (center_x + 1).min(inner.x + inner.width - 1);
        for x in left..=right {
            for i in 0..bar_height {
                if center_y >= inner.y + i + 1 {
                    buf[(x, center_y - i - 1)].set_char('█').set_fg(color);
                }
                if center_y + i + 1 < inner.y + inner.height {
                    buf[(x, center_y + i + 1)].set_char('█').set_fg(color);
                }
            }
            buf[(x, center_y)].set_char('─');
        }

        let text_area = Rect::new(inner.x + 1, inner.y, 28, 9).intersection(inner);
        Paragraph::new(self.readout()).render(text_area, buf);
    }
}
