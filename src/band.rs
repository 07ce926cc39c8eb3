use color_eyre::eyre::{bail, Result};
use ratatui::style::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoudnessBand {
    Quiet,
    Normal,
    Loud,
}

impl LoudnessBand {
    pub fn label(self) -> &'static str {
        match self {
            LoudnessBand::Quiet => "quiet",
            LoudnessBand::Normal => "normal",
            LoudnessBand::Loud => "loud",
        }
    }

    pub fn color(self) -> Color {
        match self {
            LoudnessBand::Quiet => Color::DarkGray,
            LoudnessBand::Normal => Color::Green,
            LoudnessBand::Loud => Color::Red,
        }
    }
}

/// Display-level cut points for the quiet/normal/loud labels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub quiet_below: f64,
    pub loud_above: f64,
}

impl Default for Bands {
    fn default() -> Self {
        Self {
            quiet_below: 40.0,
            loud_above: 75.0,
        }
    }
}

impl Bands {
    pub fn validate(&self) -> Result<()> {
        if !self.quiet_below.is_finite() || !self.loud_above.is_finite() {
            bail!("band thresholds must be finite");
        }
        if self.quiet_below > self.loud_above {
            bail!(
                "--quiet-below ({}) cannot exceed --loud-above ({})",
                self.quiet_below,
                self.loud_above
            );
        }
        Ok(())
    }

    pub fn classify(&self, level: f64) -> LoudnessBand {
        if level < self.quiet_below {
            LoudnessBand::Quiet
        } else if level > self.loud_above {
            LoudnessBand::Loud
        } else {
            LoudnessBand::Normal
        }
    }
}
