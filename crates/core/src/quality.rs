//! Quality presets: rendering resolution and encoder quality per named level.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity attached to a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Info,
    Warn,
    Success,
    Error,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tone::Info => "info",
            Tone::Warn => "warn",
            Tone::Success => "success",
            Tone::Error => "error",
        })
    }
}

/// Key of one of the three presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    #[default]
    Normal,
    High,
    Ultra,
}

impl QualityLevel {
    /// Parse a preset key. Unknown keys fall back to `Normal`.
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "high" => QualityLevel::High,
            "ultra" => QualityLevel::Ultra,
            _ => QualityLevel::Normal,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            QualityLevel::Normal => "normal",
            QualityLevel::High => "high",
            QualityLevel::Ultra => "ultra",
        }
    }

    pub fn preset(&self) -> &'static QualityPreset {
        match self {
            QualityLevel::Normal => &NORMAL,
            QualityLevel::High => &HIGH,
            QualityLevel::Ultra => &ULTRA,
        }
    }
}

/// Immutable rendering parameters of a quality level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPreset {
    pub level: QualityLevel,
    /// Rendering resolution relative to the 72 dpi PDF baseline.
    pub dpi: u32,
    /// Quality hint in `[0, 1]` for lossy encoders.
    pub encoder_quality: f32,
    pub tone: Tone,
    /// Shown when the preset is selected.
    pub message: &'static str,
    /// Shown if a run is still going after 15 seconds.
    pub after_15s: &'static str,
    /// Shown if a run is still going after 45 seconds.
    pub after_45s: &'static str,
}

static NORMAL: QualityPreset = QualityPreset {
    level: QualityLevel::Normal,
    dpi: 150,
    encoder_quality: 0.82,
    tone: Tone::Info,
    message: "Normal mode (150 DPI) balances quality and size.",
    after_15s: "Processing large files, please wait a bit longer.",
    after_45s: "If it takes too long, split files or choose lower quality.",
};

static HIGH: QualityPreset = QualityPreset {
    level: QualityLevel::High,
    dpi: 220,
    encoder_quality: 0.92,
    tone: Tone::Info,
    message: "High mode (220 DPI) is clearer but produces larger files.",
    after_15s: "Processing at high quality may take longer.",
    after_45s: "Please wait more or choose lower quality for faster export.",
};

static ULTRA: QualityPreset = QualityPreset {
    level: QualityLevel::Ultra,
    dpi: 600,
    encoder_quality: 1.0,
    tone: Tone::Warn,
    message: "Ultra mode (600 DPI) takes longer; use it only when needed.",
    after_15s: "Processing in ultra mode, please keep waiting.",
    after_45s: "Ultra mode needs more time; consider lower quality if needed.",
};

/// All presets in increasing resolution.
pub static PRESETS: [&QualityPreset; 3] = [&NORMAL, &HIGH, &ULTRA];

impl QualityPreset {
    /// Look up a preset by key; unknown keys yield the `normal` preset.
    pub fn lookup(key: &str) -> &'static QualityPreset {
        QualityLevel::from_key(key).preset()
    }

    /// Page rasterization scale.
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }

    /// Quality hint mapped onto the 1..=100 JPEG scale.
    pub fn jpeg_quality(&self) -> u8 {
        jpeg_quality(self.encoder_quality)
    }

    /// Tone used for progress and long-task messages during a run.
    pub fn run_tone(&self) -> Tone {
        if self.tone == Tone::Warn {
            Tone::Warn
        } else {
            Tone::Info
        }
    }
}

/// Map a `[0, 1]` quality hint onto the 1..=100 scale used by JPEG encoders.
pub fn jpeg_quality(hint: f32) -> u8 {
    (hint.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}
