use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

/// Ghostscript `-dPDFSETTINGS` presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Screen,
    Ebook,
    #[default]
    Printer,
    Prepress,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Screen,
        Quality::Ebook,
        Quality::Printer,
        Quality::Prepress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Screen => "screen",
            Quality::Ebook => "ebook",
            Quality::Printer => "printer",
            Quality::Prepress => "prepress",
        }
    }

    /// Label shown in the upload form.
    pub fn label(self) -> &'static str {
        match self {
            Quality::Screen => "Screen (Smallest, 72 DPI)",
            Quality::Ebook => "eBook (Medium, 150 DPI)",
            Quality::Printer => "Printer (High Quality, 300 DPI)",
            Quality::Prepress => "Prepress (Maximum Quality, 300 DPI)",
        }
    }

    /// Lenient parse for form input: missing, blank or unknown values fall
    /// back to the default preset.
    pub fn from_form(value: Option<&str>) -> Self {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Quality::default();
        };
        match <Quality as ValueEnum>::from_str(raw, true) {
            Ok(quality) => quality,
            Err(_) => {
                log::warn!("⚠️  Unknown quality preset {:?}, using {}", raw, Quality::default());
                Quality::default()
            }
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
