use std::{fmt, str::FromStr, sync::LazyLock};

use image::Rgba;
use regex::Regex;
use thiserror::Error;

static FUNCTIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^rgba?\(\s*(\d{1,3})\s*[,\s]\s*(\d{1,3})\s*[,\s]\s*(\d{1,3})\s*(?:[,/]\s*([0-9]*\.?[0-9]+)(%?)\s*)?\)$",
    )
    .expect("color regex is valid")
});

const NAMED: &[(&str, [u8; 4])] = &[
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("red", [255, 0, 0, 255]),
    ("lime", [0, 255, 0, 255]),
    ("green", [0, 128, 0, 255]),
    ("blue", [0, 0, 255, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("aqua", [0, 255, 255, 255]),
    ("magenta", [255, 0, 255, 255]),
    ("fuchsia", [255, 0, 255, 255]),
    ("gray", [128, 128, 128, 255]),
    ("grey", [128, 128, 128, 255]),
    ("silver", [192, 192, 192, 255]),
    ("maroon", [128, 0, 0, 255]),
    ("olive", [128, 128, 0, 255]),
    ("purple", [128, 0, 128, 255]),
    ("teal", [0, 128, 128, 255]),
    ("navy", [0, 0, 128, 255]),
    ("orange", [255, 165, 0, 255]),
    ("pink", [255, 192, 203, 255]),
    ("brown", [165, 42, 42, 255]),
    ("gold", [255, 215, 0, 255]),
    ("skyblue", [135, 206, 235, 255]),
    ("lightgray", [211, 211, 211, 255]),
    ("lightgrey", [211, 211, 211, 255]),
    ("darkgray", [169, 169, 169, 255]),
    ("darkgrey", [169, 169, 169, 255]),
    ("transparent", [0, 0, 0, 0]),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("color value is empty")]
    Empty,
    #[error("unrecognized color: {0}")]
    Unrecognized(String),
    #[error("color channel out of range in {0}")]
    OutOfRange(String),
}

/// A flat fill color, remembered together with the string it was parsed from.
#[derive(Clone, Debug)]
pub struct Color {
    spec: String,
    rgba: Rgba<u8>,
}

impl Color {
    pub fn parse(input: &str) -> Result<Self, ColorError> {
        let spec = input.trim();
        if spec.is_empty() {
            return Err(ColorError::Empty);
        }
        let rgba = parse_rgba(spec)?;
        Ok(Self {
            spec: spec.to_string(),
            rgba,
        })
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn rgba(&self) -> Rgba<u8> {
        self.rgba
    }
}

/// Two colors are the same background if they paint the same pixels.
impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        self.rgba == other.rgba
    }
}

impl Eq for Color {}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

fn parse_rgba(spec: &str) -> Result<Rgba<u8>, ColorError> {
    if let Some(hex) = spec.strip_prefix('#') {
        return parse_hex(hex).ok_or_else(|| ColorError::Unrecognized(spec.to_string()));
    }

    if let Some(caps) = FUNCTIONAL.captures(spec) {
        let channel = |idx: usize| -> Result<u8, ColorError> {
            caps[idx]
                .parse::<u16>()
                .ok()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| ColorError::OutOfRange(spec.to_string()))
        };
        let alpha = match caps.get(4) {
            None => 255,
            Some(m) => {
                let raw: f32 = m
                    .as_str()
                    .parse()
                    .map_err(|_| ColorError::Unrecognized(spec.to_string()))?;
                let fraction = if caps.get(5).is_some_and(|p| p.as_str() == "%") {
                    raw / 100.0
                } else {
                    raw
                };
                if !(0.0..=1.0).contains(&fraction) {
                    return Err(ColorError::OutOfRange(spec.to_string()));
                }
                (fraction * 255.0).round() as u8
            }
        };
        return Ok(Rgba([channel(1)?, channel(2)?, channel(3)?, alpha]));
    }

    let lower = spec.to_ascii_lowercase();
    NAMED
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, rgba)| Rgba(*rgba))
        .ok_or_else(|| ColorError::Unrecognized(spec.to_string()))
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |c: u8| (c as char).to_digit(16).map(|d| d as u8);
    let bytes = hex.as_bytes();
    match bytes.len() {
        3 | 4 => {
            let mut out = [255u8; 4];
            for (slot, &c) in out.iter_mut().zip(bytes) {
                let d = nibble(c)?;
                *slot = d * 17;
            }
            Some(Rgba(out))
        }
        6 | 8 => {
            let mut out = [255u8; 4];
            for (slot, pair) in out.iter_mut().zip(bytes.chunks(2)) {
                *slot = nibble(pair[0])? * 16 + nibble(pair[1])?;
            }
            Some(Rgba(out))
        }
        _ => None,
    }
}

/// Swatches offered when no palette is configured.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#ffffff", "#000000", "#ff0000", "#00a86b", "#1e90ff", "#ffd700", "#ff69b4", "#808080",
];
