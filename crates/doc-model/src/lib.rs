use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_SCALE: f64 = 0.5;
pub const MAX_SCALE: f64 = 3.0;
pub const SCALE_STEP: f64 = 0.25;

pub const DEFAULT_HIGHLIGHT_OPACITY: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Single,
    #[default]
    Double,
}

impl std::str::FromStr for ViewMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "double" => Ok(Self::Double),
            other => Err(ValidationError::UnknownViewMode(other.to_owned())),
        }
    }
}

/// Clockwise page rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Advances by 90°, wrapping at 360°.
    pub fn next(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    /// The rotation that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg0,
            Self::Deg90 => Self::Deg270,
            Self::Deg180 => Self::Deg180,
            Self::Deg270 => Self::Deg90,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = ValidationError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees % 360 {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            _ => Err(ValidationError::InvalidRotation(degrees)),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub current_page: u32,
    pub scale: f64,
    pub rotation: Rotation,
    pub view_mode: ViewMode,
}

impl Default for ViewState {
    fn default() -> Self {
        Self { current_page: 1, scale: 1.0, rotation: Rotation::Deg0, view_mode: ViewMode::Double }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayOptions {
    pub show_student_names: bool,
    pub show_highlight_count: bool,
    pub view_mode: ViewMode,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self { show_student_names: true, show_highlight_count: true, view_mode: ViewMode::Double }
    }
}

/// Point in page-intrinsic units (scale 1.0, rotation 0°, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f64,
    pub y: f64,
}

impl PagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangle in page-intrinsic units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PageRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn top_left(&self) -> PagePoint {
        PagePoint::new(self.x, self.y)
    }

    pub fn is_zero_area(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, point: PagePoint) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangle in viewport pixels, always normalized to a min corner and a
/// non-negative size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_corners(a: ScreenPoint, b: ScreenPoint) -> Self {
        let min_x = a.x.min(b.x);
        let min_y = a.y.min(b.y);
        Self { x: min_x, y: min_y, width: a.x.max(b.x) - min_x, height: a.y.max(b.y) - min_y }
    }
}

/// Native page size in intrinsic units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl Default for PageSize {
    fn default() -> Self {
        Self { width: 612.0, height: 792.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const HIGHLIGHT_YELLOW: Color = Color { r: 0xff, g: 0xeb, b: 0x3b };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` or `#rgb`.
    pub fn from_hex(value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidColor(value.to_owned());
        let digits = value.strip_prefix('#').ok_or_else(invalid)?;

        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_owned(),
            _ => return Err(invalid()),
        };

        let channel = |range: std::ops::Range<usize>| {
            expanded.get(range).and_then(|hex| u8::from_str_radix(hex, 16).ok()).ok_or_else(invalid)
        };

        Ok(Self { r: channel(0..2)?, g: channel(2..4)?, b: channel(4..6)? })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::HIGHLIGHT_YELLOW
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Color::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Caller-supplied highlight key. Generated keys are time-ordered.
    HighlightId
);
string_id!(AnnotationId);
string_id!(StudentId);

impl HighlightId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

impl AnnotationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
}

impl Student {
    pub fn new(id: impl Into<StudentId>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

/// A student's selected passage. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: HighlightId,
    pub page_number: u32,
    pub text: String,
    #[serde(rename = "coordinates")]
    pub rect: PageRect,
    pub student_id: StudentId,
    pub student_name: String,
    #[serde(default)]
    pub color: Color,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_opacity() -> f32 {
    DEFAULT_HIGHLIGHT_OPACITY
}

impl Highlight {
    pub fn new(
        id: HighlightId,
        page_number: u32,
        text: impl Into<String>,
        rect: PageRect,
        student_id: StudentId,
        student_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            page_number,
            text: text.into(),
            rect,
            student_id,
            student_name: student_name.into(),
            color: Color::HIGHLIGHT_YELLOW,
            opacity: DEFAULT_HIGHLIGHT_OPACITY,
        }
    }

    pub fn with_color(mut self, color: Color, opacity: f32) -> Self {
        self.color = color;
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: AnnotationId,
    pub highlight_id: HighlightId,
    pub student_id: StudentId,
    pub student_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_feedback: Option<String>,
}

impl Annotation {
    pub fn new(
        id: AnnotationId,
        highlight_id: HighlightId,
        student_id: StudentId,
        student_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            highlight_id,
            student_id,
            student_name: student_name.into(),
            text: text.into(),
            created_at: Utc::now(),
            teacher_feedback: None,
        }
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn has_feedback(&self) -> bool {
        self.teacher_feedback.is_some()
    }
}

/// Trims annotation text and rejects it when nothing is left.
pub fn validate_annotation_text(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyAnnotationText);
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("selection has zero area ({width}x{height})")]
    ZeroAreaSelection { width: f64, height: f64 },
    #[error("selection contains no text")]
    EmptySelectionText,
    #[error("annotation text is empty")]
    EmptyAnnotationText,
    #[error("feedback text is empty")]
    EmptyFeedbackText,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(u16),
    #[error("unknown view mode {0:?}")]
    UnknownViewMode(String),
    #[error("invalid color {0:?}")]
    InvalidColor(String),
}
