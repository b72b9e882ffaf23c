use serde::{Deserialize, Serialize};

/// Per-request switches for the three OCR stages.
///
/// On the wire (query string, logs) these are `det`, `rec` and `cls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Locate text regions.
    #[serde(rename = "det")]
    pub detect: bool,
    /// Turn regions into strings.
    #[serde(rename = "rec")]
    pub recognize: bool,
    /// Detect and correct text orientation first.
    #[serde(rename = "cls")]
    pub classify: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            detect: true,
            recognize: true,
            classify: false,
        }
    }
}

/// `[x, y]` in pixels of the submitted image.
pub type Point = [i32; 2];

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        Rect {
            left,
            top,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }

    /// Maps a rectangle measured on a resized image back onto the original.
    pub fn unscale(&self, scale: f32) -> Rect {
        if scale <= 0.0 || (scale - 1.0).abs() < f32::EPSILON {
            return *self;
        }
        let f = |v: i32| (v as f32 / scale).round() as i32;
        Rect {
            left: f(self.left),
            top: f(self.top),
            width: f(self.width),
            height: f(self.height),
        }
    }

    /// Corner points clockwise from the top-left.
    pub fn quad(&self) -> [Point; 4] {
        [
            [self.left, self.top],
            [self.right(), self.top],
            [self.right(), self.bottom()],
            [self.left, self.bottom()],
        ]
    }
}

/// One detected and/or recognized text line.
///
/// Fields the request did not ask for (or the engine cannot supply) are
/// omitted from the JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[Point; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// 0.0 - 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Engine output for a single image. Serializes as a bare JSON array; an
/// image without text is `[]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OcrResult {
    pub lines: Vec<OcrLine>,
}

impl OcrResult {
    pub fn new(lines: Vec<OcrLine>) -> Self {
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Recognized text, one line per entry.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .filter_map(|l| l.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
