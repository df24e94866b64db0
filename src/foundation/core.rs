use crate::foundation::error::{LayerError, LayerResult};

pub use kurbo::{Affine, Point, Rect, Vec2};

/// Axis-aligned box in CSS pixels: `{left, top, width, height}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    /// Left edge.
    pub left: f64,
    /// Top edge.
    pub top: f64,
    /// Width (may be zero).
    pub width: f64,
    /// Height (may be zero).
    pub height: f64,
}

impl Bounds {
    /// Construct bounds from position and size.
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Return `true` when the box covers no pixels (or is not finite).
    pub fn is_empty(self) -> bool {
        !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0
    }

    /// Return `true` when `p` lies inside the half-open box.
    pub fn contains(self, p: Point) -> bool {
        p.x >= self.left
            && p.y >= self.top
            && p.x < self.left + self.width
            && p.y < self.top + self.height
    }

    /// Offset the box by `(dx, dy)`.
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            ..self
        }
    }

    /// Top-left corner.
    pub fn origin(self) -> Point {
        Point::new(self.left, self.top)
    }

    /// Convert into a `kurbo` rectangle.
    pub fn to_rect(self) -> Rect {
        Rect::new(
            self.left,
            self.top,
            self.left + self.width,
            self.top + self.height,
        )
    }
}

/// Per-side box edges (margin, border or padding widths).
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Edges {
    /// Top edge width.
    pub top: f64,
    /// Right edge width.
    pub right: f64,
    /// Bottom edge width.
    pub bottom: f64,
    /// Left edge width.
    pub left: f64,
}

impl Edges {
    /// Same width on all four sides.
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    /// `left + right`.
    pub fn horizontal(self) -> f64 {
        self.left + self.right
    }

    /// `top + bottom`.
    pub fn vertical(self) -> f64 {
        self.top + self.bottom
    }

    /// Return `true` when every side is zero.
    pub fn is_zero(self) -> bool {
        self.top == 0.0 && self.right == 0.0 && self.bottom == 0.0 && self.left == 0.0
    }
}

/// Straight-alpha RGBA8 color. Serialized as `#rrggbb` or `#rrggbbaa`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn parse_hex(s: &str) -> LayerResult<Self> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| LayerError::validation(format!("color must start with '#': {s}")))?;
        let nibble = |c: u8| -> LayerResult<u8> {
            (c as char)
                .to_digit(16)
                .map(|d| d as u8)
                .ok_or_else(|| LayerError::validation(format!("invalid hex color: {s}")))
        };
        let b = hex.as_bytes();
        match b.len() {
            3 => {
                let r = nibble(b[0])?;
                let g = nibble(b[1])?;
                let bl = nibble(b[2])?;
                Ok(Self::rgb(r * 17, g * 17, bl * 17))
            }
            6 | 8 => {
                let byte = |i: usize| -> LayerResult<u8> { Ok(nibble(b[i])? * 16 + nibble(b[i + 1])?) };
                let a = if b.len() == 8 { byte(6)? } else { 255 };
                Ok(Self {
                    r: byte(0)?,
                    g: byte(2)?,
                    b: byte(4)?,
                    a,
                })
            }
            _ => Err(LayerError::validation(format!("invalid hex color: {s}"))),
        }
    }

    /// `#rrggbb` (alpha is emitted separately as an opacity).
    pub fn to_rgb_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Alpha in `[0, 1]`.
    pub fn opacity(self) -> f64 {
        f64::from(self.a) / 255.0
    }
}

impl TryFrom<String> for Rgba8 {
    type Error = LayerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&value)
    }
}

impl From<Rgba8> for String {
    fn from(c: Rgba8) -> Self {
        if c.a == 255 {
            c.to_rgb_hex()
        } else {
            format!("{}{:02x}", c.to_rgb_hex(), c.a)
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
