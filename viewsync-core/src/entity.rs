//! Visual entities - the spots mirrored into the viewer.

use serde::{Deserialize, Serialize};

use crate::SceneHandle;

/// External identifier of a visual entity.
///
/// The external tool addresses spots either by name or by integer pool index;
/// both are normalized to the string form so `7` and `"7"` name the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawEntityId", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Create an id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Wire form of an entity id.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntityId {
    Text(String),
    Index(u64),
}

impl From<RawEntityId> for EntityId {
    fn from(raw: RawEntityId) -> Self {
        match raw {
            RawEntityId::Text(s) => Self(s),
            RawEntityId::Index(n) => Self::from(n),
        }
    }
}

/// Position in viewer space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Read position `index` from a flat `[x0, y0, z0, x1, ...]` buffer.
    #[must_use]
    pub fn from_flat(coordinates: &[f32], index: usize) -> Option<Self> {
        let start = index.checked_mul(3)?;
        match coordinates.get(start..start.checked_add(3)?)? {
            [x, y, z] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }

    /// Whether every coordinate is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Linear RGBA color, channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    /// Red channel.
    pub r: f32,
    /// Green channel.
    pub g: f32,
    /// Blue channel.
    pub b: f32,
    /// Alpha channel.
    pub a: f32,
}

impl Rgba {
    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// Create a color from channels.
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Decode a packed `0x??RRGGBB` integer. The top byte is ignored and the
    /// result is always opaque.
    #[must_use]
    pub fn from_packed_rgb(packed: u32) -> Self {
        let [_, r, g, b] = packed.to_be_bytes();
        Self::new(
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            1.0,
        )
    }

    /// Encode as `0x00RRGGBB`, rounding each channel to the nearest byte.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_packed_rgb(&self) -> u32 {
        let byte = |c: f32| u32::from((c.clamp(0.0, 1.0) * 255.0).round() as u8);
        (byte(self.r) << 16) | (byte(self.g) << 8) | byte(self.b)
    }

    /// Stable default color for an entity that was added without one.
    ///
    /// The id is hashed (FNV-1a) and spread around the hue wheel with the
    /// golden-ratio step, so neighbouring ids get visually distinct colors.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn derived_from(id: &EntityId) -> Self {
        const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;
        let hash = id
            .as_str()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            });
        let unit = f64::from((hash >> 32) as u32) / f64::from(u32::MAX);
        let hue = (unit + GOLDEN_RATIO_CONJUGATE).fract();
        Self::from_hsv(hue, 0.65, 0.95)
    }

    #[allow(clippy::cast_possible_truncation, clippy::many_single_char_names)]
    fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let sector = (h * 6.0).floor();
        let f = h * 6.0 - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - f * s);
        let t = v * (1.0 - (1.0 - f) * s);
        let (r, g, b) = match sector as i64 % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::new(r as f32, g as f32, b as f32, 1.0)
    }
}

/// A spot mirrored into the viewer.
///
/// The handle is fixed at creation; everything else is mutated by the
/// executor on the host thread.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualEntity {
    id: EntityId,
    handle: SceneHandle,
    /// Display label (object name in the viewer).
    pub label: String,
    /// Current position.
    pub position: Position,
    /// Current color.
    pub color: Rgba,
    /// Whether the entity is shown.
    pub visible: bool,
}

impl VisualEntity {
    /// Create a visible entity bound to `handle`.
    #[must_use]
    pub fn new(
        id: EntityId,
        handle: SceneHandle,
        label: impl Into<String>,
        position: Position,
        color: Rgba,
    ) -> Self {
        Self {
            id,
            handle,
            label: label.into(),
            position,
            color,
            visible: true,
        }
    }

    /// External id.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Host handle owned by this entity.
    #[must_use]
    pub fn handle(&self) -> SceneHandle {
        self.handle
    }
}
