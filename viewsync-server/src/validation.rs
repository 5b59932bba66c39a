//! Input validation for untrusted data.
//!
//! All RPC input is validated here before anything is queued for the host
//! thread, so a rejected call never touches the scene.

use thiserror::Error;
use viewsync_core::EntityId;

/// Maximum length for entity IDs, in characters.
pub const MAX_ENTITY_ID_LEN: usize = 128;
/// Maximum length for entity labels, in characters.
pub const MAX_LABEL_LEN: usize = 256;
/// Maximum number of ids in one batch call.
pub const MAX_BATCH_LEN: usize = 200_000;
/// Maximum number of tag sets.
pub const MAX_TAG_SETS: usize = 1024;
/// Maximum length for a tag set name, in characters.
pub const MAX_TAG_SET_NAME_LEN: usize = 256;
/// Smallest accepted wire color: a signed 32-bit ARGB value.
pub const MIN_PACKED_COLOR: i64 = -0x8000_0000;
/// Largest accepted wire color: an unsigned 32-bit ARGB value.
pub const MAX_PACKED_COLOR: i64 = 0xffff_ffff;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Entity ID is empty.
    #[error("entity id must not be empty")]
    EntityIdEmpty,
    /// Entity ID exceeds maximum length.
    #[error("entity id too long (max {MAX_ENTITY_ID_LEN} chars)")]
    EntityIdTooLong,
    /// Label exceeds maximum length.
    #[error("label too long (max {MAX_LABEL_LEN} chars)")]
    LabelTooLong,
    /// Label contains control characters.
    #[error("label contains control characters")]
    LabelInvalidChars,
    /// Too many ids in one call.
    #[error("batch of {0} ids too large (max {MAX_BATCH_LEN})")]
    BatchTooLarge(usize),
    /// Paired arrays disagree in length.
    #[error("{values} {what} for {ids} ids (expected {expected})")]
    LengthMismatch {
        /// What the second array holds.
        what: &'static str,
        /// Number of ids.
        ids: usize,
        /// Number of values received.
        values: usize,
        /// Number of values required.
        expected: usize,
    },
    /// A color does not fit in 32 bits.
    #[error("color {0} does not fit in 32 bits")]
    ColorOutOfRange(i64),
    /// A coordinate is NaN or infinite.
    #[error("coordinate {0} is not finite")]
    NonFiniteCoordinate(usize),
    /// Sphere size is not a positive finite number.
    #[error("sphere size must be positive and finite, got {0}")]
    InvalidSphereSize(f32),
    /// Too many tag sets.
    #[error("too many tag sets (max {MAX_TAG_SETS})")]
    TooManyTagSets,
    /// Tag set name exceeds maximum length.
    #[error("tag set name too long (max {MAX_TAG_SET_NAME_LEN} chars)")]
    TagSetNameTooLong,
}

impl ValidationError {
    /// Short label used in metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntityIdEmpty | Self::EntityIdTooLong => "entity_id",
            Self::LabelTooLong | Self::LabelInvalidChars => "label",
            Self::BatchTooLarge(_) => "batch",
            Self::LengthMismatch { .. } => "length",
            Self::ColorOutOfRange(_) => "color",
            Self::NonFiniteCoordinate(_) => "coordinates",
            Self::InvalidSphereSize(_) => "sphere_size",
            Self::TooManyTagSets | Self::TagSetNameTooLong => "tag_sets",
        }
    }
}

/// Validate an entity ID.
///
/// # Errors
///
/// Returns [`ValidationError::EntityIdEmpty`] or
/// [`ValidationError::EntityIdTooLong`].
pub fn validate_entity_id(id: &EntityId) -> Result<(), ValidationError> {
    let id = id.as_str();
    if id.is_empty() {
        return Err(ValidationError::EntityIdEmpty);
    }
    if id.chars().count() > MAX_ENTITY_ID_LEN {
        return Err(ValidationError::EntityIdTooLong);
    }
    Ok(())
}

/// Validate a display label. Empty labels are allowed.
///
/// # Errors
///
/// Returns [`ValidationError::LabelTooLong`] or
/// [`ValidationError::LabelInvalidChars`].
pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(ValidationError::LabelTooLong);
    }
    if label.chars().any(char::is_control) {
        return Err(ValidationError::LabelInvalidChars);
    }
    Ok(())
}

/// Validate a batch of ids.
///
/// # Errors
///
/// Returns [`ValidationError::BatchTooLarge`] or the first id error.
pub fn validate_ids(ids: &[EntityId]) -> Result<(), ValidationError> {
    if ids.len() > MAX_BATCH_LEN {
        return Err(ValidationError::BatchTooLarge(ids.len()));
    }
    ids.iter().try_for_each(validate_entity_id)
}

/// Convert a wire color to its 32-bit `0xAARRGGBB` form.
///
/// Clients send either unsigned values or signed 32-bit ARGB integers, where
/// every opaque color is negative. Both map to the same bits.
///
/// # Errors
///
/// Returns [`ValidationError::ColorOutOfRange`] outside
/// [`MIN_PACKED_COLOR`]`..=`[`MAX_PACKED_COLOR`].
pub fn validate_packed_color(color: i64) -> Result<u32, ValidationError> {
    u32::try_from(color)
        .or_else(|_| i32::try_from(color).map(|signed| u32::from_ne_bytes(signed.to_ne_bytes())))
        .map_err(|_| ValidationError::ColorOutOfRange(color))
}

/// Check that there is one color per id and convert them.
///
/// # Errors
///
/// Returns [`ValidationError::LengthMismatch`] or the first
/// [`ValidationError::ColorOutOfRange`].
pub fn validate_colors(ids: &[EntityId], colors: &[i64]) -> Result<Vec<u32>, ValidationError> {
    if ids.len() != colors.len() {
        return Err(ValidationError::LengthMismatch {
            what: "colors",
            ids: ids.len(),
            values: colors.len(),
            expected: ids.len(),
        });
    }
    colors.iter().copied().map(validate_packed_color).collect()
}

/// Check that there are three finite coordinates per id.
///
/// # Errors
///
/// Returns [`ValidationError::LengthMismatch`] or
/// [`ValidationError::NonFiniteCoordinate`] naming the first bad index.
pub fn validate_coordinates(ids: &[EntityId], coordinates: &[f32]) -> Result<(), ValidationError> {
    let expected = ids.len().saturating_mul(3);
    if coordinates.len() != expected {
        return Err(ValidationError::LengthMismatch {
            what: "coordinates",
            ids: ids.len(),
            values: coordinates.len(),
            expected,
        });
    }
    match coordinates.iter().position(|c| !c.is_finite()) {
        Some(index) => Err(ValidationError::NonFiniteCoordinate(index)),
        None => Ok(()),
    }
}

/// Validate a single position.
///
/// # Errors
///
/// Returns [`ValidationError::NonFiniteCoordinate`] (0 = x, 1 = y, 2 = z).
pub fn validate_position(x: f32, y: f32, z: f32) -> Result<(), ValidationError> {
    match [x, y, z].iter().position(|c| !c.is_finite()) {
        Some(index) => Err(ValidationError::NonFiniteCoordinate(index)),
        None => Ok(()),
    }
}

/// Validate a sphere size.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidSphereSize`] unless `size` is finite and > 0.
pub fn validate_sphere_size(size: f32) -> Result<(), ValidationError> {
    if size.is_finite() && size > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidSphereSize(size))
    }
}

/// Validate the tag set name list.
///
/// # Errors
///
/// Returns [`ValidationError::TooManyTagSets`] or
/// [`ValidationError::TagSetNameTooLong`].
pub fn validate_tag_set_names(names: &[String]) -> Result<(), ValidationError> {
    if names.len() > MAX_TAG_SETS {
        return Err(ValidationError::TooManyTagSets);
    }
    if names
        .iter()
        .any(|name| name.chars().count() > MAX_TAG_SET_NAME_LEN)
    {
        return Err(ValidationError::TagSetNameTooLong);
    }
    Ok(())
}
