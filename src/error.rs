//! Error types for placement, decoding and export.
//!
//! Every fallible operation in the crate reports one of the typed errors
//! below. Validation errors are returned synchronously before any state is
//! touched; decode and export errors are returned once, as the terminal
//! result of the async operation that produced them.

use std::time::Duration;

use thiserror::Error;

use crate::layer::LayerId;

/// Input rejected before any state change.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The upload's declared MIME type is not on the allow-list.
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    /// The upload exceeds the configured byte limit.
    #[error("upload is {size} bytes, limit is {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// The upload contained no bytes.
    #[error("upload is empty")]
    EmptyUpload,

    /// No layer or text object with this id exists.
    #[error("unknown layer: {0}")]
    UnknownLayer(LayerId),

    /// The layer is locked against edits.
    #[error("layer {0} is locked")]
    LayerLocked(LayerId),

    /// Another layer is already being dragged, resized or rotated.
    #[error("layer {active} is mid-interaction")]
    InteractionBusy { active: LayerId },

    /// A color string could not be parsed as `#rgb` or `#rrggbb`.
    #[error("invalid color: {0}")]
    InvalidColor(String),

    /// Arc text needs a strictly positive radius.
    #[error("arc radius must be positive, got {0}")]
    DegenerateArc(f64),

    /// A text style field is out of range.
    #[error("invalid text style: {0}")]
    InvalidStyle(String),

    /// Export was requested before a base garment image was set.
    #[error("no base garment image set")]
    MissingBase,

    /// An image layer in a profile has no asset reference to restore it
    /// from.
    #[error("image layer {0} has no asset reference")]
    MissingAsset(LayerId),

    /// A configuration range is empty or a size is degenerate.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A numeric argument was NaN or infinite.
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
}

/// An image could not be turned into pixels.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The raster decoder rejected the bytes.
    #[error("failed to decode image: {0}")]
    Image(String),

    /// The SVG could not be parsed or rendered.
    #[error("failed to parse svg: {0}")]
    Svg(String),

    /// A remote source could not be fetched through the safe path.
    #[error("failed to fetch {reference}: {reason}")]
    Fetch { reference: String, reason: String },

    /// The background decode task did not complete.
    #[error("decode task failed: {0}")]
    Task(String),

    /// The decoded image has no pixels.
    #[error("image has zero width or height")]
    Empty,

    /// The image declares a size past the raster limit.
    #[error("image is {width}x{height}, limit is {max}x{max}")]
    TooLarge { width: f64, height: f64, max: u32 },
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

/// Placement state outside its documented range.
///
/// Clamping in [`PlacementState`](crate::PlacementState) keeps this from
/// happening in normal use; renderers that find it clamp and log instead of
/// failing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} is not finite")]
    NonFinite { field: &'static str },
}

/// The composite could not be produced. No partial output is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    /// The base image (`layer == None`) or a layer image failed to load.
    #[error("{}: {source}", describe_layer(.layer))]
    Decode {
        layer: Option<LayerId>,
        #[source]
        source: DecodeError,
    },

    /// The raster surface could not be allocated.
    #[error("cannot allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },

    /// PNG encoding failed.
    #[error("failed to encode png: {0}")]
    Encode(String),

    /// Image loading did not finish in time.
    #[error("image loading timed out after {0:?}")]
    Timeout(Duration),

    /// Text markup could not be rasterized.
    #[error("failed to render text layer {layer}: {reason}")]
    Text { layer: LayerId, reason: String },
}

fn describe_layer(layer: &Option<LayerId>) -> String {
    match layer {
        Some(id) => format!("layer {id} failed to load"),
        None => "base image failed to load".to_string(),
    }
}

/// Crate-level error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("invalid json: {0}")]
    Json(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Crate-level result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
