//! mockup-renderer: design placement and print compositing for garment mockups
//!
//! This crate positions user graphics (uploaded images or styled text) on a
//! garment print area, drives drag/resize/rotate interaction, projects the
//! result onto a live preview and flattens it into a high-resolution PNG for
//! print submission.
//!
//! Placements are stored as percentages of the print area, so the preview
//! and the export raster share one set of transform functions in
//! [`geometry`].
//!
//! # Example
//!
//! ```
//! use mockup_renderer::{
//!     EngineConfig, FontLibrary, Hit, ImageContent, Point, PreviewRenderer, Session,
//! };
//!
//! let mut session = Session::with_fonts(EngineConfig::default(), FontLibrary::empty()).unwrap();
//! let logo = session.add_image(ImageContent::decoded(image::RgbaImage::new(64, 64), None));
//!
//! // Drag the logo 40px to the right on the 400x500 print area.
//! session.pointer_down(&logo, Hit::Body, Point::new(200.0, 200.0)).unwrap();
//! session.pointer_move(Point::new(240.0, 200.0));
//! session.pointer_up();
//!
//! let mut preview = PreviewRenderer::new();
//! let frame = preview.frame(&session).unwrap();
//! assert_eq!(frame.layers[0].rect.x, 160.0);
//! ```
//!
//! # Export
//!
//! ```no_run
//! use mockup_renderer::{EngineConfig, ExportPipeline, ImageSource, NoFetcher, Session};
//!
//! # async fn run() -> mockup_renderer::Result<()> {
//! let mut session = Session::new(EngineConfig::default())?;
//! session.set_base(ImageSource::from_bytes(std::fs::read("tee.png").unwrap(), "image/png"), None);
//!
//! let pipeline = ExportPipeline::new(
//!     NoFetcher,
//!     session.config().export.clone(),
//!     session.fonts().clone(),
//! );
//! let submission = session.submit(&pipeline).await?;
//! std::fs::write("composite.png", &submission.composite.png).unwrap();
//! # Ok(())
//! # }
//! ```

pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod layer;
pub mod placement;
pub mod preview;
pub mod profile;
pub mod session;
pub mod text;
pub mod upload;

pub use compositor::{ExportContent, ExportLayer, ExportPipeline, ExportRequest, ExportedImage};
pub use config::{
    BestFit, EngineConfig, ExportSettings, InteractionSettings, PlacementLimits, TextSettings,
    UploadPolicy,
};
pub use error::{DecodeError, Error, ExportError, GeometryError, Result, ValidationError};
pub use geometry::{PercentRect, PixelRect, Point, SurfaceSize};
pub use interaction::{Hit, InteractionController, InteractionState, Key, KeyCommand, Modifiers};
pub use layer::{
    DesignLayer, FetchedImage, FontLibrary, ImageContent, ImageFetcher, ImageSource, LayerContent,
    LayerId, LayerKind, NoFetcher,
};
pub use placement::{PlacementState, ResizeDirection};
pub use preview::{PreviewFrame, PreviewLayer, PreviewRenderer};
pub use profile::{LayerProfile, LayerSummary, PlacementProfile, PlacementSummary, SessionProfile};
pub use session::{Configurable, PlacementEngine, Session, Submission};
pub use text::{TextLayerStore, TextObject, TextPatch};
pub use upload::Upload;
