//! Explicit state record of one editing session.
//!
//! A session holds at most one image. Loading an image starts a detection
//! round identified by a [`DetectionTicket`]; the result of a round is only
//! applied while its ticket still matches the loaded image, so a late
//! detection for a replaced or cancelled image is dropped.

use image::DynamicImage;
use serde::Serialize;

use crate::aspect::AspectChoice;
use crate::error::FaceCropError;
use crate::export::{export_crop, ExportSettings, ExportedImage};
use crate::face_detector::{detect_first_face, first_face, FaceBox, FaceDetector};
use crate::geometry::{compute_crop, CropRect, GeometrySettings};
use crate::intake::{self, ImageSource};

/// Identifies the image a detection round belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionTicket {
    generation: u64,
}

struct LoadedImage {
    source: ImageSource,
    pixels: DynamicImage,
}

/// UI state of the crop widget.
pub struct CropSession {
    geometry: GeometrySettings,
    export: ExportSettings,
    aspect: AspectChoice,
    image: Option<LoadedImage>,
    generation: u64,
    face: Option<FaceBox>,
    crop: Option<CropRect>,
    committed: Option<CropRect>,
    loading: bool,
    drag_hover: bool,
}

/// Serializable view of a [`CropSession`] for rendering.
///
/// The image itself is not part of the snapshot; read it once per load
/// through [`CropSession::image_source`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub natural_width: Option<u32>,
    pub natural_height: Option<u32>,
    pub aspect: AspectChoice,
    pub crop: Option<CropRect>,
    pub committed_crop: Option<CropRect>,
    pub face: Option<FaceBox>,
    pub loading: bool,
    pub drag_hover: bool,
    pub can_download: bool,
}

impl Default for CropSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CropSession {
    pub fn new() -> Self {
        Self {
            geometry: GeometrySettings::default(),
            export: ExportSettings::default(),
            aspect: AspectChoice::default(),
            image: None,
            generation: 0,
            face: None,
            crop: None,
            committed: None,
            loading: false,
            drag_hover: false,
        }
    }

    pub fn with_aspect(mut self, aspect: AspectChoice) -> Self {
        self.aspect = aspect;
        self
    }

    /// Replace the geometry constants. Rejects invalid settings.
    pub fn with_geometry(mut self, geometry: GeometrySettings) -> Result<Self, FaceCropError> {
        geometry.validate()?;
        self.geometry = geometry;
        Ok(self)
    }

    pub fn with_export(mut self, export: ExportSettings) -> Result<Self, FaceCropError> {
        export.validate()?;
        self.export = export;
        Ok(self)
    }

    pub fn aspect(&self) -> AspectChoice {
        self.aspect
    }

    pub fn geometry(&self) -> &GeometrySettings {
        &self.geometry
    }

    pub fn image_source(&self) -> Option<&ImageSource> {
        self.image.as_ref().map(|image| &image.source)
    }

    /// Natural (file) resolution of the loaded image.
    pub fn natural_size(&self) -> Option<(u32, u32)> {
        self.image
            .as_ref()
            .map(|image| (image.pixels.width(), image.pixels.height()))
    }

    pub fn face(&self) -> Option<FaceBox> {
        self.face
    }

    /// Crop currently shown, including uncommitted drags.
    pub fn crop(&self) -> Option<CropRect> {
        self.crop
    }

    /// Last crop the user committed.
    pub fn committed_crop(&self) -> Option<CropRect> {
        self.committed
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_drag_hover(&self) -> bool {
        self.drag_hover
    }

    pub fn can_download(&self) -> bool {
        self.image.is_some() && self.committed.is_some()
    }

    /// Offer a user-selected file.
    ///
    /// Returns `Ok(None)` without touching the session for non-image files.
    pub fn offer_file(
        &mut self,
        mime: &str,
        bytes: &[u8],
    ) -> Result<Option<DetectionTicket>, FaceCropError> {
        match intake::accept(mime, bytes) {
            Some(source) => self.load(source).map(Some),
            None => Ok(None),
        }
    }

    /// Replace the session image and start a detection round.
    ///
    /// On a decode error the previous session is left untouched.
    pub fn load(&mut self, source: ImageSource) -> Result<DetectionTicket, FaceCropError> {
        let pixels = source.decode()?;
        log::info!(
            "loaded {} image {}x{}",
            source.mime(),
            pixels.width(),
            pixels.height()
        );

        self.generation += 1;
        self.image = Some(LoadedImage { source, pixels });
        self.face = None;
        self.crop = None;
        self.committed = None;
        self.loading = true;
        self.drag_hover = false;

        Ok(DetectionTicket {
            generation: self.generation,
        })
    }

    /// Whether `ticket` still refers to the loaded image.
    pub fn is_current(&self, ticket: DetectionTicket) -> bool {
        self.image.is_some() && ticket.generation == self.generation
    }

    /// Apply the outcome of a detection round.
    ///
    /// A failed detection counts as "no face". Returns `false` and changes
    /// nothing when the ticket is stale.
    pub fn complete_detection(
        &mut self,
        ticket: DetectionTicket,
        detections: Result<Vec<FaceBox>, FaceCropError>,
    ) -> bool {
        if !self.is_current(ticket) {
            log::debug!("dropping stale detection result");
            return false;
        }

        self.face = match detections {
            Ok(faces) => first_face(&faces),
            Err(e) => {
                log::warn!("face detection failed, using centered crop: {e}");
                None
            }
        };
        self.loading = false;
        self.recompute_crop();
        true
    }

    /// Run `detector` synchronously for `ticket` and apply the result.
    ///
    /// Without a detector the centered fallback crop is used.
    pub fn run_detection(
        &mut self,
        ticket: DetectionTicket,
        detector: Option<&dyn FaceDetector>,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let detections = match (detector, self.image.as_ref()) {
            (Some(detector), Some(image)) => {
                detect_first_face(detector, &image.pixels).map(|face| face.into_iter().collect())
            }
            _ => Ok(Vec::new()),
        };
        self.complete_detection(ticket, detections)
    }

    /// Switch the aspect ratio and recompute the crop for the loaded image.
    ///
    /// The committed crop no longer matches the new ratio and is dropped.
    pub fn set_aspect(&mut self, aspect: AspectChoice) {
        if aspect == self.aspect {
            return;
        }
        self.aspect = aspect;
        self.committed = None;
        if self.image.is_some() && !self.loading {
            self.recompute_crop();
        }
    }

    /// Whether the crop surface may edit the crop: an image is loaded and
    /// its detection round has completed.
    fn accepts_edits(&self) -> bool {
        self.image.is_some() && !self.loading
    }

    /// Live update from the crop surface while the user drags.
    pub fn update_crop(&mut self, crop: CropRect) {
        if !self.accepts_edits() {
            return;
        }
        self.crop = Some(crop.constrain(self.aspect));
    }

    /// The user finished an edit; this is the crop that gets exported.
    pub fn commit_crop(&mut self, crop: CropRect) {
        if !self.accepts_edits() {
            log::debug!("ignoring crop edit without a computed crop");
            return;
        }
        let crop = crop.constrain(self.aspect);
        self.crop = Some(crop);
        self.committed = Some(crop);
    }

    pub fn set_drag_hover(&mut self, hovering: bool) {
        self.drag_hover = hovering;
    }

    /// Drop the image and every value derived from it.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.image = None;
        self.face = None;
        self.crop = None;
        self.committed = None;
        self.loading = false;
        self.drag_hover = false;
    }

    /// Export the committed crop of the image displayed at the given size.
    ///
    /// Returns `Ok(None)` when there is nothing to export yet.
    pub fn export(
        &self,
        displayed_width: u32,
        displayed_height: u32,
    ) -> Result<Option<ExportedImage>, FaceCropError> {
        let (Some(image), Some(committed)) = (self.image.as_ref(), self.committed) else {
            return Ok(None);
        };
        let crop = committed.to_pixels(displayed_width, displayed_height);
        export_crop(
            &image.pixels,
            displayed_width,
            displayed_height,
            crop,
            &self.export,
        )
        .map(Some)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let natural = self.natural_size();
        SessionSnapshot {
            natural_width: natural.map(|(w, _)| w),
            natural_height: natural.map(|(_, h)| h),
            aspect: self.aspect,
            crop: self.crop,
            committed_crop: self.committed,
            face: self.face,
            loading: self.loading,
            drag_hover: self.drag_hover,
            can_download: self.can_download(),
        }
    }

    fn recompute_crop(&mut self) {
        let Some((width, height)) = self.natural_size() else {
            return;
        };
        self.crop = Some(compute_crop(
            width,
            height,
            self.face.as_ref(),
            self.aspect,
            &self.geometry,
        ));
    }
}
