use std::cell::RefCell;
use std::rc::Rc;

use facecrop::{
    AspectChoice, CropRect, CropSession, DetectionTicket, ExportResolution, ExportSettings,
    ExportedImage, FaceBox, FaceCropError, GeometrySettings,
};
use js_sys::{Function, Promise, Uint8Array};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{Blob, BlobPropertyBag, DragEvent, File, FileList, HtmlAnchorElement, Url};

/// Widget options, passed as a JavaScript object.
///
/// All fields are optional and fall back to the library defaults.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetOptions {
    pub aspect: Option<String>,
    pub margin_factor: Option<f64>,
    pub fallback_inset: Option<f64>,
    pub file_name: Option<String>,
    pub export_resolution: Option<String>,
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

/// Create a JS `Error` with a `code` property.
fn make_error(code: &str, message: &str) -> JsValue {
    let err = js_sys::Error::new(message);
    let _ = js_sys::Reflect::set(&err, &"code".into(), &JsValue::from_str(code));
    JsValue::from(err)
}

/// Convert a `FaceCropError` into a JS `Error` with a machine-readable `code` property.
fn to_js_error(e: FaceCropError) -> JsValue {
    let code = match &e {
        FaceCropError::DecodeError(_) => "DECODE_ERROR",
        FaceCropError::UnsupportedFormat => "UNSUPPORTED_FORMAT",
        FaceCropError::ZeroDimensions => "ZERO_DIMENSIONS",
        FaceCropError::EncodeError(_) => "ENCODE_ERROR",
        FaceCropError::EmptyCrop => "EMPTY_CROP",
        FaceCropError::DetectionFailed(_) => "DETECTION_FAILED",
        FaceCropError::ModelLoad(_) => "MODEL_LOAD",
        FaceCropError::InvalidAspect(_) => "INVALID_ASPECT",
        FaceCropError::InvalidSettings(_) => "INVALID_OPTIONS",
    };
    make_error(code, &e.to_string())
}

fn parse_options(options: JsValue) -> Result<WidgetOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(WidgetOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options)
            .map_err(|e| make_error("INVALID_OPTIONS", &format!("invalid options: {e}")))
    }
}

fn string_to_resolution(resolution: &str) -> Result<ExportResolution, JsValue> {
    match resolution {
        "displayed" => Ok(ExportResolution::Displayed),
        "natural" => Ok(ExportResolution::Natural),
        _ => Err(make_error(
            "INVALID_OPTIONS",
            &format!("unknown export resolution: {resolution}"),
        )),
    }
}

/// Build a configured session from parsed `WidgetOptions`.
fn build_session(opts: &WidgetOptions) -> Result<CropSession, JsValue> {
    let mut session = CropSession::new();
    if let Some(ref aspect) = opts.aspect {
        let aspect: AspectChoice = aspect.parse().map_err(to_js_error)?;
        session = session.with_aspect(aspect);
    }

    let mut geometry = GeometrySettings::default();
    if let Some(margin) = opts.margin_factor {
        geometry.margin_factor = margin;
    }
    if let Some(inset) = opts.fallback_inset {
        geometry.fallback_inset = inset;
    }
    session = session.with_geometry(geometry).map_err(to_js_error)?;

    let mut export = ExportSettings::default();
    if let Some(ref name) = opts.file_name {
        export.file_name = name.clone();
    }
    if let Some(ref resolution) = opts.export_resolution {
        export.resolution = string_to_resolution(resolution)?;
    }
    session.with_export(export).map_err(to_js_error)
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| make_error("SERIALIZE_ERROR", &e.to_string()))
}

fn parse_rect(rect: JsValue) -> Result<CropRect, JsValue> {
    serde_wasm_bindgen::from_value(rect)
        .map_err(|e| make_error("INVALID_CROP", &format!("invalid crop rectangle: {e}")))
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

// Detector registry. The browser loads the model once per page; every widget
// on the page shares the result.

enum DetectorSlot {
    Unloaded,
    Loading(Promise),
    Ready(Function),
    Failed,
}

thread_local! {
    static DETECTOR: RefCell<DetectorSlot> = RefCell::new(DetectorSlot::Unloaded);
}

fn set_detector(slot: DetectorSlot) {
    DETECTOR.with(|cell| *cell.borrow_mut() = slot);
}

/// Register the page's face detector.
///
/// `loader` is called at most once and must return (a promise of) a function
/// `detect(src, naturalWidth, naturalHeight)` resolving to an array of
/// `{ x, y, width, height, confidence? }` boxes in natural pixels.
///
/// The returned promise resolves to `true` once the detector is ready and to
/// `false` if loading failed, in which case every image gets the centered crop.
#[wasm_bindgen(js_name = "loadDetector")]
pub fn load_detector(loader: Function) -> Promise {
    let existing = DETECTOR.with(|cell| match &*cell.borrow() {
        DetectorSlot::Unloaded => None,
        DetectorSlot::Loading(pending) => Some(Err(pending.clone())),
        DetectorSlot::Ready(_) => Some(Ok(true)),
        DetectorSlot::Failed => Some(Ok(false)),
    });
    match existing {
        Some(Ok(ready)) => return Promise::resolve(&JsValue::from_bool(ready)),
        Some(Err(pending)) => {
            return future_to_promise(async move {
                let ready = JsFuture::from(pending)
                    .await
                    .is_ok_and(|value| value.is_function());
                Ok(JsValue::from_bool(ready))
            })
        }
        None => {}
    }

    let pending = match loader.call0(&JsValue::NULL) {
        Ok(result) => Promise::resolve(&result),
        Err(e) => {
            log::warn!("face detector unavailable, using centered crops: {}", describe(&e));
            set_detector(DetectorSlot::Failed);
            return Promise::resolve(&JsValue::FALSE);
        }
    };
    set_detector(DetectorSlot::Loading(pending.clone()));

    future_to_promise(async move {
        let ready = match JsFuture::from(pending).await {
            Ok(value) => match value.dyn_into::<Function>() {
                Ok(detect) => {
                    log::info!("face detector loaded");
                    set_detector(DetectorSlot::Ready(detect));
                    true
                }
                Err(_) => {
                    log::warn!("detector loader did not resolve to a function");
                    set_detector(DetectorSlot::Failed);
                    false
                }
            },
            Err(e) => {
                log::warn!("face detector unavailable, using centered crops: {}", describe(&e));
                set_detector(DetectorSlot::Failed);
                false
            }
        };
        Ok(JsValue::from_bool(ready))
    })
}

/// The detect function, waiting for an in-flight load if there is one.
async fn current_detector() -> Option<Function> {
    let (ready, pending) = DETECTOR.with(|cell| match &*cell.borrow() {
        DetectorSlot::Ready(detect) => (Some(detect.clone()), None),
        DetectorSlot::Loading(pending) => (None, Some(pending.clone())),
        DetectorSlot::Unloaded | DetectorSlot::Failed => (None, None),
    });
    match pending {
        Some(pending) => JsFuture::from(pending)
            .await
            .ok()
            .and_then(|value| value.dyn_into::<Function>().ok()),
        None => ready,
    }
}

async fn detect_faces(src: &str, width: u32, height: u32) -> Result<Vec<FaceBox>, FaceCropError> {
    let Some(detect) = current_detector().await else {
        return Ok(Vec::new());
    };
    let result = detect
        .call3(
            &JsValue::NULL,
            &JsValue::from_str(src),
            &JsValue::from(width),
            &JsValue::from(height),
        )
        .map_err(|e| FaceCropError::DetectionFailed(describe(&e)))?;
    let value = JsFuture::from(Promise::resolve(&result))
        .await
        .map_err(|e| FaceCropError::DetectionFailed(describe(&e)))?;
    if value.is_null() || value.is_undefined() {
        return Ok(Vec::new());
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| FaceCropError::DetectionFailed(e.to_string()))
}

struct WidgetState {
    session: CropSession,
    on_change: Option<Function>,
}

type SharedState = Rc<RefCell<WidgetState>>;

/// Hand the current snapshot to the change listener.
fn notify(state: &SharedState) {
    let (callback, snapshot) = {
        let state = state.borrow();
        (state.on_change.clone(), state.session.snapshot())
    };
    let Some(callback) = callback else {
        return;
    };
    let result = to_js(&snapshot).and_then(|value| callback.call1(&JsValue::NULL, &value));
    if let Err(e) = result {
        log::warn!("change listener failed: {}", describe(&e));
    }
}

/// Undecodable images (SVG, HEIC, truncated files...) are logged and leave
/// the widget as it was, like any other rejected file.
async fn load_image(state: SharedState, mime: String, bytes: Vec<u8>) -> Result<JsValue, JsValue> {
    let offered = state.borrow_mut().session.offer_file(&mime, &bytes);
    let ticket = match offered {
        Ok(Some(ticket)) => ticket,
        Ok(None) => return Ok(JsValue::FALSE),
        Err(e) => {
            log::warn!("ignoring {mime} file: {e}");
            return Ok(JsValue::FALSE);
        }
    };
    notify(&state);
    detect_and_apply(&state, ticket).await;
    Ok(JsValue::TRUE)
}

async fn load_file(state: SharedState, file: File) -> Result<JsValue, JsValue> {
    let mime = file.type_();
    if !facecrop::is_image_mime(&mime) {
        log::debug!("ignoring file {:?} with content type {mime:?}", file.name());
        return Ok(JsValue::FALSE);
    }
    let buffer = JsFuture::from(file.array_buffer()).await?;
    let bytes = Uint8Array::new(&buffer).to_vec();
    load_image(state, mime, bytes).await
}

async fn detect_and_apply(state: &SharedState, ticket: DetectionTicket) {
    let target = {
        let state = state.borrow();
        let source = state.session.image_source().map(|s| s.as_str().to_string());
        source.zip(state.session.natural_size())
    };
    let Some((src, (width, height))) = target else {
        return;
    };

    let detections = detect_faces(&src, width, height).await;
    let applied = state
        .borrow_mut()
        .session
        .complete_detection(ticket, detections);
    if applied {
        notify(state);
    }
}

fn first_file(files: Option<FileList>) -> Option<File> {
    files.and_then(|files| files.get(0))
}

fn trigger_download(exported: &ExportedImage) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| make_error("NO_DOCUMENT", "no window"))?;
    let document = window
        .document()
        .ok_or_else(|| make_error("NO_DOCUMENT", "no document"))?;
    let body = document
        .body()
        .ok_or_else(|| make_error("NO_DOCUMENT", "no document body"))?;

    let parts = js_sys::Array::of1(&Uint8Array::from(&exported.data[..]));
    let options = BlobPropertyBag::new();
    options.set_type(exported.mime());
    let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;
    let url = Url::create_object_url_with_blob(&blob)?;

    let anchor: HtmlAnchorElement = document.create_element("a")?.dyn_into()?;
    anchor.set_href(&url);
    anchor.set_download(&exported.file_name);
    let _ = anchor.set_attribute("style", "display:none;");
    body.append_child(&anchor)?;
    anchor.click();
    anchor.remove();

    Url::revoke_object_url(&url).ok();
    Ok(())
}

/// Face-guided crop widget state, driven by DOM events from the host page.
#[wasm_bindgen]
pub struct CropWidget {
    state: SharedState,
}

#[wasm_bindgen]
impl CropWidget {
    /// Create a widget.
    ///
    /// @param options - Optional object with fields: aspect ("1:1" | "4:5" |
    ///   "16:9"), marginFactor, fallbackInset, fileName, exportResolution
    ///   ("displayed" | "natural")
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<CropWidget, JsValue> {
        let opts = parse_options(options)?;
        let session = build_session(&opts)?;
        Ok(CropWidget {
            state: Rc::new(RefCell::new(WidgetState {
                session,
                on_change: None,
            })),
        })
    }

    /// Register the listener called with a state snapshot after every change.
    #[wasm_bindgen(js_name = "onChange")]
    pub fn on_change(&self, callback: Option<Function>) {
        self.state.borrow_mut().on_change = callback;
    }

    /// Load the first file from a file picker.
    ///
    /// Resolves to `true` when an image was loaded, `false` when the
    /// selection was empty or not an image.
    #[wasm_bindgen(js_name = "handleFiles")]
    pub fn handle_files(&self, files: Option<FileList>) -> Promise {
        self.handle_file(first_file(files))
    }

    /// Load raw image bytes that did not come through a file input.
    #[wasm_bindgen(js_name = "loadBytes")]
    pub fn load_bytes(&self, mime: String, bytes: Vec<u8>) -> Promise {
        future_to_promise(load_image(self.state.clone(), mime, bytes))
    }

    #[wasm_bindgen(js_name = "handleDragOver")]
    pub fn handle_drag_over(&self, event: DragEvent) {
        event.prevent_default();
        self.set_drag_hover(true);
    }

    #[wasm_bindgen(js_name = "handleDragLeave")]
    pub fn handle_drag_leave(&self) {
        self.set_drag_hover(false);
    }

    /// Load the first file of a drop. Non-image drops change nothing.
    #[wasm_bindgen(js_name = "handleDrop")]
    pub fn handle_drop(&self, event: DragEvent) -> Promise {
        event.prevent_default();
        self.set_drag_hover(false);
        let file = first_file(event.data_transfer().and_then(|transfer| transfer.files()));
        self.handle_file(file)
    }

    /// Switch the aspect ratio.
    ///
    /// @param aspect - "1:1", "4:5" or "16:9"
    #[wasm_bindgen(js_name = "setAspect")]
    pub fn set_aspect(&self, aspect: &str) -> Result<(), JsValue> {
        let aspect: AspectChoice = aspect.parse().map_err(to_js_error)?;
        self.state.borrow_mut().session.set_aspect(aspect);
        notify(&self.state);
        Ok(())
    }

    /// Live rectangle from the crop surface, in percent.
    #[wasm_bindgen(js_name = "cropChange")]
    pub fn crop_change(&self, rect: JsValue) -> Result<(), JsValue> {
        let rect = parse_rect(rect)?;
        self.state.borrow_mut().session.update_crop(rect);
        notify(&self.state);
        Ok(())
    }

    /// Final rectangle of a crop edit, in percent. Enables download.
    #[wasm_bindgen(js_name = "cropComplete")]
    pub fn crop_complete(&self, rect: JsValue) -> Result<(), JsValue> {
        let rect = parse_rect(rect)?;
        self.state.borrow_mut().session.commit_crop(rect);
        notify(&self.state);
        Ok(())
    }

    /// Discard the image and every derived value.
    pub fn cancel(&self) {
        self.state.borrow_mut().session.cancel();
        notify(&self.state);
    }

    /// Encode the committed crop of the image as shown at the given size.
    ///
    /// Returns `undefined` when nothing has been committed yet.
    #[wasm_bindgen(js_name = "exportJpeg")]
    pub fn export_jpeg(
        &self,
        displayed_width: u32,
        displayed_height: u32,
    ) -> Result<Option<Uint8Array>, JsValue> {
        let exported = self.export(displayed_width, displayed_height)?;
        Ok(exported.map(|exported| Uint8Array::from(&exported.data[..])))
    }

    /// Save the committed crop as `cropped-image.jpg`.
    ///
    /// Resolves to `false` without side effects when nothing is committed.
    pub fn download(&self, displayed_width: u32, displayed_height: u32) -> Result<bool, JsValue> {
        let Some(exported) = self.export(displayed_width, displayed_height)? else {
            return Ok(false);
        };
        trigger_download(&exported)?;
        log::info!(
            "downloaded {} ({}x{}, {} bytes)",
            exported.file_name,
            exported.width,
            exported.height,
            exported.data.len()
        );
        Ok(true)
    }

    /// Current state snapshot.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        to_js(&self.state.borrow().session.snapshot())
    }

    /// `data:` URL of the loaded image, for an `<img src>`.
    #[wasm_bindgen(js_name = "imageSrc")]
    pub fn image_src(&self) -> Option<String> {
        self.state
            .borrow()
            .session
            .image_source()
            .map(|source| source.as_str().to_string())
    }
}

impl CropWidget {
    fn set_drag_hover(&self, hovering: bool) {
        {
            let mut state = self.state.borrow_mut();
            if state.session.is_drag_hover() == hovering {
                return;
            }
            state.session.set_drag_hover(hovering);
        }
        notify(&self.state);
    }

    fn handle_file(&self, file: Option<File>) -> Promise {
        let state = self.state.clone();
        future_to_promise(async move {
            match file {
                Some(file) => load_file(state, file).await,
                None => Ok(JsValue::FALSE),
            }
        })
    }

    fn export(
        &self,
        displayed_width: u32,
        displayed_height: u32,
    ) -> Result<Option<ExportedImage>, JsValue> {
        self.state
            .borrow()
            .session
            .export(displayed_width, displayed_height)
            .map_err(to_js_error)
    }
}
