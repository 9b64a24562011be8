use facecrop::{
    AspectChoice, CropRect, CropSession, DetectorHandle, ExportResolution, ExportSettings,
    FaceBox, FaceCropError, FaceDetector, GeometrySettings,
};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};

fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .unwrap();
    buffer
}

/// Gray backdrop with a bright "face" block at the given pixel rectangle.
fn portrait_png(width: u32, height: u32, face: (u32, u32, u32, u32)) -> Vec<u8> {
    let (fx, fy, fw, fh) = face;
    let img = RgbImage::from_fn(width, height, |x, y| {
        if (fx..fx + fw).contains(&x) && (fy..fy + fh).contains(&y) {
            Rgb([240, 200, 170])
        } else {
            Rgb([60, 60, 60])
        }
    });
    encode_png(&img)
}

/// Phone-style JPEG: stored 40x20, tagged EXIF Orientation=6 (display
/// rotated a quarter turn clockwise, i.e. 20x40).
fn rotated_jpeg() -> Vec<u8> {
    let img = RgbImage::from_pixel(40, 20, Rgb([120, 140, 160]));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .write_image(img.as_raw(), 40, 20, ExtendedColorType::Rgb8)
        .unwrap();

    let exif: [u8; 32] = [
        b'E', b'x', b'i', b'f', 0, 0, // identifier
        0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08, // big-endian TIFF header
        0x00, 0x01, // one entry
        0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00, 0x00, // Orientation = 6
        0x00, 0x00, 0x00, 0x00, // no next IFD
    ];
    let mut tagged = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, (exif.len() + 2) as u8];
    tagged.extend_from_slice(&exif);
    tagged.extend_from_slice(&jpeg[2..]);
    tagged
}

/// Mock face detector returning canned boxes.
struct MockDetector {
    faces: Vec<FaceBox>,
}

impl MockDetector {
    fn with_face(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            faces: vec![FaceBox {
                x,
                y,
                width,
                height,
                confidence: 10.0,
            }],
        }
    }
}

impl FaceDetector for MockDetector {
    fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Result<Vec<FaceBox>, FaceCropError> {
        Ok(self.faces.clone())
    }
}

struct BrokenDetector;

impl FaceDetector for BrokenDetector {
    fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Result<Vec<FaceBox>, FaceCropError> {
        Err(FaceCropError::DetectionFailed("inference backend crashed".into()))
    }
}

#[test]
fn upload_detect_commit_export() {
    let png = portrait_png(1000, 1000, (100, 100, 100, 100));
    let detector = MockDetector::with_face(100.0, 100.0, 100.0, 100.0);

    let mut session = CropSession::new();
    let ticket = session.offer_file("image/png", &png).unwrap().unwrap();
    assert!(session.is_loading());
    assert!(session.run_detection(ticket, Some(&detector)));

    let crop = session.crop().unwrap();
    assert!((crop.width - 15.0).abs() < 1e-9);
    assert!((crop.height - 15.0).abs() < 1e-9);
    assert!((0.0..=85.0).contains(&crop.x));
    assert!((0.0..=85.0).contains(&crop.y));

    assert!(!session.can_download());
    session.commit_crop(crop);
    assert!(session.can_download());

    // Shown at 500x500: 15% is 75 displayed pixels.
    let exported = session.export(500, 500).unwrap().unwrap();
    assert_eq!((exported.width, exported.height), (75, 75));
    assert_eq!(exported.file_name, "cropped-image.jpg");
    assert_eq!(exported.data[0], 0xFF);
    assert_eq!(exported.data[1], 0xD8);

    // The face block sits in the middle of the export.
    let decoded = image::load_from_memory(&exported.data).unwrap().to_rgb8();
    let center = decoded.get_pixel(37, 37);
    assert!(center.0[0] > 180, "expected face color at center, got {center:?}");
}

#[test]
fn broken_detector_falls_back_to_centered_crop() {
    let png = portrait_png(640, 480, (300, 200, 50, 50));
    for aspect in AspectChoice::ALL {
        let mut session = CropSession::new().with_aspect(aspect);
        let ticket = session.offer_file("image/png", &png).unwrap().unwrap();
        assert!(session.run_detection(ticket, Some(&BrokenDetector)));
        assert!(!session.is_loading());

        let crop = session.crop().unwrap();
        assert_eq!(crop, facecrop::fallback_crop(aspect, &GeometrySettings::default()));
        assert!(crop.is_within_bounds());
        assert!(crop.has_aspect(aspect));
    }
}

#[test]
fn dropped_text_file_leaves_session_untouched() {
    let mut session = CropSession::new();
    assert!(session.offer_file("text/plain", b"just words").unwrap().is_none());
    assert!(session.image_source().is_none());
    assert!(session.crop().is_none());
    assert!(!session.is_loading());
}

#[test]
fn export_scenario_from_displayed_half_size() {
    // Natural 400x400 shown at 200x200, committed crop {10,10,50,50}%.
    let mut img = RgbImage::from_pixel(400, 400, Rgb([20, 20, 200]));
    for y in 40..240 {
        for x in 40..240 {
            img.put_pixel(x, y, Rgb([200, 20, 20]));
        }
    }
    let mut session = CropSession::new();
    let ticket = session.offer_file("image/png", &encode_png(&img)).unwrap().unwrap();
    session.run_detection(ticket, None);
    session.commit_crop(CropRect::new(10.0, 10.0, 50.0, 50.0));

    let exported = session.export(200, 200).unwrap().unwrap();
    assert_eq!((exported.width, exported.height), (100, 100));

    let decoded = image::load_from_memory(&exported.data).unwrap().to_rgb8();
    for (x, y) in [(1, 1), (50, 50), (98, 98)] {
        let pixel = decoded.get_pixel(x, y);
        assert!(pixel.0[0] > 150 && pixel.0[2] < 80, "({x}, {y}) = {pixel:?}");
    }
}

#[test]
fn natural_resolution_export() {
    let png = portrait_png(400, 400, (0, 0, 10, 10));
    let mut session = CropSession::new()
        .with_export(ExportSettings {
            resolution: ExportResolution::Natural,
            file_name: "face.jpg".into(),
        })
        .unwrap();
    let ticket = session.offer_file("image/png", &png).unwrap().unwrap();
    session.run_detection(ticket, None);
    session.commit_crop(CropRect::new(10.0, 10.0, 50.0, 50.0));

    let exported = session.export(200, 200).unwrap().unwrap();
    assert_eq!((exported.width, exported.height), (200, 200));
    assert_eq!(exported.file_name, "face.jpg");
}

#[test]
fn transparent_png_exports_over_white() {
    let img = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 0]));
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(img.as_raw(), 20, 20, ExtendedColorType::Rgba8)
        .unwrap();

    let mut session = CropSession::new();
    let ticket = session.offer_file("image/png", &buffer).unwrap().unwrap();
    session.run_detection(ticket, None);
    session.commit_crop(session.crop().unwrap());

    let exported = session.export(20, 20).unwrap().unwrap();
    let decoded = image::load_from_memory(&exported.data).unwrap().to_rgb8();
    let pixel = decoded.get_pixel(decoded.width() / 2, decoded.height() / 2);
    assert!(pixel.0.iter().all(|c| *c > 240), "expected white, got {pixel:?}");
}

#[test]
fn exif_rotated_photo_uses_displayed_orientation() {
    let mut session = CropSession::new();
    let ticket = session.offer_file("image/jpeg", &rotated_jpeg()).unwrap().unwrap();
    assert_eq!(session.natural_size(), Some((20, 40)));

    session.run_detection(ticket, None);
    session.commit_crop(session.crop().unwrap());
    let exported = session.export(20, 40).unwrap().unwrap();
    assert_eq!((exported.width, exported.height), (18, 36));
}

#[test]
fn edits_during_detection_cannot_outlive_an_aspect_change() {
    let png = portrait_png(200, 200, (50, 50, 40, 40));
    let mut session = CropSession::new();
    let ticket = session.offer_file("image/png", &png).unwrap().unwrap();

    session.commit_crop(CropRect::new(10.0, 10.0, 50.0, 50.0));
    session.set_aspect(AspectChoice::Wide);
    assert!(session.complete_detection(ticket, Ok(vec![])));

    assert_eq!(session.aspect(), AspectChoice::Wide);
    assert!(session.committed_crop().is_none());
    assert!(!session.can_download());
    assert!(session.crop().unwrap().has_aspect(AspectChoice::Wide));
}

#[test]
fn reloading_supersedes_in_flight_detection() {
    let first = portrait_png(300, 300, (10, 10, 30, 30));
    let second = portrait_png(200, 400, (50, 50, 40, 40));

    let mut session = CropSession::new();
    let stale = session.offer_file("image/png", &first).unwrap().unwrap();
    let fresh = session.offer_file("image/png", &second).unwrap().unwrap();

    let detector = MockDetector::with_face(10.0, 10.0, 30.0, 30.0);
    assert!(!session.run_detection(stale, Some(&detector)));
    assert!(session.is_loading());

    assert!(session.run_detection(fresh, None));
    assert_eq!(session.natural_size(), Some((200, 400)));
    assert!(session.face().is_none());
}

#[test]
fn aspect_toggle_keeps_face_centered() {
    let png = portrait_png(1000, 1000, (400, 400, 100, 200));
    let detector = MockDetector::with_face(400.0, 400.0, 100.0, 200.0);
    let mut session = CropSession::new();
    let ticket = session.offer_file("image/png", &png).unwrap().unwrap();
    session.run_detection(ticket, Some(&detector));

    for aspect in [AspectChoice::Wide, AspectChoice::Portrait, AspectChoice::Square] {
        session.set_aspect(aspect);
        let crop = session.crop().unwrap();
        assert!(crop.has_aspect(aspect));
        let center_x = crop.x + crop.width / 2.0;
        let center_y = crop.y + crop.height / 2.0;
        assert!((center_x - 45.0).abs() < 1e-9, "{aspect}: {crop:?}");
        assert!((center_y - 50.0).abs() < 1e-9, "{aspect}: {crop:?}");
    }
}

#[test]
fn shared_detector_handle_feeds_sessions() {
    static DETECTOR: DetectorHandle = DetectorHandle::new();

    let detector = DETECTOR.get_or_load(|| Ok(Box::new(MockDetector::with_face(0.0, 0.0, 50.0, 50.0))));
    let png = portrait_png(100, 100, (0, 0, 50, 50));
    let mut session = CropSession::new();
    let ticket = session.offer_file("image/png", &png).unwrap().unwrap();
    session.run_detection(ticket, detector);

    let crop = session.crop().unwrap();
    assert_eq!((crop.x, crop.y), (0.0, 0.0));
    assert!((crop.width - 75.0).abs() < 1e-9);
}

#[cfg(feature = "rustface")]
#[test]
fn missing_model_degrades_to_no_detector() {
    static DETECTOR: DetectorHandle = DetectorHandle::new();

    let detector = DETECTOR.get_or_load(|| {
        let detector = facecrop::RustfaceDetector::from_path("no/such/model.bin")?;
        Ok(Box::new(detector))
    });
    assert!(detector.is_none());
}
