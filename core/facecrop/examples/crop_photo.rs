//! Run the crop pipeline on a photo from disk and write the suggested crop.
//!
//! Usage:
//!   cargo run --example crop_photo -- <image> [1:1|4:5|16:9] [display-width]
//!   cargo run --example crop_photo --features rustface -- portrait.jpg 4:5
//!
//! With the `rustface` feature the SeetaFace model is read from
//! `models/seeta_fd_frontal_v1.0.bin`; without it the centered crop is used.

use facecrop::{AspectChoice, CropSession, DetectorHandle};

static DETECTOR: DetectorHandle = DetectorHandle::new();

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(input_path) = args.next() else {
        eprintln!("usage: crop_photo <image> [1:1|4:5|16:9] [display-width]");
        std::process::exit(2);
    };
    let aspect: AspectChoice = args
        .next()
        .map(|s| s.parse().expect("invalid aspect"))
        .unwrap_or_default();

    let bytes = std::fs::read(&input_path).expect("failed to read input");
    let mime = image::ImageFormat::from_path(&input_path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    let mut session = CropSession::new().with_aspect(aspect);
    let Some(ticket) = session.offer_file(mime, &bytes).expect("failed to decode image") else {
        eprintln!("{input_path} is not an image ({mime})");
        std::process::exit(1);
    };

    #[cfg(feature = "rustface")]
    let detector = DETECTOR.get_or_load(|| {
        let detector = facecrop::RustfaceDetector::load_default()?;
        Ok(Box::new(detector))
    });
    #[cfg(not(feature = "rustface"))]
    let detector = DETECTOR.get();

    session.run_detection(ticket, detector);

    let (natural_width, natural_height) = session.natural_size().expect("image is loaded");
    let display_width: u32 = args
        .next()
        .map(|s| s.parse().expect("invalid display width"))
        .unwrap_or(natural_width);
    let display_height =
        ((natural_height as f64 * display_width as f64 / natural_width as f64).round() as u32).max(1);

    match session.face() {
        Some(face) => println!(
            "face at ({:.0}, {:.0}) {:.0}x{:.0}",
            face.x, face.y, face.width, face.height
        ),
        None => println!("no face found, using centered crop"),
    }

    let crop = session.crop().expect("detection completed");
    println!(
        "{aspect} crop: x={:.2}% y={:.2}% {:.2}%x{:.2}%",
        crop.x, crop.y, crop.width, crop.height
    );

    session.commit_crop(crop);
    let exported = session
        .export(display_width, display_height)
        .expect("export failed")
        .expect("crop is committed");
    std::fs::write(&exported.file_name, &exported.data).expect("failed to write output");
    println!(
        "wrote {} ({}x{}, {} bytes)",
        exported.file_name,
        exported.width,
        exported.height,
        exported.data.len()
    );
}
