use std::{env, path::Path, time::Instant};

use anyhow::{Context, Result};
use platefind::{DetectionOptions, PlateFinderBuilder};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

const REC_MODEL_PATH: &str = "models/rec.onnx";
const REC_KEYS_PATH: &str = "models/keys.txt";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // A missing argument is a no-op exit, not a failure.
    let Some(path) = env::args().nth(1) else {
        println!("usage:\n  platefind <image_file_path>");
        return Ok(());
    };

    let image = image::open(&path).with_context(|| format!("unreadable image: {path}"))?;

    let mut builder = PlateFinderBuilder::new();
    if Path::new(REC_MODEL_PATH).exists() {
        builder = builder.rec_model(REC_MODEL_PATH, REC_KEYS_PATH);
    } else {
        log::warn!("recognition model not found at {REC_MODEL_PATH}; OCR output will be empty");
    }
    let finder = builder.build()?;

    let start = Instant::now();
    match finder.detect(&image, DetectionOptions::default()) {
        Some(plate) => {
            log::info!(
                "plate at {:?}, edge density {:.3}",
                plate.rect.center,
                plate.edge_density
            );
            let line = finder.recognize(&plate.crop)?;
            println!("{}", line.text);

            let cleaned = finder.recognize_preprocessed(&plate.crop)?;
            log::debug!("preprocessed pass: {}", cleaned.text);

            #[cfg(feature = "tesseract")]
            println!("tesseract: {}", finder.recognize_tesseract(&plate.crop)?);
        }
        None => println!("No plate detected"),
    }
    println!("Time taken: {} ms", start.elapsed().as_millis());

    Ok(())
}
