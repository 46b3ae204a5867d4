//! Retina Tagger - retinal photograph tagging and measurement
//!
//! This is the CLI entry point for the retina-tagger tool.
//! Run with: cargo run --bin retina-tagger -- tag <folder>

use anyhow::Context;
use retina_tagger::calibration::{CalibrationError, ManualCalibrationState};
use retina_tagger::export::{write_dicom, write_sidecar, CsvLog, TaggingRecord};
use retina_tagger::image_source::{find_images, RetinalImage};
use retina_tagger::metadata::{parse_filename, rename_to_standard, Eye, ImageMetadata};
use retina_tagger::session::{Session, SessionError, SessionOptions};
use retina_tagger::settings::AppSettings;
use retina_tagger::update::{spawn_update_check, CURRENT_VERSION};
use retina_tagger::Point;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage:
  retina-tagger tag <folder> [--dicom] [--rename] [--no-live-overlay] [--check-updates]
  retina-tagger calibrate <image> [--overlay <out.png>] [--check-updates]";

fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let has_flag = |flag: &str| args.iter().any(|arg| arg == flag);
    let overlay_out = args
        .iter()
        .position(|arg| arg == "--overlay")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);
    let positional: Vec<&String> = args
        .iter()
        .enumerate()
        .filter(|(i, arg)| {
            !arg.starts_with("--") && !(*i > 0 && args[i - 1] == "--overlay")
        })
        .map(|(_, arg)| arg)
        .collect();

    let mut settings = AppSettings::load();
    if AppSettings::settings_path().is_some_and(|path| !path.exists()) {
        // First run: write the defaults so they can be edited.
        match settings.save() {
            Ok(path) => tracing::info!("Wrote default settings to {}", path.display()),
            Err(e) => tracing::warn!("{}", e),
        }
    }
    settings.apply_env_overrides()?;
    if has_flag("--dicom") {
        settings.export_dicom = true;
    }
    if has_flag("--rename") {
        settings.rename_files = true;
    }
    if has_flag("--no-live-overlay") {
        settings.live_overlay = false;
    }

    let update_check = has_flag("--check-updates").then(|| {
        spawn_update_check(settings.update_url.clone(), CURRENT_VERSION, |info| {
            if let Some(info) = info {
                println!("\n⬆️  Retina Tagger {} is available: {}", info.version, info.url);
            }
        })
    });

    match (positional.first().map(|s| s.as_str()), positional.get(1)) {
        (Some("tag"), Some(folder)) => run_tag(Path::new(folder.as_str()), &settings)?,
        (Some("calibrate"), Some(image)) => {
            run_calibrate(Path::new(image.as_str()), overlay_out.as_deref(), &settings)?
        }
        _ => println!("{}", USAGE),
    }

    if let Some(handle) = update_check {
        let _ = handle.join();
    }

    Ok(())
}

/// Tag every image in a folder.
fn run_tag(folder: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    let images = find_images(folder, &settings.image_extensions)
        .with_context(|| format!("Failed to scan {}", folder.display()))?;

    println!("👁  Retina Tagger");
    println!("================================================");
    println!("Folder: {}", folder.display());
    println!("Device: {}", settings.device.camera_model);
    println!(
        "Assumed disc diameter: {} mm",
        settings.device.calibration.assumed_disc_diameter_mm
    );
    println!("Log: {}", settings.metadata_log_file);
    println!("Images: {}", images.len());
    println!("================================================\n");

    if images.is_empty() {
        println!("No images found.");
        return Ok(());
    }

    let mut session = Session::new(
        &settings.device,
        SessionOptions {
            live_overlay: settings.live_overlay,
        },
    );
    let mut records = Vec::new();

    for (index, path) in images.iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("[{}/{}] {}", index + 1, images.len(), name);

        let image = match RetinalImage::open(path) {
            Ok(image) => image,
            Err(e) => {
                eprintln!("❌ {}\n", e);
                continue;
            }
        };

        let meta = match annotate(&name, image, &mut session) {
            Ok(meta) => meta,
            Err(e) if is_closed_input(&e) => {
                println!("\nInput closed, stopping");
                break;
            }
            Err(e) => return Err(e),
        };

        let Some(mut record) = TaggingRecord::from_session(&meta, &session, &settings.device) else {
            continue;
        };

        let mut target = path.clone();
        if settings.rename_files {
            match rename_to_standard(path, &meta) {
                Ok(renamed) => {
                    println!("   Renamed to {}", renamed.display());
                    record.set_path(&renamed);
                    target = renamed;
                }
                Err(e) => eprintln!("⚠️  Could not rename {}: {}", name, e),
            }
        }

        if let Err(e) = write_sidecar(&record, &target) {
            eprintln!("⚠️  {}", e);
        }
        if settings.export_dicom {
            if let Some(image) = session.image() {
                if let Err(e) = write_dicom(&record, image.pixels(), &target) {
                    eprintln!("⚠️  {}", e);
                }
            }
        }

        records.push(record);
        println!();
    }

    CsvLog::new(&settings.metadata_log_file)
        .append(&records)
        .context("Failed to update the metadata log")?;
    println!("✅ Tagged {} of {} image(s)", records.len(), images.len());
    Ok(())
}

/// Metadata, calibration and measurements for one image.
fn annotate(name: &str, image: RetinalImage, session: &mut Session) -> anyhow::Result<ImageMetadata> {
    let meta = match parse_filename(name) {
        Some(meta) => {
            println!(
                "   Parsed: patient {}, eye {}, date {}",
                meta.patient_id,
                meta.eye.map(|e| e.to_string()).unwrap_or_default(),
                meta.capture_date.as_deref().unwrap_or("-")
            );
            meta
        }
        None => prompt_metadata()?,
    };

    session.load_image(image);
    calibrate(session)?;
    collect_measurements(session)?;
    Ok(meta)
}

fn is_closed_input(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::UnexpectedEof)
}

/// Auto-calibrate a single image and report the scale.
fn run_calibrate(path: &Path, overlay_out: Option<&Path>, settings: &AppSettings) -> anyhow::Result<()> {
    let mut session = Session::new(&settings.device, SessionOptions::default());
    let image = RetinalImage::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    session.load_image(image);

    let auto = session.auto_calibrate()?;
    let (spacing, _) = auto.calibration.pixel_spacing_mm();
    println!(
        "🎯 Optic disc at ({:.1}, {:.1}), radius {:.1} px",
        auto.disc.center_x, auto.disc.center_y, auto.disc.radius
    );
    println!("🎯 Scale: {:.4} px/mm ({:.6} mm/px)", auto.calibration.pixels_per_mm(), spacing);

    if let Some(out) = overlay_out {
        if let Some(overlay) = session.render_overlay() {
            overlay
                .save(out)
                .with_context(|| format!("Failed to save overlay to {}", out.display()))?;
            println!("Overlay saved to {}", out.display());
        }
    }
    Ok(())
}

/// Auto-calibrate, falling back to two prompted points and a distance.
fn calibrate(session: &mut Session) -> anyhow::Result<()> {
    match session.auto_calibrate() {
        Ok(auto) => {
            println!(
                "   🎯 Optic disc radius {:.1} px, scale {:.4} px/mm",
                auto.disc.radius,
                auto.calibration.pixels_per_mm()
            );
            return Ok(());
        }
        Err(SessionError::Calibration(CalibrationError::NotFound)) => {
            println!("   ⚠️  Optic disc not found, calibrate manually (blank to skip)");
        }
        Err(e) => return Err(e.into()),
    }

    loop {
        session.begin_manual_calibration()?;
        while matches!(
            session.manual_calibration_state(),
            ManualCalibrationState::AwaitingFirstPoint | ManualCalibrationState::AwaitingSecondPoint { .. }
        ) {
            let label = if session.manual_calibration_state().clicks().is_empty() {
                "   First point (x,y): "
            } else {
                "   Second point (x,y): "
            };
            let Some(point) = prompt_point(label)? else {
                session.cancel_manual_calibration();
                println!("   Skipped calibration");
                return Ok(());
            };
            if let Err(e) = session.add_calibration_point(point) {
                eprintln!("   {}", e);
            }
        }

        let input = prompt("   Real distance (mm): ")?;
        if input.is_empty() {
            session.cancel_manual_calibration();
            println!("   Skipped calibration");
            return Ok(());
        }
        let Ok(distance) = input.parse::<f64>() else {
            eprintln!("   Not a number: {}", input);
            session.cancel_manual_calibration();
            continue;
        };

        match session.submit_calibration_distance(distance) {
            Ok(calibration) => {
                println!("   🎯 Scale {:.4} px/mm", calibration.pixels_per_mm());
                return Ok(());
            }
            Err(SessionError::Calibration(e @ CalibrationError::InvalidInput(_))) => {
                eprintln!("   {}", e);
                session.cancel_manual_calibration();
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Prompt for start/end pairs until a blank line.
fn collect_measurements(session: &mut Session) -> anyhow::Result<()> {
    if !session.is_calibrated() {
        println!("   Not calibrated, skipping measurements");
        return Ok(());
    }

    loop {
        let Some(start) = prompt_point("   Measure from (x,y), blank to finish: ")? else {
            break;
        };
        if let Err(e) = session.begin_measurement(start) {
            eprintln!("   {}", e);
            continue;
        }
        let Some(end) = prompt_point("   Measure to (x,y): ")? else {
            session.cancel_measurement();
            break;
        };
        match session.end_measurement(end) {
            Ok(m) => println!("   📏 {:.2} mm ({:.1} px)", m.rounded_mm(), m.pixel_length),
            Err(e) => {
                eprintln!("   {}", e);
                session.cancel_measurement();
            }
        }
    }

    println!("   {} measurement(s)", session.measurements().len());
    Ok(())
}

fn prompt_metadata() -> anyhow::Result<ImageMetadata> {
    println!("   Filename not recognized, enter metadata");
    let patient_id = prompt("   Patient ID: ")?;
    let eye = read_eye(&mut io::stdin().lock(), &mut io::stdout())?;
    let date = prompt("   Capture date (YYYY-MM-DD) [today]: ")?;
    let tags = prompt("   Diagnosis tags: ")?;
    let notes = prompt("   Notes: ")?;
    Ok(ImageMetadata::manual(&patient_id, eye, &date, &tags, &notes))
}

/// Read a point; `None` on a blank line. Re-prompts on malformed input.
fn prompt_point(label: &str) -> io::Result<Option<Point>> {
    loop {
        let input = prompt(label)?;
        if input.is_empty() {
            return Ok(None);
        }
        match input.parse::<Point>() {
            Ok(point) => return Ok(Some(point)),
            Err(e) => eprintln!("   {}", e),
        }
    }
}

/// Ask for the eye until OD, OS or OU is given. Blank input is not accepted.
fn read_eye(input: &mut impl BufRead, out: &mut impl Write) -> io::Result<Eye> {
    loop {
        write!(out, "   Eye (OD/OS/OU): ")?;
        out.flush()?;
        let answer = read_trimmed_line(input)?;
        if answer.is_empty() {
            writeln!(out, "   Eye is required")?;
            continue;
        }
        match answer.parse::<Eye>() {
            Ok(eye) => return Ok(eye),
            Err(e) => writeln!(out, "   {}", e)?,
        }
    }
}

/// Read one trimmed line from stdin.
fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    read_trimmed_line(&mut io::stdin().lock())
}

/// One trimmed line. A closed input is an error so prompt loops terminate.
fn read_trimmed_line(input: &mut impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
    }
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_eye_requires_an_answer() {
        let mut input = Cursor::new("\n  \nleft\nos\n");
        let mut out = Vec::new();
        assert_eq!(read_eye(&mut input, &mut out).unwrap(), Eye::OS);

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("Eye is required").count(), 2);
        assert_eq!(printed.matches("Eye (OD/OS/OU)").count(), 4);
    }

    #[test]
    fn test_read_eye_stops_on_closed_input() {
        let mut input = Cursor::new("\n\n");
        let err = read_eye(&mut input, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_closed_input_detected_through_anyhow() {
        let err = read_trimmed_line(&mut Cursor::new("")).unwrap_err();
        assert!(is_closed_input(&anyhow::Error::from(err)));
        assert!(!is_closed_input(&anyhow::anyhow!("other failure")));
    }

    #[test]
    fn test_read_trimmed_line() {
        let mut input = Cursor::new("  12,34 \r\n");
        assert_eq!(read_trimmed_line(&mut input).unwrap(), "12,34");
        assert_eq!(
            read_trimmed_line(&mut input).unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }
}
