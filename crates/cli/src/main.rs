use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rollcall_core::encoding::domain::face_encoder::FaceEncoder;
use rollcall_core::encoding::infrastructure::onnx_face_encoder::{
    OnnxFaceEncoder, DEFAULT_CONFIDENCE,
};
use rollcall_core::gallery::domain::encoding_store::{EncodingStore, StudentId};
use rollcall_core::gallery::domain::gallery_repository::GalleryRepository;
use rollcall_core::gallery::infrastructure::json_gallery_repository::JsonGalleryRepository;
use rollcall_core::imaging::domain::photo_reader::PhotoReader;
use rollcall_core::imaging::infrastructure::image_file_crop_writer::ImageFileCropWriter;
use rollcall_core::imaging::infrastructure::image_file_photo_reader::ImageFilePhotoReader;
use rollcall_core::matching::domain::detection::DetectionId;
use rollcall_core::matching::domain::match_engine::{match_detection, MatchConfig, MatchVerdict};
use rollcall_core::matching::domain::roster_builder::Roster;
use rollcall_core::pipeline::enroll_class_use_case::{EnrollClassUseCase, ReferencePhoto};
use rollcall_core::pipeline::export_unrecognized_use_case::ExportUnrecognizedUseCase;
use rollcall_core::pipeline::take_attendance_use_case::TakeAttendanceUseCase;
use rollcall_core::session::reconciliation_session::{
    expect_single_face, ReconciliationSession, ReuploadLabel, SessionState,
};
use rollcall_core::shared::constants::{
    DEFAULT_MATCH_THRESHOLD, DETECTOR_MODEL_NAME, DETECTOR_MODEL_URL, EMBEDDING_MODEL_NAME,
    EMBEDDING_MODEL_URL, IMAGE_EXTENSIONS, RECOMMENDED_REFERENCES_PER_STUDENT,
};
use rollcall_core::shared::model_resolver;

/// Classroom attendance from a single group photo.
#[derive(Parser)]
#[command(name = "rollcall")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a reference gallery from labeled student photos.
    ///
    /// Photos are picked up from `<roll>_<name>/` subdirectories or flat
    /// `<roll>_<name>.jpg` files under the photos directory.
    Enroll {
        /// Directory of labeled reference photos.
        photos_dir: PathBuf,

        /// Gallery file to write.
        #[arg(long)]
        gallery: PathBuf,

        /// Worker threads for encoding (defaults to the CPU count).
        #[arg(long)]
        workers: Option<usize>,

        /// Face detection confidence threshold (0.0-1.0).
        #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
        confidence: f64,
    },

    /// Take attendance from a group photo.
    Attend {
        /// The classroom group photo.
        photo: PathBuf,

        /// Gallery file to match against.
        #[arg(long)]
        gallery: PathBuf,

        /// Match distance threshold.
        #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
        threshold: f64,

        /// Save unrecognized face crops to this directory.
        #[arg(long)]
        crops_dir: Option<PathBuf>,

        /// Print the roster as JSON instead of a report.
        #[arg(long)]
        json: bool,

        /// Resolve unrecognized faces interactively over stdin.
        #[arg(long)]
        interactive: bool,

        /// Face detection confidence threshold (0.0-1.0).
        #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
        confidence: f64,
    },

    /// Fold one labeled face photo into the gallery.
    Label {
        /// A photo of exactly one face.
        photo: PathBuf,

        /// Gallery file to update.
        #[arg(long)]
        gallery: PathBuf,

        /// Roll number of the pictured student.
        #[arg(long)]
        roll_no: String,

        /// Display name; required when the roll number is new.
        #[arg(long)]
        name: Option<String>,

        /// Face detection confidence threshold (0.0-1.0).
        #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
        confidence: f64,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Enroll {
            photos_dir,
            gallery,
            workers,
            confidence,
        } => {
            validate_confidence(confidence)?;
            run_enroll(&photos_dir, &gallery, workers, confidence)
        }
        Command::Attend {
            photo,
            gallery,
            threshold,
            crops_dir,
            json,
            interactive,
            confidence,
        } => {
            validate_confidence(confidence)?;
            if threshold < 0.0 {
                return Err(format!("Threshold must be non-negative, got {threshold}").into());
            }
            run_attend(
                &photo,
                &gallery,
                threshold,
                crops_dir.as_deref(),
                json,
                interactive,
                confidence,
            )
        }
        Command::Label {
            photo,
            gallery,
            roll_no,
            name,
            confidence,
        } => {
            validate_confidence(confidence)?;
            run_label(&photo, &gallery, &roll_no, name.as_deref(), confidence)
        }
    }
}

fn validate_confidence(confidence: f64) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(format!("Confidence must be between 0.0 and 1.0, got {confidence}").into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_enroll(
    photos_dir: &Path,
    gallery_path: &Path,
    workers: Option<usize>,
    confidence: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    if !photos_dir.is_dir() {
        return Err(format!("Photos directory not found: {}", photos_dir.display()).into());
    }

    let labeled = scan_reference_photos(photos_dir)?;
    if labeled.is_empty() {
        return Err(format!("No labeled photos found in {}", photos_dir.display()).into());
    }

    let reader = ImageFilePhotoReader::new();
    let mut references = Vec::with_capacity(labeled.len());
    for (student_id, name, path) in labeled {
        let photo = reader.read(&path)?;
        references.push(ReferencePhoto {
            student_id,
            name,
            photo,
        });
    }

    let encoder = build_encoder(confidence)?;
    let use_case = EnrollClassUseCase::new(encoder, workers);
    let (store, skipped) = use_case.execute(references)?;

    for skip in &skipped {
        eprintln!("Skipped a photo for {}: {}", skip.student_id, skip.reason);
    }
    for (id, record) in store.students() {
        if record.encodings.len() < RECOMMENDED_REFERENCES_PER_STUDENT {
            log::warn!(
                "{id} has {} reference photo(s); {RECOMMENDED_REFERENCES_PER_STUDENT} are recommended",
                record.encodings.len()
            );
        }
    }

    JsonGalleryRepository::new(gallery_path).save(&store.serialize())?;
    log::info!(
        "Gallery with {} students written to {}",
        store.len(),
        gallery_path.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_attend(
    photo_path: &Path,
    gallery_path: &Path,
    threshold: f64,
    crops_dir: Option<&Path>,
    json: bool,
    interactive: bool,
    confidence: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let repository = JsonGalleryRepository::new(gallery_path);
    let store = EncodingStore::load(repository.load()?)?;
    let photo = ImageFilePhotoReader::new().read(photo_path)?;

    let encoder = build_encoder(confidence)?;
    let use_case = TakeAttendanceUseCase::new(encoder, MatchConfig { threshold });
    let mut session = use_case.execute(&photo, store)?;

    if json {
        println!("{}", serde_json::to_string_pretty(session.roster())?);
    } else {
        println!("{}", render_report(session.roster()));
    }

    if let Some(dir) = crops_dir {
        let export = ExportUnrecognizedUseCase::new(Box::new(ImageFileCropWriter::new()));
        let saved = export.execute(&photo, session.roster(), dir)?;
        for (id, path) in &saved {
            eprintln!("Unrecognized face {id} saved to {}", path.display());
        }
    }

    if interactive && session.state() == SessionState::Open {
        resolve_interactively(&mut session)?;
        let (roster, store) = session.close();
        repository.save(&store.serialize())?;
        log::info!("Updated gallery written to {}", gallery_path.display());
        println!("{}", render_report(&roster));
    }

    Ok(())
}

fn run_label(
    photo_path: &Path,
    gallery_path: &Path,
    roll_no: &str,
    name: Option<&str>,
    confidence: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let repository = JsonGalleryRepository::new(gallery_path);
    let mut store = EncodingStore::load(repository.load()?)?;

    let photo = ImageFilePhotoReader::new().read(photo_path)?;
    let encoder = build_encoder(confidence)?;
    let face = expect_single_face(encoder.encode(&photo)?)?;

    // Advisory only: the operator's label decides where the encoding goes
    if !store.is_empty() {
        let verdict = match_detection(&face.encoding, &store, &MatchConfig::default())?;
        match verdict {
            MatchVerdict::Matched {
                student_id,
                distance,
            } => log::info!("Engine matched this face to {student_id} at distance {distance:.3}"),
            MatchVerdict::Unrecognized => log::info!("Engine did not recognize this face"),
        }
    }

    let student_id = StudentId::new(roll_no);
    if store.contains(&student_id) {
        store.add_encoding(&student_id, face.encoding)?;
        log::info!(
            "Added a reference encoding to {student_id} ({} total)",
            store.get(&student_id).map(|r| r.encodings.len()).unwrap_or(0)
        );
    } else {
        let name = name.ok_or("--name is required when enrolling a new roll number")?;
        store.enroll(student_id.clone(), name, face.encoding)?;
        log::info!("Enrolled new student {student_id}");
    }

    repository.save(&store.serialize())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Interactive reconciliation
// ---------------------------------------------------------------------------

fn resolve_interactively(
    session: &mut ReconciliationSession,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let reader = ImageFilePhotoReader::new();

    while session.state() == SessionState::Open {
        let pending: Vec<String> = session.pending().iter().map(|id| id.to_string()).collect();
        println!("Pending unrecognized entries: {}", pending.join(", "));

        let Some(entry) = prompt(&mut lines, "Entry id to resolve (or 'done'): ")? else {
            break;
        };
        if entry == "done" {
            break;
        }
        let Ok(entry_id) = entry.parse::<usize>() else {
            eprintln!("Not an entry id: {entry}");
            continue;
        };

        let Some(path) = prompt(&mut lines, "Path to a labeled photo: ")? else {
            break;
        };
        let photo = match reader.read(Path::new(&path)) {
            Ok(photo) => photo,
            Err(e) => {
                eprintln!("Could not read {path}: {e}");
                continue;
            }
        };

        let Some(roll_no) = prompt(&mut lines, "Roll number: ")? else {
            break;
        };
        let student_id = StudentId::new(roll_no.as_str());

        let label = if session.store().contains(&student_id) {
            ReuploadLabel::Enrolled(student_id)
        } else {
            let Some(name) = prompt(&mut lines, "Name for the new student: ")? else {
                break;
            };
            ReuploadLabel::NewStudent { student_id, name }
        };

        match session.submit_reupload(DetectionId(entry_id), &photo, label) {
            Ok(outcome) => {
                let agreement = match &outcome.verdict {
                    MatchVerdict::Matched {
                        student_id,
                        distance,
                    } => format!("engine saw {student_id} at distance {distance:.3}"),
                    MatchVerdict::Unrecognized => "engine saw nobody it knew".to_string(),
                };
                println!(
                    "Entry {entry_id} resolved as {}{} ({agreement})",
                    outcome.student_id,
                    if outcome.newly_enrolled {
                        " [newly enrolled]"
                    } else {
                        ""
                    },
                );
            }
            Err(e) => eprintln!("Reupload rejected: {e}"),
        }
    }

    Ok(())
}

fn prompt(
    lines: &mut std::io::Lines<std::io::StdinLock<'_>>,
    message: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    eprint!("{message}");
    std::io::stderr().flush()?;
    match lines.next() {
        Some(line) => Ok(Some(line?.trim().to_string())),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Report rendering
// ---------------------------------------------------------------------------

fn render_report(roster: &Roster) -> String {
    let mut out = String::new();

    out.push_str(&format!("Present ({}):\n", roster.present.len()));
    for entry in &roster.present {
        out.push_str(&format!(
            "  {:<8} {:<24} confidence {:.2}",
            entry.student_id, entry.name, entry.confidence()
        ));
        if entry.detections.len() > 1 {
            out.push_str(&format!("  [{} detections]", entry.detections.len()));
        }
        out.push('\n');
    }

    out.push_str(&format!("Absent ({}):\n", roster.absent.len()));
    for entry in &roster.absent {
        out.push_str(&format!("  {:<8} {}\n", entry.student_id, entry.name));
    }

    out.push_str(&format!(
        "Unrecognized faces: {}\n",
        roster.unrecognized.len()
    ));
    out.push_str(&format!(
        "Average confidence: {:.2}",
        roster.average_confidence()
    ));
    out
}

// ---------------------------------------------------------------------------
// Reference photo discovery
// ---------------------------------------------------------------------------

/// Collects `(student id, name, path)` triples from the photos directory.
///
/// Accepts the two layouts the original datasets used: one subdirectory
/// per student named `<roll>_<name>`, or flat files named
/// `<roll>_<name>.<ext>`. Entries are sorted for deterministic order.
fn scan_reference_photos(
    dir: &Path,
) -> Result<Vec<(StudentId, String, PathBuf)>, Box<dyn std::error::Error>> {
    let mut result = Vec::new();

    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            let Some((roll_no, name)) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_student_label)
            else {
                log::warn!("Skipping unlabeled directory {}", entry.display());
                continue;
            };

            let mut files: Vec<PathBuf> = std::fs::read_dir(&entry)?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|e| e.path())
                .filter(|p| is_image(p))
                .collect();
            files.sort();

            for file in files {
                result.push((StudentId::new(roll_no.as_str()), name.clone(), file));
            }
        } else if is_image(&entry) {
            let Some((roll_no, name)) = entry
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(parse_student_label)
            else {
                log::warn!("Skipping unlabeled file {}", entry.display());
                continue;
            };
            result.push((StudentId::new(roll_no), name, entry));
        }
    }

    Ok(result)
}

/// Splits `<roll>_<name>` into a roll number and a display name.
/// Underscores in the name part become spaces, title-cased.
fn parse_student_label(label: &str) -> Option<(String, String)> {
    let (roll_no, raw_name) = label.split_once('_')?;
    if roll_no.is_empty() || raw_name.is_empty() {
        return None;
    }
    Some((roll_no.to_string(), title_case(&raw_name.replace('_', " "))))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Encoder wiring
// ---------------------------------------------------------------------------

fn build_encoder(confidence: f64) -> Result<Arc<dyn FaceEncoder>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {DETECTOR_MODEL_NAME}");
    let detector_path = model_resolver::resolve(
        DETECTOR_MODEL_NAME,
        DETECTOR_MODEL_URL,
        Some(Box::new(|d, t| download_progress("face detection", d, t))),
    )?;
    eprintln!();

    log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
    let embedder_path = model_resolver::resolve(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        Some(Box::new(|d, t| download_progress("face embedding", d, t))),
    )?;
    eprintln!();

    Ok(Arc::new(OnnxFaceEncoder::new(
        &detector_path,
        &embedder_path,
        confidence,
    )?))
}

fn download_progress(what: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {what} model... {pct}%");
    } else {
        eprint!("\rDownloading {what} model... {downloaded} bytes");
    }
}
