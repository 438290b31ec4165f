//! leafcheck: validate sugarcane leaf photos locally and submit scans.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use canescan::client::{ScanClient, UploadReceipt};
use canescan::config::{self, EngineConfig};
use canescan::detection::{Detection, DiseaseDetector, SimulatedDetector};
use canescan::leaf::preprocess::decode_image;
use canescan::leaf::{LeafValidator, QualityAssessment, ValidationResult};

#[derive(Parser)]
#[command(name = "leafcheck")]
#[command(about = "Sugarcane leaf validation and scan submission")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the ONNX leaf classifier (defaults to ~/CaneScan/models/...)
    #[arg(long, global = true)]
    model: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a photo shows a sugarcane leaf
    Validate {
        /// Path to the photo
        image: PathBuf,
    },

    /// Check lighting and resolution of a photo
    Quality {
        /// Path to the photo
        image: PathBuf,
    },

    /// Validate, detect disease, upload and record a scan
    Scan {
        /// Path to the photo
        image: PathBuf,

        /// Scan service base URL
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        server: String,

        /// Where the photo was taken
        #[arg(long)]
        location: Option<String>,

        /// Free-text notes to attach
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanReport {
    quality: QualityAssessment,
    validation: ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    detection: Option<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scan_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_key: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout carries JSON results; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let engine_config = match EngineConfig::from_env() {
        Ok(mut c) => {
            if let Some(model) = cli.model {
                c.model_path = model;
            }
            c
        }
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    let engine = LeafValidator::from_config(&engine_config);

    let code = match cli.command {
        Commands::Validate { image } => cmd_validate(&engine, &image).await,
        Commands::Quality { image } => cmd_quality(&engine, &image),
        Commands::Scan {
            image,
            server,
            location,
            notes,
        } => cmd_scan(&engine, &image, &server, location, notes).await,
    };
    engine.dispose();
    std::process::exit(code);
}

fn read_image(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Cannot read {}: {e}", path.display());
            None
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            error!("Cannot serialize output: {e}");
            1
        }
    }
}

async fn cmd_validate(engine: &LeafValidator, image: &Path) -> i32 {
    let Some(bytes) = read_image(image) else {
        return 1;
    };
    let result = engine.validate(&bytes).await;
    info!(method = ?result.method, is_leaf = result.is_leaf, "Validation complete");
    print_json(&result)
}

fn cmd_quality(engine: &LeafValidator, image: &Path) -> i32 {
    let Some(bytes) = read_image(image) else {
        return 1;
    };
    print_json(&engine.assess_quality(&bytes))
}

async fn cmd_scan(
    engine: &LeafValidator,
    image: &Path,
    server: &str,
    location: Option<String>,
    notes: Option<String>,
) -> i32 {
    let Some(bytes) = read_image(image) else {
        return 1;
    };

    let quality = engine.assess_quality(&bytes);
    let validation = engine.validate(&bytes).await;
    let mut report = ScanReport {
        quality,
        validation,
        detection: None,
        scan_id: None,
        image_key: None,
    };

    if !report.validation.is_leaf {
        info!("Photo rejected; nothing uploaded");
        print_json(&report);
        return 3;
    }

    let detection = match decode_image(&bytes) {
        Ok(rgb) => SimulatedDetector::new().detect(&rgb),
        Err(e) => {
            error!("Cannot decode image for detection: {e}");
            return 1;
        }
    };

    let filename = image
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("leaf.jpg")
        .to_string();

    let client = ScanClient::new(server);
    let receipt: UploadReceipt = match client.upload(bytes, &filename).await {
        Ok(r) => r,
        Err(e) => {
            error!("Upload failed, please retry: {e}");
            return 1;
        }
    };
    info!(scan_id = receipt.scan_id, key = %receipt.image_key, "Image uploaded");

    let mut update = detection.to_scan_update();
    update.scan_location = location;
    update.user_notes = notes;
    if let Err(e) = client.update(receipt.scan_id, &update).await {
        error!("Saving detection results failed, please retry: {e}");
        return 1;
    }

    report.detection = Some(detection);
    report.scan_id = Some(receipt.scan_id);
    report.image_key = Some(receipt.image_key);
    print_json(&report)
}
