//! UiVision - locate UI elements in screenshots from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ui_vision::config::{self, RecognizerConfig};
use ui_vision::vision::OcrModels;
use ui_vision::Recognizer;

/// UiVision - visual recognition of UI elements
#[derive(Parser, Debug)]
#[command(name = "ui-vision")]
#[command(about = "Locate icons, buttons and labels inside screenshots")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find registered templates in a frame
    Locate {
        /// Screenshot to search
        #[arg(short, long)]
        frame: PathBuf,

        /// Template as label=path (repeatable)
        #[arg(short, long = "template", value_parser = parse_labelled, required = true)]
        templates: Vec<(String, PathBuf)>,

        /// Confirmation threshold overriding the config
        #[arg(long)]
        threshold: Option<f64>,

        /// Run each lookup this many times
        #[arg(long, default_value = "1")]
        repeat: usize,

        /// Enable the position cache
        #[arg(long)]
        cache: bool,
    },

    /// Find registered feature sets in a frame
    Features {
        /// Screenshot to search
        #[arg(short, long)]
        frame: PathBuf,

        /// Reference image as label=path (repeatable)
        #[arg(long = "feature", value_parser = parse_labelled, required = true)]
        features: Vec<(String, PathBuf)>,

        /// Only look for this label
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Check that an OCR model directory is complete
    CheckModels {
        /// Model directory (defaults to `ocr.model_dir` from the config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

fn parse_labelled(value: &str) -> std::result::Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((label, path)) if !label.is_empty() && !path.is_empty() => {
            Ok((label.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected label=path, got '{}'", value)),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Locate {
            frame,
            templates,
            threshold,
            repeat,
            cache,
        } => run_locate(&config, &frame, &templates, threshold, repeat, cache),
        Command::Features {
            frame,
            features,
            label,
        } => run_features(&config, &frame, &features, label.as_deref()),
        Command::CheckModels { dir } => {
            let dir = dir
                .or_else(|| config.ocr.model_dir.clone())
                .context("No model directory given and none configured")?;
            run_check_models(&dir)
        }
    }
}

/// Load configuration from the given file or the default location
fn load_config(path: Option<&Path>) -> Result<RecognizerConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    match config::default_config_path().and_then(|path| config::load_or_create_config(&path)) {
        Ok(config) => Ok(config),
        Err(e) => {
            warn!("Using default configuration: {:#}", e);
            Ok(RecognizerConfig::default())
        }
    }
}

fn open_frame(path: &Path) -> Result<image::RgbImage> {
    let frame = image::open(path)
        .with_context(|| format!("Failed to open frame {:?}", path))?
        .to_rgb8();
    info!("Frame {:?} ({}x{})", path, frame.width(), frame.height());
    Ok(frame)
}

/// Recognizer with every template registered
fn template_recognizer(config: &RecognizerConfig, templates: &[(String, PathBuf)]) -> Result<Recognizer> {
    let mut recognizer = Recognizer::new(config);
    for (label, path) in templates {
        if !recognizer.register_template(label, path) {
            anyhow::bail!("Failed to register template '{}' from {:?}", label, path);
        }
    }
    Ok(recognizer)
}

/// Recognizer with every feature set registered
fn feature_recognizer(config: &RecognizerConfig, features: &[(String, PathBuf)]) -> Result<Recognizer> {
    let mut recognizer = Recognizer::new(config);
    for (label, path) in features {
        if !recognizer.register_feature(label, path) {
            anyhow::bail!("Failed to register feature set '{}' from {:?}", label, path);
        }
    }
    Ok(recognizer)
}

fn run_locate(
    config: &RecognizerConfig,
    frame: &Path,
    templates: &[(String, PathBuf)],
    threshold: Option<f64>,
    repeat: usize,
    cache: bool,
) -> Result<()> {
    let frame = open_frame(frame)?;
    let recognizer = template_recognizer(config, templates)?;
    recognizer.set_cache_enabled(cache);

    let threshold = threshold.unwrap_or(config.template.confirm_threshold);
    for round in 1..=repeat.max(1) {
        for (label, _) in templates {
            let start = std::time::Instant::now();
            let result = recognizer.locate_with_threshold(&frame, label, threshold);
            println!(
                "[{}] {}: {:?} score={:.3} rect={} ({:?})",
                round,
                label,
                result.kind,
                result.score,
                result.rect,
                start.elapsed()
            );
        }
    }
    Ok(())
}

fn run_features(
    config: &RecognizerConfig,
    frame: &Path,
    features: &[(String, PathBuf)],
    label: Option<&str>,
) -> Result<()> {
    let frame = open_frame(frame)?;
    let recognizer = feature_recognizer(config, features)?;

    let found: Vec<_> = match label {
        Some(label) => recognizer.locate_by_feature(&frame, label).into_iter().collect(),
        None => recognizer.locate_all_by_feature(&frame),
    };

    if found.is_empty() {
        println!("No elements found");
    }
    for area in found {
        println!("{}: {}", area.text, area.rect);
    }
    Ok(())
}

fn run_check_models(dir: &Path) -> Result<()> {
    let models = OcrModels::from_dir(dir)?;
    println!("OCR models complete in {:?}", models.dir());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labelled() {
        assert_eq!(
            parse_labelled("start=assets/start.png").unwrap(),
            ("start".to_string(), PathBuf::from("assets/start.png"))
        );
        assert!(parse_labelled("no-separator").is_err());
        assert!(parse_labelled("=path.png").is_err());
        assert!(parse_labelled("label=").is_err());
    }

    #[test]
    fn test_args_parse_locate() {
        let args = Args::try_parse_from([
            "ui-vision",
            "locate",
            "--frame",
            "frame.png",
            "--template",
            "a=a.png",
            "--template",
            "b=b.png",
            "--repeat",
            "3",
            "--cache",
        ])
        .unwrap();

        match args.command {
            Command::Locate {
                templates,
                repeat,
                cache,
                threshold,
                ..
            } => {
                assert_eq!(templates.len(), 2);
                assert_eq!(repeat, 3);
                assert!(cache);
                assert!(threshold.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_registration_failure_stops_cli() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        image::RgbImage::new(8, 8).save(&good).unwrap();
        let missing = dir.path().join("missing.png");
        let config = RecognizerConfig::default();

        let ok = [("good".to_string(), good.clone())];
        assert_eq!(template_recognizer(&config, &ok).unwrap().template_count(), 1);

        let broken = [("good".to_string(), good), ("gone".to_string(), missing)];
        assert!(template_recognizer(&config, &broken).is_err());
        assert!(feature_recognizer(&config, &broken).is_err());
    }

    #[test]
    fn test_check_models_dir_optional() {
        let args = Args::try_parse_from(["ui-vision", "check-models"]).unwrap();
        assert!(matches!(args.command, Command::CheckModels { dir: None }));
    }

    #[test]
    fn test_missing_models_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_check_models(dir.path()).is_err());
    }
}
