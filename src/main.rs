use std::{env, fs, io::Write, path::PathBuf, process};

use anyhow::{Context, Result, bail};
use log::info;

use protoml::{AppConfig, Classifier, ObjectDetector, SavedModelStore, Trainer};

const USAGE: &str = "usage: protoml [--config <file>] <command>

commands:
    train                          train the iris network and export it
    classify <sl> <sw> <pl> <pw>   classify an iris by its sepal and petal measurements
    detect <image>                 print the objects of an image as JSON";

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(mut args: Vec<String>) -> Result<()> {
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(idx) => {
            if idx + 1 >= args.len() {
                bail!("--config expects a file\n\n{USAGE}");
            }
            let path = PathBuf::from(args.remove(idx + 1));
            args.remove(idx);
            Some(path)
        }
        None => None,
    };

    let config = AppConfig::load(config_path.as_deref()).context("loading the configuration")?;

    let Some((command, rest)) = args.split_first() else {
        bail!("missing command\n\n{USAGE}");
    };

    match command.as_str() {
        "train" => train(&config),
        "classify" => classify(&config, rest),
        "detect" => detect(&config, rest),
        other => bail!("unknown command {other:?}\n\n{USAGE}"),
    }
}

fn train(config: &AppConfig) -> Result<()> {
    let trainer = Trainer::new(config.training);
    let reports = trainer
        .run(&config.dataset_path, &SavedModelStore, &config.iris_model_path)
        .context("training the iris network")?;

    if let Some(last) = reports.last() {
        info!(
            "trained {} epochs, last accuracy {}/{}",
            reports.len(),
            last.correct,
            last.total
        );
    }

    Ok(())
}

fn classify(config: &AppConfig, args: &[String]) -> Result<()> {
    let [sl, sw, pl, pw] = args else {
        bail!("classify expects 4 measurements\n\n{USAGE}");
    };

    let mut features = [0f32; 4];
    for (feature, raw) in features.iter_mut().zip([sl, sw, pl, pw]) {
        *feature = raw
            .parse()
            .with_context(|| format!("invalid measurement {raw:?}"))?;
    }

    let classifier = Classifier::new();
    classifier
        .load(&SavedModelStore, &config.iris_model_path)
        .context("loading the iris model")?;

    let [sepal_length, sepal_width, petal_length, petal_width] = features;
    let species = classifier.classify_name(sepal_length, sepal_width, petal_length, petal_width)?;
    println!("{species}");

    Ok(())
}

fn detect(config: &AppConfig, args: &[String]) -> Result<()> {
    let [image] = args else {
        bail!("detect expects an image path\n\n{USAGE}");
    };

    let bytes = fs::read(image).with_context(|| format!("reading {image}"))?;

    let detector = ObjectDetector::new();
    detector
        .load(&SavedModelStore, &config.detection_model_path)
        .context("loading the detection model")?;

    let json = detector.detect_bytes(&bytes)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&json)?;
    writeln!(stdout)?;

    Ok(())
}
