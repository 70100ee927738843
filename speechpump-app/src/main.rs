//! `speechpump` command-line host.
//!
//! Pumps a WAV file or the microphone through `AudioPump` into a consumer
//! thread, optionally records the result, and prints a JSON session report.

mod session;
mod settings;
mod status;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use settings::{default_settings_path, load_settings, save_settings};
use speechpump_core::audio::capture::{list_input_devices, MicrophoneCapture};
use speechpump_core::{AudioPump, WavFileSource};
use status::spawn_status_logger;
use tracing::info;

#[derive(Debug, Default)]
struct Args {
    input: Option<PathBuf>,
    mic: bool,
    seconds: Option<u32>,
    output: Option<PathBuf>,
    settings: Option<PathBuf>,
    list_devices: bool,
    save_settings: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--input" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --input");
                };
                args.input = Some(PathBuf::from(v));
            }
            "--mic" => args.mic = true,
            "--seconds" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --seconds");
                };
                args.seconds = Some(v.parse().context("invalid value for --seconds")?);
            }
            "--output" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --output");
                };
                args.output = Some(PathBuf::from(v));
            }
            "--settings" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --settings");
                };
                args.settings = Some(PathBuf::from(v));
            }
            "--list-devices" => args.list_devices = true,
            "--save-settings" => args.save_settings = true,
            "--help" | "-h" => {
                println!(
                    "Usage: speechpump (--input <file.wav> | --mic [--seconds <n>]) \\
  [--output <file.wav>] [--settings <file.json>] [--save-settings] [--list-devices]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    if args.input.is_some() && args.mic {
        bail!("--input and --mic are mutually exclusive");
    }
    Ok(args)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speechpump=info,speechpump_core=info".into()),
        )
        .init();

    let args = parse_args()?;

    if args.list_devices {
        let devices = list_input_devices();
        if devices.is_empty() {
            println!("no input devices (is the audio-cpal feature enabled?)");
        }
        for device in devices {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}{marker}", device.name);
        }
        return Ok(());
    }

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut app_settings = load_settings(&settings_path);
    app_settings.apply_env_overrides(|key| std::env::var(key).ok());
    if let Some(seconds) = args.seconds {
        app_settings.capture_seconds = seconds;
    }
    if let Some(output) = args.output.clone() {
        app_settings.recording.enabled = true;
        app_settings.recording.path = output;
    }
    app_settings.normalize();
    info!(path = %settings_path.display(), "settings loaded");

    if args.save_settings {
        save_settings(&settings_path, &app_settings)
            .with_context(|| format!("failed to save {}", settings_path.display()))?;
        info!(path = %settings_path.display(), "settings saved");
    }

    let pump = AudioPump::new(app_settings.pump.clone());
    let status_logger = spawn_status_logger(&pump).context("failed to spawn status logger")?;

    let report = if let Some(input) = args.input.as_ref() {
        let source = WavFileSource::open(input)
            .with_context(|| format!("failed to open {}", input.display()))?;
        session::run_session(&pump, source, app_settings.recording.clone(), None)?
    } else if args.mic {
        let capture = MicrophoneCapture::open(app_settings.preferred_input_device.as_deref())?;
        info!(format = ?capture.format(), seconds = app_settings.capture_seconds, "capturing");
        let reader = capture.reader(app_settings.reader.clone());
        let report = session::run_session(
            &pump,
            reader,
            app_settings.recording.clone(),
            Some(Duration::from_secs(u64::from(app_settings.capture_seconds))),
        )?;
        capture.stop();
        report
    } else {
        bail!("nothing to pump: pass --input <file.wav> or --mic (see --help)");
    };

    drop(pump);
    if status_logger.join().is_err() {
        tracing::error!("status logger panicked");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
