//! # Batch Transcoder - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Merge fra file di default (`transcoder.json`) e flag CLI
//! - Verifica dei tool esterni e avvio della sessione
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica i default da file e applica i flag sopra di essi
//! 4. Valida la configurazione e la directory di import
//! 5. Installa il gestore di Ctrl+C e avvia la `Session`
//!
//! ## Esempio di utilizzo:
//! ```bash
//! batch-transcoder /media/Shows -f 12 -t 4 -e /media/Transcoded -s "^Season" --verbose
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use batch_transcoder::platform::check_dependencies;
use batch_transcoder::{
    Collaborators, Config, ConsoleOperator, HandBrakeEncoder, InterruptSignal, MediaInfoProbe,
    QueueStore, RunOutcome, Session, TranscodeError, DEFAULT_CONFIG_FILE,
};

#[derive(Parser)]
#[command(name = "batch-transcoder")]
#[command(about = "Find high-bitrate media files and transcode them with HandBrakeCLI")]
struct Args {
    /// Directory to search for media files
    import_path: PathBuf,

    /// Minimum bitrate (Mbps) a file must exceed to be transcoded
    #[arg(short, long)]
    filter_bitrate: Option<u32>,

    /// Directory where transcoded files are written
    #[arg(short, long)]
    export_path: Option<PathBuf>,

    /// Target bitrate (Mbps)
    #[arg(short, long)]
    target_bitrate: Option<u32>,

    /// Write every output directly into the export path
    #[arg(short = 'F', long)]
    flatten: bool,

    /// HandBrakeCLI executable
    #[arg(short = 'H', long)]
    handbrake_exe: Option<String>,

    /// mediainfo executable
    #[arg(short, long)]
    mediainfo_exe: Option<String>,

    /// HandBrake preset file (overrules the bitrate settings)
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Only search top-level subfolders matching this regex
    #[arg(short, long)]
    subfolder_regex: Option<String>,

    /// Defaults file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Queue state file (default: per import path in ~/.batch-transcoder)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// File collecting media that failed to probe or encode
    #[arg(long)]
    broken_log: Option<PathBuf>,

    /// Seconds to wait at a prompt before applying its default answer
    #[arg(long)]
    prompt_timeout: Option<u64>,

    /// Start transcoding without asking for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Delete the saved queue for this import path and exit
    #[arg(long)]
    reset: bool,

    /// Save the effective settings to the defaults file
    #[arg(long)]
    save_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Flags given on the command line win over the defaults file
    fn apply(&self, mut config: Config) -> Config {
        if let Some(bitrate) = self.filter_bitrate {
            config.filter_bitrate = bitrate;
        }
        if let Some(bitrate) = self.target_bitrate {
            config.target_bitrate = bitrate;
        }
        if let Some(ref path) = self.export_path {
            config.export_path = path.clone();
        }
        if self.flatten {
            config.flatten = true;
        }
        if let Some(ref exe) = self.handbrake_exe {
            config.handbrake_exe = Some(exe.clone());
        }
        if let Some(ref exe) = self.mediainfo_exe {
            config.mediainfo_exe = Some(exe.clone());
        }
        if let Some(ref preset) = self.preset {
            config.preset_file = Some(preset.clone());
        }
        if let Some(ref pattern) = self.subfolder_regex {
            config.subfolder_regex = Some(pattern.clone());
        }
        if let Some(ref path) = self.state_file {
            config.state_file = Some(path.clone());
        }
        if let Some(ref path) = self.broken_log {
            config.broken_log = path.clone();
        }
        if let Some(secs) = self.prompt_timeout {
            config.prompt_timeout_secs = Some(secs);
        }
        if self.yes {
            config.assume_yes = true;
        }
        config
    }
}

fn queue_store(config: &Config, import_root: &Path) -> Result<QueueStore> {
    match config.state_file {
        Some(ref path) => Ok(QueueStore::new(path)),
        None => QueueStore::for_import_root(import_root),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.apply(
        Config::from_file(&args.config)
            .await
            .with_context(|| format!("Could not read {}", args.config.display()))?,
    );
    config.validate()?;

    if args.save_config {
        config.save_to_file(&args.config).await?;
        info!("Saved settings to {}", args.config.display());
    }

    // Validate arguments
    if !args.import_path.is_dir() {
        return Err(TranscodeError::InvalidRoot(args.import_path.clone()).into());
    }
    let import_root = args
        .import_path
        .canonicalize()
        .map_err(|_| TranscodeError::InvalidRoot(args.import_path.clone()))?;

    let store = queue_store(&config, &import_root)?;

    if args.reset {
        store.clear().await?;
        println!("Deleted saved queue for {}", import_root.display());
        return Ok(());
    }

    let encoder = config.encoder_command()?;
    let probe = config.probe_command()?;
    check_dependencies(&[encoder.as_str(), probe.as_str()])?;

    if !config.export_path.exists() {
        tokio::fs::create_dir_all(&config.export_path).await?;
        info!("Created export directory: {}", config.export_path.display());
    }

    let interrupt = InterruptSignal::new();
    interrupt.install_ctrl_c();

    let operator = ConsoleOperator::new(
        interrupt.clone(),
        config.prompt_timeout_secs.map(Duration::from_secs),
    );

    let mut session = Session::new(
        &import_root,
        &config,
        store,
        Collaborators {
            probe: Box::new(MediaInfoProbe::new(probe)),
            encoder: Box::new(HandBrakeEncoder::new(encoder)),
            operator: Box::new(operator),
            interrupt,
        },
    )?;

    match session.run().await? {
        RunOutcome::Completed => info!("All queued files processed"),
        outcome => info!("Finished: {:?}", outcome),
    }

    Ok(())
}
