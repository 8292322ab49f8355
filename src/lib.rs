//! # Batch Transcoder Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi principali tramite re-exports per `main.rs`
//!
//! ## Architettura dei moduli:
//! - `config`: Parametri del batch, file di default JSON, validazione
//! - `error`: Tassonomia degli errori (fatali vs per-file)
//! - `platform`: Piattaforma host e ricerca dei tool nel PATH
//! - `file_manager`: Estensioni supportate e helper di formattazione
//! - `probe`: Lettura di bitrate e durata tramite mediainfo
//! - `broken_log`: Log append-only dei file problematici
//! - `walker`: Traversal lazy delle directory
//! - `state`: Le tre collezioni della run e la loro persistenza
//! - `resolver`: Path di output e gestione dei conflitti
//! - `operator`: Prompt all'operatore
//! - `interrupt`: Ctrl+C cooperativo
//! - `encoder`: HandBrakeCLI e `TranscodeDriver`
//! - `progress`: Progress bar e spinner
//! - `summary`: Statistiche e report finale
//! - `session`: La macchina a stati che coordina tutto
//!
//! ## Utilizzo:
//! ```rust
//! let mut session = Session::new(&import_root, &config, store, collaborators)?;
//! let outcome = session.run().await?;
//! ```

pub mod broken_log;
pub mod config;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod interrupt;
pub mod operator;
pub mod platform;
pub mod probe;
pub mod progress;
pub mod resolver;
pub mod session;
pub mod state;
pub mod summary;
pub mod walker;

#[cfg(test)]
mod test_support;

pub use config::{Config, DEFAULT_CONFIG_FILE};
pub use encoder::HandBrakeEncoder;
pub use error::TranscodeError;
pub use interrupt::InterruptSignal;
pub use operator::ConsoleOperator;
pub use probe::MediaInfoProbe;
pub use session::{Collaborators, RunOutcome, Session};
pub use state::QueueStore;
