//! # Output Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di output e la gestione
//! dei conflitti con output già esistenti.
//!
//! ## Regole:
//! - Il path relativo all'import root viene replicato sotto l'export root
//!   (oppure appiattito con `flatten`), con estensione `.mkv`
//! - Output esistente vuoto o senza durata → corrotto, cancellato e rigenerato
//! - Output esistente valido → decide l'operatore (overwrite / keep both / skip / skip all)
//! - Le decisioni vengono ricordate per input: una seconda risoluzione non
//!   chiede di nuovo e non cancella nulla

use crate::file_manager::{FileManager, OUTPUT_EXTENSION};
use crate::operator::{ask, Answer, ConflictChoice, Operator};
use crate::probe::MediaProbe;
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where (and whether) to write the output for one input
#[derive(Debug, Clone, PartialEq)]
pub enum OutputResolution {
    /// Nothing exists at the computed path
    Proceed(PathBuf),
    /// A corrupt output was deleted and will be rebuilt
    Regenerate(PathBuf),
    Overwrite(PathBuf),
    /// Sibling of the computed path, next to the existing output
    KeepBoth(PathBuf),
    Skip,
}

impl OutputResolution {
    pub fn target(&self) -> Option<&Path> {
        match self {
            Self::Proceed(path)
            | Self::Regenerate(path)
            | Self::Overwrite(path)
            | Self::KeepBoth(path) => Some(path),
            Self::Skip => None,
        }
    }
}

/// Outcome of `OutputResolver::resolve`
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Decided(OutputResolution),
    /// The conflict prompt was interrupted before an answer
    Interrupted,
}

pub struct OutputResolver {
    import_root: PathBuf,
    export_root: PathBuf,
    flatten: bool,
    skip_all: bool,
    decisions: HashMap<PathBuf, OutputResolution>,
}

impl OutputResolver {
    pub fn new(import_root: impl Into<PathBuf>, export_root: impl Into<PathBuf>, flatten: bool) -> Self {
        Self {
            import_root: import_root.into(),
            export_root: export_root.into(),
            flatten,
            skip_all: false,
            decisions: HashMap::new(),
        }
    }

    pub fn skip_all(&self) -> bool {
        self.skip_all
    }

    /// Deterministic output path for an input
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let filename = format!("{}.{}", stem, OUTPUT_EXTENSION);

        if self.flatten {
            return self.export_root.join(filename);
        }

        let relative = input
            .parent()
            .and_then(|dir| dir.strip_prefix(&self.import_root).ok())
            .unwrap_or(Path::new(""));

        self.export_root.join(relative).join(filename)
    }

    /// Output path already decided for an input, without prompting or touching disk
    pub fn locate(&self, input: &Path) -> PathBuf {
        self.decisions
            .get(input)
            .and_then(|decision| decision.target())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.output_path_for(input))
    }

    /// Decide where the output for `input` goes
    pub async fn resolve(
        &mut self,
        input: &Path,
        probe: &dyn MediaProbe,
        operator: &mut dyn Operator,
    ) -> Result<Resolved> {
        if let Some(decision) = self.decisions.get(input) {
            debug!("Reusing decision for {}: {:?}", input.display(), decision);
            return Ok(Resolved::Decided(decision.clone()));
        }

        let computed = self.output_path_for(input);
        if !computed.exists() {
            return Ok(Resolved::Decided(OutputResolution::Proceed(computed)));
        }

        let size = FileManager::file_size(&computed).await?;
        let duration = if size == 0 {
            None
        } else {
            probe
                .probe(&computed)
                .await
                .ok()
                .and_then(|report| report.duration_seconds)
                .filter(|seconds| *seconds > 0.0)
        };

        let Some(duration) = duration else {
            warn!(
                "Existing output {} is corrupt ({}); regenerating",
                computed.display(),
                FileManager::format_size(size)
            );
            tokio::fs::remove_file(&computed).await?;
            return Ok(Resolved::Decided(OutputResolution::Regenerate(computed)));
        };

        if self.skip_all {
            info!("Skipping {} (output exists, skip all)", input.display());
            self.decisions.insert(input.to_path_buf(), OutputResolution::Skip);
            return Ok(Resolved::Decided(OutputResolution::Skip));
        }

        let question = format!(
            "Output already exists: {} ({}, {}). What should happen to {}?",
            computed.display(),
            FileManager::format_size(size),
            FileManager::format_duration(duration),
            input.display()
        );

        let decision = match ask::<ConflictChoice>(operator, &question).await? {
            Answer::Interrupted => return Ok(Resolved::Interrupted),
            Answer::Chosen(ConflictChoice::Overwrite) => OutputResolution::Overwrite(computed),
            Answer::Chosen(ConflictChoice::KeepBoth) => {
                OutputResolution::KeepBoth(Self::sibling_path(input, &computed))
            }
            Answer::Chosen(ConflictChoice::Skip) => OutputResolution::Skip,
            Answer::Chosen(ConflictChoice::SkipAll) => {
                info!("Skip all: every further conflict in this run is skipped");
                self.skip_all = true;
                OutputResolution::Skip
            }
        };

        self.decisions.insert(input.to_path_buf(), decision.clone());
        Ok(Resolved::Decided(decision))
    }

    /// First free `<stem>_<n>.mkv` next to the existing output
    fn sibling_path(input: &Path, computed: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let dir = computed.parent().unwrap_or(Path::new(""));

        (1u32..)
            .map(|n| dir.join(format!("{}_{}.{}", stem, n, OUTPUT_EXTENSION)))
            .find(|candidate| !candidate.exists())
            .unwrap_or_else(|| computed.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Reply;
    use crate::test_support::{FakeProbe, ScriptedOperator};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        import: PathBuf,
        export: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let import = dir.path().join("import");
        let export = dir.path().join("export");
        std::fs::create_dir_all(import.join("Show/Season 1")).unwrap();
        std::fs::create_dir_all(export.join("Show/Season 1")).unwrap();
        Fixture { _dir: dir, import, export }
    }

    #[test]
    fn test_output_path_mirrors_structure() {
        let resolver = OutputResolver::new("/media/in", "/media/out", false);
        assert_eq!(
            resolver.output_path_for(Path::new("/media/in/Show/Season 1/e01.mp4")),
            PathBuf::from("/media/out/Show/Season 1/e01.mkv")
        );
        assert_eq!(
            resolver.output_path_for(Path::new("/media/in/movie.avi")),
            PathBuf::from("/media/out/movie.mkv")
        );
    }

    #[test]
    fn test_output_path_flatten() {
        let resolver = OutputResolver::new("/media/in", "/media/out", true);
        assert_eq!(
            resolver.output_path_for(Path::new("/media/in/Show/Season 1/e01.mp4")),
            PathBuf::from("/media/out/e01.mkv")
        );
    }

    #[tokio::test]
    async fn test_missing_output_proceeds() {
        let fx = fixture();
        let mut resolver = OutputResolver::new(&fx.import, &fx.export, false);
        let mut operator = ScriptedOperator::lines(&[]);

        let input = fx.import.join("Show/Season 1/e01.mkv");
        let resolved = resolver.resolve(&input, &FakeProbe::new(), &mut operator).await.unwrap();

        assert_eq!(
            resolved,
            Resolved::Decided(OutputResolution::Proceed(fx.export.join("Show/Season 1/e01.mkv")))
        );
        assert_eq!(operator.prompts(), 0);
    }

    #[tokio::test]
    async fn test_empty_output_is_regenerated_without_prompt() {
        let fx = fixture();
        let output = fx.export.join("Show/Season 1/a.mkv");
        std::fs::write(&output, b"").unwrap();

        let mut resolver = OutputResolver::new(&fx.import, &fx.export, false);
        let mut operator = ScriptedOperator::lines(&[]);
        let input = fx.import.join("Show/Season 1/a.mkv");

        let resolved = resolver.resolve(&input, &FakeProbe::new(), &mut operator).await.unwrap();

        assert_eq!(resolved, Resolved::Decided(OutputResolution::Regenerate(output.clone())));
        assert!(!output.exists());
        assert_eq!(operator.prompts(), 0);
    }

    #[tokio::test]
    async fn test_output_without_duration_is_regenerated() {
        let fx = fixture();
        let output = fx.export.join("Show/Season 1/a.mkv");
        std::fs::write(&output, b"partial data").unwrap();

        let probe = FakeProbe::new().with(&output, Some(1_000), None);
        let mut resolver = OutputResolver::new(&fx.import, &fx.export, false);
        let mut operator = ScriptedOperator::lines(&[]);
        let input = fx.import.join("Show/Season 1/a.mkv");

        let resolved = resolver.resolve(&input, &probe, &mut operator).await.unwrap();
        assert_eq!(resolved, Resolved::Decided(OutputResolution::Regenerate(output.clone())));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_valid_output_resolution_is_idempotent() {
        let fx = fixture();
        let output = fx.export.join("Show/Season 1/a.mkv");
        std::fs::write(&output, b"complete output").unwrap();

        let probe = FakeProbe::new().with(&output, Some(4_000_000), Some(1200.0));
        let mut resolver = OutputResolver::new(&fx.import, &fx.export, false);
        let mut operator = ScriptedOperator::lines(&["o"]);
        let input = fx.import.join("Show/Season 1/a.mkv");

        let first = resolver.resolve(&input, &probe, &mut operator).await.unwrap();
        let second = resolver.resolve(&input, &probe, &mut operator).await.unwrap();

        assert_eq!(first, Resolved::Decided(OutputResolution::Overwrite(output.clone())));
        assert_eq!(first, second);
        assert_eq!(operator.prompts(), 1);
        assert!(output.exists());
        assert_eq!(resolver.locate(&input), output);
    }

    #[tokio::test]
    async fn test_skip_all_answers_every_later_conflict() {
        let fx = fixture();
        let mut probe = FakeProbe::new();
        let mut inputs = Vec::new();
        for name in ["a", "b", "c"] {
            let output = fx.export.join(format!("Show/Season 1/{}.mkv", name));
            std::fs::write(&output, b"complete output").unwrap();
            probe = probe.with(&output, Some(4_000_000), Some(600.0));
            inputs.push(fx.import.join(format!("Show/Season 1/{}.mp4", name)));
        }

        let mut resolver = OutputResolver::new(&fx.import, &fx.export, false);
        let mut operator = ScriptedOperator::lines(&["a"]);

        for input in &inputs {
            let resolved = resolver.resolve(input, &probe, &mut operator).await.unwrap();
            assert_eq!(resolved, Resolved::Decided(OutputResolution::Skip));
        }
        assert!(resolver.skip_all());
        assert_eq!(operator.prompts(), 1);
    }

    #[tokio::test]
    async fn test_keep_both_picks_free_sibling() {
        let fx = fixture();
        let output = fx.export.join("Show/Season 1/a.mkv");
        std::fs::write(&output, b"complete output").unwrap();
        std::fs::write(fx.export.join("Show/Season 1/a_1.mkv"), b"older copy").unwrap();

        let probe = FakeProbe::new().with(&output, Some(4_000_000), Some(600.0));
        let mut resolver = OutputResolver::new(&fx.import, &fx.export, false);
        let mut operator = ScriptedOperator::lines(&["k"]);
        let input = fx.import.join("Show/Season 1/a.mkv");

        let resolved = resolver.resolve(&input, &probe, &mut operator).await.unwrap();
        let sibling = fx.export.join("Show/Season 1/a_2.mkv");
        assert_eq!(resolved, Resolved::Decided(OutputResolution::KeepBoth(sibling.clone())));
        assert_eq!(resolver.locate(&input), sibling);
    }

    #[tokio::test]
    async fn test_interrupt_at_conflict_prompt() {
        let fx = fixture();
        let output = fx.export.join("Show/Season 1/a.mkv");
        std::fs::write(&output, b"complete output").unwrap();

        let probe = FakeProbe::new().with(&output, Some(4_000_000), Some(600.0));
        let mut resolver = OutputResolver::new(&fx.import, &fx.export, false);
        let mut operator = ScriptedOperator::new(vec![Reply::Interrupted]);
        let input = fx.import.join("Show/Season 1/a.mkv");

        let resolved = resolver.resolve(&input, &probe, &mut operator).await.unwrap();
        assert_eq!(resolved, Resolved::Interrupted);
        assert!(output.exists());
    }
}
