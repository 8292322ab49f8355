//! Test doubles for the external collaborators: probe, encoder and operator.

use crate::encoder::{EncodeProgress, Encoder, QualityMode};
use crate::error::TranscodeError;
use crate::interrupt::InterruptSignal;
use crate::operator::{Operator, Reply};
use crate::probe::{MediaProbe, ProbeReport};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Probe answering from a fixed table; unknown paths fail
#[derive(Default, Clone)]
pub struct FakeProbe {
    reports: HashMap<PathBuf, ProbeReport>,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &Path, bitrate_bps: Option<u64>, duration_seconds: Option<f64>) -> Self {
        self.reports.insert(
            path.to_path_buf(),
            ProbeReport {
                bitrate_bps,
                duration_seconds,
                warning: None,
            },
        );
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, TranscodeError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        self.reports.get(path).cloned().ok_or_else(|| TranscodeError::Probe {
            path: path.to_path_buf(),
            message: "no output".to_string(),
        })
    }
}

/// Encoder writing an output of fixed size, optionally failing, deleting its
/// input, or raising an interrupt during a given encode
pub struct FakeEncoder {
    output_size: usize,
    failing: HashSet<PathBuf>,
    removing_input: HashSet<PathBuf>,
    interrupt_after: Option<(usize, InterruptSignal)>,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeEncoder {
    pub fn new(output_size: usize) -> Self {
        Self {
            output_size,
            failing: HashSet::new(),
            removing_input: HashSet::new(),
            interrupt_after: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(mut self, input: &Path) -> Self {
        self.failing.insert(input.to_path_buf());
        self
    }

    /// Write the output, then delete the input
    pub fn removing_input(mut self, input: &Path) -> Self {
        self.removing_input.insert(input.to_path_buf());
        self
    }

    pub fn interrupt_after(mut self, encodes: usize, signal: InterruptSignal) -> Self {
        self.interrupt_after = Some((encodes, signal));
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        _quality: &QualityMode,
        on_progress: &(dyn for<'p> Fn(&'p EncodeProgress) + Send + Sync),
    ) -> Result<(), TranscodeError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(input.to_path_buf());
            calls.len()
        };

        if let Some((after, signal)) = &self.interrupt_after {
            if count == *after {
                signal.raise();
            }
        }

        if self.failing.contains(input) {
            return Err(TranscodeError::Encode {
                path: input.to_path_buf(),
                message: "fake encoder exited with 1".to_string(),
            });
        }

        on_progress(&EncodeProgress {
            task: 1,
            total_tasks: 1,
            percent: 100.0,
            eta: "00h00m00s".to_string(),
        });
        tokio::fs::write(output, vec![0u8; self.output_size]).await?;

        if self.removing_input.contains(input) {
            tokio::fs::remove_file(input).await?;
        }
        Ok(())
    }
}

/// Operator replaying canned replies; runs out as a closed input
pub struct ScriptedOperator {
    replies: VecDeque<Reply>,
    prompts: Vec<String>,
}

impl ScriptedOperator {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: replies.into(),
            prompts: Vec::new(),
        }
    }

    pub fn lines(lines: &[&str]) -> Self {
        Self::new(lines.iter().map(|l| Reply::Line(l.to_string())).collect())
    }

    pub fn prompts(&self) -> usize {
        self.prompts.len()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn read_reply(&mut self, prompt: &str) -> Result<Reply> {
        self.prompts.push(prompt.to_string());
        Ok(self.replies.pop_front().unwrap_or(Reply::Closed))
    }
}

/// Shared handle so a test can inspect prompts after handing the operator over
#[derive(Clone)]
pub struct SharedOperator(pub Arc<Mutex<ScriptedOperator>>);

impl SharedOperator {
    pub fn lines(lines: &[&str]) -> Self {
        Self(Arc::new(Mutex::new(ScriptedOperator::lines(lines))))
    }

    pub fn replies(replies: Vec<Reply>) -> Self {
        Self(Arc::new(Mutex::new(ScriptedOperator::new(replies))))
    }

    pub fn prompts(&self) -> usize {
        self.0.lock().unwrap().prompts()
    }
}

#[async_trait]
impl Operator for SharedOperator {
    async fn read_reply(&mut self, prompt: &str) -> Result<Reply> {
        let mut inner = self.0.lock().unwrap();
        inner.prompts.push(prompt.to_string());
        Ok(inner.replies.pop_front().unwrap_or(Reply::Closed))
    }
}
