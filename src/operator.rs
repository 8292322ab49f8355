//! # Operator Interaction Module
//!
//! Tutte le domande poste all'operatore passano da qui.
//!
//! ## Responsabilità:
//! - Trait `Operator`: sorgente di risposte (console o script nei test)
//! - `ConsoleOperator`: stdin con timeout opzionale, sveglia immediata su Ctrl+C
//! - Tipi di scelta per conferma, interrupt e conflitti di output
//! - `ask()`: ciclo di re-prompt limitato con default esplicito e loggato
//!
//! ## Default:
//! - Conferma della coda → save for later
//! - Menu di interrupt → save and exit
//! - Conflitto di output → skip

use crate::interrupt::InterruptSignal;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

/// Invalid answers tolerated before the prompt default is applied
pub const MAX_INVALID_ANSWERS: usize = 5;

/// Raw outcome of waiting for one line of operator input
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Line(String),
    Interrupted,
    TimedOut,
    Closed,
}

/// Source of operator answers
#[async_trait]
pub trait Operator: Send {
    async fn read_reply(&mut self, prompt: &str) -> Result<Reply>;
}

/// Reads answers from stdin
pub struct ConsoleOperator {
    lines: Lines<BufReader<Stdin>>,
    interrupt: InterruptSignal,
    timeout: Option<Duration>,
}

impl ConsoleOperator {
    pub fn new(interrupt: InterruptSignal, timeout: Option<Duration>) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            interrupt,
            timeout,
        }
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    async fn read_reply(&mut self, prompt: &str) -> Result<Reply> {
        println!("{}", prompt);
        let _ = std::io::stdout().flush();

        let limit = self.timeout;
        let timeout = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            line = self.lines.next_line() => match line? {
                Some(line) => Ok(Reply::Line(line)),
                None => Ok(Reply::Closed),
            },
            _ = self.interrupt.raised_wait() => Ok(Reply::Interrupted),
            _ = timeout => Ok(Reply::TimedOut),
        }
    }
}

/// A closed set of answers to one kind of question
pub trait Choice: Sized + Copy + Debug {
    const MENU: &'static str;
    const DEFAULT: Self;
    fn parse(answer: &str) -> Option<Self>;
}

/// What the operator decided, or that an interrupt arrived first
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Answer<T> {
    Chosen(T),
    Interrupted,
}

/// Ask until a valid answer arrives, falling back to `T::DEFAULT`
pub async fn ask<T: Choice>(operator: &mut dyn Operator, question: &str) -> Result<Answer<T>> {
    let prompt = format!("{}\n{}", question, T::MENU);

    for _ in 0..MAX_INVALID_ANSWERS {
        match operator.read_reply(&prompt).await? {
            Reply::Line(line) => match T::parse(&line.trim().to_lowercase()) {
                Some(choice) => return Ok(Answer::Chosen(choice)),
                None => println!("Invalid choice. Please try again."),
            },
            Reply::Interrupted => return Ok(Answer::Interrupted),
            Reply::TimedOut => {
                warn!("No answer before the prompt timeout; using default {:?}", T::DEFAULT);
                return Ok(Answer::Chosen(T::DEFAULT));
            }
            Reply::Closed => {
                warn!("Operator input closed; using default {:?}", T::DEFAULT);
                return Ok(Answer::Chosen(T::DEFAULT));
            }
        }
    }

    warn!(
        "{} invalid answers in a row; using default {:?}",
        MAX_INVALID_ANSWERS,
        T::DEFAULT
    );
    Ok(Answer::Chosen(T::DEFAULT))
}

/// Answer to "start the transcode queue?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmChoice {
    Start,
    Decline,
    SaveForLater,
    Quit,
}

impl Choice for ConfirmChoice {
    const MENU: &'static str = "([yes/no/quit/save for later] or [y/n/q/s])";
    const DEFAULT: Self = Self::SaveForLater;

    fn parse(answer: &str) -> Option<Self> {
        match answer {
            "yes" | "y" => Some(Self::Start),
            "no" | "n" => Some(Self::Decline),
            "save for later" | "s" => Some(Self::SaveForLater),
            "quit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Answer to the interrupt menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptChoice {
    SaveAndExit,
    StartNow,
    DeleteQueue,
}

impl Choice for InterruptChoice {
    const MENU: &'static str =
        "1. Save progress and exit\n2. Start transcoding now\n3. Delete queue and exit\nEnter your choice (1, 2 or 3):";
    const DEFAULT: Self = Self::SaveAndExit;

    fn parse(answer: &str) -> Option<Self> {
        match answer {
            "1" => Some(Self::SaveAndExit),
            "2" => Some(Self::StartNow),
            "3" => Some(Self::DeleteQueue),
            _ => None,
        }
    }
}

/// Answer to "output already exists"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    Overwrite,
    KeepBoth,
    Skip,
    SkipAll,
}

impl Choice for ConflictChoice {
    const MENU: &'static str = "([overwrite/keep both/skip/skip all] or [o/k/s/a])";
    const DEFAULT: Self = Self::Skip;

    fn parse(answer: &str) -> Option<Self> {
        match answer {
            "overwrite" | "o" => Some(Self::Overwrite),
            "keep both" | "keep" | "k" => Some(Self::KeepBoth),
            "skip" | "s" => Some(Self::Skip),
            "skip all" | "a" => Some(Self::SkipAll),
            _ => None,
        }
    }
}
