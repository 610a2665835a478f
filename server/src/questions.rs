//! Question supply shared by every session
//!
//! Questions come from an external generator. [`QuestionSource`] is the
//! seam to it and [`QuestionPool`] hands questions out to sessions, drawing
//! uniformly at random without repetition until the pool runs dry and is
//! refilled from the source.

use log::{debug, info, warn};
use rand::Rng;
use shared::Question;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} has a sub-question without a valid correct index")]
    Shape { path: PathBuf },
}

/// Anything that can produce a fresh batch of questions
pub trait QuestionSource: Send + Sync {
    fn load(&self) -> Result<Vec<Question>, QuestionError>;
}

/// Reads every `.json` file below a directory as one question
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), QuestionError> {
        let entries = fs::read_dir(dir).map_err(|source| QuestionError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let path = entry
                .map_err(|source| QuestionError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.is_dir() {
                Self::collect_files(&path, files)?;
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(())
    }

    fn parse_file(path: &Path) -> Result<Question, QuestionError> {
        let text = fs::read_to_string(path).map_err(|source| QuestionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let question: Question =
            serde_json::from_str(&text).map_err(|source| QuestionError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if !question.is_well_formed() {
            return Err(QuestionError::Shape {
                path: path.to_path_buf(),
            });
        }
        Ok(question)
    }
}

impl QuestionSource for DirectorySource {
    fn load(&self) -> Result<Vec<Question>, QuestionError> {
        let mut files = Vec::new();
        Self::collect_files(&self.root, &mut files)?;
        files.sort();

        let mut questions = Vec::with_capacity(files.len());
        for path in files {
            match Self::parse_file(&path) {
                Ok(question) => questions.push(question),
                Err(e) => warn!("Skipping question file: {}", e),
            }
        }
        info!(
            "Loaded {} questions from {}",
            questions.len(),
            self.root.display()
        );
        Ok(questions)
    }
}

/// Fixed set of questions, mostly for tests
pub struct StaticSource {
    questions: Vec<Question>,
}

impl StaticSource {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

impl QuestionSource for StaticSource {
    fn load(&self) -> Result<Vec<Question>, QuestionError> {
        Ok(self.questions.clone())
    }
}

/// Thread-safe pool all sessions draw from
pub struct QuestionPool {
    source: Box<dyn QuestionSource>,
    questions: Mutex<Vec<Question>>,
}

impl QuestionPool {
    pub fn new(source: impl QuestionSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            questions: Mutex::new(Vec::new()),
        }
    }

    /// Removes a random question, refilling from the source when empty.
    /// Returns `None` only if the source has nothing to offer.
    ///
    /// The source is read without holding the pool lock, so other sessions
    /// keep drawing while a refill is loading.
    pub fn draw(&self) -> Option<Question> {
        if let Some(question) = Self::take_random(&mut self.lock()) {
            return Some(question);
        }

        let fresh = match self.source.load() {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("Failed to refill question pool: {}", e);
                return None;
            }
        };

        let mut questions = self.lock();
        if questions.is_empty() {
            debug!("Refilled question pool with {} questions", fresh.len());
            *questions = fresh;
        }
        Self::take_random(&mut questions)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Question>> {
        self.questions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_random(questions: &mut Vec<Question>) -> Option<Question> {
        if questions.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..questions.len());
        Some(questions.swap_remove(index))
    }

    pub fn remaining(&self) -> usize {
        self.lock().len()
    }
}
