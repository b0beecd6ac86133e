//! Line-based operator prompts

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Asks the operator a question and returns the trimmed answer.
pub trait Prompt: Send + Sync {
    fn ask(&self, question: &str) -> Result<String>;

    /// `true` unless the operator answers "n" (any case).
    fn confirm(&self, question: &str) -> Result<bool> {
        let answer = self.ask(question)?;
        Ok(!answer.eq_ignore_ascii_case("n"))
    }
}

/// Reads answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&self, question: &str) -> Result<String> {
        print!("{}", question);
        io::stdout().flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(Error::InvalidArgument(format!(
                "no answer on stdin for: {}",
                question.trim()
            )));
        }
        Ok(line.trim().to_string())
    }
}

/// Replays canned answers; used by tests and non-interactive callers.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&self, question: &str) -> Result<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
        self.answers
            .lock()
            .map_err(|_| Error::InvalidArgument("prompt state poisoned".to_string()))?
            .pop_front()
            .map(|a| a.trim().to_string())
            .ok_or_else(|| Error::InvalidArgument(format!("no scripted answer for: {}", question)))
    }
}
