//! Interactive prompting for unset flags.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{PluginError, Result};

/// Blocks on user input to fill a flag before execution.
///
/// Implemented by the CLI on top of a terminal library; tests use
/// [`ScriptedPrompter`].
pub trait Prompter: Send + Sync {
    /// Whether a user is present to answer.
    fn is_interactive(&self) -> bool;

    /// Single-select among fixed options. Returns the chosen option.
    fn select(&self, prompt: &str, options: &[String]) -> Result<String>;

    /// Free-text answer.
    fn text(&self, prompt: &str) -> Result<String>;
}

/// Prompter that never asks anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    fn select(&self, prompt: &str, _options: &[String]) -> Result<String> {
        Err(PluginError::Prompt(format!("cannot ask '{prompt}' without a terminal")))
    }

    fn text(&self, prompt: &str) -> Result<String> {
        Err(PluginError::Prompt(format!("cannot ask '{prompt}' without a terminal")))
    }
}

/// A question the [`ScriptedPrompter`] was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asked {
    Select { prompt: String, options: Vec<String> },
    Text { prompt: String },
}

/// Answers prompts from a queue and records what was asked.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<Asked>>,
}

impl ScriptedPrompter {
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
    pub fn asked(&self) -> Vec<Asked> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn answer(&self, question: Asked) -> Result<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question);
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .ok_or_else(|| PluginError::Prompt("no scripted answer left".to_string()))
    }
}

impl Prompter for ScriptedPrompter {
    fn is_interactive(&self) -> bool {
        true
    }

    fn select(&self, prompt: &str, options: &[String]) -> Result<String> {
        self.answer(Asked::Select {
            prompt: prompt.to_string(),
            options: options.to_vec(),
        })
    }

    fn text(&self, prompt: &str) -> Result<String> {
        self.answer(Asked::Text {
            prompt: prompt.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_answers_in_order() {
        let prompter = ScriptedPrompter::new(["eu", "bob"]);
        assert_eq!(
            prompter.select("Region?", &["us".into(), "eu".into()]).unwrap(),
            "eu"
        );
        assert_eq!(prompter.text("Name?").unwrap(), "bob");
        assert!(prompter.text("More?").is_err());
        assert_eq!(prompter.asked().len(), 3);
    }

    #[test]
    fn test_non_interactive_refuses() {
        let prompter = NonInteractive;
        assert!(!prompter.is_interactive());
        assert!(matches!(prompter.text("x"), Err(PluginError::Prompt(_))));
    }
}
