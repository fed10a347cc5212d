//! Choosing the output path interactively

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Capability to ask the user where the merged PDF should go
pub trait SaveDialog: Send + Sync {
    /// Returns the chosen path, `Ok(None)` if the user cancelled, or
    /// [`Error::DialogUnavailable`] when there is nobody to ask.
    fn choose_output(&self, suggestion: &Path) -> Result<Option<PathBuf>>;
}

/// Suggested output: `<stem>_merged.pdf` next to the first input
pub fn suggested_output(first_input: &Path) -> PathBuf {
    let stem = first_input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "merged".to_string());
    first_input.with_file_name(format!("{}_merged.pdf", stem))
}

/// Prompts on the terminal; an empty answer accepts the suggestion, EOF cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl SaveDialog for TerminalPrompt {
    fn choose_output(&self, suggestion: &Path) -> Result<Option<PathBuf>> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Err(Error::DialogUnavailable);
        }

        eprint!("Save merged PDF as [{}]: ", suggestion.display());
        io::stderr().flush()?;

        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        Ok(Some(interpret_answer(&answer, suggestion)))
    }
}

/// Never asks; used with `--no-prompt`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDialog;

impl SaveDialog for NoDialog {
    fn choose_output(&self, _suggestion: &Path) -> Result<Option<PathBuf>> {
        Err(Error::DialogUnavailable)
    }
}

fn interpret_answer(answer: &str, suggestion: &Path) -> PathBuf {
    let answer = answer.trim().trim_matches('"');
    if answer.is_empty() {
        suggestion.to_path_buf()
    } else {
        PathBuf::from(answer)
    }
}
