//! The merge pipeline
//!
//! One invocation moves through
//! `Idle → ValidatingInputs → AcquiringLock → Merging → Writing → ReleasingLock`
//! and ends `Succeeded`, `Failed` or `Cancelled`. The output lock is held by a
//! guard, so it is released on every exit path. Any failing input aborts the
//! whole merge before the output is touched.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::collect::{absolute_path, gather_inputs, has_pdf_extension, normalize_key};
use crate::config::MergeSettings;
use crate::dialog::{suggested_output, SaveDialog, TerminalPrompt};
use crate::error::{Error, Result};
use crate::journal::{FileJournal, Journal, LogEntry, Outcome};
use crate::lock::{FileLock, OutputLock};
use crate::notify::{ConsoleNotifier, Notice, Notifier};
use crate::pdf::PdfCodec;
use crate::session::SelectionSession;

/// A validated request to merge at least two files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
}

impl MergeRequest {
    /// Build a request; fewer than two inputs is [`Error::InsufficientInput`].
    pub fn new(inputs: Vec<PathBuf>, output: Option<PathBuf>) -> Result<Self> {
        if inputs.len() < 2 {
            return Err(Error::InsufficientInput {
                found: inputs.len(),
            });
        }
        Ok(Self {
            inputs: inputs.iter().map(|p| absolute_path(p)).collect(),
            output,
        })
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }
}

/// Details of a completed merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub output: PathBuf,
    pub input_count: usize,
    pub page_count: usize,
}

/// How a merge that did not fail ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Succeeded(MergeResult),
    /// The user dismissed the save dialog
    Cancelled,
}

/// Pipeline stage, traced at debug level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Idle,
    ValidatingInputs,
    AcquiringLock,
    Merging,
    Writing,
    ReleasingLock,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Process exit code for the outcome of one invocation.
///
/// Cancellation is a normal ending and exits with 0.
pub fn exit_code(outcome: &Result<MergeOutcome>) -> i32 {
    match outcome {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}

/// Sort by file name, ignoring case, so repeated runs over the same set are
/// stable whatever order the shell enumerated the selection in.
pub fn sort_inputs(inputs: &mut [PathBuf]) {
    inputs.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        (name, path.to_string_lossy().to_lowercase())
    });
}

/// Absolute output path with a `.pdf` extension
pub fn normalize_output(path: &Path) -> PathBuf {
    let mut output = path.to_path_buf();
    if !has_pdf_extension(&output) {
        output.set_extension("pdf");
    }
    absolute_path(&output)
}

/// Merge pipeline with its injected collaborators
pub struct MergePipeline<C: PdfCodec> {
    codec: C,
    settings: MergeSettings,
    lock: Box<dyn OutputLock>,
    dialog: Box<dyn SaveDialog>,
    notifier: Box<dyn Notifier>,
    journal: Box<dyn Journal>,
}

impl<C: PdfCodec> MergePipeline<C> {
    /// Pipeline using file locks, the terminal prompt, console notices and
    /// the file journal, all configured from `settings`
    pub fn new(codec: C, settings: MergeSettings) -> Self {
        let lock = FileLock::new(settings.lock_dir.clone());
        let journal = FileJournal::new(settings.journal_path.clone(), settings.journal_max_bytes);
        Self {
            codec,
            settings,
            lock: Box::new(lock),
            dialog: Box::new(TerminalPrompt),
            notifier: Box::new(ConsoleNotifier),
            journal: Box::new(journal),
        }
    }

    pub fn with_lock(mut self, lock: impl OutputLock + 'static) -> Self {
        self.lock = Box::new(lock);
        self
    }

    pub fn with_dialog(mut self, dialog: impl SaveDialog + 'static) -> Self {
        self.dialog = Box::new(dialog);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_journal(mut self, journal: impl Journal + 'static) -> Self {
        self.journal = Box::new(journal);
        self
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// The lock provider, shared with the selection session
    pub fn lock(&self) -> &dyn OutputLock {
        self.lock.as_ref()
    }

    /// Collect raw shell arguments, merge them and report the outcome.
    ///
    /// Every error is caught here: it is journalled, shown to the user and
    /// returned for the exit code.
    pub fn invoke<S: AsRef<str>>(&self, raw: &[S], output: Option<PathBuf>) -> Result<MergeOutcome> {
        let argv: Vec<&str> = raw.iter().map(|arg| arg.as_ref()).collect();
        debug!(?argv, "invoked");

        let collected = match gather_inputs(raw, self.settings.split) {
            Ok(collected) => collected,
            Err(e) => {
                let outcome = Err(e);
                self.report(&outcome, 0);
                return outcome;
            }
        };

        for rejection in &collected.rejected {
            self.record(
                LogEntry::now("collect", 1, Outcome::Skipped)
                    .with_detail(format!("{}: {}", rejection.entry, rejection.reason)),
            );
        }

        let input_count = collected.paths.len();
        let outcome = collected
            .ensure_mergeable()
            .and_then(|_| MergeRequest::new(collected.paths, output))
            .and_then(|request| self.run(request));

        self.report(&outcome, input_count);
        outcome
    }

    /// Join the selection session, then merge the whole selection if this
    /// invocation claims it.
    ///
    /// Returns `Ok(None)` when a sibling invocation of the same multi-select
    /// claimed the selection and runs the merge instead.
    pub fn invoke_collected<S: AsRef<str>>(
        &self,
        raw: &[S],
        output: Option<PathBuf>,
    ) -> Result<Option<MergeOutcome>> {
        let paths: Vec<&str> = raw.iter().map(|arg| arg.as_ref()).collect();
        let session = SelectionSession::new(self.settings.session_dir.clone(), self.lock());

        match session.gather(&paths, self.settings.session_settle, self.settings.session_quiet) {
            Ok(Some(entries)) => self.invoke(&entries, output).map(Some),
            Ok(None) => {
                debug!("selection claimed by a sibling invocation");
                Ok(None)
            }
            Err(e) => {
                let outcome: Result<MergeOutcome> = Err(e);
                self.report(&outcome, raw.len());
                outcome.map(Some)
            }
        }
    }

    /// Run one merge request to completion
    pub fn run(&self, request: MergeRequest) -> Result<MergeOutcome> {
        self.enter(MergeState::Idle);
        let outcome = self.run_stages(request);
        match &outcome {
            Ok(MergeOutcome::Succeeded(_)) => self.enter(MergeState::Succeeded),
            Ok(MergeOutcome::Cancelled) => self.enter(MergeState::Cancelled),
            Err(_) => self.enter(MergeState::Failed),
        }
        outcome
    }

    fn run_stages(&self, request: MergeRequest) -> Result<MergeOutcome> {
        self.enter(MergeState::ValidatingInputs);
        let MergeRequest { mut inputs, output } = request;
        sort_inputs(&mut inputs);

        let output = match output {
            Some(path) => path,
            None => match self.dialog.choose_output(&suggested_output(&inputs[0]))? {
                Some(path) => path,
                None => return Ok(MergeOutcome::Cancelled),
            },
        };
        let output = normalize_output(&output);

        let output_key = normalize_key(&output);
        if inputs.iter().any(|input| normalize_key(input) == output_key) {
            return Err(Error::OutputIsInput(output));
        }

        self.enter(MergeState::AcquiringLock);
        let guard = self.lock.acquire(&output, self.settings.lock_timeout)?;

        let merged = self.merge_locked(&inputs, &output);

        self.enter(MergeState::ReleasingLock);
        drop(guard);

        let page_count = merged?;
        Ok(MergeOutcome::Succeeded(MergeResult {
            output,
            input_count: inputs.len(),
            page_count,
        }))
    }

    /// Accumulate every input, then write; called with the output lock held
    fn merge_locked(&self, inputs: &[PathBuf], output: &Path) -> Result<usize> {
        self.enter(MergeState::Merging);
        let mut target = self.codec.create_target();

        for path in inputs {
            if !path.is_file() {
                return Err(Error::InputOpen {
                    path: path.clone(),
                    reason: "file no longer exists".to_string(),
                });
            }
            let pages = self
                .codec
                .open_document(path)
                .map_err(|e| e.into_input_open(path))?;
            self.codec
                .append_pages(&mut target, pages)
                .map_err(|e| e.into_input_open(path))?;
        }

        let page_count = self.codec.page_count(&target);

        self.enter(MergeState::Writing);
        self.codec
            .serialize(target, output)
            .map_err(|e| e.into_output_write(output))?;
        Ok(page_count)
    }

    /// Notify the user and journal the outcome
    pub fn report(&self, outcome: &Result<MergeOutcome>, input_count: usize) {
        match outcome {
            Ok(MergeOutcome::Succeeded(result)) => {
                info!(
                    output = %result.output.display(),
                    inputs = result.input_count,
                    pages = result.page_count,
                    "merge succeeded"
                );
                self.notifier.notify(&Notice::info(format!(
                    "Merged {} PDF files ({} pages)\n{}",
                    result.input_count,
                    result.page_count,
                    result.output.display()
                )));
                self.record(
                    LogEntry::now("merge", result.input_count, Outcome::Succeeded).with_detail(
                        format!("{} pages -> {}", result.page_count, result.output.display()),
                    ),
                );
            }
            Ok(MergeOutcome::Cancelled) => {
                info!("merge cancelled at output selection");
                self.record(LogEntry::now("merge", input_count, Outcome::Cancelled));
            }
            Err(e) => {
                debug!(error = %e, "merge failed");
                self.notifier.notify(&Notice::error(e.summary()));
                self.record(
                    LogEntry::now("merge", input_count, Outcome::Failed).with_detail(e.to_string()),
                );
            }
        }
    }

    fn record(&self, entry: LogEntry) {
        if let Err(e) = self.journal.record(&entry) {
            warn!(error = %e, "could not write journal entry");
        }
    }

    fn enter(&self, state: MergeState) {
        debug!(%state, "merge state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_file_name_ignoring_case() {
        let mut inputs = vec![
            PathBuf::from("/z/b.pdf"),
            PathBuf::from("/a/C.pdf"),
            PathBuf::from("/y/A.pdf"),
        ];
        sort_inputs(&mut inputs);
        assert_eq!(
            inputs,
            vec![
                PathBuf::from("/y/A.pdf"),
                PathBuf::from("/z/b.pdf"),
                PathBuf::from("/a/C.pdf"),
            ]
        );
    }

    #[test]
    fn test_same_name_sorted_by_full_path() {
        let mut inputs = vec![PathBuf::from("/b/x.pdf"), PathBuf::from("/a/x.pdf")];
        sort_inputs(&mut inputs);
        assert_eq!(inputs[0], PathBuf::from("/a/x.pdf"));
    }

    #[test]
    fn test_normalize_output_enforces_pdf_extension() {
        assert!(normalize_output(Path::new("/out/merged")).ends_with("merged.pdf"));
        assert!(normalize_output(Path::new("/out/merged.txt")).ends_with("merged.pdf"));
        assert!(normalize_output(Path::new("/out/Merged.PDF")).ends_with("Merged.PDF"));
        assert!(normalize_output(Path::new("relative.pdf")).is_absolute());
    }

    #[test]
    fn test_request_requires_two_inputs() {
        let err = MergeRequest::new(vec![PathBuf::from("/a.pdf")], None).unwrap_err();
        assert!(matches!(err, Error::InsufficientInput { found: 1 }));

        let request =
            MergeRequest::new(vec![PathBuf::from("/a.pdf"), PathBuf::from("/b.pdf")], None)
                .unwrap();
        assert_eq!(request.inputs().len(), 2);
        assert_eq!(request.output(), None);
    }

    #[test]
    fn test_exit_code_for_cancellation_is_zero() {
        assert_eq!(exit_code(&Ok(MergeOutcome::Cancelled)), 0);
        assert_eq!(exit_code(&Err(Error::InsufficientInput { found: 0 })), 2);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(MergeState::ReleasingLock.to_string(), "ReleasingLock");
    }
}
