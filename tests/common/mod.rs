//! Shared helpers for integration tests
//!
//! Real PDFs are generated with lopdf; every page carries a `PieceLabel`
//! entry (`<name>-<n>`) so page order can be checked after a merge. The fakes
//! record what the pipeline asked of its collaborators.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lopdf::{Dictionary, Document, Object, Stream};
use pdf_merge::config::MergeSettings;
use pdf_merge::dialog::SaveDialog;
use pdf_merge::journal::{Journal, LogEntry};
use pdf_merge::notify::{Notice, Notifier};
use pdf_merge::pdf::PdfCodec;
use pdf_merge::{Error, Result};
use tempfile::TempDir;

/// Write a `pages`-page PDF whose pages are labelled `<label>-1`, `<label>-2`, ...
pub fn write_pdf(path: &Path, label: &str, pages: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for n in 1..=pages {
        let content = format!("BT /F1 12 Tf 72 720 Td ({}-{}) Tj ET", label, n);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        page.set(
            "PieceLabel",
            Object::string_literal(format!("{}-{}", label, n)),
        );
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(pages as i64));
    pages_dict.set("Kids", Object::Array(kids));
    pages_dict.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ]),
    );
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc.save(path).expect("Failed to write test PDF");
}

/// Page labels of a PDF, in page order
pub fn page_labels(path: &Path) -> Vec<String> {
    let doc = Document::load(path).expect("Failed to load merged PDF");
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc.get_dictionary(page_id).expect("page is not a dictionary");
            let label = page
                .get(b"PieceLabel")
                .and_then(Object::as_str)
                .expect("page has no label");
            String::from_utf8_lossy(label).into_owned()
        })
        .collect()
}

/// Settings that keep locks and the journal inside `dir`
pub fn settings_in(dir: &TempDir) -> MergeSettings {
    MergeSettings {
        lock_timeout: Duration::from_millis(200),
        lock_dir: dir.path().join("locks"),
        journal_path: dir.path().join("merge_pdfs.log"),
        session_dir: dir.path().join("session"),
        ..MergeSettings::default()
    }
}

pub fn path_args(paths: &[&Path]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

/// Notifier that keeps every notice
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

/// Journal kept in memory
#[derive(Clone, Default)]
pub struct MemoryJournal {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryJournal {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl Journal for MemoryJournal {
    fn record(&self, entry: &LogEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// Dialog that answers with a fixed choice and remembers the suggestions
#[derive(Clone, Default)]
pub struct ScriptedDialog {
    answer: Option<PathBuf>,
    suggestions: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedDialog {
    pub fn choosing(path: impl Into<PathBuf>) -> Self {
        Self {
            answer: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn cancelling() -> Self {
        Self::default()
    }

    pub fn suggestions(&self) -> Vec<PathBuf> {
        self.suggestions.lock().unwrap().clone()
    }
}

impl SaveDialog for ScriptedDialog {
    fn choose_output(&self, suggestion: &Path) -> Result<Option<PathBuf>> {
        self.suggestions.lock().unwrap().push(suggestion.to_path_buf());
        Ok(self.answer.clone())
    }
}

/// Codec over text files: each line is a page, and a file starting with
/// `CORRUPT` fails to parse
#[derive(Clone, Default)]
pub struct TextCodec {
    open_delay: Duration,
    opened: Arc<Mutex<Vec<PathBuf>>>,
}

impl TextCodec {
    pub fn slow(open_delay: Duration) -> Self {
        Self {
            open_delay,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }
}

impl PdfCodec for TextCodec {
    type Target = Vec<String>;
    type Pages = Vec<String>;

    fn create_target(&self) -> Vec<String> {
        Vec::new()
    }

    fn open_document(&self, path: &Path) -> Result<Vec<String>> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        thread::sleep(self.open_delay);

        let text = fs::read_to_string(path)?;
        if text.starts_with("CORRUPT") {
            return Err(Error::InvalidArgument("unparseable document".to_string()));
        }
        Ok(text.lines().map(str::to_string).collect())
    }

    fn append_pages(&self, target: &mut Vec<String>, pages: Vec<String>) -> Result<()> {
        target.extend(pages);
        Ok(())
    }

    fn page_count(&self, target: &Vec<String>) -> usize {
        target.len()
    }

    fn serialize(&self, target: Vec<String>, path: &Path) -> Result<()> {
        fs::write(path, target.join("\n"))?;
        Ok(())
    }
}

/// Write a text "document" with one line per page
pub fn write_text_doc(path: &Path, pages: &[&str]) {
    fs::write(path, pages.join("\n")).unwrap();
}
