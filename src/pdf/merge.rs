//! PDF merging functionality using lopdf
//!
//! Based on the lopdf merge example: every source document is renumbered
//! past the objects already collected, its pages are gathered in order, and a
//! fresh page tree and catalog are built when the result is serialized.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use super::PdfCodec;
use crate::error::{Error, Result};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed files
const MAX_TREE_DEPTH: usize = 64;

/// One opened source document
#[derive(Debug)]
pub struct PageSequence {
    document: Document,
    source: PathBuf,
}

/// Objects and page order collected from all appended documents
#[derive(Debug, Default)]
pub struct MergedDocument {
    objects: BTreeMap<ObjectId, Object>,
    page_ids: Vec<ObjectId>,
    max_id: u32,
}

/// [`PdfCodec`] backed by lopdf
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfCodec;

impl PdfCodec for LopdfCodec {
    type Target = MergedDocument;
    type Pages = PageSequence;

    fn create_target(&self) -> MergedDocument {
        MergedDocument::default()
    }

    fn open_document(&self, path: &Path) -> Result<PageSequence> {
        let document = Document::load(path).map_err(|e| Error::InputOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(PageSequence {
            document,
            source: path.to_path_buf(),
        })
    }

    fn append_pages(&self, target: &mut MergedDocument, pages: PageSequence) -> Result<()> {
        let PageSequence { mut document, source } = pages;

        // Renumber objects in this document to avoid conflicts
        document.renumber_objects_with(target.max_id + 1);
        target.max_id = target.max_id.max(document.max_id);

        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        for &page_id in &page_ids {
            inherit_page_attributes(&mut document, page_id)?;
        }

        // The old catalog and page tree are replaced on serialize
        document.objects.retain(|_, object| !is_page_tree_root(object));

        debug!(source = %source.display(), pages = page_ids.len(), "appended pages");
        target.objects.extend(document.objects);
        target.page_ids.extend(page_ids);
        Ok(())
    }

    fn page_count(&self, target: &MergedDocument) -> usize {
        target.page_ids.len()
    }

    fn serialize(&self, target: MergedDocument, path: &Path) -> Result<()> {
        let mut merged_doc = build_document(target);
        merged_doc.compress();
        write_atomically(&mut merged_doc, path)
    }
}

/// Assemble the final document around the collected objects
fn build_document(target: MergedDocument) -> Document {
    let MergedDocument {
        objects,
        page_ids,
        max_id,
    } = target;

    let mut merged_doc = Document::with_version("1.5");
    merged_doc.objects.extend(objects);

    // new_object_id() must hand out IDs above everything just added
    merged_doc.max_id = max_id;

    let pages_id = merged_doc.new_object_id();
    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();

    let mut pages_object = Dictionary::new();
    pages_object.set("Type", Object::Name(b"Pages".to_vec()));
    pages_object.set("Count", Object::Integer(page_ids.len() as i64));
    pages_object.set("Kids", Object::Array(kids));

    let catalog_id = merged_doc.new_object_id();
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));

    merged_doc.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged_doc.objects.insert(pages_id, Object::Dictionary(pages_object));
    merged_doc.trailer.set("Root", Object::Reference(catalog_id));

    for &page_id in &page_ids {
        if let Ok(Object::Dictionary(dict)) = merged_doc.get_object_mut(page_id) {
            dict.set("Parent", Object::Reference(pages_id));
        }
    }

    merged_doc
}

/// Copy inheritable attributes from the page's ancestors onto the page.
///
/// Pages are re-parented under a new tree, so anything they only had through
/// their old `Parent` chain would otherwise be lost.
fn inherit_page_attributes(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let page = doc.get_dictionary(page_id)?;
    let mut missing: Vec<&[u8]> = INHERITABLE_KEYS
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut inherited: Vec<(Vec<u8>, Object)> = Vec::new();

    let mut depth = 0;
    while let Some(parent_id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                inherited.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    if !inherited.is_empty() {
        let page = doc.get_dictionary_mut(page_id)?;
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
    Ok(())
}

fn is_page_tree_root(object: &Object) -> bool {
    match object {
        Object::Dictionary(dict) => matches!(
            dict.get(b"Type").and_then(Object::as_name),
            Ok(name) if name == b"Catalog" || name == b"Pages"
        ),
        _ => false,
    }
}

/// Sibling path the document is written to before being renamed into place
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "merged.pdf".to_string());
    path.with_file_name(format!(".{}.partial", name))
}

/// Write to a temporary sibling and rename over `path` on success
fn write_atomically(doc: &mut Document, path: &Path) -> Result<()> {
    let output_error = |reason: String| Error::OutputWrite {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| output_error(e.to_string()))?;
    }

    let partial = partial_path(path);
    let written = (|| -> std::result::Result<(), String> {
        let file = File::create(&partial).map_err(|e| e.to_string())?;
        let mut writer = BufWriter::new(file);
        doc.save_to(&mut writer).map_err(|e| e.to_string())?;
        writer.flush().map_err(|e| e.to_string())?;
        writer
            .into_inner()
            .map_err(|e| e.to_string())?
            .sync_all()
            .map_err(|e| e.to_string())?;
        fs::rename(&partial, path).map_err(|e| e.to_string())
    })();

    if let Err(reason) = written {
        let _ = fs::remove_file(&partial);
        return Err(output_error(reason));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Stream;
    use tempfile::TempDir;

    /// Document whose MediaBox and Resources live only on the Pages node
    fn document_with_inherited_box(page_count: usize) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let resources_id = doc.add_object(Dictionary::new());

        let mut kids = Vec::new();
        for _ in 0..page_count {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), b"q Q".to_vec()));
            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set("Contents", Object::Reference(content_id));
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(page_count as i64));
        pages.set("Kids", Object::Array(kids));
        pages.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        );
        pages.set("Resources", Object::Reference(resources_id));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    fn sequence(doc: Document) -> PageSequence {
        PageSequence {
            document: doc,
            source: PathBuf::from("memory.pdf"),
        }
    }

    #[test]
    fn test_inherited_attributes_survive_reparenting() {
        let codec = LopdfCodec;
        let mut target = codec.create_target();
        codec
            .append_pages(&mut target, sequence(document_with_inherited_box(2)))
            .unwrap();

        let merged = build_document(target);
        for (_, page_id) in merged.get_pages() {
            let page = merged.get_dictionary(page_id).unwrap();
            assert!(page.has(b"MediaBox"), "page lost its inherited MediaBox");
            assert!(page.has(b"Resources"), "page lost its inherited Resources");
        }
    }

    #[test]
    fn test_old_page_tree_roots_are_dropped() {
        let codec = LopdfCodec;
        let mut target = codec.create_target();
        codec
            .append_pages(&mut target, sequence(document_with_inherited_box(1)))
            .unwrap();
        codec
            .append_pages(&mut target, sequence(document_with_inherited_box(1)))
            .unwrap();

        assert!(target.objects.values().all(|object| !is_page_tree_root(object)));

        let merged = build_document(target);
        let roots = merged
            .objects
            .values()
            .filter(|object| is_page_tree_root(object))
            .count();
        assert_eq!(roots, 2, "expected exactly one new catalog and one page tree");
    }

    #[test]
    fn test_object_ids_do_not_collide() {
        let codec = LopdfCodec;
        let mut target = codec.create_target();
        codec
            .append_pages(&mut target, sequence(document_with_inherited_box(3)))
            .unwrap();
        let after_first = target.objects.len();
        codec
            .append_pages(&mut target, sequence(document_with_inherited_box(2)))
            .unwrap();

        assert_eq!(codec.page_count(&target), 5);
        assert!(target.objects.len() > after_first);
        let unique: std::collections::HashSet<_> = target.page_ids.iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_serialize_replaces_existing_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested").join("out.pdf");
        fs::create_dir_all(output.parent().unwrap()).unwrap();
        fs::write(&output, b"stale").unwrap();

        let codec = LopdfCodec;
        let mut target = codec.create_target();
        codec
            .append_pages(&mut target, sequence(document_with_inherited_box(2)))
            .unwrap();
        codec.serialize(target, &output).unwrap();

        let reloaded = Document::load(&output).unwrap();
        assert_eq!(reloaded.get_pages().len(), 2);
        assert!(!partial_path(&output).exists());
    }

    #[test]
    fn test_open_document_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"this is not a pdf").unwrap();

        let err = LopdfCodec.open_document(&path).unwrap_err();
        assert!(matches!(err, Error::InputOpen { path: ref p, .. } if p == &path));
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/out/merged.pdf")),
            PathBuf::from("/out/.merged.pdf.partial")
        );
    }
}
