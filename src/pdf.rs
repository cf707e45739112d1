//! PDF assembly.
//!
//! The OCR step leaves one PDF per page image. Each output unit gets a
//! single PDF made by gluing the first page of every per-page file, in
//! page order. [`LopdfAssembler`] does this with `lopdf`: each input is
//! renumbered into a fresh object space, its first page is re-parented onto a
//! new page tree, and everything unreachable is pruned before saving.

use lopdf::{Document, Object, ObjectId, dictionary};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF error in {}: {source}", path.display())]
    Pdf {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },
    #[error("cannot write {}: {reason}", path.display())]
    Save { path: PathBuf, reason: String },
    #[error("no pages to assemble for {}", .0.display())]
    Empty(PathBuf),
}

/// Concatenates per-page PDFs into one document.
pub trait PdfAssembler: Sync {
    fn glue(&self, files: &[PathBuf], output: &Path) -> Result<(), PdfError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfAssembler;

impl LopdfAssembler {
    pub fn new() -> Self {
        Self
    }
}

fn pdf_err(path: &Path) -> impl FnOnce(lopdf::Error) -> PdfError + '_ {
    move |source| PdfError::Pdf {
        path: path.to_path_buf(),
        source,
    }
}

impl PdfAssembler for LopdfAssembler {
    fn glue(&self, files: &[PathBuf], output: &Path) -> Result<(), PdfError> {
        if files.is_empty() {
            return Err(PdfError::Empty(output.to_path_buf()));
        }

        let mut merged = Document::with_version("1.5");
        let pages_id = merged.new_object_id();
        let mut kids: Vec<Object> = Vec::new();

        for file in files {
            let mut doc = Document::load(file).map_err(pdf_err(file))?;
            doc.renumber_objects_with(merged.max_id + 1);
            merged.max_id = doc.max_id;

            let Some(page_id) = doc.get_pages().into_values().next() else {
                warn!(file = %file.display(), "PDF has no pages, skipping");
                continue;
            };

            for (id, object) in doc.objects {
                let skip = match object.type_name().unwrap_or("") {
                    "Catalog" | "Pages" | "Outlines" | "Outline" => true,
                    "Page" => id != page_id,
                    _ => false,
                };
                if !skip {
                    merged.objects.insert(id, object);
                }
            }
            reparent(&mut merged, page_id, pages_id).map_err(pdf_err(file))?;
            kids.push(Object::Reference(page_id));
        }

        if kids.is_empty() {
            return Err(PdfError::Empty(output.to_path_buf()));
        }

        let count = kids.len() as i64;
        merged.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = merged.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        merged.trailer.set("Root", catalog_id);
        merged.prune_objects();
        merged.renumber_objects();
        merged.compress();
        merged.save(output).map_err(|e| PdfError::Save {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(output = %output.display(), pages = count, "assembled PDF");
        Ok(())
    }
}

fn reparent(doc: &mut Document, page_id: ObjectId, parent: ObjectId) -> Result<(), lopdf::Error> {
    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Parent", parent);
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Assembler that records jobs and writes a placeholder file.
    #[derive(Default)]
    pub struct MockPdf {
        pub jobs: Mutex<Vec<(Vec<String>, String)>>,
    }

    impl MockPdf {
        pub fn new() -> Self {
            Self::default()
        }

        /// `(input file names, output file name)` per call.
        pub fn jobs(&self) -> Vec<(Vec<String>, String)> {
            self.jobs.lock().unwrap().clone()
        }
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    impl PdfAssembler for MockPdf {
        fn glue(&self, files: &[PathBuf], output: &Path) -> Result<(), PdfError> {
            if files.is_empty() {
                return Err(PdfError::Empty(output.to_path_buf()));
            }
            self.jobs.lock().unwrap().push((
                files.iter().map(|f| file_name(f)).collect(),
                file_name(output),
            ));
            std::fs::write(output, b"%PDF-1.5 mock")?;
            Ok(())
        }
    }

    /// Write a PDF with `pages` empty A4 pages.
    pub fn write_pdf(path: &Path, pages: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for _ in 0..pages {
            let content_id = doc.add_object(lopdf::Stream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn glues_first_page_of_each_file() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("img001.pdf");
        let b = tmp.path().join("img002.pdf");
        write_pdf(&a, 1);
        write_pdf(&b, 3);

        let out = tmp.path().join("ABC-20210305.pdf");
        LopdfAssembler::new().glue(&[a, b], &out).unwrap();

        let merged = Document::load(&out).unwrap();
        assert_eq!(merged.get_pages().len(), 2);
    }

    #[test]
    fn input_catalogs_and_page_trees_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let files: Vec<_> = ["img001", "img002", "img003"]
            .iter()
            .map(|stem| {
                let path = tmp.path().join(format!("{stem}.pdf"));
                write_pdf(&path, 2);
                path
            })
            .collect();

        let out = tmp.path().join("ABC-20210305.pdf");
        LopdfAssembler::new().glue(&files, &out).unwrap();

        let merged = Document::load(&out).unwrap();
        let count = |name: &str| {
            merged
                .objects
                .values()
                .filter(|o| o.type_name().ok() == Some(name))
                .count()
        };
        assert_eq!(count("Catalog"), 1);
        assert_eq!(count("Pages"), 1);
        assert_eq!(count("Page"), 3);
    }

    #[test]
    fn empty_input_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("x.pdf");
        let err = LopdfAssembler::new().glue(&[], &out).unwrap_err();
        assert!(matches!(err, PdfError::Empty(_)));
        assert!(!out.exists());
    }

    #[test]
    fn unreadable_input_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("broken.pdf");
        std::fs::write(&bad, b"nope").unwrap();
        let err = LopdfAssembler::new()
            .glue(&[bad], &tmp.path().join("out.pdf"))
            .unwrap_err();
        assert!(err.to_string().contains("broken.pdf"));
    }

    #[test]
    fn mock_records_jobs() {
        let tmp = TempDir::new().unwrap();
        let mock = MockPdf::new();
        let out = tmp.path().join("u.pdf");
        mock.glue(&[PathBuf::from("/p/a.pdf")], &out).unwrap();
        assert_eq!(mock.jobs(), vec![(vec!["a.pdf".to_string()], "u.pdf".to_string())]);
        assert!(out.exists());
    }
}
