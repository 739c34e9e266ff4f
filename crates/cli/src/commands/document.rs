//! Document command handler.
//!
//! Ingests page text into the index and manages indexed documents. The
//! engine consumes (page, text) sequences; this command produces that
//! shape from plain text files (form-feed page breaks) or `.pages.json`
//! files holding a page array from an upstream parser.

use clap::{Args, Subcommand};
use diligence_core::{AppError, AppResult, EngineConfig};
use diligence_engine::{Document, PageText};
use std::path::{Path, PathBuf};

/// Document indexing and management
#[derive(Args, Debug)]
pub struct DocumentCommand {
    #[command(subcommand)]
    pub action: DocumentAction,
}

#[derive(Subcommand, Debug)]
pub enum DocumentAction {
    /// Index documents from files or a directory
    Ingest(DocumentIngestCommand),
    /// List indexed documents
    List(DocumentListCommand),
    /// Remove a document and its chunks
    Remove(DocumentRemoveCommand),
}

/// Index documents
#[derive(Args, Debug)]
pub struct DocumentIngestCommand {
    /// Files to ingest
    pub paths: Vec<PathBuf>,

    /// Ingest every file under a directory
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DocumentIngestCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let mut files: Vec<PathBuf> = self.paths.clone();

        if let Some(dir) = &self.dir {
            for entry in walkdir::WalkDir::new(dir)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if path.is_file() {
                    files.push(path.to_path_buf());
                }
            }
        }

        if files.is_empty() {
            return Err(AppError::Validation(
                "No files to ingest; pass paths or --dir".to_string(),
            ));
        }

        let engine = super::build_engine(config)?;
        let mut documents = Vec::new();

        for path in &files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            let pages = read_pages(path)?;

            let doc = engine.index_document(&name, &pages).await?;
            documents.push(doc);
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&documents)?);
        } else {
            for doc in &documents {
                print_document(doc);
            }
        }

        Ok(())
    }
}

/// List documents
#[derive(Args, Debug)]
pub struct DocumentListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DocumentListCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let documents = engine.list_documents()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&documents)?);
        } else if documents.is_empty() {
            println!("No documents indexed");
        } else {
            for doc in &documents {
                print_document(doc);
            }
        }

        Ok(())
    }
}

/// Remove a document
#[derive(Args, Debug)]
pub struct DocumentRemoveCommand {
    /// Document id
    pub id: String,
}

impl DocumentRemoveCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        engine.remove_document(&self.id)?;
        println!("Removed document {}", self.id);
        Ok(())
    }
}

impl DocumentCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        match &self.action {
            DocumentAction::Ingest(cmd) => cmd.execute(config).await,
            DocumentAction::List(cmd) => cmd.execute(config).await,
            DocumentAction::Remove(cmd) => cmd.execute(config).await,
        }
    }
}

fn print_document(doc: &Document) {
    println!(
        "{}  {}  {}  pages: {}  chunks: {}{}",
        doc.id,
        doc.name,
        doc.status.as_str(),
        doc.page_count,
        doc.chunk_count,
        doc.error_message
            .as_deref()
            .map(|m| format!("  error: {}", m))
            .unwrap_or_default()
    );
}

/// Read a file into the engine's (page, text) shape.
///
/// `.json` / `.pages.json` files hold a `[{"page": 1, "text": "..."}]`
/// array; anything else is read as text with form-feed page breaks.
fn read_pages(path: &Path) -> AppResult<Vec<PageText>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Validation(format!("Cannot read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        let pages: Vec<PageText> = serde_json::from_str(&content).map_err(|e| {
            AppError::Validation(format!("Invalid page array in {}: {}", path.display(), e))
        })?;
        return Ok(pages);
    }

    Ok(content
        .split('\u{000C}')
        .enumerate()
        .map(|(i, text)| PageText {
            page: (i + 1) as u32,
            text: text.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_pages_plain_text_single_page() {
        let dir = std::env::temp_dir();
        let path = dir.join("diligence_test_single.txt");
        std::fs::write(&path, "just one page of text").unwrap();

        let pages = read_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page, 1);
        assert_eq!(pages[0].text, "just one page of text");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_read_pages_form_feed_breaks() {
        let dir = std::env::temp_dir();
        let path = dir.join("diligence_test_ff.txt");
        std::fs::write(&path, "page one\u{000C}page two\u{000C}page three").unwrap();

        let pages = read_pages(&path).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].page, 3);
        assert_eq!(pages[2].text, "page three");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_read_pages_json_array() {
        let dir = std::env::temp_dir();
        let path = dir.join("diligence_test.pages.json");
        std::fs::write(&path, r#"[{"page": 1, "text": "alpha"}, {"page": 2, "text": "beta"}]"#)
            .unwrap();

        let pages = read_pages(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page, 2);
        assert_eq!(pages[1].text, "beta");

        std::fs::remove_file(&path).ok();
    }
}
