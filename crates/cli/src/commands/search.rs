//! Search command handler.
//!
//! Retrieval debugging: run a query against the chunk index and show the
//! ranked results with scores.

use clap::Args;
use diligence_core::{AppResult, EngineConfig};
use std::collections::HashSet;

/// Search the chunk index
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long, default_value = "8")]
    pub top_k: usize,

    /// Restrict the search to these document ids
    #[arg(long = "doc")]
    pub docs: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;

        let scope: Option<HashSet<String>> = if self.docs.is_empty() {
            None
        } else {
            Some(self.docs.iter().cloned().collect())
        };

        let results = engine.retrieve(&self.query, self.top_k, scope.as_ref()).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else if results.is_empty() {
            println!("No results");
        } else {
            for result in &results {
                let preview: String = result.chunk.text.chars().take(120).collect();
                println!(
                    "{:.3}  {} (page {}, chunk {}): {}",
                    result.score,
                    result.chunk.doc_name,
                    result.chunk.page,
                    result.chunk.chunk_index,
                    preview
                );
            }
        }

        Ok(())
    }
}
