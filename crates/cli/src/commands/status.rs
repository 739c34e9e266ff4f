//! Status command handler.

use clap::Args;
use diligence_core::{AppResult, EngineConfig};

/// Show engine status counters
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let status = engine.status()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            println!("Documents: {} ({} indexed)", status.documents, status.indexed_documents);
            println!("Chunks:    {}", status.chunks);
            println!("Projects:  {}", status.projects);
            println!("Questions: {} ({} answered)", status.questions, status.answered);
        }

        Ok(())
    }
}
