//! Answer command handler.
//!
//! Single-question generation, inspection, and human review.

use clap::{Args, Subcommand};
use diligence_core::{AppResult, EngineConfig};
use diligence_engine::{Answer, ReviewAction};

/// Single-answer generation and review
#[derive(Args, Debug)]
pub struct AnswerCommand {
    #[command(subcommand)]
    pub action: AnswerAction,
}

#[derive(Subcommand, Debug)]
pub enum AnswerAction {
    /// Generate (or regenerate) the answer for a question
    Generate(AnswerGenerateCommand),
    /// Show an answer
    Show(AnswerShowCommand),
    /// Apply a review action (confirm, reject, manual)
    Review(AnswerReviewCommand),
}

/// Generate an answer
#[derive(Args, Debug)]
pub struct AnswerGenerateCommand {
    /// Question id
    pub question_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnswerGenerateCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let answer = engine.generate_answer(&self.question_id).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        } else {
            print_answer(&answer);
        }

        Ok(())
    }
}

/// Show an answer
#[derive(Args, Debug)]
pub struct AnswerShowCommand {
    /// Answer id
    pub answer_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnswerShowCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let answer = engine.get_answer(&self.answer_id)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        } else {
            print_answer(&answer);
        }

        Ok(())
    }
}

/// Review an answer
#[derive(Args, Debug)]
pub struct AnswerReviewCommand {
    /// Answer id
    pub answer_id: String,

    /// Action: confirm, reject, or manual
    pub action: String,

    /// Manual answer text (required for the manual action)
    #[arg(long)]
    pub text: Option<String>,
}

impl AnswerReviewCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let action = ReviewAction::parse(&self.action)?;

        let engine = super::build_engine(config)?;
        let answer = engine.apply_review_action(&self.answer_id, &action, self.text.as_deref())?;

        println!("Answer {} is now {}", answer.id, answer.status.as_str());
        Ok(())
    }
}

impl AnswerCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        match &self.action {
            AnswerAction::Generate(cmd) => cmd.execute(config).await,
            AnswerAction::Show(cmd) => cmd.execute(config).await,
            AnswerAction::Review(cmd) => cmd.execute(config).await,
        }
    }
}

fn print_answer(answer: &Answer) {
    println!("Answer {} ({})", answer.id, answer.status.as_str());
    println!(
        "confidence: {:.2}  answerable: {}",
        answer.confidence,
        answer.answerability.as_str()
    );
    println!();
    println!("{}", answer.ai_answer);

    if let Some(manual) = &answer.manual_answer {
        println!();
        println!("Manual override:");
        println!("{}", manual);
    }

    if !answer.citations.is_empty() {
        println!();
        println!("Citations:");
        for citation in &answer.citations {
            println!(
                "  [{}] {}, page {}: {}",
                citation.num, citation.doc_name, citation.page, citation.text
            );
        }
    }
}
