//! Project command handler.
//!
//! Creates questionnaire projects from a sections file, lists and shows
//! them, and runs batch answer generation.

use clap::{Args, Subcommand};
use diligence_core::{AppError, AppResult, EngineConfig};
use diligence_engine::QuestionSpec;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Questionnaire project management
#[derive(Args, Debug)]
pub struct ProjectCommand {
    #[command(subcommand)]
    pub action: ProjectAction,
}

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    /// Create a project from a questionnaire file
    Create(ProjectCreateCommand),
    /// List projects
    List(ProjectListCommand),
    /// Show a project with its questions and answer statuses
    Show(ProjectShowCommand),
    /// Delete a project with its questions and answers
    Delete(ProjectDeleteCommand),
    /// Generate answers for every question in the project
    Generate(ProjectGenerateCommand),
}

/// Questionnaire file shape: sections of questions.
#[derive(Debug, Deserialize)]
struct QuestionnaireFile {
    sections: Vec<QuestionnaireSection>,
}

#[derive(Debug, Deserialize)]
struct QuestionnaireSection {
    name: String,
    questions: Vec<String>,
}

/// Create a project
#[derive(Args, Debug)]
pub struct ProjectCreateCommand {
    /// Project name
    #[arg(long)]
    pub name: String,

    /// Project description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Questionnaire file (YAML or JSON with sections)
    #[arg(long)]
    pub questions: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ProjectCreateCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let specs = load_questionnaire(&self.questions)?;
        if specs.is_empty() {
            return Err(AppError::Validation(
                "Questionnaire file contains no questions".to_string(),
            ));
        }

        let engine = super::build_engine(config)?;
        let count = specs.len();
        let project = engine.create_project(&self.name, &self.description, specs)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&project)?);
        } else {
            println!(
                "Created project {} ('{}') with {} questions",
                project.id, project.name, count
            );
        }

        Ok(())
    }
}

/// List projects
#[derive(Args, Debug)]
pub struct ProjectListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ProjectListCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let projects = engine.list_projects()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&projects)?);
        } else if projects.is_empty() {
            println!("No projects");
        } else {
            for project in &projects {
                println!("{}  {}  {}", project.id, project.name, project.status.as_str());
            }
        }

        Ok(())
    }
}

/// Show a project
#[derive(Args, Debug)]
pub struct ProjectShowCommand {
    /// Project id
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ProjectShowCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let project = engine.get_project(&self.id)?;
        let questions = engine.list_questions(&self.id)?;

        if self.json {
            let mut entries = Vec::new();
            for question in &questions {
                let answer = engine.get_answer_for_question(&question.id)?;
                entries.push(serde_json::json!({
                    "question": question,
                    "answer": answer,
                }));
            }
            let output = serde_json::json!({
                "project": project,
                "questions": entries,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{} ('{}', {})", project.id, project.name, project.status.as_str());
            for question in &questions {
                let answer = engine.get_answer_for_question(&question.id)?;
                println!(
                    "  [{}] {} — {} ({})",
                    question.order_index,
                    question.question_text,
                    answer.status.as_str(),
                    question.id
                );
            }
        }

        Ok(())
    }
}

/// Delete a project
#[derive(Args, Debug)]
pub struct ProjectDeleteCommand {
    /// Project id
    pub id: String,
}

impl ProjectDeleteCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        engine.delete_project(&self.id)?;
        println!("Deleted project {}", self.id);
        Ok(())
    }
}

/// Batch-generate answers
#[derive(Args, Debug)]
pub struct ProjectGenerateCommand {
    /// Project id
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ProjectGenerateCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let report = engine.generate_all(&self.id).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "Generated {}/{} answers for project {}",
                report.generated, report.total, report.project_id
            );
            for error in &report.errors {
                println!("  failed {}: {}", error.question_id, error.message);
            }
        }

        Ok(())
    }
}

impl ProjectCommand {
    pub async fn execute(&self, config: &EngineConfig) -> AppResult<()> {
        match &self.action {
            ProjectAction::Create(cmd) => cmd.execute(config).await,
            ProjectAction::List(cmd) => cmd.execute(config).await,
            ProjectAction::Show(cmd) => cmd.execute(config).await,
            ProjectAction::Delete(cmd) => cmd.execute(config).await,
            ProjectAction::Generate(cmd) => cmd.execute(config).await,
        }
    }
}

/// Load a questionnaire file into question specs.
fn load_questionnaire(path: &Path) -> AppResult<Vec<QuestionSpec>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Validation(format!("Cannot read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let file: QuestionnaireFile = if is_json {
        serde_json::from_str(&content).map_err(|e| {
            AppError::Validation(format!("Invalid questionnaire {}: {}", path.display(), e))
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|e| {
            AppError::Validation(format!("Invalid questionnaire {}: {}", path.display(), e))
        })?
    };

    Ok(file
        .sections
        .into_iter()
        .flat_map(|section| {
            let name = section.name;
            section
                .questions
                .into_iter()
                .map(move |text| QuestionSpec {
                    section: name.clone(),
                    text,
                })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_questionnaire_yaml() {
        let dir = std::env::temp_dir();
        let path = dir.join("diligence_test_questions.yaml");
        std::fs::write(
            &path,
            "sections:\n  - name: Financials\n    questions:\n      - What is the revenue?\n      - What is the EBITDA margin?\n  - name: Legal\n    questions:\n      - Any pending litigation?\n",
        )
        .unwrap();

        let specs = load_questionnaire(&path).unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].section, "Financials");
        assert_eq!(specs[2].section, "Legal");
        assert_eq!(specs[2].text, "Any pending litigation?");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_questionnaire_json() {
        let dir = std::env::temp_dir();
        let path = dir.join("diligence_test_questions.json");
        std::fs::write(
            &path,
            r#"{"sections": [{"name": "General", "questions": ["Who are the key customers?"]}]}"#,
        )
        .unwrap();

        let specs = load_questionnaire(&path).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].section, "General");

        std::fs::remove_file(&path).ok();
    }
}
