//! Integration tests for the synthesis pipeline, batch mode, and review.
//!
//! The scripted LLM client replays queued replies in call order; with a
//! batch pool of 1 and zero retries the mapping from queue position to
//! pipeline step is deterministic.

use std::sync::Arc;
use std::time::Duration;

use diligence_core::{AppError, EngineConfig};
use diligence_engine::{
    Answerability, AnswerStatus, Engine, HashedNgramProvider, PageText, QuestionSpec, ReviewAction,
    SqliteStore,
};
use diligence_llm::ScriptedClient;

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.chunk_window = 500;
    config.chunk_overlap = 50;
    config.embedding_dimensions = 128;
    config.top_k = 4;
    config.max_retries = 0;
    config.backoff_ms = 1;
    config.batch_pool_size = 1;
    config
}

fn build_engine(config: EngineConfig, llm: Arc<ScriptedClient>) -> Engine {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let embedder = Arc::new(HashedNgramProvider::new(config.embedding_dimensions));
    Engine::new(config, store, embedder, llm).unwrap()
}

async fn index_termsheet(engine: &Engine) -> String {
    let doc = engine
        .index_document(
            "termsheet.pdf",
            &[PageText {
                page: 1,
                text: "The facility size is EUR 40m with a maturity of 5 years.".to_string(),
            }],
        )
        .await
        .unwrap();
    doc.id
}

fn one_question(engine: &Engine) -> (String, String) {
    let project = engine
        .create_project(
            "Acquisition DD",
            "",
            vec![QuestionSpec {
                section: "Financials".to_string(),
                text: "What is the facility size?".to_string(),
            }],
        )
        .unwrap();
    let questions = engine.list_questions(&project.id).unwrap();
    (project.id, questions[0].id.clone())
}

#[tokio::test]
async fn test_generate_answer_end_to_end() {
    let llm = Arc::new(ScriptedClient::new());
    let engine = build_engine(test_config(), Arc::clone(&llm));

    let doc_id = index_termsheet(&engine).await;
    let (_, question_id) = one_question(&engine);

    let key = format!("{}_c0", doc_id);
    llm.push_text(format!("The facility is EUR 40m [{}].", key));
    llm.push_text(format!("EUR 40 million [{}], maturing in five years.", key));
    llm.push_text(format!(
        "The facility size is EUR 40m [{}].\nANSWERABLE: yes\nCONFIDENCE: 0.9",
        key
    ));

    let answer = engine.generate_answer(&question_id).await.unwrap();

    assert_eq!(answer.status, AnswerStatus::Generated);
    assert_eq!(answer.ai_answer, "The facility size is EUR 40m [1].");
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].num, 1);
    assert_eq!(answer.citations[0].chunk_id, key);
    assert_eq!(answer.citations[0].doc_name, "termsheet.pdf");
    assert_eq!(answer.citations[0].page, 1);
    assert!((answer.confidence - 0.9).abs() < 1e-6);
    assert_eq!(answer.answerability, Answerability::Yes);
    assert!(answer.variant_a.is_some());
    assert!(answer.variant_b.is_some());

    // Candidate temperatures 0.7 / 0.9, merge 0.3
    let calls = llm.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].temperature, Some(0.7));
    assert_eq!(calls[1].temperature, Some(0.9));
    assert_eq!(calls[2].temperature, Some(0.3));
}

#[tokio::test]
async fn test_both_candidates_failing_leaves_answer_untouched() {
    let llm = Arc::new(ScriptedClient::new());
    let engine = build_engine(test_config(), Arc::clone(&llm));

    index_termsheet(&engine).await;
    let (_, question_id) = one_question(&engine);

    llm.push_error("provider down");
    llm.push_error("provider down");

    let result = engine.generate_answer(&question_id).await;
    assert!(matches!(result, Err(AppError::Generation(_))));

    let answer = engine.get_answer_for_question(&question_id).unwrap();
    assert_eq!(answer.status, AnswerStatus::Pending);
    assert!(answer.ai_answer.is_empty());
    assert!(answer.citations.is_empty());
}

#[tokio::test]
async fn test_unparsable_merge_leaves_answer_untouched() {
    let llm = Arc::new(ScriptedClient::new());
    let engine = build_engine(test_config(), Arc::clone(&llm));

    index_termsheet(&engine).await;
    let (_, question_id) = one_question(&engine);

    llm.push_text("Candidate A.");
    llm.push_text("Candidate B.");
    llm.push_text("Merged text without any trailer lines.");

    let result = engine.generate_answer(&question_id).await;
    assert!(matches!(result, Err(AppError::Generation(_))));

    let answer = engine.get_answer_for_question(&question_id).unwrap();
    assert_eq!(answer.status, AnswerStatus::Pending);
    assert!(answer.ai_answer.is_empty());
}

#[tokio::test]
async fn test_empty_index_yields_unanswerable_answer() {
    let llm = Arc::new(ScriptedClient::new());
    let engine = build_engine(test_config(), Arc::clone(&llm));

    let (_, question_id) = one_question(&engine);

    let answer = engine.generate_answer(&question_id).await.unwrap();

    assert_eq!(answer.status, AnswerStatus::Generated);
    assert!(answer.ai_answer.contains("No documents"));
    assert_eq!(answer.confidence, 0.0);
    assert_eq!(answer.answerability, Answerability::No);
    assert!(answer.citations.is_empty());
    // No LLM call was made
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_batch_isolates_per_question_failures() {
    let llm = Arc::new(ScriptedClient::new());
    let engine = build_engine(test_config(), Arc::clone(&llm));

    let doc_id = index_termsheet(&engine).await;
    let key = format!("{}_c0", doc_id);

    let project = engine
        .create_project(
            "Batch",
            "",
            (1..=5)
                .map(|i| QuestionSpec {
                    section: "General".to_string(),
                    text: format!("Question number {}?", i),
                })
                .collect(),
        )
        .unwrap();
    let questions = engine.list_questions(&project.id).unwrap();
    assert_eq!(questions.len(), 5);

    // Pool size 1 processes questions in order; the third one fails
    for i in 1..=5 {
        if i == 3 {
            llm.push_error("provider down");
            llm.push_error("provider down");
        } else {
            llm.push_text(format!("Candidate A for {} [{}].", i, key));
            llm.push_text(format!("Candidate B for {} [{}].", i, key));
            llm.push_text(format!(
                "Answer {} [{}].\nANSWERABLE: yes\nCONFIDENCE: 0.8",
                i, key
            ));
        }
    }

    let report = engine.generate_all(&project.id).await.unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(report.generated, 4);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].question_id, questions[2].id);
    assert!(report.errors[0].message.contains("Generation"));

    // The failed question's answer is untouched; the others committed
    let failed = engine.get_answer_for_question(&questions[2].id).unwrap();
    assert_eq!(failed.status, AnswerStatus::Pending);
    let ok = engine.get_answer_for_question(&questions[0].id).unwrap();
    assert_eq!(ok.status, AnswerStatus::Generated);

    // Batch completion marks the project ready
    let project = engine.get_project(&project.id).unwrap();
    assert_eq!(project.status, diligence_engine::ProjectStatus::Ready);
}

#[tokio::test]
async fn test_review_flow_and_guards() {
    let llm = Arc::new(ScriptedClient::new());
    let engine = build_engine(test_config(), Arc::clone(&llm));

    let doc_id = index_termsheet(&engine).await;
    let (_, question_id) = one_question(&engine);
    let key = format!("{}_c0", doc_id);

    // Reviewing a PENDING answer is a conflict
    let pending = engine.get_answer_for_question(&question_id).unwrap();
    let result = engine.apply_review_action(&pending.id, &ReviewAction::Confirm, None);
    assert!(matches!(result, Err(AppError::Conflict(_))));

    llm.push_text(format!("A [{}].", key));
    llm.push_text(format!("B [{}].", key));
    llm.push_text(format!("Answer [{}].\nANSWERABLE: yes\nCONFIDENCE: 0.7", key));
    let answer = engine.generate_answer(&question_id).await.unwrap();

    // Manual submission with empty text is rejected, status unchanged
    let result =
        engine.apply_review_action(&answer.id, &ReviewAction::SubmitManual, Some("   "));
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(
        engine.get_answer(&answer.id).unwrap().status,
        AnswerStatus::Generated
    );

    // Confirm, then further review actions conflict
    let confirmed = engine
        .apply_review_action(&answer.id, &ReviewAction::Confirm, None)
        .unwrap();
    assert_eq!(confirmed.status, AnswerStatus::Confirmed);

    let result = engine.apply_review_action(&answer.id, &ReviewAction::SubmitManual, Some("text"));
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_regeneration_overwrites_reviewed_answer() {
    let llm = Arc::new(ScriptedClient::new());
    let engine = build_engine(test_config(), Arc::clone(&llm));

    let doc_id = index_termsheet(&engine).await;
    let (_, question_id) = one_question(&engine);
    let key = format!("{}_c0", doc_id);

    llm.push_text(format!("A [{}].", key));
    llm.push_text(format!("B [{}].", key));
    llm.push_text(format!("First answer [{}].\nANSWERABLE: yes\nCONFIDENCE: 0.7", key));
    let answer = engine.generate_answer(&question_id).await.unwrap();

    engine
        .apply_review_action(&answer.id, &ReviewAction::SubmitManual, Some("Manual text"))
        .unwrap();

    // Regeneration discards the review decision and the manual text
    llm.push_text(format!("A2 [{}].", key));
    llm.push_text(format!("B2 [{}].", key));
    llm.push_text(format!("Second answer [{}].\nANSWERABLE: yes\nCONFIDENCE: 0.8", key));
    let regenerated = engine.generate_answer(&question_id).await.unwrap();

    assert_eq!(regenerated.status, AnswerStatus::Generated);
    assert_eq!(regenerated.ai_answer, "Second answer [1].");
    assert!(regenerated.manual_answer.is_none());
}

#[tokio::test]
async fn test_regeneration_of_reviewed_answer_can_be_disabled() {
    let llm = Arc::new(ScriptedClient::new());
    let mut config = test_config();
    config.allow_regenerate_reviewed = false;
    let engine = build_engine(config, Arc::clone(&llm));

    let doc_id = index_termsheet(&engine).await;
    let (_, question_id) = one_question(&engine);
    let key = format!("{}_c0", doc_id);

    llm.push_text(format!("A [{}].", key));
    llm.push_text(format!("B [{}].", key));
    llm.push_text(format!("Answer [{}].\nANSWERABLE: yes\nCONFIDENCE: 0.7", key));
    let answer = engine.generate_answer(&question_id).await.unwrap();

    engine
        .apply_review_action(&answer.id, &ReviewAction::Confirm, None)
        .unwrap();

    let result = engine.generate_answer(&question_id).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    // The confirmed answer is untouched
    let unchanged = engine.get_answer(&answer.id).unwrap();
    assert_eq!(unchanged.status, AnswerStatus::Confirmed);
}

#[tokio::test]
async fn test_concurrent_generation_is_rejected() {
    let llm = Arc::new(ScriptedClient::new().with_delay(Duration::from_millis(50)));
    let engine = build_engine(test_config(), Arc::clone(&llm));

    let doc_id = index_termsheet(&engine).await;
    let (_, question_id) = one_question(&engine);
    let key = format!("{}_c0", doc_id);

    llm.push_text(format!("A [{}].", key));
    llm.push_text(format!("B [{}].", key));
    llm.push_text(format!("Answer [{}].\nANSWERABLE: yes\nCONFIDENCE: 0.7", key));

    // The first generation parks inside its delayed LLM call while still
    // holding the question's generation slot; the second must conflict
    let (first, second) = tokio::join!(
        engine.generate_answer(&question_id),
        engine.generate_answer(&question_id),
    );

    let conflicts = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Err(AppError::Conflict(_))))
        .count();
    assert_eq!(conflicts, 1);
    assert!(first.is_ok() || second.is_ok());
}
