//! Integration tests for the HTTP collaborators
//!
//! Runs the remote summarizer and remote vector search against wiremock
//! servers, both directly and wired into a [`ContextEngine`].

use std::collections::BTreeMap;

use serde_json::json;
use tokio::runtime::Handle;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recollect::config::{Config, SummarizerConfig, VectorConfig};
use recollect::knowledge::{KnowledgeBase, KnowledgeEntry, MatchKind};
use recollect::memory::types::TAG_SUMMARY_EXTERNAL;
use recollect::memory::{MemoryKind, MemoryTier};
use recollect::retrieval::{RemoteVectorSearch, VectorSearch, VectorSearchError};
use recollect::summarizer::{RemoteSummarizer, Summarizer, SummaryRequest};
use recollect::testing::{agent, conversation_entries};
use recollect::{ContextEngine, TurnRequest};

const KEY_ENV: &str = "RECOLLECT_REMOTE_TESTS_KEY";

fn set_key() {
    // SAFETY: every test in this binary writes the same value
    unsafe {
        std::env::set_var(KEY_ENV, "test-key");
    }
}

fn summarizer_config(server: &MockServer) -> SummarizerConfig {
    SummarizerConfig {
        enabled: true,
        api_url: server.uri(),
        api_key_env: KEY_ENV.to_string(),
        timeout_secs: 5,
        ..SummarizerConfig::default()
    }
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }]
    })
}

fn request() -> SummaryRequest {
    SummaryRequest {
        agent: "pawn_1".to_string(),
        kind: MemoryKind::Conversation,
        tier: MemoryTier::Archive,
        entries: vec!["Talked about the harvest".to_string()],
        prompt_template: "Summarize for {agent}:\n{entries}".to_string(),
    }
}

#[tokio::test]
async fn test_summarizer_sends_rendered_prompt() {
    set_key();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Harvest talk.  ")))
        .expect(1)
        .mount(&server)
        .await;

    let summarizer = RemoteSummarizer::new(&summarizer_config(&server)).unwrap();
    let summary = summarizer.summarize(&request()).await.unwrap();

    assert_eq!(summary, "Harvest talk.");

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("Summarize for pawn_1:"));
    assert!(prompt.contains("- Talked about the harvest"));
}

#[tokio::test]
async fn test_summarizer_retries_after_rate_limit() {
    set_key();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Done.")))
        .mount(&server)
        .await;

    let summarizer = RemoteSummarizer::new(&summarizer_config(&server)).unwrap();
    assert_eq!(summarizer.summarize(&request()).await.unwrap(), "Done.");
}

#[tokio::test]
async fn test_summarizer_reports_server_errors() {
    set_key();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let summarizer = RemoteSummarizer::new(&summarizer_config(&server)).unwrap();
    let err = summarizer.summarize(&request()).await.unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_vector_search_posts_query_and_filters() {
    let server = MockServer::start().await;
    let strong = uuid::Uuid::new_v4();
    let weak = uuid::Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "query": "wolves", "top_k": 5 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": strong, "similarity": 0.91 },
                { "id": weak, "similarity": 0.2 }
            ]
        })))
        .mount(&server)
        .await;

    let config = VectorConfig {
        enabled: true,
        endpoint: format!("{}/search", server.uri()),
        ..VectorConfig::default()
    };
    let search = RemoteVectorSearch::new(&config).unwrap();
    let hits = search.search("wolves", 5, 0.6).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, strong);
}

#[tokio::test]
async fn test_vector_search_rejects_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let config = VectorConfig {
        enabled: true,
        endpoint: server.uri(),
        ..VectorConfig::default()
    };
    let search = RemoteVectorSearch::new(&config).unwrap();
    let err = search.search("x", 5, 0.6).await.unwrap_err();
    assert!(matches!(err, VectorSearchError::ParseError(_)));
}

#[tokio::test]
async fn test_engine_wires_remote_collaborators() {
    set_key();
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Chatted all week.")))
        .mount(&llm)
        .await;

    let mut kb = KnowledgeBase::new();
    let wells = kb.add(KnowledgeEntry::new("well", "Wells freeze in winter."));

    let vectors = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": wells, "similarity": 0.85 }]
        })))
        .mount(&vectors)
        .await;

    let mut config = Config::default();
    config.memory.event_log_capacity = 4;
    config.summarizer = summarizer_config(&llm);
    config.vector.enabled = true;
    config.vector.endpoint = vectors.uri();

    let mut engine = ContextEngine::from_config(config, Handle::current())
        .unwrap()
        .with_knowledge(kb);
    let pawn = agent("pawn_1");

    for entry in conversation_entries(1, 5) {
        engine.insert_memory(&pawn, entry, MemoryTier::EventLog);
    }
    assert_eq!(engine.flush_summaries().await, 1);

    let archived = &engine.store().agent(&pawn).unwrap().tier(MemoryTier::Archive)[0];
    assert_eq!(archived.content, "Chatted all week.");
    assert!(archived.tags.contains(TAG_SUMMARY_EXTERNAL));

    let extra = BTreeMap::new();
    let turn = engine
        .assemble_turn_async(&TurnRequest {
            agent: &pawn,
            base_context: "It is getting cold",
            speaker: Some(&pawn),
            listener: None,
            participants: &[],
            extra_sources: &extra,
            now: 10,
        })
        .await;

    assert_eq!(
        turn.knowledge_text.as_deref(),
        Some("[Knowledge]\n- Wells freeze in winter.")
    );
    assert!(turn.candidates.iter().any(|c| matches!(
        c,
        recollect::assembler::ScoredCandidate::Knowledge(k) if k.match_kind == MatchKind::Vector
    )));
}
