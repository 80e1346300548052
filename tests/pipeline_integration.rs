//! Integration tests for the streaming chat pipeline
//!
//! Uses an in-memory conversation store plus scripted search and completion
//! backends, so every ordering and degradation property of the pipeline can
//! be exercised without network dependencies.

use async_trait::async_trait;
use callsight::llm::{CompletionBackend, LlmError, TokenStream};
use callsight::pipeline::{AnswerGenerator, ChatPipeline, SessionLocks, StreamEvent};
use callsight::retrieval::{HitPayload, Retriever, SearchBackend, SearchError, SearchHit};
use callsight::store::{expansion_key, ConversationStore, MemoryStore, Message, Role};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const EXPANSION_OK: &str = "Reasoning:\nBreak the revenue question into aspects.\nAnswer:\n1. What were Q2 revenue figures?\n2. How did revenue compare YoY?\n3. What drove revenue changes?";

const EXPANSION_MALFORMED: &str = "I am not able to expand this query into a list.";

/// Completion backend with a scripted queue of blocking responses and a fixed
/// token script for streaming calls.
struct MockLlm {
    completions: Mutex<VecDeque<String>>,
    stream_script: Vec<Result<String, String>>,
}

impl MockLlm {
    fn new(completions: Vec<&str>, stream_script: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            completions: Mutex::new(completions.into_iter().map(String::from).collect()),
            stream_script,
        })
    }
}

#[async_trait]
impl CompletionBackend for MockLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.completions
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::Request("no scripted completion left".to_string()))
    }

    async fn complete_stream(&self, _messages: &[Message]) -> Result<TokenStream, LlmError> {
        let (tx, rx) = mpsc::channel(32);
        let script = self.stream_script.clone();
        tokio::spawn(async move {
            for item in script {
                let item = item.map_err(LlmError::Stream);
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Search backend answering from a fixed per-query response table, honoring
/// the owner scope the way the real backend filter does.
struct MockSearch {
    responses: HashMap<String, Vec<SearchHit>>,
    fail: HashSet<String>,
    calls: AtomicUsize,
}

impl MockSearch {
    fn new(responses: HashMap<String, Vec<SearchHit>>) -> Self {
        Self {
            responses,
            fail: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_on(mut self, query: &str) -> Self {
        self.fail.insert(query.to_string());
        self
    }
}

#[async_trait]
impl SearchBackend for MockSearch {
    async fn hybrid_search(
        &self,
        query: &str,
        owner_id: &str,
        _limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.contains(query) {
            return Err(SearchError::Backend("connection refused".to_string()));
        }
        Ok(self
            .responses
            .get(query)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|hit| hit.payload.user_id == owner_id)
            .collect())
    }
}

fn hit(score: f32, owner: &str, text: &str, source: &str) -> SearchHit {
    let mut extra = Map::new();
    extra.insert("source".to_string(), Value::String(source.to_string()));
    SearchHit {
        score: Some(score),
        payload: HitPayload {
            text: text.to_string(),
            user_id: owner.to_string(),
            extra,
        },
    }
}

/// Two hits per expanded sub-query for owner "alice", distinct scores.
fn revenue_responses() -> HashMap<String, Vec<SearchHit>> {
    HashMap::from([
        (
            "What were Q2 revenue figures?".to_string(),
            vec![
                hit(0.91, "alice", "Q2 revenue was $3.2B.", "q2-call"),
                hit(0.44, "alice", "Revenue guidance was raised.", "q2-call"),
            ],
        ),
        (
            "How did revenue compare YoY?".to_string(),
            vec![
                hit(0.82, "alice", "Revenue grew 12% YoY.", "q2-call"),
                hit(0.31, "alice", "Prior year revenue was $2.9B.", "q1-call"),
            ],
        ),
        (
            "What drove revenue changes?".to_string(),
            vec![
                hit(0.77, "alice", "Cloud segment drove growth.", "q2-call"),
                hit(0.25, "alice", "FX was a minor headwind.", "q2-call"),
            ],
        ),
    ])
}

fn pipeline_with(
    store: Arc<MemoryStore>,
    search: MockSearch,
    llm: Arc<MockLlm>,
) -> Arc<ChatPipeline> {
    let retriever = Retriever::new(Arc::new(search), 10);
    Arc::new(ChatPipeline::new(store, retriever, llm))
}

async fn collect_events(pipeline: &Arc<ChatPipeline>, session: &str, query: &str) -> Vec<StreamEvent> {
    let mut rx = pipeline.stream_chat(session.to_string(), query.to_string());
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_event_protocol_order() {
    let store = Arc::new(MemoryStore::new(10));
    let llm = MockLlm::new(
        vec![EXPANSION_OK],
        vec![
            Ok("Rev".to_string()),
            Ok("enue".to_string()),
            Ok(" grew 12%.".to_string()),
        ],
    );
    let pipeline = pipeline_with(store, MockSearch::new(revenue_responses()), llm);

    let events = collect_events(&pipeline, "alice", "What about revenue?").await;

    assert!(matches!(events.first(), Some(StreamEvent::Metadata { .. })));
    assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
    let tokens: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Token { token } => Some(token.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["Rev", "enue", " grew 12%."]);

    let metadata_count = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Metadata { .. }))
        .count();
    let done_count = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Done { .. }))
        .count();
    assert_eq!(metadata_count, 1);
    assert_eq!(done_count, 1);
}

#[tokio::test]
async fn test_metadata_stripped_and_done_matches() {
    let store = Arc::new(MemoryStore::new(10));
    let llm = MockLlm::new(vec![EXPANSION_OK], vec![Ok("answer".to_string())]);
    let pipeline = pipeline_with(store, MockSearch::new(revenue_responses()), llm);

    let events = collect_events(&pipeline, "alice", "What about revenue?").await;

    let (queries, metadata) = match events.first() {
        Some(StreamEvent::Metadata { queries, metadata }) => (queries.clone(), metadata.clone()),
        other => panic!("expected metadata event, got {other:?}"),
    };
    let done_metadata = match events.last() {
        Some(StreamEvent::Done { metadata, .. }) => metadata.clone(),
        other => panic!("expected done event, got {other:?}"),
    };

    assert_eq!(queries.len(), 3);
    assert!(metadata.len() <= 5);
    assert!(!metadata.is_empty());
    for entry in &metadata {
        assert!(!entry.contains_key("text"), "metadata leaked chunk text");
        assert_eq!(entry["user_id"], "alice");
    }
    assert_eq!(metadata, done_metadata);
}

#[tokio::test]
async fn test_fused_metadata_is_top5_by_score() {
    let store = Arc::new(MemoryStore::new(10));
    let llm = MockLlm::new(vec![EXPANSION_OK], vec![Ok("answer".to_string())]);
    let pipeline = pipeline_with(store, MockSearch::new(revenue_responses()), llm);

    let events = collect_events(&pipeline, "alice", "What about revenue?").await;

    let metadata = match events.first() {
        Some(StreamEvent::Metadata { metadata, .. }) => metadata.clone(),
        other => panic!("expected metadata event, got {other:?}"),
    };

    // Six hits total, top five survive; the 0.25 hit is cut.
    assert_eq!(metadata.len(), 5);
    // All survivors are provenance-only entries; the fifth-ranked source is
    // the 0.31 hit from the YoY sub-query.
    assert_eq!(metadata[4]["source"], "q1-call");
}

#[tokio::test]
async fn test_unparseable_expansion_degrades_to_empty_context() {
    let store = Arc::new(MemoryStore::new(10));
    let search = Arc::new(MockSearch::new(revenue_responses()));
    let retriever = Retriever::new(search.clone(), 10);
    let llm = MockLlm::new(
        vec![EXPANSION_MALFORMED],
        vec![Ok("No relevant information was found for this question.".to_string())],
    );
    let pipeline = Arc::new(ChatPipeline::new(store, retriever, llm));

    let events = collect_events(&pipeline, "alice", "What about revenue?").await;

    match events.first() {
        Some(StreamEvent::Metadata { queries, metadata }) => {
            assert!(queries.is_empty());
            assert!(metadata.is_empty());
        }
        other => panic!("expected metadata event, got {other:?}"),
    }
    match events.last() {
        Some(StreamEvent::Done { answer, .. }) => {
            assert!(!answer.is_empty());
        }
        other => panic!("expected done event, got {other:?}"),
    }
    // Retrieval must be skipped entirely when there are no expansions.
    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_subquery_does_not_abort_stream() {
    let store = Arc::new(MemoryStore::new(10));
    let llm = MockLlm::new(vec![EXPANSION_OK], vec![Ok("answer".to_string())]);
    let search = MockSearch::new(revenue_responses()).failing_on("How did revenue compare YoY?");
    let pipeline = pipeline_with(store, search, llm);

    let events = collect_events(&pipeline, "alice", "What about revenue?").await;

    let metadata = match events.first() {
        Some(StreamEvent::Metadata { metadata, .. }) => metadata.clone(),
        other => panic!("expected metadata event, got {other:?}"),
    };
    // Two surviving sub-queries contribute four hits.
    assert_eq!(metadata.len(), 4);
    assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
}

#[tokio::test]
async fn test_history_persisted_for_both_conversations() {
    let store = Arc::new(MemoryStore::new(10));
    let llm = MockLlm::new(
        vec![EXPANSION_OK],
        vec![Ok("Revenue ".to_string()), Ok("grew.".to_string())],
    );
    let pipeline = pipeline_with(store.clone(), MockSearch::new(revenue_responses()), llm);

    let events = collect_events(&pipeline, "alice", "What about revenue?").await;

    // Main conversation: user turn then verbatim accumulated assistant turn.
    let conversation = store.load("alice").await.unwrap();
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation[0].role, Role::User);
    assert_eq!(conversation[0].content, "What about revenue?");
    assert_eq!(conversation[1].role, Role::Assistant);
    assert_eq!(conversation[1].content, "Revenue grew.");

    // Expansion history: user turn plus the raw model response, not the
    // parsed queries.
    let expansion_history = store.load(&expansion_key("alice")).await.unwrap();
    assert_eq!(expansion_history.len(), 2);
    assert_eq!(expansion_history[1].content, EXPANSION_OK);

    // The done answer is the store's latest assistant turn.
    match events.last() {
        Some(StreamEvent::Done { answer, .. }) => assert_eq!(answer, "Revenue grew."),
        other => panic!("expected done event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_history_stays_bounded() {
    let store = Arc::new(MemoryStore::new(4));
    for round in 0..5 {
        let llm = MockLlm::new(
            vec![EXPANSION_OK],
            vec![Ok(format!("answer {round}"))],
        );
        let pipeline = pipeline_with(store.clone(), MockSearch::new(revenue_responses()), llm);
        collect_events(&pipeline, "alice", &format!("question {round}")).await;
    }

    let conversation = store.load("alice").await.unwrap();
    assert_eq!(conversation.len(), 4);
    // Newest exchange is intact at the tail.
    assert_eq!(conversation[3].content, "answer 4");
    assert_eq!(conversation[2].content, "question 4");
}

#[tokio::test]
async fn test_midstream_failure_terminates_without_done() {
    let store = Arc::new(MemoryStore::new(10));
    let llm = MockLlm::new(
        vec![EXPANSION_OK],
        vec![
            Ok("partial".to_string()),
            Err("backend dropped connection".to_string()),
        ],
    );
    let pipeline = pipeline_with(store.clone(), MockSearch::new(revenue_responses()), llm);

    let events = collect_events(&pipeline, "alice", "What about revenue?").await;

    // The client keeps whatever was emitted before the failure, but the
    // stream ends without a done event and nothing is persisted.
    assert!(matches!(events.first(), Some(StreamEvent::Metadata { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::Token { .. })));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Done { .. })));
    assert!(store.load("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_owner_scoped_search_never_crosses_tenants() {
    let responses = HashMap::from([(
        "What were Q2 revenue figures?".to_string(),
        vec![
            hit(0.9, "alice", "alice's chunk", "a-call"),
            hit(0.8, "bob", "bob's chunk", "b-call"),
        ],
    )]);
    let retriever = Retriever::new(Arc::new(MockSearch::new(responses)), 10);

    let hits = retriever
        .search("What were Q2 revenue figures?", "alice")
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert!(hits.iter().all(|h| h.payload.user_id == "alice"));
}

#[tokio::test]
async fn test_blocking_answer_parses_two_sections() {
    let store = Arc::new(MemoryStore::new(10));
    let llm = MockLlm::new(
        vec![
            EXPANSION_OK,
            "Reasoning:\nThe transcript states growth directly.\n\nAnswer:\nRevenue grew 12% YoY.",
        ],
        vec![],
    );
    let pipeline = pipeline_with(store.clone(), MockSearch::new(revenue_responses()), llm);

    let answer = pipeline.answer("alice", "What about revenue?").await.unwrap();

    assert_eq!(answer, "Revenue grew 12% YoY.");
    // The parsed answer, not the raw two-section text, is persisted.
    let conversation = store.load("alice").await.unwrap();
    assert_eq!(conversation[1].content, "Revenue grew 12% YoY.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchanges_on_one_session_lose_no_turns() {
    let store = Arc::new(MemoryStore::new(100));
    let locks = Arc::new(SessionLocks::new());
    let llm = MockLlm::new(vec![], vec![]);
    let generator = Arc::new(AnswerGenerator::new(llm, store.clone(), locks));

    // Overlapping read-modify-write append pairs on one session key; the
    // per-key lock must keep every pair intact.
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let generator = generator.clone();
            tokio::spawn(async move {
                generator
                    .record_exchange("alice", &format!("question {i}"), &format!("answer {i}"))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let conversation = store.load("alice").await.unwrap();
    assert_eq!(conversation.len(), 16);
    for pair in conversation.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        // Each user turn is immediately followed by its own assistant turn.
        let question = pair[0].content.strip_prefix("question ").unwrap();
        let answer = pair[1].content.strip_prefix("answer ").unwrap();
        assert_eq!(question, answer);
    }
}

#[tokio::test]
async fn test_blocking_answer_falls_back_to_raw_text() {
    let store = Arc::new(MemoryStore::new(10));
    let llm = MockLlm::new(
        vec![EXPANSION_OK, "Revenue grew, but I forgot the format."],
        vec![],
    );
    let pipeline = pipeline_with(store.clone(), MockSearch::new(revenue_responses()), llm);

    let answer = pipeline.answer("alice", "What about revenue?").await.unwrap();

    assert_eq!(answer, "Revenue grew, but I forgot the format.");
}
