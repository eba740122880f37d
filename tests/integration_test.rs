//! End-to-end tests for the forumrag pipeline.
//!
//! Tests the complete flow:
//!   Export file → Ingest → Read-only store → Search / Ask / Post → Close
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use forumrag::composer::NO_CONTEXT_ANSWER;
use forumrag::config::{Config, KeySource, resolve_api_key};
use forumrag::embedder::hashing::HashingEmbedder;
use forumrag::generator::{ChatClient, ChatMessage, GenerationError};
use forumrag::ingest::{self, DEFAULT_SOURCE};
use forumrag::search::SearchStrategy;
use forumrag::store::SqliteStore;
use forumrag::{Error, ForumQuerySystem, repl};
use tempfile::tempdir;

const EXPORT: &str = r#"[
    {"author_name": "Jane Racer", "comment_text": "telemetry setup guide",
     "post_date": "2024-05-01T12:00:00+00:00", "comment_id": "Comment_1"},
    {"author_name": "Max Apex", "comment_text": "tire wear tuning",
     "post_date": "2024-05-02T09:15:00+00:00", "comment_id": "Comment_2"},
    {"author_name": "Lap Counter", "comment_text": "",
     "post_date": "2024-05-03T10:00:00+00:00", "comment_id": "Comment_3"},
    {"comment_text": "brake bias and tire pressure setup for Spa",
     "post_date": "function(){var loc=1}", "comment_id": "Comment_4"}
]"#;

/// Records the user prompt of every call and replies with a fixed answer.
#[derive(Clone, Default)]
struct RecordingChat {
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ChatClient for RecordingChat {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        Ok("Turn on disk telemetry with Alt+L.".to_string())
    }
}

/// Ingest the export into a fresh database file under `dir`.
fn ingested_db(dir: &Path) -> String {
    let export = dir.join("posts.json");
    fs::write(&export, EXPORT).unwrap();

    let db_path = dir.join("forum.db");
    let mut store = SqliteStore::create(&db_path).unwrap();
    let summary =
        ingest::ingest_file(&mut store, &HashingEmbedder::default(), &export, DEFAULT_SOURCE)
            .unwrap();
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.skipped, 1);
    drop(store);

    db_path.to_string_lossy().into_owned()
}

fn open_system(db_path: &str, strategy: SearchStrategy, chat: RecordingChat) -> ForumQuerySystem {
    let mut config = Config::default();
    config.db_path = db_path.to_string();
    config.search.strategy = strategy;

    let store = SqliteStore::open(db_path).unwrap();
    ForumQuerySystem::from_parts(
        Box::new(store),
        Box::new(HashingEmbedder::default()),
        Box::new(chat),
        &config,
    )
}

/// Full pipeline: ingest → search → ask → post → close
#[test]
fn test_full_pipeline() {
    let dir = tempdir().unwrap();
    let db_path = ingested_db(dir.path());
    let chat = RecordingChat::default();
    let system = open_system(&db_path, SearchStrategy::Auto, chat.clone());

    assert_eq!(system.post_count().unwrap(), 3);

    let results = system.search("how do I log telemetry", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].post.text, "telemetry setup guide");
    assert_eq!(results[0].post.author, "Jane Racer");

    let answer = system.ask("how do I log telemetry").unwrap();
    assert_eq!(answer, "Turn on disk telemetry with Alt+L.");
    let prompts = chat.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1, "ask makes exactly one chat call");
    assert!(prompts[0].contains("Post 1 (by Jane Racer, 2024-05-01 12:00):\ntelemetry setup guide"));
    assert!(prompts[0].contains("User Question: how do I log telemetry"));

    let post = system.get_post(3).unwrap();
    assert_eq!(post.author, "Unknown");
    assert_eq!(post.source, DEFAULT_SOURCE);
    assert_eq!(post.display_date(), "Date not available");
    assert!(matches!(system.get_post(99), Err(Error::NotFound(99))));

    system.close().unwrap();
}

/// Native and scan strategies return the same ranking.
#[test]
fn test_strategy_parity() {
    let dir = tempdir().unwrap();
    let db_path = ingested_db(dir.path());
    let native = open_system(&db_path, SearchStrategy::Native, RecordingChat::default());
    let scan = open_system(&db_path, SearchStrategy::Scan, RecordingChat::default());
    assert_eq!(scan.strategy(), "scan");

    for query in ["how do I log telemetry", "tire pressure", "setup", "unrelated words"] {
        let a = native.search(query, 3).unwrap();
        let b = scan.search(query, 3).unwrap();
        assert_eq!(a.len(), b.len(), "query {query:?}");
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.post.id, y.post.id, "query {query:?}");
            assert!((x.similarity - y.similarity).abs() < 1e-5, "query {query:?}");
        }
    }
}

/// Results are bounded, sorted best first, and similarities stay in range.
#[test]
fn test_search_properties() {
    let dir = tempdir().unwrap();
    let db_path = ingested_db(dir.path());
    let system = open_system(&db_path, SearchStrategy::Auto, RecordingChat::default());

    assert!(system.search("tire", 0).unwrap().is_empty());

    for limit in 1..=5 {
        let results = system.search("tire pressure setup", limit).unwrap();
        assert_eq!(results.len(), limit.min(3));
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        for r in &results {
            assert!((-1.0 - 1e-6..=1.0 + 1e-6).contains(&r.similarity));
        }
    }

    // Same question, same answer
    let first = system.search("tire pressure setup", 3).unwrap();
    let second = system.search("tire pressure setup", 3).unwrap();
    let ids = |r: &[forumrag::store::SearchResult]| r.iter().map(|x| x.post.id).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
}

/// An empty database answers without calling the chat model.
#[test]
fn test_empty_store() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("empty.db");
    drop(SqliteStore::create(&db_path).unwrap());

    let chat = RecordingChat::default();
    let system = open_system(&db_path.to_string_lossy(), SearchStrategy::Auto, chat.clone());

    assert!(system.search("anything", 5).unwrap().is_empty());
    assert_eq!(system.ask("anything").unwrap(), NO_CONTEXT_ANSWER);
    assert!(chat.prompts.lock().unwrap().is_empty());
}

/// Opening a database without the expected tables fails with a store error.
#[test]
fn test_open_rejects_foreign_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("other.db");
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY);")
        .unwrap();
    drop(conn);

    assert!(SqliteStore::open(&db_path).is_err());
}

/// Credential order: argument, environment, then the env file.
#[test]
fn test_api_key_resolution() {
    let dir = tempdir().unwrap();
    let env_file = dir.path().join(".env");

    let missing = resolve_api_key(None, None, &env_file);
    assert!(matches!(missing, Err(Error::Configuration(_))));

    fs::write(&env_file, "OTHER=1\nOPENAI_API_KEY=sk-from-file\n").unwrap();
    let key = resolve_api_key(None, None, &env_file).unwrap();
    assert_eq!(key.expose(), "sk-from-file");
    assert_eq!(key.source(), &KeySource::EnvFile(env_file.clone()));

    let key = resolve_api_key(None, Some("sk-from-env".to_string()), &env_file).unwrap();
    assert_eq!(key.source(), &KeySource::Environment);

    let key = resolve_api_key(Some("sk-arg"), Some("sk-from-env".to_string()), &env_file).unwrap();
    assert_eq!(key.expose(), "sk-arg");
    assert!(!format!("{key:?}").contains("sk-arg"));
}

/// Drive the interactive loop with scripted input.
#[test]
fn test_repl_session() {
    let dir = tempdir().unwrap();
    let db_path = ingested_db(dir.path());
    let system = open_system(&db_path, SearchStrategy::Auto, RecordingChat::default());

    let input = "help\npost 1\npost abc\npost 42\nsearch telemetry\nhow do I log telemetry\nquit\npost 2\n";
    let mut out = Vec::new();
    repl::run(&system, input.as_bytes(), &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(out.contains("search <query> - Search for similar posts"));
    assert!(out.contains("Post 1:\nAuthor: Jane Racer\nDate: 2024-05-01 12:00"));
    assert!(out.contains("Please provide a valid post ID number."));
    assert!(out.contains("Post 42 not found."));
    assert!(out.contains("1. Jane Racer (2024-05-01 12:00) - Score: "));
    assert!(out.contains("Answer: Turn on disk telemetry with Alt+L."));
    assert!(!out.contains("Author: Max Apex"), "input after quit is ignored");
    assert!(out.trim_end().ends_with("Goodbye!"));

    system.close().unwrap();
}
