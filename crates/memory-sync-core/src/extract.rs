//! Memory extraction from a chat conversation export.
//!
//! An export is a JSON array of conversations. Each conversation carries a
//! `mapping` of message-id to node, and a node may hold a `message`. Messages
//! addressed to the `bio` recipient are the ones the chat system stored as
//! long-term memories; each becomes one [`Record`].
//!
//! Conversations are independent, so they are scanned on a bounded pool of
//! blocking tasks. A conversation that cannot be scanned is logged and
//! skipped without affecting the rest of the batch.

use crate::error::{Result, SyncError};
use crate::types::Record;
use crate::utils::{now_unix, preview};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const MEMORY_RECIPIENT: &str = "bio";
pub const DEFAULT_WORKERS: usize = 16;

type ConversationFn = fn(&Value, i64) -> Result<ConversationOutcome>;

/// What one conversation contributed.
#[derive(Debug, Clone, Default)]
pub struct ConversationOutcome {
    pub records: Vec<Record>,
    pub message_count: usize,
    pub rejected_records: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Fan-in order; may contain repeated content.
    pub records: Vec<Record>,
    /// Messages scanned in conversations that were processed successfully.
    pub message_count: usize,
    /// Messages across the whole export, counted before scanning.
    pub total_messages: usize,
    pub failed_conversations: usize,
    pub rejected_records: usize,
}

pub fn parse_export(text: &str) -> Result<Vec<Value>> {
    let parsed: Value = serde_json::from_str(text)
        .map_err(|error| SyncError::Fatal(format!("conversation export is not JSON: {error}")))?;
    match parsed {
        Value::Array(conversations) => Ok(conversations),
        other => Err(SyncError::Fatal(format!(
            "conversation export must be a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

pub fn load_export(path: &Path) -> Result<Vec<Value>> {
    let text = fs::read_to_string(path).map_err(|error| {
        SyncError::Fatal(format!(
            "read conversation export {}: {error}",
            path.display()
        ))
    })?;
    parse_export(&text)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[must_use]
pub fn count_messages(conversations: &[Value]) -> usize {
    conversations
        .iter()
        .filter_map(|conversation| conversation.get("mapping"))
        .filter_map(Value::as_object)
        .map(serde_json::Map::len)
        .sum()
}

/// Scans one conversation for memory messages.
///
/// Messages that fail validation are dropped and counted; a structural
/// problem with the conversation itself fails the whole conversation.
pub fn process_conversation(conversation: &Value, now: i64) -> Result<ConversationOutcome> {
    let Some(conversation) = conversation.as_object() else {
        return Err(SyncError::Processing(format!(
            "conversation must be an object, got {}",
            json_kind(conversation)
        )));
    };

    let mapping = match conversation.get("mapping") {
        None | Some(Value::Null) => return Ok(ConversationOutcome::default()),
        Some(Value::Object(mapping)) => mapping,
        Some(other) => {
            return Err(SyncError::Processing(format!(
                "mapping must be an object, got {}",
                json_kind(other)
            )));
        }
    };

    let mut outcome = ConversationOutcome {
        message_count: mapping.len(),
        ..ConversationOutcome::default()
    };

    for (node_id, node) in mapping {
        let message = match node {
            Value::Null => continue,
            Value::Object(node) => match node.get("message") {
                None | Some(Value::Null) => continue,
                Some(message @ Value::Object(_)) => message,
                Some(other) => {
                    return Err(SyncError::Processing(format!(
                        "message in node {node_id} must be an object, got {}",
                        json_kind(other)
                    )));
                }
            },
            other => {
                return Err(SyncError::Processing(format!(
                    "node {node_id} must be an object, got {}",
                    json_kind(other)
                )));
            }
        };

        if message.get("recipient").and_then(Value::as_str) != Some(MEMORY_RECIPIENT) {
            continue;
        }

        match Record::from_export_message(message, now) {
            Ok(record) => {
                log::debug!("extracted memory {:?} from node {node_id}", preview(&record.content));
                outcome.records.push(record);
            }
            Err(error) => {
                log::warn!("skipping memory in node {node_id}: {error}");
                outcome.rejected_records += 1;
            }
        }
    }

    Ok(outcome)
}

/// Extracts memories from every conversation, at most `workers` at a time.
///
/// Returns once every conversation has been processed or has failed.
pub fn extract_memories(conversations: Vec<Value>, workers: usize) -> Result<Extraction> {
    extract_with(conversations, workers, process_conversation)
}

fn extract_with(
    conversations: Vec<Value>,
    workers: usize,
    process: ConversationFn,
) -> Result<Extraction> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(SyncError::Fatal(
            "extraction must not run inside an async runtime".to_string(),
        ));
    }

    let workers = workers.max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(workers)
        .thread_name("memory-extract")
        .build()
        .map_err(|error| SyncError::Fatal(format!("start extraction workers: {error}")))?;

    let now = now_unix();
    Ok(runtime.block_on(extract_concurrently(conversations, workers, now, process)))
}

async fn extract_concurrently(
    conversations: Vec<Value>,
    workers: usize,
    now: i64,
    process: ConversationFn,
) -> Extraction {
    let mut extraction = Extraction {
        total_messages: count_messages(&conversations),
        ..Extraction::default()
    };
    let conversation_total = conversations.len();

    let permits = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for (index, conversation) in conversations.into_iter().enumerate() {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            log::warn!("extraction pool closed early; {index} of {conversation_total} conversations submitted");
            break;
        };
        tasks.spawn_blocking(move || {
            let _permit = permit;
            (index, process(&conversation, now))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(outcome))) => {
                extraction.message_count += outcome.message_count;
                extraction.rejected_records += outcome.rejected_records;
                extraction.records.extend(outcome.records);
            }
            Ok((index, Err(error))) => {
                log::warn!("skipping conversation #{index}: {error}");
                extraction.failed_conversations += 1;
            }
            Err(error) => {
                log::warn!("conversation task did not finish: {error}");
                extraction.failed_conversations += 1;
            }
        }
    }

    log::info!(
        "extracted {} memories from {} conversations ({} of {} messages scanned, {} conversations failed, {} memories rejected)",
        extraction.records.len(),
        conversation_total,
        extraction.message_count,
        extraction.total_messages,
        extraction.failed_conversations,
        extraction.rejected_records
    );

    extraction
}

#[cfg(test)]
mod tests {
    use super::{
        ConversationOutcome, count_messages, extract_memories, extract_with, parse_export,
        process_conversation,
    };
    use crate::error::{Result, SyncError};
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const NOW: i64 = 1_800_000_000;

    fn bio(text: &str) -> Value {
        json!({
            "message": {
                "recipient": "bio",
                "content": {"content_type": "text", "parts": [text]},
                "create_time": 1_700_000_000.5,
                "update_time": 1_700_000_100.0,
                "metadata": {"model_slug": "gpt-4o"}
            }
        })
    }

    fn chat(text: &str) -> Value {
        json!({
            "message": {
                "recipient": "all",
                "content": {"content_type": "text", "parts": [text]}
            }
        })
    }

    fn conversation(nodes: Vec<(&str, Value)>) -> Value {
        let mapping = nodes
            .into_iter()
            .map(|(id, node)| (id.to_string(), node))
            .collect::<serde_json::Map<_, _>>();
        json!({"title": "chat", "mapping": mapping})
    }

    fn contents(records: &[crate::types::Record]) -> BTreeSet<String> {
        records.iter().map(|r| r.content.clone()).collect()
    }

    #[test]
    fn only_bio_messages_become_records() {
        let convo = conversation(vec![
            ("a", chat("what should I drink?")),
            ("b", bio("Prefers green tea")),
        ]);
        let outcome = process_conversation(&convo, NOW).expect("outcome");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].content, "Prefers green tea");
        assert_eq!(outcome.records[0].created_at, 1_700_000_000);
        assert_eq!(outcome.message_count, 2);
    }

    #[test]
    fn nodes_without_messages_are_skipped() {
        let convo = conversation(vec![
            ("root", json!({"message": null, "children": ["b"]})),
            ("gone", Value::Null),
            ("b", bio("Lives in Oslo")),
        ]);
        let outcome = process_conversation(&convo, NOW).expect("outcome");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.message_count, 3);
    }

    #[test]
    fn empty_bio_message_is_rejected_not_kept() {
        let convo = conversation(vec![
            ("a", json!({"message": {"recipient": "bio", "content": {"parts": []}}})),
            ("b", bio("Has a cat")),
        ]);
        let outcome = process_conversation(&convo, NOW).expect("outcome");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.rejected_records, 1);
    }

    #[test]
    fn missing_mapping_is_an_empty_conversation() {
        let outcome = process_conversation(&json!({"title": "x"}), NOW).expect("outcome");
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.message_count, 0);
    }

    #[test]
    fn malformed_structure_fails_the_conversation() {
        for bad in [
            json!("not a conversation"),
            json!({"mapping": []}),
            json!({"mapping": {"a": 5}}),
            json!({"mapping": {"a": {"message": "hello"}}}),
        ] {
            let error = process_conversation(&bad, NOW).expect_err("malformed");
            assert!(matches!(error, SyncError::Processing(_)), "{error}");
        }
    }

    #[test]
    fn bad_conversation_does_not_affect_siblings() {
        let conversations = vec![
            conversation(vec![("a", bio("Likes hiking"))]),
            json!({"mapping": {"a": 5}}),
            conversation(vec![("a", bio("Works remotely")), ("b", chat("hi"))]),
        ];
        let extraction = extract_memories(conversations, 4).expect("extraction");
        assert_eq!(extraction.failed_conversations, 1);
        assert_eq!(
            contents(&extraction.records),
            BTreeSet::from(["Likes hiking".to_string(), "Works remotely".to_string()])
        );
        assert_eq!(extraction.total_messages, 4);
        assert_eq!(extraction.message_count, 3);
    }

    fn explode_on_poison(conversation: &Value, now: i64) -> Result<ConversationOutcome> {
        assert!(conversation.get("poison").is_none(), "poisoned conversation");
        process_conversation(conversation, now)
    }

    #[test]
    fn panicking_task_is_isolated() {
        let conversations = vec![
            conversation(vec![("a", bio("Likes hiking"))]),
            json!({"poison": true}),
            conversation(vec![("a", bio("Works remotely"))]),
        ];
        let extraction = extract_with(conversations, 2, explode_on_poison).expect("extraction");
        assert_eq!(extraction.failed_conversations, 1);
        assert_eq!(extraction.records.len(), 2);
    }

    static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
    static PEAK_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

    fn slow_tracked(conversation: &Value, now: i64) -> Result<ConversationOutcome> {
        let current = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
        PEAK_IN_FLIGHT.fetch_max(current, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
        process_conversation(conversation, now)
    }

    #[test]
    fn in_flight_conversations_never_exceed_workers() {
        let conversations = (0..24)
            .map(|i| conversation(vec![("a", bio(&format!("fact {i}")))]))
            .collect::<Vec<_>>();
        let extraction = extract_with(conversations, 3, slow_tracked).expect("extraction");

        assert_eq!(extraction.records.len(), 24);
        let peak = PEAK_IN_FLIGHT.load(Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(peak <= 3, "peak in-flight was {peak}");
    }

    #[test]
    fn refuses_to_run_inside_an_async_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let result = runtime.block_on(async {
            extract_memories(vec![conversation(vec![("a", bio("Drinks water"))])], 2)
        });
        assert!(matches!(result, Err(SyncError::Fatal(_))));
    }

    #[test]
    fn duplicates_across_conversations_are_kept() {
        let conversations = vec![
            conversation(vec![("a", bio("Likes hiking"))]),
            conversation(vec![("a", bio("Likes hiking"))]),
        ];
        let extraction = extract_memories(conversations, 2).expect("extraction");
        assert_eq!(extraction.records.len(), 2);
    }

    #[test]
    fn worker_count_does_not_change_content() {
        let conversations = (0..40)
            .map(|i| {
                conversation(vec![
                    ("a", bio(&format!("fact {i}"))),
                    ("b", chat("noise")),
                    ("c", bio(&format!("shared {}", i % 3))),
                ])
            })
            .collect::<Vec<_>>();

        let serial = extract_memories(conversations.clone(), 1).expect("serial");
        let parallel = extract_memories(conversations, 16).expect("parallel");
        assert_eq!(serial.records.len(), 80);
        assert_eq!(parallel.records.len(), 80);
        assert_eq!(contents(&serial.records), contents(&parallel.records));
        assert_eq!(contents(&serial.records).len(), 43);
    }

    #[test]
    fn zero_workers_still_makes_progress() {
        let conversations = vec![conversation(vec![("a", bio("Drinks water"))])];
        let extraction = extract_memories(conversations, 0).expect("extraction");
        assert_eq!(extraction.records.len(), 1);
    }

    #[test]
    fn counts_messages_across_export() {
        let conversations = vec![
            conversation(vec![("a", chat("x")), ("b", chat("y"))]),
            json!({"mapping": null}),
            conversation(vec![("a", bio("z"))]),
        ];
        assert_eq!(count_messages(&conversations), 3);
    }

    #[test]
    fn export_must_be_an_array() {
        assert!(parse_export("[]").expect("empty export").is_empty());
        assert!(matches!(parse_export("{}"), Err(SyncError::Fatal(_))));
        assert!(matches!(parse_export("not json"), Err(SyncError::Fatal(_))));
    }
}
