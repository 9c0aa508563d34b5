//! Lookup-only worker over the on-disk sample library.
//!
//! Answers the session and sample-listing calls the browser front-end makes.
//! Generation calls belong to the model engine and come back as unknown
//! operations here.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use waiveconf::WaiveConfig;
use waiveproto::{ResultItem, WorkItem, Worker};

use crate::assets::AssetResolver;

const DEFAULT_SAMPLE_COUNT: usize = 1;
const MAX_SAMPLE_COUNT: usize = 16;

pub struct LibraryWorker {
    resolver: AssetResolver,
    sessions: HashMap<String, Instant>,
    /// Next listing index per (session, instrument), so repeated requests
    /// walk through the library instead of returning the same file.
    drum_cursors: HashMap<(String, String), usize>,
}

impl LibraryWorker {
    pub fn new(config: Arc<WaiveConfig>) -> Self {
        Self::with_resolver(AssetResolver::from_config(&config))
    }

    pub fn with_resolver(resolver: AssetResolver) -> Self {
        Self {
            resolver,
            sessions: HashMap::new(),
            drum_cursors: HashMap::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn register_session(&mut self, item: &WorkItem) -> Value {
        let id = item.correlation_id.clone();
        let fresh = self.sessions.insert(id.clone(), Instant::now()).is_none();
        info!(session = %id, fresh, total = self.sessions.len(), "Session registered");
        json!({"ok": true, "session": id})
    }

    fn drum_samples(&mut self, item: &WorkItem) -> Value {
        let Some(instrument) = param_string(item, "instrument") else {
            return failure("missing parameter: instrument");
        };
        let count = param_count(item);

        let drum_dir = self.resolver.root().join(self.resolver.drum_group());
        let base = match self.resolver.listing_dir(self.resolver.drum_group(), &instrument) {
            Ok(base) => base,
            Err(e) => return failure(&e.to_string()),
        };

        let files = list_files(&base, &drum_dir);
        if files.is_empty() {
            return failure(&format!("no drum samples for instrument: {}", instrument));
        }

        let cursor = self
            .drum_cursors
            .entry((item.correlation_id.clone(), instrument.clone()))
            .or_insert(0);
        let start = *cursor % files.len();
        let take = count.min(files.len());
        let picked: Vec<&String> = files.iter().cycle().skip(start).take(take).collect();
        *cursor = (start + take) % files.len();

        debug!(instrument = %instrument, found = files.len(), start, picked = take, "Drum sample lookup");
        json!({"ok": true, "drum_samples": picked})
    }

    fn list_samples(&self, item: &WorkItem) -> Value {
        let (Some(group), Some(category)) = (param_string(item, "group"), param_string(item, "category"))
        else {
            return failure("missing parameter: group and category are required");
        };

        match self.resolver.listing_dir(&group, &category) {
            Ok(base) => json!({"ok": true, "samples": list_files(&base, &base)}),
            Err(e) => failure(&e.to_string()),
        }
    }
}

#[async_trait]
impl Worker for LibraryWorker {
    fn name(&self) -> &str {
        "library"
    }

    async fn handle(&mut self, item: &WorkItem) -> ResultItem {
        let reply = match item.operation.as_str() {
            "registerSession" => self.register_session(item),
            "requestDrumSample" => self.drum_samples(item),
            "listSamples" => self.list_samples(item),
            "ping" => json!({"ok": true, "pong": true}),
            other => {
                warn!(work.operation = %other, "Unknown operation");
                failure(&format!("unknown operation: {}", other))
            }
        };
        ResultItem::json(item.operation.clone(), reply)
    }
}

fn failure(message: &str) -> Value {
    json!({"ok": false, "error": message})
}

/// A parameter as a string. Query strings only carry strings; JSON bodies may
/// carry numbers.
fn param_string(item: &WorkItem, key: &str) -> Option<String> {
    match item.payload.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn param_count(item: &WorkItem) -> usize {
    param_string(item, "count")
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(DEFAULT_SAMPLE_COUNT)
        .clamp(1, MAX_SAMPLE_COUNT)
}

/// Sorted files below `dir`, as `/`-joined paths relative to `relative_to`.
fn list_files(dir: &Path, relative_to: &Path) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(relative_to).ok()?;
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use waiveproto::{Payload, ReplyBody};

    fn library() -> (LibraryWorker, TempDir) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for rel in [
            "drums/kick/808/a.mp3",
            "drums/kick/808/b.mp3",
            "drums/kick/909/c.mp3",
            "drums/snare/acoustic/s.mp3",
            "synth/synth/lead/patch01.wav",
            "synth/synth/lead/patch02.wav",
        ] {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"x").unwrap();
        }
        let worker = LibraryWorker::with_resolver(AssetResolver::new(root, "drums", "synth"));
        (worker, temp)
    }

    fn item(op: &str, params: Value) -> WorkItem {
        let payload: Payload = match params {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        WorkItem::new(op, "sess-1", payload).unwrap()
    }

    async fn call(worker: &mut LibraryWorker, op: &str, params: Value) -> Value {
        let reply = worker.handle(&item(op, params)).await;
        assert_eq!(reply.result_type, op);
        match reply.payload {
            ReplyBody::Json(v) => v,
            other => panic!("expected json reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn register_session_is_remembered() {
        let (mut worker, _temp) = library();
        let reply = call(&mut worker, "registerSession", json!({})).await;
        assert_eq!(reply, json!({"ok": true, "session": "sess-1"}));

        call(&mut worker, "registerSession", json!({})).await;
        assert_eq!(worker.session_count(), 1);
    }

    #[tokio::test]
    async fn drum_samples_default_to_one() {
        let (mut worker, _temp) = library();
        let reply = call(&mut worker, "requestDrumSample", json!({"instrument": "kick"})).await;
        assert_eq!(reply, json!({"ok": true, "drum_samples": ["kick/808/a.mp3"]}));
    }

    #[tokio::test]
    async fn drum_samples_honor_count() {
        let (mut worker, _temp) = library();
        let reply = call(
            &mut worker,
            "requestDrumSample",
            json!({"instrument": "kick", "count": "10"}),
        )
        .await;
        assert_eq!(
            reply["drum_samples"],
            json!(["kick/808/a.mp3", "kick/808/b.mp3", "kick/909/c.mp3"])
        );
    }

    #[tokio::test]
    async fn repeated_drum_requests_walk_the_library() {
        let (mut worker, _temp) = library();
        let mut picks = Vec::new();
        for _ in 0..4 {
            let reply = call(&mut worker, "requestDrumSample", json!({"instrument": "kick"})).await;
            picks.push(reply["drum_samples"][0].as_str().unwrap().to_string());
        }

        assert_eq!(
            picks,
            vec!["kick/808/a.mp3", "kick/808/b.mp3", "kick/909/c.mp3", "kick/808/a.mp3"]
        );
    }

    #[tokio::test]
    async fn drum_cursor_is_per_session_and_wraps_batches() {
        let (mut worker, _temp) = library();
        let reply = call(
            &mut worker,
            "requestDrumSample",
            json!({"instrument": "kick", "count": 2}),
        )
        .await;
        assert_eq!(reply["drum_samples"], json!(["kick/808/a.mp3", "kick/808/b.mp3"]));

        let reply = call(
            &mut worker,
            "requestDrumSample",
            json!({"instrument": "kick", "count": 2}),
        )
        .await;
        assert_eq!(reply["drum_samples"], json!(["kick/909/c.mp3", "kick/808/a.mp3"]));

        // A different session starts from the top
        let other = WorkItem::new(
            "requestDrumSample",
            "sess-2",
            json!({"instrument": "kick"}).as_object().unwrap().clone(),
        )
        .unwrap();
        let reply = worker.handle(&other).await;
        assert_eq!(
            reply.payload.as_json().unwrap()["drum_samples"],
            json!(["kick/808/a.mp3"])
        );
    }

    #[tokio::test]
    async fn unknown_instrument_is_a_failed_reply() {
        let (mut worker, _temp) = library();
        let reply = call(&mut worker, "requestDrumSample", json!({"instrument": "cowbell"})).await;
        assert_eq!(reply["ok"], false);

        let reply = call(&mut worker, "requestDrumSample", json!({})).await;
        assert_eq!(reply["error"], "missing parameter: instrument");
    }

    #[tokio::test]
    async fn list_samples_uses_group_layout() {
        let (mut worker, _temp) = library();
        let reply = call(
            &mut worker,
            "listSamples",
            json!({"group": "synth", "category": "lead"}),
        )
        .await;
        assert_eq!(
            reply,
            json!({"ok": true, "samples": ["patch01.wav", "patch02.wav"]})
        );

        let reply = call(
            &mut worker,
            "listSamples",
            json!({"group": "drums", "category": "snare"}),
        )
        .await;
        assert_eq!(reply["samples"], json!(["acoustic/s.mp3"]));
    }

    #[tokio::test]
    async fn traversal_in_params_is_refused() {
        let (mut worker, _temp) = library();
        let reply = call(
            &mut worker,
            "listSamples",
            json!({"group": "..", "category": "lead"}),
        )
        .await;
        assert_eq!(reply["ok"], false);
    }

    #[tokio::test]
    async fn unknown_operations_are_reported() {
        let (mut worker, _temp) = library();
        let reply = call(&mut worker, "requestDrumPattern", json!({})).await;
        assert_eq!(
            reply,
            json!({"ok": false, "error": "unknown operation: requestDrumPattern"})
        );

        let reply = call(&mut worker, "ping", json!({})).await;
        assert_eq!(reply, json!({"ok": true, "pong": true}));
    }
}
