// Shared fixtures for the pipeline and HTTP integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use datapack_forge::archive::{Packer, ZipPacker};
use datapack_forge::errors::PipelineError;
use datapack_forge::generate::SpecGenerator;
use datapack_forge::pipeline::{Pipeline, RepairPolicy};
use datapack_forge::prompt::VersionRuleSet;
use datapack_forge::provider::{Backend, InvokeOptions};
use datapack_forge::store::{MemoryStore, Store, StoredDatapack};
use datapack_forge::wire::{DatapackSpec, FileEntry};

/// Replays scripted replies in order and remembers every prompt it saw.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, PipelineError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, PipelineError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn ok(replies: &[Value]) -> Arc<Self> {
        Self::new(replies.iter().map(|v| Ok(v.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn invoke(&self, prompt: &str, _opts: &InvokeOptions) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::Backend("script exhausted".into())))
    }
}

/// Store whose writes always fail.
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn save(&self, _spec: &DatapackSpec, _owner_id: Option<&str>) -> Result<String, PipelineError> {
        Err(PipelineError::Save("disk full".into()))
    }

    async fn load(&self, _id: &str) -> Result<Option<StoredDatapack>, PipelineError> {
        Ok(None)
    }
}

/// Packer that rejects every archive.
pub struct FailingPacker;

#[async_trait]
impl Packer for FailingPacker {
    async fn pack(&self, _files: &[FileEntry]) -> Result<Vec<u8>, PipelineError> {
        Err(PipelineError::Packaging("archive writer closed".into()))
    }
}

fn generator(backend: Arc<ScriptedBackend>) -> SpecGenerator {
    SpecGenerator::new(backend, Arc::new(VersionRuleSet::builtin().clone()))
}

pub fn pipeline(backend: Arc<ScriptedBackend>, policy: RepairPolicy) -> Pipeline {
    Pipeline::new(generator(backend), Arc::new(MemoryStore::new()), Arc::new(ZipPacker)).with_policy(policy)
}

pub fn pipeline_with_failing_store(backend: Arc<ScriptedBackend>) -> Pipeline {
    Pipeline::new(generator(backend), Arc::new(FailingStore), Arc::new(ZipPacker))
}

pub fn pipeline_with_failing_packer(backend: Arc<ScriptedBackend>) -> Pipeline {
    Pipeline::new(generator(backend), Arc::new(MemoryStore::new()), Arc::new(FailingPacker))
}

pub fn heal_pack() -> Value {
    json!({
        "pack_name": "Healing Aura",
        "description": "Heals every player every 10 seconds",
        "installation_instructions": "Copy the folder into world/datapacks, run /reload, then /function heal:load.",
        "files": [
            { "path": "pack.mcmeta", "content": "{\"pack\":{\"pack_format\":15,\"description\":\"Healing Aura\"}}" },
            { "path": "data/minecraft/tags/functions/load.json", "content": "{\"values\":[\"heal:load\"]}" },
            { "path": "data/heal/functions/load.mcfunction", "content": "tellraw @a {\"text\":\"Healing Aura loaded\"}\nschedule function heal:pulse 10s" },
            { "path": "data/heal/functions/pulse.mcfunction", "content": "# heal everyone\neffect give @a minecraft:instant_health 1 0 true\nschedule function heal:pulse 10s" }
        ]
    })
}

/// The same pack with `pack.mcmeta` left out.
pub fn heal_pack_without_manifest() -> Value {
    let mut v = heal_pack();
    if let Some(files) = v["files"].as_array_mut() {
        files.retain(|f| f["path"] != "pack.mcmeta");
    }
    v
}
