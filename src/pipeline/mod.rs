use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::archive::{DynPacker, ZipPacker};
use crate::config::Config;
use crate::errors::PipelineError;
use crate::generate::{FailedDraft, SpecGenerator};
use crate::log::ArtifactLog;
use crate::prompt::VersionRuleSet;
use crate::provider::{make_backend, DynBackend};
use crate::safety::is_safe_relative_path;
use crate::store::{DynStore, MemoryStore, SqliteStore};
use crate::validate::validate;
use crate::wire::{Candidate, DatapackSpec, FileEntry, ValidationResult, ValidationStatus};

pub const DEFAULT_MAX_REPAIRS: u32 = 2;

/// What to do when the repair budget runs out and the candidate is still invalid.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairPolicy {
    /// Ship the last candidate, flagged `failed`, with its errors attached.
    #[default]
    Lenient,
    /// Fail the request with the final error list.
    Strict,
}

/// Repair loop states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Generated,
    Validating { repairs: u32 },
    Repairing { attempt: u32, errors: Vec<String> },
    Accepted { repairs: u32 },
    Exhausted { repairs: u32, errors: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new (or retained) candidate is ready to be checked.
    CandidateReady,
    Validated(ValidationResult),
}

/// End of the repair loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Accepted { repairs: u32 },
    Exhausted { repairs: u32, errors: Vec<String> },
}

impl Stage {
    /// Pure transition function. Events that do not apply leave the stage unchanged.
    pub fn next(self, event: Event, max_repairs: u32) -> Stage {
        match (self, event) {
            (Stage::Generated, Event::CandidateReady) => Stage::Validating { repairs: 0 },
            (Stage::Repairing { attempt, .. }, Event::CandidateReady) => Stage::Validating { repairs: attempt },
            (Stage::Validating { repairs }, Event::Validated(ValidationResult::Valid)) => Stage::Accepted { repairs },
            (Stage::Validating { repairs }, Event::Validated(ValidationResult::Invalid(errors))) => {
                if repairs < max_repairs {
                    Stage::Repairing { attempt: repairs + 1, errors }
                } else {
                    Stage::Exhausted { repairs, errors }
                }
            }
            (stage, _) => stage,
        }
    }

    pub fn into_terminal(self) -> Result<Terminal, Stage> {
        match self {
            Stage::Accepted { repairs } => Ok(Terminal::Accepted { repairs }),
            Stage::Exhausted { repairs, errors } => Ok(Terminal::Exhausted { repairs, errors }),
            other => Err(other),
        }
    }
}

/// Final status after the repair loop, once the policy has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: ValidationStatus,
    pub errors: Vec<String>,
    pub repairs: u32,
}

/// The single place where repair exhaustion becomes either metadata or an error.
pub fn decide(terminal: Terminal, policy: RepairPolicy) -> Result<Verdict, PipelineError> {
    match (terminal, policy) {
        (Terminal::Accepted { repairs }, _) => Ok(Verdict { status: ValidationStatus::Ok, errors: Vec::new(), repairs }),
        (Terminal::Exhausted { repairs, errors }, RepairPolicy::Lenient) => {
            Ok(Verdict { status: ValidationStatus::Failed, errors, repairs })
        }
        (Terminal::Exhausted { repairs, errors }, RepairPolicy::Strict) => {
            Err(PipelineError::Validation { errors, attempts: repairs })
        }
    }
}

/// Entries that may be written to an archive: safe paths, first occurrence only.
/// Anything else can only come from an invalid candidate shipped under the lenient policy.
pub fn packable_files(files: &[FileEntry]) -> Vec<FileEntry> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(files.len());
    for f in files {
        if !is_safe_relative_path(&f.path) {
            tracing::warn!(path = %f.path.escape_debug(), "skipping unsafe path in archive");
            continue;
        }
        if !seen.insert(f.path.as_str()) {
            tracing::warn!(path = %f.path, "skipping duplicate path in archive");
            continue;
        }
        out.push(f.clone());
    }
    out
}

#[derive(Debug, Clone)]
pub struct CreatedDatapack {
    pub id: String,
    pub spec: DatapackSpec,
    /// Paths actually written to the archive, in order.
    pub entries: Vec<String>,
    pub archive: Vec<u8>,
    pub status: ValidationStatus,
    pub errors: Vec<String>,
    pub repair_attempts: u32,
    pub tx: Uuid,
}

pub struct Pipeline {
    generator: SpecGenerator,
    store: DynStore,
    packer: DynPacker,
    policy: RepairPolicy,
    max_repairs: u32,
    artifacts: Option<ArtifactLog>,
}

impl Pipeline {
    pub fn new(generator: SpecGenerator, store: DynStore, packer: DynPacker) -> Self {
        Self {
            generator,
            store,
            packer,
            policy: RepairPolicy::default(),
            max_repairs: DEFAULT_MAX_REPAIRS,
            artifacts: None,
        }
    }

    pub fn with_policy(mut self, policy: RepairPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_repairs(mut self, max_repairs: u32) -> Self {
        self.max_repairs = max_repairs;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Option<ArtifactLog>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Wire up the configured backend, store and packer.
    pub fn from_config(cfg: &Config) -> Result<Self, PipelineError> {
        let backend = make_backend(cfg)?;
        Self::from_config_with_backend(cfg, backend)
    }

    pub fn from_config_with_backend(cfg: &Config, backend: DynBackend) -> Result<Self, PipelineError> {
        let rules = Arc::new(VersionRuleSet::load(cfg.version_rules.as_deref())?);
        let generator = SpecGenerator::new(backend, rules)
            .with_temperatures(cfg.temperature, cfg.repair_temperature);
        let store: DynStore = match &cfg.db_path {
            Some(path) => Arc::new(SqliteStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };

        Ok(Self::new(generator, store, Arc::new(ZipPacker))
            .with_policy(cfg.repair_policy)
            .with_max_repairs(cfg.max_repair_attempts)
            .with_artifacts(ArtifactLog::new(&cfg.artifacts_dir, cfg.save_request, cfg.save_response)))
    }

    pub fn policy(&self) -> RepairPolicy {
        self.policy
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    /// Generate, validate, repair, save and pack one datapack.
    pub async fn create_datapack(
        &self,
        idea: &str,
        version: &str,
        owner_id: Option<&str>,
    ) -> Result<CreatedDatapack, PipelineError> {
        let idea = idea.trim();
        if idea.is_empty() {
            return Err(PipelineError::Input("idea is required.".into()));
        }

        let tx = Uuid::new_v4();
        tracing::info!(%tx, version, "generating datapack");

        let draft = match self.generator.generate_spec(idea, version).await {
            Ok(d) => d,
            Err(failed) => return Err(self.fail("generate", failed, tx)),
        };
        self.record("generate", &draft.prompt, Some(&draft.raw), tx);

        let mut candidate: Candidate = draft.candidate;
        let mut stage = Stage::Generated;
        let mut unusable_reply: Option<String> = None;

        let terminal = loop {
            stage = match stage.into_terminal() {
                Ok(t) => break t,
                Err(s) => s,
            };

            stage = match stage {
                Stage::Validating { .. } => {
                    let result = validate(&candidate);
                    if let ValidationResult::Invalid(errors) = &result {
                        tracing::warn!(%tx, errors = errors.len(), "candidate failed validation");
                    }
                    stage.next(Event::Validated(result), self.max_repairs)
                }
                Stage::Repairing { attempt, ref errors } => {
                    let mut asked = errors.clone();
                    asked.extend(unusable_reply.take());
                    let label = format!("repair.{attempt}");
                    tracing::info!(%tx, attempt, errors = asked.len(), "requesting repair");

                    match self.generator.repair_spec(idea, version, &candidate, &asked).await {
                        Ok(d) => {
                            self.record(&label, &d.prompt, Some(&d.raw), tx);
                            candidate = d.candidate;
                        }
                        Err(failed) if failed.error.is_malformed_output() => {
                            // Keep the previous candidate; the attempt is spent.
                            self.record(&label, &failed.prompt, failed.raw.as_deref(), tx);
                            tracing::warn!(%tx, attempt, "repair reply unusable: {}", failed.error);
                            unusable_reply = Some(format!(
                                "Your previous reply could not be used ({}). Reply with exactly one JSON object.",
                                failed.error
                            ));
                        }
                        Err(failed) => return Err(self.fail(&label, failed, tx)),
                    }
                    stage.next(Event::CandidateReady, self.max_repairs)
                }
                other => other.next(Event::CandidateReady, self.max_repairs),
            };
        };

        let verdict = decide(terminal, self.policy)?;
        let spec = DatapackSpec::from_candidate(&candidate);

        let id = self.store.save(&spec, owner_id).await?;
        let files = packable_files(&spec.files);
        let archive = self.packer.pack(&files).await?;

        tracing::info!(
            %tx, %id,
            status = verdict.status.as_str(),
            repairs = verdict.repairs,
            entries = files.len(),
            bytes = archive.len(),
            "datapack ready"
        );

        Ok(CreatedDatapack {
            id,
            entries: files.into_iter().map(|f| f.path).collect(),
            spec,
            archive,
            status: verdict.status,
            errors: verdict.errors,
            repair_attempts: verdict.repairs,
            tx,
        })
    }

    fn record(&self, stage: &str, prompt: &str, response: Option<&str>, tx: Uuid) {
        if let Some(log) = &self.artifacts {
            log.record(stage, prompt, response, tx);
        }
    }

    fn fail(&self, stage: &str, failed: FailedDraft, tx: Uuid) -> PipelineError {
        self.record(stage, &failed.prompt, failed.raw.as_deref(), tx);
        tracing::error!(%tx, stage, "{}", failed.error);
        failed.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid(msg: &str) -> Event {
        Event::Validated(ValidationResult::Invalid(vec![msg.to_string()]))
    }

    #[test]
    fn valid_first_candidate_is_accepted_without_repair() {
        let s = Stage::Generated.next(Event::CandidateReady, 2);
        assert_eq!(s, Stage::Validating { repairs: 0 });
        let s = s.next(Event::Validated(ValidationResult::Valid), 2);
        assert_eq!(s.into_terminal(), Ok(Terminal::Accepted { repairs: 0 }));
    }

    #[test]
    fn repairs_are_bounded() {
        let mut s = Stage::Generated.next(Event::CandidateReady, 2);
        s = s.next(invalid("a"), 2);
        assert_eq!(s, Stage::Repairing { attempt: 1, errors: vec!["a".into()] });
        s = s.next(Event::CandidateReady, 2);
        s = s.next(invalid("b"), 2);
        assert_eq!(s, Stage::Repairing { attempt: 2, errors: vec!["b".into()] });
        s = s.next(Event::CandidateReady, 2);
        s = s.next(invalid("c"), 2);
        assert_eq!(s, Stage::Exhausted { repairs: 2, errors: vec!["c".into()] });
    }

    #[test]
    fn zero_budget_exhausts_immediately() {
        let s = Stage::Validating { repairs: 0 }.next(invalid("x"), 0);
        assert_eq!(s, Stage::Exhausted { repairs: 0, errors: vec!["x".into()] });
    }

    #[test]
    fn mismatched_events_do_not_move_the_stage() {
        let s = Stage::Validating { repairs: 1 };
        assert_eq!(s.clone().next(Event::CandidateReady, 2), s);
        let done = Stage::Accepted { repairs: 1 };
        assert_eq!(done.clone().next(invalid("x"), 2), done);
    }

    #[test]
    fn lenient_policy_turns_exhaustion_into_metadata() {
        let v = decide(Terminal::Exhausted { repairs: 2, errors: vec!["e".into()] }, RepairPolicy::Lenient).unwrap();
        assert_eq!(v.status, ValidationStatus::Failed);
        assert_eq!(v.errors, vec!["e".to_string()]);
        assert_eq!(v.repairs, 2);
    }

    #[test]
    fn strict_policy_turns_exhaustion_into_an_error() {
        match decide(Terminal::Exhausted { repairs: 2, errors: vec!["e".into()] }, RepairPolicy::Strict) {
            Err(PipelineError::Validation { errors, attempts }) => {
                assert_eq!(errors, vec!["e".to_string()]);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        let ok = decide(Terminal::Accepted { repairs: 1 }, RepairPolicy::Strict).unwrap();
        assert_eq!(ok.status, ValidationStatus::Ok);
    }

    #[test]
    fn packable_files_drop_unsafe_and_repeated_paths() {
        let f = |p: &str| FileEntry { path: p.into(), content: "x".into() };
        let kept = packable_files(&[f("pack.mcmeta"), f("../evil"), f("pack.mcmeta"), f("data/a/b.json")]);
        let paths: Vec<&str> = kept.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["pack.mcmeta", "data/a/b.json"]);
    }
}
