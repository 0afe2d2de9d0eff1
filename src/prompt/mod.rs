use crate::safety::ALLOWED_COMMANDS;
use crate::wire::Candidate;

pub mod versions;

pub use versions::{VersionRule, VersionRuleSet};

fn role() -> &'static str {
    "You are an expert Minecraft Java datapack author."
}

fn output_mandate() -> &'static str {
    "Return JSON ONLY: exactly one JSON object, no markdown, no code fences, no commentary."
}

/// Literal schema shown to the model. Field names are the wire format.
pub fn json_schema() -> &'static str {
r#"{
  "pack_name": "string",
  "description": "string",
  "files": [{ "path": "string", "content": "string" }],
  "installation_instructions": "string"
}"#
}

fn datapack_constraints() -> &'static str {
r#"Required datapack constraints:
- Include a valid pack.mcmeta at path: pack.mcmeta
- Put every functional file under a namespace: data/<namespace>/...
- Include at least one function file: data/<namespace>/functions/<name>.mcfunction (use function/ where the version rules say so)
- Provide load and tick entrypoints:
  - data/minecraft/tags/functions/load.json
  - data/minecraft/tags/functions/tick.json
  - data/<namespace>/functions/load.mcfunction
  - data/<namespace>/functions/tick.mcfunction
- Every file must have non-empty content.
- Paths use forward slashes, are relative to the datapack root, never absolute, never contain '..'.
- Keep files small and textual; never include binaries.
- The namespace must be lowercase and safe (e.g. 'craftingpacks')."#
}

/// Prompt for a first generation attempt, using the built-in version table.
pub fn build_prompt(idea: &str, version: &str) -> String {
    build_prompt_with(VersionRuleSet::builtin(), idea, version)
}

pub fn build_prompt_with(rules: &VersionRuleSet, idea: &str, version: &str) -> String {
    let mut parts = vec![
        role().to_string(),
        format!("Minecraft version: {version}"),
        "Task: Generate a COMPLETE datapack as a list of files.".to_string(),
        output_mandate().to_string(),
        "The JSON MUST match exactly this schema:".to_string(),
        json_schema().to_string(),
        datapack_constraints().to_string(),
    ];

    let block = rules.block(version);
    if !block.is_empty() {
        parts.push(String::new());
        parts.push(block.to_string());
    }

    parts.push("Pack goal / idea (implement this):".to_string());
    parts.push(idea.trim().to_string());
    parts.join("\n")
}

/// Prompt asking the model to correct a candidate the validator rejected.
pub fn build_repair_prompt(
    idea: &str,
    version: &str,
    candidate: &Candidate,
    errors: &[String],
) -> String {
    let mut list = String::new();
    for (i, e) in errors.iter().enumerate() {
        list.push_str(&format!("{}. {}\n", i + 1, e.trim_end()));
    }
    if list.is_empty() {
        list.push_str("(no errors were recorded)\n");
    }

    format!(
"You are an expert Minecraft Java datapack author fixing a datapack that failed validation.
{mandate}
The JSON MUST match exactly this schema:
{schema}
Fix every error listed below. Return the complete corrected datapack, not a diff.
Do NOT remove required structure: keep pack.mcmeta, the data/<namespace>/ files, and the load/tick entrypoints.
Only use these commands at the start of .mcfunction lines: {commands}.

Validation errors:
{list}
Previous JSON output:
{previous}

Original pack goal / idea:
{idea}

Minecraft version: {version}",
        mandate = output_mandate(),
        schema = json_schema(),
        commands = ALLOWED_COMMANDS.join(", "),
        list = list,
        previous = candidate.to_pretty_json(),
        idea = idea.trim(),
        version = version,
    )
}
