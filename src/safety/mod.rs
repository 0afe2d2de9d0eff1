pub const MAX_PATH_CHARS: usize = 240;

/// First tokens a `.mcfunction` line may start with.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "execute", "scoreboard", "tellraw", "effect", "function", "schedule", "data",
    "tag", "give", "clear", "setblock", "fill", "summon", "kill", "tp", "teleport",
    "particle", "playsound", "title", "bossbar", "say",
];

pub const ALLOWED_CRITERIA: &[&str] = &["dummy", "deathCount", "playerKillCount"];
pub const ALLOWED_CRITERIA_PREFIXES: &[&str] = &["minecraft.custom:", "minecraft.mined:"];

/// Pre-1.13 kill statistic; the game rejects it.
pub const LEGACY_KILLED_CRITERION: &str = "minecraft.killed:";

const OBJECTIVE_ADD: &str = "scoreboard objectives add ";

fn has_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!((chars.next(), chars.next()), (Some(letter), Some(':')) if letter.is_ascii_alphabetic())
}

/// A path is safe when it stays relative to the datapack root once extracted.
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() || path.chars().count() > MAX_PATH_CHARS {
        return false;
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    if path.contains('\0') || path.contains("..") || path.contains('\\') {
        return false;
    }
    // Zip treats a trailing slash as a directory entry and drops its content.
    if path.ends_with('/') || path.contains("//") {
        return false;
    }
    !has_drive_prefix(path)
}

/// Returns true if the line's leading token is an allowlisted command.
/// Comparison is case-sensitive; the game's command names are lowercase.
pub fn command_is_allowed(line: &str, allowlist: &[&str]) -> bool {
    match line.split_whitespace().next() {
        Some(first) => allowlist.contains(&first),
        None => false,
    }
}

/// True when an objective declaration uses an unsupported criterion.
/// Lines that do not declare an objective are never flagged.
pub fn has_invalid_criteria(line: &str) -> bool {
    if !line.starts_with(OBJECTIVE_ADD) {
        return false;
    }
    let criterion = match line.split_whitespace().nth(4) {
        Some(c) => c,
        None => return true,
    };
    if ALLOWED_CRITERIA.contains(&criterion) {
        return false;
    }
    !ALLOWED_CRITERIA_PREFIXES.iter().any(|p| criterion.starts_with(p))
}

/// Line-scan a function file, appending one message per defect.
pub fn lint_mcfunction(path: &str, content: &str, errors: &mut Vec<String>) {
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line_no = idx + 1;

        if !command_is_allowed(trimmed, ALLOWED_COMMANDS) {
            errors.push(format!("Unsupported command in {path} at line {line_no}: {trimmed}"));
            continue;
        }

        if trimmed.contains(LEGACY_KILLED_CRITERION) {
            errors.push(format!("Invalid scoreboard criterion in {path} at line {line_no}: {trimmed}"));
        }

        if has_invalid_criteria(trimmed) {
            errors.push(format!("Invalid scoreboard criteria in {path} at line {line_no}: {trimmed}"));
        }
    }
}
