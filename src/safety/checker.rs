//! Safety checks for the "hands" tool's direct-invocation mode (§4.3, §9):
//! an allowlisted command plus an argv array, never a shell string, plus a
//! regex net for dangerous patterns that would otherwise slip through a
//! naive allowlist (obfuscated `rm -rf /`, piping a download into a shell,
//! base64-smuggled payloads).
//!
//! This is the first line of defense for any command the agent runs
//! directly on the host; it does not replace workspace-root path
//! validation (`path_validator`), which every path-bearing argument still
//! goes through separately.

use crate::errors::{Result, SafetyError};
use crate::safety::path_validator::PathValidator;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;

pub struct CommandChecker {
    allowed_commands: HashSet<String>,
    path_validator: PathValidator,
}

impl CommandChecker {
    pub fn new(
        allowed_commands: impl IntoIterator<Item = String>,
        workspace_root: PathBuf,
        allowed_paths: Vec<String>,
        denied_paths: Vec<String>,
    ) -> Self {
        Self {
            allowed_commands: allowed_commands.into_iter().collect(),
            path_validator: PathValidator::new(workspace_root, allowed_paths, denied_paths),
        }
    }

    /// The configured allowlist, for callers that need to describe it
    /// (e.g. the "hands" tool's agentic-mode system prompt).
    pub fn allowed_commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = self.allowed_commands.iter().cloned().collect();
        commands.sort();
        commands
    }

    /// Validate a direct-mode invocation: `program` must be on the
    /// allowlist, and no argument may resolve outside the workspace.
    pub fn check_direct(&self, program: &str, args: &[String]) -> Result<()> {
        if !self.allowed_commands.contains(program) {
            return Err(SafetyError::CommandNotAllowed { command: program.to_string() }.into());
        }
        for arg in args {
            if looks_like_path(arg) {
                self.path_validator.validate(arg)?;
            }
        }
        Ok(())
    }

    /// Validate a raw shell string (the LLM-driven "hands" mode) against
    /// the dangerous-pattern net. This is intentionally permissive beyond
    /// the patterns below — the tagged allowlist in `check_direct` is the
    /// hard boundary; this is best-effort defense in depth.
    pub fn check_shell_command(&self, cmd: &str) -> Result<()> {
        let normalized = normalize_shell_command(cmd);

        for (pattern, description) in DANGEROUS_COMMAND_PATTERNS.iter() {
            if pattern.is_match(&normalized) {
                return Err(SafetyError::DangerousCommand { reason: description.to_string() }.into());
            }
        }

        for part in split_shell_commands(&normalized) {
            let part_trimmed = part.trim();
            for (pattern, description) in DANGEROUS_COMMAND_PATTERNS.iter() {
                if pattern.is_match(part_trimmed) {
                    return Err(SafetyError::DangerousCommand {
                        reason: format!("{description} (in chain)"),
                    }
                    .into());
                }
            }
        }

        if BASE64_EXEC_PATTERN.is_match(&normalized) {
            return Err(SafetyError::DangerousCommand {
                reason: "base64-encoded command execution".to_string(),
            }
            .into());
        }

        if SUSPICIOUS_SUBSTITUTION_PATTERN.is_match(&normalized)
            && (normalized.contains("rm") || normalized.contains("dd") || normalized.contains("mkfs"))
        {
            return Err(SafetyError::DangerousCommand {
                reason: "suspicious variable substitution with destructive command".to_string(),
            }
            .into());
        }

        let system_paths = ["/etc/", "/boot/", "/usr/", "/var/", "/root/", "/sys/", "/proc/"];
        for sys_path in &system_paths {
            let rm_pattern = format!(r"rm\s+(-[a-z]+\s+)*{}", regex::escape(sys_path));
            let redirect_pattern = format!(r">\s*{}", regex::escape(sys_path));

            if Regex::new(&rm_pattern).map(|re| re.is_match(&normalized)).unwrap_or(false)
                || Regex::new(&redirect_pattern).map(|re| re.is_match(&normalized)).unwrap_or(false)
            {
                return Err(SafetyError::DangerousCommand {
                    reason: format!("command targeting system path {sys_path}"),
                }
                .into());
            }
        }

        Ok(())
    }
}

fn looks_like_path(arg: &str) -> bool {
    arg.starts_with('/') || arg.starts_with("./") || arg.starts_with("../")
}

static DANGEROUS_COMMAND_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"rm\s+(-[a-z]+\s+)*(/+|\*|/\*)").unwrap(), "rm -rf / (delete root filesystem)"),
        (Regex::new(r"\bmkfs(\.[a-z0-9]+)?\b").unwrap(), "mkfs (format filesystem)"),
        (Regex::new(r"\bdd\s+.*\b(if|of)=\s*/dev/(sd|hd|nvme|vd|xvd)").unwrap(), "dd to disk device (data destruction)"),
        (Regex::new(r":\s*\(\s*\)\s*\{.*:\s*\|.*:\s*&.*\}").unwrap(), "fork bomb"),
        (Regex::new(r">\s*/dev/(sd|hd|nvme|vd|xvd)").unwrap(), "redirect to disk device"),
        (Regex::new(r"chmod\s+(-[a-zA-Z]+\s+)*777\s+/+").unwrap(), "chmod 777 / (remove all file permissions)"),
        (Regex::new(r"chown\s+(-[a-zA-Z]+\s+)*\S+:\S+\s+/").unwrap(), "chown on system directory"),
        (Regex::new(r"chown\s+-[rR]").unwrap(), "recursive chown"),
        (Regex::new(r"(curl|wget)\s+[^|]*\|\s*(sh|bash|zsh|ksh|dash)").unwrap(), "pipe remote content to shell"),
        (Regex::new(r"wget\s+(-[a-z]+\s+)*-O\s*-[^|]*\|\s*(sh|bash)").unwrap(), "wget -O- | sh"),
        (Regex::new(r"curl\s+.*\|\s*(sh|bash|zsh)").unwrap(), "curl | sh"),
        (Regex::new(r#"(python|perl|ruby)\s+(-[a-z]+\s+)*-c\s*['"].*import\s+urllib"#).unwrap(), "remote code execution via scripting language"),
        (Regex::new(r"\bnc\s+.*-e\s+(/bin/)?(sh|bash)").unwrap(), "netcat reverse shell"),
        (Regex::new(r#"\beval\s+.*(\$\(|`|curl|wget|nc)"#).unwrap(), "eval with command substitution"),
    ]
});

static BASE64_EXEC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"base64\s+(-[a-z]+\s+)*(-d|--decode).*\|\s*(sh|bash|zsh|perl|python)"#).unwrap()
});

static SUSPICIOUS_SUBSTITUTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\$['"][^'"]*['"]|\$\{[^}]+\}|\$[a-zA-Z_][a-zA-Z0-9_]*"#).unwrap());

fn normalize_shell_command(cmd: &str) -> String {
    let mut result = cmd.split_whitespace().collect::<Vec<_>>().join(" ");

    while result.contains("//") {
        result = result.replace("//", "/");
    }

    result = result.replace("\\n", "").replace("\\t", " ");
    result = result.replace('`', "$(");
    result = result.replace("$(", " $( ");
    result = result.replace(')', " ) ");

    result = result.replace(" | ", "|");
    result = result.replace("| ", "|");
    result = result.replace(" |", "|");
    result = result.replace('|', " | ");

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_shell_commands(cmd: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut quote_char = b' ';
    let bytes = cmd.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];

        if (c == b'"' || c == b'\'') && (i == 0 || bytes[i - 1] != b'\\') {
            if !in_quotes {
                in_quotes = true;
                quote_char = c;
            } else if c == quote_char {
                in_quotes = false;
            }
        }

        if !in_quotes {
            if c == b';' {
                if start < i {
                    parts.push(&cmd[start..i]);
                }
                start = i + 1;
            } else if (c == b'&' || c == b'|') && i + 1 < bytes.len() && bytes[i + 1] == c {
                if start < i {
                    parts.push(&cmd[start..i]);
                }
                start = i + 2;
                i += 1;
            }
        }
        i += 1;
    }

    if start < cmd.len() {
        parts.push(&cmd[start..]);
    }

    parts
}
