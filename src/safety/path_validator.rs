//! Shared path validation for the filesystem and shell tools.
//!
//! Generalized away from a config struct: callers pass the workspace root
//! plus whatever allow/deny glob lists apply to the calling tool, since
//! different tools (file I/O vs. the shell) have different allowances.

use crate::errors::{Result, SafetyError};
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct PathValidator {
    workspace_root: PathBuf,
    allowed_paths: Vec<String>,
    denied_paths: Vec<String>,
}

impl PathValidator {
    pub fn new(workspace_root: PathBuf, allowed_paths: Vec<String>, denied_paths: Vec<String>) -> Self {
        Self { workspace_root, allowed_paths, denied_paths }
    }

    /// Canonicalize and check a file path for safety.
    pub fn validate(&self, path: &str) -> Result<()> {
        let path_buf = Path::new(path);
        let resolved = if path_buf.is_absolute() {
            path_buf.to_path_buf()
        } else {
            self.workspace_root.join(path_buf)
        };

        if resolved.exists() {
            self.check_symlink_safety(&resolved)?;
        } else if let Some(parent) = resolved.parent() {
            if parent.exists() {
                self.check_symlink_safety(parent)?;
            }
        }

        let canonical = resolved
            .canonicalize()
            .unwrap_or_else(|_| normalize_path(&resolved));
        let canonical_str = strip_unc_prefix(&canonical.to_string_lossy());

        if path.contains("..") {
            let workspace_canonical = self
                .workspace_root
                .canonicalize()
                .unwrap_or_else(|_| self.workspace_root.clone());

            let is_within_workspace = canonical.starts_with(&workspace_canonical);
            let is_explicitly_allowed = self.is_path_in_allowed_list(&canonical_str);

            if !is_within_workspace && !is_explicitly_allowed {
                return Err(SafetyError::PathEscape { path: path.to_string() }.into());
            }
        }

        for pattern in &self.denied_paths {
            let Ok(glob_pattern) = glob::Pattern::new(pattern) else { continue };

            if glob_pattern.matches(&canonical_str) || glob_pattern.matches(path) {
                return Err(SafetyError::PathEscape { path: path.to_string() }.into());
            }

            for component in canonical.components() {
                if let std::path::Component::Normal(name) = component {
                    let name_str = name.to_string_lossy();
                    if !pattern.contains('/') && !pattern.contains('\\') && glob_pattern.matches(&name_str) {
                        return Err(SafetyError::PathEscape { path: path.to_string() }.into());
                    }
                }
            }
        }

        if !self.allowed_paths.is_empty() && !self.is_path_in_allowed_list(&canonical_str) {
            return Err(SafetyError::PathEscape { path: path.to_string() }.into());
        }

        Ok(())
    }

    /// Check the canonical path only — never the original — so
    /// `/allowed/../../../etc/passwd` cannot masquerade as `/allowed/**`.
    pub fn is_path_in_allowed_list(&self, canonical_str: &str) -> bool {
        let workspace_canonical = strip_unc_prefix(
            &self
                .workspace_root
                .canonicalize()
                .unwrap_or_else(|_| self.workspace_root.clone())
                .to_string_lossy(),
        );

        for pattern in &self.allowed_paths {
            let expanded_pattern = if pattern.starts_with("./") || pattern == "." {
                let suffix = pattern.strip_prefix("./").unwrap_or("");
                format!("{workspace_canonical}/{suffix}")
            } else {
                pattern.clone()
            };

            let matches = glob::Pattern::new(&expanded_pattern)
                .map(|p| p.matches(canonical_str))
                .unwrap_or(false)
                || glob::Pattern::new(pattern)
                    .map(|p| p.matches(canonical_str))
                    .unwrap_or(false);
            if matches {
                return true;
            }

            if pattern == "./**" && canonical_str.starts_with(&workspace_canonical) {
                return true;
            }
        }
        false
    }

    /// Check for symlink-based attacks.
    pub fn check_symlink_safety(&self, path: &Path) -> Result<()> {
        let mut current = path.to_path_buf();
        let mut visited = std::collections::HashSet::new();
        let max_depth = 40; // Linux default MAXSYMLINKS

        for _ in 0..max_depth {
            if !current.is_symlink() {
                break;
            }

            let current_str = current.to_string_lossy().to_string();
            if visited.contains(&current_str) {
                return Err(SafetyError::SecurityViolation(format!(
                    "symlink loop detected: {}",
                    path.display()
                ))
                .into());
            }
            visited.insert(current_str);

            let target = std::fs::read_link(&current).map_err(|e| {
                SafetyError::SecurityViolation(format!("cannot read symlink {}: {e}", current.display()))
            })?;
            let resolved_target = if target.is_absolute() {
                target
            } else {
                current.parent().unwrap_or(Path::new("/")).join(&target)
            };

            let target_str = resolved_target.to_string_lossy();
            let dangerous_targets = ["/etc/passwd", "/etc/shadow", "/etc/sudoers", "/root/", "/proc/", "/sys/"];
            for dangerous in &dangerous_targets {
                if target_str.starts_with(dangerous) {
                    return Err(SafetyError::SecurityViolation(format!(
                        "symlink points to protected system path: {} -> {target_str}",
                        path.display()
                    ))
                    .into());
                }
            }

            current = resolved_target;
        }

        if visited.len() >= max_depth {
            return Err(SafetyError::SecurityViolation(format!(
                "symlink chain too deep (possible attack): {}",
                path.display()
            ))
            .into());
        }

        Ok(())
    }
}

fn strip_unc_prefix(path: &str) -> String {
    if cfg!(target_os = "windows") {
        path.strip_prefix(r"\\?\").unwrap_or(path).to_string()
    } else {
        path.to_string()
    }
}

/// Normalize a path by resolving `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                if !components.is_empty() {
                    components.pop();
                }
            }
            std::path::Component::CurDir => {}
            c => components.push(c),
        }
    }

    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(allowed: &[&str], denied: &[&str]) -> PathValidator {
        PathValidator::new(
            std::env::current_dir().unwrap(),
            allowed.iter().map(|s| s.to_string()).collect(),
            denied.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn allows_path_within_allowed_glob() {
        let v = validator(&["./**"], &[]);
        assert!(v.validate("./Cargo.toml").is_ok());
    }

    #[test]
    fn blocks_path_outside_allowed_glob() {
        let v = validator(&["./safe/**"], &[]);
        assert!(v.validate("/etc/passwd").is_err());
    }

    #[test]
    fn blocks_denied_pattern() {
        let v = validator(&["./**"], &["**/.env"]);
        assert!(v.validate("./.env").is_err());
    }

    #[test]
    fn empty_allow_list_allows_anything() {
        let v = validator(&[], &[]);
        assert!(v.validate("/any/path/at/all.txt").is_ok());
    }

    #[test]
    fn normalize_path_resolves_parent_dirs() {
        let normalized = normalize_path(Path::new("/a/b/../c/./d"));
        assert!(!normalized.to_string_lossy().contains(".."));
    }
}
