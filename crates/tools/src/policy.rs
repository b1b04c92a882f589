//! Guard rails for the tools that touch the host: which paths the file
//! tools may open and which commands `run_command` may start.

use std::path::{Component, Path, PathBuf};

/// Why a path or command was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("path '{path}' is outside the allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("path '{path}' falls under forbidden prefix '{prefix}'")]
    ForbiddenPath { path: String, prefix: String },

    #[error("path '{path}' contains a parent-directory component")]
    PathTraversal { path: String },

    #[error("Chained commands are not allowed. Run one command at a time.")]
    ChainedCommand,

    #[error("command '{command}' is not in the allowlist")]
    CommandNotAllowed { command: String },

    #[error("command is empty")]
    EmptyCommand,
}

/// Where the file tools may read and write.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    /// Empty means anywhere
    pub allowed_roots: Vec<String>,
    pub forbidden_paths: Vec<String>,
}

impl PathPolicy {
    pub fn new(allowed_roots: Vec<String>, forbidden_paths: Vec<String>) -> Self {
        Self {
            allowed_roots,
            forbidden_paths,
        }
    }

    /// Resolve `path` and check it against the policy.
    ///
    /// Existing paths are canonicalized so symlinks cannot escape a root; for
    /// a file that does not exist yet the parent is canonicalized instead.
    /// Returns the resolved path.
    pub fn check(&self, path: &str) -> Result<PathBuf, PolicyViolation> {
        let raw = Path::new(path);
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PolicyViolation::PathTraversal { path: path.into() });
        }

        let resolved = resolve(raw);
        let normalized = normalize(&resolved.to_string_lossy());

        if let Some(prefix) = self
            .forbidden_paths
            .iter()
            .find(|p| is_under(&normalized, &normalize(&expand_tilde(p))))
        {
            return Err(PolicyViolation::ForbiddenPath {
                path: path.into(),
                prefix: prefix.clone(),
            });
        }

        if !self.allowed_roots.is_empty()
            && !self
                .allowed_roots
                .iter()
                .any(|root| is_under(&normalized, &normalize(&expand_tilde(root))))
        {
            return Err(PolicyViolation::OutsideAllowedRoots { path: path.into() });
        }

        Ok(resolved)
    }
}

fn resolve(raw: &Path) -> PathBuf {
    if let Ok(canonical) = raw.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(file_name)) = (raw.parent(), raw.file_name())
        && let Ok(parent) = parent.canonicalize()
    {
        return parent.join(file_name);
    }
    raw.to_path_buf()
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/").to_lowercase();
    // canonicalize() on Windows adds the extended-length prefix
    let path = path.strip_prefix("//?/").unwrap_or(&path);
    path.trim_end_matches('/').to_string()
}

/// Prefix match on whole components, so `/etc` does not cover `/etcetera`.
fn is_under(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

fn expand_tilde(path: &str) -> String {
    if (path == "~" || path.starts_with("~/"))
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}

/// Which commands `run_command` may start.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    /// Base command names; empty allows any single command
    pub allowed_commands: Vec<String>,
}

/// Operators that would let one call run several commands.
const CHAIN_OPERATORS: &[&str] = &["&&", "||", ";", "|", "`", "$("];

impl CommandPolicy {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    pub fn check(&self, command: &str) -> Result<(), PolicyViolation> {
        let base = command.split_whitespace().next().ok_or(PolicyViolation::EmptyCommand)?;

        if CHAIN_OPERATORS.iter().any(|op| command.contains(op)) {
            return Err(PolicyViolation::ChainedCommand);
        }

        if !self.allowed_commands.is_empty() && !self.allowed_commands.iter().any(|a| a == base) {
            return Err(PolicyViolation::CommandNotAllowed {
                command: base.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_policy_allows_plain_paths() {
        let policy = PathPolicy::default();
        assert!(policy.check("/home/user/project/file.txt").is_ok());
    }

    #[test]
    fn parent_components_blocked() {
        let policy = PathPolicy::default();
        assert!(matches!(
            policy.check("../../../etc/passwd"),
            Err(PolicyViolation::PathTraversal { .. })
        ));
        assert!(policy.check("/home/user/../../etc/passwd").is_err());
    }

    #[test]
    fn forbidden_prefix_blocked() {
        let policy = PathPolicy::new(vec![], vec!["/etc".into()]);
        match policy.check("/etc/passwd") {
            Err(PolicyViolation::ForbiddenPath { prefix, .. }) => assert_eq!(prefix, "/etc"),
            other => panic!("expected ForbiddenPath, got {other:?}"),
        }
        // Component-wise match only
        assert!(policy.check("/etcetera/notes.txt").is_ok());
    }

    #[test]
    fn allowed_roots_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let policy = PathPolicy::new(vec![root.to_string_lossy().to_string()], vec![]);

        let inside = root.join("site.yml");
        assert!(policy.check(&inside.to_string_lossy()).is_ok());
        assert!(matches!(
            policy.check("/definitely/elsewhere.txt"),
            Err(PolicyViolation::OutsideAllowedRoots { .. })
        ));
    }

    #[test]
    fn forbidden_wins_over_allowed() {
        let policy = PathPolicy::new(vec!["/home/user".into()], vec!["/home/user/.ssh".into()]);
        assert!(policy.check("/home/user/.ssh/id_rsa").is_err());
    }

    #[test]
    fn tilde_prefixes_expand() {
        let policy = PathPolicy::new(vec![], vec!["~/.ssh".into()]);
        if let Some(home) = home_dir() {
            assert!(policy.check(&format!("{home}/.ssh/id_rsa")).is_err());
        }
    }

    #[test]
    fn chained_commands_rejected() {
        let policy = CommandPolicy::default();
        for cmd in [
            "apt update && apt upgrade",
            "false || true",
            "ls; rm -rf /",
            "cat /etc/passwd | grep root",
            "echo `whoami`",
            "echo $(whoami)",
        ] {
            assert_eq!(policy.check(cmd), Err(PolicyViolation::ChainedCommand), "{cmd}");
        }
        assert!(policy.check("systemctl status nginx").is_ok());
    }

    #[test]
    fn allowlist_matches_base_command() {
        let policy = CommandPolicy::new(vec!["ls".into(), "systemctl".into()]);
        assert!(policy.check("ls -la /var/log").is_ok());
        assert!(policy.check("systemctl restart nginx").is_ok());
        assert_eq!(
            policy.check("rm -rf /tmp/x"),
            Err(PolicyViolation::CommandNotAllowed { command: "rm".into() })
        );
    }

    #[test]
    fn empty_command_rejected() {
        assert_eq!(CommandPolicy::default().check("   "), Err(PolicyViolation::EmptyCommand));
    }
}
