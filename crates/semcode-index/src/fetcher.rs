//! Materializes repositories on disk.
//!
//! Remote sources are cloned under the workspace root (`repos_dir/<name>`) and
//! fast-forwarded on later calls. Local sources are used in place and never
//! copied, modified or deleted.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{FetchError, Result};

/// Stderr fragments git prints when credentials are missing or refused.
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "authentication failed",
    "could not read username",
    "could not read password",
    "permission denied",
    "http basic: access denied",
    "the requested url returned error: 401",
    "the requested url returned error: 403",
    "terminal prompts disabled",
];

#[derive(Clone)]
pub struct FetcherConfig {
    pub repos_dir: PathBuf,
    /// Bearer token sent to remotes. Never persisted into `.git/config`.
    pub token: Option<String>,
    pub timeout: Duration,
    pub shallow: bool,
}

impl std::fmt::Debug for FetcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherConfig")
            .field("repos_dir", &self.repos_dir)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("shallow", &self.shallow)
            .finish()
    }
}

/// A repository checkout the rest of the pipeline can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingTree {
    pub root: PathBuf,
    /// True when the directory lives under the workspace root and may be deleted.
    pub owned: bool,
}

#[derive(Debug, Clone)]
pub struct SourceFetcher {
    config: FetcherConfig,
}

impl SourceFetcher {
    #[must_use]
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    /// The workspace-owned tree a remote repository called `name` lives in.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidName`] for names that could escape the root.
    pub fn owned_tree(&self, name: &str) -> Result<WorkingTree> {
        validate_name(name)?;
        Ok(WorkingTree {
            root: self.config.repos_dir.join(name),
            owned: true,
        })
    }

    /// Make `source` available on disk as a working tree for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the name is invalid, the local path is
    /// missing, or git cannot clone or fast-forward the remote.
    pub async fn materialize(
        &self,
        source: &str,
        name: &str,
        is_remote: bool,
    ) -> Result<WorkingTree> {
        validate_name(name)?;
        if is_remote {
            self.fetch_remote(source, name).await
        } else {
            let root = resolve_local(source).await?;
            tracing::debug!(repo = name, path = %root.display(), "using local source in place");
            Ok(WorkingTree { root, owned: false })
        }
    }

    /// Delete an owned working tree. Local trees are left alone.
    ///
    /// Returns whether a directory was removed; an already-absent directory is `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree lies outside the workspace root or cannot be removed.
    pub async fn remove(&self, tree: &WorkingTree) -> Result<bool> {
        if !tree.owned {
            return Ok(false);
        }
        if !self.is_inside_workspace(&tree.root) {
            return Err(FetchError::OutsideWorkspace(tree.root.clone()));
        }
        match tokio::fs::remove_dir_all(&tree.root).await {
            Ok(()) => {
                tracing::info!(path = %tree.root.display(), "removed working tree");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FetchError::Io(e)),
        }
    }

    fn is_inside_workspace(&self, path: &Path) -> bool {
        path.parent() == Some(self.config.repos_dir.as_path())
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| validate_name(n).is_ok())
    }

    async fn fetch_remote(&self, url: &str, name: &str) -> Result<WorkingTree> {
        if url.trim().is_empty() || url.chars().any(char::is_whitespace) {
            return Err(FetchError::Unreachable(format!("invalid remote URL '{url}'")));
        }
        let tree = self.owned_tree(name)?;

        if tokio::fs::try_exists(tree.root.join(".git")).await? {
            tracing::info!(repo = name, "updating existing clone");
            self.run_git(vec![
                "-C".into(),
                tree.root.clone().into_os_string(),
                "pull".into(),
                "--ff-only".into(),
                "--quiet".into(),
            ])
            .await?;
            return Ok(tree);
        }
        if tokio::fs::try_exists(&tree.root).await? {
            return Err(FetchError::NotACheckout(tree.root));
        }

        tokio::fs::create_dir_all(&self.config.repos_dir).await?;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        // Leading dot: never a valid repository name, so it cannot collide.
        let tmp_dir = self
            .config
            .repos_dir
            .join(format!(".tmp-{name}-{}-{nanos}", std::process::id()));

        tracing::info!(repo = name, "cloning");
        let mut args: Vec<OsString> = vec!["clone".into(), "--quiet".into()];
        if self.config.shallow {
            args.push("--depth=1".into());
        }
        args.push("--".into());
        args.push(url.into());
        args.push(tmp_dir.clone().into_os_string());

        if let Err(e) = self.run_git(args).await {
            discard(&tmp_dir).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&tmp_dir, &tree.root).await {
            discard(&tmp_dir).await;
            return Err(FetchError::Io(e));
        }
        Ok(tree)
    }

    async fn run_git(&self, args: Vec<OsString>) -> Result<()> {
        let mut cmd = Command::new("git");
        if let Some(token) = &self.config.token {
            cmd.arg("-c")
                .arg(format!("http.extraHeader=Authorization: Bearer {token}"));
        }
        cmd.args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.config.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::GitUnavailable(e.to_string()));
            }
            Ok(Err(e)) => return Err(FetchError::Io(e)),
            Err(_) => return Err(FetchError::Timeout(self.config.timeout.as_secs())),
        };

        if output.status.success() {
            return Ok(());
        }
        let stderr = self.redact(String::from_utf8_lossy(&output.stderr).trim());
        tracing::warn!(
            code = output.status.code().unwrap_or(-1),
            stderr = %stderr,
            "git command failed"
        );
        Err(classify_git_failure(stderr))
    }

    fn redact(&self, text: &str) -> String {
        match &self.config.token {
            Some(token) if !token.is_empty() => text.replace(token.as_str(), "[REDACTED]"),
            _ => text.to_owned(),
        }
    }
}

fn classify_git_failure(stderr: String) -> FetchError {
    let lower = stderr.to_ascii_lowercase();
    if AUTH_FAILURE_MARKERS.iter().any(|m| lower.contains(m)) {
        FetchError::AuthRejected(stderr)
    } else {
        FetchError::Unreachable(stderr)
    }
}

async fn discard(tmp_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(tmp_dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %tmp_dir.display(), "failed to discard temporary clone: {e}");
    }
}

async fn resolve_local(source: &str) -> Result<PathBuf> {
    let path = PathBuf::from(source);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => Ok(tokio::fs::canonicalize(&path).await?),
        _ => Err(FetchError::LocalPathMissing(path)),
    }
}

/// Reject names that are empty or could address anything but a direct child
/// of the workspace root.
///
/// # Errors
///
/// Returns [`FetchError::InvalidName`] describing the offending name.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.len() > 255
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains("..")
        || name.chars().any(char::is_control)
        || name.trim() != name;
    if invalid {
        Err(FetchError::InvalidName(name.to_owned()))
    } else {
        Ok(())
    }
}

/// Default repository name for a source: the final URL segment without
/// `.git`, or the local directory's name.
#[must_use]
pub fn derive_name(source: &str, is_remote: bool) -> Option<String> {
    let trimmed = source.trim().trim_end_matches(['/', '\\']);
    let last = if is_remote {
        trimmed.rsplit(['/', ':']).next()?
    } else {
        Path::new(trimmed).file_name()?.to_str()?
    };
    let name = last.strip_suffix(".git").unwrap_or(last);
    validate_name(name).ok().map(|()| name.to_owned())
}
