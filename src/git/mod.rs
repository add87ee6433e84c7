//! Repository fetching: resolve a source, clone it, and flatten it into one
//! text document.

pub mod clone;
pub mod digest;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;

pub use clone::{clone_repo, walk_repo_files, CloneAbort, RepoFile};

/// Retrieves a repository and writes its flattened text to `output`.
#[async_trait]
pub trait RepoFetcher: Send + Sync {
    async fn ingest(&self, repo_url: &str, output: &Path) -> Result<()>;
}

/// Where a repository comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    Remote { url: String, name: String },
    Local(PathBuf),
}

impl RepoSource {
    pub fn name(&self) -> String {
        match self {
            RepoSource::Remote { name, .. } => name.clone(),
            RepoSource::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "repo".to_string()),
        }
    }
}

/// Interpret user input as a clone URL, an `owner/repo` GitHub slug, or
/// (when allowed) a local directory.
pub fn resolve_source(input: &str, allow_local: bool) -> Result<RepoSource> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("Repository URL is required");
    }

    if input.starts_with("https://") || input.starts_with("http://") || input.starts_with("git://")
    {
        let url = input.trim_end_matches('/').to_string();
        let name = url
            .rsplit('/')
            .next()
            .unwrap_or("repo")
            .trim_end_matches(".git")
            .to_string();
        if name.is_empty() || url.split("://").nth(1).map_or(true, |rest| !rest.contains('/')) {
            anyhow::bail!("Invalid repository URL: {input}");
        }
        return Ok(RepoSource::Remote { url, name });
    }

    if allow_local {
        let path = Path::new(input);
        if path.is_dir() {
            return Ok(RepoSource::Local(path.to_path_buf()));
        }
    }

    if is_github_slug(input) {
        let name = input
            .rsplit('/')
            .next()
            .unwrap_or("repo")
            .trim_end_matches(".git")
            .to_string();
        return Ok(RepoSource::Remote {
            url: format!("https://github.com/{input}"),
            name,
        });
    }

    anyhow::bail!("Invalid repository source: {input}")
}

fn is_github_slug(input: &str) -> bool {
    let mut parts = input.split('/');
    let (Some(owner), Some(repo), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let valid = |s: &str| {
        !s.is_empty()
            && !s.starts_with('.')
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    valid(owner) && valid(repo)
}

/// Fetcher backed by libgit2 shallow clones.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    allow_local_paths: bool,
    clone_timeout: Duration,
    git_token: Option<String>,
}

impl GitFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            allow_local_paths: config.allow_local_paths,
            clone_timeout: Duration::from_secs(config.clone_timeout_secs),
            git_token: config.git_token.clone(),
        }
    }

    async fn flatten(&self, source: &RepoSource, label: &str) -> Result<String> {
        let root_name = source.name();
        match source {
            RepoSource::Local(dir) => {
                let dir = dir.clone();
                let label = label.to_string();
                tokio::task::spawn_blocking(move || {
                    let files = walk_repo_files(&dir);
                    flatten_files(&label, &root_name, &files)
                })
                .await?
            }
            RepoSource::Remote { url, .. } => {
                let scratch = tempfile::tempdir().context("Failed to create clone directory")?;
                let target = scratch.path().join(&root_name);

                let abort = CloneAbort::new();
                let url_owned = url.clone();
                let token = self.git_token.clone();
                let clone_abort = abort.clone();
                // The clone thread owns the scratch directory until it returns
                let clone_task = tokio::task::spawn_blocking(move || {
                    clone_repo(&url_owned, &target, token.as_deref(), &clone_abort)
                        .map(|()| (scratch, target))
                });

                let cloned = tokio::time::timeout(self.clone_timeout, clone_task).await;
                let (scratch, target) = match cloned {
                    Ok(Ok(Ok(cloned))) => cloned,
                    Ok(Ok(Err(e))) => return Err(e),
                    Ok(Err(e)) => anyhow::bail!("Clone task failed: {e}"),
                    Err(_) => {
                        abort.abort();
                        anyhow::bail!(
                            "Clone of {url} timed out after {}s",
                            self.clone_timeout.as_secs()
                        )
                    }
                };

                let label = label.to_string();
                tokio::task::spawn_blocking(move || {
                    // Keep the scratch directory alive until the walk is done
                    let _scratch = scratch;
                    let files = walk_repo_files(&target);
                    flatten_files(&label, &root_name, &files)
                })
                .await?
            }
        }
    }
}

fn flatten_files(label: &str, root_name: &str, files: &[RepoFile]) -> Result<String> {
    if files.is_empty() {
        anyhow::bail!("Repository {label} has no readable text files");
    }
    tracing::info!("Flattening {} files from {label}", files.len());
    digest::render_digest(label, root_name, files)
}

#[async_trait]
impl RepoFetcher for GitFetcher {
    async fn ingest(&self, repo_url: &str, output: &Path) -> Result<()> {
        let source = resolve_source(repo_url, self.allow_local_paths)?;
        let label = match &source {
            RepoSource::Remote { url, .. } => url
                .split("://")
                .nth(1)
                .and_then(|rest| rest.split_once('/'))
                .map(|(_, path)| path.trim_end_matches(".git").to_string())
                .unwrap_or_else(|| url.clone()),
            RepoSource::Local(path) => path.display().to_string(),
        };

        let text = self.flatten(&source, &label).await?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(output, text)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;

        tracing::info!("Wrote flattened {label} to {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_https_url() {
        let source = resolve_source("https://github.com/owner/demo.git", false).unwrap();
        assert_eq!(
            source,
            RepoSource::Remote {
                url: "https://github.com/owner/demo.git".to_string(),
                name: "demo".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_trailing_slash() {
        let source = resolve_source("https://example.com/repo/", false).unwrap();
        assert_eq!(source.name(), "repo");
    }

    #[test]
    fn test_resolve_host_only_url_rejected() {
        assert!(resolve_source("https://example.com", false).is_err());
    }

    #[test]
    fn test_resolve_slug_expands_to_github() {
        let source = resolve_source("rust-lang/cargo", false).unwrap();
        assert_eq!(
            source,
            RepoSource::Remote {
                url: "https://github.com/rust-lang/cargo".to_string(),
                name: "cargo".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        assert!(resolve_source("", false).is_err());
        assert!(resolve_source("   ", false).is_err());
        assert!(resolve_source("file:///etc/passwd", false).is_err());
        assert!(resolve_source("not a repo", false).is_err());
        assert!(resolve_source("a/b/c", false).is_err());
    }

    #[test]
    fn test_local_paths_need_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        assert!(resolve_source(&path, false).is_err());
        assert_eq!(
            resolve_source(&path, true).unwrap(),
            RepoSource::Local(dir.path().to_path_buf())
        );
    }

    #[tokio::test]
    async fn test_ingest_local_directory_writes_digest() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo.path().join("src")).unwrap();
        std::fs::write(repo.path().join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("nested/downloaded.md");

        let fetcher = GitFetcher::new(&Config {
            allow_local_paths: true,
            ..Config::default()
        });
        fetcher
            .ingest(&repo.path().to_string_lossy(), &output)
            .await
            .unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("Files analyzed: 1"));
        assert!(text.contains("FILE: src/lib.rs"));
        assert!(text.contains("pub fn answer()"));
    }

    #[tokio::test]
    async fn test_ingest_empty_directory_fails() {
        let repo = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("downloaded.md");

        let fetcher = GitFetcher::new(&Config {
            allow_local_paths: true,
            ..Config::default()
        });
        let result = fetcher.ingest(&repo.path().to_string_lossy(), &output).await;
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_clone_timeout_is_reported() {
        // Accepts one connection and never answers, then goes away
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                std::thread::sleep(Duration::from_secs(3));
                drop(stream);
            }
        });

        let fetcher = GitFetcher::new(&Config {
            clone_timeout_secs: 1,
            ..Config::default()
        });
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("downloaded.md");

        let started = std::time::Instant::now();
        let err = fetcher
            .ingest(&format!("http://127.0.0.1:{port}/owner/repo.git"), &output)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out after 1s"));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!output.exists());
    }
}
