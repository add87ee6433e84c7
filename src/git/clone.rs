use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

/// Files larger than this are left out of the digest.
const MAX_FILE_BYTES: u64 = 1_048_576;

/// A text file extracted from a repo
#[derive(Debug, Clone)]
pub struct RepoFile {
    pub relative_path: String,
    pub content: String,
}

/// Stop signal shared with a running clone.
#[derive(Debug, Clone, Default)]
pub struct CloneAbort(Arc<AtomicBool>);

impl CloneAbort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Shallow-clone a git repository into the target directory.
///
/// The transfer stops at the next progress report after `abort` is set.
pub fn clone_repo(
    url: &str,
    target: &Path,
    token: Option<&str>,
    abort: &CloneAbort,
) -> Result<()> {
    if abort.is_aborted() {
        anyhow::bail!("Clone of {url} was aborted");
    }
    tracing::info!("Cloning {} into {}", url, target.display());

    let mut callbacks = git2::RemoteCallbacks::new();
    let progress_abort = abort.clone();
    callbacks.transfer_progress(move |_| !progress_abort.is_aborted());
    if let Some(token) = token {
        let token = token.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            git2::Cred::userpass_plaintext("x-access-token", &token)
        });
    }

    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);
    fetch_options.depth(1);

    let cloned = git2::build::RepoBuilder::new()
        .fetch_options(fetch_options)
        .clone(url, target);
    if abort.is_aborted() {
        anyhow::bail!("Clone of {url} was aborted");
    }
    cloned.with_context(|| format!("Failed to clone {url}"))?;

    tracing::info!("Clone complete: {}", target.display());
    Ok(())
}

/// Walk all text files under `repo_dir`, sorted by path.
pub fn walk_repo_files(repo_dir: &Path) -> Vec<RepoFile> {
    let mut files = Vec::new();

    for entry in WalkDir::new(repo_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_ignored(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_binary_extension(path) {
            continue;
        }

        if let Ok(meta) = entry.metadata() {
            if meta.len() > MAX_FILE_BYTES {
                continue;
            }
        }

        let relative = path
            .strip_prefix(repo_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        // Non-UTF-8 files are skipped, as are UTF-8 files carrying NUL bytes
        match std::fs::read_to_string(path) {
            Ok(content) if !content.contains('\0') => files.push(RepoFile {
                relative_path: relative,
                content,
            }),
            _ => continue,
        }
    }

    files
}

fn is_hidden_or_ignored(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    if !entry.file_type().is_dir() {
        return false;
    }
    matches!(
        name.as_ref(),
        "node_modules"
            | "target"
            | "dist"
            | "build"
            | "__pycache__"
            | "vendor"
            | "venv"
            | "env"
            | "site-packages"
    )
}

fn is_binary_extension(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    matches!(
        ext.as_str(),
        "png" | "jpg"
            | "jpeg"
            | "gif"
            | "bmp"
            | "ico"
            | "webp"
            | "pdf"
            | "zip"
            | "gz"
            | "tar"
            | "tgz"
            | "xz"
            | "7z"
            | "jar"
            | "class"
            | "so"
            | "dll"
            | "dylib"
            | "exe"
            | "o"
            | "a"
            | "wasm"
            | "woff"
            | "woff2"
            | "ttf"
            | "otf"
            | "mp3"
            | "mp4"
            | "mov"
            | "pyc"
            | "bin"
            | "lock"
    )
}
