//! Flattened text rendering of a repository.
//!
//! Layout:
//!
//! ```text
//! Repository: owner/repo
//! Files analyzed: 2
//!
//! Estimated tokens: 1.2k
//!
//! Directory structure:
//! └── repo/
//!     ├── src/
//!     │   └── main.rs
//!     └── README.md
//!
//! ================================================
//! FILE: README.md
//! ================================================
//! ...
//! ```

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt::Write;

use super::clone::RepoFile;

const SEPARATOR: &str = "================================================";

#[derive(Default)]
struct TreeNode {
    dirs: BTreeMap<String, TreeNode>,
    files: Vec<String>,
}

/// Render the full digest for `files`, labelled with `source` and rooted at `root_name`.
pub fn render_digest(source: &str, root_name: &str, files: &[RepoFile]) -> Result<String> {
    let tree = render_tree(root_name, files);
    let content = render_files(files);

    let tokens = crate::chunking::count_tokens(&tree)? + crate::chunking::count_tokens(&content)?;

    let mut out = String::new();
    writeln!(out, "Repository: {source}")?;
    writeln!(out, "Files analyzed: {}", files.len())?;
    writeln!(out)?;
    writeln!(out, "Estimated tokens: {}", format_token_count(tokens))?;
    writeln!(out)?;
    out.push_str(&tree);
    out.push('\n');
    out.push_str(&content);
    Ok(out)
}

/// Directory tree with directories listed before files at each level.
pub fn render_tree(root_name: &str, files: &[RepoFile]) -> String {
    let mut root = TreeNode::default();
    for file in files {
        let mut node = &mut root;
        let mut parts: Vec<&str> = file.relative_path.split('/').collect();
        let Some(file_name) = parts.pop() else {
            continue;
        };
        for dir in parts {
            node = node.dirs.entry(dir.to_string()).or_default();
        }
        node.files.push(file_name.to_string());
    }

    let mut out = String::from("Directory structure:\n");
    out.push_str(&format!("└── {root_name}/\n"));
    render_children(&root, "    ", &mut out);
    out
}

fn render_children(node: &TreeNode, prefix: &str, out: &mut String) {
    let mut files = node.files.clone();
    files.sort();

    let total = node.dirs.len() + files.len();
    let mut index = 0;

    for (name, child) in &node.dirs {
        index += 1;
        let last = index == total;
        let connector = if last { "└── " } else { "├── " };
        out.push_str(&format!("{prefix}{connector}{name}/\n"));
        let extension = if last { "    " } else { "│   " };
        render_children(child, &format!("{prefix}{extension}"), out);
    }

    for name in files {
        index += 1;
        let connector = if index == total { "└── " } else { "├── " };
        out.push_str(&format!("{prefix}{connector}{name}\n"));
    }
}

fn render_files(files: &[RepoFile]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str(SEPARATOR);
        out.push('\n');
        out.push_str("FILE: ");
        out.push_str(&file.relative_path);
        out.push('\n');
        out.push_str(SEPARATOR);
        out.push('\n');
        out.push_str(&file.content);
        if !file.content.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

fn format_token_count(tokens: usize) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}k", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}
