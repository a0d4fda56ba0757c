use anyhow::{Context, Result};
use git2::{DiffFormat, DiffOptions, Repository};
use std::path::Path;

/// Which changes to pull out of the repository.
#[derive(Debug, Clone)]
pub enum DiffMode {
    /// Index vs HEAD.
    Staged,
    /// Working tree vs index.
    Unstaged,
    /// Working tree and index vs HEAD.
    All,
    /// `base...head`: head vs the merge base of the two refs.
    Range { base: String, head: String },
}

pub struct GitDiffSource {
    repo: Repository,
}

impl GitDiffSource {
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::discover(path).context("Not in a git repository")?;
        Ok(Self { repo })
    }

    /// Raw unified-diff text for the requested mode.
    pub fn diff(&self, mode: &DiffMode, context_lines: u32) -> Result<String> {
        let mut options = DiffOptions::new();
        options.context_lines(context_lines);

        let diff = match mode {
            DiffMode::Staged => {
                let head_tree = self.repo.head()?.peel_to_tree()?;
                self.repo
                    .diff_tree_to_index(Some(&head_tree), None, Some(&mut options))?
            }
            DiffMode::Unstaged => self.repo.diff_index_to_workdir(None, Some(&mut options))?,
            DiffMode::All => {
                let head_tree = self.repo.head()?.peel_to_tree()?;
                self.repo
                    .diff_tree_to_workdir_with_index(Some(&head_tree), Some(&mut options))?
            }
            DiffMode::Range { base, head } => {
                let base_commit = self
                    .repo
                    .revparse_single(base)
                    .with_context(|| format!("Invalid git reference: {base}"))?
                    .peel_to_commit()?;
                let head_commit = self
                    .repo
                    .revparse_single(head)
                    .with_context(|| format!("Invalid git reference: {head}"))?
                    .peel_to_commit()?;

                let merge_base = self.repo.merge_base(base_commit.id(), head_commit.id())?;
                let base_tree = self.repo.find_commit(merge_base)?.tree()?;
                let head_tree = head_commit.tree()?;

                self.repo
                    .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut options))?
            }
        };

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            // Content lines lose their origin marker in the callback;
            // restore it so the parser sees standard unified-diff text.
            if matches!(line.origin(), '+' | '-' | ' ') {
                text.push(line.origin());
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;

        Ok(text)
    }
}
