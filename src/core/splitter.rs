/// File-boundary-aligned strategies for diffs too large for one request.
/// Both raw git diffs (`diff --git` headers) and the formatted review text
/// (`File:` headers) are supported; a file's lines are never split across a
/// boundary decision.
pub struct DiffSplitter;

#[derive(Debug)]
pub struct TruncatedDiff {
    pub text: String,
    /// Header lines of the files dropped to fit the budget.
    pub skipped_files: Vec<String>,
}

fn is_file_boundary(line: &str) -> bool {
    line.starts_with("diff --git") || line.starts_with("File:")
}

impl DiffSplitter {
    /// Keep leading whole files up to `max_chars`. The file that overflows
    /// the budget is rolled back entirely and recorded as skipped; files
    /// after the truncation point are not attempted.
    pub fn truncate(diff_text: &str, max_chars: usize) -> TruncatedDiff {
        let mut kept: Vec<&str> = Vec::new();
        let mut kept_chars = 0usize;
        let mut current_file_start = 0usize;
        let mut current_header: Option<&str> = None;
        let mut skipped_files = Vec::new();

        for line in diff_text.lines() {
            if is_file_boundary(line) {
                current_file_start = kept.len();
                current_header = Some(line);
            }

            let cost = line.chars().count() + 1;
            if kept_chars + cost > max_chars {
                kept.truncate(current_file_start);
                if let Some(header) = current_header {
                    skipped_files.push(header.to_string());
                }
                break;
            }

            kept.push(line);
            kept_chars += cost;
        }

        TruncatedDiff {
            text: kept.join("\n"),
            skipped_files,
        }
    }

    /// Group whole files into ordered chunks of at most `max_chars_per_chunk`
    /// characters. A file larger than the budget is placed whole into its own
    /// chunk rather than split internally. Input without file boundaries is
    /// returned as a single chunk.
    pub fn chunk(diff_text: &str, max_chars_per_chunk: usize) -> Vec<String> {
        let blocks = Self::file_blocks(diff_text);
        if blocks.len() <= 1 {
            return if diff_text.is_empty() {
                Vec::new()
            } else {
                vec![diff_text.to_string()]
            };
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for block in blocks {
            let block_cost = block.chars().count();
            let current_cost = current.chars().count();

            if !current.is_empty() && current_cost + block_cost > max_chars_per_chunk {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(&block);
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// Split into per-file blocks; any preamble before the first boundary
    /// stays attached to the front of the first block.
    fn file_blocks(diff_text: &str) -> Vec<String> {
        let mut blocks: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut seen_boundary = false;

        for line in diff_text.lines() {
            if is_file_boundary(line) {
                if seen_boundary && !current.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }
                seen_boundary = true;
            }
            current.push_str(line);
            current.push('\n');
        }

        if !current.is_empty() {
            blocks.push(current);
        }

        if !seen_boundary {
            // No recognizable file structure: treat everything as one block.
            return blocks.into_iter().take(1).collect();
        }

        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_diff() -> String {
        let mut text = String::new();
        for name in ["one", "two", "three"] {
            text.push_str(&format!(
                "diff --git a/{name}.py b/{name}.py\n+++ b/{name}.py\n@@ -1,1 +1,1 @@\n-old {name}\n+new {name}\n"
            ));
        }
        text
    }

    #[test]
    fn truncate_keeps_leading_whole_files() {
        let diff = sample_diff();
        // Enough for the first file (~70 chars) but not the second.
        let truncated = DiffSplitter::truncate(&diff, 90);

        assert!(truncated.text.contains("one.py"));
        assert!(!truncated.text.contains("two.py"));
        assert_eq!(truncated.skipped_files.len(), 1);
        assert!(truncated.skipped_files[0].contains("two.py"));
    }

    #[test]
    fn truncate_rolls_back_partial_file() {
        let diff = sample_diff();
        // Budget lands mid-way through file one: everything rolls back.
        let truncated = DiffSplitter::truncate(&diff, 40);
        assert!(truncated.text.is_empty());
        assert_eq!(truncated.skipped_files.len(), 1);
        assert!(truncated.skipped_files[0].contains("one.py"));
    }

    #[test]
    fn truncate_within_budget_keeps_everything() {
        let diff = sample_diff();
        let truncated = DiffSplitter::truncate(&diff, 10_000);
        assert!(truncated.skipped_files.is_empty());
        assert!(truncated.text.contains("three.py"));
    }

    #[test]
    fn chunk_never_splits_a_file() {
        let diff = sample_diff();
        let chunks = DiffSplitter::chunk(&diff, 90);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // Each file's removal and addition stay together.
            for name in ["one", "two", "three"] {
                assert_eq!(
                    chunk.contains(&format!("-old {name}")),
                    chunk.contains(&format!("+new {name}"))
                );
            }
        }
    }

    #[test]
    fn chunk_concatenation_preserves_file_order() {
        let diff = sample_diff();
        let chunks = DiffSplitter::chunk(&diff, 90);
        let rejoined: String = chunks.concat();
        assert_eq!(rejoined, diff);
    }

    #[test]
    fn oversized_file_gets_its_own_chunk() {
        let mut diff = sample_diff();
        diff.push_str("diff --git a/huge.py b/huge.py\n");
        for i in 0..50 {
            diff.push_str(&format!("+line number {i}\n"));
        }
        let chunks = DiffSplitter::chunk(&diff, 90);

        let huge_chunk = chunks
            .iter()
            .find(|c| c.contains("huge.py"))
            .expect("huge file must land in some chunk");
        assert!(huge_chunk.contains("+line number 49"));
        assert!(huge_chunk.chars().count() > 90);
    }

    #[test]
    fn input_without_boundaries_is_one_chunk() {
        let text = "just some text\nwith no file headers\n";
        let chunks = DiffSplitter::chunk(text, 5);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn formatted_review_headers_are_boundaries() {
        let text = "File: a.py (modified)\n+ 1: x\n\nFile: b.py (added)\n+ 1: y\n";
        let chunks = DiffSplitter::chunk(text, 25);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("File: a.py"));
        assert!(chunks[1].starts_with("File: b.py"));
    }
}
