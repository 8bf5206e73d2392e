//! Greedy token-budgeted packing of file entries into chunk groups.
//!
//! Packing is greedy and never reorders input: files are appended to the
//! open buffer while the accumulated token count stays within the budget,
//! and a file that exactly fills the buffer closes it. A file whose own
//! token count exceeds the budget is split into labeled `Part (m/n)`
//! fragments, each flushed as its own group so fragments are never merged
//! with unrelated files.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::source::FileEntry;
use crate::tokenizer::TokenCounter;
use crate::types::PipelineError;

/// A bounded-size unit of source text belonging to one folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub folder: String,
    /// Position of this chunk within its folder, in document order.
    pub sequence_index: usize,
    pub content: String,
    /// Accumulated token count of the constituent entries.
    pub token_count: usize,
}

/// Ordered chunk list for one folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderChunks {
    pub folder: String,
    pub chunks: Vec<Chunk>,
}

impl FolderChunks {
    /// Sum of the token counts of every chunk in the folder.
    pub fn total_tokens(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.token_count).sum()
    }
}

/// Packs grouped file entries into token-bounded chunk groups.
///
/// Every produced chunk's `token_count` is at most `max_tokens_per_group`;
/// files that individually exceed the budget are pre-split into parts that
/// each respect it. A file that cannot be tokenized or split is skipped
/// with a warning rather than aborting its folder.
pub fn aggregate_by_token(
    grouped: &[(String, Vec<FileEntry>)],
    counter: &dyn TokenCounter,
    max_tokens_per_group: usize,
) -> Result<Vec<FolderChunks>, PipelineError> {
    if max_tokens_per_group == 0 {
        return Err(PipelineError::Configuration(
            "max_tokens_per_group must be greater than zero".into(),
        ));
    }

    let mut out = Vec::with_capacity(grouped.len());
    for (folder, files) in grouped {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut buffer = String::new();
        let mut buffer_tokens = 0usize;

        for file in files {
            let text = file.entry_text();
            let tokens = match counter.count(&text) {
                Ok(tokens) => tokens,
                Err(err) => {
                    warn!(path = %file.path, error = %err, "skipping file that cannot be tokenized");
                    continue;
                }
            };

            if tokens > max_tokens_per_group {
                // Fragments of one file never share a group with other files.
                flush(folder, &mut buffer, &mut buffer_tokens, &mut chunks);
                match split_oversized(file, counter, max_tokens_per_group) {
                    Ok(parts) => {
                        for (content, token_count) in parts {
                            chunks.push(Chunk {
                                folder: folder.clone(),
                                sequence_index: chunks.len(),
                                content,
                                token_count,
                            });
                        }
                    }
                    Err(err) => {
                        warn!(path = %file.path, error = %err, "skipping file that cannot be split");
                    }
                }
                continue;
            }

            if buffer_tokens + tokens > max_tokens_per_group {
                flush(folder, &mut buffer, &mut buffer_tokens, &mut chunks);
            }
            buffer.push_str(&text);
            buffer_tokens += tokens;
            if buffer_tokens == max_tokens_per_group {
                flush(folder, &mut buffer, &mut buffer_tokens, &mut chunks);
            }
        }

        flush(folder, &mut buffer, &mut buffer_tokens, &mut chunks);
        if !chunks.is_empty() {
            out.push(FolderChunks {
                folder: folder.clone(),
                chunks,
            });
        }
    }
    Ok(out)
}

fn flush(folder: &str, buffer: &mut String, buffer_tokens: &mut usize, chunks: &mut Vec<Chunk>) {
    if buffer.is_empty() {
        return;
    }
    chunks.push(Chunk {
        folder: folder.to_string(),
        sequence_index: chunks.len(),
        content: std::mem::take(buffer),
        token_count: *buffer_tokens,
    });
    *buffer_tokens = 0;
}

/// Splits an oversized file into `n` ordered parts, each within the budget
/// once its `Part (m/n)` marker line is accounted for. `n` starts at the
/// smallest plausible count and grows until every part fits.
fn split_oversized(
    file: &FileEntry,
    counter: &dyn TokenCounter,
    max_tokens_per_group: usize,
) -> Result<Vec<(String, usize)>, PipelineError> {
    let total = counter.count(&file.entry_text())?;
    let char_count = file.content.chars().count().max(1);
    let mut parts_wanted = total.div_ceil(max_tokens_per_group).max(2);

    loop {
        if parts_wanted > char_count {
            return Err(PipelineError::Aggregation(format!(
                "file '{}' ({total} tokens) cannot be split into parts within a \
                 {max_tokens_per_group}-token budget",
                file.path
            )));
        }

        let spans = split_into_char_spans(&file.content, parts_wanted);
        let mut parts = Vec::with_capacity(parts_wanted);
        let mut all_fit = true;
        for (position, span) in spans.iter().enumerate() {
            let text = format!(
                "===== {} (Part {}/{}) =====\n{}",
                file.path,
                position + 1,
                parts_wanted,
                span
            );
            let tokens = counter.count(&text)?;
            if tokens > max_tokens_per_group {
                all_fit = false;
                break;
            }
            parts.push((text, tokens));
        }

        if all_fit {
            return Ok(parts);
        }
        parts_wanted += 1;
    }
}

/// Cuts text into exactly `n` spans of near-equal character count, on char
/// boundaries, whose concatenation reproduces the input exactly.
fn split_into_char_spans(text: &str, n: usize) -> Vec<&str> {
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = offsets.len() - 1;
    let base = char_count / n;
    let remainder = char_count % n;

    let mut spans = Vec::with_capacity(n);
    let mut cursor = 0usize;
    for i in 0..n {
        let size = base + usize::from(i < remainder);
        spans.push(&text[offsets[cursor]..offsets[cursor + size]]);
        cursor += size;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::source::{group_by_root_folder, split_source_document};
    use crate::tokenizer::WordCounter;

    fn words(n: usize) -> String {
        let mut joined = (0..n)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        joined.push('\n');
        joined
    }

    // Marker lines like `===== a/f1.txt =====` contribute 3 words.
    fn entry(path: &str, content_words: usize) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            folder: path.split('/').next().unwrap().to_string(),
            header: format!("===== {path} ====="),
            content: words(content_words),
        }
    }

    #[test]
    fn greedy_packing_flushes_at_budget_boundary() {
        // Entries of 40, 50, and 30 tokens with a budget of 80: the second
        // file does not fit behind the first, then the third packs with it
        // to exactly 80.
        let files = vec![
            entry("a/f1.txt", 37),
            entry("a/f2.txt", 47),
            entry("a/f3.txt", 27),
        ];
        let groups = aggregate_by_token(&[("a".into(), files)], &WordCounter, 80).unwrap();
        assert_eq!(groups.len(), 1);
        let chunks = &groups[0].chunks;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].token_count, 40);
        assert_eq!(chunks[1].token_count, 80);
        assert!(chunks[0].content.contains("a/f1.txt"));
        assert!(chunks[1].content.contains("a/f2.txt"));
        assert!(chunks[1].content.contains("a/f3.txt"));
        assert_eq!(chunks[1].sequence_index, 1);
    }

    #[test]
    fn file_that_exactly_fills_the_buffer_closes_it() {
        let files = vec![entry("a/full.txt", 77), entry("a/next.txt", 7)];
        let groups = aggregate_by_token(&[("a".into(), files)], &WordCounter, 80).unwrap();
        let chunks = &groups[0].chunks;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].token_count, 80);
        assert_eq!(chunks[1].token_count, 10);
    }

    #[test]
    fn oversized_file_splits_into_labeled_parts_within_budget() {
        // A 250-token entry with a budget of 100 must become at least three
        // labeled parts, each within the budget.
        let file = entry("a/big.txt", 247);
        let original_content = file.content.clone();
        let groups = aggregate_by_token(&[("a".into(), vec![file])], &WordCounter, 100).unwrap();
        let chunks = &groups[0].chunks;
        assert!(chunks.len() >= 3, "expected >= 3 parts, got {}", chunks.len());
        for (position, chunk) in chunks.iter().enumerate() {
            assert!(chunk.token_count <= 100);
            let label = format!("(Part {}/{})", position + 1, chunks.len());
            assert!(
                chunk.content.starts_with("===== a/big.txt (Part"),
                "part marker missing: {}",
                &chunk.content[..40]
            );
            assert!(chunk.content.contains(&label));
        }
        // Stripping the inserted part markers reproduces the original file.
        let rebuilt: String = chunks
            .iter()
            .map(|chunk| {
                let (_, body) = chunk.content.split_once('\n').unwrap();
                body
            })
            .collect();
        assert_eq!(rebuilt, original_content);
    }

    #[test]
    fn parts_are_never_merged_with_neighboring_files() {
        let files = vec![
            entry("a/before.txt", 7),
            entry("a/big.txt", 247),
            entry("a/after.txt", 7),
        ];
        let groups = aggregate_by_token(&[("a".into(), files)], &WordCounter, 100).unwrap();
        let chunks = &groups[0].chunks;
        assert!(chunks.first().unwrap().content.contains("a/before.txt"));
        assert!(!chunks.first().unwrap().content.contains("(Part"));
        assert!(chunks.last().unwrap().content.contains("a/after.txt"));
        assert!(!chunks.last().unwrap().content.contains("(Part"));
        for chunk in &chunks[1..chunks.len() - 1] {
            assert!(chunk.content.contains("(Part"));
        }
    }

    #[test]
    fn concatenated_chunks_reproduce_the_source_document() {
        let raw = format!(
            "===== src/a.rs =====\n{}===== src/b.rs =====\n{}===== docs/c.md =====\n{}",
            words(20),
            words(30),
            words(10),
        );
        let grouped = group_by_root_folder(split_source_document(&raw));
        let groups = aggregate_by_token(&grouped, &WordCounter, 100).unwrap();
        let rebuilt: String = groups
            .iter()
            .flat_map(|folder| folder.chunks.iter())
            .map(|chunk| chunk.content.as_str())
            .collect();
        assert_eq!(rebuilt, raw);
    }

    #[test]
    fn aggregation_is_deterministic_across_runs() {
        let files = vec![
            entry("a/f1.txt", 37),
            entry("a/f2.txt", 47),
            entry("b/f3.txt", 247),
        ];
        let grouped = group_by_root_folder(files);
        let first = aggregate_by_token(&grouped, &WordCounter, 80).unwrap();
        let second = aggregate_by_token(&grouped, &WordCounter, 80).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_budget_fails_fast() {
        let files = vec![entry("a/f1.txt", 5)];
        let err = aggregate_by_token(&[("a".into(), files)], &WordCounter, 0).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn char_spans_concatenate_losslessly() {
        let text = "αβγδε fn main() { println!(\"héllo\"); }";
        for n in 1..=5 {
            let spans = split_into_char_spans(text, n);
            assert_eq!(spans.len(), n);
            assert_eq!(spans.concat(), text);
        }
    }
}
