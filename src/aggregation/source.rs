//! Parsing of serialized source trees.
//!
//! The ingestion collaborator emits one text dump where each file is
//! introduced by a marker line of the form `===== <relative-path> =====`
//! followed by the file's verbatim content. Anything before the first
//! marker (ingestion summaries, tree listings) is skipped.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Folder name assigned to files that live at the repository root.
pub const ROOT_FOLDER: &str = "(root)";

static MARKER: OnceLock<Regex> = OnceLock::new();

fn marker_regex() -> &'static Regex {
    MARKER.get_or_init(|| Regex::new(r"(?m)^===== (.+?) =====$").expect("valid marker regex"))
}

/// One file parsed out of the source dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path as written in the marker line.
    pub path: String,
    /// Top-level folder the file belongs to ([`ROOT_FOLDER`] for files
    /// without a directory component).
    pub folder: String,
    /// The exact marker line, kept so chunk text shows file transitions.
    pub header: String,
    /// Verbatim file content following the marker line.
    pub content: String,
}

impl FileEntry {
    /// The text this entry contributes to a chunk: marker line plus content.
    pub fn entry_text(&self) -> String {
        format!("{}\n{}", self.header, self.content)
    }
}

fn root_folder_of(path: &str) -> String {
    match path.split_once('/') {
        Some((first, _)) => first.to_string(),
        None => ROOT_FOLDER.to_string(),
    }
}

/// Splits a raw source dump into file entries in document order.
pub fn split_source_document(raw: &str) -> Vec<FileEntry> {
    let matches: Vec<(usize, usize, &str)> = marker_regex()
        .captures_iter(raw)
        .map(|caps| {
            let full = caps.get(0).expect("match group 0");
            let path = caps.get(1).expect("match group 1");
            (full.start(), full.end(), path.as_str())
        })
        .collect();

    let mut entries = Vec::with_capacity(matches.len());
    for (index, (start, end, path)) in matches.iter().enumerate() {
        let content_end = matches
            .get(index + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(raw.len());
        let after = &raw[*end..content_end];
        let content = after.strip_prefix('\n').unwrap_or(after);
        entries.push(FileEntry {
            path: (*path).to_string(),
            folder: root_folder_of(path),
            header: raw[*start..*end].to_string(),
            content: content.to_string(),
        });
    }
    entries
}

/// Groups entries by top-level folder, preserving first-seen folder order
/// and the document order of files within each folder.
pub fn group_by_root_folder(entries: Vec<FileEntry>) -> Vec<(String, Vec<FileEntry>)> {
    let mut order: Vec<(String, Vec<FileEntry>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        match index.get(&entry.folder) {
            Some(&slot) => order[slot].1.push(entry),
            None => {
                index.insert(entry.folder.clone(), order.len());
                let folder = entry.folder.clone();
                order.push((folder, vec![entry]));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "===== src/main.rs =====\nfn main() {}\n\
===== src/lib.rs =====\npub mod api;\n\
===== docs/guide.md =====\n# Guide\n\
===== README.md =====\nHello.\n";

    #[test]
    fn splits_files_in_document_order() {
        let entries = split_source_document(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].path, "src/main.rs");
        assert_eq!(entries[0].folder, "src");
        assert_eq!(entries[0].content, "fn main() {}\n");
        assert_eq!(entries[3].folder, ROOT_FOLDER);
    }

    #[test]
    fn entry_text_reproduces_the_original_span() {
        let entries = split_source_document(SAMPLE);
        let rebuilt: String = entries.iter().map(FileEntry::entry_text).collect();
        assert_eq!(rebuilt, SAMPLE);
    }

    #[test]
    fn preamble_before_first_marker_is_skipped() {
        let raw = format!("=== SUMMARY ===\ntwo files\n\n{SAMPLE}");
        let entries = split_source_document(&raw);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].path, "src/main.rs");
    }

    #[test]
    fn groups_preserve_folder_and_file_order() {
        let grouped = group_by_root_folder(split_source_document(SAMPLE));
        let folders: Vec<&str> = grouped.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(folders, vec!["src", "docs", ROOT_FOLDER]);
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[0].1[1].path, "src/lib.rs");
    }

    #[test]
    fn document_without_markers_yields_no_entries() {
        assert!(split_source_document("just prose, no markers").is_empty());
    }
}
