//! Patch dialect parser and fuzzy context resolution

use crate::canon::canon;
use crate::{DiffError, DiffResult};
use std::collections::BTreeMap;

pub const PATCH_PREFIX: &str = "*** Begin Patch";
pub const PATCH_SUFFIX: &str = "*** End Patch";
pub const ADD_FILE_PREFIX: &str = "*** Add File: ";
pub const DELETE_FILE_PREFIX: &str = "*** Delete File: ";
pub const UPDATE_FILE_PREFIX: &str = "*** Update File: ";
pub const END_OF_FILE_PREFIX: &str = "*** End of File";

/// A contiguous block of deletions and insertions, anchored at a resolved
/// position in the original file.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    pub orig_index: usize,
    pub del_lines: Vec<String>,
    pub ins_lines: Vec<String>,
}

#[derive(Clone, Debug)]
pub enum PatchAction {
    Add { content: String },
    Delete,
    Update { chunks: Vec<Chunk> },
}

/// Parsed patch: actions in declaration order, keyed by relative path.
#[derive(Clone, Debug, Default)]
pub struct Patch {
    pub actions: Vec<(String, PatchAction)>,
}

impl Patch {
    pub fn contains(&self, path: &str) -> bool {
        self.actions.iter().any(|(p, _)| p == path)
    }
}

/// Paths the patch reads or removes (Update and Delete actions).
pub fn identify_files_needed(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    for line in text.trim().lines() {
        let path = line
            .strip_prefix(UPDATE_FILE_PREFIX)
            .or_else(|| line.strip_prefix(DELETE_FILE_PREFIX));
        if let Some(p) = path {
            if !result.iter().any(|r: &String| r == p) {
                result.push(p.to_string());
            }
        }
    }
    result
}

/// Paths the patch creates (Add actions).
pub fn identify_files_added(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    for line in text.trim().lines() {
        if let Some(p) = line.strip_prefix(ADD_FILE_PREFIX) {
            if !result.iter().any(|r: &String| r == p) {
                result.push(p.to_string());
            }
        }
    }
    result
}

/// Parse patch text against the current contents of the files it touches.
/// Returns the patch plus the accumulated fuzz score.
pub fn text_to_patch(text: &str, orig: &BTreeMap<String, String>) -> DiffResult<(Patch, u64)> {
    let lines: Vec<&str> = text.trim().split('\n').collect();
    if lines.len() < 2 {
        return Err(DiffError::new(
            "Invalid patch text: Patch text must have at least two lines.",
        ));
    }
    if !lines[0].starts_with(PATCH_PREFIX) {
        return Err(DiffError::new(
            "Invalid patch text: Patch text must start with the correct patch prefix.",
        ));
    }
    if *lines.last().expect("len checked") != PATCH_SUFFIX {
        return Err(DiffError::new(
            "Invalid patch text: Patch text must end with the correct patch suffix.",
        ));
    }

    let mut parser = Parser {
        current_files: orig,
        lines: &lines,
        index: 1,
        patch: Patch::default(),
        fuzz: 0,
    };
    parser.parse()?;
    Ok((parser.patch, parser.fuzz))
}

struct Parser<'a> {
    current_files: &'a BTreeMap<String, String>,
    lines: &'a [&'a str],
    index: usize,
    patch: Patch,
    fuzz: u64,
}

impl<'a> Parser<'a> {
    fn is_done(&self, prefixes: &[&str]) -> bool {
        if self.index >= self.lines.len() {
            return true;
        }
        prefixes
            .iter()
            .any(|p| self.lines[self.index].starts_with(p.trim_end()))
    }

    /// If the current line starts with `prefix`, return the remainder and
    /// advance. Returns None without advancing otherwise.
    fn read_str(&mut self, prefix: &str) -> DiffResult<Option<String>> {
        if self.index >= self.lines.len() {
            return Err(DiffError::new(format!(
                "Index: {} >= {}",
                self.index,
                self.lines.len()
            )));
        }
        match self.lines[self.index].strip_prefix(prefix) {
            Some(rest) => {
                self.index += 1;
                Ok(Some(rest.to_string()))
            }
            None => Ok(None),
        }
    }

    fn parse(&mut self) -> DiffResult<()> {
        while !self.is_done(&[PATCH_SUFFIX]) {
            if let Some(path) = self.read_str(UPDATE_FILE_PREFIX)? {
                if self.patch.contains(&path) {
                    return Err(DiffError::new(format!(
                        "Update File Error: Duplicate Path: {path}"
                    )));
                }
                let Some(text) = self.current_files.get(&path) else {
                    return Err(DiffError::new(format!(
                        "Update File Error: Missing File: {path}"
                    )));
                };
                let action = self.parse_update_file(&text.clone())?;
                self.patch.actions.push((path, action));
                continue;
            }
            if let Some(path) = self.read_str(DELETE_FILE_PREFIX)? {
                if self.patch.contains(&path) {
                    return Err(DiffError::new(format!(
                        "Delete File Error: Duplicate Path: {path}"
                    )));
                }
                if !self.current_files.contains_key(&path) {
                    return Err(DiffError::new(format!(
                        "Delete File Error: Missing File: {path}"
                    )));
                }
                self.patch.actions.push((path, PatchAction::Delete));
                continue;
            }
            if let Some(path) = self.read_str(ADD_FILE_PREFIX)? {
                if self.patch.contains(&path) {
                    return Err(DiffError::new(format!(
                        "Add File Error: Duplicate Path: {path}"
                    )));
                }
                if self.current_files.contains_key(&path) {
                    return Err(DiffError::new(format!(
                        "Add File Error: File already exists: {path}"
                    )));
                }
                let action = self.parse_add_file()?;
                self.patch.actions.push((path, action));
                continue;
            }
            return Err(DiffError::new(format!(
                "Unknown Line: {}",
                self.lines[self.index]
            )));
        }
        if !self.is_done(&[PATCH_SUFFIX]) || self.index >= self.lines.len() {
            return Err(DiffError::new("Missing End Patch"));
        }
        self.index += 1;
        Ok(())
    }

    fn parse_update_file(&mut self, text: &str) -> DiffResult<PatchAction> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let file_lines: Vec<&str> = text.split('\n').collect();
        let mut index_in_file = 0usize;

        while !self.is_done(&[
            PATCH_SUFFIX,
            UPDATE_FILE_PREFIX,
            DELETE_FILE_PREFIX,
            ADD_FILE_PREFIX,
            END_OF_FILE_PREFIX,
        ]) {
            let def_str = self.read_str("@@ ")?;
            let mut bare_section = false;
            if def_str.is_none() && self.index < self.lines.len() && self.lines[self.index] == "@@"
            {
                bare_section = true;
                self.index += 1;
            }
            if def_str.is_none() && !bare_section && index_in_file != 0 {
                return Err(DiffError::new(format!(
                    "Invalid Line:\n{}",
                    self.lines[self.index]
                )));
            }

            // Fast-forward to a canonical occurrence of the anchor signature
            if let Some(sig) = def_str.as_deref().filter(|s| !s.trim().is_empty()) {
                let canon_sig = canon(sig);
                let mut found = false;
                let seen_before_cursor = file_lines[..index_in_file.min(file_lines.len())]
                    .iter()
                    .any(|l| canon(l) == canon_sig);
                if !seen_before_cursor {
                    for (i, line) in file_lines.iter().enumerate().skip(index_in_file) {
                        if canon(line) == canon_sig {
                            index_in_file = i + 1;
                            found = true;
                            break;
                        }
                    }
                }
                if !found {
                    let canon_sig_trimmed = canon(sig.trim());
                    let seen_trimmed = file_lines[..index_in_file.min(file_lines.len())]
                        .iter()
                        .any(|l| canon(l.trim()) == canon_sig_trimmed);
                    if !seen_trimmed {
                        for (i, line) in file_lines.iter().enumerate().skip(index_in_file) {
                            if canon(line.trim()) == canon_sig_trimmed {
                                index_in_file = i + 1;
                                self.fuzz += 1;
                                break;
                            }
                        }
                    }
                }
            }

            let section = self.peek_next_section()?;
            let (new_index, fuzz) =
                find_context(&file_lines, &section.context, index_in_file, section.eof);
            let Some(new_index) = new_index else {
                let ctx_text = section.context.join("\n");
                let kind = if section.eof {
                    "Invalid EOF Context"
                } else {
                    "Invalid Context"
                };
                return Err(DiffError::new(format!(
                    "{kind} {index_in_file}:\n{ctx_text}"
                )));
            };
            self.fuzz += fuzz;
            for mut chunk in section.chunks {
                chunk.orig_index += new_index;
                chunks.push(chunk);
            }
            index_in_file = new_index + section.context.len();
            self.index = section.end_index;
        }
        Ok(PatchAction::Update { chunks })
    }

    fn parse_add_file(&mut self) -> DiffResult<PatchAction> {
        let mut lines: Vec<String> = Vec::new();
        while !self.is_done(&[
            PATCH_SUFFIX,
            UPDATE_FILE_PREFIX,
            DELETE_FILE_PREFIX,
            ADD_FILE_PREFIX,
        ]) {
            let line = self.lines[self.index];
            self.index += 1;
            let Some(content) = line.strip_prefix('+') else {
                return Err(DiffError::new(format!("Invalid Add File Line: {line}")));
            };
            lines.push(content.to_string());
        }
        Ok(PatchAction::Add {
            content: lines.join("\n"),
        })
    }

    /// Read one hunk body: context lines plus `+`/`-` runs, stopping at the
    /// next section marker. Returns the context (the "old" lines), the
    /// chunks keyed relative to the context start, and EOF anchoring.
    fn peek_next_section(&self) -> DiffResult<Section> {
        let mut index = self.index;
        let mut old: Vec<String> = Vec::new();
        let mut del_lines: Vec<String> = Vec::new();
        let mut ins_lines: Vec<String> = Vec::new();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut mode = Mode::Keep;

        while index < self.lines.len() {
            let s = self.lines[index];
            if [
                "@@",
                PATCH_SUFFIX,
                UPDATE_FILE_PREFIX,
                DELETE_FILE_PREFIX,
                ADD_FILE_PREFIX,
                END_OF_FILE_PREFIX,
            ]
            .iter()
            .any(|p| s.starts_with(p.trim_end()))
            {
                break;
            }
            if s == "***" {
                break;
            }
            if s.starts_with("***") {
                return Err(DiffError::new(format!("Invalid Line: {s}")));
            }
            index += 1;

            let last_mode = mode;
            let (new_mode, line) = match s.chars().next() {
                Some('+') => (Mode::Add, &s[1..]),
                Some('-') => (Mode::Delete, &s[1..]),
                Some(' ') => (Mode::Keep, &s[1..]),
                // tolerate a missing space on context lines
                _ => (Mode::Keep, s),
            };
            mode = new_mode;

            if mode == Mode::Keep && last_mode != mode && (!ins_lines.is_empty() || !del_lines.is_empty())
            {
                chunks.push(Chunk {
                    orig_index: old.len() - del_lines.len(),
                    del_lines: std::mem::take(&mut del_lines),
                    ins_lines: std::mem::take(&mut ins_lines),
                });
            }
            match mode {
                Mode::Delete => {
                    del_lines.push(line.to_string());
                    old.push(line.to_string());
                }
                Mode::Add => ins_lines.push(line.to_string()),
                Mode::Keep => old.push(line.to_string()),
            }
        }
        if !ins_lines.is_empty() || !del_lines.is_empty() {
            chunks.push(Chunk {
                orig_index: old.len() - del_lines.len(),
                del_lines,
                ins_lines,
            });
        }

        let mut eof = false;
        let mut end_index = index;
        if end_index < self.lines.len() && self.lines[end_index] == END_OF_FILE_PREFIX {
            end_index += 1;
            eof = true;
        }
        Ok(Section {
            context: old,
            chunks,
            end_index,
            eof,
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Keep,
    Add,
    Delete,
}

struct Section {
    context: Vec<String>,
    chunks: Vec<Chunk>,
    end_index: usize,
    eof: bool,
}

/// Locate `context` in `lines` starting at `start`, trying progressively
/// fuzzier passes. Returns the match index and the fuzz cost, or None.
fn find_context_core(lines: &[&str], context: &[String], start: usize) -> (Option<usize>, u64) {
    if context.is_empty() {
        return (Some(start), 0);
    }

    let join_canon = |segment: &[&str]| canon(&segment.join("\n"));
    let ctx_exact = canon(&context.join("\n"));

    // Pass 1: exact match after Unicode canonicalization
    for i in start..lines.len() {
        let end = (i + context.len()).min(lines.len());
        if join_canon(&lines[i..end]) == ctx_exact {
            return (Some(i), 0);
        }
    }

    // Pass 2: ignore trailing whitespace
    let rtrim_join = |segment: &[&str]| {
        canon(
            &segment
                .iter()
                .map(|s| s.trim_end())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    };
    let ctx_rtrim = canon(
        &context
            .iter()
            .map(|s| s.trim_end())
            .collect::<Vec<_>>()
            .join("\n"),
    );
    for i in start..lines.len() {
        let end = (i + context.len()).min(lines.len());
        if rtrim_join(&lines[i..end]) == ctx_rtrim {
            return (Some(i), 1);
        }
    }

    // Pass 3: ignore all surrounding whitespace
    let trim_join = |segment: &[&str]| {
        canon(
            &segment
                .iter()
                .map(|s| s.trim())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    };
    let ctx_trim = canon(
        &context
            .iter()
            .map(|s| s.trim())
            .collect::<Vec<_>>()
            .join("\n"),
    );
    for i in start..lines.len() {
        let end = (i + context.len()).min(lines.len());
        if trim_join(&lines[i..end]) == ctx_trim {
            return (Some(i), 100);
        }
    }

    // Pass 4: anchor by first and last context lines, tolerating drift in
    // the middle of the window
    if context.len() >= 2 && lines.len() >= context.len() {
        let first_c = canon(&context[0]);
        let last_c = canon(context.last().expect("len >= 2"));
        for i in start..=(lines.len() - context.len()) {
            if canon(lines[i]) == first_c && canon(lines[i + context.len() - 1]) == last_c {
                return (Some(i), 200);
            }
        }
    }

    (None, 0)
}

/// EOF-anchored hunks first try the tail window; a fallback match anywhere
/// after the cursor costs +10000 fuzz.
pub(crate) fn find_context(
    lines: &[&str],
    context: &[String],
    start: usize,
    eof: bool,
) -> (Option<usize>, u64) {
    if eof {
        let tail_start = lines.len().saturating_sub(context.len());
        let (idx, fuzz) = find_context_core(lines, context, tail_start);
        if idx.is_some() {
            return (idx, fuzz);
        }
        let (idx, fuzz) = find_context_core(lines, context, start);
        return (idx, fuzz + 10_000);
    }
    find_context_core(lines, context, start)
}
