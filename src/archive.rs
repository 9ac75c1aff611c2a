//! Submission archive walking.
//!
//! A download from the LMS is one ZIP, but what is inside depends on the
//! course tool that produced it. Shapes are probed in a fixed order and the
//! first one that finds any student wins:
//!
//! 1. one ZIP per student at the root
//! 2. one ZIP per student somewhere below the root
//! 3. one folder per student
//! 4. loose code files named after the student
//!
//! Problems with a single entry are collected into `errors`; they never stop
//! the walk.

use crate::identity::{parse_student_info, Identity};
use crate::model::{SubmissionBundle, SubmissionFile};
use anyhow::Context;
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};
use zip::ZipArchive;

const ARCHIVE_EXTENSION: &str = ".zip";
const RESOURCE_FORK_DIR: &str = "__MACOSX/";

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Extensions (without the dot) that count as code files.
    pub code_extensions: Vec<String>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            code_extensions: vec!["py".to_string()],
        }
    }
}

impl ArchiveOptions {
    fn is_code_file(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.code_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{}", ext.to_lowercase())))
    }

    fn strip_code_extension<'a>(&self, name: &'a str) -> &'a str {
        let lower = name.to_lowercase();
        for ext in &self.code_extensions {
            let suffix = format!(".{}", ext.to_lowercase());
            if lower.ends_with(&suffix) {
                return name.get(..name.len().saturating_sub(suffix.len())).unwrap_or(name);
            }
        }
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveShape {
    NestedArchives,
    NestedArchivesInFolders,
    Directories,
    FlatFiles,
    Empty,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {cause}")]
    Read { path: String, cause: String },
    #[error("Failed to process {path}: {cause}")]
    Process { path: String, cause: String },
    #[error("No code files found for {email}")]
    NoCodeFiles { email: String },
    #[error("Could not parse student info from: {name}")]
    Unparseable { name: String },
    #[error("Failed to parse main archive: {cause}")]
    MainArchive { cause: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSubmissions {
    pub shape: ArchiveShape,
    pub students: Vec<SubmissionBundle>,
    pub total_students: usize,
    pub successful_extractions: usize,
    pub errors: Vec<String>,
}

impl ParsedSubmissions {
    fn empty() -> Self {
        Self {
            shape: ArchiveShape::Empty,
            students: Vec::new(),
            total_students: 0,
            successful_extractions: 0,
            errors: Vec::new(),
        }
    }

    fn report(&mut self, e: ExtractionError) {
        warn!("{}", e);
        self.errors.push(e.to_string());
    }

    fn push_student(&mut self, identity: Identity, files: Vec<SubmissionFile>) {
        self.students.push(SubmissionBundle {
            email: identity.email,
            last_name: identity.last_name,
            first_name: identity.first_name,
            submission_date: identity.date,
            files,
        });
        self.successful_extractions += 1;
    }
}

struct Entry {
    index: usize,
    name: String,
    is_dir: bool,
}

pub fn read_archive_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path)
        .with_context(|| format!("failed to read archive {}", path.to_string_lossy()))
}

pub fn archive_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn parse_submission_archive(bytes: &[u8], opts: &ArchiveOptions) -> ParsedSubmissions {
    let mut result = ParsedSubmissions::empty();
    let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
        Ok(a) => a,
        Err(e) => {
            result.report(ExtractionError::MainArchive {
                cause: e.to_string(),
            });
            return result;
        }
    };

    let entries = list_entries(&mut archive, &mut result);

    let root_archives: Vec<&Entry> = entries
        .iter()
        .filter(|e| !e.is_dir && is_archive(&e.name) && !e.name.contains('/'))
        .collect();
    if !root_archives.is_empty() {
        result.shape = ArchiveShape::NestedArchives;
        walk_nested_archives(&mut archive, &root_archives, opts, &mut result);
        return finish(result);
    }

    let deep_archives: Vec<&Entry> = entries
        .iter()
        .filter(|e| !e.is_dir && is_archive(&e.name))
        .collect();
    if !deep_archives.is_empty() {
        result.shape = ArchiveShape::NestedArchivesInFolders;
        walk_nested_archives(&mut archive, &deep_archives, opts, &mut result);
        return finish(result);
    }

    let mut by_dir: IndexMap<&str, Vec<&Entry>> = IndexMap::new();
    for e in entries.iter().filter(|e| !e.is_dir) {
        if let Some((dir, _)) = e.name.split_once('/') {
            let files = by_dir.entry(dir).or_default();
            if opts.is_code_file(&e.name) {
                files.push(e);
            }
        }
    }
    by_dir.retain(|_, files| !files.is_empty());
    if !by_dir.is_empty() {
        result.shape = ArchiveShape::Directories;
        result.total_students = by_dir.len();
        for (dir, files) in &by_dir {
            let Some(identity) = parse_student_info(dir) else {
                result.report(ExtractionError::Unparseable {
                    name: dir.to_string(),
                });
                continue;
            };
            let files = read_code_files(&mut archive, files, &mut result);
            if !files.is_empty() {
                result.push_student(identity, files);
            }
        }
        return finish(result);
    }

    let mut by_key: IndexMap<String, Vec<&Entry>> = IndexMap::new();
    for e in entries
        .iter()
        .filter(|e| !e.is_dir && !e.name.contains('/') && opts.is_code_file(&e.name))
    {
        by_key.entry(flat_student_key(&e.name, opts)).or_default().push(e);
    }
    if !by_key.is_empty() {
        result.shape = ArchiveShape::FlatFiles;
        result.total_students = by_key.len();
        for (key, files) in &by_key {
            let Some(identity) = parse_student_info(key) else {
                result.report(ExtractionError::Unparseable { name: key.clone() });
                continue;
            };
            let files = read_code_files(&mut archive, files, &mut result);
            if !files.is_empty() {
                result.push_student(identity, files);
            }
        }
    }

    finish(result)
}

fn finish(result: ParsedSubmissions) -> ParsedSubmissions {
    info!(
        shape = ?result.shape,
        total = result.total_students,
        extracted = result.successful_extractions,
        errors = result.errors.len(),
        "submission archive parsed"
    );
    result
}

fn is_archive(name: &str) -> bool {
    name.to_lowercase().ends_with(ARCHIVE_EXTENSION)
}

fn last_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn flat_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^@]+@[^@\s]+").expect("flat key regex"))
}

/// Grouping key for a loose file: the address-bearing part of the name if
/// there is one, else the name without its code extension.
pub fn flat_student_key(file_name: &str, opts: &ArchiveOptions) -> String {
    let name = opts.strip_code_extension(last_segment(file_name));
    if name.contains('@') {
        if let Some(m) = flat_key_re().find(name) {
            return m.as_str().to_string();
        }
    }
    name.to_string()
}

fn list_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    result: &mut ParsedSubmissions,
) -> Vec<Entry> {
    let mut out = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        match archive.by_index(index) {
            Ok(f) => {
                let name = f.name().to_string();
                if name.starts_with(RESOURCE_FORK_DIR) {
                    continue;
                }
                out.push(Entry {
                    index,
                    is_dir: f.is_dir(),
                    name,
                });
            }
            Err(e) => result.report(ExtractionError::Read {
                path: format!("entry #{index}"),
                cause: e.to_string(),
            }),
        }
    }
    out
}

fn read_entry_text<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<String, String> {
    let mut f = archive.by_index(index).map_err(|e| e.to_string())?;
    let mut content = String::new();
    f.read_to_string(&mut content).map_err(|e| e.to_string())?;
    Ok(content)
}

fn read_entry_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<Vec<u8>, String> {
    let mut f = archive.by_index(index).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    f.read_to_end(&mut bytes).map_err(|e| e.to_string())?;
    Ok(bytes)
}

fn read_code_files<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entries: &[&Entry],
    result: &mut ParsedSubmissions,
) -> Vec<SubmissionFile> {
    let mut files = Vec::new();
    for e in entries {
        match read_entry_text(archive, e.index) {
            Ok(content) => files.push(SubmissionFile {
                name: last_segment(&e.name).to_string(),
                content,
            }),
            Err(cause) => result.report(ExtractionError::Read {
                path: e.name.clone(),
                cause,
            }),
        }
    }
    files
}

fn walk_nested_archives<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    nested: &[&Entry],
    opts: &ArchiveOptions,
    result: &mut ParsedSubmissions,
) {
    result.total_students = nested.len();
    for entry in nested {
        let bytes = match read_entry_bytes(archive, entry.index) {
            Ok(b) => b,
            Err(cause) => {
                result.report(ExtractionError::Process {
                    path: entry.name.clone(),
                    cause,
                });
                continue;
            }
        };
        let mut inner = match ZipArchive::new(Cursor::new(bytes)) {
            Ok(a) => a,
            Err(e) => {
                result.report(ExtractionError::Process {
                    path: entry.name.clone(),
                    cause: e.to_string(),
                });
                continue;
            }
        };

        let file_name = last_segment(&entry.name);
        let stem = file_name
            .get(..file_name.len().saturating_sub(ARCHIVE_EXTENSION.len()))
            .unwrap_or(file_name);
        let Some(identity) = parse_student_info(stem) else {
            result.report(ExtractionError::Unparseable {
                name: stem.to_string(),
            });
            continue;
        };

        let mut files = Vec::new();
        for index in 0..inner.len() {
            let name = match inner.by_index(index) {
                Ok(f) if !f.is_dir() => f.name().to_string(),
                Ok(_) => continue,
                Err(e) => {
                    result.report(ExtractionError::Read {
                        path: format!("{}/entry #{index}", entry.name),
                        cause: e.to_string(),
                    });
                    continue;
                }
            };
            if name.starts_with(RESOURCE_FORK_DIR) || !opts.is_code_file(&name) {
                continue;
            }
            match read_entry_text(&mut inner, index) {
                Ok(content) => files.push(SubmissionFile { name, content }),
                Err(cause) => result.report(ExtractionError::Read {
                    path: format!("{}/{}", entry.name, name),
                    cause,
                }),
            }
        }

        if files.is_empty() {
            result.report(ExtractionError::NoCodeFiles {
                email: identity.email,
            });
            continue;
        }
        result.push_student(identity, files);
    }
}
