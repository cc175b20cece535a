//! JSON-lines document store for issues
//!
//! One issue document per line. No database server, just a file; or nothing
//! at all when the store is opened in memory.

use crate::{
    Error, IssueId, IssueRecord, Priority, Result, Status, StatusMutation, TimelineEntry,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Query filters; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilters {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    /// Case-insensitive substring over title, description and address
    pub search: Option<String>,
}

impl IssueFilters {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search: Some(text.into()),
            ..Self::default()
        }
    }

    fn matches(&self, issue: &IssueRecord, needle: Option<&str>) -> bool {
        self.status.is_none_or(|s| issue.status() == s)
            && self.priority.is_none_or(|p| issue.priority() == p)
            && self
                .category
                .as_deref()
                .is_none_or(|c| issue.category() == c)
            && needle.is_none_or(|n| issue.matches_search(n))
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Pagination {
    /// Page and limit are clamped to at least 1
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.limit)
    }
}

/// One page of query results plus the total match count
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<IssueRecord>,
    pub total: usize,
}

/// Fields that `aggregate_counts` can group by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Status,
    Priority,
    Category,
}

impl GroupField {
    fn key(&self, issue: &IssueRecord) -> String {
        match self {
            GroupField::Status => issue.status().to_string(),
            GroupField::Priority => issue.priority().to_string(),
            GroupField::Category => issue.category().to_string(),
        }
    }
}

/// `{ "_id": value, "count": n }` aggregate row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    #[serde(rename = "_id")]
    pub id: String,
    pub count: usize,
}

/// A stored issue plus the line it was read from
#[derive(Debug, Clone)]
struct Document {
    record: IssueRecord,
    origin: Option<Origin>,
}

/// Document as found on disk
#[derive(Debug, Clone)]
struct Origin {
    line: String,
    raw: Value,
    loaded: IssueRecord,
}

impl Document {
    fn new(record: IssueRecord) -> Self {
        Self {
            record,
            origin: None,
        }
    }

    /// Serialized form. An unchanged document is its original line; a
    /// changed one is the original with only the changed fields rewritten.
    fn render(&self) -> Result<String> {
        let Some(origin) = &self.origin else {
            return Ok(serde_json::to_string(&self.record)?);
        };
        if self.record == origin.loaded {
            return Ok(origin.line.clone());
        }

        let mut old = serde_json::to_value(&origin.loaded)?;
        let mut new = serde_json::to_value(&self.record)?;
        let mut raw = origin.raw.clone();
        if let (Value::Object(raw), Value::Object(old), Value::Object(new)) =
            (&mut raw, &mut old, &mut new)
        {
            merge_timeline(raw, old.remove("timeline"), new.remove("timeline"));
        }
        merge_changes(&mut raw, &old, &new);
        Ok(serde_json::to_string(&raw)?)
    }
}

/// Apply the difference between `old` and `new` to `target`, leaving
/// everything else in `target` alone
fn merge_changes(target: &mut Value, old: &Value, new: &Value) {
    match (target, old, new) {
        (Value::Object(target), Value::Object(old), Value::Object(new)) => {
            for key in old.keys() {
                if !new.contains_key(key) {
                    target.remove(key);
                }
            }
            for (key, value) in new {
                match (target.get_mut(key), old.get(key)) {
                    (Some(slot), Some(previous)) => {
                        if previous != value {
                            merge_changes(slot, previous, value);
                        }
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, _, new) => *target = new.clone(),
    }
}

/// Timeline entries line up with the readable entries of the stored array;
/// entries that never parsed stay where they are
fn merge_timeline(raw: &mut Map<String, Value>, old: Option<Value>, new: Option<Value>) {
    if old == new {
        return;
    }
    match (raw.get_mut("timeline"), old, new) {
        (Some(Value::Array(entries)), Some(Value::Array(old)), Some(Value::Array(new))) => {
            let readable: Vec<usize> = entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| {
                    serde_json::from_value::<TimelineEntry>((*entry).clone()).is_ok()
                })
                .map(|(index, _)| index)
                .collect();

            for &index in readable.iter().skip(new.len()).rev() {
                entries.remove(index);
            }
            for (k, value) in new.iter().enumerate() {
                match (readable.get(k), old.get(k)) {
                    (Some(&index), Some(previous)) => {
                        if previous != value {
                            merge_changes(&mut entries[index], previous, value);
                        }
                    }
                    _ => entries.push(value.clone()),
                }
            }
        }
        (_, _, Some(new)) => {
            raw.insert("timeline".to_string(), new);
        }
        (_, _, None) => {
            raw.remove("timeline");
        }
    }
}

/// One line of the backing file
#[derive(Debug, Clone)]
enum Line {
    Issue(Document),
    /// Not an issue document (or a duplicate id); written back untouched
    Unreadable(String),
}

/// Issue document store
pub struct Store {
    path: Option<PathBuf>,
    /// File order is kept on save
    lines: Vec<Line>,
    index: HashMap<String, usize>,
}

impl Store {
    /// Open a file-backed store, creating the file if it does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, "")?;
        }

        let mut store = Self {
            path: Some(path),
            lines: Vec::new(),
            index: HashMap::new(),
        };
        store.load()?;
        Ok(store)
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            lines: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load all issues from JSONL
    fn load(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let reader = BufReader::new(File::open(path)?);
        let mut unreadable = 0usize;
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<Value>(&line).and_then(|raw| {
                let record = IssueRecord::deserialize(&raw)?;
                Ok((raw, record))
            });
            match parsed {
                Ok((_, record)) if self.index.contains_key(&record.id) => {
                    tracing::warn!(
                        line = index + 1,
                        id = %record.id,
                        "Keeping duplicate issue document aside"
                    );
                    self.lines.push(Line::Unreadable(line));
                    unreadable += 1;
                }
                Ok((raw, record)) => {
                    self.index.insert(record.id.clone(), self.lines.len());
                    self.lines.push(Line::Issue(Document {
                        origin: Some(Origin {
                            line,
                            raw,
                            loaded: record.clone(),
                        }),
                        record,
                    }));
                }
                Err(e) => {
                    tracing::warn!(
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable issue document"
                    );
                    self.lines.push(Line::Unreadable(line));
                    unreadable += 1;
                }
            }
        }

        tracing::debug!(issues = self.index.len(), unreadable, "Loaded issue store");
        Ok(())
    }

    /// Write every line back to the file (atomic rename)
    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for line in &self.lines {
                match line {
                    Line::Issue(doc) => writeln!(writer, "{}", doc.render()?)?,
                    Line::Unreadable(raw) => writeln!(writer, "{}", raw)?,
                }
            }
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn document(&self, id: &str) -> Option<&Document> {
        match self.lines.get(*self.index.get(id)?) {
            Some(Line::Issue(doc)) => Some(doc),
            _ => None,
        }
    }

    fn document_mut(&mut self, id: &str) -> Option<&mut Document> {
        match self.lines.get_mut(*self.index.get(id)?) {
            Some(Line::Issue(doc)) => Some(doc),
            _ => None,
        }
    }

    fn records(&self) -> impl Iterator<Item = &IssueRecord> {
        self.lines.iter().filter_map(|line| match line {
            Line::Issue(doc) => Some(&doc.record),
            Line::Unreadable(_) => None,
        })
    }

    /// Stamp a write
    fn touch(issue: &mut IssueRecord) {
        issue.updated_at = Some(Utc::now());
        issue.version += 1;
    }

    /// Filtered page, newest first by creation time
    pub fn find(&self, filters: &IssueFilters, pagination: Pagination) -> Page {
        let needle = filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matched: Vec<&IssueRecord> = self
            .records()
            .filter(|issue| filters.matches(issue, needle.as_deref()))
            .collect();

        // Documents without a creation time sort last
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit)
            .cloned()
            .collect();

        Page { items, total }
    }

    /// Get an issue by ID
    pub fn find_by_id(&self, id: &IssueId) -> Result<&IssueRecord> {
        self.document(id.as_str())
            .map(|doc| &doc.record)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Persist a new issue
    pub fn create(&mut self, mut issue: IssueRecord) -> Result<IssueRecord> {
        if self.index.contains_key(&issue.id) {
            return Err(Error::AlreadyExists(issue.id));
        }
        issue.created_at.get_or_insert_with(Utc::now);
        Self::touch(&mut issue);

        self.index.insert(issue.id.clone(), self.lines.len());
        self.lines.push(Line::Issue(Document::new(issue.clone())));
        if let Err(e) = self.save() {
            self.lines.pop();
            self.index.remove(&issue.id);
            return Err(e);
        }
        Ok(issue)
    }

    /// Apply a status mutation as one read-modify-write
    pub fn update_status(
        &mut self,
        id: &IssueId,
        mutation: &StatusMutation,
    ) -> Result<IssueRecord> {
        let doc = self
            .document_mut(id.as_str())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let previous = doc.record.clone();
        doc.record.apply_status(mutation);
        Self::touch(&mut doc.record);
        let updated = doc.record.clone();

        if let Err(e) = self.save() {
            if let Some(doc) = self.document_mut(id.as_str()) {
                doc.record = previous;
            }
            return Err(e);
        }
        Ok(updated)
    }

    /// Replace a document if nobody wrote it since it was read
    pub fn replace(&mut self, issue: IssueRecord) -> Result<IssueRecord> {
        let mut written = self.replace_many(vec![issue])?;
        Ok(written.remove(0))
    }

    /// Replace several documents with one save. Every version is checked
    /// before anything is written; a single conflict aborts the batch.
    pub fn replace_many(&mut self, issues: Vec<IssueRecord>) -> Result<Vec<IssueRecord>> {
        for issue in &issues {
            let stored = self
                .document(&issue.id)
                .ok_or_else(|| Error::NotFound(issue.id.clone()))?;
            if stored.record.version != issue.version {
                return Err(Error::Conflict {
                    id: issue.id.clone(),
                    expected: issue.version,
                    found: stored.record.version,
                });
            }
        }

        let mut previous = Vec::with_capacity(issues.len());
        let mut written = Vec::with_capacity(issues.len());
        for mut issue in issues {
            Self::touch(&mut issue);
            if let Some(doc) = self.document_mut(&issue.id) {
                previous.push(std::mem::replace(&mut doc.record, issue.clone()));
            }
            written.push(issue);
        }

        if let Err(e) = self.save() {
            for old in previous {
                if let Some(doc) = self.document_mut(&old.id) {
                    doc.record = old;
                }
            }
            return Err(e);
        }
        Ok(written)
    }

    /// Count per distinct value, largest first (ties by value)
    pub fn aggregate_counts(&self, field: GroupField) -> Vec<GroupCount> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for issue in self.records() {
            *counts.entry(field.key(issue)).or_default() += 1;
        }

        let mut rows: Vec<GroupCount> = counts
            .into_iter()
            .map(|(id, count)| GroupCount { id, count })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    pub fn count_where(&self, predicate: impl Fn(&IssueRecord) -> bool) -> usize {
        self.records().filter(|issue| predicate(issue)).count()
    }

    /// All readable documents, in file order
    pub fn all(&self) -> impl Iterator<Item = &IssueRecord> {
        self.records()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
