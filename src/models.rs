//! Core data models for the document backend.
//!
//! These types represent the authoritative file metadata, the projection of a
//! file stored in the search index, and the query parameters that flow through
//! the listing and search paths.

use serde::{Deserialize, Serialize};

/// Authoritative metadata row for one uploaded file.
///
/// `id` is the generated storage filename and doubles as the join key into
/// the search index. `indexed` starts false and is flipped by the indexing
/// pipeline only after the index write succeeded.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    /// Absolute path on disk; never serialized to clients.
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub mime_type: String,
    /// Lowercased extension including the dot, e.g. `.txt`.
    pub file_type: String,
    pub size_bytes: i64,
    /// Unix epoch seconds.
    pub uploaded_at: i64,
    pub indexed: bool,
}

/// Registered user row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: i64,
}

/// The searchable projection of a [`FileRecord`] plus its extracted content.
///
/// `id` always equals the corresponding record's id; that equality is the
/// single invariant binding the metadata store and the index together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    pub original_name: String,
    pub file_type: String,
    pub size_bytes: u64,
    /// Unix epoch milliseconds (filter/sort attribute).
    pub uploaded_at: i64,
}

impl SearchDocument {
    pub fn from_record(record: &FileRecord, content: String) -> Self {
        Self {
            id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            title: record.original_name.clone(),
            content,
            original_name: record.original_name.clone(),
            file_type: record.file_type.clone(),
            size_bytes: record.size_bytes.max(0) as u64,
            uploaded_at: record.uploaded_at * 1000,
        }
    }
}

/// Sort key shared by the listing and search paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    UploadedAt,
    SizeBytes,
    Title,
}

impl SortKey {
    /// Accepts the query-string spellings of both the listing and search APIs.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => None,
            "uploadedAt" | "uploadTime" | "uploaded_at" => Some(Self::UploadedAt),
            "size" | "sizeBytes" | "size_bytes" => Some(Self::SizeBytes),
            "title" | "name" | "originalName" | "original_name" => Some(Self::Title),
            _ => None,
        }
    }

    /// Column name in the `files` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::UploadedAt => "uploaded_at",
            Self::SizeBytes => "size_bytes",
            Self::Title => "original_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Conjunction of optional predicates for the owner-scoped listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Substring match against the stored MIME type.
    pub mime_contains: Option<String>,
    pub indexed: Option<bool>,
}

/// Aggregate counts over the metadata store, independent of the search index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_files: i64,
    pub indexed_files: i64,
    /// Uploads within the trailing 7-day window.
    pub recent_files: i64,
    /// Human-readable sum of all stored file sizes.
    pub total_size: String,
    pub file_types: Vec<FileTypeStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTypeStats {
    pub extension: String,
    pub count: i64,
    pub total_size: String,
}

/// Formats a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Lowercased extension of a filename, including the dot. Empty when absent.
pub fn file_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(pos) if pos + 1 < name.len() => name[pos..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_aliases() {
        assert_eq!(SortKey::parse("uploadTime"), Some(SortKey::UploadedAt));
        assert_eq!(SortKey::parse("uploadedAt"), Some(SortKey::UploadedAt));
        assert_eq!(SortKey::parse("size"), Some(SortKey::SizeBytes));
        assert_eq!(SortKey::parse("title"), Some(SortKey::Title));
        assert_eq!(SortKey::parse("bogus"), None);
        assert_eq!(SortKey::parse(""), None);
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(file_extension("report.PDF"), ".pdf");
        assert_eq!(file_extension("notes.tar.gz"), ".gz");
        assert_eq!(file_extension("README"), "");
        assert_eq!(file_extension("trailing."), "");
    }

    #[test]
    fn bytes_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn search_document_projection() {
        let record = FileRecord {
            id: "file-1-2.txt".into(),
            owner_id: "u1".into(),
            original_name: "fox.txt".into(),
            storage_path: "uploads/file-1-2.txt".into(),
            mime_type: "text/plain".into(),
            file_type: ".txt".into(),
            size_bytes: 19,
            uploaded_at: 1_700_000_000,
            indexed: false,
        };
        let doc = SearchDocument::from_record(&record, "The quick brown fox".into());
        assert_eq!(doc.id, record.id);
        assert_eq!(doc.title, "fox.txt");
        assert_eq!(doc.uploaded_at, 1_700_000_000_000);
        assert_eq!(doc.size_bytes, 19);
    }
}
