//! Search orchestration: request parameters, index queries, and enrichment
//! of raw hits with authoritative metadata from the store.
//!
//! A hit whose metadata row is gone (deleted between index write and query)
//! is dropped from the response rather than served stale.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::index::{QueryOptions, SearchIndex};
use crate::models::{SortDir, SortKey};
use crate::store::MetadataStore;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;
const SUGGESTION_LIMIT: usize = 5;
const SUGGESTION_MIN_CHARS: usize = 2;

/// Query-string parameters of the search endpoint. Everything is optional;
/// a blank `query` lists the owner's documents newest-first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Extension filter, with or without the leading dot.
    pub file_type: Option<String>,
    /// Epoch milliseconds, RFC 3339, or `YYYY-MM-DD`.
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub original_name: String,
    pub file_type: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub metadata: HitMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitMetadata {
    /// RFC 3339 upload instant.
    pub upload_time: String,
    pub indexed: bool,
    pub download_url: String,
    /// Human-readable size.
    pub file_size: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub query: String,
    pub processing_time_ms: u64,
    /// Total matches, not just this page.
    pub hits_count: usize,
    pub offset: usize,
    pub limit: usize,
    pub facet_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Suggestion {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Runs a full search for `owner_id` and joins each hit against the store.
pub async fn run_search(
    store: &MetadataStore,
    index: &SearchIndex,
    owner_id: &str,
    params: &SearchParams,
) -> Result<SearchResponse, AppError> {
    let opts = query_options(params)?;
    let results = index.query(owner_id, &params.query, &opts)?;

    let mut hits = Vec::with_capacity(results.hits.len());
    for hit in results.hits {
        let Some(record) = store.find_by_id(&hit.doc.id, owner_id).await? else {
            tracing::debug!(file_id = %hit.doc.id, "dropping stale index hit");
            continue;
        };
        hits.push(SearchHit {
            id: hit.doc.id,
            title: hit.doc.title,
            original_name: hit.doc.original_name,
            file_type: hit.doc.file_type,
            score: hit.score,
            snippet: hit.snippet,
            metadata: HitMetadata {
                upload_time: DateTime::from_timestamp(record.uploaded_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                indexed: record.indexed,
                download_url: format!("/api/download/{}", record.id),
                file_size: crate::models::format_bytes(record.size_bytes.max(0) as u64),
            },
        });
    }

    Ok(SearchResponse {
        hits,
        query: params.query.trim().to_string(),
        processing_time_ms: results.timing_ms,
        hits_count: results.total_estimate,
        offset: opts.offset,
        limit: opts.limit,
        facet_distribution: results.facet_distribution,
    })
}

/// Filename suggestions for a query prefix. Queries shorter than two
/// characters return nothing; at most five distinct names come back.
pub fn suggest(
    index: &SearchIndex,
    owner_id: &str,
    query: &str,
) -> Result<Vec<Suggestion>, AppError> {
    let query = query.trim();
    if query.chars().count() < SUGGESTION_MIN_CHARS {
        return Ok(Vec::new());
    }

    let opts = QueryOptions {
        limit: SUGGESTION_LIMIT * 4,
        highlight: false,
        ..Default::default()
    };
    let results = index.query(owner_id, query, &opts)?;

    let mut seen = std::collections::HashSet::new();
    let mut suggestions = Vec::new();
    for hit in results.hits {
        if seen.insert(hit.doc.original_name.clone()) {
            suggestions.push(Suggestion {
                text: hit.doc.original_name,
                kind: "file",
            });
            if suggestions.len() == SUGGESTION_LIMIT {
                break;
            }
        }
    }
    Ok(suggestions)
}

fn query_options(params: &SearchParams) -> Result<QueryOptions, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let file_type = params
        .file_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let lower = s.to_ascii_lowercase();
            if lower.starts_with('.') {
                lower
            } else {
                format!(".{}", lower)
            }
        });

    let uploaded_from = params
        .date_from
        .as_deref()
        .map(|raw| parse_instant(raw, false))
        .transpose()?;
    let uploaded_to = params
        .date_to
        .as_deref()
        .map(|raw| parse_instant(raw, true))
        .transpose()?;

    // Unknown sort spellings fall back to relevance order.
    let sort = params
        .sort_by
        .as_deref()
        .and_then(SortKey::parse)
        .map(|key| {
            let dir = params
                .sort_order
                .as_deref()
                .and_then(SortDir::parse)
                .unwrap_or_default();
            (key, dir)
        });

    Ok(QueryOptions {
        limit,
        offset,
        file_type,
        uploaded_from,
        uploaded_to,
        sort,
        ..Default::default()
    })
}

/// Parses a date bound into epoch milliseconds. A bare date expands to the
/// start or end of that day depending on which bound it is.
fn parse_instant(raw: &str, end_of_day: bool) -> Result<i64, AppError> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap()
        } else {
            NaiveTime::MIN
        };
        return Ok(date.and_time(time).and_utc().timestamp_millis());
    }
    Err(AppError::Validation(format!("Invalid date: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileRecord, SearchDocument};

    async fn memory_store() -> MetadataStore {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        MetadataStore::new(pool)
    }

    fn record(id: &str, owner: &str, name: &str, uploaded_at: i64) -> FileRecord {
        FileRecord {
            id: id.into(),
            owner_id: owner.into(),
            original_name: name.into(),
            storage_path: format!("/tmp/{}", id),
            mime_type: "text/plain".into(),
            file_type: crate::models::file_extension(name),
            size_bytes: 2048,
            uploaded_at,
            indexed: true,
        }
    }

    async fn seed(
        store: &MetadataStore,
        index: &SearchIndex,
        id: &str,
        owner: &str,
        name: &str,
        content: &str,
    ) {
        let rec = record(id, owner, name, chrono::Utc::now().timestamp());
        store.create(&rec).await.unwrap();
        index
            .upsert(&SearchDocument::from_record(&rec, content.into()))
            .unwrap();
    }

    #[tokio::test]
    async fn hits_are_enriched_with_metadata() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = memory_store().await;
        let index = SearchIndex::open(&tmp.path().join("index")).unwrap();
        seed(&store, &index, "f1", "alice", "report.txt", "quarterly numbers").await;

        let params = SearchParams {
            query: "quarterly".into(),
            ..Default::default()
        };
        let response = run_search(&store, &index, "alice", &params).await.unwrap();
        assert_eq!(response.hits_count, 1);
        let hit = &response.hits[0];
        assert_eq!(hit.metadata.download_url, "/api/download/f1");
        assert_eq!(hit.metadata.file_size, "2.0 KB");
        assert!(hit.metadata.indexed);
        assert!(!hit.metadata.upload_time.is_empty());
    }

    #[tokio::test]
    async fn stale_index_hit_is_dropped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = memory_store().await;
        let index = SearchIndex::open(&tmp.path().join("index")).unwrap();
        // Indexed but never stored: simulates a delete that beat the query.
        let rec = record("ghost", "alice", "ghost.txt", 1);
        index
            .upsert(&SearchDocument::from_record(&rec, "phantom words".into()))
            .unwrap();

        let params = SearchParams {
            query: "phantom".into(),
            ..Default::default()
        };
        let response = run_search(&store, &index, "alice", &params).await.unwrap();
        assert!(response.hits.is_empty());
    }

    #[tokio::test]
    async fn suggestions_dedupe_and_cap() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = memory_store().await;
        let index = SearchIndex::open(&tmp.path().join("index")).unwrap();
        for i in 0..8 {
            seed(
                &store,
                &index,
                &format!("f{}", i),
                "alice",
                &format!("minutes-{}.txt", i),
                "meeting minutes",
            )
            .await;
        }

        let suggestions = suggest(&index, "alice", "minutes").unwrap();
        assert_eq!(suggestions.len(), SUGGESTION_LIMIT);
        assert!(suggestions.iter().all(|s| s.kind == "file"));

        assert!(suggest(&index, "alice", "m").unwrap().is_empty());
        assert!(suggest(&index, "alice", "  ").unwrap().is_empty());
    }

    #[test]
    fn date_bounds_parse_all_spellings() {
        assert_eq!(parse_instant("1700000000000", false).unwrap(), 1700000000000);
        let from = parse_instant("2024-01-02", false).unwrap();
        let to = parse_instant("2024-01-02", true).unwrap();
        assert!(to - from == 24 * 3600 * 1000 - 1);
        assert!(parse_instant("2024-01-02T03:04:05Z", false).is_ok());
        assert!(matches!(
            parse_instant("not-a-date", false),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn file_type_filter_is_normalized() {
        let params = SearchParams {
            file_type: Some("PDF".into()),
            ..Default::default()
        };
        let opts = query_options(&params).unwrap();
        assert_eq!(opts.file_type.as_deref(), Some(".pdf"));
    }
}
