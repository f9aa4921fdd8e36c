//! Search index adapter over an embedded tantivy index.
//!
//! Owns the index lifecycle (schema declaration, open-or-create) and exposes
//! upsert/remove/query/point-lookup over [`SearchDocument`]s. The index is a
//! rebuildable projection of the metadata store: it can always be regenerated
//! with a reindex sweep, so every write here is keyed by document id and
//! replace-by-id is the only update primitive.
//!
//! Every query conjoins an owner filter; no query path can observe another
//! owner's documents.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT,
};
use tantivy::snippet::SnippetGenerator;
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::models::{SearchDocument, SortDir, SortKey};

/// Upper bound on candidates considered per query; pagination, sorting and
/// faceting all operate within this window.
const MAX_CANDIDATES: usize = 1000;

/// Edit distance for typo tolerance on the text fields.
const FUZZY_DISTANCE: u8 = 1;

const WRITER_MEMORY_BYTES: usize = 50_000_000;

#[derive(Clone, Copy)]
struct Fields {
    id: Field,
    owner_id: Field,
    title: Field,
    content: Field,
    original_name: Field,
    file_type: Field,
    size_bytes: Field,
    uploaded_at: Field,
}

pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

/// Per-request query options. A blank term plus these options is the
/// unranked-listing fallback, not an error.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub limit: usize,
    pub offset: usize,
    /// Equality filter on the extension attribute (e.g. `.pdf`).
    pub file_type: Option<String>,
    /// Inclusive bounds on upload time, epoch milliseconds.
    pub uploaded_from: Option<i64>,
    pub uploaded_to: Option<i64>,
    pub sort: Option<(SortKey, SortDir)>,
    pub crop_chars: usize,
    pub highlight: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            file_type: None,
            uploaded_from: None,
            uploaded_to: None,
            sort: None,
            crop_chars: 200,
            highlight: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexHit {
    pub doc: SearchDocument,
    pub score: f32,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub hits: Vec<IndexHit>,
    /// Total matches across the index, not just the returned page.
    pub total_estimate: usize,
    pub timing_ms: u64,
    /// Match counts per file type over the candidate set.
    pub facet_distribution: BTreeMap<String, u64>,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    // Raw (untokenized) id so delete-by-term and point lookup are exact.
    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("owner_id", STRING | STORED);
    builder.add_text_field("title", TEXT | STORED);
    builder.add_text_field("content", TEXT | STORED);
    builder.add_text_field("original_name", TEXT | STORED);
    builder.add_text_field("file_type", STRING | STORED);
    builder.add_u64_field("size_bytes", INDEXED | STORED | FAST);
    builder.add_i64_field("uploaded_at", INDEXED | STORED | FAST);
    builder.build()
}

impl SearchIndex {
    /// Opens the index at `path`, creating it with the schema above when
    /// absent. Safe to call whether or not the index already exists; an
    /// existing index is the expected steady state, not an error.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create index directory: {}", path.display()))?;
        let dir = MmapDirectory::open(path)
            .with_context(|| format!("Failed to open index directory: {}", path.display()))?;
        let index = Index::open_or_create(dir, build_schema())?;
        let schema = index.schema();

        let fields = Fields {
            id: schema.get_field("id")?,
            owner_id: schema.get_field("owner_id")?,
            title: schema.get_field("title")?,
            content: schema.get_field("content")?,
            original_name: schema.get_field("original_name")?,
            file_type: schema.get_field("file_type")?,
            size_bytes: schema.get_field("size_bytes")?,
            uploaded_at: schema.get_field("uploaded_at")?,
        };

        let writer = index.writer(WRITER_MEMORY_BYTES)?;
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    /// Inserts or fully replaces the document with the same id.
    pub fn upsert(&self, document: &SearchDocument) -> Result<()> {
        let mut writer = self.lock_writer()?;
        writer.delete_term(Term::from_field_text(self.fields.id, &document.id));
        writer.add_document(doc!(
            self.fields.id => document.id.clone(),
            self.fields.owner_id => document.owner_id.clone(),
            self.fields.title => document.title.clone(),
            self.fields.content => document.content.clone(),
            self.fields.original_name => document.original_name.clone(),
            self.fields.file_type => document.file_type.clone(),
            self.fields.size_bytes => document.size_bytes,
            self.fields.uploaded_at => document.uploaded_at,
        ))?;
        writer.commit()?;
        Ok(())
    }

    /// Best-effort delete by id; a missing id is not an error.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut writer = self.lock_writer()?;
        writer.delete_term(Term::from_field_text(self.fields.id, id));
        writer.commit()?;
        Ok(())
    }

    /// Point lookup, independent of the metadata store.
    pub fn get_by_id(&self, id: &str) -> Result<Option<SearchDocument>> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.id, id),
            IndexRecordOption::Basic,
        );
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top.first() {
            Some((_, addr)) => {
                let stored: TantivyDocument = searcher.doc(*addr)?;
                Ok(Some(self.document_from_stored(&stored)))
            }
            None => Ok(None),
        }
    }

    /// Runs a search on behalf of `owner_id`. A blank `term` lists all of the
    /// owner's indexed documents, honoring the same filters/sort/pagination.
    pub fn query(&self, owner_id: &str, term: &str, opts: &QueryOptions) -> Result<SearchResults> {
        let started = Instant::now();
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let term = term.trim();

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(
            Occur::Must,
            Box::new(TermQuery::new(
                Term::from_field_text(self.fields.owner_id, owner_id),
                IndexRecordOption::Basic,
            )),
        )];

        if let Some(file_type) = &opts.file_type {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.file_type, file_type),
                    IndexRecordOption::Basic,
                )),
            ));
        }

        if opts.uploaded_from.is_some() || opts.uploaded_to.is_some() {
            let lower = match opts.uploaded_from {
                Some(v) => Bound::Included(Term::from_field_i64(self.fields.uploaded_at, v)),
                None => Bound::Unbounded,
            };
            let upper = match opts.uploaded_to {
                Some(v) => Bound::Included(Term::from_field_i64(self.fields.uploaded_at, v)),
                None => Bound::Unbounded,
            };
            clauses.push((Occur::Must, Box::new(RangeQuery::new(lower, upper))));
        }

        if !term.is_empty() {
            let mut parser = QueryParser::for_index(
                &self.index,
                vec![
                    self.fields.title,
                    self.fields.content,
                    self.fields.original_name,
                ],
            );
            for field in [
                self.fields.title,
                self.fields.content,
                self.fields.original_name,
            ] {
                parser.set_field_fuzzy(field, false, FUZZY_DISTANCE, true);
            }
            let (text_query, _lenient_errors) = parser.parse_query_lenient(term);
            clauses.push((Occur::Must, text_query));
        }

        let query: Box<dyn Query> = Box::new(BooleanQuery::new(clauses));
        let (top, total_estimate) =
            searcher.search(&query, &(TopDocs::with_limit(MAX_CANDIDATES), Count))?;

        let snippet_generator = if opts.highlight && !term.is_empty() {
            let mut generator = SnippetGenerator::create(&searcher, &*query, self.fields.content)?;
            generator.set_max_num_chars(opts.crop_chars.max(1));
            Some(generator)
        } else {
            None
        };

        let mut hits = Vec::with_capacity(top.len());
        let mut facet_distribution: BTreeMap<String, u64> = BTreeMap::new();
        for (score, addr) in top {
            let stored: TantivyDocument = searcher.doc(addr)?;
            let document = self.document_from_stored(&stored);
            if !document.file_type.is_empty() {
                *facet_distribution
                    .entry(document.file_type.clone())
                    .or_insert(0) += 1;
            }
            let snippet = snippet_generator.as_ref().map(|generator| {
                let html = generator.snippet_from_doc(&stored).to_html();
                if html.is_empty() {
                    crop_text(&document.content, opts.crop_chars)
                } else {
                    html.replace("<b>", "<em>").replace("</b>", "</em>")
                }
            });
            hits.push(IndexHit {
                doc: document,
                score,
                snippet,
            });
        }

        // Relevance order comes out of the collector; an explicit sort key
        // (and the blank-term listing) reorders the candidate set instead.
        let effective_sort = match opts.sort {
            Some(sort) => Some(sort),
            None if term.is_empty() => Some((SortKey::UploadedAt, SortDir::Desc)),
            None => None,
        };
        if let Some((key, dir)) = effective_sort {
            hits.sort_by(|a, b| {
                let ordering = match key {
                    SortKey::UploadedAt => a.doc.uploaded_at.cmp(&b.doc.uploaded_at),
                    SortKey::SizeBytes => a.doc.size_bytes.cmp(&b.doc.size_bytes),
                    SortKey::Title => a.doc.original_name.cmp(&b.doc.original_name),
                };
                let ordering = match dir {
                    SortDir::Asc => ordering,
                    SortDir::Desc => ordering.reverse(),
                };
                ordering.then_with(|| a.doc.id.cmp(&b.doc.id))
            });
        }

        let hits: Vec<IndexHit> = hits.into_iter().skip(opts.offset).take(opts.limit).collect();

        Ok(SearchResults {
            hits,
            total_estimate,
            timing_ms: started.elapsed().as_millis() as u64,
            facet_distribution,
        })
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>> {
        self.writer
            .lock()
            .map_err(|_| anyhow::anyhow!("index writer lock poisoned"))
    }

    fn document_from_stored(&self, stored: &TantivyDocument) -> SearchDocument {
        SearchDocument {
            id: stored_text(stored, self.fields.id),
            owner_id: stored_text(stored, self.fields.owner_id),
            title: stored_text(stored, self.fields.title),
            content: stored_text(stored, self.fields.content),
            original_name: stored_text(stored, self.fields.original_name),
            file_type: stored_text(stored, self.fields.file_type),
            size_bytes: stored
                .get_first(self.fields.size_bytes)
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            uploaded_at: stored
                .get_first(self.fields.uploaded_at)
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        }
    }
}

fn stored_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn crop_text(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let cropped: String = content.chars().take(max_chars).collect();
        format!("{}...", cropped.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_doc(id: &str, owner: &str, name: &str, content: &str, uploaded_at: i64) -> SearchDocument {
        SearchDocument {
            id: id.into(),
            owner_id: owner.into(),
            title: name.into(),
            content: content.into(),
            original_name: name.into(),
            file_type: crate::models::file_extension(name),
            size_bytes: content.len() as u64,
            uploaded_at,
        }
    }

    fn open_index(tmp: &tempfile::TempDir) -> SearchIndex {
        SearchIndex::open(&tmp.path().join("index")).unwrap()
    }

    #[test]
    fn open_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        {
            let index = open_index(&tmp);
            index.upsert(&test_doc("f1", "alice", "a.txt", "hello", 1)).unwrap();
        }
        // Second open over the existing directory must succeed and see the doc.
        let index = open_index(&tmp);
        assert!(index.get_by_id("f1").unwrap().is_some());
    }

    #[test]
    fn upsert_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        let doc = test_doc("f1", "alice", "fox.txt", "the quick brown fox", 1);
        index.upsert(&doc).unwrap();
        index.upsert(&doc).unwrap();

        let results = index.query("alice", "brown", &QueryOptions::default()).unwrap();
        assert_eq!(results.total_estimate, 1);
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].doc.id, "f1");
    }

    #[test]
    fn remove_missing_id_is_ok() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        index.remove("never-existed").unwrap();
    }

    #[test]
    fn remove_deletes_document() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        index.upsert(&test_doc("f1", "alice", "a.txt", "searchable words", 1)).unwrap();
        index.remove("f1").unwrap();
        assert!(index.get_by_id("f1").unwrap().is_none());
        let results = index.query("alice", "searchable", &QueryOptions::default()).unwrap();
        assert!(results.hits.is_empty());
    }

    #[test]
    fn owner_filter_isolates_queries() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        index.upsert(&test_doc("f1", "alice", "a.txt", "shared keyword", 1)).unwrap();
        index.upsert(&test_doc("f2", "bob", "b.txt", "shared keyword", 2)).unwrap();

        let results = index.query("alice", "shared", &QueryOptions::default()).unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].doc.owner_id, "alice");
    }

    #[test]
    fn blank_term_lists_with_sort_and_pagination() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        for i in 0..4 {
            index
                .upsert(&test_doc(
                    &format!("f{}", i),
                    "alice",
                    &format!("doc{}.txt", i),
                    "body",
                    i,
                ))
                .unwrap();
        }

        let opts = QueryOptions {
            limit: 2,
            offset: 1,
            ..Default::default()
        };
        let results = index.query("alice", "  ", &opts).unwrap();
        assert_eq!(results.total_estimate, 4);
        // Default sort is uploaded_at desc: f3, f2, f1, f0 — offset 1 takes f2, f1.
        let ids: Vec<&str> = results.hits.iter().map(|h| h.doc.id.as_str()).collect();
        assert_eq!(ids, vec!["f2", "f1"]);
        assert!(results.hits[0].snippet.is_none());
    }

    #[test]
    fn file_type_and_date_filters() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        index.upsert(&test_doc("f1", "alice", "a.txt", "report data", 1000)).unwrap();
        index.upsert(&test_doc("f2", "alice", "b.pdf", "report data", 2000)).unwrap();
        index.upsert(&test_doc("f3", "alice", "c.pdf", "report data", 3000)).unwrap();

        let opts = QueryOptions {
            file_type: Some(".pdf".into()),
            ..Default::default()
        };
        let results = index.query("alice", "report", &opts).unwrap();
        assert_eq!(results.hits.len(), 2);

        let opts = QueryOptions {
            uploaded_from: Some(1500),
            uploaded_to: Some(2500),
            ..Default::default()
        };
        let results = index.query("alice", "report", &opts).unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].doc.id, "f2");
    }

    #[test]
    fn facet_distribution_counts_types() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        index.upsert(&test_doc("f1", "alice", "a.txt", "report", 1)).unwrap();
        index.upsert(&test_doc("f2", "alice", "b.pdf", "report", 2)).unwrap();
        index.upsert(&test_doc("f3", "alice", "c.pdf", "report", 3)).unwrap();

        let results = index.query("alice", "report", &QueryOptions::default()).unwrap();
        assert_eq!(results.facet_distribution.get(".pdf"), Some(&2));
        assert_eq!(results.facet_distribution.get(".txt"), Some(&1));
    }

    #[test]
    fn snippet_highlights_match() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        index
            .upsert(&test_doc(
                "f1",
                "alice",
                "fox.txt",
                "The quick brown fox jumps over the lazy dog",
                1,
            ))
            .unwrap();

        let results = index.query("alice", "brown", &QueryOptions::default()).unwrap();
        let snippet = results.hits[0].snippet.as_deref().unwrap();
        assert!(snippet.contains("<em>brown</em>"), "snippet: {}", snippet);
    }

    #[test]
    fn explicit_sort_overrides_relevance_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = open_index(&tmp);
        index.upsert(&test_doc("f1", "alice", "a.txt", "word word word", 1)).unwrap();
        index.upsert(&test_doc("f2", "alice", "b.txt", "word", 2)).unwrap();

        let opts = QueryOptions {
            sort: Some((SortKey::UploadedAt, SortDir::Asc)),
            ..Default::default()
        };
        let results = index.query("alice", "word", &opts).unwrap();
        let ids: Vec<&str> = results.hits.iter().map(|h| h.doc.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2"]);
    }

    #[test]
    fn crop_text_bounds_length() {
        assert_eq!(crop_text("short", 10), "short");
        let long = "a".repeat(50);
        let cropped = crop_text(&long, 10);
        assert!(cropped.starts_with("aaaaaaaaaa"));
        assert!(cropped.ends_with("..."));
    }
}
