//! Metadata store — the authoritative record of every uploaded file.
//!
//! All owner-scoped operations treat "exists but belongs to someone else"
//! exactly like "does not exist": they return `None`/`false`, which the HTTP
//! layer maps to 404. The store never reveals whether a foreign id exists.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{
    format_bytes, FileRecord, FileTypeStats, ListFilter, SortDir, SortKey, StoreStats, User,
};

#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create(&self, record: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, owner_id, original_name, storage_path, mime_type, file_type, size_bytes, uploaded_at, indexed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.original_name)
        .bind(&record.storage_path)
        .bind(&record.mime_type)
        .bind(&record.file_type)
        .bind(record.size_bytes)
        .bind(record.uploaded_at)
        .bind(record.indexed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Owner-scoped point lookup.
    pub async fn find_by_id(&self, id: &str, owner_id: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM files WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Unscoped lookup, used only by the indexing pipeline (which runs on
    /// behalf of the system, not a requester).
    pub async fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Filtered, paginated listing of one owner's files plus the total
    /// matching count (for page-count computation).
    pub async fn list_by_owner(
        &self,
        owner_id: &str,
        filter: &ListFilter,
        sort: SortKey,
        dir: SortDir,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<FileRecord>, i64)> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut where_sql = String::from("owner_id = ?");
        if filter.mime_contains.is_some() {
            where_sql.push_str(" AND mime_type LIKE ?");
        }
        if filter.indexed.is_some() {
            where_sql.push_str(" AND indexed = ?");
        }

        let list_sql = format!(
            "SELECT * FROM files WHERE {} ORDER BY {} {} LIMIT ? OFFSET ?",
            where_sql,
            sort.column(),
            dir.sql()
        );
        let count_sql = format!("SELECT COUNT(*) FROM files WHERE {}", where_sql);

        let mut list_query = sqlx::query_as::<_, FileRecord>(&list_sql).bind(owner_id);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(owner_id);
        if let Some(mime) = &filter.mime_contains {
            let pattern = format!("%{}%", mime);
            list_query = list_query.bind(pattern.clone());
            count_query = count_query.bind(pattern);
        }
        if let Some(indexed) = filter.indexed {
            list_query = list_query.bind(indexed);
            count_query = count_query.bind(indexed);
        }

        let records = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let total = count_query.fetch_one(&self.pool).await?;

        Ok((records, total))
    }

    pub async fn set_indexed(&self, id: &str, indexed: bool) -> Result<()> {
        sqlx::query("UPDATE files SET indexed = ? WHERE id = ?")
            .bind(indexed)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Owner-scoped delete. Returns whether a row was removed.
    pub async fn delete(&self, id: &str, owner_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every record in the store, oldest first. Feeds the reindex sweep.
    pub async fn all_records(&self) -> Result<Vec<FileRecord>> {
        let records =
            sqlx::query_as::<_, FileRecord>("SELECT * FROM files ORDER BY uploaded_at ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    /// Aggregate counts, scoped to one owner or global (`None`, CLI use).
    pub async fn stats(&self, owner_id: Option<&str>) -> Result<StoreStats> {
        // Global scope binds an always-true predicate so both cases share SQL.
        let (scope, owner) = match owner_id {
            Some(owner) => ("owner_id = ?", owner.to_string()),
            None => ("? = ''", String::new()),
        };

        let total_files: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM files WHERE {}", scope))
                .bind(&owner)
                .fetch_one(&self.pool)
                .await?;

        let indexed_files: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM files WHERE {} AND indexed = 1",
            scope
        ))
        .bind(&owner)
        .fetch_one(&self.pool)
        .await?;

        let week_ago = chrono::Utc::now().timestamp() - 7 * 24 * 60 * 60;
        let recent_files: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM files WHERE {} AND uploaded_at >= ?",
            scope
        ))
        .bind(&owner)
        .bind(week_ago)
        .fetch_one(&self.pool)
        .await?;

        let total_size: i64 = sqlx::query_scalar(&format!(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM files WHERE {}",
            scope
        ))
        .bind(&owner)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT file_type, COUNT(*) AS count, COALESCE(SUM(size_bytes), 0) AS total_size
             FROM files WHERE {} GROUP BY file_type ORDER BY count DESC",
            scope
        ))
        .bind(&owner)
        .fetch_all(&self.pool)
        .await?;

        let file_types = rows
            .iter()
            .map(|row| FileTypeStats {
                extension: row.get("file_type"),
                count: row.get("count"),
                total_size: format_bytes(row.get::<i64, _>("total_size").max(0) as u64),
            })
            .collect();

        Ok(StoreStats {
            total_files,
            indexed_files,
            recent_files,
            total_size: format_bytes(total_size.max(0) as u64),
            file_types,
        })
    }

    // ============ Users ============

    pub async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, full_name, role, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.role)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Lookup for token validation: only active users resolve.
    pub async fn find_active_user(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ? AND is_active = 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn update_full_name(&self, id: &str, full_name: &str) -> Result<()> {
        sqlx::query("UPDATE users SET full_name = ? WHERE id = ?")
            .bind(full_name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> MetadataStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        MetadataStore::new(pool)
    }

    fn record(id: &str, owner: &str, name: &str, uploaded_at: i64) -> FileRecord {
        FileRecord {
            id: id.into(),
            owner_id: owner.into(),
            original_name: name.into(),
            storage_path: format!("uploads/{}", id),
            mime_type: "text/plain".into(),
            file_type: crate::models::file_extension(name),
            size_bytes: 100,
            uploaded_at,
            indexed: false,
        }
    }

    #[tokio::test]
    async fn wrong_owner_is_absent() {
        let store = test_store().await;
        store.create(&record("f1", "alice", "a.txt", 10)).await.unwrap();

        assert!(store.find_by_id("f1", "alice").await.unwrap().is_some());
        assert!(store.find_by_id("f1", "bob").await.unwrap().is_none());
        assert!(!store.delete("f1", "bob").await.unwrap());
        // Record untouched by the foreign delete attempt
        assert!(store.find_by_id("f1", "alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn listing_filters_and_paginates() {
        let store = test_store().await;
        for i in 0..5 {
            let mut r = record(&format!("f{}", i), "alice", &format!("doc{}.txt", i), i);
            r.indexed = i % 2 == 0;
            store.create(&r).await.unwrap();
        }
        store.create(&record("g1", "bob", "other.txt", 99)).await.unwrap();

        let (page1, total) = store
            .list_by_owner(
                "alice",
                &ListFilter::default(),
                SortKey::UploadedAt,
                SortDir::Desc,
                1,
                2,
            )
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].id, "f4");

        let (page3, _) = store
            .list_by_owner(
                "alice",
                &ListFilter::default(),
                SortKey::UploadedAt,
                SortDir::Desc,
                3,
                2,
            )
            .await
            .unwrap();
        assert_eq!(page3.len(), 1);

        let filter = ListFilter {
            indexed: Some(true),
            ..Default::default()
        };
        let (indexed, total) = store
            .list_by_owner("alice", &filter, SortKey::UploadedAt, SortDir::Desc, 1, 10)
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert!(indexed.iter().all(|r| r.indexed));
    }

    #[tokio::test]
    async fn set_indexed_flips_flag() {
        let store = test_store().await;
        store.create(&record("f1", "alice", "a.txt", 10)).await.unwrap();
        store.set_indexed("f1", true).await.unwrap();
        let r = store.find_by_id("f1", "alice").await.unwrap().unwrap();
        assert!(r.indexed);
    }

    #[tokio::test]
    async fn stats_are_owner_scoped() {
        let store = test_store().await;
        let now = chrono::Utc::now().timestamp();
        let mut r1 = record("f1", "alice", "a.txt", now);
        r1.indexed = true;
        store.create(&r1).await.unwrap();
        store.create(&record("f2", "alice", "b.pdf", now - 30 * 24 * 3600)).await.unwrap();
        store.create(&record("g1", "bob", "c.txt", now)).await.unwrap();

        let stats = store.stats(Some("alice")).await.unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.indexed_files, 1);
        assert_eq!(stats.recent_files, 1);
        assert_eq!(stats.file_types.len(), 2);

        let global = store.stats(None).await.unwrap();
        assert_eq!(global.total_files, 3);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let store = test_store().await;
        let user = User {
            id: "u1".into(),
            email: "a@example.com".into(),
            password_hash: "h".into(),
            full_name: "A".into(),
            role: "user".into(),
            is_active: true,
            created_at: 0,
        };
        store.create_user(&user).await.unwrap();
        let dup = User {
            id: "u2".into(),
            ..user.clone()
        };
        assert!(store.create_user(&dup).await.is_err());
    }
}
