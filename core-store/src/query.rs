//! Query option types for store listings.
//!
//! Filters compile into a `WHERE` clause plus an ordered bind list; the
//! repositories execute the resulting spec. Free-text search is a normalized
//! LIKE match across the configured text fields.

use serde::{Deserialize, Serialize};

use crate::models::{CachedSong, SyncState};

/// Bind value produced by the query spec builders
#[derive(Debug, Clone)]
pub enum BindValue {
    Text(String),
    I64(i64),
}

/// Compiled query fragment: conditions joined with AND plus binds in order
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub conditions: Vec<&'static str>,
    pub binds: Vec<BindValue>,
    pub order_by: &'static str,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl QuerySpec {
    /// Render the WHERE/ORDER BY/LIMIT tail of the statement
    pub fn render_tail(&self) -> String {
        let mut sql = String::new();

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY ");
        sql.push_str(self.order_by);

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        } else if let Some(offset) = self.offset {
            // SQLite requires a LIMIT clause before OFFSET
            sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset));
        }

        sql
    }
}

// =============================================================================
// Song queries
// =============================================================================

/// Sort order for song listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SongSort {
    /// Newest first
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    UpdatedAtDesc,
    TitleAsc,
    TitleDesc,
    /// Most recently read from the cache first
    LastAccessedDesc,
}

impl SongSort {
    fn as_sql(&self) -> &'static str {
        match self {
            SongSort::CreatedAtDesc => "created_at DESC, title ASC",
            SongSort::CreatedAtAsc => "created_at ASC, title ASC",
            SongSort::UpdatedAtDesc => "updated_at DESC, title ASC",
            SongSort::TitleAsc => "title COLLATE NOCASE ASC, created_at DESC",
            SongSort::TitleDesc => "title COLLATE NOCASE DESC, created_at DESC",
            SongSort::LastAccessedDesc => {
                "COALESCE(last_accessed_at, 0) DESC, created_at DESC"
            }
        }
    }
}

/// Filter/sort/pagination options for song listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SongQuery {
    /// Require every listed tag to be present
    pub tags: Vec<String>,
    /// Filter by sync state
    pub sync_state: Option<SyncState>,
    /// Only favorites
    pub favorites_only: bool,
    /// Created on/after this Unix timestamp
    pub created_after: Option<i64>,
    /// Created on/before this Unix timestamp
    pub created_before: Option<i64>,
    /// Free-text search across title, artist and lyrics
    pub search: Option<String>,
    /// Sort order
    pub sort: SongSort,
    /// Maximum number of rows
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u32>,
}

impl SongQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_sync_state(mut self, state: SyncState) -> Self {
        self.sync_state = Some(state);
        self
    }

    pub fn favorites(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    pub fn created_between(mut self, after: Option<i64>, before: Option<i64>) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_sort(mut self, sort: SongSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Compile into a query spec
    pub fn to_spec(&self) -> QuerySpec {
        let mut spec = QuerySpec {
            order_by: self.sort.as_sql(),
            limit: self.limit,
            offset: self.offset,
            ..Default::default()
        };

        if let Some(state) = self.sync_state {
            spec.conditions.push("sync_state = ?");
            spec.binds.push(BindValue::Text(state.as_str().to_string()));
        }

        if self.favorites_only {
            spec.conditions.push("is_favorite = 1");
        }

        if let Some(after) = self.created_after {
            spec.conditions.push("created_at >= ?");
            spec.binds.push(BindValue::I64(after));
        }

        if let Some(before) = self.created_before {
            spec.conditions.push("created_at <= ?");
            spec.binds.push(BindValue::I64(before));
        }

        // Tags are a JSON array column; match the quoted element text.
        for tag in &self.tags {
            spec.conditions.push("tags LIKE ?");
            spec.binds
                .push(BindValue::Text(format!("%\"{}\"%", tag.replace('"', ""))));
        }

        if let Some(search) = &self.search {
            let pattern = format!("%{}%", CachedSong::normalize(search));
            spec.conditions.push(
                "(LOWER(title) LIKE ? OR LOWER(COALESCE(artist, '')) LIKE ? \
                 OR LOWER(COALESCE(lyrics, '')) LIKE ?)",
            );
            spec.binds.push(BindValue::Text(pattern.clone()));
            spec.binds.push(BindValue::Text(pattern.clone()));
            spec.binds.push(BindValue::Text(pattern));
        }

        spec
    }
}

// =============================================================================
// Setlist queries
// =============================================================================

/// Sort order for setlist listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SetlistSort {
    #[default]
    CreatedAtDesc,
    NameAsc,
    LastUsedDesc,
}

impl SetlistSort {
    fn as_sql(&self) -> &'static str {
        match self {
            SetlistSort::CreatedAtDesc => "created_at DESC, name ASC",
            SetlistSort::NameAsc => "name COLLATE NOCASE ASC, created_at DESC",
            SetlistSort::LastUsedDesc => "COALESCE(last_used_at, 0) DESC, created_at DESC",
        }
    }
}

/// Filter/sort/pagination options for setlist listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetlistQuery {
    /// Filter by owning user
    pub created_by: Option<String>,
    /// Filter by sync state
    pub sync_state: Option<SyncState>,
    /// Free-text search over the name
    pub search: Option<String>,
    /// Sort order
    pub sort: SetlistSort,
    /// Maximum number of rows
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u32>,
}

impl SetlistQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_created_by(mut self, user_id: impl Into<String>) -> Self {
        self.created_by = Some(user_id.into());
        self
    }

    pub fn with_sync_state(mut self, state: SyncState) -> Self {
        self.sync_state = Some(state);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_sort(mut self, sort: SetlistSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Compile into a query spec
    pub fn to_spec(&self) -> QuerySpec {
        let mut spec = QuerySpec {
            order_by: self.sort.as_sql(),
            limit: self.limit,
            offset: self.offset,
            ..Default::default()
        };

        if let Some(created_by) = &self.created_by {
            spec.conditions.push("created_by = ?");
            spec.binds.push(BindValue::Text(created_by.clone()));
        }

        if let Some(state) = self.sync_state {
            spec.conditions.push("sync_state = ?");
            spec.binds.push(BindValue::Text(state.as_str().to_string()));
        }

        if let Some(search) = &self.search {
            let pattern = format!("%{}%", CachedSong::normalize(search));
            spec.conditions.push("LOWER(name) LIKE ?");
            spec.binds.push(BindValue::Text(pattern));
        }

        spec
    }
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            binds: Vec::new(),
            order_by: "created_at DESC",
            limit: None,
            offset: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_song_query_renders_order_only() {
        let spec = SongQuery::new().to_spec();
        assert!(spec.conditions.is_empty());
        assert_eq!(spec.render_tail(), " ORDER BY created_at DESC, title ASC");
    }

    #[test]
    fn test_song_query_filters_and_binds_align() {
        let spec = SongQuery::new()
            .with_sync_state(SyncState::Pending)
            .with_tag("hymn")
            .created_between(Some(100), Some(200))
            .with_search("grace")
            .to_spec();

        // sync_state + after + before + tag + 3 search binds
        assert_eq!(spec.binds.len(), 7);
        assert_eq!(spec.conditions.len(), 5);
        assert!(spec.render_tail().contains("WHERE"));
    }

    #[test]
    fn test_song_query_pagination() {
        let spec = SongQuery::new().paginate(10, 20).to_spec();
        let tail = spec.render_tail();
        assert!(tail.ends_with("LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_offset_without_limit_gets_unbounded_limit() {
        let mut spec = SongQuery::new().to_spec();
        spec.offset = Some(5);
        assert!(spec.render_tail().contains("LIMIT -1 OFFSET 5"));
    }

    #[test]
    fn test_setlist_query_by_owner() {
        let spec = SetlistQuery::new()
            .with_created_by("user-1")
            .with_sort(SetlistSort::NameAsc)
            .to_spec();

        assert_eq!(spec.conditions, vec!["created_by = ?"]);
        assert!(spec.render_tail().contains("name COLLATE NOCASE ASC"));
    }

    #[test]
    fn test_tag_pattern_strips_quotes() {
        let spec = SongQuery::new().with_tag("hy\"mn").to_spec();
        match &spec.binds[0] {
            BindValue::Text(pattern) => assert_eq!(pattern, "%\"hymn\"%"),
            other => panic!("unexpected bind {:?}", other),
        }
    }
}
