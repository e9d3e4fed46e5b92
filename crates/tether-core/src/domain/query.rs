//! Listing queries and their canonical cache keys
//!
//! Query-result caches are keyed by a canonical string so two logically
//! identical queries share an entry regardless of filter insertion order:
//!
//! ```text
//! query:{collection}:page={page}:size={page_size}:q={search}:{k}={v}:...
//! ```
//!
//! Search text and filter pairs are form-urlencoded, so a `:` or `=` inside
//! them cannot be mistaken for a separator.
//!
//! Every key for a collection starts with [`CollectionQuery::cache_prefix`],
//! which is what push events and local writes invalidate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::form_urlencoded::byte_serialize;

use super::errors::DomainError;
use super::newtypes::CollectionName;

/// Upper bound on `page_size` accepted from callers
pub const MAX_PAGE_SIZE: u32 = 500;

/// A page of a collection listing, optionally searched and filtered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionQuery {
    pub collection: CollectionName,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    /// Exact-match field filters (`status=draft`, `category=roses`)
    pub filters: BTreeMap<String, String>,
}

impl CollectionQuery {
    /// First page of a collection with the given page size
    pub fn new(collection: CollectionName, page_size: u32) -> Self {
        Self {
            collection,
            page: 1,
            page_size,
            search: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        self.search = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Check page bounds
    ///
    /// # Errors
    /// `page` must be >= 1 and `page_size` in `1..=MAX_PAGE_SIZE`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.page == 0 {
            return Err(DomainError::InvalidQuery("page starts at 1".to_string()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(DomainError::InvalidQuery(format!(
                "page_size must be in 1..={MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }

    /// Prefix shared by every cached query of `collection`
    pub fn cache_prefix(collection: &CollectionName) -> String {
        format!("query:{}:", collection.as_str())
    }

    /// Canonical cache key for this query
    pub fn cache_key(&self) -> String {
        let mut key = format!(
            "{}page={}:size={}:q={}",
            Self::cache_prefix(&self.collection),
            self.page,
            self.page_size,
            encode(self.search.as_deref().unwrap_or(""))
        );
        for (field, value) in &self.filters {
            key.push(':');
            key.push_str(&encode(field));
            key.push('=');
            key.push_str(&encode(value));
        }
        key
    }

    /// Query-string parameters for the listing endpoint
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("pageSize".to_string(), self.page_size.to_string()),
        ];
        if let Some(q) = &self.search {
            params.push(("q".to_string(), q.clone()));
        }
        for (field, value) in &self.filters {
            params.push((field.clone(), value.clone()));
        }
        params
    }
}

fn encode(part: &str) -> String {
    byte_serialize(part.as_bytes()).collect()
}
