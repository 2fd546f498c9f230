//! Paginated record listing.

use roost_engine::Record;
use serde::{Deserialize, Serialize};

use super::{authorize, check, endpoint, BaasClient};
use crate::error::Result;

/// Query parameters for the list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// 1-based page number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    /// Sort expression, e.g. `-created,id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    /// Filter expression evaluated by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Relations to inline into each record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }
}

/// One page of the list endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub page: u32,
    pub per_page: u32,
    /// `-1` when the server skipped counting
    pub total_items: i64,
    pub total_pages: i64,
    pub items: Vec<Record>,
}

impl ListPage {
    /// Check if pages remain after this one.
    ///
    /// An empty page always ends the walk, whatever the totals claim.
    pub fn has_more(&self) -> bool {
        if self.items.is_empty() {
            return false;
        }
        if self.total_pages >= 0 {
            (self.page as i64) < self.total_pages
        } else {
            self.items.len() >= self.per_page as usize
        }
    }
}

impl BaasClient {
    /// Fetch a single page of `collection`.
    pub async fn list(&self, collection: &str, query: &ListQuery) -> Result<ListPage> {
        let url = endpoint(self.config(), &["api", "collections", collection, "records"])?;

        let request = authorize(
            self.http()
                .get(url)
                .query(query)
                .timeout(self.config().request_timeout),
            self.config(),
        );
        let response = check(request.send().await?).await?;
        let page: ListPage = serde_json::from_slice(&response.bytes().await?)?;

        tracing::debug!(
            collection = %collection,
            page = page.page,
            items = page.items.len(),
            total_items = page.total_items,
            "Fetched record page"
        );

        Ok(page)
    }

    /// Fetch every page of `collection`, in server order.
    ///
    /// `query.page` is ignored; `query.per_page` defaults to the configured
    /// page size.
    pub async fn list_all(&self, collection: &str, query: &ListQuery) -> Result<Vec<Record>> {
        let mut query = query.clone();
        query.per_page = Some(query.per_page.unwrap_or(self.config().page_size));

        let mut records = Vec::new();
        let mut page_number = 1;
        loop {
            query.page = Some(page_number);
            let page = self.list(collection, &query).await?;
            let more = page.has_more();
            records.extend(page.items);

            if !more {
                break;
            }
            page_number += 1;
        }

        tracing::debug!(
            collection = %collection,
            records = records.len(),
            pages = page_number,
            "Fetched full collection"
        );

        Ok(records)
    }
}
