// Trait seams for the import pipeline.
//
// SearchClient and DetailFetcher front the upstream directory; the
// ProPublica client implements both. PersistenceGateway fronts storage.
// The orchestrator only sees these traits, so tests drive it with the
// mocks in `testing.rs`: no network, no database.

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use propublica_client::{ProPublicaClient, SearchQuery};

use crate::document::SanitizedRecord;
use crate::error::Result;
use crate::types::{OrganizationDetailRecord, SearchCriteria, SearchPage, SearchSummaryRecord};

// ---------------------------------------------------------------------------
// SearchClient
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Fetch one zero-based page of summaries. An error here ends the run.
    async fn search(&self, criteria: &SearchCriteria, page: u32) -> Result<SearchPage>;
}

// ---------------------------------------------------------------------------
// DetailFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DetailFetcher: Send + Sync {
    /// `NotFound` when the identifier no longer resolves upstream.
    async fn fetch_detail(&self, external_id: &str) -> Result<OrganizationDetailRecord>;
}

// ---------------------------------------------------------------------------
// PersistenceGateway
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Create or merge the record for `external_id`, appending the prior
    /// mutable values to its import history. Returns the stored id.
    async fn upsert(&self, external_id: &str, record: SanitizedRecord) -> Result<Uuid>;

    /// Every identifier already persisted. Used to seed deduplication.
    async fn known_ids(&self) -> Result<HashSet<String>>;
}

// ---------------------------------------------------------------------------
// ProPublica adapters
// ---------------------------------------------------------------------------

#[async_trait]
impl SearchClient for ProPublicaClient {
    async fn search(&self, criteria: &SearchCriteria, page: u32) -> Result<SearchPage> {
        let query = SearchQuery {
            term: criteria.term.clone().filter(|s| !s.is_empty()),
            state: criteria.region.clone().filter(|s| !s.is_empty()),
            ntee: criteria.category.clone().filter(|s| !s.is_empty()),
            page,
        };

        let resp = ProPublicaClient::search(self, &query).await?;
        let has_more = resp.has_more();

        // The API has no city filter; narrow each page locally.
        let locality = criteria
            .locality
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let items = resp
            .organizations
            .into_iter()
            .filter(|org| match (locality, org.city.as_deref()) {
                (None, _) => true,
                (Some(want), Some(city)) => city.eq_ignore_ascii_case(want),
                (Some(_), None) => false,
            })
            .map(SearchSummaryRecord::from)
            .collect();

        Ok(SearchPage {
            items,
            total_results: resp.total_results,
            current_page: resp.cur_page,
            total_pages: resp.num_pages,
            has_more,
        })
    }
}

#[async_trait]
impl DetailFetcher for ProPublicaClient {
    async fn fetch_detail(&self, external_id: &str) -> Result<OrganizationDetailRecord> {
        let resp = self.organization(external_id).await?;
        Ok(OrganizationDetailRecord::from(resp))
    }
}
