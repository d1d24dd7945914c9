// Test mocks for the import pipeline.
//
// One mock per trait boundary:
// - MockSearch (SearchClient): page number → scripted page or failure
// - MockDetails (DetailFetcher): EIN → detail record, NotFound otherwise
// - FlakyStore (PersistenceGateway): MemoryOrgStore that rejects chosen EINs
//
// Plus builders for summary and detail records.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::document::SanitizedRecord;
use crate::error::{ImportError, Result};
use crate::store::MemoryOrgStore;
use crate::traits::{DetailFetcher, PersistenceGateway, SearchClient};
use crate::types::{
    Address, FinancialSnapshot, OrganizationDetailRecord, SearchCriteria, SearchPage,
    SearchSummaryRecord,
};

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

pub fn summary(ein: &str, name: &str) -> SearchSummaryRecord {
    SearchSummaryRecord {
        external_id: ein.to_string(),
        name: name.to_string(),
        city: Some("RALEIGH".to_string()),
        region: Some("NC".to_string()),
        category_code: Some("E32".to_string()),
        subsection_code: Some(3),
        financials: FinancialSnapshot::default(),
    }
}

pub fn detail(ein: &str, name: &str) -> OrganizationDetailRecord {
    OrganizationDetailRecord {
        external_id: ein.to_string(),
        name: name.to_string(),
        care_of_name: None,
        address: Address {
            street: Some("1 Main St".to_string()),
            city: Some("RALEIGH".to_string()),
            region: Some("NC".to_string()),
            postal_code: None,
        },
        ntee_code: Some("E32".to_string()),
        subsection_code: Some(3),
        affiliation_code: None,
        classification_codes: None,
        ruling_date: None,
        deductibility_code: None,
        foundation_code: None,
        activity_codes: None,
        organization_code: None,
        exempt_status_code: None,
        tax_period: None,
        asset_amount: Some(1_000),
        income_amount: None,
        revenue_amount: Some(500),
        accounting_period: None,
        sort_name: None,
        latest_filing: None,
        filing_history: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

enum ScriptedPage {
    Page(SearchPage),
    Fail(String),
}

/// Scripted search. Unregistered pages come back empty with `has_more = false`.
/// Records every requested page number.
pub struct MockSearch {
    pages: HashMap<u32, ScriptedPage>,
    cancel_on: HashMap<u32, CancellationToken>,
    calls: Mutex<Vec<u32>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            cancel_on: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Register page `page` of `total_pages`; `has_more` follows the upstream rule.
    pub fn on_page(self, page: u32, total_pages: u32, items: Vec<SearchSummaryRecord>) -> Self {
        let has_more = page.saturating_add(1) < total_pages;
        self.on_raw_page(SearchPage {
            total_results: items.len() as u64,
            items,
            current_page: page,
            total_pages,
            has_more,
        })
    }

    pub fn on_raw_page(mut self, page: SearchPage) -> Self {
        self.pages.insert(page.current_page, ScriptedPage::Page(page));
        self
    }

    pub fn failing_page(mut self, page: u32, message: &str) -> Self {
        self.pages
            .insert(page, ScriptedPage::Fail(message.to_string()));
        self
    }

    /// Cancel `token` while page `page` is being fetched (the fetch still completes).
    pub fn cancel_during(mut self, page: u32, token: CancellationToken) -> Self {
        self.cancel_on.insert(page, token);
        self
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for MockSearch {
    async fn search(&self, _criteria: &SearchCriteria, page: u32) -> Result<SearchPage> {
        self.calls.lock().unwrap().push(page);
        if let Some(token) = self.cancel_on.get(&page) {
            token.cancel();
        }
        match self.pages.get(&page) {
            Some(ScriptedPage::Page(p)) => Ok(p.clone()),
            Some(ScriptedPage::Fail(msg)) => Err(ImportError::Service(msg.clone())),
            None => Ok(SearchPage {
                current_page: page,
                ..SearchPage::default()
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MockDetails
// ---------------------------------------------------------------------------

/// EIN → detail. Unregistered EINs are `NotFound`; `failing` ones are a
/// `Service` error. Cancels `token` on the n-th fetch when configured.
pub struct MockDetails {
    records: HashMap<String, OrganizationDetailRecord>,
    failing: HashSet<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    calls: Mutex<Vec<String>>,
}

impl MockDetails {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            failing: HashSet::new(),
            cancel_after: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_detail(mut self, record: OrganizationDetailRecord) -> Self {
        self.records.insert(record.external_id.clone(), record);
        self
    }

    pub fn failing(mut self, ein: &str) -> Self {
        self.failing.insert(ein.to_string());
        self
    }

    pub fn cancel_after(mut self, fetches: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((fetches, token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockDetails {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetailFetcher for MockDetails {
    async fn fetch_detail(&self, external_id: &str) -> Result<OrganizationDetailRecord> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(external_id.to_string());
            calls.len()
        };
        if let Some((n, token)) = &self.cancel_after {
            if count == *n {
                token.cancel();
            }
        }

        if self.failing.contains(external_id) {
            return Err(ImportError::Service(format!("upstream 502 for {external_id}")));
        }
        self.records
            .get(external_id)
            .cloned()
            .ok_or_else(|| ImportError::NotFound(external_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// FlakyStore
// ---------------------------------------------------------------------------

/// In-memory store that refuses to persist the configured EINs.
pub struct FlakyStore {
    inner: MemoryOrgStore,
    rejected: HashSet<String>,
    upserts: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryOrgStore::new(),
            rejected: HashSet::new(),
            upserts: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(mut self, ein: &str) -> Self {
        self.rejected.insert(ein.to_string());
        self
    }

    pub fn inner(&self) -> &MemoryOrgStore {
        &self.inner
    }

    /// Every EIN passed to `upsert`, including rejected ones.
    pub fn upserts(&self) -> Vec<String> {
        self.upserts.lock().unwrap().clone()
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for FlakyStore {
    async fn upsert(&self, external_id: &str, record: SanitizedRecord) -> Result<Uuid> {
        self.upserts.lock().unwrap().push(external_id.to_string());
        if self.rejected.contains(external_id) {
            return Err(ImportError::Persistence(format!(
                "write rejected for {external_id}"
            )));
        }
        self.inner.upsert(external_id, record).await
    }

    async fn known_ids(&self) -> Result<HashSet<String>> {
        self.inner.known_ids().await
    }
}
