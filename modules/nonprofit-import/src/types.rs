use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use propublica_client::{format_ein, FilingWithData, OrganizationResponse, OrganizationSummary};

use crate::document::Document;
use crate::error::{ImportError, Result};

// --- Search side ---

/// Filter criteria for a directory search. Empty criteria list everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub term: Option<String>,
    /// Two-letter state code.
    pub region: Option<String>,
    /// City name, matched case-insensitively.
    pub locality: Option<String>,
    /// NTEE major category id ("1".."10").
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub assets: Option<i64>,
    pub income: Option<i64>,
    pub revenue: Option<i64>,
}

/// Lightweight search hit. Never persisted; only used for listing and dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSummaryRecord {
    pub external_id: String,
    pub name: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub category_code: Option<String>,
    pub subsection_code: Option<i64>,
    pub financials: FinancialSnapshot,
}

impl From<OrganizationSummary> for SearchSummaryRecord {
    fn from(org: OrganizationSummary) -> Self {
        Self {
            external_id: org.ein,
            name: org.name,
            city: org.city,
            region: org.state,
            category_code: org.ntee_code,
            subsection_code: org.subsection_code,
            financials: FinancialSnapshot {
                assets: org.asset_amount,
                income: org.income_amount,
                revenue: org.revenue_amount,
            },
        }
    }
}

/// One page of search results. `current_page` is zero-based.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<SearchSummaryRecord>,
    pub total_results: u64,
    pub current_page: u32,
    pub total_pages: u32,
    pub has_more: bool,
}

// --- Detail side ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
}

/// A Form 990 filing with its headline financials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    pub tax_period: i64,
    pub tax_year: i32,
    pub form_type: i64,
    pub pdf_url: Option<String>,
    pub total_revenue: Option<i64>,
    pub total_expenses: Option<i64>,
    pub total_assets: Option<i64>,
    pub total_liabilities: Option<i64>,
    pub compensation_percent: Option<f64>,
}

impl From<FilingWithData> for Filing {
    fn from(f: FilingWithData) -> Self {
        Self {
            tax_period: f.tax_prd,
            tax_year: f.tax_prd_yr,
            form_type: f.formtype,
            pdf_url: f.pdf_url,
            total_revenue: f.totrevenue,
            total_expenses: f.totfuncexpns,
            total_assets: f.totassetsend,
            total_liabilities: f.totliabend,
            compensation_percent: f.pct_compnsatncurrofcr,
        }
    }
}

impl Filing {
    fn to_document(&self) -> Document {
        Document::object([
            ("taxPeriod", self.tax_period.into()),
            ("taxYear", self.tax_year.into()),
            ("formType", self.form_type.into()),
            ("pdfUrl", self.pdf_url.clone().into()),
            ("totalRevenue", self.total_revenue.into()),
            ("totalExpenses", self.total_expenses.into()),
            ("totalAssets", self.total_assets.into()),
            ("totalLiabilities", self.total_liabilities.into()),
            ("compensationPercent", self.compensation_percent.into()),
        ])
    }
}

/// Full organization record as fetched from the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationDetailRecord {
    pub external_id: String,
    pub name: String,
    pub care_of_name: Option<String>,
    pub address: Address,
    pub ntee_code: Option<String>,
    pub subsection_code: Option<i64>,
    pub affiliation_code: Option<i64>,
    pub classification_codes: Option<String>,
    pub ruling_date: Option<String>,
    pub deductibility_code: Option<i64>,
    pub foundation_code: Option<i64>,
    pub activity_codes: Option<String>,
    pub organization_code: Option<i64>,
    pub exempt_status_code: Option<i64>,
    pub tax_period: Option<i64>,
    pub asset_amount: Option<i64>,
    pub income_amount: Option<i64>,
    pub revenue_amount: Option<i64>,
    pub accounting_period: Option<i64>,
    pub sort_name: Option<String>,
    pub latest_filing: Option<Filing>,
    /// Oldest to newest by tax year.
    pub filing_history: Vec<Filing>,
}

impl From<OrganizationResponse> for OrganizationDetailRecord {
    fn from(resp: OrganizationResponse) -> Self {
        let org = resp.organization;
        let revenue_amount = org.revenue();

        let mut filing_history: Vec<Filing> =
            resp.filings_with_data.into_iter().map(Filing::from).collect();
        filing_history.sort_by_key(|f| (f.tax_year, f.tax_period));
        let latest_filing = filing_history.last().cloned();

        Self {
            external_id: org.ein,
            name: org.name,
            care_of_name: org.careofname,
            address: Address {
                street: org.address,
                city: org.city,
                region: org.state,
                postal_code: org.zipcode,
            },
            ntee_code: org.ntee_code,
            subsection_code: org.subsection_code,
            affiliation_code: org.affiliation_code,
            classification_codes: org.classification_codes,
            ruling_date: org.ruling_date,
            deductibility_code: org.deductibility_code,
            foundation_code: org.foundation_code,
            activity_codes: org.activity_codes,
            organization_code: org.organization_code,
            exempt_status_code: org.exempt_organization_status_code,
            tax_period: org.tax_period,
            asset_amount: org.asset_amount,
            income_amount: org.income_amount,
            revenue_amount,
            accounting_period: org.accounting_period,
            sort_name: org.sort_name,
            latest_filing,
            filing_history,
        }
    }
}

impl OrganizationDetailRecord {
    /// Reject payloads that cannot be stored under the requested identifier.
    pub fn validate(&self, requested_id: &str) -> Result<()> {
        if format_ein(&self.external_id) != format_ein(requested_id) {
            return Err(ImportError::Validation(format!(
                "requested {requested_id} but upstream returned {}",
                self.external_id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(ImportError::Validation(format!(
                "{requested_id} has no organization name"
            )));
        }
        Ok(())
    }

    /// Storage shape. Missing optional values become `Document::Absent`.
    pub fn to_document(&self) -> Document {
        Document::object([
            ("ein", self.external_id.as_str().into()),
            ("name", self.name.as_str().into()),
            ("careOfName", self.care_of_name.clone().into()),
            (
                "address",
                Document::object([
                    ("street", self.address.street.clone().into()),
                    ("city", self.address.city.clone().into()),
                    ("state", self.address.region.clone().into()),
                    ("zipCode", self.address.postal_code.clone().into()),
                ]),
            ),
            ("nteeCode", self.ntee_code.clone().into()),
            ("subsectionCode", self.subsection_code.into()),
            ("affiliationCode", self.affiliation_code.into()),
            ("classificationCodes", self.classification_codes.clone().into()),
            ("rulingDate", self.ruling_date.clone().into()),
            ("deductibilityCode", self.deductibility_code.into()),
            ("foundationCode", self.foundation_code.into()),
            ("activityCodes", self.activity_codes.clone().into()),
            ("organizationCode", self.organization_code.into()),
            ("exemptStatusCode", self.exempt_status_code.into()),
            ("taxPeriod", self.tax_period.into()),
            ("assetAmount", self.asset_amount.into()),
            ("incomeAmount", self.income_amount.into()),
            ("revenueAmount", self.revenue_amount.into()),
            ("accountingPeriod", self.accounting_period.into()),
            ("sortName", self.sort_name.clone().into()),
            (
                "latestFiling",
                self.latest_filing
                    .as_ref()
                    .map(Filing::to_document)
                    .unwrap_or(Document::Absent),
            ),
            (
                "filingHistory",
                Document::Array(self.filing_history.iter().map(Filing::to_document).collect()),
            ),
        ])
    }
}

// --- Run bookkeeping ---

/// Per-run counters. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub pages_processed: u64,
}

impl ImportStats {
    /// Items observed so far: every item lands in exactly one bucket.
    pub fn observed(&self) -> u64 {
        self.imported + self.skipped + self.failed
    }
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Import Run ===")?;
        writeln!(f, "Pages processed: {}", self.pages_processed)?;
        writeln!(f, "Imported:        {}", self.imported)?;
        writeln!(f, "Skipped:         {} (already imported)", self.skipped)?;
        writeln!(f, "Failed:          {}", self.failed)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled | RunState::Failed)
    }
}

// --- Persisted shape ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    /// Unknown values fall back to `Pending` so they resurface for review.
    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => ReviewStatus::Approved,
            "rejected" => ReviewStatus::Rejected,
            _ => ReviewStatus::Pending,
        }
    }
}

/// Prior values of the mutable fields, captured before a re-import merged over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportHistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub previous: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOrgRecord {
    pub id: Uuid,
    pub external_id: String,
    /// Sanitized organization document, merged across imports.
    pub record: serde_json::Value,
    pub source_system: String,
    pub review_status: ReviewStatus,
    pub import_history: Vec<ImportHistoryEntry>,
    pub imported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
