use serde::{Deserialize, Deserializer, Serialize};

// --- Search ---

/// Query parameters for `search.json`. `None` fields are left off the URL.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchQuery {
    #[serde(rename = "q", skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(rename = "state[id]", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "ntee[id]", skip_serializing_if = "Option::is_none")]
    pub ntee: Option<String>,
    /// Zero-based page index.
    pub page: u32,
}

/// One page of `search.json` results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub num_pages: u32,
    #[serde(default)]
    pub cur_page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub organizations: Vec<OrganizationSummary>,
}

impl SearchResponse {
    pub fn has_more(&self) -> bool {
        self.num_pages > 0 && self.cur_page < self.num_pages - 1
    }
}

/// A search hit. Only the fields the importer uses are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationSummary {
    #[serde(deserialize_with = "de_ein")]
    pub ein: String,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub ntee_code: Option<String>,
    pub subsection_code: Option<i64>,
    pub asset_amount: Option<i64>,
    pub income_amount: Option<i64>,
    pub revenue_amount: Option<i64>,
}

// --- Organization detail ---

/// Response of `organizations/{ein}.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationResponse {
    pub organization: OrganizationRecord,
    #[serde(default)]
    pub filings_with_data: Vec<FilingWithData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationRecord {
    #[serde(deserialize_with = "de_ein")]
    pub ein: String,
    pub name: String,
    pub careofname: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub ntee_code: Option<String>,
    pub subsection_code: Option<i64>,
    pub affiliation_code: Option<i64>,
    pub classification_codes: Option<String>,
    pub ruling_date: Option<String>,
    pub deductibility_code: Option<i64>,
    pub foundation_code: Option<i64>,
    pub activity_codes: Option<String>,
    pub organization_code: Option<i64>,
    pub exempt_organization_status_code: Option<i64>,
    pub tax_period: Option<i64>,
    pub asset_amount: Option<i64>,
    pub income_amount: Option<i64>,
    pub revenue_amount: Option<i64>,
    pub form_990_revenue_amount: Option<i64>,
    pub accounting_period: Option<i64>,
    pub sort_name: Option<String>,
}

impl OrganizationRecord {
    /// Older payloads carry `revenue_amount`, newer ones `form_990_revenue_amount`.
    pub fn revenue(&self) -> Option<i64> {
        self.form_990_revenue_amount.or(self.revenue_amount)
    }
}

/// A Form 990 filing with extracted financials. Upstream lists newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingWithData {
    pub tax_prd: i64,
    pub tax_prd_yr: i32,
    pub formtype: i64,
    pub pdf_url: Option<String>,
    pub totrevenue: Option<i64>,
    pub totfuncexpns: Option<i64>,
    pub totassetsend: Option<i64>,
    pub totliabend: Option<i64>,
    pub pct_compnsatncurrofcr: Option<f64>,
}

// --- EIN helpers ---

/// Strip everything but ASCII digits: `"11-1111111"` -> `"111111111"`.
pub fn clean_ein(ein: &str) -> String {
    ein.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Display form: zero-padded to nine digits with a dash after the second.
pub fn format_ein(ein: &str) -> String {
    let padded = format!("{:0>9}", clean_ein(ein));
    format!("{}-{}", &padded[..2], &padded[2..])
}

fn de_ein<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawEin {
        Number(u64),
        Text(String),
    }

    Ok(match RawEin::deserialize(deserializer)? {
        RawEin::Number(n) => format_ein(&n.to_string()),
        RawEin::Text(s) => format_ein(&s),
    })
}
