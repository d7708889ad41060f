//! In-memory directory and backend clients
//!
//! Useful for tests and for dry runs without a directory server or backend
//! system. Both support failure injection and record what they were asked.

use async_trait::async_trait;
use attrbridge_core::{
    BackendClient, BackendImports, BackendResponse, BackendRow, BackendTable, ConnectionSettings,
    CoreError, DirectoryClient, DirectoryConnection, DirectoryEntry, Result, SearchPage,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    COLUMN_AOR_ID, COLUMN_KEY, COLUMN_VALUE, EXPORT_AOR_DETAILS, EXPORT_RETURN, GET_ALL_YES,
    IMPORT_AOR_ID, IMPORT_GET_ALL, RETURN_ID, RETURN_MESSAGE, RETURN_NUMBER, RETURN_TYPE,
};
use crate::directory::escape_filter_value;

#[derive(Default)]
struct DomainState {
    /// `(search base, entry)` pairs in insertion order
    entries: Vec<(String, DirectoryEntry)>,
    failures_remaining: u32,
    connect_attempts: usize,
    page_requests: usize,
    last_filter: Option<String>,
}

/// Directory client serving entries from memory, one data set per domain
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    domains: Arc<Mutex<HashMap<String, DomainState>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, domain: &str, base: &str, entry: DirectoryEntry) {
        self.domains
            .lock()
            .entry(domain.to_string())
            .or_default()
            .entries
            .push((base.to_string(), entry));
    }

    /// Make every connection attempt to `domain` fail
    pub fn fail_domain(&self, domain: &str) {
        self.fail_domain_times(domain, u32::MAX);
    }

    /// Make the next `times` connection attempts to `domain` fail
    pub fn fail_domain_times(&self, domain: &str, times: u32) {
        self.domains
            .lock()
            .entry(domain.to_string())
            .or_default()
            .failures_remaining = times;
    }

    pub fn connect_attempts(&self, domain: &str) -> usize {
        self.domains.lock().get(domain).map_or(0, |d| d.connect_attempts)
    }

    /// Number of paged search requests served for `domain`
    pub fn page_requests(&self, domain: &str) -> usize {
        self.domains.lock().get(domain).map_or(0, |d| d.page_requests)
    }

    pub fn last_filter(&self, domain: &str) -> Option<String> {
        self.domains
            .lock()
            .get(domain)
            .and_then(|d| d.last_filter.clone())
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Box<dyn DirectoryConnection>> {
        let mut domains = self.domains.lock();
        let state = domains.entry(settings.domain.clone()).or_default();
        state.connect_attempts += 1;

        if state.failures_remaining > 0 {
            if state.failures_remaining != u32::MAX {
                state.failures_remaining -= 1;
            }
            return Err(CoreError::transient(format!(
                "{} is unreachable",
                settings.url
            )));
        }

        Ok(Box::new(InMemoryConnection {
            domain: settings.domain.clone(),
            domains: self.domains.clone(),
        }))
    }
}

struct InMemoryConnection {
    domain: String,
    domains: Arc<Mutex<HashMap<String, DomainState>>>,
}

#[async_trait]
impl DirectoryConnection for InMemoryConnection {
    async fn search(
        &self,
        base: &str,
        filter: &str,
        _attributes: &[String],
        page_size: u32,
        cookie: Option<&[u8]>,
    ) -> Result<SearchPage> {
        let mut domains = self.domains.lock();
        let state = domains.entry(self.domain.clone()).or_default();
        state.page_requests += 1;
        state.last_filter = Some(filter.to_string());

        let under_base: Vec<&DirectoryEntry> = state
            .entries
            .iter()
            .filter(|(b, _)| b == base)
            .map(|(_, e)| e)
            .collect();

        let offset = match cookie {
            Some(bytes) if bytes.len() == 4 => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
            Some(_) => return Err(CoreError::decoding("unrecognized paging cookie")),
            None => 0,
        };
        let end = (offset + page_size.max(1) as usize).min(under_base.len());
        let entries = under_base
            .get(offset..end)
            .unwrap_or(&[])
            .iter()
            .map(|e| (*e).clone())
            .collect();

        Ok(SearchPage {
            entries,
            cookie: (end < under_base.len()).then(|| (end as u32).to_le_bytes().to_vec()),
            total: Some(under_base.len() as u32),
        })
    }

    async fn search_once(
        &self,
        base: &str,
        filter: &str,
        _attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        let mut domains = self.domains.lock();
        let state = domains.entry(self.domain.clone()).or_default();
        state.last_filter = Some(filter.to_string());

        let filter = filter.to_lowercase();
        Ok(state
            .entries
            .iter()
            .filter(|(b, entry)| b == base && asserted_by(&filter, entry))
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

/// Whether any `(name=value)` assertion of the entry appears in the filter
fn asserted_by(filter: &str, entry: &DirectoryEntry) -> bool {
    entry.attributes().any(|(name, values)| {
        values.iter().any(|value| {
            let assertion = format!("({}={})", name, escape_filter_value(&value.to_text()));
            filter.contains(&assertion.to_lowercase())
        })
    })
}

#[derive(Default)]
struct BackendState {
    /// `(id, key, value)` detail rows
    details: Vec<(String, String, String)>,
    return_rows: Vec<BackendRow>,
    failures_remaining: u32,
    empty_response: bool,
    latency: Option<Duration>,
    calls: usize,
    last_imports: Option<BackendImports>,
}

/// Backend client exposing one function on one server prefix
pub struct InMemoryBackend {
    server_prefix: String,
    function: String,
    state: Mutex<BackendState>,
}

impl InMemoryBackend {
    pub fn new(server_prefix: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            server_prefix: server_prefix.into(),
            function: function.into(),
            state: Mutex::new(BackendState::default()),
        }
    }

    pub fn add_detail(&self, id: &str, key: &str, value: &str) {
        self.state
            .lock()
            .details
            .push((id.to_string(), key.to_string(), value.to_string()));
    }

    /// Answer every call with a backend error row
    pub fn add_return_message(&self, kind: &str, id: &str, number: &str, message: &str) {
        let row = [
            (RETURN_TYPE, kind),
            (RETURN_ID, id),
            (RETURN_NUMBER, number),
            (RETURN_MESSAGE, message),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        self.state.lock().return_rows.push(row);
    }

    /// Fail the next `times` calls with a transient error
    pub fn fail_next(&self, times: u32) {
        self.state.lock().failures_remaining = times;
    }

    /// Answer with no export tables at all
    pub fn respond_empty(&self) {
        self.state.lock().empty_response = true;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    pub fn last_imports(&self) -> Option<BackendImports> {
        self.state.lock().last_imports.clone()
    }

    fn respond(&self, imports: &BackendImports) -> Result<BackendResponse> {
        let mut state = self.state.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(CoreError::transient("backend connection reset"));
        }
        if state.empty_response {
            return Ok(BackendResponse::empty());
        }

        let get_all = imports.scalars.get(IMPORT_GET_ALL).map(String::as_str) == Some(GET_ALL_YES);
        let wanted: Vec<&str> = imports
            .tables
            .get(IMPORT_AOR_ID)
            .map(|table| {
                table
                    .rows
                    .iter()
                    .filter_map(|row| row.get(COLUMN_AOR_ID).map(String::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let mut details = BackendTable::new();
        for (id, key, value) in &state.details {
            if get_all || wanted.contains(&id.as_str()) {
                details.push_row([
                    (COLUMN_AOR_ID, id.as_str()),
                    (COLUMN_KEY, key.as_str()),
                    (COLUMN_VALUE, value.as_str()),
                ]);
            }
        }

        let returns = BackendTable {
            rows: state.return_rows.clone(),
        };

        Ok(BackendResponse::empty()
            .with_table(EXPORT_RETURN, returns)
            .with_table(EXPORT_AOR_DETAILS, details))
    }
}

#[async_trait]
impl BackendClient for InMemoryBackend {
    async fn invoke(
        &self,
        server_prefix: &str,
        function: &str,
        imports: &BackendImports,
    ) -> Result<BackendResponse> {
        let latency = {
            let mut state = self.state.lock();
            state.calls += 1;
            state.last_imports = Some(imports.clone());
            state.latency
        };

        if server_prefix != self.server_prefix {
            return Err(CoreError::UnknownServer(server_prefix.to_string()));
        }
        if function != self.function {
            return Err(CoreError::UnknownFunction(function.to_string()));
        }

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.respond(imports)
    }
}
