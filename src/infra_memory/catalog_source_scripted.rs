use crate::domain_port::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Script {
    pages: Vec<Vec<ExternalRecord>>,
    /// Errors returned, in order, before the page is served.
    queued_failures: HashMap<usize, VecDeque<FetchError>>,
    /// Error returned on every request for the page.
    permanent_failures: HashMap<usize, FetchError>,
    requests: HashMap<usize, u32>,
}

/// A paginated source served from memory. Page tokens are 1-based page numbers.
#[derive(Debug, Default)]
pub struct ScriptedCatalogSource {
    script: Mutex<Script>,
}

impl ScriptedCatalogSource {
    pub fn new(pages: Vec<Vec<ExternalRecord>>) -> Self {
        Self {
            script: Mutex::new(Script {
                pages,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_pages(&self, pages: Vec<Vec<ExternalRecord>>) {
        self.lock().pages = pages;
    }

    /// Fail the next `errors.len()` requests for `page` (1-based).
    pub fn fail_then_succeed(&self, page: usize, errors: Vec<FetchError>) {
        self.lock()
            .queued_failures
            .insert(page, errors.into_iter().collect());
    }

    pub fn fail_always(&self, page: usize, error: FetchError) {
        self.lock().permanent_failures.insert(page, error);
    }

    pub fn heal(&self, page: usize) {
        let mut script = self.lock();
        script.permanent_failures.remove(&page);
        script.queued_failures.remove(&page);
    }

    /// How many times `page` was requested.
    pub fn requests(&self, page: usize) -> u32 {
        self.lock().requests.get(&page).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl CatalogSource for ScriptedCatalogSource {
    async fn fetch_page(&self, page: Option<&PageToken>) -> Result<SourcePage, FetchError> {
        let number = match page {
            None => 1,
            Some(token) => token
                .0
                .parse::<usize>()
                .map_err(|e| FetchError::Permanent(format!("bad page token {token}: {e}")))?,
        };

        let mut script = self.lock();
        *script.requests.entry(number).or_insert(0) += 1;

        if let Some(error) = script.permanent_failures.get(&number) {
            return Err(error.clone());
        }
        if let Some(error) = script
            .queued_failures
            .get_mut(&number)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        if script.pages.is_empty() && number == 1 {
            return Ok(SourcePage::default());
        }
        let records = script
            .pages
            .get(number.wrapping_sub(1))
            .cloned()
            .ok_or_else(|| FetchError::Permanent(format!("no page {number}")))?;
        let next = (number < script.pages.len()).then(|| PageToken((number + 1).to_string()));
        Ok(SourcePage { records, next })
    }
}
