//! In-memory doubles for the source and store seams

#![allow(dead_code)]

use async_trait::async_trait;
use roster_ingest::error::{SourceError, StoreError};
use roster_ingest::models::StudentRecord;
use roster_ingest::source::RecordSource;
use roster_ingest::storage::{InsertOutcome, RecordStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,roster_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Something a double observed, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Listing(usize),
    Detail(String),
    Insert(String),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn rolls(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("{}{}", prefix, n)).collect()
}

pub fn listing_html(rolls: &[String]) -> String {
    let rows: String = rolls
        .iter()
        .map(|roll| format!(r#"<tr><td class="TableText"><a href="?r={0}">{0}</a></td></tr>"#, roll))
        .collect();
    format!("<html><body><table>{}</table></body></html>", rows)
}

pub fn detail_html(roll: &str) -> String {
    format!(
        "<html><body><div class=\"TableContent\">\
         <p>Name : STUDENT {0}</p>\
         <p>Program : BTech</p>\
         <p>E-Mail : s{0}@iitk.ac.in</p>\
         </div></body></html>",
        roll
    )
}

/// Directory double: listing pages keyed by offset, details built per roll
#[derive(Default)]
pub struct MockSource {
    pages: HashMap<usize, Vec<String>>,
    failing_pages: HashSet<usize>,
    failing_details: HashSet<String>,
    hanging_details: HashSet<String>,
    detail_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    events: EventLog,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, offset: usize, rolls: Vec<String>) -> Self {
        self.pages.insert(offset, rolls);
        self
    }

    pub fn failing_page(mut self, offset: usize) -> Self {
        self.failing_pages.insert(offset);
        self
    }

    pub fn failing_detail(mut self, roll: &str) -> Self {
        self.failing_details.insert(roll.to_string());
        self
    }

    /// The detail request for `roll` never completes on its own
    pub fn hanging_detail(mut self, roll: &str) -> Self {
        self.hanging_details.insert(roll.to_string());
        self
    }

    pub fn with_detail_delay(mut self, delay: Duration) -> Self {
        self.detail_delay = Some(delay);
        self
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RecordSource for MockSource {
    async fn fetch_listing(&self, offset: usize) -> Result<String, SourceError> {
        self.record(Event::Listing(offset));

        if self.failing_pages.contains(&offset) {
            return Err(SourceError::Status {
                status: 503,
                url: format!("listing {}", offset),
            });
        }

        let rolls = self.pages.get(&offset).cloned().unwrap_or_default();
        Ok(listing_html(&rolls))
    }

    async fn fetch_detail(&self, roll: &str) -> Result<String, SourceError> {
        self.record(Event::Detail(roll.to_string()));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.hanging_details.contains(roll) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        } else if let Some(delay) = self.detail_delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_details.contains(roll) {
            return Err(SourceError::Status {
                status: 500,
                url: format!("detail {}", roll),
            });
        }

        Ok(detail_html(roll))
    }
}

/// Store double recording every insert call
#[derive(Default)]
pub struct MockStore {
    inserted: Mutex<Vec<StudentRecord>>,
    already_present: HashSet<String>,
    failing_roll: Option<String>,
    events: EventLog,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `roll` was written by an earlier run
    pub fn with_present(mut self, roll: &str) -> Self {
        self.already_present.insert(roll.to_string());
        self
    }

    pub fn failing_on(mut self, roll: &str) -> Self {
        self.failing_roll = Some(roll.to_string());
        self
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn inserted_records(&self) -> Vec<StudentRecord> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn inserted_rolls(&self) -> Vec<String> {
        self.inserted
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.roll.clone())
            .collect()
    }

    pub fn insert_count(&self, roll: &str) -> usize {
        self.inserted_rolls().iter().filter(|r| r.as_str() == roll).count()
    }
}

#[async_trait]
impl RecordStore for MockStore {
    async fn create_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert(&self, record: &StudentRecord) -> Result<InsertOutcome, StoreError> {
        self.events.lock().unwrap().push(Event::Insert(record.roll.clone()));

        if self.failing_roll.as_deref() == Some(record.roll.as_str()) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }

        if self.already_present.contains(&record.roll) {
            return Ok(InsertOutcome::AlreadyPresent);
        }

        self.inserted.lock().unwrap().push(record.clone());
        Ok(InsertOutcome::Inserted)
    }
}
