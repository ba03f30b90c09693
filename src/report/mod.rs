//! Failure reports. A report is something that can be created, looked up
//! by id, updated with a description and checklists, and closed. The
//! logging variant only writes to the log; the Trello variant keeps a
//! card and its checklists in sync.

pub mod logging;
pub mod trello;

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("a required key '{0}' is missing in the config")]
    MissingConfigKey(&'static str),
    #[error("no column named '{0}' on the board")]
    UnknownColumn(String),
}

/// One trackable item on a report checklist, with an optional link to
/// failure details. An empty link means "no link".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChecklistEntry {
    pub name: String,
    pub link: String,
}

impl ChecklistEntry {
    pub fn new(name: impl Into<String>, link: impl Into<String>) -> Self {
        ChecklistEntry {
            name: name.into(),
            link: link.into(),
        }
    }
}

/// Desired checklist state, keyed by checklist name.
pub type Checklist = BTreeMap<String, Vec<ChecklistEntry>>;

/// Fields to change on an active report. Absent fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct ReportUpdate {
    pub description: Option<String>,
    pub checklist: Option<Checklist>,
}

pub trait Report {
    fn report_id(&self) -> &str;

    fn update(&mut self, update: &ReportUpdate) -> anyhow::Result<()>;

    fn close(&mut self) -> anyhow::Result<()>;
}

/// Factory for the configured report backend.
pub trait Reporter {
    fn new_report(&self, title: &str, description: &str) -> anyhow::Result<Box<dyn Report>>;

    fn get_report(&self, report_id: &str) -> anyhow::Result<Box<dyn Report>>;
}
