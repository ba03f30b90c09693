use std::path::Path;

use log::warn;

/// One repository handed to the query backend. The positional `id` keeps
/// resolution precedence stable across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub id: String,
    pub url: String,
}

impl Repo {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Repo {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// A build dependency the backend found in one of the repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub epoch: i64,
    pub version: String,
    pub release: String,
    pub sourcerpm: String,
}

/// Raw result of a build-requires query: packages found at the right
/// version, RPM dependency strings found at the wrong version, and RPM
/// dependency strings not found at all.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub resolved: Vec<ResolvedPackage>,
    pub wrong_version: Vec<String>,
    pub missing: Vec<String>,
}

/// Package-query backend resolving the BuildRequires of a spec file
/// against a set of repositories.
pub trait DepQuery {
    fn build_requires(&self, spec_file: &Path, repos: &[Repo]) -> anyhow::Result<QueryOutcome>;
}

/// Stand-in for deployments without a query backend. Resolution degrades
/// to empty results with a warning instead of failing.
pub struct UnavailableEngine;

impl DepQuery for UnavailableEngine {
    fn build_requires(&self, _spec_file: &Path, _repos: &[Repo]) -> anyhow::Result<QueryOutcome> {
        warn!("build_requires: package query backend missing");
        Ok(QueryOutcome::default())
    }
}
