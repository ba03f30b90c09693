use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{error, warn};
use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;

use crate::{
    config::{ConfigError, ConfigManager},
    fetch::{FetchError, Fetcher},
};

/// Config file consulted by [`DlrnClient::from_config`].
pub const DLRN_CONFIG_FILE: &str = "dlrn.yml";

#[derive(Error, Debug)]
pub enum DlrnError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One successful build from a DLRN commit listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub name: String,
    pub dist_hash: String,
    pub commit_hash: String,
    pub extended_hash: Option<String>,
}

/// One row of a DLRN versions.csv table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub source: String,
    pub state: String,
    pub distgit: String,
    pub nvr: String,
}

#[derive(Debug, Deserialize)]
struct VersionRow {
    #[serde(rename = "Project")]
    project: String,
    #[serde(rename = "Source_Sha")]
    source: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Dist_Sha")]
    distgit: String,
    #[serde(rename = "Pkg_NVR")]
    nvr: String,
}

/// Client for one DLRN host/release pair.
pub struct DlrnClient {
    base_url: String,
    release: String,
    fetcher: Fetcher,
}

impl DlrnClient {
    pub fn new(base_url: impl Into<String>, release: impl Into<String>) -> Result<Self, DlrnError> {
        Ok(DlrnClient {
            base_url: base_url.into(),
            release: release.into(),
            fetcher: Fetcher::new()?,
        })
    }

    /// Build a client for a host configured in `dlrn.yml`. Hosts map to a
    /// `{url, release}` pair; an unknown host yields `None`.
    pub fn from_config(
        host: &str,
        extra_files: &[&str],
        overrides: &[PathBuf],
    ) -> Result<Option<Self>, DlrnError> {
        let mut files = vec![DLRN_CONFIG_FILE];
        files.extend(extra_files);
        let manager = ConfigManager::load(&files, overrides, true)?;

        let entry = match manager.get(host) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let url = entry.get("url").and_then(Value::as_str);
        let release = entry.get("release").and_then(Value::as_str);
        match (url, release) {
            (Some(url), Some(release)) => Ok(Some(DlrnClient::new(url, release)?)),
            _ => Ok(None),
        }
    }

    /// URL of the build directory for a commit/dist-git hash pair. The
    /// 2/2/8 character sharding mirrors DLRN's storage layout and must not
    /// change.
    pub fn url_for_hashes(&self, commit_hash: &str, distgit_hash: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}_{}",
            self.base_url,
            self.release,
            clip(commit_hash, 0, 2),
            clip(commit_hash, 2, 4),
            commit_hash,
            clip(distgit_hash, 0, 8),
        )
    }

    /// Successful builds behind a symlink such as `consistent` or
    /// `current`. Entries that failed or cannot be read are logged and
    /// dropped.
    pub fn commits(&self, link_name: &str) -> Result<Vec<CommitRecord>, DlrnError> {
        let url = format!("{}/{}/{}/commit.yaml", self.base_url, self.release, link_name);
        let data = self.fetcher.fetch_yaml(&url)?;
        Ok(data.as_ref().map(parse_commits).unwrap_or_default())
    }

    /// Per-package version table of a build. A missing table is reported
    /// and treated as empty.
    pub fn versions(
        &self,
        commit_hash: &str,
        distgit_hash: &str,
    ) -> Result<BTreeMap<String, VersionEntry>, DlrnError> {
        let url = format!(
            "{}/versions.csv",
            self.url_for_hashes(commit_hash, distgit_hash)
        );
        match self.fetcher.fetch_text(&url)? {
            Some(body) => Ok(parse_versions(&body)),
            None => {
                error!("Could not fetch {url}");
                Ok(BTreeMap::new())
            }
        }
    }
}

// Character-based slice that never panics, whatever the hash contains.
fn clip(s: &str, start: usize, end: usize) -> &str {
    let byte_at = |n: usize| s.char_indices().nth(n).map_or(s.len(), |(i, _)| i);
    &s[byte_at(start)..byte_at(end)]
}

fn parse_commits(data: &Value) -> Vec<CommitRecord> {
    let mut records = Vec::new();
    let Some(commits) = data.get("commits").and_then(Value::as_sequence) else {
        return records;
    };
    for pkg in commits {
        if pkg.get("status").and_then(Value::as_str) != Some("SUCCESS") {
            warn!("{:?} has a status of error", pkg);
            continue;
        }
        let name = pkg.get("project_name").and_then(Value::as_str);
        let dist_hash = pkg.get("distro_hash").and_then(Value::as_str);
        let commit_hash = pkg.get("commit_hash").and_then(Value::as_str);
        match (name, dist_hash, commit_hash) {
            (Some(name), Some(dist_hash), Some(commit_hash)) => records.push(CommitRecord {
                name: name.to_string(),
                dist_hash: dist_hash.to_string(),
                commit_hash: commit_hash.to_string(),
                extended_hash: pkg
                    .get("extended_hash")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            _ => warn!("{:?} is missing commit fields", pkg),
        }
    }
    records
}

fn parse_versions(body: &str) -> BTreeMap<String, VersionEntry> {
    // versions.csv pads columns with spaces; underscores keep the values
    // intact through the CSV parser.
    let cleaned = body.replace(' ', "_");
    let mut table = BTreeMap::new();
    let mut reader = csv::Reader::from_reader(cleaned.as_bytes());
    for row in reader.deserialize::<VersionRow>() {
        match row {
            Ok(row) => {
                table.insert(
                    row.project,
                    VersionEntry {
                        source: row.source,
                        state: row.status,
                        distgit: row.distgit,
                        nvr: row.nvr,
                    },
                );
            }
            Err(err) => warn!("Skipping malformed versions.csv row: {err}"),
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn client() -> DlrnClient {
        DlrnClient::new("https://trunk.example.com/api", "mustang").unwrap()
    }

    #[test]
    fn url_uses_two_two_eight_sharding() {
        let commit = "abcdef0123456789abcdef0123456789abcdef01";
        let distgit = "fedcba9876543210fedcba9876543210fedcba98";
        assert_eq!(
            client().url_for_hashes(commit, distgit),
            format!("https://trunk.example.com/api/mustang/ab/cd/{commit}_fedcba98"),
        );
    }

    #[test]
    fn url_survives_short_and_multibyte_hashes() {
        assert_eq!(
            client().url_for_hashes("ab", "c"),
            "https://trunk.example.com/api/mustang/ab//ab_c",
        );
        assert_eq!(
            client().url_for_hashes("héllo", "wörld"),
            "https://trunk.example.com/api/mustang/hé/ll/héllo_wörld",
        );
    }

    #[test]
    fn parse_commits_keeps_only_success() {
        let data: Value = serde_yaml::from_str(
            r#"
commits:
  - project_name: openstack-swift
    status: SUCCESS
    commit_hash: abc123
    distro_hash: def456
    extended_hash: null
  - project_name: openstack-nova
    status: FAILED
    commit_hash: 123abc
    distro_hash: 456def
"#,
        )
        .unwrap();
        let records = parse_commits(&data);
        assert_eq!(records, vec![CommitRecord {
            name: "openstack-swift".to_string(),
            dist_hash: "def456".to_string(),
            commit_hash: "abc123".to_string(),
            extended_hash: None,
        }]);
    }

    #[test]
    fn parse_commits_drops_malformed_entries() {
        let data: Value = serde_yaml::from_str(
            r#"
commits:
  - status: SUCCESS
    commit_hash: abc123
"#,
        )
        .unwrap();
        assert_eq!(parse_commits(&data), vec![]);
    }

    #[test]
    fn parse_commits_carries_extended_hash() {
        let data: Value = serde_yaml::from_str(
            r#"
commits:
  - project_name: openstack-swift
    status: SUCCESS
    commit_hash: abc123
    distro_hash: def456
    extended_hash: 99aabb11_22ccdd33
"#,
        )
        .unwrap();
        let records = parse_commits(&data);
        assert_eq!(
            records[0].extended_hash.as_deref(),
            Some("99aabb11_22ccdd33")
        );
    }

    #[test]
    fn parse_versions_reads_padded_columns() {
        let body = "\
Project,Source Repo,Source Sha,Dist Repo,Dist Sha,Status,Last Success Timestamp,Component,Pkg NVR
openstack-swift,https://git.example.com/swift,abc123,https://git.example.com/swift-distgit,def456,SUCCESS,1700000000,storage,openstack-swift-2.23.1-1.el9
";
        let table = parse_versions(body);
        assert_eq!(table.len(), 1);
        let entry = &table["openstack-swift"];
        assert_eq!(entry, &VersionEntry {
            source: "abc123".to_string(),
            state: "SUCCESS".to_string(),
            distgit: "def456".to_string(),
            nvr: "openstack-swift-2.23.1-1.el9".to_string(),
        });
    }

    #[test]
    fn parse_versions_empty_body_is_empty_table() {
        assert!(parse_versions("").is_empty());
    }
}
