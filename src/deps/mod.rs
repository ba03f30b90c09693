//! Build dependency resolution and the conversions between the three
//! dependency shapes: structured record, RPM dependency string and RPM
//! NEVR string.

pub mod engine;

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Write},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::{ConfigError, ConfigManager},
    rpm,
};

use engine::{DepQuery, Repo, ResolvedPackage};

#[derive(Error, Debug)]
pub enum DepError {
    #[error("{0} is not a regular file")]
    NotARegularFile(PathBuf),
    #[error("{0} is not a spec file")]
    NotASpecFile(PathBuf),
    #[error("invalid build tag {tag}, expected one of {known:?}")]
    UnknownBuildTag { tag: String, known: Vec<String> },
    #[error("cannot convert {record}: {field} missing")]
    MissingField { record: String, field: &'static str },
    #[error("could not parse \"{0}\"")]
    Parse(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("build sources config is malformed: {0}")]
    Sources(#[from] serde_yaml::Error),
    #[error("query backend failed: {0}")]
    Engine(#[from] anyhow::Error),
}

/// RPM version comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
}

impl Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            Comparison::Equal => "==",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Greater => ">",
            Comparison::LessOrEqual => "<=",
            Comparison::Less => "<",
        };
        f.write_str(symbol)
    }
}

impl FromStr for Comparison {
    type Err = DepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "==" => Ok(Comparison::Equal),
            ">=" => Ok(Comparison::GreaterOrEqual),
            ">" => Ok(Comparison::Greater),
            "<=" => Ok(Comparison::LessOrEqual),
            "<" => Ok(Comparison::Less),
            _ => Err(DepError::Parse(value.to_string())),
        }
    }
}

/// One build dependency. Only `name` is always present; an absent epoch
/// or release means "unspecified", which is not the same as zero or empty
/// and survives every conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dep {
    pub name: String,
    pub epoch: Option<i64>,
    pub version: Option<String>,
    pub release: Option<String>,
    pub comparison: Option<Comparison>,
    pub component: Option<String>,
}

impl Dep {
    fn missing(&self, field: &'static str) -> DepError {
        DepError::MissingField {
            record: format!("{self:?}"),
            field,
        }
    }

    /// `name[-epoch:]version-release`. Name, version and release are all
    /// required; an epoch of zero is left out, per RPM convention.
    pub fn to_nevr(&self) -> Result<String, DepError> {
        if self.name.is_empty() {
            return Err(self.missing("name"));
        }
        let version = self.version.as_ref().ok_or_else(|| self.missing("version"))?;
        let release = self.release.as_ref().ok_or_else(|| self.missing("release"))?;

        let mut out = format!("{}-", self.name);
        if let Some(epoch) = self.epoch {
            if epoch != 0 {
                write!(out, "{epoch}:").expect("writing to string");
            }
        }
        out.push_str(version);
        out.push('-');
        out.push_str(release);
        Ok(out)
    }

    /// `name comparison [epoch:]version[-release]`, or the bare name when
    /// there is no comparison at all.
    pub fn to_rpmdep(&self) -> Result<String, DepError> {
        let Some(comparison) = self.comparison else {
            return Ok(self.name.clone());
        };
        let version = self.version.as_ref().ok_or_else(|| self.missing("version"))?;

        let mut out = format!("{} {} ", self.name, comparison);
        if let Some(epoch) = self.epoch {
            if epoch != 0 {
                write!(out, "{epoch}:").expect("writing to string");
            }
        }
        out.push_str(version);
        if let Some(release) = &self.release {
            if !release.is_empty() {
                out.push('-');
                out.push_str(release);
            }
        }
        Ok(out)
    }

    /// RPM-style `(epoch, version, release)` tuple; an unspecified epoch
    /// compares as zero.
    pub fn to_evr(&self) -> Result<(i64, String, Option<String>), DepError> {
        let version = self.version.as_ref().ok_or_else(|| self.missing("version"))?;
        Ok((
            self.epoch.unwrap_or(0),
            version.clone(),
            self.release.clone(),
        ))
    }

    /// Parse an RPM dependency string: either a bare name or exactly
    /// `name comparison [epoch:]version[-release]`.
    pub fn from_rpmdep(dep: &str) -> Result<Dep, DepError> {
        let parse_err = || DepError::Parse(dep.to_string());
        let tokens: Vec<&str> = dep.split(' ').collect();
        if tokens.len() == 1 {
            return Ok(Dep {
                name: tokens[0].to_string(),
                ..Dep::default()
            });
        }
        if tokens.len() != 3 {
            return Err(parse_err());
        }

        let mut parsed = Dep {
            name: tokens[0].to_string(),
            comparison: Some(tokens[1].parse()?),
            ..Dep::default()
        };

        let evr: Vec<&str> = tokens[2].split('-').collect();
        if evr.len() > 2 {
            return Err(parse_err());
        }
        if evr.len() == 2 && evr[1] != "None" {
            // "None" is how the query backend stringifies a missing release
            parsed.release = Some(evr[1].to_string());
        }

        match evr[0].split_once(':') {
            Some((epoch, version)) => {
                parsed.epoch = Some(epoch.parse().map_err(|_| parse_err())?);
                parsed.version = Some(version.to_string());
            }
            None => parsed.version = Some(evr[0].to_string()),
        }

        Ok(parsed)
    }

    /// Parse an RPM NEVR string into an exact (`==`) dependency.
    pub fn from_nevr(dep: &str) -> Result<Dep, DepError> {
        let parse_err = || DepError::Parse(dep.to_string());
        let nevra = rpm::split_filename(dep);
        if nevra.name.is_empty() {
            return Err(parse_err());
        }

        let mut parsed = Dep {
            name: nevra.name,
            version: Some(nevra.version),
            comparison: Some(Comparison::Equal),
            ..Dep::default()
        };
        if !matches!(nevra.epoch.as_str(), "" | "0") {
            parsed.epoch = Some(nevra.epoch.parse().map_err(|_| parse_err())?);
        }
        if !nevra.release.is_empty() && nevra.release != "None" {
            parsed.release = Some(nevra.release);
        }
        Ok(parsed)
    }
}

/// Records for packages the backend resolved at the right version. The
/// component comes from the source RPM name and the comparison is pinned
/// to `==`, since these are the versions actually provided.
pub fn met_to_deps(resolved: &[ResolvedPackage]) -> Vec<Dep> {
    resolved
        .iter()
        .map(|pkg| Dep {
            name: pkg.name.clone(),
            epoch: Some(pkg.epoch),
            version: Some(pkg.version.clone()),
            release: Some(pkg.release.clone()),
            comparison: Some(Comparison::Equal),
            component: Some(rpm::componentize(&pkg.sourcerpm)),
        })
        .collect()
}

/// Records for dependency strings the backend could not satisfy.
pub fn unmet_to_deps(deps: &[String]) -> Result<Vec<Dep>, DepError> {
    deps.iter().map(|dep| Dep::from_rpmdep(dep)).collect()
}

/// Build tag to repository URL list mapping, usually loaded from
/// `build_sources.yml`:
///
/// ```yaml
/// build_sources:
///   build-version-1:
///     - http://mirror-1.example.com/x86_64
///     - http://mirror-2.example.com/x86_64
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildSources {
    #[serde(default)]
    pub build_sources: BTreeMap<String, Vec<String>>,
}

impl BuildSources {
    /// Default build sources config file name.
    pub const CONFIG_FILE: &'static str = "build_sources.yml";

    pub fn load(config_file: Option<&str>, overrides: &[PathBuf]) -> Result<Self, DepError> {
        let file = config_file.unwrap_or(Self::CONFIG_FILE);
        let manager = ConfigManager::load(&[file], overrides, true)?;
        Self::from_config(&manager)
    }

    pub fn from_config(manager: &ConfigManager) -> Result<Self, DepError> {
        if manager.config().is_empty() {
            return Ok(BuildSources::default());
        }
        let value = serde_yaml::Value::Mapping(manager.config().clone());
        Ok(serde_yaml::from_value(value)?)
    }

    pub fn is_empty(&self) -> bool {
        self.build_sources.is_empty()
    }

    /// Ordered repository list for a build tag, with stable positional
    /// ids the query backend uses for precedence.
    pub fn repos_for(&self, tag: &str) -> Result<Vec<Repo>, DepError> {
        let urls = self
            .build_sources
            .get(tag)
            .ok_or_else(|| DepError::UnknownBuildTag {
                tag: tag.to_string(),
                known: self.build_sources.keys().cloned().collect(),
            })?;
        Ok(urls
            .iter()
            .enumerate()
            .map(|(idx, url)| Repo::new(idx.to_string(), url))
            .collect())
    }
}

/// Dependency partition for one (spec file, build tag) resolution: met,
/// wrong version, and missing entirely. Rebuilt from scratch on every
/// call to [`DependencySet::resolve`].
#[derive(Debug, Default)]
pub struct DependencySet {
    pub met: Vec<Dep>,
    pub wrong_version: Vec<Dep>,
    pub unmet: Vec<Dep>,
    spec_file: PathBuf,
}

impl DependencySet {
    pub fn resolve(
        spec_file: &Path,
        tag: &str,
        sources: &BuildSources,
        engine: &dyn DepQuery,
    ) -> Result<Self, DepError> {
        let metadata = fs::metadata(spec_file)?;
        if !metadata.is_file() {
            return Err(DepError::NotARegularFile(spec_file.to_path_buf()));
        }
        if spec_file.extension().and_then(|e| e.to_str()) != Some("spec") {
            return Err(DepError::NotASpecFile(spec_file.to_path_buf()));
        }

        let mut set = DependencySet {
            spec_file: spec_file.to_path_buf(),
            ..DependencySet::default()
        };

        if sources.is_empty() {
            return Ok(set);
        }

        let repos = sources.repos_for(tag)?;
        let outcome = engine.build_requires(spec_file, &repos)?;

        set.met = met_to_deps(&outcome.resolved);
        set.wrong_version = unmet_to_deps(&outcome.wrong_version)?;
        set.unmet = unmet_to_deps(&outcome.missing)?;

        info!("{set}");
        Ok(set)
    }
}

impl Display for DependencySet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = self
            .spec_file
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        write!(
            f,
            "{}: {} met, {} incorrect, {} missing",
            name,
            self.met.len(),
            self.wrong_version.len(),
            self.unmet.len(),
        )
    }
}
