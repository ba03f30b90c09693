use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Release engineering watch tool for DLRN build data and RPM build
/// dependency reports.
#[derive(Debug, Parser)]
#[command(version)]
pub struct CliArgs {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve build dependencies of a spec file against a build tag
    Deps {
        /// Path to the RPM spec file
        spec_file: PathBuf,
        /// Build tag to resolve against, as configured in build_sources.yml
        tag: String,
        /// Alternative build sources config file name
        #[arg(short, long)]
        config_file: Option<String>,
    },
    /// List successful builds behind a DLRN symlink, e.g. consistent or current
    Commits {
        /// DLRN host name, as configured in dlrn.yml
        host: String,
        /// Symlink name to inspect
        link: String,
    },
    /// Show the per-package version table for a build
    Versions {
        /// DLRN host name, as configured in dlrn.yml
        host: String,
        /// Full source commit hash
        commit_hash: String,
        /// Full dist-git hash
        distgit_hash: String,
    },
}
