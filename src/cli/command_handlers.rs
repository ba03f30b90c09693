use std::path::Path;

use anyhow::Context;

use crate::{
    deps::{engine::UnavailableEngine, BuildSources, DependencySet},
    dlrn::DlrnClient,
};

/// Handler for the deps command. Resolves the spec file's build
/// dependencies against the configured repositories for the tag.
pub fn do_deps(spec_file: &Path, tag: &str, config_file: Option<&str>) -> anyhow::Result<()> {
    let sources = BuildSources::load(config_file, &[])?;
    let depends = DependencySet::resolve(spec_file, tag, &sources, &UnavailableEngine)?;

    if !depends.met.is_empty() {
        println!("Met:");
        for dep in &depends.met {
            println!("  {}", dep.to_nevr()?);
        }
    }
    if !depends.wrong_version.is_empty() {
        println!("\nWrong version:");
        for dep in &depends.wrong_version {
            println!("  {}", dep.to_rpmdep()?);
        }
    }
    if !depends.unmet.is_empty() {
        println!("\nUnmet:");
        for dep in &depends.unmet {
            println!("  {}", dep.to_rpmdep()?);
        }
    }
    Ok(())
}

/// Handler for the commits command. Prints the successful builds behind
/// a DLRN symlink.
pub fn do_commits(host: &str, link: &str) -> anyhow::Result<()> {
    let client = client_for(host)?;
    for commit in client.commits(link)? {
        match &commit.extended_hash {
            Some(extended) => println!(
                "{} {} {} {}",
                commit.name, commit.commit_hash, commit.dist_hash, extended
            ),
            None => println!("{} {} {}", commit.name, commit.commit_hash, commit.dist_hash),
        }
    }
    Ok(())
}

/// Handler for the versions command. Prints the per-package version
/// table of one build.
pub fn do_versions(host: &str, commit_hash: &str, distgit_hash: &str) -> anyhow::Result<()> {
    let client = client_for(host)?;
    for (project, entry) in client.versions(commit_hash, distgit_hash)? {
        println!("{} {} {} {}", project, entry.nvr, entry.state, entry.source);
    }
    Ok(())
}

fn client_for(host: &str) -> anyhow::Result<DlrnClient> {
    DlrnClient::from_config(host, &[], &[])?
        .with_context(|| format!("host '{host}' is not configured in dlrn.yml"))
}
