use clap::Parser;

use relwatch::cli::{
    args::{CliArgs, Command},
    command_handlers::{do_commits, do_deps, do_versions},
};

fn run() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();

    match cli_args.cmd {
        Command::Deps {
            spec_file,
            tag,
            config_file,
        } => do_deps(&spec_file, &tag, config_file.as_deref()),
        Command::Commits { host, link } => do_commits(&host, &link),
        Command::Versions {
            host,
            commit_hash,
            distgit_hash,
        } => do_versions(&host, &commit_hash, &distgit_hash),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
