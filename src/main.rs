// src/main.rs

use std::io;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pacbind::callbacks::{DEFAULT_LOG_LEVEL, tracing_log_callback};
use pacbind::repository::{self, By};
use pacbind::{
    Database, DatabaseCollection, Handle, LogLevel, PackageCollection, PackageRecord, Package, SigLevel, Usage,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "pacbind")]
#[command(author, version, about = "Query pacman databases through libalpm", long_about = None)]
struct Cli {
    /// Installation root
    #[arg(long, global = true, default_value = "/")]
    root: String,

    /// Database directory
    #[arg(long, global = true, default_value = "/var/lib/pacman")]
    dbpath: String,

    /// Sync database to register, as NAME=SERVER (repeatable)
    #[arg(long = "repo", global = true, value_name = "NAME=SERVER", value_parser = parse_assignment)]
    repos: Vec<(String, String)>,

    /// Database usage, as NAME=USAGE with pacman.conf names (e.g. "core=Sync Search")
    #[arg(long = "usage", global = true, value_name = "NAME=USAGE", value_parser = parse_assignment)]
    usages: Vec<(String, String)>,

    /// Forward libalpm debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed packages
    Installed,
    /// Search the sync databases
    Search {
        /// Terms that must all match
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Show details of a package
    Info {
        /// Package name
        name: String,
    },
    /// List installed packages with newer versions in the sync databases
    Upgrades,
    /// Search the AUR
    AurSearch {
        /// Search query
        query: String,
        /// Field to search (name, name-desc, maintainer, depends, ...)
        #[arg(long, default_value = "name-desc")]
        by: By,
    },
    /// Show AUR package details
    AurInfo {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Split `NAME=VALUE`
fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

/// Render a byte count with binary prefixes, e.g. `1.5 MiB`
fn human(size: i64) -> String {
    let units = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
    let mut value = size as f64;
    for unit in units {
        if value.abs() < 1024.0 {
            return format!("{:.1} {}B", value, unit);
        }
        value /= 1024.0;
    }
    format!("{} B", size)
}

fn open_handle(cli: &Cli) -> Result<Handle> {
    let handle = Handle::initialize(&cli.root, &cli.dbpath)
        .with_context(|| format!("Failed to open {} (root {})", cli.dbpath, cli.root))?;

    let threshold = if cli.verbose { LogLevel::Debug } else { DEFAULT_LOG_LEVEL };
    handle.set_log_callback(tracing_log_callback, threshold)?;

    for (name, server) in &cli.repos {
        let db = match handle.sync_db_by_name(name)? {
            Some(db) => db,
            None => handle.register_sync_db(name, SigLevel::USE_DEFAULT)?,
        };
        if !server.is_empty() {
            db.add_server(server)?;
        }
        debug!("Configured repository {} ({})", name, server);
    }

    for (name, usage) in &cli.usages {
        let usage: Usage = usage.parse()?;
        let db = handle
            .sync_db_by_name(name)?
            .ok_or_else(|| anyhow::anyhow!("Repository '{}' is not registered", name))?;
        db.set_usage(usage)?;
    }

    Ok(handle)
}

fn find_package(handle: &Handle, name: &str) -> Result<Option<Package>> {
    if let Some(pkg) = handle.local_db()?.pkg(name)? {
        return Ok(Some(pkg));
    }
    for db in handle.sync_dbs()?.iter()? {
        if let Some(pkg) = db?.pkg(name)? {
            return Ok(Some(pkg));
        }
    }
    Ok(None)
}

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        println!("{:<16}: None", label);
    } else {
        println!("{:<16}: {}", label, items.join("  "));
    }
}

fn print_package(pkg: &Package) -> Result<()> {
    let depends: Vec<String> = pkg.depends()?.iter().map(|d| d.to_string()).collect();
    let provides: Vec<String> = pkg.provides()?.iter().map(|d| d.to_string()).collect();
    let optional: Vec<String> = pkg.optional_depends()?.iter().map(|d| d.to_string()).collect();

    println!("{:<16}: {}", "Repository", pkg.db_name()?.unwrap_or_default());
    println!("{:<16}: {}", "Name", pkg.name()?);
    println!("{:<16}: {}", "Version", pkg.version()?);
    println!("{:<16}: {}", "Description", pkg.description()?.unwrap_or_default());
    println!("{:<16}: {}", "Architecture", pkg.architecture()?.unwrap_or_default());
    println!("{:<16}: {}", "URL", pkg.url()?.unwrap_or_default());
    print_list("Licenses", &pkg.licenses()?);
    print_list("Groups", &pkg.groups()?);
    print_list("Provides", &provides);
    print_list("Depends On", &depends);
    print_list("Optional Deps", &optional);
    print_list("Required By", &pkg.compute_required_by()?);
    print_list("Optional For", &pkg.compute_optional_for()?);
    println!("{:<16}: {}", "Download Size", human(pkg.size()?));
    println!("{:<16}: {}", "Installed Size", human(pkg.isize()?));
    println!("{:<16}: {}", "Packager", pkg.packager()?.unwrap_or_default());
    if let Some(date) = pkg.build_date()? {
        println!("{:<16}: {}", "Build Date", date.to_rfc2822());
    }
    if let Some(date) = pkg.install_date()? {
        println!("{:<16}: {}", "Install Date", date.to_rfc2822());
        println!("{:<16}: {}", "Install Reason", pkg.reason()?);
    }
    Ok(())
}

fn print_aur_package(pkg: &repository::Pkg) {
    println!("{:<16}: {}", "Name", pkg.name);
    println!("{:<16}: {}", "Version", pkg.version);
    println!("{:<16}: {}", "Description", pkg.description.as_deref().unwrap_or(""));
    println!("{:<16}: {}", "Maintainer", pkg.maintainer.as_deref().unwrap_or("(orphan)"));
    println!("{:<16}: {}", "Votes", pkg.num_votes);
    println!("{:<16}: {:.2}", "Popularity", pkg.popularity);
    if pkg.out_of_date.is_some() {
        println!("{:<16}: Yes", "Out-of-date");
    }
    print_list("Depends On", &pkg.depends);
    print_list("Make Deps", &pkg.make_depends);
    print_list("Optional Deps", &pkg.opt_depends);
    println!();
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Installed) => {
            let handle = open_handle(&cli)?;
            let local = handle.local_db()?;
            let mut count = 0;
            for pkg in local.pkg_cache()?.iter()? {
                let pkg = pkg?;
                println!("{} {}", pkg.name()?, pkg.version()?);
                count += 1;
            }
            info!("Listed {} installed packages", count);
            handle.release()?;
            Ok(())
        }
        Some(Commands::Search { terms }) => {
            let handle = open_handle(&cli)?;
            let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
            for db in handle.sync_dbs()?.iter()? {
                let db = db?;
                let db_name = db.name()?;
                for pkg in db.search(&terms)?.iter()? {
                    let pkg = pkg?;
                    let installed = if handle.local_db()?.pkg(&pkg.name()?)?.is_some() {
                        " [installed]"
                    } else {
                        ""
                    };
                    println!("{}/{} {}{}", db_name, pkg.name()?, pkg.version()?, installed);
                    println!("    {}", pkg.description()?.unwrap_or_default());
                }
            }
            handle.release()?;
            Ok(())
        }
        Some(Commands::Info { name }) => {
            let handle = open_handle(&cli)?;
            let pkg = find_package(&handle, name)?
                .ok_or_else(|| anyhow::anyhow!("Package '{}' was not found", name))?;
            print_package(&pkg)?;
            handle.release()?;
            Ok(())
        }
        Some(Commands::Upgrades) => {
            let handle = open_handle(&cli)?;
            let sync_dbs = handle.sync_dbs()?;

            let mut total: i64 = 0;
            let mut count = 0;
            for pkg in handle.local_db()?.pkg_cache()?.iter()? {
                let pkg = pkg?;
                if let Some(newer) = pkg.sync_new_version(&sync_dbs)? {
                    total += newer.size()?;
                    count += 1;
                    println!("{} {} -> {}", pkg.name()?, pkg.version()?, newer.version()?);
                }
            }
            if count == 0 {
                println!("No upgrades available.");
            } else {
                println!("\nTotal Download Size: {}", human(total));
            }
            handle.release()?;
            Ok(())
        }
        Some(Commands::AurSearch { query, by }) => {
            let client = repository::Client::new()?;
            let mut results = client.search(query, *by)?;
            results.sort_by(|a, b| a.name.cmp(&b.name));
            for pkg in &results {
                println!("aur/{} {} (+{} {:.2})", pkg.name, pkg.version, pkg.num_votes, pkg.popularity);
                println!("    {}", pkg.description.as_deref().unwrap_or(""));
            }
            println!("\nTotal: {} package(s)", results.len());
            Ok(())
        }
        Some(Commands::AurInfo { names, json }) => {
            let client = repository::Client::new()?;
            let results = client.info(names)?;
            if results.is_empty() {
                return Err(anyhow::anyhow!("No AUR packages found for {}", names.join(", ")));
            }
            if *json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }
            for pkg in &results {
                print_aur_package(pkg);
            }
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(*shell, &mut Cli::command(), "pacbind", &mut io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("pacbind v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pacbind --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("core=https://mirror.example.org/core").unwrap(),
            ("core".to_string(), "https://mirror.example.org/core".to_string())
        );
        assert_eq!(parse_assignment("core=").unwrap(), ("core".to_string(), String::new()));
        assert!(parse_assignment("core").is_err());
        assert!(parse_assignment("=server").is_err());
    }

    #[test]
    fn test_human_sizes() {
        assert_eq!(human(0), "0.0 B");
        assert_eq!(human(1023), "1023.0 B");
        assert_eq!(human(1536), "1.5 KiB");
        assert_eq!(human(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_cli_parses_global_options() {
        let cli = Cli::try_parse_from([
            "pacbind",
            "--root",
            "/mnt",
            "--repo",
            "core=https://a.example.org",
            "--repo",
            "extra=https://b.example.org",
            "search",
            "vim",
        ])
        .unwrap();
        assert_eq!(cli.root, "/mnt");
        assert_eq!(cli.dbpath, "/var/lib/pacman");
        assert_eq!(cli.repos.len(), 2);
        assert!(matches!(cli.command, Some(Commands::Search { ref terms }) if terms == &["vim"]));
    }

    #[test]
    fn test_cli_aur_search_by() {
        let cli = Cli::try_parse_from(["pacbind", "aur-search", "yay", "--by", "maintainer"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::AurSearch { by: By::Maintainer, .. })));
    }

    #[test]
    fn test_aur_info_json_flag() {
        let cli = Cli::try_parse_from(["pacbind", "aur-info", "--json", "yay", "paru"]).unwrap();
        match cli.command {
            Some(Commands::AurInfo { names, json }) => {
                assert_eq!(names, vec!["yay", "paru"]);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other.is_some()),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
