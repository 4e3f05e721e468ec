// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn global_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("root")
            .long("root")
            .value_name("PATH")
            .default_value("/")
            .global(true)
            .help("Installation root"),
    )
    .arg(
        Arg::new("dbpath")
            .long("dbpath")
            .value_name("PATH")
            .default_value("/var/lib/pacman")
            .global(true)
            .help("Database directory"),
    )
    .arg(
        Arg::new("repo")
            .long("repo")
            .value_name("NAME=SERVER")
            .action(ArgAction::Append)
            .global(true)
            .help("Sync database to register, as NAME=SERVER (repeatable)"),
    )
    .arg(
        Arg::new("usage")
            .long("usage")
            .value_name("NAME=USAGE")
            .action(ArgAction::Append)
            .global(true)
            .help("Database usage, as NAME=USAGE with pacman.conf names"),
    )
    .arg(
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Forward libalpm debug output"),
    )
}

fn build_cli() -> Command {
    global_args(
        Command::new("pacbind")
            .version(env!("CARGO_PKG_VERSION"))
            .author("pacbind Contributors")
            .about("Query pacman databases through libalpm")
            .subcommand_required(false),
    )
    .subcommand(Command::new("installed").about("List installed packages"))
    .subcommand(
        Command::new("search")
            .about("Search the sync databases")
            .arg(
                Arg::new("terms")
                    .required(true)
                    .action(ArgAction::Append)
                    .help("Terms that must all match"),
            ),
    )
    .subcommand(
        Command::new("info")
            .about("Show details of a package")
            .arg(Arg::new("name").required(true).help("Package name")),
    )
    .subcommand(
        Command::new("upgrades").about("List installed packages with newer versions in the sync databases"),
    )
    .subcommand(
        Command::new("aur-search")
            .about("Search the AUR")
            .arg(Arg::new("query").required(true).help("Search query"))
            .arg(
                Arg::new("by")
                    .long("by")
                    .default_value("name-desc")
                    .help("Field to search (name, name-desc, maintainer, depends, ...)"),
            ),
    )
    .subcommand(
        Command::new("aur-info")
            .about("Show AUR package details")
            .arg(
                Arg::new("names")
                    .required(true)
                    .action(ArgAction::Append)
                    .help("Package names"),
            )
            .arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Print the records as JSON"),
            ),
    )
    .subcommand(
        Command::new("completions")
            .about("Generate shell completions")
            .arg(Arg::new("shell").required(true).help("bash, elvish, fish, powershell or zsh")),
    )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_LIBALPM").is_some() {
        // Honour a libalpm outside the default search path
        if let Ok(dir) = env::var("ALPM_LIB_DIR") {
            println!("cargo:rustc-link-search=native={}", dir);
        }
        println!("cargo:rerun-if-env-changed=ALPM_LIB_DIR");
    }

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pacbind.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
