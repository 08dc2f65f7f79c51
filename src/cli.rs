use crate::filesystem::validation::{binding_validator, path_validator};
use crate::filesystem::FileSystem;
use clap::{App, Arg};
use std::path::PathBuf;

pub const DEFAULT_ROOTFS: &'static str = "/";
pub const DEFAULT_CWD: &'static str = ".";

/// Parses the demo binary's CLI flags, feeding them into `fs` through the
/// same entry points the core exposes to any caller (`set_root`,
/// `add_mirror`, `set_cwd`, `set_runner_enabled`). Returns the positional
/// guest paths to translate. Mirrors registered here are left pending:
/// `fs.initialize()` is responsible for canonicalizing them.
pub fn parse_config(fs: &mut FileSystem) -> Vec<String> {
    let matches = App::new("jail-fs")
        .about("Demonstrates the jail-fs path translation core: translates guest paths against a new root and mirror table.")
        .arg(Arg::with_name("rootfs")
            .short("r")
            .long("rootfs")
            .help("Use *path* as the new guest root file-system.")
            .takes_value(true)
            .default_value(DEFAULT_ROOTFS)
            .validator(path_validator))
        .arg(Arg::with_name("bind")
            .short("b")
            .long("bind")
            .help("Make the content of *host_path* accessible in the guest rootfs. Format: host_path:guest_path")
            .multiple(true)
            .takes_value(true)
            .validator(binding_validator))
        .arg(Arg::with_name("cwd")
            .short("w")
            .long("cwd")
            .help("Set the initial working directory to *path*.")
            .takes_value(true)
            .default_value(DEFAULT_CWD))
        .arg(Arg::with_name("runner")
            .long("runner")
            .help("Enable delayed translation for the runner-injection hook."))
        .arg(Arg::with_name("path")
            .help("Guest path(s) to translate.")
            .multiple(true))
        .get_matches();

    // option -r
    // -r *path* is equivalent to -b *path*:/
    let rootfs: &str = matches.value_of("rootfs").unwrap();
    fs.set_root(rootfs);

    // option(s) -b
    if let Some(bindings) = matches.values_of("bind") {
        for raw_binding_str in bindings {
            let parts: Vec<&str> = raw_binding_str.split_terminator(':').collect();
            let guest_location = parts.get(1).copied();
            fs.add_mirror(parts[0], guest_location);
        }
    }

    // option -w
    let cwd: &str = matches.value_of("cwd").unwrap();
    fs.set_cwd(PathBuf::from(cwd));

    // option --runner
    fs.set_runner_enabled(matches.is_present("runner"));

    matches
        .values_of("path")
        .map(|paths| paths.map(String::from).collect())
        .unwrap_or_default()
}
