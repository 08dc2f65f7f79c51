#![allow(clippy::redundant_static_lifetimes)]
#![allow(clippy::redundant_field_names)]

use jail_fs::cli;
use jail_fs::filesystem::{FdAuditor, FileSystem, Initialiser, Translator};
use nix::unistd::getpid;
use std::process::exit;

/// A one-shot demonstration of the path translation core: builds a
/// `FileSystem` from CLI flags, initializes it (canonicalizing the new
/// root and sanitizing every mirror), then translates each positional
/// argument as a guest path and prints the resulting host path.
///
/// This binary does not trace or launch a child process; the ptrace
/// layer that would normally drive `translate`/`detranslate` from live
/// syscalls is out of scope for this crate (see `spec.md` §1).
fn main() {
    env_logger::init();

    let mut fs = FileSystem::new();
    let paths = cli::parse_config(&mut fs);

    if let Err(error) = fs.initialize() {
        eprintln!("jail-fs: error during file system initialization: {}", error);
        exit(1);
    }

    if let Err(error) = fs.check_fd(getpid()) {
        log::warn!("jail-fs: containment check on our own process failed: {}", error);
    }

    let mut status = 0;
    for guest_path in paths {
        match fs.translate_path(&guest_path, true) {
            Ok(host_path) => println!("{} -> {}", guest_path, host_path.display()),
            Err(error) => {
                eprintln!("jail-fs: failed to translate {:?}: {}", guest_path, error);
                status = 1;
            }
        }
    }

    exit(status);
}
