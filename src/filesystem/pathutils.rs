//! Bounded path primitives.
//!
//! `path.c`'s `next_component`/`pop_component`/`join_paths` operate on
//! fixed `PATH_MAX`/`NAME_MAX` C buffers and fail rather than overflow.
//! `proot-rs` already replaced the buffer walk with `std::path::Component`
//! iteration and `PathBuf::push`/`pop` wherever it ported `path.c`; this
//! module keeps that idiom and restores the one thing it dropped along the
//! way: the explicit length check that made overflow impossible instead of
//! merely unlikely.

use crate::errors::*;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

pub const PATH_MAX: usize = libc::PATH_MAX as usize;
pub const NAME_MAX: usize = libc::NAME_MAX as usize;

/// `MAXSYMLINKS` in `path.c`; the ceiling on recursive symlink dereferencing
/// depth during canonicalization.
pub const MAX_SYMLINK_DEPTH: u32 = 40;

/// What kind of "last component" `next_component` reported for in `path.c`,
/// now derived from whether the raw input ended in a path separator (a bit
/// `std::path::Components` normalizes away, so it has to be captured before
/// the path is parsed into components).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalKind {
    /// More components follow (`MORE` in spec.md).
    NotFinal,
    /// Last component, input did not end in a separator (`FINAL_NORMAL`).
    Normal,
    /// Last component, input ended in at least one separator
    /// (`FINAL_FORCE_DIR`): the caller expects a directory.
    ForceDir,
}

impl FinalKind {
    pub fn is_final(self) -> bool {
        !matches!(self, FinalKind::NotFinal)
    }

    pub fn forces_dir(self) -> bool {
        matches!(self, FinalKind::ForceDir)
    }
}

pub fn classify_final(is_last_component: bool, input_ends_with_separator: bool) -> FinalKind {
    if !is_last_component {
        FinalKind::NotFinal
    } else if input_ends_with_separator {
        FinalKind::ForceDir
    } else {
        FinalKind::Normal
    }
}

/// Whether `path`, taken as a raw byte string, ends with at least one `/`.
/// Used to recover `next_component`'s `want_dir` flag before the trailing
/// separator gets normalized away by `Path::components()`.
pub fn ends_with_separator(path: &Path) -> bool {
    matches!(path.as_os_str().as_bytes().last(), Some(b'/'))
}

/// Removes the last component of an absolute path in place; a no-op on `"/"`,
/// matching `pop_component`'s explicit root guard in `path.c`.
pub fn pop_component(path: &mut PathBuf) {
    path.pop();
}

/// `NAME_MAX` guard for a single path component, matching `next_component`'s
/// `length >= NAME_MAX` check.
pub fn check_component_len(name: &OsStr) -> Result<()> {
    if name.len() >= NAME_MAX {
        return Err(Error::errno_with_msg(
            Errno::ENAMETOOLONG,
            format!("path component {:?} exceeds NAME_MAX ({})", name, NAME_MAX),
        ));
    }
    Ok(())
}

/// `PATH_MAX` guard for a complete path, matching the overflow check at the
/// end of `join_paths` (and of `Binding::substitute_path_prefix`).
pub fn check_path_len(path: &Path) -> Result<()> {
    if path.as_os_str().len() >= PATH_MAX {
        return Err(Error::errno_with_msg(
            Errno::ENAMETOOLONG,
            format!("path {:?} exceeds PATH_MAX ({})", path, PATH_MAX),
        ));
    }
    Ok(())
}

/// Concatenates the given (optional) parts, inserting exactly one `/`
/// between components the way `PathBuf::push` already does, then checks the
/// `PATH_MAX` bound that `path.c`'s `join_paths` checks after every
/// concatenation.
pub fn join_paths(parts: &[Option<&Path>]) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for part in parts.iter().flatten() {
        out.push(part);
    }
    check_path_len(&out)?;
    Ok(out)
}
