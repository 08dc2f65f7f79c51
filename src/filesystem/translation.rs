use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::errors::{Errno, Error, Result};
use crate::filesystem::binding::Side::{Guest, Host};
use crate::filesystem::canonicalization::Canonicalizer;
use crate::filesystem::child::{is_delayed, ChildId};
use crate::filesystem::substitution::Substitutor;
use crate::filesystem::FileSystem;

/// `AT_FDCWD`, as used by `*at(2)` syscalls to mean "relative to the
/// current working directory".
pub const AT_FDCWD: i32 = libc::AT_FDCWD;

pub trait Translator {
    fn translate_path<P: AsRef<Path>>(&self, guest_path: P, deref_final: bool) -> Result<PathBuf>;
    fn translate_absolute_path<P: AsRef<Path>>(
        &self,
        guest_path: P,
        deref_final: bool,
    ) -> Result<PathBuf>;
    fn translate_for_child<P: AsRef<Path>>(
        &self,
        child: Option<&mut ChildId>,
        dir_fd: i32,
        guest_path: P,
        deref_final: bool,
    ) -> Result<PathBuf>;
    fn detranslate_path<P: AsRef<Path>>(
        &self,
        host_path: P,
        sanity_check: bool,
    ) -> Result<Option<PathBuf>>;
}

impl Translator for FileSystem {
    /// Translates a path from `guest` to `host`. Relative guest path is also
    /// accepted.
    fn translate_path<P: AsRef<Path>>(&self, guest_path: P, deref_final: bool) -> Result<PathBuf> {
        self.translate_for_child(None, AT_FDCWD, guest_path, deref_final)
    }

    /// Translates a path from `guest` to `host`. Only absolute guest path is
    /// accepted.
    fn translate_absolute_path<P: AsRef<Path>>(
        &self,
        guest_path: P,
        deref_final: bool,
    ) -> Result<PathBuf> {
        let canonical_guest_path = self.canonicalize(guest_path.as_ref(), deref_final)?;
        let host_path = self.substitute(&canonical_guest_path, Guest)?;

        if deref_final {
            sanity_check(&host_path, self.get_root())?;
        }

        Ok(host_path)
    }

    /// Translates a path from `guest` to `host` on behalf of `child`, a
    /// traced process whose current directory or `dir_fd` base should be
    /// resolved through `/proc/$pid` rather than the in-process `cwd`
    /// field. When `child` is `None`, behaves like `translate_path`/
    /// `translate_absolute_path` against the in-process state, as used by
    /// callers with no live traced process to consult (the demo binary,
    /// most tests).
    fn translate_for_child<P: AsRef<Path>>(
        &self,
        child: Option<&mut ChildId>,
        dir_fd: i32,
        guest_path: P,
        deref_final: bool,
    ) -> Result<PathBuf> {
        let guest_path = guest_path.as_ref();

        let absolute_guest_path = if guest_path.is_relative() {
            let base = match &child {
                Some(child) => base_for(child.pid, dir_fd)?,
                None => PathBuf::from(self.get_cwd()),
            };
            base.join(guest_path)
        } else {
            guest_path.to_path_buf()
        };

        // Delayed translation only applies when the runner-injection hook
        // is active and a concrete traced child is being translated for;
        // without it, a pending trigger on a `ChildId` must not silently
        // suppress translation.
        if self.runner_enabled() {
            if let Some(child) = child {
                if is_delayed(child, &absolute_guest_path) {
                    return Ok(absolute_guest_path);
                }
            }
        }

        self.translate_absolute_path(&absolute_guest_path, deref_final)
    }

    /// Translates a path from `host` to `guest`.
    ///
    /// `path` must canonicalized;
    /// Removes/substitutes the leading part of a "translated" `path`.
    ///
    /// Returns
    /// * `Ok(None)` if no translation is required (ie. symmetric binding).
    /// * `Ok(PathBuf)` is the path was translated.
    /// * `Err(EPERM)` if `sanity_check` is set and `path` lies outside both
    ///   every mirror and the guest root.
    fn detranslate_path<P: AsRef<Path>>(
        &self,
        host_path: P,
        sanity_check: bool,
    ) -> Result<Option<PathBuf>> {
        let host_path = host_path.as_ref();
        // Don't try to detranslate relative paths (typically
        // the target of a relative symbolic link).
        if host_path.is_relative() {
            return Ok(None);
        }

        if let Ok(maybe_path) = self.substitute(host_path, Host) {
            // if a suitable binding was found, we stop here
            return Ok(Some(maybe_path));
        }

        // otherwise, we simply try to strip the (guest) root
        if let Ok(stripped_path) = host_path.strip_prefix(&self.get_root()) {
            return Ok(Some(PathBuf::from("/").join(stripped_path)));
        }

        if sanity_check {
            return Err(Error::errno_with_msg(
                Errno::EPERM,
                format!(
                    "{:?} is outside of both the guest root and every mirror",
                    host_path
                ),
            ));
        }

        Ok(None)
    }
}

/// Resolves the base directory a relative guest path should be joined
/// against, for a concrete traced child: `/proc/$pid/cwd` when `dir_fd` is
/// `AT_FDCWD`, otherwise `/proc/$pid/fd/$dir_fd`, which must resolve to a
/// directory.
fn base_for(pid: Pid, dir_fd: i32) -> Result<PathBuf> {
    let link = if dir_fd == AT_FDCWD {
        format!("/proc/{}/cwd", pid)
    } else {
        format!("/proc/{}/fd/{}", pid, dir_fd)
    };

    let target = fs::read_link(&link)?;

    if dir_fd != AT_FDCWD {
        let metadata = fs::metadata(&link)?;
        if !metadata.is_dir() {
            return Err(Error::errno(Errno::ENOTDIR));
        }
    }

    Ok(target)
}

/// Best-effort, advisory-only containment check: resolves `host_path`'s
/// real location on the host and fails if it escaped the configured root.
/// Race-prone by nature (the host path can change between this check and
/// actual use), hence "advisory"; still useful as a last line of defense
/// against an already-dereferenced symlink chain landing outside the jail.
fn sanity_check(host_path: &Path, root: &Path) -> Result<()> {
    match fs::canonicalize(host_path) {
        Ok(real_path) => {
            if !real_path.starts_with(root) {
                return Err(Error::errno_with_msg(
                    Errno::EPERM,
                    format!(
                        "{:?} resolves to {:?}, outside of the guest root {:?}",
                        host_path, real_path, root
                    ),
                ));
            }
            Ok(())
        }
        // The final component might legitimately not exist yet (e.g. the
        // target of an `open(O_CREAT)`); only a real error should escape.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::from(err)),
    }
}
