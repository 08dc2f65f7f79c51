use std::path::{Path, PathBuf};

use nix::sys::{self, stat::Mode};
use nix::unistd::{self, AccessFlags};

use crate::errors::Result;
use crate::filesystem::binding::Side::Host;
use crate::filesystem::binding::{Binding, Side};

/// Information related to a file-system name-space.
///
/// Built through ordinary setters (`set_root`, `add_mirror`, `set_cwd`) and
/// finalized with `Initialiser::initialize`, rather than kept as process-wide
/// global state: this lets more than one `FileSystem` value exist at once,
/// which the ptrace-driven original has no need for but tests (and, in
/// principle, a supervisor juggling several jails) do.
#[derive(Debug)]
pub struct FileSystem {
    /// List of sanitized bindings used to replicate `mount` and `bind`.
    /// It will also contain the root binding (to replicate `chroot`).
    bindings: Vec<Binding>,
    /// Mirrors registered through `add_mirror` but not yet sanitized.
    /// Sanitization (canonicalizing the guest location, rejecting `/`,
    /// creating the mount point) happens once, in `Initialiser::initialize`.
    pending_mirrors: Vec<(PathBuf, Option<PathBuf>)>,
    /// Working directory in guestfs, à la `/proc/self/pwd`.
    cwd: PathBuf,
    /// Guest root (the binding associated to `/`)
    root: PathBuf,
    /// Use for glue (//TODO: explain when implemented)
    glue_type: Mode,
    /// Whether delayed translation is active for children that carry a
    /// trigger path.
    runner_enabled: bool,
}

impl FileSystem {
    pub fn new() -> FileSystem {
        FileSystem {
            bindings: vec![],
            pending_mirrors: vec![],
            cwd: PathBuf::from("."),
            root: PathBuf::from("/"),
            glue_type: Mode::empty(),
            runner_enabled: false,
        }
    }

    #[cfg(test)]
    pub fn with_root<P: AsRef<Path>>(root: P) -> FileSystem {
        let mut file_system = FileSystem::new();

        file_system.set_root(root);
        file_system
    }

    /// Add a binding at the beginning of the list,
    /// so that we get the most recent one when going through them
    /// in the `get_binding` method.
    //TODO: sort bindings to make substitution of nested bindings deterministic
    #[inline]
    pub fn add_binding(&mut self, binding: Binding) {
        self.bindings.insert(0, binding);
    }

    /// Registers a mirror for deferred sanitization. The host side is
    /// canonicalized immediately against the real filesystem, as `spec.md`
    /// §4.B's `mirror_path` requires ("Canonicalize host_path via the
    /// host's real path resolver"), since doing so needs no knowledge of
    /// the new root; a host path that fails to canonicalize is warned
    /// about and the whole mirror is dropped, matching `mirror_path`'s own
    /// `goto error` on a failed `realpath`. `guest_location` defaults to
    /// the (now-canonical) host path when absent. Unlike the host side,
    /// the guest location is not canonicalized here: it is resolved
    /// against the new root at `Initialiser::initialize` time, since the
    /// root isn't established yet when mirrors are typically registered.
    pub fn add_mirror<P1, P2>(&mut self, host_path: P1, guest_location: Option<P2>)
    where
        P1: AsRef<Path>,
        P2: Into<PathBuf>,
    {
        let host_path = match std::fs::canonicalize(host_path.as_ref()) {
            Ok(canonical) => canonical,
            Err(err) => {
                log::warn!(
                    "jail-fs: mirror host path {:?} could not be resolved, ignoring it: {}",
                    host_path.as_ref(),
                    err
                );
                return;
            }
        };

        self.pending_mirrors
            .push((host_path, guest_location.map(Into::into)));
    }

    /// Drains the mirrors registered so far; used by
    /// `Initialiser::initialize_mirrors` to sanitize them exactly once.
    pub(crate) fn take_pending_mirrors(&mut self) -> Vec<(PathBuf, Option<PathBuf>)> {
        std::mem::take(&mut self.pending_mirrors)
    }

    #[inline]
    /// Checks if the translated `host_path` belongs to the guest rootfs,
    /// that is, if it isn't from a binding.
    pub fn belongs_to_guestfs(&self, host_path: &Path) -> bool {
        host_path.starts_with(&self.root)
    }

    /// Retrieves the first appropriate binding for a path translation.
    ///
    /// * `path` is the path which content will be tested on each binding
    /// * `from_side` indicates the starting side of the translation (ie. guest
    ///   for guest -> host)
    pub fn get_first_appropriate_binding(&self, path: &Path, from_side: Side) -> Option<&Binding> {
        for binding in self.bindings.iter() {
            let binding_path = binding.get_path(from_side);

            if !path.starts_with(binding_path) {
                continue;
            }

            // TODO: Do we really need to find binding from host to guest?
            if from_side == Host
                && !self.root.eq(&PathBuf::from("/"))
                && self.belongs_to_guestfs(path)
            {
                // Avoid false positive when a prefix of the rootfs is
                // used as an asymmetric binding, ex.:
                //
                //     proot -m /usr:/location -r /usr/local/slackware
                //
                continue;
            }

            return Some(&binding);
        }

        None
    }

    #[inline]
    /// Checks is `path` is a file, does exist and is executable.
    pub fn is_path_executable(&self, path: &Path) -> Result<()> {
        unistd::access(path, AccessFlags::F_OK)?;
        unistd::access(path, AccessFlags::X_OK)?;
        sys::stat::lstat(path)?;
        Ok(())
    }

    #[inline]
    pub fn set_cwd(&mut self, cwd: PathBuf) {
        self.cwd = cwd;
    }

    #[inline]
    pub fn get_cwd(&self) -> &Path {
        &self.cwd
    }

    #[inline]
    pub fn set_root<P: AsRef<Path>>(&mut self, root: P) {
        self.root = root.as_ref().into();
        self.add_binding(Binding::new(root.as_ref(), "/", true));
    }

    #[inline]
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn get_glue_type(&self) -> &Mode {
        &self.glue_type
    }

    #[inline]
    pub fn set_glue_type(&mut self, mode: Mode) {
        self.glue_type = mode;
    }

    #[inline]
    pub fn set_runner_enabled(&mut self, enabled: bool) {
        self.runner_enabled = enabled;
    }

    #[inline]
    pub fn runner_enabled(&self) -> bool {
        self.runner_enabled
    }

    /// Replaces the host side of the root binding (the one whose guest side
    /// is `/`) once the configured new root has been resolved to its
    /// canonical form. Only called from `Initialiser::initialize`.
    pub(crate) fn set_canonical_root(&mut self, canonical_root: PathBuf) {
        for binding in self.bindings.iter_mut() {
            if binding.get_path(Side::Guest) == Path::new("/") {
                binding.set_host(canonical_root.clone());
            }
        }
        self.root = canonical_root;
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        FileSystem::new()
    }
}
