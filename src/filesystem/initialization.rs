use crate::errors::Result;
use crate::filesystem::binding::Binding;
use crate::filesystem::pathutils::join_paths;
use crate::filesystem::{Canonicalizer, FileSystem};
use nix::unistd::getcwd;
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

pub trait Initialiser {
    fn initialize(&mut self) -> Result<()>;
    fn initialize_root(&mut self) -> Result<()>;
    fn initialize_mirrors(&mut self);
    fn initialize_cwd(&mut self) -> Result<()>;
}

impl Initialiser for FileSystem {
    /// Establishes the new root, sanitizes every registered mirror against
    /// it, and resolves the initial working directory, in that order: the
    /// mirror table's canonicalizer needs `root` to already be in place,
    /// and the `cwd` resolution needs the mirror table to already be live.
    fn initialize(&mut self) -> Result<()> {
        self.initialize_root()?;
        self.initialize_mirrors();
        self.initialize_cwd()?;
        Ok(())
    }

    /// Canonicalizes the configured new root via the host's real `realpath`
    /// (`std::fs::canonicalize`), matching `init_module_path`'s fatal
    /// `realpath(new_root, root)` call. A root that fails to canonicalize
    /// is a fatal configuration error, unlike a mirror that fails the same
    /// step (which is merely dropped with a warning).
    fn initialize_root(&mut self) -> Result<()> {
        let canonical_root = fs::canonicalize(self.get_root())?;
        self.set_canonical_root(canonical_root);
        Ok(())
    }

    /// Sanitizes every mirror registered through `add_mirror` before
    /// `initialize` was called: canonicalizes the guest location against
    /// the now-established root, rejects a location of `/`, strips a
    /// trailing `/`, computes whether host/guest substitution is needed,
    /// creates placeholder directories so walkers reach the mirror, and
    /// only then makes the mirror visible to translation by adding it to
    /// the live binding list. A mirror that fails any of these steps is
    /// logged and dropped rather than kept in a half-sanitized state,
    /// per the license `spec.md` §9 grants reimplementations.
    fn initialize_mirrors(&mut self) {
        for (host_path, guest_location) in self.take_pending_mirrors() {
            let raw_location = guest_location.unwrap_or_else(|| host_path.clone());

            let canonical_location = match self.canonicalize(&raw_location, true) {
                Ok(path) => path,
                Err(err) => {
                    log::warn!(
                        "jail-fs: mirror {:?} -> {:?} could not be sanitized, ignoring it: {}",
                        host_path,
                        raw_location,
                        err
                    );
                    continue;
                }
            };

            if canonical_location == Path::new("/") {
                log::warn!(
                    "jail-fs: mirror {:?} -> {:?} resolves to \"/\", ignoring it",
                    host_path,
                    raw_location
                );
                continue;
            }

            let canonical_location = strip_trailing_slash(canonical_location);

            if let Err(err) = create_dummy(self.get_root(), &canonical_location) {
                log::warn!(
                    "jail-fs: could not create placeholder directories for mirror {:?}: {}",
                    canonical_location,
                    err
                );
            }

            log::info!(
                "jail-fs: mirror registered: {:?} -> {:?}",
                host_path,
                canonical_location
            );

            self.add_binding(Binding::new(host_path, canonical_location, true));
        }
    }

    #[inline]
    fn initialize_cwd(&mut self) -> Result<()> {
        // Prepare the base in case cwd is relative.
        let mut raw_cwd = match self.get_cwd().is_relative() {
            // FIXME: This will crash when get_cwd() is a relative path. Because
            // nix::unistd::getcwd() returns a host path, which will result in `raw_cwd`
            // also being a host path. This problem also exists in proot written in C.
            true => getcwd()?,
            false => PathBuf::new(),
        };

        raw_cwd.push(self.get_cwd());

        // Unlike a regular translation, the initial working directory must
        // actually exist and be a directory: canonicalize() on its own
        // tolerates a path that doesn't exist yet (spec.md §4.C step 2c),
        // so existence is checked explicitly against the host side here.
        let cwd = self
            .canonicalize(&raw_cwd, true)
            .ok()
            .filter(|canonical| is_host_directory(self, canonical))
            .unwrap_or_else(|| {
                log::warn!(
                    "jail-fs: can't chdir (\"{}\") in the guest rootfs",
                    raw_cwd.display(),
                );
                log::info!("jail-fs: default working directory is now \"/\"");
                PathBuf::from("/")
            });

        // Replace with the canonicalized working directory.
        self.set_cwd(cwd);
        Ok(())
    }
}

/// Whether a (already-canonicalized) guest path resolves to a directory on
/// the host side.
fn is_host_directory(fs: &FileSystem, canonical_guest_path: &Path) -> bool {
    use crate::filesystem::binding::Side;
    use crate::filesystem::substitution::Substitutor;

    fs.substitute(canonical_guest_path, Side::Guest)
        .map(|host_path| host_path.is_dir())
        .unwrap_or(false)
}

fn strip_trailing_slash(path: PathBuf) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let bytes = path.as_os_str().as_bytes();
    if bytes.len() > 1 && bytes.last() == Some(&b'/') {
        PathBuf::from(OsStr::from_bytes(&bytes[..bytes.len() - 1]))
    } else {
        path
    }
}

/// Materializes placeholder directories under `root` so that a program
/// walking towards an asymmetric mirror's guest location finds real
/// parent directories along the way, exactly as `path.c`'s `create_dummy`
/// does for `-b host:guest` mounts whose guest side has no host
/// counterpart. A no-op if the location already exists. Ported
/// component-by-component (not `create_dir_all`) so that an `EEXIST` on
/// any single component is benign while any other error is merely logged;
/// a dummy directory that fails to materialize is non-fatal to `initialize`.
fn create_dummy(root: &Path, guest_location: &Path) -> Result<()> {
    let relative_location = guest_location.strip_prefix("/").unwrap_or(guest_location);
    let host_location = join_paths(&[Some(root), Some(relative_location)])?;

    if fs::symlink_metadata(&host_location).is_ok() {
        return Ok(());
    }

    let mut walked = root.to_path_buf();
    for component in guest_location.components() {
        if component == std::path::Component::RootDir {
            continue;
        }
        walked.push(component);

        match fs::DirBuilder::new().mode(0o777).create(&walked) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => {
                log::warn!("jail-fs: mkdir {:?} failed: {}", walked, err);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::binding::Side;
    use crate::filesystem::FileSystem;
    use crate::utils::tests::get_test_rootfs;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_initialisation_cwd_invalid_should_default_to_root() {
        let mut fs = FileSystem::with_root(get_test_rootfs());

        fs.set_cwd(PathBuf::from("/my/impossible/cwd"));

        assert_eq!(Ok(()), fs.initialize_cwd());

        // because the `cwd` we set is not existed, the cwd must have defaulted to "/"
        assert!(fs.get_cwd().is_absolute());
        assert!(fs.get_cwd().exists());
        assert_eq!(&PathBuf::from("/"), fs.get_cwd());
    }

    #[test]
    fn test_initialisation_cwd_absolute() {
        let mut fs = FileSystem::with_root(get_test_rootfs());

        fs.set_cwd(PathBuf::from("/bin"));

        assert_eq!(Ok(()), fs.initialize_cwd());

        // because the value of cwd is `/bin`, and ${rootfs}/bin exists, so the cwd need
        // not to be reset to "/".
        assert!(fs.get_cwd().is_absolute());
        assert!(fs.get_cwd().exists());
        assert_eq!(&PathBuf::from("/bin"), fs.get_cwd());
    }

    #[test]
    fn test_initialisation_cwd_relative() {
        let rootfs_path = get_test_rootfs();
        let mut fs = FileSystem::with_root(rootfs_path.as_path());

        fs.set_cwd(PathBuf::from("./.."));

        // the cwd should be reset to default value "/"
        assert_eq!(Ok(()), fs.initialize_cwd());

        assert!(fs.get_cwd().is_absolute());
        assert_eq!(Path::new("/"), fs.get_cwd());
    }

    #[test]
    fn test_initialize_root_canonicalizes_uncanonical_root() {
        let rootfs_path = get_test_rootfs();
        let uncanonical = rootfs_path.join("bin/../bin");

        let mut fs = FileSystem::with_root(&uncanonical);
        fs.initialize_root().unwrap();

        assert_eq!(fs.get_root(), rootfs_path.join("bin"));
    }

    #[test]
    fn test_initialize_root_fails_on_nonexistent_root() {
        let mut fs = FileSystem::with_root("/this/path/almost/certainly/does/not/exist");
        assert!(fs.initialize_root().is_err());
    }

    #[test]
    fn test_initialize_mirrors_sanitizes_and_registers() {
        let rootfs_path = get_test_rootfs();
        let mut fs = FileSystem::with_root(&rootfs_path);
        fs.initialize_root().unwrap();

        // asymmetric mirror: host "/etc" (real host dir) visible under
        // guest "/mnt/etc", which doesn't exist anywhere yet.
        fs.add_mirror("/etc", Some("/mnt/etc"));
        fs.initialize_mirrors();

        assert_eq!(
            fs.get_first_appropriate_binding(Path::new("/mnt/etc/passwd"), Side::Guest)
                .unwrap()
                .get_path(Side::Host),
            &PathBuf::from("/etc")
        );

        // the dummy directory was created so walkers reach the mirror
        assert!(rootfs_path.join("mnt/etc").is_dir());
    }

    #[test]
    fn test_initialize_mirrors_rejects_root_location() {
        let rootfs_path = get_test_rootfs();
        let mut fs = FileSystem::with_root(&rootfs_path);
        fs.initialize_root().unwrap();

        fs.add_mirror("/etc", Some("/"));
        fs.initialize_mirrors();

        assert!(fs
            .get_first_appropriate_binding(Path::new("/anything"), Side::Guest)
            .is_none());
    }

    #[test]
    fn test_initialize_mirrors_drops_unresolvable_mirror() {
        let rootfs_path = get_test_rootfs();
        let mut fs = FileSystem::with_root(&rootfs_path);
        fs.initialize_root().unwrap();

        fs.add_mirror("/this/does/not/exist/on/host", Some("/mirror"));
        fs.initialize_mirrors();

        assert!(fs
            .get_first_appropriate_binding(Path::new("/mirror/x"), Side::Guest)
            .is_none());
    }
}
