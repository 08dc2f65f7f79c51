use crate::errors::*;
use crate::filesystem::pathutils::{
    check_component_len, classify_final, ends_with_separator, FinalKind, MAX_SYMLINK_DEPTH,
};
use crate::filesystem::substitution::Substitutor;
use crate::filesystem::translation::Translator;
use crate::filesystem::FileSystem;
use nix::unistd::Pid;
use std::path::{Component, Path, PathBuf};

pub trait Canonicalizer {
    fn canonicalize(&self, path: &Path, deref_final: bool) -> Result<PathBuf>;

    /// Like `canonicalize`, but rewrites a leading `/proc/self` component to
    /// `/proc/$pid` for the given traced process, matching `path.c`'s
    /// special case inside `canonicalize()`. Used by
    /// `Translator::translate_for_child` when a concrete child is known;
    /// plain `canonicalize` (no pid) leaves `/proc/self` untouched, since
    /// without a traced process there is nothing meaningful to substitute.
    fn canonicalize_for_pid(&self, path: &Path, deref_final: bool, pid: Pid) -> Result<PathBuf>;
}

impl Canonicalizer for FileSystem {
    /// Canonicalizes `user_path` relative to the guest root (see `man 3
    /// realpath`).
    ///
    /// It removes ".." and "." from the paths and recursively dereferences
    /// symlinks. It checks that every path of the path exists.
    /// The result is a canonicalized path on the `Guest` side.
    ///
    /// The final path is only deferenced if `deref_final` is true.
    ///
    /// # Paramters
    ///
    /// - user_path: path to be canonicalized, must be absolute path
    /// - deref_final: weather or not to dereference final user_path
    ///
    /// # Return
    ///
    /// guest_path: the canonicalized user_path, which is a path in the view of
    /// Guest
    fn canonicalize(&self, user_path: &Path, deref_final: bool) -> Result<PathBuf> {
        self.canonicalize_with_depth(user_path, deref_final, 0, None)
    }

    fn canonicalize_for_pid(&self, user_path: &Path, deref_final: bool, pid: Pid) -> Result<PathBuf> {
        self.canonicalize_with_depth(user_path, deref_final, 0, Some(pid))
    }
}

trait CanonicalizerInternal {
    fn canonicalize_with_depth(
        &self,
        user_path: &Path,
        deref_final: bool,
        depth: u32,
        pid: Option<Pid>,
    ) -> Result<PathBuf>;
}

impl CanonicalizerInternal for FileSystem {
    fn canonicalize_with_depth(
        &self,
        user_path: &Path,
        deref_final: bool,
        depth: u32,
        pid: Option<Pid>,
    ) -> Result<PathBuf> {
        // Avoid infinite loop on circular links.
        if depth > MAX_SYMLINK_DEPTH {
            return Err(Error::errno_with_msg(
                Errno::ELOOP,
                format!("too many levels of symbolic links: {:?}", user_path),
            ));
        }

        // The `user_path` must be absolute path
        if user_path.is_relative() {
            return Err(Error::errno_with_msg(
                Errno::EINVAL,
                format!("Cannot canonicalizing a relative path: {:?}", user_path),
            ));
        }

        let wants_final_dir = ends_with_separator(user_path);

        // build guest_path from user_path
        let mut guest_path = PathBuf::new();

        // split user_path to components and check them, so that path traversal can be
        // avoided.
        // We need the `next` component to know if the current one is the last one
        let mut it = user_path.components();
        let mut next_comp = it.next();
        while let Some(component) = next_comp {
            next_comp = it.next();
            let is_last_component = next_comp.is_none();
            let finality = classify_final(is_last_component, wants_final_dir);

            match component {
                Component::RootDir => {
                    guest_path.push(Component::RootDir);
                    continue;
                }
                Component::CurDir | Component::Prefix(_) => {
                    // Component::Prefix does not occur on Unix
                    continue;
                }
                Component::ParentDir => {
                    guest_path.pop();
                    continue;
                }
                Component::Normal(path_part) => {
                    // Very special case: substitute "/proc/self" with
                    // "/proc/$pid". Only covers the common case, as in the
                    // original implementation.
                    let effective_part = if path_part == "self"
                        && guest_path == Path::new("/proc")
                        && (!finality.is_final() || deref_final)
                    {
                        match pid {
                            Some(pid) => std::ffi::OsString::from(pid.to_string()),
                            None => path_part.to_os_string(),
                        }
                    } else {
                        path_part.to_os_string()
                    };

                    check_component_len(&effective_part)?;
                    guest_path.push(&effective_part);

                    // Resolve bindings and add glue if necessary. A missing
                    // host entry (`ENOENT`, e.g. the target of a future
                    // `open(O_CREAT)`, or an intermediate directory under
                    // an asymmetric mirror) is not distinguished from "not
                    // a symlink": per `path.c`'s `canonicalize()`, such
                    // errors are swallowed here and left for the syscall
                    // that will actually touch the file — canonicalization
                    // maps paths, it does not enforce that they exist. Any
                    // other error (e.g. `NAME_TOO_LONG` from an overlong
                    // substitution) is a real failure and still propagates.
                    let (host_path, maybe_file_type) =
                        match self.substitute_intermediary_and_glue(&guest_path) {
                            Ok(resolved) => resolved,
                            Err(err) if err.get_errno() == Errno::ENOENT => continue,
                            Err(err) => return Err(err),
                        };

                    //TODO: remove when glue is implemented
                    if maybe_file_type.is_none() {
                        continue;
                    }
                    let file_type = maybe_file_type.unwrap();

                    // directory can always push
                    if file_type.is_dir() {
                        continue;
                    }
                    if file_type.is_symlink() {
                        // we can continue if current path is symlink, is the last component,
                        // the caller asked not to dereference it, AND the input didn't end in
                        // a trailing separator: a trailing "/" already demands directory
                        // semantics and must still be dereferenced, per `FINAL_NORMAL`-only
                        // gating in `path.c`'s `canonicalize()` (`ForceDir` always derefs).
                        if finality == FinalKind::Normal && !deref_final {
                            continue;
                        }
                        // we need to deref
                        let link_value = host_path.read_link()?;

                        // Remove the leading guest-root part if the stored
                        // target happens to look like a host path (useful
                        // for "/proc/$pid/cwd" style symlinks).
                        let link_value =
                            match self.detranslate_path(&link_value, false)? {
                                Some(detranslated) => detranslated,
                                None => link_value,
                            };

                        let mut new_user_path = if link_value.is_absolute() {
                            // link_value is a absolute path, so we need to replace user_path
                            // with link_value first.
                            link_value
                        } else {
                            // link_value is a relative path, so we need to append link_value to
                            // guest_path.
                            guest_path.pop();
                            guest_path.push(&link_value);
                            guest_path
                        };
                        // append remaining Components
                        if let Some(comp) = next_comp {
                            new_user_path.push(comp);
                        }
                        it.for_each(|comp| new_user_path.push(comp));

                        // `finality.forces_dir()` implies this was the final
                        // component of the original input (classify_final
                        // only reports ForceDir when is_last_component), so
                        // nothing was appended above: restamp the trailing
                        // separator the recursive call would otherwise lose,
                        // since it recomputes "wants a directory" from
                        // `new_user_path` alone.
                        if finality.forces_dir() && !ends_with_separator(&new_user_path) {
                            let mut with_slash = new_user_path.into_os_string();
                            with_slash.push("/");
                            new_user_path = PathBuf::from(with_slash);
                        }

                        // use new_user_path to call this function again and return
                        return self.canonicalize_with_depth(&new_user_path, deref_final, depth + 1, pid);
                    }
                    // we cannot go through a path which is neither a directory nor a symlink
                    if !is_last_component {
                        return Err(Error::errno_with_msg(
                            Errno::ENOTDIR,
                            "when canonicalizing an intermediate path",
                        ));
                    }
                }
            }
        }

        if wants_final_dir && !ends_with_separator(&guest_path) {
            let mut with_slash = guest_path.into_os_string();
            with_slash.push("/");
            return Ok(PathBuf::from(with_slash));
        }

        Ok(guest_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::binding::Binding;
    use crate::filesystem::FileSystem;
    use crate::utils::tests::get_test_rootfs;
    use nix::sys::stat::Mode;
    use std::path::PathBuf;

    #[test]
    fn test_canonicalize_nonexistent_path_is_still_resolved() {
        // canonicalization maps paths, it does not enforce that they
        // exist: a missing host stat is treated like "not a symlink"
        // rather than aborting resolution (spec.md S4.C step 2c).
        let fs = FileSystem::with_root(get_test_rootfs());
        let path = PathBuf::from("/impossible_path");

        assert_eq!(
            fs.canonicalize(&path, false),
            Ok(PathBuf::from("/impossible_path"))
        );
    }

    #[test]
    fn test_canonicalize_path_traversal() {
        let fs = FileSystem::with_root(get_test_rootfs());

        // "${rootfs}/impossible_path" doesn't exist, but that's not an
        // error for canonicalization itself.
        let path = PathBuf::from("/../impossible_path");
        assert_eq!(
            fs.canonicalize(&path, false),
            Ok(PathBuf::from("/impossible_path"))
        );
        // should be ok, because ${rootfs}/etc exists on host
        let path = PathBuf::from("/../bin");
        assert_eq!(fs.canonicalize(&path, false), Ok(PathBuf::from("/bin")));
    }

    #[test]
    fn test_canonicalize_normal_path() {
        let mut rootfs_path = get_test_rootfs();
        let mut fs = FileSystem::with_root(rootfs_path.as_path());

        assert_eq!(
            fs.canonicalize(&PathBuf::from("/bin/./../bin//sleep"), false)
                .unwrap(),
            PathBuf::from("/bin/sleep")
        );

        assert_eq!(
            fs.canonicalize(&PathBuf::from("/./../../.././../."), false)
                .unwrap(),
            PathBuf::from("/")
        );

        // change new root to ${rootfs}/etc
        let mut new_rootfs_path = rootfs_path.clone();
        new_rootfs_path.push("etc");
        fs.set_root(new_rootfs_path);

        // add binding from ${rootfs}/bin to /bin
        rootfs_path.push("bin");
        fs.add_binding(Binding::new(rootfs_path, "/bin", true));

        // necessary, because nor "/bin" nor "/home" exist in "${rootfs}/etc"
        fs.set_glue_type(Mode::S_IRWXU | Mode::S_IRWXG | Mode::S_IRWXO);

        assert_eq!(
            fs.canonicalize(&PathBuf::from("/bin/../home"), false)
                .unwrap(),
            PathBuf::from("/home")
        );
    }

    #[test]
    fn test_canonicalize_no_root_normal_path() {
        let mut fs = FileSystem::with_root(get_test_rootfs());

        // should be ok, because ${rootfs}/home, ${rootfs}/, ${rootfs}/bin/,
        // ${rootfs}/bin/sleep are all exist on host
        assert_eq!(
            fs.canonicalize(&PathBuf::from("/home/../etc/./../etc/passwd"), false)
                .unwrap(),
            PathBuf::from("/etc/passwd")
        );

        // necessary, because nor "/test" probably doesn't exist
        fs.set_glue_type(Mode::S_IRWXU | Mode::S_IRWXG | Mode::S_IRWXO);

        assert_eq!(
            fs.canonicalize(&PathBuf::from("/etc/../test"), false)
                .unwrap(),
            PathBuf::from("/test")
        );
    }

    #[test]
    fn test_canonicalize_symlink_not_deref() {
        let fs = FileSystem::with_root(get_test_rootfs());

        // "${rootfs}/lib64" is a symlink to "lib"
        assert_eq!(
            fs.canonicalize(&PathBuf::from("/lib64"), false).unwrap(),
            PathBuf::from("/lib64")
        );
        assert_eq!(
            fs.canonicalize(&PathBuf::from("/lib64"), true).unwrap(),
            PathBuf::from("/lib")
        );
    }

    #[test]
    fn test_canonicalize_force_dir_preserves_trailing_slash() {
        let fs = FileSystem::with_root(get_test_rootfs());

        assert_eq!(
            fs.canonicalize(&PathBuf::from("/bin/"), false).unwrap(),
            PathBuf::from("/bin/")
        );
        assert_eq!(
            fs.canonicalize(&PathBuf::from("/bin"), false).unwrap(),
            PathBuf::from("/bin")
        );
    }

    #[test]
    fn test_canonicalize_force_dir_still_derefs_symlink_without_deref_final() {
        // "${rootfs}/lib64" is a symlink to "lib"; a trailing "/" demands
        // directory semantics and must be dereferenced even though
        // `deref_final=false`, unlike the bare "/lib64" case above.
        let fs = FileSystem::with_root(get_test_rootfs());

        assert_eq!(
            fs.canonicalize(&PathBuf::from("/lib64/"), false).unwrap(),
            PathBuf::from("/lib/")
        );
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let fs = FileSystem::with_root(get_test_rootfs());

        let once = fs.canonicalize(&PathBuf::from("/bin/sleep"), false).unwrap();
        let twice = fs.canonicalize(&once, false).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonicalize_too_many_symlinks() {
        let fs = FileSystem::with_root(get_test_rootfs());

        assert_eq!(
            fs.canonicalize_with_depth(&PathBuf::from("/lib64"), true, 1000, None),
            Err(Error::errno(Errno::ELOOP))
        );
    }
}
