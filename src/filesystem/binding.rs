use crate::errors::*;
use crate::filesystem::pathutils::join_paths;
use nix::NixPath;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Side {
    Host,  // in the real filesystem
    Guest, // in the sandbox
}

impl Side {
    pub fn reverse(&self) -> Side {
        match self {
            Side::Host => Side::Guest,
            Side::Guest => Side::Host,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    /// Host side path of this binding in canonical form.
    host: PathBuf,
    /// Guest side path of this binding in canonical form.
    guest: PathBuf,
    /// A binding is called `symetric binding` if `host` is equals to `guest`,
    /// which means that the paths under this binding do not require path
    /// substitution.
    need_substitution: bool,
    _must_exist: bool,
}

impl Binding {
    //TODO: return Option<Binding> and make checks (test existence if must_exist,
    // sanitize, canon..)
    pub fn new<P1, P2>(host: P1, guest: P2, must_exist: bool) -> Binding
    where
        P1: Into<PathBuf>,
        P2: Into<PathBuf>,
    {
        let host = host.into();
        let guest = guest.into();
        let need_substitution = !host.eq(&guest);
        Binding {
            host: host,
            guest: guest,
            need_substitution: need_substitution,
            _must_exist: must_exist,
        }
    }

    #[inline]
    pub fn get_path(&self, side: Side) -> &PathBuf {
        match side {
            Side::Guest => &self.guest,
            Side::Host => &self.host,
        }
    }

    #[inline]
    pub fn needs_substitution(&self) -> bool {
        self.need_substitution
    }

    /// Replaces the host side of this binding, recomputing whether it still
    /// needs substitution. Used by the root binding once the configured new
    /// root has been resolved to its canonical form at `initialize()` time;
    /// every other binding is built already-canonicalized and never mutated.
    #[inline]
    pub(crate) fn set_host(&mut self, host: PathBuf) {
        self.need_substitution = host != self.guest;
        self.host = host;
    }

    #[inline]
    pub fn substitute_path_prefix(&self, path: &Path, from_side: Side) -> Result<PathBuf> {
        let current_prefix = self.get_path(from_side);
        let new_prefix = self.get_path(from_side.reverse());

        let stripped_path = path.strip_prefix(current_prefix).with_context(|| {
            format!(
                "Failed to strip_prefix {:?} from {:?}",
                current_prefix, path
            )
        })?;

        // If the `stripped_path` is empty, `join_paths` will not add the extra
        // "/" at the end of the path.
        //
        // Note: As mentioned in the document of `std::path::PathBuf::components()`, "A
        // trailing slash is normalized away" in a path. And it means `foo/bar` is the
        // same as `foo/bar/` . However, many Linux system call are sensitive to
        // trailing slash, and they assume a path with a trailing slash as a directory.
        let parts = if stripped_path.is_empty() {
            [Some(new_prefix.as_path()), None]
        } else {
            [Some(new_prefix.as_path()), Some(stripped_path)]
        };

        join_paths(&parts)
    }
}

#[cfg(test)]
mod tests {
    use super::Side::{Guest, Host};
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_binding_set_host_recomputes_substitution() {
        let mut binding = Binding::new("/mnt/rootfs", "/", true);
        assert!(binding.needs_substitution());

        binding.set_host(PathBuf::from("/"));
        assert!(!binding.needs_substitution());
    }

    #[test]
    fn test_binding_get_path() {
        // "/etc" on host = "/media" on guest
        let binding = Binding::new("/etc", "/media", true);

        assert_eq!(binding.get_path(Side::Host), &PathBuf::from("/etc"));
        assert_eq!(binding.get_path(Side::Guest), &PathBuf::from("/media"));
    }

    #[test]
    fn test_substitute_path_prefix_root() {
        // "/etc" on host = "/media" on guest
        let binding = Binding::new("/home/user", "/", true);

        assert_eq!(
            binding.substitute_path_prefix(&PathBuf::from("/bin/sleep"), Guest),
            Ok(PathBuf::from("/home/user/bin/sleep"))
        ); // "/" => "/home/user"
        assert_eq!(
            binding.substitute_path_prefix(&PathBuf::from("/"), Guest),
            Ok(PathBuf::from("/home/user"))
        ); // same here
        assert_eq!(
            binding.substitute_path_prefix(&PathBuf::from("/bin/sleep"), Host),
            Err(Error::unknown())
        ); // "/home/user" is not a prefix of this path
        assert_eq!(
            binding.substitute_path_prefix(&PathBuf::from("/"), Host),
            Err(Error::unknown())
        ); // same here
    }

    #[test]
    fn test_substitute_path_prefix_different_path() {
        // "/etc" on host = "/media" on guest
        let binding = Binding::new("/etc", "/media", true);

        assert_eq!(
            binding.substitute_path_prefix(&PathBuf::from("/etc/bin/sleep"), Guest),
            Err(Error::unknown())
        ); // no "/etc" prefix on the guest side
        assert_eq!(
            binding.substitute_path_prefix(&PathBuf::from("/media/bin/sleep"), Guest,),
            Ok(PathBuf::from("/etc/bin/sleep"))
        ); // "/media" => "/etc"
        assert_eq!(
            binding.substitute_path_prefix(&PathBuf::from("/etc/bin/sleep"), Host),
            Ok(PathBuf::from("/media/bin/sleep"))
        ); // "/etc" => "/media"
        assert_eq!(
            binding.substitute_path_prefix(&PathBuf::from("/media/bin/sleep"), Host,),
            Err(Error::unknown())
        ); // no "/media" prefix on the host side
    }
}
