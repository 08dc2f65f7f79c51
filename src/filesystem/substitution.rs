use crate::errors::*;
use crate::filesystem::binding::Side;
use crate::filesystem::FileSystem;
use nix::sys::stat::Mode;
use std::fs::FileType;
use std::path::{Path, PathBuf};

pub trait Substitutor {
    fn substitute(&self, path: &Path, from_side: Side) -> Result<PathBuf>;
    fn substitute_intermediary_and_glue(&self, path: &Path) -> Result<(PathBuf, Option<FileType>)>;
}

impl Substitutor for FileSystem {
    /// Finds a suitable binding for the given path,
    /// and changes its prefix from one side to another, if it can.
    ///
    /// Returns the substituted path,
    /// or `None` if the path wasn't modified.
    ///
    /// * `path` is the path that will be modified. Must be canonicalized.
    /// * `direction` is the direction of the substitution.
    #[inline]
    fn substitute(&self, path: &Path, from_side: Side) -> Result<PathBuf> {
        let maybe_binding = self.get_first_appropriate_binding(path, from_side);
        // TODO: should we substitute with root?
        if maybe_binding.is_none() {
            return Err(Error::errno_with_msg(
                ENOENT,
                format!(
                    "No binding found, when substituting binding for path: {:?}",
                    path
                ),
            ));
        }
        let binding = maybe_binding.unwrap();

        // Is it a "symmetric" binding?
        if !binding.needs_substitution() {
            return Ok(path.to_path_buf());
        }

        binding.substitute_path_prefix(path, from_side)
    }

    /// Substitute a binding of a canonicalized path, from `Guest` to `Host`,
    /// and uses glue if the user doesn't have the permissions necessary.
    ///
    /// The substituted path is returned along with its file type.
    #[inline]
    fn substitute_intermediary_and_glue(
        &self,
        guest_path: &Path,
    ) -> Result<(PathBuf, Option<FileType>)> {
        let host_path = self.substitute(guest_path, Side::Guest)?;

        // Retrieves the path's metadata without going through symlinks.
        match host_path.symlink_metadata().map_err(Error::from) {
            Ok(metadata) => Ok((host_path, Some(metadata.file_type()))),
            Err(_) => {
                if self.get_glue_type() != &Mode::empty() {
                    //TODO: implement glue

                    // TODO: maybe we can implement glue by return `Permission denied` when access
                    // glued path, instead of `mkdtemp`.

                    //        /* Build the glue between the hostfs and the guestfs during
                    //         * the initialization of a binding.  */
                    //        if (status < 0 && tracee->glue_type != 0) {
                    //            statl.st_mode = build_glue(tracee, guest_path, host_path,
                    // finality);            if (statl.st_mode == 0)
                    //                status = -1;
                    //        }

                    // for now we return the same path
                    Ok((host_path, None))
                } else {
                    Err(Error::errno_with_msg(
                        ENOENT,
                        "when substituting intermediary without glue",
                    ))
                }
            }
        }
    }
}
