#[cfg(test)]
pub mod tests {
    use std::fs;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tempfile::TempDir;

    /// Builds (once) a small fake guest rootfs under a temp directory and
    /// returns its path on every call. Real file access (lstat, readlink,
    /// execute bits) is part of what's under test, so tests need a real
    /// directory tree rather than an in-memory fixture.
    pub fn get_test_rootfs() -> PathBuf {
        static ROOTFS: OnceLock<PathBuf> = OnceLock::new();

        ROOTFS
            .get_or_init(|| {
                let dir = TempDir::new().expect("failed to create temp rootfs");
                let root = dir.path().to_path_buf();

                fs::create_dir_all(root.join("bin")).unwrap();
                fs::create_dir_all(root.join("etc")).unwrap();
                fs::create_dir_all(root.join("home")).unwrap();
                fs::create_dir_all(root.join("lib")).unwrap();
                fs::create_dir_all(root.join("proc")).unwrap();

                fs::write(root.join("bin/sleep"), b"#!/bin/sh\n").unwrap();
                let mut perms = fs::metadata(root.join("bin/sleep")).unwrap().permissions();
                std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
                fs::set_permissions(root.join("bin/sleep"), perms).unwrap();

                fs::write(root.join("bin/true"), b"#!/bin/sh\n").unwrap();
                fs::write(root.join("etc/passwd"), b"root:x:0:0::/root:/bin/sh\n").unwrap();

                symlink("sleep", root.join("bin/sh")).unwrap();
                symlink("lib", root.join("lib64")).unwrap();

                // Keep the TempDir alive for the process lifetime: tests only
                // ever read this path, they never need to clean it up.
                std::mem::forget(dir);
                root
            })
            .clone()
    }
}
