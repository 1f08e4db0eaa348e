//! Installation directory guards.
//!
//! Destructive update steps (backup, delete, rename) only ever run against a
//! directory that lives under one of a small set of allowed roots. Paths are
//! compared lexically because the installation directory may not exist yet.

use crate::error::{Result, SupervisorError};
use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against `base` and fold away `.` and `..` components.
pub fn normalize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `PathSafety` unless `path` is one of `roots` or below one of them.
pub fn ensure_under_roots(path: &Path, roots: &[PathBuf]) -> Result<()> {
    if roots.iter().any(|root| path.starts_with(root)) {
        return Ok(());
    }
    Err(SupervisorError::PathSafety {
        path: path.to_path_buf(),
        allowed: roots.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_relative_and_parent_components() {
        let base = Path::new("/home/trex");
        assert_eq!(
            normalize(base, Path::new("v2.50/./scripts")),
            PathBuf::from("/home/trex/v2.50/scripts")
        );
        assert_eq!(
            normalize(base, Path::new("../../etc")),
            PathBuf::from("/etc")
        );
        assert_eq!(normalize(base, Path::new("/tmp/x/..")), PathBuf::from("/tmp"));
    }

    #[test]
    fn roots_match_by_component_not_prefix() {
        let roots = vec![PathBuf::from("/tmp")];
        assert!(ensure_under_roots(Path::new("/tmp/trex"), &roots).is_ok());
        assert!(ensure_under_roots(Path::new("/tmp"), &roots).is_ok());

        let err = ensure_under_roots(Path::new("/tmpfoo/trex"), &roots).unwrap_err();
        assert_eq!(err.kind(), "PathSafetyError");
    }

    #[test]
    fn escaping_with_parent_components_is_refused() {
        let cwd = Path::new("/opt/trex");
        let roots = vec![cwd.to_path_buf(), PathBuf::from("/tmp")];
        let target = normalize(cwd, Path::new("../../var/lib"));
        assert!(ensure_under_roots(&target, &roots).is_err());
    }
}
