use nix::unistd::Pid;
use std::path::{Path, PathBuf};

/// Identifies the traced process a translation is performed on behalf of,
/// and optionally the runner-injection trigger path that gates delayed
/// translation for that process.
#[derive(Debug, Clone)]
pub struct ChildId {
    pub pid: Pid,
    pub trigger: Option<PathBuf>,
}

impl ChildId {
    pub fn new(pid: Pid) -> Self {
        ChildId { pid, trigger: None }
    }

    pub fn with_trigger(pid: Pid, trigger: PathBuf) -> Self {
        ChildId {
            pid,
            trigger: Some(trigger),
        }
    }
}

/// Whether `fake_path` should bypass translation because the runner's
/// loader hasn't reached its trigger path yet.
///
/// Returns `false` (translate normally) when there is no trigger set.
/// While a trigger is set, every path other than the trigger itself is
/// passed through untranslated; the first path that matches the trigger
/// clears it and is itself translated normally from then on.
pub fn is_delayed(child: &mut ChildId, fake_path: &Path) -> bool {
    match &child.trigger {
        None => false,
        Some(trigger) if trigger != fake_path => true,
        Some(_) => {
            child.trigger = None;
            false
        }
    }
}
