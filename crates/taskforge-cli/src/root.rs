use std::path::{Path, PathBuf};
use taskforge_core::paths;

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `TASKFORGE_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.taskforge/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_root_from(explicit, &cwd)
}

fn resolve_root_from(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    find_upward(cwd, paths::TASKFORGE_DIR)
        .or_else(|| find_upward(cwd, ".git"))
        .unwrap_or_else(|| cwd.to_path_buf())
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}
