//! Canonical locations inside a project's `.workgraph/` directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

pub const WORKGRAPH_DIR: &str = ".workgraph";

/// All paths therapydrift reads or writes for one workgraph.
#[derive(Debug, Clone)]
pub struct WorkgraphPaths {
    pub project_dir: PathBuf,
    pub wg_dir: PathBuf,
    pub graph_path: PathBuf,
    pub state_dir: PathBuf,
    pub state_path: PathBuf,
    pub last_report_path: PathBuf,
}

impl WorkgraphPaths {
    pub fn new(wg_dir: impl Into<PathBuf>) -> Self {
        let wg_dir = wg_dir.into();
        let project_dir = wg_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| wg_dir.clone());
        let state_dir = wg_dir.join(".therapydrift");
        Self {
            project_dir,
            graph_path: wg_dir.join("graph.jsonl"),
            state_path: state_dir.join("state.json"),
            last_report_path: state_dir.join("last.json"),
            state_dir,
            wg_dir,
        }
    }
}

/// Locate the `.workgraph` directory for `start` (or the current directory).
///
/// `start` may be the `.workgraph` directory itself or any directory below the
/// project root; ancestors are searched upward.
pub fn find_workgraph_dir(start: Option<&Path>) -> Result<PathBuf> {
    let start = match start {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("read current directory")?,
    };
    if start.file_name().is_some_and(|name| name == WORKGRAPH_DIR) && start.is_dir() {
        return Ok(start);
    }
    start
        .ancestors()
        .map(|dir| dir.join(WORKGRAPH_DIR))
        .find(|candidate| candidate.is_dir())
        .ok_or_else(|| anyhow!("no {WORKGRAPH_DIR} directory found from {}", start.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_workgraph_in_ancestor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let wg = temp.path().join(WORKGRAPH_DIR);
        let nested = temp.path().join("src").join("deep");
        fs::create_dir_all(&wg).expect("wg dir");
        fs::create_dir_all(&nested).expect("nested");

        assert_eq!(find_workgraph_dir(Some(&nested)).expect("found"), wg);
        assert_eq!(find_workgraph_dir(Some(&wg)).expect("found"), wg);
    }

    #[test]
    fn paths_hang_off_the_workgraph_dir() {
        let paths = WorkgraphPaths::new("/p/.workgraph");
        assert_eq!(paths.project_dir, PathBuf::from("/p"));
        assert_eq!(
            paths.state_path,
            PathBuf::from("/p/.workgraph/.therapydrift/state.json")
        );
        assert_eq!(paths.graph_path, PathBuf::from("/p/.workgraph/graph.jsonl"));
    }
}
