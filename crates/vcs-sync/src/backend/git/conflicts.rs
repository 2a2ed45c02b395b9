use std::collections::HashSet;
use std::path::Path;

use utils::shell::command_exists;

use super::porcelain::{parse_path_list, parse_status_z, union_merge_lines};
use super::GitRepository;
use crate::error::VcsError;
use crate::traits::VcsConflicts;
use crate::types::ConflictStrategy;

const ATTRIBUTES_FILE: &str = ".gitattributes";

#[derive(Debug, Clone, Copy)]
enum ToolKind {
    Merge,
    Diff,
}

fn is_attributes_file(path: &str) -> bool {
    Path::new(path).file_name().is_some_and(|name| name == ATTRIBUTES_FILE)
}

impl GitRepository {
    /// Paths with unmerged index entries
    fn unmerged_paths(&self) -> Result<Vec<String>, VcsError> {
        let out = self.git(["diff", "--name-only", "--diff-filter=U", "-z"])?;
        Ok(parse_path_list(&out))
    }

    /// Unmerged paths where `strategy` picks a side that has no version,
    /// i.e. that side deleted the file
    fn paths_without_side(&self, strategy: ConflictStrategy) -> Result<HashSet<String>, VcsError> {
        let mut index = self.repo.index().map_err(VcsError::backend)?;
        index.read(true).map_err(VcsError::backend)?;

        let mut missing = HashSet::new();
        for conflict in index.conflicts().map_err(VcsError::backend)? {
            let conflict = conflict.map_err(VcsError::backend)?;
            let chosen = match strategy {
                ConflictStrategy::TakeOurs => &conflict.our,
                ConflictStrategy::TakeTheirs => &conflict.their,
            };
            if chosen.is_some() {
                continue;
            }
            let entry = conflict
                .ancestor
                .as_ref()
                .or(conflict.our.as_ref())
                .or(conflict.their.as_ref());
            if let Some(entry) = entry {
                missing.insert(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        Ok(missing)
    }

    /// Keep the lines of both sides of a conflicted `.gitattributes` and stage it
    fn union_attributes(&self, path: &str) -> Result<(), VcsError> {
        let file = self.path.join(path);
        let merged = union_merge_lines(&std::fs::read_to_string(&file)?);
        std::fs::write(&file, merged)?;
        self.git(["add", "--", path])?;
        tracing::debug!(path, "merged attribute lines of both sides");
        Ok(())
    }

    /// Resolve the tool name, registering VS Code when asked for
    fn configure_tool(&self, tool: Option<&str>, kind: ToolKind) -> Result<String, VcsError> {
        let tool = tool.ok_or(VcsError::NoToolConfigured)?;
        if tool != "vscode" && tool != "code" {
            return Ok(tool.to_string());
        }
        if !command_exists("code") {
            return Err(VcsError::ToolNotFound("code".into()));
        }

        match kind {
            ToolKind::Merge => {
                self.git(["config", "merge.tool", "vscode"])?;
                self.git(["config", "mergetool.vscode.cmd", "code -n --wait $MERGED"])?;
                self.git(["config", "mergetool.writeToTemp", "true"])?;
            }
            ToolKind::Diff => {
                self.git(["config", "diff.tool", "vscode"])?;
                self.git([
                    "config",
                    "difftool.vscode.cmd",
                    "code -n --wait --diff $LOCAL $REMOTE",
                ])?;
            }
        }
        Ok("vscode".to_string())
    }
}

fn tool_args<'a>(base: &[&'a str], tool: &'a str, paths: Option<&'a [String]>) -> Vec<&'a str> {
    let mut args = base.to_vec();
    args.push("--no-prompt");
    args.push(tool);
    if let Some(paths) = paths {
        args.push("--");
        args.extend(paths.iter().map(String::as_str));
    }
    args
}

impl VcsConflicts for GitRepository {
    fn get_conflicts(&self) -> Result<Vec<String>, VcsError> {
        let out = self.git(["--no-optional-locks", "status", "--porcelain", "-z", "-uno"])?;
        Ok(parse_status_z(&out)
            .into_iter()
            .filter(|entry| entry.is_conflicted())
            .map(|entry| entry.path)
            .collect())
    }

    fn has_conflicts(&self) -> Result<bool, VcsError> {
        Ok(!self.unmerged_paths()?.is_empty())
    }

    fn resolve(
        &self,
        paths: Option<&[String]>,
        strategy: ConflictStrategy,
    ) -> Result<(), VcsError> {
        let unmerged = self.unmerged_paths()?;
        let targets = paths.map(<[String]>::to_vec).unwrap_or_else(|| unmerged.clone());

        let deleted = self.paths_without_side(strategy)?;

        let mut removals = Vec::new();
        let mut checkouts = Vec::with_capacity(targets.len());
        for path in targets {
            if is_attributes_file(&path) && unmerged.contains(&path) {
                self.union_attributes(&path)?;
            } else if deleted.contains(&path) {
                removals.push(path);
            } else {
                checkouts.push(path);
            }
        }

        if !removals.is_empty() {
            self.git_with_paths(&["rm", "-f", "--quiet"], &removals, "resolve_spec")?;
        }
        if !checkouts.is_empty() {
            self.git_with_paths(&["checkout", strategy.checkout_flag()], &checkouts, "resolve_spec")?;
            self.git_with_paths(&["add"], &checkouts, "resolve_spec")?;
        }
        tracing::info!(
            removed = removals.len(),
            taken = checkouts.len(),
            ?strategy,
            "resolved conflicts"
        );
        Ok(())
    }

    fn launch_external_merge(
        &self,
        tool: Option<&str>,
        paths: Option<&[String]>,
    ) -> Result<(), VcsError> {
        let tool = format!("--tool={}", self.configure_tool(tool, ToolKind::Merge)?);
        self.git(tool_args(
            &["-c", "mergetool.keepBackup=false", "mergetool"],
            &tool,
            paths,
        ))?;
        Ok(())
    }

    fn launch_external_diff(
        &self,
        tool: Option<&str>,
        paths: Option<&[String]>,
    ) -> Result<(), VcsError> {
        let tool = format!("--tool={}", self.configure_tool(tool, ToolKind::Diff)?);
        self.git(tool_args(&["difftool"], &tool, paths))?;
        self.git(tool_args(&["difftool", "--cached"], &tool, paths))?;
        Ok(())
    }
}
