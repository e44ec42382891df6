//! Version-control source: trait plus the subprocess git realization

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::StratumError;
use crate::model::{FileStatus, LogEntry, PathStatus};

/// Gitlink entries carry this mode in raw diff records.
const SUBMODULE_MODE: &str = "160000";

/// Read access to a repository's first-parent history.
pub trait VcsSource {
    /// First-parent ancestor chain of `commit`, newest first.
    fn rev_list(&self, commit: &str) -> crate::Result<Vec<String>>;

    /// The newest `n` commits of `commit`'s first-parent history, oldest
    /// first, each with its per-file statuses. Rename and copy detection is
    /// disabled at the source.
    fn log_reverse(&self, commit: &str, n: usize) -> crate::Result<Vec<LogEntry>>;

    /// Raw contents of `path` as of `commit`.
    fn cat_file(&self, commit: &str, path: &str) -> crate::Result<Vec<u8>>;
}

/// Subprocess-git `VcsSource` rooted at a working directory
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the repository containing `dir` via `git rev-parse`.
    pub fn discover(dir: &Path) -> crate::Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(dir)
            .output()?;
        if !output.status.success() {
            return Err(StratumError::Git {
                command: "git rev-parse --show-toplevel".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self::open(PathBuf::from(root)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The commit HEAD points at.
    pub fn head(&self) -> crate::Result<String> {
        let out = self.run(&["rev-parse", "HEAD"])?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    fn run(&self, args: &[&str]) -> crate::Result<Vec<u8>> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()?;
        if !output.status.success() {
            return Err(StratumError::Git {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl VcsSource for GitRepo {
    fn rev_list(&self, commit: &str) -> crate::Result<Vec<String>> {
        let out = self.run(&["rev-list", "--first-parent", commit])?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    fn log_reverse(&self, commit: &str, n: usize) -> crate::Result<Vec<LogEntry>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let limit = format!("-{}", n);
        let out = self.run(&[
            "log",
            "--pretty=%H",
            "--raw",
            "-z",
            "-m",
            // --no-abbrev keeps record fields fixed-width and fast
            "--no-abbrev",
            "--no-renames",
            "--first-parent",
            "--reverse",
            "--ignore-submodules",
            &limit,
            commit,
        ])?;
        parse_log_reverse(&out)
    }

    fn cat_file(&self, commit: &str, path: &str) -> crate::Result<Vec<u8>> {
        self.run(&["cat-file", "blob", &format!("{}:{}", commit, path)])
    }
}

/// Parse `git log --pretty=%H --raw -z` output.
///
/// NUL-delimited token stream: a commit header (`%H`), then for each raw
/// record a metadata token (`:oldmode newmode oldsha newsha S`, the first one
/// carrying the `\n` that separates header from records) followed by a path
/// token. Commits without records are kept as entries with no paths.
fn parse_log_reverse(output: &[u8]) -> crate::Result<Vec<LogEntry>> {
    let text = String::from_utf8_lossy(output);
    let tokens: Vec<&str> = text.split('\0').collect();

    let mut entries = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let header = tokens[i].trim();
        if header.is_empty() {
            i += 1;
            continue;
        }
        if header.len() < 40 || !header.as_bytes()[..40].iter().all(u8::is_ascii_hexdigit) {
            return Err(malformed(format!("unexpected log header {:?}", header)));
        }
        let commit = header[..40].to_string();
        i += 1;

        let mut paths = Vec::new();
        while i < tokens.len() {
            let meta = tokens[i].strip_prefix('\n').unwrap_or(tokens[i]);
            if !meta.starts_with(':') {
                break;
            }
            let path = match tokens.get(i + 1) {
                Some(path) => (*path).to_string(),
                None => return Err(malformed(format!("truncated raw record {:?}", meta))),
            };
            i += 2;

            // :oldmode newmode oldsha newsha S
            let fields: Vec<&str> = meta.split_whitespace().collect();
            if fields.len() < 5 {
                return Err(malformed(format!("unexpected raw record {:?}", meta)));
            }
            let old_mode = &fields[0][1..];
            let new_mode = fields[1];

            let status = match fields[4].as_bytes()[0] {
                b'A' => FileStatus::Added,
                b'M' => FileStatus::Modified,
                b'D' => FileStatus::Deleted,
                b'T' => {
                    // Type changed. A submodule becoming a file is an add, a
                    // file becoming a submodule is a delete; other type
                    // changes keep the same contents and are ignored.
                    if old_mode == SUBMODULE_MODE && new_mode != SUBMODULE_MODE {
                        FileStatus::Added
                    } else if old_mode != SUBMODULE_MODE && new_mode == SUBMODULE_MODE {
                        FileStatus::Deleted
                    } else {
                        continue;
                    }
                }
                b'C' | b'R' => {
                    return Err(malformed(format!(
                        "unexpected status {:?} given --no-renames was specified",
                        fields[4]
                    )))
                }
                b'X' => return Err(malformed("status 'X' indicates a bug in git".to_string())),
                other => {
                    eprintln!(
                        "stratum: commit {} path {:?}: unrecognized diff status {:?}, skipping",
                        commit, path, other as char
                    );
                    continue;
                }
            };

            paths.push(PathStatus { path, status });
        }

        entries.push(LogEntry { commit, paths });
    }

    Ok(entries)
}

fn malformed(detail: String) -> StratumError {
    StratumError::Git {
        command: "git log".to_string(),
        stderr: detail,
    }
}
