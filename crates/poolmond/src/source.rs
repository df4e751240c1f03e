//! Record sources for the daemon.
//!
//! Two [`RecordSource`] implementations: [`CommandSource`] shells out to an
//! external pool query tool and parses its JSON output, [`FileSource`] reads
//! canned record files for local development. Both report transport problems
//! as [`QueryError::TargetUnreachable`] and leave retries to the client.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use poolmon_core::AttrRecord;
use poolmon_query::{QueryError, RecordSource, Result, Target};

use crate::error::DaemonError;

/// Runs a configured command per target, substituting `{address}` and
/// `{name}` placeholders, and parses stdout as a JSON array of records.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
}

impl CommandSource {
    /// Builds a source from a non-empty argv.
    ///
    /// # Errors
    ///
    /// Returns a config error for an empty argv.
    pub fn new(argv: &[String]) -> crate::error::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| DaemonError::Config("query command cannot be empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl RecordSource for CommandSource {
    fn fetch(&self, target: &Target) -> Result<Vec<AttrRecord>> {
        let unreachable = |reason: String| QueryError::TargetUnreachable {
            target: target.name.clone(),
            reason,
        };

        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{address}", &target.address)
                    .replace("{name}", &target.name)
            })
            .collect();
        debug!(program = %self.program, ?args, "running query command");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| unreachable(format!("failed to run '{}': {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unreachable(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_records(&output.stdout, unreachable)
    }
}

/// Reads `<root>/<target name>.json` files produced by a previous capture.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    /// Builds a source rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl RecordSource for FileSource {
    fn fetch(&self, target: &Target) -> Result<Vec<AttrRecord>> {
        let unreachable = |reason: String| QueryError::TargetUnreachable {
            target: target.name.clone(),
            reason,
        };

        let path = self.root.join(format!("{}.json", target.name));
        debug!(path = %path.display(), "reading record file");
        let content = std::fs::read(&path)
            .map_err(|e| unreachable(format!("cannot read '{}': {e}", path.display())))?;

        parse_records(&content, unreachable)
    }
}

/// Either concrete source, selected from configuration per probe.
#[derive(Debug, Clone)]
pub enum DaemonSource {
    /// External query command.
    Command(CommandSource),
    /// Canned record files.
    Files(FileSource),
}

impl RecordSource for DaemonSource {
    fn fetch(&self, target: &Target) -> Result<Vec<AttrRecord>> {
        match self {
            Self::Command(source) => source.fetch(target),
            Self::Files(source) => source.fetch(target),
        }
    }
}

/// Some query tools print nothing at all for an empty result set.
fn parse_records(
    payload: &[u8],
    unreachable: impl Fn(String) -> QueryError,
) -> Result<Vec<AttrRecord>> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(payload).map_err(|e| unreachable(format!("bad records payload: {e}")))
}
