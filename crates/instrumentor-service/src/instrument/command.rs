use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::Instrumenter;
use crate::caching::{LoadError, LoadResult};

/// The placeholder in the arguments that is replaced by the script name.
const SCRIPT_NAME_PLACEHOLDER: &str = "{name}";

/// Instruments sources by piping them through an external program.
///
/// The source is written to the program's stdin and its stdout is taken as the instrumented
/// source. Every occurrence of `{name}` in the arguments is replaced by the script name.
#[derive(Debug, Clone)]
pub struct CommandInstrumenter {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandInstrumenter {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    async fn run(&self, source: String, script_name: &str) -> LoadResult<String> {
        let args = self
            .args
            .iter()
            .map(|arg| arg.replace(SCRIPT_NAME_PLACEHOLDER, script_name));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(LoadError::from_std_error)?;

        let mut stdin = child.stdin.take().ok_or(LoadError::InternalError)?;
        let write_source = async move {
            let result = stdin.write_all(source.as_bytes()).await;
            // closes stdin, so the program sees the end of its input
            drop(stdin);
            result
        };

        let (written, output) = tokio::join!(write_source, child.wait_with_output());
        let output = output.map_err(LoadError::from_std_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(status = %output.status, "Instrumenter exited unsuccessfully");
            return Err(LoadError::Malformed(stderr.trim().to_owned()));
        }

        match written {
            Ok(()) => {}
            // The program is free to stop reading once it has what it needs.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(LoadError::from_std_error(e)),
        }

        String::from_utf8(output.stdout)
            .map_err(|_| LoadError::Malformed("instrumenter output is not valid UTF-8".into()))
    }
}

impl Instrumenter for CommandInstrumenter {
    fn instrument<'a>(
        &'a self,
        source: String,
        script_name: &'a str,
    ) -> BoxFuture<'a, LoadResult<String>> {
        let timeout = self.timeout;
        let future = tokio::time::timeout(timeout, self.run(source, script_name));
        Box::pin(async move { future.await.map_err(|_| LoadError::Timeout(timeout))? })
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
