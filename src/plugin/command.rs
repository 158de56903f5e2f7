use async_trait::async_trait;
use std::{io, path::PathBuf, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command};

use super::{AssetFile, Transform};
use crate::error::ForgeError;

/// Environment variable pointing compilers at their dependency scratch directory.
pub const DEPENDENCIES_ENV: &str = "FORGE_DEPENDENCIES_DIR";
/// Environment variable carrying the logical path of the file being transformed.
pub const ASSET_PATH_ENV: &str = "FORGE_ASSET_PATH";

/// Pipes a file through an external program.
///
/// The file contents are written to the program's stdin and its stdout becomes the new contents.
/// Bound arguments are passed on the command line. A non-zero exit status fails the step with the
/// program's stderr as the message.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    program: String,
    working_dir: Option<PathBuf>,
    dependencies_dir: Option<PathBuf>,
}

impl CommandTransform {
    pub fn new(program: impl Into<String>) -> Self {
        CommandTransform {
            program: program.into(),
            working_dir: None,
            dependencies_dir: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn dependencies_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dependencies_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Transform for CommandTransform {
    fn name(&self) -> &str {
        &self.program
    }

    async fn transform(
        &self,
        mut file: AssetFile,
        args: &[String],
    ) -> Result<AssetFile, ForgeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .env(ASSET_PATH_ENV, &file.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(dir) = &self.dependencies_dir {
            cmd.env(DEPENDENCIES_ENV, dir);
        }

        tracing::debug!("[{}] transforming {:?}", self.program, file.path);
        let mut child = cmd
            .spawn()
            .map_err(|e| ForgeError::transform(self.name(), format!("failed to spawn: {e}")))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ForgeError::transform(self.name(), "stdin was not captured"))?;

        let input = std::mem::take(&mut file.contents);
        let write = async move {
            let res = stdin.write_all(&input).await;
            drop(stdin);
            res
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output =
            output.map_err(|e| ForgeError::transform(self.name(), format!("failed to run: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ForgeError::transform(
                self.name(),
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        match written {
            // The program may legitimately finish without draining stdin.
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                return Err(ForgeError::transform(
                    self.name(),
                    format!("failed to write stdin: {e}"),
                ));
            }
            _ => {}
        }

        file.contents = output.stdout;
        Ok(file)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use test_log::test;

    #[test(tokio::test)]
    async fn test_command_pipes_stdin_to_stdout() {
        let plugin = CommandTransform::new("cat");
        let out = plugin
            .transform(AssetFile::new("a.css", "body {}"), &[])
            .await
            .unwrap();
        assert_eq!(out.text(), "body {}");
        assert_eq!(out.path, PathBuf::from("a.css"));
    }

    #[test(tokio::test)]
    async fn test_command_receives_bound_args() {
        let plugin = CommandTransform::new("tr");
        let out = plugin
            .transform(
                AssetFile::new("a.txt", "abc"),
                &["a-z".to_string(), "A-Z".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(out.text(), "ABC");
    }

    #[test(tokio::test)]
    async fn test_command_failure_names_program() {
        let plugin = CommandTransform::new("sh");
        let err = plugin
            .transform(
                AssetFile::new("a.js", ""),
                &["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            )
            .await
            .unwrap_err();
        assert_eq!(err.plugin(), Some("sh"));
        let ForgeError::TransformFailed { message, .. } = err else {
            panic!("expected a transform failure");
        };
        assert!(message.contains("boom"), "{message}");
    }

    #[test(tokio::test)]
    async fn test_missing_program_is_transform_failure() {
        let plugin = CommandTransform::new("definitely-not-a-real-compiler-binary");
        let err = plugin
            .transform(AssetFile::new("a.js", ""), &[])
            .await
            .unwrap_err();
        assert_eq!(err.plugin(), Some("definitely-not-a-real-compiler-binary"));
    }
}
