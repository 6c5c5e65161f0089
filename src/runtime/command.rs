//! External command loader
//!
//! Spawns the configured command once per load or unload, writes a
//! [`LoadRequest`] line to its stdin and reads a [`LoadResponse`] line from its
//! stdout.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::domain::{Loader, NamespaceNode, Operation};

use super::protocol::{LoadRequest, LoadResponse};

/// Loader that delegates to an external process
#[derive(Debug, Clone)]
pub struct CommandLoader {
    command: Vec<String>,
    root: PathBuf,
}

impl CommandLoader {
    /// Creates a loader; source paths in requests are resolved against `root`
    pub fn new(command: Vec<String>, root: impl Into<PathBuf>) -> Result<Self> {
        if command.is_empty() {
            anyhow::bail!("No loader configured. Set [loader] command in .nstools/config.toml");
        }
        Ok(Self {
            command,
            root: root.into(),
        })
    }

    fn request(&self, operation: Operation, node: &NamespaceNode) -> LoadRequest {
        LoadRequest {
            operation,
            namespace: node.name.clone(),
            path: self.root.join(&node.path),
            requires: node.requires.iter().cloned().collect(),
        }
    }

    /// Runs the command for one request
    pub fn execute(&self, request: &LoadRequest) -> Result<LoadResponse> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("Loader command is empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn loader: {}", program))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow::anyhow!("Failed to open loader stdin"))?;
            let request_json = serde_json::to_string(request).context("Failed to serialize request")?;
            writeln!(stdin, "{}", request_json).context("Failed to write to loader")?;
        }

        let output = child.wait_with_output().context("Failed to wait for loader")?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let Some(line) = stdout.lines().find(|l| !l.trim().is_empty()) else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "No response from loader ({}): {}",
                output.status,
                stderr.trim()
            );
        };

        let response: LoadResponse = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse loader response: {}", line))?;

        tracing::debug!(
            namespace = %request.namespace,
            operation = %request.operation,
            success = response.success,
            "loader responded"
        );

        Ok(response)
    }

    fn run(&self, operation: Operation, node: &NamespaceNode) -> Result<()> {
        let response = self.execute(&self.request(operation, node))?;
        if response.success {
            Ok(())
        } else {
            anyhow::bail!(
                "{}",
                response.error.unwrap_or_else(|| "loader reported failure".to_string())
            )
        }
    }
}

impl Loader for CommandLoader {
    fn load(&mut self, node: &NamespaceNode) -> Result<()> {
        self.run(Operation::Load, node)
    }

    fn unload(&mut self, node: &NamespaceNode) -> Result<()> {
        self.run(Operation::Unload, node)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::{NamespaceName, NsDecl, Fingerprint, SourceUnit};
    use tempfile::TempDir;

    fn node(name: &str) -> NamespaceNode {
        let unit = SourceUnit::new(
            format!("src/{}.clj", name),
            NsDecl::new(NamespaceName::new(name).unwrap(), []),
            Fingerprint::new("x"),
        );
        NamespaceNode::from_unit(&unit)
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn empty_command_rejected() {
        assert!(CommandLoader::new(vec![], "/").is_err());
    }

    #[test]
    fn successful_response() {
        let dir = TempDir::new().unwrap();
        let mut loader =
            CommandLoader::new(sh("cat > /dev/null; echo '{\"success\":true}'"), dir.path()).unwrap();
        assert!(loader.load(&node("a")).is_ok());
        assert!(loader.unload(&node("a")).is_ok());
    }

    #[test]
    fn failure_carries_loader_message() {
        let dir = TempDir::new().unwrap();
        let mut loader = CommandLoader::new(
            sh("cat > /dev/null; echo '{\"success\":false,\"error\":\"Syntax error\"}'"),
            dir.path(),
        )
        .unwrap();
        let err = loader.load(&node("a")).unwrap_err();
        assert_eq!(err.to_string(), "Syntax error");
    }

    #[test]
    fn request_is_written_to_stdin() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("requests.log");
        let script = format!(
            "cat >> {}; echo '{{\"success\":true}}'",
            log.display()
        );
        let mut loader = CommandLoader::new(sh(&script), dir.path()).unwrap();
        loader.load(&node("my.core")).unwrap();

        let logged = std::fs::read_to_string(&log).unwrap();
        let request: serde_json::Value = serde_json::from_str(logged.trim()).unwrap();
        assert_eq!(request["operation"], "load");
        assert_eq!(request["namespace"], "my.core");
        assert!(request["path"].as_str().unwrap().ends_with("src/my.core.clj"));
    }

    #[test]
    fn silent_loader_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut loader = CommandLoader::new(sh("cat > /dev/null; echo oops >&2; exit 3"), dir.path()).unwrap();
        let err = loader.load(&node("a")).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("No response from loader"));
        assert!(message.contains("oops"));
    }

    #[test]
    fn missing_program_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut loader =
            CommandLoader::new(vec!["nstools-no-such-loader".to_string()], dir.path()).unwrap();
        assert!(loader.load(&node("a")).is_err());
    }
}
