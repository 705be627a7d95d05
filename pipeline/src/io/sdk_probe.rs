//! Discovery of the installed SDK versions the research tracks audit against.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::core::artifacts::TrackState;
use crate::io::process::run_with_timeout;

/// Location of the TypeScript SDK install, relative to the agent directory.
pub const TS_PACKAGE_DIR: &str = "node_modules/@anthropic-ai/claude-agent-sdk";
pub const PY_DISTRIBUTION: &str = "claude-agent-sdk";
pub const PY_MODULE: &str = "claude_agent_sdk";
pub const UNKNOWN: &str = "unknown";

const PROBE_OUTPUT_LIMIT: usize = 4096;

/// What the research instruction is told about the installed SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkProbe {
    pub version: String,
    /// Where the SDK sources can be read (type definitions or package dir).
    pub source_path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct PackageJson {
    version: String,
}

/// Version from the installed npm package's `package.json`.
pub fn probe_typescript(agent_dir: &Path) -> SdkProbe {
    let package_dir = agent_dir.join(TS_PACKAGE_DIR);
    let manifest = package_dir.join("package.json");
    let version = fs::read_to_string(&manifest)
        .ok()
        .and_then(|raw| serde_json::from_str::<PackageJson>(&raw).ok())
        .map(|pkg| pkg.version)
        .unwrap_or_else(|| {
            debug!(path = %manifest.display(), "typescript sdk manifest unreadable");
            UNKNOWN.to_string()
        });
    SdkProbe {
        version,
        source_path: Some(package_dir.join("sdk.d.ts")),
    }
}

/// Ask the interpreter for the installed distribution.
///
/// Falls back to the version recorded in the track's registry, then to
/// `unknown`. Each query is bounded by `timeout`.
pub fn probe_python(python: &str, timeout: Duration, track: Option<&TrackState>) -> SdkProbe {
    let recorded = track
        .and_then(|t| t.registry.as_ref())
        .and_then(|r| r.version.clone());
    let version = python_query(
        python,
        &format!("import importlib.metadata; print(importlib.metadata.version('{PY_DISTRIBUTION}'))"),
        timeout,
    )
    .or(recorded)
    .unwrap_or_else(|| UNKNOWN.to_string());
    let source_path = python_query(
        python,
        &format!("import {PY_MODULE}, os; print(os.path.dirname({PY_MODULE}.__file__))"),
        timeout,
    )
    .map(PathBuf::from);
    SdkProbe {
        version,
        source_path,
    }
}

fn python_query(python: &str, script: &str, timeout: Duration) -> Option<String> {
    let mut cmd = Command::new(python);
    cmd.arg("-c").arg(script);
    match run_with_timeout(cmd, timeout, PROBE_OUTPUT_LIMIT) {
        Ok(output) if output.succeeded() => {
            Some(output.stdout_text()).filter(|s| !s.is_empty())
        }
        Ok(output) => {
            debug!(exit_code = ?output.status.code(), timed_out = output.timed_out, "python probe failed");
            None
        }
        Err(err) => {
            debug!(err = %err, "python probe could not run");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifacts::Registry;

    #[test]
    fn typescript_reads_package_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join(TS_PACKAGE_DIR);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("package.json"), r#"{"name":"x","version":"0.2.7"}"#).expect("write");
        let probe = probe_typescript(temp.path());
        assert_eq!(probe.version, "0.2.7");
        assert_eq!(probe.source_path, Some(dir.join("sdk.d.ts")));
    }

    #[test]
    fn typescript_without_install_is_unknown() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(probe_typescript(temp.path()).version, UNKNOWN);
    }

    #[test]
    fn python_falls_back_to_registry_then_unknown() {
        let track = TrackState {
            registry: Some(Registry {
                version: Some("0.1.4".to_string()),
            }),
            ..TrackState::default()
        };
        let missing = "definitely-not-a-python-xyz";
        let probe = probe_python(missing, Duration::from_secs(1), Some(&track));
        assert_eq!(probe.version, "0.1.4");
        assert_eq!(probe.source_path, None);
        assert_eq!(
            probe_python(missing, Duration::from_secs(1), None).version,
            UNKNOWN
        );
    }
}
