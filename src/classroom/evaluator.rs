use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::models::TestCase;
use crate::config::EvaluatorConfig;
use crate::error::{HubError, Result};

/// What the evaluator receives on stdin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationRequest {
    pub code: String,
    pub tests: Vec<TestCase>,
}

/// What the sandbox prints on stdout
#[derive(Debug, Clone, Deserialize)]
struct SandboxResponse {
    stdout: String,
    success: bool,
    #[serde(default)]
    passed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub output: String,
    pub success: bool,
    pub passed: u32,
}

impl Verdict {
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            passed: 0,
        }
    }
}

impl From<SandboxResponse> for Verdict {
    fn from(response: SandboxResponse) -> Self {
        Self {
            output: response.stdout,
            success: response.success,
            passed: response.passed,
        }
    }
}

/// Judges a submission. Never fails: problems running the judge come back
/// as a failed verdict whose output explains what went wrong.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest) -> Verdict;
}

/// Runs an external sandbox process once per submission.
#[derive(Debug, Clone)]
pub struct SandboxEvaluator {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl SandboxEvaluator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &EvaluatorConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.timeout)
    }

    async fn run(&self, request: &EvaluationRequest) -> Result<Verdict> {
        let input = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => HubError::EvaluatorNotFound(self.program.clone()),
                _ => HubError::EvaluatorSpawn(e.to_string()),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| HubError::EvaluatorSpawn("stdin pipe was not captured".to_string()))?;

        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| HubError::EvaluatorSpawn(e.to_string()))?;

        match writer.await {
            Ok(Ok(())) => {}
            // The sandbox may legitimately exit before reading everything
            Ok(Err(e)) => tracing::debug!(error = %e, "Evaluator closed stdin early"),
            Err(e) => tracing::debug!(error = %e, "Evaluator stdin writer aborted"),
        }

        let combined = || {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            text
        };

        if !output.status.success() {
            return Err(HubError::EvaluatorExit(combined()));
        }

        let response: SandboxResponse =
            serde_json::from_slice(&output.stdout).map_err(|_| HubError::EvaluatorCrash(combined()))?;
        Ok(response.into())
    }
}

#[async_trait]
impl Evaluator for SandboxEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Verdict {
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.run(&request)).await {
                Ok(result) => result,
                Err(_) => Err(HubError::EvaluatorTimeout(limit.as_secs().max(1))),
            },
            None => self.run(&request).await,
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(program = %self.program, error = %e, "Evaluator failed");
            Verdict::failure(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            code: "def hello():\n    return 'Hello World'".to_string(),
            tests: vec![TestCase {
                code: "assert hello() == 'Hello World'".to_string(),
                ..Default::default()
            }],
        }
    }

    fn shell(script: &str, timeout: Option<Duration>) -> SandboxEvaluator {
        SandboxEvaluator::new("sh", vec!["-c".to_string(), script.to_string()], timeout)
    }

    #[test]
    fn test_request_wire_shape() {
        let value = serde_json::to_value(request()).unwrap();
        assert!(value["code"].as_str().unwrap().contains("def hello"));
        assert_eq!(value["tests"][0]["input"], "");
        assert_eq!(value["tests"][0]["expected"], "");
        assert_eq!(value["tests"][0]["code"], "assert hello() == 'Hello World'");
    }

    #[test]
    fn test_verdict_failure() {
        let verdict = Verdict::failure("boom");
        assert!(!verdict.success);
        assert_eq!(verdict.passed, 0);
        assert_eq!(verdict.output, "boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_verdict() {
        let evaluator = shell(
            r#"cat > /dev/null; echo '{"stdout":"[PASS] Test 1","success":true,"passed":1}'"#,
            Some(Duration::from_secs(5)),
        );
        let verdict = evaluator.evaluate(request()).await;
        assert_eq!(
            verdict,
            Verdict {
                output: "[PASS] Test 1".to_string(),
                success: true,
                passed: 1,
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_evaluator_reads_request_from_stdin() {
        // Succeeds only if the request JSON arrived on stdin
        let evaluator = shell(
            r#"if grep -q 'Hello World'; then echo '{"stdout":"seen","success":true,"passed":1}'; else echo '{"stdout":"missing","success":false,"passed":0}'; fi"#,
            Some(Duration::from_secs(5)),
        );
        let verdict = evaluator.evaluate(request()).await;
        assert!(verdict.success, "output was {}", verdict.output);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_json_output_is_a_crash() {
        let evaluator = shell(
            "cat > /dev/null; echo 'Traceback (most recent call last):'",
            Some(Duration::from_secs(5)),
        );
        let verdict = evaluator.evaluate(request()).await;
        assert!(!verdict.success);
        assert!(verdict.output.starts_with("Sandbox Crash:\n"));
        assert!(verdict.output.contains("Traceback"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_a_system_error() {
        let evaluator = shell("cat > /dev/null; echo 'oops' >&2; exit 3", None);
        let verdict = evaluator.evaluate(request()).await;
        assert!(!verdict.success);
        assert!(verdict.output.starts_with("Sandbox System Error:\n"));
        assert!(verdict.output.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_evaluator_times_out() {
        let evaluator = shell("sleep 5", Some(Duration::from_millis(200)));
        let started = std::time::Instant::now();
        let verdict = evaluator.evaluate(request()).await;
        assert!(!verdict.success);
        assert!(verdict.output.starts_with("Sandbox Timeout"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let evaluator = SandboxEvaluator::new("definitely-not-an-evaluator-binary", vec![], None);
        let verdict = evaluator.evaluate(request()).await;
        assert!(!verdict.success);
        assert_eq!(
            verdict.output,
            "Error: evaluator executable 'definitely-not-an-evaluator-binary' not found"
        );
    }
}
