//! Scenario execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn};

use callprobe_core::{CallResult, HarnessConfig, Result};
use callprobe_script::ScriptedConnector;
use callprobe_session::{Call, TranscriptRecorder};

use crate::scenario::Scenario;

/// Outcome of one scenario.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Call the scenario ran on
    pub call_id: String,
    /// Whether every step succeeded
    pub passed: bool,
    /// Number of steps that succeeded
    pub steps_completed: usize,
    /// Why the scenario failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Where the transcript was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Runs scenarios against scripted dialog sessions.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner {
    config: HarnessConfig,
}

impl ScenarioRunner {
    /// Create a runner with the given configuration.
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// The runner's configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run `scenario` on the calling thread.
    ///
    /// Blocks until the scenario finished or its first step failed.
    pub fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let span = info_span!("scenario", name = %scenario.name);
        let _enter = span.enter();

        let connector = match scenario.library() {
            Ok(library) => ScriptedConnector::new(library)
                .with_connection_info(self.config.server.connection_info()),
            Err(e) => {
                return ScenarioReport {
                    name: scenario.name.clone(),
                    call_id: String::new(),
                    passed: false,
                    steps_completed: 0,
                    failure: Some(e.to_string()),
                    transcript: None,
                };
            }
        };

        let mut settings = self.config.call.clone();
        if let Some(timeout_ms) = scenario.default_timeout_ms {
            settings.default_timeout_ms = timeout_ms;
        }

        let mut call = Call::with_settings(Arc::new(connector), settings);
        let recorder = self
            .config
            .recording
            .enabled
            .then(|| Arc::new(TranscriptRecorder::new()));
        if let Some(recorder) = &recorder {
            call.add_observer(recorder.clone());
        }

        let mut steps_completed = 0;
        let outcome = drive(&mut call, scenario, &mut steps_completed);
        call.hang_up();

        let transcript = recorder.and_then(|recorder| {
            match self.save_transcript(scenario, &call, &recorder) {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    warn!("Failed to save transcript: {}", e);
                    None
                }
            }
        });

        let failure = outcome.err().map(|failure| failure.cause().to_string());
        match &failure {
            None => info!("Scenario passed: {} steps", steps_completed),
            Some(reason) => error!(
                "Scenario failed after {} steps: {}",
                steps_completed, reason
            ),
        }

        ScenarioReport {
            name: scenario.name.clone(),
            call_id: call.id().to_string(),
            passed: failure.is_none(),
            steps_completed,
            failure,
            transcript,
        }
    }

    fn save_transcript(
        &self,
        scenario: &Scenario,
        call: &Call,
        recorder: &TranscriptRecorder,
    ) -> Result<PathBuf> {
        let directory = Path::new(self.config.recording.directory.as_deref().unwrap_or("."));
        std::fs::create_dir_all(directory)?;
        let path = directory.join(format!("{}-{}.jsonl", file_stem(&scenario.name), call.id()));
        recorder.save_to_file(&path)?;
        Ok(path)
    }

    /// Run `scenarios` concurrently, at most
    /// [`max_concurrent_calls`](callprobe_core::CallSettings::max_concurrent_calls)
    /// at a time.
    ///
    /// Each scenario runs on a blocking thread; reports come back in input
    /// order.
    pub async fn run_all(&self, scenarios: Vec<Scenario>) -> Vec<ScenarioReport> {
        let permits = Arc::new(Semaphore::new(self.config.call.max_concurrent_calls.max(1)));
        let mut handles = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            let permits = Arc::clone(&permits);
            let runner = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                let name = scenario.name.clone();
                match tokio::task::spawn_blocking(move || runner.run(&scenario)).await {
                    Ok(report) => report,
                    Err(e) => aborted(name, e.to_string()),
                }
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => reports.push(aborted("<unknown>".to_string(), e.to_string())),
            }
        }
        reports
    }
}

fn drive(call: &mut Call, scenario: &Scenario, steps_completed: &mut usize) -> CallResult<()> {
    call.place_call(&scenario.call)?;
    for step in &scenario.steps {
        step.execute(call)?;
        *steps_completed += 1;
    }
    Ok(())
}

fn aborted(name: String, reason: String) -> ScenarioReport {
    ScenarioReport {
        name,
        call_id: String::new(),
        passed: false,
        steps_completed: 0,
        failure: Some(format!("scenario aborted: {reason}")),
        transcript: None,
    }
}

/// File-name-safe version of a scenario name.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use callprobe_core::CallId;
    use callprobe_session::EventKind;

    const HELLO: &str = r#"
name: hello
call: "file:hello.vxml"
default_timeout_ms: 4000
dialogs:
  "file:hello.vxml":
    start: main
    forms:
      main:
        prompts: ["Hello World!", "Goodbye!"]
steps:
  - action: hears
    text: "Hello World!"
  - action: hears
    text: "Goodbye!"
  - action: expect_disconnect
"#;

    fn scenario(yaml: &str) -> Scenario {
        Scenario::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_passing_scenario() {
        let report = ScenarioRunner::default().run(&scenario(HELLO));
        assert!(report.passed, "{:?}", report.failure);
        assert_eq!(report.steps_completed, 3);
        assert!(report.transcript.is_none());
    }

    #[test]
    fn test_failing_step_stops_scenario() {
        let yaml = HELLO.replace("text: \"Goodbye!\"", "text: \"See you!\"");
        let report = ScenarioRunner::default().run(&scenario(&yaml));
        assert!(!report.passed);
        assert_eq!(report.steps_completed, 1);
        assert_eq!(
            report.failure.as_deref(),
            Some("Expected to hear 'See you!' but heard 'Goodbye!'")
        );
    }

    #[test]
    fn test_unknown_document_fails_call() {
        let yaml = HELLO.replace("call: \"file:hello.vxml\"", "call: \"file:missing.vxml\"");
        let report = ScenarioRunner::default().run(&scenario(&yaml));
        assert!(!report.passed);
        assert_eq!(report.steps_completed, 0);
        assert!(report
            .failure
            .unwrap()
            .contains("document not found: file:missing.vxml"));
    }

    #[test]
    fn test_recording_writes_transcript() {
        let directory = std::env::temp_dir().join(format!("callprobe-test-{}", CallId::new()));
        let mut config = HarnessConfig::default();
        config.recording.enabled = true;
        config.recording.directory = Some(directory.display().to_string());

        let report = ScenarioRunner::new(config).run(&scenario(HELLO));
        assert!(report.passed);

        let path = report.transcript.expect("transcript path");
        let transcript = TranscriptRecorder::load_from_file(&path).unwrap();
        let kinds: Vec<EventKind> = transcript.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds.first(), Some(&EventKind::Call));
        assert_eq!(kinds.last(), Some(&EventKind::Hangup));
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::Heard).count(),
            2
        );

        std::fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("dtmf reprompt/1"), "dtmf_reprompt_1");
        assert_eq!(file_stem("hello-world_2"), "hello-world_2");
    }

    #[tokio::test]
    async fn test_run_all_keeps_order() {
        let mut config = HarnessConfig::default();
        config.call.max_concurrent_calls = 2;
        let runner = ScenarioRunner::new(config);

        let mut scenarios = Vec::new();
        for i in 0..4 {
            let mut s = scenario(HELLO);
            s.name = format!("hello-{i}");
            scenarios.push(s);
        }

        let reports = runner.run_all(scenarios).await;
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["hello-0", "hello-1", "hello-2", "hello-3"]);
        assert!(reports.iter().all(|r| r.passed));
    }
}
