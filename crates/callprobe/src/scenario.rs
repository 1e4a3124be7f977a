//! Scenario files: a call, the dialogs it may reach, and the steps a test
//! driver performs.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use callprobe_core::{CallFailure, CallResult, Error, Result, SessionFault};
use callprobe_script::{DialogLibrary, DialogScript};
use callprobe_session::Call;

/// A scripted test call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    /// Scenario name, used in reports and transcript file names
    pub name: String,

    /// URI of the dialog to call
    pub call: String,

    /// Dialog documents by URI
    #[serde(default)]
    pub dialogs: BTreeMap<String, DialogScript>,

    /// Timeout for steps without their own, in milliseconds (0 waits forever)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,

    /// Steps performed after the call is placed
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One driver action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Expect the next utterance to say exactly `text`
    Hears {
        /// Expected spoken text
        text: String,
        /// Step timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Expect the next utterance to match a regular expression
    HearsMatching {
        /// Regular expression
        pattern: String,
        /// Step timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Expect the next utterance to play audio whose source ends with `src`
    HearsAudio {
        /// Expected audio source suffix
        src: String,
        /// Step timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Speak once the dialog listens
    Say {
        /// Spoken input
        text: String,
        /// Step timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Key DTMF digits once the dialog listens
    Enter {
        /// Keys, e.g. `"12#"`
        digits: String,
        /// Step timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Wait until the dialog listens
    WaitForInput {
        /// Step timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Expect the dialog to disconnect without saying anything else
    ExpectDisconnect {
        /// Step timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Hang up
    Hangup,
}

impl Step {
    /// Perform the step on `call`.
    pub fn execute(&self, call: &mut Call) -> CallResult<()> {
        match self {
            Step::Hears { text, timeout_ms } => {
                call.expect_to_hear(text, millis(*timeout_ms))?;
            }
            Step::HearsMatching {
                pattern,
                timeout_ms,
            } => {
                call.expect_to_hear_matching(pattern, millis(*timeout_ms))?;
            }
            Step::HearsAudio { src, timeout_ms } => {
                let utterance = call.expect_next_utterance(millis(*timeout_ms))?;
                if !utterance
                    .audio_sources()
                    .iter()
                    .any(|source| source.ends_with(src.as_str()))
                {
                    return Err(CallFailure::new(Error::UnexpectedUtterance {
                        expected: format!("<audio src=\"...{src}\"/>"),
                        actual: utterance.to_string(),
                    }));
                }
            }
            Step::Say { text, timeout_ms } => {
                call.say(text, millis(*timeout_ms))?;
            }
            Step::Enter { digits, timeout_ms } => {
                call.enter_digits(digits, millis(*timeout_ms))?;
            }
            Step::WaitForInput { timeout_ms } => {
                call.wait_until_expecting_input(millis(*timeout_ms))?;
            }
            Step::ExpectDisconnect { timeout_ms } => {
                match call.expect_next_utterance(millis(*timeout_ms)) {
                    Ok(utterance) => {
                        return Err(CallFailure::new(Error::UnexpectedUtterance {
                            expected: "<disconnect>".to_string(),
                            actual: utterance.to_string(),
                        }));
                    }
                    Err(failure)
                        if failure.session_fault() == Some(&SessionFault::Disconnected) => {}
                    Err(failure) => return Err(failure),
                }
            }
            Step::Hangup => call.hang_up(),
        }
        Ok(())
    }

    /// Short name for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Step::Hears { .. } => "hears",
            Step::HearsMatching { .. } => "hears_matching",
            Step::HearsAudio { .. } => "hears_audio",
            Step::Say { .. } => "say",
            Step::Enter { .. } => "enter",
            Step::WaitForInput { .. } => "wait_for_input",
            Step::ExpectDisconnect { .. } => "expect_disconnect",
            Step::Hangup => "hangup",
        }
    }
}

fn millis(timeout_ms: Option<u64>) -> Option<Duration> {
    timeout_ms.map(Duration::from_millis)
}

impl Scenario {
    /// Parse and validate a scenario from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Scenario =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load a scenario from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Validate the scenario and its dialogs.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("scenario name cannot be empty".to_string()));
        }
        if self.call.trim().is_empty() {
            return Err(Error::Config(format!(
                "scenario '{}' has no call URI",
                self.name
            )));
        }
        for (uri, script) in &self.dialogs {
            script
                .validate()
                .map_err(|e| Error::Config(format!("dialog '{uri}': {e}")))?;
        }
        Ok(())
    }

    /// The scenario's dialogs as a library.
    pub fn library(&self) -> Result<DialogLibrary> {
        DialogLibrary::from_scripts(
            self.dialogs
                .iter()
                .map(|(uri, script)| (uri.clone(), script.clone())),
        )
    }
}
