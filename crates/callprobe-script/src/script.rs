//! Dialog scripts: a small form-based dialog description.
//!
//! A script is a set of named forms. Each form speaks its prompts and then
//! either collects input, fails, jumps to another form or document, or ends
//! the call.
//!
//! ```yaml
//! start: ask
//! forms:
//!   ask:
//!     prompts: ["Do you like this example? Please enter 1 for yes or 2 for no"]
//!     input:
//!       mode: dtmf
//!       choices: { "1": liked, "2": disliked }
//!   liked:
//!     prompts: ["You like this example."]
//!   disliked:
//!     prompts: ["You do not like this example."]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use callprobe_core::{Digit, Error, Result, Segment, Utterance};

/// A complete dialog document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DialogScript {
    /// Form the dialog starts in
    pub start: String,
    /// Forms by id
    pub forms: BTreeMap<String, Form>,
    /// Emit a blank output after every recognized DTMF entry
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub echo_dtmf: bool,
}

/// One step of a dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Form {
    /// Prompts spoken on entry, each delivered as its own output
    pub prompts: Vec<Prompt>,
    /// Input collected after the prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSpec>,
    /// Form to continue with when there is no input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Document to continue with when there is no input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goto: Option<String>,
    /// Raise a semantic error with this message after the prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
}

/// Something the dialog says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Prompt {
    /// Synthesized text
    Text(String),
    /// Recorded audio
    Audio {
        /// Audio location
        audio: String,
    },
}

impl Prompt {
    /// The output the session delivers for this prompt.
    pub fn to_utterance(&self) -> Utterance {
        match self {
            Prompt::Text(text) => Utterance::new(vec![Segment::Text(text.clone())]),
            Prompt::Audio { audio } => Utterance::audio(audio.clone()),
        }
    }
}

/// How input is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// DTMF keys
    Dtmf,
    /// Spoken input
    Voice,
}

/// Input collected by a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InputSpec {
    /// Accepted modality
    pub mode: InputMode,
    /// Accepted values mapped to the form each leads to
    pub choices: BTreeMap<String, String>,
    /// Form to go to on unrecognized input; defaults to re-prompting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nomatch: Option<String>,
}

impl InputSpec {
    /// Length of the longest DTMF choice, in keys.
    pub fn max_key_len(&self) -> usize {
        self.choices
            .keys()
            .map(|key| key.chars().filter(|c| !c.is_whitespace()).count())
            .max()
            .unwrap_or(0)
    }

    /// Form chosen by a spoken answer.
    pub fn match_voice(&self, text: &str) -> Option<&str> {
        self.choices.get(text.trim()).map(String::as_str)
    }
}

/// Result of feeding a key to a [`DtmfCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected {
    /// More keys are needed
    Pending,
    /// The keys spell the given choice
    Match(String),
    /// The keys cannot match any choice
    NoMatch(String),
}

/// Accumulates DTMF keys until they spell a choice.
#[derive(Debug)]
pub struct DtmfCollector<'a> {
    spec: &'a InputSpec,
    max_len: usize,
    keys: String,
}

impl<'a> DtmfCollector<'a> {
    /// Start collecting for `spec`.
    pub fn new(spec: &'a InputSpec) -> Self {
        Self {
            spec,
            max_len: spec.max_key_len().max(1),
            keys: String::new(),
        }
    }

    /// Add a key.
    pub fn push(&mut self, digit: Digit) -> Collected {
        self.keys.push(digit.as_char());
        if self.spec.choices.contains_key(&self.keys) {
            return Collected::Match(std::mem::take(&mut self.keys));
        }
        if self.keys.chars().count() >= self.max_len {
            return Collected::NoMatch(std::mem::take(&mut self.keys));
        }
        Collected::Pending
    }
}

impl DialogScript {
    /// Parse and validate a script from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: DialogScript =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        script.validate()?;
        Ok(script)
    }

    /// Load a script from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check that every form reference resolves.
    pub fn validate(&self) -> Result<()> {
        if !self.forms.contains_key(&self.start) {
            return Err(invalid(format!("start form '{}' is not defined", self.start)));
        }

        for (id, form) in &self.forms {
            if let Some(next) = &form.next {
                self.check_ref(id, "next", next)?;
            }

            if form.next.is_some() && form.goto.is_some() {
                return Err(invalid(format!("form '{id}' has both next and goto")));
            }

            if let Some(input) = &form.input {
                if input.choices.is_empty() {
                    return Err(invalid(format!("form '{id}' accepts input but has no choices")));
                }
                for (value, target) in &input.choices {
                    self.check_ref(id, "choice", target)?;
                    if input.mode == InputMode::Dtmf {
                        Digit::parse_sequence(value).map_err(|_| {
                            invalid(format!("form '{id}' has non-DTMF choice '{value}'"))
                        })?;
                    }
                }
                if input.mode == InputMode::Dtmf {
                    // Collection stops at the shorter key, so the longer one is unreachable
                    if let Some((short, long)) = shadowed_choice(input) {
                        return Err(invalid(format!(
                            "form '{id}' has DTMF choice '{short}' shadowing '{long}'"
                        )));
                    }
                }
                if let Some(nomatch) = &input.nomatch {
                    self.check_ref(id, "nomatch", nomatch)?;
                }
            }
        }

        Ok(())
    }

    fn check_ref(&self, form: &str, field: &str, target: &str) -> Result<()> {
        if self.forms.contains_key(target) {
            Ok(())
        } else {
            Err(invalid(format!(
                "form '{form}' {field} refers to unknown form '{target}'"
            )))
        }
    }

    /// Look up a form.
    pub fn form(&self, id: &str) -> Option<&Form> {
        self.forms.get(id)
    }
}

/// A pair of DTMF choices where the first is a proper prefix of the second.
fn shadowed_choice(input: &InputSpec) -> Option<(&str, &str)> {
    input.choices.keys().find_map(|short| {
        input
            .choices
            .keys()
            .find(|long| long.len() > short.len() && long.starts_with(short.as_str()))
            .map(|long| (short.as_str(), long.as_str()))
    })
}

fn invalid(message: String) -> Error {
    Error::Config(format!("invalid dialog script: {message}"))
}
