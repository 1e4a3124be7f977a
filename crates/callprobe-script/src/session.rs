//! Dialog sessions that run a [`DialogScript`] on their own thread.
//!
//! The interpreter thread reports through [`SessionEvents`] exactly like a
//! remote voice platform would: it may block in `output_ready` until the
//! driver consumes the previous output, and it receives input over a
//! channel fed by [`DialogSession::transmit_utterance`] and
//! [`DialogSession::inject_digit`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, trace, warn};

use callprobe_core::{
    ConnectionInfo, Digit, DialogSession, SessionConnector, SessionEvents, SessionFault, Utterance,
};

use crate::library::DialogLibrary;
use crate::script::{Collected, DialogScript, DtmfCollector, InputMode, InputSpec};

/// Creates [`ScriptedSession`]s over a shared [`DialogLibrary`].
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    library: Arc<DialogLibrary>,
    info: ConnectionInfo,
}

impl ScriptedConnector {
    /// Create a connector serving `library`.
    pub fn new(library: DialogLibrary) -> Self {
        Self {
            library: Arc::new(library),
            info: ConnectionInfo::default(),
        }
    }

    /// Report `info` as the session endpoint.
    pub fn with_connection_info(mut self, info: ConnectionInfo) -> Self {
        self.info = info;
        self
    }

    /// The scripts this connector serves.
    pub fn library(&self) -> &DialogLibrary {
        &self.library
    }
}

impl SessionConnector for ScriptedConnector {
    fn connection_info(&self) -> ConnectionInfo {
        self.info.clone()
    }

    fn open(&self, events: Arc<dyn SessionEvents>) -> Result<Box<dyn DialogSession>, SessionFault> {
        Ok(Box::new(ScriptedSession::new(
            Arc::clone(&self.library),
            self.info.clone(),
            events,
        )))
    }
}

/// Input delivered to the interpreter thread.
#[derive(Debug)]
enum Command {
    Speech(String),
    Key(Digit),
    Hangup,
}

/// A dialog session interpreting scripts from a [`DialogLibrary`].
pub struct ScriptedSession {
    library: Arc<DialogLibrary>,
    info: ConnectionInfo,
    events: Arc<dyn SessionEvents>,
    commands: Option<Sender<Command>>,
    thread: Option<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<SessionFault>>>,
}

impl ScriptedSession {
    /// Create a session that has not placed a call yet.
    pub fn new(
        library: Arc<DialogLibrary>,
        info: ConnectionInfo,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        Self {
            library,
            info,
            events,
            commands: None,
            thread: None,
            stopped: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    fn send(&self, command: Command) -> Result<(), SessionFault> {
        let sender = self
            .commands
            .as_ref()
            .ok_or_else(|| SessionFault::Connection("no call in progress".to_string()))?;
        sender
            .send(command)
            .map_err(|_| SessionFault::Connection("dialog has ended".to_string()))
    }

    fn record_fault(&self, fault: SessionFault) -> SessionFault {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault.clone());
        fault
    }
}

impl DialogSession for ScriptedSession {
    fn place_call(&mut self, uri: &str) -> Result<(), SessionFault> {
        if self.commands.is_some() {
            return Err(SessionFault::Connection("call already placed".to_string()));
        }

        let script = self
            .library
            .get(uri)
            .ok_or_else(|| self.record_fault(SessionFault::DocumentNotFound(uri.to_string())))?;

        let (sender, receiver) = mpsc::channel();
        let interpreter = Interpreter {
            library: Arc::clone(&self.library),
            info: self.info.clone(),
            events: Arc::clone(&self.events),
            commands: receiver,
            stopped: Arc::clone(&self.stopped),
            last_error: Arc::clone(&self.last_error),
        };
        let start_uri = uri.to_string();

        let handle = thread::Builder::new()
            .name("callprobe-dialog".to_string())
            .spawn(move || interpreter.run(start_uri, script))
            .map_err(|e| self.record_fault(SessionFault::Connection(e.to_string())))?;

        self.commands = Some(sender);
        self.thread = Some(handle);
        Ok(())
    }

    fn transmit_utterance(&mut self, text: &str) -> Result<(), SessionFault> {
        self.send(Command::Speech(text.to_string()))
    }

    fn inject_digit(&mut self, digit: Digit) -> Result<(), SessionFault> {
        self.send(Command::Key(digit))
    }

    fn terminate(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(sender) = &self.commands {
            // The thread may already have finished
            let _ = sender.send(Command::Hangup);
        }
    }

    fn last_error(&self) -> Option<SessionFault> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn release(&mut self) {
        self.commands = None;
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Dialog thread panicked");
            }
        }
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.terminate();
            self.release();
        }
    }
}

/// Why the interpreter stops waiting for input.
enum Interruption {
    Hangup,
}

struct Interpreter {
    library: Arc<DialogLibrary>,
    info: ConnectionInfo,
    events: Arc<dyn SessionEvents>,
    commands: Receiver<Command>,
    stopped: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<SessionFault>>>,
}

impl Interpreter {
    fn run(self, uri: String, script: Arc<DialogScript>) {
        info!("Dialog started: {}", uri);
        self.events.started();
        self.events.connected(&self.info);

        let mut uri = uri;
        let mut script = script;
        let mut form_id = script.start.clone();

        loop {
            if self.is_stopped() {
                debug!("Dialog stopped: {}", uri);
                return;
            }

            let Some(form) = script.form(&form_id).cloned() else {
                self.fail(SessionFault::Semantic(format!(
                    "form '{form_id}' not found in {uri}"
                )));
                return;
            };
            trace!("Entering form '{}' in {}", form_id, uri);

            for prompt in &form.prompts {
                self.events.output_ready(prompt.to_utterance());
                if self.is_stopped() {
                    return;
                }
            }

            if let Some(message) = &form.fail {
                self.fail(SessionFault::Semantic(message.clone()));
                return;
            }

            if let Some(input) = &form.input {
                self.events.expecting_input();
                let chosen = match self.collect(input, script.echo_dtmf) {
                    Ok(chosen) => chosen,
                    Err(Interruption::Hangup) => {
                        debug!("Dialog hung up while listening: {}", uri);
                        return;
                    }
                };
                self.events.input_closed();
                if let Err(Interruption::Hangup) = self.discard_surplus_input() {
                    debug!("Dialog hung up while listening: {}", uri);
                    return;
                }
                if let Some(target) = chosen.or_else(|| input.nomatch.clone()) {
                    form_id = target;
                }
                continue;
            }

            if let Some(next) = &form.next {
                form_id = next.clone();
                continue;
            }

            if let Some(target) = &form.goto {
                match self.library.get(target) {
                    Some(next_script) => {
                        debug!("Dialog transition: {} -> {}", uri, target);
                        form_id = next_script.start.clone();
                        script = next_script;
                        uri = target.clone();
                        continue;
                    }
                    None => {
                        self.fail(SessionFault::DocumentNotFound(target.clone()));
                        return;
                    }
                }
            }

            info!("Dialog finished: {}", uri);
            self.events.disconnected();
            return;
        }
    }

    /// Wait for input matching `input`; `None` means no match.
    fn collect(
        &self,
        input: &InputSpec,
        echo_dtmf: bool,
    ) -> Result<Option<String>, Interruption> {
        let mut collector = DtmfCollector::new(input);
        loop {
            let command = self.commands.recv().map_err(|_| Interruption::Hangup)?;
            match (command, input.mode) {
                (Command::Hangup, _) => return Err(Interruption::Hangup),
                (Command::Key(digit), InputMode::Dtmf) => match collector.push(digit) {
                    Collected::Pending => {}
                    Collected::Match(keys) => {
                        debug!("DTMF input matched: '{}'", keys);
                        if echo_dtmf {
                            self.events.output_ready(Utterance::empty());
                        }
                        return Ok(input.choices.get(&keys).cloned());
                    }
                    Collected::NoMatch(keys) => {
                        debug!("DTMF input not recognized: '{}'", keys);
                        return Ok(None);
                    }
                },
                (Command::Speech(text), InputMode::Voice) => {
                    let chosen = input.match_voice(&text).map(str::to_string);
                    if chosen.is_none() {
                        debug!("Spoken input not recognized: '{}'", text);
                    }
                    return Ok(chosen);
                }
                (command, mode) => {
                    debug!("Ignoring {:?} while listening for {:?}", command, mode);
                    return Ok(None);
                }
            }
        }
    }

    /// Drop input that arrived after the collection ended, such as keys typed
    /// past a complete choice. It answers no prompt the dialog has played.
    fn discard_surplus_input(&self) -> Result<(), Interruption> {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Hangup => return Err(Interruption::Hangup),
                surplus => debug!("Discarding surplus input: {:?}", surplus),
            }
        }
        Ok(())
    }

    fn fail(&self, fault: SessionFault) {
        warn!("Dialog error: {}", fault);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault.clone());
        self.events.session_error(fault);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::DialogScript;
    use callprobe_core::SessionSignal;
    use std::sync::mpsc::RecvTimeoutError;
    use std::time::Duration;

    /// Forwards every event into a channel, never blocking.
    struct Forward(Mutex<Sender<SessionSignal>>);

    impl Forward {
        fn send(&self, signal: SessionSignal) {
            let _ = self.0.lock().unwrap().send(signal);
        }
    }

    impl SessionEvents for Forward {
        fn started(&self) {
            self.send(SessionSignal::Started);
        }
        fn connected(&self, remote: &ConnectionInfo) {
            self.send(SessionSignal::Connected(remote.clone()));
        }
        fn output_ready(&self, utterance: Utterance) {
            self.send(SessionSignal::OutputReady(utterance));
        }
        fn expecting_input(&self) {
            self.send(SessionSignal::ExpectingInput);
        }
        fn input_closed(&self) {
            self.send(SessionSignal::InputClosed);
        }
        fn disconnected(&self) {
            self.send(SessionSignal::Disconnected);
        }
        fn session_error(&self, fault: SessionFault) {
            self.send(SessionSignal::Error(fault));
        }
    }

    /// Holds every output until the gate's sender is dropped.
    struct Gated {
        forward: Forward,
        gate: Mutex<Receiver<()>>,
    }

    impl SessionEvents for Gated {
        fn started(&self) {
            self.forward.started();
        }
        fn connected(&self, remote: &ConnectionInfo) {
            self.forward.connected(remote);
        }
        fn output_ready(&self, utterance: Utterance) {
            let _ = self.gate.lock().unwrap().recv();
            self.forward.output_ready(utterance);
        }
        fn expecting_input(&self) {
            self.forward.expecting_input();
        }
        fn input_closed(&self) {
            self.forward.input_closed();
        }
        fn disconnected(&self) {
            self.forward.disconnected();
        }
        fn session_error(&self, fault: SessionFault) {
            self.forward.session_error(fault);
        }
    }

    fn connector(scripts: &[(&str, &str)]) -> ScriptedConnector {
        let library = DialogLibrary::from_scripts(
            scripts
                .iter()
                .map(|(uri, yaml)| (*uri, DialogScript::from_yaml(yaml).unwrap())),
        )
        .unwrap();
        ScriptedConnector::new(library).with_connection_info(ConnectionInfo::new("localhost", 4242))
    }

    fn open(scripts: &[(&str, &str)]) -> (Box<dyn DialogSession>, Receiver<SessionSignal>) {
        let (sender, receiver) = mpsc::channel();
        let session = connector(scripts)
            .open(Arc::new(Forward(Mutex::new(sender))))
            .unwrap();
        (session, receiver)
    }

    fn next(signals: &Receiver<SessionSignal>) -> SessionSignal {
        signals.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    fn output(signals: &Receiver<SessionSignal>) -> String {
        match next(signals) {
            SessionSignal::OutputReady(utterance) => utterance.text_content(),
            other => panic!("expected output, got {other:?}"),
        }
    }

    const HELLO: &str = r#"
start: main
forms:
  main:
    prompts: ["Hello World!", "Goodbye!"]
"#;

    const VOICE: &str = r#"
start: ask
forms:
  ask:
    prompts: ["Do you like this example?"]
    input:
      mode: voice
      choices: { "yes": liked }
  liked:
    prompts: ["You like this example."]
"#;

    #[test]
    fn test_hello_runs_to_disconnect() {
        let (mut session, signals) = open(&[("file:hello.vxml", HELLO)]);
        session.place_call("file:hello.vxml").unwrap();

        assert_eq!(next(&signals), SessionSignal::Started);
        assert_eq!(
            next(&signals),
            SessionSignal::Connected(ConnectionInfo::new("localhost", 4242))
        );
        assert_eq!(output(&signals), "Hello World!");
        assert_eq!(output(&signals), "Goodbye!");
        assert_eq!(next(&signals), SessionSignal::Disconnected);

        session.release();
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_unknown_document() {
        let (mut session, _signals) = open(&[("file:hello.vxml", HELLO)]);
        let fault = session.place_call("file:nope.vxml").unwrap_err();
        assert_eq!(fault, SessionFault::DocumentNotFound("file:nope.vxml".to_string()));
        assert_eq!(session.last_error(), Some(fault));
    }

    #[test]
    fn test_input_before_call_fails() {
        let (mut session, _signals) = open(&[("file:hello.vxml", HELLO)]);
        assert!(matches!(
            session.transmit_utterance("yes"),
            Err(SessionFault::Connection(_))
        ));
    }

    #[test]
    fn test_voice_input_and_reprompt() {
        let (mut session, signals) = open(&[("file:input.vxml", VOICE)]);
        session.place_call("file:input.vxml").unwrap();
        next(&signals);
        next(&signals);

        assert_eq!(output(&signals), "Do you like this example?");
        assert_eq!(next(&signals), SessionSignal::ExpectingInput);
        session.transmit_utterance("um...").unwrap();
        assert_eq!(next(&signals), SessionSignal::InputClosed);
        assert_eq!(output(&signals), "Do you like this example?");
        assert_eq!(next(&signals), SessionSignal::ExpectingInput);

        session.transmit_utterance(" yes ").unwrap();
        assert_eq!(next(&signals), SessionSignal::InputClosed);
        assert_eq!(output(&signals), "You like this example.");
        assert_eq!(next(&signals), SessionSignal::Disconnected);
        session.release();
    }

    #[test]
    fn test_echo_dtmf_emits_blank_output() {
        let (mut session, signals) = open(&[(
            "file:dtmf.vxml",
            r#"
start: ask
echo_dtmf: true
forms:
  ask:
    prompts: ["Press 1"]
    input: { mode: dtmf, choices: { "1": done } }
  done:
    prompts: ["Done"]
"#,
        )]);
        session.place_call("file:dtmf.vxml").unwrap();
        next(&signals);
        next(&signals);
        assert_eq!(output(&signals), "Press 1");
        assert_eq!(next(&signals), SessionSignal::ExpectingInput);

        session.inject_digit(Digit::from_char('1').unwrap()).unwrap();
        match next(&signals) {
            SessionSignal::OutputReady(utterance) => assert!(utterance.is_blank()),
            other => panic!("expected blank output, got {other:?}"),
        }
        assert_eq!(next(&signals), SessionSignal::InputClosed);
        assert_eq!(output(&signals), "Done");
        session.release();
    }

    #[test]
    fn test_surplus_keys_do_not_answer_next_form() {
        let (sender, signals) = mpsc::channel();
        let (release, gate) = mpsc::channel::<()>();
        let events = Gated {
            forward: Forward(Mutex::new(sender)),
            gate: Mutex::new(gate),
        };
        let mut session = connector(&[(
            "file:menu.vxml",
            r#"
start: first
forms:
  first:
    prompts: ["Press 1"]
    input: { mode: dtmf, choices: { "1": second } }
  second:
    prompts: ["Press 3"]
    input: { mode: dtmf, choices: { "2": wrong, "3": right } }
  wrong:
    prompts: ["Wrong"]
  right:
    prompts: ["Right"]
"#,
        )])
        .open(Arc::new(events))
        .unwrap();

        // Both keys are queued before the first form listens
        session.place_call("file:menu.vxml").unwrap();
        session.inject_digit(Digit::from_char('1').unwrap()).unwrap();
        session.inject_digit(Digit::from_char('2').unwrap()).unwrap();
        drop(release);

        next(&signals);
        next(&signals);
        assert_eq!(output(&signals), "Press 1");
        assert_eq!(next(&signals), SessionSignal::ExpectingInput);
        assert_eq!(next(&signals), SessionSignal::InputClosed);
        assert_eq!(output(&signals), "Press 3");
        assert_eq!(next(&signals), SessionSignal::ExpectingInput);

        session.inject_digit(Digit::from_char('3').unwrap()).unwrap();
        assert_eq!(next(&signals), SessionSignal::InputClosed);
        assert_eq!(output(&signals), "Right");
        assert_eq!(next(&signals), SessionSignal::Disconnected);
        session.release();
    }

    #[test]
    fn test_goto_follows_document() {
        let (mut session, signals) = open(&[
            (
                "file:goto1.vxml",
                "start: main\nforms:\n  main:\n    prompts: [\"Prompt from goto1.vxml\"]\n    goto: file:goto2.vxml\n",
            ),
            (
                "file:goto2.vxml",
                "start: main\nforms:\n  main:\n    prompts: [\"Prompt from goto2.vxml\"]\n",
            ),
        ]);
        session.place_call("file:goto1.vxml").unwrap();
        next(&signals);
        next(&signals);
        assert_eq!(output(&signals), "Prompt from goto1.vxml");
        assert_eq!(output(&signals), "Prompt from goto2.vxml");
        assert_eq!(next(&signals), SessionSignal::Disconnected);
        session.release();
    }

    #[test]
    fn test_goto_missing_document_is_error() {
        let (mut session, signals) = open(&[(
            "file:goto1.vxml",
            "start: main\nforms:\n  main:\n    goto: file:gone.vxml\n",
        )]);
        session.place_call("file:goto1.vxml").unwrap();
        next(&signals);
        next(&signals);
        assert_eq!(
            next(&signals),
            SessionSignal::Error(SessionFault::DocumentNotFound("file:gone.vxml".to_string()))
        );
        session.release();
        assert!(matches!(
            session.last_error(),
            Some(SessionFault::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_fail_records_semantic_error() {
        let (mut session, signals) = open(&[(
            "file:bad.vxml",
            "start: main\nforms:\n  main:\n    prompts: [\"Oops\"]\n    fail: error.badfetch\n",
        )]);
        session.place_call("file:bad.vxml").unwrap();
        next(&signals);
        next(&signals);
        assert_eq!(output(&signals), "Oops");
        assert_eq!(
            next(&signals),
            SessionSignal::Error(SessionFault::Semantic("error.badfetch".to_string()))
        );
        session.release();
        assert_eq!(
            session.last_error(),
            Some(SessionFault::Semantic("error.badfetch".to_string()))
        );
    }

    #[test]
    fn test_terminate_stops_listening_dialog() {
        let (mut session, signals) = open(&[("file:input.vxml", VOICE)]);
        session.place_call("file:input.vxml").unwrap();
        next(&signals);
        next(&signals);
        output(&signals);
        assert_eq!(next(&signals), SessionSignal::ExpectingInput);

        session.terminate();
        session.release();
        assert!(matches!(
            signals.recv_timeout(Duration::from_millis(100)),
            Err(RecvTimeoutError::Disconnected) | Err(RecvTimeoutError::Timeout)
        ));
        assert!(session.transmit_utterance("yes").is_err());
    }
}
