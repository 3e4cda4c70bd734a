//! Command registry for the modem-emulating side.
//!
//! Each registered command carries up to four handlers, one per V.25
//! operator: read (`+FOO?`), run (`+FOO`), test (`+FOO=?`) and write
//! (`+FOO=<args>`). A missing handler means the operator is not supported
//! and the dispatcher answers `ERROR`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use atcmd_core::error::Result;
use atcmd_core::transport::Transport;
use atcmd_protocol::protocol::Operation;

/// Work that needs the raw transport after a reply has been sent, such as
/// a binary file transfer. Command processing resumes once it returns.
#[async_trait]
pub trait DataTransfer: Send {
    async fn run(self: Box<Self>, transport: &mut dyn Transport) -> Result<()>;
}

/// What a handler produced for one sub-command.
pub struct Reply {
    /// Information text; may span several lines separated by `\n`.
    pub text: String,
    pub ok: bool,
    pub transfer: Option<Box<dyn DataTransfer>>,
}

impl Reply {
    /// Success without information text.
    pub fn ok() -> Self {
        Self::from((String::new(), true))
    }

    /// Success with information text.
    pub fn ok_with(text: impl Into<String>) -> Self {
        Self::from((text.into(), true))
    }

    /// Plain `ERROR`.
    pub fn error() -> Self {
        Self::from((String::new(), false))
    }

    /// Failure reported with an extended token, e.g. `+CME ERROR: 10`.
    pub fn error_with(token: impl Into<String>) -> Self {
        Self::from((token.into(), false))
    }

    /// Run `transfer` once the reply has been written.
    pub fn then_transfer(mut self, transfer: impl DataTransfer + 'static) -> Self {
        self.transfer = Some(Box::new(transfer));
        self
    }
}

impl From<(String, bool)> for Reply {
    fn from((text, ok): (String, bool)) -> Self {
        Self {
            text,
            ok,
            transfer: None,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("text", &self.text)
            .field("ok", &self.ok)
            .field("transfer", &self.transfer.is_some())
            .finish()
    }
}

/// A handler receives the argument text: the part after `=` for write,
/// the trailing digits of a basic command (`I1`) for run, `None` otherwise.
pub type Handler = Arc<dyn Fn(Option<&str>) -> Reply + Send + Sync>;

/// One registered command and its optional handlers.
#[derive(Clone)]
pub struct AtCommand {
    name: String,
    read: Option<Handler>,
    run: Option<Handler>,
    test: Option<Handler>,
    write: Option<Handler>,
}

impl AtCommand {
    /// A command with no handlers. `name` excludes the `AT` prefix, e.g.
    /// `+CSQ` or `I`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            read: None,
            run: None,
            test: None,
            write: None,
        }
    }

    pub fn read(mut self, f: impl Fn(Option<&str>) -> Reply + Send + Sync + 'static) -> Self {
        self.read = Some(Arc::new(f));
        self
    }

    pub fn run(mut self, f: impl Fn(Option<&str>) -> Reply + Send + Sync + 'static) -> Self {
        self.run = Some(Arc::new(f));
        self
    }

    pub fn test(mut self, f: impl Fn(Option<&str>) -> Reply + Send + Sync + 'static) -> Self {
        self.test = Some(Arc::new(f));
        self
    }

    pub fn write(mut self, f: impl Fn(Option<&str>) -> Reply + Send + Sync + 'static) -> Self {
        self.write = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handler serving `op`, if registered.
    pub fn handler(&self, op: &Operation) -> Option<&Handler> {
        match op {
            Operation::Read => self.read.as_ref(),
            Operation::Run => self.run.as_ref(),
            Operation::Test => self.test.as_ref(),
            Operation::Write(_) => self.write.as_ref(),
        }
    }
}

impl fmt::Debug for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtCommand")
            .field("name", &self.name)
            .field("read", &self.read.is_some())
            .field("run", &self.run.is_some())
            .field("test", &self.test.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

/// Commands known to a server, keyed by exact (case-sensitive) name.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, AtCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, replacing any previous entry of the same name.
    pub fn add_command(&mut self, command: AtCommand) {
        tracing::debug!(name = %command.name, "registering command");
        self.commands.insert(command.name.clone(), command);
    }

    /// Remove a command. Returns whether it was registered.
    pub fn remove_command(&mut self, name: &str) -> bool {
        self.commands.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&AtCommand> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_by_operator() {
        let cmd = AtCommand::new("+FOO")
            .run(|_| Reply::ok())
            .write(|args| Reply::ok_with(format!("got {}", args.unwrap_or(""))));

        assert!(cmd.handler(&Operation::Run).is_some());
        assert!(cmd.handler(&Operation::Read).is_none());
        assert!(cmd.handler(&Operation::Test).is_none());

        let write = cmd.handler(&Operation::Write("1".into())).unwrap();
        assert_eq!(write(Some("1")).text, "got 1");
    }

    #[test]
    fn re_registration_replaces() {
        let mut registry = CommandRegistry::new();
        registry.add_command(AtCommand::new("+FOO").run(|_| Reply::ok_with("first")));
        registry.add_command(AtCommand::new("+FOO").read(|_| Reply::ok_with("second")));

        assert_eq!(registry.len(), 1);
        let cmd = registry.get("+FOO").unwrap();
        assert!(cmd.handler(&Operation::Run).is_none());
        assert_eq!(cmd.handler(&Operation::Read).unwrap()(None).text, "second");
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut registry = CommandRegistry::new();
        registry.add_command(AtCommand::new("+FOO"));
        assert!(registry.contains("+FOO"));
        assert!(!registry.contains("+foo"));
    }

    #[test]
    fn remove_and_list() {
        let mut registry = CommandRegistry::new();
        registry.add_command(AtCommand::new("+B"));
        registry.add_command(AtCommand::new("+A"));
        assert_eq!(registry.names(), vec!["+A", "+B"]);
        assert!(registry.remove_command("+A"));
        assert!(!registry.remove_command("+A"));
        assert_eq!(registry.names(), vec!["+B"]);
        assert!(!registry.is_empty());
    }

    #[test]
    fn reply_constructors() {
        assert!(Reply::ok().ok);
        assert!(!Reply::error().ok);
        let reply = Reply::from(("+CGMI: ACME".to_string(), true));
        assert_eq!(reply.text, "+CGMI: ACME");
        let reply = Reply::error_with("+CME ERROR: 10");
        assert!(!reply.ok);
        assert!(reply.transfer.is_none());
    }
}
