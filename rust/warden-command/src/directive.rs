use std::{fmt, str::FromStr};

use crate::{DirectiveProblem, MalformedDirective};

/// What a directive asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Decide the fate of an upload waiting in a policy queue.
    ProcessUpload,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::ProcessUpload => f.write_str("process-upload"),
        }
    }
}

impl FromStr for Action {
    type Err = DirectiveProblem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("process-upload") {
            Ok(Action::ProcessUpload)
        } else {
            Err(DirectiveProblem::UnknownAction(s.to_string()))
        }
    }
}

/// The decision a directive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Promote the upload.
    Accept,
    /// Discard the upload.
    Reject,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Accept => f.write_str("ACCEPT"),
            Command::Reject => f.write_str("REJECT"),
        }
    }
}

impl FromStr for Command {
    type Err = DirectiveProblem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("accept") {
            Ok(Command::Accept)
        } else if s.eq_ignore_ascii_case("reject") {
            Ok(Command::Reject)
        } else {
            Err(DirectiveProblem::UnknownCommand(s.to_string()))
        }
    }
}

/// One authorization request from a command document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// What is requested.
    pub action: Action,
    /// Accept or reject.
    pub command: Command,
    /// Source package name.
    pub source: String,
    /// Package version.
    pub version: String,
    /// Policy queue holding the upload. Defaults to the configured queue.
    pub queue: Option<String>,
    /// Destination the signer expects the upload to go to. When stated it
    /// must match the entry's effective destination.
    pub suite: Option<String>,
    /// Free text recorded with the decision. May span several lines.
    pub reason: Option<String>,
}

impl Directive {
    /// An `ACCEPT` directive for an upload.
    pub fn accept(source: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(Command::Accept, source, version)
    }

    /// A `REJECT` directive for an upload.
    pub fn reject(source: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(Command::Reject, source, version)
    }

    fn new(command: Command, source: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            action: Action::ProcessUpload,
            command,
            source: source.into(),
            version: version.into(),
            queue: None,
            suite: None,
            reason: None,
        }
    }

    /// Address the upload in a specific queue.
    pub fn in_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// State the expected destination suite.
    pub fn for_suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = Some(suite.into());
        self
    }

    /// Attach a reason.
    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Renders the directive as one block of command text, which parses back
/// into the same directive.
impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Action: {}", self.action)?;
        writeln!(f, "Command: {}", self.command)?;
        writeln!(f, "Source: {}", self.source)?;
        writeln!(f, "Version: {}", self.version)?;
        if let Some(queue) = &self.queue {
            writeln!(f, "Queue: {queue}")?;
        }
        if let Some(suite) = &self.suite {
            writeln!(f, "Suite: {suite}")?;
        }
        if let Some(reason) = &self.reason {
            let mut lines = reason.split('\n');
            writeln!(f, "Reason: {}", lines.next().unwrap_or_default())?;
            for line in lines {
                if line.trim().is_empty() {
                    writeln!(f, " .")?;
                } else {
                    writeln!(f, " {line}")?;
                }
            }
        }
        Ok(())
    }
}

/// Fields of one block as they were read, before interpretation.
#[derive(Debug, Default)]
struct RawBlock {
    fields: Vec<(String, String)>,
    problem: Option<DirectiveProblem>,
    continuing: bool,
}

impl RawBlock {
    fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.problem.is_none()
    }

    fn fail(&mut self, problem: DirectiveProblem) {
        self.problem.get_or_insert(problem);
        self.continuing = false;
    }

    fn push_line(&mut self, number: usize, line: &str) {
        if line.starts_with([' ', '\t']) {
            if !self.continuing {
                if self.problem.is_none() {
                    self.fail(DirectiveProblem::OrphanContinuation(number));
                }
                return;
            }
            let content = line.trim();
            let content = if content == "." { "" } else { content };
            if let Some((_, value)) = self.fields.last_mut() {
                value.push('\n');
                value.push_str(content);
            }
            return;
        }

        let Some((name, value)) = line.split_once(':') else {
            self.fail(DirectiveProblem::NotAField(number));
            return;
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            self.fail(DirectiveProblem::NotAField(number));
            return;
        }
        if self
            .fields
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            self.fail(DirectiveProblem::DuplicateField(name.to_string()));
            return;
        }
        self.fields
            .push((name.to_ascii_lowercase(), value.trim().to_string()));
        self.continuing = self.problem.is_none();
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, name: &'static str, label: &'static str) -> Result<&str, DirectiveProblem> {
        match self.field(name).map(str::trim) {
            None => Err(DirectiveProblem::MissingField(label)),
            Some("") => Err(DirectiveProblem::EmptyField(label)),
            Some(value) => Ok(value),
        }
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.field(name)
            .map(|value| value.trim_end().to_string())
            .filter(|value| !value.trim().is_empty())
    }

    fn directive(&self) -> Result<Directive, DirectiveProblem> {
        if let Some(problem) = &self.problem {
            return Err(problem.clone());
        }
        let action: Action = self.required("action", "Action")?.parse()?;
        match action {
            Action::ProcessUpload => Ok(Directive {
                action,
                command: self.required("command", "Command")?.parse()?,
                source: self.required("source", "Source")?.to_string(),
                version: self.required("version", "Version")?.to_string(),
                queue: self.optional("queue"),
                suite: self.optional("suite"),
                reason: self.optional("reason"),
            }),
        }
    }
}

/// Parse the payload of a verified command document.
///
/// Blocks are separated by blank lines and each yields one result, in
/// document order. Field names are case-insensitive; unknown fields are
/// ignored. A line starting with whitespace continues the previous field,
/// with ` .` standing for an empty line. Lines starting with `#` are
/// comments.
pub fn parse_directives(text: &str) -> Vec<Result<Directive, MalformedDirective>> {
    let mut blocks = Vec::new();
    let mut current = RawBlock::default();

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            current.continuing = false;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        current.push_line(index + 1, line);
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
        .into_iter()
        .enumerate()
        .map(|(block, raw)| {
            raw.directive()
                .map_err(|problem| MalformedDirective { block, problem })
        })
        .collect()
}
