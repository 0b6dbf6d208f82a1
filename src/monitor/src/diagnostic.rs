use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use derive_more::Display;
use enum_map::Enum;
use itertools::Itertools;

/// How serious a diagnostic is, as classified by the layer that
/// emitted it.
#[derive(
    Clone, Copy, Debug, Display, Enum, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum Severity {
    #[display(fmt = "VERBOSE")]
    Verbose,
    #[display(fmt = "INFO")]
    Info,
    #[display(fmt = "WARNING")]
    Warning,
    #[display(fmt = "ERROR")]
    Error,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Verbose,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
    ];
}

#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "unknown severity `{}`", _0)]
pub struct ParseSeverityError(String);

impl std::error::Error for ParseSeverityError {}

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match &s.trim().to_ascii_lowercase()[..] {
            "verbose" => Severity::Verbose,
            "info" | "information" => Severity::Info,
            "warning" | "warn" => Severity::Warning,
            "error" => Severity::Error,
            _ => return Err(ParseSeverityError(s.to_owned())),
        })
    }
}

bitflags! {
    /// The categories a diagnostic falls under.
    pub struct MessageTypes: u32 {
        const GENERAL = 0b001;
        const VALIDATION = 0b010;
        const PERFORMANCE = 0b100;
    }
}

impl fmt::Display for MessageTypes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pairs = [
            (MessageTypes::GENERAL, "GENERAL"),
            (MessageTypes::VALIDATION, "VALIDATION"),
            (MessageTypes::PERFORMANCE, "PERFORMANCE"),
        ];

        if !pairs.iter().any(|&(k, _)| self.contains(k)) {
            return write!(f, "unknown type");
        }

        let fmt = pairs.iter()
            .filter(|&&(k, _)| self.contains(k))
            .map(|&(_, v)| v)
            .format(" | ");
        write!(f, "{}", fmt)
    }
}

/// A debug label attached to a queue or command buffer at the time the
/// diagnostic was raised.
#[derive(Clone, Debug, Display, PartialEq)]
#[display(fmt = "{}", name)]
pub struct Label {
    pub name: String,
    pub color: [f32; 4],
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label { name: name.into(), color: [0.0; 4] }
    }
}

/// An API object implicated by a diagnostic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectInfo {
    /// Human readable object type, e.g. `Sampler`.
    pub ty: String,
    pub handle: u64,
    pub name: Option<String>,
}

impl fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} 0x{:016x}[{}]",
            self.ty,
            self.handle,
            self.name.as_deref().unwrap_or(""),
        )
    }
}

/// A single message reported by the validation layer. Immutable once
/// emitted.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub types: MessageTypes,
    /// The identifying code of the violated rule, if the layer
    /// provides one.
    pub id_name: String,
    pub id_number: i32,
    pub message: String,
    pub objects: Vec<ObjectInfo>,
    pub queue_labels: Vec<Label>,
    pub cmd_buf_labels: Vec<Label>,
}

impl Diagnostic {
    /// Creates a validation diagnostic with no attached objects.
    pub fn new(
        severity: Severity,
        id_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            severity,
            types: MessageTypes::VALIDATION,
            id_name: id_name.into(),
            id_number: 0,
            message: message.into(),
            objects: Vec::new(),
            queue_labels: Vec::new(),
            cmd_buf_labels: Vec::new(),
        }
    }

    pub fn error(id_name: impl Into<String>, message: impl Into<String>) ->
        Self
    {
        Self::new(Severity::Error, id_name, message)
    }

    pub fn warning(id_name: impl Into<String>, message: impl Into<String>) ->
        Self
    {
        Self::new(Severity::Warning, id_name, message)
    }

    pub fn with_types(self, types: MessageTypes) -> Self {
        Diagnostic { types, ..self }
    }

    pub fn with_object(mut self, object: ObjectInfo) -> Self {
        self.objects.push(object);
        self
    }

    /// The pieces of text a pattern is matched against: the identifying
    /// code first, then the full message.
    pub fn texts(&self) -> [&str; 2] {
        [&self.id_name, &self.message]
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}][{}] {}: {}",
            self.severity,
            self.types,
            self.id_name,
            self.message,
        )?;

        if !self.objects.is_empty() {
            write!(f, "\n  Objects:")?;
            for obj in self.objects.iter() {
                write!(f, "\n    {}", obj)?;
            }
        }

        fn write_labels(f: &mut fmt::Formatter, prefix: &str, labels: &[Label])
            -> fmt::Result
        {
            if !labels.is_empty() {
                write!(f, "\n  {}:", prefix)?;
            }
            for label in labels.iter() {
                write!(f, "\n    {}", label)?;
            }
            Ok(())
        }

        write_labels(f, "Queue labels", &self.queue_labels)?;
        write_labels(f, "Command buffer labels", &self.cmd_buf_labels)?;

        Ok(())
    }
}


#[cfg(test)]
unit::collect_tests![tests];
