use std::{error::Error as StdError, fmt, io};

use thiserror::Error;

use crate::history::{History, NameVersion};

/// Boxed cause carried by chainable errors.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classification of every failure produced by this crate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// A component version was reached twice on one traversal path
    #[strum(serialize = "recursion-error")]
    Recursion,
    /// An algorithm or access type name is not registered
    Unknown,
    NotFound,
    NotSupported,
    Invalid,
    AlreadyExists,
    /// A tagged payload does not match the registered shape
    Decode,
    DigestMismatch,
    VerificationFailed,
    /// An external lookup of a component version or blob did not succeed
    ResolutionFailed,
    Io,
    Cancelled,
    Other,
}

/// Renders the structured parts of a kinded error into a message.
///
/// The same [`ErrorInfo`] can be displayed differently by swapping the
/// formatter, e.g. a front end that wants localized messages.
pub trait ErrorFormatter: Send + Sync {
    fn format(&self, kind: &str, element: Option<&str>, context: &str) -> String;
}

/// Formatter producing `<prefix> <kind> "<element>" <suffix> in <context>`.
#[derive(Debug, Clone, Copy)]
pub struct MessageFormatter {
    prefix: &'static str,
    suffix: &'static str,
}

impl MessageFormatter {
    pub const fn new(prefix: &'static str, suffix: &'static str) -> Self {
        Self { prefix, suffix }
    }
}

impl ErrorFormatter for MessageFormatter {
    fn format(&self, kind: &str, element: Option<&str>, context: &str) -> String {
        let mut parts = Vec::new();
        if !self.prefix.is_empty() {
            parts.push(self.prefix.to_owned());
        }
        if !kind.is_empty() {
            parts.push(kind.to_owned());
        }
        if let Some(elem) = element {
            parts.push(format!("\"{elem}\""));
        }
        if !self.suffix.is_empty() {
            parts.push(self.suffix.to_owned());
        }
        let mut msg = parts.join(" ");
        if !context.is_empty() {
            msg = format!("{msg} in {context}");
        }
        msg
    }
}

pub static UNKNOWN_FORMATTER: MessageFormatter = MessageFormatter::new("unknown", "");
pub static NOT_FOUND_FORMATTER: MessageFormatter = MessageFormatter::new("", "not found");
pub static NOT_SUPPORTED_FORMATTER: MessageFormatter = MessageFormatter::new("", "not supported");
pub static INVALID_FORMATTER: MessageFormatter = MessageFormatter::new("invalid", "");
pub static ALREADY_EXISTS_FORMATTER: MessageFormatter = MessageFormatter::new("", "already exists");
pub static FAILED_BEFORE_FORMATTER: MessageFormatter =
    MessageFormatter::new("", "failed on an earlier path");

/// A kinded error: kind, optional element and context, optional cause.
pub struct ErrorInfo {
    class: ErrorKind,
    formatter: &'static dyn ErrorFormatter,
    kind: String,
    element: Option<String>,
    context: String,
    cause: Option<BoxError>,
}

impl ErrorInfo {
    /// Creates a classified error.
    ///
    /// # Arguments
    ///
    /// * `class` - Kind used for matching.
    /// * `formatter` - Renders the message for `class`.
    /// * `kind` - What was looked for, e.g. `signature`.
    /// * `element` - The concrete element, if known.
    pub fn new(
        class: ErrorKind,
        formatter: &'static dyn ErrorFormatter,
        kind: impl Into<String>,
        element: Option<String>,
    ) -> Self {
        Self {
            class,
            formatter,
            kind: kind.into(),
            element,
            context: String::new(),
            cause: None,
        }
    }

    /// Names the element the failure happened in.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Attaches the underlying failure.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_formatter(mut self, formatter: &'static dyn ErrorFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn class(&self) -> ErrorKind {
        self.class
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    pub fn element(&self) -> Option<&str> {
        self.element.as_deref()
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

impl fmt::Debug for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorInfo")
            .field("class", &self.class)
            .field("kind", &self.kind)
            .field("element", &self.element)
            .field("context", &self.context)
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = self
            .formatter
            .format(&self.kind, self.element.as_deref(), &self.context);
        match &self.cause {
            Some(cause) => write!(f, "{msg}: {cause}"),
            None => f.write_str(&msg),
        }
    }
}

impl StdError for ErrorInfo {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

/// Raised by [`History::add`] when an element is visited twice on one path.
#[derive(Debug)]
pub struct RecursionError {
    kind: String,
    element: NameVersion,
    history: History,
    cause: Option<BoxError>,
}

impl RecursionError {
    /// Recursion on `element`, reached through `history`.
    pub fn new(kind: impl Into<String>, element: NameVersion, history: History) -> Self {
        Self {
            kind: kind.into(),
            element,
            history,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn element(&self) -> &NameVersion {
        &self.element
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}

impl fmt::Display for RecursionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} recursion: use of {}", self.kind, self.element)?;
        if !self.history.is_empty() {
            write!(f, " for {}", self.history)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl StdError for RecursionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Contextual annotation; the classification comes from the cause.
    #[error("{message}: {source}")]
    Wrapped {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Info(#[from] ErrorInfo),

    #[error(transparent)]
    Recursion(#[from] RecursionError),

    #[error("digest mismatch for {element}: recorded {recorded}, computed {computed}")]
    DigestMismatch {
        element: String,
        recorded: String,
        computed: String,
    },

    #[error("signature \"{name}\" of {element} failed verification: {reason}")]
    VerificationFailed {
        element: String,
        name: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("cannot resolve {element}: {reason}")]
    ResolutionFailed {
        element: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("cannot decode {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("cancelled before {element}")]
    Cancelled { element: String },
}

impl Error {
    /// Prefixes `cause` with `message`, keeping it as the source.
    pub fn wrap(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Error::Wrapped {
            message: message.into(),
            source: cause.into(),
        }
    }

    pub fn unknown(kind: &str, element: impl Into<String>) -> Self {
        ErrorInfo::new(
            ErrorKind::Unknown,
            &UNKNOWN_FORMATTER,
            kind,
            Some(element.into()),
        )
        .into()
    }

    /// `kind` `element` does not exist.
    pub fn not_found(kind: &str, element: impl Into<String>) -> Self {
        ErrorInfo::new(
            ErrorKind::NotFound,
            &NOT_FOUND_FORMATTER,
            kind,
            Some(element.into()),
        )
        .into()
    }

    pub fn not_supported(kind: &str, element: impl Into<String>) -> Self {
        ErrorInfo::new(
            ErrorKind::NotSupported,
            &NOT_SUPPORTED_FORMATTER,
            kind,
            Some(element.into()),
        )
        .into()
    }

    /// `element` is not a valid `kind`.
    pub fn invalid(kind: &str, element: impl Into<String>) -> Self {
        ErrorInfo::new(
            ErrorKind::Invalid,
            &INVALID_FORMATTER,
            kind,
            Some(element.into()),
        )
        .into()
    }

    pub fn already_exists(kind: &str, element: impl Into<String>) -> Self {
        ErrorInfo::new(
            ErrorKind::AlreadyExists,
            &ALREADY_EXISTS_FORMATTER,
            kind,
            Some(element.into()),
        )
        .into()
    }

    /// `element` was reached again on the path `history`.
    pub fn recursion(kind: &str, element: NameVersion, history: History) -> Self {
        RecursionError::new(kind, element, history).into()
    }

    /// The digest recorded for `element` differs from the computed one.
    pub fn digest_mismatch(
        element: impl fmt::Display,
        recorded: impl fmt::Display,
        computed: impl fmt::Display,
    ) -> Self {
        Error::DigestMismatch {
            element: element.to_string(),
            recorded: recorded.to_string(),
            computed: computed.to_string(),
        }
    }

    pub fn verification_failed(
        element: impl fmt::Display,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::VerificationFailed {
            element: element.to_string(),
            name: name.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// `element` could not be resolved.
    ///
    /// # Arguments
    ///
    /// * `element` - The component version or artifact looked up.
    /// * `reason` - Short description, e.g. `not found` or `lookup timed out`.
    /// * `source` - The collaborator failure, if any.
    pub fn resolution_failed(
        element: impl fmt::Display,
        reason: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Error::ResolutionFailed {
            element: element.to_string(),
            reason: reason.into(),
            source,
        }
    }

    /// I/O failure while doing `context`.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Classification of this error. Wrapped errors report the first
    /// classified cause in their chain.
    pub fn kind(&self) -> ErrorKind {
        if let Some(kind) = self.own_kind() {
            return kind;
        }
        let mut cause = self.source();
        while let Some(err) = cause {
            if let Some(kind) = own_kind(err) {
                return kind;
            }
            cause = err.source();
        }
        ErrorKind::Other
    }

    /// Tests whether a failure of `kind` is present anywhere in the chain.
    pub fn is(&self, kind: ErrorKind) -> bool {
        is_a(self, kind)
    }

    fn own_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Wrapped { .. } => None,
            Error::Info(info) => Some(info.class),
            Error::Recursion(_) => Some(ErrorKind::Recursion),
            Error::DigestMismatch { .. } => Some(ErrorKind::DigestMismatch),
            Error::VerificationFailed { .. } => Some(ErrorKind::VerificationFailed),
            Error::ResolutionFailed { .. } => Some(ErrorKind::ResolutionFailed),
            Error::Decode { .. } => Some(ErrorKind::Decode),
            Error::Io { .. } => Some(ErrorKind::Io),
            Error::Cancelled { .. } => Some(ErrorKind::Cancelled),
        }
    }
}

fn own_kind(err: &(dyn StdError + 'static)) -> Option<ErrorKind> {
    if let Some(e) = err.downcast_ref::<Error>() {
        return e.own_kind();
    }
    if let Some(e) = err.downcast_ref::<ErrorInfo>() {
        return Some(e.class);
    }
    if err.is::<RecursionError>() {
        return Some(ErrorKind::Recursion);
    }
    if err.is::<io::Error>() {
        return Some(ErrorKind::Io);
    }
    None
}

/// Walks the cause chain of `err` looking for a failure classified as `kind`.
pub fn is_a(err: &(dyn StdError + 'static), kind: ErrorKind) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if own_kind(e) == Some(kind) {
            return true;
        }
        current = e.source();
    }
    false
}

/// Finds the first recursion error in the cause chain of `err`.
pub fn find_recursion<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a RecursionError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(Error::Recursion(r)) = e.downcast_ref::<Error>() {
            return Some(r);
        }
        if let Some(r) = e.downcast_ref::<RecursionError>() {
            return Some(r);
        }
        current = e.source();
    }
    None
}

/// Checks if the cause chain of `err` holds a recursion error of `kind`.
pub fn is_recursion_kind(err: &(dyn StdError + 'static), kind: &str) -> bool {
    find_recursion(err).is_some_and(|r| r.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nv(name: &str) -> NameVersion {
        NameVersion::new(name, "1.0.0")
    }

    #[test]
    fn unknown_error_message() {
        let err = Error::unknown("signing algorithm", "foo");
        assert_eq!(err.to_string(), "unknown signing algorithm \"foo\"");
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn kinded_error_with_context_and_cause() {
        let info = ErrorInfo::new(
            ErrorKind::NotFound,
            &NOT_FOUND_FORMATTER,
            "resource",
            Some("chart".to_owned()),
        )
        .with_context("acme.org/app:1.0.0")
        .with_cause(io::Error::new(io::ErrorKind::Other, "disk gone"));
        let err = Error::from(info);

        assert_eq!(
            err.to_string(),
            "resource \"chart\" not found in acme.org/app:1.0.0: disk gone"
        );
        assert!(err.is(ErrorKind::NotFound));
        assert!(err.is(ErrorKind::Io));
    }

    #[test]
    fn custom_formatter() {
        struct Terse;
        impl ErrorFormatter for Terse {
            fn format(&self, kind: &str, element: Option<&str>, _context: &str) -> String {
                format!("{kind}?{}", element.unwrap_or_default())
            }
        }
        static TERSE: Terse = Terse;

        let err = Error::from(
            ErrorInfo::new(ErrorKind::Unknown, &UNKNOWN_FORMATTER, "hash", Some("md5".into()))
                .with_formatter(&TERSE),
        );
        assert_eq!(err.to_string(), "hash?md5");
    }

    #[test]
    fn recursion_error_renders_path() {
        let history: History = vec![nv("a"), nv("b")].into();
        let err = Error::recursion("component version", nv("a"), history);
        assert_eq!(
            err.to_string(),
            "component version recursion: use of a:1.0.0 for a:1.0.0->b:1.0.0"
        );
    }

    #[test]
    fn is_a_walks_wrapped_chain() {
        let inner = Error::recursion("component version", nv("a"), History::new());
        let err = Error::wrap("reference b", Error::wrap("reference c", inner));

        assert_eq!(err.kind(), ErrorKind::Recursion);
        assert!(err.is(ErrorKind::Recursion));
        assert!(!err.is(ErrorKind::DigestMismatch));
        assert!(is_recursion_kind(&err, "component version"));
        assert!(!is_recursion_kind(&err, "resource"));
    }

    #[test]
    fn wrapped_foreign_error_is_other() {
        let err = Error::wrap("signing", anyhow::anyhow!("hsm offline"));
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "signing: hsm offline");
    }
}
