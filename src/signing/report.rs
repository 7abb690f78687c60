use std::fmt;

use crate::{
    digest::Digest,
    errors::{Error, ErrorKind, Result},
    history::{sort_history_elements, History, HistoryElement, HistorySource, NameVersion},
};

/// Terminal outcome of one component version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Signed,
    Verified,
    /// Integrity established through the digest recorded by the referencing
    /// component version only
    Digested,
    Failed(ErrorKind),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Signed => f.write_str("signed"),
            Outcome::Verified => f.write_str("verified"),
            Outcome::Digested => f.write_str("digested"),
            Outcome::Failed(kind) => write!(f, "{kind}"),
        }
    }
}

/// How trust in a signature was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Trust {
    /// Checked against local key material
    Key,
    /// Asserted by the keyless provider
    External,
}

#[derive(Debug, Clone)]
pub struct NodeOutcome {
    /// Path to the component version, excluding itself
    pub history: History,
    pub key: NameVersion,
    pub outcome: Outcome,
    pub trust: Option<Trust>,
    pub digest: Option<Digest>,
    pub message: Option<String>,
}

impl NodeOutcome {
    /// Full path including the component version, rendered `A->B->C`.
    pub fn path(&self) -> String {
        if self.history.is_empty() {
            self.key.to_string()
        } else {
            format!("{}->{}", self.history, self.key)
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

impl HistorySource for NodeOutcome {
    fn history(&self) -> &History {
        &self.history
    }
}

impl HistoryElement for NodeOutcome {
    fn key(&self) -> &NameVersion {
        &self.key
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path(), self.outcome)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Result of a signing or verification run.
#[derive(Debug)]
pub struct SigningReport {
    pub root: NameVersion,
    /// Per component version outcomes, in history order
    pub outcomes: Vec<NodeOutcome>,
    /// Digest of the root, if it completed
    pub digest: Option<Digest>,
    /// Failure of the root, wrapping the originating failure
    pub error: Option<Error>,
}

impl SigningReport {
    pub(crate) fn new(
        root: NameVersion,
        mut outcomes: Vec<NodeOutcome>,
        digest: Option<Digest>,
        error: Option<Error>,
    ) -> Self {
        sort_history_elements(&mut outcomes);
        Self {
            root,
            outcomes,
            digest,
            error,
        }
    }

    /// Outcomes of the nodes where a failure originated.
    pub fn failures(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    /// Outcome of the first visit of `nv`.
    pub fn outcome(&self, nv: &NameVersion) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| &o.key == nv)
    }

    /// `true` if the run finished without an error.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failures().next().is_none()
    }

    /// Process exit status: 0 on success, 1 if any component version failed.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// One line per failing component version.
    pub fn render(&self) -> String {
        self.failures()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The root digest, or the root failure.
    pub fn into_result(self) -> Result<Digest> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.digest
            .ok_or_else(|| Error::not_found("digest", self.root.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nv(name: &str) -> NameVersion {
        NameVersion::new(name, "1.0.0")
    }

    fn outcome(path: &[&str], key: &str, outcome: Outcome) -> NodeOutcome {
        NodeOutcome {
            history: path.iter().map(|n| nv(n)).collect::<Vec<_>>().into(),
            key: nv(key),
            outcome,
            trust: None,
            digest: None,
            message: matches!(outcome, Outcome::Failed(_)).then(|| "boom".to_owned()),
        }
    }

    #[test]
    fn report_is_sorted_and_rendered() {
        let report = SigningReport::new(
            nv("a"),
            vec![
                outcome(&["a", "c"], "d", Outcome::Failed(ErrorKind::DigestMismatch)),
                outcome(&[], "a", Outcome::Signed),
                outcome(&["a"], "b", Outcome::Failed(ErrorKind::Recursion)),
                outcome(&["a"], "c", Outcome::Digested),
            ],
            None,
            Some(Error::not_found("resource", "x")),
        );

        let keys: Vec<_> = report.outcomes.iter().map(|o| o.key.name()).collect();
        assert_eq!(keys, ["a", "b", "c", "d"]);
        assert_eq!(
            report.render(),
            "a:1.0.0->b:1.0.0: recursion-error: boom\n\
             a:1.0.0->c:1.0.0->d:1.0.0: digest-mismatch: boom"
        );
        assert_eq!(report.exit_code(), 1);
        assert!(report.into_result().is_err());
    }

    #[test]
    fn success_report() {
        let digest = Digest::new("SHA-256", "jsonNormalisation/v1", "ab");
        let report = SigningReport::new(
            nv("a"),
            vec![outcome(&[], "a", Outcome::Verified)],
            Some(digest.clone()),
            None,
        );
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.render(), "");
        assert_eq!(report.into_result().unwrap(), digest);
    }
}
