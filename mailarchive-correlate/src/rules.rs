//! Line classification and status precedence.
//!
//! Both are tables read top to bottom, first match wins. Reordering an entry
//! changes behaviour, which is what the tests below pin down.

use mailarchive_common::MessageStatus;
use regex::Regex;

/// What a line says about the transport daemon's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// `QUEUEID: ... message-id=<...>`
    Association,
    /// `QUEUEID: ...`
    QueueReference,
    /// `... OK (QUEUEID)`, the receiving filter confirming a hand-over
    Completion,
    /// `connect from host[addr]`
    Connect,
    /// `disconnect from host[addr]`
    Disconnect,
}

/// Default rule table
pub const RULE_TABLE: [(RuleKind, &str); 5] = [
    (RuleKind::Association, r"^(\w+):.*message-id=<(.*)>"),
    (RuleKind::QueueReference, r"^(\w+): "),
    (RuleKind::Completion, r"OK \((\w+)\)"),
    (RuleKind::Connect, r"^connect from (.+\[[0-9A-Fa-f:.]+\])"),
    (RuleKind::Disconnect, r"^disconnect from (.+\[[0-9A-Fa-f:.]+\])"),
];

/// Placeholder the daemon logs for a rejected transaction that never got a
/// queue ID
const NO_QUEUE: &str = "NOQUEUE";

/// Outcome of classifying a line, borrowing from its content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    Association { queue_id: &'a str, message_id: &'a str },
    QueueReference { queue_id: &'a str },
    Completion { queue_id: &'a str },
    Connect { source: &'a str },
    Disconnect { source: &'a str },
    Unmatched,
}

#[derive(Debug, Clone)]
struct Rule {
    kind: RuleKind,
    pattern: Regex,
}

impl Rule {
    fn apply<'a>(&self, content: &'a str) -> Option<Classification<'a>> {
        let captures = self.pattern.captures(content)?;
        let first = captures.get(1)?.as_str();

        match self.kind {
            RuleKind::Association => Some(Classification::Association {
                queue_id: first,
                message_id: captures.get(2)?.as_str(),
            }),
            RuleKind::QueueReference => {
                (first != NO_QUEUE).then_some(Classification::QueueReference { queue_id: first })
            }
            RuleKind::Completion => Some(Classification::Completion { queue_id: first }),
            RuleKind::Connect => Some(Classification::Connect { source: first }),
            RuleKind::Disconnect => Some(Classification::Disconnect { source: first }),
        }
    }
}

/// Ordered rule table
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Build a classifier from `(kind, pattern)` pairs, tried in the given order.
    ///
    /// Every pattern needs at least one capture group, and an
    /// [`RuleKind::Association`] pattern needs two.
    ///
    /// # Errors
    /// If a pattern does not compile.
    pub fn from_table(table: &[(RuleKind, &str)]) -> Result<Self, regex::Error> {
        let rules = table
            .iter()
            .map(|(kind, pattern)| {
                Ok(Rule {
                    kind: *kind,
                    pattern: Regex::new(pattern)?,
                })
            })
            .collect::<Result<_, regex::Error>>()?;

        Ok(Self { rules })
    }

    /// The default table
    #[must_use]
    #[allow(clippy::expect_used, reason = "constant patterns")]
    pub fn standard() -> Self {
        Self::from_table(&RULE_TABLE).expect("valid rule table")
    }

    pub fn kinds(&self) -> impl Iterator<Item = RuleKind> + '_ {
        self.rules.iter().map(|rule| rule.kind)
    }

    #[must_use]
    pub fn classify<'a>(&self, content: &'a str) -> Classification<'a> {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(content))
            .unwrap_or(Classification::Unmatched)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::standard()
    }
}

struct StatusRule {
    needle: &'static str,
    status: MessageStatus,
    /// While the record has this status the rule still claims the line but
    /// leaves the status alone
    unless: Option<MessageStatus>,
}

const STATUS_RULES: [StatusRule; 5] = [
    StatusRule {
        needle: "quarantine",
        status: MessageStatus::Quarantined,
        unless: None,
    },
    StatusRule {
        needle: "status=sent",
        status: MessageStatus::Sent,
        unless: None,
    },
    // The filter's acknowledgement arrives after a quarantine decision too.
    StatusRule {
        needle: "250 2.5.0 OK",
        status: MessageStatus::Sent,
        unless: Some(MessageStatus::Quarantined),
    },
    StatusRule {
        needle: "status=deferred",
        status: MessageStatus::Deferred,
        unless: None,
    },
    StatusRule {
        needle: "status=bounced",
        status: MessageStatus::Bounced,
        unless: None,
    },
];

/// Status a line moves a queue record to, if any.
///
/// The first rule whose needle occurs in the line decides, even when its
/// `unless` status blocks the change; later rules are not consulted.
#[must_use]
pub fn status_from_line(content: &str, current: MessageStatus) -> Option<MessageStatus> {
    STATUS_RULES
        .iter()
        .find(|rule| content.contains(rule.needle))
        .filter(|rule| rule.unless != Some(current))
        .map(|rule| rule.status)
}
