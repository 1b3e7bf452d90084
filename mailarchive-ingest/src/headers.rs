use std::sync::LazyLock;

use mailparse::{
    DispositionType, MailAddr, MailHeaderMap, MailParseError, ParsedMail, addrparse_header,
};
use regex::Regex;

#[allow(clippy::expect_used, reason = "constant pattern")]
static SPAM_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Spam detection results:\s+(\d+)").expect("valid regex"));

#[allow(clippy::expect_used, reason = "constant pattern")]
static RECEIVED_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"from (\S+) \(.*\[([0-9A-Fa-f.:]+)\]\)").expect("valid regex")
});

#[allow(clippy::expect_used, reason = "constant pattern")]
static FOLDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// What the archive keeps from a message's headers and MIME structure
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderSummary {
    /// `Message-ID` without angle brackets, empty when absent
    pub message_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: String,
    pub has_plain_text: bool,
    pub has_html: bool,
    pub has_attachments: bool,
    pub spam_score: u32,
    /// `"<host> (<ip>)"` of the last matching `Received` header
    pub source: Option<String>,
}

/// Parse a raw message and pull out the fields that get archived.
///
/// `spam_header` names the header carrying the spam filter verdict.
///
/// # Errors
///
/// Returns the parser's error if the message is malformed.
pub fn summarise(data: &[u8], spam_header: &str) -> Result<HeaderSummary, MailParseError> {
    check_header_block(data)?;
    let mail = mailparse::parse_mail(data)?;
    let headers = &mail.headers;

    let mut summary = HeaderSummary {
        message_id: headers
            .get_first_value("Message-ID")
            .map(|id| strip_message_id(&id))
            .unwrap_or_default(),
        from: first_address(&mail, "From"),
        to: first_address(&mail, "To"),
        subject: headers.get_first_value("Subject").unwrap_or_default(),
        spam_score: headers
            .get_first_value(spam_header)
            .map_or(0, |value| spam_score(&value)),
        source: headers
            .get_all_values("Received")
            .iter()
            .filter_map(|value| received_source(value))
            .last(),
        ..HeaderSummary::default()
    };

    inspect_parts(&mail, &mut summary);

    Ok(summary)
}

/// The header block must hold at least one `Name: value` field, and every
/// line in it is either such a field or a folded continuation of one.
fn check_header_block(data: &[u8]) -> Result<(), MailParseError> {
    let mut fields = 0;

    for line in data.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        match line.first().copied() {
            None => break,
            Some(b' ' | b'\t') if fields > 0 => {}
            Some(b' ' | b'\t') => {
                return Err(MailParseError::Generic(
                    "continuation line before the first header",
                ));
            }
            Some(_) => match line.iter().position(|&b| b == b':') {
                Some(colon) if colon > 0 => fields += 1,
                _ => return Err(MailParseError::Generic("header line without a field name")),
            },
        }
    }

    if fields == 0 {
        return Err(MailParseError::Generic("message has no headers"));
    }

    Ok(())
}

fn strip_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

fn first_address(mail: &ParsedMail<'_>, name: &str) -> Option<String> {
    let header = mail.headers.get_first_header(name)?;
    let addresses = addrparse_header(header).ok()?;

    addresses.iter().find_map(|addr| match addr {
        MailAddr::Single(single) => Some(single.addr.clone()),
        MailAddr::Group(group) => group.addrs.first().map(|single| single.addr.clone()),
    })
}

/// Score from a `Spam detection results: N` verdict, 0 if there is none
fn spam_score(value: &str) -> u32 {
    SPAM_SCORE
        .captures(value)
        .and_then(|captures| captures[1].parse().ok())
        .unwrap_or(0)
}

fn received_source(value: &str) -> Option<String> {
    let unfolded = FOLDING.replace_all(value, " ");
    let captures = RECEIVED_FROM.captures(&unfolded)?;

    Some(format!("{} ({})", &captures[1], &captures[2]))
}

fn inspect_parts(part: &ParsedMail<'_>, summary: &mut HeaderSummary) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            inspect_parts(sub, summary);
        }
        return;
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        summary.has_attachments = true;
        return;
    }

    let has_body = part
        .get_body()
        .is_ok_and(|body| !body.trim().is_empty());

    match part.ctype.mimetype.as_str() {
        "text/plain" => summary.has_plain_text |= has_body,
        "text/html" => summary.has_html |= has_body,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_spam_score() {
        assert_eq!(spam_score("Spam detection results:  7 BAYES_50"), 7);
        assert_eq!(spam_score("Spam detection results:\t12"), 12);
        assert_eq!(spam_score("no verdict"), 0);
        assert_eq!(spam_score("Spam detection results: 99999999999999"), 0);
    }

    #[test]
    fn test_received_source() {
        assert_eq!(
            received_source(
                "from mail.example.org (mail.example.org\r\n\t[203.0.113.5]) by mx.local (Postfix)"
            ),
            Some("mail.example.org (203.0.113.5)".to_string())
        );
        assert_eq!(
            received_source("from relay (unknown [2001:db8::1])"),
            Some("relay (2001:db8::1)".to_string())
        );
        assert_eq!(received_source("by localhost with LMTP"), None);
    }

    #[test]
    fn test_strip_message_id() {
        assert_eq!(strip_message_id(" <abc@example.org> "), "abc@example.org");
        assert_eq!(strip_message_id("abc@example.org"), "abc@example.org");
    }

    #[test]
    fn test_header_block_must_hold_fields() {
        assert!(summarise(b"", "X-Spam-Level").is_err());
        assert!(summarise(b"\r\n\r\nbody only", "X-Spam-Level").is_err());
        assert!(summarise(b"not a mail at all", "X-Spam-Level").is_err());
        assert!(summarise(b"\xff\xfe\x00garbage\r\n\r\n", "X-Spam-Level").is_err());
        assert!(summarise(b": no name\r\n\r\nbody", "X-Spam-Level").is_err());
        assert!(summarise(b" folded\r\nSubject: x\r\n\r\n", "X-Spam-Level").is_err());
        assert!(summarise(b"Subject: ok\r\n\r\nno colon needed in the body", "X-Spam-Level").is_ok());
    }

    #[test]
    fn test_folded_header_is_accepted() {
        let raw = b"Subject: a long\r\n subject line\r\n\r\nbody\r\n";

        let summary = summarise(raw, "X-Spam-Level").expect("parse");

        assert!(summary.subject.starts_with("a long"));
    }

    #[test]
    fn test_plain_message_summary() {
        let raw = b"Message-ID: <m1@example.org>\r\n\
From: Alice <alice@example.org>\r\n\
To: bob@example.com\r\n\
Subject: Hello\r\n\
X-Spam-Level: Spam detection results: 3\r\n\
\r\n\
Hi Bob\r\n";

        let summary = summarise(raw, "X-Spam-Level").expect("parse");

        assert_eq!(summary.message_id, "m1@example.org");
        assert_eq!(summary.from.as_deref(), Some("alice@example.org"));
        assert_eq!(summary.to.as_deref(), Some("bob@example.com"));
        assert_eq!(summary.subject, "Hello");
        assert_eq!(summary.spam_score, 3);
        assert!(summary.has_plain_text);
        assert!(!summary.has_html);
        assert!(!summary.has_attachments);
        assert_eq!(summary.source, None);
    }

    #[test]
    fn test_multipart_summary() {
        let raw = b"Subject: Report\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain\r\n\
\r\n\
plain\r\n\
--inner\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
\r\n\
JVBERi0=\r\n\
--outer--\r\n";

        let summary = summarise(raw, "X-Spam-Level").expect("parse");

        assert!(summary.has_plain_text);
        assert!(summary.has_html);
        assert!(summary.has_attachments);
        assert_eq!(summary.message_id, "");
        assert_eq!(summary.from, None);
    }

    #[test]
    fn test_last_received_header_wins() {
        let raw = b"Received: from mx.example.com (mx.example.com [198.51.100.2]) by archive\r\n\
Received: from origin.example.net (origin.example.net [192.0.2.7]) by mx.example.com\r\n\
Subject: hops\r\n\
\r\n\
body\r\n";

        let summary = summarise(raw, "X-Spam-Level").expect("parse");

        assert_eq!(
            summary.source.as_deref(),
            Some("origin.example.net (192.0.2.7)")
        );
    }
}
