//! SMTP replies.

use std::fmt;

/// A reply sent to the client: a status code and one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    /// Single-line reply.
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Multi-line reply. An empty list renders as a single empty line.
    pub fn multiline<I, S>(code: u16, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        Self { code, lines }
    }

    /// Wire form, CRLF-terminated.
    pub fn to_wire(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// 250, command accepted.
    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    /// 221, reply to QUIT.
    pub fn closing(hostname: &str) -> Self {
        Self::new(221, format!("{hostname} closing connection"))
    }

    /// 354, go ahead with the message body.
    pub fn start_data() -> Self {
        Self::new(354, "End data with <CR><LF>.<CR><LF>")
    }

    /// 421, the client was idle too long.
    pub fn timeout(hostname: &str) -> Self {
        Self::new(421, format!("{hostname} idle timeout, closing connection"))
    }

    /// 451, the message could not be stored; the sender should retry.
    pub fn storage_failure() -> Self {
        Self::new(451, "Requested action aborted: local error in processing")
    }

    /// 452, only one recipient is accepted per message.
    pub fn too_many_recipients() -> Self {
        Self::new(452, "Too many recipients")
    }

    /// 500, unknown command.
    pub fn unrecognized() -> Self {
        Self::new(500, "Syntax error, command unrecognized")
    }

    /// 501, known command with bad arguments.
    pub fn syntax(text: &str) -> Self {
        Self::new(501, text)
    }

    /// 503, command out of order.
    pub fn bad_sequence() -> Self {
        Self::new(503, "Bad sequence of commands")
    }

    /// 552, message larger than the configured maximum.
    pub fn too_large() -> Self {
        Self::new(552, "Message exceeds fixed maximum message size")
    }

    /// 554, the message could not be parsed.
    pub fn rejected() -> Self {
        Self::new(554, "Transaction failed: message could not be parsed")
    }

    /// 220, the client may begin the TLS handshake.
    pub fn tls_ready() -> Self {
        Self::new(220, "Ready to start TLS")
    }

    /// 454, STARTTLS is not configured or already active.
    pub fn tls_unavailable() -> Self {
        Self::new(454, "TLS not available")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            write!(f, "{}{}{}\r\n", self.code, sep, line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        assert_eq!(Reply::ok().to_string(), "250 OK\r\n");
        assert_eq!(
            Reply::too_many_recipients().to_string(),
            "452 Too many recipients\r\n"
        );
        assert_eq!(
            Reply::tls_unavailable().to_wire(),
            b"454 TLS not available\r\n"
        );
    }

    #[test]
    fn test_multiline() {
        let reply = Reply::multiline(250, ["mx.example.com", "SIZE 1024", "8BITMIME"]);
        assert_eq!(
            reply.to_string(),
            "250-mx.example.com\r\n250-SIZE 1024\r\n250 8BITMIME\r\n"
        );
    }

    #[test]
    fn test_empty_multiline() {
        let reply = Reply::multiline(250, Vec::<String>::new());
        assert_eq!(reply.to_wire(), b"250 \r\n");
    }
}
