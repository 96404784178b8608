//! SMTP command parsing.

/// A parsed SMTP command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// HELO with the client's name.
    Helo(String),
    /// EHLO with the client's name.
    Ehlo(String),
    /// MAIL FROM with the reverse path (brackets removed) and declared size.
    Mail {
        /// Reverse path, empty for the null sender.
        from: String,
        /// Value of the SIZE parameter, if given.
        size: Option<usize>,
    },
    /// RCPT TO with the forward path (brackets removed).
    Rcpt(String),
    /// DATA
    Data,
    /// RSET
    Rset,
    /// NOOP
    Noop,
    /// QUIT
    Quit,
    /// STARTTLS
    StartTls,
    /// VRFY with its argument.
    Vrfy(String),
    /// A known verb with malformed arguments.
    Invalid(&'static str),
    /// Anything else.
    Unknown(String),
}

impl SmtpCommand {
    /// Parse a command line. Trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => match rest {
                "" => SmtpCommand::Invalid("HELO requires a domain"),
                name => SmtpCommand::Helo(name.to_string()),
            },
            "EHLO" => match rest {
                "" => SmtpCommand::Invalid("EHLO requires a domain"),
                name => SmtpCommand::Ehlo(name.to_string()),
            },
            "MAIL" => parse_mail(rest),
            "RCPT" => parse_rcpt(rest),
            "DATA" if rest.is_empty() => SmtpCommand::Data,
            "RSET" if rest.is_empty() => SmtpCommand::Rset,
            "NOOP" => SmtpCommand::Noop,
            "QUIT" if rest.is_empty() => SmtpCommand::Quit,
            "STARTTLS" if rest.is_empty() => SmtpCommand::StartTls,
            "VRFY" => SmtpCommand::Vrfy(rest.to_string()),
            "DATA" | "RSET" | "QUIT" | "STARTTLS" => SmtpCommand::Invalid("Syntax error, no parameters allowed"),
            _ => SmtpCommand::Unknown(verb.to_string()),
        }
    }
}

/// Strip a case-insensitive `prefix` from `s`.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Split `<path> params` into the bracket-less path and the parameter text.
fn split_path(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if let Some(inner) = s.strip_prefix('<') {
        let end = inner.find('>')?;
        Some((inner[..end].trim(), inner[end + 1..].trim()))
    } else {
        match s.split_once(char::is_whitespace) {
            Some((path, params)) => Some((path, params.trim())),
            None => Some((s, "")),
        }
    }
}

fn parse_mail(rest: &str) -> SmtpCommand {
    let Some(args) = strip_prefix_ci(rest, "FROM:") else {
        return SmtpCommand::Invalid("Syntax: MAIL FROM:<address>");
    };
    let Some((from, params)) = split_path(args) else {
        return SmtpCommand::Invalid("Syntax: MAIL FROM:<address>");
    };

    let mut size = None;
    for param in params.split_whitespace() {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        if key.eq_ignore_ascii_case("SIZE") {
            match value.parse::<usize>() {
                Ok(n) => size = Some(n),
                Err(_) => return SmtpCommand::Invalid("Invalid SIZE parameter"),
            }
        }
    }

    SmtpCommand::Mail {
        from: from.to_string(),
        size,
    }
}

fn parse_rcpt(rest: &str) -> SmtpCommand {
    let Some(args) = strip_prefix_ci(rest, "TO:") else {
        return SmtpCommand::Invalid("Syntax: RCPT TO:<address>");
    };
    match split_path(args) {
        Some((to, _)) if !to.is_empty() => SmtpCommand::Rcpt(to.to_string()),
        _ => SmtpCommand::Invalid("Syntax: RCPT TO:<address>"),
    }
}
