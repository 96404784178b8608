//! MIME decoding.
//!
//! A decoder turns a raw RFC 5322 payload into a subject, at most one plain
//! and one HTML body, and a list of attachments. Decoding is synchronous and
//! CPU-bound; the ingestion pipeline runs it off the async executor.

use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use super::types::DEFAULT_CONTENT_TYPE;
use crate::{EphemailError, Result};

/// A decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttachment {
    /// Declared filename, possibly empty.
    pub filename: String,
    /// Declared content type.
    pub content_type: String,
    /// Transfer-decoded payload.
    pub data: Vec<u8>,
}

/// A decoded message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMail {
    /// Subject header, empty if absent.
    pub subject: String,
    /// First plain-text body part.
    pub text: String,
    /// First HTML body part.
    pub html: String,
    /// Attachments in the order they appear.
    pub attachments: Vec<DecodedAttachment>,
}

/// Decodes raw MIME payloads.
pub trait MimeDecoder: Send + Sync {
    /// Decode `raw` into its parts.
    fn decode(&self, raw: &[u8]) -> Result<DecodedMail>;
}

/// Decoder backed by `mailparse`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailparseDecoder;

impl MimeDecoder for MailparseDecoder {
    fn decode(&self, raw: &[u8]) -> Result<DecodedMail> {
        let parsed = mailparse::parse_mail(raw).map_err(decode_error)?;

        let mut mail = DecodedMail {
            subject: parsed
                .headers
                .get_first_value("Subject")
                .unwrap_or_default(),
            ..DecodedMail::default()
        };

        let mut seen_text = false;
        let mut seen_html = false;
        walk(&parsed, &mut mail, &mut seen_text, &mut seen_html)?;
        Ok(mail)
    }
}

fn walk(
    part: &ParsedMail<'_>,
    mail: &mut DecodedMail,
    seen_text: &mut bool,
    seen_html: &mut bool,
) -> Result<()> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            walk(sub, mail, seen_text, seen_html)?;
        }
        return Ok(());
    }

    let mimetype = part.ctype.mimetype.to_ascii_lowercase();
    let filename = attachment_filename(part);
    let is_attachment = filename.is_some()
        || part.get_content_disposition().disposition == DispositionType::Attachment;

    if !is_attachment {
        match mimetype.as_str() {
            "text/plain" => {
                if !*seen_text {
                    mail.text = part.get_body().map_err(decode_error)?;
                    *seen_text = true;
                }
                return Ok(());
            }
            "text/html" => {
                if !*seen_html {
                    mail.html = part.get_body().map_err(decode_error)?;
                    *seen_html = true;
                }
                return Ok(());
            }
            _ => {}
        }
    }

    let content_type = if mimetype.is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        mimetype
    };

    mail.attachments.push(DecodedAttachment {
        filename: filename.unwrap_or_default(),
        content_type,
        data: part.get_body_raw().map_err(decode_error)?,
    });
    Ok(())
}

fn attachment_filename(part: &ParsedMail<'_>) -> Option<String> {
    part.get_content_disposition()
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned()
}

fn decode_error(e: mailparse::MailParseError) -> EphemailError {
    EphemailError::Decode(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &str) -> Result<DecodedMail> {
        MailparseDecoder.decode(raw.replace('\n', "\r\n").as_bytes())
    }

    #[test]
    fn test_plain_message() {
        let mail = decode(
            "From: a@sender.test\n\
             Subject: Hello there\n\
             \n\
             Just text.\n",
        )
        .unwrap();

        assert_eq!(mail.subject, "Hello there");
        assert_eq!(mail.text.trim_end(), "Just text.");
        assert!(mail.html.is_empty());
        assert!(mail.attachments.is_empty());
    }

    #[test]
    fn test_missing_subject_is_empty() {
        let mail = decode("From: a@sender.test\n\nbody\n").unwrap();
        assert_eq!(mail.subject, "");
    }

    #[test]
    fn test_encoded_subject() {
        let mail = decode("Subject: =?UTF-8?B?w6l0w6k=?=\n\nbody\n").unwrap();
        assert_eq!(mail.subject, "été");
    }

    #[test]
    fn test_alternative_with_attachment() {
        let mail = decode(
            "Subject: Report\n\
             MIME-Version: 1.0\n\
             Content-Type: multipart/mixed; boundary=\"outer\"\n\
             \n\
             --outer\n\
             Content-Type: multipart/alternative; boundary=\"inner\"\n\
             \n\
             --inner\n\
             Content-Type: text/plain; charset=utf-8\n\
             \n\
             plain body\n\
             --inner\n\
             Content-Type: text/html; charset=utf-8\n\
             \n\
             <p>html body</p>\n\
             --inner--\n\
             --outer\n\
             Content-Type: text/csv; name=\"data.csv\"\n\
             Content-Disposition: attachment; filename=\"data.csv\"\n\
             Content-Transfer-Encoding: base64\n\
             \n\
             YSxiCjEsMgo=\n\
             --outer--\n",
        )
        .unwrap();

        assert_eq!(mail.subject, "Report");
        assert_eq!(mail.text.trim_end(), "plain body");
        assert_eq!(mail.html.trim_end(), "<p>html body</p>");
        assert_eq!(mail.attachments.len(), 1);
        let attachment = &mail.attachments[0];
        assert_eq!(attachment.filename, "data.csv");
        assert_eq!(attachment.content_type, "text/csv");
        assert_eq!(attachment.data, b"a,b\n1,2\n");
    }

    #[test]
    fn test_text_part_with_filename_is_attachment() {
        let mail = decode(
            "Content-Type: multipart/mixed; boundary=\"b\"\n\
             \n\
             --b\n\
             Content-Type: text/plain\n\
             \n\
             body\n\
             --b\n\
             Content-Type: text/plain; name=\"notes.txt\"\n\
             \n\
             notes\n\
             --b--\n",
        )
        .unwrap();

        assert_eq!(mail.text.trim_end(), "body");
        assert_eq!(mail.attachments.len(), 1);
        assert_eq!(mail.attachments[0].filename, "notes.txt");
        assert_eq!(mail.attachments[0].content_type, "text/plain");
    }

    #[test]
    fn test_attachment_without_filename() {
        let mail = decode(
            "Content-Type: multipart/mixed; boundary=\"b\"\n\
             \n\
             --b\n\
             Content-Type: text/plain\n\
             \n\
             body\n\
             --b\n\
             Content-Type: application/pdf\n\
             Content-Disposition: attachment\n\
             \n\
             %PDF\n\
             --b--\n",
        )
        .unwrap();

        assert_eq!(mail.attachments.len(), 1);
        assert_eq!(mail.attachments[0].filename, "");
        assert_eq!(mail.attachments[0].content_type, "application/pdf");
    }

    #[test]
    fn test_invalid_base64_is_decode_error() {
        let err = decode(
            "Content-Type: text/plain\n\
             Content-Transfer-Encoding: base64\n\
             \n\
             *&^%\n",
        )
        .unwrap_err();

        assert!(matches!(err, EphemailError::Decode(_)));
    }
}
