//! `parse_reply`: extracts the `<chat>` block (if any) from a raw assistant
//! reply and splits it into tui/gui/mail targets plus attachments (§4.4).
//! Pure function, no I/O.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailReply {
    pub recipient: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub tui: Option<String>,
    pub gui: Option<String>,
    pub mail: Option<MailReply>,
    pub attachments: Vec<String>,
}

fn chat_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<chat>(.*?)</chat>").unwrap())
}

fn tag_re(tag: &str) -> Regex {
    Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).unwrap()
}

fn first_capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack).and_then(|c| c.get(1)).map(|m| m.as_str().trim().to_string())
}

/// Text outside `<chat>` is internal "thought" and never delivered. When
/// several `<chat>` blocks appear, the first wins.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let Some(chat_body) = first_capture(chat_re(), raw) else {
        return ParsedReply::default();
    };

    let tui = first_capture(&tag_re("tui"), &chat_body);
    let gui = first_capture(&tag_re("gui"), &chat_body);
    let mail = first_capture(&tag_re("mail"), &chat_body).and_then(|body| {
        let recipient = first_capture(&tag_re("recipient"), &body)?;
        let title = first_capture(&tag_re("title"), &body).unwrap_or_default();
        let content = first_capture(&tag_re("content"), &body).unwrap_or_default();
        Some(MailReply { recipient, title, content })
    });

    let attachment_re = tag_re("attachment");
    let attachments = attachment_re.captures_iter(&chat_body).map(|c| c[1].trim().to_string()).collect();

    ParsedReply { tui, gui, mail, attachments }
}

/// When the overlay is active and only a `<tui>` reply is present, duplicate
/// it into the gui target so the overlay also sees it (§4.4).
pub fn mirror_tui_to_gui_if_overlay_active(mut reply: ParsedReply, overlay_active: bool) -> ParsedReply {
    if overlay_active && reply.gui.is_none() {
        reply.gui = reply.tui.clone();
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_outside_chat_is_dropped() {
        let raw = "I will click the button now.<chat><tui>Clicking it.</tui></chat>";
        let parsed = parse_reply(raw);
        assert_eq!(parsed.tui.as_deref(), Some("Clicking it."));
    }

    #[test]
    fn no_chat_block_yields_empty_reply() {
        let parsed = parse_reply("just thinking out loud");
        assert_eq!(parsed, ParsedReply::default());
    }

    #[test]
    fn first_chat_block_wins() {
        let raw = "<chat><tui>first</tui></chat> later <chat><tui>second</tui></chat>";
        let parsed = parse_reply(raw);
        assert_eq!(parsed.tui.as_deref(), Some("first"));
    }

    #[test]
    fn mail_without_recipient_is_disabled() {
        let raw = "<chat><mail><title>Hi</title><content>body</content></mail></chat>";
        let parsed = parse_reply(raw);
        assert!(parsed.mail.is_none());
    }

    #[test]
    fn mail_with_full_fields_parses() {
        let raw = "<chat><mail><recipient>a@b.com</recipient><title>Hi</title><content>body</content></mail></chat>";
        let parsed = parse_reply(raw);
        let mail = parsed.mail.unwrap();
        assert_eq!(mail.recipient, "a@b.com");
        assert_eq!(mail.title, "Hi");
        assert_eq!(mail.content, "body");
    }

    #[test]
    fn attachments_collected_in_order() {
        let raw = "<chat><tui>done</tui><attachment>/a.png</attachment><attachment>/b.png</attachment></chat>";
        let parsed = parse_reply(raw);
        assert_eq!(parsed.attachments, vec!["/a.png".to_string(), "/b.png".to_string()]);
    }

    #[test]
    fn tui_mirrors_to_gui_when_overlay_active() {
        let parsed = ParsedReply { tui: Some("hi".into()), ..Default::default() };
        let mirrored = mirror_tui_to_gui_if_overlay_active(parsed, true);
        assert_eq!(mirrored.gui.as_deref(), Some("hi"));
    }
}
