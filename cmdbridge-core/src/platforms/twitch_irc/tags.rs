//! src/platforms/twitch_irc/tags.rs
//!
//! Turns one tagged chat line into a [`ChatUser`] plus the message body.
//!
//! Server lines look like
//! `@tag1=val1;...;tagN=valN :prefix PRIVMSG #channel :body`.
//! The tag block ends at the first space; tag values never contain spaces but
//! may contain `:` (emote ranges, flags), so the body split only starts after
//! the tag block.

use cmdbridge_common::Error;
use cmdbridge_common::models::ChatUser;

/// Zero-based index of the field that carries either `emotes=` or the
/// `emote-only=1` flag.
const EMOTE_FIELD: usize = 5;
const EMOTE_ONLY_FLAG: &str = "emote-only=1";

/// One `key=value` pair from the tag block. A bare `key` has an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    /// The key with hyphens removed (`badge-info` -> `badgeinfo`).
    pub fn field_name(&self) -> String {
        self.key.replace('-', "")
    }

    /// All-digit values are numbers; everything else is text.
    pub fn is_numeric(&self) -> bool {
        !self.value.is_empty() && self.value.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn as_number(&self) -> Option<u64> {
        if self.is_numeric() {
            self.value.parse().ok()
        } else {
            None
        }
    }

    fn as_flag(&self) -> bool {
        self.as_number().is_some_and(|n| n != 0)
    }
}

/// A fully parsed chat line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChatLine {
    pub user: ChatUser,
    pub body: String,
    /// Tags after emote normalization, in wire order.
    pub tags: Vec<Tag>,
    /// `nick!user@host`, without the leading `:`.
    pub prefix: String,
    /// Command and middle params, e.g. `PRIVMSG #danqzq`.
    pub middle: String,
}

impl ParsedChatLine {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Re-renders the normalized line. Parsing the result yields `self` again.
    pub fn to_line(&self) -> String {
        let tags = self
            .tags
            .iter()
            .map(|t| format!("{}={}", t.key, t.value))
            .collect::<Vec<_>>()
            .join(";");
        format!("@{} :{} {} :{}", tags, self.prefix, self.middle, self.body)
    }
}

/// Parses a tag-bearing line into its sender and body.
pub fn parse_tagged_line(line: &str) -> Result<ParsedChatLine, Error> {
    let line = line.trim_end_matches(['\r', '\n']);

    let rest = line
        .strip_prefix('@')
        .ok_or_else(|| malformed("missing tag block", line))?;
    let (tag_block, after_tags) = rest
        .split_once(' ')
        .ok_or_else(|| malformed("missing prefix", line))?;

    let after_prefix_marker = after_tags
        .trim_start_matches(' ')
        .strip_prefix(':')
        .ok_or_else(|| malformed("missing prefix", line))?;
    let (prefix, middle_and_body) = after_prefix_marker
        .split_once(' ')
        .ok_or_else(|| malformed("missing body", line))?;

    let (middle, body) = split_body(middle_and_body).ok_or_else(|| malformed("missing body", line))?;

    let normalized = normalize_emote_fields(tag_block);
    let tags = split_tags(&normalized);
    let user = build_user(&tags);

    Ok(ParsedChatLine {
        user,
        body: body.to_string(),
        tags,
        prefix: prefix.to_string(),
        middle: middle.to_string(),
    })
}

/// `PRIVMSG #chan :body` -> (`PRIVMSG #chan`, `body`)
fn split_body(s: &str) -> Option<(&str, &str)> {
    if let Some(body) = s.strip_prefix(':') {
        return Some(("", body));
    }
    s.split_once(" :").map(|(m, b)| (m.trim_end(), b))
}

fn malformed(reason: &str, line: &str) -> Error {
    Error::MalformedLine(format!("{reason}: {line}"))
}

/// Fixes up the server's emote quirk before the generic split.
///
/// On emote-only messages the 6th field is `emote-only=1` and the emote
/// payload moves to the 7th; the two are swapped back so that `emotes=` sits
/// where it does on every other message. Any other 6th field passes through.
/// Applying this twice is the same as applying it once.
pub fn normalize_emote_fields(tag_block: &str) -> String {
    let mut fields: Vec<&str> = tag_block.split(';').collect();
    if fields.get(EMOTE_FIELD) == Some(&EMOTE_ONLY_FLAG)
        && fields
            .get(EMOTE_FIELD + 1)
            .is_some_and(|f| f.starts_with("emotes="))
    {
        fields.swap(EMOTE_FIELD, EMOTE_FIELD + 1);
    }
    fields.join(";")
}

/// Splits a tag block (without `@`) into pairs. Empty fields from stray
/// separators are skipped; a pair without `=` keeps an empty value.
pub fn split_tags(tag_block: &str) -> Vec<Tag> {
    tag_block
        .split(';')
        .filter(|f| !f.is_empty())
        .map(|field| match field.split_once('=') {
            Some((k, v)) => Tag {
                key: k.to_string(),
                value: v.to_string(),
            },
            None => Tag {
                key: field.to_string(),
                value: String::new(),
            },
        })
        .collect()
}

fn build_user(tags: &[Tag]) -> ChatUser {
    let mut user = ChatUser::default();
    for tag in tags {
        if tag.value.is_empty() {
            continue;
        }
        match tag.field_name().as_str() {
            "badgeinfo" => user.badge_info = tag.value.clone(),
            "badges" => user.badges = tag.value.clone(),
            "bits" => user.bits = tag.value.clone(),
            "color" => user.color = Some(tag.value.clone()),
            "displayname" => user.display_name = tag.value.clone(),
            "emotes" => user.emotes = tag.value.clone(),
            "emoteonly" => user.emote_only = tag.as_flag(),
            "flags" => user.flags = tag.value.clone(),
            "id" => user.id = tag.value.clone(),
            "roomid" => user.room_id = tag.as_number(),
            "mod" => user.moderator = tag.as_flag(),
            "subscriber" => user.subscriber = tag.as_flag(),
            "turbo" => user.turbo = tag.as_flag(),
            "tmisentts" => user.tmi_sent_ts = tag.as_number(),
            "userid" => user.user_id = tag.as_number(),
            "usertype" => user.user_type = tag.value.clone(),
            "clientnonce" => user.client_nonce = tag.value.clone(),
            _ => {}
        }
    }
    user
}
