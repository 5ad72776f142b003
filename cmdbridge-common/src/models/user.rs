use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and message metadata carried by the tag block of one chat line.
///
/// A fresh value is built for every received message. Fields whose tag was
/// absent or empty keep their default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    /// `badge-info`: finer-grained badge metadata (e.g. `subscriber/45`).
    pub badge_info: String,
    /// `badges`: comma-separated `badge/version` pairs.
    pub badges: String,
    /// `bits`: cheer amount, only on bits messages.
    pub bits: String,
    /// `color`: hex RGB, `None` when the user never set one.
    pub color: Option<String>,
    /// `display-name`
    pub display_name: String,
    /// `emotes`: `id:first-last,first-last/id:first-last`
    pub emotes: String,
    /// `emote-only`
    pub emote_only: bool,
    pub flags: String,
    /// `id`: unique message id.
    pub id: String,
    /// `room-id`: channel id.
    pub room_id: Option<u64>,
    /// `mod`
    pub moderator: bool,
    pub subscriber: bool,
    pub turbo: bool,
    /// `tmi-sent-ts`: server receive time in epoch millis.
    pub tmi_sent_ts: Option<u64>,
    /// `user-id`
    pub user_id: Option<u64>,
    /// `user-type`
    pub user_type: String,
    /// `client-nonce`
    pub client_nonce: String,
}

impl ChatUser {
    /// A user known only by name, used for locally echoed messages.
    pub fn with_display_name(name: &str) -> Self {
        Self {
            display_name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges
            .split(',')
            .filter(|b| !b.is_empty())
            .filter_map(|b| b.split('/').next())
            .any(|name| name == badge)
    }

    pub fn is_broadcaster(&self) -> bool {
        self.has_badge("broadcaster")
    }

    /// `tmi-sent-ts` as a timestamp.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.tmi_sent_ts?).ok()?;
        DateTime::from_timestamp_millis(millis)
    }

    /// Display name decorated with the user's color, for log output.
    pub fn colored_name(&self) -> String {
        match &self.color {
            Some(c) => format!("{} ({})", self.display_name, c),
            None => self.display_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badges_are_matched_by_name() {
        let user = ChatUser {
            badges: "broadcaster/1,subscriber/12".into(),
            ..Default::default()
        };
        assert!(user.is_broadcaster());
        assert!(user.has_badge("subscriber"));
        assert!(!user.has_badge("moderator"));
        assert!(!ChatUser::default().has_badge(""));
    }

    #[test]
    fn colored_name_only_decorates_when_color_present() {
        let mut user = ChatUser::with_display_name("danqzq");
        assert_eq!(user.colored_name(), "danqzq");
        user.color = Some("#1E90FF".into());
        assert_eq!(user.colored_name(), "danqzq (#1E90FF)");
    }

    #[test]
    fn sent_timestamp_is_epoch_millis() {
        let user = ChatUser {
            tmi_sent_ts: Some(1627719386492),
            ..Default::default()
        };
        let at = user.sent_at().unwrap();
        assert_eq!(at.timestamp_millis(), 1627719386492);
        assert_eq!(ChatUser::default().sent_at(), None);
    }
}
