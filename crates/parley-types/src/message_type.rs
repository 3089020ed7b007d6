use serde::{Deserialize, Serialize};

/// Archive/rendering code derived from which parts a message carries.
///
/// The numbering is a fixed legacy enumeration, not a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MessageType {
    Empty = 0,
    Text = 1,
    Media = 2,
    File = 3,
    MediaFile = 4,
    TextMedia = 5,
    TextFile = 6,
    TextMediaFile = 7,
}

/// Map presence of body/media/file to its message type.
pub fn classify(body: bool, media: bool, file: bool) -> MessageType {
    match (body, media, file) {
        (true, true, true) => MessageType::TextMediaFile,
        (true, false, true) => MessageType::TextFile,
        (true, true, false) => MessageType::TextMedia,
        (false, true, true) => MessageType::MediaFile,
        (false, false, true) => MessageType::File,
        (false, true, false) => MessageType::Media,
        (true, false, false) => MessageType::Text,
        (false, false, false) => MessageType::Empty,
    }
}

impl MessageType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Empty,
            1 => Self::Text,
            2 => Self::Media,
            3 => Self::File,
            4 => Self::MediaFile,
            5 => Self::TextMedia,
            6 => Self::TextFile,
            7 => Self::TextMediaFile,
            other => return Err(format!("unknown message type code {}", other)),
        })
    }
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> Self {
        t.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_legacy_table() {
        let table = [
            ((true, true, true), 7),
            ((true, false, true), 6),
            ((true, true, false), 5),
            ((false, true, true), 4),
            ((false, false, true), 3),
            ((false, true, false), 2),
            ((true, false, false), 1),
            ((false, false, false), 0),
        ];
        for ((body, media, file), code) in table {
            assert_eq!(
                classify(body, media, file).code(),
                code,
                "body={} media={} file={}",
                body,
                media,
                file
            );
        }
    }

    #[test]
    fn codes_convert_back() {
        for code in 0u8..=7 {
            assert_eq!(MessageType::try_from(code).unwrap().code(), code);
        }
        assert!(MessageType::try_from(8).is_err());
    }

    #[test]
    fn serializes_as_integer() {
        assert_eq!(serde_json::to_string(&MessageType::TextFile).unwrap(), "6");
        let t: MessageType = serde_json::from_str("2").unwrap();
        assert_eq!(t, MessageType::Media);
    }
}
