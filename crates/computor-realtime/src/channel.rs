//! `"kind:id"` channel names.

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Course(Uuid),
    CourseContent(Uuid),
    SubmissionGroup(Uuid),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelParseError {
    #[error("channel {0:?} is not in \"kind:id\" format")]
    Malformed(String),
    #[error("unknown channel kind {0:?}")]
    UnknownKind(String),
    #[error("invalid channel id: {0}")]
    InvalidId(#[from] uuid::Error),
}

impl FromStr for Channel {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ChannelParseError::Malformed(s.to_string()))?;
        let id = Uuid::parse_str(id)?;
        match kind {
            "course" => Ok(Channel::Course(id)),
            "course_content" => Ok(Channel::CourseContent(id)),
            "submission_group" => Ok(Channel::SubmissionGroup(id)),
            other => Err(ChannelParseError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Course(id) => write!(f, "course:{id}"),
            Channel::CourseContent(id) => write!(f, "course_content:{id}"),
            Channel::SubmissionGroup(id) => write!(f, "submission_group:{id}"),
        }
    }
}

impl Channel {
    pub fn course_id(&self) -> Option<Uuid> {
        match self {
            Channel::Course(id) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = Uuid::new_v4();
        let channel = Channel::SubmissionGroup(id);
        let parsed: Channel = channel.to_string().parse().unwrap();
        assert_eq!(channel, parsed);
    }

    #[test]
    fn rejects_unknown_kind() {
        let id = Uuid::new_v4();
        assert!(format!("workspace:{id}").parse::<Channel>().is_err());
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("no-colon-here".parse::<Channel>().is_err());
    }
}
