use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    /// Anything other than +1 or -1 is not a vote.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Up),
            -1 => Some(Self::Down),
            _ => None,
        }
    }

    pub fn from_db(value: i16) -> Option<Self> {
        Self::from_i64(i64::from(value))
    }

    pub fn as_db(self) -> i16 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

impl From<VoteValue> for i16 {
    fn from(value: VoteValue) -> Self {
        value.as_db()
    }
}

impl TryFrom<i16> for VoteValue {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::from_db(value).ok_or_else(|| format!("invalid vote value: {}", value))
    }
}

/// The single row change a vote request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteAction {
    Create,
    Flip,
    Retract,
}

impl VoteAction {
    pub fn decide(existing: Option<VoteValue>, requested: VoteValue) -> Self {
        match existing {
            None => Self::Create,
            Some(current) if current == requested => Self::Retract,
            Some(_) => Self::Flip,
        }
    }

    /// Vote state for the pair after this action has been applied.
    pub fn resulting(self, requested: VoteValue) -> Option<VoteValue> {
        match self {
            Self::Create | Self::Flip => Some(requested),
            Self::Retract => None,
        }
    }
}
