use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Event domain, each with its own category vocabulary and backing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Musical,
    Sport,
    Nature,
    StagePlay,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Musical,
        Domain::Sport,
        Domain::Nature,
        Domain::StagePlay,
    ];

    /// Category labels in encoding order: a label's code is its position here.
    pub fn categories(self) -> &'static [&'static str] {
        match self {
            Domain::Musical => &["Concert", "Festival"],
            Domain::Sport => &["Football", "Basketball", "Volleyball", "Jogging"],
            Domain::Nature => &["Camp", "Hiking"],
            Domain::StagePlay => &["Theatre", "StandUp"],
        }
    }

    /// Table holding this domain's events
    pub fn table(self) -> &'static str {
        match self {
            Domain::Musical => "event_musical",
            Domain::Sport => "event_sport",
            Domain::Nature => "event_nature",
            Domain::StagePlay => "event_stage_play",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Musical => "Musical",
            Domain::Sport => "Sport",
            Domain::Nature => "Nature",
            Domain::StagePlay => "StagePlay",
        }
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an event type names none of the known domains
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown event type: {0}")]
pub struct UnknownDomain(pub String);

impl FromStr for Domain {
    type Err = UnknownDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|domain| domain.as_str() == s)
            .ok_or_else(|| UnknownDomain(s.to_string()))
    }
}
