mod domain;
mod event;

pub use domain::{Domain, UnknownDomain};
pub use event::{RatingRecord, ScoredEvent, UpcomingEvent};
