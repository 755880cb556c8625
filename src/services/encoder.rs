use crate::models::{Domain, RatingRecord, UpcomingEvent};

/// Number of features per encoded row
pub const FEATURE_COUNT: usize = 5;

/// A numeric feature row: `[category, free, start_hour, end_hour, is_private]`
pub type FeatureRow = Vec<f64>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {domain} category: {label}")]
pub struct EncodingError {
    pub domain: Domain,
    pub label: String,
}

/// Maps a category label to its code within the domain's vocabulary
pub fn encode_category(domain: Domain, label: &str) -> Result<usize, EncodingError> {
    domain
        .categories()
        .iter()
        .position(|known| *known == label)
        .ok_or_else(|| EncodingError {
            domain,
            label: label.to_string(),
        })
}

/// `true` encodes as 1, `false` as 0.
///
/// Applied to the `free` column, so free events encode as 1 and priced events as 0.
pub fn encode_flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Encodes rows of one domain
///
/// The same encoder handles training rows and rows to be scored so both
/// paths share one mapping.
#[derive(Debug, Clone, Copy)]
pub struct FeatureEncoder {
    domain: Domain,
}

impl FeatureEncoder {
    pub fn new(domain: Domain) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    fn encode_fields(
        &self,
        category: &str,
        free: bool,
        start_hour: i32,
        end_hour: i32,
        is_private: bool,
    ) -> Result<FeatureRow, EncodingError> {
        Ok(vec![
            encode_category(self.domain, category)? as f64,
            encode_flag(free),
            f64::from(start_hour),
            f64::from(end_hour),
            encode_flag(is_private),
        ])
    }

    /// Encodes a rating into its feature row and label
    pub fn encode_rating(&self, rating: &RatingRecord) -> Result<(FeatureRow, i32), EncodingError> {
        let row = self.encode_fields(
            &rating.category,
            rating.free,
            rating.start_hour,
            rating.end_hour,
            rating.is_private,
        )?;
        Ok((row, rating.rate))
    }

    pub fn encode_event(&self, event: &UpcomingEvent) -> Result<FeatureRow, EncodingError> {
        self.encode_fields(
            &event.category,
            event.free,
            event.start_hour,
            event.end_hour,
            event.is_private,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_label_gets_a_unique_code() {
        for domain in Domain::ALL {
            let codes: HashSet<usize> = domain
                .categories()
                .iter()
                .map(|label| encode_category(domain, label).unwrap())
                .collect();
            assert_eq!(codes.len(), domain.categories().len(), "{domain}");
        }
    }

    #[test]
    fn test_category_codes_follow_vocabulary_order() {
        assert_eq!(encode_category(Domain::Musical, "Concert"), Ok(0));
        assert_eq!(encode_category(Domain::Musical, "Festival"), Ok(1));
        assert_eq!(encode_category(Domain::Sport, "Jogging"), Ok(3));
        assert_eq!(encode_category(Domain::Nature, "Hiking"), Ok(1));
        assert_eq!(encode_category(Domain::StagePlay, "Theatre"), Ok(0));
    }

    #[test]
    fn test_unknown_category_is_an_error() {
        let err = encode_category(Domain::Musical, "Football").unwrap_err();
        assert_eq!(err.domain, Domain::Musical);
        assert_eq!(err.label, "Football");
        assert_eq!(err.to_string(), "Unknown Musical category: Football");
    }

    #[test]
    fn test_free_events_encode_as_one() {
        assert_eq!(encode_flag(true), 1.0);
        assert_eq!(encode_flag(false), 0.0);
    }

    #[test]
    fn test_rating_and_event_share_encoding() {
        let encoder = FeatureEncoder::new(Domain::Sport);
        let rating = RatingRecord {
            category: "Volleyball".to_string(),
            free: true,
            start_hour: 9,
            end_hour: 11,
            is_private: true,
            rate: 3,
        };
        let event = UpcomingEvent {
            id: 1,
            event_type: "Sport".to_string(),
            category: "Volleyball".to_string(),
            free: true,
            start_hour: 9,
            end_hour: 11,
            is_private: true,
        };

        let (row, label) = encoder.encode_rating(&rating).unwrap();
        assert_eq!(row, vec![2.0, 1.0, 9.0, 11.0, 1.0]);
        assert_eq!(row.len(), FEATURE_COUNT);
        assert_eq!(label, 3);
        assert_eq!(encoder.encode_event(&event).unwrap(), row);
    }

    #[test]
    fn test_event_with_foreign_category_fails() {
        let encoder = FeatureEncoder::new(Domain::Nature);
        let event = UpcomingEvent {
            id: 1,
            event_type: "Nature".to_string(),
            category: "Theatre".to_string(),
            free: false,
            start_hour: 9,
            end_hour: 11,
            is_private: false,
        };

        assert!(encoder.encode_event(&event).is_err());
    }
}
