//! Seed dataset model for the bloklocaties web application.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp written into `date_created` / `date_modified`.
pub type Timestamp = DateTime<FixedOffset>;

pub const ADMIN_USER_ID: u32 = 1;
pub const DUMMY_USER_ID: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} code {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum UserStatus {
    /// New user without ratings.
    Lurker,
    Newbie,
    Regular,
    PowerUser,
    Admin,
    /// Account used for generated test content.
    Dummy,
}

impl UserStatus {
    pub const ALL: [UserStatus; 6] = [
        UserStatus::Lurker,
        UserStatus::Newbie,
        UserStatus::Regular,
        UserStatus::PowerUser,
        UserStatus::Admin,
        UserStatus::Dummy,
    ];

    pub fn code(self) -> u8 {
        match self {
            UserStatus::Lurker => 1,
            UserStatus::Newbie => 2,
            UserStatus::Regular => 3,
            UserStatus::PowerUser => 4,
            UserStatus::Admin => 5,
            UserStatus::Dummy => 6,
        }
    }
}

impl From<UserStatus> for u8 {
    fn from(value: UserStatus) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for UserStatus {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        UserStatus::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or(UnknownCode {
                kind: "user status",
                code: code.into(),
            })
    }
}

/// Observation kinds known to the web application. The seed only emits
/// `Text`, `Image` and `Link`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ObservationType {
    Text,
    Image,
    TimeOpen,
    TimeClose,
    Wifi,
    Occupancy,
    Power,
    Toilet,
    Water,
    Resto,
    Parking,
    Link,
    Phone,
    Email,
    Reservation,
    Weekend,
}

impl ObservationType {
    pub const ALL: [ObservationType; 16] = [
        ObservationType::Text,
        ObservationType::Image,
        ObservationType::TimeOpen,
        ObservationType::TimeClose,
        ObservationType::Wifi,
        ObservationType::Occupancy,
        ObservationType::Power,
        ObservationType::Toilet,
        ObservationType::Water,
        ObservationType::Resto,
        ObservationType::Parking,
        ObservationType::Link,
        ObservationType::Phone,
        ObservationType::Email,
        ObservationType::Reservation,
        ObservationType::Weekend,
    ];

    pub fn code(self) -> u8 {
        match self {
            ObservationType::Text => 1,
            ObservationType::Image => 2,
            ObservationType::TimeOpen => 3,
            ObservationType::TimeClose => 4,
            ObservationType::Wifi => 5,
            ObservationType::Occupancy => 6,
            ObservationType::Power => 7,
            ObservationType::Toilet => 8,
            ObservationType::Water => 9,
            ObservationType::Resto => 10,
            ObservationType::Parking => 11,
            ObservationType::Link => 12,
            ObservationType::Phone => 13,
            ObservationType::Email => 14,
            ObservationType::Reservation => 15,
            ObservationType::Weekend => 16,
        }
    }
}

impl From<ObservationType> for u8 {
    fn from(value: ObservationType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for ObservationType {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        ObservationType::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(UnknownCode {
                kind: "observation type",
                code: code.into(),
            })
    }
}

/// Direction of a single vote. Stored as `0` (down) or `1` (up); the
/// aggregate on the rated entity is `-1`, `0` or `+1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RatingDirection {
    Downvote,
    Upvote,
}

impl RatingDirection {
    pub fn code(self) -> u8 {
        match self {
            RatingDirection::Downvote => 0,
            RatingDirection::Upvote => 1,
        }
    }

    pub fn score(self) -> i8 {
        match self {
            RatingDirection::Downvote => -1,
            RatingDirection::Upvote => 1,
        }
    }

    /// Aggregate rating for an entity that received at most one vote.
    pub fn aggregate(vote: Option<RatingDirection>) -> i8 {
        vote.map(RatingDirection::score).unwrap_or(0)
    }
}

impl From<RatingDirection> for u8 {
    fn from(value: RatingDirection) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for RatingDirection {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RatingDirection::Downvote),
            1 => Ok(RatingDirection::Upvote),
            other => Err(UnknownCode {
                kind: "rating direction",
                code: other.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub userstatus: UserStatus,
    pub username: String,
    pub password: String,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
}

/// A study space taken from the open-data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub fk_user: u32,
    pub record_id: String,
    pub name: String,
    pub title: String,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
    pub link: String,
    pub street: String,
    pub number: String,
    pub city: String,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: u32,
    pub reserved: u32,
    pub loc_rating: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub fk_user: u32,
    pub fk_location: u32,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
    pub obs_rating: i8,
    pub obs_type: ObservationType,
    pub obs_content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRating {
    pub fk_user: u32,
    pub fk_location: u32,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
    pub rating: RatingDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRating {
    pub fk_user: u32,
    pub fk_observation: u32,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
    pub rating: RatingDirection,
}

/// Entity fields paired with their primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyed<T> {
    pub pk: u32,
    pub fields: T,
}

impl<T> Keyed<T> {
    pub fn new(pk: u32, fields: T) -> Self {
        Self { pk, fields }
    }
}

/// One entry of the bulk-load fixture: `{"model": .., "pk": .., "fields": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model")]
pub enum SeedRecord {
    #[serde(rename = "home.User")]
    User(Keyed<User>),
    #[serde(rename = "home.Location")]
    Location(Keyed<Location>),
    #[serde(rename = "home.Observation")]
    Observation(Keyed<Observation>),
    #[serde(rename = "home.RatingLoc")]
    LocationRating(Keyed<LocationRating>),
    #[serde(rename = "home.RatingObs")]
    ObservationRating(Keyed<ObservationRating>),
}

impl SeedRecord {
    pub fn model(&self) -> &'static str {
        match self {
            SeedRecord::User(_) => "home.User",
            SeedRecord::Location(_) => "home.Location",
            SeedRecord::Observation(_) => "home.Observation",
            SeedRecord::LocationRating(_) => "home.RatingLoc",
            SeedRecord::ObservationRating(_) => "home.RatingObs",
        }
    }

    pub fn pk(&self) -> u32 {
        match self {
            SeedRecord::User(k) => k.pk,
            SeedRecord::Location(k) => k.pk,
            SeedRecord::Observation(k) => k.pk,
            SeedRecord::LocationRating(k) => k.pk,
            SeedRecord::ObservationRating(k) => k.pk,
        }
    }
}

/// Everything generated by one run, grouped per entity type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedDataset {
    pub users: Vec<Keyed<User>>,
    pub locations: Vec<Keyed<Location>>,
    pub observations: Vec<Keyed<Observation>>,
    pub location_ratings: Vec<Keyed<LocationRating>>,
    pub observation_ratings: Vec<Keyed<ObservationRating>>,
}

impl SeedDataset {
    pub fn len(&self) -> usize {
        self.users.len()
            + self.locations.len()
            + self.observations.len()
            + self.location_ratings.len()
            + self.observation_ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the dataset in load order: users, locations, observations,
    /// location ratings, observation ratings.
    pub fn into_records(self) -> Vec<SeedRecord> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.users.into_iter().map(SeedRecord::User));
        out.extend(self.locations.into_iter().map(SeedRecord::Location));
        out.extend(self.observations.into_iter().map(SeedRecord::Observation));
        out.extend(self.location_ratings.into_iter().map(SeedRecord::LocationRating));
        out.extend(
            self.observation_ratings
                .into_iter()
                .map(SeedRecord::ObservationRating),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> Timestamp {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 17, 14, 3, 9)
            .single()
            .unwrap()
    }

    fn sample_dataset() -> SeedDataset {
        SeedDataset {
            users: vec![Keyed::new(
                ADMIN_USER_ID,
                User {
                    userstatus: UserStatus::Admin,
                    username: "test_admin".into(),
                    password: "admin123".into(),
                    date_created: ts(),
                    date_modified: ts(),
                },
            )],
            locations: vec![Keyed::new(
                1,
                Location {
                    fk_user: ADMIN_USER_ID,
                    record_id: "abc123".into(),
                    name: "De Krook".into(),
                    title: "Bibliotheek De Krook".into(),
                    date_created: ts(),
                    date_modified: ts(),
                    link: "https://dekrook.be".into(),
                    street: "Miriam Makebaplein".into(),
                    number: "1".into(),
                    city: "Gent".into(),
                    postal_code: "9000".into(),
                    latitude: 51.048_141_2,
                    longitude: 3.727_486_7,
                    capacity: 120,
                    reserved: 37,
                    loc_rating: -1,
                },
            )],
            observations: vec![Keyed::new(
                1,
                Observation {
                    fk_user: DUMMY_USER_ID,
                    fk_location: 1,
                    date_created: ts(),
                    date_modified: ts(),
                    obs_rating: 0,
                    obs_type: ObservationType::Text,
                    obs_content: "hello".into(),
                },
            )],
            location_ratings: vec![Keyed::new(
                1,
                LocationRating {
                    fk_user: DUMMY_USER_ID,
                    fk_location: 1,
                    date_created: ts(),
                    date_modified: ts(),
                    rating: RatingDirection::Downvote,
                },
            )],
            observation_ratings: vec![],
        }
    }

    #[test]
    fn enumerated_codes_match_application_tables() {
        assert_eq!(UserStatus::Admin.code(), 5);
        assert_eq!(UserStatus::Dummy.code(), 6);
        assert_eq!(ObservationType::Text.code(), 1);
        assert_eq!(ObservationType::Image.code(), 2);
        assert_eq!(ObservationType::Link.code(), 12);
        assert_eq!(ObservationType::Weekend.code(), 16);
        for ty in ObservationType::ALL {
            assert_eq!(ObservationType::try_from(ty.code()), Ok(ty));
        }
        assert!(ObservationType::try_from(0).is_err());
        assert!(ObservationType::try_from(17).is_err());
        assert_eq!(RatingDirection::try_from(0), Ok(RatingDirection::Downvote));
        assert_eq!(RatingDirection::try_from(1), Ok(RatingDirection::Upvote));
        assert!(RatingDirection::try_from(2).is_err());
    }

    #[test]
    fn aggregate_rating_defaults_to_zero() {
        assert_eq!(RatingDirection::aggregate(None), 0);
        assert_eq!(RatingDirection::aggregate(Some(RatingDirection::Upvote)), 1);
        assert_eq!(RatingDirection::aggregate(Some(RatingDirection::Downvote)), -1);
    }

    #[test]
    fn records_serialize_as_model_pk_fields() {
        let records = sample_dataset().into_records();
        let value = serde_json::to_value(&records).unwrap();
        let first = &value[0];
        assert_eq!(first["model"], "home.User");
        assert_eq!(first["pk"], 1);
        assert_eq!(first["fields"]["userstatus"], 5);
        assert_eq!(first["fields"]["date_created"], "2026-10-17T14:03:09+02:00");

        let location = &value[1];
        assert_eq!(location["model"], "home.Location");
        assert_eq!(location["fields"]["postal_code"], "9000");
        assert_eq!(location["fields"]["loc_rating"], -1);

        assert_eq!(value[2]["fields"]["obs_type"], 1);
        assert_eq!(value[3]["model"], "home.RatingLoc");
        assert_eq!(value[3]["fields"]["rating"], 0);
    }

    #[test]
    fn records_keep_load_order_and_parse_back() {
        let records = sample_dataset().into_records();
        let models: Vec<_> = records.iter().map(SeedRecord::model).collect();
        assert_eq!(
            models,
            vec!["home.User", "home.Location", "home.Observation", "home.RatingLoc"]
        );

        let text = serde_json::to_string_pretty(&records).unwrap();
        let parsed: Vec<SeedRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, records);
        assert_eq!(serde_json::to_string_pretty(&parsed).unwrap(), text);
    }
}
