use std::fmt;

use serde::de;

use super::ValidationError;

/// A validated zone identifier, either `CENTER` (center-level) or `CENTER_ZONE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId {
    center: String,
    zone: Option<String>,
}

impl ZoneId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::InvalidZone(
                "zone ID cannot be empty".into(),
            ));
        }

        let mut parts = raw.splitn(2, '_');
        let center = parts.next().unwrap_or_default().trim().to_uppercase();
        if center.is_empty() {
            return Err(ValidationError::InvalidZone(format!(
                "{raw} has an empty center ID"
            )));
        }

        let zone = parts
            .next()
            .filter(|z| !z.is_empty())
            .map(ToOwned::to_owned);

        Ok(Self { center, zone })
    }

    /// Identifier for a single zone of `center`, as published by the upstream API.
    pub fn for_zone(center: &str, zone: &str) -> Result<Self, ValidationError> {
        Self::parse(&format!("{center}_{zone}"))
    }

    pub fn center(&self) -> &str {
        &self.center
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    pub fn is_center_level(&self) -> bool {
        self.zone.is_none()
    }

    pub fn is_specific_zone(&self) -> bool {
        self.zone.is_some()
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.zone {
            Some(zone) => write!(f, "{}_{}", self.center, zone),
            None => f.write_str(&self.center),
        }
    }
}

impl TryFrom<String> for ZoneId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ZoneId::parse(&value)
    }
}

struct ZoneIdVisitor;

impl de::Visitor<'_> for ZoneIdVisitor {
    type Value = ZoneId;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a zone identifier like `NWAC` or `NWAC_10`")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        ZoneId::parse(value).map_err(de::Error::custom)
    }
}

impl<'de> serde::Deserialize<'de> for ZoneId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(ZoneIdVisitor)
    }
}

impl serde::Serialize for ZoneId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
