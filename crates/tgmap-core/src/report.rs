use crate::{
    domain::{ChatId, MarkerKey, SenderKey, UserId},
    errors::Error,
    Result,
};

/// One observation of a sender's position.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationReport {
    pub chat_id: ChatId,
    pub sender: SenderKey,
    pub latitude: f64,
    pub longitude: f64,
    /// Seconds since epoch of the last refresh.
    pub last_update: i64,
    /// False for bot payloads that failed to parse completely.
    pub payload_valid: bool,
}

impl LocationReport {
    pub fn from_user(
        chat_id: ChatId,
        user_id: UserId,
        latitude: f64,
        longitude: f64,
        last_update: i64,
    ) -> Self {
        Self {
            chat_id,
            sender: SenderKey::User(user_id),
            latitude,
            longitude,
            last_update,
            payload_valid: true,
        }
    }

    pub fn from_bot(
        chat_id: ChatId,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        last_update: i64,
        payload_valid: bool,
    ) -> Self {
        Self {
            chat_id,
            sender: SenderKey::Bot(name.into()),
            latitude,
            longitude,
            last_update,
            payload_valid,
        }
    }

    pub fn key(&self) -> MarkerKey {
        MarkerKey::new(self.chat_id, self.sender.clone())
    }

    /// Reject reports that must never reach the surface.
    pub fn validate(&self) -> Result<()> {
        if !self.payload_valid {
            return Err(Error::MalformedReport(format!(
                "{}: incomplete payload",
                self.key()
            )));
        }
        if let SenderKey::Bot(name) = &self.sender {
            if name.trim().is_empty() {
                return Err(Error::MalformedReport(format!(
                    "chat {}: bot location without a name",
                    self.chat_id
                )));
            }
        }
        if !valid_coordinates(self.latitude, self.longitude) {
            return Err(Error::MalformedReport(format!(
                "{}: coordinates out of range ({}, {})",
                self.key(),
                self.latitude,
                self.longitude
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

fn valid_coordinates(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}
