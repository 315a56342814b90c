//! Anonymous device identifier reported with cache requests and events.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const DEVICE_ID_LEN: usize = 8;

/// Derive the device id from a hardware serial.
///
/// The id is the first eight hex characters of the SHA-256 digest of the
/// serial. Without a usable serial a random id of the same shape is used,
/// so the value is stable only for the lifetime of the process.
///
/// ```
/// use urbo::domain::device_id;
///
/// let id = device_id(Some("R58M12ABCDE"));
/// assert_eq!(id.len(), 8);
/// assert_eq!(id, device_id(Some("R58M12ABCDE")));
/// ```
pub fn device_id(serial: Option<&str>) -> String {
    match serial.map(str::trim).filter(|serial| !serial.is_empty()) {
        Some(serial) => {
            let mut digest = hex::encode(Sha256::digest(serial.as_bytes()));
            digest.truncate(DEVICE_ID_LEN);
            digest
        }
        None => {
            let mut random = Uuid::new_v4().simple().to_string();
            random.truncate(DEVICE_ID_LEN);
            random
        }
    }
}
