//! Shared primitive types used across the kiosk core.

/// Milliseconds since device start. All controller timing runs on this.
pub type Millis = u64;

/// Seconds since the device epoch. Transaction timestamps use this.
pub type EpochSecs = u64;

/// UID read from a contactless card, hex-encoded by the reader driver.
pub type CardUid = String;

/// Backend-side student identifier.
pub type StudentId = String;

/// A captured camera frame, already encoded by the camera driver.
pub type EncodedImage = Vec<u8>;
