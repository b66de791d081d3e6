pub mod auth;
pub mod config;
pub mod grid;
pub mod resolver;
pub mod types;

pub use auth::{digest_hex, AuthError, CredentialVerifier, FixedDigestVerifier, SessionStore};
pub use config::{AuthConfig, RuntimeConfig};
pub use grid::{parse_field, FieldParseError, Grid, UpdateStats, GRID_BYTE_LEN};
pub use resolver::{Resolver, SwitchCommand};
pub use types::{Day, Device, HourBlock, TimeSlot, DAY_COUNT, DEVICE_COUNT, HOUR_BLOCK_COUNT};
