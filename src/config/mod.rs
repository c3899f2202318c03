pub mod address;
pub mod driver_config;
pub mod schema;
pub mod types;

pub use address::{AddressError, DEFAULT_FTP_PORT, normalize_address};
pub use driver_config::{ConfigError, DriverConfig};
pub use schema::{FieldKind, FormField, form_meta};
pub use types::{ConnectionMode, LogLevel};
