pub mod bootstrap;
pub mod charset;
pub mod config;
pub mod context;
pub mod driver;
pub mod errors;
pub mod logging;
pub mod net;
pub mod pool;
pub mod protocol;

pub use charset::Charset;
pub use config::{ConnectionMode, DriverConfig};
pub use context::OpContext;
pub use driver::{Driver, DriverConstructor, FileObject, FtpDriver, ftp_driver_constructor};
pub use errors::{DriverError, Operation};
