// Data Engine Module
// Connection resolution, batch execution and value coercion

pub mod batch;
pub mod connector;
pub mod drivers;
pub mod dsn;
pub mod error;
pub mod limits;
pub mod materializer;
pub mod types;
pub mod value;

pub use connector::{Connector, Dialer, LiveConnection, SessionId};
pub use drivers::{ConnectionHandle, SqlxDialer};
pub use error::{EngineError, EngineResult};
pub use limits::Limits;
pub use types::*;
pub use value::{to_display_string, CellValue};
