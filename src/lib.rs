//! # mdb: client driver core for the MDB service
//!
//! Parses DSNs into a typed [`Config`](config::Config), inlines statement
//! arguments as literals, and streams query results through a forward-only
//! cursor that decodes each column from its type tag and null bitmap.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use mdb::prelude::*;
//! use std::sync::Arc;
//!
//! let driver = Driver::new(Arc::new(dialer));
//! let conn = driver
//!     .open("app:secret@tcp(db.internal)/main?interpolateParams=true")
//!     .await?;
//!
//! let mut rows = conn
//!     .query("SELECT * FROM main.user WHERE user.age > ?", &[21.into()])
//!     .await?;
//! while let Some(row) = rows.next_row().await? {
//!     let name: String = row.get_by_name("user.name")?;
//! }
//! rows.close();
//! ```
//!
//! ## DSN
//!
//! `[user[:password]@][net[(addr)]]/dbname[?param1=value1&...]`
//!
//! | Parameter           | Meaning                                   |
//! |---------------------|-------------------------------------------|
//! | `interpolateParams` | Inline `?` arguments client-side          |
//! | `loc`               | Zone for rendering timestamps             |
//! | `tls`               | `true`, `skip-verify`, or a policy name   |
//! | `timeout`           | Dial + session setup deadline (`5s`)      |
//! | `readTimeout`       | Per-chunk receive deadline                |
//! | `fetchSize`         | Rows per chunk requested from the server  |
//! | `maxRowCount`       | Row limit per query (`0` = unlimited)     |

pub mod bitmap;
pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod types;

pub mod prelude {
    pub use crate::config::{Config, Registry, TlsPolicy, parse_dsn};
    pub use crate::driver::{
        ColumnType, Connection, Connector, Driver, Row, Rows, Statement, Transaction, TxOptions,
    };
    pub use crate::error::*;
    pub use crate::protocol::{Datatype, interpolate};
    pub use crate::types::{Arg, FromValue, Value};
}

pub use config::{Config, Registry, parse_dsn};
pub use driver::{Connection, Driver};
pub use error::{ErrorKind, MdbError, MdbResult};
