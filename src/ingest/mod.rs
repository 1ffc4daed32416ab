pub mod builder;
pub mod decode;
pub mod handler;
pub mod types;

pub use builder::{build_batch, build_point, EntryBuildError};
pub use decode::{decode, DecodeError};
pub use handler::{proxy_report, ProxyError, WriteSummary};
pub use types::ValueList;
