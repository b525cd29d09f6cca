pub mod error;
pub mod endian;
pub mod compress;
pub mod record;
pub mod header;
pub mod body;
pub mod formats;
pub mod policy;
pub mod config;
pub mod site;
pub mod stream;
pub mod tempstore;

pub use compress::CompressionMethod;
pub use config::EngineConfig;
pub use endian::Endianness;
pub use error::{Result, SilkError};
pub use header::{FileFormat, HeaderEntry, StreamHeader};
pub use policy::Ipv6Policy;
pub use record::RwRec;
pub use site::SiteMap;
pub use stream::{FlowReader, FlowWriter, WriterOptions};
pub use tempstore::TempStore;
