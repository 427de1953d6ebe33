pub mod error;
pub mod encoding;
pub mod obfuscation;
pub mod header;
pub mod column;
pub mod schema;
pub mod row;
pub mod attributes;
pub mod overlay;
pub mod xml;
pub mod localize;
pub mod table;
pub mod convert;
pub mod batch;

pub use error::{IesError, Result};
pub use encoding::{EncodingResolver, FallbackChains, TextCodec};
pub use header::{HeaderVersion, IesHeader};
pub use column::{Column, ColumnTable, ColumnType};
pub use row::{FloatMode, Row};
pub use attributes::{Attributes, Dictionary};
pub use xml::XmlDocument;
pub use table::{CodecSettings, Table};
pub use convert::{convert_file, decode_table, encode_document, ConvertOptions};
pub use batch::{convert_directory, BatchReport, FileOutcome};
