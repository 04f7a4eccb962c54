pub mod convert;
pub mod model;

pub const APP_NAME: &str = "gbw";

pub use convert::{
    Conflict, ConflictPolicy, Conversion, ConversionReport, ConvertError, InputRecord,
    REQUIRED_HEADERS, convert, convert_reader, missing_headers,
};
pub use model::{
    CustomField, ExportDocument, Folder, ItemType, Login, LoginItem, ModelError, UriEntry,
    UriMatch,
};
