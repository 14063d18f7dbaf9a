mod document_key;
mod field_path;
mod geo_point;
mod resource_path;
mod timestamp;

pub use document_key::DocumentKey;
pub use field_path::FieldPath;
pub use geo_point::GeoPoint;
pub use resource_path::ResourcePath;
pub use timestamp::Timestamp;
