//! Decoder stacks and their results

pub mod annotation;
pub mod classifier;
pub mod config;
pub mod decoder;
pub mod row;
pub mod row_data;
pub mod stack;

pub use annotation::Annotation;
pub use classifier::{ClassificationTable, Routing};
pub use config::{DECODE_CHUNK_LENGTH, DECODE_NOTIFY_PERIOD, DecodeConfig};
pub use decoder::{AnnotationClass, AnnotationRowDesc, ChannelSpec, Decoder, DecoderInfo};
pub use row::Row;
pub use row_data::RowData;
pub use stack::DecoderStack;
