//! Local file access shared by the CSV reader and the COPY loader

pub mod local_reader;

pub use local_reader::SourceFile;
