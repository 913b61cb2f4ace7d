mod parsing;
mod settings;
mod types;

pub(crate) use types::{ParsingSettings, S3Settings, Settings};
