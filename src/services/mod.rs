pub(crate) mod chunk_plan;
pub(crate) mod csv_export;
pub(crate) mod filename_metadata;
pub(crate) mod llm;
pub(crate) mod parsing;
pub(crate) mod pdf_text;
pub(crate) mod question_count;
pub(crate) mod reply_json;
pub(crate) mod storage;
pub(crate) mod type_classifier;
