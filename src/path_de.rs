use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

/// A document that failed to load, with the JSON path of the offending value.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read {file}: {source}")]
    Read { file: PathBuf, source: std::io::Error },
    #[error("{}at JSON path {path} → {message}", .file.as_ref().map(|f| format!("{}: ", f.display())).unwrap_or_default())]
    Shape { file: Option<PathBuf>, path: String, message: String },
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, DocumentError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| DocumentError::Shape {
        file: None,
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}

pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, DocumentError> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(|err| DocumentError::Shape {
        file: None,
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}

/// Read and deserialize `file`, e.g. a compile options file or a schema in IR form.
pub fn read_with_path<T: DeserializeOwned>(file: &Path) -> Result<T, DocumentError> {
    let src = std::fs::read_to_string(file)
        .map_err(|source| DocumentError::Read { file: file.to_path_buf(), source })?;
    from_str_with_path(&src).map_err(|err| match err {
        DocumentError::Shape { path, message, .. } => {
            DocumentError::Shape { file: Some(file.to_path_buf()), path, message }
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::CompileOptions;
    use crate::schema::Schema;

    #[test]
    fn reports_json_path_of_bad_value() {
        let err = from_str_with_path::<CompileOptions>(r#"{"max_list_unroll": "lots"}"#).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("at JSON path max_list_unroll"), "{text}");
    }

    #[test]
    fn schema_errors_name_the_definition() {
        let src = r#"{"root": {"type": "null"}, "defs": {"Tag": {"type": "text"}}}"#;
        let err = from_str_with_path::<Schema>(src).unwrap_err();
        assert!(err.to_string().contains("defs.Tag"), "{err}");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_with_path::<CompileOptions>(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, DocumentError::Read { .. }));
    }
}
