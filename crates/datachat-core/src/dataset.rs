/// Delimited formats the service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    #[default]
    Csv,
    Tsv,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Tsv => "tsv",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Some(FileType::Csv),
            "tsv" => Some(FileType::Tsv),
            _ => None,
        }
    }

    /// Guess from a file name's extension
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_str)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FileType::Csv => "CSV",
            FileType::Tsv => "TSV",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            FileType::Csv => FileType::Tsv,
            FileType::Tsv => FileType::Csv,
        }
    }
}

/// Whether an upload is the user's first dataset or replaces the existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    First,
    Replace,
}

impl UploadMode {
    pub fn endpoint(&self) -> &'static str {
        match self {
            UploadMode::First => "/home",
            UploadMode::Replace => "/replace-dataset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_file_type_parsing() {
        assert_eq!(FileType::from_str("CSV"), Some(FileType::Csv));
        assert_eq!(FileType::from_str(" tsv "), Some(FileType::Tsv));
        assert_eq!(FileType::from_str("xlsx"), None);
    }

    #[test]
    fn test_file_type_from_path() {
        assert_eq!(FileType::from_path(Path::new("people.tsv")), Some(FileType::Tsv));
        assert_eq!(FileType::from_path(Path::new("/tmp/People.CSV")), Some(FileType::Csv));
        assert_eq!(FileType::from_path(Path::new("notes")), None);
    }

    #[test]
    fn test_upload_endpoints() {
        assert_eq!(UploadMode::First.endpoint(), "/home");
        assert_eq!(UploadMode::Replace.endpoint(), "/replace-dataset");
    }
}
