//! 파일 수집 모듈
//!
//! 코퍼스 디렉토리에서 PDF와 텍스트 파일을 찾습니다.
//! 스크래퍼가 남기는 링크 목록과 사이드카 메타데이터는 문서가 아니므로 제외합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

/// 스크래퍼 링크 목록 파일 (append-only)
pub const LINKS_FILE: &str = "scraped_links.txt";

/// 사이드카 메타데이터 접미사 (`paper.pdf` → `paper.pdf.meta.json`)
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// 문서 파일의 사이드카 경로
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 텍스트 파일 (txt, md)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" | "markdown" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 지원하지 않는 확장자나 디렉토리는 `None`
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let Some(file_type) = FileType::from_path(&path) else {
            return Ok(None);
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            file_type,
            size: metadata.len(),
        }))
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// 문서가 아닌 파일 이름
    pub skip_names: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 200 * 1024 * 1024, // 학위논문 PDF 고려
            skip_names: vec![LINKS_FILE.to_string()],
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더 재귀 수집 (파일 이름 순)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.exists() {
            anyhow::bail!("Directory not found: {:?}", path);
        }

        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to collect file: {}", e);
                }
            }
        }

        tracing::info!("Collected {} files from {:?}", files.len(), path);
        Ok(files)
    }

    fn should_include(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::warn!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }

        let name = file.file_name();
        if self.config.skip_names.iter().any(|s| s == &name) {
            return false;
        }

        true
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub text_files: usize,
    pub pdf_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    pub fn from_files(files: &[CollectedFile]) -> Self {
        let mut stats = Self::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            match file.file_type {
                FileType::Text => stats.text_files += 1,
                FileType::Pdf => stats.pdf_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("md"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("TXT"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("json"), None);
        assert_eq!(FileType::from_extension("png"), None);
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("data/documents/2101.0001_Title.pdf")),
            PathBuf::from("data/documents/2101.0001_Title.pdf.meta.json")
        );
    }

    #[test]
    fn test_collect_skips_links_and_sidecars() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b_notes.txt"), "notes").unwrap();
        std::fs::write(dir.path().join("a_paper.pdf"), b"%PDF-1.5").unwrap();
        std::fs::write(dir.path().join("a_paper.pdf.meta.json"), "{}").unwrap();
        std::fs::write(dir.path().join(LINKS_FILE), "http://arxiv.org/abs/1\n").unwrap();

        let files = FileCollector::with_defaults()
            .collect_directory(dir.path())
            .unwrap();
        let names: Vec<String> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["a_paper.pdf", "b_notes.txt"]);

        let stats = CollectionStats::from_files(&files);
        assert_eq!(stats.pdf_files, 1);
        assert_eq!(stats.text_files, 1);
        assert_eq!(stats.total_size, 8 + 5);
    }

    #[test]
    fn test_from_path_ignores_unsupported_and_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("figure.png"), b"png").unwrap();
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();
        std::fs::write(dir.path().join("notes.md"), "abc").unwrap();

        assert!(CollectedFile::from_path(dir.path().join("figure.png"))
            .unwrap()
            .is_none());
        assert!(CollectedFile::from_path(dir.path().join("nested.pdf"))
            .unwrap()
            .is_none());

        let file = CollectedFile::from_path(dir.path().join("notes.md"))
            .unwrap()
            .unwrap();
        assert_eq!(file.file_type, FileType::Text);
        assert_eq!(file.size, 3);
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(FileCollector::with_defaults()
            .collect_directory(&dir.path().join("absent"))
            .is_err());
    }
}
