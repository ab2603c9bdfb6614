pub mod assessment;
pub mod report;
pub mod scanner;

pub use assessment::{parse_assessment, AssessmentError, RiskAssessment, RiskCategory};
pub use scanner::{
    default_scanner::{classify, scan, KeywordScanner},
    file_repository::FileKeywordRepository,
    keywords::BuiltinKeywords,
    Keyword, KeywordRepository, KeywordSet, KeywordValidationError, RiskLevel, ScanResult,
    ScanResultValidationError, Scanner, ScannerConfig, Severity,
};
