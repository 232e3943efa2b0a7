pub mod backup;
pub mod retry;

pub use backup::{BackupDownload, BackupFormat, BackupInfo, BackupService, ResetReport};
pub use retry::RetryPolicy;
