mod artifacts;
mod jobs;
mod quota;
mod tokens;

pub use artifacts::{ArtifactStore, ExportRenderer};
pub use jobs::ExportJobRepository;
pub use quota::{ExportQuotaLimits, ExportQuotaStore, QuotaReservation};
pub use tokens::{DownloadTokenRecord, DownloadTokenRepository};
