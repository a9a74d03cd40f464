//! Report generation port trait.

use crate::domain::error::AshbackError;
use crate::domain::performance::PerformanceReport;
use crate::domain::portfolio::Portfolio;

/// Port for writing run results.
pub trait ReportPort {
    fn write(
        &self,
        report: &PerformanceReport,
        portfolio: &Portfolio,
        day_log: &[String],
        output_path: &str,
    ) -> Result<(), AshbackError>;
}
