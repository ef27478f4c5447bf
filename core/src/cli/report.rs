use crate::pipeline::RunReport;
use crate::types::FileStatus;
use std::fmt;

/// Text report formatter for a batch run
pub struct TextReport<'a> {
    report: &'a RunReport,
}

impl<'a> TextReport<'a> {
    /// Creates a new text report
    pub fn new(report: &'a RunReport) -> Self {
        Self { report }
    }
}

impl<'a> fmt::Display for TextReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch Sort Report")?;
        writeln!(f, "=================")?;
        writeln!(f)?;
        writeln!(f, "Total:    {}", self.report.total())?;
        writeln!(f, "Written:  {}", self.report.written())?;
        writeln!(f, "Skipped:  {}", self.report.skipped())?;
        writeln!(f, "Failed:   {}", self.report.failed())?;

        if self.report.failed() > 0 {
            writeln!(f)?;
            writeln!(f, "Failures by Stage")?;
            writeln!(f, "-----------------")?;
            for (stage, count) in self.report.failures_by_stage() {
                writeln!(f, "{}: {}", stage, count)?;
            }

            writeln!(f)?;
            writeln!(f, "Failures")?;
            writeln!(f, "--------")?;
            for result in self.report.failures() {
                if let FileStatus::Failed { stage, reason } = &result.status {
                    writeln!(f, "{} [{}]: {}", result.source.display(), stage, reason)?;
                }
            }
        }

        Ok(())
    }
}
