use std::fmt;

/// Severity of a translation diagnostic. Recoverable conditions are recorded
/// here instead of aborting the page or job; the collected records are
/// surfaced to the caller at job end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportKind::Debug => "Debug",
            ReportKind::Info => "Info",
            ReportKind::Warning => "Warning",
            ReportKind::Error => "Error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub kind: ReportKind,
    /// Page the record refers to; 0 for job-level records.
    pub page: u32,
    pub message: String,
}

/// Diagnostics sink for one translation job. Created at job start, passed by
/// reference into the engine, drained by the caller when the job finishes.
#[derive(Debug, Default)]
pub struct Report {
    records: Vec<ReportRecord>,
}

impl Report {
    pub fn new() -> Self {
        Report::default()
    }

    pub fn add(&mut self, kind: ReportKind, page: u32, message: impl Into<String>) {
        self.records.push(ReportRecord {
            kind,
            page,
            message: message.into(),
        });
    }

    pub fn debug(&mut self, page: u32, message: impl Into<String>) {
        self.add(ReportKind::Debug, page, message);
    }

    pub fn info(&mut self, page: u32, message: impl Into<String>) {
        self.add(ReportKind::Info, page, message);
    }

    pub fn warning(&mut self, page: u32, message: impl Into<String>) {
        self.add(ReportKind::Warning, page, message);
    }

    pub fn error(&mut self, page: u32, message: impl Into<String>) {
        self.add(ReportKind::Error, page, message);
    }

    pub fn records(&self) -> &[ReportRecord] {
        &self.records
    }

    pub fn count_of(&self, kind: ReportKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn drain(&mut self) -> Vec<ReportRecord> {
        std::mem::take(&mut self.records)
    }
}
