use log::error;

use super::{Report, ReportUpdate, Reporter};

/// Report backend that only writes to the log, keyed by title. Useful
/// when no tracker is configured.
pub struct LogReport {
    title: String,
    closed: bool,
}

impl LogReport {
    pub fn new(title: &str, description: &str) -> Self {
        error!("{title}: {description}");
        LogReport {
            title: title.to_string(),
            closed: false,
        }
    }

    pub fn get(report_id: &str) -> Self {
        LogReport {
            title: report_id.to_string(),
            closed: false,
        }
    }
}

impl Report for LogReport {
    fn report_id(&self) -> &str {
        &self.title
    }

    fn update(&mut self, update: &ReportUpdate) -> anyhow::Result<()> {
        // Updates after close are silently dropped. Questionable, but
        // callers depend on it; see DESIGN.md.
        if self.closed {
            return Ok(());
        }
        let mut lines = Vec::new();
        if let Some(description) = &update.description {
            lines.push(format!("description: {description}"));
        }
        if let Some(checklist) = &update.checklist {
            for (name, entries) in checklist {
                let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
                lines.push(format!("{}: {}", name, names.join(", ")));
            }
        }
        error!("{}:\n\t{}", self.title, lines.join("\n\t"));
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        error!("Closing report: {}", self.title);
        self.closed = true;
        Ok(())
    }
}

/// Factory for [`LogReport`] handles.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn new_report(&self, title: &str, description: &str) -> anyhow::Result<Box<dyn Report>> {
        Ok(Box::new(LogReport::new(title, description)))
    }

    fn get_report(&self, report_id: &str) -> anyhow::Result<Box<dyn Report>> {
        Ok(Box::new(LogReport::get(report_id)))
    }
}
