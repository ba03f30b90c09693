use chrono::Utc;
use serde_yaml::{Mapping, Value};

use crate::report::{Checklist, ChecklistEntry, Report, ReportError, ReportUpdate, Reporter};

use super::TrackedError;

const FAILING_BUILDS_LIST: &str = "Failing Builds";

/// Failed-to-build-from-source tracking for one release. Owns a report
/// on the configured backend; packages that fail to build land on its
/// "Failing Builds" checklist.
pub struct FtbfsError {
    url: String,
    checklist: Option<Checklist>,
    report: Box<dyn Report>,
}

impl FtbfsError {
    /// Open a report for `release`. With an `error_id` the existing
    /// report is fetched; otherwise a new one is created titled
    /// `"{title}[{release}]"` from the config's `title` key.
    pub fn new(
        release: &str,
        config: &Mapping,
        reporter: &dyn Reporter,
        error_id: Option<&str>,
    ) -> anyhow::Result<Self> {
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let report = match error_id {
            Some(id) => reporter.get_report(id)?,
            None => {
                let title = config
                    .get("title")
                    .and_then(Value::as_str)
                    .ok_or(ReportError::MissingConfigKey("title"))?;
                let title = format!("{title}[{release}]");
                let description = status_message(&url);
                reporter.new_report(&title, &description)?
            }
        };

        Ok(FtbfsError {
            url,
            checklist: None,
            report,
        })
    }

    pub fn id(&self) -> &str {
        self.report.report_id()
    }

    pub fn packages(&self) -> Option<&Checklist> {
        self.checklist.as_ref()
    }

    /// Record the packages currently failing to build.
    pub fn set_packages(&mut self, packages: Vec<ChecklistEntry>) {
        let mut checklist = Checklist::new();
        checklist.insert(FAILING_BUILDS_LIST.to_string(), packages);
        self.checklist = Some(checklist);
    }
}

fn status_message(url: &str) -> String {
    let details = if url.is_empty() {
        "status_report.html".to_string()
    } else {
        format!("{}/status_report.html", url.trim_end_matches('/'))
    };
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S%.6f");
    format!("Results as of: {now} UTC\nBuild Details: {details}")
}

impl TrackedError for FtbfsError {
    fn message(&self) -> String {
        status_message(&self.url)
    }

    fn action(&mut self) -> anyhow::Result<()> {
        if let Some(checklist) = &self.checklist {
            self.report.update(&ReportUpdate {
                description: Some(self.message()),
                checklist: Some(checklist.clone()),
            })?;
        }
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        self.report.update(&ReportUpdate {
            description: Some(self.message()),
            ..ReportUpdate::default()
        })?;
        self.report.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    type Calls = Rc<RefCell<Vec<String>>>;

    struct FakeReport {
        id: String,
        calls: Calls,
    }

    impl Report for FakeReport {
        fn report_id(&self) -> &str {
            &self.id
        }

        fn update(&mut self, update: &ReportUpdate) -> anyhow::Result<()> {
            let lists = update
                .checklist
                .as_ref()
                .map(|checklist| {
                    checklist
                        .keys()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            let has_description = update.description.is_some();
            self.calls
                .borrow_mut()
                .push(format!("update:desc={has_description}:lists={lists}"));
            Ok(())
        }

        fn close(&mut self) -> anyhow::Result<()> {
            self.calls.borrow_mut().push("close".to_string());
            Ok(())
        }
    }

    struct FakeReporter {
        calls: Calls,
    }

    impl FakeReporter {
        fn new() -> Self {
            FakeReporter {
                calls: Calls::default(),
            }
        }
    }

    impl Reporter for FakeReporter {
        fn new_report(&self, title: &str, _description: &str) -> anyhow::Result<Box<dyn Report>> {
            self.calls.borrow_mut().push(format!("new:{title}"));
            Ok(Box::new(FakeReport {
                id: "r1".to_string(),
                calls: Rc::clone(&self.calls),
            }))
        }

        fn get_report(&self, report_id: &str) -> anyhow::Result<Box<dyn Report>> {
            self.calls.borrow_mut().push(format!("get:{report_id}"));
            Ok(Box::new(FakeReport {
                id: report_id.to_string(),
                calls: Rc::clone(&self.calls),
            }))
        }
    }

    fn config() -> Mapping {
        serde_yaml::from_str("title: Test Error\nurl: test/url\n").unwrap()
    }

    #[test]
    fn new_creates_a_titled_report() {
        let reporter = FakeReporter::new();
        let error = FtbfsError::new("mustang", &config(), &reporter, None).unwrap();
        assert_eq!(error.id(), "r1");
        assert_eq!(
            reporter.calls.borrow().as_slice(),
            ["new:Test Error[mustang]"]
        );
    }

    #[test]
    fn error_id_fetches_the_existing_report() {
        let reporter = FakeReporter::new();
        let error = FtbfsError::new("mustang", &config(), &reporter, Some("1234")).unwrap();
        assert_eq!(error.id(), "1234");
        assert_eq!(reporter.calls.borrow().as_slice(), ["get:1234"]);
    }

    #[test]
    fn missing_title_is_rejected_for_new_reports() {
        let reporter = FakeReporter::new();
        let config: Mapping = serde_yaml::from_str("url: test/url\n").unwrap();
        let err = FtbfsError::new("mustang", &config, &reporter, None).err().unwrap();
        let report_err = err.downcast_ref::<ReportError>().unwrap();
        assert!(matches!(report_err, ReportError::MissingConfigKey("title")));
    }

    #[test]
    fn message_points_at_the_status_report() {
        let reporter = FakeReporter::new();
        let error = FtbfsError::new("mustang", &config(), &reporter, None).unwrap();
        let message = error.message();
        assert!(message.starts_with("Results as of: "));
        assert!(message.ends_with("Build Details: test/url/status_report.html"));
    }

    #[test]
    fn set_packages_fills_the_failing_builds_list() {
        let reporter = FakeReporter::new();
        let mut error = FtbfsError::new("mustang", &config(), &reporter, None).unwrap();
        error.set_packages(vec![ChecklistEntry::new("openstack-swift", "")]);
        let checklist = error.packages().unwrap();
        assert_eq!(checklist.len(), 1);
        assert_eq!(checklist["Failing Builds"].len(), 1);
    }

    #[test]
    fn action_without_packages_does_not_update() {
        let reporter = FakeReporter::new();
        let mut error = FtbfsError::new("mustang", &config(), &reporter, None).unwrap();
        error.action().unwrap();
        assert_eq!(
            reporter.calls.borrow().as_slice(),
            ["new:Test Error[mustang]"]
        );
    }

    #[test]
    fn action_with_packages_updates_the_report() {
        let reporter = FakeReporter::new();
        let mut error = FtbfsError::new("mustang", &config(), &reporter, Some("1234")).unwrap();
        error.set_packages(vec![ChecklistEntry::new("openstack-swift", "")]);
        error.action().unwrap();
        assert_eq!(
            reporter.calls.borrow().as_slice(),
            ["get:1234", "update:desc=true:lists=Failing Builds"]
        );
    }

    #[test]
    fn clear_updates_then_closes() {
        let reporter = FakeReporter::new();
        let mut error = FtbfsError::new("mustang", &config(), &reporter, Some("1234")).unwrap();
        error.clear().unwrap();
        assert_eq!(
            reporter.calls.borrow().as_slice(),
            ["get:1234", "update:desc=true:lists=", "close"]
        );
    }
}
