//! Errors observed in the systems we watch, as opposed to errors in this
//! tool itself. Each one knows how to describe itself, how to raise or
//! refresh its report, and how to clear it once the condition is gone.

pub mod ftbfs;

pub trait TrackedError {
    /// The message to use when reporting this error.
    fn message(&self) -> String;

    /// Raise or refresh the report for this error.
    fn action(&mut self) -> anyhow::Result<()>;

    /// The error condition is gone; wrap up the report.
    fn clear(&mut self) -> anyhow::Result<()>;
}
