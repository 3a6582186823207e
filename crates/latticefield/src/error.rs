use snafu::Snafu;

/// Errors from configuring or running a field pass.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FieldError {
    #[snafu(display("Invalid configuration: {reason}"))]
    InvalidConfiguration { reason: String },

    /// The pass did not run to completion. Its output buffers were never handed out.
    #[snafu(display("Field pass aborted: {message}"))]
    ExecutionAborted { message: String },

    #[snafu(display("Could not start worker threads: {message}"))]
    ThreadPool { message: String },
}
