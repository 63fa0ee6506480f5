use tracing::error;

/// Operator notification on unrecoverable failure. The transport (email,
/// chat webhook) lives outside this crate.
pub trait Notifier {
    fn notify(&self, subject: &str, body: &str);
}

/// Fallback notifier writing to the error log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) {
        error!("NOTIFICATION [{}] {}", subject, body);
    }
}
