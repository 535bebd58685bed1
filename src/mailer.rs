use futures_util::future::LocalBoxFuture;
use log::info;

use crate::error::AppError;

/// Outbound mail. Delivery, retries and confirmation belong to the implementation.
pub trait Mailer: Send + Sync {
    fn send_reset<'a>(&'a self, to: &'a str, link: &'a str) -> LocalBoxFuture<'a, Result<(), AppError>>;
}

/// Writes the message to the log instead of delivering it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_reset<'a>(&'a self, to: &'a str, link: &'a str) -> LocalBoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            info!(
                "password reset mail to {}: visit {} to reset your password; ignore this mail if you did not request it",
                to, link
            );
            Ok(())
        })
    }
}
