//! Line based request intake
//!
//! One request per line, `address` or `address<TAB>body`. Blank lines and
//! lines starting with `#` are skipped.

use courier_common::{DeliveryRequest, internal, tracing};
use courier_delivery::{SubmissionService, SubmitError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Counts of what [`read_requests`] did with its input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    pub accepted: usize,
    pub rejected: usize,
}

fn parse_line(line: &str) -> Option<DeliveryRequest> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with('#') {
        return None;
    }

    Some(match line.split_once('\t') {
        Some((address, body)) => DeliveryRequest::new(address.trim()).with_body(body),
        None => DeliveryRequest::new(line.trim()),
    })
}

/// Submit every request read from `reader` until end of input
///
/// Malformed requests are counted and skipped.
///
/// # Errors
/// If reading fails or the broker refuses a valid request
pub async fn read_requests<R>(
    reader: R,
    service: &SubmissionService,
) -> anyhow::Result<IntakeSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IntakeSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let Some(request) = parse_line(&line) else {
            continue;
        };

        match service.submit(&request).await {
            Ok(_) => summary.accepted += 1,
            Err(SubmitError::Invalid(error)) => {
                tracing::warn!(line = %line, error = %error, "Rejected request from intake");
                summary.rejected += 1;
            }
            Err(error) => return Err(error.into()),
        }
    }

    internal!(
        level = INFO,
        accepted = summary.accepted,
        rejected = summary.rejected,
        "Intake reached end of input"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("a@b.com\thello world\n"),
            Some(DeliveryRequest::new("a@b.com").with_body("hello world"))
        );
        assert_eq!(parse_line(" a@b.com "), Some(DeliveryRequest::new("a@b.com")));
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# comment"), None);
    }
}
