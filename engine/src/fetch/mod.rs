//! Segment fetcher (spec §4.3): one URL to one file, with validation and
//! bounded retry/backoff.

mod fetcher;
mod retry;
mod validate;

pub use fetcher::{build_client, fetch_to_file, fetch_to_file_default};
pub use retry::{backoff_delay, retry_with_backoff, RetryAction, DEFAULT_RETRY_BUDGET};
pub use validate::{is_recognized_fragment, looks_like_json, sniff_box_type};
