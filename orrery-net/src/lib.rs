// orrery-net/src/lib.rs
pub mod http;
pub mod validation;

pub use http::{FetchRequest, HttpFetcher, ReqwestDownloader, SourceFetcher, UrlDownloader};
pub use orrery_common::error::{OrreryError, Result};
pub use validation::{sha256_file, validate_url, verify_checksum};
