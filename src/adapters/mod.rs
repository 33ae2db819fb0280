//! Concrete collaborators for production runs.
//!
//! | Adapter | Implements |
//! |---------|------------|
//! | [`MetalProvisioner`] | [`Provisioner`](crate::Provisioner) |
//! | [`GithubResolver`] | [`CommitResolver`](crate::CommitResolver) |
//! | [`ScpTransfer`] | [`RemoteTransfer`](crate::RemoteTransfer) |
//! | [`ScriptExecutor`] | [`RemoteExecutor`](crate::RemoteExecutor) |
//! | [`JsonLinesResultStore`] | [`ResultStore`](crate::ResultStore) |
//! | [`SlackNotifier`] | [`Notifier`](crate::Notifier) |
//! | `S3Storage` (feature `s3`) | [`ObjectStorage`](crate::ObjectStorage) |

mod github;
mod jsonl;
mod metal;
#[cfg(feature = "s3")]
mod s3;
mod scp;
mod script;
mod slack;

pub use github::GithubResolver;
pub use jsonl::JsonLinesResultStore;
pub use metal::MetalProvisioner;
#[cfg(feature = "s3")]
pub use s3::S3Storage;
pub use scp::ScpTransfer;
pub use script::{ScriptExecutor, HOST_ENV};
pub use slack::SlackNotifier;
