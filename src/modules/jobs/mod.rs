// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::LazyLock;

use dashmap::DashMap;

use crate::modules::user::scope::CancellationFlag;

mod cleaner;
mod flow;
pub mod handlers;
pub mod model;
pub mod nativedb;
pub mod periodic;
mod processor;
pub mod queue;
pub mod result;
pub mod retry;
pub mod store;
pub mod task;
#[cfg(test)]
mod tests;
mod updater;

pub use model::JobStatus;

static RUNNING_JOBS: LazyLock<DashMap<u64, CancellationFlag>> = LazyLock::new(DashMap::new);

/// In-process registry of cancel flags for jobs currently executing; the
/// at-most-one-worker invariant makes job id a sufficient key.
pub fn running_jobs() -> &'static DashMap<u64, CancellationFlag> {
    &RUNNING_JOBS
}
