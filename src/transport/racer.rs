//! First-to-open connection race across candidates.
//!
//! Every candidate is attempted concurrently on its own task. The first
//! attempt to open wins; still-pending attempts are aborted and any loser
//! that managed to open anyway is handed to a discard hook for closing.
//!
//! ```text
//!  candidate 0 ──── open? ─┐
//!  candidate 1 ── open! ───┼──► winner ──► abort + discard the rest
//!  candidate 2 ───── err ──┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CandidateFailure, Error, Result};

// ============================================================================
// Winner
// ============================================================================

/// The candidate that opened first.
#[derive(Debug)]
pub struct Winner<T> {
    /// URL of the winning candidate.
    pub url: Url,
    /// Position of the winner in the candidate list.
    pub index: usize,
    /// The open channel.
    pub channel: T,
}

// ============================================================================
// Race
// ============================================================================

/// Races `open` across all candidates.
///
/// Candidate order only decides spawn order; the winner is whichever
/// attempt completes successfully first. Before returning, every other
/// attempt is aborted and awaited, and each that had already opened is
/// passed to `discard` together with its URL.
///
/// # Errors
///
/// Returns [`Error::AllCandidatesFailed`] listing every cause if no
/// attempt succeeds, or with an empty list if there were no candidates.
pub async fn race<T, F, Fut, D>(candidates: Vec<Url>, open: F, mut discard: D) -> Result<Winner<T>>
where
    T: Send + 'static,
    F: Fn(Url) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    D: FnMut(Url, T),
{
    if candidates.is_empty() {
        return Err(Error::all_candidates_failed(Vec::new()));
    }

    let total = candidates.len();
    let mut attempts = JoinSet::new();
    for (index, url) in candidates.into_iter().enumerate() {
        let attempt = open(url.clone());
        attempts.spawn(async move { (index, url, attempt.await) });
    }

    let mut failures = Vec::with_capacity(total);

    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok((index, url, Ok(channel))) => {
                debug!(%url, index, total, "Candidate won connection race");

                attempts.abort_all();
                while let Some(rest) = attempts.join_next().await {
                    if let Ok((_, loser, Ok(channel))) = rest {
                        debug!(url = %loser, "Discarding losing channel");
                        discard(loser, channel);
                    }
                }

                return Ok(Winner {
                    url,
                    index,
                    channel,
                });
            }
            Ok((index, url, Err(e))) => {
                warn!(%url, index, error = %e, "Candidate failed");
                failures.push(CandidateFailure::new(url.as_str(), e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "Candidate attempt did not complete");
                failures.push(CandidateFailure::new("<candidate>", e.to_string()));
            }
        }
    }

    Err(Error::all_candidates_failed(failures))
}

// ============================================================================
// Tests
// ============================================================================
