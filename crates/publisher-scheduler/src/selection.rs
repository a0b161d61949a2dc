//! Orders the candidate draft pool per [`DraftSelectionMethod`] (spec.md
//! §4.8 step 4).

use publisher_contracts::model::{Draft, DraftSelectionMethod};
use rand::seq::SliceRandom;

/// `fifo`: `created_at` ascending. `lifo`: `created_at` descending.
/// `random`: candidates truncated to 1000 then shuffled — the spec caps the
/// shuffle pool rather than shuffling an unbounded candidate list.
pub fn order_candidates(mut drafts: Vec<Draft>, method: DraftSelectionMethod) -> Vec<Draft> {
    match method {
        DraftSelectionMethod::Fifo => {
            drafts.sort_by_key(|d| d.created_at);
            drafts
        }
        DraftSelectionMethod::Lifo => {
            drafts.sort_by_key(|d| std::cmp::Reverse(d.created_at));
            drafts
        }
        DraftSelectionMethod::Random => {
            drafts.truncate(1000);
            let mut rng = rand::rng();
            drafts.shuffle(&mut rng);
            drafts
        }
    }
}
