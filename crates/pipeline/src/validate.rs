use log::warn;
use sluice_feed::Batch;
use sluice_store::Directory;

/// Pure filter over one batch: keep records whose entity id the
/// directory knows, preserving input order; drop and count the rest.
///
/// An empty result is still a batch. The dispatcher forwards it
/// unconditionally so batch-to-worker rotation stays deterministic.
pub fn validate(directory: &dyn Directory, batch: Batch) -> (Batch, u64) {
    let mut rejected = 0u64;

    let accepted: Batch = batch
        .into_iter()
        .filter(|record| {
            if directory.exists(&record.entity_id) {
                true
            } else {
                warn!(
                    "[validate] no entity '{}' in the directory, dropping record '{}'",
                    record.entity_id, record.id
                );
                rejected += 1;
                false
            }
        })
        .collect();

    (accepted, rejected)
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
