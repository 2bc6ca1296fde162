//! Scan policies
//!
//! Small decision functions kept separate from the orchestration so their
//! trigger conditions can be tested on their own.

/// Whether a persist step should block the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// Spawn the write and return immediately
    Detached,
    /// Finish the write before returning
    Awaited,
}

impl PersistMode {
    /// Page 0 answers first and persists in the background; later pages
    /// persist before returning so the catalog keeps up with paging.
    pub fn for_page(page: usize) -> Self {
        if page == 0 {
            PersistMode::Detached
        } else {
            PersistMode::Awaited
        }
    }
}

/// Whether the stored catalog has drifted from the exclusion rules enough
/// to warrant a full rescan
///
/// Only the first page is considered, and only a count strictly above
/// `threshold` triggers.
pub fn should_trigger_rescan(page: usize, filtered_out: usize, threshold: usize) -> bool {
    page == 0 && filtered_out > threshold
}

/// Whether the page-0 scan has gathered enough to answer early
pub fn should_exit_early(
    page: usize,
    gathered: usize,
    page_size: usize,
    early_exit_pages: usize,
) -> bool {
    page == 0 && gathered >= page_size.saturating_mul(early_exit_pages)
}

/// Remaining `has_more` for a stored page after filtering
///
/// Filtered-out rows are subtracted from the total before comparing.
pub fn stored_has_more(page: usize, page_size: usize, total: usize, filtered_out: usize) -> bool {
    page.saturating_add(1).saturating_mul(page_size) < total.saturating_sub(filtered_out)
}
