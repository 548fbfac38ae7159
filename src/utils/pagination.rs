const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// `(page, per_page, offset)` with page >= 1 and 1 <= per_page <= 100.
pub fn resolve(page: Option<u32>, per_page: Option<u32>) -> (u32, u32, u64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let offset = (page as u64 - 1) * per_page as u64;
    (page, per_page, offset)
}
