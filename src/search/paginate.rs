use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_results: u64,
    pub total_pages: u32,
    pub current_page: u32,
}

/// 1-based page number; missing, unparseable and zero values mean page 1.
pub fn parse_page(raw: Option<&str>) -> u32 {
    raw.and_then(|p| p.trim().parse::<u32>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

/// Slices an ordered result set. A page past the end is empty but still
/// carries the totals.
pub fn paginate<T>(items: Vec<T>, page: u32, page_size: u32) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(page_size as usize);

    let start = (page as usize - 1).saturating_mul(page_size as usize);
    let slice = items
        .into_iter()
        .skip(start)
        .take(page_size as usize)
        .collect();

    Page {
        items: slice,
        total_results: total as u64,
        total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        current_page: page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_page_defaults_to_one() {
        assert_eq!(parse_page(None), 1);
        assert_eq!(parse_page(Some("0")), 1);
        assert_eq!(parse_page(Some("-2")), 1);
        assert_eq!(parse_page(Some("two")), 1);
        assert_eq!(parse_page(Some(" 4 ")), 4);
    }

    #[test]
    fn totals_use_ceiling_division() {
        for (n, size, pages) in [(0, 12, 0), (1, 12, 1), (12, 12, 1), (13, 12, 2), (25, 5, 5)] {
            let page = paginate((0..n).collect::<Vec<u32>>(), 1, size);
            assert_eq!(page.total_results, n as u64);
            assert_eq!(page.total_pages, pages);
        }
    }

    #[test]
    fn page_past_the_end_is_empty_with_totals() {
        let page = paginate((0..30).collect::<Vec<u32>>(), 9, 12);
        assert!(page.items.is_empty());
        assert_eq!(page.total_results, 30);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 9);
    }

    #[test]
    fn pages_concatenate_to_the_full_result() {
        for size in 1..=13u32 {
            for n in [0u32, 1, 11, 12, 13, 37] {
                let items: Vec<u32> = (0..n).collect();
                let total_pages = paginate(items.clone(), 1, size).total_pages;
                let rebuilt: Vec<u32> = (1..=total_pages)
                    .flat_map(|p| paginate(items.clone(), p, size).items)
                    .collect();
                assert_eq!(rebuilt, items, "n={} size={}", n, size);
            }
        }
    }

    #[test]
    fn last_page_is_partial() {
        let page = paginate((0..14).collect::<Vec<u32>>(), 2, 12);
        assert_eq!(page.items, vec![12, 13]);
    }
}
