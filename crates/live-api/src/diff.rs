//! Sliding-window diff over the guard-list feed.

/// Newly-surfaced ids in `new` relative to `old`.
///
/// The feed is a sliding window ordered by recency: a later fetch repeats a
/// suffix-aligned run of the previous one with fresh ids appended. A naive
/// set difference would resurface every id that merely moved position, so the
/// diff trims the longest prefix of `new` that is a tail of `old` and returns
/// the remainder. When no overlap exists the whole window counts as new.
pub fn new_room_ids(new: &[u64], old: &[u64]) -> Vec<u64> {
    fn joined(ids: &[u64]) -> String {
        ids.iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join("-")
    }

    let new_str = joined(new);
    let mut old = old.to_vec();
    while !old.is_empty() {
        let old_str = joined(&old);
        if let Some(rest) = new_str.strip_prefix(&old_str) {
            return rest
                .split('-')
                .filter(|part| !part.is_empty())
                .filter_map(|part| part.parse().ok())
                .collect();
        }
        old.remove(0);
    }
    new.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_slid_by_two() {
        let old = [1, 2, 3, 4, 5];
        let new = [3, 4, 5, 6, 7];
        assert_eq!(new_room_ids(&new, &old), vec![6, 7]);
    }

    #[test]
    fn test_identical_windows_yield_nothing() {
        let ids = [10, 20, 30];
        assert_eq!(new_room_ids(&ids, &ids), Vec::<u64>::new());
    }

    #[test]
    fn test_disjoint_windows_yield_everything() {
        let old = [1, 2, 3];
        let new = [7, 8, 9];
        assert_eq!(new_room_ids(&new, &old), vec![7, 8, 9]);
    }

    #[test]
    fn test_empty_old_window() {
        assert_eq!(new_room_ids(&[5, 6], &[]), vec![5, 6]);
    }

    #[test]
    fn test_overlap_must_start_the_new_window() {
        // Old ids present mid-window are not an overlap; the trim only
        // applies when the previous tail leads the new window.
        let old = [1, 2, 3];
        let new = [9, 2, 3, 4];
        assert_eq!(new_room_ids(&new, &old), vec![9, 2, 3, 4]);
    }
}
