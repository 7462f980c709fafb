// src/analyze/batch.rs
use crate::ingest::types::Item;

pub const DEFAULT_BATCH_SIZE: usize = 6;

/// Split `items` into consecutive groups of `size` (last one may be shorter),
/// preserving order. A `size` of 0 is treated as 1.
pub fn make_batches(items: &[Item], size: usize) -> Vec<Vec<Item>> {
    items.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<Item> {
        (0..n)
            .map(|i| Item {
                id: format!("p{i}"),
                title: String::new(),
                channel: "c".into(),
                author: "a".into(),
                score: 0,
                created_at: chrono::DateTime::default(),
                url: String::new(),
                body: String::new(),
                num_comments: 0,
            })
            .collect()
    }

    fn ids(batches: &[Vec<Item>]) -> Vec<Vec<String>> {
        batches
            .iter()
            .map(|b| b.iter().map(|i| i.id.clone()).collect())
            .collect()
    }

    #[test]
    fn groups_of_six_with_short_tail() {
        let b = make_batches(&items(14), DEFAULT_BATCH_SIZE);
        assert_eq!(b.iter().map(Vec::len).collect::<Vec<_>>(), vec![6, 6, 2]);
        assert_eq!(b[1][0].id, "p6");
        assert_eq!(b[2][1].id, "p13");
    }

    #[test]
    fn empty_input_gives_no_batches() {
        assert!(make_batches(&[], 6).is_empty());
    }

    #[test]
    fn zero_size_behaves_like_one() {
        assert_eq!(make_batches(&items(3), 0).len(), 3);
    }

    #[test]
    fn batching_is_idempotent() {
        let input = items(20);
        assert_eq!(ids(&make_batches(&input, 6)), ids(&make_batches(&input, 6)));
    }
}
