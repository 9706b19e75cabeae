use crate::skywatch::record::{Record, RecordKind};
use std::cmp::Ordering;

/// Key and ordering rules for one collection kind.
///
/// Dates are fixed-width (`YYYY-MM-DD` or `YYYY-MM`), so byte order on the
/// string is chronological order. The comparator is the reverse of the
/// lexicographic order on `(date, id, key)`, which makes it total and
/// transitive; distinct keys never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingPolicy {
    pub kind: RecordKind,
    pub max_size: usize,
}

impl OrderingPolicy {
    pub fn new(kind: RecordKind, max_size: usize) -> Self {
        Self { kind, max_size }
    }

    pub fn key_of<'a>(&self, record: &'a Record) -> &'a str {
        &record.key
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        b.date
            .cmp(&a.date)
            .then_with(|| b.id.cmp(&a.id))
            .then_with(|| self.key_of(b).cmp(self.key_of(a)))
    }

    /// Stable sort by `compare`, then drop the lowest-ranked tail.
    pub fn arrange(&self, items: &mut Vec<Record>) {
        items.sort_by(|a, b| self.compare(a, b));
        items.truncate(self.max_size);
    }

    #[cfg(test)]
    pub fn is_arranged(&self, items: &[Record]) -> bool {
        items.len() <= self.max_size
            && items
                .windows(2)
                .all(|pair| self.compare(&pair[0], &pair[1]) != Ordering::Greater)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::skywatch::record::Payload;

    pub(crate) fn news(id: &str, key: &str, date: &str, title: &str) -> Record {
        Record {
            id: id.into(),
            key: key.into(),
            date: date.into(),
            title: title.into(),
            payload: Payload::News {
                url: key.into(),
                image: None,
                summary: None,
            },
        }
    }

    #[test]
    fn newer_dates_rank_first() {
        let policy = OrderingPolicy::new(RecordKind::News, 10);
        let old = news("z", "https://a", "2024-12-31", "old");
        let new = news("a", "https://b", "2025-01-01", "new");
        assert_eq!(policy.compare(&new, &old), Ordering::Less);
        assert_eq!(policy.compare(&old, &new), Ordering::Greater);
    }

    #[test]
    fn same_date_breaks_tie_on_id_descending() {
        let policy = OrderingPolicy::new(RecordKind::News, 10);
        let mut items = vec![
            news("a", "https://a", "2025-01-01", "A"),
            news("b", "https://b", "2025-01-01", "B"),
        ];
        policy.arrange(&mut items);
        let ids: Vec<&str> = items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn comparator_is_antisymmetric_and_transitive_over_a_sample() {
        let policy = OrderingPolicy::new(RecordKind::News, 100);
        let sample = vec![
            news("a", "https://1", "2025-01-01", ""),
            news("b", "https://2", "2025-01-01", ""),
            news("b", "https://3", "2025-01-01", ""),
            news("a", "https://4", "2024-06-30", ""),
            news("c", "https://5", "2025-02-01", ""),
        ];
        for x in &sample {
            assert_eq!(policy.compare(x, x), Ordering::Equal);
            for y in &sample {
                assert_eq!(policy.compare(x, y), policy.compare(y, x).reverse());
                for z in &sample {
                    if policy.compare(x, y) != Ordering::Greater
                        && policy.compare(y, z) != Ordering::Greater
                    {
                        assert_ne!(policy.compare(x, z), Ordering::Greater);
                    }
                }
            }
        }
    }

    #[test]
    fn arrange_is_independent_of_input_order() {
        let policy = OrderingPolicy::new(RecordKind::News, 100);
        let forward = vec![
            news("a", "https://1", "2025-01-01", ""),
            news("b", "https://2", "2025-01-01", ""),
            news("c", "https://3", "2024-01-01", ""),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut forward = forward;
        policy.arrange(&mut forward);
        policy.arrange(&mut reversed);
        assert_eq!(forward, reversed);
        assert!(policy.is_arranged(&forward));
    }
}
