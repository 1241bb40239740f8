use std::collections::BTreeSet;

/// Scan the existing ids and return the smallest unused positive
/// integer, generalized from the teacher's `IdMap::find_next_id`
/// (which walked a `BTreeMap<u32, Uuid>` forward from a cached
/// watermark) to a plain scan over whatever ids are currently taken.
#[must_use]
pub fn smallest_unused(taken: &BTreeSet<u32>) -> u32 {
    let mut candidate = 1;
    for &id in taken {
        if id != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_id_is_one() {
        assert_eq!(smallest_unused(&BTreeSet::new()), 1);
    }

    #[test]
    fn fills_gap() {
        let taken = BTreeSet::from([1, 2, 4]);
        assert_eq!(smallest_unused(&taken), 3);
    }

    #[test]
    fn skips_to_end_when_contiguous() {
        let taken = BTreeSet::from([1, 2, 3]);
        assert_eq!(smallest_unused(&taken), 4);
    }

    #[test]
    fn empty_gap_at_front() {
        let taken = BTreeSet::from([2, 3]);
        assert_eq!(smallest_unused(&taken), 1);
    }
}
