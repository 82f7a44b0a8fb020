//! Set operations over a Service's ordered list of allowed source ranges.
//!
//! Ranges are compared as exact strings; no normalization is applied, so `10.0.0.1/32` and
//! `10.0.0.1/32 ` are distinct entries.

use crate::Error;

/// Appends `range` to the end of `ranges`.
///
/// Fails with [`Error::DuplicateRule`] if `range` is already present.
pub fn add(mut ranges: Vec<String>, range: &str) -> Result<Vec<String>, Error> {
    if ranges.iter().any(|r| r == range) {
        return Err(Error::DuplicateRule(range.to_string()));
    }
    ranges.push(range.to_string());
    Ok(ranges)
}

/// Removes `range` from `ranges`, preserving the order of the remaining entries.
///
/// Fails with [`Error::RuleNotFound`] if `range` is not present.
pub fn remove(mut ranges: Vec<String>, range: &str) -> Result<Vec<String>, Error> {
    let idx = ranges
        .iter()
        .position(|r| r == range)
        .ok_or_else(|| Error::RuleNotFound(range.to_string()))?;
    ranges.remove(idx);
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ranges(rs: &[&str]) -> Vec<String> {
        rs.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn add_appends() {
        let added = add(ranges(&["10.0.0.0/8", "192.168.0.0/16"]), "10.0.0.1/32").unwrap();
        assert_eq!(
            added,
            ranges(&["10.0.0.0/8", "192.168.0.0/16", "10.0.0.1/32"])
        );

        let added = add(vec![], "10.0.0.1/32").unwrap();
        assert_eq!(added, ranges(&["10.0.0.1/32"]));
    }

    #[rstest]
    #[case(&["10.0.0.1/32"], "10.0.0.1/32")]
    #[case(&["10.0.0.1/32", "10.0.0.2/32", "10.0.0.3/32"], "10.0.0.1/32")]
    #[case(&["10.0.0.1/32", "10.0.0.2/32", "10.0.0.3/32"], "10.0.0.2/32")]
    #[case(&["10.0.0.1/32", "10.0.0.2/32", "10.0.0.3/32"], "10.0.0.3/32")]
    fn add_rejects_duplicates(#[case] existing: &[&str], #[case] range: &str) {
        match add(ranges(existing), range) {
            Err(Error::DuplicateRule(r)) => assert_eq!(r, range),
            res => panic!("unexpected result: {res:?}"),
        }
    }

    #[rstest]
    #[case(&["10.0.0.1/32"], "10.0.0.1/32", &[])]
    #[case(&["a/32", "b/32", "c/32"], "a/32", &["b/32", "c/32"])]
    #[case(&["a/32", "b/32", "c/32"], "b/32", &["a/32", "c/32"])]
    #[case(&["a/32", "b/32", "c/32"], "c/32", &["a/32", "b/32"])]
    #[case(&["a/32", "b/32", "c/32", "d/32"], "c/32", &["a/32", "b/32", "d/32"])]
    fn remove_preserves_order(
        #[case] existing: &[&str],
        #[case] range: &str,
        #[case] expected: &[&str],
    ) {
        let removed = remove(ranges(existing), range).unwrap();
        assert_eq!(removed, ranges(expected));
        assert!(!removed.iter().any(|r| r == range));
    }

    #[rstest]
    #[case(&[])]
    #[case(&["10.0.0.2/32"])]
    #[case(&["10.0.0.2/32", "10.0.0.1/31"])]
    fn remove_requires_presence(#[case] existing: &[&str]) {
        match remove(ranges(existing), "10.0.0.1/32") {
            Err(Error::RuleNotFound(r)) => assert_eq!(r, "10.0.0.1/32"),
            res => panic!("unexpected result: {res:?}"),
        }
    }

    #[rstest]
    #[case(&[])]
    #[case(&["192.168.0.0/16"])]
    #[case(&["192.168.0.0/16", "172.16.0.0/12", "10.1.0.0/16"])]
    fn remove_undoes_add(#[case] existing: &[&str]) {
        let original = ranges(existing);
        let added = add(original.clone(), "10.0.0.1/32").unwrap();
        assert_eq!(remove(added, "10.0.0.1/32").unwrap(), original);
    }
}
