//! Encodes grant deadlines as Service annotations.
//!
//! A grant for `<range>` is recorded as the annotation `service.caretaker.ipaddr.<range>` whose
//! value is the deadline formatted as `YYYY-MM-DD HH:MM:SS` in local time. The layout is
//! fixed-width and zero-padded, so deadlines order the same lexicographically as they do
//! chronologically and may be compared as strings.

use crate::{Service, RULE_ANNOTATION_PREFIX};
use chrono::{Days, NaiveDateTime};

pub const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How long a grant lasts.
pub const GRANT_TTL: Days = Days::new(2);

/// A decoded grant annotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule<'s> {
    pub range: &'s str,
    pub deadline: &'s str,
}

pub fn annotation_key(range: &str) -> String {
    format!("{RULE_ANNOTATION_PREFIX}.{range}")
}

pub fn format_time(t: NaiveDateTime) -> String {
    t.format(DEADLINE_FORMAT).to_string()
}

/// Records a deadline of `now` plus [`GRANT_TTL`] for `range` on the Service and returns it.
pub fn stamp(svc: &mut Service, range: &str, now: NaiveDateTime) -> String {
    // Adding two days only overflows at the end of chrono's representable range.
    let deadline = format_time(now.checked_add_days(GRANT_TTL).unwrap_or(NaiveDateTime::MAX));
    svc.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(annotation_key(range), deadline.clone());
    deadline
}

/// Removes the deadline recorded for `range`, if any.
pub fn erase(svc: &mut Service, range: &str) {
    if let Some(anns) = svc.metadata.annotations.as_mut() {
        anns.remove(&annotation_key(range));
    }
}

/// Returns the deadline recorded for `range`, if any.
pub fn deadline<'s>(svc: &'s Service, range: &str) -> Option<&'s str> {
    svc.metadata
        .annotations
        .as_ref()?
        .get(&annotation_key(range))
        .map(String::as_str)
}

/// Iterates over every grant annotation on the Service.
pub fn rules(svc: &Service) -> impl Iterator<Item = Rule<'_>> {
    svc.metadata
        .annotations
        .iter()
        .flat_map(|anns| anns.iter())
        .filter_map(|(k, v)| {
            let range = k
                .strip_prefix(RULE_ANNOTATION_PREFIX)?
                .strip_prefix('.')?;
            Some(Rule {
                range,
                deadline: v.as_str(),
            })
        })
}

/// Returns true if `deadline` is before `now`.
pub fn is_expired(deadline: &str, now: NaiveDateTime) -> bool {
    deadline < format_time(now).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MANAGED_ANNOTATION;
    use chrono::NaiveDate;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn stamp_records_deadline_two_days_out() {
        let mut svc = Service::default();
        let deadline = stamp(&mut svc, "10.0.0.1/32", at(2024, 2, 28, 9, 5, 7));
        assert_eq!(deadline, "2024-03-01 09:05:07");
        assert_eq!(
            svc.metadata.annotations,
            Some(btreemap! {
                "service.caretaker.ipaddr.10.0.0.1/32".to_string() => "2024-03-01 09:05:07".to_string(),
            })
        );
    }

    #[test]
    fn stamp_is_not_expired_at_the_same_instant() {
        let now = at(2024, 12, 31, 23, 59, 59);
        let mut svc = Service::default();
        let deadline = stamp(&mut svc, "10.0.0.1/32", now);
        assert!(!is_expired(&deadline, now));
    }

    #[test]
    fn restamping_replaces_deadline() {
        let mut svc = Service::default();
        stamp(&mut svc, "10.0.0.1/32", at(2024, 1, 1, 0, 0, 0));
        stamp(&mut svc, "10.0.0.1/32", at(2024, 1, 5, 0, 0, 0));
        let rules = rules(&svc).collect::<Vec<_>>();
        assert_eq!(
            rules,
            vec![Rule {
                range: "10.0.0.1/32",
                deadline: "2024-01-07 00:00:00"
            }]
        );
    }

    #[test]
    fn erase_is_idempotent() {
        let mut svc = Service::default();
        erase(&mut svc, "10.0.0.1/32");
        assert_eq!(svc.metadata.annotations, None);

        stamp(&mut svc, "10.0.0.1/32", at(2024, 1, 1, 0, 0, 0));
        stamp(&mut svc, "10.0.0.2/32", at(2024, 1, 1, 0, 0, 0));
        erase(&mut svc, "10.0.0.1/32");
        erase(&mut svc, "10.0.0.1/32");
        assert_eq!(
            rules(&svc).map(|r| r.range).collect::<Vec<_>>(),
            vec!["10.0.0.2/32"]
        );
    }

    #[test]
    fn deadline_is_looked_up_by_range() {
        let mut svc = Service::default();
        assert_eq!(deadline(&svc, "10.0.0.1/32"), None);

        stamp(&mut svc, "10.0.0.1/32", at(2024, 1, 1, 0, 0, 0));
        assert_eq!(deadline(&svc, "10.0.0.1/32"), Some("2024-01-03 00:00:00"));
        assert_eq!(deadline(&svc, "10.0.0.2/32"), None);
    }

    #[test]
    fn rules_only_decode_prefixed_keys() {
        let mut svc = Service::default();
        svc.metadata.annotations = Some(btreemap! {
            MANAGED_ANNOTATION.to_string() => "true".to_string(),
            "service.caretaker.ipaddr.10.0.0.1/32".to_string() => "2024-01-01 00:00:00".to_string(),
            "service.caretaker.ipaddrs".to_string() => "2024-01-01 00:00:00".to_string(),
            "kubectl.kubernetes.io/last-applied-configuration".to_string() => "{}".to_string(),
        });
        assert_eq!(
            rules(&svc).collect::<Vec<_>>(),
            vec![Rule {
                range: "10.0.0.1/32",
                deadline: "2024-01-01 00:00:00"
            }]
        );
    }

    #[rstest]
    #[case(at(2024, 1, 1, 0, 0, 0), at(2024, 1, 1, 0, 0, 1), true)]
    #[case(at(2024, 1, 1, 0, 0, 1), at(2024, 1, 1, 0, 0, 0), false)]
    #[case(at(2024, 1, 1, 0, 0, 0), at(2024, 1, 1, 0, 0, 0), false)]
    #[case(at(2023, 12, 31, 23, 59, 59), at(2024, 1, 1, 0, 0, 0), true)]
    #[case(at(2024, 9, 30, 12, 0, 0), at(2024, 10, 1, 8, 0, 0), true)]
    #[case(at(2025, 1, 9, 0, 0, 0), at(2024, 10, 1, 8, 0, 0), false)]
    fn expiry_orders_chronologically(
        #[case] deadline: NaiveDateTime,
        #[case] now: NaiveDateTime,
        #[case] expired: bool,
    ) {
        assert_eq!(is_expired(&format_time(deadline), now), expired);
    }
}
